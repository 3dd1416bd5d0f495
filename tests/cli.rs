//! CLI behaviour and exit codes.
//!
//! 0 - run completed (pair failures included)
//! 1 - fatal error (queue lost, bad config, unreadable input)
//! 2 - usage error (clap)

use std::io::Write;
use std::process::Command;

use tempfile::{NamedTempFile, TempDir};

fn run(args: &[&str]) -> (String, String, i32) {
    let home = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_mergepilot"))
        .args(["--no-color"])
        .args(args)
        .env("HOME", home.path())
        .env_remove("MERGEPILOT_CONFIG")
        .output()
        .expect("Failed to execute mergepilot");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.code().unwrap_or(-1),
    )
}

fn json_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const FIXTURE: &str = r#"{
    "pairs": [
        {
            "left": { "id": "Acme", "contact_count": "5", "domain": "acme.biz" },
            "right": { "id": "Acme Inc", "contact_count": "12", "domain": "acme.org" }
        },
        {
            "left": { "id": "Globex", "contact_count": "--", "domain": "globex.io" },
            "right": { "id": "Globex Corp", "contact_count": "--", "domain": "globex.com" },
            "behaviour": { "selection_sticks": false }
        }
    ]
}"#;

mod help {
    use super::*;

    #[test]
    fn test_help_lists_subcommands() {
        let (stdout, _, code) = run(&["--help"]);
        assert_eq!(code, 0);
        for cmd in ["run", "simulate", "decide", "config"] {
            assert!(stdout.contains(cmd), "help should mention {cmd}");
        }
    }

    #[test]
    fn test_unknown_command_is_usage_error() {
        let (_, _, code) = run(&["frobnicate"]);
        assert_eq!(code, 2);
    }
}

mod config {
    use super::*;

    #[test]
    fn test_prints_default_config() {
        let (stdout, _, code) = run(&["config"]);
        assert_eq!(code, 0);
        assert!(stdout.contains("[run]"));
        assert!(stdout.contains("pairs = 10"));
        assert!(stdout.contains("[browser.selectors]"));
    }

    #[test]
    fn test_init_writes_config_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let (stdout, _, code) = run(&["-c", path, "config", "--init"]);
        assert_eq!(code, 0);
        assert!(stdout.contains("Wrote"));

        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.contains("max_pair_failures = 2"));

        std::fs::write(path, "[run]\npairs = 3\n").unwrap();
        let (stdout, _, code) = run(&["-c", path, "config"]);
        assert_eq!(code, 0);
        assert!(stdout.contains("pairs = 3"));

        let (_, stderr, code) = run(&["-c", path, "config", "--init"]);
        assert_eq!(code, 1);
        assert!(stderr.contains("already exists"));
    }

    #[test]
    fn test_missing_explicit_config_is_fatal() {
        let (_, stderr, code) = run(&["-c", "/nonexistent/mergepilot.toml", "config"]);
        assert_eq!(code, 1);
        assert!(stderr.contains("mergepilot.toml"));
    }
}

mod simulate {
    use super::*;

    #[test]
    fn test_simulate_prints_summary() {
        let fixture = json_file(FIXTURE);
        let (stdout, _, code) = run(&["simulate", fixture.path().to_str().unwrap()]);

        assert_eq!(code, 0);
        assert!(stdout.contains("Acme <> Acme Inc"));
        assert!(stdout.contains("merged, kept right record (contact_count)"));
        assert!(stdout.contains("Failed    : 1"));
        assert!(stdout.contains("queue empty"));
    }

    #[test]
    fn test_simulate_dry_run() {
        let fixture = json_file(FIXTURE);
        let (stdout, _, code) = run(&["simulate", "--dry-run", fixture.path().to_str().unwrap()]);

        assert_eq!(code, 0);
        assert!(stdout.contains("dry run, would keep right record (domain_rank)"));
    }

    #[test]
    fn test_lost_queue_exits_one() {
        let fixture = json_file(
            r#"{ "pairs": [
                { "left": { "id": "a" }, "right": { "id": "b" } },
                { "left": { "id": "c" }, "right": { "id": "d" } }
            ], "unavailable_after": 1 }"#,
        );
        let (_, stderr, code) = run(&["simulate", fixture.path().to_str().unwrap()]);

        assert_eq!(code, 1);
        assert!(stderr.contains("Run aborted"));
    }
}

mod decide {
    use super::*;

    #[test]
    fn test_decide_company_pair() {
        let left = json_file(r#"{ "contact_count": "3", "domain": "acme.xyz" }"#);
        let right = json_file(r#"{ "contact_count": "3", "domain": "acme.net" }"#);
        let (stdout, _, code) = run(&[
            "decide",
            left.path().to_str().unwrap(),
            right.path().to_str().unwrap(),
        ]);

        assert_eq!(code, 0);
        assert!(stdout.contains("Keep : left"));
        assert!(stdout.contains("default_left"));
    }

    #[test]
    fn test_decide_contact_reject() {
        let left = json_file(r#"{ "email": "a@acme.com", "contact_type": "Vendor" }"#);
        let right = json_file(r#"{ "email": "b@acme.com" }"#);
        let (stdout, _, code) = run(&[
            "decide",
            "--entity",
            "contact",
            left.path().to_str().unwrap(),
            right.path().to_str().unwrap(),
        ]);

        assert_eq!(code, 0);
        assert!(stdout.contains("reject: neither record is a company employee"));
    }

    #[test]
    fn test_decide_unparseable_count_fails() {
        let left = json_file(r#"{ "contact_count": "lots" }"#);
        let right = json_file(r#"{ "contact_count": "2" }"#);
        let (_, _, code) = run(&[
            "decide",
            left.path().to_str().unwrap(),
            right.path().to_str().unwrap(),
        ]);

        assert_eq!(code, 1);
    }
}

#[cfg(not(feature = "browser"))]
#[test]
fn test_run_without_browser_support() {
    let (_, stderr, code) = run(&["run", "--pairs", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("--features browser"));
}
