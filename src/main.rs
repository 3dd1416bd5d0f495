use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mergepilot::adapter::scripted::ScriptedQueue;
use mergepilot::adapter::{RawRecord, UiAdapter};
use mergepilot::args::{BatchArgs, CommonArgs};
use mergepilot::attributes::RecordAttributes;
use mergepilot::config::Config;
use mergepilot::controller::Controller;
use mergepilot::logging::{self, LogConfig};
use mergepilot::policy::{self, EntityKind, Side, Verdict};
use mergepilot::theme as t;

#[derive(Debug, Parser)]
#[command(
    name = "mergepilot",
    version,
    about = "Work through a CRM duplicates queue, keeping the better record of each pair"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Drive the live duplicates queue in Chrome
    Run(RunArgs),
    /// Run against a scripted queue described in a JSON fixture
    Simulate {
        /// Fixture file with the queued pairs
        #[arg(value_name = "FIXTURE")]
        fixture: PathBuf,
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Decide a single pair offline from two JSON records
    Decide {
        #[arg(value_name = "LEFT")]
        left: PathBuf,
        #[arg(value_name = "RIGHT")]
        right: PathBuf,
        /// Record type of the pair
        #[arg(long, value_enum, value_name = "KIND")]
        entity: Option<EntityKind>,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Print the config file location instead
        #[arg(long)]
        path: bool,
        /// Write the effective configuration to the config file
        #[arg(long, conflicts_with = "path")]
        init: bool,
    },
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    #[command(flatten)]
    batch: BatchArgs,
    /// Duplicates queue URL
    #[arg(long, value_name = "URL")]
    url: Option<String>,
    /// Run Chrome without a window (needs a logged-in user-data dir)
    #[arg(long)]
    headless: bool,
    /// Chrome user-data directory
    #[arg(long, value_name = "DIR")]
    user_data_dir: Option<PathBuf>,
}

impl RunArgs {
    fn apply_overrides(&self, config: &mut Config) {
        self.batch.apply_overrides(config);

        if let Some(url) = &self.url {
            config.browser.url = url.clone();
        }

        if self.headless {
            config.browser.headless = true;
        }

        if let Some(dir) = &self.user_data_dir {
            config.browser.user_data_dir = Some(dir.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    t::init_color(cli.common.no_color);

    let log_config = if cli.common.debug {
        LogConfig::debug()
    } else {
        LogConfig::from_env()
    };
    logging::init(if cli.common.no_color {
        log_config.without_ansi()
    } else {
        log_config
    });

    let mut config = match cli.command {
        // Fresh defaults, so --init works before any file exists.
        Commands::Config { init: true, .. } => Config::default(),
        _ => cli.common.load_config()?,
    };

    match cli.command {
        Commands::Run(args) => {
            args.apply_overrides(&mut config);
            run_browser(&config).await
        }
        Commands::Simulate { fixture, batch } => {
            batch.apply_overrides(&mut config);
            let json = std::fs::read_to_string(&fixture)
                .with_context(|| format!("Failed to read fixture {}", fixture.display()))?;
            let queue = ScriptedQueue::from_json(&json)
                .with_context(|| format!("Failed to parse fixture {}", fixture.display()))?;
            drive(queue, &config).await.map(|_| ())
        }
        Commands::Decide { left, right, entity } => {
            if let Some(entity) = entity {
                config.policy.entity = entity;
            }
            decide(&config, &left, &right)
        }
        Commands::Config { path, init } => {
            let target = cli.common.config.unwrap_or_else(Config::default_path);
            if path {
                println!("{}", target.display());
            } else if init {
                if target.exists() {
                    anyhow::bail!("{} already exists", target.display());
                }
                config.save(&target)?;
                println!("{}", t::label_value("Wrote", &target.display().to_string()));
            } else {
                print!("{}", config.to_toml()?);
            }
            Ok(())
        }
    }
}

/// Run the batch loop with a progress bar and print the summary.
async fn drive<A: UiAdapter>(adapter: A, config: &Config) -> Result<A> {
    let pb = t::progress(config.run.effective_limit());
    let bar = pb.clone();
    let mut controller = Controller::new(adapter, config).on_pair(move |report| {
        let line = t::pair_line(report);
        // A hidden bar (stderr not a terminal) drops println output.
        if bar.is_hidden() {
            println!("{line}");
        } else {
            bar.println(line);
        }
        bar.inc(1);
    });

    let result = controller.run().await;
    pb.finish_and_clear();
    let summary = result.context("Run aborted")?;

    for line in t::summary_lines(&summary) {
        println!("{line}");
    }
    Ok(controller.into_adapter())
}

#[cfg(feature = "browser")]
async fn run_browser(config: &Config) -> Result<()> {
    use mergepilot::adapter::browser::ChromeQueue;

    let queue = ChromeQueue::launch(config.browser.clone())
        .await
        .context("Failed to open the duplicates queue")?;
    let queue = drive(queue, config).await?;
    queue.close().await.context("Failed to close the browser")?;
    Ok(())
}

#[cfg(not(feature = "browser"))]
async fn run_browser(_config: &Config) -> Result<()> {
    anyhow::bail!(
        "this build has no browser support; rebuild with `cargo install mergepilot --features browser` \
         or try `mergepilot simulate <fixture.json>`"
    )
}

fn read_record(path: &Path) -> Result<RawRecord> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read record {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse record {}", path.display()))
}

fn decide(config: &Config, left: &Path, right: &Path) -> Result<()> {
    let left = RecordAttributes::parse(Side::Left, &read_record(left)?)?;
    let right = RecordAttributes::parse(Side::Right, &read_record(right)?)?;
    let policy = policy::from_config(&config.policy);

    match policy.decide(&left, &right) {
        Verdict::Merge(decision) => {
            println!("{}", t::label_value("Policy", policy.name()));
            println!("{}", t::label_value("Keep", decision.primary.as_str()));
            println!("{}", t::label_value("Rule", decision.rule.as_str()));
            if decision.is_ambiguous() {
                println!("  {}", t::warn("no signal separates the records"));
            }
        }
        Verdict::Reject { reason } => {
            println!("{}", t::label_value("Policy", policy.name()));
            println!("  {}", t::error(&format!("reject: {reason}")));
        }
    }
    Ok(())
}
