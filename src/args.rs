use crate::config::Config;
use crate::policy::{CountRule, EntityKind};
use clap::{ArgAction, Args};
use std::path::PathBuf;

// Global flags shared across every subcommand.
//
//   -c / --config   Path to a config.toml file
//   --debug         Verbose logging for the crate
//   --no-color      Disable coloured terminal output
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Path to a config.toml file (default: ~/.mergepilot/config.toml)
    #[arg(
        short = 'c',
        long,
        value_name = "PATH",
        env = "MERGEPILOT_CONFIG",
        global = true
    )]
    pub config: Option<PathBuf>,

    /// Log every state transition and retry
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    pub debug: bool,

    /// Disable coloured terminal output
    #[arg(long = "no-color", action = ArgAction::SetTrue, env = "NO_COLOR", global = true)]
    pub no_color: bool,
}

impl CommonArgs {
    pub fn load_config(&self) -> anyhow::Result<Config> {
        Config::load(self.config.as_deref())
    }
}

/// Batch options shared by `run` and `simulate`.
#[derive(Debug, Clone, Default, Args)]
pub struct BatchArgs {
    /// Number of pairs to attempt
    #[arg(short = 'n', long, value_name = "N")]
    pub pairs: Option<usize>,

    /// Hard cap on the number of pairs
    #[arg(long, value_name = "N")]
    pub max_batch: Option<usize>,

    /// Reject a failing pair from the queue and move on
    #[arg(long, action = ArgAction::SetTrue)]
    pub auto_skip: bool,

    /// Decide and log every pair without merging
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,

    /// Record type in the queue
    #[arg(long, value_enum, value_name = "KIND")]
    pub entity: Option<EntityKind>,

    /// How contact counts are compared
    #[arg(long, value_enum, value_name = "RULE")]
    pub count_rule: Option<CountRule>,
}

impl BatchArgs {
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(pairs) = self.pairs {
            config.run.pairs = pairs;
        }

        if let Some(cap) = self.max_batch {
            config.run.max_batch = Some(cap);
        }

        if self.auto_skip {
            config.run.auto_skip = true;
        }

        if self.dry_run {
            config.run.dry_run = true;
        }

        if let Some(entity) = self.entity {
            config.policy.entity = entity;
        }

        if let Some(rule) = self.count_rule {
            config.policy.count_rule = rule;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_only_touch_given_flags() {
        let mut config = Config::default();
        config.run.max_batch = Some(40);

        let args = BatchArgs {
            pairs: Some(25),
            dry_run: true,
            ..BatchArgs::default()
        };
        args.apply_overrides(&mut config);

        assert_eq!(config.run.pairs, 25);
        assert_eq!(config.run.max_batch, Some(40));
        assert!(config.run.dry_run);
        assert!(!config.run.auto_skip);
        assert_eq!(config.policy.entity, EntityKind::Company);
    }

    #[test]
    fn test_entity_override() {
        let mut config = Config::default();
        let args = BatchArgs {
            entity: Some(EntityKind::Contact),
            count_rule: Some(CountRule::Margin),
            ..BatchArgs::default()
        };
        args.apply_overrides(&mut config);

        assert_eq!(config.policy.entity, EntityKind::Contact);
        assert_eq!(config.policy.count_rule, CountRule::Margin);
    }
}
