//! CLI argument parsing for agents.

use std::path::PathBuf;

use clap::Parser;

/// Common CLI arguments for all agents.
#[derive(Parser, Debug, Clone)]
#[command(about = "fieldlink telemetry agent")]
pub struct AgentArgs {
    /// Path to configuration file.
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl AgentArgs {
    /// Parse CLI arguments with a default config path.
    ///
    /// If no `--config` argument is provided, uses the default.
    pub fn parse_with_default(default_config: &'static str) -> Self {
        Self::try_parse_from_with_default(std::env::args_os(), default_config)
            .unwrap_or_else(|e| e.exit())
    }

    /// Parse the given arguments with a default config path.
    pub fn try_parse_from_with_default<I, T>(
        args: I,
        default_config: &'static str,
    ) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = <Self as clap::CommandFactory>::command()
            .mut_arg("config", |arg| arg.default_value(default_config).required(false))
            .try_get_matches_from(args)?;

        <Self as clap::FromArgMatches>::from_arg_matches(&matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        let args =
            AgentArgs::try_parse_from_with_default(["fieldlink-agent"], "fieldlink.json5").unwrap();
        assert_eq!(args.config, PathBuf::from("fieldlink.json5"));
        assert_eq!(args.log_level, None);
    }

    #[test]
    fn test_explicit_args() {
        let args = AgentArgs::try_parse_from_with_default(
            ["fieldlink-agent", "-c", "/etc/fieldlink.json5", "--log-level", "debug"],
            "fieldlink.json5",
        )
        .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/fieldlink.json5"));
        assert_eq!(args.log_level, Some("debug".to_string()));
    }
}
