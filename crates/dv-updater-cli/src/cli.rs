use clap::{ArgAction, Parser, Subcommand, ValueHint};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output logs as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true, env = "UPDATER_CONFIG", value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Write a documented default configuration
    Generate {
        /// Destination (defaults to the active config path)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        output: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the update agent: HTTP API and background update loops
    Start,

    /// Check for a newer dv-updater once and apply it
    #[clap(name = "self-update")]
    SelfUpdate,

    /// Print version information
    Version,

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the detected Linux distribution
    Distro,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_global_flags() {
        let args = Args::parse_from(["dv-updater", "start", "-vv", "--json", "-c", "/tmp/u.toml"]);
        assert_eq!(args.verbose, 2);
        assert!(args.json);
        assert_eq!(args.config.as_deref(), Some("/tmp/u.toml"));
        assert!(matches!(args.command, Commands::Start));
    }

    #[test]
    fn test_parse_config_generate() {
        let args = Args::parse_from(["dv-updater", "config", "generate", "--force"]);
        match args.command {
            Commands::Config {
                action: ConfigAction::Generate { output, force },
            } => {
                assert!(output.is_none());
                assert!(force);
            }
            _ => panic!("expected config generate"),
        }
    }
}
