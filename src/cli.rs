use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "hostkit")]
#[command(version)]
#[command(
    about = "Declarative provisioning for a single Debian/Ubuntu host",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List every catalog entry, grouped, with its selection
    Catalog,

    /// Show selection, pins and ownership
    Status,

    /// Select or deselect catalog entries
    Select(SelectArgs),

    /// Reset the selection and pins to catalog defaults
    Defaults,

    /// Named selection bundles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Version pins
    #[command(subcommand)]
    Pin(PinCommand),

    /// Show what apply would install and remove
    Plan,

    /// Converge the host toward the selection
    Apply(ApplyArgs),

    /// Check the live host against the selection without changing it
    Audit {
        /// Print the audit as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run health checks on the host and hostkit setup
    Doctor,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct SelectArgs {
    /// Catalog keys to switch
    #[arg(required_unless_present = "only", conflicts_with = "only")]
    pub keys: Vec<String>,

    /// Deselect instead of select
    #[arg(long, conflicts_with = "only")]
    pub off: bool,

    /// Make exactly these keys the selection (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub only: Option<Vec<String>>,
}

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// List available profiles
    List,

    /// Show a profile's entries and pin overrides
    Show {
        /// Profile name
        name: String,
    },

    /// Apply a profile to the selection
    Apply {
        /// Profile name
        name: String,

        /// Add the profile's entries instead of replacing the selection
        #[arg(long)]
        add: bool,
    },
}

#[derive(Subcommand)]
pub enum PinCommand {
    /// Show every pin with its current value
    List,

    /// Set a pin (e.g. `hostkit pin set HELM_VERSION 3.16.1`)
    Set {
        /// Pin name, e.g. TERRAFORM_VERSION
        pin: String,

        /// New value, or `latest` where supported
        value: String,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Account to install per-user runtimes for
    #[arg(long, env = "HOSTKIT_USER")]
    pub user: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_select_keys() {
        let cli = Cli::try_parse_from(["hostkit", "select", "jq", "htop", "--off"]).unwrap();
        let Command::Select(args) = cli.command else {
            panic!("expected select");
        };
        assert_eq!(args.keys, ["jq", "htop"]);
        assert!(args.off);
        assert!(args.only.is_none());
    }

    #[test]
    fn test_select_only() {
        let cli = Cli::try_parse_from(["hostkit", "select", "--only", "curl,jq"]).unwrap();
        let Command::Select(args) = cli.command else {
            panic!("expected select");
        };
        assert_eq!(args.only.unwrap(), ["curl", "jq"]);
    }

    #[test]
    fn test_select_requires_keys() {
        assert!(Cli::try_parse_from(["hostkit", "select"]).is_err());
        assert!(Cli::try_parse_from(["hostkit", "select", "jq", "--only", "curl"]).is_err());
    }

    #[test]
    fn test_global_verbosity() {
        let cli = Cli::try_parse_from(["hostkit", "apply", "-vv", "--yes"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Apply(ApplyArgs { yes: true, .. })));
    }
}
