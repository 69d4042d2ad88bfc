use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "lakebundle")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Install packaged data bundles into a workspace", long_about = None)]
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
    /// Install a bundle: provision its resources and upload its notebooks
    Install(InstallArgs),

    /// List the bundles available for installation
    List,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct WorkspaceArgs {
    /// Workspace URL
    #[arg(long, env = "LAKEBUNDLE_HOST")]
    pub host: Option<String>,

    /// Personal access token
    #[arg(long, env = "LAKEBUNDLE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Args)]
pub struct InstallArgs {
    /// Bundle name
    pub name: String,

    /// Folder to install into (default: /Users/<you>/lakebundle)
    #[arg(long)]
    pub path: Option<String>,

    /// Catalog to install into
    #[arg(long)]
    pub catalog: Option<String>,

    /// Schema to install into
    #[arg(long)]
    pub schema: Option<String>,

    /// Prefer this SQL warehouse for dashboards and data loads
    #[arg(long)]
    pub warehouse: Option<String>,

    /// Replace the bundle folder if it already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Do not ask before deleting an existing bundle folder
    #[arg(short, long)]
    pub yes: bool,

    /// Use serverless compute for pipelines and jobs
    #[arg(long)]
    pub serverless: bool,

    /// Do not install dashboards
    #[arg(long)]
    pub skip_dashboards: bool,

    /// Do not install query rooms
    #[arg(long, visible_alias = "skip-query-rooms")]
    pub skip_genie_rooms: bool,

    /// Only provision this target (e.g., "pipeline" or "pipeline.ingest");
    /// everything else is looked up
    #[arg(long)]
    pub only: Option<String>,

    /// Show what exists without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the installation report as JSON
    #[arg(long)]
    pub json: bool,

    /// Number of parallel workers
    #[arg(short, long)]
    pub jobs: Option<u16>,

    #[command(flatten)]
    pub workspace: WorkspaceArgs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_install_flags() {
        let cli = Cli::try_parse_from([
            "lakebundle",
            "-vv",
            "install",
            "lakehouse-retail",
            "--schema",
            "retail",
            "--only",
            "pipeline.ingest",
            "--skip-query-rooms",
            "--jobs",
            "4",
            "--host",
            "https://example.cloud",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Install(args) = cli.command else {
            panic!("expected install");
        };
        assert_eq!(args.name, "lakehouse-retail");
        assert_eq!(args.schema.as_deref(), Some("retail"));
        assert_eq!(args.only.as_deref(), Some("pipeline.ingest"));
        assert!(args.skip_genie_rooms);
        assert_eq!(args.jobs, Some(4));
        assert_eq!(args.workspace.host.as_deref(), Some("https://example.cloud"));
        assert!(!args.overwrite);
    }
}
