use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use appcontainer::{
    commands,
    lock::ArchiveLock,
    paths::Paths,
    preferences::NoopPreferences,
    swap::SwapEngine,
    ui::{ColorMode, Ui},
};

#[derive(Parser)]
#[command(name = "appctr")]
#[command(about = "Swap an application's data directories between named containers")]
#[command(version)]
struct Cli {
    /// Working tree whose data is swapped
    #[arg(long, global = true, env = "APPCTR_HOME", value_name = "DIR")]
    home: Option<PathBuf>,

    /// Where archived containers live (default: <home>/Library/.__app_container__)
    #[arg(long, global = true, env = "APPCTR_ARCHIVE_DIR", value_name = "DIR")]
    archive_dir: Option<PathBuf>,

    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// When to use colors: always, auto, never
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: ColorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all containers
    List,

    /// Show the active container
    Current,

    /// Show details and content sizes of a container
    Inspect {
        /// Container name, uuid or uuid prefix
        container: String,
    },

    /// Create an empty container
    Create {
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Switch the working tree to a container
    Use {
        /// Container name, uuid or uuid prefix
        container: String,
    },

    /// Move the working tree into the active container's slot
    Stash,

    /// Move the active container's slot back into the working tree
    Unstash,

    /// Copy a container's content into a new container
    Clone {
        /// Container to copy
        source: String,

        /// Name of the new container
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// Rename a container
    Rename { container: String, name: String },

    /// Set or clear (when omitted) a container's description
    Describe {
        container: String,
        text: Option<String>,
    },

    /// Delete a container's content, keeping the container
    Clean {
        container: String,

        /// Skip confirmation
        #[arg(long, short)]
        force: bool,
    },

    /// Delete a container
    Delete {
        container: String,

        /// Skip confirmation
        #[arg(long, short)]
        force: bool,
    },

    /// Restore the default container and delete the whole archive
    Reset {
        /// Skip confirmation
        #[arg(long, short)]
        force: bool,
    },

    /// Check the working tree and archive for problems
    Doctor,

    /// Print shell completions
    Completions { shell: Shell },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let ui = Ui::new(cli.color, cli.no_color);

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "appctr", &mut std::io::stdout());
        return Ok(());
    }

    let paths = Paths::new(cli.home, cli.archive_dir)?;
    if let Commands::Doctor = cli.command {
        return commands::doctor(&paths, &ui);
    }

    let _lock = ArchiveLock::acquire(&paths.lock_file)?;
    let mut engine = SwapEngine::new(paths, NoopPreferences);
    let engine = &mut engine;

    match cli.command {
        Commands::List => commands::list(engine, &ui),
        Commands::Current => commands::current(engine, &ui),
        Commands::Inspect { container } => commands::inspect(engine, &container, &ui),
        Commands::Create { name, description } => {
            commands::create(engine, &name, description, &ui)
        }
        Commands::Use { container } => commands::use_container(engine, &container, &ui),
        Commands::Stash => commands::stash(engine, &ui),
        Commands::Unstash => commands::unstash(engine, &ui),
        Commands::Clone {
            source,
            name,
            description,
        } => commands::clone(engine, &source, &name, description, &ui),
        Commands::Rename { container, name } => commands::rename(engine, &container, &name, &ui),
        Commands::Describe { container, text } => {
            commands::describe(engine, &container, text, &ui)
        }
        Commands::Clean { container, force } => commands::clean(engine, &container, force, &ui),
        Commands::Delete { container, force } => commands::delete(engine, &container, force, &ui),
        Commands::Reset { force } => commands::reset(engine, force, &ui),
        Commands::Doctor | Commands::Completions { .. } => Ok(()),
    }
}
