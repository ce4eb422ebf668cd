// quickslot CLI - offline inspection and administration of hotbar documents

mod exit_codes;
mod logging;
mod slot_ops;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use quickslot_config::Settings;
use quickslot_core::{ContainerKind, OwnerHandle, SlotKey};
use quickslot_engine::StoreError;
use quickslot_io::BackendKind;

use exit_codes::{store_exit_code, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "qslot")]
#[command(about = "Inspect, migrate, and administer persisted hotbar documents")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Owning entity id (omit for the global hotbar)
    #[arg(long, global = true, env = "QSLOT_OWNER")]
    owner: Option<String>,

    /// Storage backend (json or sqlite); overrides store.backend
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Data directory; overrides store.dataDir
    #[arg(long, global = true, env = "QSLOT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Settings file (default: <config dir>/quickslot/settings.json)
    #[arg(long, global = true, env = "QSLOT_CONFIG")]
    config: Option<PathBuf>,

    /// Machine-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every occupied cell, nested ones included
    Show,

    /// Load (and so upgrade) stored documents to the current schema
    #[command(after_help = "\
Examples:
  qslot migrate --owner Actor.abc
  qslot migrate --all")]
    Migrate {
        /// Every owner with a stored document, not just --owner
        #[arg(long)]
        all: bool,
    },

    /// Locate the cell holding a reference id
    Find {
        reference_id: String,
    },

    /// Place a reference into a top-level cell
    #[command(after_help = "\
Examples:
  qslot put hotbar 0 2-0 Item.bow --name Bow
  qslot put weapon-set 1 0-0 Item.sword --owner Actor.abc")]
    Put {
        container: ContainerArg,
        index: usize,
        /// Slot key, "col-row"
        slot: SlotKey,
        reference_id: String,
        /// Display name (defaults to the reference id)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "")]
        img: String,
    },

    /// Empty a top-level cell
    Remove {
        container: ContainerArg,
        index: usize,
        slot: SlotKey,
    },

    /// Empty every container; views and the active set survive
    Clear,

    /// Make an exclusive set the active one
    SetActiveSet {
        index: usize,
    },

    /// Manage named hotbar views
    #[command(subcommand)]
    Views(ViewCommands),
}

#[derive(Subcommand)]
enum ViewCommands {
    List,
    /// Create a view with an empty hotbar and switch to it
    Create {
        name: String,
        #[arg(long)]
        icon: Option<String>,
    },
    Delete {
        id: String,
    },
    Switch {
        id: String,
    },
    Rename {
        id: String,
        name: String,
        #[arg(long)]
        icon: Option<String>,
    },
    /// Copy a view, hotbar included
    Duplicate {
        id: String,
    },
}

/// Top-level containers addressable from the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ContainerArg {
    Hotbar,
    WeaponSet,
    QuickAccess,
}

impl From<ContainerArg> for ContainerKind {
    fn from(arg: ContainerArg) -> Self {
        match arg {
            ContainerArg::Hotbar => ContainerKind::Hotbar,
            ContainerArg::WeaponSet => ContainerKind::WeaponSet,
            ContainerArg::QuickAccess => ContainerKind::QuickAccess,
        }
    }
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("QSLOT_COMMIT"), ")",
        "\nengine:  quickslot-engine ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(logging::Verbosity::from_flags(cli.verbose, cli.quiet));

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    let kind = match cli.backend {
        Some(kind) => kind,
        None => settings
            .backend
            .parse::<BackendKind>()
            .map_err(|e| CliError::args(e).with_hint("fix store.backend in settings.json"))?,
    };
    let data_dir = cli.data_dir.clone().unwrap_or_else(|| settings.data_dir());
    let backend = quickslot_io::open_backend(kind, &data_dir)?;
    let owner = match cli.owner {
        Some(id) if !id.trim().is_empty() => OwnerHandle::entity(id.trim()),
        _ => OwnerHandle::Global,
    };
    log::debug!("[Store] {} backend at {}, owner {}", kind, data_dir.display(), owner);

    let ctx = slot_ops::Context { options: settings.store_options(), backend, owner, json: cli.json };

    match cli.command {
        Commands::Show => slot_ops::cmd_show(&ctx),
        Commands::Migrate { all } => slot_ops::cmd_migrate(&ctx, all),
        Commands::Find { reference_id } => slot_ops::cmd_find(&ctx, &reference_id),
        Commands::Put { container, index, slot, reference_id, name, img } => {
            slot_ops::cmd_put(&ctx, container.into(), index, slot, &reference_id, name, &img)
        }
        Commands::Remove { container, index, slot } => slot_ops::cmd_remove(&ctx, container.into(), index, slot),
        Commands::Clear => slot_ops::cmd_clear(&ctx),
        Commands::SetActiveSet { index } => slot_ops::cmd_set_active_set(&ctx, index),
        Commands::Views(view_cmd) => match view_cmd {
            ViewCommands::List => slot_ops::cmd_views_list(&ctx),
            ViewCommands::Create { name, icon } => slot_ops::cmd_views_create(&ctx, &name, icon.as_deref()),
            ViewCommands::Delete { id } => slot_ops::cmd_views_delete(&ctx, &id),
            ViewCommands::Switch { id } => slot_ops::cmd_views_switch(&ctx, &id),
            ViewCommands::Rename { id, name, icon } => {
                slot_ops::cmd_views_rename(&ctx, &id, &name, icon.as_deref())
            }
            ViewCommands::Duplicate { id } => slot_ops::cmd_views_duplicate(&ctx, &id),
        },
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self::new(EXIT_ERROR, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        let hint = match &err {
            StoreError::Serialize(_) => Some("a stored document is damaged; inspect it or remove it".to_string()),
            StoreError::Io(_) => Some("check --data-dir and its permissions".to_string()),
            StoreError::Backend(_) => None,
        };
        Self { code: store_exit_code(&err), message: err.to_string(), hint }
    }
}
