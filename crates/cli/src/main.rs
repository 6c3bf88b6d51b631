use amdfw_analyser::commands::{
    add_image_command, analyse_command, consume_command, init_workspace_command,
    list_entries_command, list_images_command, list_passes_command, list_rules_command,
    show_image_command, workspace_info_command,
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Content-addressed ingestion of AMD firmware images.
///
/// This CLI is a thin wrapper around `amdfw-core`. All substantive logic lives
/// in the library so it can be tested thoroughly and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "amdfw-analyser",
    version,
    about = "Extract, deduplicate and index AMD firmware components",
    long_about = None
)]
struct Cli {
    /// Log filter (e.g. `warn`, `info`, `amdfw_core=debug`). Logs go to stderr.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new workspace at the given root.
    ///
    /// This will:
    /// - Create a `.amdfw` metadata directory.
    /// - Write `.amdfw/workspace.json`.
    /// - Create the document database and the blob store.
    InitWorkspace {
        /// Workspace root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Optional workspace name. If omitted, the name is derived from the root directory.
        #[arg(long)]
        name: Option<String>,
    },

    /// Show configuration and store counts for an existing workspace.
    WorkspaceInfo {
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Store a firmware image and create its document. Does not analyse it.
    AddImage {
        #[arg(long, default_value = ".")]
        root: String,

        /// Path to the image file.
        #[arg(long)]
        path: String,

        /// Optional human-friendly name. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Run an analysis pass on one or more registered images.
    ///
    /// Exits non-zero if any pass failed.
    Analyse {
        #[arg(long, default_value = ".")]
        root: String,

        /// Image content id; repeat for several images.
        #[arg(long = "id", required = true)]
        ids: Vec<String>,

        /// Emit pass reports as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Run passes for JSON-lines work items (`{"ID": "<image id>"}`).
    Consume {
        #[arg(long, default_value = ".")]
        root: String,

        /// Read work items from this file instead of stdin.
        #[arg(long)]
        file: Option<String>,
    },

    /// Print an image document.
    ShowImage {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        id: String,
    },

    /// List registered images.
    ListImages {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List indexed component entries.
    ListEntries {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List recorded analysis passes.
    ListPasses {
        #[arg(long, default_value = ".")]
        root: String,

        /// Only passes for this image id.
        #[arg(long)]
        image: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List detector rules in effect for the workspace.
    ListRules {
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::InitWorkspace { root, name } => init_workspace_command(&root, name)?,
        Command::WorkspaceInfo { root, json } => workspace_info_command(&root, json)?,
        Command::AddImage { root, path, name } => add_image_command(&root, &path, name)?,
        Command::Analyse { root, ids, json } => analyse_command(&root, &ids, json)?,
        Command::Consume { root, file } => consume_command(&root, file.as_deref())?,
        Command::ShowImage { root, id } => show_image_command(&root, &id)?,
        Command::ListImages { root, json } => list_images_command(&root, json)?,
        Command::ListEntries { root, json } => list_entries_command(&root, json)?,
        Command::ListPasses { root, image, json } => {
            list_passes_command(&root, image.as_deref(), json)?
        }
        Command::ListRules { root, json } => list_rules_command(&root, json)?,
    }

    Ok(())
}
