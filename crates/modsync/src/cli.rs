use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "modsync", version)]
#[command(about = "Keep a modpack directory in sync with published updates", long_about = None)]
pub struct Cli {
    /// Repository updates are published to, as owner/name
    #[arg(long, global = true)]
    pub repo: Option<String>,

    /// Keep settings, cache and logs under this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Print informational messages to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Show what an update would change without touching the modpack
    Check {
        /// Update code of the published bundle
        uuid: String,
        /// Modpack directory (defaults to the configured one)
        #[arg(long)]
        target: Option<PathBuf>,
    },

    /// Download an update and apply it to the modpack
    Install {
        /// Update code of the published bundle
        uuid: String,
        /// Modpack directory (defaults to the configured one)
        #[arg(long)]
        target: Option<PathBuf>,
    },

    /// Upload a manifest and the config files it lists as a new update
    Publish {
        /// Manifest JSON file to upload
        #[arg(required_unless_present = "instance", conflicts_with = "instance")]
        manifest: Option<PathBuf>,
        /// Build the manifest from a CurseForge minecraftinstance.json instead
        #[arg(long, value_name = "FILE")]
        instance: Option<PathBuf>,
        /// Directory config file paths are relative to (defaults to the
        /// manifest's directory)
        #[arg(long, value_name = "DIR")]
        config_root: Option<PathBuf>,
        /// Update code to publish under (a new one is generated otherwise)
        #[arg(long)]
        uuid: Option<String>,
        /// GitHub token with contents write access (or MODSYNC_GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,
    },

    /// Save the default repository, modpack directory and logging choice
    Configure {
        #[arg(long)]
        target: Option<PathBuf>,
        #[arg(long)]
        debug_logging: Option<bool>,
    },

    /// Remove every cached bundle from memory and disk
    ClearCache,

    /// Print bundle cache statistics
    CacheStats,
}
