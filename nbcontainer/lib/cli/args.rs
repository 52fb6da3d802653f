use std::path::PathBuf;

use clap::Parser;

use super::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// `nbcontainer` packages notebook kernels into container images and publishes them
#[derive(Debug, Parser)]
#[command(name = "nbcontainer", author, version, styles=styles::styles())]
pub struct NbContainerArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<NbContainerSubcommand>,

    /// Path to the configuration file
    #[arg(short, long, env = "NBCONTAINER_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

/// Available subcommands
#[derive(Debug, Parser)]
pub enum NbContainerSubcommand {
    /// Run the HTTP and WebSocket server
    #[command(name = "serve")]
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind
        #[arg(long)]
        port: Option<u16>,

        /// URL prefix every route is mounted under
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Manage repositories in the destination registry
    #[command(name = "repo")]
    Repo {
        /// The repository action
        #[command(subcommand)]
        action: RepoSubcommand,
    },
}

/// Repository actions
#[derive(Debug, Parser)]
pub enum RepoSubcommand {
    /// Create a repository
    #[command(name = "create")]
    Create {
        /// Name of the repository
        name: String,
    },

    /// List repositories, one page at a time
    #[command(name = "list")]
    List {
        /// Token printed with the previous page
        #[arg(long)]
        next_token: Option<String>,
    },
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
