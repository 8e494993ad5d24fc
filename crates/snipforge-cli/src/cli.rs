use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    author = "jsward01",
    version = env!("CARGO_PKG_VERSION"),
    about = "snipforge - A text expansion engine",
    long_about = "snipforge watches what you type and replaces trigger words with snippets \
                  that can hold dates, clipboard data, prompted fields and calculations."
)]
pub struct SnipForge {
    #[clap(subcommand)]
    pub commands: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new snippet
    Add {
        #[clap(long, short = 't', help = "Trigger that expands the snippet, e.g. :sig")]
        trigger: String,

        #[clap(long, short = 'c', help = "Snippet content, may contain {{placeholders}}")]
        content: String,

        #[clap(long, short = 'd', help = "Optional description")]
        description: Option<String>,

        #[clap(long, help = "Treat the content as a JSON list of typed segments")]
        segments: bool,
    },
    /// Delete a snippet by trigger
    Delete {
        #[clap(long, short = 't', help = "Trigger of the snippet to delete")]
        trigger: String,
    },
    /// Update an existing snippet by trigger
    Update {
        #[clap(long, short = 't', help = "Trigger of the snippet to update")]
        trigger: String,

        #[clap(long, short = 'c', help = "New snippet content")]
        content: String,

        #[clap(long, help = "Treat the content as a JSON list of typed segments")]
        segments: bool,
    },
    /// List all snippets
    List,
    /// Export all snippets to a JSON file
    Export {
        #[clap(help = "Output file (default: snipforge_snippets_<timestamp>.json)")]
        path: Option<PathBuf>,
    },
    /// Import snippets from a JSON file
    Import {
        #[clap(help = "File produced by export, or a plain list of snippets")]
        path: PathBuf,

        #[clap(long, help = "Replace all existing snippets instead of merging")]
        replace: bool,
    },
    /// Resolve a snippet and print the result without typing it
    Expand {
        #[clap(help = "Trigger to expand")]
        trigger: String,
    },
    /// Evaluate a calc expression
    Calc {
        #[clap(help = "Expression, e.g. \"round(7/2) * 3\"")]
        expression: String,
    },
    /// Start the expansion daemon
    Start,
    /// Stop the expansion daemon
    Stop,
    /// Check the status of the expansion daemon
    Status,
    // Hidden command used internally to run the daemon worker
    #[clap(hide = true)]
    DaemonWorker,
}
