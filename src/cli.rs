use clap::{Parser, Subcommand};

/// Chapterhouse — membership relay for chapter officers
#[derive(Parser)]
#[command(name = "chapterhouse", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Serve {
        /// Port to bind
        #[arg(short, long, default_value = "8088")]
        port: u16,
    },

    /// Mint an access token and print its remaining lifetime (debugging aid)
    Token,

    /// List the static chapter table
    Chapters,
}
