use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use smartnotes_core::ToggleField;

#[derive(Parser)]
#[command(name = "smartnotes")]
#[command(about = "Offline-first notes from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to the local note cache
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the client config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Quick capture: smartnotes "my note title"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add(AddArgs),
    /// List notes, pinned first
    #[command(alias = "ls")]
    List(ListArgs),
    /// Show a single note
    Show {
        /// Local id, server id or unique id prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note (opens $EDITOR when no field is given)
    Edit(EditArgs),
    /// Delete a note
    #[command(alias = "rm")]
    Delete {
        /// Local id, server id or unique id prefix
        id: String,
    },
    /// Flip a note flag
    Toggle {
        #[arg(value_enum)]
        field: FlagArg,
        /// Local id, server id or unique id prefix
        id: String,
    },
    /// Push pending changes and refresh from the server
    Sync,
    /// List notes the server rejected
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decide what to do with a conflicted note
    Resolve {
        /// Local id or unique id prefix
        id: String,
        /// Send the note again as a new server note
        #[arg(long, conflicts_with = "discard", required_unless_present = "discard")]
        resubmit: bool,
        /// Drop the local copy
        #[arg(long)]
        discard: bool,
    },
    /// Sign in, register or inspect the stored session
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Manage the client config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Keep syncing in the foreground and print reminders as they fall due
    Watch,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct AddArgs {
    /// Note title
    pub title: Vec<String>,
    /// Note body (read from stdin when piped and omitted)
    #[arg(short, long)]
    pub content: Option<String>,
    /// Tag to attach; repeatable
    #[arg(short, long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
    /// Reminder time, e.g. 2026-03-01T09:30
    #[arg(long, value_name = "WHEN")]
    pub remind: Option<String>,
    #[arg(long)]
    pub pin: bool,
    #[arg(long)]
    pub favorite: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Number of notes to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
    /// Filter notes by tag name
    #[arg(long)]
    pub tag: Option<String>,
    /// Case-insensitive text search over title, content and tags
    #[arg(short, long)]
    pub search: Option<String>,
    /// Include archived notes
    #[arg(long, conflicts_with = "archived_only")]
    pub archived: bool,
    /// Only archived notes
    #[arg(long)]
    pub archived_only: bool,
    #[arg(long)]
    pub pinned: bool,
    #[arg(long)]
    pub favorites: bool,
    /// Only notes created on this day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub created_on: Option<String>,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct EditArgs {
    /// Local id, server id or unique id prefix
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(short, long)]
    pub content: Option<String>,
    /// Replace the tag list; repeatable
    #[arg(short, long = "tag", value_name = "TAG")]
    pub tags: Option<Vec<String>>,
    /// New reminder time
    #[arg(long, value_name = "WHEN", conflicts_with = "clear_reminder")]
    pub remind: Option<String>,
    #[arg(long)]
    pub clear_reminder: bool,
}

impl EditArgs {
    pub const fn has_fields(&self) -> bool {
        self.title.is_some()
            || self.content.is_some()
            || self.tags.is_some()
            || self.remind.is_some()
            || self.clear_reminder
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum FlagArg {
    Pin,
    Favorite,
    Archive,
    Lock,
}

impl From<FlagArg> for ToggleField {
    fn from(flag: FlagArg) -> Self {
        match flag {
            FlagArg::Pin => Self::Pinned,
            FlagArg::Favorite => Self::Favorite,
            FlagArg::Archive => Self::Archived,
            FlagArg::Lock => Self::Locked,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Create or update the config file
    Init {
        /// Server origin, e.g. https://notes.example.com
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Seconds between background sync passes
        #[arg(long, value_name = "SECS")]
        sync_interval: Option<u64>,
        /// Per-request timeout in seconds
        #[arg(long, value_name = "SECS")]
        request_timeout: Option<u64>,
    },
    /// Print the effective config
    Show,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in and store the session in the OS keychain
    Login {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Create an account on the server
    Register {
        #[arg(long, value_name = "NAME")]
        username: String,
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Show the stored session
    Status,
    /// Forget the stored session
    Logout,
}
