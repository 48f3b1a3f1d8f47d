use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::FileConfig;
use crate::dispatch::AttachmentFormat;

#[derive(Parser)]
#[command(name = "sheetdesk")]
#[command(about = "Chat bot that searches and edits a shared spreadsheet", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the webhook listener.
    Serve {
        #[command(flatten)]
        common: CommonArgs,
        /// Bind address (env: BIND, default 0.0.0.0)
        #[arg(long)]
        bind: Option<String>,
        /// Bind port (env: PORT, default 3000)
        #[arg(long)]
        port: Option<u16>,
        /// Replies longer than this many characters become attachments (env: INLINE_LIMIT)
        #[arg(long)]
        inline_limit: Option<usize>,
        /// Maximum characters per chat message (env: CHUNK_LIMIT)
        #[arg(long)]
        chunk_limit: Option<usize>,
        /// Attachment format for long replies: txt or csv (env: ATTACHMENT_FORMAT)
        #[arg(long, value_parser = parse_attachment_format)]
        attachment_format: Option<AttachmentFormat>,
    },

    /// Run one command line against the spreadsheet and print the reply.
    /// Nothing is posted to chat; updates are still written.
    Exec {
        #[command(flatten)]
        common: CommonArgs,
        /// Command text as it would follow the mention, e.g. "search Jobs"
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

#[derive(Args)]
pub(crate) struct CommonArgs {
    /// JSON settings file; missing files are ignored
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,
    /// Spreadsheet id (env: GOOGLE_SHEET_FILE_ID)
    #[arg(long)]
    pub(crate) sheet_id: Option<String>,
    /// Header rows above the data, 1 or 2 (env: SHEET_HEADER_ROWS)
    #[arg(long)]
    pub(crate) header_rows: Option<usize>,
    /// Match keywords ignoring case (env: SEARCH_CASE_SENSITIVE=false)
    #[arg(long)]
    pub(crate) ignore_case: bool,
}

impl CommonArgs {
    pub(crate) fn overrides(&self) -> FileConfig {
        FileConfig {
            sheet_file_id: self.sheet_id.clone(),
            header_rows: self.header_rows,
            search_case_sensitive: self.ignore_case.then_some(false),
            ..FileConfig::default()
        }
    }
}

fn parse_attachment_format(value: &str) -> Result<AttachmentFormat, String> {
    AttachmentFormat::parse(value).ok_or_else(|| format!("unknown attachment format: {value} (txt or csv)"))
}
