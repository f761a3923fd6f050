//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Search for and download files shared over IRC via XDCC.
#[derive(Parser, Debug)]
#[command(name = "xdcc")]
#[command(author, version, about)]
#[command(after_help = "Exit codes:\n  0 = success\n  1 = argument or input error")]
pub struct Cli {
    /// Increase log verbosity to debug.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Log errors only.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search the public XDCC indexes for files matching keywords.
    Search(SearchArgs),
    /// Download one or more irc:// URLs.
    Get(GetArgs),
}

/// Arguments for `xdcc search`.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Keywords to search for.
    #[arg(value_name = "KEYWORD", required = true)]
    pub keywords: Vec<String>,

    /// Sort results by file name instead of URL.
    #[arg(short = 's', long = "sort-by-name")]
    pub sort_by_name: bool,
}

/// Arguments for `xdcc get`.
#[derive(Args, Debug)]
pub struct GetArgs {
    /// URLs of the form irc://network/channel/bot/slot.
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Output directory for downloaded files.
    #[arg(short = 'o', long = "output-dir", value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// File containing additional URLs, one per line.
    #[arg(short = 'i', long = "input-file", value_name = "FILE")]
    pub input_file: Option<PathBuf>,

    /// Require TLS; never fall back to plain TCP.
    #[arg(long, conflicts_with = "no_ssl")]
    pub ssl_only: bool,

    /// Skip server certificate verification.
    #[arg(long)]
    pub allow_unknown_authority: bool,

    /// Connect without TLS.
    #[arg(long)]
    pub no_ssl: bool,
}
