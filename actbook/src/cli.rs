//! Command-line interface definitions for actbook

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI structure for the actbook application
#[derive(Parser)]
#[command(name = "actbook")]
#[command(version)]
#[command(about = "Builds print-ready PDF books from Markdown acts and chapters", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for actbook
#[derive(Subcommand)]
pub enum Commands {
    /// Build a book from a markdown file, a book directory or stdin
    Build {
        /// Markdown file, directory of "N. Akt" folders, or "-" for stdin
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[command(flatten)]
        options: OutputOptions,
    },

    /// Build a book from a GitHub repository
    Github {
        /// Repository URL (https://github.com/owner/repo[/tree/branch[/path]])
        url: String,

        /// Path inside the repository (overrides the path in the URL)
        #[arg(long)]
        path: Option<String>,

        /// Treat the path as a book directory instead of a single file
        #[arg(long)]
        tree: bool,

        /// GitHub access token
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,

        #[command(flatten)]
        options: OutputOptions,
    },
}

/// Options shared by all build commands
#[derive(Args, Debug, Clone)]
pub struct OutputOptions {
    /// Output PDF file
    #[arg(short, long, default_value = "book.pdf")]
    pub output: PathBuf,

    /// Render configuration file (defaults to actbook.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for downloaded images
    #[arg(long, default_value = "output")]
    pub staging: PathBuf,

    /// Directory that relative image paths are resolved against
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Additional font directory (repeatable)
    #[arg(long = "font-dir", value_name = "DIR")]
    pub font_dirs: Vec<PathBuf>,

    /// Skip table of contents generation
    #[arg(long)]
    pub no_toc: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
