//! actbook - PDF books from Markdown acts and chapters
//!
//! Builds a paginated book from a single markdown manuscript, a directory of
//! `N. Akt` folders or a GitHub repository laid out the same way.

#![deny(unsafe_code)]
#![cfg_attr(all(not(debug_assertions), not(test)), deny(clippy::all))]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod cli;

use actbook::{BookError, BookSession, RenderConfig, RepoRef, SessionOptions, CONFIG_FILE_NAME};
use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, OutputOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Main entry point for the actbook CLI application
fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}

/// Run the CLI application
fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { source, options } => handle_build_command(source, options),
        Commands::Github {
            url,
            path,
            tree,
            token,
            options,
        } => handle_github_command(url, path, tree, token, options),
    }
}

/// Handle the build command
fn handle_build_command(source: PathBuf, options: OutputOptions) -> Result<()> {
    init_logging(options.verbose);
    let mut session = BookSession::new(session_options(&options)?);

    let loaded = if source == Path::new("-") {
        let mut markdown = String::new();
        std::io::stdin()
            .read_to_string(&mut markdown)
            .context("Failed to read manuscript from stdin")?;
        session.load_string(&markdown)
    } else if source.is_dir() {
        session.load_directory(&source)
    } else {
        session.load_file(&source)
    };
    loaded.with_context(|| format!("Failed to load {}", source.display()))?;

    write_book(&session, &options.output)
}

/// Handle the github command
fn handle_github_command(
    url: String,
    path: Option<String>,
    tree: bool,
    token: Option<String>,
    options: OutputOptions,
) -> Result<()> {
    init_logging(options.verbose);

    let (reference, url_path) =
        RepoRef::from_url(&url).ok_or_else(|| BookError::InvalidRepositoryUrl(url.clone()))?;
    let reference = reference.with_token(token);
    let path = path.or(url_path).unwrap_or_default();

    let mut session = BookSession::new(session_options(&options)?);

    // Anything but a markdown file is a book directory
    let loaded = if tree || !path.to_lowercase().ends_with(".md") {
        session.load_remote_tree(&reference, &path)
    } else {
        session.load_remote_file(&reference, &path)
    };
    loaded.with_context(|| {
        format!(
            "Failed to load {}/{} '{}'",
            reference.owner, reference.repo, path
        )
    })?;

    write_book(&session, &options.output)
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

/// Session options from the command line and the render configuration file
fn session_options(options: &OutputOptions) -> Result<SessionOptions> {
    let mut config = match &options.config {
        Some(path) => RenderConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None if Path::new(CONFIG_FILE_NAME).is_file() => RenderConfig::load(CONFIG_FILE_NAME)
            .with_context(|| format!("Failed to load configuration {}", CONFIG_FILE_NAME))?,
        None => RenderConfig::default(),
    };

    if options.no_toc {
        config.auto_toc = false;
    }

    Ok(SessionOptions {
        config,
        staging_dir: options.staging.clone(),
        base_dir: options.base_dir.clone(),
        font_dirs: options.font_dirs.clone(),
    })
}

fn write_book(session: &BookSession, output: &Path) -> Result<()> {
    if let Some(info) = session.info() {
        println!("Building \"{}\"...", info.title);
    }

    session
        .generate(output)
        .with_context(|| format!("Failed to export PDF to {}", output.display()))?;

    println!("✓ Successfully wrote: {}", output.display());
    Ok(())
}
