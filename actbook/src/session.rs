//! Book generation sessions
//!
//! A [`BookSession`] owns one loaded manuscript and its final render
//! configuration. Each load entry point parses the manuscript, layers the
//! metadata over it and decides once whether the book is assembled from the
//! document tree or from the flat stream.

use crate::assembler::Assembler;
use crate::book_model::{parse, BookInfo, Manuscript};
use crate::config::RenderConfig;
use crate::error::BookError;
use crate::fetcher::TreeFetcher;
use crate::images::{ImageResolver, STAGING_DIR_NAME};
use crate::metadata::{fill_defaults, load_sidecar, BookMetadata};
use crate::render::RenderTarget;
use crate::repository::{
    base_name, join_path, GitHubRepository, LocalRepository, RepoRef, Repository,
    RepositoryError,
};
use crate::typst_target::TypstTarget;
use std::fs;
use std::path::{Path, PathBuf};

/// Settings that apply to every book of a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Render configuration before any sidecar is applied
    pub config: RenderConfig,

    /// Directory for downloaded assets
    pub staging_dir: PathBuf,

    /// Directory that relative image paths are resolved against; defaults to
    /// the directory of the loaded book
    pub base_dir: Option<PathBuf>,

    /// Additional font directories
    pub font_dirs: Vec<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            config: RenderConfig::default(),
            staging_dir: PathBuf::from(STAGING_DIR_NAME),
            base_dir: None,
            font_dirs: Vec::new(),
        }
    }
}

/// Outcome of [`BookSession::generate_report`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub success: bool,
    pub message: String,
    /// Written file, when generation succeeded
    pub output: Option<PathBuf>,
}

/// One book, from loading to the generated PDF
pub struct BookSession {
    options: SessionOptions,
    manuscript: Option<Manuscript>,
    config: RenderConfig,
    base_dir: PathBuf,
}

impl BookSession {
    pub fn new(options: SessionOptions) -> Self {
        let config = options.config.clone();
        Self {
            options,
            manuscript: None,
            config,
            base_dir: PathBuf::from("."),
        }
    }

    /// The loaded manuscript, if any
    pub fn manuscript(&self) -> Option<&Manuscript> {
        self.manuscript.as_ref()
    }

    /// Front matter of the loaded book
    pub fn info(&self) -> Option<&BookInfo> {
        self.manuscript.as_ref().map(Manuscript::info)
    }

    /// Render configuration after all metadata layers
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Load a markdown manuscript file
    ///
    /// A metadata sidecar next to the file is applied.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), BookError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BookError::InputNotFound(path.display().to_string()));
        }

        let markdown = fs::read_to_string(path)?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let fallback_title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let sidecar = load_sidecar(&LocalRepository::new(&dir), "");
        log::info!("Loading {}", path.display());
        self.install(markdown, &fallback_title, sidecar.into_iter().collect(), dir)
    }

    /// Load a manuscript from a string
    pub fn load_string(&mut self, markdown: &str) -> Result<(), BookError> {
        let dir = self.options.base_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        self.install(markdown.to_string(), "", Vec::new(), dir)
    }

    /// Load a book directory of `N. Akt` directories with chapter files
    pub fn load_directory<P: AsRef<Path>>(&mut self, path: P) -> Result<(), BookError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(BookError::InputNotFound(path.display().to_string()));
        }

        let fallback_title = fs::canonicalize(path)
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_default();

        log::info!("Loading book directory {}", path.display());
        let repository = LocalRepository::new(path);
        self.load_tree(&repository, "", &fallback_title, Vec::new(), path.to_path_buf())
    }

    /// Load a single markdown file from a GitHub repository
    ///
    /// A metadata sidecar in the file's directory is applied.
    pub fn load_remote_file(&mut self, reference: &RepoRef, path: &str) -> Result<(), BookError> {
        let repository = GitHubRepository::new(reference.clone())
            .map_err(|e| BookError::from_repository(&reference.repo, e))?;

        let bytes = repository
            .download_file(path)
            .map_err(|e| BookError::from_repository(path, e))?;
        let markdown = String::from_utf8_lossy(&bytes).into_owned();

        let dir = path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
        let fallback_title = Path::new(base_name(path))
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| reference.repo.clone());

        let mut layers = self.local_layers();
        layers.extend(load_sidecar(&repository, dir));

        log::info!("Loaded {}/{}:{}", reference.owner, reference.repo, path);
        let base_dir = self.default_base_dir();
        self.install(markdown, &fallback_title, layers, base_dir)
    }

    /// Load a book directory tree from a GitHub repository
    pub fn load_remote_tree(&mut self, reference: &RepoRef, base_path: &str) -> Result<(), BookError> {
        let repository = GitHubRepository::new(reference.clone())
            .map_err(|e| BookError::from_repository(&reference.repo, e))?;

        let fallback_title = if base_path.trim_matches('/').is_empty() {
            reference.repo.clone()
        } else {
            base_name(base_path).to_string()
        };

        log::info!(
            "Loading {}/{} ({}) from '{}'",
            reference.owner,
            reference.repo,
            reference.branch,
            base_path
        );
        let layers = self.local_layers();
        let base_dir = self.default_base_dir();
        self.load_tree(&repository, base_path, &fallback_title, layers, base_dir)
    }

    /// Sidecar of the configured base directory, for remote loads
    fn local_layers(&self) -> Vec<BookMetadata> {
        self.options
            .base_dir
            .as_ref()
            .and_then(|dir| load_sidecar(&LocalRepository::new(dir), ""))
            .into_iter()
            .collect()
    }

    fn default_base_dir(&self) -> PathBuf {
        self.options
            .base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn load_tree(
        &mut self,
        repository: &dyn Repository,
        base_path: &str,
        fallback_title: &str,
        mut layers: Vec<BookMetadata>,
        book_dir: PathBuf,
    ) -> Result<(), BookError> {
        if let Some(mut sidecar) = load_sidecar(repository, base_path) {
            if let Some(cover) = sidecar.cover_image.take() {
                sidecar.cover_image = Some(self.stage_cover(repository, base_path, &cover));
            }
            layers.push(sidecar);
        }

        let mut header = BookInfo::default();
        fill_defaults(&mut header, fallback_title);
        for layer in &layers {
            layer.apply_to(&mut header);
        }

        let stream = TreeFetcher::new(repository, &self.options.staging_dir).fetch(base_path, &header)?;
        let base_dir = self.options.base_dir.clone().unwrap_or(book_dir);
        self.install(stream, fallback_title, layers, base_dir)
    }

    /// Copy a cover image named in a sidecar into the staging directory
    ///
    /// Returns the path to use for the cover; a cover that cannot be copied
    /// keeps its declared path.
    fn stage_cover(&self, repository: &dyn Repository, base_path: &str, cover: &str) -> String {
        if cover.is_empty() || cover.starts_with("http") || Path::new(cover).is_absolute() {
            return cover.to_string();
        }

        let source = join_path(base_path, cover);
        let target = self.options.staging_dir.join(base_name(cover));
        let staged = repository.download_file(&source).and_then(|bytes| {
            fs::create_dir_all(&self.options.staging_dir)
                .and_then(|_| fs::write(&target, bytes))
                .map_err(|e| RepositoryError::Io {
                    path: target.clone(),
                    source: e,
                })
        });

        match staged {
            Ok(()) => target.to_string_lossy().into_owned(),
            Err(e) => {
                log::warn!("Cover image {} not available: {}", source, e);
                cover.to_string()
            }
        }
    }

    /// Parse, layer metadata and keep the manuscript
    fn install(
        &mut self,
        stream: String,
        fallback_title: &str,
        layers: Vec<BookMetadata>,
        base_dir: PathBuf,
    ) -> Result<(), BookError> {
        let mut tree = parse(&stream)?;
        if tree.acts.is_empty() {
            return Err(BookError::EmptyDocument);
        }

        fill_defaults(&mut tree.info, fallback_title);
        let mut config = self.options.config.clone();
        for layer in &layers {
            layer.apply_to(&mut tree.info);
            config = config.merged(layer);
        }

        log::info!(
            "Loaded '{}': {} acts, {} chapters",
            tree.info.title,
            tree.acts.len(),
            tree.chapter_count()
        );

        self.config = config;
        self.base_dir = base_dir;
        self.manuscript = Some(Manuscript::from_tree(tree, stream));
        Ok(())
    }

    /// Issue the render commands of the loaded book into `target`
    pub fn assemble_into(&self, target: &mut dyn RenderTarget) -> Result<(), BookError> {
        let manuscript = self.manuscript.as_ref().ok_or(BookError::NothingLoaded)?;
        let images = ImageResolver::new(&self.base_dir, &self.options.staging_dir);
        Assembler::new(&self.config, &images).assemble(manuscript, target)
    }

    /// Generate the PDF at `output`
    pub fn generate<P: AsRef<Path>>(&self, output: P) -> Result<(), BookError> {
        let info = self.info().ok_or(BookError::NothingLoaded)?;

        let mut target = TypstTarget::new(&self.config, &info.language, self.options.font_dirs.clone());
        self.assemble_into(&mut target)?;
        target.finish(output.as_ref())?;
        Ok(())
    }

    /// Generate the PDF and report the outcome instead of failing
    pub fn generate_report<P: AsRef<Path>>(&self, output: P) -> GenerationReport {
        let output = output.as_ref();
        match self.generate(output) {
            Ok(()) => GenerationReport {
                success: true,
                message: format!("Book written to {}", output.display()),
                output: Some(output.to_path_buf()),
            },
            Err(e) => {
                log::error!("Generation failed: {}", e);
                GenerationReport {
                    success: false,
                    message: e.to_string(),
                    output: None,
                }
            }
        }
    }
}
