//! GitHub repositories over the contents API with raw download fallback

use super::{EntryKind, RepoEntry, Repository, RepositoryError};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

const API_BASE: &str = "https://api.github.com";
const RAW_BASE: &str = "https://raw.githubusercontent.com";
const USER_AGENT: &str = concat!("actbook/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Characters left unescaped in a path segment
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Branch used when none is given
pub const DEFAULT_BRANCH: &str = "main";

/// Coordinates of a GitHub repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Personal access token, sent as `Authorization: token ...`
    pub token: Option<String>,
}

impl RepoRef {
    /// Reference to the default branch of `owner/repo`
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: DEFAULT_BRANCH.to_string(),
            token: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Parse a repository URL
    ///
    /// Accepts `https://github.com/owner/repo` and
    /// `https://github.com/owner/repo/tree/branch[/path]`.
    ///
    /// # Returns
    /// * `Some((RepoRef, path))` - The reference and the decoded path inside
    ///   the repository, if the URL names one
    /// * `None` - Not a GitHub repository URL
    pub fn from_url(url: &str) -> Option<(RepoRef, Option<String>)> {
        static URL: OnceLock<Regex> = OnceLock::new();
        let pattern = URL.get_or_init(|| {
            Regex::new(
                r"^https?://(?:www\.)?github\.com/([^/]+)/([^/]+?)(?:\.git)?(?:/tree/([^/]+)(?:/(.+?))?)?/?$",
            )
            .expect("valid repository URL regex")
        });

        let captures = pattern.captures(url.trim())?;
        let mut reference = RepoRef::new(&captures[1], &captures[2]);
        if let Some(branch) = captures.get(3) {
            reference.branch = branch.as_str().to_string();
        }

        let path = captures
            .get(4)
            .map(|p| percent_decode_str(p.as_str()).decode_utf8_lossy().into_owned());

        Some((reference, path))
    }

    /// Contents API URL for a path
    pub fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            API_BASE,
            self.owner,
            self.repo,
            encode_path(path),
            utf8_percent_encode(&self.branch, SEGMENT)
        )
    }

    /// Raw download URL with only spaces escaped
    pub fn raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            RAW_BASE,
            self.owner,
            self.repo,
            self.branch,
            path.trim_matches('/').replace(' ', "%20")
        )
    }

    /// Raw download URL with every path segment fully escaped
    pub fn encoded_raw_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            RAW_BASE,
            self.owner,
            self.repo,
            self.branch,
            encode_path(path)
        )
    }
}

/// Escape each segment of a slash-separated path
fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Item of a contents API directory listing
#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// A GitHub repository accessed over HTTPS
pub struct GitHubRepository {
    reference: RepoRef,
    client: Client,
}

impl GitHubRepository {
    /// Create a client for the given repository
    pub fn new(reference: RepoRef) -> Result<Self, RepositoryError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RepositoryError::Http {
                path: format!("{}/{}", reference.owner, reference.repo),
                source: e,
            })?;

        Ok(Self { reference, client })
    }

    pub fn reference(&self) -> &RepoRef {
        &self.reference
    }

    fn get(&self, url: &str, accept: &str, path: &str) -> Result<Response, RepositoryError> {
        log::debug!("GET {}", url);

        let mut request = self.client.get(url).header("Accept", accept);
        if let Some(token) = &self.reference.token {
            request = request.header("Authorization", format!("token {}", token));
        }

        let response = request.send().map_err(|e| RepositoryError::Http {
            path: path.to_string(),
            source: e,
        })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(RepositoryError::NotFound(path.to_string())),
            status => Err(RepositoryError::UnexpectedResponse {
                path: path.to_string(),
                message: format!("HTTP {}", status),
            }),
        }
    }

    fn fetch_bytes(&self, url: &str, accept: &str, path: &str) -> Result<Vec<u8>, RepositoryError> {
        let response = self.get(url, accept, path)?;
        let bytes = response.bytes().map_err(|e| RepositoryError::Http {
            path: path.to_string(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}

impl Repository for GitHubRepository {
    fn list_directory(&self, path: &str) -> Result<Vec<RepoEntry>, RepositoryError> {
        let url = self.reference.contents_url(path);
        let body = self.get(&url, "application/vnd.github+json", path)?.text().map_err(|e| {
            RepositoryError::Http {
                path: path.to_string(),
                source: e,
            }
        })?;

        let items: Vec<ContentItem> =
            serde_json::from_str(&body).map_err(|e| RepositoryError::UnexpectedResponse {
                path: path.to_string(),
                message: format!("not a directory listing: {}", e),
            })?;

        Ok(items
            .into_iter()
            .map(|item| RepoEntry {
                kind: match item.kind.as_str() {
                    "file" => EntryKind::File,
                    "dir" => EntryKind::Dir,
                    _ => EntryKind::Other,
                },
                name: item.name,
                path: item.path,
            })
            .collect())
    }

    fn download_file(&self, path: &str) -> Result<Vec<u8>, RepositoryError> {
        let attempts = [
            (self.reference.contents_url(path), "application/vnd.github.raw"),
            (self.reference.raw_url(path), "*/*"),
            (self.reference.encoded_raw_url(path), "*/*"),
        ];

        let mut last_error = RepositoryError::NotFound(path.to_string());
        for (url, accept) in attempts {
            match self.fetch_bytes(&url, accept, path) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    log::debug!("Download of {} via {} failed: {}", path, url, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
