//! Template sources, references and cache entries.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

use super::template::validate_template_name;
use crate::domain::DomainError;

/// Where a template came from; recorded so it can be fetched again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceDescriptor {
    Local {
        path: PathBuf,
    },
    Git {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rev: Option<String>,
    },
    Archive {
        url: String,
    },
}

impl SourceDescriptor {
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Local { .. })
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { path } => write!(f, "{}", path.display()),
            Self::Git { url, rev: Some(rev) } => write!(f, "{url}#{rev}"),
            Self::Git { url, rev: None } => f.write_str(url),
            Self::Archive { url } => f.write_str(url),
        }
    }
}

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    /// A template directory on disk.
    Local(PathBuf),
    /// A git repository or archive URL.
    Remote(SourceDescriptor),
    /// A name known to the cache, optionally pinned to a version.
    Cached {
        name: String,
        version: Option<Version>,
    },
}

impl TemplateRef {
    /// Classify a user-supplied identifier.
    ///
    /// | Form                                   | Result          |
    /// |----------------------------------------|-----------------|
    /// | `./x`, `../x`, `/x`, `~/x`, `.`        | `Local`         |
    /// | `git+<url>[#rev]`, `gh:owner/repo[#rev]`, `*.git[#rev]` | `Remote(Git)` |
    /// | `http(s)://….tar.gz` or `….tgz`        | `Remote(Archive)` |
    /// | `name`, `name@version`                 | `Cached`        |
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let s = s.trim();
        let invalid = |reason: &str| DomainError::InvalidTemplateId {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        if s.is_empty() {
            return Err(invalid("empty template reference"));
        }

        if s == "." || s == ".." || ["./", "../", "/", "~"].iter().any(|p| s.starts_with(p)) {
            return Ok(Self::Local(PathBuf::from(s)));
        }

        if let Some(rest) = s.strip_prefix("git+") {
            let (url, rev) = split_rev(rest);
            if url.is_empty() {
                return Err(invalid("missing repository URL after 'git+'"));
            }
            return Ok(Self::Remote(SourceDescriptor::Git { url, rev }));
        }

        if let Some(rest) = s.strip_prefix("gh:") {
            let (repo, rev) = split_rev(rest);
            let mut parts = repo.split('/');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => {
                    let name = name.trim_end_matches(".git");
                    return Ok(Self::Remote(SourceDescriptor::Git {
                        url: format!("https://github.com/{owner}/{name}.git"),
                        rev,
                    }));
                }
                _ => return Err(invalid("expected gh:owner/repo")),
            }
        }

        let (base, rev) = split_rev(s);
        if base.ends_with(".git") && (base.contains("://") || base.starts_with("git@")) {
            return Ok(Self::Remote(SourceDescriptor::Git { url: base, rev }));
        }

        if s.starts_with("http://") || s.starts_with("https://") {
            if s.ends_with(".tar.gz") || s.ends_with(".tgz") {
                return Ok(Self::Remote(SourceDescriptor::Archive { url: s.to_string() }));
            }
            return Err(invalid("URLs must point to a .git repository or a .tar.gz archive"));
        }

        let (name, version) = match s.split_once('@') {
            Some((name, version)) => {
                let version = Version::parse(version)
                    .map_err(|e| invalid(&format!("bad version: {e}")))?;
                (name, Some(version))
            }
            None => (s, None),
        };
        validate_template_name(name)?;
        Ok(Self::Cached {
            name: name.to_string(),
            version,
        })
    }
}

fn split_rev(s: &str) -> (String, Option<String>) {
    match s.split_once('#') {
        Some((url, rev)) if !rev.is_empty() => (url.to_string(), Some(rev.to_string())),
        Some((url, _)) => (url.to_string(), None),
        None => (s.to_string(), None),
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(source) => write!(f, "{source}"),
            Self::Cached {
                name,
                version: Some(v),
            } => write!(f, "{name}@{v}"),
            Self::Cached { name, version: None } => f.write_str(name),
        }
    }
}

/// One cached template version, as recorded in the cache index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub name: String,
    pub version: Version,
    pub path: PathBuf,
    pub fetched_at: DateTime<Utc>,
    pub source: SourceDescriptor,
    /// SHA-256 over the cached tree's relative paths and contents.
    pub content_hash: String,
}
