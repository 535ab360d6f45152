//! Disk cache of template versions with remote sync.
//!
//! Layout under the cache root:
//!
//! ```text
//! <root>/index.json             every cached version (CacheEntry list)
//! <root>/<name>/<version>/      one template tree per version
//! <root>/.staging-<uuid>/       in-flight fetches, removed on drop
//! ```
//!
//! Cached versions are immutable unless `refresh` replaces one whose
//! source now serves different content under the same version.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
};

use chrono::Utc;
use semver::Version;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use kiln_core::{
    application::{
        ApplicationError,
        ports::{ResolvedTemplate, TemplateStore},
    },
    domain::{CacheEntry, SourceDescriptor, Template, TemplateId, TemplateRef, TemplateSummary},
    error::{KilnError, KilnResult},
};

use crate::fetch::{Fetcher, RetryPolicy, SourceFetcher, copy_tree, template_root};
use crate::template_loader::TemplateLoader;

pub const INDEX_FILE: &str = "index.json";
const INDEX_FORMAT: u32 = 1;
const STAGING_PREFIX: &str = ".staging-";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cache index {path} is corrupt: {source}")]
    CorruptIndex {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cache index {path} has format {found}, expected {INDEX_FORMAT}")]
    UnsupportedFormat { path: PathBuf, found: u32 },
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<CacheError> for KilnError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Io { path, source } => ApplicationError::FilesystemError {
                path,
                reason: source.to_string(),
            }
            .into(),
            other => KilnError::Configuration {
                message: format!("{other}; delete the file to rebuild the cache"),
            },
        }
    }
}

/// Template store backed by a cache directory.
///
/// Resolution:
/// - `Local`: loaded live; the version is snapshotted into the cache on
///   first use so later updates can re-render it. Once a snapshot exists,
///   edits under the same version are ignored with a warning and the
///   snapshot is rendered.
/// - `Cached`: newest (or the pinned) version from the index.
/// - `Remote`: served from the cache when the source already has an
///   entry, otherwise fetched with retries and installed.
///
/// Installs of one template name are serialised; different names proceed
/// concurrently.
pub struct CacheStore {
    root: PathBuf,
    loader: TemplateLoader,
    fetcher: Box<dyn Fetcher>,
    retry: RetryPolicy,
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    index_lock: Mutex<()>,
    loaded: RwLock<HashMap<PathBuf, ResolvedTemplate>>,
}

impl CacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            loader: TemplateLoader::new(),
            fetcher: Box::new(SourceFetcher::new()),
            retry: RetryPolicy::default(),
            name_locks: Mutex::new(HashMap::new()),
            index_lock: Mutex::new(()),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_fetcher(mut self, fetcher: Box<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every index entry, sorted by name then version.
    pub fn entries(&self) -> KilnResult<Vec<CacheEntry>> {
        Ok(self.read_index()?.entries)
    }

    // ------ Resolution ------

    #[instrument(skip_all, fields(path = %path.display()))]
    fn resolve_local(&self, path: &Path, reference: &TemplateRef) -> KilnResult<ResolvedTemplate> {
        let unknown = || -> KilnError {
            ApplicationError::UnknownTemplate {
                reference: reference.to_string(),
            }
            .into()
        };
        let dir = expand_home(path).canonicalize().map_err(|_| unknown())?;
        if !dir.is_dir() {
            return Err(unknown());
        }

        let source = SourceDescriptor::Local { path: dir.clone() };
        let loaded = self.loader.load(&dir, source.clone())?;
        let id = loaded.template.id.clone();
        let mut warnings = loaded.warnings;
        let hash = tree_hash(&dir)?;

        let lock = self.name_lock(id.name())?;
        let _guard = lock.lock().map_err(|_| ApplicationError::StoreLockError)?;
        match self.read_index()?.get(&id).cloned() {
            Some(entry) if entry.content_hash == hash => {}
            Some(entry) => {
                warn!(template = %id, "Local template differs from its cached snapshot");
                warnings.push(format!(
                    "{} differs from the cached snapshot of {id}; rendering the snapshot, \
                     bump the version to use the new content",
                    dir.display()
                ));
                let mut resolved = self.load_entry(&entry)?;
                resolved.warnings.extend(warnings);
                return Ok(resolved);
            }
            None => {
                let staging = StagingDir::new(&self.root)?;
                copy_tree(&dir, staging.path())?;
                self.install(staging.path(), &id, source)?;
                info!(template = %id, "Snapshotted local template into the cache");
            }
        }

        Ok(ResolvedTemplate {
            template: Arc::new(loaded.template),
            warnings,
        })
    }

    #[instrument(skip_all, fields(source = %source))]
    fn resolve_remote(&self, source: &SourceDescriptor) -> KilnResult<ResolvedTemplate> {
        if let Some(entry) = self.read_index()?.newest_from(source).cloned() {
            debug!(template = %entry.name, version = %entry.version, "Served from cache");
            return self.load_entry(&entry);
        }

        let staging = self.fetch_with_retries(source)?;
        let tree = template_root(staging.path())?;
        let fetched = self.loader.load(&tree, source.clone())?;
        let id = fetched.template.id.clone();

        let lock = self.name_lock(id.name())?;
        let _guard = lock.lock().map_err(|_| ApplicationError::StoreLockError)?;
        let mut warnings = Vec::new();
        let entry = match self.read_index()?.get(&id).cloned() {
            Some(existing) => {
                if existing.content_hash != tree_hash(&tree)? {
                    warn!(template = %id, "Fetched content differs from the cached copy");
                    warnings.push(format!(
                        "{source} serves {id} with different content than the cached copy \
                         from {}; the cached copy is used",
                        existing.source
                    ));
                }
                existing
            }
            None => {
                let entry = self.install(&tree, &id, source.clone())?;
                info!(template = %id, "Fetched and cached");
                entry
            }
        };

        let mut resolved = self.load_entry(&entry)?;
        resolved.warnings.extend(fetched.warnings);
        resolved.warnings.extend(warnings);
        Ok(resolved)
    }

    fn resolve_cached(
        &self,
        name: &str,
        version: Option<&Version>,
        reference: &TemplateRef,
    ) -> KilnResult<ResolvedTemplate> {
        let entry = self
            .read_index()?
            .newest(name, version)
            .cloned()
            .ok_or_else(|| ApplicationError::UnknownTemplate {
                reference: reference.to_string(),
            })?;
        self.load_entry(&entry)
    }

    fn load_entry(&self, entry: &CacheEntry) -> KilnResult<ResolvedTemplate> {
        let path = self.root.join(&entry.path);
        if let Some(hit) = self
            .loaded
            .read()
            .map_err(|_| ApplicationError::StoreLockError)?
            .get(&path)
        {
            return Ok(hit.clone());
        }

        let loaded = self.loader.load(&path, entry.source.clone())?;
        let resolved = ResolvedTemplate {
            template: Arc::new(loaded.template),
            warnings: loaded.warnings,
        };
        self.loaded
            .write()
            .map_err(|_| ApplicationError::StoreLockError)?
            .insert(path, resolved.clone());
        Ok(resolved)
    }

    // ------ Fetching and installing ------

    fn fetch_with_retries(&self, source: &SourceDescriptor) -> KilnResult<StagingDir> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let staging = StagingDir::new(&self.root)?;
            match self.fetcher.fetch(source, staging.path()) {
                Ok(()) => return Ok(staging),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(%source, attempt, error = %e, ?delay, "Fetch failed, retrying");
                    drop(staging);
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Move `tree` to `<root>/<name>/<version>` and record it in the index,
    /// replacing any previous copy. The caller holds the name lock.
    fn install(&self, tree: &Path, id: &TemplateId, source: SourceDescriptor) -> KilnResult<CacheEntry> {
        let rel = PathBuf::from(id.name()).join(id.version().to_string());
        let dest = self.root.join(&rel);
        let content_hash = tree_hash(tree)?;

        if dest.exists() {
            fs::remove_dir_all(&dest).map_err(|e| CacheError::io(&dest, e))?;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        fs::rename(tree, &dest).map_err(|e| CacheError::io(tree, e))?;
        self.loaded
            .write()
            .map_err(|_| ApplicationError::StoreLockError)?
            .remove(&dest);

        let entry = CacheEntry {
            name: id.name().to_string(),
            version: id.version().clone(),
            path: rel,
            fetched_at: Utc::now(),
            source,
            content_hash,
        };
        self.update_index(|index| index.upsert(entry.clone()))?;
        Ok(entry)
    }

    /// Copy or fetch `source` into a fresh staging directory.
    fn acquire(&self, source: &SourceDescriptor) -> KilnResult<StagingDir> {
        match source {
            SourceDescriptor::Local { path } => {
                let staging = StagingDir::new(&self.root)?;
                if !path.is_dir() {
                    return Err(ApplicationError::SourceUnavailable {
                        source_desc: source.to_string(),
                        reason: "directory no longer exists".into(),
                    }
                    .into());
                }
                copy_tree(path, staging.path())?;
                Ok(staging)
            }
            remote => self.fetch_with_retries(remote),
        }
    }

    fn name_lock(&self, name: &str) -> KilnResult<Arc<Mutex<()>>> {
        let mut locks = self
            .name_locks
            .lock()
            .map_err(|_| ApplicationError::StoreLockError)?;
        Ok(Arc::clone(locks.entry(name.to_string()).or_default()))
    }

    // ------ Index ------

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn read_index(&self) -> Result<CacheIndex, CacheError> {
        let path = self.index_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CacheIndex::default()),
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        let index: CacheIndex = serde_json::from_str(&text).map_err(|source| {
            CacheError::CorruptIndex {
                path: path.clone(),
                source,
            }
        })?;
        if index.format != INDEX_FORMAT {
            return Err(CacheError::UnsupportedFormat {
                path,
                found: index.format,
            });
        }
        Ok(index)
    }

    /// Read-modify-write the index; the new file replaces the old one by
    /// rename.
    fn update_index(&self, change: impl FnOnce(&mut CacheIndex)) -> KilnResult<()> {
        let _guard = self
            .index_lock
            .lock()
            .map_err(|_| ApplicationError::StoreLockError)?;
        let mut index = self.read_index()?;
        change(&mut index);
        index.sort();

        fs::create_dir_all(&self.root).map_err(|e| CacheError::io(&self.root, e))?;
        let path = self.index_path();
        let tmp = self.root.join(format!("{INDEX_FILE}.{}.tmp", uuid::Uuid::new_v4()));
        let json = serde_json::to_vec_pretty(&index).map_err(|e| KilnError::Internal {
            message: format!("cannot encode cache index: {e}"),
        })?;
        fs::write(&tmp, json).map_err(|e| CacheError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CacheError::io(&path, e)
        })?;
        Ok(())
    }
}

impl TemplateStore for CacheStore {
    fn resolve(&self, reference: &TemplateRef) -> KilnResult<ResolvedTemplate> {
        match reference {
            TemplateRef::Local(path) => self.resolve_local(path, reference),
            TemplateRef::Cached { name, version } => {
                self.resolve_cached(name, version.as_ref(), reference)
            }
            TemplateRef::Remote(source) => self.resolve_remote(source),
        }
    }

    #[instrument(skip(self))]
    fn refresh(&self, name: &str) -> KilnResult<bool> {
        let current = self.read_index()?.newest(name, None).cloned().ok_or_else(|| {
            ApplicationError::UnknownTemplate {
                reference: name.to_string(),
            }
        })?;

        let staging = match self.acquire(&current.source) {
            Ok(staging) => staging,
            Err(e) => {
                warn!(template = name, error = %e, "Source unreachable, keeping the cached copy");
                return Ok(false);
            }
        };
        let tree = template_root(staging.path())?;
        let id = self.loader.load(&tree, current.source.clone())?.template.id;

        let lock = self.name_lock(id.name())?;
        let _guard = lock.lock().map_err(|_| ApplicationError::StoreLockError)?;
        match self.read_index()?.get(&id).cloned() {
            Some(existing) if existing.content_hash == tree_hash(&tree)? => {
                debug!(template = %id, "Already up to date");
                Ok(false)
            }
            Some(_) => {
                warn!(template = %id, source = %current.source, "Same version with new content; replacing the cached copy");
                self.install(&tree, &id, current.source.clone())?;
                Ok(true)
            }
            None => {
                info!(template = %id, "Cached new version");
                self.install(&tree, &id, current.source.clone())?;
                Ok(true)
            }
        }
    }

    fn list(&self) -> KilnResult<Vec<TemplateSummary>> {
        let mut summaries = Vec::new();
        for entry in self.read_index()?.entries {
            match self.load_entry(&entry) {
                Ok(resolved) => summaries.push(resolved.template.summary()),
                Err(e) => warn!(
                    template = %entry.name,
                    version = %entry.version,
                    error = %e,
                    "Skipping unreadable cache entry"
                ),
            }
        }
        Ok(summaries)
    }
}

// ------ Internal Helpers ------

#[derive(Debug, Serialize, Deserialize)]
struct CacheIndex {
    format: u32,
    entries: Vec<CacheEntry>,
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self {
            format: INDEX_FORMAT,
            entries: Vec::new(),
        }
    }
}

impl CacheIndex {
    fn get(&self, id: &TemplateId) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .find(|e| e.name == id.name() && &e.version == id.version())
    }

    fn newest(&self, name: &str, version: Option<&Version>) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .filter(|e| e.name == name && version.is_none_or(|v| &e.version == v))
            .max_by(|a, b| a.version.cmp(&b.version))
    }

    fn newest_from(&self, source: &SourceDescriptor) -> Option<&CacheEntry> {
        self.entries
            .iter()
            .filter(|e| &e.source == source)
            .max_by(|a, b| a.version.cmp(&b.version))
    }

    fn upsert(&mut self, entry: CacheEntry) {
        self.entries
            .retain(|e| !(e.name == entry.name && e.version == entry.version));
        self.entries.push(entry);
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
    }
}

/// A staging directory inside the cache root, removed on drop.
struct StagingDir(PathBuf);

impl StagingDir {
    /// Reserve a path; the directory itself is created by whoever fills it.
    fn new(root: &Path) -> Result<Self, CacheError> {
        fs::create_dir_all(root).map_err(|e| CacheError::io(root, e))?;
        Ok(Self(root.join(format!("{STAGING_PREFIX}{}", uuid::Uuid::new_v4()))))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = fs::remove_dir_all(&self.0) {
                warn!(path = %self.0.display(), error = %e, "Failed to remove staging directory");
            }
        }
    }
}

/// SHA-256 over every file's relative path and bytes, in path order.
/// `.git` is ignored.
pub fn tree_hash(root: &Path) -> KilnResult<String> {
    let mut hasher = Sha256::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(|e| CacheError::io(root, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let bytes = fs::read(entry.path()).map_err(|e| CacheError::io(entry.path(), e))?;
        hasher.update(rel.to_string_lossy().replace('\\', "/").as_bytes());
        hasher.update([0]);
        hasher.update(&bytes);
        hasher.update([0]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
