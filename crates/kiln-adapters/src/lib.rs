//! Infrastructure adapters for Kiln.
//!
//! This crate implements the ports defined in `kiln-core::application::ports`.
//! It contains all external dependencies and I/O operations: the local
//! filesystem, the template loader and cache, git and HTTP fetchers, the
//! rayon renderer, and child processes for hooks and quality checks.

pub mod fetch;
pub mod filesystem;
pub mod hooks;
pub mod manifest;
pub mod quality;
pub mod renderer;
pub mod template_loader;
pub mod template_store;

mod process;

// Re-export commonly used adapters
pub use fetch::{Fetcher, RetryPolicy, SourceFetcher};
pub use filesystem::LocalFilesystem;
pub use hooks::ProcessHookRunner;
pub use quality::StandardQualityGate;
pub use renderer::ParallelRenderer;
pub use template_loader::{LoadedTemplate, TemplateLoader};
pub use template_store::{CacheStore, InMemoryStore};
