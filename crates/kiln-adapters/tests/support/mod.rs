//! Fixtures shared by the end-to-end tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_adapters::{
    CacheStore, Fetcher, LocalFilesystem, ParallelRenderer, ProcessHookRunner, RetryPolicy,
    StandardQualityGate, fetch::copy_tree,
};
use kiln_core::application::{GenerateOptions, GenerateRequest, ScaffoldService};
use kiln_core::domain::{SourceDescriptor, TemplateRef, VariableMap};
use kiln_core::error::KilnResult;

pub const README_V1: &str = "# {{ project_name }}\n\nalpha\nbeta\ngamma\n";

pub const MANIFEST_BODY: &str = r#"
[[variables]]
name = "project_name"
required = true

[[variables]]
name = "use_docker"
type = "bool"
default = false

[[modules]]
type = "handler"

[[modules.imports]]
file = "src/main.rs"
anchor = "// kiln:modules"
line = "mod {{ module_name }};"
"#;

pub fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

pub fn read(root: &Path, rel: &str) -> String {
    std::fs::read_to_string(root.join(rel)).unwrap()
}

/// A `svc` template at `version` with the given README body and extra
/// manifest sections.
pub fn write_template(dir: &Path, version: &str, readme: &str, extra_manifest: &str) {
    write(
        dir,
        "template.toml",
        &format!(
            "[template]\nname = \"svc\"\nversion = \"{version}\"\n{MANIFEST_BODY}\n{extra_manifest}"
        ),
    );
    write(dir, "template/README.md", readme);
    write(dir, "template/src/main.rs", "// kiln:modules\nfn main() {}\n");
    write(dir, "template/config.json", "{\"name\": \"{{ project_name }}\"}\n");
    write(
        dir,
        "template/{% if use_docker %}Dockerfile{% endif %}",
        "FROM rust:1\n",
    );
    write(
        dir,
        "modules/handler/src/{{ module_name }}.rs",
        "pub fn {{ module_name | snake }}() {}\n",
    );
}

pub fn service_with(store: CacheStore) -> ScaffoldService {
    ScaffoldService::new(
        Box::new(store),
        Box::new(ParallelRenderer::new()),
        Box::new(LocalFilesystem::new()),
        Box::new(ProcessHookRunner::new()),
        Box::new(StandardQualityGate::new()),
    )
}

pub fn service(cache: &Path) -> ScaffoldService {
    service_with(CacheStore::new(cache))
}

pub fn generate_request(template: TemplateRef, output_dir: &Path) -> GenerateRequest {
    GenerateRequest {
        template,
        output_dir: output_dir.to_path_buf(),
        variables: VariableMap::new(),
        options: GenerateOptions::default(),
    }
}

pub fn local(dir: &Path) -> TemplateRef {
    TemplateRef::Local(dir.to_path_buf())
}

/// Serves a fixed directory for any remote source and counts fetches.
#[derive(Clone)]
pub struct CountingFetcher {
    dir: PathBuf,
    calls: Arc<AtomicUsize>,
}

impl CountingFetcher {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn store(&self, cache: &Path) -> CacheStore {
        CacheStore::new(cache)
            .with_fetcher(Box::new(self.clone()))
            .with_retry(RetryPolicy {
                max_attempts: 1,
                base_backoff_ms: 0,
            })
    }
}

impl Fetcher for CountingFetcher {
    fn fetch(&self, _source: &SourceDescriptor, dest: &Path) -> KilnResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        copy_tree(&self.dir, dest)
    }
}
