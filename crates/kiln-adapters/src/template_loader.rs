//! Filesystem template loader.
//!
//! Reads one template directory into an immutable [`Template`]:
//!
//! ```text
//! rust-service/
//! ├── template.toml        ← manifest (required)
//! ├── template/            ← project tree ([files].content_dir)
//! │   ├── Cargo.toml
//! │   └── src/{{ project_name | snake }}.rs
//! ├── partials/            ← extends / include targets, never emitted
//! ├── modules/handler/     ← module trees
//! └── hooks/check.sh       ← hook scripts
//! ```
//!
//! Every text file and every path is compiled here, so syntax errors and
//! undeclared variables surface before anything is rendered or written.

use std::{
    collections::{BTreeSet, HashMap},
    fs,
    io::Read,
    path::Path,
};

use globset::{Glob, GlobSet, GlobSetBuilder};
use semver::Version;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use kiln_core::{
    application::ApplicationError,
    domain::{
        DependencyEdit, DomainError, FileKind, ImportEdit, ModuleSpec, Permissions, RelativePath,
        SourceDescriptor, Template, TemplateFile, TemplateId, VariableDefinition, check_size,
        lang::{Program, compile},
    },
    error::{KilnError, KilnResult},
};

use crate::manifest::{MANIFEST_FILE, ModuleEntry, TemplateManifest};

/// Directory holding `extends` / `include` sources.
pub const PARTIALS_DIR: &str = "partials";
/// A NUL byte within this prefix marks a file as binary.
const BINARY_SNIFF_LEN: u64 = 8192;
/// Implicitly declared for module trees.
const MODULE_NAME: &str = "module_name";

/// A loaded template plus non-fatal findings (e.g. large size).
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    pub template: Template,
    pub warnings: Vec<String>,
}

/// Loads a [`Template`] from a template directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateLoader;

impl TemplateLoader {
    pub fn new() -> Self {
        Self
    }

    /// Parse only the manifest, e.g. to learn name and version.
    pub fn read_manifest(&self, root: &Path) -> KilnResult<TemplateManifest> {
        let path = root.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(DomainError::ManifestInvalid {
                path: path.display().to_string(),
                reason: "no template.toml found".into(),
            }
            .into());
        }
        let text = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        Ok(TemplateManifest::parse(&text)?)
    }

    /// Identity declared by the manifest at `root`.
    pub fn read_id(&self, root: &Path) -> KilnResult<TemplateId> {
        manifest_id(&self.read_manifest(root)?)
    }

    /// Load and validate the template at `root`.
    ///
    /// `source` is recorded on the template so projects can find it again.
    #[instrument(skip(self, source), fields(root = %root.display()))]
    pub fn load(&self, root: &Path, source: SourceDescriptor) -> KilnResult<LoadedTemplate> {
        let manifest = self.read_manifest(root)?;
        let id = manifest_id(&manifest)?;
        let mut warnings = Vec::new();

        // Size first: nothing is read from an oversized tree.
        let size = tree_size(root)?;
        if let Some(warning) = check_size(size)? {
            warn!(template = %id, size, "Large template");
            warnings.push(warning);
        }

        let tree = TreeRules {
            exclude: build_globset(&manifest.files.exclude)?,
            copy_only: build_globset(&manifest.files.copy_only)?,
            partials: read_partials(&root.join(PARTIALS_DIR))?,
        };

        let variables = manifest
            .variables
            .iter()
            .map(|v| v.to_definition())
            .collect::<Result<Vec<_>, _>>()?;

        let content_dir = root.join(&manifest.files.content_dir);
        if !content_dir.is_dir() {
            return Err(DomainError::ManifestInvalid {
                path: MANIFEST_FILE.into(),
                reason: format!("content directory '{}' not found", manifest.files.content_dir),
            }
            .into());
        }
        let files = tree.compile_dir(&content_dir, &manifest.files.content_dir)?;
        let declared: BTreeSet<&str> = variables.iter().map(|v| v.name.as_str()).collect();
        check_declared(&files, &declared, &manifest.files.content_dir)?;

        let modules = manifest
            .modules
            .iter()
            .map(|entry| load_module(root, entry, &tree, &variables))
            .collect::<KilnResult<Vec<_>>>()?;

        let template = Template {
            id,
            description: manifest.template.description.clone(),
            variables,
            exclude: manifest.files.exclude.clone(),
            copy_only: manifest.files.copy_only.clone(),
            size,
            source,
            root: root.to_path_buf(),
            files,
            hooks: manifest.hooks.to_specs()?,
            quality: manifest
                .quality
                .iter()
                .map(|q| q.to_spec())
                .collect::<Result<Vec<_>, _>>()?,
            modules,
        };
        template.validate()?;

        debug!(
            template = %template.id,
            files = template.files.len(),
            modules = template.modules.len(),
            "Template loaded"
        );
        Ok(LoadedTemplate { template, warnings })
    }
}

// ------ Internal Helpers ------

struct TreeRules {
    exclude: GlobSet,
    copy_only: GlobSet,
    partials: HashMap<String, String>,
}

impl TreeRules {
    /// Compile every file under `dir`, in path order.
    fn compile_dir(&self, dir: &Path, label: &str) -> KilnResult<Vec<TemplateFile>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(dir, e))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(dir).map_err(|_| {
                KilnError::from(DomainError::PathEscapesRoot {
                    path: entry.path().display().to_string(),
                })
            })?;
            let source_path = RelativePath::try_new(rel)?;
            if self.exclude.is_match(source_path.as_str()) {
                debug!(path = %source_path, "Excluded");
                continue;
            }
            let error_label = format!("{label}/{source_path}");

            let metadata = entry.metadata().map_err(|e| walk_error(dir, e))?;
            let permissions = permissions_of(&metadata);
            let path = compile(&error_label, source_path.as_str(), &self.partials)?;

            let kind = if self.copy_only.is_match(source_path.as_str())
                || is_binary(entry.path())?
            {
                FileKind::Binary {
                    source: entry.path().to_path_buf(),
                }
            } else {
                let bytes = fs::read(entry.path()).map_err(|e| io_error(entry.path(), e))?;
                match String::from_utf8(bytes) {
                    Ok(text) => FileKind::Text(compile(&error_label, &text, &self.partials)?),
                    Err(_) => FileKind::Binary {
                        source: entry.path().to_path_buf(),
                    },
                }
            };

            files.push(TemplateFile {
                source_path,
                path,
                kind,
                permissions,
            });
        }
        Ok(files)
    }
}

fn load_module(
    root: &Path,
    entry: &ModuleEntry,
    tree: &TreeRules,
    project_vars: &[VariableDefinition],
) -> KilnResult<ModuleSpec> {
    let dir_label = entry.content_dir();
    let dir = root.join(&dir_label);
    if !dir.is_dir() {
        return Err(DomainError::ManifestInvalid {
            path: MANIFEST_FILE.into(),
            reason: format!(
                "module '{}' directory '{dir_label}' not found",
                entry.module_type
            ),
        }
        .into());
    }

    let variables = entry
        .variables
        .iter()
        .map(|v| v.to_definition())
        .collect::<Result<Vec<_>, _>>()?;
    let files = tree.compile_dir(&dir, &dir_label)?;

    let mut declared: BTreeSet<&str> = project_vars.iter().map(|v| v.name.as_str()).collect();
    declared.extend(variables.iter().map(|v| v.name.as_str()));
    declared.insert(MODULE_NAME);
    check_declared(&files, &declared, &dir_label)?;

    let label = format!("{MANIFEST_FILE} [modules.{}]", entry.module_type);
    let dependencies = entry
        .dependencies
        .iter()
        .map(|dep| {
            Ok(DependencyEdit {
                file: compile(&label, &dep.file, &tree.partials)?,
                lines: dep
                    .lines
                    .iter()
                    .map(|line| compile(&label, line, &tree.partials))
                    .collect::<Result<Vec<_>, _>>()?,
            })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;
    let imports = entry
        .imports
        .iter()
        .map(|import| {
            Ok(ImportEdit {
                file: compile(&label, &import.file, &tree.partials)?,
                anchor: import.anchor.clone(),
                line: compile(&label, &import.line, &tree.partials)?,
            })
        })
        .collect::<Result<Vec<_>, DomainError>>()?;
    let mut edits: Vec<(String, &Program)> = Vec::new();
    for dep in &dependencies {
        edits.push((label.clone(), &dep.file));
        edits.extend(dep.lines.iter().map(|l| (label.clone(), l)));
    }
    for import in &imports {
        edits.push((label.clone(), &import.file));
        edits.push((label.clone(), &import.line));
    }
    check_programs(edits, &declared)?;

    Ok(ModuleSpec {
        module_type: entry.module_type.clone(),
        description: entry.description.clone(),
        files,
        variables,
        singleton: entry.singleton,
        dependencies,
        imports,
    })
}

fn manifest_id(manifest: &TemplateManifest) -> KilnResult<TemplateId> {
    let version = Version::parse(&manifest.template.version).map_err(|e| {
        DomainError::ManifestInvalid {
            path: MANIFEST_FILE.into(),
            reason: format!("invalid version '{}': {e}", manifest.template.version),
        }
    })?;
    Ok(TemplateId::new(manifest.template.name.clone(), version)?)
}

/// Reject any file whose path or body reads an undeclared variable.
fn check_declared(files: &[TemplateFile], declared: &BTreeSet<&str>, label: &str) -> KilnResult<()> {
    let programs = files.iter().flat_map(|file| {
        let path = format!("{label}/{}", file.source_path);
        let body = match &file.kind {
            FileKind::Text(program) => Some((path.clone(), program)),
            FileKind::Binary { .. } => None,
        };
        std::iter::once((path, &file.path)).chain(body)
    });
    check_programs(programs, declared)
}

fn check_programs<'a>(
    programs: impl IntoIterator<Item = (String, &'a Program)>,
    declared: &BTreeSet<&str>,
) -> KilnResult<()> {
    let mut missing: Vec<(String, BTreeSet<String>)> = Vec::new();
    for (path, program) in programs {
        let names: BTreeSet<String> = program
            .referenced_variables()
            .into_iter()
            .filter(|name| !declared.contains(name.as_str()))
            .collect();
        if names.is_empty() {
            continue;
        }
        match missing.iter_mut().find(|(p, _)| *p == path) {
            Some((_, existing)) => existing.extend(names),
            None => missing.push((path, names)),
        }
    }
    match missing.into_iter().next() {
        Some((path, names)) => Err(DomainError::UndeclaredVariable {
            path,
            names: names.into_iter().collect(),
        }
        .into()),
        None => Ok(()),
    }
}

/// Total bytes under `root`, ignoring VCS metadata.
fn tree_size(root: &Path) -> KilnResult<u64> {
    let mut size = 0u64;
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if entry.file_type().is_file() {
            size += entry.metadata().map_err(|e| walk_error(root, e))?.len();
        }
    }
    Ok(size)
}

fn read_partials(dir: &Path) -> KilnResult<HashMap<String, String>> {
    let mut partials = HashMap::new();
    if !dir.is_dir() {
        return Ok(partials);
    }
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let name = RelativePath::try_new(rel)?.as_str().to_string();
        let text = fs::read_to_string(entry.path()).map_err(|e| io_error(entry.path(), e))?;
        partials.insert(name, text);
    }
    Ok(partials)
}

fn build_globset(patterns: &[String]) -> KilnResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| DomainError::ManifestInvalid {
            path: MANIFEST_FILE.into(),
            reason: format!("invalid glob '{pattern}': {e}"),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| {
        DomainError::ManifestInvalid {
            path: MANIFEST_FILE.into(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn is_binary(path: &Path) -> KilnResult<bool> {
    let file = fs::File::open(path).map_err(|e| io_error(path, e))?;
    let mut head = Vec::with_capacity(BINARY_SNIFF_LEN as usize);
    file.take(BINARY_SNIFF_LEN)
        .read_to_end(&mut head)
        .map_err(|e| io_error(path, e))?;
    Ok(head.contains(&0))
}

#[cfg(unix)]
fn permissions_of(metadata: &fs::Metadata) -> Permissions {
    use std::os::unix::fs::PermissionsExt;
    Permissions::from_mode(metadata.permissions().mode())
}

#[cfg(not(unix))]
fn permissions_of(_metadata: &fs::Metadata) -> Permissions {
    Permissions::default()
}

fn io_error(path: &Path, e: std::io::Error) -> KilnError {
    ApplicationError::FilesystemError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
    .into()
}

fn walk_error(root: &Path, e: impl std::fmt::Display) -> KilnError {
    ApplicationError::FilesystemError {
        path: root.to_path_buf(),
        reason: e.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::domain::{VariableMap, VariableValue};
    use kiln_core::error::ErrorKind;
    use tempfile::TempDir;

    // ── fixtures ─────────────────────────────────────────────────────────

    const MANIFEST: &str = r#"
[template]
name = "svc"
version = "1.0.0"

[[variables]]
name = "project_name"
required = true

[[variables]]
name = "use_docker"
type = "bool"
default = false
"#;

    fn template_dir(manifest: &str, files: &[(&str, &[u8])]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(MANIFEST_FILE), manifest).unwrap();
        fs::create_dir_all(tmp.path().join("template")).unwrap();
        for (path, content) in files {
            let full = tmp.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        tmp
    }

    fn load(dir: &TempDir) -> KilnResult<LoadedTemplate> {
        TemplateLoader::new().load(
            dir.path(),
            SourceDescriptor::Local {
                path: dir.path().to_path_buf(),
            },
        )
    }

    fn vars() -> VariableMap {
        let mut vars = VariableMap::new();
        vars.insert("project_name".into(), VariableValue::from("Billing API"));
        vars.insert("use_docker".into(), VariableValue::Bool(true));
        vars
    }

    // ── loading ──────────────────────────────────────────────────────────

    #[test]
    fn compiles_paths_and_bodies() {
        let dir = template_dir(
            MANIFEST,
            &[
                ("template/src/{{ project_name | snake }}.rs", b"// {{ project_name }}\n"),
                ("template/{% if use_docker %}Dockerfile{% endif %}", b"FROM rust\n"),
            ],
        );
        let loaded = load(&dir).unwrap();
        let template = loaded.template;
        assert_eq!(template.id.to_string(), "svc@1.0.0");
        assert_eq!(template.files.len(), 2);
        assert!(loaded.warnings.is_empty());

        let rendered: Vec<String> = template
            .files
            .iter()
            .filter_map(|f| f.render(&vars()).unwrap())
            .map(|f| f.path.to_string())
            .collect();
        assert!(rendered.contains(&"src/billing_api.rs".to_string()));
        assert!(rendered.contains(&"Dockerfile".to_string()));
    }

    #[test]
    fn partials_resolve_but_are_not_emitted() {
        let dir = template_dir(
            MANIFEST,
            &[
                ("partials/header.txt", b"== {{ project_name }} =="),
                ("template/README.md", b"{% include \"header.txt\" %}\nbody\n"),
            ],
        );
        let template = load(&dir).unwrap().template;
        assert_eq!(template.files.len(), 1);
        let readme = template.files[0].render(&vars()).unwrap().unwrap();
        assert_eq!(readme.content.as_text(), Some("== Billing API ==\nbody\n"));
    }

    #[test]
    fn binary_and_copy_only_files_are_not_compiled() {
        let manifest = format!("{MANIFEST}\n[files]\ncopy_only = [\"raw/**\"]\n");
        let dir = template_dir(
            &manifest,
            &[
                ("template/logo.png", &[0x89, b'P', b'N', b'G', 0, 1, 2]),
                ("template/raw/notes.txt", b"{{ not rendered }}"),
            ],
        );
        let template = load(&dir).unwrap().template;
        assert!(template.files.iter().all(TemplateFile::is_binary));
    }

    #[test]
    fn excluded_files_are_dropped() {
        let manifest = format!("{MANIFEST}\n[files]\nexclude = [\"**/*.bak\"]\n");
        let dir = template_dir(
            &manifest,
            &[("template/a.txt", b"a"), ("template/src/old.bak", b"b")],
        );
        let template = load(&dir).unwrap().template;
        let paths: Vec<&str> = template.files.iter().map(|f| f.source_path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt"]);
    }

    // ── rejection ────────────────────────────────────────────────────────

    #[test]
    fn undeclared_variable_names_file() {
        let dir = template_dir(MANIFEST, &[("template/main.rs", b"{{ author }} {{ year }}")]);
        let err = load(&dir).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndeclaredVariable);
        let message = err.to_string();
        assert!(message.contains("template/main.rs"), "{message}");
        assert!(message.contains("author, year"), "{message}");
    }

    #[test]
    fn syntax_error_reports_path_and_line() {
        let dir = template_dir(MANIFEST, &[("template/a.txt", b"ok\n{% endif %}\n")]);
        let err = load(&dir).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateSyntaxError);
        assert!(err.to_string().starts_with("template/a.txt:2:"), "{err}");
    }

    #[test]
    fn missing_manifest_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let err = load(&tmp).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ManifestInvalid);
    }

    #[test]
    fn modules_get_implicit_module_name() {
        let manifest = format!(
            "{MANIFEST}\n[[modules]]\ntype = \"handler\"\n\n[[modules.imports]]\nfile = \"src/main.rs\"\nanchor = \"// mods\"\nline = \"mod {{{{ module_name }}}};\"\n"
        );
        let dir = template_dir(
            &manifest,
            &[("modules/handler/src/{{ module_name }}.rs", b"// {{ project_name }}\n")],
        );
        let template = load(&dir).unwrap().template;
        let module = template.module("handler").unwrap();
        assert_eq!(module.files.len(), 1);
        assert_eq!(module.imports.len(), 1);
    }

    #[test]
    fn module_edits_must_use_declared_variables() {
        let manifest = format!(
            "{MANIFEST}\n[[modules]]\ntype = \"handler\"\n\n[[modules.dependencies]]\nfile = \"Cargo.toml\"\nlines = [\"{{{{ crate_name }}}} = \\\"1\\\"\"]\n"
        );
        let dir = template_dir(&manifest, &[("modules/handler/x.rs", b"x")]);
        let err = load(&dir).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndeclaredVariable);
    }

    // ── size limits ──────────────────────────────────────────────────────

    fn sized(bytes: u64) -> TempDir {
        let dir = template_dir(MANIFEST, &[]);
        let manifest_len = fs::metadata(dir.path().join(MANIFEST_FILE)).unwrap().len();
        let file = fs::File::create(dir.path().join("template/blob.bin")).unwrap();
        file.set_len(bytes - manifest_len).unwrap();
        dir
    }

    #[test]
    fn oversized_template_is_rejected() {
        let err = load(&sized(100_000_001)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeExceeded);
    }

    #[test]
    fn large_template_warns() {
        let loaded = load(&sized(50_000_001)).unwrap();
        assert_eq!(loaded.template.size, 50_000_001);
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn template_under_threshold_is_clean() {
        let loaded = load(&sized(49_999_999)).unwrap();
        assert!(loaded.warnings.is_empty());
    }
}
