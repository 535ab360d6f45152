//! Test doubles shared by the application unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::application::ApplicationError;
use crate::application::ports::{
    EntryKind, Filesystem, FsEntry, RenderScope, ResolvedTemplate, TemplateRenderer, TemplateStore,
};
use crate::domain::lang::{NoPartials, compile};
use crate::domain::{
    FileKind, HookSpecs, Permissions, ProjectStructure, RelativePath, SourceDescriptor, Template,
    TemplateFile, TemplateId, TemplateRef, TemplateSummary, VariableDefinition, VariableMap,
    VariableType,
};
use crate::error::KilnResult;

/// `std::fs` behind the `Filesystem` port, with an optional injected fault:
/// the N-th call to `rename` (1-based) fails.
#[derive(Default)]
pub(crate) struct DiskFs {
    fail_rename_at: Option<usize>,
    renames: AtomicUsize,
    pub(crate) log: Mutex<Vec<String>>,
}

impl DiskFs {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_rename(n: usize) -> Self {
        Self {
            fail_rename_at: Some(n),
            ..Self::default()
        }
    }

    fn err(path: &Path, e: impl ToString) -> crate::error::KilnError {
        ApplicationError::FilesystemError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
        .into()
    }
}

impl Filesystem for DiskFs {
    fn create_dir_all(&self, path: &Path) -> KilnResult<()> {
        std::fs::create_dir_all(path).map_err(|e| Self::err(path, e))
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> KilnResult<()> {
        std::fs::write(path, content).map_err(|e| Self::err(path, e))
    }

    fn read_file(&self, path: &Path) -> KilnResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| Self::err(path, e))
    }

    fn copy_file(&self, from: &Path, to: &Path) -> KilnResult<()> {
        std::fs::copy(from, to).map(|_| ()).map_err(|e| Self::err(from, e))
    }

    fn set_permissions(&self, _path: &Path, _executable: bool) -> KilnResult<()> {
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn rename(&self, from: &Path, to: &Path) -> KilnResult<()> {
        let n = self.renames.fetch_add(1, Ordering::SeqCst) + 1;
        self.log
            .lock()
            .unwrap()
            .push(format!("rename {} -> {}", from.display(), to.display()));
        if self.fail_rename_at == Some(n) {
            return Err(Self::err(from, "injected fault"));
        }
        std::fs::rename(from, to).map_err(|e| Self::err(from, e))
    }

    fn remove_file(&self, path: &Path) -> KilnResult<()> {
        std::fs::remove_file(path).map_err(|e| Self::err(path, e))
    }

    fn remove_dir_all(&self, path: &Path) -> KilnResult<()> {
        std::fs::remove_dir_all(path).map_err(|e| Self::err(path, e))
    }

    fn list_files(&self, root: &Path) -> KilnResult<Vec<RelativePath>> {
        Ok(self
            .list_entries(root)?
            .into_iter()
            .filter(|e| e.kind == EntryKind::File)
            .map(|e| e.path)
            .collect())
    }

    fn list_entries(&self, root: &Path) -> KilnResult<Vec<FsEntry>> {
        fn walk(dir: &Path, root: &Path, out: &mut Vec<FsEntry>) -> std::io::Result<()> {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                let file_type = entry.file_type()?;
                let kind = if file_type.is_symlink() {
                    EntryKind::Symlink(std::fs::read_link(&path)?)
                } else if file_type.is_dir() {
                    EntryKind::Dir
                } else {
                    EntryKind::File
                };
                if let Some(rel) = path
                    .strip_prefix(root)
                    .ok()
                    .and_then(|r| RelativePath::try_new(r).ok())
                {
                    out.push(FsEntry {
                        path: rel,
                        kind: kind.clone(),
                    });
                }
                if kind == EntryKind::Dir {
                    walk(&path, root, out)?;
                }
            }
            Ok(())
        }
        let mut out = Vec::new();
        if root.is_dir() {
            walk(root, root, &mut out).map_err(|e| Self::err(root, e))?;
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn symlink(&self, original: &Path, link: &Path) -> KilnResult<()> {
        #[cfg(unix)]
        return std::os::unix::fs::symlink(original, link).map_err(|e| Self::err(link, e));
        #[cfg(not(unix))]
        return Err(Self::err(link, format!("cannot link to {}", original.display())));
    }
}

/// Every entry directly inside `dir`, by file name.
pub(crate) fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

pub(crate) fn read(root: &Path, rel: &str) -> String {
    std::fs::read_to_string(root.join(rel)).unwrap()
}

pub(crate) fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

/// Store double holding pre-built templates.
pub(crate) struct StaticStore {
    templates: Vec<Arc<Template>>,
}

impl StaticStore {
    pub(crate) fn new(templates: Vec<Arc<Template>>) -> Self {
        Self { templates }
    }

    fn newest<'a>(
        &self,
        matching: impl Iterator<Item = &'a Arc<Template>>,
        reference: &TemplateRef,
    ) -> KilnResult<ResolvedTemplate> {
        matching
            .max_by(|a, b| a.id.version().cmp(b.id.version()))
            .map(|t| ResolvedTemplate::new(Arc::clone(t)))
            .ok_or_else(|| {
                ApplicationError::UnknownTemplate {
                    reference: reference.to_string(),
                }
                .into()
            })
    }
}

impl TemplateStore for StaticStore {
    fn resolve(&self, reference: &TemplateRef) -> KilnResult<ResolvedTemplate> {
        match reference {
            TemplateRef::Cached { name, version } => self.newest(
                self.templates.iter().filter(|t| {
                    t.id.name() == name && version.as_ref().is_none_or(|v| t.id.version() == v)
                }),
                reference,
            ),
            TemplateRef::Local(path) => self.newest(
                self.templates
                    .iter()
                    .filter(|t| t.source == SourceDescriptor::Local { path: path.clone() }),
                reference,
            ),
            TemplateRef::Remote(source) => self.newest(
                self.templates.iter().filter(|t| &t.source == source),
                reference,
            ),
        }
    }

    fn refresh(&self, _name: &str) -> KilnResult<bool> {
        Ok(false)
    }

    fn list(&self) -> KilnResult<Vec<TemplateSummary>> {
        Ok(self.templates.iter().map(|t| t.summary()).collect())
    }
}

/// Renders file by file on the calling thread.
pub(crate) struct SequentialRenderer;

impl TemplateRenderer for SequentialRenderer {
    fn render(
        &self,
        template: &Template,
        scope: &RenderScope,
        variables: &VariableMap,
    ) -> KilnResult<ProjectStructure> {
        let files = match scope {
            RenderScope::Project => &template.files,
            RenderScope::Module(kind) => match template.module(kind) {
                Some(module) => &module.files,
                None => return Ok(ProjectStructure::new()),
            },
        };
        let mut rendered = Vec::new();
        for file in files {
            if let Some(out) = file.render(variables)? {
                rendered.push(out);
            }
        }
        let structure: ProjectStructure = rendered.into_iter().collect();
        structure.validate()?;
        Ok(structure)
    }
}

pub(crate) fn text_file(path: &str, body: &str) -> TemplateFile {
    TemplateFile {
        source_path: RelativePath::try_new("template").unwrap(),
        path: compile(path, path, &NoPartials).unwrap(),
        kind: FileKind::Text(compile(path, body, &NoPartials).unwrap()),
        permissions: Permissions::default(),
    }
}

/// A template `id` (`name@version`) sourced from `/templates/<name>`,
/// declaring `project_name` and `use_docker`.
pub(crate) fn template(id: &str, files: &[(&str, &str)]) -> Template {
    let id = TemplateId::parse(id).unwrap();
    let root = PathBuf::from("/nonexistent/templates").join(id.name());
    Template {
        description: None,
        variables: vec![
            VariableDefinition::new("project_name", VariableType::String).required(),
            VariableDefinition::new("use_docker", VariableType::Bool).with_default(false),
        ],
        exclude: Vec::new(),
        copy_only: Vec::new(),
        size: 0,
        source: SourceDescriptor::Local {
            path: PathBuf::from("/templates").join(id.name()),
        },
        root,
        files: files.iter().map(|(p, b)| text_file(p, b)).collect(),
        hooks: HookSpecs::default(),
        quality: Vec::new(),
        modules: Vec::new(),
        id,
    }
}
