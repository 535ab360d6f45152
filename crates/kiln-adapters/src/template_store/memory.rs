//! In-memory template store.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use kiln_core::{
    application::{
        ApplicationError,
        ports::{ResolvedTemplate, TemplateStore},
    },
    domain::{SourceDescriptor, Template, TemplateId, TemplateRef, TemplateSummary},
    error::KilnResult,
};

/// Thread-safe store over pre-built templates. Nothing is fetched and
/// `refresh` never changes anything.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<BTreeMap<TemplateId, Arc<Template>>>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: impl IntoIterator<Item = Template>) -> KilnResult<Self> {
        let store = Self::new();
        for template in templates {
            store.insert(template)?;
        }
        Ok(store)
    }

    /// Add or replace a template. It is validated first.
    pub fn insert(&self, template: Template) -> KilnResult<()> {
        template.validate()?;
        let mut inner = self
            .inner
            .write()
            .map_err(|_| ApplicationError::StoreLockError)?;
        inner.insert(template.id.clone(), Arc::new(template));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Newest template satisfying `predicate`.
    fn newest(
        &self,
        reference: &TemplateRef,
        predicate: impl Fn(&Template) -> bool,
    ) -> KilnResult<ResolvedTemplate> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ApplicationError::StoreLockError)?;
        // BTreeMap order is (name, version), so the last match is the newest.
        inner
            .values()
            .filter(|t| predicate(t))
            .next_back()
            .map(|t| ResolvedTemplate::new(Arc::clone(t)))
            .ok_or_else(|| {
                ApplicationError::UnknownTemplate {
                    reference: reference.to_string(),
                }
                .into()
            })
    }
}

impl TemplateStore for InMemoryStore {
    fn resolve(&self, reference: &TemplateRef) -> KilnResult<ResolvedTemplate> {
        match reference {
            TemplateRef::Cached { name, version } => self.newest(reference, |t| {
                t.id.name() == name && version.as_ref().is_none_or(|v| t.id.version() == v)
            }),
            TemplateRef::Local(path) => self.newest(reference, |t| {
                matches!(&t.source, SourceDescriptor::Local { path: p } if p == path)
            }),
            TemplateRef::Remote(source) => self.newest(reference, |t| &t.source == source),
        }
    }

    fn refresh(&self, name: &str) -> KilnResult<bool> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ApplicationError::StoreLockError)?;
        if inner.keys().any(|id| id.name() == name) {
            Ok(false)
        } else {
            Err(ApplicationError::UnknownTemplate {
                reference: name.to_string(),
            }
            .into())
        }
    }

    fn list(&self) -> KilnResult<Vec<TemplateSummary>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| ApplicationError::StoreLockError)?;
        Ok(inner.values().map(|t| t.summary()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::domain::HookSpecs;
    use std::path::PathBuf;

    fn template(id: &str) -> Template {
        let id = TemplateId::parse(id).unwrap();
        Template {
            description: None,
            variables: Vec::new(),
            exclude: Vec::new(),
            copy_only: Vec::new(),
            size: 0,
            source: SourceDescriptor::Git {
                url: format!("https://example.com/{}.git", id.name()),
                rev: None,
            },
            root: PathBuf::from("/t"),
            files: Vec::new(),
            hooks: HookSpecs::default(),
            quality: Vec::new(),
            modules: Vec::new(),
            id,
        }
    }

    fn store() -> InMemoryStore {
        InMemoryStore::with_templates([
            template("svc@1.0.0"),
            template("svc@1.10.0"),
            template("svc@1.2.0"),
            template("lib@0.1.0"),
        ])
        .unwrap()
    }

    #[test]
    fn newest_version_wins() {
        let resolved = store().resolve(&TemplateRef::parse("svc").unwrap()).unwrap();
        assert_eq!(resolved.template.id.to_string(), "svc@1.10.0");
    }

    #[test]
    fn pinned_version() {
        let resolved = store()
            .resolve(&TemplateRef::parse("svc@1.2.0").unwrap())
            .unwrap();
        assert_eq!(resolved.template.id.to_string(), "svc@1.2.0");
    }

    #[test]
    fn remote_source_matches() {
        let resolved = store()
            .resolve(&TemplateRef::parse("git+https://example.com/lib.git").unwrap())
            .unwrap();
        assert_eq!(resolved.template.id.name(), "lib");
    }

    #[test]
    fn unknown_reference() {
        let err = store()
            .resolve(&TemplateRef::parse("web").unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), kiln_core::error::ErrorKind::UnknownTemplate);
        assert!(store().refresh("web").is_err());
        assert!(!store().refresh("svc").unwrap());
    }

    #[test]
    fn list_is_sorted() {
        let names: Vec<String> = store()
            .list()
            .unwrap()
            .into_iter()
            .map(|s| format!("{}@{}", s.name, s.version))
            .collect();
        assert_eq!(names, ["lib@0.1.0", "svc@1.0.0", "svc@1.2.0", "svc@1.10.0"]);
    }
}
