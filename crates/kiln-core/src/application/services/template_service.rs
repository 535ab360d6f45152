//! Template Service - queries and maintenance of the template store.
//!
//! Separated from ScaffoldService so the `templates` commands do not need
//! a renderer, filesystem or hook runner.

use tracing::{info, instrument};

use crate::{
    application::ports::{ResolvedTemplate, TemplateStore},
    domain::{TemplateRef, TemplateSummary},
    error::KilnResult,
};

/// Service for template operations.
pub struct TemplateService {
    store: Box<dyn TemplateStore>,
}

impl TemplateService {
    pub fn new(store: Box<dyn TemplateStore>) -> Self {
        Self { store }
    }

    /// Every cached template version, sorted by name then version.
    pub fn list(&self) -> KilnResult<Vec<TemplateSummary>> {
        let mut summaries = self.store.list()?;
        summaries.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        Ok(summaries)
    }

    /// Resolve a reference as typed on the command line.
    pub fn resolve(&self, reference: &str) -> KilnResult<ResolvedTemplate> {
        let reference = TemplateRef::parse(reference)?;
        self.store.resolve(&reference)
    }

    /// Summary of one template, fetching it first if needed.
    pub fn inspect(&self, reference: &str) -> KilnResult<TemplateSummary> {
        self.inspect_ref(&TemplateRef::parse(reference)?)
    }

    /// Like [`Self::inspect`], for an already classified reference.
    pub fn inspect_ref(&self, reference: &TemplateRef) -> KilnResult<TemplateSummary> {
        Ok(self.store.resolve(reference)?.template.summary())
    }

    /// Re-fetch a cached template from its recorded source.
    /// Returns `true` when a new version landed in the cache.
    #[instrument(skip(self))]
    pub fn refresh(&self, name: &str) -> KilnResult<bool> {
        let updated = self.store.refresh(name)?;
        info!(updated, "Template refreshed");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{StaticStore, template};
    use crate::error::ErrorKind;
    use std::sync::Arc;

    fn service() -> TemplateService {
        TemplateService::new(Box::new(StaticStore::new(vec![
            Arc::new(template("web@2.0.0", &[])),
            Arc::new(template("api@1.0.0", &[("README.md", "# hi\n")])),
            Arc::new(template("api@1.2.0", &[])),
        ])))
    }

    #[test]
    fn list_is_sorted() {
        let ids: Vec<String> = service()
            .list()
            .unwrap()
            .iter()
            .map(|s| format!("{}@{}", s.name, s.version))
            .collect();
        assert_eq!(ids, vec!["api@1.0.0", "api@1.2.0", "web@2.0.0"]);
    }

    #[test]
    fn resolve_picks_newest_cached_version() {
        let resolved = service().resolve("api").unwrap();
        assert_eq!(resolved.template.id.to_string(), "api@1.2.0");
    }

    #[test]
    fn resolve_exact_version() {
        let summary = service().inspect("api@1.0.0").unwrap();
        assert_eq!(summary.version, semver::Version::new(1, 0, 0));
    }

    #[test]
    fn unknown_template_is_reported() {
        let err = service().resolve("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownTemplate);
    }
}
