//! Re-applying a newer template version onto a generated project.
//!
//! ```text
//! base   = recorded version rendered with recorded answers
//! ours   = the file on disk
//! theirs = target version rendered with recorded + new answers
//! ```
//!
//! Every path in either render gets a `FileUpdate`; the new ledger and
//! metadata are published in the same atomic swap as the merged files.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::Utc;
use semver::Version;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::scaffold_service::{ScaffoldService, metadata_path, source_ref};
use crate::{
    application::{
        ApplicationError,
        ports::ResolvedTemplate,
        results::{FileConflicts, UpdateReport, UpdateRequest, UpdateStrategy},
        variables::VariableCollector,
    },
    domain::{
        FileContent, FileToWrite, ProjectMetadata, ProjectStructure, RelativePath, TemplateLineage,
        TemplateRef, VariableMap, content_hash,
        merge::{
            FileUpdate, FileUpdateState, MergeResult, SIDECAR_SUFFIX, has_conflict_markers,
            is_sidecar, merge3,
        },
    },
    error::KilnResult,
};

/// Per-path decision collected before anything is staged.
struct Plan {
    files: Vec<FileUpdate>,
    conflicts: Vec<FileConflicts>,
    output: ProjectStructure,
    removals: Vec<RelativePath>,
    warnings: Vec<String>,
}

impl Plan {
    fn new() -> Self {
        Self {
            files: Vec::new(),
            conflicts: Vec::new(),
            output: ProjectStructure::new(),
            removals: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn record(&mut self, path: &RelativePath, state: FileUpdateState) -> KilnResult<()> {
        let mut update = FileUpdate::new(path.clone());
        if state != FileUpdateState::Unchanged {
            update.advance(state)?;
        }
        debug!(path = %path, state = state.name(), "File planned");
        self.files.push(update);
        Ok(())
    }
}

impl ScaffoldService {
    /// Upgrade a generated project to a newer template version.
    #[instrument(skip_all, fields(project = %request.project_dir.display(), strategy = ?request.strategy))]
    pub fn update(&self, request: UpdateRequest) -> KilnResult<UpdateReport> {
        let dir = request.project_dir.as_path();
        let meta = self.read_metadata(dir)?;

        let ResolvedTemplate {
            template: old,
            warnings: old_warnings,
        } = self.resolve_recorded(&meta)?;
        let ResolvedTemplate {
            template: new,
            warnings: new_warnings,
        } = self.resolve_target(&meta, request.target_version.as_ref())?;
        let mut warnings = old_warnings;
        warnings.extend(new_warnings);
        info!(from = %old.id, to = %new.id, "Updating project");
        if new.id.version() < old.id.version() {
            warnings.push(format!("{} is older than {}; downgrading", new.id, old.id));
        }

        // Answers: recorded ones still declared are kept, the rest go stale.
        let mut base = VariableMap::new();
        let mut stale = VariableMap::new();
        let mut newly_stale = Vec::new();
        for (name, value) in meta.variables.iter().chain(meta.stale_variables.iter()) {
            if new.variable(name).is_some() {
                base.entry(name.clone()).or_insert_with(|| value.clone());
            } else {
                if meta.variables.contains_key(name) {
                    newly_stale.push(name.clone());
                }
                stale.insert(name.clone(), value.clone());
            }
        }
        for name in &newly_stale {
            warn!(variable = %name, "Variable no longer declared");
            warnings.push(format!(
                "variable '{name}' is no longer declared by {}; its value is kept in metadata",
                new.id
            ));
        }
        let collected = VariableCollector::new(self.prompter.as_deref()).collect(
            &new.variables,
            &request.variables,
            &base,
            request.interactive,
        )?;
        warnings.extend(collected.warnings);
        let vars = collected.values;

        let old_render = self.render_full(&old, &meta.variables, &meta.modules, &mut Vec::new())?;
        let new_render = self.render_full(&new, &vars, &meta.modules, &mut warnings)?;

        let mut plan = Plan::new();
        let paths: BTreeSet<&RelativePath> = old_render.paths().chain(new_render.paths()).collect();
        let mut ledger = meta.files.clone();
        for path in paths {
            self.cancel.check()?;
            match new_render.get(path) {
                Some(theirs) => {
                    let theirs_bytes = self.file_bytes(theirs)?;
                    ledger.insert(path.clone(), content_hash(&theirs_bytes));
                    let base_bytes = match old_render.get(path) {
                        Some(file) => Some(self.file_bytes(file)?),
                        None => None,
                    };
                    self.plan_present(
                        dir,
                        &meta,
                        &request,
                        theirs,
                        &theirs_bytes,
                        base_bytes.as_deref(),
                        &mut plan,
                    )?;
                }
                None => {
                    ledger.remove(path);
                    self.plan_removed(dir, &meta, &request, path, &mut plan)?;
                }
            }
        }
        warnings.append(&mut plan.warnings);

        // Metadata travels in the same publish.
        let mut next = meta.clone();
        next.run_id = Uuid::new_v4();
        next.template = TemplateLineage {
            name: new.id.name().to_string(),
            version: new.id.version().clone(),
            source: new.source.clone(),
        };
        next.variables = vars;
        next.stale_variables = stale;
        next.generated_at = Utc::now();
        next.files = ledger;
        let meta_path = metadata_path()?;
        plan.output
            .upsert(FileToWrite::text(meta_path.clone(), next.to_json()?));

        let conflicted: BTreeSet<&RelativePath> = plan.conflicts.iter().map(|c| &c.path).collect();
        let checked = |p: &RelativePath| {
            *p != meta_path && !conflicted.contains(p) && !is_sidecar(p.as_str())
        };
        let staged: Vec<RelativePath> = plan.output.paths().filter(|p| checked(*p)).cloned().collect();
        let written = self.publish_over(dir, &plan.output, &plan.removals, &new, staged)?;

        let linted: Vec<RelativePath> = written.into_iter().filter(|p| checked(p)).collect();
        let quality = if linted.is_empty() {
            Vec::new()
        } else {
            self.lint_gate(&new, dir, linted, &mut warnings).warnings
        };

        let unresolved_conflict_count = self.count_unresolved(dir)?;
        info!(
            files = plan.files.len(),
            conflicts = plan.conflicts.len(),
            unresolved = unresolved_conflict_count,
            "Update published"
        );

        Ok(UpdateReport {
            from: old.id.clone(),
            to: new.id.clone(),
            files: plan.files,
            conflicts: plan.conflicts,
            unresolved_conflict_count,
            stale_variables: next.stale_variables.keys().cloned().collect(),
            warnings,
            quality,
        })
    }

    /// `false` while any file carries conflict markers or a sidecar exists.
    pub fn validate_resolved(&self, dir: &Path) -> KilnResult<bool> {
        Ok(self.count_unresolved(dir)? == 0)
    }

    // ------ Internal Helpers ------

    /// Files with conflict markers plus template sidecars under `dir`.
    fn count_unresolved(&self, dir: &Path) -> KilnResult<usize> {
        let mut count = 0;
        for path in self.filesystem.list_files(dir)? {
            if path.as_str().starts_with(".git/") {
                continue;
            }
            if is_sidecar(path.as_str()) {
                count += 1;
                continue;
            }
            let bytes = self.filesystem.read_file(&path.under(dir))?;
            if std::str::from_utf8(&bytes).is_ok_and(has_conflict_markers) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Explicit version from cache or source; otherwise the newest of
    /// source and cache.
    fn resolve_target(
        &self,
        meta: &ProjectMetadata,
        version: Option<&Version>,
    ) -> KilnResult<ResolvedTemplate> {
        let name = meta.template.name.clone();
        let source = source_ref(&meta.template.source);

        if let Some(version) = version {
            let cached = TemplateRef::Cached {
                name: name.clone(),
                version: Some(version.clone()),
            };
            if let Ok(resolved) = self.store.resolve(&cached) {
                return Ok(resolved);
            }
            let resolved = self.store.resolve(&source)?;
            if resolved.template.id.version() == version {
                return Ok(resolved);
            }
            return Err(ApplicationError::UnknownTemplate {
                reference: format!("{name}@{version}"),
            }
            .into());
        }

        let from_source = self.store.resolve(&source);
        let from_cache = self.store.resolve(&TemplateRef::Cached { name, version: None });
        match (from_source, from_cache) {
            (Ok(a), Ok(b)) => Ok(if b.template.id.version() > a.template.id.version() {
                b
            } else {
                a
            }),
            (Ok(a), Err(_)) => Ok(a),
            (Err(e), Ok(mut b)) => {
                warn!(error = %e, "Source unavailable; using newest cached version");
                b.warnings
                    .push(format!("template source unavailable ({e}); newest cached version used"));
                Ok(b)
            }
            (Err(e), Err(_)) => Err(e),
        }
    }

    /// A path the new render produces.
    #[allow(clippy::too_many_arguments)]
    fn plan_present(
        &self,
        dir: &Path,
        meta: &ProjectMetadata,
        request: &UpdateRequest,
        theirs: &FileToWrite,
        theirs_bytes: &[u8],
        base_bytes: Option<&[u8]>,
        plan: &mut Plan,
    ) -> KilnResult<()> {
        let path = &theirs.path;
        let Some(ours) = self.read_if_exists(&path.under(dir))? else {
            // Deleted by the user: respected while the template leaves it alone.
            if base_bytes == Some(theirs_bytes) {
                return plan.record(path, FileUpdateState::Unchanged);
            }
            if base_bytes.is_some() {
                plan.warnings
                    .push(format!("{path} was deleted locally but changed upstream; restored"));
            }
            plan.output.upsert(theirs.clone());
            return plan.record(path, FileUpdateState::Added);
        };

        if ours == theirs_bytes {
            return plan.record(path, FileUpdateState::Unchanged);
        }
        let modified = meta.is_modified(path, &ours);

        match request.strategy {
            UpdateStrategy::TakeTemplate => {
                plan.output.upsert(theirs.clone());
                plan.record(path, FileUpdateState::TookTemplate)
            }
            UpdateStrategy::KeepLocal if modified => plan.record(path, FileUpdateState::KeptLocal),
            UpdateStrategy::KeepLocal => {
                plan.output.upsert(theirs.clone());
                plan.record(path, FileUpdateState::CleanMerge)
            }
            UpdateStrategy::ThreeWayMerge => {
                let base = base_bytes.unwrap_or_default();
                if base == theirs_bytes {
                    // Template unchanged; the user's version stands.
                    return plan.record(path, FileUpdateState::Unchanged);
                }
                if base == ours.as_slice() {
                    plan.output.upsert(theirs.clone());
                    return plan.record(path, FileUpdateState::CleanMerge);
                }
                plan_merge(path, theirs, &ours, base, plan)
            }
        }
    }

    /// A path only the old render produces.
    fn plan_removed(
        &self,
        dir: &Path,
        meta: &ProjectMetadata,
        request: &UpdateRequest,
        path: &RelativePath,
        plan: &mut Plan,
    ) -> KilnResult<()> {
        let Some(ours) = self.read_if_exists(&path.under(dir))? else {
            return plan.record(path, FileUpdateState::Removed);
        };
        let modified = meta.is_modified(path, &ours);
        if request.delete_removed && !modified {
            plan.removals.push(path.clone());
            return plan.record(path, FileUpdateState::Removed);
        }
        plan.warnings.push(if modified {
            format!("{path} was removed from the template but has local changes; kept")
        } else {
            format!("{path} was removed from the template; kept (use --delete-removed)")
        });
        plan.record(path, FileUpdateState::RemovedFlagged)
    }
}

/// Both sides changed the file.
fn plan_merge(
    path: &RelativePath,
    theirs: &FileToWrite,
    ours: &[u8],
    base: &[u8],
    plan: &mut Plan,
) -> KilnResult<()> {
    let texts = (
        std::str::from_utf8(base),
        std::str::from_utf8(ours),
        theirs.content.as_text(),
    );
    let (Ok(base), Ok(ours), Some(theirs_text)) = texts else {
        warn!(path = %path, "Binary file changed on both sides");
        plan.output.upsert(FileToWrite {
            path: path.with_suffix(SIDECAR_SUFFIX),
            content: theirs.content.clone(),
            permissions: theirs.permissions,
        });
        plan.conflicts.push(FileConflicts {
            path: path.clone(),
            regions: Vec::new(),
        });
        plan.warnings.push(format!(
            "{path}: binary file changed on both sides; template version written to {}",
            path.with_suffix(SIDECAR_SUFFIX)
        ));
        return plan.record(path, FileUpdateState::MergeFailed);
    };

    let state = match merge3(base, ours, theirs_text) {
        MergeResult::Clean(content) => {
            plan.output.upsert(FileToWrite {
                path: path.clone(),
                content: FileContent::Text(content),
                permissions: theirs.permissions,
            });
            FileUpdateState::CleanMerge
        }
        MergeResult::Conflicted { content, regions } => {
            plan.output.upsert(FileToWrite {
                path: path.clone(),
                content: FileContent::Text(content),
                permissions: theirs.permissions,
            });
            plan.conflicts.push(FileConflicts {
                path: path.clone(),
                regions,
            });
            FileUpdateState::Conflicted
        }
    };
    plan.record(path, state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::atomic::OverwriteMode;
    use crate::application::ports::{
        MockHookRunner, MockQualityGate, QualityFinding, QualityPhase, QualityReport,
    };
    use crate::application::results::{GenerateOptions, GenerateRequest, UpdateOutcome};
    use crate::application::test_support::{
        DiskFs, SequentialRenderer, StaticStore, dir_entries, read, template, write,
    };
    use crate::domain::{Template, VariableValue};
    use crate::error::ErrorKind;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    // ── fixtures ─────────────────────────────────────────────────────────

    const NOTES_V1: &str = "alpha\nbeta\ngamma\ndelta\n";

    fn v1() -> Template {
        template(
            "svc@1.0.0",
            &[
                ("README.md", "# {{ project_name }}\n"),
                ("notes.txt", NOTES_V1),
                ("old.txt", "legacy\n"),
                ("LICENSE", "MIT\n"),
            ],
        )
    }

    fn v2(notes: &str) -> Template {
        let mut t = template(
            "svc@1.1.0",
            &[
                ("README.md", "# {{ project_name }}\n\nNow with docs.\n"),
                ("notes.txt", notes),
                ("new.txt", "fresh\n"),
                ("LICENSE", "MIT\n"),
            ],
        );
        t.variables.retain(|v| v.name != "use_docker");
        t
    }

    fn service(templates: Vec<Template>) -> ScaffoldService {
        let mut quality = MockQualityGate::new();
        quality
            .expect_check()
            .returning(|_| Ok(QualityReport::default()));
        service_with(templates, quality)
    }

    /// Syntax checks fail whenever `new.txt` is among the checked files.
    fn rejecting_new_txt() -> MockQualityGate {
        let mut quality = MockQualityGate::new();
        quality.expect_check().returning(|req| {
            let broken = req.phase == QualityPhase::Syntax
                && req.files.iter().any(|p| p.as_str() == "new.txt");
            Ok(QualityReport {
                errors: if broken {
                    vec![QualityFinding {
                        check: "syntax".into(),
                        path: RelativePath::try_new("new.txt").ok(),
                        message: "unexpected token".into(),
                    }]
                } else {
                    Vec::new()
                },
                ..QualityReport::default()
            })
        });
        quality
    }

    fn service_with(templates: Vec<Template>, quality: MockQualityGate) -> ScaffoldService {
        let mut hooks = MockHookRunner::new();
        hooks.expect_run().never();
        ScaffoldService::new(
            Box::new(StaticStore::new(
                templates.into_iter().map(Arc::new).collect(),
            )),
            Box::new(SequentialRenderer),
            Box::new(DiskFs::new()),
            Box::new(hooks),
            Box::new(quality),
        )
    }

    /// A project generated from 1.0.0, ready to be updated.
    fn generated(svc: &ScaffoldService) -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("shop");
        svc.generate(GenerateRequest {
            template: TemplateRef::parse("svc@1.0.0").unwrap(),
            output_dir: dir.clone(),
            variables: VariableMap::new(),
            options: GenerateOptions {
                overwrite: OverwriteMode::Reject,
                ..GenerateOptions::default()
            },
        })
        .unwrap();
        (tmp, dir)
    }

    fn request(dir: &Path) -> UpdateRequest {
        UpdateRequest {
            project_dir: dir.to_path_buf(),
            target_version: None,
            strategy: UpdateStrategy::ThreeWayMerge,
            delete_removed: false,
            variables: VariableMap::new(),
            interactive: false,
        }
    }

    fn state_of(report: &UpdateReport, path: &str) -> FileUpdateState {
        report
            .files
            .iter()
            .find(|f| f.path.as_str() == path)
            .map(|f| f.state)
            .unwrap_or_else(|| panic!("{path} not in report"))
    }

    fn metadata(dir: &Path) -> ProjectMetadata {
        ProjectMetadata::from_json(&read(dir, crate::domain::METADATA_FILE)).unwrap()
    }

    // ── merging ──────────────────────────────────────────────────────────

    #[test]
    fn untouched_files_take_the_new_version() {
        let svc = service(vec![v1(), v2("alpha\nbeta\ngamma\ndelta\nepsilon\n")]);
        let (_tmp, dir) = generated(&svc);

        let report = svc.update(request(&dir)).unwrap();

        assert_eq!(report.from.to_string(), "svc@1.0.0");
        assert_eq!(report.to.to_string(), "svc@1.1.0");
        assert_eq!(state_of(&report, "README.md"), FileUpdateState::CleanMerge);
        assert_eq!(state_of(&report, "LICENSE"), FileUpdateState::Unchanged);
        assert_eq!(state_of(&report, "new.txt"), FileUpdateState::Added);
        assert_eq!(read(&dir, "README.md"), "# shop\n\nNow with docs.\n");
        assert_eq!(read(&dir, "new.txt"), "fresh\n");
        assert_eq!(report.outcome(), UpdateOutcome::Success);
        assert_eq!(metadata(&dir).template.version, Version::new(1, 1, 0));
    }

    #[test]
    fn disjoint_edits_merge_cleanly() {
        let svc = service(vec![v1(), v2("alpha\nbeta\ngamma\ndelta\nepsilon\n")]);
        let (_tmp, dir) = generated(&svc);
        write(&dir, "notes.txt", "ALPHA\nbeta\ngamma\ndelta\n");

        let report = svc.update(request(&dir)).unwrap();

        assert_eq!(state_of(&report, "notes.txt"), FileUpdateState::CleanMerge);
        assert_eq!(read(&dir, "notes.txt"), "ALPHA\nbeta\ngamma\ndelta\nepsilon\n");
        assert!(report.conflicts.is_empty());
        assert!(svc.validate_resolved(&dir).unwrap());
    }

    #[test]
    fn overlapping_edits_leave_markers() {
        let svc = service(vec![v1(), v2("alpha\nbeta-v2\ngamma\ndelta\n")]);
        let (_tmp, dir) = generated(&svc);
        write(&dir, "notes.txt", "alpha\nbeta-user\ngamma\ndelta\n");

        let report = svc.update(request(&dir)).unwrap();

        assert_eq!(state_of(&report, "notes.txt"), FileUpdateState::Conflicted);
        assert_eq!(report.conflicts.len(), 1);
        assert!(!report.conflicts[0].regions.is_empty());
        let merged = read(&dir, "notes.txt");
        assert!(has_conflict_markers(&merged));
        assert!(merged.contains("beta-user"));
        assert!(merged.contains("beta-v2"));
        assert_eq!(report.unresolved_conflict_count, 1);
        assert_eq!(report.outcome(), UpdateOutcome::SuccessWithConflicts);
        assert!(!svc.validate_resolved(&dir).unwrap());

        write(&dir, "notes.txt", "alpha\nbeta-both\ngamma\ndelta\n");
        assert!(svc.validate_resolved(&dir).unwrap());
    }

    #[test]
    fn user_edit_survives_when_template_did_not_change_the_file() {
        let svc = service(vec![v1(), v2(NOTES_V1)]);
        let (_tmp, dir) = generated(&svc);
        write(&dir, "LICENSE", "Apache-2.0\n");

        let report = svc.update(request(&dir)).unwrap();

        assert_eq!(state_of(&report, "LICENSE"), FileUpdateState::Unchanged);
        assert_eq!(read(&dir, "LICENSE"), "Apache-2.0\n");
    }

    // ── strategies ───────────────────────────────────────────────────────

    #[test]
    fn keep_local_leaves_modified_files_alone() {
        let svc = service(vec![v1(), v2("alpha\nbeta-v2\ngamma\ndelta\n")]);
        let (_tmp, dir) = generated(&svc);
        write(&dir, "notes.txt", "mine\n");

        let report = svc
            .update(UpdateRequest {
                strategy: UpdateStrategy::KeepLocal,
                ..request(&dir)
            })
            .unwrap();

        assert_eq!(state_of(&report, "notes.txt"), FileUpdateState::KeptLocal);
        assert_eq!(state_of(&report, "README.md"), FileUpdateState::CleanMerge);
        assert_eq!(read(&dir, "notes.txt"), "mine\n");
    }

    #[test]
    fn take_template_overwrites_local_edits() {
        let svc = service(vec![v1(), v2("alpha\nbeta-v2\ngamma\ndelta\n")]);
        let (_tmp, dir) = generated(&svc);
        write(&dir, "notes.txt", "mine\n");

        let report = svc
            .update(UpdateRequest {
                strategy: UpdateStrategy::TakeTemplate,
                ..request(&dir)
            })
            .unwrap();

        assert_eq!(state_of(&report, "notes.txt"), FileUpdateState::TookTemplate);
        assert_eq!(read(&dir, "notes.txt"), "alpha\nbeta-v2\ngamma\ndelta\n");
        assert!(svc.validate_resolved(&dir).unwrap());
    }

    // ── removals ─────────────────────────────────────────────────────────

    #[test]
    fn dropped_files_are_flagged_by_default() {
        let svc = service(vec![v1(), v2(NOTES_V1)]);
        let (_tmp, dir) = generated(&svc);

        let report = svc.update(request(&dir)).unwrap();

        assert_eq!(state_of(&report, "old.txt"), FileUpdateState::RemovedFlagged);
        assert!(dir.join("old.txt").exists());
        assert!(report.warnings.iter().any(|w| w.contains("old.txt")));
        assert!(!metadata(&dir).files.keys().any(|p| p.as_str() == "old.txt"));
    }

    #[test]
    fn dropped_files_are_deleted_on_request_unless_edited() {
        let svc = service(vec![v1(), v2(NOTES_V1)]);
        let (_tmp, dir) = generated(&svc);

        let report = svc
            .update(UpdateRequest {
                delete_removed: true,
                ..request(&dir)
            })
            .unwrap();
        assert_eq!(state_of(&report, "old.txt"), FileUpdateState::Removed);
        assert!(!dir.join("old.txt").exists());

        let svc = service(vec![v1(), v2(NOTES_V1)]);
        let (_tmp2, dir) = generated(&svc);
        write(&dir, "old.txt", "still needed\n");
        let report = svc
            .update(UpdateRequest {
                delete_removed: true,
                ..request(&dir)
            })
            .unwrap();
        assert_eq!(state_of(&report, "old.txt"), FileUpdateState::RemovedFlagged);
        assert_eq!(read(&dir, "old.txt"), "still needed\n");
    }

    #[test]
    fn deleted_file_stays_deleted_when_template_unchanged() {
        let svc = service(vec![v1(), v2(NOTES_V1)]);
        let (_tmp, dir) = generated(&svc);
        std::fs::remove_file(dir.join("LICENSE")).unwrap();

        let report = svc.update(request(&dir)).unwrap();

        assert_eq!(state_of(&report, "LICENSE"), FileUpdateState::Unchanged);
        assert!(!dir.join("LICENSE").exists());
    }

    // ── variables & versions ─────────────────────────────────────────────

    #[test]
    fn undeclared_variables_are_kept_as_stale() {
        let svc = service(vec![v1(), v2(NOTES_V1)]);
        let (_tmp, dir) = generated(&svc);

        let report = svc.update(request(&dir)).unwrap();

        assert_eq!(report.stale_variables, vec!["use_docker".to_string()]);
        assert!(report.warnings.iter().any(|w| w.contains("use_docker")));
        let meta = metadata(&dir);
        assert_eq!(
            meta.stale_variables.get("use_docker"),
            Some(&VariableValue::from(false))
        );
        assert!(!meta.variables.contains_key("use_docker"));
        assert_eq!(
            meta.variables.get("project_name"),
            Some(&VariableValue::from("shop"))
        );
    }

    #[test]
    fn same_version_is_a_noop() {
        let svc = service(vec![v1()]);
        let (_tmp, dir) = generated(&svc);

        let report = svc.update(request(&dir)).unwrap();

        assert!(report.is_noop());
        assert_eq!(report.outcome(), UpdateOutcome::Success);
    }

    #[test]
    fn unknown_target_version_is_rejected() {
        let svc = service(vec![v1(), v2(NOTES_V1)]);
        let (_tmp, dir) = generated(&svc);

        let err = svc
            .update(UpdateRequest {
                target_version: Some(Version::new(9, 0, 0)),
                ..request(&dir)
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnknownTemplate);
        assert_eq!(read(&dir, "notes.txt"), NOTES_V1);
    }

    #[test]
    fn project_without_metadata_cannot_update() {
        let svc = service(vec![v1()]);
        let tmp = TempDir::new().unwrap();

        let err = svc.update(request(tmp.path())).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MetadataMissing);
    }

    // ── quality ──────────────────────────────────────────────────────────

    #[test]
    fn syntax_errors_in_the_new_version_publish_nothing() {
        let svc = service_with(vec![v1(), v2(NOTES_V1)], rejecting_new_txt());
        let (tmp, dir) = generated(&svc);
        let before = read(&dir, crate::domain::METADATA_FILE);

        let err = svc.update(request(&dir)).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::QualityFailed);
        assert!(!dir.join("new.txt").exists());
        assert_eq!(read(&dir, "README.md"), "# shop\n");
        assert_eq!(read(&dir, crate::domain::METADATA_FILE), before);
        assert_eq!(metadata(&dir).template.version, Version::new(1, 0, 0));
        assert_eq!(dir_entries(tmp.path()), vec!["shop".to_string()]);
    }
}
