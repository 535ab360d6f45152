//! Adding a module to an existing project.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::scaffold_service::{ScaffoldService, join_paths, metadata_path};
use crate::{
    application::{
        ApplicationError,
        ports::{RenderScope, ResolvedTemplate},
        results::{ModuleRequest, ModuleResult},
        variables::VariableCollector,
    },
    domain::{
        DomainValidator as validator, FileToWrite, ModuleRecord, ModuleSpec, RelativePath,
        VariableMap, VariableValue,
    },
    error::KilnResult,
};

/// Variable every module tree can reference.
pub const MODULE_NAME_VARIABLE: &str = "module_name";

/// A file being edited by dependency and import insertions.
struct PendingEdit {
    original: String,
    text: String,
}

impl ScaffoldService {
    /// Add a module of `module_type` named `module_name` to a generated project.
    #[instrument(
        skip_all,
        fields(
            project = %request.project_dir.display(),
            module_type = %request.module_type,
            module = %request.module_name
        )
    )]
    pub fn add_module(&self, request: ModuleRequest) -> KilnResult<ModuleResult> {
        validator::validate_module_name(&request.module_name)?;
        let dir = request.project_dir.as_path();

        let mut meta = self.read_metadata(dir)?;
        let ResolvedTemplate {
            template,
            mut warnings,
        } = self.resolve_recorded(&meta)?;

        let spec = template.module(&request.module_type).ok_or_else(|| {
            ApplicationError::UnknownModule {
                template: template.id.to_string(),
                module_type: request.module_type.clone(),
                available: template.modules.iter().map(|m| m.module_type.clone()).collect(),
            }
        })?;

        if meta.module(&request.module_name).is_some() {
            return Err(ApplicationError::ModuleConflict {
                reason: format!("a module named '{}' already exists", request.module_name),
            }
            .into());
        }
        if spec.singleton && meta.has_module_type(&spec.module_type) {
            return Err(ApplicationError::ModuleConflict {
                reason: format!(
                    "module type '{}' allows one instance and the project already has it",
                    spec.module_type
                ),
            }
            .into());
        }

        // Project answers plus module_name, then the module's own variables.
        let mut base = meta.variables.clone();
        base.insert(
            MODULE_NAME_VARIABLE.to_string(),
            VariableValue::String(request.module_name.clone()),
        );
        let collected = VariableCollector::new(self.prompter.as_deref()).collect(
            &spec.variables,
            &request.variables,
            &base,
            request.interactive,
        )?;
        warnings.extend(collected.warnings);
        let vars = collected.values;

        let rendered = self.renderer.render(
            &template,
            &RenderScope::Module(spec.module_type.clone()),
            &vars,
        )?;
        validator::validate_project_structure(&rendered)?;

        let collisions: Vec<&RelativePath> = rendered
            .paths()
            .filter(|p| self.filesystem.exists(&p.under(dir)))
            .collect();
        if !collisions.is_empty() {
            return Err(ApplicationError::ModuleConflict {
                reason: format!(
                    "module files already exist: {}",
                    join_paths(collisions.into_iter())
                ),
            }
            .into());
        }

        let edits = self.apply_edits(dir, spec, &vars, &mut warnings)?;

        // Ledger and module record
        let files: Vec<RelativePath> = rendered.paths().cloned().collect();
        for file in rendered.files() {
            meta.record_file(file.path.clone(), &self.file_bytes(file)?);
        }
        meta.modules.push(ModuleRecord {
            module_type: spec.module_type.clone(),
            name: request.module_name.clone(),
            template_version: template.id.version().clone(),
            added_at: Utc::now(),
            variables: module_answers(spec, &vars),
            files: files.clone(),
        });
        meta.run_id = Uuid::new_v4();

        let mut output = rendered;
        let mut modified = Vec::new();
        for (path, edit) in edits {
            if edit.text != edit.original {
                output.upsert(FileToWrite::text(path.clone(), edit.text));
                modified.push(path);
            }
        }
        output.upsert(FileToWrite::text(metadata_path()?, meta.to_json()?));

        let checked: Vec<RelativePath> = files.iter().chain(&modified).cloned().collect();
        self.publish_over(dir, &output, &[], &template, checked.clone())?;
        let quality = self.lint_gate(&template, dir, checked, &mut warnings);
        info!(
            files = files.len(),
            modified = modified.len(),
            "Module added"
        );

        Ok(ModuleResult {
            module_type: spec.module_type.clone(),
            name: request.module_name,
            files,
            modified,
            warnings,
            quality,
        })
    }

    // ------ Internal Helpers ------

    /// Render and apply every dependency addition and import insertion.
    /// Missing files and anchors are warnings.
    fn apply_edits(
        &self,
        dir: &Path,
        spec: &ModuleSpec,
        vars: &VariableMap,
        warnings: &mut Vec<String>,
    ) -> KilnResult<BTreeMap<RelativePath, PendingEdit>> {
        let mut edits: BTreeMap<RelativePath, PendingEdit> = BTreeMap::new();

        for dependency in &spec.dependencies {
            let path = RelativePath::try_new(dependency.file.render(vars))?;
            let Some(edit) = self.pending_edit(dir, &path, &mut edits, warnings)? else {
                continue;
            };
            for line in &dependency.lines {
                let line = line.render(vars);
                if line.trim().is_empty() || contains_line(&edit.text, &line) {
                    continue;
                }
                ensure_trailing_newline(&mut edit.text);
                edit.text.push_str(&line);
                edit.text.push('\n');
            }
        }

        for import in &spec.imports {
            let path = RelativePath::try_new(import.file.render(vars))?;
            let Some(edit) = self.pending_edit(dir, &path, &mut edits, warnings)? else {
                continue;
            };
            let line = import.line.render(vars);
            if line.trim().is_empty() || contains_line(&edit.text, &line) {
                continue;
            }
            match insert_after_anchor(&edit.text, &import.anchor, &line) {
                Some(text) => edit.text = text,
                None => {
                    warn!(file = %path, anchor = %import.anchor, "Import anchor not found");
                    warnings.push(format!(
                        "anchor '{}' not found in {path}; import not inserted",
                        import.anchor
                    ));
                }
            }
        }

        Ok(edits)
    }

    fn pending_edit<'e>(
        &self,
        dir: &Path,
        path: &RelativePath,
        edits: &'e mut BTreeMap<RelativePath, PendingEdit>,
        warnings: &mut Vec<String>,
    ) -> KilnResult<Option<&'e mut PendingEdit>> {
        if !edits.contains_key(path) {
            let Some(bytes) = self.read_if_exists(&path.under(dir))? else {
                warn!(file = %path, "Dependency file missing");
                warnings.push(format!("{path} not found; module edits to it skipped"));
                return Ok(None);
            };
            let Ok(text) = String::from_utf8(bytes) else {
                warnings.push(format!("{path} is not UTF-8; module edits to it skipped"));
                return Ok(None);
            };
            edits.insert(
                path.clone(),
                PendingEdit {
                    original: text.clone(),
                    text,
                },
            );
        }
        Ok(edits.get_mut(path))
    }
}

/// Answers stored on the module record: `module_name` plus the module's
/// declared variables.
fn module_answers(spec: &ModuleSpec, vars: &VariableMap) -> VariableMap {
    vars.iter()
        .filter(|(name, _)| {
            name.as_str() == MODULE_NAME_VARIABLE || spec.variables.iter().any(|d| &d.name == *name)
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn contains_line(text: &str, line: &str) -> bool {
    let wanted = line.trim();
    text.lines().any(|l| l.trim() == wanted)
}

fn ensure_trailing_newline(text: &mut String) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}

/// Insert `line` after the first line containing `anchor`.
fn insert_after_anchor(text: &str, anchor: &str, line: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len() + line.len() + 1);
    let mut inserted = false;
    for current in text.split_inclusive('\n') {
        out.push_str(current);
        if !inserted && current.contains(anchor) {
            if !current.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(line);
            out.push('\n');
            inserted = true;
        }
    }
    inserted.then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        MockHookRunner, MockQualityGate, QualityFinding, QualityPhase, QualityReport,
    };
    use crate::application::results::Outcome;
    use crate::application::results::{GenerateOptions, GenerateRequest};
    use crate::application::test_support::{
        DiskFs, SequentialRenderer, StaticStore, read, template, text_file,
    };
    use crate::domain::lang::{NoPartials, compile};
    use crate::domain::{
        DependencyEdit, ImportEdit, METADATA_FILE, ProjectMetadata, Template, TemplateRef,
    };
    use crate::error::ErrorKind;
    use std::sync::Arc;
    use tempfile::TempDir;

    // ── fixtures ─────────────────────────────────────────────────────────

    fn program(src: &str) -> crate::domain::lang::Program {
        compile("inline", src, &NoPartials).unwrap()
    }

    fn api_template() -> Template {
        let mut tpl = template(
            "svc@1.0.0",
            &[
                ("Cargo.toml", "[package]\nname = \"{{ project_name }}\"\n\n[dependencies]\n"),
                ("src/main.rs", "mod routes;\n\nfn main() {}\n"),
            ],
        );
        tpl.modules = vec![
            ModuleSpec {
                module_type: "handler".into(),
                description: None,
                files: vec![text_file(
                    "src/{{ module_name }}.rs",
                    "// {{ module_name | pascal }} handler\n",
                )],
                variables: Vec::new(),
                singleton: false,
                dependencies: vec![DependencyEdit {
                    file: program("Cargo.toml"),
                    lines: vec![program("axum = \"0.7\"")],
                }],
                imports: vec![ImportEdit {
                    file: program("src/main.rs"),
                    anchor: "mod routes;".into(),
                    line: program("mod {{ module_name }};"),
                }],
            },
            ModuleSpec {
                module_type: "database".into(),
                description: None,
                files: vec![text_file("src/db.rs", "// db\n")],
                variables: Vec::new(),
                singleton: true,
                dependencies: Vec::new(),
                imports: Vec::new(),
            },
        ];
        tpl
    }

    fn service() -> ScaffoldService {
        let mut quality = MockQualityGate::new();
        quality
            .expect_check()
            .returning(|_| Ok(QualityReport::default()));
        service_with(quality)
    }

    /// Reports one finding against `src/billing.rs` in `phase`.
    fn flag_billing(phase: QualityPhase) -> MockQualityGate {
        let mut quality = MockQualityGate::new();
        quality.expect_check().returning(move |req| {
            let hit = req.phase == phase
                && req.files.iter().any(|p| p.as_str() == "src/billing.rs");
            Ok(QualityReport {
                errors: if hit {
                    vec![QualityFinding {
                        check: "syntax".into(),
                        path: RelativePath::try_new("src/billing.rs").ok(),
                        message: "unbalanced brace".into(),
                    }]
                } else {
                    Vec::new()
                },
                ..QualityReport::default()
            })
        });
        quality
    }

    fn service_with(quality: MockQualityGate) -> ScaffoldService {
        ScaffoldService::new(
            Box::new(StaticStore::new(vec![Arc::new(api_template())])),
            Box::new(SequentialRenderer),
            Box::new(DiskFs::new()),
            Box::new(MockHookRunner::new()),
            Box::new(quality),
        )
    }

    fn generated(tmp: &TempDir) -> std::path::PathBuf {
        let out = tmp.path().join("shop");
        service()
            .generate(GenerateRequest {
                template: TemplateRef::parse("svc").unwrap(),
                output_dir: out.clone(),
                variables: VariableMap::new(),
                options: GenerateOptions::default(),
            })
            .unwrap();
        out
    }

    fn add(dir: &Path, module_type: &str, name: &str) -> KilnResult<ModuleResult> {
        service().add_module(ModuleRequest {
            project_dir: dir.to_path_buf(),
            module_type: module_type.into(),
            module_name: name.into(),
            variables: VariableMap::new(),
            interactive: false,
        })
    }

    // ── add_module ───────────────────────────────────────────────────────

    #[test]
    fn adds_files_dependencies_and_imports() {
        let tmp = TempDir::new().unwrap();
        let dir = generated(&tmp);

        let result = add(&dir, "handler", "billing").unwrap();

        assert_eq!(read(&dir, "src/billing.rs"), "// Billing handler\n");
        assert!(read(&dir, "Cargo.toml").ends_with("[dependencies]\naxum = \"0.7\"\n"));
        assert_eq!(
            read(&dir, "src/main.rs"),
            "mod routes;\nmod billing;\n\nfn main() {}\n"
        );
        assert_eq!(result.files, vec![RelativePath::try_new("src/billing.rs").unwrap()]);
        assert_eq!(result.modified.len(), 2);

        let meta = ProjectMetadata::from_json(&read(&dir, METADATA_FILE)).unwrap();
        let record = meta.module("billing").unwrap();
        assert_eq!(record.module_type, "handler");
        assert_eq!(
            record.variables.get(MODULE_NAME_VARIABLE),
            Some(&VariableValue::from("billing"))
        );
    }

    #[test]
    fn second_module_does_not_repeat_dependency_lines() {
        let tmp = TempDir::new().unwrap();
        let dir = generated(&tmp);
        add(&dir, "handler", "billing").unwrap();
        add(&dir, "handler", "orders").unwrap();

        let cargo = read(&dir, "Cargo.toml");
        assert_eq!(cargo.matches("axum").count(), 1);
        assert!(read(&dir, "src/main.rs").contains("mod orders;\nmod billing;\n"));
    }

    #[test]
    fn duplicate_names_and_singletons_conflict() {
        let tmp = TempDir::new().unwrap();
        let dir = generated(&tmp);
        add(&dir, "handler", "billing").unwrap();
        let err = add(&dir, "handler", "billing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModuleConflict);

        add(&dir, "database", "db").unwrap();
        let err = add(&dir, "database", "db2").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModuleConflict);
    }

    #[test]
    fn colliding_files_conflict() {
        let tmp = TempDir::new().unwrap();
        let dir = generated(&tmp);
        std::fs::write(dir.join("src/db.rs"), "// mine\n").unwrap();
        let err = add(&dir, "database", "db").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModuleConflict);
        assert_eq!(read(&dir, "src/db.rs"), "// mine\n");
    }

    #[test]
    fn rejects_unknown_types_and_bad_names() {
        let tmp = TempDir::new().unwrap();
        let dir = generated(&tmp);
        let err = add(&dir, "queue", "jobs").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownModule);
        assert!(err.suggestions()[0].contains("handler, database"));

        let err = add(&dir, "handler", "bad-name").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidModuleName);
    }

    #[test]
    fn requires_generation_metadata() {
        let tmp = TempDir::new().unwrap();
        let err = add(tmp.path(), "handler", "billing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MetadataMissing);
    }

    #[test]
    fn missing_anchor_is_a_warning() {
        let tmp = TempDir::new().unwrap();
        let dir = generated(&tmp);
        std::fs::write(dir.join("src/main.rs"), "fn main() {}\n").unwrap();
        let result = add(&dir, "handler", "billing").unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("anchor 'mod routes;'")));
        assert_eq!(read(&dir, "src/main.rs"), "fn main() {}\n");
    }

    #[test]
    fn syntax_errors_in_module_files_publish_nothing() {
        let tmp = TempDir::new().unwrap();
        let dir = generated(&tmp);
        let cargo = read(&dir, "Cargo.toml");

        let err = service_with(flag_billing(QualityPhase::Syntax))
            .add_module(ModuleRequest {
                project_dir: dir.clone(),
                module_type: "handler".into(),
                module_name: "billing".into(),
                variables: VariableMap::new(),
                interactive: false,
            })
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::QualityFailed);
        assert!(!dir.join("src/billing.rs").exists());
        assert_eq!(read(&dir, "Cargo.toml"), cargo);
        let meta = ProjectMetadata::from_json(&read(&dir, METADATA_FILE)).unwrap();
        assert!(meta.module("billing").is_none());
    }

    #[test]
    fn lint_findings_are_reported_as_quality_warnings() {
        let tmp = TempDir::new().unwrap();
        let dir = generated(&tmp);

        let result = service_with(flag_billing(QualityPhase::Lint))
            .add_module(ModuleRequest {
                project_dir: dir.clone(),
                module_type: "handler".into(),
                module_name: "billing".into(),
                variables: VariableMap::new(),
                interactive: false,
            })
            .unwrap();

        assert_eq!(result.quality.warnings.len(), 1);
        assert_eq!(result.outcome(), Outcome::SuccessWithWarnings);
        assert_eq!(read(&dir, "src/billing.rs"), "// Billing handler\n");
    }

    #[test]
    fn module_file_colliding_with_project_file_is_rejected() {
        let mut tpl = api_template();
        tpl.files.push(text_file("src/db.rs", "// project db\n"));
        let record = ModuleRecord {
            module_type: "database".into(),
            name: "db".into(),
            template_version: tpl.id.version().clone(),
            added_at: Utc::now(),
            variables: VariableMap::new(),
            files: vec![RelativePath::try_new("src/db.rs").unwrap()],
        };

        let mut vars = VariableMap::new();
        vars.insert("project_name".into(), VariableValue::from("shop"));

        let err = service()
            .render_full(&tpl, &vars, &[record], &mut Vec::new())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TemplateSyntaxError);
        assert!(err.to_string().contains("src/db.rs"));
    }

    #[test]
    fn anchor_insertion_helpers() {
        assert_eq!(
            insert_after_anchor("use a;\nfn main() {}", "use a;", "use b;").unwrap(),
            "use a;\nuse b;\nfn main() {}"
        );
        assert_eq!(insert_after_anchor("x", "x", "y").unwrap(), "x\ny\n");
        assert!(insert_after_anchor("x\n", "z", "y").is_none());
        assert!(contains_line("a\n  b  \n", "b"));
    }
}
