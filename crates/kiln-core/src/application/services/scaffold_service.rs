//! Scaffold Service - main application orchestrator.
//!
//! This service coordinates the generation workflow:
//! 1. Resolve the template through the store
//! 2. Collect and validate every variable
//! 3. Render into a staging directory
//! 4. Pre-generate hook and syntax gate
//! 5. Atomic publish, post-generate hook, lint gate
//!
//! `add_module` and `update` live in sibling modules and share the helpers
//! at the bottom of this file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::{
    application::{
        ApplicationError,
        atomic::{AtomicWriter, OverwriteMode, Staging},
        cancel::CancellationToken,
        ports::{
            Filesystem, HookPhase, HookRequest, HookResult, HookRunner, Prompter, QualityGate,
            QualityPhase, QualityReport, QualityRequest, RenderScope, ResolvedTemplate,
            TemplateRenderer, TemplateStore,
        },
        results::{GenerateRequest, GenerationResult},
        variables::VariableCollector,
    },
    domain::{
        DomainError, DomainValidator as validator, FileContent, FileToWrite, METADATA_FILE,
        ModuleRecord, ProjectMetadata, ProjectStructure, RelativePath, SourceDescriptor, Template,
        TemplateRef, VariableMap, VariableValue,
        merge::{SIDECAR_SUFFIX, merge3},
    },
    error::{KilnError, KilnResult},
};

/// Variable filled from the output directory name when not given.
const PROJECT_NAME_VARIABLE: &str = "project_name";

/// Main scaffolding service.
///
/// Orchestrates generation, module addition and template upgrades.
pub struct ScaffoldService {
    pub(super) store: Box<dyn TemplateStore>,
    pub(super) renderer: Box<dyn TemplateRenderer>,
    pub(super) filesystem: Box<dyn Filesystem>,
    pub(super) hooks: Box<dyn HookRunner>,
    pub(super) quality: Box<dyn QualityGate>,
    pub(super) prompter: Option<Box<dyn Prompter>>,
    pub(super) cancel: CancellationToken,
}

impl ScaffoldService {
    /// Create a new scaffold service with the given adapters.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use kiln_core::application::ScaffoldService;
    ///
    /// let service = ScaffoldService::new(
    ///     store,    // impl TemplateStore
    ///     renderer, // impl TemplateRenderer
    ///     fs,       // impl Filesystem
    ///     hooks,    // impl HookRunner
    ///     quality,  // impl QualityGate
    /// )
    /// .with_cancellation(token);
    /// ```
    pub fn new(
        store: Box<dyn TemplateStore>,
        renderer: Box<dyn TemplateRenderer>,
        filesystem: Box<dyn Filesystem>,
        hooks: Box<dyn HookRunner>,
        quality: Box<dyn QualityGate>,
    ) -> Self {
        Self {
            store,
            renderer,
            filesystem,
            hooks,
            quality,
            prompter: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Enable interactive prompting.
    pub fn with_prompter(mut self, prompter: Box<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Share a cancellation token, e.g. one set by a Ctrl-C handler.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Generate a new project from a template.
    #[instrument(
        skip_all,
        fields(
            template = %request.template,
            output = %request.output_dir.display(),
            dry_run = request.options.dry_run
        )
    )]
    pub fn generate(&self, request: GenerateRequest) -> KilnResult<GenerationResult> {
        let GenerateRequest {
            template: reference,
            output_dir,
            variables,
            options,
        } = request;

        // 1. Validate project name
        let project_name = project_name_of(&output_dir);
        validator::validate_project_name(&project_name)?;

        // 2. Resolve template
        let ResolvedTemplate {
            template,
            mut warnings,
        } = self.store.resolve(&reference)?;
        info!(template = %template.id, "Template resolved");

        // 3. Collect variables
        let mut cli = variables;
        if template.variable(PROJECT_NAME_VARIABLE).is_some() {
            cli.entry(PROJECT_NAME_VARIABLE.to_string())
                .or_insert_with(|| VariableValue::String(project_name.clone()));
        }
        let collected = VariableCollector::new(self.prompter.as_deref()).collect(
            &template.variables,
            &cli,
            &VariableMap::new(),
            options.interactive,
        )?;
        warnings.extend(collected.warnings);
        let vars = collected.values;

        // 4. Destination check before any work lands on disk
        let occupied = self.is_occupied(&output_dir)?;
        if occupied && options.overwrite == OverwriteMode::Reject {
            return Err(ApplicationError::DestinationConflict { path: output_dir }.into());
        }

        // 5. Render
        let mut structure = self
            .renderer
            .render(&template, &RenderScope::Project, &vars)?;
        validator::validate_project_structure(&structure)?;
        let metadata_path = metadata_path()?;
        if structure.remove(&metadata_path).is_some() {
            warnings.push(format!("template file {METADATA_FILE} ignored; the name is reserved"));
        }
        info!(files = structure.len(), "Template rendered");

        // 6. Generation ledger, from the pure render
        let mut meta = ProjectMetadata::new(&template.id, template.source.clone(), vars.clone());
        for file in structure.files() {
            meta.record_file(file.path.clone(), &self.file_bytes(file)?);
        }
        let mut conflicted = BTreeSet::new();
        if occupied {
            let previous = self.try_read_metadata(&output_dir)?;
            if let Some(previous) = &previous {
                carry_modules(&mut meta, previous, &structure);
            }
            if options.overwrite == OverwriteMode::Merge {
                conflicted = self.merge_into_existing(
                    &output_dir,
                    previous.as_ref(),
                    &mut structure,
                    &mut warnings,
                )?;
            }
        }
        let rendered: Vec<RelativePath> = structure.paths().cloned().collect();
        structure.upsert(FileToWrite::text(metadata_path.clone(), meta.to_json()?));

        // 7. Stage
        let writer = AtomicWriter::new(self.filesystem.as_ref(), &self.cancel);
        let staging = writer.stage(&output_dir)?;
        if let Err(e) = writer.write_structure(&staging, &structure) {
            writer.discard(staging);
            return Err(e);
        }

        // 8. Pre-generate hook, inside the staging directory
        let mut hooks = Vec::new();
        if !options.dry_run {
            if let Some(command) = &template.hooks.pre_generate {
                match self.run_hook(&template, HookPhase::PreGenerate, command, &staging.dir, &vars) {
                    Ok(result) if result.success => hooks.push(result),
                    Ok(result) => {
                        writer.discard(staging);
                        return Err(ApplicationError::HookFailed {
                            phase: HookPhase::PreGenerate.as_str().into(),
                            reason: result.failure_reason(),
                        }
                        .into());
                    }
                    Err(e) => {
                        writer.discard(staging);
                        return Err(e);
                    }
                }
            }
        }

        // 9. Syntax gate
        let checked: Vec<RelativePath> = rendered
            .iter()
            .filter(|p| !conflicted.contains(*p))
            .cloned()
            .collect();
        let mut quality = match self.syntax_gate(&template, &staging, checked) {
            Ok(report) => report,
            Err(e) => {
                writer.discard(staging);
                return Err(e);
            }
        };

        // 10. Dry run stops here
        if options.dry_run {
            writer.discard(staging);
            let mut files: Vec<RelativePath> = structure.paths().cloned().collect();
            let mut skipped = Vec::new();
            if options.overwrite == OverwriteMode::SkipExisting {
                (skipped, files) = files
                    .into_iter()
                    .partition(|p| self.filesystem.exists(&p.under(&output_dir)));
            }
            files.sort();
            info!(files = files.len(), "Dry run complete; nothing written");
            return Ok(GenerationResult {
                template: template.id.to_string(),
                output_dir,
                files,
                skipped,
                variables: vars,
                warnings,
                quality,
                hooks,
                dry_run: true,
            });
        }

        // 11. Publish
        let report = writer.publish(staging, options.overwrite, &[])?;
        info!(
            written = report.written.len(),
            skipped = report.skipped.len(),
            "Project published"
        );

        // 12. Post-generate hook; failure is a warning
        if let Some(command) = &template.hooks.post_generate {
            match self.run_hook(&template, HookPhase::PostGenerate, command, &output_dir, &vars) {
                Ok(result) => {
                    if !result.success {
                        warnings.push(format!(
                            "post_generate hook failed: {}",
                            result.failure_reason()
                        ));
                    }
                    hooks.push(result);
                }
                Err(e) => warnings.push(format!("post_generate hook could not run: {e}")),
            }
        }

        // 13. Lint gate; findings are warnings
        let linted: Vec<RelativePath> = report
            .written
            .iter()
            .filter(|p| **p != metadata_path && !conflicted.contains(*p))
            .cloned()
            .collect();
        quality.merge(self.lint_gate(&template, &output_dir, linted, &mut warnings));

        if !conflicted.is_empty() {
            warnings.push(format!(
                "{} file(s) need conflict resolution: {}",
                conflicted.len(),
                join_paths(conflicted.iter())
            ));
        }

        info!("Generation completed successfully");
        Ok(GenerationResult {
            template: template.id.to_string(),
            output_dir,
            files: report.written,
            skipped: report.skipped,
            variables: vars,
            warnings,
            quality,
            hooks,
            dry_run: false,
        })
    }

    // ------ Internal Helpers ------

    /// `true` when `dir` exists and holds anything at all: a file, a
    /// directory or a symlink.
    pub(super) fn is_occupied(&self, dir: &Path) -> KilnResult<bool> {
        if !self.filesystem.exists(dir) {
            return Ok(false);
        }
        if !self.filesystem.is_dir(dir) {
            return Ok(true);
        }
        Ok(!self.filesystem.list_entries(dir)?.is_empty())
    }

    /// Three-way merge rendered files into existing ones, in place.
    ///
    /// The base is the recorded generation when the directory has metadata,
    /// an empty file otherwise. Returns the paths left with conflicts.
    fn merge_into_existing(
        &self,
        dir: &Path,
        previous: Option<&ProjectMetadata>,
        structure: &mut ProjectStructure,
        warnings: &mut Vec<String>,
    ) -> KilnResult<BTreeSet<RelativePath>> {
        let base = match previous {
            Some(meta) => match self.render_recorded(meta) {
                Ok(rendered) => Some(rendered),
                Err(e) => {
                    warn!(error = %e, "Recorded template unavailable; merging against an empty base");
                    warnings.push(format!(
                        "could not re-render {}@{}: {e}; merged against an empty base",
                        meta.template.name, meta.template.version
                    ));
                    None
                }
            },
            None => None,
        };

        let mut conflicted = BTreeSet::new();
        let mut sidecars = Vec::new();

        for file in structure.files.iter_mut() {
            let current = file.path.under(dir);
            if !self.filesystem.exists(&current) {
                continue;
            }
            let ours = self.filesystem.read_file(&current)?;
            let theirs = self.file_bytes(file)?;
            if ours == theirs {
                continue;
            }

            let base_text = base
                .as_ref()
                .and_then(|b| b.get(&file.path))
                .and_then(|f| f.content.as_text())
                .unwrap_or("");

            let content = match (&file.content, String::from_utf8(ours)) {
                (FileContent::Text(theirs_text), Ok(ours_text)) => {
                    let merged = merge3(base_text, &ours_text, theirs_text);
                    if !merged.is_clean() {
                        debug!(path = %file.path, regions = merged.regions().len(), "Conflict");
                        conflicted.insert(file.path.clone());
                    }
                    FileContent::Text(merged.into_content())
                }
                _ => {
                    // Binary on either side: keep the user's bytes, sidecar the template's.
                    sidecars.push(FileToWrite {
                        path: file.path.with_suffix(SIDECAR_SUFFIX),
                        content: file.content.clone(),
                        permissions: file.permissions,
                    });
                    conflicted.insert(file.path.clone());
                    FileContent::Copy(current)
                }
            };
            file.content = content;
        }

        for sidecar in sidecars {
            structure.upsert(sidecar);
        }
        Ok(conflicted)
    }

    pub(super) fn syntax_gate(
        &self,
        template: &Template,
        staging: &Staging,
        files: Vec<RelativePath>,
    ) -> KilnResult<QualityReport> {
        let report = self.quality.check(&QualityRequest {
            dir: staging.dir.clone(),
            phase: QualityPhase::Syntax,
            checks: template.quality.clone(),
            files,
        })?;
        if report.errors.is_empty() {
            return Ok(report);
        }
        for finding in &report.errors {
            warn!(%finding, "Syntax check failed");
        }
        let summary = report
            .errors
            .iter()
            .take(3)
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(ApplicationError::QualityFailed {
            count: report.errors.len(),
            summary,
        }
        .into())
    }

    /// Post-publish checks. Everything found becomes a warning.
    pub(super) fn lint_gate(
        &self,
        template: &Template,
        dir: &Path,
        files: Vec<RelativePath>,
        warnings: &mut Vec<String>,
    ) -> QualityReport {
        let request = QualityRequest {
            dir: dir.to_path_buf(),
            phase: QualityPhase::Lint,
            checks: template.quality.clone(),
            files,
        };
        match self.quality.check(&request) {
            Ok(mut report) => {
                let errors = std::mem::take(&mut report.errors);
                report.warnings.extend(errors);
                for finding in &report.warnings {
                    warn!(%finding, "Quality warning");
                }
                report
            }
            Err(e) => {
                warnings.push(format!("quality checks could not run: {e}"));
                QualityReport::default()
            }
        }
    }

    pub(super) fn run_hook(
        &self,
        template: &Template,
        phase: HookPhase,
        command: &[String],
        working_dir: &Path,
        variables: &VariableMap,
    ) -> KilnResult<HookResult> {
        let mut argv = command.to_vec();
        let Some(program) = argv.first_mut() else {
            return Err(ApplicationError::HookFailed {
                phase: phase.as_str().into(),
                reason: "empty command".into(),
            }
            .into());
        };
        // Scripts shipped with the template resolve against its root.
        let bundled = template.root.join(program.as_str());
        if Path::new(program.as_str()).is_relative() && self.filesystem.exists(&bundled) {
            *program = bundled.to_string_lossy().into_owned();
        }

        info!(phase = phase.as_str(), command = %argv.join(" "), "Running hook");
        let result = self.hooks.run(&HookRequest {
            phase,
            command: argv,
            working_dir: working_dir.to_path_buf(),
            variables: variables.clone(),
            timeout: template.hooks.timeout,
        })?;
        debug!(
            phase = phase.as_str(),
            success = result.success,
            duration_ms = result.duration.as_millis() as u64,
            "Hook finished"
        );
        Ok(result)
    }

    /// Bytes a rendered file will have on disk.
    pub(super) fn file_bytes(&self, file: &FileToWrite) -> KilnResult<Vec<u8>> {
        match &file.content {
            FileContent::Text(text) => Ok(text.as_bytes().to_vec()),
            FileContent::Copy(source) => self.filesystem.read_file(source),
        }
    }

    pub(super) fn read_if_exists(&self, path: &Path) -> KilnResult<Option<Vec<u8>>> {
        if self.filesystem.exists(path) && !self.filesystem.is_dir(path) {
            self.filesystem.read_file(path).map(Some)
        } else {
            Ok(None)
        }
    }

    pub(super) fn read_metadata(&self, dir: &Path) -> KilnResult<ProjectMetadata> {
        self.try_read_metadata(dir)?
            .ok_or_else(|| {
                ApplicationError::MetadataMissing {
                    path: dir.to_path_buf(),
                }
                .into()
            })
    }

    pub(super) fn try_read_metadata(&self, dir: &Path) -> KilnResult<Option<ProjectMetadata>> {
        let Some(bytes) = self.read_if_exists(&dir.join(METADATA_FILE))? else {
            return Ok(None);
        };
        let text = String::from_utf8(bytes).map_err(|e| DomainError::MetadataCorrupt {
            reason: e.to_string(),
        })?;
        Ok(Some(ProjectMetadata::from_json(&text)?))
    }

    /// The exact template version recorded in `meta`: cache first, then the
    /// recorded source.
    pub(super) fn resolve_recorded(&self, meta: &ProjectMetadata) -> KilnResult<ResolvedTemplate> {
        let version = meta.template.version.clone();
        let cached = TemplateRef::Cached {
            name: meta.template.name.clone(),
            version: Some(version.clone()),
        };
        match self.store.resolve(&cached) {
            Ok(resolved) => Ok(resolved),
            Err(cache_err) => {
                debug!(error = %cache_err, "Recorded version not cached; trying source");
                let resolved = self.store.resolve(&source_ref(&meta.template.source))?;
                if resolved.template.id.version() == &version {
                    Ok(resolved)
                } else {
                    Err(ApplicationError::UnknownTemplate {
                        reference: format!("{}@{version}", meta.template.name),
                    }
                    .into())
                }
            }
        }
    }

    /// Render the recorded template version with the recorded answers,
    /// modules included.
    pub(super) fn render_recorded(&self, meta: &ProjectMetadata) -> KilnResult<ProjectStructure> {
        let resolved = self.resolve_recorded(meta)?;
        self.render_full(
            &resolved.template,
            &meta.variables,
            &meta.modules,
            &mut Vec::new(),
        )
    }

    /// Project tree plus the tree of every recorded module. Two trees
    /// rendering the same path is an error.
    pub(super) fn render_full(
        &self,
        template: &Template,
        variables: &VariableMap,
        modules: &[ModuleRecord],
        warnings: &mut Vec<String>,
    ) -> KilnResult<ProjectStructure> {
        let mut structure = self
            .renderer
            .render(template, &RenderScope::Project, variables)?;
        for record in modules {
            if template.module(&record.module_type).is_none() {
                warnings.push(format!(
                    "{} no longer declares module type '{}'; module '{}' left as is",
                    template.id, record.module_type, record.name
                ));
                continue;
            }
            let mut scope_vars = variables.clone();
            scope_vars.extend(record.variables.clone());
            let rendered = self.renderer.render(
                template,
                &RenderScope::Module(record.module_type.clone()),
                &scope_vars,
            )?;
            for file in rendered.into_files() {
                if structure.get(&file.path).is_some() {
                    return Err(DomainError::DuplicatePath {
                        path: format!("{} (module '{}')", file.path, record.name),
                    }
                    .into());
                }
                structure.upsert(file);
            }
        }
        if let Ok(path) = metadata_path() {
            structure.remove(&path);
        }
        Ok(structure)
    }

    /// Stage `structure`, syntax-check `checked` inside the staging
    /// directory, then publish it over `dir`. A failed check publishes nothing.
    pub(super) fn publish_over(
        &self,
        dir: &Path,
        structure: &ProjectStructure,
        removals: &[RelativePath],
        template: &Template,
        checked: Vec<RelativePath>,
    ) -> KilnResult<Vec<RelativePath>> {
        let writer = AtomicWriter::new(self.filesystem.as_ref(), &self.cancel);
        let staging = writer.stage(dir)?;
        if let Err(e) = writer.write_structure(&staging, structure) {
            writer.discard(staging);
            return Err(e);
        }
        if !checked.is_empty() {
            if let Err(e) = self.syntax_gate(template, &staging, checked) {
                writer.discard(staging);
                return Err(e);
            }
        }
        Ok(writer
            .publish(staging, OverwriteMode::Overwrite, removals)?
            .written)
    }
}

pub(super) fn metadata_path() -> Result<RelativePath, KilnError> {
    Ok(RelativePath::try_new(METADATA_FILE)?)
}

pub(super) fn source_ref(source: &SourceDescriptor) -> TemplateRef {
    match source {
        SourceDescriptor::Local { path } => TemplateRef::Local(path.clone()),
        remote => TemplateRef::Remote(remote.clone()),
    }
}

pub(super) fn join_paths<'a>(paths: impl Iterator<Item = &'a RelativePath>) -> String {
    paths.map(RelativePath::as_str).collect::<Vec<_>>().join(", ")
}

/// Last path component, made absolute first so `.` names the current dir.
fn project_name_of(dir: &Path) -> String {
    let absolute = std::path::absolute(dir).unwrap_or_else(|_| PathBuf::from(dir));
    absolute
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Keep module records and their ledger entries across a regeneration.
fn carry_modules(meta: &mut ProjectMetadata, previous: &ProjectMetadata, rendered: &ProjectStructure) {
    meta.modules = previous.modules.clone();
    for record in &previous.modules {
        for path in &record.files {
            if rendered.get(path).is_none() {
                if let Some(hash) = previous.files.get(path) {
                    meta.files.insert(path.clone(), hash.clone());
                }
            }
        }
    }
}
