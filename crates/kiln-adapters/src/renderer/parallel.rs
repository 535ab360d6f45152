//! Parallel renderer on a rayon pool.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, instrument};

use kiln_core::{
    application::{
        ApplicationError,
        ports::{RenderScope, TemplateRenderer},
    },
    domain::{
        DomainError, DomainValidator as validator, FileToWrite, ProjectStructure, Template,
        TemplateFile, VariableMap,
    },
    error::{KilnError, KilnResult},
};

/// Renders every file of a tree concurrently.
///
/// Templates are immutable and compiled up front, so workers share them
/// without locks. Output keeps template order regardless of which worker
/// finishes first.
#[derive(Clone, Default)]
pub struct ParallelRenderer {
    /// `None` uses rayon's global pool (one thread per core).
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl ParallelRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a dedicated pool of `threads` workers.
    pub fn with_threads(threads: usize) -> KilnResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("kiln-render-{i}"))
            .build()
            .map_err(|e| KilnError::Configuration {
                message: format!("cannot start render pool: {e}"),
            })?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
        })
    }

    fn render_files(
        &self,
        files: &[TemplateFile],
        variables: &VariableMap,
    ) -> Result<Vec<Option<FileToWrite>>, DomainError> {
        let work = || {
            files
                .par_iter()
                .map(|file| file.render(variables))
                .collect::<Result<Vec<_>, _>>()
        };
        match &self.pool {
            Some(pool) => pool.install(work),
            None => work(),
        }
    }
}

impl TemplateRenderer for ParallelRenderer {
    #[instrument(skip_all, fields(template = %template.id, scope = ?scope))]
    fn render(
        &self,
        template: &Template,
        scope: &RenderScope,
        variables: &VariableMap,
    ) -> KilnResult<ProjectStructure> {
        let files = match scope {
            RenderScope::Project => &template.files[..],
            RenderScope::Module(module_type) => match template.module(module_type) {
                Some(module) => &module.files[..],
                None => {
                    return Err(ApplicationError::UnknownModule {
                        template: template.id.to_string(),
                        module_type: module_type.clone(),
                        available: template
                            .modules
                            .iter()
                            .map(|m| m.module_type.clone())
                            .collect(),
                    }
                    .into());
                }
            },
        };

        let structure: ProjectStructure = self
            .render_files(files, variables)?
            .into_iter()
            .flatten()
            .collect();
        validator::validate_project_structure(&structure)?;

        debug!(
            files = structure.len(),
            skipped = files.len() - structure.len(),
            "Rendered"
        );
        Ok(structure)
    }
}
