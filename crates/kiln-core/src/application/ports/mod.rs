//! Application ports (traits) for external dependencies.
//!
//! In hexagonal architecture, ports define interfaces that the application
//! needs from the outside world. Adapters in `kiln-adapters` implement these.
//!
//! ## Port Types
//!
//! - **Driven (Output) Ports**: Called by application, implemented by infrastructure
//!   - `Filesystem`: File operations
//!   - `TemplateStore`: Template cache and remote sync
//!   - `TemplateRenderer`: Parallel template rendering
//!   - `HookRunner`: Isolated hook processes
//!   - `QualityGate`: Syntax and lint checks on generated output
//!   - `Prompter`: Interactive variable input
//!
//! - **Driving (Input) Ports**: Called by external world, implemented by application
//!   - (Defined in CLI layer, implemented by services)

pub mod output;

pub use output::{
    EntryKind, Filesystem, FsEntry, HookPhase, HookRequest, HookResult, HookRunner, Prompter, QualityFinding,
    QualityGate, QualityPhase, QualityReport, QualityRequest, RenderScope, ResolvedTemplate,
    TemplateRenderer, TemplateStore,
};

#[cfg(any(test, feature = "mocks"))]
pub use output::{
    MockFilesystem, MockHookRunner, MockPrompter, MockQualityGate, MockTemplateRenderer,
    MockTemplateStore,
};
