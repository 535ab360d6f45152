//! Application services - orchestrate use cases.
//!
//! `ScaffoldService` owns the three project operations, split by file:
//! `generate` in `scaffold_service`, `add_module` in `module`, `update` in
//! `update`. `TemplateService` answers store queries.

pub mod module;
pub mod scaffold_service;
pub mod template_service;
pub mod update;

pub use module::MODULE_NAME_VARIABLE;
pub use scaffold_service::ScaffoldService;
pub use template_service::TemplateService;
