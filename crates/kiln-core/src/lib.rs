//! Kiln Core - Hexagonal Architecture Implementation
//!
//! This crate provides the domain and application layers for the Kiln
//! template scaffolding and upgrade engine, following hexagonal (ports and
//! adapters) architecture.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             kiln-cli (CLI)              │
//! │      new · add · update · templates     │
//! └──────────────────┬──────────────────────┘
//!                    │ calls
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │         Application Services            │
//! │   (ScaffoldService, TemplateService)    │
//! │   generate · add_module · update        │
//! └──────────────────┬──────────────────────┘
//!                    │ uses
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │       Application Ports (Traits)        │
//! │  Store, Renderer, Filesystem, Hooks,    │
//! │  QualityGate, Prompter                  │
//! └──────────────────┬──────────────────────┘
//!                    │ implemented by
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │     kiln-adapters (Infrastructure)      │
//! │  CacheStore, ParallelRenderer, ...      │
//! └─────────────────────────────────────────┘
//!                    │
//!                    ▼
//! ┌─────────────────────────────────────────┐
//! │        Domain Layer (Pure Logic)        │
//! │  template language, merge3, metadata    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kiln_core::prelude::*;
//!
//! let service = ScaffoldService::new(store, renderer, filesystem, hooks, quality);
//! let result = service.generate(GenerateRequest {
//!     template: TemplateRef::parse("rust-service@1.2.0")?,
//!     output_dir: "./billing-api".into(),
//!     variables: VariableMap::new(),
//!     options: GenerateOptions::default(),
//! })?;
//! println!("{} files written", result.files.len());
//! ```

pub mod application;
pub mod domain;
pub mod error;

// Public API - what external crates should use
pub mod prelude {
    pub use crate::application::{
        CancellationToken, GenerateOptions, GenerateRequest, GenerationResult, ModuleRequest,
        ModuleResult, OverwriteMode, ScaffoldService, TemplateService, UpdateReport,
        UpdateRequest, UpdateStrategy,
        ports::{
            Filesystem, HookRunner, Prompter, QualityGate, TemplateRenderer, TemplateStore,
        },
    };
    pub use crate::domain::{
        ProjectMetadata, ProjectStructure, Template, TemplateId, TemplateRef, VariableMap,
        VariableValue,
    };
    pub use crate::error::{KilnError, KilnResult};
}

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
