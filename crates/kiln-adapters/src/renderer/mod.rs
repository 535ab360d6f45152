//! Renderer adapters.

mod parallel;

pub use parallel::ParallelRenderer;
