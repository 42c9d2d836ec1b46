//! # codeshare-exec — out-of-process execution for room buffers
//!
//! Takes a language tag and source text, writes the source into a private
//! scratch directory, drives the language's build/run pipeline as sandboxed
//! child processes, and returns the captured output.
//!
//! ## Modules
//!
//! - [`language`] — language tags, extensions, per-language pipelines
//! - [`sandbox`] — resource limits, process groups, launcher prefix
//! - [`dispatcher`] — the [`Executor`] implementation and scratch lifecycle
//! - [`error`] — [`ExecError`] with stage labels

pub mod dispatcher;
pub mod error;
pub mod language;
mod runner;
pub mod sandbox;

pub use dispatcher::{DispatcherConfig, ExecutionDispatcher, ExecutionOutput, Executor};
pub use error::ExecError;
pub use language::{Language, RunPaths, Step, StepKind};
pub use sandbox::{sanitize_component, SandboxPolicy};
