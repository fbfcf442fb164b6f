//! Code evaluation engine.
//!
//! Compiles an untrusted submission, builds an instructor-written reference
//! program against it and runs the reference, turning every outcome into a
//! [`codegrade_common::Verdict`].

pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod languages;
pub mod normalizer;
pub mod registry;
pub mod runner;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::Dispatcher;
pub use error::{EvalError, RunnerError};
pub use evaluator::{CodeEvaluator, CommandSet, Evaluation, EvaluationState};
pub use registry::{get_registry, set_registry, LanguageRegistry};
pub use runner::{CommandSpec, LocalRunner, ProcessOutput, ProcessRunner};
