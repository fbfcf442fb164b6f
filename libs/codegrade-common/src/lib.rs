pub mod types;
pub mod redis;
pub mod config;

// Re-export commonly used types for convenience
pub use types::{
    EvaluationRequest, EvaluationResult, EvaluationStatus, FailureKind, Language, TestCaseData,
    Verdict, CORRECT_ANSWER,
};
pub use config::{Config, Toolchain};
