use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Message carried by every successful verdict.
pub const CORRECT_ANSWER: &str = "Correct answer";

/// Evaluator implementations known to the engine.
/// Closed set - the registry maps language identifiers onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Java,
    C,
    Cpp,
}

impl Language {
    /// Returns all language variants
    /// This is the single source of truth for available evaluators
    pub fn all_variants() -> &'static [Language] {
        &[Language::Java, Language::C, Language::Cpp]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Java => write!(f, "java"),
            Language::C => write!(f, "c"),
            Language::Cpp => write!(f, "cpp"),
        }
    }
}

/// Per-test-case configuration (immutable input)
/// Owned by the caller - evaluators only read it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseData {
    /// Piped to the reference program when it runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    /// Opaque to the engine: the reference program does its own checking.
    /// Carried through so queued requests keep the caller's test data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    /// Tightens the per-process timeout, never loosens it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
}

/// Failure classes, recorded on the verdict and echoed by the message label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Submission did not compile
    CompilationError,
    /// Reference did not compile against the submission
    HarnessError,
    /// Reference ran and exited non-zero
    RuntimeFailure,
    /// A stage or the whole evaluation ran out of time
    Timeout,
}

impl FailureKind {
    /// Leading label of the verdict message, `None` for raw run output
    pub fn label(&self) -> Option<&'static str> {
        match self {
            FailureKind::CompilationError => Some("Compilation Error:"),
            FailureKind::HarnessError => Some("Error:"),
            FailureKind::RuntimeFailure => None,
            FailureKind::Timeout => Some("Time limit exceeded:"),
        }
    }
}

/// Outcome of one evaluation
///
/// `success == true` always carries [`CORRECT_ANSWER`]; failures carry a
/// normalized multi-line diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub success: bool,
    pub message: String,
    /// Set on every failure; raw run output has no label to tell it apart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl Verdict {
    pub fn correct() -> Self {
        Self {
            success: true,
            message: CORRECT_ANSWER.to_string(),
            kind: None,
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            kind: Some(kind),
        }
    }

    /// Failure whose message is `label` followed by one line per detail line
    pub fn labelled(kind: FailureKind, detail: &str) -> Self {
        let mut message = kind.label().unwrap_or_default().to_string();
        for line in detail.lines() {
            if !message.is_empty() {
                message.push('\n');
            }
            message.push_str(line);
        }
        Self::failure(kind, message)
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.kind
    }
}

fn default_timeout_ms() -> u64 {
    5000
}

/// Evaluation Input (Immutable)
/// A request is write-once - never mutate input fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub id: Uuid,
    /// Language identifier resolved through the registry
    pub language: String,
    #[serde(default)]
    pub test_case: TestCaseData,
    pub reference_path: PathBuf,
    pub source_code: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Terminal state of a queued evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    /// A verdict was produced (pass or fail)
    Completed,
    /// The request itself was rejected (unknown language, missing files)
    Rejected,
}

/// Evaluation Output
/// Written by workers, read by whoever queued the request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub request_id: Uuid,
    pub language: String,
    pub status: EvaluationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_serialization() {
        let lang = Language::Cpp;
        let json = serde_json::to_string(&lang).unwrap();
        assert_eq!(json, "\"cpp\"");

        let deserialized: Language = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, Language::Cpp);
    }

    #[test]
    fn test_language_all_variants() {
        let variants = Language::all_variants();
        assert_eq!(variants.len(), 3);
        for lang in variants {
            let json = serde_json::to_string(lang).unwrap();
            assert_eq!(json, format!("\"{}\"", lang));
        }
    }

    #[test]
    fn test_correct_verdict() {
        let verdict = Verdict::correct();
        assert!(verdict.success);
        assert_eq!(verdict.message, "Correct answer");
        assert_eq!(verdict.failure_kind(), None);
    }

    #[test]
    fn test_labelled_verdict_keeps_line_order() {
        let verdict = Verdict::labelled(
            FailureKind::CompilationError,
            " error: ';' expected\n        int x = 1\n",
        );
        assert!(!verdict.success);
        assert_eq!(
            verdict.message,
            "Compilation Error:\n error: ';' expected\n        int x = 1"
        );
        assert_eq!(verdict.failure_kind(), Some(FailureKind::CompilationError));
    }

    #[test]
    fn test_failure_kinds_are_distinguishable() {
        let harness = Verdict::labelled(FailureKind::HarnessError, "cannot find symbol");
        assert!(harness.message.starts_with("Error:"));
        assert_eq!(harness.failure_kind(), Some(FailureKind::HarnessError));

        let timeout = Verdict::labelled(FailureKind::Timeout, "killed after 1000ms");
        assert_eq!(timeout.failure_kind(), Some(FailureKind::Timeout));

        let runtime = Verdict::failure(FailureKind::RuntimeFailure, "Exception in thread \"main\"\n");
        assert_eq!(runtime.failure_kind(), Some(FailureKind::RuntimeFailure));
    }

    #[test]
    fn test_runtime_output_that_looks_like_a_label_keeps_its_kind() {
        let verdict = Verdict::failure(
            FailureKind::RuntimeFailure,
            "Error: expected 6 got 5\n\nException in thread \"main\"",
        );
        assert_eq!(verdict.failure_kind(), Some(FailureKind::RuntimeFailure));

        let json = serde_json::to_string(&verdict).unwrap();
        assert!(json.contains("\"kind\":\"runtime_failure\""));
        let parsed: Verdict = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, verdict);
    }

    #[test]
    fn test_correct_verdict_omits_kind() {
        let json = serde_json::to_string(&Verdict::correct()).unwrap();
        assert_eq!(json, r#"{"success":true,"message":"Correct answer"}"#);
    }

    #[test]
    fn test_request_defaults() {
        let json = r#"{
            "id": "7f1c7c3e-51b3-4c8e-9a55-0d6f1c0a2b11",
            "language": "java",
            "reference_path": "/srv/ref/Main.java",
            "source_code": "class Test {}"
        }"#;
        let request: EvaluationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.timeout_ms, 5000);
        assert_eq!(request.test_case, TestCaseData::default());
        assert_eq!(request.language, "java");
    }

    #[test]
    fn test_result_skips_empty_fields() {
        let result = EvaluationResult {
            request_id: Uuid::new_v4(),
            language: "java".to_string(),
            status: EvaluationStatus::Completed,
            verdict: Some(Verdict::correct()),
            error: None,
            elapsed_ms: 12,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"completed\""));
        assert!(!json.contains("\"error\""));
    }
}
