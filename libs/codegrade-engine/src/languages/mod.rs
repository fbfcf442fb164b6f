//! Language evaluators.
//!
//! The pipeline stays language-agnostic. Each evaluator only decides file
//! names and the compile/run command lines for its toolchain.

pub mod java;
pub mod native;

use crate::evaluator::CodeEvaluator;
use codegrade_common::{Language, Toolchain};
use java::JavaEvaluator;
use native::NativeEvaluator;

/// Build the evaluator implementation for a resolved language
pub fn build_evaluator(language: Language, toolchain: &Toolchain) -> Box<dyn CodeEvaluator> {
    match language {
        Language::Java => Box::new(JavaEvaluator::new(toolchain)),
        Language::C => Box::new(NativeEvaluator::c(toolchain)),
        Language::Cpp => Box::new(NativeEvaluator::cpp(toolchain)),
    }
}

/// File stem of the reference program, used to name what it compiles to
pub(crate) fn reference_stem(reference: &std::path::Path) -> String {
    reference
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "Main".to_string())
}
