use super::reference_stem;
use crate::evaluator::{CodeEvaluator, CommandSet};
use crate::runner::CommandSpec;
use codegrade_common::{Language, Toolchain};
use std::path::Path;

/// C / C++ evaluator
///
/// The submission is compiled to an object file. The reference is linked
/// against that object, so a missing or mis-declared function surfaces as
/// a harness error. The linked binary is the program that gets run.
#[derive(Debug, Clone)]
pub struct NativeEvaluator {
    language: Language,
    compiler: String,
}

impl NativeEvaluator {
    pub fn c(toolchain: &Toolchain) -> Self {
        Self {
            language: Language::C,
            compiler: toolchain.gcc.clone(),
        }
    }

    pub fn cpp(toolchain: &Toolchain) -> Self {
        Self {
            language: Language::Cpp,
            compiler: toolchain.gxx.clone(),
        }
    }
}

impl CodeEvaluator for NativeEvaluator {
    fn language(&self) -> Language {
        self.language
    }

    fn submission_file_name(&self) -> &'static str {
        match self.language {
            Language::C => "submit.c",
            _ => "submit.cpp",
        }
    }

    fn commands(&self, workspace: &Path, reference: &Path, submission: &Path) -> CommandSet {
        let object = workspace.join("submit.o");
        let binary = workspace.join(reference_stem(reference));

        let compile_submission = CommandSpec::new(&self.compiler)
            .path_arg(submission)
            .arg("-c")
            .arg("-o")
            .path_arg(&object)
            .current_dir(workspace);

        let compile_reference = CommandSpec::new(&self.compiler)
            .path_arg(reference)
            .path_arg(&object)
            .arg("-o")
            .path_arg(&binary)
            .current_dir(workspace);

        let run_reference = CommandSpec::new(binary.to_string_lossy()).current_dir(workspace);

        CommandSet {
            reference_path: reference.to_path_buf(),
            submission_path: submission.to_path_buf(),
            compile_submission,
            compile_reference,
            run_reference,
            submission_artifact: object,
            reference_artifact: binary,
        }
    }
}
