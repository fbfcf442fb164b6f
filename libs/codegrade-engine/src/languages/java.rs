use super::reference_stem;
use crate::evaluator::{CodeEvaluator, CommandSet};
use crate::runner::CommandSpec;
use codegrade_common::{Language, Toolchain};
use std::path::Path;

/// Class the submission must declare
const SUBMISSION_CLASS: &str = "Test";

/// Java evaluator
///
/// The submission is compiled to `Test.class` next to its source. The
/// reference is then compiled with the workspace on its classpath, so it
/// only builds if `Test` exposes what the reference calls. Running the
/// reference class exercises the submission.
#[derive(Debug, Clone)]
pub struct JavaEvaluator {
    javac: String,
    java: String,
}

impl JavaEvaluator {
    pub fn new(toolchain: &Toolchain) -> Self {
        Self {
            javac: toolchain.javac.clone(),
            java: toolchain.java.clone(),
        }
    }
}

impl CodeEvaluator for JavaEvaluator {
    fn language(&self) -> Language {
        Language::Java
    }

    fn submission_file_name(&self) -> &'static str {
        "Test.java"
    }

    fn commands(&self, workspace: &Path, reference: &Path, submission: &Path) -> CommandSet {
        let main_class = reference_stem(reference);

        let compile_submission = CommandSpec::new(&self.javac)
            .arg("-encoding")
            .arg("UTF-8")
            .path_arg(submission)
            .current_dir(workspace);

        let compile_reference = CommandSpec::new(&self.javac)
            .arg("-encoding")
            .arg("UTF-8")
            .arg("-classpath")
            .path_arg(workspace)
            .arg("-d")
            .path_arg(workspace)
            .path_arg(reference)
            .current_dir(workspace);

        let run_reference = CommandSpec::new(&self.java)
            .arg("-cp")
            .path_arg(workspace)
            .arg(main_class.clone())
            .current_dir(workspace);

        CommandSet {
            reference_path: reference.to_path_buf(),
            submission_path: submission.to_path_buf(),
            compile_submission,
            compile_reference,
            run_reference,
            submission_artifact: workspace.join(format!("{}.class", SUBMISSION_CLASS)),
            reference_artifact: workspace.join(format!("{}.class", main_class)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_java_commands() {
        let toolchain = Toolchain {
            javac: "/opt/jdk/bin/javac".to_string(),
            java: "/opt/jdk/bin/java".to_string(),
            ..Toolchain::default()
        };
        let evaluator = JavaEvaluator::new(&toolchain);
        let ws = Path::new("/work/java-1");
        let set = evaluator.commands(
            ws,
            Path::new("/srv/ref/Driver.java"),
            &ws.join("Test.java"),
        );

        assert_eq!(
            set.compile_submission.to_string(),
            "/opt/jdk/bin/javac -encoding UTF-8 /work/java-1/Test.java"
        );
        assert_eq!(
            set.compile_reference.to_string(),
            "/opt/jdk/bin/javac -encoding UTF-8 -classpath /work/java-1 -d /work/java-1 /srv/ref/Driver.java"
        );
        assert_eq!(
            set.run_reference.to_string(),
            "/opt/jdk/bin/java -cp /work/java-1 Driver"
        );
        assert_eq!(set.submission_artifact, ws.join("Test.class"));
        assert_eq!(set.reference_artifact, ws.join("Driver.class"));
        assert_eq!(set.run_reference.cwd.as_deref(), Some(ws));
    }

    #[test]
    fn test_paths_with_spaces_stay_single_arguments() {
        let evaluator = JavaEvaluator::new(&Toolchain::default());
        let ws = Path::new("/work/with space");
        let set = evaluator.commands(ws, Path::new("/ref dir/Main.java"), &ws.join("Test.java"));

        assert_eq!(set.compile_reference.args.last().unwrap(), "/ref dir/Main.java");
        assert_eq!(set.run_reference.args[1], "/work/with space");
    }
}
