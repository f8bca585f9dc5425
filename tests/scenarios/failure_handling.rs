//! Test: Failure Handling - allow_failure, spawn failures and composition errors

use crate::helpers::*;
use ci_pipeline::core::result::StepOutcome;
use ci_pipeline::execution::SPAWN_FAILURE_CODE;

const PIPELINE: &str = r#"
name: "Test: Failure Handling"
matrix:
  include:
    - os: linux
      runtime_version: "2.7"
    - os: linux
      runtime_version: "pypy"
    - os: macos
steps:
  - name: "install"
    phase: install
    command: ["./install.sh"]
  - name: "lint"
    phase: test
    command: ["./lint.sh"]
    allow_failure: true
  - name: "test"
    phase: test
    command: ["./run_tests.py"]
  - name: "install-package"
    phase: install-package
    command: ["python", "setup.py", "install", "--prefix={{ install_prefix }}"]
    env:
      PYTHONPATH: "{{ site_packages }}"
  - name: "end-to-end"
    phase: end-to-end
    command: ["./tests/end-to-end.py"]
"#;

/// A tolerated failure is recorded but neither stops nor fails the pipeline
#[tokio::test]
async fn test_allowed_failure_continues() {
    let runner = ScriptedRunner::new().exit_with("lint.sh", 3);
    let result = run_pipeline_with_runner(pipeline_from_yaml(PIPELINE), &linux("2.7"), runner)
        .await
        .unwrap();

    assert_pipeline_passed(&result);
    assert_eq!(result.outcome("lint"), &StepOutcome::Failed { exit_code: 3 });
    assert_executed_steps(&result, &["install", "lint", "test", "install-package", "end-to-end"]);
}

/// The exit code of the first halting failure is propagated
#[tokio::test]
async fn test_first_halting_failure_sets_exit_code() {
    let runner = ScriptedRunner::new().exit_with("lint.sh", 3).exit_with("run_tests.py", 5);
    let result = run_pipeline_with_runner(pipeline_from_yaml(PIPELINE), &linux("2.7"), runner)
        .await
        .unwrap();

    assert_pipeline_failed(&result, 5);
    assert_skipped_after(&result, "install-package", "test");
}

/// An exit code outside 1..=255 falls back to a generic failure code
#[tokio::test]
async fn test_signal_exit_maps_to_generic_code() {
    let runner = ScriptedRunner::new().exit_with("install.sh", -1);
    let result = run_pipeline_with_runner(pipeline_from_yaml(PIPELINE), &macos(), runner)
        .await
        .unwrap();

    assert_pipeline_failed(&result, 1);
    assert_eq!(result.outcome("install"), &StepOutcome::Failed { exit_code: -1 });
}

/// A command that cannot be launched fails with 127
#[tokio::test]
async fn test_missing_command_fails_with_127() {
    let runner = ScriptedRunner::new().not_found("install.sh");
    let result = run_pipeline_with_runner(pipeline_from_yaml(PIPELINE), &macos(), runner)
        .await
        .unwrap();

    assert_pipeline_failed(&result, SPAWN_FAILURE_CODE);
    match result.outcome("install") {
        StepOutcome::Errored { exit_code, message } => {
            assert_eq!(*exit_code, Some(SPAWN_FAILURE_CODE));
            assert!(message.contains("./install.sh"));
        }
        other => panic!("expected Errored, got {:?}", other),
    }
    assert_skipped_after(&result, "test", "install");
}

/// A malformed runtime version fails only the step that needs derived paths
#[tokio::test]
async fn test_malformed_version_fails_at_the_step_needing_it() {
    let runner = ScriptedRunner::new();
    let result = run_pipeline_with_runner(pipeline_from_yaml(PIPELINE), &linux("pypy"), runner)
        .await
        .unwrap();

    assert_pipeline_failed(&result, 1);
    assert_executed_steps(&result, &["install", "lint", "test", "install-package"]);
    match result.outcome("install-package") {
        StepOutcome::Errored { exit_code, message } => {
            assert_eq!(*exit_code, None);
            assert!(message.contains("pypy"));
        }
        other => panic!("expected Errored, got {:?}", other),
    }
    assert_skipped_after(&result, "end-to-end", "install-package");

    // the failing step never reached the runner
    assert!(result
        .invocations
        .iter()
        .all(|i| !i.command_line().contains("setup.py")));
}

/// allow_failure applies to composition errors too
#[tokio::test]
async fn test_allowed_composition_error_continues() {
    let yaml = r#"
name: "Test: Tolerated Composition Error"
matrix:
  include:
    - os: macos
steps:
  - name: "pin"
    phase: install
    command: ["pip", "install", "python=={{ runtime_version }}"]
    allow_failure: true
  - name: "test"
    phase: test
    command: ["./run_tests.py"]
"#;
    let result = run_pipeline_with_runner(pipeline_from_yaml(yaml), &macos(), ScriptedRunner::new())
        .await
        .unwrap();

    assert_pipeline_passed(&result);
    assert!(matches!(result.outcome("pin"), StepOutcome::Errored { .. }));
    assert_eq!(result.outcome("test"), &StepOutcome::Succeeded);
}
