//! Test: the built-in pipeline on each leg of its matrix

use crate::helpers::*;
use ci_pipeline::core::result::{SkipReason, StepOutcome};
use ci_pipeline::core::step::Phase;

/// linux 2.7 runs every phase, with coverage, and reports
#[tokio::test]
async fn test_linux_27_full_pipeline_passes() {
    let result = run_builtin(&linux("2.7"), ScriptedRunner::new()).await;

    assert_pipeline_passed(&result);
    assert_executed_steps(
        &result,
        &[
            "install",
            "test-coverage",
            "build",
            "sdist",
            "bdist",
            "install-package",
            "end-to-end",
            "report",
        ],
    );

    assert!(result.invocation("run_tests.py").command_line().starts_with("coverage run"));
    assert_eq!(result.outcome("report"), &StepOutcome::Succeeded);
}

/// macOS gets only install, test and end-to-end; an install failure stops the rest
#[tokio::test]
async fn test_macos_install_failure_fails_fast() {
    let runner = ScriptedRunner::new().exit_with("install.sh", 1);
    let result = run_builtin(&macos(), runner).await;

    assert_pipeline_failed(&result, 1);
    assert_executed_steps(&result, &["install"]);
    assert_eq!(result.result.results.len(), 3);
    assert_skipped_after(&result, "test", "install");
    assert_skipped_after(&result, "end-to-end", "install");
    assert_eq!(result.invocations.len(), 1);
}

/// macOS steps run without the coverage wrapper
#[tokio::test]
async fn test_macos_runs_plain_tests() {
    let result = run_builtin(&macos(), ScriptedRunner::new()).await;

    assert_pipeline_passed(&result);
    assert_executed_steps(&result, &["install", "test", "end-to-end"]);
    assert_eq!(result.invocation("run_tests.py").command, vec!["./run_tests.py"]);
}

/// The report gate depends on the test phase, not on the pipeline so far
#[tokio::test]
async fn test_report_runs_after_end_to_end_failure() {
    let runner = ScriptedRunner::new().exit_with("end-to-end.py", 4);
    let result = run_builtin(&linux("2.7"), runner).await;

    assert_pipeline_failed(&result, 4);
    assert_eq!(result.outcome("end-to-end"), &StepOutcome::Failed { exit_code: 4 });
    assert_eq!(result.outcome("report"), &StepOutcome::Succeeded);
    assert_eq!(result.invocations.last().unwrap().command_line(), "coveralls --verbose");
}

/// A failed test phase skips the build phases and withholds the report
#[tokio::test]
async fn test_report_withheld_when_tests_fail() {
    let runner = ScriptedRunner::new().exit_with("run_tests.py", 1);
    let result = run_builtin(&linux("2.7"), runner).await;

    assert_pipeline_failed(&result, 1);
    assert_executed_steps(&result, &["install", "test-coverage"]);
    assert_skipped_after(&result, "build", "test-coverage");
    assert_skipped_after(&result, "end-to-end", "test-coverage");
    assert_eq!(
        result.outcome("report"),
        &StepOutcome::Skipped {
            reason: SkipReason::RequiredPhaseNotPassed { phase: Phase::Test }
        }
    );
}

/// Only the canonical linux 2.7 leg reports coverage
#[tokio::test]
async fn test_linux_34_does_not_report() {
    let result = run_builtin(&linux("3.4"), ScriptedRunner::new()).await;

    assert_pipeline_passed(&result);
    assert_executed_steps(
        &result,
        &[
            "install",
            "test",
            "build",
            "sdist",
            "bdist",
            "install-package",
            "end-to-end",
        ],
    );
    assert!(result.result.result("report").is_none());
    assert!(result.result.result("test-coverage").is_none());
}

/// A failure late in the pipeline keeps earlier results reportable
#[tokio::test]
async fn test_partial_results_are_reportable() {
    let runner = ScriptedRunner::new().exit_with("setup.py bdist", 2);
    let result = run_builtin(&linux("3.4"), runner).await;

    assert_pipeline_failed(&result, 2);
    assert_eq!(result.result.executed_count(), 5);
    assert_skipped_after(&result, "install-package", "bdist");
    assert_skipped_after(&result, "end-to-end", "bdist");
    assert_eq!(
        result.events.last().map(String::as_str),
        Some("done:fail")
    );

    let json = serde_json::to_value(&result.result).unwrap();
    assert_eq!(json["results"].as_array().unwrap().len(), 7);
    assert_eq!(json["results"][4]["outcome"]["exit_code"], 2);
}

/// Same entry, same command behaviour: same status and step outcomes
#[tokio::test]
async fn test_repeated_runs_agree() {
    let scripts = [
        ScriptedRunner::new(),
        ScriptedRunner::new().exit_with("end-to-end.py", 4),
        ScriptedRunner::new().exit_with("setup.py build", 2),
    ];

    for runner in scripts {
        let first = run_builtin(&linux("2.7"), runner.clone()).await;
        let second = run_builtin(&linux("2.7"), runner).await;

        assert_eq!(first.result.overall_status, second.result.overall_status);
        assert_eq!(first.result.exit_code(), second.result.exit_code());

        let outcomes = |r: &PipelineTestResult| -> Vec<(String, StepOutcome)> {
            r.result
                .results
                .iter()
                .map(|step| (step.step.clone(), step.outcome.clone()))
                .collect()
        };
        assert_eq!(outcomes(&first), outcomes(&second), "{}", first.summary());
    }
}
