//! Test: the environment each step's subprocess receives

use crate::helpers::*;

/// install-package gets a site-packages path qualified by the runtime series
#[tokio::test]
async fn test_site_packages_follows_runtime_version() {
    for (version, expected) in [
        ("2.7", "/build/plaso/tmp/lib/python2.7/site-packages"),
        ("3.4", "/build/plaso/tmp/lib/python3.4/site-packages"),
    ] {
        let result = run_builtin(&linux(version), ScriptedRunner::new()).await;
        let install = result.invocation("setup.py install");

        assert_eq!(install.env.get("PYTHONPATH").map(String::as_str), Some(expected));
        assert_eq!(install.env.get("CI_SITE_PACKAGES").map(String::as_str), Some(expected));
        assert_eq!(
            install.env.get("CI_INSTALL_PREFIX").map(String::as_str),
            Some("/build/plaso/tmp")
        );
        assert!(install.command_line().contains("mkdir -p \"$CI_SITE_PACKAGES\""));
        assert!(install.command_line().contains("--prefix=\"$CI_INSTALL_PREFIX\""));
    }
}

/// Derived values win over inherited ones; everything else is inherited
#[tokio::test]
async fn test_inherited_environment_is_kept_and_overridden() {
    let result = run_builtin(&linux("2.7"), ScriptedRunner::new()).await;

    let install = result.invocation("install.sh");
    assert_eq!(install.env.get("PATH").map(String::as_str), Some("/usr/bin:/bin"));
    assert_eq!(install.env.get("PYTHONPATH").map(String::as_str), Some("/inherited"));
    assert_eq!(install.env.get("CI_OS").map(String::as_str), Some("linux"));
    assert_eq!(install.env.get("CI_RUNTIME_VERSION").map(String::as_str), Some("2.7"));
    assert_eq!(install.env.get("CI_DISTRIBUTION").map(String::as_str), Some("trusty"));

    let end_to_end = result.invocation("end-to-end.py");
    assert_eq!(end_to_end.env.get("PYTHONPATH").map(String::as_str), Some("."));
}

/// Generic legs export no version-derived variables
#[tokio::test]
async fn test_macos_has_no_version_variables() {
    let result = run_builtin(&macos(), ScriptedRunner::new()).await;

    for invocation in &result.invocations {
        assert_eq!(invocation.env.get("CI_OS").map(String::as_str), Some("macos"));
        assert_eq!(invocation.env.get("CI_LANGUAGE_MODE").map(String::as_str), Some("generic"));
        assert!(!invocation.env.contains_key("CI_RUNTIME_VERSION"));
        assert!(!invocation.env.contains_key("CI_SITE_PACKAGES"));
        assert_eq!(invocation.working_dir.to_str(), Some("/build/plaso"));
    }
}

/// Pipeline-wide variables apply to every step; step env wins over them
#[tokio::test]
async fn test_pipeline_variables_and_step_env() {
    let yaml = r#"
name: "Test: Variables"
matrix:
  include:
    - os: linux
      runtime_version: "3.4.2"
environment:
  runtime: python
  install_prefix: "{{ workdir }}/dist/{{ runtime_series }}"
  variables:
    LANG: "C.UTF-8"
    TARGET: "{{ os }}-{{ runtime_series }}"
steps:
  - name: "install"
    phase: install
    command: ["./install.sh"]
  - name: "test"
    phase: test
    command: ["./run_tests.py"]
    env:
      TARGET: "tests-{{ runtime_version }}"
"#;
    let result = run_pipeline_with_runner(pipeline_from_yaml(yaml), &linux("3.4.2"), ScriptedRunner::new())
        .await
        .unwrap();

    assert_pipeline_passed(&result);

    let install = result.invocation("install.sh");
    assert_eq!(install.env.get("LANG").map(String::as_str), Some("C.UTF-8"));
    assert_eq!(install.env.get("TARGET").map(String::as_str), Some("linux-3.4"));
    assert_eq!(
        install.env.get("CI_INSTALL_PREFIX").map(String::as_str),
        Some("/build/plaso/dist/3.4")
    );

    let test = result.invocation("run_tests.py");
    assert_eq!(test.env.get("TARGET").map(String::as_str), Some("tests-3.4.2"));
}
