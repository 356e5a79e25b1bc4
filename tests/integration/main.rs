//! Integration tests for Stratum

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn stratum() -> Command {
        cargo_bin_cmd!("stratum")
    }

    /// A command isolated from the developer's real config and state
    fn isolated(state_dir: &Path) -> Command {
        let mut cmd = stratum();
        cmd.env("STRATUM_STATE_DIR", state_dir)
            .env_remove("STRATUM_CONFIG")
            .args(["--no-local", "--config", "/nonexistent/stratum-config.toml"]);
        cmd
    }

    fn write_tree(root: &Path) {
        std::fs::create_dir_all(root.join("lib")).unwrap();
        std::fs::create_dir_all(root.join("classes/bin")).unwrap();
        std::fs::create_dir_all(root.join("resources")).unwrap();
        std::fs::write(root.join("lib/guava-31.1.jar"), b"guava").unwrap();
        std::fs::write(root.join("lib/core-1.0-SNAPSHOT.jar"), b"snap").unwrap();
        std::fs::write(root.join("classes/bin/run"), b"#!/bin/sh").unwrap();
        std::fs::write(root.join("resources/app.properties"), b"k=v").unwrap();
    }

    #[test]
    fn help_displays() {
        stratum()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Deterministic container image layer planner",
            ));
    }

    #[test]
    fn version_displays() {
        stratum()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stratum"));
    }

    #[test]
    fn config_path() {
        stratum()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let state = TempDir::new().unwrap();
        isolated(state.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"))
            .stdout(predicate::str::contains("[layout]"));
    }

    #[test]
    fn plan_emits_json() {
        let state = TempDir::new().unwrap();
        let tree = TempDir::new().unwrap();
        write_tree(tree.path());

        isolated(state.path())
            .args([
                "plan",
                "--project",
                tree.path().to_str().unwrap(),
                "--base-image",
                "temurin:21-jre",
                "--entrypoint",
                "classes/bin/run",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"order_index\""))
            .stdout(predicate::str::contains("\"content_digest\""))
            .stdout(predicate::str::contains("temurin:21-jre"));
    }

    #[test]
    fn plan_is_deterministic() {
        let state = TempDir::new().unwrap();
        let tree = TempDir::new().unwrap();
        write_tree(tree.path());

        let run = || {
            isolated(state.path())
                .args([
                    "plan",
                    "--project",
                    tree.path().to_str().unwrap(),
                    "--base-image",
                    "temurin:21-jre",
                    "--entrypoint",
                    "classes/bin/run",
                ])
                .output()
                .unwrap()
        };

        let first = run();
        let second = run();
        assert!(first.status.success());
        assert_eq!(first.stdout, second.stdout);
    }

    #[test]
    fn plan_without_entrypoint_fails() {
        let state = TempDir::new().unwrap();
        let tree = TempDir::new().unwrap();
        write_tree(tree.path());

        isolated(state.path())
            .args(["plan", "--project", tree.path().to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid build plan"));
    }

    #[test]
    fn plan_with_too_few_layers_fails() {
        let state = TempDir::new().unwrap();
        let tree = TempDir::new().unwrap();
        write_tree(tree.path());

        isolated(state.path())
            .args([
                "plan",
                "--project",
                tree.path().to_str().unwrap(),
                "--entrypoint",
                "classes/bin/run",
                "--max-layers",
                "1",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Layering policy"))
            .stderr(predicate::str::contains("max_layers"));
    }

    #[test]
    fn plan_missing_project_fails() {
        let state = TempDir::new().unwrap();
        isolated(state.path())
            .args(["plan", "--project", "/definitely/not/a/build/tree"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn classify_plain_output() {
        let state = TempDir::new().unwrap();
        let tree = TempDir::new().unwrap();
        write_tree(tree.path());

        isolated(state.path())
            .args([
                "classify",
                "--project",
                tree.path().to_str().unwrap(),
                "--format",
                "plain",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("fixed-dependency\tlib/guava-31.1.jar"))
            .stdout(predicate::str::contains(
                "snapshot-dependency\tlib/core-1.0-SNAPSHOT.jar",
            ))
            .stdout(predicate::str::contains("application-code\tclasses/bin/run"))
            .stdout(predicate::str::contains("resource\tresources/app.properties"));
    }

    #[test]
    fn cache_list_empty() {
        let state = TempDir::new().unwrap();
        isolated(state.path())
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached layers"));
    }

    #[test]
    fn init_creates_project_config() {
        let state = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        isolated(state.path())
            .args(["init", "--path", project.path().to_str().unwrap()])
            .assert()
            .success();

        let content = std::fs::read_to_string(project.path().join(".stratum.toml")).unwrap();
        assert!(content.contains("[image]"));
    }

    #[test]
    fn completions_generate() {
        stratum()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("stratum"));
    }

    #[test]
    fn unknown_backend_fails() {
        let state = TempDir::new().unwrap();
        let tree = TempDir::new().unwrap();
        write_tree(tree.path());

        isolated(state.path())
            .args([
                "assemble",
                "--project",
                tree.path().to_str().unwrap(),
                "--entrypoint",
                "classes/bin/run",
                "--backend",
                "buildpack",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown assembly backend"));
    }
}
