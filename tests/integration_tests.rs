//! Integration tests for the forge-scaffold binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a forge-scaffold Command with no credentials leaking in
fn scaffold(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("forge-scaffold");
    cmd.current_dir(dir.path())
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("E2B_API_KEY")
        .env_remove("SCAFFOLD_SANDBOX_MODE")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, content: &str) {
    let forge_dir = dir.path().join(".forge");
    fs::create_dir_all(&forge_dir).unwrap();
    fs::write(forge_dir.join("scaffold.toml"), content).unwrap();
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = TempDir::new().unwrap();
        scaffold(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("generate"))
            .stdout(predicate::str::contains("serve"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        scaffold(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_generate_requires_description() {
        let dir = TempDir::new().unwrap();
        scaffold(&dir).arg("generate").assert().failure();
    }
}

mod config_commands {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        scaffold(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No scaffold.toml found"))
            .stdout(predicate::str::contains("max_attempts = 30"))
            .stdout(predicate::str::contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_config_init_creates_toml() {
        let dir = TempDir::new().unwrap();
        scaffold(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created scaffold.toml"));

        let path = dir.path().join(".forge/scaffold.toml");
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("[sandbox]"));
        assert!(content.contains("[readiness]"));

        scaffold(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_no_config() {
        let dir = TempDir::new().unwrap();
        scaffold(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[readiness]\nmax_attempts = 0\n");
        scaffold(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_attempts is 0"));
    }

    #[test]
    fn test_config_shows_file_values() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[plan]\nmax_files = 12\n");
        scaffold(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_files = 12"));
    }

    #[test]
    fn test_project_dir_flag() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        write_config(&other, "[server]\nport = 4100\n");
        scaffold(&dir)
            .arg("--project-dir")
            .arg(other.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 4100"));
    }
}

mod preconditions {
    use super::*;

    #[test]
    fn test_generate_without_llm_key_fails() {
        let dir = TempDir::new().unwrap();
        scaffold(&dir)
            .args(["generate", "--simulate", "A blog"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_remote_sandbox_without_key_fails() {
        let dir = TempDir::new().unwrap();
        scaffold(&dir)
            .env("ANTHROPIC_API_KEY", "test-key")
            .args(["generate", "A blog"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("E2B_API_KEY"));
    }

    #[test]
    fn test_blank_description_rejected() {
        let dir = TempDir::new().unwrap();
        scaffold(&dir)
            .env("ANTHROPIC_API_KEY", "test-key")
            .args(["generate", "--simulate", "   "])
            .assert()
            .failure()
            .stderr(predicate::str::contains("must not be empty"));
    }

    #[test]
    fn test_plan_without_llm_key_fails() {
        let dir = TempDir::new().unwrap();
        scaffold(&dir)
            .args(["plan", "A blog"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_invalid_sandbox_mode_env() {
        let dir = TempDir::new().unwrap();
        scaffold(&dir)
            .env("SCAFFOLD_SANDBOX_MODE", "docker")
            .args(["plan", "A blog"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid sandbox mode"));
    }
}
