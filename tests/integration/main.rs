//! Integration tests for Burrow

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn burrow() -> Command {
        cargo_bin_cmd!("burrow")
    }

    /// Write a config that keeps everything inside `dir`
    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            format!(
                "[chroot]\nsource_root = {:?}\n\n[cache]\ndir = {:?}\n",
                dir.join("src"),
                dir.join("cache")
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn help_displays() {
        burrow()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Build chroot and SDK cache manager"));
    }

    #[test]
    fn version_displays() {
        burrow()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("burrow"));
    }

    #[test]
    fn cache_stats_on_fresh_cache() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());

        burrow()
            .args(["--config", config.to_str().unwrap(), "cache", "stats"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cache root:"))
            .stdout(predicate::str::contains("0 B"));
    }

    #[test]
    fn cache_prune_dry_run_on_empty_cache() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());

        burrow()
            .args([
                "--config",
                config.to_str().unwrap(),
                "cache",
                "prune",
                "--max-age-days",
                "7",
                "--dry-run",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing older than 7 day(s)"));
    }

    #[test]
    fn enter_without_chroot_suggests_create() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());

        burrow()
            .args(["--config", config.to_str().unwrap(), "enter", "--", "true"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not initialized"))
            .stderr(predicate::str::contains("burrow create"));
    }

    #[test]
    fn update_without_chroot_fails() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());

        burrow()
            .args(["--config", config.to_str().unwrap(), "update"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not initialized"));
    }

    #[test]
    fn delete_without_chroot_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());

        burrow()
            .args(["--config", config.to_str().unwrap(), "delete", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No chroot at"));
    }

    #[test]
    fn sdk_requires_a_board() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());

        burrow()
            .args(["--config", config.to_str().unwrap(), "sdk"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No board given"))
            .stderr(predicate::str::contains("--board"));
    }

    #[test]
    fn create_requires_a_board() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());

        burrow()
            .args(["--config", config.to_str().unwrap(), "create"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No board given"));
    }

    #[test]
    fn unknown_component_is_a_usage_error() {
        burrow()
            .args(["sdk", "--board", "board-x", "--component", "kernel"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown SDK component"));
    }

    #[test]
    fn version_and_sdk_path_conflict() {
        burrow()
            .args([
                "create",
                "--board",
                "board-x",
                "--version",
                "100.0.1",
                "--sdk-path",
                "/tmp/sdk",
            ])
            .assert()
            .failure();
    }
}
