use assert_cmd::Command;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

struct Sandbox {
    _root: TempDir,
    home: PathBuf,
    base: PathBuf,
    config_dir: PathBuf,
    empty_path: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let root = tempdir().unwrap();
        let home = root.path().join("home");
        let config_dir = root.path().join("config");
        let empty_path = root.path().join("empty-bin");
        fs::create_dir_all(&home).unwrap();
        fs::create_dir_all(&config_dir).unwrap();
        fs::create_dir_all(&empty_path).unwrap();
        Self {
            base: home.join("ricol-sites"),
            home,
            config_dir,
            empty_path,
            _root: root,
        }
    }

    /// No container runtime, no mkcert, no PHP tooling on PATH.
    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ricol"));
        cmd.env("HOME", &self.home)
            .env("RICOL_HOME", &self.base)
            .env("RICOL_CONFIG_DIR", &self.config_dir)
            .env("PATH", &self.empty_path)
            .env_remove("RICOL_CONFIG")
            .env_remove("RICOL_BUNDLE_DIR")
            .env_remove("RICOL_LOG");
        cmd
    }

    fn legacy_sites(&self) -> PathBuf {
        self.home.join("meus-sites")
    }
}

fn parse_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).expect("json output")
}

fn write_project(dir: &Path, url: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("docker-compose.yml"), "services: {}\n").unwrap();
    fs::write(
        dir.join(".env"),
        format!("SITE_URL={url}\nCOMPOSE_PROJECT_NAME=x\n"),
    )
    .unwrap();
}

#[test]
fn help_lists_the_commands() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("create"))
        .stdout(contains("migrate"))
        .stdout(contains("global"));
}

#[test]
fn paths_json_reports_the_workspace_layout() {
    let sandbox = Sandbox::new();
    let out = sandbox.cmd().args(["paths", "--json"]).output().unwrap();
    assert!(out.status.success());
    let body = parse_json(&out.stdout);
    assert_eq!(body["ok"], true);
    let result = &body["result"];
    assert_eq!(result["base"], sandbox.base.to_string_lossy().as_ref());
    assert_eq!(
        result["sites"],
        sandbox.base.join("sites").to_string_lossy().as_ref()
    );
    assert_eq!(
        result["legacy_sites"],
        sandbox.legacy_sites().to_string_lossy().as_ref()
    );
    assert_eq!(result["config_exists"], false);
    assert!(!sandbox.base.exists());
}

#[test]
fn list_shows_projects_with_their_url() {
    let sandbox = Sandbox::new();
    let out = sandbox.cmd().args(["list", "--json"]).output().unwrap();
    assert!(out.status.success());
    assert_eq!(parse_json(&out.stdout)["result"]["projects"], Value::Array(vec![]));

    write_project(&sandbox.base.join("sites/blog"), "blog.dev.localhost");
    fs::create_dir_all(sandbox.base.join("sites/not-a-project")).unwrap();
    sandbox
        .cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(contains("blog\tblog.dev.localhost"))
        .stdout(contains("not-a-project").not());
}

#[test]
fn create_rejects_url_outside_the_dev_suffixes() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args([
            "create",
            "--type",
            "wordpress",
            "--url",
            "blog.example.com",
            "--php",
            "8.3",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(contains("must end with one of"));
    assert!(!sandbox.base.exists());
}

#[test]
fn create_json_error_carries_the_error_code() {
    let sandbox = Sandbox::new();
    let out = sandbox
        .cmd()
        .args([
            "create", "--json", "--type", "laravel", "--url", "shop.dev.test", "--php", "5.6",
        ])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let body = parse_json(&out.stdout);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error_details"]["error_code"], "validation_error");
    assert!(body["error"].as_str().unwrap().contains("unsupported PHP version"));
}

#[test]
fn create_without_terminal_needs_flags() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("create")
        .assert()
        .failure()
        .stderr(contains("pass --type"));
}

#[test]
fn migrate_with_nothing_legacy_is_a_noop() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("migrate")
        .assert()
        .success()
        .stdout(contains("nothing to migrate"));
    assert!(!sandbox.base.exists());
}

#[test]
fn migrate_requires_confirmation_without_terminal() {
    let sandbox = Sandbox::new();
    write_project(&sandbox.legacy_sites().join("blog"), "blog.dev.localhost");
    sandbox
        .cmd()
        .arg("migrate")
        .assert()
        .failure()
        .stderr(contains("pass --yes"));
    assert!(sandbox.legacy_sites().join("blog/.env").is_file());
    assert!(!sandbox.base.exists());
}

#[test]
fn migrate_yes_moves_legacy_projects() {
    let sandbox = Sandbox::new();
    write_project(&sandbox.legacy_sites().join("blog"), "blog.dev.localhost");
    let out = sandbox
        .cmd()
        .args(["migrate", "--yes", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let body = parse_json(&out.stdout);
    assert_eq!(body["result"]["projects"][0], "blog");
    assert!(sandbox.base.join("sites/blog/.env").is_file());
    assert!(!sandbox.legacy_sites().exists());
}

#[test]
fn global_status_is_unconfigured_before_setup() {
    let sandbox = Sandbox::new();
    let out = sandbox
        .cmd()
        .args(["global-status", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let body = parse_json(&out.stdout);
    assert_eq!(body["result"]["state"], "unconfigured");
    assert_eq!(body["result"]["missing"][0], "global-traefik");
}

#[test]
fn global_start_before_setup_points_at_config() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["global", "start"])
        .assert()
        .failure()
        .stderr(contains("ricol config"));
}

#[test]
fn config_without_docker_is_a_precondition_failure() {
    let sandbox = Sandbox::new();
    let out = sandbox.cmd().args(["config", "--json"]).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    let body = parse_json(&out.stdout);
    assert_eq!(body["error_details"]["error_code"], "precondition_missing");
    assert!(body["error"].as_str().unwrap().contains("docker"));
    assert!(!sandbox.base.exists());
}

#[test]
fn doctor_reports_missing_tools() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("doctor")
        .assert()
        .failure()
        .stdout(contains("[fail] docker_runtime (error)"))
        .stdout(contains("remediation:"))
        .stdout(contains("[fail] workspace_layout"));
}

#[test]
fn delete_unknown_project_fails_and_is_journaled() {
    let sandbox = Sandbox::new();
    fs::create_dir_all(sandbox.base.join("logs")).unwrap();
    sandbox
        .cmd()
        .args(["delete", "ghost", "--yes"])
        .assert()
        .failure()
        .stderr(contains("no project named 'ghost'"));

    let journal = fs::read_to_string(sandbox.base.join("logs/ricol.log")).unwrap();
    let entry: Value = serde_json::from_str(journal.lines().next().unwrap()).unwrap();
    assert_eq!(entry["command"], "delete");
    assert_eq!(entry["target"], "ghost");
    assert_eq!(entry["ok"], false);
    assert_eq!(entry["error_code"], "validation_error");
}

#[test]
fn invalid_config_file_is_rejected() {
    let sandbox = Sandbox::new();
    fs::write(
        sandbox.config_dir.join("config.yaml"),
        "version: 1\nunknown_section: true\n",
    )
    .unwrap();
    sandbox
        .cmd()
        .arg("list")
        .assert()
        .failure()
        .stderr(contains("unknown"));
}
