//! CLI integration tests for infraflow
//!
//! Tests the infraflow CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

/// Isolated database and config directory for one test
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Command bound to this sandbox's database and config
    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("infraflow").unwrap();
        cmd.env("INFRAFLOW_CONFIG_DIR", self.dir.path().join("config"));
        cmd.env_remove("RUST_LOG");
        cmd.arg("--db").arg(self.dir.path().join("infraflow.db"));
        cmd
    }

    fn admin(&self) -> Command {
        let mut cmd = self.cmd();
        cmd.args(["--actor-id", "u-admin", "--actor-name", "Admin", "--actor-role", "admin"]);
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.admin().args(args).args(["--format", "json"]).output().unwrap();
        assert!(
            output.status.success(),
            "command {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    fn create_project(&self, name: &str) -> String {
        let project = self.json(&["projects", "create", name]);
        project["id"].as_str().unwrap().to_string()
    }
}

#[test]
fn test_projects_create_and_list() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["projects", "create", "Campus network", "--description", "Core and edge"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Project created successfully"))
        .stdout(predicate::str::contains("Phase: proposal"));

    sandbox
        .cmd()
        .args(["projects", "create", "Intranet", "--type", "web-dev"])
        .assert()
        .success();

    sandbox
        .cmd()
        .args(["projects", "list", "--type", "infrastructure"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Campus network"))
        .stdout(predicate::str::contains("Intranet").not());
}

#[test]
fn test_proposal_approval_advances_phase() {
    let sandbox = Sandbox::new();
    let id = sandbox.create_project("Wireless upgrade");

    sandbox
        .cmd()
        .args(["proposal", "save", &id, "--background", "x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Proposal saved as draft"));
    sandbox.cmd().args(["proposal", "submit", &id]).assert().success();

    // Default role is user, which may not approve
    sandbox
        .cmd()
        .args(["proposal", "approve", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E200"));

    sandbox
        .admin()
        .args(["proposal", "approve", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("approved by Admin"))
        .stdout(predicate::str::contains("rkb phase"));

    let detail = sandbox.json(&["projects", "show", &id]);
    assert_eq!(detail["current_phase"], "rkb");
    assert_eq!(detail["status"], "in_progress");
    assert_eq!(detail["proposal"]["approval_status"], "approved");
    assert_eq!(detail["proposal"]["approved_by"], "Admin");
}

#[test]
fn test_rkb_items_drive_total_budget() {
    let sandbox = Sandbox::new();
    let id = sandbox.create_project("Office cabling");
    sandbox.admin().args(["proposal", "submit", &id]).assert().success();
    sandbox.admin().args(["proposal", "approve", &id]).assert().success();

    let first = sandbox.json(&[
        "rkb", "add-item", &id, "--name", "Cat6 cable", "--quantity", "2", "--unit", "roll",
        "--unit-price", "500000",
    ]);
    assert_eq!(first["item"]["total_price"], 1_000_000);

    let second = sandbox.json(&[
        "rkb", "add-item", &id, "--name", "Patch panel", "--quantity", "1", "--unit", "unit",
        "--unit-price", "250000",
    ]);
    assert_eq!(second["total_budget"], 1_250_000);

    let first_id = first["item"]["id"].as_str().unwrap();
    let removed = sandbox.json(&["rkb", "remove-item", first_id]);
    assert_eq!(removed["total_budget"], 250_000);

    sandbox
        .cmd()
        .args(["rkb", "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("total_budget: 250000"))
        .stdout(predicate::str::contains("Patch panel"));
}

#[test]
fn test_advance_without_approval_fails() {
    let sandbox = Sandbox::new();
    let id = sandbox.create_project("Backup site");

    sandbox
        .cmd()
        .args(["phase", "advance", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E102"))
        .stderr(predicate::str::contains("Proposal must be approved"));
}

#[test]
fn test_web_dev_project_has_no_phases() {
    let sandbox = Sandbox::new();
    let project = sandbox.json(&["projects", "create", "Landing page", "--type", "web-dev"]);
    let id = project["id"].as_str().unwrap();
    assert!(project["current_phase"].is_null());

    sandbox
        .cmd()
        .args(["phase", "advance", id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E100"));
}

#[test]
fn test_execution_log_and_complete() {
    let sandbox = Sandbox::new();
    let id = sandbox.create_project("Server room");

    sandbox
        .cmd()
        .args(["execution", "log", &id, "--description", "Too early", "--progress", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E103"));

    let completed = sandbox.json(&["execution", "complete", &id]);
    assert_eq!(completed["current_phase"], "completed");
    assert_eq!(completed["status"], "completed");

    sandbox
        .cmd()
        .args(["phase", "advance", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E101"));
}

#[test]
fn test_reject_requires_reason_and_is_audited() {
    let sandbox = Sandbox::new();
    let id = sandbox.create_project("Firewall");
    sandbox.cmd().args(["proposal", "submit", &id]).assert().success();

    sandbox
        .admin()
        .args(["proposal", "reject", &id, "--reason", "Needs cost estimate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Proposal rejected"));

    let entries = sandbox.json(&["audit", "list", "--project", &id]);
    let actions: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert!(actions.contains(&"SUBMIT_PROPOSAL"));
    assert!(actions.contains(&"REJECT_PROPOSAL"));
}

#[test]
fn test_config_set_get_and_reset() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["config", "get", "workflow.edit_policy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("locked"));

    sandbox
        .cmd()
        .args(["config", "set", "workflow.edit_policy", "reset_to_draft"])
        .assert()
        .success();
    sandbox
        .cmd()
        .args(["config", "get", "workflow.edit_policy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reset_to_draft"));

    sandbox
        .cmd()
        .args(["config", "set", "workflow.edit_policy", "sometimes"])
        .assert()
        .failure();
    sandbox
        .cmd()
        .args(["config", "get", "nope.key"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key"));

    sandbox.cmd().args(["config", "reset"]).assert().success();
    sandbox
        .cmd()
        .args(["config", "get", "workflow.edit_policy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("locked"));
}

#[test]
fn test_doctor_reports_healthy_database() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] Database"))
        .stdout(predicate::str::contains("All checks passed"));
}
