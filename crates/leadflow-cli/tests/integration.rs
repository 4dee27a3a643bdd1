#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn leadflow(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("leadflow").unwrap();
    cmd.current_dir(dir.path())
        .env("LEADFLOW_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &TempDir) {
    leadflow(dir).arg("init").assert().success();
}

fn json_of(cmd: &mut Command) -> Value {
    let out = cmd.arg("--json").assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

fn add_lead(dir: &TempDir, name: &str, email: &str) -> u64 {
    let v = json_of(leadflow(dir).args(["lead", "add", name, "--email", email]));
    v["id"].as_u64().unwrap()
}

fn set_email_cap(dir: &TempDir, cap: u32) {
    let path = dir.path().join(".leadflow/config.yaml");
    let yaml = std::fs::read_to_string(&path).unwrap();
    assert!(yaml.contains("  email: 100"), "{yaml}");
    std::fs::write(&path, yaml.replace("  email: 100", &format!("  email: {cap}"))).unwrap();
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_project_files() {
    let dir = TempDir::new().unwrap();
    leadflow(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created:"));

    assert!(dir.path().join(".leadflow/config.yaml").exists());
    assert!(dir.path().join(".leadflow/leads.redb").exists());
    let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
    assert!(gitignore.contains(".leadflow/leads.redb"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_lead(&dir, "Acme Plumbing", "john@acme.com");
    leadflow(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));

    let v = json_of(leadflow(&dir).args(["lead", "show", &id.to_string()]));
    assert_eq!(v["lead"]["business_name"], "Acme Plumbing");
}

#[test]
fn commands_before_init_fail() {
    let dir = TempDir::new().unwrap();
    leadflow(&dir)
        .args(["lead", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// lead
// ---------------------------------------------------------------------------

#[test]
fn lead_add_list_and_show() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    leadflow(&dir)
        .args([
            "lead", "add", "Bob's", "HVAC", "--owner", "Bob Jones", "--phone", "713-555-9876",
            "--city", "Houston", "--vertical", "HVAC",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added lead 1: Bob's HVAC"));

    let list = json_of(leadflow(&dir).args(["lead", "list"]));
    let leads = list.as_array().unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0]["phone"], "+17135559876");
    assert_eq!(leads[0]["vertical"], "hvac");
    assert_eq!(leads[0]["stage"], "new");

    leadflow(&dir)
        .args(["lead", "list", "--vertical", "dental"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No leads."));

    leadflow(&dir)
        .args(["lead", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bob's HVAC"))
        .stdout(predicate::str::contains("not_started"));
}

#[test]
fn lead_add_rejects_duplicates_and_missing_contact() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    add_lead(&dir, "Acme", "john@acme.com");

    leadflow(&dir)
        .args(["lead", "add", "Acme Two", "--email", "JOHN@acme.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    leadflow(&dir)
        .args(["lead", "add", "Nobody Inc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no contact channel"));
}

#[test]
fn lead_stage_only_closes() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_lead(&dir, "Acme", "john@acme.com").to_string();

    leadflow(&dir)
        .args(["lead", "stage", &id, "hot"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid transition"));
    leadflow(&dir)
        .args(["lead", "stage", &id, "customer"])
        .assert()
        .success();
    leadflow(&dir)
        .args(["lead", "stage", &id, "lost"])
        .assert()
        .failure();
}

#[test]
fn lead_import_pipe_file() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let file = dir.path().join("paste.txt");
    std::fs::write(
        &file,
        "Acme Plumbing | john@acme.com | 555-123-4567 | Phoenix | AZ | plumber\n\
         Broken Row\n\
         Miami Smile Dental | lisa@miamismile.com | | Miami | FL | dental\n",
    )
    .unwrap();

    let report = json_of(leadflow(&dir).args(["lead", "import", file.to_str().unwrap()]));
    assert_eq!(report["added"], 2);
    assert_eq!(report["skipped"][0]["position"], 2);

    let list = json_of(leadflow(&dir).args(["lead", "list", "--vertical", "dental"]));
    assert_eq!(list.as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// event
// ---------------------------------------------------------------------------

#[test]
fn events_score_and_deduplicate() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_lead(&dir, "Acme", "john@acme.com").to_string();

    for (kind, pid) in [("reply", "evt-1"), ("site_visit", "evt-2"), ("reply", "evt-1")] {
        leadflow(&dir)
            .args(["event", "record", &id, kind, "--provider-id", pid])
            .assert()
            .success();
    }
    let dup = json_of(leadflow(&dir).args(["event", "record", &id, "click", "--provider-id", "evt-2"]));
    assert_eq!(dup["type"], "duplicate");

    let show = json_of(leadflow(&dir).args(["lead", "show", &id]));
    assert_eq!(show["lead"]["score"], 45);
    assert_eq!(show["tier"], "warm");
    assert_eq!(show["lead"]["stage"], "engaged");
    assert_eq!(show["events"].as_array().unwrap().len(), 2);

    leadflow(&dir)
        .args(["event", "record", &id, "call_answered"])
        .assert()
        .success()
        .stdout(predicate::str::contains("score 60, hot"));

    let hot = json_of(leadflow(&dir).args(["lead", "hot"]));
    assert_eq!(hot[0]["stage"], "hot");
}

#[test]
fn event_for_unknown_lead_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    leadflow(&dir)
        .args(["event", "record", "99", "reply"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lead not found: 99"));
}

// ---------------------------------------------------------------------------
// tick / due / attempts
// ---------------------------------------------------------------------------

#[test]
fn tick_requires_relay_or_dry_run() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    leadflow(&dir)
        .arg("tick")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no relay configured"));
}

#[test]
fn tick_respects_cap_and_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    set_email_cap(&dir, 2);
    for n in 0..3 {
        add_lead(&dir, &format!("Biz {n}"), &format!("owner@biz{n}.com"));
    }

    let due = json_of(leadflow(&dir).arg("due"));
    assert_eq!(due.as_array().unwrap().len(), 3);

    let report = json_of(leadflow(&dir).args(["tick", "--dry-run"]));
    assert_eq!(report["sent"].as_array().unwrap().len(), 2);
    assert_eq!(report["deferred"].as_array().unwrap().len(), 1);
    assert_eq!(report["deferred"][0]["lead_id"], 3);

    let again = json_of(leadflow(&dir).args(["tick", "--dry-run"]));
    assert!(again["sent"].as_array().unwrap().is_empty());

    let attempts = json_of(leadflow(&dir).args(["attempt", "list", "--status", "sent"]));
    assert_eq!(attempts.as_array().unwrap().len(), 2);

    let stats = json_of(leadflow(&dir).arg("stats"));
    let email = stats["today"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["channel"] == "email")
        .unwrap()
        .clone();
    assert_eq!(email["used"], 2);
    assert_eq!(email["cap"], 2);
}

#[test]
fn opted_out_lead_is_never_contacted() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let id = add_lead(&dir, "Acme", "john@acme.com").to_string();
    leadflow(&dir)
        .args(["optout", &id, "--reason", "unsubscribe link"])
        .assert()
        .success()
        .stdout(predicate::str::contains("opted out of all channels"));

    let report = json_of(leadflow(&dir).args(["tick", "--dry-run"]));
    assert!(report["sent"].as_array().unwrap().is_empty());
    let attempts = json_of(leadflow(&dir).args(["attempt", "list"]));
    assert!(attempts.as_array().unwrap().is_empty());

    let stats = json_of(leadflow(&dir).arg("stats"));
    assert_eq!(stats["opted_out"], 1);
}

#[test]
fn tick_rejects_bad_now() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    leadflow(&dir)
        .args(["tick", "--dry-run", "--now", "yesterday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RFC 3339"));
}

// ---------------------------------------------------------------------------
// config / stats
// ---------------------------------------------------------------------------

#[test]
fn config_validate_and_show() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    leadflow(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("signup_url"));

    let path = dir.path().join(".leadflow/config.yaml");
    let mut yaml = std::fs::read_to_string(&path).unwrap();
    yaml.push_str("relay:\n  url: ftp://relay.local\n");
    std::fs::write(&path, yaml).unwrap();
    leadflow(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));

    leadflow(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("DAILY CAP"))
        .stdout(predicate::str::contains("relay ftp://relay.local"));
}

#[test]
fn stats_conversion_rate() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let a = add_lead(&dir, "A", "a@a.com").to_string();
    add_lead(&dir, "B", "b@b.com");
    leadflow(&dir)
        .args(["lead", "stage", &a, "customer"])
        .assert()
        .success();

    let stats = json_of(leadflow(&dir).arg("stats"));
    assert_eq!(stats["total_leads"], 2);
    assert_eq!(stats["conversion_rate"], 50.0);
    assert_eq!(stats["by_stage"]["customer"], 1);
}
