//! Integration tests for start/complete/scrap, next, progress, milestones
//! and archive.

mod common;

use common::TestEnv;
use predicates::prelude::*;

/// A milestone with an epic below it; `beans-w002` waits on `beans-w001`.
fn project() -> TestEnv {
    let env = TestEnv::init();
    env.create(&["Release", "--id", "beans-rel1", "--type", "milestone"]);
    env.create(&["Backend", "--id", "beans-epc1", "--type", "epic", "--parent", "rel1"]);
    env.create(&["Schema", "--id", "beans-w001", "--parent", "epc1", "--priority", "low"]);
    env.create(&[
        "Migrations",
        "--id",
        "beans-w002",
        "--parent",
        "epc1",
        "--priority",
        "critical",
        "--blocked-by",
        "w001",
    ]);
    env.create(&["Docs", "--id", "beans-w003", "--priority", "high"]);
    env
}

// === Start / Complete / Scrap ===

#[test]
fn test_start_blocked_bean_needs_force() {
    let env = project();
    env.beans()
        .args(["start", "beans-w002"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("beans-w002 is blocked by: beans-w001 (Schema)"));

    env.beans()
        .args(["-H", "start", "w002", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Started beans-w002"))
        .stdout(predicate::str::contains("starting anyway"));

    let shown = env.json(&["show", "beans-w002"]);
    assert_eq!(shown["bean"]["status"], "in-progress");
}

#[test]
fn test_start_reports_each_bean() {
    let env = project();
    let value = env.json(&["start", "beans-w001", "beans-w002", "beans-w003"]);
    assert_eq!(value["action"], "start");
    assert_eq!(value["changed"], serde_json::json!(["beans-w001", "beans-w003"]));
    assert_eq!(value["count"], 2);
    assert_eq!(value["warnings"].as_array().unwrap().len(), 1);

    let again = env.json(&["start", "beans-w001"]);
    assert_eq!(again["changed"], serde_json::json!([]));
    assert!(again["warnings"][0].as_str().unwrap().contains("already in-progress"));
}

#[test]
fn test_complete_unblocks_and_appends_summary() {
    let env = project();
    env.json(&["complete", "beans-w001", "-m", "Tables created"]);

    let content = std::fs::read_to_string(env.beans_dir().join("beans-w001--schema.md")).unwrap();
    assert!(content.contains("status: completed"));
    assert!(content.contains("## Summary of Changes\n\nTables created"));

    env.beans().args(["start", "beans-w002"]).assert().success();
}

#[test]
fn test_scrap_requires_reason() {
    let env = project();
    env.beans().args(["scrap", "beans-w003"]).assert().failure();

    let value = env.json(&["scrap", "beans-w003", "--reason", "Covered by the wiki"]);
    assert_eq!(value["beans"][0]["status"], "scrapped");
    assert!(value["beans"][0]["body"]
        .as_str()
        .unwrap()
        .contains("## Reasons for Scrapping"));
}

// === Next ===

#[test]
fn test_next_picks_highest_priority_ready_bean() {
    let env = project();
    // w002 is critical but blocked, so the high-priority w003 wins
    assert_eq!(env.json(&["next"])["bean"]["id"], "beans-w003");

    env.json(&["complete", "beans-w001"]);
    assert_eq!(env.json(&["next"])["bean"]["id"], "beans-w002");
}

#[test]
fn test_next_with_nothing_ready() {
    let env = TestEnv::init();
    env.beans()
        .args(["-H", "next"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No beans ready to start."));
}

// === Progress / Milestones ===

#[test]
fn test_progress_counts() {
    let env = project();
    let value = env.json(&["progress"]);
    assert_eq!(value["total"], 5);
    assert_eq!(value["by_status"]["todo"], 5);
    assert_eq!(value["by_type"]["task"], 3);
    assert_eq!(value["blocked"], 1);
    assert_eq!(value["transitively_blocked"], 1);

    env.beans()
        .args(["-H", "progress"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Project progress (5 beans)"));
}

#[test]
fn test_milestones_aggregate_descendants() {
    let env = project();
    env.json(&["complete", "beans-w001"]);

    let value = env.json(&["milestones"]);
    assert_eq!(value["count"], 1);
    let release = &value["milestones"][0];
    assert_eq!(release["milestone"]["id"], "beans-rel1");
    assert_eq!(release["progress"]["total"], 3);
    assert_eq!(release["progress"]["resolved"], 1);

    env.json(&["complete", "beans-rel1"]);
    assert_eq!(env.json(&["milestones"])["count"], 0);
    assert_eq!(env.json(&["milestones", "--include-done"])["count"], 1);
}

// === Archive ===

#[test]
fn test_archive_removes_resolved_beans() {
    let env = project();
    env.json(&["complete", "beans-w001"]);
    env.json(&["scrap", "beans-w003", "-m", "Not needed"]);

    let value = env.json(&["archive", "--remove-links"]);
    assert_eq!(value["archived"], serde_json::json!(["beans-w001", "beans-w003"]));
    assert_eq!(value["links_removed"], 1);
    assert!(!env.beans_dir().join("beans-w001--schema.md").exists());

    env.beans().arg("check").assert().success();
    env.beans()
        .args(["-H", "archive"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No resolved beans to archive."));
}
