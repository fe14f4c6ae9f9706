mod support;

use std::path::Path;
use std::sync::Arc;

use backlog::conflict::{ConflictDetector, ConflictKind};
use backlog::error::Error;
use backlog::fs::{MemFs, TaskFs};
use backlog::lock::ProcessLocker;
use backlog::resolve::{
    ActionKind, ActionMetadata, ConflictResolver, ResolutionPlan, ResolutionStrategy,
    DRY_RUN_NOTICE,
};
use backlog::store::FileTaskStore;

use support::TestBacklog;

fn chronological_fixture() -> TestBacklog {
    let backlog = TestBacklog::new();
    // newer file sorts first
    backlog.write_task("01", "alpha", "", "2024-01-02T10:00:00Z");
    backlog.write_task("01", "beta", "", "2024-01-01T10:00:00Z");
    backlog.write_task("02", "gamma", "", "2024-01-01T09:00:00Z");
    backlog
}

#[test]
fn chronological_keeps_oldest() -> Result<(), Error> {
    let backlog = chronological_fixture();
    let store = backlog.store();
    let conflicts = ConflictDetector::new(&store).detect_conflicts()?;
    let plan = ConflictResolver::new(&store)
        .create_resolution_plan(&conflicts, ResolutionStrategy::Chronological)?;

    assert_eq!(plan.summary, "Chronological resolution: 1 renumbering actions");
    let action = &plan.actions[0];
    assert_eq!(action.kind(), ActionKind::Renumber);
    assert_eq!(action.original_id.to_string(), "01");
    assert_eq!(action.new_id.to_string(), "03");
    assert_eq!(
        action.file_path.as_deref(),
        Some(backlog.tasks_dir().join("T01-alpha.md").as_path())
    );
    assert_eq!(
        action.description,
        "Renumber task 01 to 03 (chronological resolution)"
    );
    match &action.metadata {
        ActionMetadata::Renumber { older_task, .. } => {
            assert_eq!(older_task.as_ref().map(ToString::to_string).as_deref(), Some("01"))
        }
        other => panic!("unexpected metadata {other:?}"),
    }
    Ok(())
}

#[test]
fn execute_renumbers_and_moves_file() -> Result<(), Error> {
    let backlog = chronological_fixture();
    let store = backlog.store();
    let resolver = ConflictResolver::new(&store);
    let conflicts = ConflictDetector::new(&store).detect_conflicts()?;
    let plan = resolver.create_resolution_plan(&conflicts, ResolutionStrategy::Chronological)?;

    let results = resolver.execute_resolution_plan(&plan, false)?;
    assert_eq!(results.len(), 1);
    assert!(results[0].starts_with("RENUMBERED: 01 -> 03 (file: "));
    assert_eq!(
        backlog.file_names(),
        vec!["T01-beta.md", "T02-gamma.md", "T03-alpha.md"]
    );

    let moved = store.read_task(&backlog.tasks_dir().join("T03-alpha.md"))?;
    assert_eq!(moved.id.to_string(), "03");
    assert_eq!(moved.history.len(), 1);
    let change = &moved.history[0].change;
    assert!(change.contains("01 to 03"));
    assert!(change.contains("reason: duplicate_id_chronological"));
    assert!(change.contains("older_task: 01"));
    assert!(change.contains(&format!("created_at: {}", moved.created_at.to_rfc3339())));
    assert!(moved.updated_at.is_some());

    assert!(ConflictDetector::new(&store).detect_conflicts()?.is_empty());
    Ok(())
}

#[test]
fn dry_run_changes_nothing() -> Result<(), Error> {
    let fs = Arc::new(MemFs::new());
    let dir = Path::new("/repo/.backlog");
    for (name, id, created) in [
        ("T01-a.md", "01", "2024-01-02T00:00:00Z"),
        ("T01-b.md", "01", "2024-01-01T00:00:00Z"),
    ] {
        let content = format!("---\nid: \"{id}\"\ntitle: x\ncreated_at: {created}\n---\n");
        fs.write(&dir.join(name), content.as_bytes())?;
    }
    fs.write(
        &dir.join("T02.01-c.md"),
        b"---\nid: \"02.01\"\ntitle: c\nparent: \"05\"\ncreated_at: 2024-01-01T00:00:00Z\n---\n",
    )?;
    let store = FileTaskStore::new(fs.clone(), dir, Arc::new(ProcessLocker::new()));
    let before = fs.snapshot();

    let resolver = ConflictResolver::new(&store);
    let conflicts = ConflictDetector::new(&store).detect_conflicts()?;
    let plan = resolver.create_resolution_plan(&conflicts, ResolutionStrategy::AutoRenumber)?;
    let results = resolver.execute_resolution_plan_with_references(&plan, true)?;

    assert_eq!(
        results,
        vec![
            DRY_RUN_NOTICE,
            "WOULD RENUMBER: 01 -> 02",
            "WOULD REMOVE PARENT: 02.01",
            "WOULD UPDATE PARENT: 02.01 -> 02",
        ]
    );
    assert_eq!(fs.snapshot(), before);
    Ok(())
}

#[test]
fn manual_plan_only_reports() -> Result<(), Error> {
    let backlog = chronological_fixture();
    backlog.write_task("04.01", "stray", "09", "2024-01-01T00:00:00Z");
    let store = backlog.store();
    let resolver = ConflictResolver::new(&store);
    let conflicts = ConflictDetector::new(&store).detect_conflicts()?;
    let plan = resolver.create_resolution_plan(&conflicts, ResolutionStrategy::Manual)?;

    assert_eq!(plan.summary, "Manual resolution required for 3 conflicts");
    assert!(plan.actions.iter().all(|a| a.kind() == ActionKind::Manual));
    assert!(plan.actions[0]
        .description
        .starts_with("Manual resolution required for duplicate_id: Task ID 01"));

    let names = backlog.file_names();
    let results = resolver.execute_resolution_plan(&plan, false)?;
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|line| line.starts_with("MANUAL: ")));
    assert_eq!(backlog.file_names(), names);
    Ok(())
}

#[test]
fn auto_renumber_cascades_references() -> Result<(), Error> {
    let backlog = TestBacklog::new();
    backlog.write_task("01", "alpha", "", "2024-01-01T10:00:00Z");
    backlog.write_task("01", "beta", "", "2024-01-02T10:00:00Z");
    backlog.write_task_file(
        "T02-gamma.md",
        "id: \"02\"\ntitle: gamma\ndependencies: [T01, T05]\ncreated_at: 2024-01-01T10:00:00Z\n",
    );
    let store = backlog.store();
    let resolver = ConflictResolver::new(&store);
    let conflicts = ConflictDetector::new(&store).detect_conflicts()?;
    let plan = resolver.create_resolution_plan(&conflicts, ResolutionStrategy::AutoRenumber)?;
    assert_eq!(plan.summary, "Auto-resolution: 1 actions");

    let results = resolver.execute_resolution_plan_with_references(&plan, false)?;
    assert_eq!(
        results.last().map(String::as_str),
        Some("Updated references for 1 changed IDs")
    );
    assert!(backlog.file_names().contains(&"T03-beta.md".to_string()));

    let gamma = store.get("02")?;
    assert_eq!(gamma.dependencies.0, vec!["T03", "T05"]);
    assert_eq!(gamma.history.len(), 1);
    Ok(())
}

#[test]
fn replayed_plan_executes_the_same() -> Result<(), Error> {
    let backlog = chronological_fixture();
    let store = backlog.store();
    let resolver = ConflictResolver::new(&store);
    let conflicts = ConflictDetector::new(&store).detect_conflicts()?;
    let plan = resolver.create_resolution_plan(&conflicts, ResolutionStrategy::Chronological)?;

    let saved = plan.to_json()?;
    let loaded = ResolutionPlan::from_json(&saved)?;
    assert_eq!(loaded, plan);
    resolver.execute_resolution_plan(&loaded, false)?;
    assert!(backlog.file_names().contains(&"T03-alpha.md".to_string()));
    Ok(())
}

#[test]
fn unknown_strategy_rejected_before_planning() {
    let err = "coin-flip".parse::<ResolutionStrategy>().unwrap_err();
    assert!(matches!(err, Error::UnsupportedStrategy(ref s) if s == "coin-flip"));
    assert_eq!(ConflictKind::DuplicateId.as_str(), "duplicate_id");
}
