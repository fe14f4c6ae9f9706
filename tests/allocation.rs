mod support;

use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use backlog::config::LockMode;
use backlog::error::Error;
use backlog::id::TaskId;
use backlog::fs::{MemFs, TaskFs};
use backlog::lock::{FileLocker, LockGuard, ProcessLocker};
use backlog::store::{CreateTaskParams, FileTaskStore};

use support::TestBacklog;

fn params(title: &str) -> CreateTaskParams {
    CreateTaskParams {
        title: title.to_string(),
        ..CreateTaskParams::default()
    }
}

#[test]
fn top_level_ids_are_monotonic() -> Result<(), Error> {
    let backlog = TestBacklog::new();
    let store = backlog.store();

    let ids: Vec<String> = (0..3)
        .map(|i| store.create(params(&format!("task {i}"))).map(|t| t.id.to_string()))
        .collect::<Result<_, _>>()?;
    assert_eq!(ids, vec!["01", "02", "03"]);
    assert_eq!(
        backlog.file_names(),
        vec!["T01-task_0.md", "T02-task_1.md", "T03-task_2.md"]
    );
    Ok(())
}

#[test]
fn gaps_are_never_reused() -> Result<(), Error> {
    let backlog = TestBacklog::new();
    backlog.write_task("17", "root", "", "2024-01-01T00:00:00Z");
    backlog.write_task("17.02", "two", "17", "2024-01-01T00:00:00Z");
    backlog.write_task("17.04", "four", "17", "2024-01-01T00:00:00Z");
    let store = backlog.store();

    assert_eq!(store.next_task_id(&[17])?.to_string(), "17.05");
    assert_eq!(store.next_task_id(&[])?.to_string(), "18");
    assert_eq!(store.next_task_id(&[17, 4])?.to_string(), "17.04.01");
    Ok(())
}

#[test]
fn non_task_files_are_skipped() -> Result<(), Error> {
    let backlog = TestBacklog::new();
    backlog.write_task("02", "real", "", "2024-01-01T00:00:00Z");
    std::fs::write(backlog.tasks_dir().join("README.md"), "notes")?;
    std::fs::write(backlog.tasks_dir().join("Tbad-name.md"), "junk")?;
    std::fs::create_dir_all(backlog.tasks_dir().join("T09-folder.md"))?;

    assert_eq!(backlog.store().next_task_id(&[])?.to_string(), "03");
    Ok(())
}

#[test]
fn subtask_created_under_parent() -> Result<(), Error> {
    let backlog = TestBacklog::new();
    let store = backlog.store();
    let parent = store.create(params("epic"))?;
    let child = store.create(CreateTaskParams {
        parent: Some("T1".to_string()),
        ..params("child")
    })?;

    assert_eq!(child.id.to_string(), "01.01");
    assert_eq!(child.parent, parent.id);
    Ok(())
}

#[test]
fn serialized_creators_get_unique_ids() {
    let backlog = TestBacklog::with_lock_mode(LockMode::File);
    let store = backlog.store();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    // allocation and the following write are serialized by the caller
    let api_lock = Arc::new(Mutex::new(()));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            let api_lock = Arc::clone(&api_lock);
            thread::spawn(move || {
                barrier.wait();
                let _serial = api_lock.lock().expect("api lock");
                store.create(params(&format!("worker {i}"))).expect("create")
            })
        })
        .collect();

    let ids: HashSet<TaskId> = handles
        .into_iter()
        .map(|h| h.join().expect("join").id)
        .collect();
    assert_eq!(ids.len(), threads);
    assert_eq!(backlog.file_names().len(), threads);
}

#[test]
fn concurrent_allocations_never_fail() {
    let backlog = TestBacklog::with_lock_mode(LockMode::File);
    backlog.write_task("05", "seed", "", "2024-01-01T00:00:00Z");
    let store = backlog.store();
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.next_task_id(&[]).expect("allocate")
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("join").to_string(), "06");
    }
}

#[test]
fn held_file_lock_times_out_other_allocator() -> Result<(), Error> {
    let backlog = TestBacklog::new();
    let mut config = backlog.config().clone();
    config.lock.mode = LockMode::File;
    config.lock.timeout_ms = 100;
    let store = FileTaskStore::open(backlog.root(), &config);

    let holder = FileLocker::new(config.lock_path(backlog.root()), 100);
    let guard = LockGuard::acquire(&holder)?;
    match store.next_task_id(&[]) {
        Err(Error::LockTimeout(path)) => assert_eq!(path, config.lock_path(backlog.root())),
        other => panic!("expected lock timeout, got {other:?}"),
    }
    drop(guard);

    assert_eq!(store.next_task_id(&[])?.to_string(), "01");
    Ok(())
}

#[test]
fn failed_scan_releases_the_lock() -> Result<(), Error> {
    let fs = Arc::new(MemFs::new());
    let locker = Arc::new(ProcessLocker::new());
    let store = FileTaskStore::new(fs.clone(), "/repo/.backlog", locker.clone());

    let err = store.next_task_id(&[]).unwrap_err();
    assert!(matches!(err, Error::Io(_)), "unexpected error: {err:?}");
    assert!(!locker.is_held());

    fs.create_dir_all(std::path::Path::new("/repo/.backlog"))?;
    assert_eq!(store.next_task_id(&[])?.to_string(), "01");
    assert!(!locker.is_held());
    Ok(())
}

#[test]
fn exhausted_segment_is_an_error() {
    let backlog = TestBacklog::new();
    backlog.write_task(&u32::MAX.to_string(), "last", "", "2024-01-01T10:00:00Z");
    backlog.write_task("02.01", "child", "02", "2024-01-01T10:00:00Z");
    let store = backlog.store();

    assert!(matches!(
        store.next_task_id(&[]),
        Err(Error::InvalidTaskId { .. })
    ));
    assert_eq!(store.next_task_id(&[2]).unwrap().to_string(), "02.02");
}
