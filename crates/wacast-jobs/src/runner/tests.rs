use super::*;
use crate::checkpoint::tests::temp_dir;
use std::path::PathBuf;
use std::sync::Mutex;

fn items(n: usize) -> Vec<WorkItem> {
    (0..n)
        .map(|i| WorkItem::new(format!("C{i}"), key(i)))
        .collect()
}

fn key(i: usize) -> String {
    format!("2547000000{i:02}")
}

fn fast_config(flush_every: usize) -> RunnerConfig {
    RunnerConfig {
        flush_every,
        min_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        item_timeout: Duration::from_secs(2),
        progress_every: 0,
    }
}

fn runner(dir: &PathBuf, config: RunnerConfig) -> BatchRunner {
    BatchRunner::new(
        CheckpointStore::new(dir.join("jobs")),
        Arc::new(LedgerStore::new(dir.join("ledger.json"))),
        Arc::new(JobRegistry::new()),
        config,
    )
}

#[derive(Default)]
struct MockOp {
    applied: Mutex<Vec<String>>,
    fail: Vec<String>,
    reject: Vec<String>,
    /// Stop the running job while applying this key.
    stop_on: Option<(String, Arc<JobRegistry>)>,
    slow: Option<Duration>,
    progress: Mutex<Vec<usize>>,
    /// Read the on-disk cursor while applying this key.
    peek: Option<(String, CheckpointStore)>,
    peeked: Mutex<Option<usize>>,
}

impl MockOp {
    fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemOperation for MockOp {
    fn kind(&self) -> JobKind {
        JobKind::VerifyNumbers
    }

    fn is_handled(&self, ledger: &Ledger, item: &WorkItem) -> bool {
        ledger.is_verified(&item.normalized_key) || ledger.is_rejected(&item.normalized_key)
    }

    async fn apply(&self, item: &WorkItem) -> Result<Outcome, WacastError> {
        let k = &item.normalized_key;
        self.applied.lock().unwrap().push(k.clone());
        if let Some((stop_key, registry)) = &self.stop_on {
            if stop_key == k {
                registry.stop(JobKind::VerifyNumbers);
            }
        }
        if let Some((peek_key, store)) = &self.peek {
            if peek_key == k {
                let idx = store.load(JobKind::VerifyNumbers).map(|c| c.current_index);
                *self.peeked.lock().unwrap() = idx;
            }
        }
        if let Some(d) = self.slow {
            tokio::time::sleep(d).await;
        }
        if self.fail.contains(k) {
            return Err(WacastError::PerItem(format!("boom {k}")));
        }
        if self.reject.contains(k) {
            return Ok(Outcome::Rejected);
        }
        Ok(Outcome::Succeeded)
    }

    fn record(&self, ledger: &mut Ledger, item: &WorkItem, outcome: Outcome) {
        match outcome {
            Outcome::Succeeded => ledger.mark_verified(&item.normalized_key, &item.display_name),
            Outcome::Rejected => ledger.mark_rejected(&item.normalized_key, &item.display_name),
        }
    }

    async fn on_progress(&self, progress: &Progress) {
        self.progress.lock().unwrap().push(progress.position);
    }
}

#[tokio::test]
async fn test_run_to_completion_marks_inactive() {
    let dir = temp_dir("run_complete");
    let r = runner(&dir, fast_config(2));
    let op = MockOp {
        reject: vec![key(1)],
        ..Default::default()
    };

    let summary = r.start(items(3), None, &op).await.unwrap();
    assert_eq!(
        summary,
        Summary {
            processed: 3,
            succeeded: 2,
            rejected: 1,
            ..Default::default()
        }
    );

    let cp = r.checkpoints().load(JobKind::VerifyNumbers).unwrap();
    assert!(!cp.is_active);
    assert_eq!(cp.current_index, 3);

    let ledger = r.ledger().load();
    assert!(ledger.is_verified(&key(0)) && ledger.is_verified(&key(2)));
    assert!(ledger.is_rejected(&key(1)));
    assert_eq!(ledger.name_of(&key(2)), "C2");
    assert!(!r.registry().is_running(JobKind::VerifyNumbers), "lease released");
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_item_error_is_counted_and_loop_continues() {
    let dir = temp_dir("run_error");
    let r = runner(&dir, fast_config(1));
    let op = MockOp {
        fail: vec![key(1)],
        ..Default::default()
    };

    let summary = r.start(items(3), None, &op).await.unwrap();
    assert_eq!(summary.errored, 1);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.processed, 3);
    assert!(!summary.stopped_early);
    assert_eq!(op.applied(), vec![key(0), key(1), key(2)]);
    assert!(!r.ledger().load().is_rejected(&key(1)), "errors are not outcomes");
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_stop_during_fifth_item() {
    let dir = temp_dir("run_stop");
    let r = runner(&dir, fast_config(3));
    let op = MockOp {
        stop_on: Some((key(4), Arc::clone(r.registry()))),
        ..Default::default()
    };

    let summary = r.start(items(10), None, &op).await.unwrap();
    assert!(summary.stopped_early);
    assert_eq!(summary.processed, 5);
    assert_eq!(op.applied().len(), 5);

    let cp = r.checkpoints().load(JobKind::VerifyNumbers).unwrap();
    assert!(cp.is_active);
    assert_eq!(cp.current_index, 5);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_stop_then_resume_processes_each_item_once() {
    let dir = temp_dir("run_stop_resume");
    let r = runner(&dir, fast_config(1));
    let first = MockOp {
        stop_on: Some((key(2), Arc::clone(r.registry()))),
        ..Default::default()
    };
    let s1 = r.start(items(6), None, &first).await.unwrap();
    assert!(s1.stopped_early);

    let second = MockOp::default();
    let s2 = r.resume(&second).await.unwrap();
    assert!(!s2.stopped_early);
    assert_eq!(s2.processed, 3);

    let mut all = first.applied();
    all.extend(second.applied());
    assert_eq!(all, (0..6).map(key).collect::<Vec<_>>());
    assert!(!r.checkpoints().load(JobKind::VerifyNumbers).unwrap().is_active);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_resume_after_crash_processes_suffix() {
    let dir = temp_dir("run_crash");
    let r = runner(&dir, fast_config(5));
    // A crashed run leaves an active checkpoint behind.
    let mut cp = Checkpoint::new(JobKind::VerifyNumbers, items(10), None);
    cp.current_index = 4;
    r.checkpoints().save(&cp).unwrap();

    let op = MockOp::default();
    let summary = r.resume(&op).await.unwrap();
    assert_eq!(summary.processed, 6);
    assert_eq!(op.applied(), (4..10).map(key).collect::<Vec<_>>());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_resume_skips_items_already_in_ledger() {
    let dir = temp_dir("run_crash_ledger");
    let r = runner(&dir, fast_config(5));
    // Items 4 and 5 were recorded before the crash but the cursor was not flushed.
    r.ledger()
        .update(|l| {
            l.mark_verified(&key(4), "C4");
            l.mark_rejected(&key(5), "C5");
        })
        .unwrap();
    let mut cp = Checkpoint::new(JobKind::VerifyNumbers, items(8), None);
    cp.current_index = 4;
    r.checkpoints().save(&cp).unwrap();

    let op = MockOp::default();
    let summary = r.resume(&op).await.unwrap();
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.skipped_already_handled, 2);
    assert_eq!(op.applied(), vec![key(6), key(7)]);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_resume_without_saved_job() {
    let dir = temp_dir("run_nosaved");
    let r = runner(&dir, fast_config(1));
    let op = MockOp::default();
    assert!(matches!(r.resume(&op).await, Err(WacastError::NoSavedJob(_))));

    let mut cp = Checkpoint::new(JobKind::VerifyNumbers, items(3), None);
    cp.is_active = false;
    r.checkpoints().save(&cp).unwrap();
    assert!(matches!(r.resume(&op).await, Err(WacastError::NoSavedJob(_))));

    let empty = Checkpoint::new(JobKind::VerifyNumbers, vec![], None);
    r.checkpoints().save(&empty).unwrap();
    assert!(matches!(r.resume(&op).await, Err(WacastError::NoSavedJob(_))));

    assert!(op.applied().is_empty());
    assert!(!r.registry().is_running(JobKind::VerifyNumbers));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_start_rejects_empty_and_concurrent() {
    let dir = temp_dir("run_guard");
    let r = runner(&dir, fast_config(1));
    let op = MockOp::default();
    assert!(matches!(
        r.start(vec![], None, &op).await,
        Err(WacastError::InputInvalid(_))
    ));

    let held = r.registry().acquire(JobKind::VerifyNumbers).unwrap();
    assert!(matches!(
        r.start(items(2), None, &op).await,
        Err(WacastError::AlreadyRunning(_))
    ));
    drop(held);
    assert!(r.start(items(2), None, &op).await.is_ok());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_timeout_counts_as_error() {
    let dir = temp_dir("run_timeout");
    let mut config = fast_config(1);
    config.item_timeout = Duration::from_millis(20);
    let r = runner(&dir, config);
    let op = MockOp {
        slow: Some(Duration::from_millis(500)),
        ..Default::default()
    };
    let summary = r.start(items(2), None, &op).await.unwrap();
    assert_eq!(summary.errored, 2);
    assert_eq!(summary.processed, 2);
    assert!(r.ledger().load().verified_set.is_empty());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_checkpoint_write_failure_does_not_stop_run() {
    let dir = temp_dir("run_cp_unwritable");
    // A regular file where the checkpoint directory should be.
    std::fs::write(dir.join("jobs"), b"not a dir").unwrap();
    let r = runner(&dir, fast_config(1));
    let op = MockOp {
        reject: vec![key(2)],
        ..Default::default()
    };

    let checkpoint = Checkpoint::new(JobKind::VerifyNumbers, items(3), None);
    let summary = r.run(checkpoint, &op, &StopSignal::new()).await;
    assert_eq!(
        summary,
        Summary {
            processed: 3,
            succeeded: 2,
            rejected: 1,
            ..Default::default()
        }
    );
    assert!(r.checkpoints().load(JobKind::VerifyNumbers).is_none());
    let ledger = r.ledger().load();
    assert!(ledger.is_verified(&key(0)) && ledger.is_rejected(&key(2)));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_ledger_write_failure_continues_in_memory() {
    let dir = temp_dir("run_ledger_unwritable");
    // A directory where the ledger file should be: reads and writes both fail.
    std::fs::create_dir_all(dir.join("ledger.json")).unwrap();
    let r = runner(&dir, fast_config(1));
    let op = MockOp::default();

    let mut list = items(2);
    list.push(list[0].clone());
    let summary = r.start(list, None, &op).await.unwrap();
    assert_eq!(
        summary,
        Summary {
            processed: 3,
            succeeded: 2,
            skipped_already_handled: 1,
            ..Default::default()
        }
    );
    assert_eq!(op.applied(), vec![key(0), key(1)], "repeat skipped from memory");

    let cp = r.checkpoints().load(JobKind::VerifyNumbers).unwrap();
    assert!(!cp.is_active);
    assert_eq!(cp.current_index, 3);
    assert!(dir.join("ledger.json").is_dir());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_checkpoint_flushed_every_n_items() {
    let dir = temp_dir("run_flush");
    let r = runner(&dir, fast_config(3));
    let op = MockOp {
        peek: Some((key(4), CheckpointStore::new(dir.join("jobs")))),
        ..Default::default()
    };
    r.start(items(7), None, &op).await.unwrap();
    // Items 0..3 done and flushed; item 3 processed but not yet flushed.
    assert_eq!(*op.peeked.lock().unwrap(), Some(3));
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_stop_wakes_inter_item_delay() {
    let dir = temp_dir("run_delay_stop");
    let mut config = fast_config(1);
    config.min_delay = Duration::from_secs(30);
    config.max_delay = Duration::from_secs(30);
    let r = runner(&dir, config);
    let op = MockOp {
        stop_on: Some((key(0), Arc::clone(r.registry()))),
        ..Default::default()
    };
    let summary = tokio::time::timeout(Duration::from_secs(5), r.start(items(3), None, &op))
        .await
        .expect("stop should cut the delay short")
        .unwrap();
    assert!(summary.stopped_early);
    assert_eq!(summary.processed, 1);
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_progress_callback_cadence() {
    let dir = temp_dir("run_progress");
    let mut config = fast_config(10);
    config.progress_every = 2;
    let r = runner(&dir, config);
    let op = MockOp::default();
    r.start(items(5), None, &op).await.unwrap();
    assert_eq!(*op.progress.lock().unwrap(), vec![2, 4]);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_pick_delay_within_bounds() {
    let config = RunnerConfig {
        min_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(200),
        ..fast_config(1)
    };
    for _ in 0..50 {
        let d = config.pick_delay();
        assert!(d >= config.min_delay && d <= config.max_delay);
    }
}

#[test]
fn test_estimate_uses_midpoint() {
    let config = RunnerConfig::from(&JobsConfig::default());
    assert_eq!(config.estimate(1), Duration::ZERO);
    assert_eq!(config.estimate(3), Duration::from_secs(90));
}
