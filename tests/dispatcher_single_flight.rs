use std::sync::Arc;

use tokio::sync::mpsc;
use watchrun::config::ConfigFile;
use watchrun::engine::{ActiveTasks, Dispatcher, EngineEvent};
use watchrun::exec::{Pipeline, PipelineOutcome};
use watchrun::types::{Op, OpMask, ReloadPolicy};
use watchrun::watch::FsEvent;
use watchrun_test_utils::builders::{ConfigBuilder, TaskBuilder};
use watchrun_test_utils::fakes::{CountingNotifier, RecordingRunner};
use watchrun_test_utils::{eventually, init_tracing, with_timeout};

struct Harness {
    dispatcher: Dispatcher,
    active: ActiveTasks,
    notifier: Arc<CountingNotifier>,
    _engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
}

fn harness(cfg: ConfigFile, runner: Arc<RecordingRunner>) -> Harness {
    let (engine_tx, engine_rx) = mpsc::unbounded_channel();
    let notifier = CountingNotifier::new();
    let pipeline = Pipeline::new(runner, notifier.clone(), ReloadPolicy::Always, engine_tx);
    let active = ActiveTasks::new();
    let dispatcher = Dispatcher::new(cfg.rules().to_vec(), Arc::new(pipeline), active.clone());
    Harness {
        dispatcher,
        active,
        notifier,
        _engine_rx: engine_rx,
    }
}

fn write(path: &str) -> FsEvent {
    FsEvent::new(path, Op::Write)
}

#[tokio::test]
async fn burst_on_one_rule_runs_a_single_pipeline() {
    init_tracing();
    let runner = RecordingRunner::gated();
    let cfg = ConfigBuilder::new()
        .task(TaskBuilder::matching("*.txt").command("echo build"))
        .build_in("/srv");
    let h = harness(cfg, runner.clone());

    let mut handles = Vec::new();
    for i in 0..50 {
        handles.extend(h.dispatcher.dispatch(&write(&format!("/srv/{i}.txt"))));
    }
    assert_eq!(handles.len(), 1);

    eventually("command started", || runner.count() == 1).await;
    assert_eq!(h.active.get(), 1);
    assert!(h.dispatcher.rules()[0].is_in_flight());

    runner.release(1);
    let outcome = with_timeout(handles.pop().unwrap()).await.unwrap();
    assert_eq!(outcome, PipelineOutcome::Completed);

    assert_eq!(runner.count(), 1);
    assert_eq!(runner.calls()[0].target, "/srv/0.txt");
    assert_eq!(h.active.get(), 0);
    assert!(!h.dispatcher.rules()[0].is_in_flight());
    assert_eq!(h.notifier.count(), 1);
}

#[tokio::test]
async fn rule_accepts_new_events_once_its_pipeline_finished() {
    init_tracing();
    let runner = RecordingRunner::new();
    let cfg = ConfigBuilder::new()
        .task(TaskBuilder::matching("*.txt").command("echo build"))
        .build_in("/srv");
    let h = harness(cfg, runner.clone());

    for round in 0..3 {
        let handles = h.dispatcher.dispatch(&write("/srv/a.txt"));
        assert_eq!(handles.len(), 1, "round {round}");
        for handle in handles {
            with_timeout(handle).await.unwrap();
        }
    }
    assert_eq!(runner.count(), 3);
}

#[tokio::test]
async fn distinct_rules_run_concurrently_and_bound_the_counter() {
    init_tracing();
    let runner = RecordingRunner::gated();
    let cfg = ConfigBuilder::new()
        .task(TaskBuilder::matching("**/*.txt").command("echo one"))
        .task(TaskBuilder::matching("**/*").command("echo two"))
        .task(TaskBuilder::matching("logs/*.txt").command("echo three"))
        .build_in("/srv");
    let h = harness(cfg, runner.clone());

    let mut handles = Vec::new();
    for i in 0..100 {
        let path = if i % 2 == 0 {
            format!("/srv/logs/{i}.txt")
        } else {
            format!("/srv/{i}.md")
        };
        handles.extend(h.dispatcher.dispatch(&write(&path)));
        assert!(h.active.get() <= 3);
    }
    assert_eq!(handles.len(), 3);

    eventually("all three rules running", || runner.running() == 3).await;
    assert_eq!(h.active.get(), 3);

    runner.release(3);
    for handle in handles {
        with_timeout(handle).await.unwrap();
    }
    assert_eq!(h.active.get(), 0);
    assert_eq!(runner.max_running(), 3);
}

#[tokio::test]
async fn failed_pipeline_still_releases_the_rule() {
    init_tracing();
    let runner = RecordingRunner::new();
    runner.failing("false");
    let cfg = ConfigBuilder::new()
        .task(
            TaskBuilder::matching("*.txt")
                .command("false")
                .command("echo unreachable"),
        )
        .build_in("/srv");
    let h = harness(cfg, runner.clone());

    let handle = h.dispatcher.dispatch(&write("/srv/a.txt")).pop().unwrap();
    let outcome = with_timeout(handle).await.unwrap();

    assert!(!outcome.is_success());
    assert_eq!(runner.lines(), vec!["false"]);
    assert_eq!(h.active.get(), 0);
    assert!(!h.dispatcher.rules()[0].is_in_flight());
}

#[tokio::test]
async fn operation_filter_skips_other_operations() {
    init_tracing();
    let runner = RecordingRunner::new();
    let cfg = ConfigBuilder::new()
        .task(TaskBuilder::matching("*.txt").op("write").command("echo build"))
        .build_in("/srv");
    let h = harness(cfg, runner.clone());

    assert!(h.dispatcher.dispatch(&FsEvent::new("/srv/a.txt", Op::Create)).is_empty());
    assert!(h.dispatcher.dispatch(&FsEvent::new("/srv/a.txt", OpMask::EMPTY)).is_empty());

    let combined = OpMask::from(Op::Write) | Op::Chmod;
    let handles = h.dispatcher.dispatch(&FsEvent::new("/srv/a.txt", combined));
    assert_eq!(handles.len(), 1);
}

#[tokio::test]
async fn virtual_events_bypass_the_operation_filter() {
    init_tracing();
    let runner = RecordingRunner::new();
    let cfg = ConfigBuilder::new()
        .task(TaskBuilder::matching(":assets").op("write").command("echo assets"))
        .build_in("/srv");
    let h = harness(cfg, runner.clone());

    let handles = h.dispatcher.dispatch(&FsEvent::virtual_event(":assets"));
    assert_eq!(handles.len(), 1);
    for handle in handles {
        with_timeout(handle).await.unwrap();
    }
    assert_eq!(runner.calls()[0].target, ":assets");
}
