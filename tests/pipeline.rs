use std::sync::Arc;

use tokio::sync::mpsc;
use watchrun::config::ConfigFile;
use watchrun::engine::EngineEvent;
use watchrun::exec::{Pipeline, PipelineOutcome};
use watchrun::types::ReloadPolicy;
use watchrun_test_utils::builders::{ConfigBuilder, TaskBuilder};
use watchrun_test_utils::fakes::{CountingNotifier, RecordingRunner};
use watchrun_test_utils::{init_tracing, with_timeout};

fn single_task(task: TaskBuilder) -> ConfigFile {
    ConfigBuilder::new().task(task).build_in("/srv")
}

struct Harness {
    pipeline: Arc<Pipeline>,
    runner: Arc<RecordingRunner>,
    notifier: Arc<CountingNotifier>,
    engine_rx: mpsc::UnboundedReceiver<EngineEvent>,
}

fn harness(policy: ReloadPolicy) -> Harness {
    let (engine_tx, engine_rx) = mpsc::unbounded_channel();
    let runner = RecordingRunner::new();
    let notifier = CountingNotifier::new();
    let pipeline = Pipeline::new(runner.clone(), notifier.clone(), policy, engine_tx);
    Harness {
        pipeline: Arc::new(pipeline),
        runner,
        notifier,
        engine_rx,
    }
}

#[tokio::test]
async fn commands_run_in_order_and_stop_at_first_failure() {
    init_tracing();
    let h = harness(ReloadPolicy::Always);
    h.runner.failing("make test");
    let cfg = single_task(
        TaskBuilder::matching("**/*.c")
            .command("make")
            .command("make test")
            .command("make install"),
    );

    let outcome = h.pipeline.run(&cfg.rules()[0], "/srv/src/main.c").await;

    assert_eq!(
        outcome,
        PipelineOutcome::Stopped {
            index: 1,
            command: "make test".to_string()
        }
    );
    assert_eq!(h.runner.lines(), vec!["make", "make test"]);
    assert!(h.runner.calls().iter().all(|c| c.target == "/srv/src/main.c"));
}

#[tokio::test]
async fn quiet_applies_to_the_rest_of_the_invocation() {
    init_tracing();
    let h = harness(ReloadPolicy::Always);
    let cfg = single_task(
        TaskBuilder::matching("*.md")
            .command("echo loud")
            .command(":quiet")
            .command("echo hushed"),
    );

    assert!(h.pipeline.run(&cfg.rules()[0], "/srv/a.md").await.is_success());

    let quiet: Vec<bool> = h.runner.calls().iter().map(|c| c.quiet).collect();
    assert_eq!(quiet, vec![false, true]);
}

#[tokio::test]
async fn reload_and_exit_are_forwarded_to_the_runtime() {
    init_tracing();
    let mut h = harness(ReloadPolicy::Always);
    let cfg = single_task(TaskBuilder::matching("*.yml").command(":reload").command(":exit"));

    assert!(h.pipeline.run(&cfg.rules()[0], "/srv/a.yml").await.is_success());

    assert!(matches!(h.engine_rx.try_recv(), Ok(EngineEvent::ReloadRequested)));
    assert!(matches!(h.engine_rx.try_recv(), Ok(EngineEvent::ShutdownRequested)));
}

#[tokio::test]
async fn unknown_internal_command_fails_the_pipeline() {
    init_tracing();
    let h = harness(ReloadPolicy::Always);
    let cfg = single_task(TaskBuilder::matching("*.txt").command(":frobnicate").command("echo after"));

    let outcome = h.pipeline.run(&cfg.rules()[0], "/srv/a.txt").await;

    assert!(!outcome.is_success());
    assert_eq!(h.runner.count(), 0);
}

#[tokio::test]
async fn sleep_requires_a_numeric_duration() {
    init_tracing();
    let h = harness(ReloadPolicy::Always);
    let ok = single_task(TaskBuilder::matching("*.txt").command(":sleep 5").command("echo after"));
    let bad = single_task(TaskBuilder::matching("*.txt").command(":sleep soon").command("echo after"));

    assert!(h.pipeline.run(&ok.rules()[0], "/srv/a.txt").await.is_success());
    assert!(!h.pipeline.run(&bad.rules()[0], "/srv/a.txt").await.is_success());
    assert_eq!(h.runner.count(), 1);
}

#[tokio::test]
async fn fire_and_forget_event_does_not_wait() {
    init_tracing();
    let mut h = harness(ReloadPolicy::Always);
    let cfg = single_task(
        TaskBuilder::matching("*.scss")
            .command(":event! :css :html")
            .command("echo done"),
    );

    assert!(h.pipeline.run(&cfg.rules()[0], "/srv/a.scss").await.is_success());

    for expected in [":css", ":html"] {
        match h.engine_rx.try_recv() {
            Ok(EngineEvent::Virtual { name, done }) => {
                assert_eq!(name, expected);
                assert!(done.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(h.runner.lines(), vec!["echo done"]);
}

#[tokio::test]
async fn event_waits_for_the_triggered_pipelines() {
    init_tracing();
    let mut h = harness(ReloadPolicy::Always);
    let cfg = single_task(TaskBuilder::matching("*.scss").command(":event :css").command("echo done"));

    let pipeline = h.pipeline.clone();
    let rule = cfg.rules()[0].clone();
    let run = tokio::spawn(async move { pipeline.run(&rule, "/srv/a.scss").await });

    let done = match with_timeout(h.engine_rx.recv()).await {
        Some(EngineEvent::Virtual { name, done }) => {
            assert_eq!(name, ":css");
            done.expect("waiting event carries a completion channel")
        }
        other => panic!("unexpected {other:?}"),
    };

    tokio::task::yield_now().await;
    assert!(!run.is_finished());
    assert_eq!(h.runner.count(), 0);

    done.send(()).unwrap();
    assert!(with_timeout(run).await.unwrap().is_success());
    assert_eq!(h.runner.lines(), vec!["echo done"]);
}

#[tokio::test]
async fn reload_policy_controls_notifications() {
    init_tracing();
    for (policy, ok_count, failed_count) in [
        (ReloadPolicy::Always, 1, 1),
        (ReloadPolicy::OnSuccess, 1, 0),
        (ReloadPolicy::Never, 0, 0),
    ] {
        let h = harness(policy);
        h.runner.failing("false");
        let ok = single_task(TaskBuilder::matching("*.html").command("true"));
        let failed = single_task(TaskBuilder::matching("*.html").command("false"));

        h.pipeline.run(&ok.rules()[0], "/srv/index.html").await;
        assert_eq!(h.notifier.count(), ok_count, "{policy:?} after success");

        h.pipeline.run(&failed.rules()[0], "/srv/index.html").await;
        assert_eq!(
            h.notifier.count(),
            ok_count + failed_count,
            "{policy:?} after failure"
        );
    }
}
