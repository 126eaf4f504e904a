// ABOUTME: Integration tests for the execution coordinator.
// ABOUTME: Drives run_batch through a mock session runner; no network involved.

use async_trait::async_trait;
use fantail::config::CommandSpec;
use fantail::exec::{
    self, BatchReport, SessionError, SessionOutcome, SessionRunner, ShutdownSignal, shutdown,
};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted runner: records every invocation and plays back a fixed outcome.
struct ScriptedRunner {
    completions: AtomicUsize,
    seen_prefixes: Mutex<Vec<String>>,
    behavior: Behavior,
}

enum Behavior {
    Succeed,
    /// Fail commands whose line contains the marker, succeed otherwise.
    FailMatching(&'static str),
    /// Block until the shutdown signal fires, then report interrupted.
    WaitForShutdown,
    /// Panic on commands whose line contains the marker.
    PanicMatching(&'static str),
}

impl ScriptedRunner {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            completions: AtomicUsize::new(0),
            seen_prefixes: Mutex::new(Vec::new()),
            behavior,
        })
    }
}

#[async_trait]
impl SessionRunner for ScriptedRunner {
    async fn run_command(
        &self,
        spec: &CommandSpec,
        prefix: &str,
        mut shutdown: ShutdownSignal,
    ) -> SessionOutcome {
        self.seen_prefixes.lock().unwrap().push(prefix.to_string());

        let outcome = match &self.behavior {
            Behavior::Succeed => SessionOutcome::Completed,
            Behavior::FailMatching(marker) => {
                if spec.command_line.contains(marker) {
                    SessionOutcome::Failed(SessionError::CommandFailed {
                        exit_code: 1,
                        stderr: String::new(),
                    })
                } else {
                    SessionOutcome::Completed
                }
            }
            Behavior::WaitForShutdown => {
                shutdown.triggered().await;
                SessionOutcome::Interrupted
            }
            Behavior::PanicMatching(marker) => {
                if spec.command_line.contains(marker) {
                    panic!("scripted session panic");
                }
                SessionOutcome::Completed
            }
        };

        self.completions.fetch_add(1, Ordering::SeqCst);
        outcome
    }
}

fn commands(n: usize) -> Vec<CommandSpec> {
    (0..n)
        .map(|i| CommandSpec::new(format!("echo {i}"), Some(format!("out-{i}.log"))))
        .collect()
}

async fn run(runner: Arc<ScriptedRunner>, specs: &[CommandSpec], unique: bool) -> BatchReport {
    let (_trigger, signal) = shutdown::channel();
    exec::run_batch(runner, specs, unique, signal).await
}

#[tokio::test]
async fn empty_batch_returns_immediately() {
    let runner = ScriptedRunner::new(Behavior::Succeed);
    let report = run(Arc::clone(&runner), &[], false).await;

    assert!(report.is_empty());
    assert_eq!(runner.completions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn one_outcome_per_command() {
    for n in [1, 8] {
        let runner = ScriptedRunner::new(Behavior::Succeed);
        let specs = commands(n);
        let report = run(Arc::clone(&runner), &specs, false).await;

        assert_eq!(report.len(), n);
        assert_eq!(runner.completions.load(Ordering::SeqCst), n);
        assert_eq!(report.failure_count(), 0);
    }
}

#[tokio::test]
async fn unique_batch_shares_one_prefix() {
    let runner = ScriptedRunner::new(Behavior::Succeed);
    let specs = commands(5);
    run(Arc::clone(&runner), &specs, true).await;

    let prefixes = runner.seen_prefixes.lock().unwrap();
    assert_eq!(prefixes.len(), 5);
    let first = &prefixes[0];
    assert!(!first.is_empty());
    assert!(prefixes.iter().all(|p| p == first), "prefix differs across sessions");
    // Sortable, timezone-qualified wall-clock form.
    chrono::DateTime::parse_from_rfc3339(first).expect("prefix parses as RFC 3339");
}

#[tokio::test]
async fn non_unique_batch_has_empty_prefix() {
    let runner = ScriptedRunner::new(Behavior::Succeed);
    let specs = commands(3);
    run(Arc::clone(&runner), &specs, false).await;

    let prefixes = runner.seen_prefixes.lock().unwrap();
    assert!(prefixes.iter().all(|p| p.is_empty()));
}

#[tokio::test]
async fn one_failure_does_not_cancel_siblings() {
    let runner = ScriptedRunner::new(Behavior::FailMatching("bad"));
    let specs = vec![
        CommandSpec::new("echo ok", None),
        CommandSpec::new("bad command", None),
        CommandSpec::new("echo also-ok", None),
    ];
    let report = run(Arc::clone(&runner), &specs, false).await;

    assert_eq!(report.len(), 3);
    assert_eq!(report.failure_count(), 1);
    assert_eq!(runner.completions.load(Ordering::SeqCst), 3);
    assert!(matches!(report.results[0].outcome, SessionOutcome::Completed));
    assert!(matches!(report.results[1].outcome, SessionOutcome::Failed(_)));
    assert!(matches!(report.results[2].outcome, SessionOutcome::Completed));
}

#[tokio::test]
async fn interrupt_drains_every_session_without_deadlock() {
    let runner = ScriptedRunner::new(Behavior::WaitForShutdown);
    let specs = commands(4);
    let (trigger, signal) = shutdown::channel();

    let batch = tokio::spawn({
        let runner = Arc::clone(&runner);
        async move { exec::run_batch(runner, &specs, false, signal).await }
    });

    // Let the sessions start blocking on the signal, then fire it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.trigger();

    let report = tokio::time::timeout(Duration::from_secs(5), batch)
        .await
        .expect("coordinator must return after interrupt")
        .expect("batch task must not panic");

    assert_eq!(report.len(), 4);
    assert!(report.interrupted());
    assert_eq!(report.failure_count(), 0);
    assert!(
        report
            .results
            .iter()
            .all(|r| matches!(r.outcome, SessionOutcome::Interrupted))
    );
}

#[tokio::test]
async fn panicked_session_still_yields_an_outcome() {
    let runner = ScriptedRunner::new(Behavior::PanicMatching("boom"));
    let specs = vec![
        CommandSpec::new("echo ok", None),
        CommandSpec::new("boom", None),
    ];
    let report = run(runner, &specs, false).await;

    assert_eq!(report.len(), 2);
    assert_eq!(report.failure_count(), 1);
    assert!(matches!(
        report.results[1].outcome,
        SessionOutcome::Failed(SessionError::Aborted(_))
    ));
}
