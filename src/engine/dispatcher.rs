// src/engine/dispatcher.rs

//! Rule matching and single-flight admission.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::ActiveTasks;
use crate::exec::{Pipeline, PipelineOutcome};
use crate::watch::{FsEvent, Rule};

/// Matches events against the rules of one configuration generation and
/// launches their pipelines.
///
/// `dispatch` never waits for a pipeline: admission is a test-and-set on the
/// rule's flag, then the pipeline runs on its own Tokio task.
pub struct Dispatcher {
    rules: Vec<Arc<Rule>>,
    pipeline: Arc<Pipeline>,
    active: ActiveTasks,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("rules", &self.rules.len())
            .field("active", &self.active.get())
            .finish_non_exhaustive()
    }
}

/// Owns a rule's execution slot and one unit of the active-task counter.
/// Dropping it clears the rule's flag first, then decrements the counter.
struct FlightGuard {
    rule: Arc<Rule>,
    active: ActiveTasks,
}

impl FlightGuard {
    fn admit(rule: &Arc<Rule>, active: &ActiveTasks) -> Option<Self> {
        if !rule.try_begin() {
            return None;
        }
        active.increment();
        Some(Self {
            rule: Arc::clone(rule),
            active: active.clone(),
        })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.rule.finish();
        self.active.decrement();
    }
}

impl Dispatcher {
    pub fn new(rules: Vec<Arc<Rule>>, pipeline: Arc<Pipeline>, active: ActiveTasks) -> Self {
        Self {
            rules,
            pipeline,
            active,
        }
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    /// Offer `event` to every rule in configuration order.
    ///
    /// Returns the handles of the pipelines admitted for this event. Rules
    /// already in flight are skipped silently; the event is not queued for
    /// them. Virtual events bypass operation filters.
    pub fn dispatch(&self, event: &FsEvent) -> Vec<JoinHandle<PipelineOutcome>> {
        let is_virtual = event.is_virtual();
        let mut launched = Vec::new();

        for rule in &self.rules {
            if !rule.matches_event(&event.path) {
                continue;
            }
            if !is_virtual && !rule.matches_op(event.ops) {
                continue;
            }

            let Some(guard) = FlightGuard::admit(rule, &self.active) else {
                debug!(
                    rule = %rule.match_source(),
                    path = %event.path,
                    "rule already running; event dropped"
                );
                continue;
            };

            info!(path = %event.path, ops = %event.ops, rule = %rule.match_source(), "change detected");

            let pipeline = Arc::clone(&self.pipeline);
            let path = event.path.clone();
            launched.push(tokio::spawn(async move {
                let outcome = pipeline.run(&guard.rule, &path).await;
                drop(guard);
                outcome
            }));
        }

        launched
    }
}
