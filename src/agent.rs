//! Agent core: turns bus requests into action runs and emits heartbeats.
//!
//! `run()` registers the dispatcher with the bus handler and spawns the
//! heartbeat loop, then returns. Requests are handled on the handler's task,
//! asynchronous actions on task-registry tasks, heartbeats on their own task.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::action::{Action, ActionFactory, Execution};
use crate::apply_spec::SpecStore;
use crate::config::Settings;
use crate::error::ActionError;
use crate::mbus::{Handler, Heartbeat, JobState, Request, RequestCallback, Response};
use crate::platform::{HostStats, StatsCollector};
use crate::task::{TaskService, TaskValue};
use crate::vitals::build_vitals;

/// `tokio::time::interval` rejects a zero period.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

pub struct Agent {
    settings: Arc<Settings>,
    handler: Arc<dyn Handler>,
    collector: Arc<dyn StatsCollector>,
    tasks: Arc<dyn TaskService>,
    actions: Arc<dyn ActionFactory>,
    specs: Arc<SpecStore>,
    heartbeat_interval: Duration,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
    pub fn new(
        settings: Arc<Settings>,
        handler: Arc<dyn Handler>,
        collector: Arc<dyn StatsCollector>,
        tasks: Arc<dyn TaskService>,
        actions: Arc<dyn ActionFactory>,
        specs: Arc<SpecStore>,
    ) -> Self {
        let heartbeat_interval = settings.heartbeat_interval();
        Self {
            settings,
            handler,
            collector,
            tasks,
            actions,
            specs,
            heartbeat_interval,
            heartbeat_task: Mutex::new(None),
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Register with the bus and start heartbeats. Does not block.
    pub fn run(&self) -> Result<()> {
        let dispatcher = Dispatcher {
            tasks: Arc::clone(&self.tasks),
            actions: Arc::clone(&self.actions),
        };
        self.handler
            .start(Arc::new(dispatcher))
            .context("Failed to start bus handler")?;

        let heartbeats = HeartbeatLoop {
            settings: Arc::clone(&self.settings),
            handler: Arc::clone(&self.handler),
            collector: Arc::clone(&self.collector),
            specs: Arc::clone(&self.specs),
            interval: self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
        };
        let handle = tokio::spawn(heartbeats.run());

        let previous = self
            .heartbeat_task
            .lock()
            .map_err(|_| anyhow::anyhow!("Heartbeat handle lock poisoned"))?
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }

        info!(
            interval_ms = self.heartbeat_interval.as_millis(),
            "Agent running"
        );
        Ok(())
    }

    /// Stop the bus handler and the heartbeat loop. In-flight tasks keep
    /// running, but their results are only reachable through the registry.
    pub fn stop(&self) {
        self.handler.stop();

        let handle = match self.heartbeat_task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
            debug!("Heartbeat loop stopped");
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The request callback registered with the bus.
struct Dispatcher {
    tasks: Arc<dyn TaskService>,
    actions: Arc<dyn ActionFactory>,
}

#[async_trait]
impl RequestCallback for Dispatcher {
    #[instrument(skip(self, req), fields(method = %req.method))]
    async fn handle(&self, req: Request) -> Response {
        let action = match self.actions.create(&req.method) {
            Ok(action) => action,
            Err(e) => {
                warn!(error = %e, "Rejecting request");
                return e.into();
            }
        };
        let payload = req.into_payload();

        match action.execution() {
            Execution::Synchronous => match run_contained(action, payload).await {
                Ok(value) => Response::Value(value),
                Err(e) => {
                    debug!(error = %e, "Action failed");
                    e.into()
                }
            },
            Execution::Asynchronous => {
                let started = self
                    .tasks
                    .start_task(Box::pin(async move { action.run(&payload).await }))
                    .await;
                // Report whatever state the task has reached by now
                let task = self
                    .tasks
                    .find_task(&started.id)
                    .await
                    .unwrap_or(started);
                debug!(task = %task.id, state = %task.state, "Dispatched task");
                Response::value(TaskValue::from(&task))
            }
        }
    }
}

/// Run an action to completion on its own task so a panic becomes an error.
async fn run_contained(action: Arc<dyn Action>, payload: Vec<u8>) -> Result<Value, ActionError> {
    tokio::spawn(async move { action.run(&payload).await })
        .await
        .unwrap_or_else(|e| Err(ActionError::execution(format!("action panicked: {e}"))))
}

struct HeartbeatLoop {
    settings: Arc<Settings>,
    handler: Arc<dyn Handler>,
    collector: Arc<dyn StatsCollector>,
    specs: Arc<SpecStore>,
    interval: Duration,
}

impl HeartbeatLoop {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // First tick completes immediately
            ticker.tick().await;
            let heartbeat = self.heartbeat().await;
            if let Err(e) = self.handler.send_heartbeat(heartbeat).await {
                warn!(error = %e, "Failed to send heartbeat");
            }
        }
    }

    async fn heartbeat(&self) -> Heartbeat {
        let collector = Arc::clone(&self.collector);
        let stats = tokio::task::spawn_blocking(move || collector.collect_stats())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Host stats collection failed");
                HostStats::default()
            });
        let spec = self.specs.current().await;

        Heartbeat {
            job: spec.job_name().to_string(),
            index: spec.index.unwrap_or_default(),
            job_state: JobState::Running,
            vitals: build_vitals(&stats, &self.settings),
        }
    }
}
