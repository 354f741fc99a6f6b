use super::Supervisor;
use crate::core::{ProvisionerError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, Level, event, info_span};

/// Cheap handle for requesting an early tick.
#[derive(Clone, Default)]
pub struct SchedulerHandle {
    wake: Arc<Notify>,
}

impl SchedulerHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the scheduler to run all supervisors as soon as possible.
    /// Requests made while a tick is running coalesce into one more tick.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }
}

/// Runs a set of supervisors on a fixed interval in a background task.
pub struct Scheduler {
    handle: SchedulerHandle,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns the loop. The first tick runs immediately.
    pub fn start(
        supervisors: Vec<Arc<dyn Supervisor>>,
        period: Duration,
        handle: SchedulerHandle,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let wake = Arc::clone(&handle.wake);

        let join_handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        break;
                    }
                    _ = ticker.tick() => {
                        run_all(&supervisors).await;
                    }
                    _ = wake.notified() => {
                        run_all(&supervisors).await;
                    }
                }
            }
            event!(Level::INFO, "scheduler stopped");
        });

        Self {
            handle,
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Signals the loop to stop and waits for the running tick to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| ProvisionerError::Internal(format!("scheduler join: {err}")))?;
        }
        Ok(())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// One tick: every supervisor in order. A failing supervisor does not stop
/// the others.
pub async fn run_all(supervisors: &[Arc<dyn Supervisor>]) {
    for supervisor in supervisors {
        let span = info_span!("supervisor", name = supervisor.name());
        if let Err(err) = supervisor.do_work().instrument(span).await {
            event!(
                Level::ERROR,
                supervisor = supervisor.name(),
                error = %err,
                "supervisor tick failed"
            );
        }
    }
}
