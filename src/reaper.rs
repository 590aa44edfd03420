//! Periodic background cleanup.
//!
//! A reaper owns a tokio task that calls [`Sweep::sweep`] on a fixed interval
//! until its [`ReaperHandle`] is stopped or dropped.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::oneshot,
    task::{JoinError, JoinHandle},
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info};

/// Something that accumulates stale entries and can purge them.
pub trait Sweep: Send + Sync + 'static {
    /// Name used when logging sweep results.
    fn name(&self) -> &'static str;

    /// Remove stale entries, returning how many were removed.
    fn sweep(&self) -> usize;
}

/// Handle to a running reaper task.
///
/// Dropping the handle also stops the task, but only [`ReaperHandle::stop`]
/// waits for it to finish.
#[must_use = "the reaper stops as soon as its handle is dropped"]
pub struct ReaperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the reaper to stop and wait for its task to exit.
    ///
    /// No sweep starts after the signal is received. An error is returned if
    /// the task panicked.
    pub async fn stop(mut self) -> Result<(), JoinError> {
        if let Some(stop) = self.stop.take() {
            // The task may already be gone; there is nothing to signal then.
            let _ = stop.send(());
        }

        (&mut self.task).await
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// Start sweeping `target` every `every`.
///
/// The first sweep runs one full interval after the call.
///
/// # Panics
///
/// Panics if called outside of a tokio runtime. A zero `every` makes the
/// task itself panic, which [`ReaperHandle::stop`] reports.
pub fn spawn<S: Sweep>(target: Arc<S>, every: Duration) -> ReaperHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick of an interval completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let removed = target.sweep();
                    if removed > 0 {
                        info!(target_name = target.name(), removed, "Swept stale entries.");
                    }
                }
            }
        }

        debug!(target_name = target.name(), "Reaper stopped.");
    });

    ReaperHandle {
        stop: Some(stop_tx),
        task,
    }
}
