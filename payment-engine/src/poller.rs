//! Status poller: active refresh for displayed requests
//!
//! While a request is on screen, its status is pulled from the ledger at a
//! fixed cadence in addition to whatever events arrive. Each poller is one
//! cancellable task: it stops itself once the request reaches a terminal
//! state, and stops on demand when the caller drops interest or the session
//! is torn down.

use crate::reconcile::ReconciliationEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Control handle for one polling task
pub struct PollerHandle {
    payment_id: String,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// The request this poller watches
    pub fn payment_id(&self) -> &str {
        &self.payment_id
    }

    /// Request the poller to stop; idempotent
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// A sender that stops this poller, for session-wide teardown
    pub fn stop_sender(&self) -> watch::Sender<bool> {
        self.stop.clone()
    }

    /// Whether the polling task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the task to exit
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Start polling one request at `every` until it turns terminal or is
/// stopped.
///
/// Transient refresh failures are logged and the cadence continues; an id
/// the ledger does not know ends the poller, since no later poll can
/// change that answer.
pub fn spawn_status_poller(
    engine: Arc<ReconciliationEngine>,
    payment_id: String,
    every: Duration,
) -> PollerHandle {
    let (stop, mut stopped) = watch::channel(false);
    let id = payment_id.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval fires immediately; the first status is wanted right away
        loop {
            tokio::select! {
                _ = stopped.changed() => break,
                _ = ticker.tick() => {
                    match engine.refresh(&id).await {
                        Ok(view) if view.status.is_terminal() => {
                            debug!(payment_id = %id, status = %view.status, "poller reached terminal state");
                            break;
                        }
                        Ok(_) => {}
                        Err(crate::Error::RequestNotFound(_)) => {
                            warn!(payment_id = %id, "polled request unknown to ledger");
                            break;
                        }
                        Err(e) => {
                            warn!(payment_id = %id, error = %e, "status poll failed");
                        }
                    }
                }
            }
        }
    });
    PollerHandle {
        payment_id,
        stop,
        task,
    }
}
