//! Periodic tick driver
//!
//! Re-evaluates a fixed node subset at a fixed interval. Each tick marks the
//! subset dirty and runs one pass, so edits made to the session between two
//! ticks are folded into the next pass instead of being evaluated on their
//! own.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::engine::{Engine, PassReport, TreeSession};
use crate::types::NodeId;

/// Handle to a running ticker
pub struct TickHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TickHandle {
    /// Stop ticking and wait for the task to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            log::warn!("Tick task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start ticking `nodes` of `session` every `interval`
///
/// Reports of every tick are streamed on the returned receiver. The ticker
/// stops on [`TickHandle::shutdown`] or once the receiver is dropped.
pub fn spawn_ticker(
    engine: Arc<Engine>,
    session: Arc<Mutex<TreeSession>>,
    nodes: Vec<NodeId>,
    interval: Duration,
) -> (TickHandle, mpsc::UnboundedReceiver<PassReport>) {
    let (reports_tx, reports_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

    log::info!(
        "Starting ticker for {} nodes every {}ms",
        nodes.len(),
        interval.as_millis()
    );

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = ticker.tick() => {
                    let report = {
                        let mut session = session.lock();
                        engine.tick(&mut session, &nodes)
                    };
                    if reports_tx.send(report).is_err() {
                        log::debug!("Tick receiver dropped; stopping ticker");
                        break;
                    }
                }
            }
        }
        log::info!("Ticker stopped");
    });

    (
        TickHandle {
            shutdown: shutdown_tx,
            task,
        },
        reports_rx,
    )
}

/// Start ticking at the engine's configured `tick_interval_ms`
pub fn spawn_configured_ticker(
    engine: Arc<Engine>,
    session: Arc<Mutex<TreeSession>>,
    nodes: Vec<NodeId>,
) -> (TickHandle, mpsc::UnboundedReceiver<PassReport>) {
    let interval = engine.config().tick_interval();
    spawn_ticker(engine, session, nodes, interval)
}
