//! Worker execution context for the layout engine
//!
//! Each worker is a spawned task owning exactly one `LayoutEngine`; the host
//! talks to it only through channels, so no state is ever shared. Commands
//! are applied to completion one at a time. While a run is in flight the
//! loop drains every pending command, performs a single simulation step,
//! emits the step event, and yields back to the scheduler — so an update or
//! drag arriving mid-run takes effect before the next physics step, without
//! any explicit cancellation.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::LayoutEngine;
use crate::protocol::{LayoutRequest, StepEvent};

/// Handle to a spawned layout worker
///
/// Dropping the handle (or calling `shutdown`) closes the command channel,
/// which stops the worker task.
pub struct LayoutWorker {
    commands: mpsc::UnboundedSender<LayoutRequest>,
    events: mpsc::UnboundedReceiver<StepEvent>,
    handle: JoinHandle<()>,
}

impl LayoutWorker {
    /// Spawn a worker with a fresh engine on the current tokio runtime
    pub fn spawn() -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_loop(LayoutEngine::new(), command_rx, event_tx));
        Self {
            commands,
            events,
            handle,
        }
    }

    /// Send one envelope; returns false if the worker has stopped
    pub fn send(&self, request: LayoutRequest) -> bool {
        self.commands.send(request).is_ok()
    }

    /// Receive the next step event; `None` once the worker has stopped and
    /// drained
    pub async fn next_event(&mut self) -> Option<StepEvent> {
        self.events.recv().await
    }

    /// Close the command channel and wait for the task to finish
    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.handle.await;
    }
}

async fn run_loop(
    mut engine: LayoutEngine,
    mut commands: mpsc::UnboundedReceiver<LayoutRequest>,
    events: mpsc::UnboundedSender<StepEvent>,
) {
    debug!("layout worker started");
    loop {
        if engine.is_running() {
            // Live-update semantics: everything that arrived since the last
            // step is applied before the next one
            loop {
                match commands.try_recv() {
                    Ok(request) => engine.apply(request),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        debug!("command channel closed, worker stopping");
                        return;
                    }
                }
            }
            if let Some(event) = engine.step() {
                if events.send(event).is_err() {
                    debug!("event receiver dropped, worker stopping");
                    return;
                }
            }
            tokio::task::yield_now().await;
        } else {
            match commands.recv().await {
                Some(request) => engine.apply(request),
                None => {
                    debug!("command channel closed, worker stopping");
                    return;
                }
            }
        }
    }
}
