//! Live breakpoint change consumer.
//!
//! Notifications are applied one at a time in arrival order, each under the
//! reconciler's mirror lock.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, warn};

use crate::reconciler::{BreakpointChange, Reconciler};

use super::protocol_io::ProtocolWriter;

pub(super) struct BreakpointListener {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl BreakpointListener {
    pub(super) fn spawn(
        reconciler: Reconciler,
        changes: Receiver<BreakpointChange>,
        writer: ProtocolWriter,
    ) -> Self {
        let (shutdown, shutdown_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || loop {
            select! {
                recv(changes) -> change => {
                    let Ok(change) = change else { break };
                    debug!(added = change.added.len(), removed = change.removed.len(), "breakpoints changed");
                    if let Err(err) = reconciler.apply(&change) {
                        warn!(error = %err, "breakpoint change not fully applied");
                        writer.notify_output(
                            format!("[apama-debug] breakpoint update failed: {err}"),
                            "console",
                        );
                    }
                }
                recv(shutdown_rx) -> _ => break,
            }
        });
        Self { shutdown, handle }
    }

    /// Stops consuming; a change being applied is finished first.
    pub(super) fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.join();
    }
}
