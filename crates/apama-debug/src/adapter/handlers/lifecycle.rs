//! Adapter lifecycle handlers.
//! - handle_disconnect: tear down the engine side and end the session

use serde_json::Value;
use tracing::warn;

use crate::protocol::{DisconnectArguments, Request, TerminatedEventBody};

use super::super::{DebugAdapter, DispatchOutcome, SessionState};

impl DebugAdapter {
    pub(in crate::adapter) fn handle_disconnect(
        &mut self,
        request: Request<Value>,
    ) -> DispatchOutcome {
        let args = request
            .arguments
            .clone()
            .and_then(|value| serde_json::from_value::<DisconnectArguments>(value).ok());

        self.state.set(SessionState::Terminating);
        let stopped = self.end_session();
        self.state.set(SessionState::Terminated);

        let terminated_event = self.event(
            "terminated",
            Some(TerminatedEventBody {
                restart: args.as_ref().and_then(|value| value.restart),
            }),
        );
        let response = match &stopped {
            Ok(()) => self.ok_response::<Value>(&request, None),
            Err(message) => {
                warn!(%message, "disconnect did not stop the correlator cleanly");
                self.error_response(&request, message)
            }
        };

        DispatchOutcome {
            responses: vec![response],
            should_exit: true,
            events: vec![
                self.debug_output_message("[apama-debug] disconnect"),
                terminated_event,
            ],
            stop_gate: None,
        }
    }
}
