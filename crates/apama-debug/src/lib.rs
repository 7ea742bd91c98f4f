//! Debug Adapter Protocol (DAP) bridge for the Apama correlator.

mod adapter;
pub mod codec;
pub mod paths;
mod protocol;
pub mod reconciler;
mod runtime;

pub use adapter::{DebugAdapter, SessionState};
pub use protocol::{
    AttachArguments, Breakpoint, BreakpointsChangedArguments, Capabilities, ContinueArguments,
    ContinueResponseBody, DisconnectArguments, Event, ExceptionBreakpointsFilter,
    InitializeArguments, InitializeResponseBody, LaunchArguments, MessageType, OutputEventBody,
    PauseArguments, Request, Response, Scope, ScopesArguments, ScopesResponseBody,
    SetBreakpointsArguments, SetBreakpointsResponseBody, SetExceptionBreakpointsArguments, Source,
    SourceBreakpoint, StackFrame, StackTraceArguments, StackTraceResponseBody, StepArguments,
    StoppedEventBody, TerminatedEventBody, Thread, ThreadsResponseBody, Variable,
    VariablesArguments, VariablesResponseBody,
};
pub use reconciler::{BreakpointChange, SourceLine, SyncMode};
pub use runtime::{EngineHost, PortLease, PortRegistry, SystemEngineHost};
