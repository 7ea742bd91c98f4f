//! Engine-facing half of the Apama debugger.
//!
//! Talks to a correlator's `/correlator/debug` REST surface over HTTP with
//! XML bodies, and starts, feeds and stops correlator processes through the
//! Apama command-line tools.

pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod process;
pub mod toolchain;
pub mod transport;
pub mod types;
pub mod xml;

pub use client::{CancelToken, CorrelatorClient, ProgressCommand};
pub use config::{ClientSettings, EngineConfig, EngineConfigUpdate, EngineEndpoint};
pub use error::{EngineError, LifecycleError, ToolchainError, TransportError};
pub use lifecycle::{engine_args, EngineLifecycle, Workload};
pub use process::{
    ExitState, ManagedProcess, OutputLine, OutputSink, OutputStream, ProcessHost,
    SystemProcessHost, ToolOutput,
};
pub use toolchain::{ApamaTool, CommandLine, InstallToolchain, Toolchain};
pub use transport::{EngineCall, EngineTransport, HttpMethod, UreqTransport};
pub use types::{ContextStatus, EngineFrame, EngineVariable, PausedContext, RemoteBreakpoint, StackTrace};
