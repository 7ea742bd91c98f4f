//! Launch and attach helpers.
//! - LaunchPlan::resolve: engine settings, working folder, workload
//! - DebugAdapter::start_engine: spawn, wait for REST, inject, pause
//! - DebugAdapter::attach_engine: connect to a running correlator

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use apama_correlator::{
    CorrelatorClient, EngineConfig, EngineEndpoint, EngineError, EngineLifecycle, LifecycleError,
    OutputLine, OutputSink, Workload,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::protocol::{AttachArguments, LaunchArguments};
use crate::reconciler::{Reconciler, SyncMode};
use crate::runtime::PortLease;

use super::listener::BreakpointListener;
use super::protocol_io::ProtocolWriter;
use super::util::output_category;
use super::watcher::{PauseWatcher, PauseWatcherConfig};
use super::{DebugAdapter, EngineSession};

/// Reason passed to `engine_management` when the session stops the correlator.
pub(super) const SHUTDOWN_REASON: &str = "Shutdown requested by apama-debug";
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub(super) enum LaunchError {
    #[error("no workspace folder is open")]
    NoFolder,
    #[error("no workspace folder was selected")]
    FolderNotSelected,
    #[error("port {0} is already used by another debug session")]
    PortInUse(u16),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("correlator exited during startup ({0})")]
    EngineDied(String),
    #[error("correlator did not accept requests within {0:?}")]
    StartupTimeout(Duration),
}

/// Everything a launch needs, decided before any process starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct LaunchPlan {
    pub config: EngineConfig,
    pub folder: PathBuf,
    pub workload: Workload,
    pub sync: SyncMode,
}

impl LaunchPlan {
    pub(super) fn resolve(
        defaults: &EngineConfig,
        args: LaunchArguments,
        pick_folder: impl FnOnce(&[String]) -> Option<String>,
    ) -> Result<Self, LaunchError> {
        let mut config = defaults.clone();
        if let Some(update) = args.correlator {
            config.merge(update);
        }
        let folder = match args.workspace_folder.or(args.cwd) {
            Some(folder) => folder,
            None => match args.workspace_folders.as_slice() {
                [] => return Err(LaunchError::NoFolder),
                [only] => only.clone(),
                several => pick_folder(several).ok_or(LaunchError::FolderNotSelected)?,
            },
        };
        let folder = PathBuf::from(folder);
        let workload = if args.injection_list.is_empty() {
            Workload::Project(folder.clone())
        } else {
            Workload::Files {
                cwd: folder.clone(),
                files: args.injection_list.iter().map(PathBuf::from).collect(),
            }
        };
        Ok(Self {
            config,
            folder,
            workload,
            sync: args.breakpoint_sync.unwrap_or_default(),
        })
    }
}

/// Engine settings for an attach request.
pub(super) fn attach_config(
    defaults: &EngineConfig,
    args: AttachArguments,
) -> (EngineConfig, SyncMode) {
    let mut config = defaults.clone();
    if let Some(update) = args.correlator {
        config.merge(update);
    }
    (config, args.breakpoint_sync.unwrap_or_default())
}

/// Forwards child process lines as DAP output events.
pub(super) fn output_sink(writer: ProtocolWriter) -> OutputSink {
    Arc::new(move |line: OutputLine| {
        writer.notify_output(line.text, output_category(line.stream));
    })
}

/// Retries `enableDebugging` until the REST surface answers.
fn wait_until_ready(
    client: &CorrelatorClient,
    lifecycle: &mut EngineLifecycle,
    timeout: Duration,
) -> Result<(), LaunchError> {
    let deadline = Instant::now() + timeout;
    loop {
        match client.enable_debugging() {
            Ok(()) => return Ok(()),
            Err(err) if err.is_connect() => {
                if let Some(exit) = lifecycle.poll_exit() {
                    return Err(LaunchError::EngineDied(format!("exit status {exit}")));
                }
                if Instant::now() >= deadline {
                    return Err(LaunchError::StartupTimeout(timeout));
                }
                thread::sleep(READY_POLL_INTERVAL);
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn bring_up(
    client: &CorrelatorClient,
    lifecycle: &mut EngineLifecycle,
    plan: &LaunchPlan,
) -> Result<(), LaunchError> {
    let pid = lifecycle.launch(&plan.config)?;
    info!(pid, endpoint = %lifecycle.endpoint(), "correlator started");
    wait_until_ready(client, lifecycle, plan.config.startup_timeout())?;
    lifecycle.inject(&plan.workload)?;
    if let Some(exit) = lifecycle.poll_exit() {
        return Err(LaunchError::EngineDied(format!("exit status {exit}")));
    }
    client.pause()?;
    Ok(())
}

impl DebugAdapter {
    /// Starts, readies, loads and pauses a correlator for `plan`.
    ///
    /// A partially started process is stopped before the error is returned.
    pub(super) fn start_engine(&mut self, plan: LaunchPlan) -> Result<(), LaunchError> {
        let endpoint = plan.config.endpoint();
        let lease = self
            .ports
            .lease(endpoint.port)
            .ok_or(LaunchError::PortInUse(endpoint.port))?;
        let client =
            CorrelatorClient::new(self.host.transport(&endpoint, plan.config.client_settings()));
        let mut lifecycle = EngineLifecycle::new(
            self.host.process_host(),
            self.host.toolchain(),
            endpoint.clone(),
            output_sink(self.writer.clone()),
        );
        info!(folder = %plan.folder.display(), %endpoint, "launching correlator");
        if let Err(err) = bring_up(&client, &mut lifecycle, &plan) {
            warn!(error = %err, "launch failed, cleaning up");
            if let Err(stop_err) = lifecycle.stop(SHUTDOWN_REASON, plan.config.shutdown_timeout()) {
                warn!(error = %stop_err, "cleanup after failed launch failed");
            }
            return Err(err);
        }

        self.engine = Some(self.engine_session(
            endpoint,
            client,
            Some(lifecycle),
            plan.sync,
            plan.config.shutdown_timeout(),
            lease,
        ));
        Ok(())
    }

    /// Connects to a correlator this adapter did not start.
    pub(super) fn attach_engine(
        &mut self,
        config: &EngineConfig,
        sync: SyncMode,
    ) -> Result<(), LaunchError> {
        let endpoint = config.endpoint();
        let lease = self
            .ports
            .lease(endpoint.port)
            .ok_or(LaunchError::PortInUse(endpoint.port))?;
        let client =
            CorrelatorClient::new(self.host.transport(&endpoint, config.client_settings()));
        info!(%endpoint, "attaching to correlator");
        client.enable_debugging()?;
        client.pause()?;
        self.engine = Some(self.engine_session(endpoint, client, None, sync, None, lease));
        Ok(())
    }

    fn engine_session(
        &self,
        endpoint: EngineEndpoint,
        client: CorrelatorClient,
        lifecycle: Option<EngineLifecycle>,
        sync: SyncMode,
        shutdown_patience: Option<Duration>,
        lease: PortLease,
    ) -> EngineSession {
        let reconciler = Reconciler::new(client.clone(), sync);
        let watcher = PauseWatcher::spawn(PauseWatcherConfig {
            client: client.clone(),
            endpoint: endpoint.clone(),
            writer: self.writer.clone(),
            state: self.state.clone(),
            stop_gate: self.stop_gate.clone(),
        });
        let listener = BreakpointListener::spawn(
            reconciler.clone(),
            self.changes_rx.clone(),
            self.writer.clone(),
        );
        EngineSession {
            endpoint,
            client,
            reconciler,
            lifecycle,
            debugging_enabled: true,
            shutdown_patience,
            watcher,
            listener,
            _lease: lease,
        }
    }
}
