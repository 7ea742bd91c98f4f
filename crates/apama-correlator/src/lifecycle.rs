//! Correlator process lifecycle.
//! - launch: start the correlator with debug flags on the session port
//! - inject: deploy a project folder or inject individual files
//! - stop: administrative shutdown with a kill fallback

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{EngineConfig, EngineEndpoint};
use crate::error::LifecycleError;
use crate::process::{ExitState, ManagedProcess, OutputSink, ProcessHost, ToolOutput};
use crate::toolchain::{ApamaTool, Toolchain};

const DEBUG_FLAG: &str = "-g";
const STATUS_PERIOD_FLAG: &str = "--logQueueSizePeriod";
const KILL_GRACE: Duration = Duration::from_secs(5);

/// What to load into a freshly started correlator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workload {
    /// Deploy the whole project folder.
    Project(PathBuf),
    /// Inject the listed files, resolved against `cwd`.
    Files { cwd: PathBuf, files: Vec<PathBuf> },
}

/// Full correlator argument vector for `config`.
#[must_use]
pub fn engine_args(config: &EngineConfig) -> Vec<String> {
    let mut args = config.args.clone();
    args.push("-p".to_string());
    args.push(config.port.to_string());
    if !args.iter().any(|arg| arg == DEBUG_FLAG || arg == "--nooptimize") {
        args.push(DEBUG_FLAG.to_string());
    }
    args.push(STATUS_PERIOD_FLAG.to_string());
    args.push(config.status_period.to_string());
    args
}

/// Owns at most one correlator process for one endpoint.
pub struct EngineLifecycle {
    host: Arc<dyn ProcessHost>,
    toolchain: Arc<dyn Toolchain>,
    endpoint: EngineEndpoint,
    sink: OutputSink,
    process: Option<Box<dyn ManagedProcess>>,
}

impl std::fmt::Debug for EngineLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineLifecycle")
            .field("endpoint", &self.endpoint)
            .field("pid", &self.process.as_ref().map(|p| p.id()))
            .finish_non_exhaustive()
    }
}

impl EngineLifecycle {
    #[must_use]
    pub fn new(
        host: Arc<dyn ProcessHost>,
        toolchain: Arc<dyn Toolchain>,
        endpoint: EngineEndpoint,
        sink: OutputSink,
    ) -> Self {
        Self {
            host,
            toolchain,
            endpoint,
            sink,
            process: None,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &EngineEndpoint {
        &self.endpoint
    }

    /// Starts the correlator and returns its pid.
    pub fn launch(&mut self, config: &EngineConfig) -> Result<u32, LifecycleError> {
        if let Some(pid) = self.running_pid() {
            return Err(LifecycleError::AlreadyRunning(pid));
        }
        let command = self
            .toolchain
            .command(ApamaTool::Correlator)?
            .args(engine_args(config));
        info!(%command, endpoint = %self.endpoint, "starting correlator");
        let process = self
            .host
            .spawn(ApamaTool::Correlator, &command, Arc::clone(&self.sink))
            .map_err(|source| LifecycleError::Spawn {
                tool: ApamaTool::Correlator,
                source,
            })?;
        let pid = process.id();
        self.process = Some(process);
        Ok(pid)
    }

    #[must_use]
    pub fn has_process(&self) -> bool {
        self.process.is_some()
    }

    /// Exit state of the owned process if it has ended.
    pub fn poll_exit(&mut self) -> Option<ExitState> {
        let process = self.process.as_mut()?;
        match process.try_wait() {
            Ok(exit) => exit,
            Err(err) => {
                warn!(error = %err, "cannot query correlator process");
                None
            }
        }
    }

    /// Whether the owned process is still running.
    pub fn is_alive(&mut self) -> bool {
        self.process.is_some() && self.poll_exit().is_none()
    }

    fn running_pid(&mut self) -> Option<u32> {
        if self.is_alive() {
            self.process.as_ref().map(|p| p.id())
        } else {
            None
        }
    }

    /// Loads `workload` into the running correlator.
    pub fn inject(&self, workload: &Workload) -> Result<ToolOutput, LifecycleError> {
        let host = self.endpoint.host.clone();
        let port = self.endpoint.port.to_string();
        let (tool, command) = match workload {
            Workload::Project(folder) => {
                let command = self
                    .toolchain
                    .command(ApamaTool::Deploy)?
                    .args(["--inject".to_string(), host, port])
                    .arg(folder.to_string_lossy())
                    .current_dir(folder);
                (ApamaTool::Deploy, command)
            }
            Workload::Files { cwd, files } => {
                let command = self
                    .toolchain
                    .command(ApamaTool::Inject)?
                    .args(["-n".to_string(), host, "-p".to_string(), port])
                    .args(files.iter().map(|file| cwd.join(file).to_string_lossy().into_owned()))
                    .current_dir(cwd);
                (ApamaTool::Inject, command)
            }
        };
        info!(%command, "injecting workload");
        self.run_tool(tool, &command)
    }

    fn run_tool(
        &self,
        tool: ApamaTool,
        command: &crate::toolchain::CommandLine,
    ) -> Result<ToolOutput, LifecycleError> {
        let output = self
            .host
            .run(tool, command, Arc::clone(&self.sink))
            .map_err(|source| LifecycleError::Spawn { tool, source })?;
        if output.exit.success {
            Ok(output)
        } else {
            Err(LifecycleError::ToolFailed {
                tool,
                status: output.exit.to_string(),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Stops the owned correlator. Without a process this returns at once.
    ///
    /// Asks `engine_management` to shut down with `reason`; if that cannot be
    /// run or fails the process is killed. Waits up to `patience` for exit,
    /// then kills.
    pub fn stop(&mut self, reason: &str, patience: Option<Duration>) -> Result<(), LifecycleError> {
        let Some(mut process) = self.process.take() else {
            info!("no correlator process to stop");
            return Ok(());
        };
        if let Ok(Some(exit)) = process.try_wait() {
            info!(%exit, "correlator already exited");
            return Ok(());
        }

        info!(endpoint = %self.endpoint, "terminating correlator");
        if let Err(err) = self.request_shutdown(reason) {
            warn!(error = %err, "clean shutdown failed, killing correlator");
            process.kill()?;
        }

        if process.wait_timeout(patience)?.is_none() {
            warn!(?patience, "correlator did not exit in time, killing");
            process.kill()?;
            if process.wait_timeout(Some(KILL_GRACE))?.is_none() {
                warn!(pid = process.id(), "correlator still running after kill");
            }
        }
        info!("correlator has terminated");
        Ok(())
    }

    fn request_shutdown(&self, reason: &str) -> Result<ToolOutput, LifecycleError> {
        let command = self
            .toolchain
            .command(ApamaTool::Management)?
            .args([
                "-s".to_string(),
                reason.to_string(),
                "-p".to_string(),
                self.endpoint.port.to_string(),
                "--hostname".to_string(),
                self.endpoint.host.clone(),
            ]);
        self.run_tool(ApamaTool::Management, &command)
    }
}
