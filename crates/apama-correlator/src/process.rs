//! Child-process host.
//! - ProcessHost: spawns the correlator and runs one-shot tools (faked in tests)
//! - ManagedProcess: handle to a long-running child
//! - SystemProcessHost: `std::process` implementation with line-forwarded output

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::toolchain::{ApamaTool, CommandLine};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One line written by a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub tool: ApamaTool,
    pub stream: OutputStream,
    pub text: String,
}

/// Receives child output as it is produced.
pub type OutputSink = Arc<dyn Fn(OutputLine) + Send + Sync>;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitState {
    pub code: Option<i32>,
    pub success: bool,
}

impl From<ExitStatus> for ExitState {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

impl fmt::Display for ExitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code}"),
            None => f.write_str("signal"),
        }
    }
}

/// Result of running a tool to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit: ExitState,
    pub stdout: String,
    pub stderr: String,
}

/// Handle to a spawned long-running process.
pub trait ManagedProcess: Send {
    fn id(&self) -> u32;
    /// Non-blocking exit check.
    fn try_wait(&mut self) -> io::Result<Option<ExitState>>;
    /// Waits for exit, giving up after `timeout` when one is set.
    fn wait_timeout(&mut self, timeout: Option<Duration>) -> io::Result<Option<ExitState>>;
    fn kill(&mut self) -> io::Result<()>;
}

pub trait ProcessHost: Send + Sync {
    /// Starts a long-running process whose output lines go to `sink`.
    fn spawn(
        &self,
        tool: ApamaTool,
        command: &CommandLine,
        sink: OutputSink,
    ) -> io::Result<Box<dyn ManagedProcess>>;

    /// Runs a tool to completion, forwarding output to `sink` and collecting it.
    fn run(&self, tool: ApamaTool, command: &CommandLine, sink: OutputSink)
        -> io::Result<ToolOutput>;
}

/// Spawns real operating-system processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessHost;

impl SystemProcessHost {
    fn command(command: &CommandLine) -> Command {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

impl ProcessHost for SystemProcessHost {
    fn spawn(
        &self,
        tool: ApamaTool,
        command: &CommandLine,
        sink: OutputSink,
    ) -> io::Result<Box<dyn ManagedProcess>> {
        debug!(%command, "spawning");
        let mut child = Self::command(command).spawn()?;
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tool, OutputStream::Stdout, Arc::clone(&sink));
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tool, OutputStream::Stderr, sink);
        }
        Ok(Box::new(SystemProcess { child }))
    }

    fn run(
        &self,
        tool: ApamaTool,
        command: &CommandLine,
        sink: OutputSink,
    ) -> io::Result<ToolOutput> {
        debug!(%command, "running");
        let mut child = Self::command(command).spawn()?;
        let stdout = child
            .stdout
            .take()
            .map(|out| forward_lines(out, tool, OutputStream::Stdout, Arc::clone(&sink)));
        let stderr = child
            .stderr
            .take()
            .map(|err| forward_lines(err, tool, OutputStream::Stderr, Arc::clone(&sink)));
        let status = child.wait()?;
        let collect = |handle: Option<thread::JoinHandle<String>>| {
            handle
                .and_then(|handle| handle.join().ok())
                .unwrap_or_default()
        };
        Ok(ToolOutput {
            exit: status.into(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }
}

/// Forwards each line to `sink` and returns the accumulated text on EOF.
fn forward_lines<R>(
    reader: R,
    tool: ApamaTool,
    stream: OutputStream,
    sink: OutputSink,
) -> thread::JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut collected = String::new();
        for line in BufReader::new(reader).lines() {
            let Ok(text) = line else {
                break;
            };
            collected.push_str(&text);
            collected.push('\n');
            sink(OutputLine { tool, stream, text });
        }
        collected
    })
}

struct SystemProcess {
    child: Child,
}

impl ManagedProcess for SystemProcess {
    fn id(&self) -> u32 {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitState>> {
        Ok(self.child.try_wait()?.map(ExitState::from))
    }

    fn wait_timeout(&mut self, timeout: Option<Duration>) -> io::Result<Option<ExitState>> {
        let Some(timeout) = timeout else {
            return Ok(Some(self.child.wait()?.into()));
        };
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status.into()));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Ok(()) => Ok(()),
            // Already exited.
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(err) => Err(err),
        }
    }
}
