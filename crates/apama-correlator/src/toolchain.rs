//! Apama command-line tool resolution.
//! - ApamaTool: the executables the debugger drives
//! - Toolchain: resolves a tool to a command line (faked in tests)
//! - InstallToolchain: `$APAMA_HOME/bin` lookup with a PATH fallback

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ToolchainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApamaTool {
    /// The correlator itself.
    Correlator,
    /// `engine_deploy`, which injects a whole project folder.
    Deploy,
    /// `engine_inject`, which injects individual files.
    Inject,
    /// `engine_management`, used for administrative shutdown.
    Management,
}

impl ApamaTool {
    #[must_use]
    pub fn executable_name(self) -> &'static str {
        match self {
            Self::Correlator => "correlator",
            Self::Deploy => "engine_deploy",
            Self::Inject => "engine_inject",
            Self::Management => "engine_management",
        }
    }
}

impl fmt::Display for ApamaTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executable_name())
    }
}

/// A resolved program plus the arguments to run it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandLine {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Locates Apama executables.
pub trait Toolchain: Send + Sync {
    fn command(&self, tool: ApamaTool) -> Result<CommandLine, ToolchainError>;
}

/// Resolves tools from an installation directory, or from `PATH` when none is configured.
#[derive(Debug, Clone, Default)]
pub struct InstallToolchain {
    apama_home: Option<PathBuf>,
}

impl InstallToolchain {
    #[must_use]
    pub fn new(apama_home: Option<PathBuf>) -> Self {
        Self { apama_home }
    }

    #[must_use]
    pub fn apama_home(&self) -> Option<&Path> {
        self.apama_home.as_deref()
    }

    fn candidate(&self, tool: ApamaTool) -> PathBuf {
        let name = if cfg!(windows) {
            format!("{}.exe", tool.executable_name())
        } else {
            tool.executable_name().to_string()
        };
        match &self.apama_home {
            Some(home) => home.join("bin").join(name),
            None => PathBuf::from(name),
        }
    }
}

impl Toolchain for InstallToolchain {
    fn command(&self, tool: ApamaTool) -> Result<CommandLine, ToolchainError> {
        let program = self.candidate(tool);
        if let Some(home) = &self.apama_home {
            if !home.is_dir() {
                return Err(ToolchainError::Unavailable {
                    tool,
                    reason: format!("APAMA_HOME '{}' is not a directory", home.display()),
                });
            }
            if !program.is_file() {
                return Err(ToolchainError::Unavailable {
                    tool,
                    reason: format!("'{}' does not exist", program.display()),
                });
            }
        }
        Ok(CommandLine::new(program))
    }
}
