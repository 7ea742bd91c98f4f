//! Engine collaborators for the adapter.
//! - EngineHost: transport, process host, toolchain and folder prompt
//! - SystemEngineHost: real HTTP, real processes, `APAMA_HOME` tools
//! - PortRegistry: one session per engine port

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use apama_correlator::{
    ClientSettings, EngineEndpoint, EngineTransport, InstallToolchain, ProcessHost,
    SystemProcessHost, Toolchain, UreqTransport,
};
use parking_lot::Mutex;
use tracing::info;

/// Narrow interface the adapter uses to reach an engine.
pub trait EngineHost: Send + Sync {
    fn transport(
        &self,
        endpoint: &EngineEndpoint,
        settings: ClientSettings,
    ) -> Arc<dyn EngineTransport>;
    fn process_host(&self) -> Arc<dyn ProcessHost>;
    fn toolchain(&self) -> Arc<dyn Toolchain>;
    /// Chooses one of several open folders; `None` when no choice was made.
    fn pick_folder(&self, folders: &[String]) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct SystemEngineHost {
    toolchain: Arc<InstallToolchain>,
}

impl SystemEngineHost {
    #[must_use]
    pub fn new(apama_home: Option<PathBuf>) -> Self {
        Self {
            toolchain: Arc::new(InstallToolchain::new(apama_home)),
        }
    }
}

impl EngineHost for SystemEngineHost {
    fn transport(
        &self,
        endpoint: &EngineEndpoint,
        settings: ClientSettings,
    ) -> Arc<dyn EngineTransport> {
        Arc::new(UreqTransport::new(endpoint, settings))
    }

    fn process_host(&self) -> Arc<dyn ProcessHost> {
        Arc::new(SystemProcessHost)
    }

    fn toolchain(&self) -> Arc<dyn Toolchain> {
        Arc::clone(&self.toolchain) as Arc<dyn Toolchain>
    }

    /// No interactive prompt is available here; the first folder wins.
    fn pick_folder(&self, folders: &[String]) -> Option<String> {
        let first = folders.first()?;
        info!(folder = %first, count = folders.len(), "several folders open, using the first");
        Some(first.clone())
    }
}

/// Engine ports currently owned by a session of this adapter process.
#[derive(Debug, Clone, Default)]
pub struct PortRegistry {
    leased: Arc<Mutex<HashSet<u16>>>,
}

/// Holds a port until dropped.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    leased: Arc<Mutex<HashSet<u16>>>,
}

impl PortRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `port`, or returns `None` when another session holds it.
    #[must_use]
    pub fn lease(&self, port: u16) -> Option<PortLease> {
        if !self.leased.lock().insert(port) {
            return None;
        }
        Some(PortLease {
            port,
            leased: Arc::clone(&self.leased),
        })
    }

    #[must_use]
    pub fn is_leased(&self, port: u16) -> bool {
        self.leased.lock().contains(&port)
    }
}

impl PortLease {
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.leased.lock().remove(&self.port);
    }
}
