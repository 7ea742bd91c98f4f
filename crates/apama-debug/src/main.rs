use std::io::BufReader;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use apama_correlator::config::{DEFAULT_HOST, DEFAULT_PORT};
use apama_correlator::EngineConfig;
use apama_debug::{DebugAdapter, EngineHost, PortRegistry, SystemEngineHost};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "apama-debug",
    version,
    about = "Debug Adapter Protocol bridge for the Apama correlator",
    after_help = "Examples:\n  apama-debug                          # serve one client on stdio\n  apama-debug --server 4711            # accept clients over TCP\n  apama-debug --port 15904 --engine-arg=-v --engine-arg=debug"
)]
struct Cli {
    /// Correlator host used when a launch request does not name one.
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    /// Correlator port used when a launch request does not name one.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Apama installation holding the command-line tools.
    #[arg(long, env = "APAMA_HOME")]
    apama_home: Option<PathBuf>,
    /// Serve DAP clients on this TCP port instead of stdio.
    #[arg(long)]
    server: Option<u16>,
    /// Extra correlator argument (repeatable).
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,
}

impl Cli {
    fn engine_defaults(&self) -> EngineConfig {
        EngineConfig {
            host: self.host.clone(),
            port: self.port,
            args: self.engine_args.clone(),
            ..EngineConfig::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let defaults = cli.engine_defaults();
    let host: Arc<dyn EngineHost> = Arc::new(SystemEngineHost::new(cli.apama_home.clone()));
    let ports = PortRegistry::new();

    match cli.server {
        None => {
            info!("Starting apama-debug adapter on stdio");
            let mut adapter = DebugAdapter::new(host, ports, defaults);
            adapter.run_stdio().context("stdio session failed")?;
        }
        Some(port) => serve_tcp(port, &host, &ports, &defaults)?,
    }
    Ok(())
}

/// `RUST_LOG` directives when set and valid, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// One adapter per accepted connection; sessions share the port registry.
fn serve_tcp(
    port: u16,
    host: &Arc<dyn EngineHost>,
    ports: &PortRegistry,
    defaults: &EngineConfig,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
        .with_context(|| format!("failed to listen on port {port}"))?;
    info!(port, "Starting apama-debug adapter server");
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "failed to accept DAP client");
                continue;
            }
        };
        let adapter = DebugAdapter::new(Arc::clone(host), ports.clone(), defaults.clone());
        thread::spawn(move || {
            if let Err(err) = serve_client(adapter, stream) {
                warn!(error = %err, "DAP client session ended with an error");
            }
        });
    }
    Ok(())
}

fn serve_client(mut adapter: DebugAdapter, stream: TcpStream) -> anyhow::Result<()> {
    let peer = stream.peer_addr().ok();
    info!(?peer, "DAP client connected");
    let reader = BufReader::new(stream.try_clone().context("failed to clone client stream")?);
    adapter.run(reader, stream)?;
    info!(?peer, "DAP client disconnected");
    Ok(())
}
