//! HTTP transport to the correlator's REST surface.
//! - EngineTransport: narrow seam used by the client (faked in tests)
//! - UreqTransport: blocking `ureq` implementation with a long-poll agent

use std::fmt;
use std::io;
use std::time::Duration;

use tracing::debug;
use ureq::Agent;

use crate::config::{ClientSettings, EngineEndpoint};
use crate::error::TransportError;

const XML_CONTENT_TYPE: &str = "text/xml";

/// Bound on reaching the engine during a long poll, separate from the
/// wait for its answer.
const POLL_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

/// One request against a correlator resource path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCall<'a> {
    pub method: HttpMethod,
    pub path: &'a str,
    pub body: Option<&'a str>,
    /// Use the long-poll timeout instead of the regular one.
    pub long_poll: bool,
}

impl<'a> EngineCall<'a> {
    #[must_use]
    pub fn get(path: &'a str) -> Self {
        Self {
            method: HttpMethod::Get,
            path,
            body: None,
            long_poll: false,
        }
    }

    #[must_use]
    pub fn put(path: &'a str, body: &'a str) -> Self {
        Self {
            method: HttpMethod::Put,
            path,
            body: Some(body),
            long_poll: false,
        }
    }

    #[must_use]
    pub fn delete(path: &'a str) -> Self {
        Self {
            method: HttpMethod::Delete,
            path,
            body: None,
            long_poll: false,
        }
    }

    #[must_use]
    pub fn long_poll(mut self) -> Self {
        self.long_poll = true;
        self
    }
}

/// Sends one call and returns the raw response body.
pub trait EngineTransport: Send + Sync {
    fn send(&self, call: EngineCall<'_>) -> Result<String, TransportError>;
}

/// `ureq`-backed transport. Cloning shares the underlying connection pools.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    base_url: String,
    agent: Agent,
    poll_agent: Agent,
}

impl UreqTransport {
    #[must_use]
    pub fn new(endpoint: &EngineEndpoint, settings: ClientSettings) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(settings.request_timeout)
            .build()
            .into();
        // Per-phase timeouts only; a hung connect must not read as poll expiry.
        let poll_agent: Agent = Agent::config_builder()
            .timeout_resolve(Some(POLL_CONNECT_TIMEOUT))
            .timeout_connect(Some(POLL_CONNECT_TIMEOUT))
            .timeout_send_request(Some(POLL_CONNECT_TIMEOUT))
            .timeout_recv_response(Some(settings.poll_timeout))
            .timeout_recv_body(Some(settings.poll_timeout))
            .build()
            .into();
        Self {
            base_url: endpoint.base_url(),
            agent,
            poll_agent,
        }
    }
}

impl EngineTransport for UreqTransport {
    fn send(&self, call: EngineCall<'_>) -> Result<String, TransportError> {
        let url = format!("{}{}", self.base_url, call.path);
        let agent = if call.long_poll {
            &self.poll_agent
        } else {
            &self.agent
        };
        debug!(method = %call.method, %url, "correlator request");
        let response = match (call.method, call.body) {
            (HttpMethod::Get, _) => agent.get(&url).call(),
            (HttpMethod::Delete, _) => agent.delete(&url).call(),
            (HttpMethod::Put, body) => agent
                .put(&url)
                .header("Content-Type", XML_CONTENT_TYPE)
                .send(body.unwrap_or_default()),
        };
        let mut response = response.map_err(map_ureq_error)?;
        response
            .body_mut()
            .read_to_string()
            .map_err(map_ureq_error)
    }
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::StatusCode(code) => TransportError::Status { code },
        ureq::Error::Timeout(
            ureq::Timeout::Resolve | ureq::Timeout::Connect | ureq::Timeout::SendRequest,
        ) => TransportError::Connect(err.to_string()),
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::Io(io_err) => map_io_error(&io_err),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::Connect(err.to_string())
        }
        other => TransportError::Io(other.to_string()),
    }
}

fn map_io_error(err: &io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrNotAvailable => TransportError::Connect(err.to_string()),
        _ => TransportError::Io(err.to_string()),
    }
}
