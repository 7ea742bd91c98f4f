//! In-process correlator stand-in served by `tiny_http`.

#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use apama_correlator::EngineEndpoint;
use tiny_http::{Response, Server};

/// A request as the mock engine saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub method: String,
    pub url: String,
    pub body: String,
}

/// What the mock does for one request.
pub enum Reply {
    Xml(String),
    Status(u16),
    /// Hold the connection open before answering.
    Delayed(Duration, String),
}

pub type Router = dyn Fn(&Seen) -> Reply + Send + Sync;

pub struct MockEngine {
    pub endpoint: EngineEndpoint,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl MockEngine {
    pub fn start(router: impl Fn(&Seen) -> Reply + Send + Sync + 'static) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let router: Arc<Router> = Arc::new(router);
        thread::spawn(move || {
            for mut request in server.incoming_requests() {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let entry = Seen {
                    method: request.method().to_string(),
                    url: request.url().to_string(),
                    body,
                };
                log.lock().unwrap().push(entry.clone());
                let router = Arc::clone(&router);
                thread::spawn(move || {
                    let response = match router(&entry) {
                        Reply::Xml(xml) => Response::from_string(xml),
                        Reply::Status(code) => Response::from_string("").with_status_code(code),
                        Reply::Delayed(delay, xml) => {
                            thread::sleep(delay);
                            Response::from_string(xml)
                        }
                    };
                    let _ = request.respond(response);
                });
            }
        });
        Self {
            endpoint: EngineEndpoint::new(addr.ip().to_string(), addr.port()),
            seen,
        }
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

pub fn envelope(inner: &str) -> String {
    format!("<map name=\"apama-response\">{inner}</map>")
}
