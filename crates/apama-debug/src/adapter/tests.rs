//! Adapter unit tests.
//! - stdio framing roundtrips
//! - request dispatch against a scripted correlator and fake processes
//! - background stop reporting and live breakpoint changes

use std::collections::{HashMap, VecDeque};
use std::io::{self, BufReader, Write};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use apama_correlator::{
    ApamaTool, CommandLine, EngineCall, EngineTransport, ExitState, HttpMethod, ManagedProcess,
    OutputLine, OutputSink, OutputStream, ProcessHost, Toolchain, ToolchainError, ToolOutput,
    TransportError,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::launch::{output_sink, SHUTDOWN_REASON};
use super::protocol_io::{read_message, write_message, ProtocolWriter};
use super::*;
use crate::protocol::{MessageType, Request};

const WAIT: &str = "/correlator/debug/progress/wait";
const LOCATION: &str = "/correlator/debug/breakpoint/location";

fn envelope(inner: &str) -> String {
    format!("<map name=\"apama-response\">{inner}</map>")
}

fn prop(name: &str, value: impl std::fmt::Display) -> String {
    format!("<prop name=\"{name}\">{value}</prop>")
}

fn running_context(id: u32, name: &str) -> String {
    format!(
        "<map name=\"contextprogress\">{}{}{}</map>",
        prop("contextid", id),
        prop("context", name),
        prop("paused", false)
    )
}

fn paused_context(id: u32, name: &str, reason: &str, instance: u32) -> String {
    format!(
        "<map name=\"contextprogress\">{}{}{}{}{}{}{}</map>",
        prop("contextid", id),
        prop("context", name),
        prop("paused", true),
        prop("reason", reason),
        prop("instance", instance),
        prop("monitor", "Sensor"),
        prop("line", 10)
    )
}

fn variable(name: &str, kind: &str, value: Option<&str>) -> String {
    let value = value.map(|value| prop("value", value)).unwrap_or_default();
    format!(
        "<map name=\"variable\">{}{}{value}</map>",
        prop("name", name),
        prop("type", kind)
    )
}

/// Correlator stand-in: a live breakpoint table, queued long-poll answers
/// and canned GET bodies by path.
#[derive(Default)]
struct FakeEngine {
    calls: Mutex<Vec<(HttpMethod, String)>>,
    breakpoints: Mutex<Vec<(String, String, u32)>>,
    next_id: AtomicU32,
    waits: Mutex<VecDeque<String>>,
    canned: Mutex<HashMap<String, String>>,
    refuse: AtomicBool,
}

impl FakeEngine {
    fn can(&self, path: &str, inner: String) {
        self.canned.lock().insert(path.to_string(), inner);
    }

    fn queue_wait(&self, context: String) {
        self.waits.lock().push_back(context);
    }

    fn called(&self, method: HttpMethod, path: &str) -> bool {
        self.calls
            .lock()
            .iter()
            .any(|(seen, seen_path)| *seen == method && seen_path == path)
    }

    fn breakpoint_lines(&self) -> Vec<(String, u32)> {
        self.breakpoints
            .lock()
            .iter()
            .map(|(_, path, line)| (path.clone(), *line))
            .collect()
    }

    fn body_prop<'a>(body: &'a str, name: &str) -> &'a str {
        let open = format!("<prop name=\"{name}\">");
        let start = body.find(&open).unwrap() + open.len();
        let end = body[start..].find("</prop>").unwrap() + start;
        &body[start..end]
    }
}

impl EngineTransport for FakeEngine {
    fn send(&self, call: EngineCall<'_>) -> Result<String, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        if call.path == WAIT {
            let next = self.waits.lock().pop_front();
            return match next {
                Some(context) => Ok(envelope(&context)),
                None => {
                    thread::sleep(Duration::from_millis(5));
                    Err(TransportError::Timeout)
                }
            };
        }
        self.calls.lock().push((call.method, call.path.to_string()));
        match call.method {
            HttpMethod::Get if call.path == "/correlator/debug/breakpoint" => {
                let items: String = self
                    .breakpoints
                    .lock()
                    .iter()
                    .map(|(id, path, line)| {
                        format!(
                            "<map name=\"filebreakpoint\">{}{}{}</map>",
                            prop("filename", path),
                            prop("line", line),
                            prop("id", id)
                        )
                    })
                    .collect();
                Ok(envelope(&format!("<list name=\"breakpoints\">{items}</list>")))
            }
            HttpMethod::Put if call.path == LOCATION => {
                let body = call.body.unwrap_or_default();
                let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
                self.breakpoints.lock().push((
                    id.clone(),
                    Self::body_prop(body, "filename").to_string(),
                    Self::body_prop(body, "line").parse().unwrap(),
                ));
                Ok(envelope(&format!("<list name=\"ids\">{}</list>", prop("id", id))))
            }
            HttpMethod::Delete if call.path.starts_with(LOCATION) => {
                let id = call.path.rsplit('/').next().unwrap_or_default();
                self.breakpoints.lock().retain(|(existing, _, _)| existing != id);
                Ok(envelope(""))
            }
            HttpMethod::Get => Ok(envelope(
                self.canned
                    .lock()
                    .get(call.path)
                    .map_or("", String::as_str),
            )),
            HttpMethod::Put | HttpMethod::Delete => Ok(envelope("")),
        }
    }
}

/// Records tool runs; the correlator "exits" once asked to shut down.
#[derive(Default)]
struct FakeProcesses {
    spawned: Mutex<Vec<CommandLine>>,
    ran: Mutex<Vec<(ApamaTool, CommandLine)>>,
    exited: Arc<AtomicBool>,
    dies_at_start: bool,
    dies_on_deploy: bool,
}

impl FakeProcesses {
    fn ran_tool(&self, tool: ApamaTool) -> Option<CommandLine> {
        self.ran
            .lock()
            .iter()
            .find(|(ran, _)| *ran == tool)
            .map(|(_, command)| command.clone())
    }
}

struct FakeProcess {
    exited: Arc<AtomicBool>,
}

impl ManagedProcess for FakeProcess {
    fn id(&self) -> u32 {
        4242
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitState>> {
        Ok(self.exited.load(Ordering::SeqCst).then_some(ExitState {
            code: Some(1),
            success: false,
        }))
    }

    fn wait_timeout(&mut self, _timeout: Option<Duration>) -> io::Result<Option<ExitState>> {
        self.try_wait()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.exited.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl ProcessHost for FakeProcesses {
    fn spawn(
        &self,
        _tool: ApamaTool,
        command: &CommandLine,
        _sink: OutputSink,
    ) -> io::Result<Box<dyn ManagedProcess>> {
        self.spawned.lock().push(command.clone());
        if self.dies_at_start {
            self.exited.store(true, Ordering::SeqCst);
        }
        Ok(Box::new(FakeProcess {
            exited: Arc::clone(&self.exited),
        }))
    }

    fn run(
        &self,
        tool: ApamaTool,
        command: &CommandLine,
        _sink: OutputSink,
    ) -> io::Result<ToolOutput> {
        self.ran.lock().push((tool, command.clone()));
        if tool == ApamaTool::Management || (tool == ApamaTool::Deploy && self.dies_on_deploy) {
            self.exited.store(true, Ordering::SeqCst);
        }
        Ok(ToolOutput {
            exit: ExitState {
                code: Some(0),
                success: true,
            },
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

struct BareToolchain;

impl Toolchain for BareToolchain {
    fn command(&self, tool: ApamaTool) -> Result<CommandLine, ToolchainError> {
        Ok(CommandLine::new(tool.executable_name()))
    }
}

struct TestHost {
    engine: Arc<FakeEngine>,
    processes: Arc<FakeProcesses>,
}

impl EngineHost for TestHost {
    fn transport(
        &self,
        _endpoint: &apama_correlator::EngineEndpoint,
        _settings: apama_correlator::ClientSettings,
    ) -> Arc<dyn EngineTransport> {
        Arc::clone(&self.engine) as Arc<dyn EngineTransport>
    }

    fn process_host(&self) -> Arc<dyn ProcessHost> {
        Arc::clone(&self.processes) as Arc<dyn ProcessHost>
    }

    fn toolchain(&self) -> Arc<dyn Toolchain> {
        Arc::new(BareToolchain)
    }

    fn pick_folder(&self, _folders: &[String]) -> Option<String> {
        None
    }
}

/// Output shared with background threads.
#[derive(Clone, Default)]
struct SharedOutput(Arc<Mutex<Vec<u8>>>);

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedOutput {
    fn messages(&self) -> Vec<Value> {
        let bytes = self.0.lock().clone();
        let mut reader = BufReader::new(&bytes[..]);
        let mut messages = Vec::new();
        while let Some(payload) = read_message(&mut reader).unwrap() {
            messages.push(serde_json::from_str(&payload).unwrap());
        }
        messages
    }

    fn events(&self, name: &str) -> Vec<Value> {
        self.messages()
            .into_iter()
            .filter(|message| message["type"] == "event" && message["event"] == name)
            .collect()
    }
}

struct Harness {
    adapter: DebugAdapter,
    engine: Arc<FakeEngine>,
    processes: Arc<FakeProcesses>,
    ports: PortRegistry,
    out: SharedOutput,
    seq: u32,
}

impl Harness {
    fn new() -> Self {
        Self::with_processes(FakeProcesses::default())
    }

    fn with_processes(processes: FakeProcesses) -> Self {
        let engine = Arc::new(FakeEngine::default());
        let processes = Arc::new(processes);
        let ports = PortRegistry::new();
        let host = TestHost {
            engine: Arc::clone(&engine),
            processes: Arc::clone(&processes),
        };
        let adapter = DebugAdapter::new(Arc::new(host), ports.clone(), EngineConfig::default());
        let out = SharedOutput::default();
        adapter.writer.set_output(Box::new(out.clone()));
        Self {
            adapter,
            engine,
            processes,
            ports,
            out,
            seq: 0,
        }
    }

    fn request(&mut self, command: &str, arguments: Value) -> DispatchOutcome {
        self.seq += 1;
        self.adapter.dispatch_request(Request {
            seq: self.seq,
            message_type: MessageType::Request,
            command: command.to_string(),
            arguments: Some(arguments),
        })
    }

    fn initialize(&mut self) {
        let outcome = self.request("initialize", json!({ "adapterID": "apama" }));
        assert!(succeeded(&outcome));
    }

    /// Initialized and launched against `/w`, waiting for configuration.
    fn launched() -> Self {
        let mut harness = Self::new();
        harness.initialize();
        let outcome = harness.request("launch", json!({ "workspaceFolder": "/w" }));
        assert!(succeeded(&outcome), "{:?}", outcome.responses);
        harness
    }
}

fn succeeded(outcome: &DispatchOutcome) -> bool {
    outcome.responses[0]["success"] == true
}

fn message(outcome: &DispatchOutcome) -> String {
    outcome.responses[0]["message"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

fn body(outcome: &DispatchOutcome) -> &Value {
    &outcome.responses[0]["body"]
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn stdio_roundtrip() {
    let payload = r#"{"seq":1,"type":"request","command":"initialize"}"#;
    let mut buffer = Vec::new();
    write_message(&mut buffer, payload).unwrap();

    let mut reader = BufReader::new(&buffer[..]);
    let read = read_message(&mut reader).unwrap().unwrap();
    assert_eq!(read, payload);
    assert!(read_message(&mut reader).unwrap().is_none());
}

#[test]
fn run_answers_framed_requests_until_disconnect() {
    let mut input = Vec::new();
    write_message(
        &mut input,
        r#"{"seq":1,"type":"request","command":"initialize","arguments":{}}"#,
    )
    .unwrap();
    write_message(&mut input, "not json").unwrap();
    write_message(
        &mut input,
        r#"{"seq":2,"type":"request","command":"disconnect","arguments":{}}"#,
    )
    .unwrap();
    let mut harness = Harness::new();
    let out = harness.out.clone();

    harness.adapter.run(BufReader::new(&input[..]), out.clone()).unwrap();

    let messages = out.messages();
    let responses: Vec<_> = messages
        .iter()
        .filter(|message| message["type"] == "response")
        .collect();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["command"], "initialize");
    assert_eq!(responses[0]["request_seq"], 1);
    assert_eq!(responses[1]["command"], "disconnect");
    assert_eq!(out.events("terminated").len(), 1);
    assert_eq!(harness.adapter.state(), SessionState::Terminated);
}

#[test]
fn initialize_advertises_the_uncaught_filter() {
    let mut harness = Harness::new();
    let outcome = harness.request("initialize", json!({ "linesStartAt1": true }));

    assert!(succeeded(&outcome));
    let capabilities = body(&outcome);
    assert_eq!(capabilities["supportsConfigurationDoneRequest"], true);
    assert_eq!(capabilities["supportsFunctionBreakpoints"], false);
    let filter = &capabilities["exceptionBreakpointFilters"][0];
    assert_eq!(filter["filter"], "uncaught");
    assert_eq!(filter["label"], "Uncaught Exceptions");
    assert_eq!(filter["default"], true);
    assert_eq!(harness.adapter.state(), SessionState::Initialized);
}

#[test]
fn requests_outside_their_state_are_rejected() {
    let mut harness = Harness::new();

    let outcome = harness.request("launch", json!({ "workspaceFolder": "/w" }));
    assert!(!succeeded(&outcome));
    assert_eq!(message(&outcome), "launch is not valid while the session is idle");

    harness.initialize();
    let outcome = harness.request("threads", json!({}));
    assert_eq!(
        message(&outcome),
        "threads is not valid while the session is initialized"
    );
    let outcome = harness.request("initialize", json!({}));
    assert!(!succeeded(&outcome));
    assert!(harness.processes.spawned.lock().is_empty());
}

#[test]
fn unknown_commands_are_not_supported() {
    let mut harness = Harness::new();
    let outcome = harness.request("evaluate", json!({ "expression": "x" }));
    assert!(!succeeded(&outcome));
    assert_eq!(message(&outcome), "unsupported command: evaluate");
}

#[test]
fn launch_starts_loads_and_pauses_the_correlator() {
    let mut harness = Harness::new();
    harness.initialize();

    let outcome = harness.request("launch", json!({ "workspaceFolder": "/w" }));

    assert!(succeeded(&outcome));
    assert_eq!(
        harness.adapter.state(),
        SessionState::WaitingForConfiguration
    );
    let spawned = harness.processes.spawned.lock().clone();
    assert_eq!(spawned.len(), 1);
    let args = &spawned[0].args;
    assert!(args.windows(2).any(|pair| pair == ["-p", "15903"]));
    assert!(args.iter().any(|arg| arg == "-g"));

    let deploy = harness.processes.ran_tool(ApamaTool::Deploy).unwrap();
    assert_eq!(deploy.args, vec!["--inject", "127.0.0.1", "15903", "/w"]);
    assert!(harness
        .engine
        .called(HttpMethod::Put, "/correlator/debug/state"));
    assert!(harness
        .engine
        .called(HttpMethod::Put, "/correlator/debug/progress/stop"));
    assert!(harness.ports.is_leased(15903));

    assert_eq!(outcome.events.len(), 2);
    assert_eq!(outcome.events[0]["event"], "output");
    assert_eq!(outcome.events[1]["event"], "initialized");
}

#[test]
fn launch_with_an_injection_list_injects_files() {
    let mut harness = Harness::new();
    harness.initialize();

    let outcome = harness.request(
        "launch",
        json!({
            "cwd": "/w",
            "injectionList": ["a.mon", "b.mon"],
            "correlator": { "port": 16000 }
        }),
    );

    assert!(succeeded(&outcome), "{:?}", outcome.responses);
    assert!(harness.processes.ran_tool(ApamaTool::Deploy).is_none());
    let inject = harness.processes.ran_tool(ApamaTool::Inject).unwrap();
    assert_eq!(
        inject.args,
        vec!["-n", "127.0.0.1", "-p", "16000", "/w/a.mon", "/w/b.mon"]
    );
    assert!(harness.ports.is_leased(16000));
}

#[test]
fn failed_launch_names_the_endpoint_and_cleans_up() {
    let mut harness = Harness::with_processes(FakeProcesses {
        dies_at_start: true,
        ..FakeProcesses::default()
    });
    harness.engine.refuse.store(true, Ordering::SeqCst);
    harness.initialize();

    let outcome = harness.request("launch", json!({ "workspaceFolder": "/w" }));

    assert!(!succeeded(&outcome));
    let text = message(&outcome);
    assert!(
        text.starts_with("Error starting correlator on 127.0.0.1:15903: "),
        "{text}"
    );
    assert!(text.contains("exited during startup"), "{text}");
    assert_eq!(outcome.events[0]["event"], "output");
    assert_eq!(harness.adapter.state(), SessionState::Terminated);
    assert!(!harness.ports.is_leased(15903));
    assert!(harness.processes.ran_tool(ApamaTool::Deploy).is_none());
}

#[test]
fn launch_that_never_answers_times_out() {
    let mut harness = Harness::new();
    harness.engine.refuse.store(true, Ordering::SeqCst);
    harness.initialize();

    let outcome = harness.request(
        "launch",
        json!({ "workspaceFolder": "/w", "correlator": { "startupTimeoutMs": 50 } }),
    );

    assert!(!succeeded(&outcome));
    let text = message(&outcome);
    assert!(
        text.starts_with(
            "Error starting correlator on 127.0.0.1:15903: \
             correlator did not accept requests within"
        ),
        "{text}"
    );
    assert_eq!(harness.adapter.state(), SessionState::Terminated);
    assert!(!harness.ports.is_leased(15903));
    let shutdown = harness.processes.ran_tool(ApamaTool::Management).unwrap();
    assert!(shutdown.args.iter().any(|arg| arg == SHUTDOWN_REASON));
    assert!(harness.processes.ran_tool(ApamaTool::Deploy).is_none());
}

#[test]
fn correlator_dying_after_deploy_fails_the_launch() {
    let mut harness = Harness::with_processes(FakeProcesses {
        dies_on_deploy: true,
        ..FakeProcesses::default()
    });
    harness.initialize();

    let outcome = harness.request("launch", json!({ "workspaceFolder": "/w" }));

    assert!(!succeeded(&outcome));
    let text = message(&outcome);
    assert!(text.contains("exited during startup"), "{text}");
    assert!(harness.processes.ran_tool(ApamaTool::Deploy).is_some());
    assert!(!harness
        .engine
        .called(HttpMethod::Put, "/correlator/debug/progress/stop"));
    assert!(harness.processes.ran_tool(ApamaTool::Management).is_none());
    assert_eq!(harness.adapter.state(), SessionState::Terminated);
    assert!(!harness.ports.is_leased(15903));
}

#[test]
fn launch_without_a_folder_starts_nothing() {
    let mut harness = Harness::new();
    harness.initialize();

    let outcome = harness.request("launch", json!({}));

    assert!(!succeeded(&outcome));
    assert_eq!(
        message(&outcome),
        "Error starting correlator on 127.0.0.1:15903: no workspace folder is open"
    );
    assert!(harness.processes.spawned.lock().is_empty());
}

#[test]
fn unpicked_folder_among_several_fails_the_launch() {
    let mut harness = Harness::new();
    harness.initialize();

    let outcome = harness.request("launch", json!({ "workspaceFolders": ["/a", "/b"] }));

    assert!(!succeeded(&outcome));
    assert!(message(&outcome).ends_with("no workspace folder was selected"));
}

#[test]
fn a_port_held_by_another_session_is_refused() {
    let mut harness = Harness::new();
    let _held = harness.ports.lease(15903).unwrap();
    harness.initialize();

    let outcome = harness.request("launch", json!({ "workspaceFolder": "/w" }));

    assert!(!succeeded(&outcome));
    assert!(message(&outcome).contains("port 15903 is already used"));
    assert!(harness.processes.spawned.lock().is_empty());
}

#[test]
fn set_breakpoints_confirms_each_line() {
    let mut harness = Harness::launched();

    let outcome = harness.request(
        "setBreakpoints",
        json!({
            "source": { "path": "/w/a.mon" },
            "breakpoints": [{ "line": 10 }, { "line": 20 }]
        }),
    );

    assert!(succeeded(&outcome));
    let breakpoints = body(&outcome)["breakpoints"].as_array().unwrap().clone();
    assert_eq!(breakpoints.len(), 2);
    let mut lines: Vec<u64> = breakpoints
        .iter()
        .map(|bp| {
            assert_eq!(bp["verified"], true);
            assert_eq!(bp["source"]["name"], "a.mon");
            bp["line"].as_u64().unwrap()
        })
        .collect();
    lines.sort_unstable();
    assert_eq!(lines, vec![10, 20]);
    let mut stored = harness.engine.breakpoint_lines();
    stored.sort();
    assert_eq!(
        stored,
        vec![("/w/a.mon".to_string(), 10), ("/w/a.mon".to_string(), 20)]
    );
}

#[test]
fn zero_based_clients_get_their_own_line_numbers_back() {
    let mut harness = Harness::new();
    harness.request("initialize", json!({ "linesStartAt1": false }));
    harness.request("launch", json!({ "workspaceFolder": "/w" }));

    let outcome = harness.request(
        "setBreakpoints",
        json!({ "source": { "path": "/w/a.mon" }, "lines": [9] }),
    );

    assert_eq!(body(&outcome)["breakpoints"][0]["line"], 9);
    assert_eq!(
        harness.engine.breakpoint_lines(),
        vec![("/w/a.mon".to_string(), 10)]
    );
}

#[test]
fn exception_filter_toggles_break_on_errors() {
    let mut harness = Harness::launched();
    let errors = "/correlator/debug/breakpoint/errors";

    let outcome = harness.request("setExceptionBreakpoints", json!({ "filters": ["uncaught"] }));
    assert!(succeeded(&outcome));
    assert!(harness.engine.called(HttpMethod::Put, errors));

    let outcome = harness.request("setExceptionBreakpoints", json!({ "filters": [] }));
    assert!(succeeded(&outcome));
    assert!(harness.engine.called(HttpMethod::Delete, errors));
}

#[test]
fn live_breakpoint_changes_reach_the_correlator() {
    let mut harness = Harness::launched();

    let outcome = harness.request(
        "apamaBreakpointsChanged",
        json!({ "added": [{ "path": "/w/a.mon", "line": 12 }] }),
    );
    assert!(succeeded(&outcome));
    assert!(wait_until(|| harness.engine.breakpoint_lines()
        == vec![("/w/a.mon".to_string(), 12)]));

    harness.request(
        "apamaBreakpointsChanged",
        json!({ "removed": [{ "path": "/w/a.mon", "line": 12 }] }),
    );
    assert!(wait_until(|| harness.engine.breakpoint_lines().is_empty()));
}

#[test]
fn threads_list_every_context() {
    let mut harness = Harness::launched();
    harness.engine.can(
        "/correlator/debug/progress",
        format!(
            "<list name=\"progress\">{}{}</list>",
            running_context(1, "main"),
            paused_context(3, "worker", "breakpoint", 5)
        ),
    );

    let outcome = harness.request("threads", json!({}));

    let threads = &body(&outcome)["threads"];
    assert_eq!(threads[0]["id"], 1);
    assert_eq!(threads[0]["name"], "main");
    assert_eq!(threads[1]["id"], 3);
    assert_eq!(threads[1]["name"], "worker");
}

#[test]
fn frames_and_scopes_carry_packed_references() {
    let mut harness = Harness::launched();
    let frame = |line: u32, action: &str| {
        format!(
            "<map name=\"stackframe\">{}{}{}</map>",
            prop("lineno", line),
            prop("action", action),
            prop("filename", "/w/a.mon")
        )
    };
    harness.engine.can(
        "/correlator/debug/progress/stack/id:3",
        format!(
            "<list name=\"stack\">{}{}{}{}</list>",
            prop("contextid", 3),
            frame(12, "inner"),
            frame(20, "outer"),
            frame(30, "onload")
        ),
    );

    let outcome = harness.request("stackTrace", json!({ "threadId": 3 }));
    let frames = &body(&outcome)["stackFrames"];
    assert_eq!(body(&outcome)["totalFrames"], 3);
    assert_eq!(frames[0]["id"], 3000);
    assert_eq!(frames[2]["id"], 3002);
    assert_eq!(frames[2]["name"], "onload");
    assert_eq!(frames[2]["line"], 30);
    assert_eq!(frames[2]["column"], 1);
    assert_eq!(frames[2]["source"]["name"], "a.mon");

    let outcome = harness.request(
        "stackTrace",
        json!({ "threadId": 3, "startFrame": 1, "levels": 1 }),
    );
    let frames = body(&outcome)["stackFrames"].as_array().unwrap().clone();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["id"], 3001);

    let outcome = harness.request("scopes", json!({ "frameId": 3002 }));
    let scopes = &body(&outcome)["scopes"];
    assert_eq!(scopes[0]["name"], "Local");
    assert_eq!(scopes[0]["variablesReference"], 30020);
    assert_eq!(scopes[1]["name"], "Monitor");
    assert_eq!(scopes[1]["variablesReference"], 30021);
    assert_eq!(scopes[1]["expensive"], false);
}

#[test]
fn variables_are_filtered_and_disambiguated() {
    let mut harness = Harness::launched();
    harness.engine.can(
        "/correlator/debug/progress",
        format!(
            "<list name=\"progress\">{}</list>",
            paused_context(3, "main", "breakpoint", 5)
        ),
    );
    harness.engine.can(
        "/correlator/debug/progress/locals/id:3;2",
        format!(
            "<list name=\"locals\">{}{}{}</list>",
            variable("x", "integer", Some("1")),
            variable("x", "integer", Some("2")),
            variable("y", "string", Some("&lt;uninitialized&gt;"))
        ),
    );
    harness.engine.can(
        "/correlator/contexts/id:3/5",
        format!(
            "<list name=\"mthread\">{}</list>",
            variable("count", "integer", None)
        ),
    );
    harness
        .engine
        .can("/correlator/contexts/id:3/5/count", prop("value", 7));

    let outcome = harness.request("variables", json!({ "variablesReference": 30020 }));
    let names: Vec<_> = body(&outcome)["variables"]
        .as_array()
        .unwrap()
        .iter()
        .map(|var| var["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["x", "x#2"]);

    let outcome = harness.request("variables", json!({ "variablesReference": 30021 }));
    let monitor = &body(&outcome)["variables"][0];
    assert_eq!(monitor["name"], "count");
    assert_eq!(monitor["value"], "7");
    assert_eq!(monitor["type"], "integer");
    assert_eq!(monitor["variablesReference"], 0);
}

#[test]
fn variables_of_a_running_context_are_refused() {
    let mut harness = Harness::launched();
    harness.engine.can(
        "/correlator/debug/progress",
        format!("<list name=\"progress\">{}</list>", running_context(3, "main")),
    );

    let outcome = harness.request("variables", json!({ "variablesReference": 30020 }));
    assert!(!succeeded(&outcome));
    assert_eq!(message(&outcome), "context 3 is not paused");

    let outcome = harness.request("variables", json!({ "variablesReference": 90020 }));
    assert_eq!(message(&outcome), "unknown context 9");

    let outcome = harness.request("variables", json!({ "variablesReference": 30025 }));
    assert!(!succeeded(&outcome));
}

#[test]
fn running_wait_result_reports_no_stop() {
    let mut harness = Harness::launched();
    harness.engine.queue_wait(running_context(1, "main"));

    let outcome = harness.request("configurationDone", json!({}));
    assert!(succeeded(&outcome));
    assert!(harness
        .engine
        .called(HttpMethod::Put, "/correlator/debug/progress/run"));
    drop(outcome);

    assert!(wait_until(|| harness.engine.waits.lock().is_empty()));
    thread::sleep(Duration::from_millis(50));
    assert!(harness.out.events("stopped").is_empty());
    assert_eq!(harness.adapter.state(), SessionState::Running);
}

#[test]
fn stop_is_reported_after_the_triggering_response() {
    let mut harness = Harness::launched();
    harness
        .engine
        .queue_wait(paused_context(3, "main", "breakpoint", 5));

    let outcome = harness.request("configurationDone", json!({}));
    assert!(outcome.stop_gate.is_some());
    assert!(wait_until(|| harness.engine.waits.lock().is_empty()));
    thread::sleep(Duration::from_millis(50));
    assert!(harness.out.events("stopped").is_empty());

    drop(outcome);
    assert!(wait_until(|| !harness.out.events("stopped").is_empty()));
    let stopped = harness.out.events("stopped").remove(0);
    assert_eq!(stopped["body"]["reason"], "breakpoint");
    assert_eq!(stopped["body"]["threadId"], 3);
    assert_eq!(stopped["body"]["allThreadsStopped"], true);
    assert!(wait_until(|| harness.adapter.state() == SessionState::Paused));
}

#[test]
fn run_control_maps_to_progress_commands() {
    let mut harness = Harness::launched();
    drop(harness.request("configurationDone", json!({})));

    let outcome = harness.request("continue", json!({ "threadId": 3 }));
    assert_eq!(body(&outcome)["allThreadsContinued"], true);
    drop(outcome);
    for (command, resource) in [("next", "stepover"), ("stepIn", "step"), ("stepOut", "stepout")] {
        let outcome = harness.request(command, json!({ "threadId": 3 }));
        assert!(succeeded(&outcome), "{command}");
        drop(outcome);
        assert!(harness
            .engine
            .called(HttpMethod::Put, &format!("/correlator/debug/progress/{resource}")));
    }

    let outcome = harness.request("pause", json!({ "threadId": 3 }));
    assert!(succeeded(&outcome));
    assert_eq!(outcome.events[0]["event"], "output");
}

#[test]
fn engine_loss_ends_the_session() {
    let mut harness = Harness::launched();
    drop(harness.request("configurationDone", json!({})));

    harness.engine.refuse.store(true, Ordering::SeqCst);

    assert!(wait_until(|| !harness.out.events("terminated").is_empty()));
    let lost = harness
        .out
        .events("output")
        .into_iter()
        .any(|event| {
            event["body"]["output"]
                .as_str()
                .is_some_and(|text| text.contains("lost connection to correlator on 127.0.0.1:15903"))
        });
    assert!(lost);
}

#[test]
fn disconnect_without_a_process_runs_no_tool() {
    let mut harness = Harness::new();
    harness.initialize();

    let outcome = harness.request("disconnect", json!({}));

    assert!(succeeded(&outcome));
    assert!(outcome.should_exit);
    assert_eq!(outcome.events[1]["event"], "terminated");
    assert!(harness.processes.ran.lock().is_empty());
    assert_eq!(harness.adapter.state(), SessionState::Terminated);
}

#[test]
fn disconnect_after_attach_leaves_the_correlator_running() {
    let mut harness = Harness::new();
    harness.initialize();
    let outcome = harness.request("attach", json!({ "correlator": { "port": 16001 } }));
    assert!(succeeded(&outcome), "{:?}", outcome.responses);
    assert!(harness.processes.spawned.lock().is_empty());

    let outcome = harness.request("disconnect", json!({}));

    assert!(succeeded(&outcome));
    assert!(harness.processes.ran.lock().is_empty());
    assert!(harness
        .engine
        .called(HttpMethod::Put, "/correlator/debug/progress/run"));
    assert!(harness
        .engine
        .called(HttpMethod::Delete, "/correlator/debug/state"));
    assert!(!harness.ports.is_leased(16001));
}

#[test]
fn failed_attach_names_the_endpoint() {
    let mut harness = Harness::new();
    harness.engine.refuse.store(true, Ordering::SeqCst);
    harness.initialize();

    let outcome = harness.request("attach", json!({ "correlator": { "host": "box", "port": 16002 } }));

    assert!(message(&outcome).starts_with("Error attaching to correlator on box:16002: "));
    assert_eq!(harness.adapter.state(), SessionState::Terminated);
}

#[test]
fn disconnect_after_launch_shuts_the_correlator_down() {
    let mut harness = Harness::launched();

    let outcome = harness.request("disconnect", json!({ "restart": false }));

    assert!(succeeded(&outcome), "{:?}", outcome.responses);
    let shutdown = harness.processes.ran_tool(ApamaTool::Management).unwrap();
    assert_eq!(
        shutdown.args,
        vec![
            "-s",
            SHUTDOWN_REASON,
            "-p",
            "15903",
            "--hostname",
            "127.0.0.1"
        ]
    );
    assert_eq!(outcome.events[1]["body"]["restart"], false);
    assert!(!harness.ports.is_leased(15903));
}

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }
}

#[test]
fn notifications_to_a_departed_client_are_dropped() {
    let writer = ProtocolWriter::new(Box::new(BrokenPipe));
    assert!(writer.send_output("hello", "console").is_err());

    let sink = output_sink(writer.clone());
    sink(OutputLine {
        tool: ApamaTool::Correlator,
        stream: OutputStream::Stderr,
        text: "correlator output".to_string(),
    });
    writer.notify_event("terminated", Some(json!({})));
    writer.notify_output("still here", "console");
}
