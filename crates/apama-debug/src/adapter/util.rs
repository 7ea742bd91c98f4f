//! Small adapter utilities.
//! - env_flag: parse boolean env vars
//! - output_category: DAP output category for child process streams

use apama_correlator::OutputStream;

pub(super) const VERBOSE_ENV: &str = "APAMA_DEBUG_DAP_VERBOSE";
pub(super) const PROTOCOL_LOG_ENV: &str = "APAMA_DEBUG_DAP_LOG";

pub(super) fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(raw) => parse_flag(&raw),
        Err(_) => false,
    }
}

fn parse_flag(raw: &str) -> bool {
    let value = raw.trim().to_ascii_lowercase();
    matches!(value.as_str(), "1" | "true" | "yes" | "on")
}

pub(super) fn output_category(stream: OutputStream) -> &'static str {
    match stream {
        OutputStream::Stdout => "stdout",
        OutputStream::Stderr => "stderr",
    }
}
