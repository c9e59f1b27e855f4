//! Wire conventions shared with the in-page test bundle.
//!
//! Closures cannot cross the CDP sandbox boundary, so the bundle talks to the
//! runner over two narrow string channels: a streamed output-line binding and
//! a one-shot exit-code alert. The encodings here are kept byte-compatible
//! with existing bundles.

/// Name of the binding the page calls to stream output lines.
/// Exposed on the page's global object via `Runtime.addBinding`.
pub const OUTPUT_BINDING: &str = "__runner_emit__";

/// JavaScript expression evaluated once after the page has loaded, unless
/// overridden via `--entrypoint` or config.
pub const DEFAULT_ENTRYPOINT: &str = "window.__runner_main__()";

/// Token the bundle embeds for line breaks. Sent alone, it is a keepalive.
pub const NEWLINE_TOKEN: &str = "[NEWLINE]";

/// Prefix marking an alert payload as the bundle's terminal exit-code signal.
pub const EXIT_CODE_PREFIX: &str = "phantom-exit-code:";

/// A decoded output-line payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// Bare `[NEWLINE]` payload: no content, still alive. Prints nothing.
    Heartbeat,
    /// Payload text with embedded `[NEWLINE]` tokens expanded to newlines.
    Text(String),
}

pub fn decode_output(payload: &str) -> OutputLine {
    if payload == NEWLINE_TOKEN {
        return OutputLine::Heartbeat;
    }
    OutputLine::Text(payload.replace(NEWLINE_TOKEN, "\n"))
}

/// A classified alert payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertSignal {
    /// Terminal signal: forward this integer as the process exit code.
    Exit(i32),
    /// Exit-code prefix present but the remainder is not an integer.
    Malformed(String),
    /// Not a termination signal; relayed as `Alert: <message>`.
    Info(String),
}

/// Classify an alert payload. Parsing is start-anchored: the prefix must
/// open the message, a mid-string occurrence is informational.
pub fn parse_alert(message: &str) -> AlertSignal {
    match message.strip_prefix(EXIT_CODE_PREFIX) {
        Some(rest) => match rest.trim().parse::<i32>() {
            Ok(code) => AlertSignal::Exit(code),
            Err(_) => AlertSignal::Malformed(message.to_string()),
        },
        None => AlertSignal::Info(message.to_string()),
    }
}
