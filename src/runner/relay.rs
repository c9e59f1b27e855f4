use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::page::{
    DialogType, EventJavascriptDialogOpening, HandleJavaScriptDialogParams, NavigateParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    AddBindingParams, EvaluateParams, EventBindingCalled, EventConsoleApiCalled,
    EventExceptionThrown, ExceptionDetails, RemoteObject,
};
use futures::{FutureExt, Stream, StreamExt};

use super::bridge::{self, AlertSignal, OutputLine};
use super::session::BrowserSession;
use crate::config::Config;
use crate::error::{Result, RunnerError};

/// Per-run options assembled by the CLI layer (flags already merged with
/// config precedence applied).
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Path to the HTML document that loads the test bundle.
    pub page: PathBuf,
    /// JavaScript expression evaluated once the page has loaded.
    pub entrypoint: String,
    /// Optional watchdog. `None` preserves the original wait-forever behavior.
    pub timeout: Option<Duration>,
    /// Browser executable override.
    pub browser_path: Option<String>,
    /// Run with a visible window.
    pub headed: bool,
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The bundle reported an exit code via the alert channel.
    Completed(i32),
    /// The target path could not be resolved or navigation failed.
    LoadFailed,
    /// An uncaught error surfaced from the page, or the exit-code alert
    /// carried an unparsable integer.
    PageError,
    /// The watchdog elapsed before any terminal signal.
    TimedOut,
    /// SIGINT / SIGTERM.
    Interrupted,
}

impl Outcome {
    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Completed(code) => code,
            Outcome::LoadFailed | Outcome::PageError => 1,
            Outcome::TimedOut => 124,
            Outcome::Interrupted => 130,
        }
    }
}

/// Load the page, wire the relays, and drive the run to a terminal state.
///
/// The browser session is closed on every path out of here, including
/// errors from the drive loop.
pub async fn run(config: &Config, opts: &RunnerOptions) -> Result<Outcome> {
    let url = match target_url(&opts.page) {
        Ok(url) => url,
        Err(e) => {
            tracing::debug!("Cannot resolve {}: {}", opts.page.display(), e);
            println!("Failed to load: {}", opts.page.display());
            return Ok(Outcome::LoadFailed);
        }
    };

    let session = BrowserSession::launch(config, opts.browser_path.as_deref(), opts.headed).await?;
    let outcome = drive(&session, &url, opts).await;
    if let Err(e) = session.close().await {
        tracing::warn!("Browser did not shut down cleanly: {}", e);
    }
    outcome
}

async fn drive(session: &BrowserSession, url: &str, opts: &RunnerOptions) -> Result<Outcome> {
    let page = session.new_page().await?;

    // Subscribe before navigating so nothing emitted during load is missed.
    let mut console = page.event_listener::<EventConsoleApiCalled>().await?;
    let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
    let mut dialogs = page.event_listener::<EventJavascriptDialogOpening>().await?;
    let mut output = page.event_listener::<EventBindingCalled>().await?;

    // The page streams output by calling this binding; closures cannot cross
    // the CDP boundary, so the channel is a plain string callback.
    page.execute(AddBindingParams::new(bridge::OUTPUT_BINDING))
        .await?;

    let nav = page.execute(NavigateParams::new(url)).await?;
    if let Some(reason) = &nav.error_text {
        tracing::debug!("Navigation to {} failed: {}", url, reason);
        println!("Failed to load: {}", opts.page.display());
        return Ok(Outcome::LoadFailed);
    }
    page.wait_for_navigation().await?;

    // Kick the bundle off. The evaluation must be polled from the event loop
    // below, not awaited here: alert() suspends in-page JS until the dialog
    // is answered, so the response may only arrive after dialogs are handled.
    let entry = EvaluateParams::builder()
        .expression(opts.entrypoint.as_str())
        .build()
        .map_err(RunnerError::Other)?;
    let entry_eval = page.execute(entry);
    tokio::pin!(entry_eval);
    let mut entry_done = false;

    let timeout = opts.timeout;
    let watchdog = async move {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(watchdog);

    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    // Relay branches come first: backlogged output is drained before a
    // terminal signal is honored, preserving emission order.
    loop {
        tokio::select! {
            biased;

            event = console.next() => match event {
                Some(event) => println!("{}", format_console_args(&event.args)),
                None => return Err(stream_closed()),
            },

            event = output.next() => match event {
                Some(event) => relay_output_event(&event),
                None => return Err(stream_closed()),
            },

            event = exceptions.next() => match event {
                Some(event) => {
                    flush_backlog(&mut console, &mut output);
                    eprintln!("{}", describe_exception(&event.exception_details));
                    return Ok(Outcome::PageError);
                }
                None => return Err(stream_closed()),
            },

            event = dialogs.next() => match event {
                Some(event) => {
                    // Always answer the dialog; the page blocks until we do.
                    page.execute(HandleJavaScriptDialogParams::new(true)).await?;
                    if event.r#type != DialogType::Alert {
                        tracing::debug!("Dismissed {:?} dialog: {}", event.r#type, event.message);
                        continue;
                    }
                    match bridge::parse_alert(&event.message) {
                        AlertSignal::Exit(code) => {
                            flush_backlog(&mut console, &mut output);
                            return Ok(Outcome::Completed(code));
                        }
                        AlertSignal::Malformed(raw) => {
                            flush_backlog(&mut console, &mut output);
                            eprintln!("Malformed exit-code alert: {}", raw);
                            return Ok(Outcome::PageError);
                        }
                        AlertSignal::Info(message) => println!("Alert: {}", message),
                    }
                }
                None => return Err(stream_closed()),
            },

            result = &mut entry_eval, if !entry_done => {
                entry_done = true;
                let evaluated = result?;
                // A synchronous throw from the entry point is an uncaught
                // page error.
                if let Some(details) = &evaluated.exception_details {
                    flush_backlog(&mut console, &mut output);
                    eprintln!("{}", describe_exception(details));
                    return Ok(Outcome::PageError);
                }
            }

            () = &mut watchdog => {
                if let Some(limit) = opts.timeout {
                    eprintln!(
                        "Timed out after {}s waiting for the page to signal completion",
                        limit.as_secs()
                    );
                }
                return Ok(Outcome::TimedOut);
            }

            () = &mut shutdown => {
                tracing::info!("Interrupted, closing browser");
                return Ok(Outcome::Interrupted);
            }
        }
    }
}

/// Build the `file://` URL for the target document.
fn target_url(path: &Path) -> std::io::Result<String> {
    let absolute = path.canonicalize()?;
    Ok(format!("file://{}", absolute.display()))
}

fn stream_closed() -> RunnerError {
    RunnerError::Other("Browser closed before the page signaled a result".to_string())
}

/// Print an output-binding payload, filtering heartbeats and expanding
/// embedded newline tokens.
fn relay_output_event(event: &EventBindingCalled) {
    if event.name != bridge::OUTPUT_BINDING {
        return;
    }
    match bridge::decode_output(&event.payload) {
        OutputLine::Heartbeat => {}
        OutputLine::Text(text) => println!("{}", text),
    }
}

/// Drain already-delivered relay events so a terminal signal does not drop
/// lines the page emitted first.
fn flush_backlog<C, O>(console: &mut C, output: &mut O)
where
    C: Stream<Item = Arc<EventConsoleApiCalled>> + Unpin,
    O: Stream<Item = Arc<EventBindingCalled>> + Unpin,
{
    while let Some(Some(event)) = console.next().now_or_never() {
        println!("{}", format_console_args(&event.args));
    }
    while let Some(Some(event)) = output.next().now_or_never() {
        relay_output_event(&event);
    }
}

fn format_console_args(args: &[RemoteObject]) -> String {
    args.iter()
        .map(render_remote_object)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render a CDP remote object the way the browser console would.
fn render_remote_object(object: &RemoteObject) -> String {
    if let Some(value) = &object.value {
        return match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
    }
    if let Some(description) = &object.description {
        return description.clone();
    }
    "undefined".to_string()
}

fn describe_exception(details: &ExceptionDetails) -> String {
    if let Some(remote) = &details.exception {
        if let Some(description) = &remote.description {
            return description.clone();
        }
        if let Some(value) = &remote.value {
            return match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
    }
    details.text.clone()
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => tracing::info!("Received SIGINT"),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_object(json: serde_json::Value) -> RemoteObject {
        serde_json::from_value(json).expect("valid RemoteObject")
    }

    fn exception(json: serde_json::Value) -> ExceptionDetails {
        serde_json::from_value(json).expect("valid ExceptionDetails")
    }

    #[test]
    fn string_args_are_relayed_verbatim() {
        let args = vec![remote_object(
            serde_json::json!({"type": "string", "value": "12 tests, 0 failures"}),
        )];
        assert_eq!(format_console_args(&args), "12 tests, 0 failures");
    }

    #[test]
    fn multiple_args_join_with_spaces() {
        let args = vec![
            remote_object(serde_json::json!({"type": "string", "value": "ran"})),
            remote_object(serde_json::json!({"type": "number", "value": 12})),
            remote_object(serde_json::json!({"type": "string", "value": "tests"})),
        ];
        assert_eq!(format_console_args(&args), "ran 12 tests");
    }

    #[test]
    fn objects_fall_back_to_description() {
        let object = remote_object(serde_json::json!({
            "type": "object",
            "className": "Error",
            "description": "Error: boom",
        }));
        assert_eq!(render_remote_object(&object), "Error: boom");
    }

    #[test]
    fn valueless_objects_render_as_undefined() {
        let object = remote_object(serde_json::json!({"type": "undefined"}));
        assert_eq!(render_remote_object(&object), "undefined");
    }

    #[test]
    fn exception_prefers_description_over_text() {
        let details = exception(serde_json::json!({
            "exceptionId": 1,
            "text": "Uncaught",
            "lineNumber": 1,
            "columnNumber": 1,
            "exception": {
                "type": "object",
                "className": "Error",
                "description": "Error: boom",
            },
        }));
        assert_eq!(describe_exception(&details), "Error: boom");
    }

    #[test]
    fn thrown_string_value_is_reported_as_is() {
        let details = exception(serde_json::json!({
            "exceptionId": 1,
            "text": "Uncaught",
            "lineNumber": 1,
            "columnNumber": 1,
            "exception": {"type": "string", "value": "boom"},
        }));
        assert_eq!(describe_exception(&details), "boom");
    }

    #[test]
    fn exception_without_remote_uses_text() {
        let details = exception(serde_json::json!({
            "exceptionId": 1,
            "text": "Uncaught SyntaxError",
            "lineNumber": 3,
            "columnNumber": 7,
        }));
        assert_eq!(describe_exception(&details), "Uncaught SyntaxError");
    }

    #[test]
    fn target_url_requires_an_existing_path() {
        assert!(target_url(Path::new("/no/such/page.html")).is_err());
    }

    #[test]
    fn target_url_is_absolute_file_scheme() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let url = target_url(file.path()).expect("existing file resolves");
        assert!(url.starts_with("file:///"), "got {}", url);
    }

    #[test]
    fn outcome_exit_codes() {
        assert_eq!(Outcome::Completed(0).exit_code(), 0);
        assert_eq!(Outcome::Completed(42).exit_code(), 42);
        assert_eq!(Outcome::LoadFailed.exit_code(), 1);
        assert_eq!(Outcome::PageError.exit_code(), 1);
        assert_eq!(Outcome::TimedOut.exit_code(), 124);
        assert_eq!(Outcome::Interrupted.exit_code(), 130);
    }
}
