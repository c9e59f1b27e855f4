use std::path::PathBuf;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{Result, RunnerError};

/// Executable names probed on PATH when no explicit path is configured.
const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "brave-browser",
    "microsoft-edge",
];

/// Exclusively owned browser instance for the duration of a run.
///
/// Owns the browser child process, the CDP handler task driving its I/O, and
/// an ephemeral profile directory. [`BrowserSession::close`] must be called
/// on every exit path; the temp profile is removed when the session drops.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    // Held so the profile directory outlives the browser process.
    _user_data_dir: tempfile::TempDir,
}

impl BrowserSession {
    /// Launch a browser according to `config`, with optional CLI overrides.
    pub async fn launch(
        config: &Config,
        executable_override: Option<&str>,
        headed: bool,
    ) -> Result<Self> {
        let user_data_dir = tempfile::Builder::new()
            .prefix("pagerunner-profile-")
            .tempdir()?;

        let mut builder = BrowserConfig::builder().user_data_dir(user_data_dir.path());
        if let Some(executable) = resolve_executable(config, executable_override)? {
            tracing::debug!("Using browser executable {}", executable.display());
            builder = builder.chrome_executable(executable);
        }
        if headed || !config.browser.headless {
            builder = builder.with_head();
        }
        if config.browser.no_sandbox {
            builder = builder.no_sandbox();
        }
        if !config.browser.args.is_empty() {
            builder = builder.args(config.browser.args.clone());
        }
        let browser_config = builder.build().map_err(RunnerError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config).await?;

        // The handler stream must be polled for the lifetime of the browser;
        // it multiplexes every CDP message.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            _user_data_dir: user_data_dir,
        })
    }

    /// Open a blank page to attach relays to before navigating.
    pub async fn new_page(&self) -> Result<Page> {
        Ok(self.browser.new_page("about:blank").await?)
    }

    /// Close the browser and reap the child process.
    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await?;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }
}

/// Resolve the browser executable: explicit override, then config, then the
/// first candidate found on PATH. `None` defers to chromiumoxide's own
/// detection.
fn resolve_executable(config: &Config, override_path: Option<&str>) -> Result<Option<PathBuf>> {
    let configured = override_path.or(config.browser.executable.as_deref());
    if let Some(raw) = configured {
        let expanded = shellexpand::tilde(raw).into_owned();
        let path = PathBuf::from(expanded);
        if !path.exists() {
            return Err(RunnerError::Launch(format!(
                "Browser executable not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    for candidate in BROWSER_CANDIDATES {
        if let Ok(path) = which::which(candidate) {
            return Ok(Some(path));
        }
    }

    Ok(None)
}
