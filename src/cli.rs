use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::Config;
use crate::error::Result;
use crate::runner::{self, Outcome, RunnerOptions};

#[derive(Parser, Debug)]
#[command(name = "pagerunner")]
#[command(about = "Run a compiled browser test bundle in headless Chromium")]
#[command(version)]
pub struct Cli {
    /// Path to the HTML document that loads the test bundle
    pub page: PathBuf,

    /// Chromium-based browser executable (overrides config and autodetection)
    #[arg(long, value_name = "PATH", env = "PAGERUNNER_BROWSER_PATH")]
    pub browser_path: Option<String>,

    /// Run the browser with a visible window
    #[arg(long)]
    pub headed: bool,

    /// Abort with exit code 124 if the page has not signaled completion
    /// within this many seconds (default: wait forever)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// JavaScript expression evaluated once the page has loaded
    #[arg(long, value_name = "EXPR")]
    pub entrypoint: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Merge flags over config and drive a run to its terminal outcome.
    pub async fn run(self) -> Result<Outcome> {
        let config = Config::load()?;

        let entrypoint = self
            .entrypoint
            .or_else(|| config.runner.entrypoint.clone())
            .unwrap_or_else(|| runner::DEFAULT_ENTRYPOINT.to_string());
        let timeout = self
            .timeout
            .or(config.runner.timeout_secs)
            .map(Duration::from_secs);

        let opts = RunnerOptions {
            page: self.page,
            entrypoint,
            timeout,
            browser_path: self.browser_path,
            headed: self.headed,
        };

        runner::run(&config, &opts).await
    }
}
