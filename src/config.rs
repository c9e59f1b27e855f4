use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Layered runner configuration: defaults -> config file -> environment.
///
/// Environment variables use the `PAGERUNNER_` prefix with `__` separating
/// nested keys, e.g. `PAGERUNNER_BROWSER__NO_SANDBOX=true`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserSection,
    pub runner: RunnerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    /// Chromium-based browser executable. Autodetected when unset.
    pub executable: Option<String>,
    /// Run without a visible window.
    pub headless: bool,
    /// Pass --no-sandbox to the browser (required when running as root).
    pub no_sandbox: bool,
    /// Extra flags appended to the browser command line.
    pub args: Vec<String>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            no_sandbox: false,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RunnerSection {
    /// JavaScript expression evaluated once the page has loaded.
    /// Overrides the built-in default entry point.
    pub entrypoint: Option<String>,
    /// Watchdog in seconds. Unset means the run may wait forever.
    pub timeout_secs: Option<u64>,
}

/// Returns the config file location: <config_dir>/pagerunner/config.toml
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pagerunner").join("config.toml"))
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = config_path() {
            figment = figment.merge(Toml::file(path));
        }
        let config = figment
            .merge(Env::prefixed("PAGERUNNER_").split("__"))
            .extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_headless_with_sandbox() {
        let config = Config::default();
        assert!(config.browser.headless);
        assert!(!config.browser.no_sandbox);
        assert!(config.browser.executable.is_none());
        assert!(config.runner.timeout_secs.is_none());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                [browser]
                executable = "/opt/chromium/chrome"
                headless = false
                args = ["--disable-gpu"]

                [runner]
                timeout_secs = 300
                "#,
            ))
            .extract()
            .expect("config should parse");

        assert_eq!(
            config.browser.executable.as_deref(),
            Some("/opt/chromium/chrome")
        );
        assert!(!config.browser.headless);
        assert_eq!(config.browser.args, vec!["--disable-gpu".to_string()]);
        assert_eq!(config.runner.timeout_secs, Some(300));
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string("[runner]\nentrypoint = \"suite.run()\"\n"))
            .extract()
            .expect("config should parse");

        assert_eq!(config.runner.entrypoint.as_deref(), Some("suite.run()"));
        assert!(config.browser.headless, "untouched section keeps defaults");
    }

    #[test]
    fn config_path_is_under_config_dir() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("pagerunner/config.toml"));
        }
    }
}
