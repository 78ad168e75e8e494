use serde::{Deserialize, Serialize};

use crate::error::{ConformanceError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HarnessConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub runner: RunnerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HarnessConfig {
    /// Configuration pointing at `base_url` with every other setting defaulted.
    pub fn for_server(base_url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.server.base_url = base_url.into();
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.trim().is_empty() {
            return Err(ConformanceError::configuration("server.base_url must be set"));
        }
        url::Url::parse(&self.server.base_url)?;
        if self.server.timeout_ms == 0 {
            return Err(ConformanceError::configuration(
                "server.timeout_ms must be > 0",
            ));
        }
        if self.search.max_pages == 0 {
            return Err(ConformanceError::configuration(
                "search.max_pages must be > 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// FHIR base URL of the server under test, e.g. `https://fhir.example.org/r4`
    #[serde(default)]
    pub base_url: String,
    /// Bearer token sent with every request when present.
    /// Prefer CONFORMANCE__SERVER__BEARER_TOKEN over writing it to a file.
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_accept")]
    pub accept: String,
}

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_accept() -> String {
    "application/fhir+json".into()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            bearer_token: None,
            timeout_ms: default_timeout_ms(),
            accept: default_accept(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Upper bound on Bundle pages followed through `next` links
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}
fn default_max_pages() -> usize {
    20
}
impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunnerSettings {
    /// End the run at the first `Wait` outcome instead of moving on.
    #[serde(default)]
    pub suspend_on_wait: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::HarnessConfig;
    use crate::error::Result;
    use ::config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Load configuration from a TOML file plus `CONFORMANCE__*` environment overrides.
    ///
    /// Without an explicit path, `conformance.toml` in the working directory is
    /// used when it exists.
    pub fn load_config(path: Option<&str>) -> Result<HarnessConfig> {
        let _ = dotenvy::dotenv();

        let mut builder = Config::builder();
        let file = PathBuf::from(path.unwrap_or("conformance.toml"));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        // e.g. CONFORMANCE__SERVER__BASE_URL=https://fhir.example.org/r4
        builder = builder.add_source(
            Environment::with_prefix("CONFORMANCE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let merged: HarnessConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.server.timeout_ms, 30_000);
        assert_eq!(config.server.accept, "application/fhir+json");
        assert_eq!(config.search.max_pages, 20);
        assert!(!config.runner.suspend_on_wait);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate() {
        assert!(HarnessConfig::default().validate().is_err());
        assert!(HarnessConfig::for_server("not a url").validate().is_err());
        assert!(
            HarnessConfig::for_server("https://fhir.example.org/r4")
                .validate()
                .is_ok()
        );

        let mut config = HarnessConfig::for_server("https://fhir.example.org/r4");
        config.search.max_pages = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: search.max_pages must be > 0"
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: HarnessConfig = toml_from_str(
            r#"
            [server]
            base_url = "https://fhir.example.org/r4"
            bearer_token = "secret"

            [runner]
            suspend_on_wait = true
            "#,
        );
        assert_eq!(config.server.bearer_token.as_deref(), Some("secret"));
        assert_eq!(config.server.timeout_ms, 30_000);
        assert!(config.runner.suspend_on_wait);
        assert_eq!(config.search.max_pages, 20);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nbase_url = \"https://fhir.example.org/r4\"\ntimeout_ms = 5000\n\n[search]\nmax_pages = 3"
        )
        .unwrap();

        let config = loader::load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.base_url, "https://fhir.example.org/r4");
        assert_eq!(config.server.timeout_ms, 5000);
        assert_eq!(config.search.max_pages, 3);
    }

    fn toml_from_str(source: &str) -> HarnessConfig {
        ::config::Config::builder()
            .add_source(::config::File::from_str(source, ::config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }
}
