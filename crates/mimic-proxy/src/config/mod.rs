//! Configuration types for mimic.

mod control_plane;
mod listen;
mod logging;
mod mode;
mod upstream;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use control_plane::ControlPlaneConfig;
pub use listen::ListenConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use mode::Mode;
pub use upstream::{CallbackConfig, UpstreamConfig};

use crate::expectation::Expectation;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,

    /// `mock` answers unmatched requests with 404, `proxy` forwards them
    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub control_plane: ControlPlaneConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP callbacks available to `httpCallback` expectations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callbacks: Vec<CallbackConfig>,

    /// Registered before the listener starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expectations: Vec<Expectation>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        if config.listen.port == 0 {
            anyhow::bail!("listen.port must be set to a non-zero port in a config file");
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.listen.socket_addr()?;

        if self.upstream.timeout_ms == 0 {
            anyhow::bail!("upstream.timeout_ms must be greater than zero");
        }
        if self.upstream.connect_timeout_ms == 0 {
            anyhow::bail!("upstream.connect_timeout_ms must be greater than zero");
        }

        let mut names = HashSet::new();
        for callback in &self.callbacks {
            if callback.name.is_empty() {
                anyhow::bail!("Callback with url '{}' has no name", callback.url);
            }
            if !names.insert(callback.name.as_str()) {
                anyhow::bail!("Duplicate callback name: '{}'", callback.name);
            }
            if callback.timeout_ms == 0 {
                anyhow::bail!("Callback '{}' must have a non-zero timeout", callback.name);
            }
            if !(callback.url.starts_with("http://") || callback.url.starts_with("https://")) {
                anyhow::bail!(
                    "Callback '{}' url must be http or https: '{}'",
                    callback.name,
                    callback.url
                );
            }
        }

        let mut routes = HashSet::new();
        for route in self.control_plane.to_routes().routes() {
            let key = (route.method.to_ascii_uppercase(), route.path.as_str());
            if !routes.insert(key) {
                anyhow::bail!(
                    "Duplicate control-plane route: {} {}",
                    route.method,
                    route.path
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::Action;
    use crate::state::ControlOperation;
    use std::io::Write;
    use std::time::Duration;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
listen:
  host: 127.0.0.1
  port: 8080
mode: proxy
upstream:
  timeout_ms: 2500
control_plane:
  strict_methods: true
  routes:
    - operation: reset
      method: POST
      path: /mimic/reset
logging:
  level: debug
  format: json
callbacks:
  - name: audit
    url: http://audit.local/hook
expectations:
  - httpRequest:
      path: /health
    httpResponse:
      statusCode: 204
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.listen.socket_addr().unwrap().to_string(), "127.0.0.1:8080");
        assert!(config.mode.is_proxy());
        assert_eq!(config.upstream.timeout(), Duration::from_millis(2500));
        assert_eq!(config.upstream.connect_timeout(), Duration::from_millis(5000));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.callbacks[0].name, "audit");
        assert_eq!(config.expectations.len(), 1);
        assert!(matches!(
            &config.expectations[0].action,
            Action::Respond(response) if response.status_code == 204
        ));

        let routes = config.control_plane.to_routes();
        assert!(routes.strict_methods());
        let reset = routes
            .routes()
            .iter()
            .find(|route| route.operation == ControlOperation::Reset)
            .unwrap();
        assert_eq!(reset.path, "/mimic/reset");
    }

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.listen.port, 1080);
        assert_eq!(config.mode, Mode::Mock);
        assert_eq!(config.upstream.timeout_ms, 30_000);
        assert_eq!(config.logging.level, "info");
        assert!(!config.control_plane.strict_methods);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(serde_yaml::from_str::<Config>("mode: reverse").is_err());
    }

    #[test]
    fn test_invalid_expectation_rejected() {
        let yaml = r#"
expectations:
  - httpRequest:
      path: /nothing
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_duplicate_callback_names_rejected() {
        let yaml = r#"
callbacks:
  - name: audit
    url: http://a.local/hook
  - name: audit
    url: http://b.local/hook
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate callback name"));
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let yaml = r#"
control_plane:
  routes:
    - operation: clear
      method: PUT
      path: /reset
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate control-plane route"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config: Config = serde_yaml::from_str("upstream:\n  timeout_ms: 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let file = write_config("listen:\n  port: 9999\nmode: mock\n");
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.listen.port, 9999);
    }

    #[test]
    fn test_from_file_rejects_port_zero() {
        let file = write_config("listen:\n  port: 0\n");
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("non-zero port"));
    }
}
