//! Configuration loading

use std::{path::Path, time::Duration};

use serde::{Deserialize, Deserializer};

use crate::{commands::DEFAULT_PORT, emitter::Cadence, proto::ImageSet};

/// Configuration of a slideshow controller
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Host name or address of the query server
    pub endpoint_address: String,
    /// TCP port of the query server
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path of the node to drive
    #[serde(default = "default_node")]
    pub node: String,
    /// Open the node in raw mode
    #[serde(default = "default_raw")]
    pub raw: bool,
    /// Maximum time to establish the connection
    #[serde(default, rename = "connect_timeout_secs", deserialize_with = "optional_secs")]
    pub connect_timeout: Option<Duration>,
    /// Escape non-ASCII characters of payloads as `\uXXXX`
    #[serde(default)]
    pub ascii_json: bool,
    /// Delays between commands of a cycle
    #[serde(default)]
    pub cadence: Cadence,
    /// Image set announced with the update command
    #[serde(default = "default_current")]
    pub current: ImageSet,
    /// Image set announced with the declare-next command
    #[serde(default = "default_next")]
    pub next: ImageSet,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_node() -> String {
    "c".to_owned()
}

fn default_raw() -> bool {
    true
}

const DEMO_IMAGES: [&str; 5] = ["0001", "0002", "0003", "0004", "0005"];

fn default_current() -> ImageSet {
    ImageSet::new("One set of images", DEMO_IMAGES)
}

fn default_next() -> ImageSet {
    ImageSet::new("(Potentially) another set of images", DEMO_IMAGES)
}

/// Parse a number of seconds into a [Duration]
pub(crate) fn secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

/// Parse a strictly positive number of seconds, if present
fn optional_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    let duration = secs(deserializer)?;
    if duration.is_zero() {
        return Err(serde::de::Error::custom("timeout must be greater than zero"));
    }
    Ok(Some(duration))
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path).map_err(|source| crate::Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, crate::Error> {
        Ok(toml::from_str(content)?)
    }

    /// Connect timeout, if one is configured
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_apply_defaults() {
        let config = Config::from_toml_str(r#"endpoint_address = "127.0.0.1""#).unwrap();

        assert_eq!(config.endpoint_address, "127.0.0.1");
        assert_eq!(config.port, 4444);
        assert_eq!(config.node, "c");
        assert!(config.raw);
        assert_eq!(config.connect_timeout(), None);
        assert!(!config.ascii_json);
        assert_eq!(config.cadence, Cadence::default());
        assert_eq!(config.current.title, "One set of images");
        assert_eq!(config.next.images, DEMO_IMAGES);
    }

    #[test]
    fn should_require_endpoint_address() {
        assert!(matches!(
            Config::from_toml_str(r#"node = "c""#),
            Err(crate::Error::ConfigParse(_))
        ));
    }

    #[test]
    fn should_read_overrides() {
        let config = Config::from_toml_str(
            r#"
            endpoint_address = "display.local"
            port = 4000
            node = "root/slides"
            raw = false
            connect_timeout_secs = 2.5

            [cadence]
            step_count = 3
            step_secs = 1.0

            [current]
            title = "Lobby"
            images = ["b", "a"]
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 4000);
        assert_eq!(config.node, "root/slides");
        assert!(!config.raw);
        assert_eq!(config.connect_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.cadence.step_count, 3);
        assert_eq!(config.cadence.step, Duration::from_secs(1));
        assert_eq!(config.cadence.announce, Duration::from_secs(4));
        assert_eq!(config.current, ImageSet::new("Lobby", ["b", "a"]));
    }

    #[test]
    fn should_reject_invalid_connect_timeout() {
        for value in ["1e30", "-3.0", "0", "nan"] {
            let content = format!("endpoint_address = \"h\"\nconnect_timeout_secs = {value}");
            assert!(
                matches!(Config::from_toml_str(&content), Err(crate::Error::ConfigParse(_))),
                "accepted connect_timeout_secs = {value}"
            );
        }
    }

    #[test]
    fn should_reject_invalid_cadence_delay() {
        let content = "endpoint_address = \"h\"\n[cadence]\nstep_secs = -1.0";
        assert!(matches!(Config::from_toml_str(content), Err(crate::Error::ConfigParse(_))));
    }

    #[test]
    fn should_report_missing_file() {
        let path = Path::new("/nonexistent/ibquery/config.toml");
        assert!(matches!(
            Config::load(path),
            Err(crate::Error::ConfigRead { path: p, .. }) if p == path
        ));
    }
}
