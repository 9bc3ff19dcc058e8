use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.3; Trident/7.0; rv:11.0) like Gecko";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub user_agent: String,
    pub cookies: BTreeMap<String, String>,
    /// Wait before every outbound request.
    pub delay_ms: u64,
    /// Size above which an archive triggers a warning.
    pub archive_size_limit: u64,
    pub include_images: bool,
    pub mail: Option<MailSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            cookies: BTreeMap::from([("over18".to_owned(), "yes".to_owned())]),
            delay_ms: 1000,
            archive_size_limit: 50 * 1024 * 1024,
            include_images: false,
            mail: None,
        }
    }
}

impl Settings {
    /// Reads settings from YAML. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = match std::fs::read_to_string(path) {
            Ok(yaml) => yaml,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "settings file not found; using defaults");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read settings: {}", path.display()));
            }
        };
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&yaml).with_context(|| format!("parse settings: {}", path.display()))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Addressing and credentials for archive delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub from: String,
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    pub body: String,
    pub server: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = Settings::load(&dir.path().join("settings.yaml")).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.cookies.get("over18").map(String::as_str), Some("yes"));
        assert_eq!(settings.delay(), Duration::from_secs(1));
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.yaml");
        std::fs::write(
            &path,
            "delay_ms: 0\ninclude_images: true\nmail:\n  to: reader@example.com\n  port: 587\n",
        )
        .expect("write");

        let settings = Settings::load(&path).expect("load");
        assert_eq!(settings.delay_ms, 0);
        assert!(settings.include_images);
        assert_eq!(settings.user_agent, DEFAULT_USER_AGENT);
        let mail = settings.mail.expect("mail block");
        assert_eq!(mail.to, "reader@example.com");
        assert_eq!(mail.port, 587);
    }
}
