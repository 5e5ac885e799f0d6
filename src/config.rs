//! Configuration types, built from environment variables.
//!
//! Each `from_env()` delegates to a `from_lookup()` that takes the variable
//! source as a closure, so tests never touch the process environment.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::parsing::{CompiledMarkers, MarkerSet};

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ── Helpers ─────────────────────────────────────────────────────────

/// Parse `key` if set and non-empty, else return `default`.
fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match non_empty(lookup, key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
        None => Ok(default),
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    non_empty(lookup, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ── Assist ──────────────────────────────────────────────────────────

/// Loop and generation settings.
#[derive(Debug, Clone)]
pub struct AssistConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    /// Empty denies all, `*` allows all.
    pub allowed_senders: Vec<String>,
    /// Fixed reply recipient. `None` replies to the forwarding sender.
    pub reply_to: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// JSON file replacing the built-in marker table.
    pub markers_file: Option<PathBuf>,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            batch_size: 10,
            allowed_senders: Vec::new(),
            reply_to: None,
            max_tokens: 500,
            temperature: 0.7,
            markers_file: None,
        }
    }
}

impl AssistConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let poll_secs: u64 = parse_or(
            &lookup,
            "FORWARD_ASSIST_POLL_INTERVAL_SECS",
            defaults.poll_interval.as_secs(),
        )?;
        if poll_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FORWARD_ASSIST_POLL_INTERVAL_SECS".into(),
                message: "must be at least 1".into(),
            });
        }

        let batch_size: usize = parse_or(&lookup, "FORWARD_ASSIST_BATCH_SIZE", defaults.batch_size)?;
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "FORWARD_ASSIST_BATCH_SIZE".into(),
                message: "must be at least 1".into(),
            });
        }

        let temperature: f32 =
            parse_or(&lookup, "FORWARD_ASSIST_TEMPERATURE", defaults.temperature)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue {
                key: "FORWARD_ASSIST_TEMPERATURE".into(),
                message: format!("{temperature} is outside 0.0..=2.0"),
            });
        }

        let allowed_senders: Vec<String> = lookup("FORWARD_ASSIST_ALLOWED_SENDERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            poll_interval: Duration::from_secs(poll_secs),
            batch_size,
            allowed_senders,
            reply_to: non_empty(&lookup, "FORWARD_ASSIST_REPLY_TO"),
            max_tokens: parse_or(&lookup, "FORWARD_ASSIST_MAX_TOKENS", defaults.max_tokens)?,
            temperature,
            markers_file: non_empty(&lookup, "FORWARD_ASSIST_MARKERS_FILE").map(PathBuf::from),
        })
    }

    /// The configured marker table, or the built-in one.
    pub fn load_markers(&self) -> Result<CompiledMarkers, ConfigError> {
        match &self.markers_file {
            Some(path) => MarkerSet::from_json_file(path)?.compile(),
            None => Ok(CompiledMarkers::builtin().clone()),
        }
    }
}

// ── Email ───────────────────────────────────────────────────────────

/// IMAP and SMTP account settings.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub mailbox: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let imap_host = required(&lookup, "EMAIL_IMAP_HOST")?;
        let smtp_host = non_empty(&lookup, "EMAIL_SMTP_HOST")
            .unwrap_or_else(|| imap_host.replace("imap", "smtp"));
        let username = non_empty(&lookup, "EMAIL_USERNAME").unwrap_or_default();
        let from_address =
            non_empty(&lookup, "EMAIL_FROM_ADDRESS").unwrap_or_else(|| username.clone());

        Ok(Self {
            imap_port: parse_or(&lookup, "EMAIL_IMAP_PORT", 993)?,
            mailbox: non_empty(&lookup, "EMAIL_IMAP_MAILBOX").unwrap_or_else(|| "INBOX".into()),
            smtp_port: parse_or(&lookup, "EMAIL_SMTP_PORT", 465)?,
            password: SecretString::from(lookup("EMAIL_PASSWORD").unwrap_or_default()),
            imap_host,
            smtp_host,
            username,
            from_address,
        })
    }
}

// ── LLM ─────────────────────────────────────────────────────────────

/// Generation backend settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: SecretString::from(required(&lookup, "OPENAI_API_KEY")?),
            model: non_empty(&lookup, "FORWARD_ASSIST_MODEL").unwrap_or_else(|| "gpt-4".into()),
            base_url: non_empty(&lookup, "OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    use secrecy::ExposeSecret;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    // ── AssistConfig ────────────────────────────────────────────────

    #[test]
    fn assist_defaults() {
        let config = AssistConfig::from_lookup(vars(&[])).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_tokens, 500);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert!(config.allowed_senders.is_empty());
        assert!(config.reply_to.is_none());
        assert!(config.markers_file.is_none());
    }

    #[test]
    fn assist_overrides() {
        let config = AssistConfig::from_lookup(vars(&[
            ("FORWARD_ASSIST_POLL_INTERVAL_SECS", "5"),
            ("FORWARD_ASSIST_BATCH_SIZE", "3"),
            ("FORWARD_ASSIST_ALLOWED_SENDERS", " boss@x.com, ,@team.org "),
            ("FORWARD_ASSIST_REPLY_TO", "me@x.com"),
            ("FORWARD_ASSIST_MAX_TOKENS", "800"),
            ("FORWARD_ASSIST_TEMPERATURE", "0.2"),
        ]))
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.allowed_senders, vec!["boss@x.com", "@team.org"]);
        assert_eq!(config.reply_to.as_deref(), Some("me@x.com"));
        assert_eq!(config.max_tokens, 800);
    }

    #[test]
    fn invalid_number_is_error() {
        let err = AssistConfig::from_lookup(vars(&[("FORWARD_ASSIST_BATCH_SIZE", "ten")]))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FORWARD_ASSIST_BATCH_SIZE")
        );
    }

    #[test]
    fn zero_interval_is_error() {
        assert!(
            AssistConfig::from_lookup(vars(&[("FORWARD_ASSIST_POLL_INTERVAL_SECS", "0")])).is_err()
        );
    }

    #[test]
    fn out_of_range_temperature_is_error() {
        assert!(AssistConfig::from_lookup(vars(&[("FORWARD_ASSIST_TEMPERATURE", "3.5")])).is_err());
    }

    #[test]
    fn builtin_markers_without_file() {
        let markers = AssistConfig::default().load_markers().unwrap();
        assert!(markers.earliest_forward_marker("---------- Forwarded message ---------").is_some());
    }

    #[test]
    fn markers_loaded_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"forward_markers": ["Videresendt melding"], "sender_labels": ["Fra"], "subject_labels": ["Emne"]}}"#
        )
        .unwrap();

        let config = AssistConfig {
            markers_file: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let markers = config.load_markers().unwrap();
        assert_eq!(markers.earliest_forward_marker("hei\n--- Videresendt melding ---"), Some(8));
        assert!(markers.earliest_forward_marker("Forwarded message").is_none());
    }

    #[test]
    fn missing_markers_file_is_io_error() {
        let config = AssistConfig {
            markers_file: Some(PathBuf::from("/nonexistent/markers.json")),
            ..Default::default()
        };
        assert!(matches!(config.load_markers(), Err(ConfigError::Io(_))));
    }

    // ── EmailConfig ─────────────────────────────────────────────────

    #[test]
    fn email_requires_imap_host() {
        let err = EmailConfig::from_lookup(vars(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "EMAIL_IMAP_HOST"));
    }

    #[test]
    fn email_derives_smtp_host_and_defaults() {
        let config = EmailConfig::from_lookup(vars(&[
            ("EMAIL_IMAP_HOST", "imap.example.com"),
            ("EMAIL_USERNAME", "me@example.com"),
            ("EMAIL_PASSWORD", "hunter2"),
        ]))
        .unwrap();
        assert_eq!(config.smtp_host, "smtp.example.com");
        assert_eq!(config.imap_port, 993);
        assert_eq!(config.smtp_port, 465);
        assert_eq!(config.mailbox, "INBOX");
        assert_eq!(config.from_address, "me@example.com");
        assert_eq!(config.password.expose_secret(), "hunter2");
    }

    #[test]
    fn email_invalid_port_is_error() {
        assert!(
            EmailConfig::from_lookup(vars(&[
                ("EMAIL_IMAP_HOST", "imap.example.com"),
                ("EMAIL_IMAP_PORT", "99999"),
            ]))
            .is_err()
        );
    }

    // ── LlmConfig ───────────────────────────────────────────────────

    #[test]
    fn llm_requires_api_key() {
        assert!(matches!(
            LlmConfig::from_lookup(vars(&[])),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn llm_defaults() {
        let config = LlmConfig::from_lookup(vars(&[("OPENAI_API_KEY", "sk-test")])).unwrap();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.api_key.expose_secret(), "sk-test");
    }
}
