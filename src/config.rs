use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::Theme;

pub const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_SIGNATURE: &str = "Best regards,\n[Your Name]";

// ---------------------------------------------------------------------------
// Runtime SMTP credentials (memory only)
// ---------------------------------------------------------------------------

/// Resolved SMTP settings for one session. Deliberately not `Serialize`:
/// the password must never reach disk or a URL.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub sender_email: String,
    pub password: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("sender_email", &self.sender_email)
            .field("password", &"***")
            .finish()
    }
}

impl SmtpConfig {
    /// Build credentials from raw form input, sanitizing each field.
    pub fn new(server: &str, port: u16, sender_email: &str, password: &str) -> Result<Self, ConfigError> {
        let config = SmtpConfig {
            server: sanitize(server),
            port,
            sender_email: sanitize(sender_email),
            password: sanitize(password),
        };
        config.validate()?;
        Ok(config)
    }

    /// Combine persisted prefs with a password entered this session.
    pub fn from_prefs(prefs: &SessionPrefs, password: &str) -> Result<Self, ConfigError> {
        Self::new(&prefs.smtp_server, prefs.smtp_port, &prefs.smtp_email, password)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.server.is_empty() {
            missing.push("server");
        }
        if self.sender_email.is_empty() {
            missing.push("sender email");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if !missing.is_empty() {
            return Err(ConfigError::IncompleteSmtp(missing));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }
}

/// Trim whitespace and drop non-breaking spaces pasted from web pages.
pub fn sanitize(value: &str) -> String {
    value.trim().replace('\u{a0}', "")
}

// ---------------------------------------------------------------------------
// Persisted session prefs (non-secret allow-list)
// ---------------------------------------------------------------------------

/// Form fields restored on reload. The SMTP password is not one of them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionPrefs {
    pub api_key: String,
    pub signature: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_email: String,
    pub to_email: String,
    pub theme: Theme,
}

impl Default for SessionPrefs {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            signature: DEFAULT_SIGNATURE.to_string(),
            smtp_server: DEFAULT_SMTP_SERVER.to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_email: String::new(),
            to_email: String::new(),
            theme: Theme::Light,
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("draftmail")
}

fn prefs_path() -> PathBuf {
    config_dir().join("prefs.json")
}

impl SessionPrefs {
    /// Load from the user config dir, then overlay the environment.
    /// Missing file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut prefs = Self::load_from(&prefs_path())?;
        prefs.apply_env();
        Ok(prefs)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&prefs_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No prefs file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("read prefs: {e}")))?;
        serde_json::from_str(&data).map_err(|e| ConfigError::Parse(format!("prefs: {e}")))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io(format!("create config dir: {e}")))?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(format!("serialize prefs: {e}")))?;
        fs::write(path, data).map_err(|e| ConfigError::Io(format!("write prefs: {e}")))
    }

    /// Overlay environment variables onto these prefs.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.api_key = key;
        }
        if let Ok(server) = std::env::var("DRAFTMAIL_SMTP_SERVER") {
            self.smtp_server = sanitize(&server);
        }
        if let Some(port) = std::env::var("DRAFTMAIL_SMTP_PORT")
            .ok()
            .and_then(|p| p.trim().parse().ok())
        {
            self.smtp_port = port;
        }
        if let Ok(email) = std::env::var("DRAFTMAIL_SMTP_EMAIL") {
            self.smtp_email = sanitize(&email);
        }
        if let Ok(to) = std::env::var("DRAFTMAIL_TO") {
            self.to_email = to.trim().to_string();
        }
    }

    /// SMTP password from the environment, for headless use. Never stored.
    pub fn env_password() -> Option<String> {
        std::env::var("DRAFTMAIL_SMTP_PASSWORD")
            .ok()
            .map(|p| sanitize(&p))
            .filter(|p| !p.is_empty())
    }

    /// The allow-listed fields mirrored into the page URL, in a stable order.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("api_key", self.api_key.clone()),
            ("signature", self.signature.clone()),
            ("smtp_server", self.smtp_server.clone()),
            ("smtp_port", self.smtp_port.to_string()),
            ("smtp_email", self.smtp_email.clone()),
            ("to_email", self.to_email.clone()),
            ("theme", self.theme.as_str().to_string()),
        ]
    }

    /// Form-urlencoded mirror of the allow-listed fields.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query_pairs())
            .finish()
    }

    /// Restore from query pairs. Unknown keys are ignored, and a value that
    /// fails to parse leaves the current field untouched.
    pub fn apply_query_pairs<K, V>(&mut self, pairs: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "api_key" => self.api_key = value.to_string(),
                "signature" => self.signature = value.to_string(),
                "smtp_server" => self.smtp_server = sanitize(value),
                "smtp_port" => {
                    if let Ok(port) = value.trim().parse() {
                        self.smtp_port = port;
                    }
                }
                "smtp_email" => self.smtp_email = sanitize(value),
                "to_email" => self.to_email = value.trim().to_string(),
                "theme" => {
                    if let Some(theme) = Theme::parse(value) {
                        self.theme = theme;
                    }
                }
                other => log::debug!("Ignoring unknown query key {other:?}"),
            }
        }
    }

    pub fn from_query_string(query: &str) -> Self {
        let mut prefs = Self::default();
        prefs.apply_query_pairs(url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()));
        prefs
    }

    /// Every configuration gap that blocks generation or sending.
    pub fn missing(&self, smtp_password: Option<&str>) -> Vec<ConfigError> {
        let mut issues = Vec::new();
        if self.api_key.trim().is_empty() {
            issues.push(ConfigError::MissingApiKey);
        }
        if let Err(e) = SmtpConfig::from_prefs(self, smtp_password.unwrap_or_default()) {
            issues.push(e);
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serializes tests that touch process environment variables.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    const ENV_VARS: &[&str] = &[
        "GEMINI_API_KEY",
        "DRAFTMAIL_SMTP_SERVER",
        "DRAFTMAIL_SMTP_PORT",
        "DRAFTMAIL_SMTP_EMAIL",
        "DRAFTMAIL_SMTP_PASSWORD",
        "DRAFTMAIL_TO",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    fn temp_prefs_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("draftmail-test-{}", uuid::Uuid::new_v4()))
            .join("prefs.json")
    }

    #[test]
    fn credentials_are_sanitized() {
        let cfg = SmtpConfig::new(" smtp.example.com\u{a0}", 587, "me@example.com ", "pa\u{a0}ss ").unwrap();
        assert_eq!(cfg.server, "smtp.example.com");
        assert_eq!(cfg.sender_email, "me@example.com");
        assert_eq!(cfg.password, "pass");
    }

    #[test]
    fn incomplete_credentials_list_every_gap() {
        let err = SmtpConfig::new("", 587, "", "").unwrap_err();
        assert_eq!(
            err,
            ConfigError::IncompleteSmtp(vec!["server", "sender email", "password"])
        );
        assert_eq!(
            SmtpConfig::new("h", 0, "a@b.c", "pw").unwrap_err(),
            ConfigError::InvalidPort
        );
    }

    #[test]
    fn debug_hides_password() {
        let cfg = SmtpConfig::new("h", 587, "a@b.c", "hunter2").unwrap();
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }

    #[test]
    fn defaults_match_the_form() {
        let prefs = SessionPrefs::default();
        assert_eq!(prefs.smtp_server, "smtp.gmail.com");
        assert_eq!(prefs.smtp_port, 587);
        assert_eq!(prefs.signature, "Best regards,\n[Your Name]");
        assert_eq!(prefs.theme, Theme::Light);
    }

    #[test]
    fn save_then_load_restores_prefs() {
        let path = temp_prefs_path();
        let prefs = SessionPrefs {
            api_key: "k".into(),
            smtp_email: "me@example.com".into(),
            theme: Theme::Dark,
            ..Default::default()
        };
        prefs.save_to(&path).unwrap();
        assert_eq!(SessionPrefs::load_from(&path).unwrap(), prefs);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_gives_defaults_and_garbage_is_an_error() {
        let path = temp_prefs_path();
        assert_eq!(SessionPrefs::load_from(&path).unwrap(), SessionPrefs::default());

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            SessionPrefs::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn query_string_mirrors_allow_list_only() {
        let prefs = SessionPrefs {
            api_key: "abc".into(),
            to_email: "boss@company.com".into(),
            ..Default::default()
        };
        let query = prefs.to_query_string();
        assert!(!query.contains("password"));
        let keys: Vec<_> = prefs.query_pairs().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            ["api_key", "signature", "smtp_server", "smtp_port", "smtp_email", "to_email", "theme"]
        );
        for key in keys {
            assert!(query.contains(&format!("{key}=")), "missing {key}");
        }
        assert_eq!(SessionPrefs::from_query_string(&query), prefs);
    }

    #[test]
    fn bad_port_and_unknown_keys_ignored() {
        let prefs = SessionPrefs::from_query_string("?smtp_port=abc&smtp_password=x&theme=Dark");
        assert_eq!(prefs.smtp_port, 587);
        assert_eq!(prefs.theme, Theme::Dark);
    }

    #[test]
    fn missing_reports_api_key_and_password() {
        let prefs = SessionPrefs {
            smtp_email: "me@example.com".into(),
            ..Default::default()
        };
        let issues = prefs.missing(None);
        assert_eq!(
            issues,
            vec![
                ConfigError::MissingApiKey,
                ConfigError::IncompleteSmtp(vec!["password"]),
            ]
        );
        let ready = SessionPrefs {
            api_key: "k".into(),
            ..prefs
        };
        assert!(ready.missing(Some("pw")).is_empty());
    }

    #[test]
    fn env_overlays_every_variable() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        std::env::set_var("GEMINI_API_KEY", "env-key");
        std::env::set_var("DRAFTMAIL_SMTP_SERVER", " smtp.office365.com\u{a0}");
        std::env::set_var("DRAFTMAIL_SMTP_PORT", " 465 ");
        std::env::set_var("DRAFTMAIL_SMTP_EMAIL", "me@example.com ");
        std::env::set_var("DRAFTMAIL_TO", " boss@company.com ");

        let mut prefs = SessionPrefs::default();
        prefs.apply_env();
        clear_env();

        assert_eq!(prefs.api_key, "env-key");
        assert_eq!(prefs.smtp_server, "smtp.office365.com");
        assert_eq!(prefs.smtp_port, 465);
        assert_eq!(prefs.smtp_email, "me@example.com");
        assert_eq!(prefs.to_email, "boss@company.com");
        assert_eq!(prefs.signature, DEFAULT_SIGNATURE);
    }

    #[test]
    fn env_bad_port_keeps_current_and_unset_vars_change_nothing() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        std::env::set_var("DRAFTMAIL_SMTP_PORT", "smtp");

        let mut prefs = SessionPrefs {
            smtp_port: 2525,
            api_key: "file-key".into(),
            ..Default::default()
        };
        let before = prefs.clone();
        prefs.apply_env();
        clear_env();

        assert_eq!(prefs, before);
    }

    #[test]
    fn env_password_is_sanitized_and_blank_is_none() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        assert_eq!(SessionPrefs::env_password(), None);

        std::env::set_var("DRAFTMAIL_SMTP_PASSWORD", "   ");
        assert_eq!(SessionPrefs::env_password(), None);

        std::env::set_var("DRAFTMAIL_SMTP_PASSWORD", "\u{a0}\u{a0}");
        assert_eq!(SessionPrefs::env_password(), None);

        std::env::set_var("DRAFTMAIL_SMTP_PASSWORD", " app\u{a0}pass ");
        assert_eq!(SessionPrefs::env_password().as_deref(), Some("apppass"));
        clear_env();
    }
}
