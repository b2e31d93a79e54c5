//! Runtime configuration, resolved once at startup.
//!
//! Request handlers never read environment variables; `run()` builds an
//! `AppConfig` and passes it into the services that need it.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Remedi";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Reserved token the assessment service embeds in replies it considers an emergency.
pub const DEFAULT_EMERGENCY_MARKER: &str = "[[EMERGENCY]]";

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "remedi_lib=info,remedi=info,tower_http=warn"
}

/// Get the application data directory (~/Remedi/), if a home directory exists.
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("Remedi"))
}

/// Default SQLite database location.
pub fn default_db_path() -> PathBuf {
    app_data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("remedi.db")
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("cannot read clinician allow-list {path}: {source}")]
    AllowlistFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Optional clinician console features.
///
/// Each one used to be a separate console revision; they are now switches
/// on a single console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ConsoleCapabilities {
    pub video_call: bool,
    pub ticket_dismissal: bool,
    pub ai_summary: bool,
}

impl ConsoleCapabilities {
    pub fn all() -> Self {
        Self {
            video_call: true,
            ticket_dismissal: true,
            ai_summary: true,
        }
    }

    pub fn none() -> Self {
        Self {
            video_call: false,
            ticket_dismissal: false,
            ai_summary: false,
        }
    }

    /// Parse a comma-separated feature list, e.g. `video_call,ai_summary`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut caps = Self::none();
        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match item {
                "video_call" => caps.video_call = true,
                "ticket_dismissal" => caps.ticket_dismissal = true,
                "ai_summary" => caps.ai_summary = true,
                "all" => caps = Self::all(),
                other => {
                    return Err(ConfigError::Invalid {
                        key: "REMEDI_CONSOLE_FEATURES",
                        value: other.to_string(),
                    })
                }
            }
        }
        Ok(caps)
    }
}

impl Default for ConsoleCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    /// Base URL hosting `/chat` and `/summarize`.
    pub service_url: String,
    /// Base URL hosting `/emergency-email`.
    pub dispatch_url: String,
    /// Upper bound on every outbound service call.
    pub http_timeout: Duration,
    /// Lower-cased clinician emails.
    pub clinician_allowlist: BTreeSet<String>,
    pub emergency_marker: String,
    pub console: ConsoleCapabilities,
}

impl AppConfig {
    /// Resolve configuration from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_raw = get("REMEDI_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "REMEDI_BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let db_path = get("REMEDI_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let service_url = get("REMEDI_SERVICE_URL")
            .ok_or(ConfigError::Missing("REMEDI_SERVICE_URL"))?
            .trim_end_matches('/')
            .to_string();
        let dispatch_url = get("REMEDI_DISPATCH_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| service_url.clone());

        let http_timeout = match get("REMEDI_HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: "REMEDI_HTTP_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        key: "REMEDI_HTTP_TIMEOUT_SECS",
                        value: raw,
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let mut clinician_allowlist = get("REMEDI_CLINICIAN_ALLOWLIST")
            .map(|raw| parse_allowlist(&raw))
            .unwrap_or_default();
        if let Some(path) = get("REMEDI_CLINICIAN_ALLOWLIST_FILE") {
            clinician_allowlist.extend(load_allowlist_file(Path::new(&path))?);
        }
        if clinician_allowlist.is_empty() {
            tracing::warn!("Clinician allow-list is empty; the console will deny every identity");
        }

        let emergency_marker =
            get("REMEDI_EMERGENCY_MARKER").unwrap_or_else(|| DEFAULT_EMERGENCY_MARKER.to_string());

        let console = match get("REMEDI_CONSOLE_FEATURES") {
            Some(raw) => ConsoleCapabilities::parse(&raw)?,
            None => ConsoleCapabilities::default(),
        };

        Ok(Self {
            bind_addr,
            db_path,
            service_url,
            dispatch_url,
            http_timeout,
            clinician_allowlist,
            emergency_marker,
            console,
        })
    }
}

/// Parse an allow-list: entries separated by commas or newlines,
/// `#` starts a comment, comparison is case-insensitive.
pub fn parse_allowlist(raw: &str) -> BTreeSet<String> {
    raw.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(|line| line.split(','))
        .map(|entry| entry.trim().to_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Read an allow-list file (one email per line).
pub fn load_allowlist_file(path: &Path) -> Result<BTreeSet<String>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::AllowlistFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_allowlist(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn service_url_is_required() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("REMEDI_SERVICE_URL")));
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let cfg =
            AppConfig::from_lookup(lookup(&[("REMEDI_SERVICE_URL", "https://triage.example/")]))
                .unwrap();
        assert_eq!(cfg.service_url, "https://triage.example");
        assert_eq!(cfg.dispatch_url, "https://triage.example");
        assert_eq!(cfg.http_timeout, Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        assert_eq!(cfg.emergency_marker, DEFAULT_EMERGENCY_MARKER);
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(cfg.console, ConsoleCapabilities::all());
        assert!(cfg.clinician_allowlist.is_empty());
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = AppConfig::from_lookup(lookup(&[
            ("REMEDI_SERVICE_URL", "http://localhost:8000"),
            ("REMEDI_HTTP_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "REMEDI_HTTP_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn allowlist_is_normalized() {
        let list = parse_allowlist(" Doctor@Remedi.ng, test@doctor.com\n# retired\n\nnurse@remedi.ng # night shift");
        assert_eq!(list.len(), 3);
        assert!(list.contains("doctor@remedi.ng"));
        assert!(list.contains("nurse@remedi.ng"));
    }

    #[test]
    fn allowlist_file_merges_with_env_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "oncall@remedi.ng").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cfg = AppConfig::from_lookup(lookup(&[
            ("REMEDI_SERVICE_URL", "http://localhost:8000"),
            ("REMEDI_CLINICIAN_ALLOWLIST", "doctor@remedi.ng"),
            ("REMEDI_CLINICIAN_ALLOWLIST_FILE", &path),
        ]))
        .unwrap();
        assert_eq!(cfg.clinician_allowlist.len(), 2);
        assert!(cfg.clinician_allowlist.contains("oncall@remedi.ng"));
    }

    #[test]
    fn missing_allowlist_file_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[
            ("REMEDI_SERVICE_URL", "http://localhost:8000"),
            ("REMEDI_CLINICIAN_ALLOWLIST_FILE", "/nonexistent/remedi/allow.txt"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::AllowlistFile { .. }));
    }

    #[test]
    fn console_features_parse() {
        let caps = ConsoleCapabilities::parse("video_call, ai_summary").unwrap();
        assert!(caps.video_call);
        assert!(caps.ai_summary);
        assert!(!caps.ticket_dismissal);
        assert!(ConsoleCapabilities::parse("teleport").is_err());
    }

    #[test]
    fn app_name_is_remedi() {
        assert_eq!(APP_NAME, "Remedi");
    }
}
