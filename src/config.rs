//! Registry configuration (spec §6, SPEC_FULL.md §8).
//!
//! Mirrors `pkg/config/config.go`'s on-disk JSON shape and create-defaults-on-
//! first-run behavior, wrapped in the teacher's `validator`-derive style
//! (`src/config/settings.rs` validates every nested settings struct the same
//! way).

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::RegistryError;

/// secrecy deliberately doesn't implement `Serialize` for `SecretString` (to
/// keep secrets from leaking into logs or debug output by accident). Writing
/// the config back to disk on first run still needs the plaintext, so this
/// field-level serializer is the one place that's allowed to expose it.
fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Silent,
}

impl LogLevel {
    /// Parses a level name. `"WARN"` and `"WARNING"` both map to
    /// `LogLevel::Warning` — the original Go source has a fallthrough bug
    /// where `"WARNING"` silently resolves to `INFO`; this is fixed here.
    pub fn parse(s: &str) -> LogLevel {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "WARN" | "WARNING" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            "SILENT" => LogLevel::Silent,
            _ => LogLevel::Info,
        }
    }

    pub fn as_tracing_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "off",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

#[derive(Debug, Clone, Validate, Deserialize, Serialize)]
pub struct RepoConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub allow_anonymous_pull: bool,
}

impl Default for RepoConfig {
    fn default() -> Self {
        RepoConfig {
            dir: PathBuf::from("data"),
            allow_anonymous_pull: false,
        }
    }
}

#[derive(Debug, Clone, Validate, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default)]
    pub tls_crt_file: Option<PathBuf>,
    #[serde(default)]
    pub tls_key_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 5000,
            tls_crt_file: None,
            tls_key_file: None,
        }
    }
}

impl ServerConfig {
    pub fn is_tls(&self) -> bool {
        self.tls_crt_file.is_some() && self.tls_key_file.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default)]
    pub service_level: LogLevel,
    #[serde(default)]
    pub console_level: LogLevel,
    #[serde(default)]
    pub log_file_level: LogLevel,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            service_level: LogLevel::Info,
            console_level: LogLevel::Info,
            log_file_level: LogLevel::Info,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageRule {
    pub name: String,
    #[serde(default)]
    pub pull: bool,
    #[serde(default)]
    pub push: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Account {
    pub usr: String,
    #[serde(serialize_with = "serialize_secret")]
    pub pwd: SecretString,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub images: Vec<ImageRule>,
}

#[derive(Debug, Clone, Default, Validate, Deserialize, Serialize)]
pub struct Config {
    #[validate]
    pub repo: RepoConfig,
    #[validate]
    pub server: ServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub log: LogConfig,
    pub accounts: Vec<Account>,
}

impl Config {
    /// Default accounts seeded on first run: `admin`/`admin` with full `*`
    /// access, and an anonymous pull-only `*` rule — matching
    /// `config.initDefaults()`.
    fn with_defaults() -> Config {
        Config {
            repo: RepoConfig::default(),
            server: ServerConfig::default(),
            proxy: ProxyConfig::default(),
            log: LogConfig::default(),
            accounts: vec![
                Account {
                    usr: "admin".to_string(),
                    pwd: SecretString::new("admin".to_string()),
                    admin: true,
                    images: vec![ImageRule {
                        name: "*".to_string(),
                        pull: true,
                        push: true,
                    }],
                },
                Account {
                    usr: "anonymous".to_string(),
                    pwd: SecretString::new(String::new()),
                    admin: false,
                    images: vec![ImageRule {
                        name: "*".to_string(),
                        pull: true,
                        push: false,
                    }],
                },
            ],
        }
    }

    /// Reads `path`; if it doesn't exist, writes out defaults and returns them
    /// — mirrors `config.ReadConfig`'s create-on-first-run behavior.
    pub async fn load_or_init(path: &Path) -> Result<Config, RegistryError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let cfg: Config = serde_json::from_slice(&bytes)?;
                cfg.validate()
                    .map_err(|e| RegistryError::BadRequest(e.to_string()))?;
                if cfg.repo.dir.as_os_str().is_empty() {
                    return Err(RegistryError::BadRequest("repo.dir must not be empty".into()));
                }
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Config::with_defaults();
                cfg.write_to(path).await?;
                Ok(cfg)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(path, body).await
    }

    /// External URL host:port clients should use to reach this server,
    /// honoring `X-Forwarded-Port` then the static proxy override, and
    /// omitting the port for the scheme's default (80/http, 443/https) —
    /// mirrors `config.ServerUrl`.
    ///
    /// Scheme is `https` whenever TLS is configured *or* any proxy override
    /// (`X-Forwarded-Port`, or a configured `proxy.host`/`proxy.port`) is in
    /// play, matching the source's `ServerUrl` verbatim (spec.md §4.E, §9
    /// Open Question — kept as specified rather than "corrected", since the
    /// source's own behavior is unambiguous even if its intent is not).
    pub fn external_origin(&self, request_host: &str, forwarded_port: Option<&str>) -> String {
        let has_proxy_override =
            forwarded_port.is_some() || self.proxy.host.is_some() || self.proxy.port.is_some();
        let scheme = if self.server.is_tls() || has_proxy_override {
            "https"
        } else {
            "http"
        };
        let host = request_host.split(':').next().unwrap_or(request_host);

        let port: String = if let Some(p) = forwarded_port {
            p.to_string()
        } else if let Some(proxy_port) = self.proxy.port {
            proxy_port.to_string()
        } else {
            self.server.port.to_string()
        };

        let host = self.proxy.host.as_deref().unwrap_or(host);

        let default_port = if scheme == "https" { "443" } else { "80" };
        if port == default_port {
            format!("{scheme}://{host}")
        } else {
            format!("{scheme}://{host}:{port}")
        }
    }
}
