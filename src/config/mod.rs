//! Runtime configuration read from the process environment.
//!
//! Values come from real environment variables first and from a `.env` file
//! in the working directory second. Only `GEMINI_API_KEY` is required; its
//! absence is the one fatal startup condition ([`ConfigError::MissingApiKey`]).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const MODEL_VAR: &str = "GEMINI_MODEL";
pub const BASE_URL_VAR: &str = "GEMINI_BASE_URL";
pub const BIND_ADDR_VAR: &str = "CHAT_BIND_ADDR";
pub const REQUEST_TIMEOUT_VAR: &str = "CHAT_REQUEST_TIMEOUT_SECS";
pub const SESSION_IDLE_VAR: &str = "CHAT_SESSION_IDLE_SECS";

pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8501";
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(60 * 60);

/// Configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key not found. Please check your .env file or set the environment variable.")]
    MissingApiKey,

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read {path}: {source}")]
    DotEnv {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Layered variable lookup: process environment, then `.env` entries.
///
/// Loading never writes to the process environment.
///
/// # Examples
///
/// ```
/// use wellbeing_chat::config::{Env, GeminiConfig};
///
/// let env = Env::from_pairs([("GEMINI_API_KEY", "k"), ("GEMINI_MODEL", "gemini-1.5-flash")]);
/// let gemini = GeminiConfig::from_env(&env).unwrap();
/// assert_eq!(gemini.model, "gemini-1.5-flash");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Env {
    process: bool,
    dotenv: HashMap<String, String>,
}

impl Env {
    /// Reads `./.env` if it exists and layers it under the process environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DotEnv`] if `.env` exists but cannot be read.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(".env"))
    }

    /// Like [`load`](Self::load) with an explicit `.env` path. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let dotenv = match std::fs::read_to_string(path) {
            Ok(contents) => parse_dotenv(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(ConfigError::DotEnv {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        Ok(Self {
            process: true,
            dotenv,
        })
    }

    /// An environment made only of the given pairs; the process environment is ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            process: false,
            dotenv: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the non-empty value of `key`, if any.
    ///
    /// Surrounding whitespace is trimmed; a blank value counts as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        let from_process = self
            .process
            .then(|| std::env::var(key).ok())
            .flatten();
        from_process
            .or_else(|| self.dotenv.get(key).cloned())
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    }

    fn get_secs(&self, var: &'static str) -> Result<Option<Duration>, ConfigError> {
        let Some(value) = self.get(var) else {
            return Ok(None);
        };
        value
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|e| ConfigError::Invalid {
                var,
                value,
                reason: e.to_string(),
            })
    }
}

/// Parses the contents of a `.env` file.
///
/// The accepted syntax is the usual shell-like subset:
///
/// - `KEY=value`, optionally prefixed with `export `.
/// - Blank lines and lines starting with `#` are skipped.
/// - Unquoted values end at a `#` that starts a word (an inline comment).
/// - `'single quoted'` values are taken literally.
/// - `"double quoted"` values understand `\n`, `\t`, `\r`, `\"` and `\\`,
///   and may span several lines.
///
/// Lines without `=` are ignored.
///
/// # Examples
///
/// ```
/// use wellbeing_chat::config::parse_dotenv;
///
/// let vars = parse_dotenv("GEMINI_MODEL=gemini-1.5-pro  # default\n");
/// assert_eq!(vars["GEMINI_MODEL"], "gemini-1.5-pro");
/// ```
pub fn parse_dotenv(contents: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    let mut lines = contents.lines();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };

        let raw = raw.trim_start();
        let value = if let Some(rest) = raw.strip_prefix('"') {
            double_quoted(rest, &mut lines)
        } else if let Some(rest) = raw.strip_prefix('\'') {
            rest.split_once('\'').map_or(rest, |(v, _)| v).to_owned()
        } else {
            strip_inline_comment(raw).trim_end().to_owned()
        };
        vars.insert(key.trim().to_owned(), value);
    }
    vars
}

fn strip_inline_comment(raw: &str) -> &str {
    raw.char_indices()
        .find(|&(i, c)| c == '#' && (i == 0 || raw[..i].ends_with(char::is_whitespace)))
        .map_or(raw, |(i, _)| &raw[..i])
}

// Reads a double-quoted value starting after the opening quote, pulling
// further lines until the closing quote.
fn double_quoted<'a>(first: &'a str, rest: &mut std::str::Lines<'a>) -> String {
    let mut out = String::new();
    let mut chunk = first;
    loop {
        let mut chars = chunk.chars();
        while let Some(c) = chars.next() {
            match c {
                '"' => return out,
                '\\' => match chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                },
                c => out.push(c),
            }
        }
        match rest.next() {
            Some(next) => {
                out.push('\n');
                chunk = next;
            }
            // Unterminated: keep what was read.
            None => return out,
        }
    }
}

/// Settings for the HTTP listener and session lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub session_idle: Duration,
}

impl ServerConfig {
    /// Reads `CHAT_BIND_ADDR` and `CHAT_SESSION_IDLE_SECS`, falling back to
    /// [`DEFAULT_BIND_ADDR`] and [`DEFAULT_SESSION_IDLE`].
    ///
    /// The bind address is not resolved here; a bad one surfaces when the
    /// server binds.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the idle lifetime is not a whole number of
    /// seconds or is zero.
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let session_idle = match env.get_secs(SESSION_IDLE_VAR)? {
            Some(d) if d.is_zero() => {
                return Err(ConfigError::Invalid {
                    var: SESSION_IDLE_VAR,
                    value: "0".to_owned(),
                    reason: "must be at least one second".to_owned(),
                });
            }
            Some(d) => d,
            None => DEFAULT_SESSION_IDLE,
        };
        Ok(Self {
            bind_addr: env
                .get(BIND_ADDR_VAR)
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned()),
            session_idle,
        })
    }
}

/// Settings for the Gemini client. Holding one proves the API key is present.
#[derive(Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// `None` waits for the provider indefinitely.
    pub request_timeout: Option<Duration>,
}

impl GeminiConfig {
    /// Reads the Gemini settings.
    ///
    /// `GEMINI_MODEL` and `GEMINI_BASE_URL` fall back to [`DEFAULT_MODEL`] and
    /// [`DEFAULT_BASE_URL`]. A `CHAT_REQUEST_TIMEOUT_SECS` of `0` means no
    /// timeout, as does leaving it unset.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingApiKey`] if `GEMINI_API_KEY` is unset or blank.
    ///   This is the startup guard's fatal condition.
    /// - [`ConfigError::Invalid`] if the timeout is not a whole number.
    pub fn from_env(env: &Env) -> Result<Self, ConfigError> {
        let api_key = env.get(API_KEY_VAR).ok_or(ConfigError::MissingApiKey)?;
        let request_timeout = env.get_secs(REQUEST_TIMEOUT_VAR)?.filter(|d| !d.is_zero());
        Ok(Self {
            api_key,
            model: env
                .get(MODEL_VAR)
                .unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            base_url: env
                .get(BASE_URL_VAR)
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned()),
            request_timeout,
        })
    }
}

// Keeps the key out of logs.
impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
