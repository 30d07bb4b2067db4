//! Agent configuration
//!
//! Everything needed to reach one model endpoint, loaded from the environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";
pub const DEFAULT_MAX_ROUNDS: u32 = 5000;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant working in the user's \
current directory. You can read files, list directories, run shell commands, find files by \
glob pattern and search file contents. Use the tools to inspect things before answering; \
keep answers short and concrete.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
    #[error("Could not determine home directory; set PODAGENT_HOME")]
    NoHome,
}

/// Which wire shape the model endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolFlavor {
    /// `chat/completions`: `messages[]` in, `choices[0].message` out
    #[default]
    Chat,
    /// `responses`: `input[]` in, typed `output[]` items out
    Responses,
}

impl fmt::Display for ProtocolFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolFlavor::Chat => write!(f, "chat"),
            ProtocolFlavor::Responses => write!(f, "responses"),
        }
    }
}

impl FromStr for ProtocolFlavor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" | "completions" => Ok(ProtocolFlavor::Chat),
            "responses" => Ok(ProtocolFlavor::Responses),
            other => Err(ConfigError::Invalid {
                name: "PODAGENT_PROTOCOL",
                value: other.to_string(),
            }),
        }
    }
}

/// Immutable configuration for one Agent.
///
/// Serialized into the session header; the API key never is, so a resumed
/// session picks up whatever credential the current process supplies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub base_url: String,
    pub model: String,
    pub protocol: ProtocolFlavor,
    #[serde(skip)]
    pub api_key: Option<String>,
    pub system_prompt: String,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ROUNDS
}

impl AgentConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, protocol: ProtocolFlavor) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            protocol,
            api_key: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_output_tokens: None,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env)
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let model = get("PODAGENT_MODEL").ok_or(ConfigError::Missing("PODAGENT_MODEL"))?;
        let protocol = get("PODAGENT_PROTOCOL")
            .map(|p| p.parse())
            .transpose()?
            .unwrap_or_default();

        let mut config = Self::new(
            get("PODAGENT_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            protocol,
        );
        config.api_key = api_key_from(&get);
        if let Some(prompt) = get("PODAGENT_SYSTEM_PROMPT") {
            config.system_prompt = prompt;
        }
        if let Some(rounds) = get("PODAGENT_MAX_ROUNDS") {
            config.max_rounds = parse_number("PODAGENT_MAX_ROUNDS", &rounds)?;
        }
        if let Some(tokens) = get("PODAGENT_MAX_OUTPUT_TOKENS") {
            config.max_output_tokens = Some(parse_number("PODAGENT_MAX_OUTPUT_TOKENS", &tokens)?);
        }
        Ok(config)
    }

    /// Substitute credentials, e.g. when resuming a stored session
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

/// Credential for the endpoint. The only setting read from the environment
/// when resuming, since the session header carries the rest.
pub fn api_key_from_env() -> Option<String> {
    api_key_from(env)
}

fn api_key_from(get: impl Fn(&str) -> Option<String>) -> Option<String> {
    get("PODAGENT_API_KEY").or_else(|| get("OPENAI_API_KEY"))
}

/// Per-user state directory holding session logs
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = env("PODAGENT_HOME") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".podagent"))
        .ok_or(ConfigError::NoHome)
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_number(name: &'static str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!("chat".parse::<ProtocolFlavor>().unwrap(), ProtocolFlavor::Chat);
        assert_eq!(
            " Responses ".parse::<ProtocolFlavor>().unwrap(),
            ProtocolFlavor::Responses
        );
        assert!("grpc".parse::<ProtocolFlavor>().is_err());
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = AgentConfig::new("http://x/v1", "m", ProtocolFlavor::Responses)
            .with_api_key(Some("secret".to_string()));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"protocol\":\"responses\""));

        let restored: AgentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.api_key, None);
        assert_eq!(restored.model, "m");
        assert_eq!(restored.max_rounds, DEFAULT_MAX_ROUNDS);
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value).to_string())
        }
    }

    #[test]
    fn test_from_lookup() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("PODAGENT_MODEL", "qwen"),
            ("PODAGENT_PROTOCOL", "responses"),
            ("OPENAI_API_KEY", "sk-fallback"),
            ("PODAGENT_MAX_ROUNDS", "7"),
        ]))
        .unwrap();
        assert_eq!(config.model, "qwen");
        assert_eq!(config.protocol, ProtocolFlavor::Responses);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api_key.as_deref(), Some("sk-fallback"));
        assert_eq!(config.max_rounds, 7);
    }

    #[test]
    fn test_model_required_for_new_sessions_only() {
        let vars = [("PODAGENT_API_KEY", "sk-primary"), ("OPENAI_API_KEY", "sk-other")];
        assert!(matches!(
            AgentConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Missing("PODAGENT_MODEL"))
        ));
        // Resuming needs nothing but the credential
        assert_eq!(api_key_from(lookup(&vars)).as_deref(), Some("sk-primary"));
        assert_eq!(api_key_from(lookup(&[])), None);
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        assert!(parse_number("X", "12").is_ok());
        assert!(parse_number("X", "twelve").is_err());
    }
}
