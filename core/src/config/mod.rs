use crate::traits::TransportSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const CONDUIT_DIR: &str = ".conduit";

pub const DEFAULT_EXIT_KEYWORDS: &[&str] = &["exit", "quit"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub temperature: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key: String::new(),
            base_url: None,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub max_history: usize,
    pub markdown: bool,
    pub add_datetime: bool,
    pub show_tool_calls: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_history: 40,
            markdown: true,
            add_datetime: true,
            show_tool_calls: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub exit_keywords: Vec<String>,
    pub startup_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            exit_keywords: DEFAULT_EXIT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            startup_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    pub enabled: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// A user-defined MCP server entry under `[servers.<name>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub required_env: Vec<String>,
    pub instructions: Vec<String>,
}

impl ServerConfig {
    /// Required variables not set in `env` are taken from the process
    /// environment.
    pub fn to_transport_spec(&self, name: &str) -> TransportSpec {
        self.resolve_transport_spec(name, |key| std::env::var(key).ok())
    }

    pub fn resolve_transport_spec(
        &self,
        name: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> TransportSpec {
        let mut env = self.env.clone();
        for key in &self.required_env {
            let configured = env.get(key).is_some_and(|value| !value.trim().is_empty());
            if !configured && let Some(value) = lookup(key) {
                env.insert(key.clone(), value);
            }
        }

        TransportSpec {
            name: name.to_string(),
            command: self.command.clone(),
            args: self.args.clone(),
            env,
            required_env: self.required_env.clone(),
            workdir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub agent: AgentConfig,
    pub session: SessionSettings,
    pub stream: StreamConfig,
    pub servers: BTreeMap<String, ServerConfig>,
    #[serde(skip)]
    pub workspace_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            model: ModelConfig::default(),
            agent: AgentConfig::default(),
            session: SessionSettings::default(),
            stream: StreamConfig::default(),
            servers: BTreeMap::new(),
            workspace_dir: get_conduit_dir().join("workspace"),
        }
    }
}

pub fn get_conduit_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(CONDUIT_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_conduit_dir().join("config.toml")
}

pub fn ensure_conduit_dir() -> Result<PathBuf> {
    let conduit_dir = get_conduit_dir();

    if !conduit_dir.exists() {
        std::fs::create_dir_all(&conduit_dir).with_context(|| {
            format!(
                "Failed to create conduit directory at {}",
                conduit_dir.display()
            )
        })?;
    }

    Ok(conduit_dir)
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        if config_exists() {
            load_config()
        } else {
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.workspace_dir = get_conduit_dir().join("workspace");
        Ok(config)
    }
}

pub fn load_config() -> Result<Config> {
    let config_path = get_config_path();

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::anyhow!(
                "Config file not found. Run 'conduit onboard' to set up your configuration."
            )
        } else {
            anyhow::anyhow!("Failed to read config from {}: {}", config_path.display(), e)
        }
    })?;

    Config::from_toml(&content)
        .with_context(|| format!("Failed to parse config from {}", config_path.display()))
}

pub fn save_config(config: &Config) -> Result<()> {
    ensure_conduit_dir()?;

    let config_path = get_config_path();
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    Ok(())
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}
