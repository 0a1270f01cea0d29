use crate::config::ModelConfig;
use crate::providers::OpenAIProvider;
use crate::providers::openai::OPENAI_BASE_URL;
use crate::traits::Provider;
use anyhow::{Result, anyhow};
use std::sync::Arc;

/// Identifies a model backend plus the credential to reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub temperature: f64,
}

impl ModelRef {
    /// Resolves the credential from the environment once, falling back to the
    /// key stored in config. The key may come back empty; callers decide
    /// whether that is fatal.
    pub fn from_config(config: &ModelConfig) -> Self {
        let api_key = resolve_api_key(&config.provider, &config.api_key).unwrap_or_default();
        Self {
            provider: config.provider.clone(),
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            temperature: config.temperature,
        }
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Name of the env var a user should set when the credential is missing.
    pub fn credential_name(&self) -> String {
        preset(&self.provider)
            .and_then(|p| p.env_vars.first())
            .map(|v| v.to_string())
            .unwrap_or_else(|| format!("{}_API_KEY", self.provider.to_uppercase()))
    }
}

struct ProviderPreset {
    names: &'static [&'static str],
    label: &'static str,
    base_url: &'static str,
    env_vars: &'static [&'static str],
}

const PRESETS: &[ProviderPreset] = &[
    ProviderPreset {
        names: &["openai"],
        label: "OpenAI",
        base_url: OPENAI_BASE_URL,
        env_vars: &["OPENAI_API_KEY", "CONDUIT_OPENAI_API_KEY"],
    },
    ProviderPreset {
        names: &["groq"],
        label: "Groq",
        base_url: "https://api.groq.com/openai/v1",
        env_vars: &["GROQ_API_KEY", "CONDUIT_GROQ_API_KEY"],
    },
    ProviderPreset {
        names: &["openrouter"],
        label: "OpenRouter",
        base_url: "https://openrouter.ai/api/v1",
        env_vars: &["OPENROUTER_API_KEY", "CONDUIT_OPENROUTER_API_KEY"],
    },
];

fn preset(name: &str) -> Option<&'static ProviderPreset> {
    let name = name.to_lowercase();
    PRESETS.iter().find(|p| p.names.contains(&name.as_str()))
}

pub fn available_providers() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.names[0]).collect()
}

pub fn create_provider(model: &ModelRef) -> Result<Arc<dyn Provider>> {
    let preset = preset(&model.provider).ok_or_else(|| {
        anyhow!(
            "Unknown provider: {}. Available: {}",
            model.provider,
            available_providers().join(", ")
        )
    })?;

    if !model.has_credential() {
        return Err(anyhow!(
            "No API key found for {}. Set {}",
            preset.label,
            model.credential_name()
        ));
    }

    let base_url = model.base_url.as_deref().unwrap_or(preset.base_url);
    let provider = OpenAIProvider::new(model.api_key.clone())
        .with_base_url(base_url)
        .with_label(preset.label);

    Ok(Arc::new(provider))
}

pub fn resolve_api_key(provider: &str, config_key: &str) -> Result<String> {
    let env_vars = preset(provider).map(|p| p.env_vars).unwrap_or(&[]);
    resolve_api_key_with_fallback(env_vars, config_key)
}

fn resolve_api_key_with_fallback(env_vars: &[&str], config_key: &str) -> Result<String> {
    for var_name in env_vars {
        if let Ok(key) = resolve_api_key_from_env(var_name) {
            return Ok(key);
        }
    }
    if !config_key.trim().is_empty() {
        Ok(config_key.to_string())
    } else {
        Err(anyhow!("No API key found"))
    }
}

fn resolve_api_key_from_env(var_name: &str) -> Result<String> {
    std::env::var(var_name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("Environment variable {} not set", var_name))
}
