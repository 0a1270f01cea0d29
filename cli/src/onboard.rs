use anyhow::{Context, Result};
use conduit_core::config::{Config, ModelConfig, get_config_path};
use conduit_core::available_providers;
use console::style;
use dialoguer::{Confirm, Input, Select};

const BANNER: &str = r"
    -------------------------------------
      c o n d u i t
      tool-augmented agents in your shell
    -------------------------------------
";

fn print_step(step: usize, total: usize, title: &str) {
    println!();
    println!(
        "{}",
        style(format!("[{}/{}] {}", step, total, title))
            .cyan()
            .bold()
    );
    println!();
}

fn models_for(provider: &str) -> &'static [&'static str] {
    match provider {
        "groq" => &["llama-3.3-70b-versatile", "qwen-2.5-32b", "llama-3.1-8b-instant"],
        "openrouter" => &["openai/gpt-4o", "anthropic/claude-3.5-sonnet", "meta-llama/llama-3.3-70b-instruct"],
        _ => &["gpt-4o", "gpt-4o-mini", "gpt-5", "gpt-5-mini"],
    }
}

fn setup_provider() -> Result<String> {
    let providers = available_providers();

    let selection = Select::new()
        .with_prompt("Select your model provider")
        .items(&providers)
        .default(0)
        .interact()
        .context("Failed to select provider")?;

    Ok(providers[selection].to_string())
}

fn setup_api_key(provider: &str) -> Result<String> {
    let env_name = format!("{}_API_KEY", provider.to_uppercase());
    let store = Confirm::new()
        .with_prompt(format!(
            "Store an API key in the config file? (otherwise {} is read from the environment)",
            env_name
        ))
        .default(false)
        .interact()
        .context("Failed to read answer")?;

    if !store {
        return Ok(String::new());
    }

    let api_key: String = Input::new()
        .with_prompt(format!("Enter your {} API key", provider))
        .interact_text()
        .context("Failed to read API key")?;

    if api_key.trim().is_empty() {
        return Err(anyhow::anyhow!("API key cannot be empty"));
    }

    Ok(api_key.trim().to_string())
}

fn setup_model(provider: &str) -> Result<String> {
    let models = models_for(provider);

    let selection = Select::new()
        .with_prompt("Select your model")
        .items(models)
        .default(0)
        .interact()
        .context("Failed to select model")?;

    Ok(models[selection].to_string())
}

pub fn run_onboard(existing: Config) -> Result<Config> {
    println!("{}", style(BANNER).cyan().bold());

    println!("  {}", style("Welcome to Conduit!").white().bold());
    println!(
        "  {}",
        style("This wizard will configure your agent in under 30 seconds.").dim()
    );

    print_step(1, 3, "Provider");
    let provider = setup_provider()?;

    print_step(2, 3, "API Key");
    let api_key = setup_api_key(&provider)?;

    print_step(3, 3, "Model Selection");
    let model = setup_model(&provider)?;

    let config = Config {
        model: ModelConfig {
            provider,
            model,
            api_key,
            ..existing.model.clone()
        },
        ..existing
    };

    println!();
    println!("  {} Configuration complete!", style("✓").green().bold());
    println!(
        "  {} Config saved to {}",
        style("→").green(),
        style(get_config_path().display()).cyan()
    );
    println!();
    println!(
        "  {} You can now run: {}",
        style("→").green(),
        style("conduit chat").cyan().bold()
    );
    println!();

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_provider_offers_models() {
        for provider in available_providers() {
            assert!(!models_for(provider).is_empty());
        }
        assert_eq!(models_for("openai")[0], "gpt-4o");
    }
}
