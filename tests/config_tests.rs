use anyhow::Result;
use atlas::config::{Config, LlmProvider};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

/// Helper to clear all API key environment variables
fn clear_api_env_vars() {
    std::env::remove_var("OPENAI_API_KEY");
}

#[test]
#[serial]
fn test_config_default() {
    clear_api_env_vars();

    let config = Config::default();

    // Without a key in the environment, defaults to a local Ollama model
    assert_eq!(config.llm.provider, LlmProvider::Ollama);
    assert_eq!(config.llm.model, "llama3.1");
    assert_eq!(config.llm.max_tokens, 1024);
    assert!(config.llm.api_key.is_none());

    assert!(config.planning.use_llm_assessment);
    assert_eq!(config.planning.max_goal_chars, 2000);
    assert_eq!(config.planning.max_response_chars, 16000);
    assert_eq!(config.planning.max_attempts_per_parent, 3);

    assert!(!config.email.gmail_api);
    assert!(config.email.browser_automation);
    assert!(!config.email.apple_mail);
    assert!(config.email.preferred.is_none());

    assert!(config.tools.extra.is_empty());
}

#[test]
#[serial]
fn test_config_default_detects_openai_key() {
    std::env::set_var("OPENAI_API_KEY", "sk-test");
    let config = Config::default();
    clear_api_env_vars();

    assert_eq!(config.llm.provider, LlmProvider::OpenAI);
    assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.llm.model, "gpt-4o-mini");
}

#[test]
#[serial]
fn test_config_serialization() -> Result<()> {
    clear_api_env_vars();
    let config = Config::default();

    let toml_str = toml::to_string_pretty(&config)?;
    assert!(toml_str.contains("[llm]"));
    assert!(toml_str.contains("[planning]"));
    assert!(toml_str.contains("[email]"));

    let deserialized: Config = toml::from_str(&toml_str)?;
    assert_eq!(config.llm.provider, deserialized.llm.provider);
    assert_eq!(config.llm.model, deserialized.llm.model);
    assert_eq!(
        config.planning.max_attempts_per_parent,
        deserialized.planning.max_attempts_per_parent
    );

    Ok(())
}

#[test]
#[serial]
fn test_config_save_and_load() -> Result<()> {
    clear_api_env_vars();
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("atlas").join("config.toml");

    let mut config = Config::default();
    config.llm.provider = LlmProvider::OpenAIGeneric;
    config.llm.base_url = Some("http://localhost:8080/v1".to_string());
    config.llm.model = "mistral".to_string();
    config.planning.max_attempts_per_parent = 5;
    config.email.gmail_api = true;
    config.email.preferred = Some("gmail_api".to_string());

    config.save_to(&config_path)?;
    assert!(config_path.exists());

    let contents = fs::read_to_string(&config_path)?;
    assert!(contents.contains("openai-generic"));

    let loaded = Config::load_from(&config_path)?;
    assert_eq!(loaded.llm.provider, LlmProvider::OpenAIGeneric);
    assert_eq!(loaded.llm.base_url.as_deref(), Some("http://localhost:8080/v1"));
    assert_eq!(loaded.llm.model, "mistral");
    assert_eq!(loaded.planning.max_attempts_per_parent, 5);
    assert!(loaded.email.gmail_api);
    assert_eq!(loaded.email.preferred.as_deref(), Some("gmail_api"));

    Ok(())
}

#[test]
#[serial]
fn test_config_load_missing_file_is_default() -> Result<()> {
    clear_api_env_vars();
    let temp_dir = TempDir::new()?;
    let config = Config::load_from(&temp_dir.path().join("missing.toml"))?;
    assert_eq!(config.llm.provider, LlmProvider::Ollama);
    assert_eq!(config.planning.max_goal_chars, 2000);
    Ok(())
}

#[test]
#[serial]
fn test_partial_config_uses_defaults() -> Result<()> {
    clear_api_env_vars();
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
[planning]
use_llm_assessment = false

[[tools.extra]]
name = "slack_tool"
category = "chat"
keywords = ["slack", "channel"]
plugin = "slack"
"#,
    )?;

    let config = Config::load_from(&config_path)?;
    assert!(!config.planning.use_llm_assessment);
    assert_eq!(config.planning.max_attempts_per_parent, 3);
    assert_eq!(config.llm.model, "llama3.1");

    let extra = &config.tools.extra[0];
    assert_eq!(extra.name, "slack_tool");
    assert_eq!(extra.priority, 5);
    assert!(extra.keywords.contains("channel"));
    assert_eq!(extra.plugin.as_deref(), Some("slack"));

    Ok(())
}

#[test]
fn test_invalid_config_is_an_error() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[llm]\nprovider = \"carrier-pigeon\"\n")?;

    let err = Config::load_from(&config_path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
    Ok(())
}
