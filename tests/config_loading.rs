use std::io::Write;
use std::path::Path;

use devflow_core::config::{AppConfig, ApprovalMode};

fn load(toml_content: &str) -> AppConfig {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");
    AppConfig::load(tmp.path()).expect("load config")
}

#[test]
fn test_load_full_config_from_file() {
    let config = load(
        r#"
[project]
output_dir = "/tmp/devflow-test"

[model]
provider = "openai"
model_id = "gpt-4o-mini"
api_key = "sk-test-key"
max_tokens = 2048
temperature = 0.5

[model.retry]
max_retries = 5

[[fallback_models]]
provider = "ollama"
model_id = "llama3.2"

[engine]
max_step_visits = 0

[approval]
mode = "remote"
gated_steps = ["review_user_stories", "review_code"]
timeout_secs = 600

[gateway]
bind = "0.0.0.0:9999"
token = "test-token"

[checkpoint]
enabled = false
path = "/tmp/devflow-test/runs.db"
"#,
    );

    assert_eq!(config.output_dir(), Path::new("/tmp/devflow-test"));
    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.model.model_id, "gpt-4o-mini");
    assert_eq!(config.model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 2048);

    let retry = config.model.retry.as_ref().expect("retry present");
    assert_eq!(retry.max_retries, 5);
    assert_eq!(retry.initial_backoff_ms, 1000);

    assert_eq!(config.fallback_models.len(), 1);
    assert_eq!(config.fallback_models[0].provider, "ollama");

    assert_eq!(config.engine.max_step_visits, 0);
    assert_eq!(config.approval.mode, ApprovalMode::Remote);
    assert_eq!(config.approval.gated_steps.len(), 2);
    assert_eq!(
        config.approval.timeout(),
        Some(std::time::Duration::from_secs(600))
    );

    assert_eq!(config.gateway.bind, "0.0.0.0:9999");
    assert_eq!(config.gateway.resolved_token(), Some("test-token"));

    assert!(!config.checkpoint.enabled);
    assert_eq!(config.checkpoint_path(), Path::new("/tmp/devflow-test/runs.db"));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("DEVFLOW_TEST_API_KEY", "expanded-key-value");

    let config = load(
        r#"
[model]
model_id = "test-model"
api_key = "${DEVFLOW_TEST_API_KEY}"
"#,
    );
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("DEVFLOW_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let config = load(
        r#"
[model]
model_id = "llama3.2"
"#,
    );

    assert_eq!(config.model.provider, "groq");
    assert_eq!(config.output_dir(), Path::new("output"));
    assert_eq!(config.engine.max_step_visits, 5);
    assert_eq!(config.approval.mode, ApprovalMode::Auto);
    assert_eq!(config.approval.gated_steps, vec!["review_user_stories"]);
    assert_eq!(config.approval.timeout(), None);
    assert_eq!(config.gateway.bind, "127.0.0.1:18790");
    assert_eq!(config.gateway.resolved_token(), None);
    assert!(config.checkpoint.enabled);
    assert_eq!(config.checkpoint_path(), Path::new("output/checkpoints.db"));
    assert!(config.fallback_models.is_empty());
}

#[test]
fn test_unknown_approval_mode_is_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[approval]\nmode = \"sometimes\"\n")
        .expect("write toml");
    assert!(AppConfig::load(tmp.path()).is_err());
}

#[test]
fn test_example_config_parses() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("devflow.toml.example");
    let config = AppConfig::load(&path).expect("load example config");
    assert_eq!(config.model.model_id, "llama3-8b-8192");
    assert_eq!(config.approval.mode, ApprovalMode::Auto);
    assert!(config.model.retry.is_some());
}
