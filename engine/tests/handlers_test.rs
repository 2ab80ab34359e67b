//! Integration tests for command handlers
//!
//! Runs handlers against a config in a temporary directory with every live
//! event source disabled, so no request leaves the machine.

use concierge_engine::config::Config;
use concierge_engine::handlers::{handle_ask, AlreadyReported, OutputFormat};
use std::path::Path;

fn offline_config(data_dir: &Path) -> Config {
    let toml = format!(
        r#"
[core]
log_level = "info"
data_dir = "{}"

[llm]
api_key_env = "CONCIERGE_HANDLERS_TEST_KEY"

[events.ticketmaster]
base_url = "http://127.0.0.1:9"
api_key_env = "CONCIERGE_HANDLERS_TEST_UNSET_TM"

[events.eventbrite]
base_url = "http://127.0.0.1:9"
api_key_env = "CONCIERGE_HANDLERS_TEST_UNSET_EB"

[events.google_places]
base_url = "http://127.0.0.1:9"
api_key_env = "CONCIERGE_HANDLERS_TEST_UNSET_PLACES"
"#,
        data_dir.display()
    );
    Config::from_toml_str(&toml).unwrap()
}

#[tokio::test]
async fn test_failed_ask_is_reported_once() {
    std::env::set_var("CONCIERGE_HANDLERS_TEST_KEY", "test-key");
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(&dir.path().join("data"));

    let err = handle_ask("   ".to_string(), &config, OutputFormat::Json)
        .await
        .unwrap_err();

    // The handler already printed the error; main only sets the exit code
    assert!(err.is::<AlreadyReported>());
    assert!(!config.memory_path().exists());
}

#[tokio::test]
async fn test_setup_failure_is_left_for_main() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = offline_config(&dir.path().join("data"));
    config.llm.api_key_env = "CONCIERGE_HANDLERS_TEST_UNSET_KEY".to_string();

    let err = handle_ask("jazz tonight".to_string(), &config, OutputFormat::Text)
        .await
        .unwrap_err();

    assert!(!err.is::<AlreadyReported>());
    assert!(format!("{:?}", err).contains("CONCIERGE_HANDLERS_TEST_UNSET_KEY"));
}
