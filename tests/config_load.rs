//! Integration test: configuration loading, fallbacks and validation.

use std::path::Path;

use aideck::config::Config;
use tempfile::TempDir;

#[tokio::test]
async fn template_parses_and_validates() {
    let home = TempDir::new().unwrap();
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates/config.yaml");
    let cfg = Config::load_with_home(&path, home.path()).await.unwrap();

    assert_eq!(cfg.model.provider, "openai");
    assert_eq!(cfg.model.model, "gpt-4");
    assert_eq!(cfg.model.max_tokens, Some(1000));
    assert_eq!(cfg.agent.tool_timeout_secs, 30);
    assert!(cfg.agent.system_prompt.as_deref().unwrap().contains("AIDeck"));
    assert_eq!(
        Path::new(&cfg.storage.database),
        home.path().join("aideck.db")
    );
    assert_eq!(
        Path::new(&cfg.activity.data_dir),
        home.path().join("activity")
    );
}

#[tokio::test]
async fn partial_file_keeps_other_defaults() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("config.yaml");
    std::fs::write(
        &path,
        "model:\n  provider: stub\nstorage:\n  database: \":memory:\"\n",
    )
    .unwrap();

    let cfg = Config::load_with_home(&path, home.path()).await.unwrap();
    assert_eq!(cfg.model.provider, "stub");
    assert_eq!(cfg.model.temperature, 0.7);
    assert_eq!(cfg.storage.database, ":memory:");
    assert_eq!(cfg.activity.slice_seconds, 10);
    assert_eq!(cfg.logging.level, "info");
}

#[tokio::test]
async fn missing_file_falls_back_to_bak_then_defaults() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("config.yaml");

    let cfg = Config::load_with_home(&path, home.path()).await.unwrap();
    let mut expected = Config::default();
    expected.resolve_paths(home.path());
    assert_eq!(cfg, expected);

    std::fs::write(
        home.path().join("config.yaml.bak"),
        "agent:\n  name: From Backup\n",
    )
    .unwrap();
    let cfg = Config::load_with_home(&path, home.path()).await.unwrap();
    assert_eq!(cfg.agent.name, "From Backup");
}

#[tokio::test]
async fn invalid_values_are_rejected() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("config.yaml");

    for (yaml, needle) in [
        ("activity:\n  slice_seconds: 0\n", "slice_seconds"),
        ("activity:\n  slice_seconds: 18446744073709551615\n", "exceeds one day"),
        ("agent:\n  tool_timeout_secs: 0\n", "tool_timeout_secs"),
        ("model:\n  temperature: 3.5\n", "temperature"),
        ("model:\n  max_retries: 0\n", "max_retries"),
        ("model:\n  model: \"  \"\n", "model.model"),
    ] {
        std::fs::write(&path, yaml).unwrap();
        let err = Config::load_with_home(&path, home.path()).await.unwrap_err();
        assert!(
            err.to_string().contains(needle),
            "expected {needle:?} in {err:#}"
        );
    }

    std::fs::write(&path, "channels:\n  discord: {}\n").unwrap();
    assert!(Config::load_with_home(&path, home.path()).await.is_err());
}

#[tokio::test]
async fn save_then_load_round_trips() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("nested/config.yaml");

    let mut cfg = Config::default();
    cfg.model.provider = "stub".into();
    cfg.agent.system_prompt = Some("Be brief.".into());
    cfg.logging.file = Some("/var/log/aideck.jsonl".into());
    cfg.resolve_paths(home.path());
    cfg.save(&path).await.unwrap();

    let loaded = Config::load_with_home(&path, home.path()).await.unwrap();
    assert_eq!(loaded, cfg);
}
