use reel_app::config::load_config;
use reel_app::startup::{StartupError, StartupSequence};
use reel_db::{Catalog, MigrationError};

#[tokio::test]
async fn config_file_drives_startup() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let db_path = dir.path().join("data").join("library.db");
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "[database]\npath = {:?}\npool_max_size = 2\n\n[logging]\nlevel = \"debug\"\n",
            db_path.to_string_lossy()
        ),
    )
    .expect("failed to write config");

    let config = load_config(config_path.to_str()).expect("failed to load config");
    assert_eq!(config.database.pool_max_size, 2);

    let prepared = StartupSequence::new(&config.database)
        .run()
        .await
        .expect("startup should succeed");

    assert!(db_path.exists());
    assert_eq!(prepared.summary.count, Catalog::embedded().len());
}

#[tokio::test]
async fn tampered_history_aborts_startup() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let mut config = load_config(None).expect("defaults should load");
    config.database.path = dir
        .path()
        .join("library.db")
        .to_string_lossy()
        .into_owned();

    let prepared = StartupSequence::new(&config.database)
        .run()
        .await
        .expect("first startup should succeed");
    prepared
        .db
        .connection()
        .expect("failed to get connection")
        .execute(
            "UPDATE schema_migrations SET checksum = 'edited' WHERE version = 1",
            [],
        )
        .expect("failed to tamper");
    prepared.db.close();

    let err = StartupSequence::new(&config.database)
        .run()
        .await
        .expect_err("tampering should abort startup");

    assert!(
        matches!(
            err,
            StartupError::Migration(MigrationError::ChecksumMismatch { version: 1, .. })
        ),
        "got {err:?}"
    );
}
