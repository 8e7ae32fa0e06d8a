//! Integration tests for configuration, setup and connection lifecycle.
//!
//! Everything here runs offline: extensions are limited to the ones built
//! into the bundled engine, and attachments point at local files.

use std::sync::Arc;

use ducklake::driver::{
    Config, Connection, ConnectionState, DriverError, Options, Param, Pool, Stage, pipeline,
};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_from_toml(source: &str) -> Config {
    let options: Options = toml::from_str(source).expect("Failed to parse options");
    Config::from_options(options).expect("Failed to validate options")
}

/// Create a database file holding one table, and return its path.
fn seed_database(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("other.duckdb");
    let path = path.to_str().expect("temp path is not UTF-8").to_string();

    let config = Config::builder().path(&path).build().unwrap();
    let mut conn = Connection::connect(Arc::new(config)).unwrap();
    conn.execute("CREATE TABLE readings (sensor VARCHAR, value DOUBLE)", &[])
        .unwrap();
    conn.execute(
        "INSERT INTO readings VALUES ('a', 1.5), ('b', 2.5)",
        &[],
    )
    .unwrap();
    conn.disconnect();

    path
}

/// Test the lakehouse example config end to end without opening anything
#[test]
fn test_lakehouse_config_from_toml() {
    let config = config_from_toml(
        r#"
        path = "ducklake:/var/lib/lake/metadata.ducklake"
        data_path = "s3://analytics/lake/"
        pool_size = 3
        extensions = ["httpfs", { name = "spatial", source = "core", install = false }]

        [[secrets]]
        name = "lake_s3"
        type = "s3"
        key_id = "AKIA"
        secret = "it's secret"
        region = "eu-west-1"
        endpoint = "minio.local:9000"
        use_ssl = false
        url_style = "path"
        scope = "s3://analytics"

        [[attach]]
        path = "postgres:dbname=crm"
        alias = "crm"
        type = "postgres"
        read_only = true
        "#,
    );

    assert_eq!(config.pool_size, 3);

    let sql: Vec<String> = pipeline::plan(&config)
        .unwrap()
        .into_iter()
        .map(|step| step.sql)
        .collect();
    assert_eq!(
        sql,
        [
            "INSTALL httpfs",
            "LOAD httpfs",
            "LOAD spatial",
            "INSTALL ducklake",
            "LOAD ducklake",
            "CREATE SECRET lake_s3 (TYPE S3, KEY_ID 'AKIA', SECRET 'it''s secret', \
             REGION 'eu-west-1', ENDPOINT 'minio.local:9000', USE_SSL false, \
             URL_STYLE 'path', SCOPE 's3://analytics')",
            "ATTACH 'postgres:dbname=crm' AS crm (TYPE postgres, READ_ONLY)",
            "ATTACH 'ducklake:/var/lib/lake/metadata.ducklake' AS metadata \
             (DATA_PATH 's3://analytics/lake/')",
        ]
    );
}

/// Test that a secret missing a required field is rejected at parse time
#[test]
fn test_incomplete_secret_fails_fast() {
    let options: Options = toml::from_str(
        r#"
        [[secrets]]
        name = "r2"
        type = "r2"
        key_id = "k"
        secret = "s"
        "#,
    )
    .unwrap();

    let err = Config::from_options(options).unwrap_err();
    assert!(matches!(err, DriverError::Config(_)));
    assert!(err.to_string().contains("account_id"));
}

/// Test that attachments are usable once the connection is established
#[test]
fn test_attach_local_database() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let other = seed_database(&dir);

    let config = config_from_toml(&format!(
        r#"
        extensions = [{{ name = "parquet", install = false }}]

        [[attach]]
        path = "{}"
        alias = "other"
        read_only = true
        "#,
        other.replace('\\', "\\\\")
    ));

    let mut conn = Connection::connect(Arc::new(config)).unwrap();
    let output = conn
        .execute(
            "SELECT sensor, value FROM other.readings WHERE value > $1::DOUBLE ORDER BY sensor",
            &[Param::Float(2.0)],
        )
        .unwrap();
    assert_eq!(output.rows(), [vec![json!("b"), json!(2.5)]]);

    // Read-only attachments reject writes.
    assert!(
        conn.execute("INSERT INTO other.readings VALUES ('c', 3.0)", &[])
            .is_err()
    );
}

/// Test that a failing setup step is tagged with its stage and component
#[test]
fn test_initialization_failure_is_tagged() {
    init_tracing();
    let config = config_from_toml(
        r#"
        extensions = [{ name = "not_a_real_extension", install = false }]
        "#,
    );

    let err = Connection::connect(Arc::new(config)).unwrap_err();
    match err {
        DriverError::Initialization {
            stage, component, ..
        } => {
            assert_eq!(stage, Stage::ExtensionLoad);
            assert_eq!(component, "not_a_real_extension");
        }
        other => panic!("expected an initialization error, got {:?}", other),
    }
}

/// Test that a missing attachment fails at the attach stage
#[test]
fn test_attach_failure_is_tagged() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing").join("nowhere.duckdb");
    let config = Config::builder()
        .attach(
            ducklake::sql::Attachment::new(missing.to_str().unwrap(), "ghost").read_only(),
        )
        .build()
        .unwrap();

    let err = Connection::connect(Arc::new(config)).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Attach));
    assert!(err.to_string().starts_with("initialization failed at attach for ghost"));
}

/// Test the transaction lifecycle on a pooled connection
#[tokio::test]
async fn test_pooled_transaction_lifecycle() {
    init_tracing();
    let pool = Pool::new(Config::in_memory()).await.unwrap();
    let mut conn = pool.get().await.unwrap();

    conn.execute("CREATE TABLE ledger (amount INTEGER)", vec![])
        .await
        .unwrap();

    conn.begin().await.unwrap();
    let err = conn.begin().await.unwrap_err();
    assert!(err.is_protocol_misuse());
    assert_eq!(conn.status().unwrap(), ConnectionState::InTransaction);

    conn.execute("INSERT INTO ledger VALUES ($1)", vec![Param::Int(10)])
        .await
        .unwrap();
    assert!(conn.execute("INSERT INTO nowhere VALUES (1)", vec![]).await.is_err());
    assert_eq!(conn.status().unwrap(), ConnectionState::Errored);

    conn.rollback().await.unwrap();
    assert_eq!(conn.status().unwrap(), ConnectionState::Idle);

    let output = conn
        .execute("SELECT count(*) FROM ledger", vec![])
        .await
        .unwrap();
    assert_eq!(output.rows(), [vec![json!(0)]]);

    drop(conn);
    assert_eq!(pool.status().available_connections, 1);
}

/// Test that a file database survives reconnecting
#[tokio::test]
async fn test_file_database_through_pool() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pool.duckdb");
    let config = Config::builder()
        .path(path.to_str().unwrap())
        .pool_size(4)
        .build()
        .unwrap();
    assert_eq!(config.pool_size, 1);

    {
        let pool = Pool::new(config.clone()).await.unwrap();
        let mut conn = pool.get().await.unwrap();
        conn.execute("CREATE TABLE kv (k VARCHAR, v VARCHAR)", vec![])
            .await
            .unwrap();
        conn.execute(
            "INSERT INTO kv VALUES ($1, $2)",
            vec![Param::from("greeting"), Param::from("hello")],
        )
        .await
        .unwrap();
    }

    let pool = Pool::new(config).await.unwrap();
    let mut conn = pool.get().await.unwrap();
    let output = conn
        .execute("SELECT v FROM kv WHERE k = $1", vec![Param::from("greeting")])
        .await
        .unwrap();
    assert_eq!(output.into_objects(), [json!({ "v": "hello" })]);
}
