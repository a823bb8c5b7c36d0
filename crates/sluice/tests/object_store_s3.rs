use std::collections::HashMap;

use anyhow::{Context, Result};
use bytes::Bytes;
use sluice_bucket::{BucketStore, S3BucketStore, S3Config};
use sluice_core::object_store::TEXT_CONTENT_TYPE;
use sluice_core::watermark::WatermarkStore;
use uuid::Uuid;

const REQUIRED_VARS: &[&str] = &[
    "SLUICE_TEST_S3_BUCKET",
    "SLUICE_TEST_S3_ENDPOINT",
    "SLUICE_TEST_S3_ACCESS_KEY_ID",
    "SLUICE_TEST_S3_SECRET_ACCESS_KEY",
];

#[tokio::test]
async fn s3_store_round_trips_objects_and_watermarks() -> Result<()> {
    let Some(config) = S3TestConfig::from_env() else {
        eprintln!(
            "Skipping S3 object store test; set {} to enable",
            REQUIRED_VARS.join(", ")
        );
        return Ok(());
    };

    let _guard = EnvGuard::apply(&config)?;

    let store = S3BucketStore::new(S3Config::from_env()?)
        .await
        .context("failed to build S3 object store")?;
    let prefix = format!("sluice-it-{}", Uuid::new_v4());
    let key = format!("{prefix}/probe.txt");

    store
        .put_object(&key, Bytes::from_static(b"sluice integration test"), TEXT_CONTENT_TYPE)
        .await
        .context("upload to S3 failed")?;
    let fetched = store.get_object(&key).await.context("download failed")?;
    assert_eq!(&fetched[..], b"sluice integration test");

    let listed = store
        .list_prefix(&format!("{prefix}/"))
        .await
        .context("list prefix failed")?;
    assert!(listed.iter().any(|entry| entry == &key));

    let watermarks = WatermarkStore::new(&store);
    assert_eq!(watermarks.get(&prefix).await?, 0);
    watermarks.set(&prefix, 42).await?;
    assert_eq!(watermarks.get(&prefix).await?, 42);
    watermarks.reset(&prefix).await?;
    assert_eq!(watermarks.get(&prefix).await?, 0);

    store.delete_object(&key).await.context("cleanup delete failed")?;
    let err = store.get_object(&key).await.unwrap_err();
    assert!(err.is_not_found());

    Ok(())
}

struct EnvGuard {
    previous: HashMap<&'static str, Option<String>>,
}

impl EnvGuard {
    fn apply(config: &S3TestConfig) -> Result<Self> {
        let mut previous = HashMap::new();

        let mut set = |key: &'static str, value: Option<&str>| {
            let prior = std::env::var(key).ok();
            previous.insert(key, prior);
            if let Some(new) = value {
                std::env::set_var(key, new);
            } else {
                std::env::remove_var(key);
            }
        };

        set("S3_BUCKET", Some(&config.bucket));
        set("S3_REGION", config.region.as_deref());
        set("S3_ENDPOINT_URL", Some(&config.endpoint));
        set("S3_ACCESS_KEY_ID", Some(&config.access_key_id));
        set("S3_SECRET_ACCESS_KEY", Some(&config.secret_access_key));
        set("S3_FORCE_PATH_STYLE", config.force_path_style.as_deref());

        Ok(Self { previous })
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (&key, value) in &self.previous {
            if let Some(val) = value {
                std::env::set_var(key, val);
            } else {
                std::env::remove_var(key);
            }
        }
    }
}

struct S3TestConfig {
    bucket: String,
    region: Option<String>,
    endpoint: String,
    access_key_id: String,
    secret_access_key: String,
    force_path_style: Option<String>,
}

impl S3TestConfig {
    fn from_env() -> Option<Self> {
        for &var in REQUIRED_VARS {
            if std::env::var(var)
                .ok()
                .filter(|value| !value.is_empty())
                .is_none()
            {
                return None;
            }
        }

        Some(Self {
            bucket: std::env::var("SLUICE_TEST_S3_BUCKET").ok()?,
            region: std::env::var("SLUICE_TEST_S3_REGION").ok(),
            endpoint: std::env::var("SLUICE_TEST_S3_ENDPOINT").ok()?,
            access_key_id: std::env::var("SLUICE_TEST_S3_ACCESS_KEY_ID").ok()?,
            secret_access_key: std::env::var("SLUICE_TEST_S3_SECRET_ACCESS_KEY").ok()?,
            force_path_style: std::env::var("SLUICE_TEST_S3_FORCE_PATH_STYLE").ok(),
        })
    }
}
