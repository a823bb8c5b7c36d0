//! Landing-zone object storage: an S3 or MinIO bucket in deployments, process memory
//! in tests. Keys are plain `{source}/{artifact}` paths.

use std::collections::BTreeMap;
use std::env;
use std::fmt;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        }
    }
}

impl S3Config {
    /// Reads `S3_BUCKET`, `S3_REGION`, `S3_ENDPOINT_URL`, `S3_ACCESS_KEY_ID`,
    /// `S3_SECRET_ACCESS_KEY` and `S3_FORCE_PATH_STYLE`.
    ///
    /// Path-style addressing defaults to on whenever a custom endpoint is set, which is
    /// what MinIO expects.
    pub fn from_env() -> Result<Self, BucketError> {
        let bucket = non_empty_var("S3_BUCKET")
            .ok_or_else(|| BucketError::Configuration("S3_BUCKET must be set".into()))?;
        let endpoint = non_empty_var("S3_ENDPOINT_URL");
        let force_path_style = match non_empty_var("S3_FORCE_PATH_STYLE") {
            Some(value) => parse_flag(&value).ok_or_else(|| {
                BucketError::Configuration(format!(
                    "S3_FORCE_PATH_STYLE must be true or false, got '{value}'"
                ))
            })?,
            None => endpoint.is_some(),
        };

        Ok(Self {
            bucket,
            region: non_empty_var("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            endpoint,
            access_key_id: non_empty_var("S3_ACCESS_KEY_ID"),
            secret_access_key: non_empty_var("S3_SECRET_ACCESS_KEY"),
            force_path_style,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("sdk error: {0}")]
    Sdk(String),
    #[error("object not found: {0}")]
    NotFound(String),
}

impl BucketError {
    fn from_sdk(err: impl fmt::Display) -> Self {
        Self::Sdk(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BucketError::NotFound(_))
    }
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BucketError>;
    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError>;
    async fn delete_object(&self, key: &str) -> Result<(), BucketError>;
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError>;
}

#[derive(Clone)]
pub struct S3BucketStore {
    client: Client,
    bucket: String,
}

impl S3BucketStore {
    pub async fn new(config: S3Config) -> Result<Self, BucketError> {
        if config.bucket.trim().is_empty() {
            return Err(BucketError::Configuration("S3 bucket name is empty".into()));
        }

        let shared = load_shared_config(&config).await;
        let mut client_config =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.force_path_style);
        client_config.set_endpoint_url(config.endpoint.clone());

        Ok(Self {
            client: Client::from_conf(client_config.build()),
            bucket: config.bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

async fn load_shared_config(config: &S3Config) -> aws_config::SdkConfig {
    let loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));
    match static_credentials(config) {
        Some(credentials) => loader.credentials_provider(SharedCredentialsProvider::new(credentials)),
        None => loader,
    }
    .load()
    .await
}

/// MinIO deployments pass a fixed key pair; without both halves the default AWS
/// provider chain applies.
fn static_credentials(config: &S3Config) -> Option<Credentials> {
    let access_key = config.access_key_id.as_deref()?;
    let secret_key = config.secret_access_key.as_deref()?;
    Some(Credentials::new(access_key, secret_key, None, None, "sluice-env"))
}

#[async_trait]
impl BucketStore for S3BucketStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BucketError> {
        let length = i64::try_from(bytes.len())
            .map_err(|_| BucketError::Configuration(format!("{key} is too large to upload")))?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(length)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map(|_| ())
            .map_err(|err| BucketError::Sdk(format!("put {key}: {err}")))
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match err {
                SdkError::ServiceError(service_err) => {
                    if service_err.err().is_no_such_key() || service_err.raw().status().as_u16() == 404 {
                        BucketError::NotFound(key.to_string())
                    } else {
                        BucketError::from_sdk(service_err.err())
                    }
                }
                other => BucketError::from_sdk(other),
            })?;

        let data = output.body.collect().await.map_err(BucketError::from_sdk)?;
        Ok(data.into_bytes())
    }

    /// Deleting a key that does not exist succeeds, as it does in S3.
    async fn delete_object(&self, key: &str) -> Result<(), BucketError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|err| BucketError::Sdk(format!("delete {key}: {err}")))
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(BucketError::from_sdk)?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }
}

/// Keeps objects in process memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Bytes,
    pub content_type: String,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BucketError> {
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Bytes, BucketError> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|object| object.bytes.clone())
            .ok_or_else(|| BucketError::NotFound(key.to_string()))
    }

    async fn delete_object(&self, key: &str) -> Result<(), BucketError> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BucketError> {
        Ok(self
            .objects
            .lock()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
