use std::fmt;

use async_trait::async_trait;
use opendal::{ErrorKind, Operator, services};
use tracing::{debug, info};

use super::DurableStore;
use crate::error::{StoreInitError, StoreWriteError};

/// Connection settings for an S3-compatible bucket.
#[derive(Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.access_key_id.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Durable store over any OpenDAL operator (S3, filesystem, memory).
#[derive(Clone)]
pub struct ObjectDurableStore {
    op: Operator,
    label: String,
}

impl fmt::Debug for ObjectDurableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDurableStore")
            .field("backend", &self.label)
            .finish()
    }
}

impl ObjectDurableStore {
    pub fn new(op: Operator, label: impl Into<String>) -> Self {
        Self {
            op,
            label: label.into(),
        }
    }

    pub fn s3(settings: &S3Settings) -> Result<Self, StoreInitError> {
        if settings.bucket.trim().is_empty() {
            return Err(StoreInitError::Config(
                "S3 bucket name is required".to_string(),
            ));
        }

        let mut builder = services::S3::default().bucket(&settings.bucket);
        if let Some(region) = settings.region.as_deref() {
            builder = builder.region(region);
        }
        if let Some(endpoint) = settings.endpoint.as_deref() {
            builder = builder.endpoint(endpoint);
        }
        if let Some(key) = settings.access_key_id.as_deref() {
            builder = builder.access_key_id(key);
        }
        if let Some(secret) = settings.secret_access_key.as_deref() {
            builder = builder.secret_access_key(secret);
        }
        if let Some(token) = settings.session_token.as_deref() {
            builder = builder.session_token(token);
        }

        let op = Operator::new(builder)?.finish();
        info!(bucket = %settings.bucket, "durable store using S3");
        Ok(Self::new(op, format!("s3://{}", settings.bucket)))
    }

    pub fn filesystem(root: &str) -> Result<Self, StoreInitError> {
        let op = Operator::new(services::Fs::default().root(root))?.finish();
        info!(root, "durable store using local filesystem");
        Ok(Self::new(op, format!("fs://{root}")))
    }

    pub fn memory() -> Result<Self, StoreInitError> {
        let op = Operator::new(services::Memory::default())?.finish();
        Ok(Self::new(op, "memory"))
    }

    /// Reads an object back; `None` when it does not exist.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, opendal::Error> {
        match self.op.read(key).await {
            Ok(buffer) => Ok(Some(buffer.to_vec())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Object keys directly under `prefix`, which must end with `/`.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, opendal::Error> {
        let entries = self.op.list(prefix).await?;
        Ok(entries
            .into_iter()
            .filter(|entry| entry.metadata().mode().is_file())
            .map(|entry| entry.path().to_string())
            .collect())
    }
}

#[async_trait]
impl DurableStore for ObjectDurableStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &'static str,
    ) -> Result<(), StoreWriteError> {
        debug!(backend = %self.label, key, "object PUT");
        self.op
            .write_with(key, body)
            .content_type(content_type)
            .await
            .map(|_| ())
            .map_err(|e| StoreWriteError::backend("durable", e))
    }
}
