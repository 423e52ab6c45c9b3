//! S3 backend.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use super::ObjectStore;
use crate::config::StoreConfig;
use crate::error::{Error, Result};

const STORE_NAME: &str = "s3";

/// A put or list page that takes longer than this counts as a failure.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Object store backed by an S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from the ambient AWS credentials and the store settings.
    ///
    /// A custom `endpoint_url` switches to path-style addressing, which is
    /// what S3-compatible servers expect.
    pub async fn connect(config: &StoreConfig) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region_name.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared).timeout_config(
            TimeoutConfig::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .operation_timeout(OPERATION_TIMEOUT)
                .build(),
        );
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        info!(
            "Using S3 bucket {} in {}",
            config.bucket_name, config.region_name
        );
        Self::from_client(Client::from_conf(builder.build()), config.bucket_name.clone())
    }

    /// Wrap an already configured client.
    #[must_use]
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// The bucket objects are written to.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &'static str {
        STORE_NAME
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Error::object_store(STORE_NAME, key, DisplayErrorContext(e).to_string()))?;
        debug!("S3 put of {} worked", key);
        Ok(())
    }

    async fn folder_size(&self, prefix: &str) -> Result<u64> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut total: u64 = 0;
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                Error::object_store(STORE_NAME, prefix, DisplayErrorContext(e).to_string())
            })?;
            for object in page.contents() {
                let size = object.size().unwrap_or_default();
                total += u64::try_from(size).unwrap_or_default();
            }
        }
        Ok(total)
    }
}
