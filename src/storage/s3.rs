//! Native AWS S3 backend
//!
//! Talks to S3 (or an S3-compatible endpoint) through the AWS SDK.
//! Credentials and region come from the default provider chain unless the
//! engine settings override them.

use super::{ListPage, ListedObject, ObjectStore, PutRequest, StoreResult};
use crate::config::EngineSettings;
use crate::error::{StoreError, StoreErrorKind};
use async_trait::async_trait;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ObjectCannedAcl, ServerSideEncryption, StorageClass};
use std::collections::HashMap;
use std::path::Path;

/// S3 client implementing [`ObjectStore`]
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    /// Build a client from engine settings and the default credential chain
    pub async fn connect(settings: &EngineSettings) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(ref region) = settings.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }

        // Set custom endpoint for S3-compatible services
        if let Some(ref endpoint) = settings.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        if let Some(timeout) = settings.operation_timeout() {
            loader = loader.timeout_config(
                aws_config::timeout::TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            );
        }

        let shared = loader.load().await;

        let mut s3_config = aws_sdk_s3::config::Builder::from(&shared);
        if settings.force_path_style {
            s3_config = s3_config.force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config.build()),
        }
    }

    /// Wrap an already-configured SDK client
    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> StoreResult<ListPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_continuation_token(continuation);
        if !prefix.is_empty() {
            request = request.prefix(prefix);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| classify("list_objects_v2", e))?;

        let objects = resp
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?.to_string();
                Some(ListedObject {
                    key,
                    size: object.size().unwrap_or(0).max(0) as u64,
                    etag: object.e_tag().map(str::to_string),
                })
            })
            .collect();

        let next_token = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_token,
        })
    }

    async fn put_object(&self, request: &PutRequest) -> StoreResult<u64> {
        let (body, length) = open_body(&request.local_path).await?;

        let params = &request.params;
        let metadata: Option<HashMap<String, String>> = if params.metadata.is_empty() {
            None
        } else {
            Some(params.metadata.clone().into_iter().collect())
        };

        self.client
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .body(body)
            .set_acl(params.acl.map(|acl| ObjectCannedAcl::from(acl.as_str())))
            .set_cache_control(params.cache_control.clone())
            .set_content_type(params.content_type.clone())
            .set_content_encoding(params.content_encoding.clone())
            .set_content_disposition(params.content_disposition.clone())
            .set_content_language(params.content_language.clone())
            .set_storage_class(params.storage_class.as_deref().map(StorageClass::from))
            .set_server_side_encryption(
                params
                    .server_side_encryption
                    .as_deref()
                    .map(ServerSideEncryption::from),
            )
            .set_ssekms_key_id(params.ssekms_key_id.clone())
            .set_website_redirect_location(params.website_redirect_location.clone())
            .set_metadata(metadata)
            .send()
            .await
            .map_err(|e| classify("put_object", e))?;

        Ok(length)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("delete_object", e))?;

        Ok(())
    }
}

/// Open a file as a request body
///
/// The length comes from the file as it is now, not from enumeration, so
/// a file rewritten since planning still uploads with a matching length.
async fn open_body(path: &Path) -> StoreResult<(ByteStream, u64)> {
    let body = ByteStream::from_path(path).await.map_err(|e| {
        StoreError::new(
            StoreErrorKind::LocalIo,
            format!("failed to read {}: {}", path.display(), e),
        )
    })?;
    let (lower, upper) = body.size_hint();
    Ok((body, upper.unwrap_or(lower)))
}

/// Map an S3 error code to a failure class
fn kind_for_code(code: Option<&str>) -> StoreErrorKind {
    match code {
        Some(
            "AccessDenied" | "AllAccessDisabled" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"
            | "ExpiredToken" | "InvalidToken" | "AccountProblem",
        ) => StoreErrorKind::AccessDenied,
        Some("NoSuchBucket") => StoreErrorKind::NoSuchBucket,
        Some("NoSuchKey" | "NotFound") => StoreErrorKind::NotFound,
        Some(
            "SlowDown" | "Throttling" | "ThrottlingException" | "RequestTimeout"
            | "ServiceUnavailable" | "InternalError",
        ) => StoreErrorKind::Throttled,
        _ => StoreErrorKind::Other,
    }
}

fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let kind = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            StoreErrorKind::Network
        }
        SdkError::ServiceError(service) => kind_for_code(service.err().code()),
        _ => StoreErrorKind::Other,
    };

    StoreError::new(
        kind,
        format!("S3 {} failed: {}", operation, DisplayErrorContext(&err)),
    )
}
