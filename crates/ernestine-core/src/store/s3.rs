use super::{
    CreateOptions, DeleteOptions, GetOptions, ListOptions, ListResult, Result, Store, StoreError,
};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Method, RequestBuilder, Response, StatusCode, Url};
use rusty_s3::{actions::ListObjectsV2, Bucket, Credentials, S3Action, UrlStyle};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use time::OffsetDateTime;

const PRESIGNED_URL_DURATION: Duration = Duration::from_secs(60 * 60);
/// Upper bound on what a GET reserves before the body arrives.
const MAX_PREALLOCATION: usize = 64 * 1024 * 1024;
const DEFAULT_REGION: &str = "us-east-1";

const BUCKET_ALREADY_OWNED: &str = "BucketAlreadyOwnedByYou";
const BUCKET_ALREADY_EXISTS: &str = "BucketAlreadyExists";
const NO_SUCH_BUCKET: &str = "NoSuchBucket";

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub key: String,
    pub secret: String,
    pub token: Option<String>,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// Outcome of a request that reached the S3-compatible API.
enum S3Reply {
    Success(Response),
    Failure {
        status: StatusCode,
        code: Option<String>,
    },
}

/// A store backed by one S3-compatible bucket. The bucket is the unit of
/// cleanup: `cleanup` deletes it and the next `create` provisions it again.
pub struct S3Store {
    bucket: Bucket,
    bucket_ready: AtomicBool,
    client: Client,
    credentials: Credentials,
}

impl S3Store {
    pub fn new(config: S3Config) -> Result<Self> {
        let credentials = match config.token {
            Some(token) => Credentials::new_with_token(config.key, config.secret, token),
            None => Credentials::new(config.key, config.secret),
        };
        let endpoint: Url = config.endpoint.parse().map_err(|e| {
            StoreError::InvalidConfig(format!("Invalid endpoint {}: {}", config.endpoint, e))
        })?;
        let url_style = url_style(&endpoint)?;
        let bucket = Bucket::new(endpoint, url_style, config.bucket, config.region)
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;

        Ok(S3Store {
            bucket,
            bucket_ready: AtomicBool::new(false),
            client: Client::new(),
            credentials,
        })
    }

    /// Builds the store and provisions its bucket.
    pub async fn connect(config: S3Config) -> Result<Self> {
        let store = Self::new(config)?;
        store.init().await?;
        Ok(store)
    }

    /// Creates the bucket unless this store already knows it exists. A bucket
    /// that already exists is not an error.
    pub async fn init(&self) -> Result<()> {
        if self.bucket_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let action = self.bucket.create_bucket(&self.credentials);
        let mut request = self.request(Method::PUT, action);
        if self.bucket.region() != DEFAULT_REGION {
            request = request.body(format!(
                "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                 <LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
                self.bucket.region()
            ));
        }

        match self.execute(request).await? {
            S3Reply::Success(_) => {
                tracing::info!(bucket = self.bucket.name(), "Created bucket");
            }
            S3Reply::Failure {
                code: Some(code), ..
            } if code == BUCKET_ALREADY_OWNED || code == BUCKET_ALREADY_EXISTS => {
                tracing::debug!(bucket = self.bucket.name(), "Bucket already exists");
            }
            S3Reply::Failure { status, code } => {
                return Err(status_error(status, code.as_deref(), self.bucket.name()));
            }
        }

        self.bucket_ready.store(true, Ordering::Release);
        Ok(())
    }

    fn request<'a, A: S3Action<'a>>(&self, method: Method, action: A) -> RequestBuilder {
        let url = action.sign_with_time(PRESIGNED_URL_DURATION, &OffsetDateTime::now_utc());
        self.client.request(method, url)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<S3Reply> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(S3Reply::Success(response));
        }

        // Error bodies are small XML documents; HEAD responses have none.
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(%status, error = %e, "Could not read error response body");
                String::new()
            }
        };
        Ok(S3Reply::Failure {
            status,
            code: error_code(&body),
        })
    }

    async fn send(&self, request: RequestBuilder, subject: &str) -> Result<Response> {
        match self.execute(request).await? {
            S3Reply::Success(response) => Ok(response),
            S3Reply::Failure { status, code } => {
                Err(status_error(status, code.as_deref(), subject))
            }
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let action = self.bucket.head_object(Some(&self.credentials), key);
        match self.execute(self.request(Method::HEAD, action)).await? {
            S3Reply::Success(_) => Ok(true),
            S3Reply::Failure {
                status: StatusCode::NOT_FOUND,
                ..
            } => Ok(false),
            S3Reply::Failure { status, code } => Err(status_error(status, code.as_deref(), key)),
        }
    }
}

#[async_trait]
impl Store for S3Store {
    async fn create_with(
        &self,
        key: &str,
        value: Vec<u8>,
        options: &CreateOptions,
    ) -> Result<()> {
        self.init().await?;

        // Not atomic: a concurrent writer can still slip in between the
        // check and the upload.
        if self.exists(key).await? {
            return Err(StoreError::AlreadyExists(key.to_owned()));
        }

        let size = value.len();
        let action = self.bucket.put_object(Some(&self.credentials), key);
        let mut request = self.request(Method::PUT, action).body(value);
        if let Some(content_type) = &options.content_type {
            request = request.header(CONTENT_TYPE, content_type.as_str());
        }
        self.send(request, key).await?;
        tracing::debug!(key, size, "Uploaded object");
        Ok(())
    }

    async fn get_with(&self, key: &str, options: &GetOptions) -> Result<Vec<u8>> {
        let action = self.bucket.get_object(Some(&self.credentials), key);
        let mut response = self.send(self.request(Method::GET, action), key).await?;

        let mut value =
            Vec::with_capacity(body_capacity(options.size_hint, response.content_length()));
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?
        {
            value.extend_from_slice(&chunk);
        }
        Ok(value)
    }

    async fn delete_with(&self, key: &str, _options: &DeleteOptions) -> Result<()> {
        // DELETE succeeds for absent objects, so absence is detected up front.
        if !self.exists(key).await? {
            return Err(StoreError::DoesNotExist(key.to_owned()));
        }

        let action = self.bucket.delete_object(Some(&self.credentials), key);
        self.send(self.request(Method::DELETE, action), key).await?;
        Ok(())
    }

    async fn list_with(&self, prefix: &str, options: &ListOptions) -> Result<ListResult> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut action = self.bucket.list_objects_v2(Some(&self.credentials));
            if !prefix.is_empty() {
                action.with_prefix(prefix);
            }
            if let Some(page_size) = options.page_size {
                action.with_max_keys(page_size);
            }
            if let Some(token) = &continuation_token {
                action.with_continuation_token(token.as_str());
            }

            let response = match self.execute(self.request(Method::GET, action)).await? {
                S3Reply::Success(response) => response,
                S3Reply::Failure {
                    code: Some(code), ..
                } if code == NO_SUCH_BUCKET => return Ok(ListResult::default()),
                S3Reply::Failure { status, code } => {
                    return Err(status_error(status, code.as_deref(), self.bucket.name()));
                }
            };

            let body = response
                .text()
                .await
                .map_err(|e| StoreError::ConnectionError(e.to_string()))?;
            let page = ListObjectsV2::parse_response(&body).map_err(|e| {
                StoreError::ConnectionError(format!("Invalid list response: {}", e))
            })?;
            keys.extend(page.contents.into_iter().map(|object| object.key));

            match page.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        Ok(ListResult::new(keys))
    }

    async fn cleanup(&self) -> Result<()> {
        // Buckets must be empty before they can be deleted.
        let objects = self.list_with("", &ListOptions::default()).await?;
        for key in objects.keys() {
            let action = self.bucket.delete_object(Some(&self.credentials), key);
            self.send(self.request(Method::DELETE, action), key).await?;
        }

        let action = self.bucket.delete_bucket(&self.credentials);
        match self.execute(self.request(Method::DELETE, action)).await? {
            S3Reply::Success(_) => {
                tracing::info!(
                    bucket = self.bucket.name(),
                    objects = objects.found(),
                    "Deleted bucket"
                );
            }
            S3Reply::Failure {
                status: StatusCode::NOT_FOUND,
                ..
            } => {
                tracing::debug!(bucket = self.bucket.name(), "Bucket already deleted");
            }
            S3Reply::Failure { status, code } => {
                return Err(status_error(status, code.as_deref(), self.bucket.name()));
            }
        }

        self.bucket_ready.store(false, Ordering::Release);
        Ok(())
    }
}

/// Local endpoints (MinIO and friends) only understand path-style bucket URLs.
fn url_style(endpoint: &Url) -> Result<UrlStyle> {
    let host = endpoint
        .host_str()
        .ok_or_else(|| StoreError::InvalidConfig(format!("Endpoint {} has no host", endpoint)))?;
    let is_ip = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok();
    if host == "localhost" || is_ip {
        Ok(UrlStyle::Path)
    } else {
        Ok(UrlStyle::VirtualHost)
    }
}

/// How much to reserve for a GET body. Neither the caller's hint nor the
/// advertised length can push the reservation past [`MAX_PREALLOCATION`].
fn body_capacity(size_hint: Option<usize>, content_length: Option<u64>) -> usize {
    let content_length = content_length.map(|l| usize::try_from(l).unwrap_or(usize::MAX));
    let capacity = match (size_hint, content_length) {
        (Some(hint), Some(len)) => hint.min(len),
        (hint, len) => hint.or(len).unwrap_or_default(),
    };
    capacity.min(MAX_PREALLOCATION)
}

fn error_code(body: &str) -> Option<String> {
    let (_, rest) = body.split_once("<Code>")?;
    let (code, _) = rest.split_once("</Code>")?;
    Some(code.trim().to_owned())
}

fn status_error(status: StatusCode, code: Option<&str>, subject: &str) -> StoreError {
    let detail = match code {
        Some(code) => format!(
            "Received {} ({}) from S3-compatible API for {}.",
            status, code, subject
        ),
        None => format!(
            "Received {} from S3-compatible API for {}.",
            status, subject
        ),
    };
    match status {
        StatusCode::NOT_FOUND => StoreError::DoesNotExist(subject.to_owned()),
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => StoreError::NotAuthorized(detail),
        _ => StoreError::ConnectionError(detail),
    }
}
