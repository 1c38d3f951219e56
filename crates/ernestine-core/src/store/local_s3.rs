//! A small S3-compatible server for tests. Buckets live in memory, signatures
//! are not checked, and listing pages are capped at `page_limit` keys so that
//! continuation tokens come into play with only a handful of objects.

use super::s3::S3Config;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};
use tokio::net::TcpListener;

type Objects = BTreeMap<String, Vec<u8>>;

#[derive(Default)]
struct ServerState {
    buckets: HashMap<String, Objects>,
    /// `"METHOD /path"` for every request received, oldest first.
    requests: Vec<String>,
}

struct Shared {
    page_limit: usize,
    state: Mutex<ServerState>,
}

pub struct LocalS3 {
    shared: Arc<Shared>,
    endpoint: String,
}

impl LocalS3 {
    pub async fn start(page_limit: usize) -> Self {
        let shared = Arc::new(Shared {
            page_limit,
            state: Mutex::default(),
        });
        let app = Router::new().fallback(handle).with_state(shared.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        LocalS3 {
            shared,
            endpoint: format!("http://{}", addr),
        }
    }

    pub fn config(&self, bucket: &str) -> S3Config {
        S3Config {
            endpoint: self.endpoint.clone(),
            bucket: bucket.to_string(),
            region: "us-east-1".to_string(),
            key: "key".to_string(),
            secret: "secret".to_string(),
            token: None,
        }
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.shared.state.lock().unwrap()
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state().buckets.contains_key(bucket)
    }

    /// Stores an object directly, creating the bucket if needed.
    pub fn insert(&self, bucket: &str, key: &str, value: &[u8]) {
        self.state()
            .buckets
            .entry(bucket.to_owned())
            .or_default()
            .insert(key.to_owned(), value.to_vec());
    }

    /// Returns the requests received since the last call.
    pub fn take_requests(&self) -> Vec<String> {
        std::mem::take(&mut self.state().requests)
    }
}

async fn handle(
    State(shared): State<Arc<Shared>>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let mut state = shared.state.lock().unwrap();
    state.requests.push(format!("{} {}", method, uri.path()));

    let path = uri.path().trim_start_matches('/');
    let (bucket, key) = path.split_once('/').unwrap_or((path, ""));
    if key.is_empty() {
        bucket_request(&mut state, shared.page_limit, &method, bucket, &query)
    } else {
        object_request(&mut state, &method, bucket, key, body)
    }
}

fn bucket_request(
    state: &mut ServerState,
    page_limit: usize,
    method: &Method,
    bucket: &str,
    query: &HashMap<String, String>,
) -> Response {
    match *method {
        Method::PUT => {
            if state.buckets.contains_key(bucket) {
                return error(StatusCode::CONFLICT, "BucketAlreadyOwnedByYou");
            }
            state.buckets.insert(bucket.to_owned(), Objects::new());
            StatusCode::OK.into_response()
        }
        Method::DELETE => {
            let Some(objects) = state.buckets.get(bucket) else {
                return error(StatusCode::NOT_FOUND, "NoSuchBucket");
            };
            if !objects.is_empty() {
                return error(StatusCode::CONFLICT, "BucketNotEmpty");
            }
            state.buckets.remove(bucket);
            StatusCode::NO_CONTENT.into_response()
        }
        Method::GET => match state.buckets.get(bucket) {
            Some(objects) => list_page(objects, page_limit, query).into_response(),
            None => error(StatusCode::NOT_FOUND, "NoSuchBucket"),
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn object_request(
    state: &mut ServerState,
    method: &Method,
    bucket: &str,
    key: &str,
    body: Bytes,
) -> Response {
    let Some(objects) = state.buckets.get_mut(bucket) else {
        return error(StatusCode::NOT_FOUND, "NoSuchBucket");
    };
    match *method {
        Method::HEAD if objects.contains_key(key) => StatusCode::OK.into_response(),
        Method::HEAD => StatusCode::NOT_FOUND.into_response(),
        Method::GET => match objects.get(key) {
            Some(value) => value.clone().into_response(),
            None => error(StatusCode::NOT_FOUND, "NoSuchKey"),
        },
        Method::PUT => {
            objects.insert(key.to_owned(), body.to_vec());
            StatusCode::OK.into_response()
        }
        // Deleting an absent object succeeds, as it does on S3.
        Method::DELETE => {
            objects.remove(key);
            StatusCode::NO_CONTENT.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// One ListObjectsV2 page. The continuation token is the last key returned.
fn list_page(objects: &Objects, page_limit: usize, query: &HashMap<String, String>) -> String {
    let prefix = query.get("prefix").map(String::as_str).unwrap_or_default();
    let max_keys = query
        .get("max-keys")
        .and_then(|v| v.parse().ok())
        .map_or(page_limit, |max: usize| max.min(page_limit));
    let after = query.get("continuation-token");

    let mut matching = objects
        .iter()
        .filter(|(key, _)| key.starts_with(prefix))
        .filter(|(key, _)| after.map_or(true, |token| key.as_str() > token.as_str()));
    let page: Vec<_> = matching.by_ref().take(max_keys).collect();
    let truncated = matching.next().is_some();

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">",
    );
    for (key, value) in &page {
        xml.push_str(&format!(
            "<Contents><Key>{}</Key><LastModified>2024-01-01T00:00:00.000Z</LastModified>\
             <ETag>\"0\"</ETag><Size>{}</Size></Contents>",
            key,
            value.len()
        ));
    }
    if let (true, Some((last, _))) = (truncated, page.last()) {
        xml.push_str(&format!(
            "<NextContinuationToken>{}</NextContinuationToken>",
            last
        ));
    }
    xml.push_str("</ListBucketResult>");
    xml
}

fn error(status: StatusCode, code: &str) -> Response {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Error><Code>{}</Code></Error>",
        code
    );
    (status, body).into_response()
}
