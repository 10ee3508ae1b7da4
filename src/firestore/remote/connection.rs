use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value as JsonValue;

use crate::firestore::constants::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::firestore::error::{
    deadline_exceeded, internal_error, unavailable, FirestoreError, FirestoreResult,
};
use crate::firestore::model::{DatabaseId, ResourcePath};

use super::rpc_error::map_http_error;

const FIRESTORE_API_HOST: &str = "https://firestore.googleapis.com";
const FIRESTORE_API_VERSION: &str = "v1";

/// Characters kept verbatim inside one path segment of a request URL.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'(')
    .remove(b')');

/// Where and how REST requests are sent: production endpoint or emulator,
/// request timeout and an optional preconfigured `reqwest` client.
#[derive(Clone, Debug)]
pub struct FirestoreRestConnection {
    database_id: DatabaseId,
    base_url: String,
    request_timeout: Duration,
    client: Option<Client>,
}

impl FirestoreRestConnection {
    pub fn production(database_id: DatabaseId) -> Self {
        let base_url = build_base_url(&database_id, None);
        Self::with_base_url(database_id, base_url)
    }

    /// `host` is `host:port`, without scheme.
    pub fn emulator(database_id: DatabaseId, host: &str) -> Self {
        let base_url = build_base_url(&database_id, Some(host));
        Self::with_base_url(database_id, base_url)
    }

    fn with_base_url(database_id: DatabaseId, base_url: String) -> Self {
        Self {
            database_id,
            base_url,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            client: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.database_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub(crate) fn build(self) -> FirestoreResult<Connection> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .build()
                .map_err(|err| internal_error(err.to_string()))?,
        };
        Ok(Connection {
            client,
            base_url: self.base_url,
            request_timeout: self.request_timeout,
        })
    }
}

/// Built transport: sends JSON requests and maps failures to store errors.
#[derive(Clone, Debug)]
pub(crate) struct Connection {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl Connection {
    pub(crate) async fn invoke_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
        token: Option<&str>,
    ) -> FirestoreResult<JsonValue> {
        let (status, text) = self.send(method, path, body, token).await?;
        if status.is_success() {
            parse_body(&text)
        } else {
            Err(map_http_error(status, &text))
        }
    }

    /// Like `invoke_json`, but a 404 yields `None`.
    pub(crate) async fn invoke_json_optional(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
        token: Option<&str>,
    ) -> FirestoreResult<Option<JsonValue>> {
        let (status, text) = self.send(method, path, body, token).await?;
        if status.is_success() {
            parse_body(&text).map(Some)
        } else if status == StatusCode::NOT_FOUND {
            Ok(None)
        } else {
            Err(map_http_error(status, &text))
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
        token: Option<&str>,
    ) -> FirestoreResult<(StatusCode, String)> {
        let mut request = self.build_request(method, path, token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        Ok((status, text))
    }

    fn build_request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut builder = self
            .client
            .request(method, url)
            .timeout(self.request_timeout)
            .header("Content-Type", "application/json");
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

/// `documents/<encoded path>` for a document or collection resource.
pub(crate) fn documents_path(path: &ResourcePath) -> String {
    let encoded: Vec<String> = (0..path.len())
        .filter_map(|index| path.segment(index))
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect();
    if encoded.is_empty() {
        "documents".to_string()
    } else {
        format!("documents/{}", encoded.join("/"))
    }
}

fn parse_body(text: &str) -> FirestoreResult<JsonValue> {
    if text.is_empty() {
        Ok(JsonValue::Null)
    } else {
        serde_json::from_str(text).map_err(|err| internal_error(err.to_string()))
    }
}

fn transport_error(err: reqwest::Error) -> FirestoreError {
    if err.is_timeout() {
        deadline_exceeded(err.to_string())
    } else if err.is_connect() {
        unavailable(err.to_string())
    } else {
        internal_error(err.to_string())
    }
}

fn build_base_url(database_id: &DatabaseId, emulator_host: Option<&str>) -> String {
    match emulator_host {
        Some(host) => format!(
            "http://{host}/{FIRESTORE_API_VERSION}/{}",
            database_id.resource_name()
        ),
        None => format!(
            "{FIRESTORE_API_HOST}/{FIRESTORE_API_VERSION}/{}",
            database_id.resource_name()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls() {
        let database_id = DatabaseId::default("demo");
        assert_eq!(
            FirestoreRestConnection::production(database_id.clone()).base_url(),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)"
        );
        assert_eq!(
            FirestoreRestConnection::emulator(database_id, "localhost:8080").base_url(),
            "http://localhost:8080/v1/projects/demo/databases/(default)"
        );
    }

    #[test]
    fn document_paths_are_segment_encoded() {
        let path = ResourcePath::from_string("users/a b/posts").unwrap();
        assert_eq!(documents_path(&path), "documents/users/a%20b/posts");
        assert_eq!(documents_path(&ResourcePath::root()), "documents");
    }
}
