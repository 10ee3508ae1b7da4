use std::sync::LazyLock;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value as JsonValue};

use crate::firestore::api::DocumentSnapshot;
use crate::firestore::error::{internal_error, FirestoreErrorCode, FirestoreResult};
use crate::firestore::model::{DocumentKey, Timestamp};
use crate::firestore::query::{LimitType, NativeQuery};
use crate::firestore::remote::connection::{documents_path, Connection, FirestoreRestConnection};
use crate::firestore::remote::serializer::JsonProtoSerializer;
use crate::firestore::remote::structured_query::encode_structured_query;
use crate::logger::Logger;

use super::{Datastore, TokenProviderArc, WriteOperation};

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("firestore-connection/http"));

/// Store backed by the Firestore REST v1 API.
///
/// Requests are not retried: a failed call surfaces immediately so the
/// mutation layer can report which chunk failed.
#[derive(Clone)]
pub struct HttpDatastore {
    connection: Connection,
    serializer: JsonProtoSerializer,
    token_provider: TokenProviderArc,
}

impl HttpDatastore {
    pub fn new(
        connection: FirestoreRestConnection,
        token_provider: TokenProviderArc,
    ) -> FirestoreResult<Self> {
        let serializer = JsonProtoSerializer::new(connection.database_id().clone());
        Ok(Self {
            connection: connection.build()?,
            serializer,
            token_provider,
        })
    }

    async fn invoke(&self, method: Method, path: &str, body: Option<&JsonValue>) -> FirestoreResult<JsonValue> {
        let token = self.token_provider.get_token().await?;
        let result = self
            .connection
            .invoke_json(method, path, body, token.as_deref())
            .await;
        self.observe(result)
    }

    async fn invoke_optional(&self, method: Method, path: &str) -> FirestoreResult<Option<JsonValue>> {
        let token = self.token_provider.get_token().await?;
        let result = self
            .connection
            .invoke_json_optional(method, path, None, token.as_deref())
            .await;
        self.observe(result)
    }

    /// Drops a rejected token so the next request fetches a fresh one.
    fn observe<T>(&self, result: FirestoreResult<T>) -> FirestoreResult<T> {
        if let Err(err) = &result {
            if err.code == FirestoreErrorCode::Unauthenticated {
                self.token_provider.invalidate_token();
            }
            LOGGER.debug(format!("request failed: {err}"));
        }
        result
    }

    fn decode_query_response(&self, response: &JsonValue) -> FirestoreResult<Vec<DocumentSnapshot>> {
        let entries = response
            .as_array()
            .ok_or_else(|| internal_error("Firestore runQuery response must be an array"))?;

        let mut snapshots = Vec::new();
        for entry in entries {
            let Some(document) = entry.get("document") else {
                continue;
            };
            let name = document
                .get("name")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| internal_error("Firestore runQuery document missing 'name' field"))?;
            let key = self.serializer.decode_document_key(name)?;
            let snapshot = self
                .decode_document(key, document)?
                .with_read_time(timestamp_field(entry, "readTime")?);
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    fn decode_document(&self, key: DocumentKey, document: &JsonValue) -> FirestoreResult<DocumentSnapshot> {
        let data = self.serializer.decode_document_fields(document)?;
        Ok(DocumentSnapshot::new(key, Some(data)).with_write_times(
            timestamp_field(document, "createTime")?,
            timestamp_field(document, "updateTime")?,
        ))
    }
}

fn timestamp_field(value: &JsonValue, field: &str) -> FirestoreResult<Option<Timestamp>> {
    value
        .get(field)
        .and_then(JsonValue::as_str)
        .map(Timestamp::parse_rfc3339)
        .transpose()
}

#[async_trait]
impl Datastore for HttpDatastore {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot> {
        let path = documents_path(key.path());
        match self.invoke_optional(Method::GET, &path).await? {
            Some(document) => self.decode_document(key.clone(), &document),
            None => Ok(DocumentSnapshot::missing(key.clone())),
        }
    }

    async fn run_query(&self, query: &NativeQuery) -> FirestoreResult<Vec<DocumentSnapshot>> {
        let request = query.to_first_limited();
        let path = format!("{}:runQuery", documents_path(&request.source().parent_path()));
        let body = json!({
            "structuredQuery": encode_structured_query(&self.serializer, &request)
        });

        let response = self.invoke(Method::POST, &path, Some(&body)).await?;
        let mut snapshots = self.decode_query_response(&response)?;
        if query.limit_type() == LimitType::Last {
            snapshots.reverse();
        }
        Ok(snapshots)
    }

    async fn list_collection_ids(&self, parent: &DocumentKey) -> FirestoreResult<Vec<String>> {
        let path = format!("{}:listCollectionIds", documents_path(parent.path()));
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let body = match &page_token {
                Some(token) => json!({ "pageToken": token }),
                None => json!({}),
            };
            let response = self.invoke(Method::POST, &path, Some(&body)).await?;
            if let Some(page) = response.get("collectionIds").and_then(JsonValue::as_array) {
                ids.extend(page.iter().filter_map(JsonValue::as_str).map(str::to_string));
            }
            page_token = response
                .get("nextPageToken")
                .and_then(JsonValue::as_str)
                .filter(|token| !token.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn commit(&self, writes: Vec<WriteOperation>) -> FirestoreResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let encoded: Vec<JsonValue> = writes
            .iter()
            .map(|write| self.serializer.encode_write(write))
            .collect();
        let body = json!({ "writes": encoded });
        self.invoke(Method::POST, "documents:commit", Some(&body))
            .await
            .map(|_| ())
    }
}
