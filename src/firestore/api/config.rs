use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::firestore::constants::{
    DEFAULT_DATABASE_ID, DEFAULT_RECURSIVE_DELETE_BATCH_SIZE, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::firestore::error::{invalid_argument, missing_project_id, FirestoreResult};
use crate::firestore::model::DatabaseId;

const EMULATOR_HOST_ENV: &str = "FIRESTORE_EMULATOR_HOST";
const PROJECT_ID_ENV: &str = "FIRESTORE_PROJECT_ID";
const DATABASE_ENV: &str = "FIRESTORE_DATABASE";
const ACCESS_TOKEN_ENV: &str = "FIRESTORE_ACCESS_TOKEN";

/// Settings for a [`FirestoreConnection`](super::FirestoreConnection).
///
/// Deserializes from snake_case or camelCase keys; empty strings count as unset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    #[serde(alias = "projectId", deserialize_with = "non_empty")]
    pub project_id: Option<String>,
    pub database: String,
    #[serde(alias = "emulatorHost", deserialize_with = "non_empty")]
    pub emulator_host: Option<String>,
    #[serde(alias = "accessToken", deserialize_with = "non_empty")]
    pub access_token: Option<String>,
    #[serde(alias = "requestTimeoutSecs")]
    pub request_timeout_secs: u64,
    #[serde(alias = "logQueries")]
    pub log_queries: bool,
    pub pretend: bool,
    #[serde(alias = "recursiveDeleteBatchSize")]
    pub recursive_delete_batch_size: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            database: DEFAULT_DATABASE_ID.to_string(),
            emulator_host: None,
            access_token: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            log_queries: false,
            pretend: false,
            recursive_delete_batch_size: DEFAULT_RECURSIVE_DELETE_BATCH_SIZE,
        }
    }
}

impl ConnectionConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> FirestoreResult<Self> {
        serde_json::from_str(json)
            .map_err(|err| invalid_argument(format!("Invalid connection configuration: {err}")))
    }

    /// Reads `FIRESTORE_PROJECT_ID`, `FIRESTORE_DATABASE`, `FIRESTORE_ACCESS_TOKEN`
    /// and `FIRESTORE_EMULATOR_HOST`.
    pub fn from_env() -> Self {
        let mut config = Self {
            project_id: env_value(PROJECT_ID_ENV),
            access_token: env_value(ACCESS_TOKEN_ENV),
            emulator_host: env_value(EMULATOR_HOST_ENV),
            ..Self::default()
        };
        if let Some(database) = env_value(DATABASE_ENV) {
            config.database = database;
        }
        config
    }

    pub fn with_emulator_host(mut self, host: impl Into<String>) -> Self {
        self.emulator_host = Some(host.into()).filter(|host: &String| !host.trim().is_empty());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into()).filter(|token: &String| !token.trim().is_empty());
        self
    }

    pub fn database_id(&self) -> FirestoreResult<DatabaseId> {
        let project_id = self.project_id.as_deref().ok_or_else(missing_project_id)?;
        let database = if self.database.trim().is_empty() {
            DEFAULT_DATABASE_ID
        } else {
            self.database.as_str()
        };
        Ok(DatabaseId::new(project_id, database))
    }

    /// The configured emulator host, or `FIRESTORE_EMULATOR_HOST` when unset.
    pub fn resolved_emulator_host(&self) -> Option<String> {
        self.emulator_host
            .clone()
            .or_else(|| env_value(EMULATOR_HOST_ENV))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|value| !value.trim().is_empty()))
}
