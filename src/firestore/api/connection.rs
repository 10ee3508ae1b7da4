use std::future::Future;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DatabaseId, DocumentKey, ResourcePath};
use crate::firestore::mutation::RecursiveDeleter;
use crate::firestore::remote::datastore::{
    Datastore, HttpDatastore, InMemoryDatastore, NoopTokenProvider, StaticTokenProvider,
    TokenProviderArc,
};
use crate::firestore::remote::FirestoreRestConnection;
use crate::logger::Logger;

use super::builder::QueryBuilder;
use super::config::ConnectionConfig;
use super::reference::{CollectionReference, DocumentReference};
use super::write_batch::WriteBatch;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("firestore-connection/query"));

/// One executed (or pretended) statement.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryLogEntry {
    pub query: String,
    pub elapsed: Duration,
}

/// Entry point: owns the store handle and the per-connection query log.
///
/// Clones share the same store, log and flags.
#[derive(Clone)]
pub struct FirestoreConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    database_id: DatabaseId,
    datastore: Arc<dyn Datastore>,
    recursive_delete_batch_size: u32,
    state: Mutex<ConnectionState>,
}

#[derive(Default)]
struct ConnectionState {
    query_log: Vec<QueryLogEntry>,
    logging_queries: bool,
    pretending: bool,
    records_modified: bool,
}

impl FirestoreConnection {
    pub fn new(database_id: DatabaseId, datastore: Arc<dyn Datastore>) -> Self {
        Self::with_datastore(database_id, datastore, &ConnectionConfig::default())
    }

    /// Connection backed by a fresh process-local store.
    pub fn in_memory(project_id: impl Into<String>) -> Self {
        Self::new(
            DatabaseId::default(project_id),
            Arc::new(InMemoryDatastore::new()),
        )
    }

    /// Connection backed by the Firestore REST API, or the emulator when one is
    /// configured.
    pub fn from_config(config: &ConnectionConfig) -> FirestoreResult<Self> {
        let database_id = config.database_id()?;
        let rest = match config.resolved_emulator_host() {
            Some(host) => FirestoreRestConnection::emulator(database_id.clone(), &host),
            None => FirestoreRestConnection::production(database_id.clone()),
        }
        .with_timeout(config.request_timeout());
        let token_provider: TokenProviderArc = match &config.access_token {
            Some(token) => Arc::new(StaticTokenProvider::new(token.clone())),
            None => Arc::new(NoopTokenProvider),
        };
        let datastore = HttpDatastore::new(rest, token_provider)?;
        Ok(Self::with_datastore(database_id, Arc::new(datastore), config))
    }

    /// Applies the logging, pretend and deletion settings of `config` on top of
    /// an injected store.
    pub fn with_datastore(
        database_id: DatabaseId,
        datastore: Arc<dyn Datastore>,
        config: &ConnectionConfig,
    ) -> Self {
        let state = ConnectionState {
            logging_queries: config.log_queries,
            pretending: config.pretend,
            ..ConnectionState::default()
        };
        Self {
            inner: Arc::new(ConnectionInner {
                database_id,
                datastore,
                recursive_delete_batch_size: config.recursive_delete_batch_size,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.inner.database_id
    }

    pub fn datastore(&self) -> Arc<dyn Datastore> {
        Arc::clone(&self.inner.datastore)
    }

    pub fn recursive_deleter(&self) -> RecursiveDeleter {
        RecursiveDeleter::new(self.datastore())
            .with_batch_size(self.inner.recursive_delete_batch_size)
    }

    /// Query builder over a fixed collection path.
    pub fn table(&self, collection: &str) -> QueryBuilder {
        self.query().from(collection)
    }

    pub fn collection(&self, collection: &str) -> QueryBuilder {
        self.table(collection)
    }

    /// Query builder over every collection named `collection_id`.
    pub fn collection_group(&self, collection_id: &str) -> FirestoreResult<QueryBuilder> {
        self.query().from(collection_id).in_collection_group()
    }

    pub fn query(&self) -> QueryBuilder {
        QueryBuilder::new(self.clone())
    }

    pub fn document(&self, path: &str) -> FirestoreResult<DocumentReference> {
        let key = DocumentKey::from_string(path)?;
        Ok(DocumentReference::new(key, self.datastore()))
    }

    pub fn collection_reference(&self, path: &str) -> FirestoreResult<CollectionReference> {
        let path = ResourcePath::from_string(path)?;
        if path.is_empty() {
            return Err(invalid_argument("Collection path must not be empty"));
        }
        CollectionReference::new(path, self.datastore())
    }

    pub fn batch(&self) -> WriteBatch {
        WriteBatch::new(self.datastore())
    }

    pub fn enable_query_log(&self) {
        self.state().logging_queries = true;
    }

    pub fn disable_query_log(&self) {
        self.state().logging_queries = false;
    }

    pub fn logging(&self) -> bool {
        self.state().logging_queries
    }

    pub fn query_log(&self) -> Vec<QueryLogEntry> {
        self.state().query_log.clone()
    }

    pub fn flush_query_log(&self) {
        self.state().query_log.clear();
    }

    pub fn pretending(&self) -> bool {
        self.state().pretending
    }

    /// Runs `callback` with execution switched off and returns the statements
    /// it would have run. Selects yield nothing and mutations report no changes.
    pub async fn pretend<F, Fut>(&self, callback: F) -> FirestoreResult<Vec<QueryLogEntry>>
    where
        F: FnOnce(FirestoreConnection) -> Fut,
        Fut: Future<Output = FirestoreResult<()>>,
    {
        let (was_logging, was_pretending, previous_log) = {
            let mut state = self.state();
            let previous = (
                state.logging_queries,
                state.pretending,
                std::mem::take(&mut state.query_log),
            );
            state.logging_queries = true;
            state.pretending = true;
            previous
        };

        let result = callback(self.clone()).await;

        let mut state = self.state();
        state.pretending = was_pretending;
        state.logging_queries = was_logging;
        let pretended = std::mem::replace(&mut state.query_log, previous_log);
        result.map(|_| pretended)
    }

    pub fn records_have_been_modified(&self) -> bool {
        self.state().records_modified
    }

    pub(crate) fn record_modification(&self, modified: bool) {
        if modified {
            self.state().records_modified = true;
        }
    }

    /// Executes one statement: logs it with its wall time and wraps store
    /// failures with the statement text. Pretending returns `pretend_value`.
    pub(crate) async fn run<T, Fut>(
        &self,
        query: &str,
        pretend_value: T,
        operation: impl FnOnce() -> Fut,
    ) -> FirestoreResult<T>
    where
        Fut: Future<Output = FirestoreResult<T>>,
    {
        if self.pretending() {
            self.log_query(query, Duration::ZERO);
            return Ok(pretend_value);
        }

        let started = Instant::now();
        let result = operation().await;
        let elapsed = started.elapsed();
        self.log_query(query, elapsed);

        result.map_err(|err| {
            LOGGER.debug(format!("statement failed: {query}: {err}"));
            err.into_transport_failure().with_query(query)
        })
    }

    fn log_query(&self, query: &str, elapsed: Duration) {
        LOGGER.debug(format!("{query} ({} ms)", elapsed.as_millis()));
        let mut state = self.state();
        if state.logging_queries {
            state.query_log.push(QueryLogEntry {
                query: query.to_string(),
                elapsed,
            });
        }
    }

    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
