use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::firestore::constants::{DOCUMENT_ID_FIELD, PATH_RANGE_END};
use crate::firestore::error::{
    invalid_argument, invalid_collection_path, invalid_increment_amount, FirestoreResult,
};
use crate::firestore::model::{next_ordered_id, DocumentKey, FieldPath, ResourcePath};
use crate::firestore::mutation::{
    document_id_from_value, encode_update_data, strip_document_id, MutationBatcher,
};
use crate::firestore::query::readable::{readable_delete, readable_insert, readable_update};
use crate::firestore::query::{
    compile_query, compile_readable, BooleanJoiner, CompiledQuery, NativeQuery, Order,
    OrderDirection, Predicate, PredicateKind, QueryState,
};
use crate::firestore::remote::datastore::Datastore;
use crate::firestore::value::{FirestoreValue, MapValue, ValueKind};

use super::aggregate::{average_values, field_values, max_value, min_value, sum_values, Aggregate};
use super::connection::FirestoreConnection;
use super::reference::{DocumentReference, DocumentScope};
use super::snapshot::DocumentSnapshot;

/// One or more documents to insert.
///
/// A single map becomes a one-element list. Field order inside each record is
/// always sorted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Records(Vec<MapValue>);

impl Records {
    pub fn new(records: Vec<MapValue>) -> Self {
        Self(records)
    }

    /// Accepts a JSON object or an array of JSON objects.
    pub fn from_json(value: &JsonValue) -> FirestoreResult<Self> {
        match value {
            JsonValue::Object(_) => Ok(Self(vec![json_record(value)?])),
            JsonValue::Array(items) => items
                .iter()
                .map(json_record)
                .collect::<FirestoreResult<Vec<_>>>()
                .map(Self),
            _ => Err(invalid_argument(
                "Insert values must be a JSON object or an array of objects",
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<MapValue> {
        self.0
    }
}

fn json_record(value: &JsonValue) -> FirestoreResult<MapValue> {
    match FirestoreValue::from_json(value).kind() {
        ValueKind::Map(map) => Ok(map.clone()),
        _ => Err(invalid_argument("Each inserted record must be a JSON object")),
    }
}

impl From<MapValue> for Records {
    fn from(record: MapValue) -> Self {
        Self(vec![record])
    }
}

impl From<Vec<MapValue>> for Records {
    fn from(records: Vec<MapValue>) -> Self {
        Self(records)
    }
}

impl From<BTreeMap<String, FirestoreValue>> for Records {
    fn from(record: BTreeMap<String, FirestoreValue>) -> Self {
        Self(vec![MapValue::new(record)])
    }
}

impl From<Vec<BTreeMap<String, FirestoreValue>>> for Records {
    fn from(records: Vec<BTreeMap<String, FirestoreValue>>) -> Self {
        Self(records.into_iter().map(MapValue::new).collect())
    }
}

/// Relational-style builder over a [`FirestoreConnection`].
///
/// Filters are validated when the query compiles, scoping mistakes are
/// reported by the scoping call itself. Every execution goes through the
/// connection so it is logged and its failures carry the statement text.
#[derive(Clone)]
pub struct QueryBuilder {
    connection: FirestoreConnection,
    state: QueryState,
}

impl std::fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("database", &self.connection.database_id())
            .field("state", &self.state)
            .finish()
    }
}

impl QueryBuilder {
    pub(crate) fn new(connection: FirestoreConnection) -> Self {
        Self {
            connection,
            state: QueryState::default(),
        }
    }

    pub fn connection(&self) -> &FirestoreConnection {
        &self.connection
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn into_state(self) -> QueryState {
        self.state
    }

    /// Targets a fixed collection path such as `users` or `users/ann/posts`.
    pub fn from(mut self, collection: &str) -> Self {
        self.state.from = Some(collection.trim().trim_matches('/').to_string());
        self.state.collection_group = false;
        self.state.collection_group_parent = None;
        self
    }

    /// `from` followed by [`in_document`](Self::in_document).
    pub fn from_scoped(
        self,
        collection: &str,
        scope: impl Into<DocumentScope>,
    ) -> FirestoreResult<Self> {
        self.from(collection).in_document(scope)
    }

    /// Queries every collection with the selected id, wherever it lives.
    pub fn in_collection_group(mut self) -> FirestoreResult<Self> {
        self.ensure_collection_id()?;
        self.state.collection_group = true;
        Ok(self)
    }

    /// Collection group restricted to the descendants of one document.
    /// Such queries cannot carry `where` clauses.
    pub fn in_document(mut self, scope: impl Into<DocumentScope>) -> FirestoreResult<Self> {
        self.ensure_collection_id()?;
        let parent = scope.into().resolve()?;
        self.state.collection_group = true;
        self.state.collection_group_parent = Some(parent);
        Ok(self)
    }

    /// Collection group restricted to the descendants of one document through a
    /// document-name range, which keeps `where` clauses available.
    pub fn of(self, scope: impl Into<DocumentScope>) -> FirestoreResult<Self> {
        let path = scope.into().resolve()?;
        let mut builder = self.in_collection_group()?;
        builder.state.orders.push(Order {
            field: DOCUMENT_ID_FIELD.to_string(),
            direction: OrderDirection::Ascending,
        });
        builder.state.start_at = vec![FirestoreValue::from_reference(path.clone())];
        builder.state.end_at = vec![FirestoreValue::from_reference(format!(
            "{path}{PATH_RANGE_END}"
        ))];
        Ok(builder)
    }

    /// Projects the given fields. An empty list projects the document identity only.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.state.columns = if columns.is_empty() {
            vec![DOCUMENT_ID_FIELD.to_string()]
        } else {
            columns
        };
        self
    }

    pub fn select_all(mut self) -> Self {
        self.state.columns = vec!["*".to_string()];
        self
    }

    pub fn where_(self, field: &str, operator: &str, value: impl Into<FirestoreValue>) -> Self {
        self.where_with(field, operator, value, BooleanJoiner::And, false)
    }

    pub fn where_with(
        mut self,
        field: &str,
        operator: &str,
        value: impl Into<FirestoreValue>,
        joiner: BooleanJoiner,
        negate: bool,
    ) -> Self {
        self.state.wheres.push(Predicate::new(
            PredicateKind::Basic {
                field: field.to_string(),
                operator: operator.to_string(),
                value: value.into(),
            },
            joiner,
            negate,
        ));
        self
    }

    /// Recorded so that compiling reports the unsupported disjunction.
    pub fn or_where(self, field: &str, operator: &str, value: impl Into<FirestoreValue>) -> Self {
        self.where_with(field, operator, value, BooleanJoiner::Or, false)
    }

    pub fn where_not(self, field: &str, operator: &str, value: impl Into<FirestoreValue>) -> Self {
        self.where_with(field, operator, value, BooleanJoiner::And, true)
    }

    /// Matches the document whose id (or full path) is `id`.
    pub fn where_key(self, id: &str) -> Self {
        self.where_(DOCUMENT_ID_FIELD, "=", id)
    }

    pub fn where_in(mut self, field: &str, values: impl Into<FirestoreValue>) -> Self {
        self.state.wheres.push(Predicate::and(PredicateKind::In {
            field: field.to_string(),
            values: values.into(),
        }));
        self
    }

    pub fn where_not_in(mut self, field: &str, values: impl Into<FirestoreValue>) -> Self {
        self.state.wheres.push(Predicate::and(PredicateKind::NotIn {
            field: field.to_string(),
            values: values.into(),
        }));
        self
    }

    pub fn where_null(mut self, field: &str) -> Self {
        self.state.wheres.push(Predicate::and(PredicateKind::Null {
            field: field.to_string(),
        }));
        self
    }

    pub fn where_not_null(mut self, field: &str) -> Self {
        self.state.wheres.push(Predicate::and(PredicateKind::NotNull {
            field: field.to_string(),
        }));
        self
    }

    pub fn where_array_contains(self, field: &str, value: impl Into<FirestoreValue>) -> Self {
        self.where_(field, "array-contains", value)
    }

    pub fn where_array_contains_any(self, field: &str, values: impl Into<FirestoreValue>) -> Self {
        self.where_(field, "array-contains-any", values)
    }

    /// Groups the predicates added by `build` into one nested predicate.
    pub fn where_nested(mut self, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let nested = build(QueryBuilder::new(self.connection.clone()));
        if !nested.state.wheres.is_empty() {
            self.state
                .wheres
                .push(Predicate::and(PredicateKind::Nested(nested.state.wheres)));
        }
        self
    }

    pub fn order_by(mut self, field: &str, direction: OrderDirection) -> Self {
        self.state.orders.push(Order {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn order_by_desc(self, field: &str) -> Self {
        self.order_by(field, OrderDirection::Descending)
    }

    pub fn start_at<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FirestoreValue>,
    {
        self.state.start_at = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn start_after<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FirestoreValue>,
    {
        self.state.start_after = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn end_at<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FirestoreValue>,
    {
        self.state.end_at = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn end_before<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FirestoreValue>,
    {
        self.state.end_before = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.state.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.state.limit = Some(limit);
        self
    }

    pub fn limit_to_last(mut self, limit: u32) -> Self {
        self.state.limit_to_last = Some(limit);
        self
    }

    /// Readable form of the select statement.
    pub fn to_sql(&self) -> FirestoreResult<String> {
        compile_readable(&self.state)
    }

    pub fn compile(&self) -> FirestoreResult<CompiledQuery> {
        compile_query(&self.state)
    }

    pub fn to_native(&self) -> FirestoreResult<NativeQuery> {
        self.compile()?.to_native()
    }

    pub async fn get(&self) -> FirestoreResult<Vec<DocumentSnapshot>> {
        let sql = self.to_sql()?;
        self.fetch(&sql, self.to_native()?).await
    }

    pub async fn first(&self) -> FirestoreResult<Option<DocumentSnapshot>> {
        let documents = self.clone().limit(1).get().await?;
        Ok(documents.into_iter().next())
    }

    pub async fn exists(&self) -> FirestoreResult<bool> {
        let first = self.clone().select(Vec::<String>::new()).limit(1);
        Ok(!first.get().await?.is_empty())
    }

    pub async fn doesnt_exist(&self) -> FirestoreResult<bool> {
        Ok(!self.exists().await?)
    }

    /// Counts matching documents by fetching their identities.
    pub async fn count(&self) -> FirestoreResult<usize> {
        let identities = self.clone().select(Vec::<String>::new());
        let sql = self.aggregate_sql(Aggregate::Count, "*")?;
        let documents = identities.fetch(&sql, identities.to_native()?).await?;
        Ok(documents.len())
    }

    pub async fn count_for_pagination(&self) -> FirestoreResult<usize> {
        self.clone().count().await
    }

    pub async fn min(&self, field: &str) -> FirestoreResult<Option<FirestoreValue>> {
        let values = self.column_values(Aggregate::Min, field).await?;
        Ok(min_value(&values))
    }

    pub async fn max(&self, field: &str) -> FirestoreResult<Option<FirestoreValue>> {
        let values = self.column_values(Aggregate::Max, field).await?;
        Ok(max_value(&values))
    }

    pub async fn sum(&self, field: &str) -> FirestoreResult<FirestoreValue> {
        let values = self.column_values(Aggregate::Sum, field).await?;
        Ok(sum_values(&values))
    }

    pub async fn avg(&self, field: &str) -> FirestoreResult<Option<f64>> {
        let values = self.column_values(Aggregate::Avg, field).await?;
        Ok(average_values(&values))
    }

    pub async fn average(&self, field: &str) -> FirestoreResult<Option<f64>> {
        self.avg(field).await
    }

    /// Creates one document per record, committing 100 creates per request.
    ///
    /// Empty input succeeds without touching the store.
    pub async fn insert(&self, records: impl Into<Records>) -> FirestoreResult<bool> {
        let records = records.into().into_vec();
        if records.is_empty() {
            return Ok(true);
        }
        let collection = self.insert_target()?;
        let sql = readable_insert(&collection.canonical_string(), &records);
        let datastore = self.connection.datastore();

        self.connection
            .run(&sql, true, || async move {
                MutationBatcher::new(datastore)
                    .insert(&collection, records)
                    .await
                    .map(|_| true)
            })
            .await?;
        self.connection.record_modification(true);
        Ok(true)
    }

    /// Inserts one record and returns its reference. With `sequence`, the
    /// document id is also stored under that field.
    pub async fn insert_get_id(
        &self,
        record: MapValue,
        sequence: Option<&str>,
    ) -> FirestoreResult<DocumentReference> {
        let collection = self.insert_target()?;
        let (mut data, id) = strip_document_id(record);
        let id = match id {
            Some(value) => document_id_from_value(&value)?,
            None => next_ordered_id(),
        };
        if let Some(sequence) = sequence {
            data.set(
                &FieldPath::from_dot_separated(sequence)?,
                FirestoreValue::from_string(id.clone()),
            );
        }
        let key = DocumentKey::from_path(collection.child([id.clone()]))?;
        let reference = DocumentReference::new(key, self.connection.datastore());
        data.set(&FieldPath::document_id(), FirestoreValue::from_string(id));

        let sql = readable_insert(&collection.canonical_string(), std::slice::from_ref(&data));
        let datastore = self.connection.datastore();
        let created = reference.clone();
        let reference = self
            .connection
            .run(&sql, reference, || async move {
                MutationBatcher::new(datastore)
                    .insert(&collection, vec![data])
                    .await
                    .map(|_| created)
            })
            .await?;
        self.connection.record_modification(true);
        Ok(reference)
    }

    /// Merges `data` into every matching document. Returns the number of
    /// documents written.
    ///
    /// The data is encoded before anything is read, so a bad payload fails
    /// without touching the store. Data without fields writes nothing.
    pub async fn update(&self, data: MapValue) -> FirestoreResult<usize> {
        let sql = readable_update(&self.state, &data)?;
        let target = self.identity_query()?;
        let encoded = encode_update_data(data)?;
        let datastore = self.connection.datastore();

        let count = self
            .connection
            .run(&sql, 0, || async move {
                let Some(encoded) = encoded else {
                    return Ok(0);
                };
                let keys = matching_keys(&datastore, &target).await?;
                MutationBatcher::new(datastore)
                    .update_encoded(keys, encoded)
                    .await
            })
            .await?;
        self.connection.record_modification(count > 0);
        Ok(count)
    }

    pub async fn increment(
        &self,
        field: &str,
        amount: impl Into<FirestoreValue>,
    ) -> FirestoreResult<usize> {
        self.increment_with(field, amount, MapValue::default()).await
    }

    /// Increments `field` and writes `extra` in the same update.
    pub async fn increment_with(
        &self,
        field: &str,
        amount: impl Into<FirestoreValue>,
        extra: MapValue,
    ) -> FirestoreResult<usize> {
        let amount = numeric_amount(amount.into(), "increment")?;
        self.update(increment_data(field, amount, extra)?).await
    }

    pub async fn decrement(
        &self,
        field: &str,
        amount: impl Into<FirestoreValue>,
    ) -> FirestoreResult<usize> {
        self.decrement_with(field, amount, MapValue::default()).await
    }

    pub async fn decrement_with(
        &self,
        field: &str,
        amount: impl Into<FirestoreValue>,
        extra: MapValue,
    ) -> FirestoreResult<usize> {
        let amount = negate(numeric_amount(amount.into(), "decrement")?);
        self.update(increment_data(field, amount, extra)?).await
    }

    /// Deletes every matching document together with its subcollections,
    /// 500 documents per commit. Returns the number of matched documents.
    pub async fn delete(&self) -> FirestoreResult<usize> {
        let sql = readable_delete(&self.state)?;
        let target = self.identity_query()?;
        let datastore = self.connection.datastore();
        let deleter = self.connection.recursive_deleter();

        let count = self
            .connection
            .run(&sql, 0, || async move {
                let keys = matching_keys(&datastore, &target).await?;
                MutationBatcher::new(datastore).delete(keys, &deleter).await
            })
            .await?;
        self.connection.record_modification(count > 0);
        Ok(count)
    }

    /// Deletes the documents whose `id` field equals `id`.
    pub async fn delete_by_id(&self, id: impl Into<FirestoreValue>) -> FirestoreResult<usize> {
        self.clone().where_("id", "=", id).delete().await
    }

    async fn fetch(&self, sql: &str, query: NativeQuery) -> FirestoreResult<Vec<DocumentSnapshot>> {
        let datastore = self.connection.datastore();
        self.connection
            .run(sql, Vec::new(), || async move { datastore.run_query(&query).await })
            .await
    }

    async fn column_values(
        &self,
        aggregate: Aggregate,
        field: &str,
    ) -> FirestoreResult<Vec<FirestoreValue>> {
        let path = FieldPath::from_dot_separated(field)?;
        let projected = self.clone().select([field]);
        let sql = self.aggregate_sql(aggregate, field)?;
        let documents = projected.fetch(&sql, projected.to_native()?).await?;
        Ok(field_values(&documents, &path))
    }

    fn aggregate_sql(&self, aggregate: Aggregate, field: &str) -> FirestoreResult<String> {
        let readable = compile_readable(&self.state.without_projection())?;
        let rest = readable.strip_prefix("select * ").unwrap_or(&readable);
        Ok(format!("select {}({field}) {rest}", aggregate.as_str()))
    }

    /// The query resolving mutation targets: filters kept, identity-only projection.
    fn identity_query(&self) -> FirestoreResult<NativeQuery> {
        let mut state = self.state.without_projection();
        state.columns = vec![DOCUMENT_ID_FIELD.to_string()];
        compile_query(&state)?.to_native()
    }

    fn insert_target(&self) -> FirestoreResult<ResourcePath> {
        if self.state.collection_group {
            return Err(invalid_argument(
                "Collection group is not supported for insert queries.",
            ));
        }
        let from = self
            .state
            .from
            .as_deref()
            .ok_or_else(|| invalid_argument("No collection selected, call from() first"))?;
        let path = ResourcePath::from_string(from)?;
        if !path.is_collection() {
            return Err(invalid_argument(format!(
                "'{from}' is not a collection path"
            )));
        }
        Ok(path)
    }

    fn ensure_collection_id(&self) -> FirestoreResult<()> {
        let from = self
            .state
            .from
            .as_deref()
            .ok_or_else(|| invalid_argument("No collection selected, call from() first"))?;
        if from.contains('/') {
            return Err(invalid_collection_path(format!(
                "The collection [{from}] is not compatible with collection group."
            )));
        }
        Ok(())
    }
}

async fn matching_keys(
    datastore: &Arc<dyn Datastore>,
    query: &NativeQuery,
) -> FirestoreResult<Vec<DocumentKey>> {
    Ok(datastore
        .run_query(query)
        .await?
        .into_iter()
        .map(|snapshot| snapshot.document_key().clone())
        .collect())
}

fn numeric_amount(amount: FirestoreValue, method: &str) -> FirestoreResult<FirestoreValue> {
    if amount.is_numeric() {
        Ok(amount)
    } else {
        Err(invalid_increment_amount(format!(
            "Non-numeric value passed to {method} method."
        )))
    }
}

fn negate(amount: FirestoreValue) -> FirestoreValue {
    match *amount.kind() {
        ValueKind::Integer(n) => match n.checked_neg() {
            Some(negated) => FirestoreValue::from_integer(negated),
            None => FirestoreValue::from_double(-(n as f64)),
        },
        ValueKind::Double(n) => FirestoreValue::from_double(-n),
        _ => amount.clone(),
    }
}

fn increment_data(
    field: &str,
    amount: FirestoreValue,
    extra: MapValue,
) -> FirestoreResult<MapValue> {
    let mut data = extra;
    data.set(
        &FieldPath::from_dot_separated(field)?,
        FirestoreValue::numeric_increment(amount),
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::error::FirestoreErrorCode;
    use crate::firestore::query::NativeOperation;
    use crate::test_support::{connection_with, record, users_fixture, RecordingDatastore};

    async fn seeded() -> (FirestoreConnection, Arc<RecordingDatastore>) {
        let store = Arc::new(RecordingDatastore::new());
        let connection = connection_with(store.clone());
        connection.table("users").insert(users_fixture()).await.unwrap();
        store.clear_commits();
        (connection, store)
    }

    fn ids(documents: &[DocumentSnapshot]) -> Vec<&str> {
        documents.iter().map(DocumentSnapshot::id).collect()
    }

    #[test]
    fn compiles_in_component_order() {
        let connection = FirestoreConnection::in_memory("demo");
        let compiled = connection
            .table("users")
            .limit(50)
            .order_by("age", OrderDirection::Ascending)
            .where_("age", ">", 18)
            .compile()
            .unwrap();
        assert_eq!(compiled.methods(), vec!["where", "orderBy", "limit"]);
        assert_eq!(
            compiled.calls()[0],
            NativeOperation::Where {
                field: FieldPath::from_dot_separated("age").unwrap(),
                operator: crate::firestore::query::FilterOperator::GreaterThan,
                value: 18.into(),
            }
        );
    }

    #[test]
    fn group_scoping_rejects_nested_paths() {
        let connection = FirestoreConnection::in_memory("demo");
        let err = connection
            .table("users/ann/posts")
            .in_collection_group()
            .err()
            .unwrap();
        assert_eq!(err.code, FirestoreErrorCode::InvalidCollectionPath);

        let err = connection
            .table("users/ann/posts")
            .in_document("orgs/acme")
            .err()
            .unwrap();
        assert_eq!(err.code, FirestoreErrorCode::InvalidCollectionPath);
    }

    #[test]
    fn scoped_group_with_filter_fails_to_compile() {
        let connection = FirestoreConnection::in_memory("demo");
        let err = connection
            .table("users")
            .in_document("orgs/acme")
            .unwrap()
            .where_("age", ">", 1)
            .compile()
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::UnsupportedFilteredGroupScope);
    }

    #[test]
    fn empty_select_projects_identity() {
        let connection = FirestoreConnection::in_memory("demo");
        let builder = connection.table("users").select(Vec::<String>::new());
        assert_eq!(builder.state().columns, vec!["__name__"]);
        assert_eq!(builder.to_sql().unwrap(), "select __name__ from users");
    }

    #[tokio::test]
    async fn get_filters_and_orders() {
        let (connection, _) = seeded().await;
        let adults = connection
            .table("users")
            .where_("age", ">=", 18)
            .order_by_desc("age")
            .get()
            .await
            .unwrap();
        assert_eq!(ids(&adults), vec!["cid", "ann", "dee"]);

        let first = connection
            .table("users")
            .order_by("age", OrderDirection::Ascending)
            .first()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id(), "bob");
    }

    #[tokio::test]
    async fn or_where_fails_before_reaching_the_store() {
        let (connection, store) = seeded().await;
        let err = connection
            .table("users")
            .where_("age", ">", 18)
            .or_where("role", "=", "admin")
            .get()
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::UnsupportedDisjunction);
        assert!(store.queries().is_empty());
    }

    #[tokio::test]
    async fn aggregates_reduce_client_side() {
        let (connection, _) = seeded().await;
        let users = connection.table("users");
        assert_eq!(users.count().await.unwrap(), 4);
        assert_eq!(users.min("age").await.unwrap(), Some(17.into()));
        assert_eq!(users.max("age").await.unwrap(), Some(42.into()));
        assert_eq!(users.sum("age").await.unwrap(), FirestoreValue::from(114));
        assert_eq!(users.avg("age").await.unwrap(), Some(28.5));
        assert_eq!(users.clone().where_("age", ">", 99).avg("age").await.unwrap(), None);
        assert!(users.exists().await.unwrap());
    }

    #[tokio::test]
    async fn insert_empty_is_trivial_success() {
        let (connection, store) = seeded().await;
        assert!(connection.table("users").insert(Vec::<MapValue>::new()).await.unwrap());
        assert!(store.commits().is_empty());
    }

    #[tokio::test]
    async fn insert_into_group_is_rejected() {
        let connection = FirestoreConnection::in_memory("demo");
        let err = connection
            .collection_group("users")
            .unwrap()
            .insert(record(vec![("name", "x".into())]))
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::InvalidArgument);
        assert_eq!(err.message(), "Collection group is not supported for insert queries.");
    }

    #[tokio::test]
    async fn insert_get_id_writes_sequence_field() {
        let connection = FirestoreConnection::in_memory("demo");
        let reference = connection
            .table("users")
            .insert_get_id(record(vec![("name", "Eve".into())]), Some("id"))
            .await
            .unwrap();
        let snapshot = reference.snapshot().await.unwrap();
        assert_eq!(
            snapshot.get("id"),
            Some(FirestoreValue::from_string(reference.id()))
        );
        assert_eq!(snapshot.get("name"), Some("Eve".into()));
        assert!(connection.records_have_been_modified());
    }

    #[tokio::test]
    async fn update_merges_and_counts() {
        let (connection, _) = seeded().await;
        let updated = connection
            .table("users")
            .where_("role", "=", "user")
            .update(record(vec![("active", true.into())]))
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let bob = connection.document("users/bob").unwrap().snapshot().await.unwrap();
        assert_eq!(bob.get("active"), Some(true.into()));
        assert_eq!(bob.get("age"), Some(17.into()));
    }

    #[tokio::test]
    async fn increment_rejects_non_numeric_before_network() {
        let (connection, store) = seeded().await;
        let err = connection
            .table("users")
            .increment("age", "lots")
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::InvalidIncrementAmount);
        assert!(store.queries().is_empty());
    }

    #[tokio::test]
    async fn update_rejects_bad_payload_before_reading() {
        let (connection, store) = seeded().await;
        let err = connection
            .table("users")
            .where_("role", "=", "user")
            .update(record(vec![(
                "visits",
                FirestoreValue::numeric_increment("x".into()),
            )]))
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::InvalidArgument);
        assert!(store.queries().is_empty());
        assert!(store.commit_sizes().is_empty());

        let err = connection
            .table("users")
            .update(record(vec![(
                "tags",
                FirestoreValue::from_array(vec![FirestoreValue::delete_field()]),
            )]))
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::InvalidArgument);
        assert!(store.queries().is_empty());
    }

    #[tokio::test]
    async fn update_without_matches_or_fields_reports_zero() {
        let (connection, store) = seeded().await;
        let updated = connection
            .table("users")
            .where_("age", ">", 100)
            .update(record(vec![("active", true.into())]))
            .await
            .unwrap();
        assert_eq!(updated, 0);

        let updated = connection
            .table("users")
            .where_("age", ">", 100)
            .update(MapValue::default())
            .await
            .unwrap();
        assert_eq!(updated, 0);

        let updated = connection
            .table("users")
            .update(record(vec![("__name__", "ann".into())]))
            .await
            .unwrap();
        assert_eq!(updated, 0);
        assert!(store.commit_sizes().is_empty());
    }

    #[test]
    fn debug_output_shows_state() {
        let connection = FirestoreConnection::in_memory("demo");
        let rendered = format!("{:?}", connection.table("users").where_("age", ">", 18));
        assert!(rendered.starts_with("QueryBuilder"));
        assert!(rendered.contains("users"));
    }

    #[tokio::test]
    async fn decrement_negates_amount() {
        let (connection, _) = seeded().await;
        connection
            .table("users")
            .where_key("ann")
            .decrement("age", 5)
            .await
            .unwrap();
        let ann = connection.document("users/ann").unwrap().snapshot().await.unwrap();
        assert_eq!(ann.get("age"), Some(25.into()));
    }

    #[tokio::test]
    async fn delete_removes_matches_and_subcollections() {
        let (connection, store) = seeded().await;
        connection
            .table("users/ann/posts")
            .insert(record(vec![("title", "hi".into())]))
            .await
            .unwrap();

        let deleted = connection
            .table("users")
            .where_("age", ">", 20)
            .delete()
            .await
            .unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(store.inner().paths(), vec!["users/bob"]);
    }

    #[tokio::test]
    async fn of_scopes_a_group_by_name_range() {
        let connection = FirestoreConnection::in_memory("demo");
        connection
            .table("orgs/acme/members")
            .insert(record(vec![("__name__", "m1".into())]))
            .await
            .unwrap();
        connection
            .table("orgs/beta/members")
            .insert(record(vec![("__name__", "m2".into())]))
            .await
            .unwrap();

        let members = connection
            .table("members")
            .of("orgs/acme")
            .unwrap()
            .get()
            .await
            .unwrap();
        assert_eq!(ids(&members), vec!["m1"]);
    }

    #[tokio::test]
    async fn pretend_logs_without_writing() {
        let (connection, store) = seeded().await;
        let entries = connection
            .pretend(|conn| async move {
                let deleted = conn.table("users").where_("age", ">", 20).delete().await?;
                assert_eq!(deleted, 0);
                Ok::<(), crate::firestore::error::FirestoreError>(())
            })
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].query, "delete from users where age > 20");
        assert!(store.commits().is_empty());
        assert_eq!(store.inner().len(), 4);
    }

    #[tokio::test]
    async fn failed_chunk_reports_statement_and_position() {
        let store = Arc::new(RecordingDatastore::new().failing_commit(2));
        let connection = connection_with(store.clone());
        let records: Vec<MapValue> = (0..150)
            .map(|n| record(vec![("n", FirestoreValue::from_integer(n))]))
            .collect();

        let err = connection.table("items").insert(records).await.unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::TransportFailure);
        assert_eq!(err.status(), Some("RESOURCE_EXHAUSTED"));
        assert!(err.query().unwrap().starts_with("insert into items (n) values (0), (1)"));
        let chunk = err.chunk().unwrap();
        assert_eq!((chunk.index, chunk.total), (2, 2));
        assert_eq!(store.inner().len(), 100);
    }

    #[test]
    fn records_from_json() {
        let single = Records::from_json(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(single.len(), 1);
        let many = Records::from_json(&serde_json::json!([{"a": 1}, {"b": 2}])).unwrap();
        assert_eq!(many.len(), 2);
        assert!(Records::from_json(&serde_json::json!([1])).is_err());
    }
}
