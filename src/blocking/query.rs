use crate::firestore::api::{
    DocumentBacked, DocumentReference, DocumentSnapshot, ModelRepository, QueryBuilder, Records,
    WriteBatch,
};
use crate::firestore::error::FirestoreResult;
use crate::firestore::value::{FirestoreValue, MapValue};

use super::{block_on, block_on_methods};

block_on_methods! {
    fn get(query: &QueryBuilder) -> Vec<DocumentSnapshot>;
    fn first(query: &QueryBuilder) -> Option<DocumentSnapshot>;
    fn exists(query: &QueryBuilder) -> bool;
    fn doesnt_exist(query: &QueryBuilder) -> bool;
    fn count(query: &QueryBuilder) -> usize;
    fn min(query: &QueryBuilder, field: &str) -> Option<FirestoreValue>;
    fn max(query: &QueryBuilder, field: &str) -> Option<FirestoreValue>;
    fn sum(query: &QueryBuilder, field: &str) -> FirestoreValue;
    fn avg(query: &QueryBuilder, field: &str) -> Option<f64>;
    fn update(query: &QueryBuilder, data: MapValue) -> usize;
    fn delete(query: &QueryBuilder) -> usize;
    fn insert_get_id(query: &QueryBuilder, record: MapValue, sequence: Option<&str>) -> DocumentReference;
}

pub fn insert(query: &QueryBuilder, records: impl Into<Records>) -> FirestoreResult<bool> {
    block_on(query.insert(records))
}

pub fn increment(
    query: &QueryBuilder,
    field: &str,
    amount: impl Into<FirestoreValue>,
) -> FirestoreResult<usize> {
    block_on(query.increment(field, amount))
}

pub fn decrement(
    query: &QueryBuilder,
    field: &str,
    amount: impl Into<FirestoreValue>,
) -> FirestoreResult<usize> {
    block_on(query.decrement(field, amount))
}

pub fn delete_by_id(query: &QueryBuilder, id: impl Into<FirestoreValue>) -> FirestoreResult<usize> {
    block_on(query.delete_by_id(id))
}

pub fn commit(batch: WriteBatch) -> FirestoreResult<()> {
    block_on(batch.commit())
}

pub fn save<M: DocumentBacked>(repository: &ModelRepository<M>, model: &mut M) -> FirestoreResult<bool> {
    block_on(repository.save(model))
}

pub fn delete_model<M: DocumentBacked>(
    repository: &ModelRepository<M>,
    model: &mut M,
) -> FirestoreResult<bool> {
    block_on(repository.delete(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::api::{DocumentModel, FirestoreConnection};
    use crate::test_support::users_fixture;

    #[test]
    fn runs_queries_without_an_async_context() {
        let connection = FirestoreConnection::in_memory("demo");
        let users = connection.table("users");
        assert!(insert(&users, users_fixture()).unwrap());

        let adults = connection.table("users").where_("age", ">=", 18);
        assert_eq!(count(&adults).unwrap(), 3);
        assert_eq!(max(&adults, "age").unwrap(), Some(42.into()));

        assert_eq!(increment(&connection.table("users").where_key("bob"), "age", 1).unwrap(), 1);
        assert_eq!(count(&adults).unwrap(), 4);

        assert_eq!(delete(&connection.table("users").where_("role", "=", "user")).unwrap(), 2);
        assert!(doesnt_exist(&connection.table("users").where_("role", "=", "user")).unwrap());
    }

    #[test]
    fn saves_models() {
        let connection = FirestoreConnection::in_memory("demo");
        let repository = ModelRepository::new(connection.clone());
        let mut post = DocumentModel::new("posts");
        post.set("title", "Hello").unwrap();

        assert!(save(&repository, &mut post).unwrap());
        assert!(post.exists());
        assert_eq!(count(&connection.table("posts")).unwrap(), 1);

        assert!(delete_model(&repository, &mut post).unwrap());
        assert_eq!(count(&connection.table("posts")).unwrap(), 0);
    }
}
