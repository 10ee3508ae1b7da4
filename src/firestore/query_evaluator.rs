use std::cmp::Ordering;

use crate::firestore::api::DocumentSnapshot;
use crate::firestore::model::FieldPath;
use crate::firestore::query::{
    Bound, FieldFilter, FilterOperator, LimitType, NativeQuery, OrderBy, OrderDirection,
    QuerySource,
};
use crate::firestore::value::{FirestoreValue, MapValue, ValueKind};

/// Evaluates a native query over candidate documents: source matching, filters,
/// effective ordering, cursors, offset, limit and projection.
pub(crate) fn apply_query_to_documents(
    documents: Vec<DocumentSnapshot>,
    query: &NativeQuery,
) -> Vec<DocumentSnapshot> {
    let order_by = query.normalized_order_by();
    let filters: Vec<FieldFilter> = query
        .filters()
        .iter()
        .map(|filter| normalize_filter(filter, query.source()))
        .collect();
    let start = query
        .start_at_bound()
        .map(|bound| normalize_bound(bound, &order_by, query.source()));
    let end = query
        .end_at_bound()
        .map(|bound| normalize_bound(bound, &order_by, query.source()));

    let mut matched: Vec<DocumentSnapshot> = documents
        .into_iter()
        .filter(|snapshot| snapshot.exists())
        .filter(|snapshot| query.source().matches(snapshot.document_key()))
        .filter(|snapshot| filters.iter().all(|filter| satisfies(snapshot, filter)))
        .collect();

    matched.sort_by(|left, right| compare_snapshots(left, right, &order_by));

    if let Some(bound) = &start {
        matched.retain(|snapshot| !is_before_start(snapshot, bound, &order_by));
    }
    if let Some(bound) = &end {
        matched.retain(|snapshot| !is_after_end(snapshot, bound, &order_by));
    }

    let offset = query.offset_value().unwrap_or(0) as usize;
    match (query.limit_type(), query.limit_value()) {
        (LimitType::Last, Some(limit)) => {
            let keep_until = matched.len().saturating_sub(offset);
            matched.truncate(keep_until);
            let start = matched.len().saturating_sub(limit as usize);
            matched.drain(0..start);
        }
        (_, limit) => {
            matched.drain(0..offset.min(matched.len()));
            if let Some(limit) = limit {
                matched.truncate(limit as usize);
            }
        }
    }

    match query.projection() {
        Some(fields) => matched
            .into_iter()
            .map(|snapshot| project(snapshot, fields))
            .collect(),
        None => matched,
    }
}

fn project(snapshot: DocumentSnapshot, fields: &[FieldPath]) -> DocumentSnapshot {
    let mut projected = MapValue::default();
    for field in fields.iter().filter(|field| !field.is_document_id()) {
        if let Some(value) = snapshot.map_value().and_then(|data| data.get(field)) {
            projected.set(field, value.clone());
        }
    }
    snapshot.with_data(projected)
}

/// Document-id operands may be given as plain paths or ids; compare them as references.
pub(crate) fn document_id_operand(value: &FirestoreValue, source: &QuerySource) -> FirestoreValue {
    match value.kind() {
        ValueKind::String(path) if !path.contains('/') => match source {
            QuerySource::Collection(collection) => {
                FirestoreValue::from_reference(collection.child([path.as_str()]).canonical_string())
            }
            QuerySource::CollectionGroup { .. } => FirestoreValue::from_reference(path.clone()),
        },
        ValueKind::String(path) => FirestoreValue::from_reference(path.trim_matches('/')),
        ValueKind::Array(array) => FirestoreValue::from_array(
            array
                .values()
                .iter()
                .map(|item| document_id_operand(item, source))
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn normalize_filter(filter: &FieldFilter, source: &QuerySource) -> FieldFilter {
    if !filter.field().is_document_id() {
        return filter.clone();
    }
    FieldFilter::new(
        filter.field().clone(),
        filter.operator(),
        document_id_operand(filter.value(), source),
    )
}

fn normalize_bound(bound: &Bound, order_by: &[OrderBy], source: &QuerySource) -> Bound {
    let values = bound
        .values()
        .iter()
        .enumerate()
        .map(|(index, value)| match order_by.get(index) {
            Some(order) if order.field().is_document_id() => document_id_operand(value, source),
            _ => value.clone(),
        })
        .collect();
    Bound::new(values, bound.inclusive())
}

fn satisfies(snapshot: &DocumentSnapshot, filter: &FieldFilter) -> bool {
    let Some(value) = snapshot.field(filter.field()) else {
        return false;
    };
    let operand = filter.value();
    match filter.operator() {
        FilterOperator::Equal => value.store_equals(operand),
        FilterOperator::NotEqual => !value.is_null() && !value.store_equals(operand),
        FilterOperator::LessThan => comparable(&value, operand) && value.compare(operand) == Ordering::Less,
        FilterOperator::LessThanOrEqual => {
            comparable(&value, operand) && value.compare(operand) != Ordering::Greater
        }
        FilterOperator::GreaterThan => {
            comparable(&value, operand) && value.compare(operand) == Ordering::Greater
        }
        FilterOperator::GreaterThanOrEqual => {
            comparable(&value, operand) && value.compare(operand) != Ordering::Less
        }
        FilterOperator::ArrayContains => value
            .as_array()
            .map_or(false, |array| array.contains(operand)),
        FilterOperator::ArrayContainsAny => match (value.as_array(), operand.as_array()) {
            (Some(array), Some(needles)) => array.contains_any(needles),
            _ => false,
        },
        FilterOperator::In => operand.as_array().map_or(false, |needles| needles.contains(&value)),
        FilterOperator::NotIn => {
            !value.is_null() && operand.as_array().map_or(false, |needles| !needles.contains(&value))
        }
    }
}

/// Range filters only match values of the operand's type.
fn comparable(left: &FirestoreValue, right: &FirestoreValue) -> bool {
    std::mem::discriminant(left.kind()) == std::mem::discriminant(right.kind())
        || (left.is_numeric() && right.is_numeric())
}

fn order_value(snapshot: &DocumentSnapshot, field: &FieldPath) -> FirestoreValue {
    snapshot.field(field).unwrap_or_else(FirestoreValue::null)
}

fn compare_snapshots(left: &DocumentSnapshot, right: &DocumentSnapshot, order_by: &[OrderBy]) -> Ordering {
    for order in order_by {
        let mut ordering = order_value(left, order.field()).compare(&order_value(right, order.field()));
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_to_bound(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> Ordering {
    for (order, bound_value) in order_by.iter().zip(bound.values()) {
        let mut ordering = order_value(snapshot, order.field()).compare(bound_value);
        if order.direction() == OrderDirection::Descending {
            ordering = ordering.reverse();
        }
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn is_before_start(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> bool {
    let ordering = compare_to_bound(snapshot, bound, order_by);
    if bound.inclusive() {
        ordering == Ordering::Less
    } else {
        ordering != Ordering::Greater
    }
}

fn is_after_end(snapshot: &DocumentSnapshot, bound: &Bound, order_by: &[OrderBy]) -> bool {
    let ordering = compare_to_bound(snapshot, bound, order_by);
    if bound.inclusive() {
        ordering == Ordering::Greater
    } else {
        ordering != Ordering::Less
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::constants::PATH_RANGE_END;
    use crate::firestore::model::{DocumentKey, ResourcePath};
    use std::collections::BTreeMap;

    fn snapshot(path: &str, age: i64) -> DocumentSnapshot {
        let key = DocumentKey::from_string(path).unwrap();
        let data = MapValue::new(BTreeMap::from([
            ("age".to_string(), FirestoreValue::from_integer(age)),
            ("name".to_string(), FirestoreValue::from_string(key.id())),
        ]));
        DocumentSnapshot::new(key, Some(data))
    }

    fn field(path: &str) -> FieldPath {
        FieldPath::from_dot_separated(path).unwrap()
    }

    fn users() -> NativeQuery {
        NativeQuery::collection(ResourcePath::from_string("users").unwrap()).unwrap()
    }

    fn docs() -> Vec<DocumentSnapshot> {
        vec![
            snapshot("users/sam", 40),
            snapshot("users/ann", 17),
            snapshot("users/bob", 25),
            snapshot("users/cid", 33),
            snapshot("teams/red", 99),
        ]
    }

    fn ids(result: &[DocumentSnapshot]) -> Vec<&str> {
        result.iter().map(|doc| doc.id()).collect()
    }

    #[test]
    fn filters_orders_and_limits() {
        let query = users()
            .where_field(field("age"), FilterOperator::GreaterThan, 18.into())
            .unwrap()
            .order_by(field("age"), OrderDirection::Ascending)
            .limit(2);
        let result = apply_query_to_documents(docs(), &query);
        assert_eq!(ids(&result), vec!["bob", "cid"]);
    }

    #[test]
    fn limit_to_last_keeps_the_tail() {
        let query = users().order_by(field("age"), OrderDirection::Ascending).limit_to_last(2);
        let result = apply_query_to_documents(docs(), &query);
        assert_eq!(ids(&result), vec!["cid", "sam"]);
    }

    #[test]
    fn cursors_respect_inclusiveness() {
        let query = users()
            .order_by(field("age"), OrderDirection::Ascending)
            .start_after(vec![17.into()])
            .end_at(vec![33.into()]);
        let result = apply_query_to_documents(docs(), &query);
        assert_eq!(ids(&result), vec!["bob", "cid"]);
    }

    #[test]
    fn offset_and_projection() {
        let query = users()
            .order_by(field("name"), OrderDirection::Ascending)
            .offset(1)
            .select(vec![FieldPath::document_id()]);
        let result = apply_query_to_documents(docs(), &query);
        assert_eq!(ids(&result), vec!["bob", "cid", "sam"]);
        assert!(result[0].data().unwrap().is_empty());
    }

    #[test]
    fn document_name_range_scopes_a_group() {
        let documents = vec![
            snapshot("orgs/acme/users/a", 1),
            snapshot("orgs/acme/teams/t/users/b", 2),
            snapshot("orgs/acmf/users/c", 3),
            snapshot("users/d", 4),
        ];
        let query = NativeQuery::collection_group("users", None)
            .unwrap()
            .order_by(FieldPath::document_id(), OrderDirection::Ascending)
            .start_at(vec!["orgs/acme".into()])
            .end_at(vec![format!("orgs/acme{PATH_RANGE_END}").into()]);
        let result = apply_query_to_documents(documents, &query);
        assert_eq!(ids(&result), vec!["b", "a"]);
    }

    #[test]
    fn null_equality_and_not_equal() {
        let key = DocumentKey::from_string("users/nil").unwrap();
        let data = MapValue::new(BTreeMap::from([(
            "age".to_string(),
            FirestoreValue::null(),
        )]));
        let mut documents = docs();
        documents.push(DocumentSnapshot::new(key, Some(data)));

        let is_null = users()
            .where_field(field("age"), FilterOperator::Equal, FirestoreValue::null())
            .unwrap();
        assert_eq!(ids(&apply_query_to_documents(documents.clone(), &is_null)), vec!["nil"]);

        let not_null = users()
            .where_field(field("age"), FilterOperator::NotEqual, FirestoreValue::null())
            .unwrap();
        assert_eq!(apply_query_to_documents(documents, &not_null).len(), 4);
    }
}
