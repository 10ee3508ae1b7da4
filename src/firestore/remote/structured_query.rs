use serde_json::{json, Value as JsonValue};

use crate::firestore::query::{Bound, FieldFilter, FilterOperator, NativeQuery, OrderBy};
use crate::firestore::query_evaluator::document_id_operand;
use crate::firestore::remote::serializer::{encode_field_path, JsonProtoSerializer};
use crate::firestore::value::ValueKind;

/// Encodes `query` as a REST `StructuredQuery`.
///
/// The caller is expected to pass a first-limited query: limit-to-last handles
/// are rewritten with [`NativeQuery::to_first_limited`] beforehand.
pub(crate) fn encode_structured_query(
    serializer: &JsonProtoSerializer,
    query: &NativeQuery,
) -> JsonValue {
    let mut structured = serde_json::Map::new();

    if let Some(fields) = query.projection() {
        let field_entries: Vec<_> = fields
            .iter()
            .map(|field| json!({ "fieldPath": encode_field_path(field) }))
            .collect();
        structured.insert("select".to_string(), json!({ "fields": field_entries }));
    }

    structured.insert(
        "from".to_string(),
        json!([{
            "collectionId": query.source().collection_id(),
            "allDescendants": query.source().is_collection_group(),
        }]),
    );

    if !query.filters().is_empty() {
        structured.insert("where".to_string(), encode_filters(serializer, query));
    }

    let orders = request_order_by(query);
    if !orders.is_empty() {
        let encoded: Vec<_> = orders
            .iter()
            .map(|order| {
                json!({
                    "field": { "fieldPath": encode_field_path(order.field()) },
                    "direction": order.direction().wire_name(),
                })
            })
            .collect();
        structured.insert("orderBy".to_string(), JsonValue::Array(encoded));
    }

    if let Some(start) = query.start_at_bound() {
        structured.insert(
            "startAt".to_string(),
            encode_cursor(serializer, query, &orders, start, true),
        );
    }

    if let Some(end) = query.end_at_bound() {
        structured.insert(
            "endAt".to_string(),
            encode_cursor(serializer, query, &orders, end, false),
        );
    }

    if let Some(offset) = query.offset_value() {
        structured.insert("offset".to_string(), json!(offset));
    }

    if let Some(limit) = query.limit_value() {
        structured.insert("limit".to_string(), json!(limit));
    }

    JsonValue::Object(structured)
}

/// Explicit orders are sent as-is; cursors need the full normalized ordering so
/// every cursor value lines up with an order clause.
fn request_order_by(query: &NativeQuery) -> Vec<OrderBy> {
    if query.start_at_bound().is_some() || query.end_at_bound().is_some() {
        query.normalized_order_by()
    } else {
        query.explicit_order_by().to_vec()
    }
}

fn encode_filters(serializer: &JsonProtoSerializer, query: &NativeQuery) -> JsonValue {
    let filters = query.filters();
    if filters.len() == 1 {
        return encode_filter(serializer, query, &filters[0]);
    }

    let nested: Vec<_> = filters
        .iter()
        .map(|filter| encode_filter(serializer, query, filter))
        .collect();

    json!({
        "compositeFilter": {
            "op": "AND",
            "filters": nested
        }
    })
}

fn encode_filter(
    serializer: &JsonProtoSerializer,
    query: &NativeQuery,
    filter: &FieldFilter,
) -> JsonValue {
    let field = json!({ "fieldPath": encode_field_path(filter.field()) });
    let unary = match (filter.operator(), filter.value().kind()) {
        (FilterOperator::Equal, ValueKind::Null) => Some("IS_NULL"),
        (FilterOperator::NotEqual, ValueKind::Null) => Some("IS_NOT_NULL"),
        (FilterOperator::Equal, ValueKind::Double(n)) if n.is_nan() => Some("IS_NAN"),
        (FilterOperator::NotEqual, ValueKind::Double(n)) if n.is_nan() => Some("IS_NOT_NAN"),
        _ => None,
    };
    if let Some(op) = unary {
        return json!({ "unaryFilter": { "field": field, "op": op } });
    }

    let value = if filter.field().is_document_id() {
        document_id_operand(filter.value(), query.source())
    } else {
        filter.value().clone()
    };
    json!({
        "fieldFilter": {
            "field": field,
            "op": filter.operator().wire_name(),
            "value": serializer.encode_value(&value),
        }
    })
}

fn encode_cursor(
    serializer: &JsonProtoSerializer,
    query: &NativeQuery,
    orders: &[OrderBy],
    bound: &Bound,
    start: bool,
) -> JsonValue {
    let values: Vec<_> = bound
        .values()
        .iter()
        .enumerate()
        .map(|(index, value)| match orders.get(index) {
            Some(order) if order.field().is_document_id() => {
                serializer.encode_value(&document_id_operand(value, query.source()))
            }
            _ => serializer.encode_value(value),
        })
        .collect();
    json!({
        "values": values,
        "before": if start { bound.inclusive() } else { !bound.inclusive() },
    })
}
