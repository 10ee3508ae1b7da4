use std::collections::BTreeSet;

use crate::firestore::error::FirestoreResult;
use crate::firestore::query::compiler::{compile_operations, NativeOperation};
use crate::firestore::query::native::FilterOperator;
use crate::firestore::query::state::QueryState;
use crate::firestore::value::{FirestoreValue, MapValue, SentinelValue, ValueKind};

/// Renders `state` as a relational-style statement for logs and error messages.
///
/// Clause order is the native compiler's component order, literals are inlined.
pub fn compile_readable(state: &QueryState) -> FirestoreResult<String> {
    let operations = compile_operations(state)?;
    let clauses = Clauses::from_operations(&operations);
    let mut parts = vec![clauses.select.unwrap_or_else(|| "select *".to_string())];
    parts.push(format!("from {}", clauses.source));
    parts.extend(clauses.rest);
    Ok(parts.join(" "))
}

pub fn readable_insert(collection: &str, records: &[MapValue]) -> String {
    let columns: BTreeSet<&String> = records.iter().flat_map(|r| r.fields().keys()).collect();
    let rows: Vec<String> = records
        .iter()
        .map(|record| {
            let values: Vec<String> = columns
                .iter()
                .map(|column| {
                    record
                        .fields()
                        .get(*column)
                        .map(render_value)
                        .unwrap_or_else(|| "null".to_string())
                })
                .collect();
            format!("({})", values.join(", "))
        })
        .collect();
    let columns: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
    format!(
        "insert into {collection} ({}) values {}",
        columns.join(", "),
        rows.join(", ")
    )
}

pub fn readable_update(state: &QueryState, data: &MapValue) -> FirestoreResult<String> {
    let operations = compile_operations(&state.without_projection())?;
    let clauses = Clauses::from_operations(&operations);
    let assignments: Vec<String> = data
        .fields()
        .iter()
        .map(|(field, value)| format!("{field} = {}", render_value(value)))
        .collect();
    let mut parts = vec![
        format!("update {}", clauses.source),
        format!("set {}", assignments.join(", ")),
    ];
    parts.extend(clauses.rest);
    Ok(parts.join(" "))
}

pub fn readable_delete(state: &QueryState) -> FirestoreResult<String> {
    let operations = compile_operations(&state.without_projection())?;
    let clauses = Clauses::from_operations(&operations);
    let mut parts = vec![format!("delete from {}", clauses.source)];
    parts.extend(clauses.rest);
    Ok(parts.join(" "))
}

struct Clauses {
    select: Option<String>,
    source: String,
    rest: Vec<String>,
}

impl Clauses {
    fn from_operations(operations: &[NativeOperation]) -> Self {
        let mut clauses = Clauses {
            select: None,
            source: String::new(),
            rest: Vec::new(),
        };
        let mut wheres = Vec::new();
        let mut orders = Vec::new();

        // wheres and orders are contiguous in component order; flush on the
        // first descriptor that follows them
        let flush = |rest: &mut Vec<String>, wheres: &mut Vec<String>, orders: &mut Vec<String>| {
            if !wheres.is_empty() {
                rest.push(format!("where {}", wheres.join(" and ")));
                wheres.clear();
            }
            if !orders.is_empty() {
                rest.push(format!("order by {}", orders.join(", ")));
                orders.clear();
            }
        };

        for operation in operations {
            match operation {
                NativeOperation::Select(fields) => {
                    let names: Vec<String> = fields.iter().map(|f| f.canonical_string()).collect();
                    clauses.select = Some(format!("select {}", names.join(", ")));
                }
                NativeOperation::Collection(path) => clauses.source = path.canonical_string(),
                NativeOperation::CollectionGroup {
                    collection_id,
                    parent,
                } => {
                    clauses.source = match parent {
                        Some(parent) => format!("all {collection_id} in ({parent})"),
                        None => format!("all {collection_id}"),
                    };
                }
                NativeOperation::Where {
                    field,
                    operator,
                    value,
                } => wheres.push(render_condition(&field.canonical_string(), *operator, value)),
                NativeOperation::OrderBy { field, direction } => {
                    if !wheres.is_empty() {
                        flush(&mut clauses.rest, &mut wheres, &mut Vec::new());
                    }
                    orders.push(format!("{} {}", field.canonical_string(), direction.as_str()))
                }
                other => {
                    flush(&mut clauses.rest, &mut wheres, &mut orders);
                    clauses.rest.push(render_tail(other));
                }
            }
        }
        flush(&mut clauses.rest, &mut wheres, &mut orders);
        clauses
    }
}

fn render_condition(field: &str, operator: FilterOperator, value: &FirestoreValue) -> String {
    match (operator, value.kind()) {
        (FilterOperator::Equal, ValueKind::Null) => format!("{field} is null"),
        (FilterOperator::NotEqual, ValueKind::Null) => format!("{field} is not null"),
        (FilterOperator::In, _) => format!("{field} in {}", render_list(value)),
        (FilterOperator::NotIn, _) => format!("{field} not in {}", render_list(value)),
        (operator, _) => format!("{field} {} {}", operator.as_str(), render_value(value)),
    }
}

fn render_tail(operation: &NativeOperation) -> String {
    match operation {
        NativeOperation::StartAt(values) => format!("start at {}", render_tuple(values)),
        NativeOperation::EndAt(values) => format!("end at {}", render_tuple(values)),
        NativeOperation::StartAfter(values) => format!("start after {}", render_tuple(values)),
        NativeOperation::EndBefore(values) => format!("end before {}", render_tuple(values)),
        NativeOperation::Offset(n) => format!("offset {n}"),
        NativeOperation::Limit(n) => format!("limit {n}"),
        NativeOperation::LimitToLast(n) => format!("limit to last {n}"),
        other => other.method().to_string(),
    }
}

fn render_tuple(values: &[FirestoreValue]) -> String {
    let rendered: Vec<String> = values.iter().map(render_value).collect();
    format!("({})", rendered.join(", "))
}

fn render_list(value: &FirestoreValue) -> String {
    match value.kind() {
        ValueKind::Array(array) => render_tuple(array.values()),
        _ => render_value(value),
    }
}

/// Literal form of a value as it appears in diagnostics.
pub fn render_value(value: &FirestoreValue) -> String {
    match value.kind() {
        ValueKind::Null => "null".to_string(),
        ValueKind::Boolean(b) => b.to_string(),
        ValueKind::Integer(i) => i.to_string(),
        ValueKind::Double(d) => d.to_string(),
        ValueKind::Timestamp(ts) => format!("timestamp('{}')", ts.to_rfc3339()),
        ValueKind::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        ValueKind::Bytes(bytes) => format!("bytes('{}')", bytes.to_base64()),
        ValueKind::Reference(path) => format!("ref('{path}')"),
        ValueKind::Array(array) => {
            let items: Vec<String> = array.values().iter().map(render_value).collect();
            format!("[{}]", items.join(", "))
        }
        ValueKind::Map(map) => {
            let items: Vec<String> = map
                .fields()
                .iter()
                .map(|(key, value)| format!("{key}: {}", render_value(value)))
                .collect();
            format!("{{{}}}", items.join(", "))
        }
        ValueKind::Sentinel(SentinelValue::NumericIncrement(operand)) => {
            format!("increment({})", render_value(operand))
        }
        ValueKind::Sentinel(SentinelValue::DeleteField) => "delete()".to_string(),
    }
}
