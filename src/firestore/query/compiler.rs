use crate::firestore::error::{invalid_argument, invalid_collection_path, FirestoreResult};
use crate::firestore::model::{FieldPath, ResourcePath};
use crate::firestore::query::native::{FilterOperator, NativeQuery, OrderDirection, QuerySource};
use crate::firestore::query::predicate::PredicateCompiler;
use crate::firestore::query::state::QueryState;
use crate::firestore::value::FirestoreValue;

/// Query components in compilation order. Both the native and the readable
/// compiler walk this list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    Columns,
    From,
    Wheres,
    Orders,
    StartAt,
    EndAt,
    StartAfter,
    EndBefore,
    Offset,
    Limit,
    LimitToLast,
}

pub const COMPONENTS: [Component; 11] = [
    Component::Columns,
    Component::From,
    Component::Wheres,
    Component::Orders,
    Component::StartAt,
    Component::EndAt,
    Component::StartAfter,
    Component::EndBefore,
    Component::Offset,
    Component::Limit,
    Component::LimitToLast,
];

/// One `{method, arguments}` call against the native query handle.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeOperation {
    Select(Vec<FieldPath>),
    Collection(ResourcePath),
    CollectionGroup {
        collection_id: String,
        parent: Option<ResourcePath>,
    },
    Where {
        field: FieldPath,
        operator: FilterOperator,
        value: FirestoreValue,
    },
    OrderBy {
        field: FieldPath,
        direction: OrderDirection,
    },
    StartAt(Vec<FirestoreValue>),
    EndAt(Vec<FirestoreValue>),
    StartAfter(Vec<FirestoreValue>),
    EndBefore(Vec<FirestoreValue>),
    Offset(u32),
    Limit(u32),
    LimitToLast(u32),
}

impl NativeOperation {
    pub fn method(&self) -> &'static str {
        match self {
            NativeOperation::Select(_) => "select",
            NativeOperation::Collection(_) => "collection",
            NativeOperation::CollectionGroup { .. } => "collectionGroup",
            NativeOperation::Where { .. } => "where",
            NativeOperation::OrderBy { .. } => "orderBy",
            NativeOperation::StartAt(_) => "startAt",
            NativeOperation::EndAt(_) => "endAt",
            NativeOperation::StartAfter(_) => "startAfter",
            NativeOperation::EndBefore(_) => "endBefore",
            NativeOperation::Offset(_) => "offset",
            NativeOperation::Limit(_) => "limit",
            NativeOperation::LimitToLast(_) => "limitToLast",
        }
    }

    /// Descriptors whose arguments are all empty or zero are skipped, which
    /// keeps builder defaults from reaching the store.
    pub fn is_noop(&self) -> bool {
        match self {
            NativeOperation::Select(fields) => fields.is_empty(),
            NativeOperation::StartAt(values)
            | NativeOperation::EndAt(values)
            | NativeOperation::StartAfter(values)
            | NativeOperation::EndBefore(values) => values.is_empty(),
            NativeOperation::Offset(n) | NativeOperation::Limit(n) | NativeOperation::LimitToLast(n) => {
                *n == 0
            }
            _ => false,
        }
    }

    fn source(&self) -> Option<QuerySource> {
        match self {
            NativeOperation::Collection(path) => Some(QuerySource::Collection(path.clone())),
            NativeOperation::CollectionGroup {
                collection_id,
                parent,
            } => Some(QuerySource::CollectionGroup {
                collection_id: collection_id.clone(),
                parent: parent.clone(),
            }),
            _ => None,
        }
    }

    fn apply(&self, query: NativeQuery) -> FirestoreResult<NativeQuery> {
        Ok(match self {
            NativeOperation::Select(fields) => query.select(fields.clone()),
            NativeOperation::Collection(_) | NativeOperation::CollectionGroup { .. } => query,
            NativeOperation::Where {
                field,
                operator,
                value,
            } => query.where_field(field.clone(), *operator, value.clone())?,
            NativeOperation::OrderBy { field, direction } => query.order_by(field.clone(), *direction),
            NativeOperation::StartAt(values) => query.start_at(values.clone()),
            NativeOperation::EndAt(values) => query.end_at(values.clone()),
            NativeOperation::StartAfter(values) => query.start_after(values.clone()),
            NativeOperation::EndBefore(values) => query.end_before(values.clone()),
            NativeOperation::Offset(n) => query.offset(*n),
            NativeOperation::Limit(n) => query.limit(*n),
            NativeOperation::LimitToLast(n) => query.limit_to_last(*n),
        })
    }
}

/// Output of the native compiler: the `from` descriptor becomes the handle's
/// source and `calls` holds every other descriptor in component order.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledQuery {
    source: QuerySource,
    calls: Vec<NativeOperation>,
}

impl CompiledQuery {
    pub fn source(&self) -> &QuerySource {
        &self.source
    }

    pub fn calls(&self) -> &[NativeOperation] {
        &self.calls
    }

    pub fn methods(&self) -> Vec<&'static str> {
        self.calls.iter().map(NativeOperation::method).collect()
    }

    /// Applies the descriptors to a fresh handle.
    pub fn to_native(&self) -> FirestoreResult<NativeQuery> {
        let mut query = match &self.source {
            QuerySource::Collection(path) => NativeQuery::collection(path.clone())?,
            QuerySource::CollectionGroup {
                collection_id,
                parent,
            } => NativeQuery::collection_group(collection_id.clone(), parent.clone())?,
        };
        for call in &self.calls {
            query = call.apply(query)?;
        }
        Ok(query)
    }
}

/// Compiles one component of `state` into zero or more descriptors.
pub fn compile_component(
    component: Component,
    state: &QueryState,
) -> FirestoreResult<Vec<NativeOperation>> {
    let operations = match component {
        Component::Columns => {
            if state.projects_all() {
                Vec::new()
            } else {
                let fields = state
                    .columns
                    .iter()
                    .map(|column| FieldPath::from_dot_separated(column))
                    .collect::<FirestoreResult<Vec<_>>>()?;
                vec![NativeOperation::Select(fields)]
            }
        }
        Component::From => vec![compile_from(state)?],
        Component::Wheres => PredicateCompiler::for_state(state).compile(&state.wheres)?,
        Component::Orders => state
            .orders
            .iter()
            .map(|order| {
                Ok(NativeOperation::OrderBy {
                    field: FieldPath::from_dot_separated(&order.field)?,
                    direction: order.direction,
                })
            })
            .collect::<FirestoreResult<Vec<_>>>()?,
        Component::StartAt => vec![NativeOperation::StartAt(state.start_at.clone())],
        Component::EndAt => vec![NativeOperation::EndAt(state.end_at.clone())],
        Component::StartAfter => vec![NativeOperation::StartAfter(state.start_after.clone())],
        Component::EndBefore => vec![NativeOperation::EndBefore(state.end_before.clone())],
        Component::Offset => state.offset.map(NativeOperation::Offset).into_iter().collect(),
        Component::Limit => state.limit.map(NativeOperation::Limit).into_iter().collect(),
        Component::LimitToLast => state
            .limit_to_last
            .map(NativeOperation::LimitToLast)
            .into_iter()
            .collect(),
    };
    Ok(operations.into_iter().filter(|op| !op.is_noop()).collect())
}

fn compile_from(state: &QueryState) -> FirestoreResult<NativeOperation> {
    let from = state
        .from
        .as_deref()
        .filter(|from| !from.trim().is_empty())
        .ok_or_else(|| invalid_argument("No collection selected, call from() first"))?;

    if !state.collection_group {
        return Ok(NativeOperation::Collection(ResourcePath::from_string(from)?));
    }
    if from.contains('/') {
        return Err(invalid_collection_path(format!(
            "Collection group '{from}' must be a collection id, not a path"
        )));
    }
    let parent = state
        .collection_group_parent
        .as_deref()
        .map(ResourcePath::from_string)
        .transpose()?;
    Ok(NativeOperation::CollectionGroup {
        collection_id: from.to_string(),
        parent,
    })
}

/// Every non-empty descriptor of `state`, `from` included, in component order.
pub fn compile_operations(state: &QueryState) -> FirestoreResult<Vec<NativeOperation>> {
    let mut operations = Vec::new();
    for component in COMPONENTS {
        operations.extend(compile_component(component, state)?);
    }
    Ok(operations)
}

/// Native compiler. Pure: compiling the same state twice yields equal output.
pub fn compile_query(state: &QueryState) -> FirestoreResult<CompiledQuery> {
    let mut source = None;
    let mut calls = Vec::new();
    for operation in compile_operations(state)? {
        match operation.source() {
            Some(found) => source = Some(found),
            None => calls.push(operation),
        }
    }
    let source = source.ok_or_else(|| invalid_argument("Query has no source collection"))?;
    Ok(CompiledQuery { source, calls })
}
