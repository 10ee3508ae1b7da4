use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::{DocumentKey, FieldPath, ResourcePath};
use crate::firestore::value::{FirestoreValue, ValueKind};

/// Comparison operators understood by the document store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    /// Short form used by diagnostics and native descriptors.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::Equal => "=",
            FilterOperator::NotEqual => "!=",
            FilterOperator::ArrayContains => "array-contains",
            FilterOperator::ArrayContainsAny => "array-contains-any",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not-in",
        }
    }

    /// Operator name in the REST `StructuredQuery` encoding.
    pub fn wire_name(&self) -> &'static str {
        match self {
            FilterOperator::LessThan => "LESS_THAN",
            FilterOperator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
            FilterOperator::GreaterThan => "GREATER_THAN",
            FilterOperator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
            FilterOperator::Equal => "EQUAL",
            FilterOperator::NotEqual => "NOT_EQUAL",
            FilterOperator::ArrayContains => "ARRAY_CONTAINS",
            FilterOperator::ArrayContainsAny => "ARRAY_CONTAINS_ANY",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT_IN",
        }
    }

    pub fn is_inequality(&self) -> bool {
        matches!(
            self,
            FilterOperator::LessThan
                | FilterOperator::LessThanOrEqual
                | FilterOperator::GreaterThan
                | FilterOperator::GreaterThanOrEqual
                | FilterOperator::NotEqual
                | FilterOperator::NotIn
        )
    }

    /// Operators whose operand is a list of candidate values.
    pub fn is_arrayable(&self) -> bool {
        matches!(
            self,
            FilterOperator::In | FilterOperator::NotIn | FilterOperator::ArrayContainsAny
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Ascending => "asc",
            OrderDirection::Descending => "desc",
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            OrderDirection::Ascending => "ASCENDING",
            OrderDirection::Descending => "DESCENDING",
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            OrderDirection::Ascending => OrderDirection::Descending,
            OrderDirection::Descending => OrderDirection::Ascending,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LimitType {
    #[default]
    First,
    Last,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldFilter {
    field: FieldPath,
    operator: FilterOperator,
    value: FirestoreValue,
}

impl FieldFilter {
    pub fn new(field: FieldPath, operator: FilterOperator, value: FirestoreValue) -> Self {
        Self {
            field,
            operator,
            value,
        }
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn value(&self) -> &FirestoreValue {
        &self.value
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    field: FieldPath,
    direction: OrderDirection,
}

impl OrderBy {
    pub fn new(field: FieldPath, direction: OrderDirection) -> Self {
        Self { field, direction }
    }

    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    pub fn direction(&self) -> OrderDirection {
        self.direction
    }
}

/// A cursor position expressed in the values of the effective ordering.
#[derive(Clone, Debug, PartialEq)]
pub struct Bound {
    values: Vec<FirestoreValue>,
    inclusive: bool,
}

impl Bound {
    pub fn new(values: Vec<FirestoreValue>, inclusive: bool) -> Self {
        Self { values, inclusive }
    }

    pub fn values(&self) -> &[FirestoreValue] {
        &self.values
    }

    pub fn inclusive(&self) -> bool {
        self.inclusive
    }
}

/// What a query reads from: one collection, or every collection sharing an id.
#[derive(Clone, Debug, PartialEq)]
pub enum QuerySource {
    Collection(ResourcePath),
    CollectionGroup {
        collection_id: String,
        /// Restricts the group to descendants of this document.
        parent: Option<ResourcePath>,
    },
}

impl QuerySource {
    /// Path of the parent resource the store request is issued against.
    pub fn parent_path(&self) -> ResourcePath {
        match self {
            QuerySource::Collection(path) => path.without_last(),
            QuerySource::CollectionGroup { parent, .. } => {
                parent.clone().unwrap_or_else(ResourcePath::root)
            }
        }
    }

    pub fn collection_id(&self) -> &str {
        match self {
            QuerySource::Collection(path) => path.last_segment().unwrap_or_default(),
            QuerySource::CollectionGroup { collection_id, .. } => collection_id.as_str(),
        }
    }

    pub fn is_collection_group(&self) -> bool {
        matches!(self, QuerySource::CollectionGroup { .. })
    }

    pub fn matches(&self, key: &DocumentKey) -> bool {
        match self {
            QuerySource::Collection(path) => &key.collection_path() == path,
            QuerySource::CollectionGroup {
                collection_id,
                parent,
            } => {
                key.collection_id() == collection_id
                    && parent
                        .as_ref()
                        .map_or(true, |parent| parent.is_ancestor_of(key.path()))
            }
        }
    }
}

/// Query-building handle of the document store.
///
/// Every builder method returns a new handle, so partially built queries can be
/// shared freely. Datastores execute the handle as-is.
#[derive(Clone, Debug, PartialEq)]
pub struct NativeQuery {
    source: QuerySource,
    projection: Option<Vec<FieldPath>>,
    filters: Vec<FieldFilter>,
    order_by: Vec<OrderBy>,
    start_at: Option<Bound>,
    end_at: Option<Bound>,
    offset: Option<u32>,
    limit: Option<u32>,
    limit_type: LimitType,
}

impl NativeQuery {
    fn from_source(source: QuerySource) -> Self {
        Self {
            source,
            projection: None,
            filters: Vec::new(),
            order_by: Vec::new(),
            start_at: None,
            end_at: None,
            offset: None,
            limit: None,
            limit_type: LimitType::First,
        }
    }

    /// Handle over a fixed collection; `path` must have an odd number of segments.
    pub fn collection(path: ResourcePath) -> FirestoreResult<Self> {
        if !path.is_collection() {
            return Err(invalid_argument(format!(
                "Collection paths must have an odd number of segments, got '{path}'"
            )));
        }
        Ok(Self::from_source(QuerySource::Collection(path)))
    }

    /// Handle over every collection named `collection_id`, optionally below `parent`.
    pub fn collection_group(
        collection_id: impl Into<String>,
        parent: Option<ResourcePath>,
    ) -> FirestoreResult<Self> {
        let collection_id = collection_id.into();
        if collection_id.is_empty() {
            return Err(invalid_argument("Collection ID must not be empty."));
        }
        if collection_id.contains('/') {
            return Err(invalid_argument("Collection ID may not contain a slash."));
        }
        if let Some(parent) = &parent {
            if !parent.is_document() {
                return Err(invalid_argument(format!(
                    "Collection group scope must be a document path, got '{parent}'"
                )));
            }
        }
        Ok(Self::from_source(QuerySource::CollectionGroup {
            collection_id,
            parent,
        }))
    }

    pub fn select(mut self, fields: Vec<FieldPath>) -> Self {
        self.projection = Some(fields);
        self
    }

    pub fn where_field(
        mut self,
        field: FieldPath,
        operator: FilterOperator,
        value: FirestoreValue,
    ) -> FirestoreResult<Self> {
        if operator.is_arrayable() && !matches!(value.kind(), ValueKind::Array(_)) {
            return Err(invalid_argument(format!(
                "Operator '{}' requires an array operand",
                operator.as_str()
            )));
        }
        if value.is_sentinel() {
            return Err(invalid_argument("Sentinel values cannot be used in filters"));
        }
        self.filters.push(FieldFilter::new(field, operator, value));
        Ok(self)
    }

    pub fn order_by(mut self, field: FieldPath, direction: OrderDirection) -> Self {
        self.order_by.push(OrderBy::new(field, direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self.limit_type = LimitType::First;
        self
    }

    pub fn limit_to_last(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self.limit_type = LimitType::Last;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn start_at(mut self, values: Vec<FirestoreValue>) -> Self {
        self.start_at = Some(Bound::new(values, true));
        self
    }

    pub fn start_after(mut self, values: Vec<FirestoreValue>) -> Self {
        self.start_at = Some(Bound::new(values, false));
        self
    }

    pub fn end_at(mut self, values: Vec<FirestoreValue>) -> Self {
        self.end_at = Some(Bound::new(values, true));
        self
    }

    pub fn end_before(mut self, values: Vec<FirestoreValue>) -> Self {
        self.end_at = Some(Bound::new(values, false));
        self
    }

    pub fn source(&self) -> &QuerySource {
        &self.source
    }

    pub fn projection(&self) -> Option<&[FieldPath]> {
        self.projection.as_deref()
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }

    /// Orderings exactly as requested.
    pub fn explicit_order_by(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn start_at_bound(&self) -> Option<&Bound> {
        self.start_at.as_ref()
    }

    pub fn end_at_bound(&self) -> Option<&Bound> {
        self.end_at.as_ref()
    }

    pub fn offset_value(&self) -> Option<u32> {
        self.offset
    }

    pub fn limit_value(&self) -> Option<u32> {
        self.limit
    }

    pub fn limit_type(&self) -> LimitType {
        self.limit_type
    }

    /// Ordering the store actually applies: explicit orders, the first
    /// inequality field when nothing is ordered yet, then the document name.
    pub fn normalized_order_by(&self) -> Vec<OrderBy> {
        let mut orders = self.order_by.clone();
        if orders.is_empty() {
            if let Some(filter) = self.filters.iter().find(|f| f.operator().is_inequality()) {
                orders.push(OrderBy::new(filter.field().clone(), OrderDirection::Ascending));
            }
        }
        if !orders.iter().any(|order| order.field().is_document_id()) {
            let direction = orders
                .last()
                .map(|order| order.direction())
                .unwrap_or_default();
            orders.push(OrderBy::new(FieldPath::document_id(), direction));
        }
        orders
    }

    /// Rewrites a limit-to-last query into the first-N form the store executes:
    /// orders are flipped and cursors swapped. Callers reverse the results.
    pub fn to_first_limited(&self) -> Self {
        if self.limit_type != LimitType::Last {
            return self.clone();
        }
        let mut flipped = self.clone();
        flipped.order_by = self
            .normalized_order_by()
            .into_iter()
            .map(|order| OrderBy::new(order.field().clone(), order.direction().reversed()))
            .collect();
        flipped.start_at = self.end_at.clone();
        flipped.end_at = self.start_at.clone();
        flipped.limit_type = LimitType::First;
        flipped
    }
}
