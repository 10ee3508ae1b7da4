use crate::firestore::constants::MAX_ARRAYABLE_VALUES;
use crate::firestore::error::{
    invalid_argument, invalid_arrayable_clause, unsupported_disjunction,
    unsupported_filtered_group_scope, FirestoreResult,
};
use crate::firestore::model::FieldPath;
use crate::firestore::query::compiler::NativeOperation;
use crate::firestore::query::native::FilterOperator;
use crate::firestore::query::state::{BooleanJoiner, Operator, Predicate, PredicateKind, QueryState};
use crate::firestore::value::{FirestoreValue, ValueKind};

/// Lowers `where` predicates into native `where` descriptors.
///
/// The store has no disjunction, so an OR-joined predicate is a hard error.
/// Filters are also refused on collection groups scoped to a document.
#[derive(Clone, Copy, Debug, Default)]
pub struct PredicateCompiler {
    scoped_group: bool,
}

impl PredicateCompiler {
    pub fn new(scoped_group: bool) -> Self {
        Self { scoped_group }
    }

    pub fn for_state(state: &QueryState) -> Self {
        Self::new(state.is_scoped_group())
    }

    pub fn compile(&self, predicates: &[Predicate]) -> FirestoreResult<Vec<NativeOperation>> {
        if predicates.is_empty() {
            return Ok(Vec::new());
        }
        if self.scoped_group {
            return Err(unsupported_filtered_group_scope());
        }
        let mut operations = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            compile_predicate(predicate, false, &mut operations)?;
        }
        Ok(operations)
    }
}

fn compile_predicate(
    predicate: &Predicate,
    negated: bool,
    operations: &mut Vec<NativeOperation>,
) -> FirestoreResult<()> {
    if predicate.joiner == BooleanJoiner::Or {
        return Err(unsupported_disjunction());
    }
    let negate = predicate.negate ^ negated;

    match &predicate.kind {
        PredicateKind::Basic {
            field,
            operator,
            value,
        } => {
            let operator = operator.parse::<Operator>()?.native();
            let operator = if negate { negate_operator(operator)? } else { operator };
            let value = if operator.is_arrayable() {
                validate_arrayable(value)?
            } else {
                value.clone()
            };
            push_where(operations, field, operator, value)
        }
        PredicateKind::In { field, values } => {
            let values = validate_arrayable(values)?;
            let operator = if negate { FilterOperator::NotIn } else { FilterOperator::In };
            push_where(operations, field, operator, values)
        }
        PredicateKind::NotIn { field, values } => {
            let values = validate_arrayable(values)?;
            let operator = if negate { FilterOperator::In } else { FilterOperator::NotIn };
            push_where(operations, field, operator, values)
        }
        PredicateKind::Null { field } => {
            let operator = if negate { FilterOperator::NotEqual } else { FilterOperator::Equal };
            push_where(operations, field, operator, FirestoreValue::null())
        }
        PredicateKind::NotNull { field } => {
            let operator = if negate { FilterOperator::Equal } else { FilterOperator::NotEqual };
            push_where(operations, field, operator, FirestoreValue::null())
        }
        PredicateKind::Nested(children) => {
            // not (a and b) only lowers to a disjunction
            if negate && children.len() > 1 {
                return Err(unsupported_disjunction());
            }
            for child in children {
                compile_predicate(child, negate, operations)?;
            }
            Ok(())
        }
    }
}

fn push_where(
    operations: &mut Vec<NativeOperation>,
    field: &str,
    operator: FilterOperator,
    value: FirestoreValue,
) -> FirestoreResult<()> {
    operations.push(NativeOperation::Where {
        field: FieldPath::from_dot_separated(field)?,
        operator,
        value,
    });
    Ok(())
}

fn negate_operator(operator: FilterOperator) -> FirestoreResult<FilterOperator> {
    Ok(match operator {
        FilterOperator::Equal => FilterOperator::NotEqual,
        FilterOperator::NotEqual => FilterOperator::Equal,
        FilterOperator::LessThan => FilterOperator::GreaterThanOrEqual,
        FilterOperator::LessThanOrEqual => FilterOperator::GreaterThan,
        FilterOperator::GreaterThan => FilterOperator::LessThanOrEqual,
        FilterOperator::GreaterThanOrEqual => FilterOperator::LessThan,
        FilterOperator::In => FilterOperator::NotIn,
        FilterOperator::NotIn => FilterOperator::In,
        FilterOperator::ArrayContains | FilterOperator::ArrayContainsAny => {
            return Err(invalid_argument(format!(
                "Operator '{}' cannot be negated",
                operator.as_str()
            )))
        }
    })
}

/// Checks the operand of `in`, `not-in` and `array-contains-any`: a non-empty
/// sequence of at most ten values. Maps stand in for associative arrays.
pub fn validate_arrayable(value: &FirestoreValue) -> FirestoreResult<FirestoreValue> {
    match value.kind() {
        ValueKind::Map(_) => Err(invalid_arrayable_clause(
            "Values must not be an associative array.",
        )),
        ValueKind::Array(array) if array.values().is_empty() => {
            Err(invalid_arrayable_clause("Values must not be an empty array."))
        }
        ValueKind::Array(array) if array.values().len() > MAX_ARRAYABLE_VALUES => {
            Err(invalid_arrayable_clause(format!(
                "Values must not be greater than {MAX_ARRAYABLE_VALUES} items."
            )))
        }
        ValueKind::Array(_) => Ok(value.clone()),
        _ => Err(invalid_arrayable_clause("Values must be an array.")),
    }
}
