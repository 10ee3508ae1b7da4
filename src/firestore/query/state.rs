use std::str::FromStr;

use crate::firestore::error::{invalid_argument, FirestoreError};
use crate::firestore::query::native::{FilterOperator, OrderDirection};
use crate::firestore::value::FirestoreValue;

/// How a predicate is joined to the ones before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BooleanJoiner {
    #[default]
    And,
    Or,
}

impl BooleanJoiner {
    pub fn as_str(&self) -> &'static str {
        match self {
            BooleanJoiner::And => "and",
            BooleanJoiner::Or => "or",
        }
    }
}

/// Relational operator vocabulary accepted by `where` clauses.
///
/// Parsing collapses the aliases `==`/`===` to `=` and `<>`/`!==` to `!=`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Operator(FilterOperator);

impl Operator {
    pub fn native(&self) -> FilterOperator {
        self.0
    }
}

impl From<FilterOperator> for Operator {
    fn from(value: FilterOperator) -> Self {
        Self(value)
    }
}

impl FromStr for Operator {
    type Err = FirestoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let operator = match value.trim().to_ascii_lowercase().as_str() {
            "=" | "==" | "===" => FilterOperator::Equal,
            "!=" | "<>" | "!==" => FilterOperator::NotEqual,
            "<" => FilterOperator::LessThan,
            "<=" => FilterOperator::LessThanOrEqual,
            ">" => FilterOperator::GreaterThan,
            ">=" => FilterOperator::GreaterThanOrEqual,
            "array-contains" => FilterOperator::ArrayContains,
            "array-contains-any" => FilterOperator::ArrayContainsAny,
            "in" => FilterOperator::In,
            "not-in" | "not in" => FilterOperator::NotIn,
            other => {
                return Err(invalid_argument(format!(
                    "Unsupported where operator '{other}'"
                )))
            }
        };
        Ok(Self(operator))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PredicateKind {
    /// `field <operator> value`, the operator kept as written until compilation.
    Basic {
        field: String,
        operator: String,
        value: FirestoreValue,
    },
    In {
        field: String,
        values: FirestoreValue,
    },
    NotIn {
        field: String,
        values: FirestoreValue,
    },
    Null {
        field: String,
    },
    NotNull {
        field: String,
    },
    Nested(Vec<Predicate>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Predicate {
    pub kind: PredicateKind,
    pub joiner: BooleanJoiner,
    pub negate: bool,
}

impl Predicate {
    pub fn new(kind: PredicateKind, joiner: BooleanJoiner, negate: bool) -> Self {
        Self {
            kind,
            joiner,
            negate,
        }
    }

    pub fn and(kind: PredicateKind) -> Self {
        Self::new(kind, BooleanJoiner::And, false)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: OrderDirection,
}

/// Mutable description of a pending query or mutation.
///
/// Built fluently by one owner, compiled once, then discarded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryState {
    /// Collection path, or collection id when `collection_group` is set.
    pub from: Option<String>,
    pub collection_group: bool,
    /// Restricts a collection group to descendants of this document path.
    pub collection_group_parent: Option<String>,
    /// Projected field paths; empty or `*` projects every field.
    pub columns: Vec<String>,
    pub wheres: Vec<Predicate>,
    pub orders: Vec<Order>,
    pub start_at: Vec<FirestoreValue>,
    pub end_at: Vec<FirestoreValue>,
    pub start_after: Vec<FirestoreValue>,
    pub end_before: Vec<FirestoreValue>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    pub limit_to_last: Option<u32>,
}

impl QueryState {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: Some(from.into()),
            ..Self::default()
        }
    }

    /// True when the query targets a collection group scoped to a document.
    pub fn is_scoped_group(&self) -> bool {
        self.collection_group && self.collection_group_parent.is_some()
    }

    pub fn projects_all(&self) -> bool {
        self.columns.is_empty() || self.columns.iter().any(|column| column == "*")
    }

    /// Copy without the projection, used to resolve mutation targets.
    pub fn without_projection(&self) -> Self {
        Self {
            columns: Vec::new(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_aliases_collapse() {
        for alias in ["<>", "!==", "!="] {
            let operator: Operator = alias.parse().unwrap();
            assert_eq!(operator.native(), FilterOperator::NotEqual);
        }
        for alias in ["=", "==", "==="] {
            let operator: Operator = alias.parse().unwrap();
            assert_eq!(operator.native(), FilterOperator::Equal);
        }
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = "like".parse::<Operator>().unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn star_projects_everything() {
        let mut state = QueryState::new("users");
        assert!(state.projects_all());
        state.columns = vec!["*".into()];
        assert!(state.projects_all());
        state.columns = vec!["name".into()];
        assert!(!state.projects_all());
        assert!(state.without_projection().projects_all());
    }
}
