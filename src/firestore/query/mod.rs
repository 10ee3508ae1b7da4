//! Relational query state and the compilers that lower it onto the document store.

pub mod compiler;
pub mod native;
pub mod predicate;
pub mod readable;
pub mod state;

pub use compiler::{compile_query, CompiledQuery, Component, NativeOperation, COMPONENTS};
pub use native::{
    Bound, FieldFilter, FilterOperator, LimitType, NativeQuery, OrderBy, OrderDirection,
    QuerySource,
};
pub use predicate::PredicateCompiler;
pub use readable::compile_readable;
pub use state::{BooleanJoiner, Operator, Order, Predicate, PredicateKind, QueryState};
