use crate::firestore::model::FieldPath;
use crate::firestore::value::{FirestoreValue, ValueKind};

use super::snapshot::DocumentSnapshot;

/// Client-side reductions over materialized query results.
///
/// Missing and null values are skipped by every reducer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Min,
    Max,
    Sum,
    Avg,
}

impl Aggregate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
        }
    }
}

pub(crate) fn field_values(documents: &[DocumentSnapshot], field: &FieldPath) -> Vec<FirestoreValue> {
    documents
        .iter()
        .filter_map(|document| document.field(field))
        .filter(|value| !value.is_null())
        .collect()
}

pub fn min_value(values: &[FirestoreValue]) -> Option<FirestoreValue> {
    values
        .iter()
        .min_by(|left, right| left.compare(right))
        .cloned()
}

pub fn max_value(values: &[FirestoreValue]) -> Option<FirestoreValue> {
    values
        .iter()
        .max_by(|left, right| left.compare(right))
        .cloned()
}

/// Sums the numeric values. Stays an integer while every operand is one and
/// the total fits, otherwise becomes a double. Empty input sums to integer 0.
pub fn sum_values(values: &[FirestoreValue]) -> FirestoreValue {
    let mut integer_total: Option<i64> = Some(0);
    let mut double_total = 0.0;
    for value in values {
        match value.kind() {
            ValueKind::Integer(n) => {
                integer_total = integer_total.and_then(|total| total.checked_add(*n));
                double_total += *n as f64;
            }
            ValueKind::Double(n) => {
                integer_total = None;
                double_total += n;
            }
            _ => {}
        }
    }
    match integer_total {
        Some(total) => FirestoreValue::from_integer(total),
        None => FirestoreValue::from_double(double_total),
    }
}

pub fn average_values(values: &[FirestoreValue]) -> Option<f64> {
    let numbers: Vec<f64> = values.iter().filter_map(FirestoreValue::as_f64).collect();
    if numbers.is_empty() {
        return None;
    }
    Some(numbers.iter().sum::<f64>() / numbers.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_keeps_integers_until_a_double_appears() {
        assert_eq!(sum_values(&[]), FirestoreValue::from_integer(0));
        assert_eq!(
            sum_values(&[1.into(), 2.into()]),
            FirestoreValue::from_integer(3)
        );
        assert_eq!(
            sum_values(&[1.into(), 2.5.into()]),
            FirestoreValue::from_double(3.5)
        );
        assert_eq!(
            sum_values(&[i64::MAX.into(), 1.into()]),
            FirestoreValue::from_double(i64::MAX as f64 + 1.0)
        );
    }

    #[test]
    fn average_of_nothing_is_none() {
        assert_eq!(average_values(&[]), None);
        assert_eq!(average_values(&[2.into(), 4.into()]), Some(3.0));
    }

    #[test]
    fn min_and_max_use_store_ordering() {
        let values = vec![FirestoreValue::from(30), 17.into(), 42.5.into()];
        assert_eq!(min_value(&values), Some(FirestoreValue::from(17)));
        assert_eq!(max_value(&values), Some(FirestoreValue::from(42.5)));
        assert_eq!(min_value(&[]), None);
    }
}
