use std::collections::{BTreeMap, HashSet};

use crate::firestore::error::{invalid_argument, FirestoreResult};
use crate::firestore::model::FieldPath;
use crate::firestore::value::{FirestoreValue, MapValue, SentinelValue, ValueKind};

/// Options for `set` writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Merge the provided fields into the stored document instead of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

/// Write-time transforms resolved by the store.
#[derive(Clone, Debug, PartialEq)]
pub enum TransformOperation {
    NumericIncrement(FirestoreValue),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldTransform {
    field_path: FieldPath,
    operation: TransformOperation,
}

impl FieldTransform {
    pub fn new(field_path: FieldPath, operation: TransformOperation) -> Self {
        Self {
            field_path,
            operation,
        }
    }

    pub fn field_path(&self) -> &FieldPath {
        &self.field_path
    }

    pub fn operation(&self) -> &TransformOperation {
        &self.operation
    }
}

/// Document data split into plain fields, the merge mask and transforms.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedSetData {
    pub map: MapValue,
    pub mask: Option<Vec<FieldPath>>,
    pub transforms: Vec<FieldTransform>,
}

/// Encodes data for a `create` write: sentinels other than increments are refused.
pub fn encode_create_data(data: MapValue) -> FirestoreResult<EncodedSetData> {
    encode_set_data(data, SetOptions::default())
}

/// Encodes data for a `set` write.
///
/// With `merge`, the mask lists every leaf path present in the data plus every
/// delete-field path; increment paths become transforms and stay out of the mask.
pub fn encode_set_data(data: MapValue, options: SetOptions) -> FirestoreResult<EncodedSetData> {
    let mut transforms = Vec::new();
    let mut mask = Vec::new();
    let map = sanitize_map(data.fields(), &[], options.merge, &mut transforms, &mut mask)?;

    let mask = if options.merge {
        let mut seen = HashSet::new();
        mask.retain(|path: &FieldPath| seen.insert(path.canonical_string()));
        if mask.is_empty() && transforms.is_empty() {
            return Err(invalid_argument(
                "merge set requires the data to contain at least one field",
            ));
        }
        Some(mask)
    } else {
        None
    };

    Ok(EncodedSetData {
        map: MapValue::new(map),
        mask,
        transforms,
    })
}

fn sanitize_map(
    data: &BTreeMap<String, FirestoreValue>,
    parent: &[String],
    merge: bool,
    transforms: &mut Vec<FieldTransform>,
    mask: &mut Vec<FieldPath>,
) -> FirestoreResult<BTreeMap<String, FirestoreValue>> {
    let mut cleaned = BTreeMap::new();
    for (key, value) in data {
        let mut segments = parent.to_vec();
        segments.push(key.clone());
        let field_path = FieldPath::new(segments.clone())?;
        match value.kind() {
            ValueKind::Sentinel(SentinelValue::DeleteField) => {
                if !merge {
                    return Err(invalid_argument(format!(
                        "delete_field() can only be used in merge writes (field '{field_path}')"
                    )));
                }
                mask.push(field_path);
            }
            ValueKind::Sentinel(SentinelValue::NumericIncrement(operand)) => {
                if !operand.is_numeric() {
                    return Err(invalid_argument(format!(
                        "increment requires a numeric operand (field '{field_path}')"
                    )));
                }
                transforms.push(FieldTransform::new(
                    field_path,
                    TransformOperation::NumericIncrement(operand.as_ref().clone()),
                ));
            }
            ValueKind::Map(map) if !map.is_empty() => {
                let nested = sanitize_map(map.fields(), &segments, merge, transforms, mask)?;
                if !nested.is_empty() {
                    cleaned.insert(key.clone(), FirestoreValue::from_map(nested));
                }
            }
            _ => {
                assert_no_sentinel(value, &field_path)?;
                mask.push(field_path);
                cleaned.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(cleaned)
}

fn assert_no_sentinel(value: &FirestoreValue, context: &FieldPath) -> FirestoreResult<()> {
    match value.kind() {
        ValueKind::Sentinel(_) => Err(invalid_argument(format!(
            "Sentinel values cannot be nested inside arrays (field '{context}')"
        ))),
        ValueKind::Array(array) => array
            .values()
            .iter()
            .try_for_each(|element| assert_no_sentinel(element, context)),
        ValueKind::Map(map) => map
            .fields()
            .values()
            .try_for_each(|element| assert_no_sentinel(element, context)),
        _ => Ok(()),
    }
}

/// Drops the reserved identity field from data about to be written.
pub fn strip_document_id(mut data: MapValue) -> (MapValue, Option<FirestoreValue>) {
    let id_path = FieldPath::document_id();
    let id = data.get(&id_path).cloned();
    if id.is_some() {
        data.remove(&id_path);
    }
    (data, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(entries: Vec<(&str, FirestoreValue)>) -> MapValue {
        MapValue::new(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn merge_mask_covers_leaves_and_deletions() {
        let address = FirestoreValue::from_map(BTreeMap::from([
            ("city".to_string(), FirestoreValue::from_string("Oslo")),
            ("zip".to_string(), FirestoreValue::delete_field()),
        ]));
        let encoded = encode_set_data(
            data(vec![
                ("address", address),
                ("visits", FirestoreValue::numeric_increment(2.into())),
            ]),
            SetOptions::merge(),
        )
        .unwrap();

        let mask: Vec<String> = encoded
            .mask
            .unwrap()
            .iter()
            .map(FieldPath::canonical_string)
            .collect();
        assert_eq!(mask, vec!["address.city", "address.zip"]);
        assert_eq!(encoded.transforms.len(), 1);
        assert_eq!(encoded.transforms[0].field_path().canonical_string(), "visits");
        let city = FieldPath::from_dot_separated("address.city").unwrap();
        assert!(encoded.map.get(&city).is_some());
        let zip = FieldPath::from_dot_separated("address.zip").unwrap();
        assert!(encoded.map.get(&zip).is_none());
    }

    #[test]
    fn delete_field_requires_merge() {
        let err = encode_create_data(data(vec![("a", FirestoreValue::delete_field())])).unwrap_err();
        assert_eq!(err.code_str(), "firestore/invalid-argument");
    }

    #[test]
    fn sentinels_inside_arrays_are_rejected() {
        let nested = FirestoreValue::from_array(vec![FirestoreValue::delete_field()]);
        assert!(encode_set_data(data(vec![("a", nested)]), SetOptions::merge()).is_err());
    }

    #[test]
    fn strips_identity_field() {
        let (stripped, id) = strip_document_id(data(vec![
            ("__name__", FirestoreValue::from_string("u1")),
            ("name", FirestoreValue::from_string("Ann")),
        ]));
        assert_eq!(id, Some(FirestoreValue::from_string("u1")));
        assert_eq!(stripped.fields().len(), 1);
    }
}
