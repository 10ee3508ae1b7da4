use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::{json, Value as JsonValue};

use crate::firestore::error::{internal_error, invalid_argument, FirestoreResult};
use crate::firestore::model::{DatabaseId, DocumentKey, FieldPath, Timestamp};
use crate::firestore::mutation::{FieldTransform, TransformOperation};
use crate::firestore::remote::datastore::WriteOperation;
use crate::firestore::value::{BytesValue, FirestoreValue, MapValue, ValueKind};

/// Converts between store values and the Firestore REST JSON encoding.
///
/// Reference values are relative document paths in memory and fully
/// qualified resource names on the wire.
#[derive(Clone, Debug)]
pub struct JsonProtoSerializer {
    database_id: DatabaseId,
}

impl JsonProtoSerializer {
    pub fn new(database_id: DatabaseId) -> Self {
        Self { database_id }
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.database_id
    }

    pub fn document_name(&self, key: &DocumentKey) -> String {
        self.reference_name(&key.path().canonical_string())
    }

    fn reference_name(&self, path: &str) -> String {
        format!("{}/{}", self.database_id.documents_root(), path.trim_matches('/'))
    }

    /// Relative path of a fully qualified document name of this database.
    pub fn relative_path<'a>(&self, name: &'a str) -> FirestoreResult<&'a str> {
        let root = self.database_id.documents_root();
        name.strip_prefix(&root)
            .map(|rest| rest.trim_start_matches('/'))
            .ok_or_else(|| {
                internal_error(format!("Unexpected document name '{name}' returned by Firestore"))
            })
    }

    pub fn decode_document_key(&self, name: &str) -> FirestoreResult<DocumentKey> {
        DocumentKey::from_string(self.relative_path(name)?)
    }

    pub fn encode_write(&self, write: &WriteOperation) -> JsonValue {
        match write {
            WriteOperation::Create {
                key,
                data,
                transforms,
            } => {
                let mut encoded = self.update_write(key, data, transforms);
                encoded.insert("currentDocument".to_string(), json!({ "exists": false }));
                JsonValue::Object(encoded)
            }
            WriteOperation::Set {
                key,
                data,
                mask,
                transforms,
            } => {
                let mut encoded = self.update_write(key, data, transforms);
                if let Some(mask) = mask {
                    let paths: Vec<String> = mask.iter().map(encode_field_path).collect();
                    encoded.insert("updateMask".to_string(), json!({ "fieldPaths": paths }));
                }
                JsonValue::Object(encoded)
            }
            WriteOperation::Delete { key } => json!({ "delete": self.document_name(key) }),
        }
    }

    fn update_write(
        &self,
        key: &DocumentKey,
        data: &MapValue,
        transforms: &[FieldTransform],
    ) -> serde_json::Map<String, JsonValue> {
        let mut write = serde_json::Map::new();
        write.insert(
            "update".to_string(),
            json!({
                "name": self.document_name(key),
                "fields": self.encode_map_fields(data),
            }),
        );
        if !transforms.is_empty() {
            let encoded: Vec<JsonValue> = transforms
                .iter()
                .map(|transform| self.encode_transform(transform))
                .collect();
            write.insert("updateTransforms".to_string(), JsonValue::Array(encoded));
        }
        write
    }

    fn encode_transform(&self, transform: &FieldTransform) -> JsonValue {
        let field_path = encode_field_path(transform.field_path());
        match transform.operation() {
            TransformOperation::NumericIncrement(operand) => json!({
                "fieldPath": field_path,
                "increment": self.encode_value(operand),
            }),
        }
    }

    fn encode_map_fields(&self, map: &MapValue) -> JsonValue {
        let fields: serde_json::Map<String, JsonValue> = map
            .fields()
            .iter()
            .filter(|(_, value)| !value.is_sentinel())
            .map(|(key, value)| (key.clone(), self.encode_value(value)))
            .collect();
        JsonValue::Object(fields)
    }

    pub fn encode_value(&self, value: &FirestoreValue) -> JsonValue {
        match value.kind() {
            ValueKind::Null => json!({ "nullValue": JsonValue::Null }),
            ValueKind::Boolean(boolean) => json!({ "booleanValue": boolean }),
            ValueKind::Integer(integer) => json!({ "integerValue": integer.to_string() }),
            ValueKind::Double(double) => json!({ "doubleValue": double }),
            ValueKind::Timestamp(timestamp) => json!({ "timestampValue": timestamp.to_rfc3339() }),
            ValueKind::String(string) => json!({ "stringValue": string }),
            ValueKind::Bytes(bytes) => json!({ "bytesValue": bytes.to_base64() }),
            ValueKind::Reference(path) => json!({ "referenceValue": self.reference_name(path) }),
            ValueKind::Array(array) => {
                let values: Vec<JsonValue> =
                    array.values().iter().map(|item| self.encode_value(item)).collect();
                json!({ "arrayValue": { "values": values } })
            }
            ValueKind::Map(map) => json!({ "mapValue": { "fields": self.encode_map_fields(map) } }),
            // sentinels travel as transforms or mask entries, never as values
            ValueKind::Sentinel(_) => json!({ "nullValue": JsonValue::Null }),
        }
    }

    /// Decodes the `fields` of a REST document; a document without fields is empty.
    pub fn decode_document_fields(&self, document: &JsonValue) -> FirestoreResult<MapValue> {
        match document.get("fields") {
            Some(fields) => self.decode_fields(fields),
            None => Ok(MapValue::default()),
        }
    }

    fn decode_fields(&self, fields: &JsonValue) -> FirestoreResult<MapValue> {
        let object = fields
            .as_object()
            .ok_or_else(|| invalid_argument("Expected 'fields' to be an object"))?;
        let mut decoded = BTreeMap::new();
        for (key, value) in object {
            decoded.insert(key.clone(), self.decode_value(value)?);
        }
        Ok(MapValue::new(decoded))
    }

    pub fn decode_value(&self, value: &JsonValue) -> FirestoreResult<FirestoreValue> {
        let object = value
            .as_object()
            .ok_or_else(|| invalid_argument("Expected Firestore value object"))?;
        let Some((kind, inner)) = object.iter().next() else {
            return Err(invalid_argument("Empty Firestore value object"));
        };
        match kind.as_str() {
            "nullValue" => Ok(FirestoreValue::null()),
            "booleanValue" => inner
                .as_bool()
                .map(FirestoreValue::from_bool)
                .ok_or_else(|| invalid_argument("booleanValue must be bool")),
            "integerValue" => decode_integer(inner).map(FirestoreValue::from_integer),
            "doubleValue" => decode_double(inner).map(FirestoreValue::from_double),
            "timestampValue" => {
                let text = inner
                    .as_str()
                    .ok_or_else(|| invalid_argument("timestampValue must be string"))?;
                Timestamp::parse_rfc3339(text).map(FirestoreValue::from_timestamp)
            }
            "stringValue" => inner
                .as_str()
                .map(FirestoreValue::from_string)
                .ok_or_else(|| invalid_argument("stringValue must be string")),
            "bytesValue" => {
                let text = inner
                    .as_str()
                    .ok_or_else(|| invalid_argument("bytesValue must be base64 string"))?;
                BytesValue::from_base64(text)
                    .map(FirestoreValue::from_bytes)
                    .map_err(|err| invalid_argument(format!("Invalid bytesValue: {err}")))
            }
            "referenceValue" => {
                let name = inner
                    .as_str()
                    .ok_or_else(|| invalid_argument("referenceValue must be string"))?;
                Ok(FirestoreValue::from_reference(self.relative_path(name)?))
            }
            "arrayValue" => {
                let values = match inner.get("values").and_then(JsonValue::as_array) {
                    Some(values) => values
                        .iter()
                        .map(|item| self.decode_value(item))
                        .collect::<FirestoreResult<Vec<_>>>()?,
                    None => Vec::new(),
                };
                Ok(FirestoreValue::from_array(values))
            }
            "mapValue" => {
                let map = match inner.get("fields") {
                    Some(fields) => self.decode_fields(fields)?,
                    None => MapValue::default(),
                };
                Ok(FirestoreValue::from_map(map.into_fields()))
            }
            other => Err(invalid_argument(format!("Unknown Firestore value type '{other}'"))),
        }
    }
}

/// Field path in mask form: segments that are not plain identifiers are
/// backtick-quoted.
pub(crate) fn encode_field_path(path: &FieldPath) -> String {
    let segments: Vec<String> = path
        .segments()
        .iter()
        .map(|segment| {
            let simple = segment
                .chars()
                .next()
                .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if simple {
                segment.clone()
            } else {
                format!("`{}`", segment.replace('\\', "\\\\").replace('`', "\\`"))
            }
        })
        .collect();
    segments.join(".")
}

fn decode_integer(value: &JsonValue) -> FirestoreResult<i64> {
    match value {
        JsonValue::String(text) => i64::from_str(text)
            .map_err(|err| invalid_argument(format!("Invalid integerValue: {err}"))),
        JsonValue::Number(number) => number
            .as_i64()
            .ok_or_else(|| invalid_argument("Integer out of range")),
        _ => Err(invalid_argument("integerValue must be a string or number")),
    }
}

fn decode_double(value: &JsonValue) -> FirestoreResult<f64> {
    match value {
        JsonValue::Number(number) => number
            .as_f64()
            .ok_or_else(|| invalid_argument("Invalid doubleValue")),
        JsonValue::String(text) => match text.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ => text
                .parse::<f64>()
                .map_err(|err| invalid_argument(format!("Invalid doubleValue: {err}"))),
        },
        _ => Err(invalid_argument("doubleValue must be a number or string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::mutation::{encode_create_data, encode_set_data, SetOptions};

    fn serializer() -> JsonProtoSerializer {
        JsonProtoSerializer::new(DatabaseId::default("demo"))
    }

    fn key(path: &str) -> DocumentKey {
        DocumentKey::from_string(path).unwrap()
    }

    fn data(entries: Vec<(&str, FirestoreValue)>) -> MapValue {
        MapValue::new(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn create_requires_missing_document() {
        let encoded = encode_create_data(data(vec![("name", "Ann".into())])).unwrap();
        let write = serializer().encode_write(&WriteOperation::Create {
            key: key("users/ann"),
            data: encoded.map,
            transforms: encoded.transforms,
        });
        assert_eq!(
            write,
            json!({
                "update": {
                    "name": "projects/demo/databases/(default)/documents/users/ann",
                    "fields": { "name": { "stringValue": "Ann" } }
                },
                "currentDocument": { "exists": false }
            })
        );
    }

    #[test]
    fn merge_set_carries_mask_and_transforms() {
        let encoded = encode_set_data(
            data(vec![
                ("visits", FirestoreValue::numeric_increment(1.into())),
                ("old", FirestoreValue::delete_field()),
                ("tags.first-tag", true.into()),
            ]),
            SetOptions::merge(),
        )
        .unwrap();
        let write = serializer().encode_write(&WriteOperation::Set {
            key: key("users/ann"),
            data: encoded.map,
            mask: encoded.mask,
            transforms: encoded.transforms,
        });
        assert_eq!(write["updateMask"], json!({ "fieldPaths": ["old", "`tags.first-tag`"] }));
        assert_eq!(
            write["updateTransforms"],
            json!([{ "fieldPath": "visits", "increment": { "integerValue": "1" } }])
        );
        assert_eq!(write["update"]["fields"], json!({ "tags.first-tag": { "booleanValue": true } }));
    }

    #[test]
    fn references_are_qualified_on_the_wire() {
        let s = serializer();
        let encoded = s.encode_value(&FirestoreValue::from_reference("users/ann"));
        assert_eq!(
            encoded,
            json!({ "referenceValue": "projects/demo/databases/(default)/documents/users/ann" })
        );
        assert_eq!(
            s.decode_value(&encoded).unwrap(),
            FirestoreValue::from_reference("users/ann")
        );
    }

    #[test]
    fn decodes_wire_values() {
        let s = serializer();
        let document = json!({
            "fields": {
                "age": { "integerValue": "42" },
                "score": { "doubleValue": "NaN" },
                "tags": { "arrayValue": {} },
                "profile": { "mapValue": { "fields": { "city": { "stringValue": "Oslo" } } } },
                "seen": { "timestampValue": "2024-01-02T03:04:05.000000006Z" }
            }
        });
        let map = s.decode_document_fields(&document).unwrap();
        assert_eq!(map.fields()["age"], FirestoreValue::from_integer(42));
        assert!(map.fields()["score"].as_f64().unwrap().is_nan());
        assert_eq!(map.fields()["tags"], FirestoreValue::from_array(Vec::new()));
        assert_eq!(
            map.get(&FieldPath::from_dot_separated("profile.city").unwrap()),
            Some(&FirestoreValue::from_string("Oslo"))
        );
        assert_eq!(
            map.fields()["seen"],
            FirestoreValue::from_timestamp(Timestamp::new(1_704_164_645, 6))
        );
        assert!(s.decode_document_fields(&json!({})).unwrap().is_empty());
    }
}
