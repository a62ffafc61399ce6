//! In-memory object graph that answers introspection queries.
//!
//! A snapshot is what a JVM agent exports when it walks the live class loader
//! graph: every object it touched, with the fields it read and the results of
//! the methods it invoked. Values use an externally tagged JSON encoding:
//!
//! ```json
//! {
//!   "roots": [1],
//!   "objects": [
//!     {
//!       "id": 1,
//!       "class": "java.net.URLClassLoader",
//!       "supertypes": ["java.security.SecureClassLoader", "java.lang.ClassLoader"],
//!       "fields": { "parent": "null" },
//!       "methods": {
//!         "getURLs": [{ "args": [], "returns": { "array": [{ "str": "file:/app/lib/a.jar" }] } }]
//!       }
//!     }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::introspect::{Introspect, IntrospectionError, ObjectId, Value};

/// Recorded result of one method invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodCase {
    /// Arguments the call was made with; `None` matches any arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    #[serde(default)]
    pub returns: Value,
}

/// One object of the captured heap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeapObject {
    pub id: ObjectId,
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(default)]
    pub supertypes: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default)]
    pub methods: BTreeMap<String, Vec<MethodCase>>,
}

impl HeapObject {
    pub fn new(id: u64, class_name: impl Into<String>) -> Self {
        Self {
            id: ObjectId(id),
            class_name: class_name.into(),
            supertypes: Vec::new(),
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    pub fn with_supertype(mut self, supertype: impl Into<String>) -> Self {
        self.supertypes.push(supertype.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Record a method result for exactly these arguments.
    pub fn with_method(mut self, name: impl Into<String>, args: Vec<Value>, returns: Value) -> Self {
        self.methods.entry(name.into()).or_default().push(MethodCase {
            args: Some(args),
            returns,
        });
        self
    }

    /// Record a method result for any arguments.
    pub fn with_getter(mut self, name: impl Into<String>, returns: Value) -> Self {
        self.methods
            .entry(name.into())
            .or_default()
            .push(MethodCase { args: None, returns });
        self
    }
}

#[derive(Deserialize, Serialize)]
struct SnapshotFile {
    #[serde(default)]
    roots: Vec<ObjectId>,
    objects: Vec<HeapObject>,
}

/// Captured heap implementing [`Introspect`].
#[derive(Clone, Debug, Default)]
pub struct HeapSnapshot {
    roots: Vec<ObjectId>,
    objects: BTreeMap<ObjectId, HeapObject>,
}

impl HeapSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON snapshot, reporting the JSON path of malformed values.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let mut deserializer = serde_json::Deserializer::from_reader(reader);
        let file: SnapshotFile = serde_path_to_error::deserialize(&mut deserializer)
            .context("failed to parse heap snapshot")?;
        let mut snapshot = Self::new();
        for object in file.objects {
            let id = object.id;
            if snapshot.objects.insert(id, object).is_some() {
                anyhow::bail!("duplicate object id in heap snapshot: {id}");
            }
        }
        for root in &file.roots {
            if !snapshot.objects.contains_key(root) {
                anyhow::bail!("heap snapshot root {root} is not a known object");
            }
        }
        snapshot.roots = file.roots;
        Ok(snapshot)
    }

    pub fn insert(&mut self, object: HeapObject) {
        self.objects.insert(object.id, object);
    }

    pub fn with_object(mut self, object: HeapObject) -> Self {
        self.insert(object);
        self
    }

    pub fn add_root(&mut self, root: ObjectId) {
        self.roots.push(root);
    }

    pub fn roots(&self) -> &[ObjectId] {
        &self.roots
    }

    pub fn contains(&self, object: ObjectId) -> bool {
        self.objects.contains_key(&object)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn object(&self, id: ObjectId) -> Result<&HeapObject, IntrospectionError> {
        self.objects
            .get(&id)
            .ok_or(IntrospectionError::UnknownObject(id))
    }
}

impl Introspect for HeapSnapshot {
    fn class_name(&self, object: ObjectId) -> Option<&str> {
        self.objects
            .get(&object)
            .map(|object| object.class_name.as_str())
    }

    fn type_hierarchy(&self, object: ObjectId) -> Vec<&str> {
        match self.objects.get(&object) {
            Some(object) => std::iter::once(object.class_name.as_str())
                .chain(object.supertypes.iter().map(String::as_str))
                .collect(),
            None => Vec::new(),
        }
    }

    fn field(&self, object: ObjectId, name: &str) -> Result<Value, IntrospectionError> {
        let object = self.object(object)?;
        object
            .fields
            .get(name)
            .cloned()
            .ok_or_else(|| IntrospectionError::FieldNotFound {
                class_name: object.class_name.clone(),
                field: name.to_string(),
            })
    }

    fn invoke(
        &self,
        object: ObjectId,
        method: &str,
        args: &[Value],
    ) -> Result<Value, IntrospectionError> {
        let object = self.object(object)?;
        object
            .methods
            .get(method)
            .and_then(|cases| {
                cases.iter().find(|case| match &case.args {
                    Some(expected) => expected.as_slice() == args,
                    None => true,
                })
            })
            .map(|case| case.returns.clone())
            .ok_or_else(|| IntrospectionError::MethodNotFound {
                class_name: object.class_name.clone(),
                method: method.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HeapSnapshot {
        HeapSnapshot::new()
            .with_object(
                HeapObject::new(1, "java.io.File")
                    .with_field("path", Value::Str("/opt/app.jar".to_string())),
            )
            .with_object(
                HeapObject::new(2, "java.util.HashMap")
                    .with_supertype("java.util.AbstractMap")
                    .with_method("get", vec![Value::Long(0)], Value::Ref(ObjectId(1)))
                    .with_getter("toString", Value::Str("{0=/opt/app.jar}".to_string())),
            )
    }

    #[test]
    fn field_lookup_distinguishes_missing_fields() {
        let heap = sample();

        assert_eq!(
            heap.field(ObjectId(1), "path"),
            Ok(Value::Str("/opt/app.jar".to_string()))
        );
        assert!(matches!(
            heap.field(ObjectId(1), "name"),
            Err(IntrospectionError::FieldNotFound { .. })
        ));
        assert_eq!(
            heap.field(ObjectId(9), "path"),
            Err(IntrospectionError::UnknownObject(ObjectId(9)))
        );
    }

    #[test]
    fn invoke_matches_recorded_arguments() {
        let heap = sample();

        assert_eq!(
            heap.invoke(ObjectId(2), "get", &[Value::Long(0)]),
            Ok(Value::Ref(ObjectId(1)))
        );
        assert!(matches!(
            heap.invoke(ObjectId(2), "get", &[Value::Long(1)]),
            Err(IntrospectionError::MethodNotFound { .. })
        ));
        assert_eq!(
            heap.invoke(ObjectId(2), "toString", &[Value::Null]),
            Ok(Value::Str("{0=/opt/app.jar}".to_string()))
        );
    }

    #[test]
    fn lookups_on_null_receivers_fail_without_panicking() {
        let heap = sample();

        assert!(matches!(
            heap.field_of(&Value::Null, "path"),
            Err(IntrospectionError::NullReceiver { .. })
        ));
        assert!(matches!(
            heap.invoke_on(&Value::Long(3), "get", &[]),
            Err(IntrospectionError::TypeMismatch { .. })
        ));
        assert!(matches!(
            heap.object_field(ObjectId(1), "path"),
            Err(IntrospectionError::TypeMismatch { found: "string", .. })
        ));
    }

    #[test]
    fn string_and_file_helpers() {
        let heap = sample();

        assert_eq!(
            heap.file_path(&Value::Ref(ObjectId(1))),
            Some("/opt/app.jar".to_string())
        );
        assert_eq!(
            heap.string_value(&Value::Ref(ObjectId(2))),
            Some("{0=/opt/app.jar}".to_string())
        );
        assert_eq!(heap.string_value(&Value::Long(7)), Some("7".to_string()));
        assert_eq!(heap.string_value(&Value::Null), None);
    }

    #[test]
    fn type_hierarchy_lists_runtime_type_first() {
        let heap = sample();

        assert_eq!(
            heap.type_hierarchy(ObjectId(2)),
            vec!["java.util.HashMap", "java.util.AbstractMap"]
        );
        assert!(heap.type_hierarchy(ObjectId(5)).is_empty());
    }

    #[test]
    fn parses_json_snapshot() {
        let json = r#"{
            "roots": [1],
            "objects": [
                {
                    "id": 1,
                    "class": "java.net.URLClassLoader",
                    "supertypes": ["java.lang.ClassLoader"],
                    "fields": { "parent": "null" },
                    "methods": {
                        "getURLs": [{ "args": [], "returns": { "array": [{ "str": "file:/a.jar" }] } }]
                    }
                }
            ]
        }"#;

        let heap = HeapSnapshot::from_json_reader(json.as_bytes()).expect("parse snapshot");

        assert_eq!(heap.roots(), &[ObjectId(1)]);
        assert_eq!(heap.class_name(ObjectId(1)), Some("java.net.URLClassLoader"));
        assert_eq!(heap.field(ObjectId(1), "parent"), Ok(Value::Null));
        assert_eq!(
            heap.invoke(ObjectId(1), "getURLs", &[]),
            Ok(Value::Array(vec![Value::Str("file:/a.jar".to_string())]))
        );
    }

    #[test]
    fn parse_errors_name_the_json_path() {
        let json = r#"{ "objects": [ { "id": 1, "class": "X", "fields": { "f": { "long": "x" } } } ] }"#;

        let error = HeapSnapshot::from_json_reader(json.as_bytes()).expect_err("invalid snapshot");

        assert!(format!("{error:#}").contains("objects[0].fields.f"));
    }

    #[test]
    fn rejects_duplicate_ids_and_unknown_roots() {
        let duplicate = r#"{ "objects": [ { "id": 1, "class": "A" }, { "id": 1, "class": "B" } ] }"#;
        let unknown_root = r#"{ "roots": [4], "objects": [ { "id": 1, "class": "A" } ] }"#;

        let error = HeapSnapshot::from_json_reader(duplicate.as_bytes()).expect_err("duplicate");
        assert!(format!("{error:#}").contains("duplicate object id"));
        let error = HeapSnapshot::from_json_reader(unknown_root.as_bytes()).expect_err("root");
        assert!(format!("{error:#}").contains("not a known object"));
    }
}
