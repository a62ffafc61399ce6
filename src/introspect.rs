use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of an object in a foreign (JVM) heap.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Value read from a field or returned by a method.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Long(i64),
    Str(String),
    Ref(ObjectId),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Long(_) => "long",
            Value::Str(_) => "string",
            Value::Ref(_) => "object",
            Value::Array(_) => "array",
        }
    }
}

/// Lookup failures. A missing member is an ordinary outcome, not a panic.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntrospectionError {
    #[error("field {field} not found on {class_name}")]
    FieldNotFound { class_name: String, field: String },
    #[error("method {method} not found on {class_name}")]
    MethodNotFound { class_name: String, method: String },
    #[error("cannot look up {member} on a null reference")]
    NullReceiver { member: String },
    #[error("unknown object {0}")]
    UnknownObject(ObjectId),
    #[error("{member}: expected {expected}, found {found}")]
    TypeMismatch {
        member: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Reflective access to objects of a foreign runtime.
pub trait Introspect: Send + Sync {
    /// Runtime type name of the object, if it is known.
    fn class_name(&self, object: ObjectId) -> Option<&str>;

    /// Runtime type followed by its supertypes, most specific first.
    fn type_hierarchy(&self, object: ObjectId) -> Vec<&str>;

    fn field(&self, object: ObjectId, name: &str) -> Result<Value, IntrospectionError>;

    fn invoke(
        &self,
        object: ObjectId,
        method: &str,
        args: &[Value],
    ) -> Result<Value, IntrospectionError>;

    /// Read a field of a value that may be null or not an object.
    fn field_of(&self, receiver: &Value, name: &str) -> Result<Value, IntrospectionError> {
        let object = receiver_object(receiver, name)?;
        self.field(object, name)
    }

    /// Invoke a method on a value that may be null or not an object.
    fn invoke_on(
        &self,
        receiver: &Value,
        method: &str,
        args: &[Value],
    ) -> Result<Value, IntrospectionError> {
        let object = receiver_object(receiver, method)?;
        self.invoke(object, method, args)
    }

    /// Read a field that must hold a non-null object reference.
    fn object_field(&self, object: ObjectId, name: &str) -> Result<ObjectId, IntrospectionError> {
        let value = self.field(object, name)?;
        value.as_object().ok_or_else(|| IntrospectionError::TypeMismatch {
            member: name.to_string(),
            expected: "object",
            found: value.kind(),
        })
    }

    /// String form of a value: strings as-is, numbers formatted, objects via `toString()`.
    fn string_value(&self, value: &Value) -> Option<String> {
        match value {
            Value::Str(value) => Some(value.clone()),
            Value::Long(value) => Some(value.to_string()),
            Value::Bool(value) => Some(value.to_string()),
            Value::Ref(object) => match self.invoke(*object, "toString", &[]) {
                Ok(Value::Str(value)) => Some(value),
                _ => None,
            },
            Value::Null | Value::Array(_) => None,
        }
    }

    /// Path of a `java.io.File`-like value (its `path` field, else its string form).
    fn file_path(&self, value: &Value) -> Option<String> {
        if let Value::Ref(object) = value {
            if let Ok(Value::Str(path)) = self.field(*object, "path") {
                return Some(path);
            }
        }
        self.string_value(value)
    }
}

fn receiver_object(receiver: &Value, member: &str) -> Result<ObjectId, IntrospectionError> {
    match receiver {
        Value::Ref(object) => Ok(*object),
        Value::Null => Err(IntrospectionError::NullReceiver {
            member: member.to_string(),
        }),
        other => Err(IntrospectionError::TypeMismatch {
            member: member.to_string(),
            expected: "object",
            found: other.kind(),
        }),
    }
}
