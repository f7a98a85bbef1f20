//! Lock data model
//!
//! A `Resource` names the thing being locked and who holds it. A `Lock` is the
//! persisted record: the resource plus the concurrency metadata every write
//! refreshes.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Type string of a mutual-exclusion lock
pub const LOCK_TYPE: &str = "lock";

/// Type string of a presence record
pub const PRESENCE_TYPE: &str = "presence";

/// Numeric type tag of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum TypeCode {
    #[default]
    Unknown = 0,
    Lock = 1,
    Presence = 2,
}

/// The one mapping between type codes and type strings, used on read and write
const TYPE_NAMES: [(TypeCode, &str); 2] = [
    (TypeCode::Lock, LOCK_TYPE),
    (TypeCode::Presence, PRESENCE_TYPE),
];

impl TypeCode {
    /// Resolve a type string. Unrecognized strings map to `Unknown`.
    pub fn from_type_name(name: &str) -> TypeCode {
        TYPE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(code, _)| *code)
            .unwrap_or(TypeCode::Unknown)
    }

    /// Type string for this code, `None` for `Unknown`
    pub fn type_name(self) -> Option<&'static str> {
        TYPE_NAMES
            .iter()
            .find(|(code, _)| *code == self)
            .map(|(_, name)| *name)
    }
}

impl Display for TypeCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeCode::Unknown => write!(f, "UNKNOWN"),
            TypeCode::Lock => write!(f, "LOCK"),
            TypeCode::Presence => write!(f, "PRESENCE"),
        }
    }
}

/// A named resource and its holder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub key: String,
    pub owner: String,
    pub value: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub type_code: TypeCode,
}

impl Resource {
    pub fn new(
        key: impl Into<String>,
        owner: impl Into<String>,
        value: impl Into<String>,
        r#type: impl Into<String>,
    ) -> Self {
        let mut resource = Self {
            key: key.into(),
            owner: owner.into(),
            value: value.into(),
            r#type: r#type.into(),
            type_code: TypeCode::Unknown,
        };
        resource.type_code = resource.resolved_type_code();
        resource
    }

    /// The type string, falling back to the name of the type code
    pub fn resolved_type(&self) -> String {
        if !self.r#type.is_empty() {
            return self.r#type.clone();
        }
        self.type_code.type_name().unwrap_or_default().to_string()
    }

    /// The type code, falling back to the code of the type string
    pub fn resolved_type_code(&self) -> TypeCode {
        if self.type_code != TypeCode::Unknown {
            return self.type_code;
        }
        TypeCode::from_type_name(&self.r#type)
    }

    /// Copy of this resource with both type fields filled in
    pub fn normalized(&self) -> Resource {
        Resource {
            r#type: self.resolved_type(),
            type_code: self.resolved_type_code(),
            ..self.clone()
        }
    }

    /// A row with neither owner nor value is a placeholder and counts as free
    pub fn is_vacant(&self) -> bool {
        self.owner.is_empty() && self.value.is_empty()
    }
}

/// Persisted lock record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    pub resource: Resource,
    pub modified_index: i64,
    pub modified_id: String,
    pub ttl_in_seconds: i64,
}

impl Lock {
    pub fn key(&self) -> &str {
        &self.resource.key
    }

    /// Whether `other` is the same write generation as this lock
    pub fn same_generation(&self, other: &Lock) -> bool {
        self.modified_index == other.modified_index && self.modified_id == other.modified_id
    }
}
