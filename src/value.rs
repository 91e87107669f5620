//! Defines all the available value types and their transformations.

use std::fmt;

use indexmap::IndexMap;

use crate::{EntityId, Float, Int};

const INT_TYPE_NAME: &str = "integer";
const INT_TYPE_NAME_ALT: &str = "int";
const FLOAT_TYPE_NAME: &str = "number";
const FLOAT_TYPE_NAME_ALT: &str = "float";
const STR_TYPE_NAME: &str = "string";
const STR_TYPE_NAME_ALT: &str = "str";
const BOOL_TYPE_NAME: &str = "boolean";
const BOOL_TYPE_NAME_ALT: &str = "bool";
const ENTITY_TYPE_NAME: &str = "entity";
const LIST_TYPE_NAME: &str = "list";
const MAP_TYPE_NAME: &str = "object";
const MAP_TYPE_NAME_ALT: &str = "map";

/// Defines all possible types of component field values.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Int,
    Float,
    Str,
    Bool,
    Entity,
    List,
    Map,
}

impl fmt::Display for ValueType {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(formatter, "{}", self.to_str())
    }
}

impl ValueType {
    /// Parses a declared IR type string.
    ///
    /// List types may carry an element type (`list<integer>`); the
    /// element type is accepted but not enforced on writes.
    pub fn from_str(s: &str) -> Option<ValueType> {
        let value_type = match s {
            INT_TYPE_NAME | INT_TYPE_NAME_ALT => ValueType::Int,
            FLOAT_TYPE_NAME | FLOAT_TYPE_NAME_ALT => ValueType::Float,
            STR_TYPE_NAME | STR_TYPE_NAME_ALT => ValueType::Str,
            BOOL_TYPE_NAME | BOOL_TYPE_NAME_ALT => ValueType::Bool,
            ENTITY_TYPE_NAME => ValueType::Entity,
            MAP_TYPE_NAME | MAP_TYPE_NAME_ALT => ValueType::Map,
            _ if s == LIST_TYPE_NAME || s.starts_with("list<") => ValueType::List,
            _ => return None,
        };
        Some(value_type)
    }

    /// Get the canonical name of the type.
    pub fn to_str(&self) -> &str {
        match self {
            ValueType::Int => INT_TYPE_NAME,
            ValueType::Float => FLOAT_TYPE_NAME,
            ValueType::Str => STR_TYPE_NAME,
            ValueType::Bool => BOOL_TYPE_NAME,
            ValueType::Entity => ENTITY_TYPE_NAME,
            ValueType::List => LIST_TYPE_NAME,
            ValueType::Map => MAP_TYPE_NAME,
        }
    }

    /// Get the default value for the type, applied when a component is
    /// created and the field declares no explicit default.
    pub fn default_value(&self) -> Value {
        match self {
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Str => Value::Str(String::new()),
            ValueType::Bool => Value::Bool(false),
            ValueType::Entity => Value::Null,
            ValueType::List => Value::List(Vec::new()),
            ValueType::Map => Value::Map(IndexMap::new()),
        }
    }
}

/// Abstraction over all possible component field values.
///
/// `Clone` is a deep copy: lists and maps recurse. Component data is
/// assumed acyclic, which the type makes structural (no references).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(Int),
    Float(Float),
    Str(String),
    Entity(EntityId),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

/// Type-strict checkers and getters.
impl Value {
    pub fn type_of(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Bool),
            Value::Int(_) => Some(ValueType::Int),
            Value::Float(_) => Some(ValueType::Float),
            Value::Str(_) => Some(ValueType::Str),
            Value::Entity(_) => Some(ValueType::Entity),
            Value::List(_) => Some(ValueType::List),
            Value::Map(_) => Some(ValueType::Map),
        }
    }
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            _ => false,
        }
    }
    pub fn is_numeric(&self) -> bool {
        match self {
            Value::Int(_) | Value::Float(_) | Value::Entity(_) => true,
            _ => false,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }
    /// Entity id held by the value, if any. Numeric values are accepted
    /// as ids since event fields and IR literals carry ids as plain
    /// numbers.
    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Value::Entity(id) => Some(*id),
            Value::Int(i) if *i >= 0 => Some(*i as EntityId),
            Value::Float(f) if *f >= 0.0 && f.is_finite() => Some(*f as EntityId),
            _ => None,
        }
    }
}

/// Lossy conversions.
impl Value {
    /// Integer view of the value. Floats truncate toward zero and
    /// non-finite floats map to 0.
    pub fn to_int(&self) -> Int {
        match self {
            Value::Null => 0,
            Value::Bool(v) => *v as Int,
            Value::Int(v) => *v,
            Value::Float(v) => {
                if v.is_finite() {
                    v.trunc() as Int
                } else {
                    0
                }
            }
            Value::Str(v) => v.len() as Int,
            Value::Entity(v) => *v as Int,
            Value::List(v) => v.len() as Int,
            Value::Map(v) => v.len() as Int,
        }
    }
    pub fn to_float(&self) -> Float {
        match self {
            Value::Null => 0.0,
            Value::Bool(v) => (*v as Int) as Float,
            Value::Int(v) => *v as Float,
            Value::Float(v) => *v,
            Value::Str(v) => v.len() as Float,
            Value::Entity(v) => *v as Float,
            Value::List(v) => v.len() as Float,
            Value::Map(v) => v.len() as Float,
        }
    }
    /// Standard truthiness: null, zero, the empty string and `false`
    /// are falsey, everything else is truthy.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(v) => *v,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(v) => !v.is_empty(),
            Value::Entity(_) => true,
            Value::List(_) | Value::Map(_) => true,
        }
    }
    pub fn to_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(v) => format!("{}", v),
            Value::Int(v) => format!("{}", v),
            Value::Float(v) => format!("{}", v),
            Value::Str(v) => v.clone(),
            Value::Entity(v) => format!("{}", v),
            Value::List(v) => format!("{:?}", v),
            Value::Map(v) => format!("{:?}", v),
        }
    }
}

/// Comparisons.
impl Value {
    /// Loose equality used by the rule language: numbers compare by
    /// value across `Int`/`Float`/`Entity`, `Null` equals only `Null`.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) if a.is_numeric() && b.is_numeric() => a.to_float() == b.to_float(),
            (a, b) => a == b,
        }
    }
}

/// Write-time coercion.
impl Value {
    /// Coerces the value for a write into a field of the declared type.
    ///
    /// Integer fields truncate numerics toward zero (non-finite floats
    /// map to 0), float fields widen integers, entity fields accept
    /// non-negative numerics as ids. All other writes are accepted
    /// literally.
    pub fn coerce(self, target: ValueType) -> Value {
        match target {
            ValueType::Int => match self {
                Value::Int(_) => self,
                Value::Float(_) | Value::Bool(_) | Value::Entity(_) => Value::Int(self.to_int()),
                other => other,
            },
            ValueType::Float => match self {
                Value::Float(_) => self,
                Value::Int(i) => Value::Float(i as Float),
                other => other,
            },
            ValueType::Entity => match self.as_entity() {
                Some(id) => Value::Entity(id),
                None => self,
            },
            _ => self,
        }
    }
}

/// JSON bridge.
impl Value {
    /// Builds a value from an IR literal. Numbers without a fractional
    /// part become `Int`; entity-ness is recovered by write coercion
    /// against the declared field type.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_coercion_truncates_toward_zero() {
        assert_eq!(Value::Float(7.9).coerce(ValueType::Int), Value::Int(7));
        assert_eq!(Value::Float(-7.9).coerce(ValueType::Int), Value::Int(-7));
        assert_eq!(
            Value::Float(Float::NAN).coerce(ValueType::Int),
            Value::Int(0)
        );
        assert_eq!(
            Value::Float(Float::INFINITY).coerce(ValueType::Int),
            Value::Int(0)
        );
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.to_bool());
        assert!(!Value::Int(0).to_bool());
        assert!(!Value::Str(String::new()).to_bool());
        assert!(Value::Entity(0).to_bool());
        assert!(Value::List(vec![]).to_bool());
        assert!(Value::Float(0.1).to_bool());
    }

    #[test]
    fn loose_numeric_equality() {
        assert!(Value::Int(2).loose_eq(&Value::Float(2.0)));
        assert!(Value::Entity(3).loose_eq(&Value::Int(3)));
        assert!(!Value::Null.loose_eq(&Value::Int(0)));
    }

    #[test]
    fn type_names_parse_with_alternates() {
        assert_eq!(ValueType::from_str("integer"), Some(ValueType::Int));
        assert_eq!(ValueType::from_str("number"), Some(ValueType::Float));
        assert_eq!(ValueType::from_str("list<entity>"), Some(ValueType::List));
        assert_eq!(ValueType::from_str("quaternion"), None);
    }
}
