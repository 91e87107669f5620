//! Defines the compiled IR module shapes and their deserialization.
//!
//! The IR is the central contract between the surface-language compiler
//! and this engine: a JSON-compatible object carrying component schemas,
//! rules, module-level functions, choice-point metadata and the initial
//! entity state. Parsing is tolerant in two directions mandated by the
//! format: unknown top-level fields are preserved through a load/save
//! round trip, and unknown expression or action kinds deserialize into
//! catch-all variants that the runtime warns about and ignores.

use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::value::ValueType;

/// Expression kind tags recognized by the evaluator.
const EXPR_KINDS: &[&str] = &[
    "literal", "var", "param", "field", "binary", "unary", "call", "if",
];

/// Action kind tags recognized by the executor.
const ACTION_KINDS: &[&str] = &[
    "modify",
    "schedule",
    "emit",
    "spawn",
    "despawn",
    "clone",
    "let",
    "conditional",
    "loop",
    "while",
    "call",
    "add_component",
    "remove_component",
];

/// Top-level IR module aggregate, loaded once per simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrModule {
    /// IR format version, checked against [`crate::IR_VERSION`].
    pub version: String,
    /// Module name.
    #[serde(default)]
    pub module: String,
    /// Compiler metadata, carried verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<IrMetadata>,
    /// Component schema declarations.
    #[serde(default)]
    pub components: Vec<IrComponent>,
    /// Rule declarations, in firing precedence order.
    #[serde(default)]
    pub rules: Vec<IrRule>,
    /// Module-level helper functions.
    #[serde(default)]
    pub functions: Vec<IrFunction>,
    /// Choice-point metadata for presentation layers.
    #[serde(default)]
    pub choice_points: Vec<IrChoicePoint>,
    /// Module constants.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub constants: IndexMap<String, serde_json::Value>,
    /// Source files for debug tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map: Option<IrSourceMap>,
    /// Initial entities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<IrInitialState>,
    /// Unknown top-level fields, preserved for round-tripping.
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiler_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
}

/// Component schema declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrComponent {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<IrField>,
}

/// Field declaration within a component schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: IrTypeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// Declared type reference.
///
/// Compilers emit types either as plain strings (`"integer"`,
/// `"list<entity>"`) or as tagged objects (`{"type": "number"}`); both
/// forms are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IrTypeRef {
    Name(String),
    Detailed(serde_json::Value),
}

impl IrTypeRef {
    pub fn parse(&self) -> Option<ValueType> {
        match self {
            IrTypeRef::Name(name) => ValueType::from_str(name),
            IrTypeRef::Detailed(raw) => raw
                .get("type")
                .and_then(|t| t.as_str())
                .and_then(ValueType::from_str),
        }
    }
    pub fn type_name(&self) -> String {
        match self {
            IrTypeRef::Name(name) => name.clone(),
            IrTypeRef::Detailed(raw) => raw
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

/// Rule declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrRule {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub trigger: IrTrigger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<IrFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<IrExpr>,
    #[serde(default)]
    pub actions: Vec<IrAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrTrigger {
    #[serde(rename = "type")]
    pub trigger_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Variable bindings: variable name to `"source"`, `"target"` or an
    /// event field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindings: Option<IndexMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrFilter {
    #[serde(default)]
    pub components: Vec<String>,
}

/// Expression tree node.
///
/// Recognized kinds deserialize into [`IrExprKind`]; anything else is
/// captured raw so the evaluator can warn and yield null instead of
/// rejecting the whole module.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IrExpr {
    Known(Box<IrExprKind>),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IrExprKind {
    Literal {
        value: serde_json::Value,
    },
    Var {
        name: String,
    },
    Param {
        name: String,
    },
    Field {
        entity: IrEntityRef,
        component: String,
        field: String,
    },
    Binary {
        op: String,
        left: IrExpr,
        right: IrExpr,
    },
    Unary {
        op: String,
        expr: IrExpr,
    },
    Call {
        function: String,
        #[serde(default)]
        args: Vec<IrExpr>,
    },
    If {
        condition: IrExpr,
        then: IrExpr,
        #[serde(rename = "else")]
        else_expr: IrExpr,
    },
}

impl<'de> serde::Deserialize<'de> for IrExpr {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        match raw.get("type").and_then(|t| t.as_str()) {
            Some(tag) if EXPR_KINDS.contains(&tag) => serde_json::from_value::<IrExprKind>(raw)
                .map(|kind| IrExpr::Known(Box::new(kind)))
                .map_err(de::Error::custom),
            _ => Ok(IrExpr::Other(raw)),
        }
    }
}

/// Entity operand of a field access or action: either a variable name
/// or a nested expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IrEntityRef {
    Name(String),
    Expr(Box<IrExpr>),
}

/// Statement-level action node. Same tolerance scheme as [`IrExpr`].
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IrAction {
    Known(Box<IrActionKind>),
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IrActionKind {
    Modify {
        entity: IrEntityRef,
        component: String,
        field: String,
        op: String,
        value: IrExpr,
    },
    Schedule {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delay: Option<IrExpr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<IrExpr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<IrExpr>,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        fields: IndexMap<String, IrExpr>,
        #[serde(default)]
        recurring: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval: Option<IrExpr>,
    },
    Emit {
        event: String,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        fields: IndexMap<String, IrExpr>,
    },
    Spawn {
        components: IrComponentSet,
    },
    Despawn {
        entity: IrEntityRef,
    },
    Clone {
        source: IrEntityRef,
        #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
        overrides: IndexMap<String, IndexMap<String, IrExpr>>,
    },
    Let {
        name: String,
        value: IrLetRhs,
    },
    Conditional {
        condition: IrExpr,
        #[serde(default)]
        then_actions: Vec<IrAction>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        else_actions: Option<Vec<IrAction>>,
    },
    Loop {
        variable: String,
        iterable: IrExpr,
        #[serde(default)]
        body: Vec<IrAction>,
    },
    While {
        condition: IrExpr,
        #[serde(default)]
        body: Vec<IrAction>,
    },
    Call {
        function: String,
        #[serde(default)]
        args: Vec<IrExpr>,
    },
    AddComponent {
        entity: IrEntityRef,
        component: IrComponentInit,
    },
    RemoveComponent {
        entity: IrEntityRef,
        component: String,
    },
}

impl<'de> serde::Deserialize<'de> for IrAction {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        match raw.get("type").and_then(|t| t.as_str()) {
            Some(tag) if ACTION_KINDS.contains(&tag) => serde_json::from_value::<IrActionKind>(raw)
                .map(|kind| IrAction::Known(Box::new(kind)))
                .map_err(de::Error::custom),
            _ => Ok(IrAction::Other(raw)),
        }
    }
}

/// Component set of a `spawn` action. Compilers emit either a map from
/// component name to field initializers or a list of component inits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IrComponentSet {
    Map(IndexMap<String, IndexMap<String, IrExpr>>),
    List(Vec<IrComponentInit>),
}

impl IrComponentSet {
    /// Iterates (component name, field initializers) pairs in
    /// declaration order.
    pub fn iter(&self) -> Box<dyn Iterator<Item = (&String, &IndexMap<String, IrExpr>)> + '_> {
        match self {
            IrComponentSet::Map(map) => Box::new(map.iter()),
            IrComponentSet::List(list) => Box::new(list.iter().map(|c| (&c.name, &c.fields))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrComponentInit {
    pub name: String,
    #[serde(default)]
    pub fields: IndexMap<String, IrExpr>,
}

/// Right-hand side of a `let` action: an expression, or an action that
/// yields a value (`schedule`, `spawn`, `clone`).
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IrLetRhs {
    Expr(Box<IrExpr>),
    Action(Box<IrAction>),
}

impl<'de> serde::Deserialize<'de> for IrLetRhs {
    fn deserialize<D>(deserializer: D) -> core::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        match raw.get("type").and_then(|t| t.as_str()) {
            // "call" is both an expression and an action kind; a let
            // right-hand side treats it as a value-producing expression
            Some(tag) if EXPR_KINDS.contains(&tag) => serde_json::from_value::<IrExprKind>(raw)
                .map(|kind| IrLetRhs::Expr(Box::new(IrExpr::Known(Box::new(kind)))))
                .map_err(de::Error::custom),
            Some(tag) if ACTION_KINDS.contains(&tag) => serde_json::from_value::<IrActionKind>(raw)
                .map(|kind| IrLetRhs::Action(Box::new(IrAction::Known(Box::new(kind)))))
                .map_err(de::Error::custom),
            _ => Ok(IrLetRhs::Expr(Box::new(IrExpr::Other(raw)))),
        }
    }
}

/// Module-level function declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrFunction {
    #[serde(default)]
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub params: Vec<IrParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<IrTypeRef>,
    pub body: IrExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrParam {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: IrTypeRef,
}

/// Choice-point metadata. Consumed by presentation layers only; the
/// engine carries it through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrChoicePoint {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub params: Vec<IrParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<IrTypeRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicable_classes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrSourceMap {
    #[serde(default)]
    pub files: Vec<IrSourceFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrSourceFile {
    pub path: String,
    pub content: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrInitialState {
    #[serde(default)]
    pub entities: Vec<IrEntity>,
}

/// Initial entity declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrEntity {
    pub id: crate::EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub components: IndexMap<String, IndexMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_functions: Option<IndexMap<String, IrBoundFunction>>,
}

/// Choice function bound to a single entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrBoundFunction {
    #[serde(default)]
    pub params: Vec<IrParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<IrTypeRef>,
    pub body: IrExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl IrModule {
    /// Parses an IR module from JSON text.
    pub fn from_json_str(input: &str) -> Result<IrModule> {
        let module: IrModule = serde_json::from_str(input)?;
        Ok(module)
    }

    /// Parses an IR module from an already-deserialized JSON value.
    pub fn from_json_value(input: serde_json::Value) -> Result<IrModule> {
        let module: IrModule = serde_json::from_value(input)?;
        Ok(module)
    }

    /// Serializes the module back to a JSON value, preserving unknown
    /// top-level fields.
    pub fn to_json_value(&self) -> Result<serde_json::Value> {
        let value = serde_json::to_value(self)?;
        Ok(value)
    }

    /// Checks the structural preconditions a module must satisfy before
    /// a simulation can be built from it. Violations are fatal.
    pub fn validate(&self) -> Result<()> {
        if self.version != crate::IR_VERSION {
            return Err(Error::UnsupportedIrVersion(self.version.clone()));
        }
        for component in &self.components {
            for field in &component.fields {
                if field.type_.parse().is_none() {
                    return Err(Error::UnknownFieldType {
                        component: component.name.clone(),
                        field: field.name.clone(),
                        type_name: field.type_.type_name(),
                    });
                }
            }
        }
        for rule in &self.rules {
            if rule.trigger.trigger_type == "event" && rule.trigger.event.is_none() {
                return Err(Error::MalformedIr(format!(
                    "rule {} has an event trigger without an event name",
                    rule.id
                )));
            }
        }
        if let Some(initial) = &self.initial_state {
            let mut seen = std::collections::HashSet::new();
            for entity in &initial.entities {
                if !seen.insert(entity.id) {
                    return Err(Error::DuplicateEntityId(entity.id));
                }
            }
        }
        Ok(())
    }
}
