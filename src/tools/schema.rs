//! Parameter-schema synthesis for tools.
//!
//! Tools declare their parameters explicitly as a list of [`ParamSpec`]s.
//! [`build_parameters`] turns that declaration (plus an optional
//! docstring) into the JSON-Schema object that completion APIs expect
//! under `function.parameters`.

use serde_json::{json, Map, Value};

/// Declared type of a single tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    /// A sequence.  `None` means the item type was not declared.
    Array(Option<Box<ParamType>>),
    /// A mapping.  `None` means the value type was not declared.
    Object(Option<Box<ParamType>>),
    /// A nullable value; unwraps to the inner type in the schema.
    Optional(Box<ParamType>),
    /// Any type without a schema mapping (rendered as `string`).
    Other(String),
}

impl ParamType {
    pub fn array_of(item: ParamType) -> Self {
        ParamType::Array(Some(Box::new(item)))
    }

    pub fn map_of(value: ParamType) -> Self {
        ParamType::Object(Some(Box::new(value)))
    }

    pub fn optional(inner: ParamType) -> Self {
        ParamType::Optional(Box::new(inner))
    }

    /// Render this type as a JSON-Schema fragment.
    ///
    /// Never fails: anything without a mapping degrades to `string`.
    pub fn to_schema(&self) -> Value {
        match self {
            ParamType::String => json!({ "type": "string" }),
            ParamType::Integer => json!({ "type": "integer" }),
            ParamType::Number => json!({ "type": "number" }),
            ParamType::Boolean => json!({ "type": "boolean" }),
            ParamType::Array(None) => json!({ "type": "array", "items": { "type": "string" } }),
            ParamType::Array(Some(item)) => json!({ "type": "array", "items": item.item_schema() }),
            ParamType::Object(None) => json!({ "type": "object" }),
            ParamType::Object(Some(value)) => {
                json!({ "type": "object", "additionalProperties": value.item_schema() })
            }
            ParamType::Optional(inner) => inner.to_schema(),
            ParamType::Other(_) => json!({ "type": "string" }),
        }
    }

    /// Schema for a nested item/value type.  Only scalar types map;
    /// containers nested inside containers fall back to `string`.
    fn item_schema(&self) -> Value {
        match self {
            ParamType::String
            | ParamType::Integer
            | ParamType::Number
            | ParamType::Boolean => self.to_schema(),
            ParamType::Optional(inner) => inner.item_schema(),
            _ => json!({ "type": "string" }),
        }
    }
}

/// One declared parameter of a tool handler.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    /// Whether the handler supplies a default when the argument is absent.
    pub has_default: bool,
}

impl ParamSpec {
    /// A parameter the caller must always supply.
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            has_default: false,
        }
    }

    /// A parameter with a default value on the handler side.
    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            has_default: true,
        }
    }
}

/// The full declared signature of a tool handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub params: Vec<ParamSpec>,
    /// Handler accepts arbitrary extra keyword arguments.
    pub accepts_extra: bool,
}

impl Signature {
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self {
            params,
            accepts_extra: false,
        }
    }

    /// Mark the handler as accepting undeclared keyword arguments.
    pub fn with_extra(mut self) -> Self {
        self.accepts_extra = true;
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Build a `{"type":"object","properties":…,"required":[…]}` schema from
/// a declared signature.
///
/// A parameter is required iff it has no default.  When `doc` is given,
/// the first line starting with `"<name>:"` supplies the parameter's
/// description.
pub fn build_parameters(signature: &Signature, doc: Option<&str>) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &signature.params {
        let mut schema = param.ty.to_schema();
        if let Some(desc) = doc.and_then(|d| param_description(d, &param.name)) {
            schema["description"] = Value::String(desc);
        }
        properties.insert(param.name.clone(), schema);
        if !param.has_default {
            required.push(Value::String(param.name.clone()));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Find the description for `name` in a docstring.
fn param_description(doc: &str, name: &str) -> Option<String> {
    let prefix = format!("{name}:");
    doc.lines()
        .map(str::trim)
        .find(|line| line.starts_with(&prefix))
        .and_then(|line| line.split_once(':'))
        .map(|(_, rest)| rest.trim().to_string())
}
