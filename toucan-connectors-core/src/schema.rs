//! Static field declarations for configuration records.
//!
//! Every connector and data-source record declares its fields as a
//! `&'static [FieldSpec]` table. The table drives validation
//! ([`crate::validation`]), introspection ([`Model::schema`]) and JSON Schema
//! export for configuration UIs ([`ModelSchema::json_schema`]).
//!
//! # Example
//!
//! ```rust
//! use toucan_connectors_core::schema::{Constraint, FieldKind, FieldSpec};
//!
//! const TIMEOUT: FieldSpec = FieldSpec::new("connect_timeout", FieldKind::Integer)
//!     .constraints(&[Constraint::Minimum(1)]);
//!
//! assert!(!TIMEOUT.required);
//! assert_eq!(TIMEOUT.display_title(), "Connect Timeout");
//! ```

use crate::error::{ConnectorsError, Result};
use crate::security::SECRET_MASK;
use crate::validation::{self, ValidationError};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::fmt::Debug;

/// Value kind accepted by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// JSON string
    String,
    /// JSON integer (no fractional part)
    Integer,
    /// Any JSON number
    Number,
    /// JSON boolean
    Boolean,
    /// JSON string held as a [`crate::security::Secret`]
    Secret,
    /// JSON object or array, kept as raw JSON
    Json,
}

impl FieldKind {
    /// Name used in validation messages.
    pub fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Secret => "secret string",
            Self::Json => "object or array",
        }
    }

    /// Whether `value` has this kind.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String | Self::Secret => value.is_string(),
            Self::Integer => value.is_i64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Json => value.is_object() || value.is_array(),
        }
    }

    fn json_type(self) -> Value {
        match self {
            Self::String | Self::Secret => json!("string"),
            Self::Integer => json!("integer"),
            Self::Number => json!("number"),
            Self::Boolean => json!("boolean"),
            Self::Json => json!(["object", "array"]),
        }
    }
}

/// Declared default of an optional field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    /// No value; the field stays absent
    None,
    /// String default
    Str(&'static str),
    /// Integer default
    Int(i64),
    /// Boolean default
    Bool(bool),
}

impl DefaultValue {
    /// JSON rendering of the default, `None` when there is no value.
    pub fn to_json(self) -> Option<Value> {
        match self {
            Self::None => None,
            Self::Str(value) => Some(Value::from(value)),
            Self::Int(value) => Some(Value::from(value)),
            Self::Bool(value) => Some(Value::from(value)),
        }
    }
}

/// UI rendering hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widget {
    /// SQL editor
    Sql,
    /// JSON editor
    Json,
    /// Generic code editor
    Code,
}

impl Widget {
    /// Identifier exported in the JSON Schema `widget` keyword.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Json => "json",
            Self::Code => "code",
        }
    }
}

/// Constraint on a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// Minimum number of characters of a string
    MinLength(usize),
    /// Maximum number of characters of a string
    MaxLength(usize),
    /// Inclusive lower bound of a number
    Minimum(i64),
    /// Inclusive upper bound of a number
    Maximum(i64),
    /// String must be one of the listed values
    OneOf(&'static [&'static str]),
}

/// Declaration of one field of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Key of the field in raw configuration
    pub name: &'static str,
    /// Accepted value kind
    pub kind: FieldKind,
    /// Whether the field must be present
    pub required: bool,
    /// Value used when the field is absent
    pub default: DefaultValue,
    /// Explicit title, derived from the name when unset
    pub title: Option<&'static str>,
    /// Help text
    pub description: Option<&'static str>,
    /// UI rendering hint
    pub widget: Option<Widget>,
    /// Value constraints
    pub constraints: &'static [Constraint],
}

impl FieldSpec {
    /// Declares an optional field with no default and no constraints.
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: DefaultValue::None,
            title: None,
            description: None,
            widget: None,
            constraints: &[],
        }
    }

    /// Optional string field.
    pub const fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String)
    }

    /// Optional integer field.
    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    /// Optional boolean field.
    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Optional secret field.
    pub const fn secret(name: &'static str) -> Self {
        Self::new(name, FieldKind::Secret)
    }

    /// Optional raw JSON field.
    pub const fn json(name: &'static str) -> Self {
        Self::new(name, FieldKind::Json)
    }

    /// Marks the field as required.
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the default applied when the field is absent.
    pub const fn default(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }

    /// Overrides the derived title.
    pub const fn title(mut self, title: &'static str) -> Self {
        self.title = Some(title);
        self
    }

    /// Sets the help text.
    pub const fn description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    /// Sets the UI rendering hint.
    pub const fn widget(mut self, widget: Widget) -> Self {
        self.widget = Some(widget);
        self
    }

    /// Sets the value constraints.
    pub const fn constraints(mut self, constraints: &'static [Constraint]) -> Self {
        self.constraints = constraints;
        self
    }

    /// Whether values of this field must be masked when reported.
    pub const fn is_secret(&self) -> bool {
        matches!(self.kind, FieldKind::Secret)
    }

    /// Title shown to users: the explicit title, or the name with each
    /// underscore-separated word capitalized.
    pub fn display_title(&self) -> String {
        if let Some(title) = self.title {
            return title.to_string();
        }
        self.name
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Renders the field as a JSON Schema property.
    pub fn json_schema(&self) -> Value {
        let mut property = Map::new();
        property.insert("title".into(), Value::from(self.display_title()));
        property.insert("type".into(), self.kind.json_type());
        if let Some(description) = self.description {
            property.insert("description".into(), Value::from(description));
        }
        if let Some(default) = self.default.to_json() {
            property.insert("default".into(), default);
        }
        for constraint in self.constraints {
            match *constraint {
                Constraint::MinLength(min) => {
                    property.insert("minLength".into(), Value::from(min));
                }
                Constraint::MaxLength(max) => {
                    property.insert("maxLength".into(), Value::from(max));
                }
                Constraint::Minimum(min) => {
                    property.insert("minimum".into(), Value::from(min));
                }
                Constraint::Maximum(max) => {
                    property.insert("maximum".into(), Value::from(max));
                }
                Constraint::OneOf(values) => {
                    property.insert("enum".into(), Value::from(values.to_vec()));
                }
            }
        }
        if let Some(widget) = self.widget {
            property.insert("widget".into(), Value::from(widget.as_str()));
        }
        if self.is_secret() {
            property.insert("format".into(), Value::from("password"));
            property.insert("writeOnly".into(), Value::Bool(true));
        }
        Value::Object(property)
    }
}

/// Cross-field rule evaluated after per-field checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRule {
    /// At least one of the listed fields must be present
    AtLeastOneOf(&'static [&'static str]),
}

/// Introspectable description of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSchema {
    /// Record title
    pub title: &'static str,
    /// Record help text
    pub description: &'static str,
    /// Field declarations, in display order
    pub fields: &'static [FieldSpec],
    /// Cross-field rules
    pub rules: &'static [ModelRule],
}

impl ModelSchema {
    /// Looks up a field declaration by name.
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Renders the record as a draft 2020-12 JSON Schema.
    pub fn json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| (field.name.to_string(), field.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|field| field.required)
            .map(|field| field.name)
            .collect();

        let mut schema = Map::new();
        schema.insert(
            "$schema".into(),
            Value::from("https://json-schema.org/draft/2020-12/schema"),
        );
        schema.insert("title".into(), Value::from(self.title));
        if !self.description.is_empty() {
            schema.insert("description".into(), Value::from(self.description));
        }
        schema.insert("type".into(), Value::from("object"));
        schema.insert("properties".into(), Value::Object(properties));
        schema.insert("required".into(), Value::from(required));
        schema.insert("additionalProperties".into(), Value::Bool(false));

        let any_of: Vec<Value> = self
            .rules
            .iter()
            .flat_map(|rule| match rule {
                ModelRule::AtLeastOneOf(names) => names
                    .iter()
                    .map(|name| json!({ "required": [name] }))
                    .collect::<Vec<_>>(),
            })
            .collect();
        if !any_of.is_empty() {
            schema.insert("anyOf".into(), Value::from(any_of));
        }

        Value::Object(schema)
    }

    /// Copy of `raw` with the string values of secret fields replaced by
    /// the mask, so that it can be handed to reporting code.
    pub fn mask_secrets(&self, raw: &Value) -> Value {
        let mut masked = raw.clone();
        if let Value::Object(map) = &mut masked {
            for field in self.fields.iter().filter(|field| field.is_secret()) {
                if let Some(value) = map.get_mut(field.name)
                    && value.is_string()
                {
                    *value = Value::from(SECRET_MASK);
                }
            }
        }
        masked
    }
}

/// A validated configuration record with static field declarations.
pub trait Model: DeserializeOwned + Debug + Send + Sync + Sized + 'static {
    /// Record title
    const TITLE: &'static str;

    /// Record help text
    const DESCRIPTION: &'static str = "";

    /// Field declarations, in display order.
    fn fields() -> &'static [FieldSpec];

    /// Cross-field rules.
    fn rules() -> &'static [ModelRule] {
        &[]
    }

    /// Static description of the record, available without an instance.
    fn schema() -> ModelSchema {
        ModelSchema {
            title: Self::TITLE,
            description: Self::DESCRIPTION,
            fields: Self::fields(),
            rules: Self::rules(),
        }
    }

    /// Validates raw configuration and builds the typed record.
    ///
    /// # Errors
    /// Returns every violated declaration at once. Performs no I/O.
    fn validate(raw: &Value) -> std::result::Result<Self, ValidationError> {
        validation::validate_model(raw)
    }
}

/// Checks `instance` against a JSON Schema and returns every structural
/// error found. An empty list means the instance conforms.
///
/// Callers pass instances whose secrets are already masked
/// ([`ModelSchema::mask_secrets`]) since messages quote offending values.
///
/// # Errors
/// Returns a configuration error if `schema` does not compile.
pub fn check_document(schema: &Value, instance: &Value) -> Result<Vec<String>> {
    let validator = jsonschema::validator_for(schema).map_err(|e| {
        ConnectorsError::configuration(format!("Schema compilation error: {e}"))
    })?;

    Ok(validator
        .iter_errors(instance)
        .map(|error| error.to_string())
        .collect())
}
