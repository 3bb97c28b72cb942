//! Validation of raw configuration against field declarations.
//!
//! Validation collects every violation instead of stopping at the first one,
//! so a configuration UI can highlight all offending fields at once. It never
//! performs I/O.
//!
//! # Security
//! Offending values of secret fields are reported as
//! [`crate::security::SECRET_MASK`].
//!
//! # Example
//! ```rust
//! use serde_json::json;
//! use toucan_connectors_core::schema::{Constraint, FieldSpec};
//! use toucan_connectors_core::validation::{ViolationKind, validate_fields};
//!
//! const FIELDS: &[FieldSpec] = &[
//!     FieldSpec::string("query").required().constraints(&[Constraint::MinLength(1)]),
//! ];
//!
//! let error = validate_fields(&json!({"query": ""}), FIELDS, &[]).unwrap_err();
//! assert_eq!(error.violations()[0].field_path, "query");
//! assert_eq!(error.violations()[0].kind, ViolationKind::MinLength);
//! ```

use crate::schema::{Constraint, FieldSpec, Model, ModelRule};
use crate::security::SECRET_MASK;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Kind of constraint a value violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Required field absent or null
    Missing,
    /// Value has the wrong JSON type
    Type,
    /// String shorter than its minimum length
    MinLength,
    /// String longer than its maximum length
    MaxLength,
    /// Number below its minimum
    Minimum,
    /// Number above its maximum
    Maximum,
    /// String outside the allowed values
    OneOf,
    /// Key not declared by the record
    UnknownField,
    /// None of a group of fields is present
    AtLeastOneOf,
    /// Input is not a JSON object
    NotAnObject,
    /// Name used twice where names must be unique
    Duplicate,
    /// Data source refers to a connector that is not declared
    UnknownConnector,
}

impl ViolationKind {
    /// Stable identifier of the violation kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Type => "type",
            Self::MinLength => "min_length",
            Self::MaxLength => "max_length",
            Self::Minimum => "minimum",
            Self::Maximum => "maximum",
            Self::OneOf => "one_of",
            Self::UnknownField => "unknown_field",
            Self::AtLeastOneOf => "at_least_one_of",
            Self::NotAnObject => "not_an_object",
            Self::Duplicate => "duplicate",
            Self::UnknownConnector => "unknown_connector",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One violated declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    /// Dotted path of the field, e.g. `connectors[0].host`
    pub field_path: String,
    /// Violated constraint
    pub kind: ViolationKind,
    /// Offending value (masked for secrets, null when absent)
    pub value: Value,
    /// Human readable explanation
    pub detail: String,
}

impl FieldViolation {
    /// Creates a violation.
    pub fn new(
        field_path: impl Into<String>,
        kind: ViolationKind,
        value: Value,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            value,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.field_path.is_empty() {
            "<root>"
        } else {
            self.field_path.as_str()
        };
        write!(f, "{path}: {} ({})", self.detail, self.kind)?;
        if !self.value.is_null() {
            write!(f, ", got {}", self.value)?;
        }
        Ok(())
    }
}

/// Every violation found while validating a record or document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationError {
    violations: Vec<FieldViolation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed with {} error(s)", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "\n  {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    /// Creates an error holding a single violation.
    pub fn single(violation: FieldViolation) -> Self {
        Self {
            violations: vec![violation],
        }
    }

    /// Violations in discovery order.
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }

    /// Whether no violation was recorded.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of violations.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Whether a violation of `kind` was recorded for `field_path`.
    pub fn contains(&self, field_path: &str, kind: ViolationKind) -> bool {
        self.violations
            .iter()
            .any(|v| v.field_path == field_path && v.kind == kind)
    }

    /// Records a violation.
    pub fn push(&mut self, violation: FieldViolation) {
        self.violations.push(violation);
    }

    /// Appends the violations of `other`.
    pub fn extend(&mut self, other: Self) {
        self.violations.extend(other.violations);
    }

    /// Prefixes every field path with `prefix`, e.g. `connectors[0]`.
    #[must_use]
    pub fn prefixed(mut self, prefix: &str) -> Self {
        for violation in &mut self.violations {
            violation.field_path = if violation.field_path.is_empty() {
                prefix.to_string()
            } else {
                format!("{prefix}.{}", violation.field_path)
            };
        }
        self
    }

    /// `Ok(value)` when nothing was recorded, `Err(self)` otherwise.
    ///
    /// # Errors
    /// Returns `self` when at least one violation was recorded.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

fn reported(field: &FieldSpec, value: &Value) -> Value {
    if field.is_secret() && !value.is_null() {
        Value::from(SECRET_MASK)
    } else {
        value.clone()
    }
}

#[allow(clippy::cast_precision_loss)]
fn check_constraints(field: &FieldSpec, value: &Value, errors: &mut ValidationError) {
    for constraint in field.constraints {
        let violation = match *constraint {
            Constraint::MinLength(min) => value
                .as_str()
                .filter(|s| s.chars().count() < min)
                .map(|_| {
                    (
                        ViolationKind::MinLength,
                        format!("must be at least {min} character(s) long"),
                    )
                }),
            Constraint::MaxLength(max) => value
                .as_str()
                .filter(|s| s.chars().count() > max)
                .map(|_| {
                    (
                        ViolationKind::MaxLength,
                        format!("must be at most {max} character(s) long"),
                    )
                }),
            Constraint::Minimum(min) => value
                .as_f64()
                .filter(|n| *n < min as f64)
                .map(|_| (ViolationKind::Minimum, format!("must be >= {min}"))),
            Constraint::Maximum(max) => value
                .as_f64()
                .filter(|n| *n > max as f64)
                .map(|_| (ViolationKind::Maximum, format!("must be <= {max}"))),
            Constraint::OneOf(allowed) => value
                .as_str()
                .filter(|s| !allowed.contains(s))
                .map(|_| {
                    (
                        ViolationKind::OneOf,
                        format!("must be one of {}", allowed.join(", ")),
                    )
                }),
        };

        if let Some((kind, detail)) = violation {
            errors.push(FieldViolation::new(
                field.name,
                kind,
                reported(field, value),
                detail,
            ));
        }
    }
}

/// Validates a raw object against field declarations and rules.
///
/// On success returns the normalized object: present values kept as given,
/// absent fields filled with their declared default, fields with neither
/// left out. JSON `null` counts as absent.
///
/// # Errors
/// Returns a [`ValidationError`] listing every violation.
pub fn validate_fields(
    raw: &Value,
    fields: &[FieldSpec],
    rules: &[ModelRule],
) -> Result<Map<String, Value>, ValidationError> {
    let Some(object) = raw.as_object() else {
        return Err(ValidationError::single(FieldViolation::new(
            "",
            ViolationKind::NotAnObject,
            raw.clone(),
            "expected an object",
        )));
    };

    let mut errors = ValidationError::default();
    let mut normalized = Map::new();

    for key in object.keys() {
        if !fields.iter().any(|field| field.name == key) {
            errors.push(FieldViolation::new(
                key.as_str(),
                ViolationKind::UnknownField,
                Value::Null,
                "extra fields not permitted",
            ));
        }
    }

    for field in fields {
        match object.get(field.name).filter(|value| !value.is_null()) {
            None => {
                if field.required {
                    errors.push(FieldViolation::new(
                        field.name,
                        ViolationKind::Missing,
                        Value::Null,
                        "field required",
                    ));
                } else if let Some(default) = field.default.to_json() {
                    normalized.insert(field.name.to_string(), default);
                }
            }
            Some(value) if !field.kind.accepts(value) => {
                errors.push(FieldViolation::new(
                    field.name,
                    ViolationKind::Type,
                    reported(field, value),
                    format!("expected {}", field.kind.label()),
                ));
            }
            Some(value) => {
                check_constraints(field, value, &mut errors);
                normalized.insert(field.name.to_string(), value.clone());
            }
        }
    }

    for rule in rules {
        match rule {
            ModelRule::AtLeastOneOf(names) => {
                let present = names.iter().any(|name| {
                    object.get(*name).is_some_and(|value| !value.is_null())
                });
                if !present {
                    errors.push(FieldViolation::new(
                        names.join("|"),
                        ViolationKind::AtLeastOneOf,
                        Value::Null,
                        format!("at least one of {} is required", names.join(", ")),
                    ));
                }
            }
        }
    }

    errors.into_result(normalized)
}

/// Validates raw configuration and builds the typed record `M`.
///
/// # Errors
/// Returns every violated declaration of `M`.
pub fn validate_model<M: Model>(raw: &Value) -> Result<M, ValidationError> {
    let normalized = validate_fields(raw, M::fields(), M::rules())?;

    // The serde message may quote values, secrets included, so it is dropped.
    serde_json::from_value(Value::Object(normalized)).map_err(|_| {
        ValidationError::single(FieldViolation::new(
            "",
            ViolationKind::Type,
            Value::Null,
            format!("record does not match the declared fields of {}", M::TITLE),
        ))
    })
}

#[cfg(test)]
mod tests;
