//! Fields shared by every connector and every data source.
//!
//! Concrete records embed [`ConnectorBase`] / [`DataSourceBase`] with
//! `#[serde(flatten)]` and list the matching field declarations first in
//! their field table.

use crate::schema::{Constraint, DefaultValue, FieldSpec};
use serde::Deserialize;

/// Common connector fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectorBase {
    /// Name of the saved connection, referenced by data sources
    pub name: String,
    /// Backend discriminator
    #[serde(rename = "type", default)]
    pub backend: Option<String>,
}

/// Common data-source fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DataSourceBase {
    /// Name of the resulting dataset
    pub domain: String,
    /// Name of the connector this data source runs against
    pub name: String,
    /// Backend discriminator
    #[serde(rename = "type", default)]
    pub backend: Option<String>,
    /// Whether the platform preloads the dataset
    pub load: bool,
    /// Whether the dataset is fetched on demand
    pub live_data: bool,
}

/// `name` field of a connector.
pub const fn connector_name_field() -> FieldSpec {
    FieldSpec::string("name")
        .required()
        .description("Name of the connection, referenced by its data sources")
        .constraints(&[Constraint::MinLength(1)])
}

/// `type` field restricted by `constraints`, usually a single-value
/// [`Constraint::OneOf`] holding the backend identifier.
pub const fn backend_type_field(constraints: &'static [Constraint]) -> FieldSpec {
    FieldSpec::string("type")
        .description("Backend identifier")
        .constraints(constraints)
}

/// `domain` field of a data source.
pub const fn domain_field() -> FieldSpec {
    FieldSpec::string("domain")
        .required()
        .description("Name of the resulting dataset")
        .constraints(&[Constraint::MinLength(1)])
}

/// `name` field of a data source.
pub const fn data_source_name_field() -> FieldSpec {
    FieldSpec::string("name")
        .required()
        .title("Connector name")
        .description("Name of the connector this data source runs against")
        .constraints(&[Constraint::MinLength(1)])
}

/// `load` field of a data source.
pub const fn load_field() -> FieldSpec {
    FieldSpec::boolean("load").default(DefaultValue::Bool(true))
}

/// `live_data` field of a data source.
pub const fn live_data_field() -> FieldSpec {
    FieldSpec::boolean("live_data").default(DefaultValue::Bool(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;

    #[test]
    fn test_base_field_declarations() {
        assert!(connector_name_field().required);
        assert!(domain_field().required);
        assert_eq!(data_source_name_field().display_title(), "Connector name");
        assert_eq!(load_field().default, DefaultValue::Bool(true));
        assert_eq!(live_data_field().default, DefaultValue::Bool(false));

        const TYPE: FieldSpec = backend_type_field(&[Constraint::OneOf(&["MSSQL"])]);
        assert_eq!(TYPE.kind, FieldKind::String);
        assert!(!TYPE.required);
        assert_eq!(TYPE.constraints, &[Constraint::OneOf(&["MSSQL"])]);
    }
}
