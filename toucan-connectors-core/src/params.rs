//! Normalized connection parameters handed to backend drivers.
//!
//! Connectors describe the raw parameter set with `Option` values; entries
//! whose value is `None` are dropped on insertion, so a driver never sees a
//! key the user did not set (absence stays distinct from an explicit falsy
//! value such as `0` or `false`).

use crate::security::{SECRET_MASK, Secret};
use std::fmt;

/// Value of one normalized parameter.
#[derive(Clone)]
pub enum ParamValue {
    /// Host names, user names, database names
    Text(String),
    /// Ports and timeouts
    Integer(i64),
    /// Driver switches such as `as_dict`
    Flag(bool),
    /// Password, masked in `Debug`
    Secret(Secret),
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Text(value) => write!(f, "{value:?}"),
            ParamValue::Integer(value) => write!(f, "{value}"),
            ParamValue::Flag(value) => write!(f, "{value}"),
            ParamValue::Secret(_) => f.write_str(SECRET_MASK),
        }
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<&String> for ParamValue {
    fn from(value: &String) -> Self {
        ParamValue::Text(value.clone())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<u16> for ParamValue {
    fn from(value: u16) -> Self {
        ParamValue::Integer(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Integer(i64::from(value))
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Flag(value)
    }
}

impl From<Secret> for ParamValue {
    fn from(value: Secret) -> Self {
        ParamValue::Secret(value)
    }
}

impl From<&Secret> for ParamValue {
    fn from(value: &Secret) -> Self {
        ParamValue::Secret(value.clone())
    }
}

/// Ordered parameter set with unset entries removed.
///
/// # Example
///
/// ```rust
/// use toucan_connectors_core::params::ConnectionParams;
///
/// let port: Option<u16> = None;
/// let params = ConnectionParams::new()
///     .with("server", Some("db.example.com"))
///     .with("port", port)
///     .with("as_dict", Some(true));
///
/// assert_eq!(params.keys(), vec!["server", "as_dict"]);
/// ```
#[derive(Clone, Default)]
pub struct ConnectionParams {
    entries: Vec<(&'static str, ParamValue)>,
}

impl ConnectionParams {
    /// Creates an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` when `value` is set; a later value replaces an earlier one.
    #[must_use]
    pub fn with<V: Into<ParamValue>>(mut self, key: &'static str, value: Option<V>) -> Self {
        self.insert(key, value);
        self
    }

    /// In-place variant of [`ConnectionParams::with`].
    pub fn insert<V: Into<ParamValue>>(&mut self, key: &'static str, value: Option<V>) {
        let Some(value) = value else {
            return;
        };
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Value of `key`.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| value)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry is present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text value of `key`.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            ParamValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Integer value of `key`.
    pub fn integer(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            ParamValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Flag value of `key`.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            ParamValue::Flag(value) => Some(*value),
            _ => None,
        }
    }

    /// Secret value of `key`.
    pub fn secret(&self, key: &str) -> Option<&Secret> {
        match self.get(key)? {
            ParamValue::Secret(value) => Some(value),
            _ => None,
        }
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_values_are_dropped() {
        let params = ConnectionParams::new()
            .with("host", Some("localhost"))
            .with::<u16>("port", None)
            .with::<Secret>("password", None)
            .with("connect_timeout", Some(0_i64))
            .with("ssl", Some(false));

        assert_eq!(params.keys(), vec!["host", "connect_timeout", "ssl"]);
        assert!(!params.contains_key("port"));
        assert!(!params.contains_key("password"));
        assert_eq!(params.integer("connect_timeout"), Some(0));
        assert_eq!(params.flag("ssl"), Some(false));
    }

    #[test]
    fn test_later_value_replaces_earlier() {
        let mut params = ConnectionParams::new().with("database", Some("a"));
        params.insert("database", Some("b"));
        params.insert::<&str>("database", None);

        assert_eq!(params.len(), 1);
        assert_eq!(params.text("database"), Some("b"));
    }

    #[test]
    fn test_typed_accessors_do_not_coerce() {
        let params = ConnectionParams::new()
            .with("port", Some(5432_u16))
            .with("user", Some("alice"));

        assert_eq!(params.integer("port"), Some(5432));
        assert_eq!(params.text("port"), None);
        assert_eq!(params.integer("user"), None);
        assert_eq!(params.text("missing"), None);
    }

    #[test]
    fn test_secret_param_debug_is_masked() {
        let params = ConnectionParams::new()
            .with("user", Some("alice"))
            .with("password", Some(Secret::new("p4ssw0rd")));

        let debug = format!("{params:?}");
        assert!(!debug.contains("p4ssw0rd"));
        assert!(debug.contains(SECRET_MASK));
        assert!(debug.contains("alice"));
        assert_eq!(
            params.secret("password").map(Secret::expose_secret),
            Some("p4ssw0rd")
        );
    }
}
