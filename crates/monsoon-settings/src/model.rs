//! Setting values and change notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored setting value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingValue {
    /// Free-form string.
    Text(String),
    /// Signed integer.
    Integer(i64),
    /// Boolean flag.
    Boolean(bool),
    /// Ordered list of strings.
    TextList(Vec<String>),
}

impl SettingValue {
    /// Machine-readable name of the value's type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::TextList(_) => "text_list",
        }
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Vec<String>> for SettingValue {
    fn from(value: Vec<String>) -> Self {
        Self::TextList(value)
    }
}

/// Rust types that a [`SettingValue`] can be read back as.
pub trait SettingType: Sized {
    /// Kind name reported when the stored value has a different type.
    const KIND: &'static str;

    /// Extract `Self`, handing the value back when its type differs.
    ///
    /// # Errors
    ///
    /// Returns the original value if it holds a different type.
    fn from_setting(value: SettingValue) -> Result<Self, SettingValue>;
}

impl SettingType for String {
    const KIND: &'static str = "text";

    fn from_setting(value: SettingValue) -> Result<Self, SettingValue> {
        match value {
            SettingValue::Text(text) => Ok(text),
            other => Err(other),
        }
    }
}

impl SettingType for i64 {
    const KIND: &'static str = "integer";

    fn from_setting(value: SettingValue) -> Result<Self, SettingValue> {
        match value {
            SettingValue::Integer(number) => Ok(number),
            other => Err(other),
        }
    }
}

impl SettingType for bool {
    const KIND: &'static str = "boolean";

    fn from_setting(value: SettingValue) -> Result<Self, SettingValue> {
        match value {
            SettingValue::Boolean(flag) => Ok(flag),
            other => Err(other),
        }
    }
}

impl SettingType for Vec<String> {
    const KIND: &'static str = "text_list";

    fn from_setting(value: SettingValue) -> Result<Self, SettingValue> {
        match value {
            SettingValue::TextList(items) => Ok(items),
            other => Err(other),
        }
    }
}

/// Notification delivered to listeners after a setting is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingChange {
    /// Key relative to the store prefix.
    pub key: String,
    /// Key including the store prefix.
    pub absolute_key: String,
    /// Newly stored value.
    pub value: SettingValue,
    /// When the store accepted the value.
    pub changed_at: DateTime<Utc>,
}

/// Handle returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_serialize_with_type_tag() {
        let json = serde_json::to_value(SettingValue::from(42_i64)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "integer", "value": 42 }));
        let list: SettingValue =
            serde_json::from_value(serde_json::json!({ "type": "text_list", "value": ["a"] }))
                .unwrap();
        assert_eq!(list, SettingValue::TextList(vec!["a".into()]));
    }

    #[test]
    fn typed_extraction_hands_back_mismatches() {
        assert_eq!(bool::from_setting(SettingValue::Boolean(true)), Ok(true));
        let err = i64::from_setting(SettingValue::from("ten")).unwrap_err();
        assert_eq!(err.kind(), "text");
        assert_eq!(String::KIND, SettingValue::from("x").kind());
        assert_eq!(<Vec<String>>::KIND, SettingValue::TextList(Vec::new()).kind());
    }
}
