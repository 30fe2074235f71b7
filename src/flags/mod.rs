use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

// MODELS

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    Boolean,
    String,
    Number,
    Json,
}

impl FlagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagType::Boolean => "boolean",
            FlagType::String => "string",
            FlagType::Number => "number",
            FlagType::Json => "json",
        }
    }

    /// Text stored when a flag is created without a default value.
    pub fn zero_text(&self) -> &'static str {
        match self {
            FlagType::Boolean => "false",
            FlagType::String => "",
            FlagType::Number => "0",
            FlagType::Json => "null",
        }
    }

    /// Interpret stored text as a value of this type.
    pub fn parse_value(&self, raw: &str) -> Result<Value, MalformedValue> {
        let malformed = || MalformedValue {
            expected: *self,
            raw: raw.to_string(),
        };

        // Surrounding whitespace is ignored for every type except `string`.
        let trimmed = raw.trim();
        match self {
            FlagType::Boolean => {
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err(malformed())
                }
            }
            FlagType::String => Ok(Value::String(raw.to_string())),
            FlagType::Number => {
                if let Ok(int) = trimmed.parse::<i64>() {
                    return Ok(Value::from(int));
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(malformed)
            }
            FlagType::Json => serde_json::from_str(trimmed).map_err(|_| malformed()),
        }
    }
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlagType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "boolean" => Ok(FlagType::Boolean),
            "string" => Ok(FlagType::String),
            "number" => Ok(FlagType::Number),
            "json" => Ok(FlagType::Json),
            other => Err(format!(
                "Invalid flag type '{}'. Must be one of: boolean, string, number, json",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("'{raw}' is not a valid {expected} value")]
pub struct MalformedValue {
    pub expected: FlagType,
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetingRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<HashSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub default_value: String,
    pub enabled: bool,
    #[serde(default)]
    pub targeting_rules: TargetingRules,
}

impl FlagDefinition {
    pub fn typed_default(&self) -> Result<Value, MalformedValue> {
        self.flag_type.parse_value(&self.default_value)
    }

    /// Checks every invariant a definition must hold before it is persisted.
    pub fn validate(&self) -> Result<(), String> {
        validate_flag_name(&self.name)?;
        if let Some(percentage) = self.targeting_rules.percentage {
            validate_rollout_percentage(percentage)?;
        }
        self.typed_default().map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Partial update: every `Some` field overrides, every `None` field is retained.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlagPatch {
    #[serde(rename = "type")]
    pub flag_type: Option<FlagType>,
    pub default_value: Option<String>,
    pub enabled: Option<bool>,
    pub targeting_rules: Option<TargetingRules>,
}

impl FlagPatch {
    pub fn is_empty(&self) -> bool {
        self.flag_type.is_none()
            && self.default_value.is_none()
            && self.enabled.is_none()
            && self.targeting_rules.is_none()
    }

    pub fn apply_to(self, mut flag: FlagDefinition) -> FlagDefinition {
        if let Some(flag_type) = self.flag_type {
            flag.flag_type = flag_type;
        }
        if let Some(default_value) = self.default_value {
            flag.default_value = default_value;
        }
        if let Some(enabled) = self.enabled {
            flag.enabled = enabled;
        }
        if let Some(rules) = self.targeting_rules {
            flag.targeting_rules = rules;
        }
        flag
    }
}

// HELPER FUNCTIONS

pub fn validate_flag_name(name: &str) -> Result<(), String> {
    let Some(first) = name.chars().next() else {
        return Err("Flag name cannot be empty".to_string());
    };

    if name.len() > 64 {
        return Err("Flag name is too long (Max: 64 characters)".to_string());
    }

    if !first.is_ascii_alphabetic() {
        return Err("Flag name must start with a letter".to_string());
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(
            "Flag name can only contain lowercase letters, numbers, underscores and hyphens"
                .to_string(),
        );
    }

    Ok(())
}

// Checks if percentage number is between 0 and 100 inclusive
pub fn validate_rollout_percentage(percentage: i32) -> Result<(), String> {
    if !(0..=100).contains(&percentage) {
        return Err("Rollout percentage must be between 0 and 100".to_string());
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn test_flag(name: &str, flag_type: FlagType, default_value: &str) -> FlagDefinition {
    FlagDefinition {
        name: name.to_string(),
        flag_type,
        default_value: default_value.to_string(),
        enabled: true,
        targeting_rules: TargetingRules::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_flag_name() {
        assert!(validate_flag_name("new_checkout-flow2").is_ok());
        assert!(validate_flag_name("").is_err());
        assert!(validate_flag_name("2fast").is_err());
        assert!(validate_flag_name("Upper").is_err());
        assert!(validate_flag_name("has space").is_err());
        assert!(validate_flag_name(&"a".repeat(65)).is_err());
        assert!(validate_flag_name(&"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_validate_rollout_percentage() {
        assert!(validate_rollout_percentage(0).is_ok());
        assert!(validate_rollout_percentage(100).is_ok());
        assert!(validate_rollout_percentage(-1).is_err());
        assert!(validate_rollout_percentage(101).is_err());
    }

    #[test]
    fn test_parse_boolean_is_case_insensitive() {
        assert_eq!(FlagType::Boolean.parse_value("TRUE").unwrap(), json!(true));
        assert_eq!(FlagType::Boolean.parse_value("False").unwrap(), json!(false));
        assert!(FlagType::Boolean.parse_value("1").is_err());
        assert!(FlagType::Boolean.parse_value("yes").is_err());
    }

    #[test]
    fn test_parse_number_prefers_integers() {
        assert_eq!(FlagType::Number.parse_value("42").unwrap(), json!(42));
        assert_eq!(FlagType::Number.parse_value("-7").unwrap(), json!(-7));
        assert_eq!(FlagType::Number.parse_value("2.5").unwrap(), json!(2.5));
        assert!(FlagType::Number.parse_value("NaN").is_err());
        assert!(FlagType::Number.parse_value("ten").is_err());
    }

    #[test]
    fn test_parse_json_fails_closed() {
        assert_eq!(
            FlagType::Json.parse_value(r#"{"color":"blue","size":3}"#).unwrap(),
            json!({"color": "blue", "size": 3})
        );
        let err = FlagType::Json.parse_value("{not json").unwrap_err();
        assert_eq!(err.expected, FlagType::Json);
    }

    #[test]
    fn test_parse_ignores_surrounding_whitespace_except_strings() {
        assert_eq!(FlagType::Boolean.parse_value(" true\n").unwrap(), json!(true));
        assert_eq!(FlagType::Number.parse_value(" 42 ").unwrap(), json!(42));
        assert_eq!(FlagType::Json.parse_value("\t[1, 2] ").unwrap(), json!([1, 2]));
        assert_eq!(FlagType::String.parse_value(" blue ").unwrap(), json!(" blue "));
        assert!(FlagType::Boolean.parse_value("tr ue").is_err());
    }

    #[test]
    fn test_zero_text_parses_as_its_type() {
        for t in [FlagType::Boolean, FlagType::String, FlagType::Number, FlagType::Json] {
            assert!(t.parse_value(t.zero_text()).is_ok(), "{} zero text", t);
        }
    }

    #[test]
    fn test_flag_type_from_str() {
        assert_eq!("json".parse::<FlagType>().unwrap(), FlagType::Json);
        assert!("float".parse::<FlagType>().is_err());
    }

    #[test]
    fn test_patch_retains_unspecified_fields() {
        let mut flag = test_flag("checkout", FlagType::Boolean, "true");
        flag.targeting_rules.percentage = Some(20);

        let patch = FlagPatch {
            enabled: Some(false),
            ..Default::default()
        };
        let patched = patch.apply_to(flag.clone());

        assert!(!patched.enabled);
        assert_eq!(patched.default_value, "true");
        assert_eq!(patched.targeting_rules.percentage, Some(20));
        assert_eq!(patched.flag_type, FlagType::Boolean);
    }

    #[test]
    fn test_empty_patch() {
        assert!(FlagPatch::default().is_empty());
        let patch: FlagPatch = serde_json::from_value(json!({"default_value": "x"})).unwrap();
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_validate_rejects_unparseable_default() {
        let flag = test_flag("limits", FlagType::Number, "lots");
        assert!(flag.validate().is_err());

        let mut flag = test_flag("limits", FlagType::Number, "10");
        flag.targeting_rules.percentage = Some(150);
        assert!(flag.validate().is_err());
    }

    #[test]
    fn test_definition_wire_format() {
        let flag: FlagDefinition = serde_json::from_value(json!({
            "name": "checkout",
            "type": "boolean",
            "default_value": "true",
            "enabled": true,
            "targeting_rules": {"user_ids": ["alice"]}
        }))
        .unwrap();

        assert_eq!(flag.flag_type, FlagType::Boolean);
        assert!(flag.targeting_rules.user_ids.unwrap().contains("alice"));
        assert_eq!(flag.targeting_rules.percentage, None);
    }
}
