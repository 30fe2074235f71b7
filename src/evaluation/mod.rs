use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use xxhash_rust::xxh64::xxh64;

use crate::flags::{FlagDefinition, MalformedValue};

// Caller context for evaluation
#[derive(Debug, Default, Deserialize, Clone)]
pub struct EvaluationContext {
    pub user_id: Option<String>,
    // Carried along for callers, not interpreted by any rule
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl EvaluationContext {
    /// Builds a context from flat query parameters; everything other than
    /// `user_id` becomes an attribute.
    pub fn from_params(mut params: HashMap<String, String>) -> Self {
        let user_id = params.remove("user_id").filter(|id| !id.is_empty());
        Self {
            user_id,
            attributes: params,
        }
    }

    #[cfg(test)]
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            attributes: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationReason {
    FlagNotFound,
    FlagDisabled,
    RuleMatchUserId,
    RuleMatchPercentage,
    DefaultEnabled,
}

// Flag evaluation result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub value: Value,
    pub reason: EvaluationReason,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("flag '{flag}' is misconfigured: {source}")]
    MalformedValue {
        flag: String,
        #[source]
        source: MalformedValue,
    },
}

/// Evaluate a flag definition for a caller.
///
/// Users without a `user_id` get a fresh random rollout draw on every call;
/// everyone else is bucketed deterministically by flag name and user id.
pub fn evaluate(
    definition: Option<&FlagDefinition>,
    context: &EvaluationContext,
) -> Result<EvaluationResult, EvaluationError> {
    evaluate_with_rng(definition, context, &mut rand::thread_rng())
}

pub fn evaluate_with_rng<R: Rng>(
    definition: Option<&FlagDefinition>,
    context: &EvaluationContext,
    rng: &mut R,
) -> Result<EvaluationResult, EvaluationError> {
    // Step 1: Unknown flag
    let Some(flag) = definition else {
        return Ok(EvaluationResult {
            value: Value::Null,
            reason: EvaluationReason::FlagNotFound,
        });
    };

    let value = flag
        .typed_default()
        .map_err(|source| EvaluationError::MalformedValue {
            flag: flag.name.clone(),
            source,
        })?;
    let served = |reason| Ok(EvaluationResult { value, reason });

    // Step 2: Global kill switch
    if !flag.enabled {
        return served(EvaluationReason::FlagDisabled);
    }

    let rules = &flag.targeting_rules;

    // Step 3: Explicit allow-list wins over any rollout bucket
    if let (Some(user_ids), Some(user_id)) = (&rules.user_ids, &context.user_id) {
        if user_ids.contains(user_id) {
            return served(EvaluationReason::RuleMatchUserId);
        }
    }

    // Step 4: Percentage rollout
    if let Some(percentage) = rules.percentage.filter(|p| *p > 0) {
        let bucket = match &context.user_id {
            Some(user_id) => rollout_bucket(&flag.name, user_id),
            None => rng.gen_range(0..100),
        };
        if bucket < percentage {
            return served(EvaluationReason::RuleMatchPercentage);
        }
    }

    // Step 5: Enabled, nothing excluded the caller
    served(EvaluationReason::DefaultEnabled)
}

/// Stable bucket in `0..100` for a user within one flag.
///
/// xxh64 is specified to produce the same output on every platform and
/// release, so buckets survive restarts and cache refreshes.
pub fn rollout_bucket(flag_name: &str, user_id: &str) -> i32 {
    let key = format!("{}:{}", flag_name, user_id);
    (xxh64(key.as_bytes(), 0) % 100) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{test_flag, FlagType, TargetingRules};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn rollout_flag(name: &str, percentage: i32) -> FlagDefinition {
        let mut flag = test_flag(name, FlagType::Boolean, "true");
        flag.targeting_rules.percentage = Some(percentage);
        flag
    }

    fn reason(flag: &FlagDefinition, user_id: &str) -> EvaluationReason {
        evaluate(Some(flag), &EvaluationContext::for_user(user_id))
            .unwrap()
            .reason
    }

    #[test]
    fn test_missing_flag() {
        let result = evaluate(None, &EvaluationContext::for_user("user123")).unwrap();
        assert_eq!(result.reason, EvaluationReason::FlagNotFound);
        assert_eq!(result.value, Value::Null);
    }

    #[test]
    fn test_globally_disabled_flag() {
        let mut flag = test_flag("test_flag", FlagType::Number, "7");
        flag.enabled = false;
        flag.targeting_rules = TargetingRules {
            user_ids: Some(["user123".to_string()].into()),
            percentage: Some(100),
        };

        let result = evaluate(Some(&flag), &EvaluationContext::for_user("user123")).unwrap();
        assert_eq!(result.reason, EvaluationReason::FlagDisabled);
        assert_eq!(result.value, json!(7));

        let anonymous = evaluate(Some(&flag), &EvaluationContext::default()).unwrap();
        assert_eq!(anonymous.reason, EvaluationReason::FlagDisabled);
    }

    #[test]
    fn test_user_id_rule_match() {
        let mut flag = test_flag("checkout", FlagType::Boolean, "true");
        flag.targeting_rules.user_ids = Some(["alice".to_string()].into());

        let alice = evaluate(Some(&flag), &EvaluationContext::for_user("alice")).unwrap();
        assert_eq!(alice.reason, EvaluationReason::RuleMatchUserId);
        assert_eq!(alice.value, json!(true));

        assert_eq!(reason(&flag, "bob"), EvaluationReason::DefaultEnabled);
    }

    #[test]
    fn test_user_id_rule_beats_percentage_exclusion() {
        let mut flag = rollout_flag("new_search", 1);
        let excluded = (0..1000)
            .map(|i| format!("user{}", i))
            .find(|u| rollout_bucket("new_search", u) >= 1)
            .unwrap();
        flag.targeting_rules.user_ids = Some([excluded.clone()].into());

        assert_eq!(reason(&flag, &excluded), EvaluationReason::RuleMatchUserId);
    }

    #[test]
    fn test_zero_percentage_falls_through() {
        let flag = rollout_flag("beta_ui", 0);
        for i in 0..50 {
            assert_eq!(
                reason(&flag, &format!("user{}", i)),
                EvaluationReason::DefaultEnabled
            );
        }
    }

    #[test]
    fn test_full_percentage_includes_everyone() {
        let flag = rollout_flag("beta_ui", 100);
        for i in 0..50 {
            assert_eq!(
                reason(&flag, &format!("user{}", i)),
                EvaluationReason::RuleMatchPercentage
            );
        }
    }

    #[test]
    fn test_partial_rollout_splits_population() {
        let flag = rollout_flag("gradual", 50);
        let included = (0..1000)
            .filter(|i| {
                reason(&flag, &format!("user{}", i)) == EvaluationReason::RuleMatchPercentage
            })
            .count();
        assert!(included > 400 && included < 600, "included {}", included);
    }

    #[test]
    fn test_excluded_user_still_gets_default_value() {
        let mut flag = rollout_flag("gradual", 30);
        flag.flag_type = FlagType::String;
        flag.default_value = "blue".to_string();

        for i in 0..50 {
            let context = EvaluationContext::for_user(&format!("u{}", i));
            let result = evaluate(Some(&flag), &context).unwrap();
            assert_eq!(result.value, json!("blue"));
        }
    }

    #[test]
    fn test_anonymous_rollout_uses_rng() {
        let flag = rollout_flag("gradual", 50);
        let mut rng = StdRng::seed_from_u64(7);
        let reasons: Vec<_> = (0..200)
            .map(|_| {
                evaluate_with_rng(Some(&flag), &EvaluationContext::default(), &mut rng)
                    .unwrap()
                    .reason
            })
            .collect();

        assert!(reasons.contains(&EvaluationReason::RuleMatchPercentage));
        assert!(reasons.contains(&EvaluationReason::DefaultEnabled));
    }

    #[test]
    fn test_malformed_default_is_an_error() {
        let flag = test_flag("settings", FlagType::Json, "{broken");
        let err = evaluate(Some(&flag), &EvaluationContext::default()).unwrap_err();
        let EvaluationError::MalformedValue { flag, source } = err;
        assert_eq!(flag, "settings");
        assert_eq!(source.expected, FlagType::Json);
    }

    #[test]
    fn test_context_from_params() {
        let params: HashMap<String, String> = [
            ("user_id".to_string(), "42".to_string()),
            ("country".to_string(), "US".to_string()),
        ]
        .into();
        let context = EvaluationContext::from_params(params);
        assert_eq!(context.user_id.as_deref(), Some("42"));
        assert_eq!(context.attributes.get("country").map(String::as_str), Some("US"));
        assert!(!context.attributes.contains_key("user_id"));

        let empty = EvaluationContext::from_params([("user_id".to_string(), String::new())].into());
        assert_eq!(empty.user_id, None);
    }

    #[test]
    fn test_reason_wire_names() {
        assert_eq!(
            serde_json::to_value(EvaluationReason::RuleMatchUserId).unwrap(),
            json!("RULE_MATCH_USER_ID")
        );
        assert_eq!(
            serde_json::to_value(EvaluationReason::FlagNotFound).unwrap(),
            json!("FLAG_NOT_FOUND")
        );
    }

    proptest! {
        #[test]
        fn bucket_is_sticky(user_id in "[a-zA-Z0-9]{1,40}", flag in "[a-z][a-z0-9_]{2,30}") {
            prop_assert_eq!(rollout_bucket(&flag, &user_id), rollout_bucket(&flag, &user_id));
            prop_assert!((0..100).contains(&rollout_bucket(&flag, &user_id)));
        }

        #[test]
        fn raising_percentage_never_drops_a_user(
            user_id in "[a-zA-Z0-9]{1,40}",
            p1 in 0i32..=100,
            p2 in 0i32..=100,
        ) {
            let (low, high) = if p1 <= p2 { (p1, p2) } else { (p2, p1) };
            let at_low = reason(&rollout_flag("monotonic", low), &user_id);
            let at_high = reason(&rollout_flag("monotonic", high), &user_id);
            if at_low == EvaluationReason::RuleMatchPercentage {
                prop_assert_eq!(at_high, EvaluationReason::RuleMatchPercentage);
            }
        }
    }
}
