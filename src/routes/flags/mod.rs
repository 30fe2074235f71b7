pub mod routes;

use serde::Deserialize;

use crate::admin::NewFlag;
use crate::flags::{FlagType, TargetingRules};

// MODELS

#[derive(Debug, Deserialize)]
pub struct CreateFlagRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub default_value: Option<String>,
    pub enabled: Option<bool>,
    pub targeting_rules: Option<TargetingRules>,
}

impl From<CreateFlagRequest> for NewFlag {
    fn from(req: CreateFlagRequest) -> Self {
        NewFlag {
            name: req.name,
            flag_type: req.flag_type,
            default_value: req.default_value,
            enabled: req.enabled.unwrap_or(false),
            targeting_rules: req.targeting_rules.unwrap_or_default(),
        }
    }
}

// Partial updates deserialize straight into the patch type
pub use crate::flags::FlagPatch as UpdateFlagRequest;
