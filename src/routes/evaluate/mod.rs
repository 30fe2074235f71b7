pub mod routes;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::evaluation::{EvaluationContext, EvaluationReason, EvaluationResult};

#[derive(Debug, Serialize)]
pub struct EvaluateFlagResponse {
    pub flag_name: String,
    pub value: Value,
    pub reason: EvaluationReason,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub context: EvaluationContext,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub flags: HashMap<String, EvaluationResult>,
    // Misconfigured flags are reported here instead of failing the whole batch
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub errors: HashMap<String, String>,
}
