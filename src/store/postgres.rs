use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{error, instrument};

use super::{FlagStore, Result};
use crate::flags::{FlagDefinition, TargetingRules};

// Postgres SQLSTATE for a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, sqlx::FromRow)]
struct FlagRow {
    name: String,
    #[sqlx(rename = "type")]
    flag_type: String,
    default_value: String,
    enabled: bool,
    // Decoded loosely so one malformed rules document only costs its own row.
    targeting_rules: Option<Json<Value>>,
}

impl FlagRow {
    fn into_definition(self) -> std::result::Result<FlagDefinition, String> {
        let targeting_rules = match self.targeting_rules {
            Some(Json(Value::Null)) | None => TargetingRules::default(),
            Some(Json(raw)) => serde_json::from_value(raw)
                .map_err(|e| format!("invalid targeting rules: {}", e))?,
        };

        Ok(FlagDefinition {
            flag_type: self.flag_type.parse()?,
            name: self.name,
            default_value: self.default_value,
            enabled: self.enabled,
            targeting_rules,
        })
    }
}

/// Flag store backed by the `feature_flags` table.
pub struct PgFlagStore {
    db: PgPool,
}

impl PgFlagStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FlagStore for PgFlagStore {
    #[instrument(skip(self))]
    async fn load_all(&self) -> Result<HashMap<String, FlagDefinition>> {
        let rows = sqlx::query_as::<_, FlagRow>(
            r#"
            SELECT name, type, default_value, enabled, targeting_rules
            FROM feature_flags
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut flags = HashMap::with_capacity(rows.len());
        for row in rows {
            let name = row.name.clone();
            // A single corrupt row must not take every other flag down with it.
            match row.into_definition() {
                Ok(flag) => {
                    flags.insert(name, flag);
                }
                Err(e) => error!(flag = %name, "Skipping unreadable flag row: {}", e),
            }
        }

        Ok(flags)
    }

    #[instrument(skip(self))]
    async fn get(&self, name: &str) -> Result<Option<FlagDefinition>> {
        let row = sqlx::query_as::<_, FlagRow>(
            r#"
            SELECT name, type, default_value, enabled, targeting_rules
            FROM feature_flags
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.and_then(|r| {
            r.into_definition()
                .map_err(|e| error!(flag = %name, "Unreadable flag row: {}", e))
                .ok()
        }))
    }

    #[instrument(skip(self, flag), fields(flag = %flag.name))]
    async fn insert(&self, flag: &FlagDefinition) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO feature_flags (name, type, default_value, enabled, targeting_rules)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&flag.name)
        .bind(flag.flag_type.as_str())
        .bind(&flag.default_value)
        .bind(flag.enabled)
        .bind(Json(&flag.targeting_rules))
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, flag), fields(flag = %flag.name))]
    async fn upsert(&self, flag: &FlagDefinition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feature_flags (name, type, default_value, enabled, targeting_rules)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE
            SET
                type = EXCLUDED.type,
                default_value = EXCLUDED.default_value,
                enabled = EXCLUDED.enabled,
                targeting_rules = EXCLUDED.targeting_rules,
                updated_at = NOW()
            "#,
        )
        .bind(&flag.name)
        .bind(flag.flag_type.as_str())
        .bind(&flag.default_value)
        .bind(flag.enabled)
        .bind(Json(&flag.targeting_rules))
        .execute(&self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feature_flags WHERE name = $1")
            .bind(name)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db_error| db_error.code().as_deref() == Some(UNIQUE_VIOLATION))
}
