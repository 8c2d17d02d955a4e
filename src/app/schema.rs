use crate::domain::model::ValidationIssue;
use crate::utils::error::{DispatchError, Result};
use jsonschema::Validator;
use serde_json::Value;

/// 編譯一次、重複使用的輸入 schema
pub struct SchemaValidator {
    validator: Validator,
}

impl std::fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}

impl SchemaValidator {
    pub fn new(schema: &Value) -> Result<Self> {
        let validator =
            jsonschema::validator_for(schema).map_err(|e| DispatchError::ConfigValidationError {
                field: "schema".to_string(),
                message: format!("Invalid input schema: {}", e),
            })?;
        Ok(Self { validator })
    }

    /// 收集所有違規項目，而不是遇到第一個就停止
    pub fn validate(&self, instance: &Value) -> Result<()> {
        let details: Vec<ValidationIssue> = self
            .validator
            .iter_errors(instance)
            .map(|error| {
                let path = error.instance_path.to_string();
                ValidationIssue {
                    path: if path.is_empty() { "/".to_string() } else { path },
                    message: error.to_string(),
                }
            })
            .collect();

        if details.is_empty() {
            return Ok(());
        }

        Err(DispatchError::ValidationError {
            message: "Input failed schema validation".to_string(),
            details,
        })
    }
}
