//! Operations registered by [`super::OperationRegistry::with_builtins`].

use async_trait::async_trait;
use chronofhir_api::OperationOutcome;
use serde_json::{Value, json};

use super::handler::{OperationContext, OperationError, OperationHandler};

/// `Type/$instance-count`: number of current, non-deleted instances.
pub struct InstanceCountOperation;

#[async_trait]
impl OperationHandler for InstanceCountOperation {
    fn code(&self) -> &str {
        "instance-count"
    }

    async fn handle_type(
        &self,
        ctx: &OperationContext<'_>,
        _params: &Value,
    ) -> Result<Value, OperationError> {
        let count = ctx
            .store
            .scan_current(ctx.resource_type)
            .await?
            .iter()
            .filter(|e| !e.is_tombstone())
            .count();
        Ok(OperationOutcome::information(format!(
            "{count} {} instance(s)",
            ctx.resource_type
        ))
        .to_value())
    }
}

/// `Type/id/$versions`: every version of one instance as a `Parameters`
/// resource.
pub struct VersionsOperation;

#[async_trait]
impl OperationHandler for VersionsOperation {
    fn code(&self) -> &str {
        "versions"
    }

    async fn handle_instance(
        &self,
        ctx: &OperationContext<'_>,
        id: &str,
        _params: &Value,
    ) -> Result<Value, OperationError> {
        let versions = ctx
            .store
            .scan_all_versions(ctx.resource_type, Some(id))
            .await?;
        if versions.is_empty() {
            return Err(OperationError::NotFound(format!(
                "{}/{id}",
                ctx.resource_type
            )));
        }

        let parameter: Vec<Value> = versions
            .iter()
            .map(|entry| {
                json!({
                    "name": "version",
                    "part": [
                        {"name": "versionId", "valueString": entry.version_id().to_string()},
                        {"name": "lastUpdated", "valueInstant": entry.resource.last_updated.to_string()},
                        {"name": "deleted", "valueBoolean": entry.is_tombstone()},
                    ]
                })
            })
            .collect();

        Ok(json!({
            "resourceType": "Parameters",
            "parameter": parameter,
        }))
    }
}
