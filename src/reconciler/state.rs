use serde_json::Value;
use tracing::debug;
use tracing::info;

use crate::backend::WatchEvent;
use crate::constants::POST_STATE_UPDATE_HOOK;
use crate::constants::PRE_STATE_UPDATE_HOOK;
use crate::constants::STATE_PREFIX;
use crate::constants::STATE_UPDATE_OPERATION;
use crate::db::Transaction;
use crate::errors::ReconcileError;
use crate::errors::Result;
use crate::extension::ExtensionContext;
use crate::schema::Schema;

use super::numeric_version;
use super::schema_path;
use super::ReconcilerDependencies;

/// Apply a state report to the resource's state record.
///
/// Reports for unknown or non-versioned schemas are ignored. Version
/// gates: an already-converged resource (`state_version == config_version`)
/// and reports older than the recorded `state_version` are no-ops. The
/// schema's `pre_/post_state_update_in_transaction` hooks run inside the
/// same transaction; a hook failure aborts it.
pub async fn state_update(deps: &ReconcilerDependencies, event: &WatchEvent) -> Result<()> {
    let path = schema_path(&event.key, STATE_PREFIX);
    let Some(schema) = deps.schemas.schema_by_url_path(&path) else {
        debug!(key = %event.key, "state update on unexpected path");
        return Ok(());
    };
    if !schema.state_versioning() {
        debug!(schema_id = schema.id(), "state update on non-versioned schema");
        return Ok(());
    }
    let Some(resource_id) = schema.resource_id_from_path(&path) else {
        debug!(key = %event.key, "state update key does not name a resource");
        return Ok(());
    };
    info!(action = ?event.action, key = %event.key, "started state update");

    let tx = deps.db.begin().await?;
    let result = apply(deps, &schema, resource_id, event, tx.as_ref()).await;
    tx.close().await;
    result
}

async fn apply(
    deps: &ReconcilerDependencies,
    schema: &Schema,
    resource_id: &str,
    event: &WatchEvent,
    tx: &dyn Transaction,
) -> Result<()> {
    tx.set_isolation_level(schema.isolation_level(STATE_UPDATE_OPERATION))
        .await?;
    let resource = tx.fetch(schema.id(), resource_id).await?;
    let mut state = tx.state_fetch(schema.id(), resource_id).await?;

    if state.state_version == state.config_version {
        // Already caught up; the report is redundant.
        return Ok(());
    }
    let reported = numeric_version(&event.data).ok_or_else(|| ReconcileError::MissingVersion {
        key: event.key.clone(),
    })?;
    let old_state_version = state.state_version;
    state.state_version = reported;
    if state.state_version < old_state_version {
        debug!(
            key = %event.key,
            reported,
            recorded = old_state_version,
            "ignoring out-of-order state report"
        );
        return Ok(());
    }
    if let Some(error) = event.data.get("error").and_then(Value::as_str) {
        state.error = error.to_string();
    }
    if let Some(new_state) = event.data.get("state").and_then(Value::as_str) {
        state.state = new_state.to_string();
    }

    let environment = deps.environments.environment(schema.id());
    let mut context = ExtensionContext::with_transaction(tx);
    if let Some(env) = &environment {
        let authorization = deps.identity.service_authorization().await?;
        context.set("catalog", authorization.catalog);
        context.set("auth_token", Value::String(authorization.auth_token));
        context.set("resource", Value::Object(resource.data().clone()));
        context.set("schema", Value::String(schema.id().to_string()));
        context.set("state", Value::Object(event.data.clone()));
        context.set("config_version", Value::from(state.config_version));
        env.handle_event(PRE_STATE_UPDATE_HOOK, &mut context).await?;
    }

    tx.state_update(&resource, &state).await?;

    if let Some(env) = &environment {
        env.handle_event(POST_STATE_UPDATE_HOOK, &mut context).await?;
    }

    tx.commit().await?;
    Ok(())
}
