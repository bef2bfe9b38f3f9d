use serde_json::Value;
use tracing::debug;
use tracing::info;

use crate::backend::WatchEvent;
use crate::constants::MONITORING_PREFIX;
use crate::constants::MONITORING_UPDATE_OPERATION;
use crate::constants::POST_MONITORING_UPDATE_HOOK;
use crate::constants::PRE_MONITORING_UPDATE_HOOK;
use crate::db::Transaction;
use crate::errors::ReconcileError;
use crate::errors::Result;
use crate::extension::ExtensionContext;
use crate::schema::Schema;

use super::numeric_version;
use super::schema_path;
use super::ReconcilerDependencies;

/// Apply a monitoring report to the resource's state record.
///
/// Monitoring is meaningless until state has converged, so on top of the
/// state-update filters this requires `config_version == state_version`
/// and a report version equal to both. Anything else is skipped.
pub async fn monitoring_update(deps: &ReconcilerDependencies, event: &WatchEvent) -> Result<()> {
    let path = schema_path(&event.key, MONITORING_PREFIX);
    let Some(schema) = deps.schemas.schema_by_url_path(&path) else {
        debug!(key = %event.key, "monitoring update on unexpected path");
        return Ok(());
    };
    if !schema.state_versioning() {
        debug!(
            schema_id = schema.id(),
            "monitoring update on non-versioned schema"
        );
        return Ok(());
    }
    let Some(resource_id) = schema.resource_id_from_path(&path) else {
        debug!(key = %event.key, "monitoring update key does not name a resource");
        return Ok(());
    };
    info!(action = ?event.action, key = %event.key, "started monitoring update");

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
    tx.set_isolation_level(schema.isolation_level(MONITORING_UPDATE_OPERATION))
        .await?;
    let resource = tx.fetch(schema.id(), resource_id).await?;
    let mut state = tx.state_fetch(schema.id(), resource_id).await?;

    if state.config_version != state.state_version {
        debug!(
            key = %event.key,
            config_version = state.config_version,
            state_version = state.state_version,
            "skipping monitoring update until state converges"
        );
        return Ok(());
    }
    let reported = numeric_version(&event.data).ok_or_else(|| ReconcileError::MissingVersion {
        key: event.key.clone(),
    })?;
    if state.config_version != reported {
        debug!(
            key = %event.key,
            reported,
            config_version = state.config_version,
            "ignoring monitoring report for a different version"
        );
        return Ok(());
    }
    let monitoring = event
        .data
        .get("monitoring")
        .and_then(Value::as_str)
        .ok_or_else(|| ReconcileError::MissingMonitoring {
            key: event.key.clone(),
        })?;
    state.monitoring = monitoring.to_string();

    let environment = deps.environments.environment(schema.id());
    let mut context = ExtensionContext::with_transaction(tx);
    if let Some(env) = &environment {
        context.set("resource", Value::Object(resource.data().clone()));
        context.set("schema", Value::String(schema.id().to_string()));
        context.set("monitoring", Value::String(state.monitoring.clone()));
        env.handle_event(PRE_MONITORING_UPDATE_HOOK, &mut context)
            .await?;
    }

    tx.state_update(&resource, &state).await?;

    if let Some(env) = &environment {
        env.handle_event(POST_MONITORING_UPDATE_HOOK, &mut context)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}
