use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::backend::WatchEvent;
use crate::constants::NOTIFICATION_HANDLER;
use crate::errors::Result;
use crate::extension::Environment;
use crate::extension::EnvironmentFactory;
use crate::extension::ExtensionContext;

struct Binding {
    event: String,
    environment: Box<dyn Environment>,
}

/// Binds inbound watch events to the extension environments configured
/// for them.
///
/// One named environment (`sync.<event>`) is built per configured event
/// name at startup. Dispatching scans the names in configuration order
/// and hands the event to the first whose `/<name>` prefixes the key;
/// the environment is cloned per invocation so handler state never leaks
/// between notifications.
pub struct ExtensionDispatcher {
    bindings: Vec<Binding>,
}

impl ExtensionDispatcher {
    /// Build environments for every configured event name. A factory
    /// failure here is fatal; watches without their handlers would
    /// silently drop notifications.
    pub async fn from_events(
        events: &[String],
        factory: &dyn EnvironmentFactory,
    ) -> Result<Self> {
        let mut bindings = Vec::with_capacity(events.len());
        for event in events {
            let environment = factory
                .create(&format!("sync.{event}"), &format!("sync://{event}"))
                .await?;
            bindings.push(Binding {
                event: event.clone(),
                environment,
            });
        }
        Ok(Self { bindings })
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Fire the `notification` handler for the first matching binding.
    /// Handler failures are logged and swallowed; notifications are
    /// fire-and-forget.
    pub async fn dispatch(&self, event: &WatchEvent) {
        for binding in &self.bindings {
            if !key_matches(&event.key, &binding.event) {
                continue;
            }
            let environment = binding.environment.clone_env();
            let mut context = ExtensionContext::new();
            context.set("action", Value::String(event.action.as_str().to_string()));
            context.set("data", Value::Object(event.data.clone()));
            context.set("key", Value::String(event.key.clone()));
            if let Err(e) = environment
                .handle_event(NOTIFICATION_HANDLER, &mut context)
                .await
            {
                warn!(key = %event.key, error = %e, "extension notification failed");
            }
            return;
        }
        debug!(key = %event.key, "no extension bound for event");
    }
}

fn key_matches(key: &str, event_name: &str) -> bool {
    key.strip_prefix('/')
        .is_some_and(|rest| rest.starts_with(event_name))
}
