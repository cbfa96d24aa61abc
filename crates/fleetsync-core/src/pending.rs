// ── Pending-command registry ──
//
// Correlates fire-and-forget command frames with the `command_response`
// events that answer them. Every registration gets a fresh UUID; the
// registry entry owns the only resolver, so whoever removes it first
// (response, timeout, disconnect) decides the outcome exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use fleetsync_api::CommandResponse;

use crate::error::CommandError;

type Outcome = Result<Value, CommandError>;

struct Entry {
    entity_id: String,
    command_type: String,
    created_at: Instant,
    tx: oneshot::Sender<Outcome>,
}

impl Entry {
    fn complete(self, command_id: Uuid, outcome: Outcome) {
        trace!(
            %command_id,
            entity_id = %self.entity_id,
            elapsed = ?self.created_at.elapsed(),
            ok = outcome.is_ok(),
            "pending command settled"
        );
        // The waiter may already be gone; nothing to do then.
        let _ = self.tx.send(outcome);
    }
}

/// Outstanding commands awaiting a response.
#[derive(Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl PendingRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new outstanding command and return its waiter.
    pub fn register(
        self: &Arc<Self>,
        entity_id: impl Into<String>,
        command_type: impl Into<String>,
    ) -> PendingCommand {
        let command_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.lock().insert(
            command_id,
            Entry {
                entity_id: entity_id.into(),
                command_type: command_type.into(),
                created_at: Instant::now(),
                tx,
            },
        );

        PendingCommand {
            command_id,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Settle the waiter a response belongs to. Returns `false` when nothing
    /// matched (late, unknown, or ambiguous responses).
    pub fn resolve(&self, response: &CommandResponse) -> bool {
        let mut entries = self.lock();

        let key = match (&response.command_id, response.command_uuid()) {
            (_, Some(id)) => entries.contains_key(&id).then_some(id),
            (Some(raw), None) => {
                debug!(command_id = %raw, "response carries an unrecognised command id");
                None
            }
            (None, None) => Self::match_by_pair(&entries, response),
        };

        let Some(key) = key else {
            debug!(
                command_id = ?response.command_id,
                entity_id = ?response.entity_id,
                command_type = ?response.command_type,
                "late or unmatched command response ignored"
            );
            return false;
        };

        let Some(entry) = entries.remove(&key) else {
            return false;
        };
        drop(entries);

        let outcome = response
            .clone()
            .into_outcome()
            .map_err(|reason| CommandError::RemoteRejected { reason });
        entry.complete(key, outcome);
        true
    }

    /// Fail every outstanding command with `TransportUnavailable`.
    /// Returns how many were rejected.
    pub fn reject_all(&self, reason: &str) -> usize {
        let drained: Vec<(Uuid, Entry)> = self.lock().drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            entry.complete(id, Err(CommandError::unavailable(reason)));
        }
        if count > 0 {
            debug!(count, reason, "rejected pending commands");
        }
        count
    }

    /// Drop one outstanding command without settling it. Its waiter observes
    /// `TransportUnavailable`.
    pub fn cancel(&self, command_id: Uuid) -> bool {
        self.remove(command_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn remove(&self, command_id: Uuid) -> bool {
        self.lock().remove(&command_id).is_some()
    }

    fn match_by_pair(entries: &HashMap<Uuid, Entry>, response: &CommandResponse) -> Option<Uuid> {
        let (Some(entity_id), Some(command_type)) = (&response.entity_id, &response.command_type)
        else {
            return None;
        };

        let mut candidates = entries
            .iter()
            .filter(|(_, e)| &e.entity_id == entity_id && &e.command_type == command_type)
            .map(|(id, _)| *id);

        let first = candidates.next()?;
        if candidates.next().is_some() {
            warn!(
                %entity_id,
                %command_type,
                "ambiguous command response without command_id ignored"
            );
            return None;
        }
        Some(first)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PendingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRegistry")
            .field("outstanding", &self.len())
            .finish()
    }
}

// ── PendingCommand ───────────────────────────────────────────────────

/// Waiter for one registered command.
///
/// Dropping it without waiting removes the registry entry.
#[derive(Debug)]
pub struct PendingCommand {
    command_id: Uuid,
    rx: oneshot::Receiver<Outcome>,
    registry: Arc<PendingRegistry>,
}

impl PendingCommand {
    pub fn command_id(&self) -> Uuid {
        self.command_id
    }

    /// Wait for the response, at most `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<Value, CommandError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(CommandError::unavailable("command cancelled")),
            Err(_) => {
                if self.registry.remove(self.command_id) {
                    debug!(command_id = %self.command_id, "command timed out");
                    return Err(CommandError::timeout(timeout));
                }
                // Settled between the deadline and removal.
                match self.rx.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(CommandError::timeout(timeout)),
                }
            }
        }
    }
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        self.registry.remove(self.command_id);
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(value: Value) -> CommandResponse {
        CommandResponse::from_value(&value).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_by_command_id() {
        let registry = PendingRegistry::new();
        let pending = registry.register("r1", "move");
        let id = pending.command_id();

        assert!(registry.resolve(&response(json!({
            "command_id": id.to_string(),
            "result": { "accepted": true }
        }))));

        let value = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(value, json!({ "accepted": true }));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failure_becomes_rejection() {
        let registry = PendingRegistry::new();
        let pending = registry.register("r1", "move");
        registry.resolve(&response(json!({
            "command_id": pending.command_id().to_string(),
            "success": false,
            "error": "obstacle detected"
        })));

        let err = pending.wait(Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(
            err,
            CommandError::RemoteRejected {
                reason: "obstacle detected".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_entry_and_late_response_is_ignored() {
        let registry = PendingRegistry::new();
        let pending = registry.register("r1", "rotate");
        let id = pending.command_id();

        let err = pending.wait(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err, CommandError::Timeout { timeout_ms: 50 });
        assert!(registry.is_empty());

        assert!(!registry.resolve(&response(json!({ "command_id": id.to_string() }))));
    }

    #[test]
    fn second_resolution_is_a_no_op() {
        let registry = PendingRegistry::new();
        let pending = registry.register("r1", "stop");
        let frame = response(json!({ "command_id": pending.command_id().to_string() }));

        assert!(registry.resolve(&frame));
        assert!(!registry.resolve(&frame));
    }

    #[tokio::test(start_paused = true)]
    async fn pair_fallback_requires_a_unique_match() {
        let registry = PendingRegistry::new();
        let only = registry.register("r1", "stop");
        let _other_entity = registry.register("r2", "stop");

        assert!(registry.resolve(&response(json!({
            "robot_id": "r1",
            "command_type": "stop"
        }))));
        assert!(only.wait(Duration::from_secs(1)).await.is_ok());

        let _a = registry.register("r3", "move");
        let _b = registry.register("r3", "move");
        assert!(!registry.resolve(&response(json!({
            "entity_id": "r3",
            "command_type": "move"
        }))));
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reject_all_fails_waiters() {
        let registry = PendingRegistry::new();
        let a = registry.register("r1", "move");
        let b = registry.register("r2", "move");

        assert_eq!(registry.reject_all("channel closed"), 2);

        for pending in [a, b] {
            let err = pending.wait(Duration::from_secs(5)).await.unwrap_err();
            assert_eq!(
                err,
                CommandError::TransportUnavailable {
                    reason: "channel closed".into()
                }
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_drop_clear_entries() {
        let registry = PendingRegistry::new();
        let a = registry.register("r1", "move");
        assert!(registry.cancel(a.command_id()));
        assert!(matches!(
            a.wait(Duration::from_secs(1)).await,
            Err(CommandError::TransportUnavailable { .. })
        ));

        let b = registry.register("r1", "move");
        drop(b);
        assert!(registry.is_empty());
    }
}
