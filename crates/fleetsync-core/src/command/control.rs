// ── Control façade ──
//
// Typed operations for one entity. Each call builds a `CommandRequest`;
// with the channel open it is correlated through the pending registry and
// awaited, otherwise it goes to the REST fallback. Both paths return the
// same `Result<Value, CommandError>`.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use fleetsync_api::{CommandRequest, OutboundMessage, Priority, RestClient};

use super::{Command, Direction, STATUS_COMMAND};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::CommandError;
use crate::pending::PendingCommand;

/// Control handle bound to a single entity id.
#[derive(Debug, Clone)]
pub struct EntityControl {
    manager: ConnectionManager,
    fallback: Option<RestClient>,
    entity_id: String,
}

impl EntityControl {
    pub fn new(
        manager: ConnectionManager,
        fallback: Option<RestClient>,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            fallback,
            entity_id: entity_id.into(),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    // ── Typed operations ─────────────────────────────────────────────

    pub async fn move_to(
        &self,
        direction: Direction,
        speed: f64,
        duration_ms: u64,
    ) -> Result<Value, CommandError> {
        self.execute(Command::Move {
            direction,
            speed,
            duration_ms,
        })
        .await
    }

    pub async fn rotate(&self, angle: f64, speed: f64) -> Result<Value, CommandError> {
        self.execute(Command::Rotate { angle, speed }).await
    }

    pub async fn stop(&self) -> Result<Value, CommandError> {
        self.execute(Command::Stop).await
    }

    pub async fn set_mode(&self, mode: impl Into<String>) -> Result<Value, CommandError> {
        self.execute(Command::SetMode { mode: mode.into() }).await
    }

    /// Critical-priority stop with the short emergency timeout.
    pub async fn emergency_stop(&self) -> Result<Value, CommandError> {
        self.execute(Command::EmergencyStop).await
    }

    /// Current status object of the entity.
    pub async fn status(&self) -> Result<Value, CommandError> {
        self.execute(Command::GetStatus).await
    }

    /// Arbitrary command. `timeout` defaults to the configured command
    /// timeout.
    pub async fn send_command(
        &self,
        command_type: impl Into<String>,
        params: Value,
        priority: Priority,
        timeout: Option<Duration>,
    ) -> Result<Value, CommandError> {
        let timeout = timeout.unwrap_or(self.manager.config().command_timeout);
        self.dispatch(command_type.into(), params, priority, timeout)
            .await
    }

    /// Run a typed [`Command`] with its default priority and timeout.
    pub async fn execute(&self, command: Command) -> Result<Value, CommandError> {
        let config = self.manager.config();
        let timeout = if command.is_safety_critical() {
            config.emergency_stop_timeout
        } else {
            config.command_timeout
        };
        self.dispatch(
            command.command_type().to_owned(),
            command.params(),
            command.priority(),
            timeout,
        )
        .await
    }

    // ── Routing ──────────────────────────────────────────────────────

    #[instrument(skip(self, params), fields(entity_id = %self.entity_id))]
    async fn dispatch(
        &self,
        command_type: String,
        params: Value,
        priority: Priority,
        timeout: Duration,
    ) -> Result<Value, CommandError> {
        let pending = (self.manager.state() == ConnectionState::Open)
            .then(|| self.manager.pending().register(&*self.entity_id, &*command_type));
        let command_id = pending
            .as_ref()
            .map_or_else(Uuid::new_v4, PendingCommand::command_id);

        let request = CommandRequest {
            command_id,
            entity_id: self.entity_id.clone(),
            command_type,
            params,
            priority,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };

        if let Some(pending) = pending {
            let msg = OutboundMessage::command(&request).map_err(|e| {
                CommandError::unavailable(format!("cannot encode command: {e}"))
            })?;
            if self.manager.try_send(msg).is_ok() {
                debug!(%command_id, "command sent over channel");
                return pending.wait(timeout).await;
            }
            debug!(%command_id, "channel closed before the command was written");
        }

        self.submit_fallback(&request, timeout).await
    }

    async fn submit_fallback(
        &self,
        request: &CommandRequest,
        timeout: Duration,
    ) -> Result<Value, CommandError> {
        let Some(rest) = &self.fallback else {
            return Err(CommandError::unavailable(format!(
                "channel is {} and no REST fallback is configured",
                self.manager.state()
            )));
        };

        debug!(command_id = %request.command_id, "submitting over REST fallback");
        let result = if request.command_type == STATUS_COMMAND {
            rest.fetch_status(&request.entity_id, timeout).await
        } else {
            rest.submit_command(request, timeout).await
        };
        result.map_err(CommandError::from)
    }
}
