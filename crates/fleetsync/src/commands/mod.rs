//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod watch;

use std::time::Duration;

use tracing::debug;

use fleetsync_core::{ConnectionState, FleetClient};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a server-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    client: &FleetClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(client, args, global).await,
        other => {
            establish(client).await;
            let result = control::handle(client, other, global).await;
            client.disconnect().await;
            result
        }
    }
}

/// Start the channel and wait for its first handshake to settle.
///
/// Commands then go over the channel when it opened, or to the REST
/// fallback when it did not.
async fn establish(client: &FleetClient) {
    let manager = client.manager();
    let limit = manager.config().connect_timeout + Duration::from_secs(1);
    let mut states = manager.state_changes();
    manager.connect();

    let settled = tokio::time::timeout(
        limit,
        states.wait_for(|s| matches!(s, ConnectionState::Open | ConnectionState::Closed)),
    )
    .await
    .is_ok();
    debug!(settled, state = %manager.state(), "channel handshake settled");
}
