//! One-shot control commands: move, rotate, stop, estop, mode, status, send.

use serde_json::Value;

use fleetsync_core::FleetClient;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    client: &FleetClient,
    cmd: Command,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let result = match cmd {
        Command::Move(args) => {
            client
                .control(args.entity)
                .move_to(args.direction, checked_speed(args.speed)?, millis(args.duration))
                .await?
        }
        Command::Rotate(args) => {
            client
                .control(args.entity)
                .rotate(args.angle, checked_speed(args.speed)?)
                .await?
        }
        Command::Stop(args) => client.control(args.entity).stop().await?,
        Command::EmergencyStop(args) => client.control(args.entity).emergency_stop().await?,
        Command::Mode(args) => client.control(args.entity).set_mode(args.mode).await?,
        Command::Status(args) => client.control(args.entity).status().await?,
        Command::Send(args) => {
            let params: Value = serde_json::from_str(&args.params)?;
            if !params.is_object() {
                return Err(CliError::Validation {
                    field: "params".into(),
                    reason: "expected a JSON object".into(),
                });
            }
            client
                .control(args.entity)
                .send_command(args.command_type, params, args.priority, global.timeout)
                .await?
        }
        other => {
            return Err(CliError::Internal {
                message: format!("{other:?} is not a control command"),
            });
        }
    };

    println!("{}", output::render_value(&result, global.output));
    Ok(())
}

fn checked_speed(speed: f64) -> Result<f64, CliError> {
    if (0.0..=1.0).contains(&speed) {
        Ok(speed)
    } else {
        Err(CliError::Validation {
            field: "speed".into(),
            reason: format!("{speed} is outside 0.0..=1.0"),
        })
    }
}

fn millis(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
