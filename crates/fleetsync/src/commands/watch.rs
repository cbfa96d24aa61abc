//! `watch`: print the event stream until interrupted.

use std::collections::HashSet;

use strum::IntoEnumIterator;
use tokio::sync::mpsc;
use tracing::debug;

use fleetsync_core::{Event, EventCategory, FleetClient};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    client: &FleetClient,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let wanted: HashSet<EventCategory> = if args.categories.is_empty() {
        EventCategory::iter().collect()
    } else {
        args.categories.iter().copied().collect()
    };

    // Give-up is always observed so the process can exit with an error.
    let mut observed = wanted.clone();
    observed.insert(EventCategory::ReconnectFailed);

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let subscriptions: Vec<_> = observed
        .into_iter()
        .map(|category| {
            let tx = tx.clone();
            client.subscribe(category, move |event: &Event| {
                let _ = tx.send(event.clone());
            })
        })
        .collect();
    drop(tx);

    client.connect();

    let deadline = args.duration.map(|d| tokio::time::Instant::now() + d);
    let mut shown = 0usize;
    let outcome = loop {
        let next = tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            () = sleep_until(deadline) => break Ok(()),
            next = rx.recv() => next,
        };
        let Some(event) = next else {
            break Ok(());
        };

        if wanted.contains(&event.category) && concerns(&event, args.entity.as_deref()) {
            println!("{}", output::render_event(&event, global.output));
            shown += 1;
        }
        if event.category == EventCategory::ReconnectFailed {
            break Err(CliError::Unavailable {
                reason: format!("gave up reconnecting to {}", client.manager().config().url),
            });
        }
        if args.count.is_some_and(|limit| shown >= limit) {
            break Ok(());
        }
    };

    debug!(shown, "watch finished");
    for sub in &subscriptions {
        sub.unsubscribe();
    }
    client.disconnect().await;
    outcome
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Lifecycle events always pass the entity filter.
fn concerns(event: &Event, entity: Option<&str>) -> bool {
    let Some(entity) = entity else {
        return true;
    };
    if event.category.is_lifecycle() {
        return true;
    }
    ["entity_id", "robot_id"]
        .iter()
        .filter_map(|key| event.data.get(key).and_then(|v| v.as_str()))
        .any(|id| id == entity)
}
