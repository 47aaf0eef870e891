use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, warn};

use crate::alert::controller::AlertController;
use crate::backend::AlertBackend;
use crate::location::LocationService;
use crate::models::alert::TriggerOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Trigger,
    Status,
    Quit,
}

pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "" | "sos" | "panic" => Some(Command::Trigger),
        "status" => Some(Command::Status),
        "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Reads operator commands line by line until `quit` or end of input.
pub async fn run<B, L, R>(controller: Arc<AlertController<B, L>>, reader: R) -> anyhow::Result<()>
where
    B: AlertBackend + 'static,
    L: LocationService + 'static,
    R: AsyncBufRead + Unpin,
{
    info!("Ready. Enter (or 'sos') toggles the alert, 'status' shows it, 'quit' exits.");
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Some(Command::Trigger) => {
                // Each press runs on its own task so a second press can land mid-flight.
                let controller = controller.clone();
                tokio::spawn(async move { handle_trigger(controller).await });
            }
            Some(Command::Status) => report_status(&controller),
            Some(Command::Quit) => break,
            None => warn!("Unknown command: '{}'", line.trim()),
        }
    }

    let state = controller.state();
    if state.is_in_flight() {
        warn!(%state, "Exiting with an alert in flight; it may remain open upstream");
    }
    Ok(())
}

async fn handle_trigger<B, L>(controller: Arc<AlertController<B, L>>)
where
    B: AlertBackend + 'static,
    L: LocationService + 'static,
{
    match controller.trigger().await {
        Ok(TriggerOutcome::Started(active)) => {
            info!(
                alert_id = %active.alert_id,
                started_at = %active.started_at,
                start_source = ?active.start_source,
                "ALERT ACTIVE. Press again to cancel or resolve."
            );
            if let Some(e) = &active.notification_error {
                warn!(alert_id = %active.alert_id, "Staff may not have been notified: {}", e);
            }
            if let Some(remaining) = controller.countdown() {
                tokio::spawn(display_countdown(remaining));
            }
        }
        Ok(TriggerOutcome::Finalized(outcome)) => {
            info!(
                alert_id = %outcome.alert_id,
                elapsed_ms = outcome.elapsed_ms,
                source = ?outcome.source,
                "Alert {:?}",
                outcome.classification
            );
            if let Some(e) = &outcome.resolution_error {
                warn!(alert_id = %outcome.alert_id, "{}; the alert may still be open upstream", e);
            }
            controller.dismiss();
        }
        Ok(TriggerOutcome::Ignored(state)) => {
            info!(%state, "Alert busy, press ignored");
        }
        Err(e) if e.is_blocking() => error!("{}. Emergency alerts cannot be sent from here.", e),
        Err(e) if e.is_fatal() => error!("{}. You can try again.", e),
        Err(e) => warn!("{}", e),
    }
}

/// Logs the cancel window once per whole second until it closes or the alert ends.
async fn display_countdown(mut remaining: tokio::sync::watch::Receiver<u64>) {
    let mut last_second = None;
    loop {
        let ms = *remaining.borrow_and_update();
        let second = ms.div_ceil(1000);
        if last_second != Some(second) {
            last_second = Some(second);
            if second == 0 {
                info!("Cancel window closed; pressing now resolves the alert");
                return;
            }
            info!("{}s left to cancel", second);
        }
        if remaining.changed().await.is_err() {
            return;
        }
    }
}

fn report_status<B, L>(controller: &AlertController<B, L>)
where
    B: AlertBackend,
    L: LocationService,
{
    let state = controller.state();
    match controller.countdown() {
        Some(remaining) => info!(
            %state,
            remaining = ?Duration::from_millis(*remaining.borrow()),
            "Alert status"
        ),
        None => info!(%state, "Alert status"),
    }
}
