//! `adbpilot run` — Carry out one task on the device.

use std::sync::Arc;

use adbpilot_agent::{AgentLoop, CancellationToken, LoopOutcome};
use adbpilot_config::AppConfig;
use adbpilot_core::event::{DomainEvent, EventBus};
use adbpilot_device::AdbBridge;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

pub async fn run(
    task: String,
    serial: Option<String>,
    max_rounds: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(serial) = serial {
        config.device.serial = Some(serial);
    }
    if let Some(max) = max_rounds {
        config.agent.max_rounds = max;
    }

    // Check for API key early — give a clear error
    if !config.has_api_key() && config.provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    GEMINI_API_KEY=...       (default provider)");
        eprintln!("    OPENAI_API_KEY=sk-...    (with ADBPILOT_PROVIDER=openai)");
        eprintln!("    ADBPILOT_API_KEY=...     (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = adbpilot_providers::build_from_config(&config)?;
    let device = AdbBridge::from_config(&config);

    let event_bus = Arc::new(EventBus::default());
    let agent = AgentLoop::from_config(&config, Arc::new(provider), Arc::new(device))
        .with_event_bus(event_bus.clone());

    let printer = tokio::spawn(print_progress(event_bus.subscribe()));

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n  Cancelling…");
                cancel.cancel();
            }
        })
    };

    info!(provider = %config.provider, model = %config.model, serial = ?config.device.serial, "Agent configured");
    let report = agent.run(task, cancel).await;
    ctrl_c.abort();
    drop(agent);
    drop(event_bus);
    let _ = printer.await;

    println!();
    println!(
        "  {} round(s), {} action(s), {} transcript turn(s)",
        report.rounds,
        report.dispatched,
        report.transcript.len()
    );

    match report.outcome {
        LoopOutcome::Completed { summary } => {
            println!("  ✅ Done: {summary}");
            Ok(())
        }
        LoopOutcome::Aborted { reason } => {
            warn!(run_id = %report.run_id, "Exiting with error: {reason}");
            println!("  ❌ Aborted: {reason}");
            Err(reason.into())
        }
    }
}

/// Render progress events until the run finishes.
async fn print_progress(mut rx: broadcast::Receiver<Arc<DomainEvent>>) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match event.as_ref() {
            DomainEvent::RunStarted {
                run_id, instruction, ..
            } => {
                println!("🤖 AdbPilot run {run_id}");
                println!("   Task: {instruction}\n");
            }
            DomainEvent::ModelResponded {
                round,
                text_preview,
                action_count,
                ..
            } => {
                let text = text_preview.as_deref().unwrap_or("");
                println!("  [{round}] {text} ({action_count} action(s))");
            }
            DomainEvent::ActionDispatched {
                action,
                error,
                duration_ms,
                screenshot,
                ..
            } => match error {
                None => println!("      ✅ {action} ({duration_ms} ms){}", no_screen(*screenshot)),
                Some(err) => println!("      ❌ {action}: {err}{}", no_screen(*screenshot)),
            },
            DomainEvent::RunFinished { .. } => break,
        }
    }
}

fn no_screen(screenshot: bool) -> &'static str {
    if screenshot { "" } else { " [no screenshot]" }
}
