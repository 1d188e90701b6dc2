use anyhow::{Context, Result};
use pedal_bus::{BusIdentity, Coordinator, LifecycleState, ZbusBackend};
use tokio::{io::AsyncBufReadExt, sync::broadcast};

use crate::{
    application_lifecycle::{self, LifecycleEvent},
    opts,
    presenter::TerminalPresenter,
};

pub fn initialize_daemon(identity: BusIdentity) -> Result<()> {
    application_lifecycle::install_signal_handlers();

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().context("Failed to initialize tokio runtime")?;
    rt.block_on(run(identity))
}

async fn run(identity: BusIdentity) -> Result<()> {
    let mut lifecycle = application_lifecycle::subscribe();
    let backend = ZbusBackend::new(tokio::runtime::Handle::current());
    let (mut coordinator, mut events) = Coordinator::new(identity, backend, TerminalPresenter::new());
    coordinator.enable()?;

    let mut stdin_lines = Some(tokio::io::BufReader::new(tokio::io::stdin()).lines());

    loop {
        tokio::select! {
            Some(event) = events.recv() => coordinator.handle_event(event),
            line = next_line(&mut stdin_lines), if stdin_lines.is_some() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let result = opts::parse_event_line(&line).and_then(|event| Ok(coordinator.send(&event)?));
                    if let Err(err) = result {
                        log::error!("Failed to send {:?}: {:?}", line, err);
                    }
                }
                Ok(None) => {
                    log::debug!("stdin closed");
                    stdin_lines = None;
                }
                Err(err) => {
                    log::warn!("Failed to read stdin: {}", err);
                    stdin_lines = None;
                }
            },
            event = lifecycle.recv() => match event {
                Ok(LifecycleEvent::Toggle) if coordinator.state() == LifecycleState::Idle => {
                    if let Err(err) = coordinator.enable() {
                        log::error!("Failed to enable: {}", err);
                    }
                }
                Ok(LifecycleEvent::Toggle) => {
                    if let Err(err) = coordinator.disable_and_wait().await {
                        log::error!("Failed to disable cleanly: {}", err);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => log::warn!("Missed {} lifecycle events", skipped),
                Ok(LifecycleEvent::Exit) | Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    coordinator.disable_and_wait().await?;
    Ok(())
}

async fn next_line(lines: &mut Option<tokio::io::Lines<tokio::io::BufReader<tokio::io::Stdin>>>) -> std::io::Result<Option<String>> {
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}
