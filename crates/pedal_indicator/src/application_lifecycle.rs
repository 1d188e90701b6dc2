//! Handling of process signals. Termination and the enable/disable toggle are broadcast, so the
//! daemon loop can react to them between bus events.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Exit,
    Toggle,
}

pub static LIFECYCLE_SENDER: Lazy<broadcast::Sender<LifecycleEvent>> = Lazy::new(|| broadcast::channel(4).0);

/// Route SIGINT/SIGTERM to [`LifecycleEvent::Exit`] and SIGUSR1 to [`LifecycleEvent::Toggle`].
pub fn install_signal_handlers() {
    simple_signal::set_handler(&[simple_signal::Signal::Int, simple_signal::Signal::Term], |_| {
        log::info!("Shutting down pedal indicator...");
        if let Err(e) = send(LifecycleEvent::Exit) {
            log::error!("Failed to send shutdown event: {:?}", e);
            std::process::exit(1);
        }
    });
    simple_signal::set_handler(&[simple_signal::Signal::Usr1], |_| {
        if let Err(e) = send(LifecycleEvent::Toggle) {
            log::error!("Failed to send toggle event: {:?}", e);
        }
    });
}

pub fn send(event: LifecycleEvent) -> Result<()> {
    LIFECYCLE_SENDER.send(event).context("Failed to send lifecycle event")?;
    Ok(())
}

pub fn subscribe() -> broadcast::Receiver<LifecycleEvent> {
    LIFECYCLE_SENDER.subscribe()
}
