//! One-shot commands talking to the bus without owning anything on it.

use anyhow::{Context, Result};
use pedal_bus::{encode, names, proxy, BusIdentity, KeyActionEvent};

async fn session_bus() -> Result<zbus::Connection> {
    zbus::Connection::session().await.context("Failed to connect to the session bus")
}

/// Broadcast `event` as the pedal signal.
pub async fn send(identity: &BusIdentity, event: &KeyActionEvent) -> Result<()> {
    let con = session_bus().await?;
    let payload = encode(event);
    log::debug!("Emitting {} on {}: {}", identity.signal_name(), identity.object_path(), payload);
    con.emit_signal(None::<zbus::names::BusName>, identity.object_path(), names::INTERFACE, identity.signal_name(), &(payload,))
        .await
        .context("Failed to emit signal")?;
    Ok(())
}

pub async fn hello(identity: &BusIdentity, name: &str) -> Result<String> {
    let con = session_bus().await?;
    let proxy = proxy::connect(&con, identity).await?;
    proxy.hello_world(name).await.with_context(|| format!("Is an indicator running as {}?", identity.service_name()))
}

/// Read the feature switch, or set it when `enabled` is given. Returns the resulting value.
pub async fn feature(identity: &BusIdentity, enabled: Option<bool>) -> Result<bool> {
    let con = session_bus().await?;
    let proxy = proxy::connect(&con, identity).await?;
    if let Some(enabled) = enabled {
        proxy.set_read_write_property(enabled).await.context("Failed to set the feature switch")?;
    }
    proxy.read_write_property().await.with_context(|| format!("Is an indicator running as {}?", identity.service_name()))
}
