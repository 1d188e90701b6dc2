use thiserror::Error;

use crate::{codec::DecodeError, coordinator::LifecycleState};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not connect to the bus: {0}")]
    Connection(#[source] zbus::Error),
    #[error("Lost or failed to acquire bus name: {0}")]
    NameOwnership(String),
    #[error("Could not export object at {path}: {reason}")]
    Export { path: String, reason: String },
    #[error("Malformed payload: {0}")]
    Decode(#[from] DecodeError),
    #[error("Operation not possible while {0:?}")]
    NotReady(LifecycleState),
    #[error("Service object is not exported")]
    NotExported,
    #[error("Bus session is not connected")]
    NotConnected,
    #[error("Bus session is already connected")]
    AlreadyConnected,
    #[error("Service object is already exported at {0}")]
    AlreadyExported(String),
    #[error("Already enabled (currently {0:?})")]
    AlreadyEnabled(LifecycleState),
    #[error("Invalid bus identity: {0}")]
    InvalidIdentity(String),
    #[error("Dbus error")]
    Bus(#[from] zbus::Error),
    #[error("Background bus task did not finish: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("{} error(s) during teardown", .0.len())]
    Teardown(Vec<Error>),
}

pub type Result<T> = std::result::Result<T, Error>;
