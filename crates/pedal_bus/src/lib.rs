//! Bus lifecycle core of the pedal indicator.
//!
//! Owns a well-known name on the session bus, exports the service object, subscribes to the
//! pedal signal and turns its payloads into [`KeyActionEvent`]s for a [`Presenter`]. Everything
//! is driven by [`Coordinator`], which also tears all of it down again on
//! [`Coordinator::disable`].

pub mod backend;
pub mod codec;
pub mod coordinator;
pub mod display;
pub mod endpoint;
pub mod error;
pub mod names;
pub mod proxy;
pub mod registry;
pub mod session;
pub mod zbus_backend;

#[cfg(test)]
mod testing;

pub use backend::BusBackend;
pub use codec::{decode, encode, DecodeError, KeyAction, KeyActionEvent, KeyState};
pub use coordinator::*;
pub use display::DisplayState;
pub use endpoint::{MethodError, ServiceObject};
pub use error::{Error, Result};
pub use names::BusIdentity;
pub use zbus_backend::ZbusBackend;
