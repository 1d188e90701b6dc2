use std::sync::Arc;

use thiserror::Error;

use crate::{
    backend::{BusBackend, DoneCallback},
    error::{Error, Result},
    names::BusIdentity,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MethodError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),
}

impl From<MethodError> for zbus::fdo::Error {
    fn from(err: MethodError) -> Self {
        match err {
            MethodError::InvalidArgs(msg) => zbus::fdo::Error::InvalidArgs(msg),
        }
    }
}

/// The object published on the bus.
///
/// Besides the pedal signal, it carries the methods and properties earlier versions of the
/// indicator exposed, so existing clients keep working.
#[derive(Debug)]
pub struct ServiceObject {
    read_write: tokio::sync::watch::Sender<bool>,
}

impl Default for ServiceObject {
    fn default() -> Self {
        let (read_write, _) = tokio::sync::watch::channel(false);
        Self { read_write }
    }
}

impl ServiceObject {
    pub const READ_ONLY_PROPERTY: &'static str = "a string";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn hello_world(&self, name: &str) -> std::result::Result<String, MethodError> {
        if name.is_empty() {
            return Err(MethodError::InvalidArgs("name must not be empty".to_owned()));
        }
        Ok(format!("Hello, {}!", name))
    }

    pub fn simple_method(&self) {
        log::info!("SimpleMethod() invoked");
    }

    /// Number of characters in `input`.
    pub fn complex_method(&self, input: &str) -> u32 {
        log::info!("ComplexMethod() invoked with {:?}", input);
        input.chars().count().try_into().unwrap_or(u32::MAX)
    }

    pub fn read_only_property(&self) -> &'static str {
        Self::READ_ONLY_PROPERTY
    }

    pub fn read_write_property(&self) -> bool {
        *self.read_write.borrow()
    }

    /// Returns whether the value changed. Watchers are only notified on change.
    pub fn set_read_write_property(&self, value: bool) -> bool {
        self.read_write.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        })
    }

    pub fn watch_read_write_property(&self) -> tokio::sync::watch::Receiver<bool> {
        self.read_write.subscribe()
    }
}

#[derive(Debug)]
enum Binding<C> {
    Unbound,
    Exporting { connection: C, path: String },
    Exported { connection: C, path: String },
}

/// Binds a [`ServiceObject`] to a connection and emits signals from it.
#[derive(Debug)]
pub struct ServiceEndpoint<B: BusBackend> {
    object: Arc<ServiceObject>,
    binding: Binding<B::Connection>,
}

impl<B: BusBackend> ServiceEndpoint<B> {
    pub fn new(object: Arc<ServiceObject>) -> Self {
        Self { object, binding: Binding::Unbound }
    }

    pub fn object(&self) -> &Arc<ServiceObject> {
        &self.object
    }

    /// Start exporting. The outcome arrives through `on_done` and has to be handed back through
    /// [`ServiceEndpoint::finish_export`].
    pub fn export(&mut self, backend: &mut B, connection: &B::Connection, object_path: &str, on_done: DoneCallback) -> Result<()> {
        match &self.binding {
            Binding::Unbound => {}
            Binding::Exporting { path, .. } | Binding::Exported { path, .. } => return Err(Error::AlreadyExported(path.clone())),
        }
        self.binding = Binding::Exporting { connection: connection.clone(), path: object_path.to_owned() };
        backend.export(connection, object_path, self.object.clone(), on_done);
        Ok(())
    }

    pub fn finish_export(&mut self, result: Result<()>) -> Result<()> {
        match std::mem::replace(&mut self.binding, Binding::Unbound) {
            Binding::Exporting { connection, path } => {
                result?;
                self.binding = Binding::Exported { connection, path };
                Ok(())
            }
            other => {
                self.binding = other;
                log::warn!("export finished without being started");
                result
            }
        }
    }

    pub fn is_exported(&self) -> bool {
        matches!(self.binding, Binding::Exported { .. })
    }

    pub fn is_exporting(&self) -> bool {
        matches!(self.binding, Binding::Exporting { .. })
    }

    /// Emit the pedal signal. Delivery failures show up later through `on_done`.
    pub fn emit_signal(&mut self, backend: &mut B, identity: &BusIdentity, payload: String, on_done: DoneCallback) -> Result<()> {
        match &self.binding {
            Binding::Exported { connection, .. } => {
                log::debug!("emitting {} with payload {}", identity.signal_name(), payload);
                backend.emit_signal(connection, identity, payload, on_done)
            }
            _ => Err(Error::NotExported),
        }
    }

    /// Remove the object from the bus. Does nothing if it is not exported; an export that is
    /// still in flight is merely forgotten.
    pub fn unexport(&mut self, backend: &mut B) -> Result<()> {
        match std::mem::replace(&mut self.binding, Binding::Unbound) {
            Binding::Exported { connection, path } => backend.unexport(&connection, &path),
            Binding::Exporting { path, .. } => {
                log::debug!("abandoning export at {}", path);
                Ok(())
            }
            Binding::Unbound => Ok(()),
        }
    }
}
