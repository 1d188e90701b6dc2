//! Names under which the service lives on the bus.

use crate::error::{Error, Result};

/// Interface implemented by the exported object. Fixed, since it is baked into the object's
/// interface description.
pub const INTERFACE: &str = "org.gnome.shell.extensions.Unjs";

pub const DEFAULT_SERVICE_NAME: &str = "org.gnome.shell.extensions.Unjs";
pub const DEFAULT_OBJECT_PATH: &str = "/org/gnome/shell/extensions/unjs";
pub const DEFAULT_SIGNAL_NAME: &str = "ExampleSignal";

/// Where the service is addressed and which signal carries pedal events.
///
/// Immutable once constructed; a [`Coordinator`][crate::Coordinator] keeps the same identity for
/// its whole life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusIdentity {
    service_name: String,
    object_path: String,
    signal_name: String,
}

impl BusIdentity {
    /// Validate and build an identity.
    pub fn new(service_name: impl Into<String>, object_path: impl Into<String>, signal_name: impl Into<String>) -> Result<Self> {
        let (service_name, object_path, signal_name) = (service_name.into(), object_path.into(), signal_name.into());

        zbus::names::WellKnownName::try_from(service_name.as_str())
            .map_err(|e| Error::InvalidIdentity(format!("service name {:?}: {}", service_name, e)))?;
        zbus::zvariant::ObjectPath::try_from(object_path.as_str())
            .map_err(|e| Error::InvalidIdentity(format!("object path {:?}: {}", object_path, e)))?;
        zbus::names::MemberName::try_from(signal_name.as_str())
            .map_err(|e| Error::InvalidIdentity(format!("signal name {:?}: {}", signal_name, e)))?;

        Ok(Self { service_name, object_path, signal_name })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    pub fn signal_name(&self) -> &str {
        &self.signal_name
    }
}

impl Default for BusIdentity {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
            object_path: DEFAULT_OBJECT_PATH.to_owned(),
            signal_name: DEFAULT_SIGNAL_NAME.to_owned(),
        }
    }
}
