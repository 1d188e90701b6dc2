//! Client side of the exported interface, for talking to a running indicator.
//!
//! For more information, see ["Writing a client proxy" in the zbus
//! tutorial](https://dbus2.github.io/zbus/).

#[zbus::proxy(
    interface = "org.gnome.shell.extensions.Unjs",
    default_service = "org.gnome.shell.extensions.Unjs",
    default_path = "/org/gnome/shell/extensions/unjs",
    gen_blocking = false
)]
pub trait Pedal {
    /// Returns a greeting for `name`.
    fn hello_world(&self, name: &str) -> zbus::Result<String>;

    fn simple_method(&self) -> zbus::Result<()>;

    /// Number of characters in `input`.
    fn complex_method(&self, input: &str) -> zbus::Result<u32>;

    #[zbus(property)]
    fn read_only_property(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn read_write_property(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn set_read_write_property(&self, value: bool) -> zbus::Result<()>;
}

/// Connect to the indicator addressed by `identity`.
pub async fn connect<'a>(con: &zbus::Connection, identity: &'a crate::BusIdentity) -> zbus::Result<PedalProxy<'a>> {
    PedalProxy::builder(con).destination(identity.service_name())?.path(identity.object_path())?.build().await
}
