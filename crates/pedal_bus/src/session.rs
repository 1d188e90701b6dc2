use crate::{
    backend::{BusBackend, ConnectCallback, NameOwnerHooks},
    error::{Error, Result},
    names::BusIdentity,
};

/// Lifecycle wrapper around one bus connection and the name owned on it.
#[derive(Debug)]
pub struct SessionHandle<B: BusBackend> {
    connection: Option<B::Connection>,
    ownership: Option<B::Ownership>,
    name_owned: bool,
}

impl<B: BusBackend> Default for SessionHandle<B> {
    fn default() -> Self {
        Self { connection: None, ownership: None, name_owned: false }
    }
}

impl<B: BusBackend> SessionHandle<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start connecting. The connection is handed to `on_ready` and has to be given back through
    /// [`SessionHandle::attach`].
    pub fn connect(&mut self, backend: &mut B, on_ready: ConnectCallback<B::Connection>) -> Result<()> {
        if self.connection.is_some() {
            return Err(Error::AlreadyConnected);
        }
        backend.connect(on_ready);
        Ok(())
    }

    pub fn attach(&mut self, connection: B::Connection) -> Result<()> {
        if self.connection.is_some() {
            return Err(Error::AlreadyConnected);
        }
        self.connection = Some(connection);
        Ok(())
    }

    /// Request the service name. A request that is still outstanding is withdrawn first.
    pub fn own_name(&mut self, backend: &mut B, identity: &BusIdentity, hooks: NameOwnerHooks<B::Connection>) -> Result<()> {
        let connection = self.connection.as_ref().ok_or(Error::NotConnected)?;
        if let Some(previous) = self.ownership.take() {
            log::debug!("withdrawing previous request for {}", identity.service_name());
            self.name_owned = false;
            backend.unown_name(previous)?;
        }
        let connection = connection.clone();
        self.ownership = Some(backend.own_name(&connection, identity.service_name(), hooks));
        Ok(())
    }

    /// Release the name. Does nothing if no name was requested.
    pub fn unown_name(&mut self, backend: &mut B) -> Result<()> {
        self.name_owned = false;
        match self.ownership.take() {
            Some(ownership) => backend.unown_name(ownership),
            None => Ok(()),
        }
    }

    pub fn mark_name_acquired(&mut self) {
        self.name_owned = true;
    }

    pub fn mark_name_lost(&mut self) {
        self.name_owned = false;
    }

    /// Drop this handle's reference to the connection. Other holders of the connection keep it
    /// alive; the bus is closed once the last one lets go.
    pub fn disconnect(&mut self) -> Option<B::Connection> {
        self.connection.take()
    }

    pub fn connection(&self) -> Option<&B::Connection> {
        self.connection.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn owns_name(&self) -> bool {
        self.name_owned
    }

    pub fn has_ownership_request(&self) -> bool {
        self.ownership.is_some()
    }
}
