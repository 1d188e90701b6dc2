//! The raw bus primitives the lifecycle is built on.
//!
//! Every operation that has to talk to the bus daemon reports back through a callback instead
//! of blocking, mirroring how bus ownership actually works: a connection is ready at some point,
//! a name is granted (or refused) later, and both may happen in any order relative to an object
//! export. Callbacks may be invoked from any task, so they must be `Send`.
//!
//! [`ZbusBackend`][crate::ZbusBackend] implements this on top of a real session bus.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{
    endpoint::ServiceObject,
    error::{Error, Result},
    names::BusIdentity,
};

pub type ConnectCallback<C> = Box<dyn FnOnce(Result<C>) + Send>;

/// Invoked once with the outcome of an operation that completes in the background.
pub type DoneCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// Invoked with the string argument of every matching signal.
pub type SignalCallback = Box<dyn Fn(String) + Send + Sync>;

/// The three independent hooks of a name ownership request.
pub struct NameOwnerHooks<C> {
    /// The connection the name is requested on is usable.
    pub on_bus_acquired: Box<dyn FnOnce(C) + Send>,
    /// The bus daemon confirmed that we are the primary owner of the name.
    pub on_name_acquired: Box<dyn Fn(String) + Send + Sync>,
    /// The name could not be acquired, or was taken away from us.
    pub on_name_lost: Box<dyn Fn(String) + Send + Sync>,
}

pub trait BusBackend {
    type Connection: Clone + std::fmt::Debug + Send + 'static;
    /// Token for an outstanding name ownership request.
    type Ownership: std::fmt::Debug;
    /// Token for an active signal subscription.
    type Subscription: std::fmt::Debug;

    /// Open a fresh connection to the bus. Connections are never shared between calls.
    fn connect(&mut self, on_ready: ConnectCallback<Self::Connection>);

    /// Request `name` on `connection`. Another peer already owning the name is reported through
    /// `on_name_lost`; the request neither queues nor replaces the owner.
    fn own_name(&mut self, connection: &Self::Connection, name: &str, hooks: NameOwnerHooks<Self::Connection>) -> Self::Ownership;

    fn unown_name(&mut self, ownership: Self::Ownership) -> Result<()>;

    /// Publish `object` at `object_path`. An object already bound to that path on the connection
    /// is reported as [`Error::Export`][crate::Error::Export] through `on_done`.
    fn export(&mut self, connection: &Self::Connection, object_path: &str, object: Arc<ServiceObject>, on_done: DoneCallback);

    /// Remove the object at `object_path`. Failures the bus reports later are returned by
    /// [`BusBackend::settle`].
    fn unexport(&mut self, connection: &Self::Connection, object_path: &str) -> Result<()>;

    fn emit_signal(&mut self, connection: &Self::Connection, identity: &BusIdentity, payload: String, on_done: DoneCallback) -> Result<()>;

    /// Start listening for `signal_name`. `on_ready` reports whether the match rule was accepted;
    /// no signal is delivered to `callback` before that.
    fn subscribe(
        &mut self,
        connection: &Self::Connection,
        identity: &BusIdentity,
        signal_name: &str,
        callback: SignalCallback,
        on_ready: DoneCallback,
    ) -> Result<Self::Subscription>;

    fn unsubscribe(&mut self, connection: &Self::Connection, subscription: Self::Subscription) -> Result<()>;

    /// Wait for the background work started by `unown_name` and `unexport` so far and return
    /// what failed.
    fn settle(&mut self) -> BoxFuture<'static, Vec<Error>>;
}
