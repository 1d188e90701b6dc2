//! [`BusBackend`] on top of a real D-Bus connection.

use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt, StreamExt};

use crate::{
    backend::{BusBackend, ConnectCallback, DoneCallback, NameOwnerHooks, SignalCallback},
    endpoint::ServiceObject,
    error::{Error, Result},
    names::{self, BusIdentity},
};

/// The [`ServiceObject`] as seen from the bus.
///
/// Methods and properties correspond to methods and properties on the DBus service that can be
/// used by others. The pedal signal itself is emitted directly on the connection, since its name
/// is only known at runtime.
struct PedalInterface {
    object: Arc<ServiceObject>,
}

#[zbus::interface(name = "org.gnome.shell.extensions.Unjs")]
impl PedalInterface {
    /// HelloWorld method
    async fn hello_world(&self, name: &str) -> zbus::fdo::Result<String> {
        Ok(self.object.hello_world(name)?)
    }

    /// SimpleMethod method
    async fn simple_method(&self) {
        self.object.simple_method();
    }

    /// ComplexMethod method
    async fn complex_method(&self, input: &str) -> u32 {
        self.object.complex_method(input)
    }

    /// ReadOnlyProperty property
    #[zbus(property)]
    async fn read_only_property(&self) -> String {
        self.object.read_only_property().to_owned()
    }

    /// ReadWriteProperty property
    #[zbus(property)]
    async fn read_write_property(&self) -> bool {
        self.object.read_write_property()
    }

    #[zbus(property)]
    async fn set_read_write_property(&mut self, value: bool) {
        if self.object.set_read_write_property(value) {
            log::info!("ReadWriteProperty set to {}", value);
        }
    }
}

/// Runs every bus operation as a task on `runtime`; results are reported through the callbacks.
/// Releases and removals are kept until [`BusBackend::settle`] collects them.
#[derive(Debug)]
pub struct ZbusBackend {
    runtime: tokio::runtime::Handle,
    unsettled: Vec<tokio::task::JoinHandle<Result<()>>>,
}

#[derive(Debug)]
pub struct ZbusOwnership {
    connection: zbus::Connection,
    name: String,
    task: tokio::task::JoinHandle<()>,
}

#[derive(Debug)]
pub struct ZbusSubscription {
    signal_name: String,
    task: tokio::task::JoinHandle<()>,
}

impl ZbusBackend {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self { runtime, unsettled: Vec::new() }
    }

    fn spawn_unsettled<F>(&mut self, task: F)
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.unsettled.push(self.runtime.spawn(task));
    }
}

impl BusBackend for ZbusBackend {
    type Connection = zbus::Connection;
    type Ownership = ZbusOwnership;
    type Subscription = ZbusSubscription;

    fn connect(&mut self, on_ready: ConnectCallback<zbus::Connection>) {
        self.runtime.spawn(async move {
            on_ready(zbus::Connection::session().await.map_err(Error::Connection));
        });
    }

    fn own_name(&mut self, connection: &zbus::Connection, name: &str, hooks: NameOwnerHooks<zbus::Connection>) -> ZbusOwnership {
        let task = self.runtime.spawn({
            let connection = connection.clone();
            let name = name.to_owned();
            async move {
                let NameOwnerHooks { on_bus_acquired, on_name_acquired, on_name_lost } = hooks;
                on_bus_acquired(connection.clone());

                let dbus = match zbus::fdo::DBusProxy::new(&connection).await {
                    Ok(dbus) => dbus,
                    Err(e) => return on_name_lost(e.to_string()),
                };
                // listen before requesting, so losing the name right away is not missed
                let mut lost = match dbus.receive_name_lost().await {
                    Ok(lost) => lost,
                    Err(e) => return on_name_lost(e.to_string()),
                };
                if let Err(reason) = request_name(&connection, &name).await {
                    return on_name_lost(reason);
                }
                on_name_acquired(name.clone());

                while let Some(signal) = lost.next().await {
                    match signal.args() {
                        Ok(args) if args.name().as_str() == name => on_name_lost(format!("{} was taken over", name)),
                        Ok(_) => {}
                        Err(e) => log::warn!("malformed NameLost signal: {}", e),
                    }
                }
            }
        });
        ZbusOwnership { connection: connection.clone(), name: name.to_owned(), task }
    }

    fn unown_name(&mut self, ownership: ZbusOwnership) -> Result<()> {
        let ZbusOwnership { connection, name, task } = ownership;
        task.abort();
        self.spawn_unsettled(async move {
            match connection.release_name(name.as_str()).await {
                Ok(true) => log::debug!("released {}", name),
                Ok(false) => log::debug!("{} was not owned, nothing to release", name),
                Err(e) => return Err(Error::NameOwnership(format!("failed to release {}: {}", name, e))),
            }
            Ok(())
        });
        Ok(())
    }

    fn export(&mut self, connection: &zbus::Connection, object_path: &str, object: Arc<ServiceObject>, on_done: DoneCallback) {
        let connection = connection.clone();
        let path = object_path.to_owned();
        self.runtime.spawn(async move {
            let exported = connection.object_server().at(path.as_str(), PedalInterface { object }).await;
            let result = match exported {
                Ok(true) => Ok(()),
                Ok(false) => Err(Error::Export { path, reason: "an object is already exported at this path".to_owned() }),
                Err(e) => Err(Error::Export { path, reason: e.to_string() }),
            };
            on_done(result);
        });
    }

    fn unexport(&mut self, connection: &zbus::Connection, object_path: &str) -> Result<()> {
        let connection = connection.clone();
        let path = object_path.to_owned();
        self.spawn_unsettled(async move {
            let removed = connection.object_server().remove::<PedalInterface, _>(path.as_str()).await;
            match removed {
                Ok(true) => log::debug!("removed object at {}", path),
                Ok(false) | Err(zbus::Error::InterfaceNotFound) => log::debug!("no object at {}, nothing to remove", path),
                Err(e) => return Err(Error::Export { path, reason: format!("removal failed: {}", e) }),
            }
            Ok(())
        });
        Ok(())
    }

    fn emit_signal(&mut self, connection: &zbus::Connection, identity: &BusIdentity, payload: String, on_done: DoneCallback) -> Result<()> {
        let connection = connection.clone();
        let path = identity.object_path().to_owned();
        let signal_name = identity.signal_name().to_owned();
        self.runtime.spawn(async move {
            let result = connection
                .emit_signal(None::<zbus::names::BusName<'static>>, path.as_str(), names::INTERFACE, signal_name.as_str(), &(payload,))
                .await;
            on_done(result.map_err(Error::Bus));
        });
        Ok(())
    }

    fn subscribe(
        &mut self,
        connection: &zbus::Connection,
        identity: &BusIdentity,
        signal_name: &str,
        callback: SignalCallback,
        on_ready: DoneCallback,
    ) -> Result<ZbusSubscription> {
        let rule = zbus::MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .interface(names::INTERFACE)?
            .member(signal_name)?
            .path(identity.object_path())?
            .build();
        let rule = zbus::OwnedMatchRule::from(rule);

        let task = self.runtime.spawn({
            let connection = connection.clone();
            let signal_name = signal_name.to_owned();
            async move {
                // the match rule is registered with the bus once the stream exists
                let mut stream = match zbus::MessageStream::for_match_rule(rule, &connection, None).await {
                    Ok(stream) => stream,
                    Err(e) => return on_ready(Err(Error::Bus(e))),
                };
                on_ready(Ok(()));
                while let Some(message) = stream.next().await {
                    let message = match message {
                        Ok(message) => message,
                        Err(e) => {
                            log::warn!("error while receiving {}: {}", signal_name, e);
                            continue;
                        }
                    };
                    match message.body().deserialize::<String>() {
                        Ok(payload) => callback(payload),
                        Err(e) => log::warn!("ignoring {} with unexpected arguments: {}", signal_name, e),
                    }
                }
            }
        });
        Ok(ZbusSubscription { signal_name: signal_name.to_owned(), task })
    }

    fn unsubscribe(&mut self, _connection: &zbus::Connection, subscription: ZbusSubscription) -> Result<()> {
        log::debug!("dropping match rule for {}", subscription.signal_name);
        subscription.task.abort();
        Ok(())
    }

    fn settle(&mut self) -> BoxFuture<'static, Vec<Error>> {
        let unsettled = std::mem::take(&mut self.unsettled);
        async move {
            futures::future::join_all(unsettled)
                .await
                .into_iter()
                .filter_map(|joined| match joined {
                    Ok(result) => result.err(),
                    Err(e) => Some(Error::Task(e)),
                })
                .collect()
        }
        .boxed()
    }
}

/// Request `name` without queueing or replacing an existing owner.
async fn request_name(connection: &zbus::Connection, name: &str) -> std::result::Result<(), String> {
    use zbus::fdo::RequestNameReply::*;
    // neither AllowReplacement nor ReplaceExisting
    match connection.request_name_with_flags(name, zbus::fdo::RequestNameFlags::DoNotQueue.into()).await {
        Ok(PrimaryOwner | AlreadyOwner) => Ok(()),
        Ok(reply) => Err(format!("{} is owned by another connection ({:?})", name, reply)),
        Err(zbus::Error::NameTaken) => Err(format!("{} is owned by another connection", name)),
        Err(e) => Err(e.to_string()),
    }
}
