//! In-memory [`BusBackend`] whose callbacks are fired by hand, so tests can pick the order.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
};

use futures::future::BoxFuture;

use crate::{
    backend::{BusBackend, ConnectCallback, DoneCallback, NameOwnerHooks, SignalCallback},
    endpoint::ServiceObject,
    error::{Error, Result},
    names::BusIdentity,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeConnection {
    pub id: u64,
}

/// State shared by every backend on the same fake bus.
#[derive(Debug, Default)]
struct FakeBus {
    next_id: u64,
    /// well-known name -> ownership id
    names: HashMap<String, u64>,
}

struct Ownership {
    connection: FakeConnection,
    name: String,
    on_bus_acquired: Option<Box<dyn FnOnce(FakeConnection) + Send>>,
    on_name_acquired: Box<dyn Fn(String) + Send + Sync>,
    on_name_lost: Box<dyn Fn(String) + Send + Sync>,
}

#[derive(Default)]
pub struct FakeBackend {
    bus: Arc<Mutex<FakeBus>>,
    calls: Vec<&'static str>,
    failing: HashSet<&'static str>,
    /// ops that are accepted but fail once the bus answers
    failing_later: HashSet<&'static str>,
    unsettled_errors: Vec<Error>,
    pending_connects: Vec<ConnectCallback<FakeConnection>>,
    ownerships: BTreeMap<u64, Ownership>,
    bound_paths: HashSet<(u64, String)>,
    pending_exports: Vec<DoneCallback>,
    subscriptions: BTreeMap<u64, (String, SignalCallback)>,
    pending_subscriptions: Vec<DoneCallback>,
    emitted: Vec<String>,
}

impl std::fmt::Debug for FakeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeBackend")
            .field("calls", &self.calls)
            .field("ownerships", &self.ownerships.keys().collect::<Vec<_>>())
            .field("bound_paths", &self.bound_paths)
            .field("subscriptions", &self.subscriptions.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

pub fn noop_hooks() -> NameOwnerHooks<FakeConnection> {
    NameOwnerHooks { on_bus_acquired: Box::new(|_| {}), on_name_acquired: Box::new(|_| {}), on_name_lost: Box::new(|_| {}) }
}

impl FakeBackend {
    /// A second backend attached to the same fake bus, e.g. another process.
    pub fn on_same_bus(&self) -> Self {
        Self { bus: self.bus.clone(), ..Default::default() }
    }

    fn next_id(&self) -> u64 {
        let mut bus = self.bus.lock().unwrap();
        bus.next_id += 1;
        bus.next_id
    }

    pub fn new_connection(&self) -> FakeConnection {
        FakeConnection { id: self.next_id() }
    }

    /// Make the next call to `op` fail.
    pub fn fail_next(&mut self, op: &'static str) {
        self.failing.insert(op);
    }

    /// Accept the next call to `op`, but have the bus report a failure afterwards.
    pub fn fail_later(&mut self, op: &'static str) {
        self.failing_later.insert(op);
    }

    fn record(&mut self, op: &'static str) -> Result<()> {
        self.calls.push(op);
        if self.failing.remove(op) {
            Err(Error::Bus(zbus::Error::Failure(format!("{} failed", op))))
        } else {
            Ok(())
        }
    }

    fn outcome(&mut self, op: &'static str) -> Result<()> {
        if self.failing_later.remove(op) {
            Err(Error::Bus(zbus::Error::Failure(format!("{} failed on the bus", op))))
        } else {
            Ok(())
        }
    }

    pub fn calls_of(&self) -> Vec<&'static str> {
        self.calls.clone()
    }

    pub fn calls_to(&self, op: &str) -> usize {
        self.calls.iter().filter(|c| **c == op).count()
    }

    pub fn pending_connects(&self) -> usize {
        self.pending_connects.len()
    }

    pub fn complete_connect(&mut self) -> FakeConnection {
        let connection = self.new_connection();
        let on_ready = self.pending_connects.remove(0);
        on_ready(Ok(connection.clone()));
        connection
    }

    pub fn fail_connect(&mut self) {
        let on_ready = self.pending_connects.remove(0);
        on_ready(Err(Error::Connection(zbus::Error::Address("no bus daemon".to_owned()))));
    }

    fn latest_ownership(&mut self) -> &mut Ownership {
        self.ownerships.values_mut().next_back().expect("no outstanding name request")
    }

    pub fn acquire_bus(&mut self) {
        let ownership = self.latest_ownership();
        let connection = ownership.connection.clone();
        if let Some(hook) = ownership.on_bus_acquired.take() {
            hook(connection);
        }
    }

    /// Resolve the latest name request. Returns whether the name was granted.
    pub fn grant_name(&mut self) -> bool {
        let (&id, ownership) = self.ownerships.iter().next_back().expect("no outstanding name request");
        let mut bus = self.bus.lock().unwrap();
        match bus.names.get(&ownership.name) {
            Some(owner) if *owner != id => {
                (ownership.on_name_lost)(format!("{} is already owned", ownership.name));
                false
            }
            _ => {
                bus.names.insert(ownership.name.clone(), id);
                (ownership.on_name_acquired)(ownership.name.clone());
                true
            }
        }
    }

    pub fn revoke_name(&mut self, reason: &str) {
        let ownership = self.latest_ownership();
        (ownership.on_name_lost)(reason.to_owned());
    }

    pub fn pending_exports(&self) -> usize {
        self.pending_exports.len()
    }

    pub fn complete_exports(&mut self) {
        for on_done in self.pending_exports.drain(..) {
            on_done(Ok(()));
        }
    }

    pub fn fail_exports(&mut self) {
        for on_done in self.pending_exports.drain(..) {
            on_done(Err(Error::Export { path: "/".to_owned(), reason: "refused".to_owned() }));
        }
    }

    pub fn pending_subscriptions(&self) -> usize {
        self.pending_subscriptions.len()
    }

    pub fn complete_subscriptions(&mut self) {
        for on_ready in self.pending_subscriptions.drain(..) {
            on_ready(Ok(()));
        }
    }

    pub fn fail_subscriptions(&mut self) {
        for on_ready in self.pending_subscriptions.drain(..) {
            on_ready(Err(Error::Bus(zbus::Error::Failure("match rule rejected".to_owned()))));
        }
    }

    pub fn deliver_signal(&self, signal_name: &str, payload: &str) {
        for (name, callback) in self.subscriptions.values() {
            if name == signal_name {
                callback(payload.to_owned());
            }
        }
    }

    pub fn owned_names(&self) -> Vec<String> {
        self.ownerships.values().map(|o| o.name.clone()).collect()
    }

    pub fn granted_names(&self) -> Vec<String> {
        self.bus.lock().unwrap().names.keys().cloned().collect()
    }

    pub fn exported_paths(&self) -> Vec<String> {
        self.bound_paths.iter().map(|(_, path)| path.clone()).collect()
    }

    pub fn active_subscriptions(&self) -> Vec<u64> {
        self.subscriptions.keys().copied().collect()
    }

    pub fn emitted(&self) -> Vec<String> {
        self.emitted.clone()
    }
}

impl BusBackend for FakeBackend {
    type Connection = FakeConnection;
    type Ownership = u64;
    type Subscription = u64;

    fn connect(&mut self, on_ready: ConnectCallback<FakeConnection>) {
        self.calls.push("connect");
        self.pending_connects.push(on_ready);
    }

    fn own_name(&mut self, connection: &FakeConnection, name: &str, hooks: NameOwnerHooks<FakeConnection>) -> u64 {
        self.calls.push("own_name");
        let id = self.next_id();
        let ownership = Ownership {
            connection: connection.clone(),
            name: name.to_owned(),
            on_bus_acquired: Some(hooks.on_bus_acquired),
            on_name_acquired: hooks.on_name_acquired,
            on_name_lost: hooks.on_name_lost,
        };
        self.ownerships.insert(id, ownership);
        id
    }

    fn unown_name(&mut self, id: u64) -> Result<()> {
        self.record("unown_name")?;
        if let Some(ownership) = self.ownerships.remove(&id) {
            let mut bus = self.bus.lock().unwrap();
            if bus.names.get(&ownership.name) == Some(&id) {
                bus.names.remove(&ownership.name);
            }
        }
        if let Err(err) = self.outcome("unown_name") {
            self.unsettled_errors.push(err);
        }
        Ok(())
    }

    fn export(&mut self, connection: &FakeConnection, object_path: &str, _object: Arc<ServiceObject>, on_done: DoneCallback) {
        self.calls.push("export");
        if !self.bound_paths.insert((connection.id, object_path.to_owned())) {
            on_done(Err(Error::Export { path: object_path.to_owned(), reason: "path already bound".to_owned() }));
            return;
        }
        self.pending_exports.push(on_done);
    }

    fn unexport(&mut self, connection: &FakeConnection, object_path: &str) -> Result<()> {
        self.record("unexport")?;
        self.bound_paths.remove(&(connection.id, object_path.to_owned()));
        if let Err(err) = self.outcome("unexport") {
            self.unsettled_errors.push(err);
        }
        Ok(())
    }

    fn emit_signal(&mut self, _connection: &FakeConnection, _identity: &BusIdentity, payload: String, on_done: DoneCallback) -> Result<()> {
        self.record("emit_signal")?;
        self.emitted.push(payload);
        on_done(self.outcome("emit_signal"));
        Ok(())
    }

    fn subscribe(
        &mut self,
        _connection: &FakeConnection,
        _identity: &BusIdentity,
        signal_name: &str,
        callback: SignalCallback,
        on_ready: DoneCallback,
    ) -> Result<u64> {
        self.record("subscribe")?;
        let id = self.next_id();
        self.subscriptions.insert(id, (signal_name.to_owned(), callback));
        self.pending_subscriptions.push(on_ready);
        Ok(id)
    }

    fn unsubscribe(&mut self, _connection: &FakeConnection, subscription: u64) -> Result<()> {
        self.record("unsubscribe")?;
        self.subscriptions.remove(&subscription);
        Ok(())
    }

    fn settle(&mut self) -> BoxFuture<'static, Vec<Error>> {
        Box::pin(futures::future::ready(std::mem::take(&mut self.unsettled_errors)))
    }
}

/// Remembers everything it was told.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub connected: usize,
    pub names_lost: Vec<String>,
    pub events: Vec<crate::KeyActionEvent>,
    pub errors: Vec<String>,
}

impl crate::Presenter for RecordingPresenter {
    fn on_connected(&mut self) {
        self.connected += 1;
    }

    fn on_name_lost(&mut self, reason: &str) {
        self.names_lost.push(reason.to_owned());
    }

    fn on_event(&mut self, event: &crate::KeyActionEvent) {
        self.events.push(event.clone());
    }

    fn on_error(&mut self, err: &Error) {
        self.errors.push(err.to_string());
    }
}
