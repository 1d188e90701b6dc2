//! The enable/disable state machine.
//!
//! All bus callbacks are turned into [`BusEvent`]s and queued on one channel; whoever owns the
//! [`Coordinator`] feeds them back in through [`Coordinator::handle_event`]. Since only that one
//! loop ever touches the coordinator, transitions never interleave. What can still happen is that
//! callbacks arrive in an unexpected order, or after the coordinator was disabled:
//!
//! - Export always happens before subscribe. A name grant that arrives while the export is still
//!   in flight only marks the subscription as pending; it is made once the export completes.
//! - Every event carries the [`Cycle`] it was issued in. Disabling starts a new cycle, so late
//!   callbacks of an abandoned enable are recognised and discarded.

use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::{
    backend::{BusBackend, NameOwnerHooks},
    codec::{self, KeyActionEvent},
    endpoint::{ServiceEndpoint, ServiceObject},
    error::{Error, Result},
    names::BusIdentity,
    registry::SubscriptionRegistry,
    session::SessionHandle,
};

/// Identifies one enable/disable cycle.
pub type Cycle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Connecting,
    Connected,
    /// The name has been requested and the object is being exported.
    NameOwning,
    /// The object is exported; signals can be emitted.
    Exported,
    /// Exported, and the bus confirmed the subscription to the pedal signal.
    SubscriptionActive,
    TearingDown,
}

/// A callback from the bus layer, tagged with the cycle that caused it.
#[derive(Debug)]
pub enum BusEvent<C> {
    Connected { cycle: Cycle, result: Result<C> },
    BusAcquired { cycle: Cycle, connection: C },
    Exported { cycle: Cycle, connection: C, result: Result<()> },
    NameAcquired { cycle: Cycle, name: String },
    NameLost { cycle: Cycle, reason: String },
    Subscribed { cycle: Cycle, signal_name: String, result: Result<()> },
    Signal { cycle: Cycle, signal_name: String, payload: String },
    Emitted { cycle: Cycle, result: Result<()> },
}

impl<C> BusEvent<C> {
    pub fn cycle(&self) -> Cycle {
        match self {
            BusEvent::Connected { cycle, .. }
            | BusEvent::BusAcquired { cycle, .. }
            | BusEvent::Exported { cycle, .. }
            | BusEvent::NameAcquired { cycle, .. }
            | BusEvent::NameLost { cycle, .. }
            | BusEvent::Subscribed { cycle, .. }
            | BusEvent::Signal { cycle, .. }
            | BusEvent::Emitted { cycle, .. } => *cycle,
        }
    }
}

pub type EventSender<C> = UnboundedSender<BusEvent<C>>;
pub type EventReceiver<C> = UnboundedReceiver<BusEvent<C>>;

/// Receives what the coordinator has to report. This is where the indicator is drawn.
pub trait Presenter {
    /// The service object is exported and signals can be sent.
    fn on_connected(&mut self);
    fn on_name_lost(&mut self, reason: &str);
    fn on_event(&mut self, event: &KeyActionEvent);
    /// Errors that have no caller to be returned to, e.g. a malformed inbound payload.
    fn on_error(&mut self, err: &Error) {
        log::error!("{}", err);
    }
}

/// Snapshot of what the current cycle holds on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointState<C> {
    pub connection: Option<C>,
    pub owned_name: bool,
    pub exported: bool,
}

pub struct Coordinator<B: BusBackend, P: Presenter> {
    identity: BusIdentity,
    backend: B,
    presenter: P,
    state: LifecycleState,
    cycle: Cycle,
    session: SessionHandle<B>,
    endpoint: ServiceEndpoint<B>,
    registry: SubscriptionRegistry<B>,
    /// The name was granted before the export completed.
    subscribe_pending: bool,
    events: EventSender<B::Connection>,
}

impl<B: BusBackend, P: Presenter> Coordinator<B, P> {
    /// Create an idle coordinator. Every event arriving on the returned receiver has to be passed
    /// to [`Coordinator::handle_event`].
    pub fn new(identity: BusIdentity, backend: B, presenter: P) -> (Self, EventReceiver<B::Connection>) {
        let (events, events_recv) = tokio::sync::mpsc::unbounded_channel();
        let object = Arc::new(ServiceObject::new());
        let coordinator = Self {
            identity,
            backend,
            presenter,
            state: LifecycleState::Idle,
            cycle: 0,
            session: SessionHandle::new(),
            endpoint: ServiceEndpoint::new(object),
            registry: SubscriptionRegistry::new(),
            subscribe_pending: false,
            events,
        };
        (coordinator, events_recv)
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn identity(&self) -> &BusIdentity {
        &self.identity
    }

    pub fn endpoint_state(&self) -> EndpointState<B::Connection> {
        EndpointState {
            connection: self.session.connection().cloned(),
            owned_name: self.session.owns_name(),
            exported: self.endpoint.is_exported(),
        }
    }

    pub fn subscription(&self) -> Option<&B::Subscription> {
        self.registry.lookup(self.identity.signal_name())
    }

    pub fn service_object(&self) -> &Arc<ServiceObject> {
        self.endpoint.object()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Begin acquiring the bus. Returns as soon as the connection has been requested; progress is
    /// reported to the presenter.
    pub fn enable(&mut self) -> Result<()> {
        if self.state != LifecycleState::Idle {
            return Err(Error::AlreadyEnabled(self.state));
        }
        log::info!("enabling {} at {}", self.identity.service_name(), self.identity.object_path());

        let cycle = self.cycle;
        let events = self.events.clone();
        self.state = LifecycleState::Connecting;
        let result = self.session.connect(
            &mut self.backend,
            Box::new(move |result| {
                let _ = events.send(BusEvent::Connected { cycle, result });
            }),
        );
        if let Err(err) = result {
            self.teardown();
            return Err(err);
        }
        Ok(())
    }

    /// Tear down everything the current cycle acquired and return to [`LifecycleState::Idle`].
    ///
    /// Safe to call in any state, including while [`Coordinator::enable`] is still in progress.
    /// Every step is attempted even if an earlier one fails; failures are returned together as
    /// [`Error::Teardown`]. Name release and object removal finish in the background, see
    /// [`Coordinator::disable_and_wait`].
    pub fn disable(&mut self) -> Result<()> {
        log::info!("disabling {} (was {:?})", self.identity.service_name(), self.state);
        let errors = self.teardown();
        Self::teardown_result(errors)
    }

    /// Like [`Coordinator::disable`], but also waits until the bus has answered every release and
    /// removal started so far. Failures the bus reports are part of [`Error::Teardown`].
    pub async fn disable_and_wait(&mut self) -> Result<()> {
        log::info!("disabling {} (was {:?})", self.identity.service_name(), self.state);
        let mut errors = self.teardown();
        errors.extend(self.backend.settle().await);
        Self::teardown_result(errors)
    }

    fn teardown_result(errors: Vec<Error>) -> Result<()> {
        if errors.is_empty() {
            return Ok(());
        }
        for err in &errors {
            log::warn!("teardown step failed: {}", err);
        }
        Err(Error::Teardown(errors))
    }

    /// Emit `event` as the pedal signal. If the bus later refuses it, the presenter is told
    /// through [`Presenter::on_error`].
    pub fn send(&mut self, event: &KeyActionEvent) -> Result<()> {
        match self.state {
            LifecycleState::Exported | LifecycleState::SubscriptionActive => {}
            state => return Err(Error::NotReady(state)),
        }
        let payload = codec::encode(event);
        let cycle = self.cycle;
        let events = self.events.clone();
        let on_done = Box::new(move |result: Result<()>| {
            let _ = events.send(BusEvent::Emitted { cycle, result });
        });
        self.endpoint.emit_signal(&mut self.backend, &self.identity, payload, on_done)
    }

    pub fn handle_event(&mut self, event: BusEvent<B::Connection>) {
        if event.cycle() != self.cycle {
            self.discard_stale(event);
            return;
        }
        match event {
            BusEvent::Connected { result: Ok(connection), .. } => self.on_connected(connection),
            BusEvent::Connected { result: Err(err), .. } => self.fail_enable(err),
            BusEvent::BusAcquired { connection, .. } => self.on_bus_acquired(connection),
            BusEvent::Exported { result, .. } => self.on_exported(result),
            BusEvent::NameAcquired { name, .. } => self.on_name_acquired(name),
            BusEvent::NameLost { reason, .. } => self.on_name_lost(reason),
            BusEvent::Subscribed { signal_name, result, .. } => self.on_subscribed(signal_name, result),
            BusEvent::Signal { signal_name, payload, .. } => self.on_signal(signal_name, payload),
            BusEvent::Emitted { result: Ok(()), .. } => {}
            BusEvent::Emitted { result: Err(err), .. } => {
                log::error!("failed to emit {}: {}", self.identity.signal_name(), err);
                self.presenter.on_error(&err);
            }
        }
    }

    fn discard_stale(&mut self, event: BusEvent<B::Connection>) {
        match event {
            // the object landed on a connection we no longer care about
            BusEvent::Exported { connection, result: Ok(()), cycle } => {
                log::debug!("removing object exported by abandoned cycle {}", cycle);
                if let Err(err) = self.backend.unexport(&connection, self.identity.object_path()) {
                    log::warn!("failed to remove stale export: {}", err);
                }
            }
            event => log::debug!("ignoring event from abandoned cycle {}: {:?}", event.cycle(), event),
        }
    }

    fn on_connected(&mut self, connection: B::Connection) {
        if self.state != LifecycleState::Connecting {
            log::warn!("unexpected connection while {:?}", self.state);
            return;
        }
        log::debug!("connected to bus: {:?}", connection);
        if let Err(err) = self.session.attach(connection) {
            self.fail_enable(err);
            return;
        }
        self.state = LifecycleState::Connected;

        let hooks = self.name_owner_hooks();
        match self.session.own_name(&mut self.backend, &self.identity, hooks) {
            Ok(()) => self.state = LifecycleState::NameOwning,
            Err(err) => self.fail_enable(err),
        }
    }

    fn name_owner_hooks(&self) -> NameOwnerHooks<B::Connection> {
        let cycle = self.cycle;
        let (acquired, granted, lost) = (self.events.clone(), self.events.clone(), self.events.clone());
        NameOwnerHooks {
            on_bus_acquired: Box::new(move |connection| {
                let _ = acquired.send(BusEvent::BusAcquired { cycle, connection });
            }),
            on_name_acquired: Box::new(move |name| {
                let _ = granted.send(BusEvent::NameAcquired { cycle, name });
            }),
            on_name_lost: Box::new(move |reason| {
                let _ = lost.send(BusEvent::NameLost { cycle, reason });
            }),
        }
    }

    fn on_bus_acquired(&mut self, connection: B::Connection) {
        if self.endpoint.is_exporting() || self.endpoint.is_exported() {
            log::debug!("bus acquired again, object already exported");
            return;
        }
        let cycle = self.cycle;
        let events = self.events.clone();
        let exported_on = connection.clone();
        let result = self.endpoint.export(
            &mut self.backend,
            &connection,
            self.identity.object_path(),
            Box::new(move |result: Result<()>| {
                let _ = events.send(BusEvent::Exported { cycle, connection: exported_on, result });
            }),
        );
        if let Err(err) = result {
            self.fail_enable(err);
        }
    }

    fn on_exported(&mut self, result: Result<()>) {
        if let Err(err) = self.endpoint.finish_export(result) {
            self.fail_enable(err);
            return;
        }
        log::info!("exported object at {}", self.identity.object_path());
        self.state = LifecycleState::Exported;
        self.presenter.on_connected();

        if self.subscribe_pending {
            self.subscribe();
        }
    }

    fn on_name_acquired(&mut self, name: String) {
        log::info!("acquired bus name {}", name);
        self.session.mark_name_acquired();
        if self.endpoint.is_exported() {
            self.subscribe();
        } else {
            log::debug!("export still in progress, subscribing once it completes");
            self.subscribe_pending = true;
        }
    }

    fn on_name_lost(&mut self, reason: String) {
        log::warn!("lost bus name {}: {}", self.identity.service_name(), reason);
        self.session.mark_name_lost();
        // the grant a pending subscribe was waiting for is gone
        self.subscribe_pending = false;
        self.presenter.on_name_lost(&reason);
        self.presenter.on_error(&Error::NameOwnership(reason));
    }

    fn subscribe(&mut self) {
        self.subscribe_pending = false;
        let Some(connection) = self.session.connection().cloned() else {
            self.presenter.on_error(&Error::NotConnected);
            return;
        };

        let cycle = self.cycle;
        let events = self.events.clone();
        let signal_name = self.identity.signal_name().to_owned();
        let callback = {
            let events = events.clone();
            let signal_name = signal_name.clone();
            Box::new(move |payload: String| {
                let _ = events.send(BusEvent::Signal { cycle, signal_name: signal_name.clone(), payload });
            })
        };
        let on_ready = {
            let signal_name = signal_name.clone();
            Box::new(move |result: Result<()>| {
                let _ = events.send(BusEvent::Subscribed { cycle, signal_name, result });
            })
        };

        match self.registry.subscribe(&mut self.backend, &connection, &self.identity, &signal_name, callback, on_ready) {
            Ok(_) => log::debug!("waiting for the bus to accept the subscription to {}", signal_name),
            Err(err) => self.presenter.on_error(&err),
        }
    }

    fn on_subscribed(&mut self, signal_name: String, result: Result<()>) {
        if self.registry.lookup(&signal_name).is_none() {
            log::debug!("ignoring confirmation of dropped subscription to {}", signal_name);
            return;
        }
        match result {
            Ok(()) => {
                log::info!("listening for {}", signal_name);
                self.state = LifecycleState::SubscriptionActive;
            }
            Err(err) => {
                log::error!("bus refused subscription to {}: {}", signal_name, err);
                if let Err(unsubscribe_err) = self.registry.unsubscribe(&mut self.backend, &signal_name) {
                    log::warn!("failed to drop refused subscription: {}", unsubscribe_err);
                }
                self.presenter.on_error(&err);
            }
        }
    }

    fn on_signal(&mut self, signal_name: String, payload: String) {
        if self.state != LifecycleState::SubscriptionActive || self.registry.lookup(&signal_name).is_none() {
            log::debug!("dropping {} received while {:?}", signal_name, self.state);
            return;
        }
        match codec::decode(&payload) {
            Ok(event) => self.presenter.on_event(&event),
            Err(err) => {
                log::warn!("dropping {} with payload {:?}: {}", signal_name, payload, err);
                self.presenter.on_error(&Error::Decode(err));
            }
        }
    }

    /// Abort the current enable attempt. `err` is reported together with anything that went
    /// wrong while cleaning up.
    fn fail_enable(&mut self, err: Error) {
        log::error!("failed to enable {}: {}", self.identity.service_name(), err);
        let teardown_errors = self.teardown();
        self.presenter.on_error(&err);
        if !teardown_errors.is_empty() {
            self.presenter.on_error(&Error::Teardown(teardown_errors));
        }
    }

    fn teardown(&mut self) -> Vec<Error> {
        self.state = LifecycleState::TearingDown;
        let mut errors = Vec::new();

        if let Err(err) = self.registry.unsubscribe(&mut self.backend, self.identity.signal_name()) {
            errors.push(err);
        }
        errors.extend(self.registry.clear(&mut self.backend));
        if let Err(err) = self.endpoint.unexport(&mut self.backend) {
            errors.push(err);
        }
        if let Err(err) = self.session.unown_name(&mut self.backend) {
            errors.push(err);
        }
        self.session.disconnect();

        self.session = SessionHandle::new();
        self.endpoint = ServiceEndpoint::new(self.endpoint.object().clone());
        self.registry = SubscriptionRegistry::new();
        self.subscribe_pending = false;
        self.cycle += 1;
        self.state = LifecycleState::Idle;
        errors
    }
}

impl<B: BusBackend, P: Presenter> Drop for Coordinator<B, P> {
    fn drop(&mut self) {
        if self.state != LifecycleState::Idle {
            if let Err(err) = self.disable() {
                log::error!("failed to disable on drop: {}", err);
            }
        }
    }
}
