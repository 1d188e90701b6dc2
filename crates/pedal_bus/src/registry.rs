use std::collections::HashMap;

use crate::{
    backend::{BusBackend, DoneCallback, SignalCallback},
    error::{Error, Result},
    names::BusIdentity,
};

#[derive(Debug)]
struct Entry<B: BusBackend> {
    connection: B::Connection,
    handle: B::Subscription,
}

/// Active signal subscriptions, at most one per signal name.
///
/// Handles are owned here and consumed on unsubscribe, so a handle can never be used after it
/// was invalidated.
#[derive(Debug)]
pub struct SubscriptionRegistry<B: BusBackend> {
    entries: HashMap<String, Entry<B>>,
}

impl<B: BusBackend> Default for SubscriptionRegistry<B> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<B: BusBackend> SubscriptionRegistry<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `signal_name`. An existing subscription for the same name is removed first,
    /// so a signal is never delivered to two callbacks. Whether the bus accepted the
    /// subscription is reported through `on_ready`.
    pub fn subscribe(
        &mut self,
        backend: &mut B,
        connection: &B::Connection,
        identity: &BusIdentity,
        signal_name: &str,
        callback: SignalCallback,
        on_ready: DoneCallback,
    ) -> Result<&B::Subscription> {
        if self.entries.contains_key(signal_name) {
            log::debug!("replacing existing subscription to {}", signal_name);
            self.unsubscribe(backend, signal_name)?;
        }
        let handle = backend.subscribe(connection, identity, signal_name, callback, on_ready)?;
        log::debug!("subscribed to {}: {:?}", signal_name, handle);
        let entry = self.entries.entry(signal_name.to_owned()).or_insert(Entry { connection: connection.clone(), handle });
        Ok(&entry.handle)
    }

    /// Remove the subscription for `signal_name`, if there is one.
    pub fn unsubscribe(&mut self, backend: &mut B, signal_name: &str) -> Result<()> {
        match self.entries.remove(signal_name) {
            Some(Entry { connection, handle }) => {
                log::debug!("unsubscribing from {}: {:?}", signal_name, handle);
                backend.unsubscribe(&connection, handle)
            }
            None => Ok(()),
        }
    }

    pub fn lookup(&self, signal_name: &str) -> Option<&B::Subscription> {
        self.entries.get(signal_name).map(|entry| &entry.handle)
    }

    /// Remove every subscription. Failures are collected; all entries are removed regardless.
    pub fn clear(&mut self, backend: &mut B) -> Vec<Error> {
        self.entries
            .drain()
            .filter_map(|(_, Entry { connection, handle })| backend.unsubscribe(&connection, handle).err())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::FakeBackend;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_resubscribe_replaces_handle() {
        let mut backend = FakeBackend::default();
        let connection = backend.new_connection();
        let identity = BusIdentity::default();
        let mut registry = SubscriptionRegistry::<FakeBackend>::new();

        let first = *registry.subscribe(&mut backend, &connection, &identity, "Sig", Box::new(|_| {}), Box::new(|_| {})).unwrap();
        let second = *registry.subscribe(&mut backend, &connection, &identity, "Sig", Box::new(|_| {}), Box::new(|_| {})).unwrap();

        assert_ne!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("Sig"), Some(&second));
        assert_eq!(backend.active_subscriptions(), vec![second]);
    }

    #[test]
    fn test_only_latest_callback_receives() {
        let mut backend = FakeBackend::default();
        let connection = backend.new_connection();
        let identity = BusIdentity::default();
        let mut registry = SubscriptionRegistry::<FakeBackend>::new();

        let (tx, rx) = std::sync::mpsc::channel();
        let old_tx = tx.clone();
        registry.subscribe(&mut backend, &connection, &identity, "Sig", Box::new(move |p| old_tx.send(("old", p)).unwrap()), Box::new(|_| {})).unwrap();
        registry.subscribe(&mut backend, &connection, &identity, "Sig", Box::new(move |p| tx.send(("new", p)).unwrap()), Box::new(|_| {})).unwrap();

        backend.deliver_signal("Sig", "payload");
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![("new", "payload".to_owned())]);
    }

    #[test]
    fn test_rejected_subscription_is_reported() {
        let mut backend = FakeBackend::default();
        let connection = backend.new_connection();
        let identity = BusIdentity::default();
        let mut registry = SubscriptionRegistry::<FakeBackend>::new();

        let (tx, rx) = std::sync::mpsc::channel();
        registry
            .subscribe(&mut backend, &connection, &identity, "Sig", Box::new(|_| {}), Box::new(move |result| tx.send(result.is_ok()).unwrap()))
            .unwrap();
        assert_eq!(rx.try_recv(), Err(std::sync::mpsc::TryRecvError::Empty));

        backend.fail_subscriptions();
        assert_eq!(rx.try_recv(), Ok(false));
    }

    #[test]
    fn test_unsubscribe_absent_is_noop() {
        let mut backend = FakeBackend::default();
        let mut registry = SubscriptionRegistry::<FakeBackend>::new();
        registry.unsubscribe(&mut backend, "Sig").unwrap();
        assert_eq!(registry.lookup("Sig"), None);
        assert_eq!(backend.calls_to("unsubscribe"), 0);
    }

    #[test]
    fn test_clear_collects_failures() {
        let mut backend = FakeBackend::default();
        let connection = backend.new_connection();
        let identity = BusIdentity::default();
        let mut registry = SubscriptionRegistry::<FakeBackend>::new();
        registry.subscribe(&mut backend, &connection, &identity, "A", Box::new(|_| {}), Box::new(|_| {})).unwrap();
        registry.subscribe(&mut backend, &connection, &identity, "B", Box::new(|_| {}), Box::new(|_| {})).unwrap();

        backend.fail_next("unsubscribe");
        let errors = registry.clear(&mut backend);
        assert_eq!(errors.len(), 1);
        assert!(registry.is_empty());
        assert_eq!(backend.calls_to("unsubscribe"), 2);
    }
}
