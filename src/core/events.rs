//! Observer channels
//!
//! Two flavours share the same subscriber bookkeeping: [`EventChannel`]
//! delivers synchronously, [`AsyncEventChannel`] awaits each subscriber in
//! subscription order. Both support weak subscribers that drop out once their
//! target is no longer reachable.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use futures::future::{BoxFuture, FutureExt};

use super::item::Item;

/// Handle returned by `subscribe*`, used to unsubscribe explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Raised after a unit became active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationEventArgs {
    /// True when this activation also performed first-time initialization
    pub was_initialized: bool,
}

/// Raised around a deactivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeactivationEventArgs {
    pub was_closed: bool,
}

/// Raised by a conductor once an `activate_item` request has been decided.
#[derive(Debug, Clone)]
pub struct ActivationProcessedEventArgs {
    pub item: Option<Item>,
    pub success: bool,
}

/// Raised when an observable field changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyChanged {
    pub property: &'static str,
}

// A handler returns false once its weak target is gone.
type SyncHandler<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type AsyncHandler<E> = Arc<dyn Fn(E) -> BoxFuture<'static, bool> + Send + Sync>;

struct Subscribers<H> {
    next_id: u64,
    entries: Vec<(SubscriptionId, H)>,
}

impl<H: Clone> Subscribers<H> {
    fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    fn add(&mut self, handler: H) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, handler));
        id
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        before != self.entries.len()
    }

    fn snapshot(&self) -> Vec<(SubscriptionId, H)> {
        self.entries.clone()
    }

    fn prune(&mut self, dead: &[SubscriptionId]) {
        if !dead.is_empty() {
            self.entries.retain(|(id, _)| !dead.contains(id));
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Synchronous multicast channel.
pub struct EventChannel<E> {
    subscribers: Mutex<Subscribers<SyncHandler<E>>>,
}

impl<E: 'static> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: 'static> EventChannel<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Subscribers::new()),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        lock(&self.subscribers).add(Arc::new(move |event: &E| {
            handler(event);
            true
        }))
    }

    /// Subscribe on behalf of `target` without keeping it alive.
    pub fn subscribe_weak<T, F>(&self, target: &Arc<T>, handler: F) -> SubscriptionId
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &E) + Send + Sync + 'static,
    {
        let target: Weak<T> = Arc::downgrade(target);
        lock(&self.subscribers).add(Arc::new(move |event: &E| match target.upgrade() {
            Some(target) => {
                handler(&target, event);
                true
            }
            None => false,
        }))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.subscribers).remove(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.subscribers).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every subscriber, in subscription order.
    ///
    /// Handlers run without the subscriber list locked, so they may subscribe
    /// or unsubscribe re-entrantly.
    pub fn emit(&self, event: &E) {
        let handlers = lock(&self.subscribers).snapshot();
        let dead: Vec<SubscriptionId> = handlers
            .into_iter()
            .filter_map(|(id, handler)| (!handler(event)).then_some(id))
            .collect();
        lock(&self.subscribers).prune(&dead);
    }
}

/// Multicast channel whose subscribers are awaited one after another.
pub struct AsyncEventChannel<E> {
    subscribers: Mutex<Subscribers<AsyncHandler<E>>>,
}

impl<E> Default for AsyncEventChannel<E>
where
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> AsyncEventChannel<E>
where
    E: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Subscribers::new()),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        lock(&self.subscribers).add(Arc::new(move |event: E| {
            handler(&event);
            futures::future::ready(true).boxed()
        }))
    }

    pub fn subscribe_async<F, Fut>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        lock(&self.subscribers).add(Arc::new(move |event: E| {
            handler(event).map(|_| true).boxed()
        }))
    }

    /// Async subscription on behalf of `target` without keeping it alive.
    pub fn subscribe_weak<T, F, Fut>(&self, target: &Arc<T>, handler: F) -> SubscriptionId
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let target: Weak<T> = Arc::downgrade(target);
        lock(&self.subscribers).add(Arc::new(move |event: E| match target.upgrade() {
            Some(target) => handler(target, event).map(|_| true).boxed(),
            None => futures::future::ready(false).boxed(),
        }))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.subscribers).remove(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.subscribers).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn emit(&self, event: E) {
        let handlers = lock(&self.subscribers).snapshot();
        let mut dead = Vec::new();
        for (id, handler) in handlers {
            if !handler(event.clone()).await {
                dead.push(id);
            }
        }
        lock(&self.subscribers).prune(&dead);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_sync_subscribers_run_in_order() {
        let channel = EventChannel::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        channel.subscribe(move |value| first.lock().unwrap().push(("first", *value)));
        let second = seen.clone();
        channel.subscribe(move |value| second.lock().unwrap().push(("second", *value)));

        channel.emit(&7);
        assert_eq!(*seen.lock().unwrap(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_unsubscribe() {
        let channel = EventChannel::<()>::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = channel.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.emit(&());
        assert!(channel.unsubscribe(id));
        assert!(!channel.unsubscribe(id));
        channel.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(channel.is_empty());
    }

    #[test]
    fn test_weak_subscriber_drops_out() {
        let channel = EventChannel::<u32>::new();
        let target = Arc::new(AtomicUsize::new(0));
        channel.subscribe_weak(&target, |target, value| {
            target.fetch_add(*value as usize, Ordering::SeqCst);
        });

        channel.emit(&3);
        assert_eq!(target.load(Ordering::SeqCst), 3);
        assert_eq!(channel.len(), 1);

        drop(target);
        channel.emit(&3);
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn test_async_subscribers_are_awaited_in_order() {
        let channel = AsyncEventChannel::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let slow = seen.clone();
        channel.subscribe_async(move |value| {
            let slow = slow.clone();
            async move {
                tokio::task::yield_now().await;
                slow.lock().unwrap().push(value);
            }
        });
        let fast = seen.clone();
        channel.subscribe(move |value| fast.lock().unwrap().push(value + 100));

        channel.emit(1).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 101]);
    }

    #[tokio::test]
    async fn test_async_weak_subscriber_drops_out() {
        let channel = AsyncEventChannel::<usize>::new();
        let target = Arc::new(AtomicUsize::new(0));
        channel.subscribe_weak(&target, |target, value| async move {
            target.fetch_add(value, Ordering::SeqCst);
        });

        channel.emit(2).await;
        assert_eq!(target.load(Ordering::SeqCst), 2);

        drop(target);
        channel.emit(2).await;
        assert!(channel.is_empty());
    }
}
