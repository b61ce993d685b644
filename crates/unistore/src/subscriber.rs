//! Subscriber contract
//!
//! Subscribers are shared objects (`Arc`) so the store can compare them by
//! identity and hold them weakly. A subscriber that is dropped is treated as
//! unsubscribed.

use std::sync::Arc;

/// Receives state updates from a [`Store`](crate::Store)
///
/// `new_state` is called once when subscribing (with the current, possibly
/// selected, state) and then once for every qualifying state change.
pub trait StoreSubscriber<T>: Send + Sync {
    fn new_state(&self, state: T);
}

/// Subscriber backed by a closure
///
/// ```rust
/// # use unistore::{BlockSubscriber, StoreSubscriber};
/// let subscriber = BlockSubscriber::new(|value: i32| println!("value: {value}"));
/// subscriber.new_state(3);
/// ```
pub struct BlockSubscriber<T> {
    block: Box<dyn Fn(T) + Send + Sync>,
}

impl<T> BlockSubscriber<T> {
    /// Create a subscriber ready to be passed to `subscribe`
    pub fn new(block: impl Fn(T) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            block: Box::new(block),
        })
    }
}

impl<T> StoreSubscriber<T> for BlockSubscriber<T> {
    fn new_state(&self, state: T) {
        (self.block)(state)
    }
}

/// Identity of a subscriber: the address of its shared allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SubscriberId(usize);

impl SubscriberId {
    pub(crate) fn of<T: ?Sized>(subscriber: &Arc<T>) -> Self {
        Self(Arc::as_ptr(subscriber).cast::<()>() as usize)
    }
}
