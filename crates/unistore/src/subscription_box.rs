//! Registered subscriptions
//!
//! A `SubscriptionBox` binds one subscriber (held weakly) to one pipeline.
//! The selected type is erased behind closures so that boxes for different
//! selections can share a registry.

use std::sync::Arc;

use crate::subscriber::{StoreSubscriber, SubscriberId};
use crate::subscription::{OperatorSignature, Subscription};

/// Outcome of offering a state change to a box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    Skipped,
    /// The subscriber has been dropped
    Released,
}

type NotifyFn<S> = Box<dyn Fn(&S, &S) -> Delivery + Send + Sync>;
type InitialFn<S> = Box<dyn Fn(&S) -> Delivery + Send + Sync>;
type AliveFn = Box<dyn Fn() -> bool + Send + Sync>;

pub(crate) struct SubscriptionBox<S> {
    subscriber_id: SubscriberId,
    token: u64,
    since: u64,
    signature: Vec<OperatorSignature>,
    notify: NotifyFn<S>,
    initial: InitialFn<S>,
    is_alive: AliveFn,
}

impl<S: 'static> SubscriptionBox<S> {
    /// `since` is the change sequence number the box was registered at; it
    /// only receives changes committed after that.
    pub(crate) fn new<T, Sub>(
        subscriber: &Arc<Sub>,
        subscription: Subscription<S, T>,
        token: u64,
        since: u64,
    ) -> Self
    where
        T: Clone + 'static,
        Sub: StoreSubscriber<T> + ?Sized + 'static,
    {
        let signature = subscription.signature();
        let subscription = Arc::new(subscription);
        let weak = Arc::downgrade(subscriber);

        let notify: NotifyFn<S> = {
            let weak = weak.clone();
            let subscription = Arc::clone(&subscription);
            Box::new(move |old: &S, new: &S| {
                let Some(subscriber) = weak.upgrade() else {
                    return Delivery::Released;
                };
                match subscription.evaluate(old, new) {
                    Some(value) => {
                        subscriber.new_state(value);
                        Delivery::Delivered
                    }
                    None => Delivery::Skipped,
                }
            })
        };

        let initial: InitialFn<S> = {
            let weak = weak.clone();
            Box::new(move |state: &S| {
                let Some(subscriber) = weak.upgrade() else {
                    return Delivery::Released;
                };
                match subscription.current(state) {
                    Some(value) => {
                        subscriber.new_state(value);
                        Delivery::Delivered
                    }
                    None => Delivery::Skipped,
                }
            })
        };

        let is_alive: AliveFn = Box::new(move || weak.strong_count() > 0);

        Self {
            subscriber_id: SubscriberId::of(subscriber),
            token,
            since,
            signature,
            notify,
            initial,
            is_alive,
        }
    }
}

impl<S> SubscriptionBox<S> {
    pub(crate) fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    pub(crate) fn token(&self) -> u64 {
        self.token
    }

    /// Whether the box should see the change with sequence number `change`
    pub(crate) fn observes(&self, change: u64) -> bool {
        self.since < change
    }

    pub(crate) fn is_alive(&self) -> bool {
        (self.is_alive)()
    }

    /// Same subscriber with a structurally identical pipeline
    pub(crate) fn is_equivalent(&self, other: &Self) -> bool {
        self.subscriber_id == other.subscriber_id && self.signature == other.signature
    }

    pub(crate) fn notify(&self, old: &S, new: &S) -> Delivery {
        (self.notify)(old, new)
    }

    pub(crate) fn deliver_initial(&self, state: &S) -> Delivery {
        (self.initial)(state)
    }
}
