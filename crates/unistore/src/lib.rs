//! # unistore
//!
//! A unidirectional-data-flow state container. A single [`Store`] holds an
//! immutable state snapshot, actions describe intended changes, reducers
//! compute the next state, middleware wraps the dispatch pipeline and
//! subscribers are notified whenever the state changes.
//!
//! ## Data flow
//!
//! ```text
//! dispatch(action) → Middleware chain → Reducer → new State → Subscribers
//! ```
//!
//! ## Subscriptions
//!
//! Subscribers can select a part of the state and decide which changes they
//! care about:
//!
//! ```rust,ignore
//! let subscriber = BlockSubscriber::new(|name: String| println!("name: {name}"));
//!
//! let handle = store.subscribe_with(&subscriber, |subscription| {
//!     subscription.select(|state: &AppState| state.name.clone())
//! });
//!
//! store.dispatch(Action::Rename("Ferris".into()));
//! handle.unsubscribe();
//! ```
//!
//! With `automatically_skip_repeats` enabled (the default), subscriptions
//! whose selected value implements `PartialEq` only fire when that value
//! actually changed.

pub mod action;
pub mod config;
pub mod error;
pub mod middleware;
pub mod reducer;
pub mod store;
pub mod subscriber;
pub mod subscription;

mod subscription_box;

// Re-export commonly used types
pub use action::{Dispatched, StoreInit};
pub use config::StoreConfig;
pub use error::ConfigError;
pub use middleware::{
    middleware_fn, DispatchFunction, FnMiddleware, GetState, LoggingMiddleware, Middleware,
    MiddlewareApi, Next,
};
pub use reducer::{CombinedReducer, Reducer};
pub use store::{AsyncCompletion, Store, StoreBuilder, SubscriptionGuard, SubscriptionHandle};
pub use subscriber::{BlockSubscriber, StoreSubscriber};
pub use subscription::{OperatorKind, Subscription};
