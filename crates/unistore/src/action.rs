//! Action types shared by the store and middleware
//!
//! The store is generic over its action type, usually an enum owned by the
//! application. This module only holds the pieces the store itself needs:
//! the init marker and the value returned from a dispatch.

use std::any::Any;
use std::fmt;

/// Marker dispatched by [`Store::initialized`](crate::Store::initialized)
/// right after construction.
///
/// Application action enums opt in with `impl From<StoreInit> for Action`
/// so reducers can set up their initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreInit;

/// Result of dispatching an action through the middleware chain
///
/// By default a dispatch hands the action back once the reducer ran.
/// Middleware can stop an action or substitute an entirely different return
/// value (e.g. a request id).
pub enum Dispatched<A> {
    /// The action reached the reducer and the new state was committed
    Reduced(A),
    /// A middleware consumed the action before it reached the reducer
    Swallowed,
    /// A middleware replaced the return value of the dispatch
    Replaced(Box<dyn Any + Send>),
}

impl<A> Dispatched<A> {
    /// Wrap an arbitrary value as the result of a dispatch
    pub fn replaced<T: Any + Send>(value: T) -> Self {
        Self::Replaced(Box::new(value))
    }

    /// The reduced action, if the action made it to the reducer
    pub fn action(&self) -> Option<&A> {
        match self {
            Self::Reduced(action) => Some(action),
            _ => None,
        }
    }

    /// Consume the result, returning the reduced action if there is one
    pub fn into_action(self) -> Option<A> {
        match self {
            Self::Reduced(action) => Some(action),
            _ => None,
        }
    }

    /// The replacement value, if a middleware substituted one of type `T`
    pub fn replacement<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Replaced(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_reduced(&self) -> bool {
        matches!(self, Self::Reduced(_))
    }

    pub fn is_swallowed(&self) -> bool {
        matches!(self, Self::Swallowed)
    }
}

impl<A: fmt::Debug> fmt::Debug for Dispatched<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reduced(action) => f.debug_tuple("Reduced").field(action).finish(),
            Self::Swallowed => f.write_str("Swallowed"),
            Self::Replaced(_) => f.write_str("Replaced(..)"),
        }
    }
}
