//! Subscription pipelines
//!
//! A [`Subscription`] describes how the root state of a store maps to the
//! value a subscriber receives, and which state changes are worth a
//! notification. It is an ordered list of operators:
//!
//! ```text
//! Select(name) → Skip(repeats) → Select(len) → Only(len > 3)
//! ```
//!
//! Operators are evaluated left to right for every state change. `Select`
//! maps the previous value (for both the old and the new state), `Skip`
//! stops the notification when its predicate holds and `Only` stops it
//! unless its predicate holds.
//!
//! The public builder is statically typed (`Subscription<S, T>` always
//! produces a `T`); the operator list itself is type-erased so that boxes
//! with different selected types can live in one registry.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Erased = Box<dyn Any>;
type SelectFn = Arc<dyn Fn(&dyn Any) -> Option<Erased> + Send + Sync>;
type PredicateFn = Arc<dyn Fn(&dyn Any, &dyn Any) -> Option<bool> + Send + Sync>;

/// Kind of an operator in a subscription pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    /// Maps the current value to a derived value
    Select,
    /// Suppresses the notification when the predicate holds
    Skip,
    /// Suppresses the notification unless the predicate holds
    Only,
}

/// Identifies the closure behind an operator
///
/// Non-capturing closures are zero-sized and fully described by their type,
/// so two operators built from the same closure expression compare equal.
/// Capturing closures may hold different data behind the same type and are
/// never considered equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ClosureKey {
    Static(TypeId),
    Unique(u64),
}

static NEXT_UNIQUE_KEY: AtomicU64 = AtomicU64::new(0);

impl ClosureKey {
    fn of<F: 'static>() -> Self {
        if std::mem::size_of::<F>() == 0 {
            Self::Static(TypeId::of::<F>())
        } else {
            Self::Unique(NEXT_UNIQUE_KEY.fetch_add(1, Ordering::Relaxed))
        }
    }

    fn fixed<M: 'static>() -> Self {
        Self::Static(TypeId::of::<M>())
    }
}

// Key markers
struct SkipRepeats<T>(PhantomData<T>);
struct SkipRepeatsByKey<F>(PhantomData<F>);

/// One step of a pipeline, paired with the key used for equivalence checks
pub(crate) type OperatorSignature = (OperatorKind, ClosureKey);

#[derive(Clone)]
enum Operator {
    Select { key: ClosureKey, select: SelectFn },
    Skip { key: ClosureKey, predicate: PredicateFn },
    Only { key: ClosureKey, predicate: PredicateFn },
}

impl Operator {
    fn kind(&self) -> OperatorKind {
        match self {
            Self::Select { .. } => OperatorKind::Select,
            Self::Skip { .. } => OperatorKind::Skip,
            Self::Only { .. } => OperatorKind::Only,
        }
    }

    fn signature(&self) -> OperatorSignature {
        match self {
            Self::Select { key, .. } | Self::Skip { key, .. } | Self::Only { key, .. } => {
                (self.kind(), *key)
            }
        }
    }
}

/// A value flowing through the pipeline: borrowed root state or an owned
/// selected value
enum Slot<'a> {
    Root(&'a dyn Any),
    Owned(Erased),
}

impl Slot<'_> {
    fn get(&self) -> &dyn Any {
        match self {
            Self::Root(value) => *value,
            Self::Owned(value) => &**value,
        }
    }

    fn into_value<T: Clone + 'static>(self) -> Option<T> {
        match self {
            Self::Root(value) => value.downcast_ref::<T>().cloned(),
            Self::Owned(value) => value.downcast::<T>().ok().map(|value| *value),
        }
    }
}

fn type_mismatch<V>() -> Option<V> {
    log::error!("Subscription operator received a value of an unexpected type, dropping update");
    None
}

fn erase_predicate<T, F>(predicate: F) -> PredicateFn
where
    T: 'static,
    F: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    Arc::new(move |old: &dyn Any, new: &dyn Any| {
        match (old.downcast_ref::<T>(), new.downcast_ref::<T>()) {
            (Some(old), Some(new)) => Some(predicate(old, new)),
            _ => None,
        }
    })
}

/// Pipeline from a root state `S` to a selected value `T`
///
/// Subscriptions are values: every operator consumes the subscription and
/// returns the extended one. Cloning a subscription and extending the clones
/// forks independent pipelines that share the common prefix.
///
/// ```rust
/// # use unistore::{OperatorKind, Subscription};
/// #[derive(Clone, PartialEq)]
/// struct State {
///     name: String,
///     age: u32,
/// }
///
/// let subscription = Subscription::<State, State>::new()
///     .select(|state| state.name.clone())
///     .skip_repeats();
///
/// assert_eq!(
///     subscription.operators(),
///     vec![OperatorKind::Select, OperatorKind::Skip]
/// );
/// ```
pub struct Subscription<S, T> {
    operators: Vec<Operator>,
    _marker: PhantomData<fn(&S) -> T>,
}

impl<S: 'static> Subscription<S, S> {
    /// The identity pipeline: delivers the root state on every change
    pub fn new() -> Self {
        Self {
            operators: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<S: 'static> Default for Subscription<S, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, T> Clone for Subscription<S, T> {
    fn clone(&self) -> Self {
        Self {
            operators: self.operators.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S, T> fmt::Debug for Subscription<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("operators", &self.operators())
            .finish()
    }
}

impl<S, T> Subscription<S, T> {
    /// Operator kinds in evaluation order
    pub fn operators(&self) -> Vec<OperatorKind> {
        self.operators.iter().map(Operator::kind).collect()
    }

    /// Whether the pipeline already filters changes with a skip or only
    /// operator
    pub fn has_explicit_skip(&self) -> bool {
        self.operators
            .iter()
            .any(|operator| !matches!(operator, Operator::Select { .. }))
    }

    pub(crate) fn signature(&self) -> Vec<OperatorSignature> {
        self.operators.iter().map(Operator::signature).collect()
    }

    fn push(mut self, operator: Operator) -> Self {
        self.operators.push(operator);
        self
    }
}

impl<S: 'static, T: 'static> Subscription<S, T> {
    /// Map the selected value to a derived value
    pub fn select<U, F>(self, selector: F) -> Subscription<S, U>
    where
        U: 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let key = ClosureKey::of::<F>();
        let select: SelectFn = Arc::new(move |value: &dyn Any| {
            value
                .downcast_ref::<T>()
                .map(|value| Box::new(selector(value)) as Erased)
        });

        let Subscription { mut operators, .. } = self;
        operators.push(Operator::Select { key, select });
        Subscription {
            operators,
            _marker: PhantomData,
        }
    }

    /// Skip the notification whenever `predicate(old, new)` is true
    pub fn skip<F>(self, predicate: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let key = ClosureKey::of::<F>();
        self.push(Operator::Skip {
            key,
            predicate: erase_predicate(predicate),
        })
    }

    /// Notify only when `predicate(old, new)` is true
    pub fn only<F>(self, predicate: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        let key = ClosureKey::of::<F>();
        self.push(Operator::Only {
            key,
            predicate: erase_predicate(predicate),
        })
    }

    /// Skip repeated values according to a custom comparer
    ///
    /// Same as [`skip`](Self::skip); `is_repeat(old, new)` returns true for
    /// values that should not trigger a notification.
    pub fn skip_repeats_by<F>(self, is_repeat: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        self.skip(is_repeat)
    }

    /// Skip changes that leave the key derived from the value unchanged
    pub fn skip_repeats_by_key<K, F>(self, key_of: F) -> Self
    where
        K: PartialEq,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        let key = if std::mem::size_of::<F>() == 0 {
            ClosureKey::fixed::<SkipRepeatsByKey<F>>()
        } else {
            ClosureKey::of::<F>()
        };
        self.push(Operator::Skip {
            key,
            predicate: erase_predicate(move |old: &T, new: &T| key_of(old) == key_of(new)),
        })
    }

    /// Value delivered to a new subscriber: only selections apply, skip and
    /// only operators never gate the initial delivery.
    pub(crate) fn current(&self, state: &S) -> Option<T>
    where
        T: Clone,
    {
        let mut slot = Slot::Root(state);
        for operator in &self.operators {
            if let Operator::Select { select, .. } = operator {
                let Some(value) = select(slot.get()) else {
                    return type_mismatch();
                };
                slot = Slot::Owned(value);
            }
        }
        slot.into_value::<T>().or_else(type_mismatch)
    }

    /// Run a state change through the pipeline
    ///
    /// Returns the selected new value, or `None` when a skip/only operator
    /// suppressed the notification.
    pub(crate) fn evaluate(&self, old: &S, new: &S) -> Option<T>
    where
        T: Clone,
    {
        let mut old_slot = Slot::Root(old);
        let mut new_slot = Slot::Root(new);

        for operator in &self.operators {
            match operator {
                Operator::Select { select, .. } => {
                    let (Some(old_value), Some(new_value)) =
                        (select(old_slot.get()), select(new_slot.get()))
                    else {
                        return type_mismatch();
                    };
                    old_slot = Slot::Owned(old_value);
                    new_slot = Slot::Owned(new_value);
                }
                Operator::Skip { predicate, .. } => {
                    let Some(skip) = predicate(old_slot.get(), new_slot.get()) else {
                        return type_mismatch();
                    };
                    if skip {
                        return None;
                    }
                }
                Operator::Only { predicate, .. } => {
                    let Some(notify) = predicate(old_slot.get(), new_slot.get()) else {
                        return type_mismatch();
                    };
                    if !notify {
                        return None;
                    }
                }
            }
        }

        new_slot.into_value::<T>().or_else(type_mismatch)
    }
}

impl<S: 'static, T: PartialEq + 'static> Subscription<S, T> {
    /// Skip changes where the selected value is equal before and after
    pub fn skip_repeats(self) -> Self {
        self.push(Operator::Skip {
            key: ClosureKey::fixed::<SkipRepeats<T>>(),
            predicate: erase_predicate(|old: &T, new: &T| old == new),
        })
    }
}
