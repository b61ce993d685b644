//! Reducers - pure functions producing new state from current state + action

/// Computes the next state from the current state and an action
///
/// Reducers must be pure and must never dispatch: the store panics when a
/// reducer re-enters `dispatch`.
///
/// Any `Fn(S, &A) -> S` is a reducer, so plain functions work:
///
/// ```rust
/// # use unistore::Reducer;
/// fn add(count: i32, delta: &i32) -> i32 {
///     count + delta
/// }
///
/// assert_eq!(Reducer::reduce(&add, 1, &2), 3);
/// ```
pub trait Reducer<S, A>: Send + Sync {
    fn reduce(&self, state: S, action: &A) -> S;
}

impl<S, A, F> Reducer<S, A> for F
where
    F: Fn(S, &A) -> S + Send + Sync,
{
    fn reduce(&self, state: S, action: &A) -> S {
        self(state, action)
    }
}

/// Runs several reducers one after another
///
/// The order of the reducers is the order in which they are invoked; each one
/// receives the state produced by its predecessor.
pub struct CombinedReducer<S, A> {
    reducers: Vec<Box<dyn Reducer<S, A>>>,
}

impl<S, A> CombinedReducer<S, A> {
    /// Combine the given reducers. Returns `None` for an empty list.
    pub fn new(reducers: Vec<Box<dyn Reducer<S, A>>>) -> Option<Self> {
        if reducers.is_empty() {
            return None;
        }
        Some(Self { reducers })
    }

    /// Start a combination from a single reducer
    pub fn from_reducer<R: Reducer<S, A> + 'static>(reducer: R) -> Self {
        Self {
            reducers: vec![Box::new(reducer)],
        }
    }

    /// Append a reducer to the end of the chain
    pub fn and_then<R: Reducer<S, A> + 'static>(mut self, reducer: R) -> Self {
        self.reducers.push(Box::new(reducer));
        self
    }

    pub fn len(&self) -> usize {
        self.reducers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reducers.is_empty()
    }
}

impl<S, A> Reducer<S, A> for CombinedReducer<S, A> {
    fn reduce(&self, state: S, action: &A) -> S {
        self.reducers
            .iter()
            .fold(state, |state, reducer| reducer.reduce(state, action))
    }
}
