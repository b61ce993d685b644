//! Middleware - wraps the dispatch pipeline
//!
//! Middleware sees every dispatched action before the reducer does. It can
//! forward the action (possibly transformed) to the next link, dispatch new
//! actions through the whole chain, read the current state, stop the action
//! or replace the return value of the dispatch.
//!
//! The chain is composed once when the store is built: the first middleware
//! in the list is the outermost one and sees actions first.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::action::Dispatched;

/// A dispatch entry point: the full store dispatch or the next link in the
/// chain
pub type DispatchFunction<A> = Arc<dyn Fn(A) -> Dispatched<A> + Send + Sync>;

/// Reads the current state. Returns `None` once the store has been dropped.
pub type GetState<S> = Arc<dyn Fn() -> Option<Arc<S>> + Send + Sync>;

/// Store access handed to every middleware invocation
///
/// Both capabilities are resolved lazily, so they always observe the store's
/// current state and current middleware chain.
pub struct MiddlewareApi<S, A> {
    dispatch: DispatchFunction<A>,
    get_state: GetState<S>,
}

impl<S, A> Clone for MiddlewareApi<S, A> {
    fn clone(&self) -> Self {
        Self {
            dispatch: Arc::clone(&self.dispatch),
            get_state: Arc::clone(&self.get_state),
        }
    }
}

impl<S, A> MiddlewareApi<S, A> {
    pub fn new(dispatch: DispatchFunction<A>, get_state: GetState<S>) -> Self {
        Self {
            dispatch,
            get_state,
        }
    }

    /// Dispatch an action through the complete middleware chain
    pub fn dispatch(&self, action: A) -> Dispatched<A> {
        (self.dispatch)(action)
    }

    /// Current state of the store
    pub fn state(&self) -> Option<Arc<S>> {
        (self.get_state)()
    }
}

/// The remainder of the chain after the current middleware
pub struct Next<A> {
    next: DispatchFunction<A>,
}

impl<A> Next<A> {
    pub fn new(next: DispatchFunction<A>) -> Self {
        Self { next }
    }

    /// Forward an action to the next middleware, or to the reducer if this
    /// is the innermost link
    pub fn dispatch(&self, action: A) -> Dispatched<A> {
        (self.next)(action)
    }
}

/// Middleware trait - intercepts actions before they reach the reducer
///
/// Returning without calling `next.dispatch` stops the action: the reducer
/// does not run and subscribers are not notified.
pub trait Middleware<S, A>: Send + Sync {
    /// Handle an action
    ///
    /// - `action`: The action to process
    /// - `api`: Dispatch new actions through the whole chain, read state
    /// - `next`: Continue with the rest of the chain
    fn handle(&self, action: A, api: &MiddlewareApi<S, A>, next: &Next<A>) -> Dispatched<A>;
}

impl<S, A, M> Middleware<S, A> for Arc<M>
where
    M: Middleware<S, A> + ?Sized,
{
    fn handle(&self, action: A, api: &MiddlewareApi<S, A>, next: &Next<A>) -> Dispatched<A> {
        (**self).handle(action, api, next)
    }
}

/// Middleware backed by a closure, see [`middleware_fn`]
pub struct FnMiddleware<S, A, F> {
    handler: F,
    _marker: PhantomData<fn(S, A)>,
}

/// Build a middleware from a closure
pub fn middleware_fn<S, A, F>(handler: F) -> FnMiddleware<S, A, F>
where
    F: Fn(A, &MiddlewareApi<S, A>, &Next<A>) -> Dispatched<A> + Send + Sync,
{
    FnMiddleware {
        handler,
        _marker: PhantomData,
    }
}

impl<S, A, F> Middleware<S, A> for FnMiddleware<S, A, F>
where
    F: Fn(A, &MiddlewareApi<S, A>, &Next<A>) -> Dispatched<A> + Send + Sync,
{
    fn handle(&self, action: A, api: &MiddlewareApi<S, A>, next: &Next<A>) -> Dispatched<A> {
        (self.handler)(action, api, next)
    }
}

/// LoggingMiddleware - logs all actions passing through
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl<S, A: Debug> Middleware<S, A> for LoggingMiddleware {
    fn handle(&self, action: A, _api: &MiddlewareApi<S, A>, next: &Next<A>) -> Dispatched<A> {
        log::debug!("Action: {:?}", action);
        next.dispatch(action)
    }
}

/// Fold the middleware list around `base`
///
/// The last middleware wraps `base` directly, the first one wraps everything
/// else and therefore runs first.
pub(crate) fn compose<S, A>(
    middleware: &[Arc<dyn Middleware<S, A>>],
    api: &MiddlewareApi<S, A>,
    base: DispatchFunction<A>,
) -> DispatchFunction<A>
where
    S: 'static,
    A: 'static,
{
    middleware.iter().rev().fold(base, |next, middleware| {
        let middleware = Arc::clone(middleware);
        let api = api.clone();
        let next = Next::new(next);
        let dispatch: DispatchFunction<A> =
            Arc::new(move |action: A| middleware.handle(action, &api, &next));
        dispatch
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct Tag(&'static str);

    impl Middleware<(), String> for Tag {
        fn handle(
            &self,
            action: String,
            _api: &MiddlewareApi<(), String>,
            next: &Next<String>,
        ) -> Dispatched<String> {
            next.dispatch(format!("{} {}", action, self.0))
        }
    }

    fn api() -> MiddlewareApi<(), String> {
        let dispatch: DispatchFunction<String> = Arc::new(|_: String| Dispatched::Swallowed);
        let get_state: GetState<()> = Arc::new(|| -> Option<Arc<()>> { None });
        MiddlewareApi::new(dispatch, get_state)
    }

    fn recording_base() -> (DispatchFunction<String>, Arc<Mutex<Vec<String>>>) {
        let reached = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reached);
        let base: DispatchFunction<String> = Arc::new(move |action: String| {
            sink.lock().unwrap().push(action.clone());
            Dispatched::Reduced(action)
        });
        (base, reached)
    }

    #[test]
    fn test_first_middleware_is_outermost() {
        let (base, reached) = recording_base();
        let middleware: Vec<Arc<dyn Middleware<(), String>>> =
            vec![Arc::new(Tag("first")), Arc::new(Tag("second"))];

        let dispatch = compose(&middleware, &api(), base);
        let result = dispatch("OK".to_string());

        assert_eq!(*reached.lock().unwrap(), vec!["OK first second".to_string()]);
        assert_eq!(result.into_action(), Some("OK first second".to_string()));
    }

    #[test]
    fn test_empty_chain_is_base() {
        let (base, reached) = recording_base();
        let dispatch = compose(&[], &api(), base);

        dispatch("plain".to_string());
        assert_eq!(*reached.lock().unwrap(), vec!["plain".to_string()]);
    }

    #[test]
    fn test_closure_middleware_can_swallow() {
        let (base, reached) = recording_base();
        let swallow = middleware_fn(
            |action: String, _api: &MiddlewareApi<(), String>, next: &Next<String>| {
                if action.starts_with("drop") {
                    Dispatched::Swallowed
                } else {
                    next.dispatch(action)
                }
            },
        );
        let middleware: Vec<Arc<dyn Middleware<(), String>>> = vec![Arc::new(swallow)];
        let dispatch = compose(&middleware, &api(), base);

        assert!(dispatch("drop me".to_string()).is_swallowed());
        assert!(dispatch("keep me".to_string()).is_reduced());
        assert_eq!(*reached.lock().unwrap(), vec!["keep me".to_string()]);
    }

    #[test]
    fn test_logging_middleware_forwards() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (base, reached) = recording_base();
        let middleware: Vec<Arc<dyn Middleware<(), String>>> =
            vec![Arc::new(LoggingMiddleware::new())];

        compose(&middleware, &api(), base)("logged".to_string());
        assert_eq!(*reached.lock().unwrap(), vec!["logged".to_string()]);
    }
}
