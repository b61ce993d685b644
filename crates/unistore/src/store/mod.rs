//! The store - owns the state, runs the dispatch pipeline and notifies
//! subscribers.
//!
//! ```text
//! dispatch(action)
//!     → Middleware[0] → … → Middleware[n-1]
//!     → Reducer (state, action) → new state
//!     → Subscribers (in subscription order)
//! ```
//!
//! A store is a cheap handle (`Clone` shares the same state) and can be used
//! from several threads. Dispatches are serialized: one action is reduced
//! and fully delivered to subscribers before the next one starts. The
//! thread that is currently dispatching may dispatch again from middleware
//! or from a subscriber callback; the nested dispatch completes before the
//! outer one continues. Reducers may never dispatch.

mod registry;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::action::{Dispatched, StoreInit};
use crate::config::StoreConfig;
use crate::middleware::{compose, DispatchFunction, GetState, Middleware, MiddlewareApi};
use crate::reducer::Reducer;
use crate::subscriber::{StoreSubscriber, SubscriberId};
use crate::subscription::Subscription;
use crate::subscription_box::{Delivery, SubscriptionBox};

use registry::{Cursor, Registration, Registry};

const REENTRANT_DISPATCH: &str =
    "unistore: reducers may not dispatch actions (dispatch called while reducing)";

type MiddlewareList<S, A> = Vec<Arc<dyn Middleware<S, A>>>;

/// Redux-style store holding the application state
///
/// ```rust
/// use unistore::{BlockSubscriber, Store};
///
/// fn counter(count: i32, delta: &i32) -> i32 {
///     count + delta
/// }
///
/// let store = Store::new(counter, 0);
/// let subscriber = BlockSubscriber::new(|count: i32| println!("count: {count}"));
/// let handle = store.subscribe(&subscriber);
///
/// store.dispatch(2);
/// store.dispatch(3);
/// assert_eq!(*store.state(), 5);
///
/// handle.unsubscribe();
/// ```
pub struct Store<S, A> {
    inner: Arc<StoreInner<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StoreInner<S, A> {
    label: String,
    automatically_skip_repeats: bool,
    state: RwLock<Arc<S>>,
    reducer: Box<dyn Reducer<S, A>>,
    middleware: Mutex<MiddlewareList<S, A>>,
    api: MiddlewareApi<S, A>,
    base_dispatch: DispatchFunction<A>,
    dispatch_function: RwLock<DispatchFunction<A>>,
    /// Serializes dispatches across threads; re-entrant for the dispatching
    /// thread
    dispatch_lock: ReentrantMutex<()>,
    is_reducing: AtomicBool,
    registry: Mutex<Registry<S>>,
    /// Number of committed state changes
    changes: AtomicU64,
    next_token: AtomicU64,
}

impl<S, A> StoreInner<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    fn current_state(&self) -> Arc<S> {
        Arc::clone(&*self.state.read())
    }

    /// Current state together with the number of the change that produced it
    fn snapshot(&self) -> (Arc<S>, u64) {
        let state = self.state.read();
        (Arc::clone(&*state), self.changes.load(Ordering::SeqCst))
    }

    fn dispatch(&self, action: A) -> Dispatched<A> {
        let _serialized = self.dispatch_lock.lock();
        if self.is_reducing.load(Ordering::SeqCst) {
            panic!("{}", REENTRANT_DISPATCH);
        }

        let dispatch = Arc::clone(&*self.dispatch_function.read());
        dispatch(action)
    }

    /// Innermost link of the middleware chain
    fn reduce(&self, action: A) -> Dispatched<A> {
        let previous = self.current_state();
        let next = {
            let _reducing = ReducingGuard::enter(&self.is_reducing);
            Arc::new(self.reducer.reduce(S::clone(&previous), &action))
        };

        let change = {
            let mut state = self.state.write();
            *state = Arc::clone(&next);
            self.changes.fetch_add(1, Ordering::SeqCst) + 1
        };
        log::trace!("[{}] Committed state change #{}", self.label, change);

        self.notify_subscribers(&previous, &next, change);
        Dispatched::Reduced(action)
    }

    fn notify_subscribers(&self, old: &S, new: &S, change: u64) {
        let _pass = NotificationPass::begin(&self.registry);
        let mut delivered = 0usize;
        let mut index = 0;

        loop {
            let cursor = self.registry.lock().cursor(index, change);
            index += 1;

            match cursor {
                Cursor::End => break,
                Cursor::Skip => continue,
                Cursor::Notify(subscription) => match subscription.notify(old, new) {
                    Delivery::Delivered => delivered += 1,
                    Delivery::Skipped => {}
                    Delivery::Released => {
                        log::trace!("[{}] Skipping dropped subscriber", self.label);
                    }
                },
            }

            // A callback dispatched: the nested pass already delivered the
            // newer state to every subscriber, so this change is stale.
            if self.changes.load(Ordering::SeqCst) != change {
                log::trace!(
                    "[{}] Change #{} superseded during notification",
                    self.label,
                    change
                );
                break;
            }
        }

        log::trace!(
            "[{}] Change #{} delivered to {} subscriber(s)",
            self.label,
            change,
            delivered
        );
    }

    fn rebuild_dispatch(&self, middleware: &[Arc<dyn Middleware<S, A>>]) {
        let dispatch = compose(middleware, &self.api, Arc::clone(&self.base_dispatch));
        *self.dispatch_function.write() = dispatch;
        log::debug!(
            "[{}] Dispatch chain rebuilt with {} middleware",
            self.label,
            middleware.len()
        );
    }
}

/// Marks the store as reducing; dispatching while the flag is set panics
struct ReducingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ReducingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        if flag.swap(true, Ordering::SeqCst) {
            panic!("{}", REENTRANT_DISPATCH);
        }
        Self { flag }
    }
}

impl Drop for ReducingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Keeps registry removals deferred while subscribers are being notified
struct NotificationPass<'a, S> {
    registry: &'a Mutex<Registry<S>>,
}

impl<'a, S> NotificationPass<'a, S> {
    fn begin(registry: &'a Mutex<Registry<S>>) -> Self {
        registry.lock().begin_pass();
        Self { registry }
    }
}

impl<S> Drop for NotificationPass<'_, S> {
    fn drop(&mut self) {
        self.registry.lock().end_pass();
    }
}

/// Store operations reachable from a [`SubscriptionHandle`]
trait Registrar: Send + Sync {
    fn unsubscribe_token(&self, token: u64) -> bool;
    fn is_registered(&self, token: u64) -> bool;
}

impl<S, A> Registrar for StoreInner<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    fn unsubscribe_token(&self, token: u64) -> bool {
        let removed = self.registry.lock().remove_token(token);
        if removed {
            log::debug!("[{}] Removed subscription", self.label);
        }
        removed
    }

    fn is_registered(&self, token: u64) -> bool {
        self.registry.lock().contains_token(token)
    }
}

/// Handle to one registration, returned by the `subscribe` family
///
/// Dropping the handle keeps the subscription; call
/// [`unsubscribe`](Self::unsubscribe) or convert it into a
/// [`SubscriptionGuard`] to end it.
#[derive(Debug)]
#[must_use = "dropping the handle does not unsubscribe; use `unsubscribe_when_dropped` for that"]
pub struct SubscriptionHandle {
    registrar: Weak<dyn Registrar>,
    token: u64,
}

impl SubscriptionHandle {
    /// End the subscription. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.remove()
    }

    /// Whether this registration is still in effect
    ///
    /// A registration ends when it is unsubscribed, when its subscriber is
    /// dropped, when the subscriber re-subscribes with a different pipeline,
    /// or when the store is dropped.
    pub fn is_active(&self) -> bool {
        self.registrar
            .upgrade()
            .is_some_and(|registrar| registrar.is_registered(self.token))
    }

    /// Unsubscribe automatically when the returned guard is dropped
    pub fn unsubscribe_when_dropped(self) -> SubscriptionGuard {
        SubscriptionGuard { handle: self }
    }

    fn remove(&self) -> bool {
        self.registrar
            .upgrade()
            .is_some_and(|registrar| registrar.unsubscribe_token(self.token))
    }
}

/// Unsubscribes its registration on drop
#[derive(Debug)]
pub struct SubscriptionGuard {
    handle: SubscriptionHandle,
}

impl SubscriptionGuard {
    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.handle.remove();
    }
}

/// Completion handle passed to asynchronous action creators
///
/// The creator may move it to another thread and call
/// [`complete`](Self::complete) once the work is done.
pub struct AsyncCompletion<S, A> {
    store: Store<S, A>,
    callback: Option<Box<dyn FnOnce(&S) + Send>>,
}

impl<S, A> AsyncCompletion<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Run the final action creator and dispatch its action, if any
    ///
    /// The completion callback runs after the dispatch and only when an
    /// action was produced.
    pub fn complete<F>(self, creator: F) -> Option<Dispatched<A>>
    where
        F: FnOnce(&S, &Store<S, A>) -> Option<A>,
    {
        let dispatched = self.store.dispatch_creator(creator)?;
        if let Some(callback) = self.callback {
            callback(&self.store.state());
        }
        Some(dispatched)
    }
}

/// Builder for stores with middleware or non-default options
pub struct StoreBuilder<S, A> {
    reducer: Box<dyn Reducer<S, A>>,
    state: S,
    middleware: MiddlewareList<S, A>,
    config: StoreConfig,
}

impl<S, A> StoreBuilder<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Append a middleware; the first one added runs first
    pub fn middleware<M: Middleware<S, A> + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn automatically_skip_repeats(mut self, enabled: bool) -> Self {
        self.config.automatically_skip_repeats = enabled;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = label.into();
        self
    }

    /// Replace all options at once, e.g. with a loaded config file
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Store<S, A> {
        Store::from_parts(self.reducer, self.state, self.middleware, self.config)
    }

    /// Build the store and dispatch [`StoreInit`] through the middleware
    /// chain
    pub fn build_initialized(self) -> Store<S, A>
    where
        A: From<StoreInit>,
    {
        let store = self.build();
        store.dispatch(A::from(StoreInit));
        store
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Create a store with default options and no middleware
    pub fn new<R: Reducer<S, A> + 'static>(reducer: R, state: S) -> Self {
        Self::builder(reducer, state).build()
    }

    pub fn builder<R: Reducer<S, A> + 'static>(reducer: R, state: S) -> StoreBuilder<S, A> {
        StoreBuilder {
            reducer: Box::new(reducer),
            state,
            middleware: Vec::new(),
            config: StoreConfig::default(),
        }
    }

    /// Create a store from the default state and dispatch [`StoreInit`] so
    /// the reducer can set up the initial state
    pub fn initialized<R: Reducer<S, A> + 'static>(reducer: R) -> Self
    where
        S: Default,
        A: From<StoreInit>,
    {
        Self::builder(reducer, S::default()).build_initialized()
    }

    fn from_parts(
        reducer: Box<dyn Reducer<S, A>>,
        state: S,
        middleware: MiddlewareList<S, A>,
        config: StoreConfig,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner<S, A>>| {
            let api = middleware_api(weak);
            let base_dispatch = reducer_dispatch(weak);
            let dispatch_function = compose(&middleware, &api, Arc::clone(&base_dispatch));

            StoreInner {
                label: config.label,
                automatically_skip_repeats: config.automatically_skip_repeats,
                state: RwLock::new(Arc::new(state)),
                reducer,
                middleware: Mutex::new(middleware),
                api,
                base_dispatch,
                dispatch_function: RwLock::new(dispatch_function),
                dispatch_lock: ReentrantMutex::new(()),
                is_reducing: AtomicBool::new(false),
                registry: Mutex::new(Registry::new()),
                changes: AtomicU64::new(0),
                next_token: AtomicU64::new(0),
            }
        });

        log::debug!(
            "[{}] Store created with {} middleware",
            inner.label,
            inner.middleware.lock().len()
        );
        Self { inner }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn automatically_skips_repeats(&self) -> bool {
        self.inner.automatically_skip_repeats
    }

    /// Current state snapshot
    pub fn state(&self) -> Arc<S> {
        self.inner.current_state()
    }

    /// Dispatch an action through middleware and reducer
    ///
    /// Returns once the state has been updated and all subscribers have been
    /// notified (unless middleware stopped the action).
    ///
    /// # Panics
    ///
    /// Panics when called from within a reducer.
    pub fn dispatch(&self, action: A) -> Dispatched<A> {
        self.inner.dispatch(action)
    }

    /// Dispatch and then run `callback` with the resulting state
    pub fn dispatch_with_callback<F>(&self, action: A, callback: F) -> Dispatched<A>
    where
        F: FnOnce(&S),
    {
        let dispatched = self.dispatch(action);
        callback(&self.state());
        dispatched
    }

    /// Let `creator` decide on an action based on the current state
    ///
    /// Nothing is dispatched if the creator returns `None`.
    pub fn dispatch_creator<F>(&self, creator: F) -> Option<Dispatched<A>>
    where
        F: FnOnce(&S, &Store<S, A>) -> Option<A>,
    {
        let state = self.state();
        let action = creator(&state, self)?;
        Some(self.dispatch(action))
    }

    /// Run an asynchronous action creator
    ///
    /// The creator receives an [`AsyncCompletion`] and calls
    /// [`AsyncCompletion::complete`] later, possibly from another thread.
    pub fn dispatch_async_creator<F>(&self, creator: F)
    where
        F: FnOnce(&S, &Store<S, A>, AsyncCompletion<S, A>),
    {
        self.run_async_creator(creator, None);
    }

    /// Like [`dispatch_async_creator`](Self::dispatch_async_creator), running
    /// `callback` with the new state once the final action was dispatched
    pub fn dispatch_async_creator_with_callback<F, C>(&self, creator: F, callback: C)
    where
        F: FnOnce(&S, &Store<S, A>, AsyncCompletion<S, A>),
        C: FnOnce(&S) + Send + 'static,
    {
        self.run_async_creator(creator, Some(Box::new(callback)));
    }

    fn run_async_creator<F>(&self, creator: F, callback: Option<Box<dyn FnOnce(&S) + Send>>)
    where
        F: FnOnce(&S, &Store<S, A>, AsyncCompletion<S, A>),
    {
        let completion = AsyncCompletion {
            store: self.clone(),
            callback,
        };
        let state = self.state();
        creator(&state, self, completion);
    }

    /// Dispatch the action a future resolves to, on the tokio runtime
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch_future<F>(&self, future: F) -> tokio::task::JoinHandle<Option<Dispatched<A>>>
    where
        F: Future<Output = Option<A>> + Send + 'static,
    {
        let store = self.clone();
        tokio::spawn(async move {
            let action = future.await?;
            Some(store.dispatch(action))
        })
    }

    /// Subscribe to the whole state
    ///
    /// With automatic skip-repeats enabled, notifications for unchanged
    /// states are suppressed.
    pub fn subscribe<Sub>(&self, subscriber: &Arc<Sub>) -> SubscriptionHandle
    where
        S: PartialEq,
        Sub: StoreSubscriber<S> + ?Sized + 'static,
    {
        self.subscribe_with(subscriber, |subscription| subscription)
    }

    /// Subscribe with a pipeline built by `transform`
    ///
    /// With automatic skip-repeats enabled and no skip/only operator in the
    /// pipeline, an implicit skip-repeats on the selected value is appended.
    pub fn subscribe_with<T, Sub, F>(&self, subscriber: &Arc<Sub>, transform: F) -> SubscriptionHandle
    where
        T: Clone + PartialEq + 'static,
        Sub: StoreSubscriber<T> + ?Sized + 'static,
        F: FnOnce(Subscription<S, S>) -> Subscription<S, T>,
    {
        let subscription = transform(Subscription::new());
        let subscription =
            if self.inner.automatically_skip_repeats && !subscription.has_explicit_skip() {
                subscription.skip_repeats()
            } else {
                subscription
            };
        self.register(subscriber, subscription)
    }

    /// Subscribe to the whole state without any repeat filtering
    ///
    /// For states that cannot be compared; every state change is delivered.
    pub fn subscribe_plain<Sub>(&self, subscriber: &Arc<Sub>) -> SubscriptionHandle
    where
        Sub: StoreSubscriber<S> + ?Sized + 'static,
    {
        self.register(subscriber, Subscription::new())
    }

    /// Subscribe with a pipeline; no implicit skip-repeats is added
    pub fn subscribe_plain_with<T, Sub, F>(
        &self,
        subscriber: &Arc<Sub>,
        transform: F,
    ) -> SubscriptionHandle
    where
        T: Clone + 'static,
        Sub: StoreSubscriber<T> + ?Sized + 'static,
        F: FnOnce(Subscription<S, S>) -> Subscription<S, T>,
    {
        self.register(subscriber, transform(Subscription::new()))
    }

    fn register<T, Sub>(
        &self,
        subscriber: &Arc<Sub>,
        subscription: Subscription<S, T>,
    ) -> SubscriptionHandle
    where
        T: Clone + 'static,
        Sub: StoreSubscriber<T> + ?Sized + 'static,
    {
        let inner = &self.inner;
        let _serialized = inner.dispatch_lock.lock();

        let (state, since) = inner.snapshot();
        let token = inner.next_token.fetch_add(1, Ordering::Relaxed);
        let candidate = Arc::new(SubscriptionBox::new(subscriber, subscription, token, since));

        let registration = inner.registry.lock().register(Arc::clone(&candidate));
        match registration {
            Registration::Unchanged { token } => {
                log::debug!(
                    "[{}] Subscriber already registered with an equivalent subscription",
                    inner.label
                );
                return self.handle(token);
            }
            Registration::Replaced => {
                log::debug!("[{}] Replaced subscription of existing subscriber", inner.label);
            }
            Registration::Inserted => {
                log::debug!("[{}] Added subscriber", inner.label);
            }
        }

        candidate.deliver_initial(&state);
        self.handle(token)
    }

    fn handle(&self, token: u64) -> SubscriptionHandle {
        let inner: Weak<StoreInner<S, A>> = Arc::downgrade(&self.inner);
        let registrar: Weak<dyn Registrar> = inner;
        SubscriptionHandle { registrar, token }
    }

    /// Remove the registration of `subscriber`. Returns false if it was not
    /// subscribed.
    pub fn unsubscribe<Sub: ?Sized>(&self, subscriber: &Arc<Sub>) -> bool {
        let removed = self
            .inner
            .registry
            .lock()
            .remove_subscriber(SubscriberId::of(subscriber));
        if removed {
            log::debug!("[{}] Removed subscriber", self.inner.label);
        }
        removed
    }

    /// Number of registered subscriptions whose subscriber is still alive
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Append a middleware to the end of the chain
    pub fn add_middleware<M: Middleware<S, A> + 'static>(&self, middleware: M) {
        let _serialized = self.inner.dispatch_lock.lock();
        let mut list = self.inner.middleware.lock();
        list.push(Arc::new(middleware));
        self.inner.rebuild_dispatch(&list);
    }

    /// Replace the whole middleware chain
    pub fn set_middleware(&self, middleware: Vec<Arc<dyn Middleware<S, A>>>) {
        let _serialized = self.inner.dispatch_lock.lock();
        let mut list = self.inner.middleware.lock();
        *list = middleware;
        self.inner.rebuild_dispatch(&list);
    }

    pub fn middleware_count(&self) -> usize {
        self.inner.middleware.lock().len()
    }
}

impl<S, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("label", &self.inner.label)
            .field(
                "automatically_skip_repeats",
                &self.inner.automatically_skip_repeats,
            )
            .finish_non_exhaustive()
    }
}

fn middleware_api<S, A>(weak: &Weak<StoreInner<S, A>>) -> MiddlewareApi<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    let dispatch_target = weak.clone();
    let dispatch: DispatchFunction<A> = Arc::new(move |action: A| match dispatch_target.upgrade() {
        Some(inner) => inner.dispatch(action),
        None => {
            log::warn!("Dispatch on a dropped store, ignoring action");
            Dispatched::Swallowed
        }
    });

    let state_source = weak.clone();
    let get_state: GetState<S> =
        Arc::new(move || state_source.upgrade().map(|inner| inner.current_state()));

    MiddlewareApi::new(dispatch, get_state)
}

fn reducer_dispatch<S, A>(weak: &Weak<StoreInner<S, A>>) -> DispatchFunction<A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    let target = weak.clone();
    Arc::new(move |action: A| match target.upgrade() {
        Some(inner) => inner.reduce(action),
        None => {
            log::warn!("Reducer dispatch on a dropped store, ignoring action");
            Dispatched::Swallowed
        }
    })
}
