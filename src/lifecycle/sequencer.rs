//! Ordered subsystem startup with LIFO unwind.
//!
//! # Responsibilities
//! - Initialize subsystems strictly one at a time, in caller order
//! - Record a teardown action for every subsystem that started
//! - On the first failure, tear down what started (newest first) and join
//!   every error, the init failure included
//! - Hand back a composite teardown for normal process shutdown
//!
//! # Design Decisions
//! - Later subsystems may read what earlier ones put in the shared context,
//!   so there is no concurrent startup
//! - A teardown error never stops the remaining teardowns
//! - The registry is drained on every run, so tearing down twice is a no-op

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::error::{BoxError, MultiError};

/// A deferred cleanup action. Receives the caller's cancellation token.
pub type TeardownFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// Wrap an async closure as a [`TeardownFn`].
pub fn teardown_fn<F, Fut>(f: F) -> TeardownFn
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Box::new(move |token| f(token).boxed())
}

/// One entry of the startup sequence.
///
/// `C` is the shared context: inputs every subsystem can read, and slots where
/// subsystems leave the handles they create.
#[async_trait]
pub trait Subsystem<C: Send>: Send {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Start the subsystem. `Ok(None)` means it started (or was switched off)
    /// with nothing to tear down.
    async fn init(self: Box<Self>, ctx: &mut C) -> Result<Option<TeardownFn>, BoxError>;
}

/// The teardown registry plus the procedure that drains it.
#[derive(Default)]
pub struct CompositeTeardown {
    label: String,
    entries: Vec<(String, TeardownFn)>,
}

impl std::fmt::Debug for CompositeTeardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeTeardown")
            .field("label", &self.label)
            .field("pending", &self.pending())
            .finish()
    }
}

impl CompositeTeardown {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            entries: Vec::new(),
        }
    }

    /// A teardown with nothing registered.
    pub fn noop() -> Self {
        Self::default()
    }

    fn push(&mut self, name: &str, action: TeardownFn) {
        self.entries.push((name.to_string(), action));
    }

    /// Names of registered actions, oldest first.
    pub fn pending(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every registered action newest first and clear the registry.
    ///
    /// All errors are joined; a second call finds nothing to run and returns `Ok`.
    pub async fn run(&mut self, token: CancellationToken) -> Result<(), MultiError> {
        let mut errors = MultiError::new();
        self.unwind_into(token, &mut errors).await;

        if errors.is_empty() {
            if !self.label.is_empty() {
                tracing::info!(sequence = %self.label, "Teardown completed");
            }
            Ok(())
        } else {
            tracing::error!(sequence = %self.label, error = %errors, "Teardown completed with errors");
            Err(errors)
        }
    }

    /// [`run`](Self::run) bounded by `budget`. When the budget runs out the
    /// token handed to the actions is cancelled and the remaining ones still run.
    pub async fn run_within(&mut self, budget: Duration) -> Result<(), MultiError> {
        let label = self.label.clone();
        let token = CancellationToken::new();
        let run = self.run(token.clone());
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => result,
            _ = tokio::time::sleep(budget) => {
                tracing::warn!(sequence = %label, budget = ?budget, "Teardown budget exhausted; cancelling");
                token.cancel();
                run.await
            }
        }
    }

    async fn unwind_into(&mut self, token: CancellationToken, errors: &mut MultiError) {
        let entries = std::mem::take(&mut self.entries);
        for (name, action) in entries.into_iter().rev() {
            tracing::debug!(subsystem = %name, "Tearing down");
            if let Err(e) = action(token.clone()).await {
                tracing::warn!(subsystem = %name, error = %e, "Teardown failed");
                errors.push(e);
            }
        }
    }
}

/// Starts an ordered list of subsystems.
pub struct SubsystemSequencer<C: Send> {
    label: String,
    enabled: bool,
    subsystems: Vec<Box<dyn Subsystem<C>>>,
}

impl<C: Send> SubsystemSequencer<C> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            enabled: true,
            subsystems: Vec::new(),
        }
    }

    /// Switch the whole sequence on or off. A disabled sequence starts nothing
    /// and yields a no-op teardown.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Append a subsystem. Order is start order.
    pub fn with<S>(mut self, subsystem: S) -> Self
    where
        S: Subsystem<C> + 'static,
    {
        self.subsystems.push(Box::new(subsystem));
        self
    }

    pub fn push(&mut self, subsystem: Box<dyn Subsystem<C>>) {
        self.subsystems.push(subsystem);
    }

    pub fn len(&self) -> usize {
        self.subsystems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subsystems.is_empty()
    }

    /// Start every subsystem in order.
    ///
    /// On the first failure the subsystems that already started are torn down
    /// newest first using `unwind`, and the init error plus any teardown errors
    /// are returned together. Subsystems after the failing one never run.
    pub async fn start(self, ctx: &mut C, unwind: CancellationToken) -> Result<CompositeTeardown, MultiError> {
        if !self.enabled {
            tracing::info!(sequence = %self.label, "Sequence disabled; skipping startup");
            return Ok(CompositeTeardown::noop());
        }

        tracing::info!(sequence = %self.label, count = self.subsystems.len(), "Starting subsystems");

        let mut registry = CompositeTeardown::new(&self.label);
        for subsystem in self.subsystems {
            let name = subsystem.name().to_string();
            tracing::debug!(sequence = %self.label, subsystem = %name, "Initializing");

            match subsystem.init(ctx).await {
                Ok(Some(action)) => {
                    registry.push(&name, action);
                    tracing::info!(sequence = %self.label, subsystem = %name, "Subsystem started");
                }
                Ok(None) => {
                    tracing::info!(sequence = %self.label, subsystem = %name, "Subsystem started (no teardown)");
                }
                Err(e) => {
                    tracing::error!(sequence = %self.label, subsystem = %name, error = %e, "Subsystem failed to start");
                    let mut errors = MultiError::new();
                    errors.push(e);
                    registry.unwind_into(unwind, &mut errors).await;
                    return Err(errors);
                }
            }
        }

        tracing::info!(sequence = %self.label, started = registry.entries.len(), "All subsystems started");
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Journal {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Journal {
        fn record(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    enum Behavior {
        Ok,
        NoTeardown,
        FailInit(&'static str),
        FailTeardown(&'static str),
    }

    struct Stub {
        name: &'static str,
        behavior: Behavior,
    }

    fn stub(name: &'static str, behavior: Behavior) -> Stub {
        Stub { name, behavior }
    }

    #[async_trait]
    impl Subsystem<Journal> for Stub {
        fn name(&self) -> &str {
            self.name
        }

        async fn init(self: Box<Self>, ctx: &mut Journal) -> Result<Option<TeardownFn>, BoxError> {
            ctx.record(format!("init:{}", self.name));
            let events = ctx.events.clone();
            let name = self.name;
            match self.behavior {
                Behavior::FailInit(msg) => Err(msg.into()),
                Behavior::NoTeardown => Ok(None),
                Behavior::Ok => Ok(Some(teardown_fn(move |_| async move {
                    events.lock().unwrap().push(format!("down:{}", name));
                    Ok(())
                }))),
                Behavior::FailTeardown(msg) => Ok(Some(teardown_fn(move |_| async move {
                    events.lock().unwrap().push(format!("down:{}", name));
                    Err(msg.into())
                }))),
            }
        }
    }

    #[tokio::test]
    async fn test_failure_unwinds_started_subsystems_only() {
        let mut journal = Journal::default();
        let result = SubsystemSequencer::new("test")
            .with(stub("a", Behavior::Ok))
            .with(stub("b", Behavior::FailInit("boom")))
            .with(stub("c", Behavior::Ok))
            .start(&mut journal, CancellationToken::new())
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert_eq!(journal.events(), vec!["init:a", "init:b", "down:a"]);
    }

    #[tokio::test]
    async fn test_unwind_is_lifo() {
        let mut journal = Journal::default();
        let err = SubsystemSequencer::new("test")
            .with(stub("a", Behavior::Ok))
            .with(stub("b", Behavior::Ok))
            .with(stub("c", Behavior::Ok))
            .with(stub("d", Behavior::FailInit("d broke")))
            .start(&mut journal, CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.len(), 1);
        assert_eq!(
            journal.events(),
            vec!["init:a", "init:b", "init:c", "init:d", "down:c", "down:b", "down:a"]
        );
    }

    #[tokio::test]
    async fn test_teardown_errors_joined_and_unwind_continues() {
        let mut journal = Journal::default();
        let err = SubsystemSequencer::new("test")
            .with(stub("a", Behavior::FailTeardown("a teardown")))
            .with(stub("b", Behavior::FailTeardown("b teardown")))
            .with(stub("c", Behavior::FailInit("c init")))
            .start(&mut journal, CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.len(), 3);
        let messages: Vec<String> = err.iter().map(|e| e.to_string()).collect();
        assert_eq!(messages, vec!["c init", "b teardown", "a teardown"]);
        assert_eq!(journal.events(), vec!["init:a", "init:b", "init:c", "down:b", "down:a"]);
    }

    #[tokio::test]
    async fn test_composite_runs_once() {
        let mut journal = Journal::default();
        let mut teardown = SubsystemSequencer::new("test")
            .with(stub("a", Behavior::Ok))
            .with(stub("skip", Behavior::NoTeardown))
            .with(stub("b", Behavior::Ok))
            .start(&mut journal, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(teardown.pending(), vec!["a", "b"]);
        teardown.run(CancellationToken::new()).await.unwrap();
        teardown.run(CancellationToken::new()).await.unwrap();
        assert!(teardown.is_empty());

        assert_eq!(journal.events(), vec!["init:a", "init:skip", "init:b", "down:b", "down:a"]);
    }

    #[tokio::test]
    async fn test_composite_joins_errors() {
        let mut journal = Journal::default();
        let mut teardown = SubsystemSequencer::new("test")
            .with(stub("a", Behavior::FailTeardown("first")))
            .with(stub("b", Behavior::FailTeardown("second")))
            .start(&mut journal, CancellationToken::new())
            .await
            .unwrap();

        let err = teardown.run(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "second\nfirst");
        assert!(teardown.run(CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_short_circuits() {
        let mut journal = Journal::default();
        let mut teardown = SubsystemSequencer::new("test")
            .enabled(false)
            .with(stub("a", Behavior::FailInit("never")))
            .start(&mut journal, CancellationToken::new())
            .await
            .unwrap();

        assert!(journal.events().is_empty());
        assert!(teardown.is_empty());
        assert!(teardown.run(CancellationToken::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_teardown_receives_unwind_token() {
        struct Watcher {
            seen: Arc<Mutex<Option<bool>>>,
        }

        #[async_trait]
        impl Subsystem<()> for Watcher {
            fn name(&self) -> &str {
                "watcher"
            }

            async fn init(self: Box<Self>, _ctx: &mut ()) -> Result<Option<TeardownFn>, BoxError> {
                let seen = self.seen.clone();
                Ok(Some(teardown_fn(move |token| async move {
                    *seen.lock().unwrap() = Some(token.is_cancelled());
                    Ok(())
                })))
            }
        }

        let seen = Arc::new(Mutex::new(None));
        let unwind = CancellationToken::new();
        unwind.cancel();

        let err = SubsystemSequencer::new("test")
            .with(Watcher { seen: seen.clone() })
            .with(unit_failure())
            .start(&mut (), unwind)
            .await
            .unwrap_err();

        assert_eq!(err.len(), 1);
        assert_eq!(*seen.lock().unwrap(), Some(true));
    }

    struct UnitFailure;

    #[async_trait]
    impl Subsystem<()> for UnitFailure {
        fn name(&self) -> &str {
            "failure"
        }

        async fn init(self: Box<Self>, _ctx: &mut ()) -> Result<Option<TeardownFn>, BoxError> {
            Err("nope".into())
        }
    }

    fn unit_failure() -> UnitFailure {
        UnitFailure
    }

    struct Lingering {
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Subsystem<()> for Lingering {
        fn name(&self) -> &str {
            "lingering"
        }

        async fn init(self: Box<Self>, _ctx: &mut ()) -> Result<Option<TeardownFn>, BoxError> {
            let events = self.events.clone();
            Ok(Some(teardown_fn(move |token| async move {
                token.cancelled().await;
                events.lock().unwrap().push("down:lingering".to_string());
                Err("flush interrupted".into())
            })))
        }
    }

    #[tokio::test]
    async fn test_run_within_cancels_after_budget() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut journal = Journal { events: events.clone() };
        let mut first = SubsystemSequencer::new("test")
            .with(stub("a", Behavior::Ok))
            .start(&mut journal, CancellationToken::new())
            .await
            .unwrap();
        let mut second = SubsystemSequencer::new("test")
            .with(Lingering { events: events.clone() })
            .start(&mut (), CancellationToken::new())
            .await
            .unwrap();

        let started = std::time::Instant::now();
        let err = second.run_within(Duration::from_millis(50)).await.unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(err.to_string(), "flush interrupted");
        assert!(second.is_empty());

        first.run_within(Duration::from_secs(5)).await.unwrap();
        assert_eq!(journal.events(), vec!["init:a", "down:lingering", "down:a"]);
    }
}
