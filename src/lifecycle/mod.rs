//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (sequencer.rs):
//!     Subsystems initialized in order → teardowns registered → composite teardown
//!     First failure → unwind registered teardowns in reverse → aggregated error
//!
//! Serving (runner.rs):
//!     Require config → Register routes → Serve → Await termination → Timed shutdown
//!
//! Shutdown (shutdown.rs):
//!     Stop with deadline → already-closed is success → other errors returned as-is
//!
//! Signals (signals.rs):
//!     SIGHUP/SIGINT/SIGTERM/SIGQUIT → cancel base token
//! ```
//!
//! # Design Decisions
//! - Teardown is last-in first-out and runs at most once
//! - Shutdown has its own deadline, independent of the token that triggered it
//! - A listener failure outranks any error seen while shutting down

pub mod runner;
pub mod sequencer;
pub mod shutdown;
pub mod signals;

pub use runner::{
    required_keys, run_listener, Listener, RegisterRoutes, RunError, Runner, ServeError,
    TerminationCause,
};
pub use sequencer::{teardown_fn, CompositeTeardown, Subsystem, SubsystemSequencer, TeardownFn};
pub use shutdown::{shutdown_with_timeout, ContextError, StopContext, StopError, Stoppable};
pub use signals::SignalObserver;
