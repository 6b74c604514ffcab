//! Instrumentation hooks for cache operations.
//!
//! Every registry and instance operation is bracketed by an [`Instrumenter`]:
//! `observe()` is called before the backend call and returns a [`Finish`]
//! callback that receives the outcome once the operation completes.
//!
//! ```
//! use cache_registry::observability::{Finish, Instrumenter, Operation};
//! use std::sync::Arc;
//!
//! let instrumenter = |op: Operation, args: &[&str]| -> Finish {
//!     let started = format!("{} {:?}", op, args);
//!     Box::new(move |err: Option<&cache_registry::Error>| {
//!         if let Some(err) = err {
//!             eprintln!("{} failed: {}", started, err);
//!         }
//!     })
//! };
//!
//! let _hook: Arc<dyn Instrumenter> = Arc::new(instrumenter);
//! ```
//!
//! # Provided implementations
//!
//! | Instrumenter | Behaviour |
//! |--------------|-----------|
//! | `NoopInstrumenter` | Default; does nothing |
//! | `LogInstrumenter` | Emits `log` records with elapsed time |
//! | `CombinedInstrumenter` | Fans out to several instrumenters |
//!
//! Closures with the signature `Fn(Operation, &[&str]) -> Finish` implement
//! the trait directly.

use crate::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Callback invoked once when an observed operation completes.
pub type Finish = Box<dyn FnOnce(Option<&Error>) + Send>;

/// Cache operations reported to the instrumenter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Start,
    Close,
    Ping,
    Get,
    Loader,
    Set,
    Delete,
}

impl Operation {
    /// Canonical operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Start => "cache-start",
            Operation::Close => "cache-close",
            Operation::Ping => "cache-ping",
            Operation::Get => "cache-get",
            Operation::Loader => "cache-loader",
            Operation::Set => "cache-set",
            Operation::Delete => "cache-delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observes cache operations.
///
/// `observe()` is called before the operation with its name and arguments
/// (the namespaced key for item operations). The returned [`Finish`] is
/// called exactly once with the error, if any.
pub trait Instrumenter: Send + Sync {
    fn observe(&self, op: Operation, args: &[&str]) -> Finish;
}

impl<F> Instrumenter for F
where
    F: Fn(Operation, &[&str]) -> Finish + Send + Sync,
{
    fn observe(&self, op: Operation, args: &[&str]) -> Finish {
        self(op, args)
    }
}

/// Finish callback that ignores the outcome.
pub fn noop_finish() -> Finish {
    Box::new(|_: Option<&Error>| {})
}

/// Default instrumenter (no-op).
#[derive(Clone, Debug, Default)]
pub struct NoopInstrumenter;

impl Instrumenter for NoopInstrumenter {
    fn observe(&self, _op: Operation, _args: &[&str]) -> Finish {
        noop_finish()
    }
}

/// Instrumenter that writes operation outcomes through the `log` crate.
///
/// Successful operations are logged at `debug`, failures at `warn`.
/// Lookups that simply miss (`KeyNotFound`) are not treated as failures.
#[derive(Clone, Debug, Default)]
pub struct LogInstrumenter;

impl Instrumenter for LogInstrumenter {
    fn observe(&self, op: Operation, args: &[&str]) -> Finish {
        let started = Instant::now();
        let args = args.join(",");
        Box::new(move |err: Option<&Error>| match err {
            Some(err) if !err.is_not_found() => {
                warn!("{} [{}] failed after {:?}: {}", op, args, started.elapsed(), err);
            }
            _ => debug!("{} [{}] took {:?}", op, args, started.elapsed()),
        })
    }
}

/// Instrumenter combining several instrumenters.
///
/// All instrumenters observe the operation start in order; finish callbacks
/// run in reverse order so that the first instrumenter brackets the others.
#[derive(Clone, Default)]
pub struct CombinedInstrumenter {
    inner: Vec<Arc<dyn Instrumenter>>,
}

impl CombinedInstrumenter {
    pub fn new(inner: Vec<Arc<dyn Instrumenter>>) -> Self {
        CombinedInstrumenter { inner }
    }

    /// Append another instrumenter.
    pub fn with(mut self, instrumenter: Arc<dyn Instrumenter>) -> Self {
        self.inner.push(instrumenter);
        self
    }
}

impl fmt::Debug for CombinedInstrumenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedInstrumenter")
            .field("count", &self.inner.len())
            .finish()
    }
}

impl Instrumenter for CombinedInstrumenter {
    fn observe(&self, op: Operation, args: &[&str]) -> Finish {
        let mut finishers: Vec<Finish> = self.inner.iter().map(|i| i.observe(op, args)).collect();
        finishers.reverse();
        Box::new(move |err: Option<&Error>| {
            for finish in finishers {
                finish(err);
            }
        })
    }
}
