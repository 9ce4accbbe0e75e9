//! Aspects and the aspect registry.
//!
//! An aspect wraps every operation whose full path matches its pattern. It
//! receives the [`ExecutionContext`] and a [`Next`] continuation standing for
//! the rest of the chain (inner aspects plus the handler):
//!
//! ```text
//!  priority 100 ──► before ─┐                 ┌─► after ──► response
//!                           ▼                 │
//!  priority 0   ──► before ─┐       ┌─► after ┘
//!                           ▼       │
//!  base invocation ──► params ─► handler ─► results
//! ```
//!
//! Calling [`Next::run`] resumes at the next inner layer. Not calling it
//! short-circuits the chain: no inner aspect runs and the handler is never
//! invoked. `Next` is consumed by `run`, so a layer can resume the chain at
//! most once.
//!
//! # Example
//!
//! ```
//! use weave_core::aspect::AspectRegistry;
//!
//! let registry = AspectRegistry::new();
//! registry
//!     .register("/api/**", 10, |ctx, next| {
//!         tracing::debug!(path = %ctx.operation().path, "before");
//!         next.run(ctx)?;
//!         tracing::debug!(results = ctx.results().len(), "after");
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(registry.matching("/api/users").count(), 1);
//! ```

use crate::context::ExecutionContext;
use crate::error::{RegistrationError, Result};
use crate::pattern::Pattern;
use arc_swap::ArcSwap;
use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// An interceptor wrapped around matching operations.
pub trait Aspect: Send + Sync + 'static {
    /// Run around the rest of the chain.
    ///
    /// # Errors
    ///
    /// Returns whatever failure the aspect raises itself or chooses to
    /// propagate from `next`.
    fn around(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> Result<()>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Adapter turning a closure into an [`Aspect`].
struct FnAspect<F>(F);

impl<F> Aspect for FnAspect<F>
where
    F: Fn(&mut ExecutionContext, Next<'_>) -> Result<()> + Send + Sync + 'static,
{
    fn around(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> Result<()> {
        (self.0)(ctx, next)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

/// A registered aspect. Immutable once registered.
pub struct AspectDefinition {
    pattern: Pattern,
    priority: i32,
    sequence: u64,
    aspect: Arc<dyn Aspect>,
}

impl AspectDefinition {
    /// Pattern selecting the operations this aspect wraps.
    #[must_use]
    pub const fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Priority; higher runs further out.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Registration order, used to break priority ties.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Aspect name, for logs.
    #[must_use]
    pub fn name(&self) -> &str {
        self.aspect.name()
    }

    /// Invoke the aspect.
    ///
    /// # Errors
    ///
    /// Propagates the aspect's result.
    pub fn invoke(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> Result<()> {
        self.aspect.around(ctx, next)
    }
}

impl fmt::Debug for AspectDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectDefinition")
            .field("pattern", &self.pattern)
            .field("priority", &self.priority)
            .field("sequence", &self.sequence)
            .field("aspect", &self.aspect.name())
            .finish()
    }
}

type Snapshot = Arc<Vec<Arc<AspectDefinition>>>;

/// Ordered set of aspects.
///
/// Definitions are kept sorted by priority, highest first; equal priorities
/// keep registration order. Readers work on an immutable snapshot, so a
/// registration racing a dispatch never exposes a half-updated list, and a
/// chain that has started keeps the snapshot it started with.
pub struct AspectRegistry {
    definitions: ArcSwap<Vec<Arc<AspectDefinition>>>,
    sequence: AtomicU64,
}

impl AspectRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            definitions: ArcSwap::from_pointee(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Register a closure aspect.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidPattern`] if `pattern` does not
    /// compile; nothing is registered in that case.
    pub fn register<F>(&self, pattern: &str, priority: i32, callback: F) -> std::result::Result<(), RegistrationError>
    where
        F: Fn(&mut ExecutionContext, Next<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.register_aspect(pattern, priority, FnAspect(callback))
    }

    /// Register an aspect value.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::InvalidPattern`] if `pattern` does not
    /// compile; nothing is registered in that case.
    pub fn register_aspect<A: Aspect>(
        &self,
        pattern: &str,
        priority: i32,
        aspect: A,
    ) -> std::result::Result<(), RegistrationError> {
        let pattern = Pattern::compile(pattern)?;
        let definition = Arc::new(AspectDefinition {
            pattern,
            priority,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            aspect: Arc::new(aspect),
        });

        tracing::debug!(
            pattern = %definition.pattern,
            priority,
            aspect = definition.name(),
            "Registering aspect"
        );

        self.definitions.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&definition));
            next.sort_by_key(|d| (Reverse(d.priority), d.sequence));
            next
        });

        Ok(())
    }

    /// Aspects applying to `path`, highest priority first.
    ///
    /// The sequence is lazy and reads a snapshot taken when this method is
    /// called; later registrations do not affect it.
    #[must_use]
    pub fn matching(&self, path: &str) -> Matching {
        Matching {
            snapshot: self.definitions.load_full(),
            path: path.to_string(),
            position: 0,
        }
    }

    /// Number of registered aspects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.load().len()
    }

    /// Whether no aspect is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.load().is_empty()
    }
}

impl Default for AspectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AspectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.definitions.load().iter()).finish()
    }
}

/// Lazy iterator over the aspects matching one path.
pub struct Matching {
    snapshot: Snapshot,
    path: String,
    position: usize,
}

impl Iterator for Matching {
    type Item = Arc<AspectDefinition>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(definition) = self.snapshot.get(self.position) {
            self.position += 1;
            if definition.pattern.matches(&self.path) {
                return Some(Arc::clone(definition));
            }
        }
        None
    }
}

/// The innermost layer of a chain: parameter resolution plus handler call.
pub type BaseInvocation<'a> = dyn Fn(&mut ExecutionContext) -> Result<()> + 'a;

/// Continuation standing for the rest of the chain.
///
/// Built once per call by the dispatcher over a fixed list of layers.
pub struct Next<'a> {
    layers: &'a [Arc<AspectDefinition>],
    base: &'a BaseInvocation<'a>,
}

impl<'a> Next<'a> {
    /// Chain `layers` (outermost first) around `base`.
    #[must_use]
    pub const fn new(layers: &'a [Arc<AspectDefinition>], base: &'a BaseInvocation<'a>) -> Self {
        Self { layers, base }
    }

    /// Run the rest of the chain.
    ///
    /// # Errors
    ///
    /// Returns the failure raised by an inner layer or the handler.
    pub fn run(self, ctx: &mut ExecutionContext) -> Result<()> {
        match self.layers.split_first() {
            Some((outer, inner)) => outer.invoke(ctx, Next::new(inner, self.base)),
            None => (self.base)(ctx),
        }
    }

    /// Number of aspects still ahead of the handler.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.layers.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.layers.len())
            .finish_non_exhaustive()
    }
}
