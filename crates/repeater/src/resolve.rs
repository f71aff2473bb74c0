//! Values that may be computed from the calling context
//!
//! Attempt budgets and timeout durations are either fixed or produced by a
//! resolver invoked against the context of each call. A resolver may itself
//! return another resolver; resolution walks the chain until it reaches a
//! plain value.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Longest resolver chain accepted before resolution gives up
pub const MAX_RESOLVE_DEPTH: usize = 32;

type ResolverFn<C, V> = Arc<dyn Fn(&C) -> Resolvable<C, V> + Send + Sync>;

/// A fixed value, or a function of the calling context producing one
pub enum Resolvable<C, V> {
    /// Used as is
    Value(V),
    /// Invoked once per resolution against the calling context
    Resolver(ResolverFn<C, V>),
}

impl<C, V> Resolvable<C, V> {
    /// A resolver computing the value from the context
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&C) -> V + Send + Sync + 'static,
    {
        Resolvable::Resolver(Arc::new(move |ctx: &C| Resolvable::Value(f(ctx))))
    }

    /// A resolver that may hand back another resolver
    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&C) -> Resolvable<C, V> + Send + Sync + 'static,
    {
        Resolvable::Resolver(Arc::new(f))
    }

    /// Check if this is a fixed value
    pub fn is_value(&self) -> bool {
        matches!(self, Resolvable::Value(_))
    }
}

impl<C, V: Clone> Resolvable<C, V> {
    /// Walk the resolver chain against `ctx` until a value comes out
    pub fn resolve(&self, ctx: &C) -> Result<V> {
        let mut current = match self {
            Resolvable::Value(value) => return Ok(value.clone()),
            Resolvable::Resolver(f) => f(ctx),
        };

        for _ in 1..MAX_RESOLVE_DEPTH {
            current = match current {
                Resolvable::Value(value) => return Ok(value),
                Resolvable::Resolver(f) => f(ctx),
            };
        }

        match current {
            Resolvable::Value(value) => Ok(value),
            Resolvable::Resolver(_) => Err(Error::resolve_depth(MAX_RESOLVE_DEPTH)),
        }
    }
}

impl<C, V> From<V> for Resolvable<C, V> {
    fn from(value: V) -> Self {
        Resolvable::Value(value)
    }
}

impl<C, V: Clone> Clone for Resolvable<C, V> {
    fn clone(&self) -> Self {
        match self {
            Resolvable::Value(value) => Resolvable::Value(value.clone()),
            Resolvable::Resolver(f) => Resolvable::Resolver(Arc::clone(f)),
        }
    }
}

impl<C, V: fmt::Debug> fmt::Debug for Resolvable<C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolvable::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolvable::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}
