//! Handler functions.
//!
//! Any `Fn(A1, .., An) -> Result<R>` with up to eight [`Param`] arguments
//! and an [`IntoResults`] return value is a [`Handler`]. The dispatcher
//! erases it into a [`BoxedHandler`] at registration, which keeps one
//! resolver per argument and a call that reads the resolved arguments back
//! out of the execution context.

use crate::context::Argument;
use crate::error::{DispatchError, Result};
use crate::param::{Param, ResolveContext, Resolved};
use serde::Serialize;
use serde_json::Value;
use std::any::type_name;
use std::fmt;

/// Type-erased resolution of one argument.
///
/// The second argument is the common-parameter override for the argument's
/// name, if a supplier produced one.
pub type Resolver = fn(&ResolveContext<'_>, Option<&Value>) -> Result<Resolved<Argument>>;

fn resolve_erased<T: Param>(
    cx: &ResolveContext<'_>,
    override_value: Option<&Value>,
) -> Result<Resolved<Argument>> {
    if let Some(value) = override_value {
        if let Some(converted) = T::from_override(value) {
            let violations = converted.override_violations(cx);
            return Ok(Resolved::invalid(Box::new(converted), violations));
        }
        tracing::warn!(
            parameter = %cx.spec.name,
            expected = type_name::<T>(),
            "Common parameter does not fit, reading the request instead"
        );
    }

    Ok(T::resolve(cx)?.map(|value| Box::new(value) as Argument))
}

fn take<'a, T: Param>(
    slots: &mut impl Iterator<Item = (usize, &'a Option<Argument>)>,
    arity: usize,
) -> Result<T> {
    let expected = type_name::<T>();
    let (index, slot) = slots
        .next()
        .ok_or(DispatchError::ArgumentType { index: arity, expected })?;
    slot.as_ref()
        .and_then(|value| value.downcast_ref::<T>())
        .cloned()
        .ok_or(DispatchError::ArgumentType { index, expected })
}

/// Return values a handler may produce.
pub trait IntoResults {
    /// Convert into the context's result list.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unclassified`] if a value cannot be encoded.
    fn into_results(self) -> Result<Vec<Value>>;
}

impl IntoResults for () {
    fn into_results(self) -> Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

impl IntoResults for Value {
    fn into_results(self) -> Result<Vec<Value>> {
        Ok(vec![self])
    }
}

/// A single serializable result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|err| anyhow::Error::from(err).into())
}

impl<T: Serialize> IntoResults for Json<T> {
    fn into_results(self) -> Result<Vec<Value>> {
        Ok(vec![encode(&self.0)?])
    }
}

macro_rules! tuple_results {
    ($($ty:ident),+) => {
        impl<$($ty: Serialize),+> IntoResults for ($($ty,)+) {
            #[allow(non_snake_case)]
            fn into_results(self) -> Result<Vec<Value>> {
                let ($($ty,)+) = self;
                Ok(vec![$(encode(&$ty)?),+])
            }
        }
    };
}

tuple_results!(T1);
tuple_results!(T1, T2);
tuple_results!(T1, T2, T3);
tuple_results!(T1, T2, T3, T4);

/// A function usable as an operation handler.
///
/// `Args` is the tuple of argument types; it only exists to keep the
/// implementations for different arities apart.
pub trait Handler<Args>: Send + Sync + 'static {
    /// One resolver per argument, in order.
    fn resolvers() -> Vec<Resolver>
    where
        Self: Sized;

    /// Call the handler with resolved arguments.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ArgumentType`] if a slot holds the wrong
    /// type, otherwise whatever the handler returns.
    fn call(&self, arguments: &[Option<Argument>]) -> Result<Vec<Value>>;
}

macro_rules! impl_handler {
    ($($ty:ident),*) => {
        impl<F, R, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> Result<R> + Send + Sync + 'static,
            R: IntoResults,
            $($ty: Param,)*
        {
            fn resolvers() -> Vec<Resolver> {
                vec![$(resolve_erased::<$ty> as Resolver),*]
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, arguments: &[Option<Argument>]) -> Result<Vec<Value>> {
                let arity = arguments.len();
                let mut slots = arguments.iter().enumerate();
                $(let $ty = take::<$ty>(&mut slots, arity)?;)*
                (self)($($ty),*)?.into_results()
            }
        }
    };
}

impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);

type ErasedCall = dyn Fn(&[Option<Argument>]) -> Result<Vec<Value>> + Send + Sync;

/// A handler with its argument types erased.
pub struct BoxedHandler {
    resolvers: Vec<Resolver>,
    call: Box<ErasedCall>,
}

impl BoxedHandler {
    /// Erase `handler`.
    pub fn new<H, Args>(handler: H) -> Self
    where
        H: Handler<Args>,
    {
        Self {
            resolvers: H::resolvers(),
            call: Box::new(move |arguments| handler.call(arguments)),
        }
    }

    /// Number of arguments the handler accepts.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.resolvers.len()
    }

    /// Resolvers, index-aligned with the arguments.
    #[must_use]
    pub fn resolvers(&self) -> &[Resolver] {
        &self.resolvers
    }

    /// Call the handler.
    ///
    /// # Errors
    ///
    /// See [`Handler::call`].
    pub fn call(&self, arguments: &[Option<Argument>]) -> Result<Vec<Value>> {
        (self.call)(arguments)
    }
}

impl fmt::Debug for BoxedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoxedHandler")
            .field("arity", &self.arity())
            .finish_non_exhaustive()
    }
}
