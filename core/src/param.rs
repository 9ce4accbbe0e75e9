//! Handler parameter types and how each is resolved.
//!
//! The declared type of a handler argument decides how it is read:
//!
//! | Type                          | Resolution                                                   |
//! |-------------------------------|--------------------------------------------------------------|
//! | `String`, integers, `bool`, `f64` | one named value, form then query; zero value if absent or unparsable |
//! | `Vec<T>` of scalars           | one named value split on the configured delimiter            |
//! | `HashMap<String, V>`          | JSON body, falling back to query pairs as strings            |
//! | [`Record<T>`]                 | decoded from the declared source, then validated             |
//! | `Box<T>`                      | `T`, boxed                                                   |
//! | [`RequestHandle`], [`ResponseHandle`], [`Tx`](crate::transaction::Tx) | taken from the call, never parsed |
//!
//! Scalars never fail to resolve. Records always produce an instance, even
//! an invalid one; their failures are reported as violations that the
//! pipeline raises as a [`ValidationError`](crate::error::ValidationError).

use crate::config::EngineConfig;
use crate::error::Result;
use crate::operation::{OperationDescriptor, ParamSource, ParamSpec};
use crate::request::{RequestHandle, ResponseHandle};
use crate::validation::{Validate, ValidationContext, Validator};
use http::Extensions;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// Everything a parameter may be resolved from.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Inbound request.
    pub request: &'a RequestHandle,
    /// Response slot of the call.
    pub response: &'a ResponseHandle,
    /// Request-scoped resources.
    pub side_channel: &'a Extensions,
    /// Operation being called.
    pub operation: &'a OperationDescriptor,
    /// Spec of the parameter being resolved.
    pub spec: &'a ParamSpec,
    /// Engine configuration.
    pub config: &'a EngineConfig,
    /// Shared validator.
    pub validator: &'a Validator,
}

impl ResolveContext<'_> {
    /// The single named value for this parameter: posted form first, then
    /// query.
    #[must_use]
    pub fn named_value(&self) -> Option<&str> {
        self.request.value(&self.spec.name)
    }

    /// Validation context for this parameter.
    #[must_use]
    pub fn validation(&self) -> ValidationContext<'_> {
        ValidationContext {
            operation: self.operation,
            request: self.request,
            parameter: &self.spec.name,
        }
    }
}

/// A resolved value plus any validation failures found on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    /// The value handed to the handler.
    pub value: T,
    /// Validation failures, in reporting order.
    pub violations: Vec<String>,
}

impl<T> Resolved<T> {
    /// A value without failures.
    pub const fn valid(value: T) -> Self {
        Self {
            value,
            violations: Vec::new(),
        }
    }

    /// A value with failures.
    pub const fn invalid(value: T, violations: Vec<String>) -> Self {
        Self { value, violations }
    }

    /// Transform the value, keeping the failures.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        Resolved {
            value: f(self.value),
            violations: self.violations,
        }
    }
}

/// A type that can appear as a handler argument.
pub trait Param: Clone + Send + 'static {
    /// Resolve the value for one call.
    ///
    /// # Errors
    ///
    /// Only resource parameters fail outright, when the resource is missing.
    fn resolve(cx: &ResolveContext<'_>) -> Result<Resolved<Self>>;

    /// Convert a common-parameter override. `None` means the override does
    /// not fit and the request is read instead.
    #[must_use]
    fn from_override(value: &Value) -> Option<Self> {
        let _ = value;
        None
    }

    /// Failures found in a value taken from a common-parameter override.
    /// Overrides skip [`Param::resolve`], so types that validate what they
    /// read check the override here.
    #[must_use]
    fn override_violations(&self, cx: &ResolveContext<'_>) -> Vec<String> {
        let _ = cx;
        Vec::new()
    }
}

/// Types read from a single text value.
pub trait Scalar: Default + Clone + Send + 'static {
    /// Parse one text value.
    fn parse_scalar(raw: &str) -> Option<Self>;

    /// Convert a JSON value.
    fn from_json(value: &Value) -> Option<Self>;
}

impl Scalar for String {
    fn parse_scalar(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl Scalar for bool {
    fn parse_scalar(raw: &str) -> Option<Self> {
        match raw.trim() {
            "true" | "1" | "on" => Some(true),
            "false" | "0" | "off" => Some(false),
            _ => None,
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::String(s) => Self::parse_scalar(s),
            _ => None,
        }
    }
}

macro_rules! numeric_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                fn parse_scalar(raw: &str) -> Option<Self> {
                    raw.trim().parse().ok()
                }

                fn from_json(value: &Value) -> Option<Self> {
                    match value {
                        Value::String(s) => Self::parse_scalar(s),
                        other => serde_json::from_value(other.clone()).ok(),
                    }
                }
            }
        )*
    };
}

numeric_scalar!(i32, i64, u32, u64, f64);

macro_rules! scalar_param {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Param for $ty {
                fn resolve(cx: &ResolveContext<'_>) -> Result<Resolved<Self>> {
                    let value = cx
                        .named_value()
                        .and_then(<$ty as Scalar>::parse_scalar)
                        .unwrap_or_default();
                    Ok(Resolved::valid(value))
                }

                fn from_override(value: &Value) -> Option<Self> {
                    <$ty as Scalar>::from_json(value)
                }
            }
        )*
    };
}

scalar_param!(String, bool, i32, i64, u32, u64, f64);

impl<T: Scalar> Param for Vec<T> {
    fn resolve(cx: &ResolveContext<'_>) -> Result<Resolved<Self>> {
        let items = match cx.named_value() {
            Some(raw) if !raw.is_empty() => raw
                .split(cx.config.sequence_delimiter)
                .map(|item| T::parse_scalar(item).unwrap_or_default())
                .collect(),
            _ => Vec::new(),
        };
        Ok(Resolved::valid(items))
    }

    fn from_override(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.iter().map(T::from_json).collect(),
            _ => T::from_json(value).map(|item| vec![item]),
        }
    }
}

impl<V> Param for HashMap<String, V>
where
    V: DeserializeOwned + From<String> + Clone + Send + 'static,
{
    fn resolve(cx: &ResolveContext<'_>) -> Result<Resolved<Self>> {
        if let Ok(map) = serde_json::from_slice::<Self>(cx.request.body()) {
            return Ok(Resolved::valid(map));
        }

        let map = cx
            .request
            .query_pairs()
            .iter()
            .map(|(key, value)| (key.clone(), V::from(value.clone())))
            .collect();
        Ok(Resolved::valid(map))
    }

    fn from_override(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl<T: Param> Param for Box<T> {
    fn resolve(cx: &ResolveContext<'_>) -> Result<Resolved<Self>> {
        Ok(T::resolve(cx)?.map(Box::new))
    }

    fn from_override(value: &Value) -> Option<Self> {
        T::from_override(value).map(Box::new)
    }
}

impl Param for RequestHandle {
    fn resolve(cx: &ResolveContext<'_>) -> Result<Resolved<Self>> {
        Ok(Resolved::valid(cx.request.clone()))
    }
}

impl Param for ResponseHandle {
    fn resolve(cx: &ResolveContext<'_>) -> Result<Resolved<Self>> {
        Ok(Resolved::valid(cx.response.clone()))
    }
}

/// A structured parameter decoded from the request and validated.
///
/// The record type should carry `#[serde(default)]` so absent fields decode
/// to their zero values and are reported by field rules instead of failing
/// the whole decode.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use weave_core::param::Record;
/// use weave_core::validation::{FieldRules, Validate};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// #[serde(default)]
/// struct NewTodo {
///     title: String,
/// }
///
/// impl Validate for NewTodo {
///     fn rules() -> Vec<FieldRules> {
///         vec![FieldRules::new("title").required()]
///     }
/// }
///
/// fn create(todo: Record<NewTodo>) -> weave_core::Result<()> {
///     println!("{}", todo.title);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record<T>(pub T);

impl<T> Record<T> {
    /// Unwrap the record.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Record<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Record<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> Param for Record<T>
where
    T: DeserializeOwned + Serialize + Default + Validate + Clone + Send + 'static,
{
    fn resolve(cx: &ResolveContext<'_>) -> Result<Resolved<Self>> {
        let (value, mut violations) = match decode::<T>(cx) {
            Ok(value) => (value, Vec::new()),
            Err(message) => (T::default(), vec![message]),
        };

        violations.extend(cx.validator.check(&value, &cx.validation()));
        Ok(Resolved::invalid(Self(value), violations))
    }

    fn from_override(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok().map(Self)
    }

    fn override_violations(&self, cx: &ResolveContext<'_>) -> Vec<String> {
        cx.validator.check(&self.0, &cx.validation())
    }
}

fn decode<T: DeserializeOwned + Default>(cx: &ResolveContext<'_>) -> std::result::Result<T, String> {
    let request = cx.request;
    let name = &cx.spec.name;
    match cx.spec.source {
        ParamSource::Json => decode_json(request.body(), name),
        ParamSource::Query => decode_query(request.query_string(), name),
        ParamSource::Form => decode_form(request.body(), name),
        ParamSource::Implicit => {
            if request.is_form() {
                decode_form(request.body(), name)
            } else if request.body().is_empty() {
                decode_query(request.query_string(), name)
            } else {
                decode_json(request.body(), name)
                    .or_else(|_| decode_query(request.query_string(), name))
            }
        }
    }
}

fn decode_json<T: DeserializeOwned + Default>(body: &[u8], name: &str) -> std::result::Result<T, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| format!("{name}: malformed JSON body: {err}"))
}

fn decode_query<T: DeserializeOwned>(query: &str, name: &str) -> std::result::Result<T, String> {
    serde_urlencoded::from_str(query).map_err(|err| format!("{name}: malformed query string: {err}"))
}

fn decode_form<T: DeserializeOwned>(body: &[u8], name: &str) -> std::result::Result<T, String> {
    serde_urlencoded::from_bytes(body).map_err(|err| format!("{name}: malformed form body: {err}"))
}
