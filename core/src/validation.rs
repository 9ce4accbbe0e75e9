//! Record validation.
//!
//! Record parameters are checked in two passes after they are decoded:
//!
//! 1. **Field rules** declared by [`Validate::rules`]. Each failed rule is
//!    turned into a message through the field's message table, falling back
//!    to a generic message.
//! 2. **Hooks**: [`Validate::validate`] and [`Validate::validate_in`]. Both are
//!    always called; each failure adds one message.
//!
//! Rules are evaluated against the serialized form of the record, so nested
//! fields are addressed with dotted names (`address.city`).
//!
//! # Message tables
//!
//! A field's message string is either a list of `rule=message` entries
//! separated by commas, or a bare sentence used for every rule of that field:
//!
//! ```text
//! "required=name is required, max_length=name is too long"
//! "please provide a valid name"
//! ```
//!
//! Each distinct message string is parsed once and cached.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use weave_core::validation::{FieldRules, Validate};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Signup {
//!     name: String,
//!     age: i64,
//! }
//!
//! impl Validate for Signup {
//!     fn rules() -> Vec<FieldRules> {
//!         vec![
//!             FieldRules::new("name").required().message("required=name is required"),
//!             FieldRules::new("age").min(18.0),
//!         ]
//!     }
//! }
//! ```

use crate::operation::OperationDescriptor;
use crate::request::Request;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// One declarative rule.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Present and not the zero value of its type.
    Required,
    /// Number at least this large.
    Min(f64),
    /// Number at most this large.
    Max(f64),
    /// String or list at least this long.
    MinLength(usize),
    /// String or list at most this long.
    MaxLength(usize),
    /// String equal to one of the options.
    OneOf(Vec<String>),
    /// String matching the expression.
    Pattern(Regex),
}

impl Rule {
    /// Rule name, used as the message-table key.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Min(_) => "min",
            Self::Max(_) => "max",
            Self::MinLength(_) => "min_length",
            Self::MaxLength(_) => "max_length",
            Self::OneOf(_) => "one_of",
            Self::Pattern(_) => "pattern",
        }
    }

    /// Whether `value` (absent when `None`) satisfies the rule.
    ///
    /// Only `required` fails on an absent or null value; every other rule
    /// treats it as satisfied.
    #[must_use]
    pub fn check(&self, value: Option<&Value>) -> bool {
        let value = match value {
            None | Some(Value::Null) => return !matches!(self, Self::Required),
            Some(value) => value,
        };

        match self {
            Self::Required => !is_zero(value),
            Self::Min(min) => value.as_f64().is_none_or(|n| n >= *min),
            Self::Max(max) => value.as_f64().is_none_or(|n| n <= *max),
            Self::MinLength(min) => length(value).is_none_or(|len| len >= *min),
            Self::MaxLength(max) => length(value).is_none_or(|len| len <= *max),
            Self::OneOf(options) => scalar_text(value).is_none_or(|s| options.contains(&s)),
            Self::Pattern(regex) => value.as_str().is_none_or(|s| regex.is_match(s)),
        }
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Rules declared for one field.
#[derive(Debug, Clone)]
pub struct FieldRules {
    field: String,
    rules: Vec<Rule>,
    message: Option<String>,
}

impl FieldRules {
    /// Start declaring rules for `field` (dotted for nested fields).
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rules: Vec::new(),
            message: None,
        }
    }

    /// Add a rule.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add [`Rule::Required`].
    #[must_use]
    pub fn required(self) -> Self {
        self.rule(Rule::Required)
    }

    /// Add [`Rule::Min`].
    #[must_use]
    pub fn min(self, min: f64) -> Self {
        self.rule(Rule::Min(min))
    }

    /// Add [`Rule::Max`].
    #[must_use]
    pub fn max(self, max: f64) -> Self {
        self.rule(Rule::Max(max))
    }

    /// Add [`Rule::MinLength`].
    #[must_use]
    pub fn min_length(self, min: usize) -> Self {
        self.rule(Rule::MinLength(min))
    }

    /// Add [`Rule::MaxLength`].
    #[must_use]
    pub fn max_length(self, max: usize) -> Self {
        self.rule(Rule::MaxLength(max))
    }

    /// Add [`Rule::OneOf`].
    #[must_use]
    pub fn one_of<I, S>(self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule(Rule::OneOf(options.into_iter().map(Into::into).collect()))
    }

    /// Add [`Rule::Pattern`].
    #[must_use]
    pub fn pattern(self, regex: Regex) -> Self {
        self.rule(Rule::Pattern(regex))
    }

    /// Set the field's message table.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Field name.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Declared rules, in order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// What a self-validation hook can see.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Operation being called.
    pub operation: &'a OperationDescriptor,
    /// Inbound request.
    pub request: &'a Request,
    /// Name of the parameter being validated.
    pub parameter: &'a str,
}

/// Validation hooks for record parameters.
///
/// Every method has a default, so `impl Validate for T {}` declares a record
/// with no rules.
pub trait Validate {
    /// Declarative field rules. Computed once per type and cached.
    #[must_use]
    fn rules() -> Vec<FieldRules>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// Self-check without context.
    ///
    /// # Errors
    ///
    /// Returns a message describing the failure.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Self-check with access to the call.
    ///
    /// # Errors
    ///
    /// Returns a message describing the failure.
    fn validate_in(&self, cx: &ValidationContext<'_>) -> Result<(), String> {
        let _ = cx;
        Ok(())
    }
}

/// Parsed message table for one message string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageTable {
    by_rule: HashMap<String, String>,
    fallback: Option<String>,
}

impl MessageTable {
    /// Parse `rule=message` entries separated by commas. Entries without `=`
    /// become the fallback for rules without an entry of their own.
    #[must_use]
    pub fn parse(message: &str) -> Self {
        let mut table = Self::default();
        for part in message.split(',') {
            match part.split_once('=') {
                Some((rule, text)) if !rule.trim().is_empty() => {
                    table
                        .by_rule
                        .insert(rule.trim().to_string(), text.trim().to_string());
                }
                Some(_) => {}
                None if !part.trim().is_empty() => {
                    table.fallback = Some(part.trim().to_string());
                }
                None => {}
            }
        }
        table
    }

    /// Message for `rule`, if the table has one.
    #[must_use]
    pub fn lookup(&self, rule: &str) -> Option<&str> {
        self.by_rule
            .get(rule)
            .or(self.fallback.as_ref())
            .map(String::as_str)
    }
}

/// Read-mostly cache filled at most once per key.
struct OnceMap<K, V> {
    entries: RwLock<HashMap<K, Arc<V>>>,
}

impl<K: std::hash::Hash + Eq, V> OnceMap<K, V> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_insert_with(&self, key: K, build: impl FnOnce() -> V) -> Arc<V> {
        if let Some(found) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(found);
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have filled the entry between the two locks.
        Arc::clone(entries.entry(key).or_insert_with(|| Arc::new(build())))
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Evaluates rules and hooks, caching rule lists per type and message tables
/// per message string.
pub struct Validator {
    rules: OnceMap<TypeId, Vec<FieldRules>>,
    messages: OnceMap<String, MessageTable>,
}

impl Validator {
    /// Create a validator with empty caches.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: OnceMap::new(),
            messages: OnceMap::new(),
        }
    }

    /// Cached rule list for `T`.
    pub fn rules_for<T: Validate + 'static>(&self) -> Arc<Vec<FieldRules>> {
        self.rules.get_or_insert_with(TypeId::of::<T>(), T::rules)
    }

    /// Cached message table for a message string.
    pub fn message_table(&self, message: &str) -> Arc<MessageTable> {
        self.messages
            .get_or_insert_with(message.to_string(), || MessageTable::parse(message))
    }

    /// Number of record types whose rules have been computed.
    #[must_use]
    pub fn cached_types(&self) -> usize {
        self.rules.len()
    }

    /// Number of distinct message strings parsed.
    #[must_use]
    pub fn cached_messages(&self) -> usize {
        self.messages.len()
    }

    /// Run field rules then hooks, returning every failure message.
    #[must_use]
    pub fn check<T>(&self, value: &T, cx: &ValidationContext<'_>) -> Vec<String>
    where
        T: Validate + Serialize + 'static,
    {
        let mut messages = Vec::new();

        let rules = self.rules_for::<T>();
        if !rules.is_empty() {
            match serde_json::to_value(value) {
                Ok(tree) => self.check_fields(&rules, &tree, &mut messages),
                Err(err) => messages.push(format!("{} could not be inspected: {err}", cx.parameter)),
            }
        }

        if let Err(message) = value.validate() {
            messages.push(message);
        }
        if let Err(message) = value.validate_in(cx) {
            messages.push(message);
        }

        messages
    }

    fn check_fields(&self, rules: &[FieldRules], tree: &Value, messages: &mut Vec<String>) {
        for field in rules {
            let value = field_value(tree, &field.field);
            for rule in field.rules.iter().filter(|rule| !rule.check(value)) {
                messages.push(self.message_for(field, rule));
            }
        }
    }

    fn message_for(&self, field: &FieldRules, rule: &Rule) -> String {
        let custom = field.message.as_deref().and_then(|message| {
            self.message_table(message)
                .lookup(rule.name())
                .map(str::to_string)
        });
        custom.unwrap_or_else(|| format!("{} failed on the '{}' rule", field.field, rule.name()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("cached_types", &self.cached_types())
            .field("cached_messages", &self.cached_messages())
            .finish()
    }
}

fn field_value<'a>(tree: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(tree, |node, segment| node.as_object()?.get(segment))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use http::Method;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Address {
        city: String,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Signup {
        a: i64,
        b: i64,
        name: String,
        address: Address,
    }

    impl Validate for Signup {
        fn rules() -> Vec<FieldRules> {
            vec![
                FieldRules::new("a").required().message("required=a is required"),
                FieldRules::new("b").required().message("b must be provided"),
                FieldRules::new("address.city").required(),
            ]
        }

        fn validate(&self) -> Result<(), String> {
            if self.name == "root" {
                return Err("name is reserved".to_string());
            }
            Ok(())
        }

        fn validate_in(&self, cx: &ValidationContext<'_>) -> Result<(), String> {
            if cx.request.query("strict").is_some() && self.name.is_empty() {
                return Err(format!("{} needs a name in strict mode", cx.parameter));
            }
            Ok(())
        }
    }

    fn cx<'a>(op: &'a OperationDescriptor, req: &'a Request) -> ValidationContext<'a> {
        ValidationContext {
            operation: op,
            request: req,
            parameter: "signup",
        }
    }

    #[test]
    fn test_missing_fields_use_custom_and_generic_messages() {
        let validator = Validator::new();
        let op = OperationDescriptor::post("/signup");
        let req = Request::new(Method::POST, "/signup");

        let messages = validator.check(&Signup::default(), &cx(&op, &req));
        assert_eq!(
            messages,
            [
                "a is required",
                "b must be provided",
                "address.city failed on the 'required' rule"
            ]
        );
    }

    #[test]
    fn test_hooks_append_messages() {
        let validator = Validator::new();
        let op = OperationDescriptor::post("/signup");
        let req = Request::new(Method::POST, "/signup?strict=1");
        let value = Signup {
            a: 1,
            b: 2,
            address: Address { city: "Oslo".into() },
            ..Signup::default()
        };

        let messages = validator.check(&value, &cx(&op, &req));
        assert_eq!(messages, ["signup needs a name in strict mode"]);

        let root = Signup {
            name: "root".into(),
            ..value
        };
        assert_eq!(validator.check(&root, &cx(&op, &req)), ["name is reserved"]);
    }

    #[test]
    fn test_rules_and_messages_are_cached() {
        let validator = Validator::new();
        let op = OperationDescriptor::post("/signup");
        let req = Request::new(Method::POST, "/signup");

        let _ = validator.check(&Signup::default(), &cx(&op, &req));
        let _ = validator.check(&Signup::default(), &cx(&op, &req));

        assert_eq!(validator.cached_types(), 1);
        assert_eq!(validator.cached_messages(), 2);
        assert!(Arc::ptr_eq(
            &validator.rules_for::<Signup>(),
            &validator.rules_for::<Signup>()
        ));
    }

    #[test]
    fn test_message_table_parse() {
        let table = MessageTable::parse("required = name is required, max_length=too long");
        assert_eq!(table.lookup("required"), Some("name is required"));
        assert_eq!(table.lookup("max_length"), Some("too long"));
        assert_eq!(table.lookup("min"), None);

        let bare = MessageTable::parse("please check the name");
        assert_eq!(bare.lookup("required"), Some("please check the name"));
        assert_eq!(bare.lookup("pattern"), Some("please check the name"));
    }

    #[test]
    fn test_rule_checks() {
        assert!(!Rule::Required.check(None));
        assert!(!Rule::Required.check(Some(&json!(""))));
        assert!(!Rule::Required.check(Some(&json!(0))));
        assert!(Rule::Required.check(Some(&json!("x"))));

        assert!(Rule::Min(3.0).check(None));
        assert!(!Rule::Min(3.0).check(Some(&json!(2))));
        assert!(Rule::Max(3.0).check(Some(&json!(3))));
        assert!(!Rule::MaxLength(2).check(Some(&json!("abc"))));
        assert!(Rule::MinLength(1).check(Some(&json!([1]))));
        assert!(Rule::OneOf(vec!["a".into()]).check(Some(&json!("a"))));
        assert!(!Rule::OneOf(vec!["a".into()]).check(Some(&json!("b"))));

        let digits = Rule::Pattern(Regex::new(r"^\d+$").unwrap());
        assert!(digits.check(Some(&json!("123"))));
        assert!(!digits.check(Some(&json!("12a"))));
    }

    #[test]
    fn test_nested_field_lookup() {
        let tree = json!({"address": {"city": "Oslo"}});
        assert_eq!(field_value(&tree, "address.city"), Some(&json!("Oslo")));
        assert_eq!(field_value(&tree, "address.zip"), None);
        assert_eq!(field_value(&tree, "name.first"), None);
    }
}
