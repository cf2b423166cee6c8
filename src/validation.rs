//! Parameter validation.

use crate::service::DEFAULT_GROUP;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Validates an argument against the constraints of its declared type.
pub trait Validator: Send + Sync {
    /// Violation messages for `value` under `groups`; empty when valid.
    fn validate(&self, value: &Value, type_name: &str, groups: &[String]) -> Vec<String>;
}

/// A single constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    NotNull,
    /// Non-null and not empty after trimming (strings) or non-empty (arrays, objects).
    NotBlank,
    /// Length bounds for strings, arrays and objects. Null passes.
    Size { min: usize, max: usize },
    /// Inclusive numeric bounds. Null passes.
    Range { min: f64, max: f64 },
}

impl Constraint {
    fn check(&self, value: Option<&Value>) -> Option<String> {
        let value = value.filter(|v| !v.is_null());
        match (self, value) {
            (Self::NotNull, None) => Some("may not be null".to_string()),
            (Self::NotNull, Some(_)) => None,
            (Self::NotBlank, None) => Some("may not be empty".to_string()),
            (Self::NotBlank, Some(v)) => {
                let blank = match v {
                    Value::String(s) => s.trim().is_empty(),
                    Value::Array(items) => items.is_empty(),
                    Value::Object(fields) => fields.is_empty(),
                    _ => false,
                };
                blank.then(|| "may not be empty".to_string())
            }
            (Self::Size { .. }, None) | (Self::Range { .. }, None) => None,
            (Self::Size { min, max }, Some(v)) => {
                let len = match v {
                    Value::String(s) => s.chars().count(),
                    Value::Array(items) => items.len(),
                    Value::Object(fields) => fields.len(),
                    _ => return None,
                };
                (len < *min || len > *max)
                    .then(|| format!("size must be between {} and {}", min, max))
            }
            (Self::Range { min, max }, Some(v)) => {
                let n = match v {
                    Value::Number(n) => n.as_f64()?,
                    Value::String(s) => s.trim().parse::<f64>().ok()?,
                    _ => return None,
                };
                (n < *min || n > *max).then(|| format!("must be between {} and {}", min, max))
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNull => write!(f, "NotNull"),
            Self::NotBlank => write!(f, "NotBlank"),
            Self::Size { min, max } => write!(f, "Size({}..={})", min, max),
            Self::Range { min, max } => write!(f, "Range({}..={})", min, max),
        }
    }
}

#[derive(Debug, Clone)]
struct Rule {
    /// `None` targets the argument itself
    field: Option<String>,
    constraint: Constraint,
    groups: Vec<String>,
}

impl Rule {
    fn applies_to(&self, groups: &[String]) -> bool {
        self.groups.iter().any(|g| groups.contains(g))
    }
}

/// Rule-based validator keyed by declared parameter type.
#[derive(Debug, Clone, Default)]
pub struct ConstraintValidator {
    rules: HashMap<String, Vec<Rule>>,
}

impl ConstraintValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain `field` of `type_name` in the default group.
    pub fn field(self, type_name: &str, field: &str, constraint: Constraint) -> Self {
        self.field_in_groups(type_name, field, constraint, [DEFAULT_GROUP])
    }

    pub fn field_in_groups<I, S>(
        mut self,
        type_name: &str,
        field: &str,
        constraint: Constraint,
        groups: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(type_name, Some(field.to_string()), constraint, groups);
        self
    }

    /// Constrain the whole argument of `type_name` in the default group.
    pub fn value(mut self, type_name: &str, constraint: Constraint) -> Self {
        self.push(type_name, None, constraint, [DEFAULT_GROUP]);
        self
    }

    fn push<I, S>(&mut self, type_name: &str, field: Option<String>, constraint: Constraint, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.entry(type_name.to_string()).or_default().push(Rule {
            field,
            constraint,
            groups: groups.into_iter().map(Into::into).collect(),
        });
    }
}

impl Validator for ConstraintValidator {
    fn validate(&self, value: &Value, type_name: &str, groups: &[String]) -> Vec<String> {
        let Some(rules) = self.rules.get(type_name) else {
            return Vec::new();
        };

        let mut errors: Vec<String> = rules
            .iter()
            .filter(|rule| rule.applies_to(groups))
            .filter_map(|rule| match &rule.field {
                None => rule.constraint.check(Some(value)),
                // A null argument is not cascaded into.
                Some(_) if value.is_null() => None,
                Some(field) => rule
                    .constraint
                    .check(value.get(field))
                    .map(|message| format!("{} {}", field, message)),
            })
            .collect();
        errors.sort();
        errors
    }
}
