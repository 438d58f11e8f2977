//! Typed, validated command-line arguments
//!
//! An [`Argument`] is one named value contributing to a launched process's
//! command line. Its [`ArgumentType`] is declared with a small grammar:
//!
//! ```text
//! string | float | int | bool | file | path | password | selection
//! int[0..10]          inclusive numeric bounds
//! string[1..32]       inclusive length bounds
//! selection[a|b|c]    allowed literals
//! ```
//!
//! A malformed type is rejected when the argument is built; a bad value is
//! only rejected by [`Argument::validate`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ArgumentError, ArgumentErrorKind, Error, Result};

static TYPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z]+)\s*(?:\[(.*)\])?\s*$").expect("Invalid type pattern regex")
});

static RANGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*\.\.\s*(-?\d+(?:\.\d+)?)\s*$")
        .expect("Invalid range pattern regex")
});

/// Literals accepted for `bool` arguments (compared case-insensitively)
pub const BOOL_LITERALS: &[&str] = &["true", "false", "1", "0", "yes", "no", "y", "n"];

// ─────────────────────────────────────────────────────────
// Type Grammar
// ─────────────────────────────────────────────────────────

/// Base type tag of an argument, with any suffix stripped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    String,
    Float,
    Int,
    Bool,
    File,
    Path,
    Password,
    Selection,
}

impl BaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseType::String => "string",
            BaseType::Float => "float",
            BaseType::Int => "int",
            BaseType::Bool => "bool",
            BaseType::File => "file",
            BaseType::Path => "path",
            BaseType::Password => "password",
            BaseType::Selection => "selection",
        }
    }

    /// Whether a `[LOW..HIGH]` suffix is meaningful for this type
    fn accepts_range(&self) -> bool {
        matches!(
            self,
            BaseType::String | BaseType::Password | BaseType::Int | BaseType::Float
        )
    }
}

impl FromStr for BaseType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" => Ok(BaseType::String),
            "float" => Ok(BaseType::Float),
            "int" => Ok(BaseType::Int),
            "bool" => Ok(BaseType::Bool),
            "file" => Ok(BaseType::File),
            "path" => Ok(BaseType::Path),
            "password" => Ok(BaseType::Password),
            "selection" => Ok(BaseType::Selection),
            other => Err(format!("unknown base type '{}'", other)),
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suffix constraint attached to a base type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeConstraint {
    None,
    /// Inclusive bounds; value bounds for numbers, length bounds for text
    Range { low: f64, high: f64 },
    /// Allowed literals of a `selection`
    Choices(Vec<String>),
}

/// A parsed argument type declaration such as `float[0..10]`.
///
/// Serialized back to its original declaration string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArgumentType {
    base: BaseType,
    constraint: TypeConstraint,
    spec: String,
}

impl ArgumentType {
    /// Parse a type declaration. Returns the reason on failure.
    pub fn parse(spec: &str) -> std::result::Result<Self, String> {
        let caps = TYPE_PATTERN
            .captures(spec)
            .ok_or_else(|| "expected 'base' or 'base[...]'".to_string())?;

        let base: BaseType = caps[1].parse()?;
        let constraint = match caps.get(2).map(|m| m.as_str()) {
            None => {
                if base == BaseType::Selection {
                    return Err("selection requires options, e.g. selection[a|b]".to_string());
                }
                TypeConstraint::None
            }
            Some(body) if base == BaseType::Selection => {
                let choices: Vec<String> = body.split('|').map(|c| c.trim().to_string()).collect();
                if choices.iter().any(|c| c.is_empty()) {
                    return Err(format!("empty option in selection '{}'", body));
                }
                TypeConstraint::Choices(choices)
            }
            Some(body) => {
                if !base.accepts_range() {
                    return Err(format!("type '{}' does not take a range", base));
                }
                let range = RANGE_PATTERN
                    .captures(body)
                    .ok_or_else(|| format!("range '{}' must have the shape LOW..HIGH", body))?;
                let low: f64 = range[1].parse().map_err(|_| "invalid lower bound")?;
                let high: f64 = range[2].parse().map_err(|_| "invalid upper bound")?;
                if low > high {
                    return Err(format!("lower bound {} exceeds upper bound {}", low, high));
                }
                TypeConstraint::Range { low, high }
            }
        };

        Ok(Self {
            base,
            constraint,
            spec: spec.trim().to_string(),
        })
    }

    pub fn base(&self) -> BaseType {
        self.base
    }

    pub fn constraint(&self) -> &TypeConstraint {
        &self.constraint
    }

    /// The base type tag with any range/selection suffix stripped
    pub fn type_clear(&self) -> &'static str {
        self.base.as_str()
    }

    /// The original declaration, e.g. `int[0..10]`
    pub fn spec(&self) -> &str {
        &self.spec
    }
}

impl TryFrom<String> for ArgumentType {
    type Error = String;

    fn try_from(spec: String) -> std::result::Result<Self, Self::Error> {
        ArgumentType::parse(&spec).map_err(|reason| format!("invalid type '{}': {}", spec, reason))
    }
}

impl From<ArgumentType> for String {
    fn from(t: ArgumentType) -> Self {
        t.spec
    }
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

// ─────────────────────────────────────────────────────────
// Argument
// ─────────────────────────────────────────────────────────

/// One typed, named configuration value
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Argument {
    /// Stable key, rendered on the command line
    pub name: String,

    /// Display name, not used by composition
    #[serde(default)]
    pub name_human: Option<String>,

    #[serde(rename = "type")]
    pub arg_type: ArgumentType,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub required: bool,

    /// A required argument may still be empty
    #[serde(default)]
    pub empty_allowed_on_required: bool,

    /// Conditional requirement: `"other=literal"`
    #[serde(default)]
    pub required_on_argument: Option<String>,

    /// Space-separated value expands to one quoted token per element
    #[serde(default)]
    pub is_multi: bool,

    /// Logical value -> literal command-line token
    #[serde(default)]
    pub value_mapping: BTreeMap<String, String>,

    /// Supplied per invocation and never persisted
    #[serde(default)]
    pub is_runtime_argument: bool,

    #[serde(skip)]
    saved_value: Option<String>,
}

impl Argument {
    /// Build an argument, failing on a malformed type declaration.
    pub fn new(name: impl Into<String>, type_spec: &str) -> Result<Self> {
        let name = name.into();
        let arg_type = ArgumentType::parse(type_spec).map_err(|reason| Error::InvalidArgumentType {
            name: name.clone(),
            spec: type_spec.to_string(),
            reason,
        })?;

        Ok(Self {
            name,
            name_human: None,
            arg_type,
            value: None,
            required: false,
            empty_allowed_on_required: false,
            required_on_argument: None,
            is_multi: false,
            value_mapping: BTreeMap::new(),
            is_runtime_argument: false,
            saved_value: None,
        })
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_human_name(mut self, name: impl Into<String>) -> Self {
        self.name_human = Some(name.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn empty_allowed(mut self) -> Self {
        self.empty_allowed_on_required = true;
        self
    }

    pub fn required_on(mut self, condition: impl Into<String>) -> Self {
        self.required_on_argument = Some(condition.into());
        self
    }

    pub fn multi(mut self) -> Self {
        self.is_multi = true;
        self
    }

    pub fn runtime(mut self) -> Self {
        self.is_runtime_argument = true;
        self
    }

    pub fn map_value(mut self, logical: impl Into<String>, literal: impl Into<String>) -> Self {
        self.value_mapping.insert(logical.into(), literal.into());
        self
    }

    /// Name shown to users: the human name when set, otherwise the key
    pub fn display_name(&self) -> &str {
        self.name_human.as_deref().unwrap_or(&self.name)
    }

    /// Current value, `""` when unset
    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.value_str().is_empty()
    }

    /// Base type tag, used to pick a rendering/parsing strategy
    pub fn type_clear(&self) -> &'static str {
        self.arg_type.type_clear()
    }

    /// Literal rendered on the command line for the current value
    pub fn mapped_value(&self) -> &str {
        let value = self.value_str();
        self.value_mapping
            .get(value)
            .map(String::as_str)
            .unwrap_or(value)
    }

    /// Parsed `RequiredOnArgument` condition as `(other, literal)`
    pub fn condition(&self) -> Result<Option<(&str, &str)>> {
        match self.required_on_argument.as_deref() {
            None | Some("") => Ok(None),
            Some(cond) => cond
                .split_once('=')
                .map(|(other, literal)| Some((other.trim(), literal)))
                .ok_or_else(|| Error::InvalidCondition {
                    name: self.name.clone(),
                    condition: cond.to_string(),
                }),
        }
    }

    /// Snapshot the current value as the saved baseline
    pub fn mark_saved(&mut self) {
        self.saved_value = self.value.clone();
    }

    /// Whether the value differs from the last [`mark_saved`](Self::mark_saved) snapshot
    pub fn is_value_changed(&self) -> bool {
        self.saved_value.as_deref().unwrap_or_default() != self.value_str()
    }

    /// Validate the current value against required-ness, type and bounds.
    pub fn validate(&self) -> std::result::Result<(), ArgumentError> {
        if self.is_empty() {
            if self.required && !self.empty_allowed_on_required {
                return Err(ArgumentError::new(self, ArgumentErrorKind::Required));
            }
            return Ok(());
        }

        let value = self.value_str();
        match self.arg_type.base() {
            BaseType::Bool => {
                let lower = value.trim().to_ascii_lowercase();
                if !BOOL_LITERALS.contains(&lower.as_str()) {
                    return Err(self.invalid_format());
                }
            }
            BaseType::Int => {
                let n: i64 = value.trim().parse().map_err(|_| self.invalid_format())?;
                self.check_range(n as f64)?;
            }
            BaseType::Float => {
                let n: f64 = value.trim().parse().map_err(|_| self.invalid_format())?;
                if !n.is_finite() {
                    return Err(self.invalid_format());
                }
                self.check_range(n)?;
            }
            BaseType::String | BaseType::Password => {
                self.check_range(value.chars().count() as f64)?;
            }
            BaseType::File => {
                if !is_well_formed_path(value) || Path::new(value).file_name().is_none() {
                    return Err(self.invalid_format());
                }
            }
            BaseType::Path => {
                if !is_well_formed_path(value) {
                    return Err(self.invalid_format());
                }
            }
            BaseType::Selection => {
                if let TypeConstraint::Choices(choices) = self.arg_type.constraint() {
                    if !choices.iter().any(|c| c == value) {
                        return Err(ArgumentError::new(
                            self,
                            ArgumentErrorKind::NotInSelection {
                                choices: choices.clone(),
                            },
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    fn invalid_format(&self) -> ArgumentError {
        ArgumentError::new(self, ArgumentErrorKind::InvalidFormat)
    }

    fn check_range(&self, n: f64) -> std::result::Result<(), ArgumentError> {
        if let TypeConstraint::Range { low, high } = *self.arg_type.constraint() {
            if n < low || n > high {
                return Err(ArgumentError::new(
                    self,
                    ArgumentErrorKind::OutOfRange { low, high },
                ));
            }
        }
        Ok(())
    }
}

/// Syntactic path check; the path does not need to exist.
fn is_well_formed_path(value: &str) -> bool {
    if value.trim().is_empty() || value.contains('\0') {
        return false;
    }
    if cfg!(windows) {
        // A drive colon is only valid as the second character.
        let invalid = ['<', '>', '"', '|', '?', '*'];
        if value.chars().any(|c| invalid.contains(&c)) {
            return false;
        }
        if value.char_indices().any(|(i, c)| c == ':' && i != 1) {
            return false;
        }
    }
    true
}
