//! Argument converters
//!
//! A converter turns one raw token into an [`ArgValue`]. Parameters name
//! their converter by type name (`"int"`, `"user"`, ...) and the name is
//! looked up in a [`ConverterRegistry`] when the command is registered.
//!
//! Built-in converters:
//!
//! | name    | accepts                                          |
//! |---------|--------------------------------------------------|
//! | `str`   | anything, verbatim                               |
//! | `int`   | any number; non-integers are rounded             |
//! | `float` | any number                                       |
//! | `bool`  | yes/no, on/off, true/false, 1/0 and friends      |
//! | `user`  | a name known to the host's identity resolver     |
//!
//! Hosts add their own with [`ConverterRegistry::register`] or
//! [`FnConverter`].

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use anyhow::{anyhow, bail};

use crate::args::ArgValue;
use crate::error::{RegResult, RegistrationError};
use crate::host::IdentityResolver;
use crate::invocation::ChatMessage;

/// What a converter can see while converting
pub struct ConvertContext<'a> {
    pub message: &'a ChatMessage,
    /// Qualified name of the command being resolved
    pub command: &'a str,
    pub identities: &'a dyn IdentityResolver,
}

/// Turns a raw token into a typed value
pub trait Converter: Send + Sync {
    /// Name parameters use to refer to this converter
    fn type_name(&self) -> &str;

    /// Convert `raw`; an error rejects the token
    fn convert(&self, ctx: &ConvertContext<'_>, raw: &str) -> anyhow::Result<ArgValue>;
}

impl fmt::Debug for dyn Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Converter({})", self.type_name())
    }
}

/// Shared handle to a converter
pub type ConverterRef = Arc<dyn Converter>;

// =============================================================================
// Built-in Converters
// =============================================================================

/// Passes text through unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct StrConverter;

impl Converter for StrConverter {
    fn type_name(&self) -> &str {
        "str"
    }

    fn convert(&self, _ctx: &ConvertContext<'_>, raw: &str) -> anyhow::Result<ArgValue> {
        Ok(ArgValue::Str(raw.to_string()))
    }
}

/// Parses a number and rounds it to the nearest integer
#[derive(Debug, Default, Clone, Copy)]
pub struct IntConverter;

impl Converter for IntConverter {
    fn type_name(&self) -> &str {
        "int"
    }

    fn convert(&self, _ctx: &ConvertContext<'_>, raw: &str) -> anyhow::Result<ArgValue> {
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("\"{}\" is not a number", raw))?;
        let rounded = value.round();
        if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
            bail!("\"{}\" is out of range", raw);
        }
        Ok(ArgValue::Int(rounded as i64))
    }
}

/// Parses a floating-point number
#[derive(Debug, Default, Clone, Copy)]
pub struct FloatConverter;

impl Converter for FloatConverter {
    fn type_name(&self) -> &str {
        "float"
    }

    fn convert(&self, _ctx: &ConvertContext<'_>, raw: &str) -> anyhow::Result<ArgValue> {
        raw.trim()
            .parse::<f64>()
            .map(ArgValue::Float)
            .map_err(|_| anyhow!("\"{}\" is not a number", raw))
    }
}

/// Words accepted as true
pub const TRUE_WORDS: &[&str] = &["yes", "y", "true", "t", "1", "enable", "on", "win"];

/// Words accepted as false
pub const FALSE_WORDS: &[&str] = &["no", "n", "false", "f", "0", "disable", "off", "lose"];

/// Parse a yes/no word, case-insensitively
pub fn parse_bool(raw: &str) -> Option<bool> {
    let lowered = raw.to_lowercase();
    if TRUE_WORDS.contains(&lowered.as_str()) {
        Some(true)
    } else if FALSE_WORDS.contains(&lowered.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Accepts the yes/no vocabulary
#[derive(Debug, Default, Clone, Copy)]
pub struct BoolConverter;

impl Converter for BoolConverter {
    fn type_name(&self) -> &str {
        "bool"
    }

    fn convert(&self, _ctx: &ConvertContext<'_>, raw: &str) -> anyhow::Result<ArgValue> {
        parse_bool(raw)
            .map(ArgValue::Bool)
            .ok_or_else(|| anyhow!("\"{}\" is not a yes or no answer", raw))
    }
}

/// Resolves a user name through the host
#[derive(Debug, Default, Clone, Copy)]
pub struct UserConverter;

impl Converter for UserConverter {
    fn type_name(&self) -> &str {
        "user"
    }

    fn convert(&self, ctx: &ConvertContext<'_>, raw: &str) -> anyhow::Result<ArgValue> {
        let name = raw.trim_start_matches('@').to_lowercase();
        ctx.identities
            .resolve_user(&name)
            .map(ArgValue::User)
            .ok_or_else(|| anyhow!("\"{}\" is not a user", raw))
    }
}

// =============================================================================
// Closure-based Converter
// =============================================================================

/// Converter backed by a closure
///
/// # Example
///
/// ```rust
/// use chatbot_cmd::{ArgValue, FnConverter};
///
/// let upper = FnConverter::new("upper", |_ctx, raw| Ok(ArgValue::Str(raw.to_uppercase())));
/// ```
pub struct FnConverter<F>
where
    F: Fn(&ConvertContext<'_>, &str) -> anyhow::Result<ArgValue> + Send + Sync,
{
    type_name: String,
    convert: F,
}

impl<F> FnConverter<F>
where
    F: Fn(&ConvertContext<'_>, &str) -> anyhow::Result<ArgValue> + Send + Sync,
{
    pub fn new(type_name: impl Into<String>, convert: F) -> Self {
        Self {
            type_name: type_name.into(),
            convert,
        }
    }
}

impl<F> Converter for FnConverter<F>
where
    F: Fn(&ConvertContext<'_>, &str) -> anyhow::Result<ArgValue> + Send + Sync,
{
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn convert(&self, ctx: &ConvertContext<'_>, raw: &str) -> anyhow::Result<ArgValue> {
        (self.convert)(ctx, raw)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Converters indexed by type name
#[derive(Debug, Clone)]
pub struct ConverterRegistry {
    converters: AHashMap<String, ConverterRef>,
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ConverterRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            converters: AHashMap::new(),
        }
    }

    /// Create a registry holding the built-in converters
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        let builtins: [ConverterRef; 5] = [
            Arc::new(StrConverter),
            Arc::new(IntConverter),
            Arc::new(FloatConverter),
            Arc::new(BoolConverter),
            Arc::new(UserConverter),
        ];
        for converter in builtins {
            registry
                .converters
                .insert(converter.type_name().to_string(), converter);
        }
        registry
    }

    /// Add a converter; type names are unique
    pub fn register<C: Converter + 'static>(&mut self, converter: C) -> RegResult<()> {
        self.register_arc(Arc::new(converter))
    }

    /// Add a shared converter
    pub fn register_arc(&mut self, converter: ConverterRef) -> RegResult<()> {
        let name = converter.type_name().to_string();
        if self.converters.contains_key(&name) {
            return Err(RegistrationError::DuplicateConverter(name));
        }
        log::debug!("registered converter {}", name);
        self.converters.insert(name, converter);
        Ok(())
    }

    /// Look up a converter by type name
    pub fn get(&self, type_name: &str) -> Option<ConverterRef> {
        self.converters.get(type_name).cloned()
    }

    /// Check if a type name is known
    pub fn contains(&self, type_name: &str) -> bool {
        self.converters.contains_key(type_name)
    }

    /// Known type names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.converters.keys().map(|s| s.as_str())
    }
}
