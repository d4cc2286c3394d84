//! Flag Sets
//!
//! A mutable registry of named, typed command-line options. The host and
//! every extension declare their flags into the same set for a workflow;
//! the command-line layer turns the set into real arguments and writes the
//! parsed values back before any extension reads them.
//!
//! Declarations never fail at the call site. A declaration whose long name
//! or shorthand is already taken is dropped and recorded as a
//! [`FlagConflict`]; the host surfaces it with [`FlagSet::check_conflicts`]
//! before anything runs.
//!
//! # Example
//!
//! ```rust
//! use meshctl_core::flags::FlagSet;
//! use std::time::Duration;
//!
//! let mut flags = FlagSet::new("connectivity test");
//! flags
//!     .string("namespace", "kube-system", "Namespace the agent runs in")
//!     .duration("timeout", Duration::from_secs(15), "Per-test timeout");
//!
//! {
//!     let mut ext = flags.owned_by("acme");
//!     ext.bool("acme-strict", false, "Enable strict checks");
//! }
//!
//! flags.set("timeout", "1m30s").unwrap();
//! assert_eq!(flags.get_duration("timeout").unwrap(), Duration::from_secs(90));
//! assert_eq!(flags.lookup("acme-strict").unwrap().owner(), "acme");
//! ```

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::error::{Error, Result};

/// Owner recorded for flags the host itself declares.
pub const HOST_OWNER: &str = "meshctl";

// ─────────────────────────────────────────────────────────────────────────────
// Flag Values
// ─────────────────────────────────────────────────────────────────────────────

/// The type of value a flag accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagKind {
    String,
    Bool,
    Int,
    Duration,
    StringSlice,
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagKind::String => write!(f, "string"),
            FlagKind::Bool => write!(f, "bool"),
            FlagKind::Int => write!(f, "int"),
            FlagKind::Duration => write!(f, "duration"),
            FlagKind::StringSlice => write!(f, "string-slice"),
        }
    }
}

/// A typed flag value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    String(String),
    Bool(bool),
    Int(i64),
    Duration(Duration),
    StringSlice(Vec<String>),
}

impl FlagValue {
    /// Kind of this value.
    pub fn kind(&self) -> FlagKind {
        match self {
            FlagValue::String(_) => FlagKind::String,
            FlagValue::Bool(_) => FlagKind::Bool,
            FlagValue::Int(_) => FlagKind::Int,
            FlagValue::Duration(_) => FlagKind::Duration,
            FlagValue::StringSlice(_) => FlagKind::StringSlice,
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::String(s) => write!(f, "{}", s),
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::Int(i) => write!(f, "{}", i),
            FlagValue::Duration(d) => write!(f, "{}", format_duration(*d)),
            FlagValue::StringSlice(values) => write!(f, "{}", values.join(",")),
        }
    }
}

impl Serialize for FlagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FlagValue::String(s) => serializer.serialize_str(s),
            FlagValue::Bool(b) => serializer.serialize_bool(*b),
            FlagValue::Int(i) => serializer.serialize_i64(*i),
            FlagValue::Duration(d) => serializer.serialize_str(&format_duration(*d)),
            FlagValue::StringSlice(values) => values.serialize(serializer),
        }
    }
}

/// Parse a duration such as `250ms`, `15s`, `5m` or `1h30m`.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let too_large = || format!("duration {:?} is too large", input);
    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("expected a number in {:?}", input));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|e| format!("{} in {:?}", e, input))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let multiplier = match unit {
            "ms" => {
                total = total
                    .checked_add(Duration::from_millis(value))
                    .ok_or_else(too_large)?;
                continue;
            }
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            "" => return Err(format!("missing unit in {:?}", input)),
            other => return Err(format!("unknown unit {:?} in {:?}", other, input)),
        };
        let secs = value.checked_mul(multiplier).ok_or_else(too_large)?;
        total = total
            .checked_add(Duration::from_secs(secs))
            .ok_or_else(too_large)?;
    }

    Ok(total)
}

/// Format a duration in the same notation [`parse_duration`] accepts.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    let millis = d.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }

    let mut secs = d.as_secs();
    let mut out = String::new();
    let hours = secs / 3600;
    secs %= 3600;
    let minutes = secs / 60;
    secs %= 60;
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if secs > 0 {
        out.push_str(&format!("{}s", secs));
    }
    out
}

fn parse_value(name: &str, kind: FlagKind, raw: &str) -> Result<FlagValue> {
    let value = match kind {
        FlagKind::String => FlagValue::String(raw.to_string()),
        FlagKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => FlagValue::Bool(true),
            "false" | "0" | "no" => FlagValue::Bool(false),
            _ => return Err(Error::invalid_value(name, format!("{:?} is not a boolean", raw))),
        },
        FlagKind::Int => FlagValue::Int(
            raw.trim()
                .parse()
                .map_err(|e| Error::invalid_value(name, format!("{:?}: {}", raw, e)))?,
        ),
        FlagKind::Duration => {
            FlagValue::Duration(parse_duration(raw).map_err(|e| Error::invalid_value(name, e))?)
        }
        FlagKind::StringSlice => FlagValue::StringSlice(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        ),
    };
    Ok(value)
}

// ─────────────────────────────────────────────────────────────────────────────
// Flag Definitions
// ─────────────────────────────────────────────────────────────────────────────

/// A single named option.
#[derive(Debug, Clone)]
pub struct Flag {
    name: String,
    short: Option<char>,
    usage: String,
    default: FlagValue,
    owner: String,
    hidden: bool,
}

impl Flag {
    /// Create a flag with a default value. The kind follows the default.
    pub fn new(name: impl Into<String>, default: FlagValue, usage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short: None,
            usage: usage.into(),
            default,
            owner: String::new(),
            hidden: false,
        }
    }

    /// Set a single-character shorthand.
    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    /// Hide the flag from help output.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shorthand(&self) -> Option<char> {
        self.short
    }

    pub fn usage(&self) -> &str {
        &self.usage
    }

    pub fn default_value(&self) -> &FlagValue {
        &self.default
    }

    pub fn kind(&self) -> FlagKind {
        self.default.kind()
    }

    /// Who declared the flag: [`HOST_OWNER`] or an extension name.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }
}

/// A rejected declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagConflict {
    /// Name as the rejected declaration spelled it (with shorthand if that collided).
    pub name: String,
    /// Owner of the rejected declaration.
    pub owner: String,
    /// Owner of the flag that was already there.
    pub existing_owner: String,
}

impl From<&FlagConflict> for Error {
    fn from(conflict: &FlagConflict) -> Self {
        Error::FlagCollision {
            name: conflict.name.clone(),
            owner: conflict.owner.clone(),
            existing_owner: conflict.existing_owner.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flag Set
// ─────────────────────────────────────────────────────────────────────────────

/// Named, typed options for one workflow.
#[derive(Debug, Clone)]
pub struct FlagSet {
    name: String,
    owner: String,
    flags: Vec<Flag>,
    index: HashMap<String, usize>,
    values: HashMap<String, FlagValue>,
    conflicts: Vec<FlagConflict>,
}

impl FlagSet {
    /// Create an empty flag set. Declarations are attributed to the host
    /// until [`FlagSet::owned_by`] says otherwise.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: HOST_OWNER.to_string(),
            flags: Vec::new(),
            index: HashMap::new(),
            values: HashMap::new(),
            conflicts: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owner new declarations are attributed to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Attribute declarations made through the returned guard to `owner`.
    pub fn owned_by(&mut self, owner: impl Into<String>) -> OwnerScope<'_> {
        let previous = std::mem::replace(&mut self.owner, owner.into());
        OwnerScope { set: self, previous }
    }

    /// Declare a flag.
    pub fn add(&mut self, mut flag: Flag) -> &mut Self {
        debug_assert!(
            !flag.name.is_empty() && !flag.name.starts_with('-'),
            "malformed flag name {:?}",
            flag.name
        );
        flag.owner = self.owner.clone();

        if let Some(conflict) = self.find_conflict(&flag) {
            tracing::warn!(
                flag_set = %self.name,
                flag = %conflict.name,
                owner = %conflict.owner,
                existing_owner = %conflict.existing_owner,
                "flag declaration collides with an existing flag"
            );
            self.conflicts.push(conflict);
            return self;
        }

        tracing::trace!(flag_set = %self.name, flag = %flag.name, owner = %flag.owner, "flag declared");
        self.index.insert(flag.name.clone(), self.flags.len());
        self.flags.push(flag);
        self
    }

    /// Declare a string flag.
    pub fn string(
        &mut self,
        name: impl Into<String>,
        default: impl Into<String>,
        usage: impl Into<String>,
    ) -> &mut Self {
        self.add(Flag::new(name, FlagValue::String(default.into()), usage))
    }

    /// Declare a boolean flag.
    pub fn bool(&mut self, name: impl Into<String>, default: bool, usage: impl Into<String>) -> &mut Self {
        self.add(Flag::new(name, FlagValue::Bool(default), usage))
    }

    /// Declare an integer flag.
    pub fn int(&mut self, name: impl Into<String>, default: i64, usage: impl Into<String>) -> &mut Self {
        self.add(Flag::new(name, FlagValue::Int(default), usage))
    }

    /// Declare a duration flag.
    pub fn duration(
        &mut self,
        name: impl Into<String>,
        default: Duration,
        usage: impl Into<String>,
    ) -> &mut Self {
        self.add(Flag::new(name, FlagValue::Duration(default), usage))
    }

    /// Declare a repeatable string flag.
    pub fn string_slice<I, S>(&mut self, name: impl Into<String>, default: I, usage: impl Into<String>) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let default = default.into_iter().map(Into::into).collect();
        self.add(Flag::new(name, FlagValue::StringSlice(default), usage))
    }

    fn find_conflict(&self, flag: &Flag) -> Option<FlagConflict> {
        if let Some(existing) = self.lookup(&flag.name) {
            return Some(FlagConflict {
                name: flag.name.clone(),
                owner: flag.owner.clone(),
                existing_owner: existing.owner.clone(),
            });
        }

        let short = flag.short?;
        self.flags
            .iter()
            .find(|f| f.short == Some(short))
            .map(|existing| FlagConflict {
                name: format!("{} (shorthand -{})", flag.name, short),
                owner: flag.owner.clone(),
                existing_owner: existing.owner.clone(),
            })
    }

    /// Look up a flag by long name.
    pub fn lookup(&self, name: &str) -> Option<&Flag> {
        self.index.get(name).map(|&i| &self.flags[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Flags in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    /// Number of flags declared by `owner`.
    pub fn count_owned_by(&self, owner: &str) -> usize {
        self.flags.iter().filter(|f| f.owner == owner).count()
    }

    /// Declarations rejected so far.
    pub fn conflicts(&self) -> &[FlagConflict] {
        &self.conflicts
    }

    /// Fail with the first recorded collision, if any.
    pub fn check_conflicts(&self) -> Result<()> {
        match self.conflicts.first() {
            Some(conflict) => Err(conflict.into()),
            None => Ok(()),
        }
    }

    /// Set a flag from its raw command-line text.
    ///
    /// Slice flags accumulate across calls and split on commas; the first
    /// call replaces the default.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<()> {
        let flag = self
            .lookup(name)
            .ok_or_else(|| Error::UnknownFlag(name.to_string()))?;
        let parsed = parse_value(name, flag.kind(), raw)?;

        match self.values.get_mut(name) {
            Some(FlagValue::StringSlice(existing)) => {
                if let FlagValue::StringSlice(more) = parsed {
                    existing.extend(more);
                }
            }
            _ => {
                self.values.insert(name.to_string(), parsed);
            }
        }
        Ok(())
    }

    /// Whether a value was set explicitly.
    pub fn changed(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Effective value: the parsed one, or the default.
    pub fn value(&self, name: &str) -> Result<&FlagValue> {
        if let Some(value) = self.values.get(name) {
            return Ok(value);
        }
        self.lookup(name)
            .map(Flag::default_value)
            .ok_or_else(|| Error::UnknownFlag(name.to_string()))
    }

    fn mismatch(name: &str, expected: FlagKind, actual: &FlagValue) -> Error {
        Error::FlagTypeMismatch {
            name: name.to_string(),
            expected,
            actual: actual.kind(),
        }
    }

    pub fn get_string(&self, name: &str) -> Result<String> {
        match self.value(name)? {
            FlagValue::String(s) => Ok(s.clone()),
            other => Err(Self::mismatch(name, FlagKind::String, other)),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.value(name)? {
            FlagValue::Bool(b) => Ok(*b),
            other => Err(Self::mismatch(name, FlagKind::Bool, other)),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        match self.value(name)? {
            FlagValue::Int(i) => Ok(*i),
            other => Err(Self::mismatch(name, FlagKind::Int, other)),
        }
    }

    pub fn get_duration(&self, name: &str) -> Result<Duration> {
        match self.value(name)? {
            FlagValue::Duration(d) => Ok(*d),
            other => Err(Self::mismatch(name, FlagKind::Duration, other)),
        }
    }

    pub fn get_string_slice(&self, name: &str) -> Result<Vec<String>> {
        match self.value(name)? {
            FlagValue::StringSlice(values) => Ok(values.clone()),
            other => Err(Self::mismatch(name, FlagKind::StringSlice, other)),
        }
    }

    /// Effective values of every visible flag, keyed by name.
    pub fn snapshot(&self) -> BTreeMap<String, FlagValue> {
        self.flags
            .iter()
            .filter(|f| !f.hidden)
            .map(|f| {
                let value = self.values.get(&f.name).unwrap_or(&f.default);
                (f.name.clone(), value.clone())
            })
            .collect()
    }
}

/// Guard returned by [`FlagSet::owned_by`]; restores the previous owner on drop.
pub struct OwnerScope<'a> {
    set: &'a mut FlagSet,
    previous: String,
}

impl Deref for OwnerScope<'_> {
    type Target = FlagSet;

    fn deref(&self) -> &FlagSet {
        self.set
    }
}

impl DerefMut for OwnerScope<'_> {
    fn deref_mut(&mut self) -> &mut FlagSet {
        self.set
    }
}

impl Drop for OwnerScope<'_> {
    fn drop(&mut self) {
        self.set.owner = std::mem::take(&mut self.previous);
    }
}
