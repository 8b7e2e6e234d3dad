//! Typed attribute values and the ordered attribute map carried by
//! capabilities and requirements.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Directive maps are plain string-to-string; the BTreeMap keeps iteration
/// (and hashing) deterministic.
pub type Directives = BTreeMap<String, String>;

/// A single attribute value. Filters compare these with type-aware
/// semantics: versions by version order, numbers numerically, strings
/// lexically, lists by any-element match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    Ver(Version),
    Int(i64),
    Float(OrderedFloat<f64>),
    Bool(bool),
    List(Vec<AttrValue>),
}

impl AttrValue {
    /// Equality against a filter literal.
    pub fn matches_eq(&self, literal: &str) -> bool {
        match self {
            AttrValue::Str(s) => s == literal,
            AttrValue::Ver(v) => Version::parse(literal).map_or(false, |l| *v == l),
            AttrValue::Int(i) => literal.trim().parse::<i64>().map_or(false, |l| *i == l),
            AttrValue::Float(f) => literal.trim().parse::<f64>().map_or(false, |l| f.0 == l),
            AttrValue::Bool(b) => literal.trim().parse::<bool>().map_or(false, |l| *b == l),
            AttrValue::List(items) => items.iter().any(|item| item.matches_eq(literal)),
        }
    }

    /// `>=` / `<=` against a filter literal. Booleans only support
    /// equality, so ordered comparisons on them never match.
    pub fn matches_cmp(&self, literal: &str, greater: bool) -> bool {
        let keep = |ord: std::cmp::Ordering| {
            if greater {
                ord != std::cmp::Ordering::Less
            } else {
                ord != std::cmp::Ordering::Greater
            }
        };
        match self {
            AttrValue::Str(s) => keep(s.as_str().cmp(literal)),
            AttrValue::Ver(v) => Version::parse(literal).map_or(false, |l| keep(v.cmp(&l))),
            AttrValue::Int(i) => literal
                .trim()
                .parse::<i64>()
                .map_or(false, |l| keep(i.cmp(&l))),
            AttrValue::Float(f) => literal
                .trim()
                .parse::<f64>()
                .map_or(false, |l| keep(f.cmp(&OrderedFloat(l)))),
            AttrValue::Bool(_) => false,
            AttrValue::List(items) => items.iter().any(|item| item.matches_cmp(literal, greater)),
        }
    }

    /// `~=`: case-insensitive, whitespace-insensitive comparison on the
    /// display form; exact equality for non-strings.
    pub fn matches_approx(&self, literal: &str) -> bool {
        match self {
            AttrValue::Str(s) => fold(s) == fold(literal),
            AttrValue::List(items) => items.iter().any(|item| item.matches_approx(literal)),
            other => other.matches_eq(literal),
        }
    }

    /// Substring match against pattern parts split on `*`. Empty first or
    /// last parts mean an open start or end.
    pub fn matches_substring(&self, parts: &[String]) -> bool {
        match self {
            AttrValue::Str(s) => substring_match(s, parts),
            AttrValue::List(items) => items.iter().any(|item| item.matches_substring(parts)),
            _ => false,
        }
    }
}

fn fold(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn substring_match(value: &str, parts: &[String]) -> bool {
    let Some((first, rest)) = parts.split_first() else {
        return value.is_empty();
    };
    if !value.starts_with(first.as_str()) {
        return false;
    }
    let mut remaining = &value[first.len()..];
    let Some((last, middle)) = rest.split_last() else {
        // single part, no '*': exact match
        return remaining.is_empty();
    };
    for part in middle {
        match remaining.find(part.as_str()) {
            Some(at) => remaining = &remaining[at + part.len()..],
            None => return false,
        }
    }
    remaining.ends_with(last.as_str())
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => write!(f, "{s}"),
            AttrValue::Ver(v) => write!(f, "{v}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(x) => write!(f, "{}", x.0),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::List(items) => write!(f, "{}", items.iter().join(",")),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<Version> for AttrValue {
    fn from(v: Version) -> Self {
        AttrValue::Ver(v)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<f64> for AttrValue {
    fn from(x: f64) -> Self {
        AttrValue::Float(OrderedFloat(x))
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(items: Vec<AttrValue>) -> Self {
        AttrValue::List(items)
    }
}

/// Insertion-ordered attribute map. Equality is order-insensitive (map
/// equality); hashing is made consistent with that by combining per-entry
/// hashes commutatively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attrs(IndexMap<String, AttrValue>);

impl Attrs {
    pub fn new() -> Self {
        Attrs(IndexMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(AttrValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Reads `key` as a version, accepting either a typed version value or
    /// a parseable string.
    pub fn get_version(&self, key: &str) -> Option<Version> {
        match self.0.get(key) {
            Some(AttrValue::Ver(v)) => Some(v.clone()),
            Some(AttrValue::Str(s)) => Version::parse(s).ok(),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Hash for Attrs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut acc: u64 = 0;
        for (k, v) in &self.0 {
            let mut entry = DefaultHasher::new();
            k.hash(&mut entry);
            v.hash(&mut entry);
            acc ^= entry.finish();
        }
        state.write_usize(self.0.len());
        state.write_u64(acc);
    }
}

impl<K: Into<String>, V: Into<AttrValue>> FromIterator<(K, V)> for Attrs {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Attrs(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        write!(f, "}}")
    }
}
