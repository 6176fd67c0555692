//! Streaming value collection.
//!
//! Walks a token stream once against a [`ValueCollectingTrie`] and reports
//! every scalar found at a node carrying rules. An array reached at a rule
//! node reports each of its scalar elements. Values are handed over as
//! [`Scalar`] without any coercion.

use std::fmt;
use std::io::Read;

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::{Number, Value};

use objsearch_types::ObjectJsonPath;

use crate::error::ParseError;
use crate::trie::{NodeId, ValueCollectingTrie, ROOT};

/// A scalar JSON value as it appeared in the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::UInt(u) => write!(f, "{}", u),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Int(i) => Value::from(i),
            Scalar::UInt(u) => Value::from(u),
            Scalar::Float(x) => Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null),
            Scalar::String(s) => Value::String(s),
        }
    }
}

/// Collects scalars at rule-carrying paths.
#[derive(Debug, Clone)]
pub struct ValueCollector<T> {
    trie: ValueCollectingTrie<T>,
}

impl<T> Default for ValueCollector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ValueCollector<T> {
    pub fn new() -> Self {
        Self {
            trie: ValueCollectingTrie::new(),
        }
    }

    pub fn from_trie(trie: ValueCollectingTrie<T>) -> Self {
        Self { trie }
    }

    pub fn add_rule(&mut self, path: &ObjectJsonPath, rule: T) -> &mut Self {
        self.trie.add_path(path, rule);
        self
    }

    pub fn trie(&self) -> &ValueCollectingTrie<T> {
        &self.trie
    }

    /// Walk once, calling `callback(rule, scalar)` for every rule at every
    /// matching scalar. Returns the number of callbacks made.
    pub fn collect<'de, D, E, F>(&self, deserializer: D, callback: F) -> Result<usize, E>
    where
        D: Deserializer<'de>,
        D::Error: Into<ParseError>,
        E: From<ParseError>,
        F: FnMut(&T, Scalar) -> Result<(), E>,
    {
        collect_values(deserializer, &self.trie, callback)
    }

    pub fn collect_reader<R, E, F>(&self, reader: R, callback: F) -> Result<usize, E>
    where
        R: Read,
        E: From<ParseError>,
        F: FnMut(&T, Scalar) -> Result<(), E>,
    {
        let mut de = serde_json::Deserializer::from_reader(reader);
        let calls = self.collect(&mut de, callback)?;
        de.end().map_err(|e| E::from(ParseError::from(e)))?;
        Ok(calls)
    }

    pub fn collect_slice<E, F>(&self, json: &[u8], callback: F) -> Result<usize, E>
    where
        E: From<ParseError>,
        F: FnMut(&T, Scalar) -> Result<(), E>,
    {
        let mut de = serde_json::Deserializer::from_slice(json);
        let calls = self.collect(&mut de, callback)?;
        de.end().map_err(|e| E::from(ParseError::from(e)))?;
        Ok(calls)
    }
}

/// Walk `deserializer` once against a prepared trie.
pub fn collect_values<'de, D, T, E, F>(
    deserializer: D,
    trie: &ValueCollectingTrie<T>,
    callback: F,
) -> Result<usize, E>
where
    D: Deserializer<'de>,
    D::Error: Into<ParseError>,
    E: From<ParseError>,
    F: FnMut(&T, Scalar) -> Result<(), E>,
{
    let mut sink = Sink {
        callback,
        failure: None,
        calls: 0,
    };
    let outcome = CollectSeed {
        trie,
        node: Some(ROOT),
        array_rules: None,
        sink: &mut sink,
    }
    .deserialize(deserializer);

    if let Some(failure) = sink.failure {
        return Err(failure);
    }
    if let Err(e) = outcome {
        let err: ParseError = e.into();
        return Err(E::from(err));
    }
    Ok(sink.calls)
}

/// What an identifier path stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdTarget<K> {
    Primary,
    Foreign(K),
}

/// One identifier found by an [`IdCollector`].
#[derive(Debug, Clone, PartialEq)]
pub enum IdMatch<'a, K> {
    /// Value at the primary-key path
    Primary(Scalar),
    /// Value at a foreign-key path, with the rule that declared it
    Foreign(&'a K, Scalar),
}

/// Collects a primary key and foreign keys in one pass.
#[derive(Debug, Clone)]
pub struct IdCollector<K> {
    inner: ValueCollector<IdTarget<K>>,
}

impl<K> IdCollector<K> {
    pub fn new(primary_path: Option<&ObjectJsonPath>, foreign_rules: Vec<(ObjectJsonPath, K)>) -> Self {
        let mut inner = ValueCollector::new();
        if let Some(path) = primary_path {
            inner.add_rule(path, IdTarget::Primary);
        }
        for (path, rule) in foreign_rules {
            inner.add_rule(&path, IdTarget::Foreign(rule));
        }
        Self { inner }
    }

    pub fn collect<'de, D, E, F>(&self, deserializer: D, mut callback: F) -> Result<usize, E>
    where
        D: Deserializer<'de>,
        D::Error: Into<ParseError>,
        E: From<ParseError>,
        F: FnMut(IdMatch<'_, K>) -> Result<(), E>,
    {
        self.inner.collect(deserializer, |target, scalar| match target {
            IdTarget::Primary => callback(IdMatch::Primary(scalar)),
            IdTarget::Foreign(rule) => callback(IdMatch::Foreign(rule, scalar)),
        })
    }

    pub fn collect_slice<E, F>(&self, json: &[u8], callback: F) -> Result<usize, E>
    where
        E: From<ParseError>,
        F: FnMut(IdMatch<'_, K>) -> Result<(), E>,
    {
        let mut de = serde_json::Deserializer::from_slice(json);
        let calls = self.collect(&mut de, callback)?;
        de.end().map_err(|e| E::from(ParseError::from(e)))?;
        Ok(calls)
    }
}

/// One-shot primary/foreign key collection.
pub fn collect_ids<'de, D, K, E, F>(
    deserializer: D,
    primary_path: Option<&ObjectJsonPath>,
    foreign_rules: Vec<(ObjectJsonPath, K)>,
    callback: F,
) -> Result<usize, E>
where
    D: Deserializer<'de>,
    D::Error: Into<ParseError>,
    E: From<ParseError>,
    F: FnMut(IdMatch<'_, K>) -> Result<(), E>,
{
    IdCollector::new(primary_path, foreign_rules).collect(deserializer, callback)
}

struct Sink<F, E> {
    callback: F,
    failure: Option<E>,
    calls: usize,
}

impl<F, E> Sink<F, E> {
    fn deliver<T, Er>(&mut self, rules: &[T], scalar: Scalar) -> Result<(), Er>
    where
        F: FnMut(&T, Scalar) -> Result<(), E>,
        Er: de::Error,
    {
        for rule in rules {
            if let Err(e) = (self.callback)(rule, scalar.clone()) {
                self.failure = Some(e);
                return Err(Er::custom("value callback failed"));
            }
            self.calls += 1;
        }
        Ok(())
    }
}

/// `node` follows the trie; `array_rules` is set for direct elements of an
/// array that sits on a rule node.
struct CollectSeed<'t, 's, T, F, E> {
    trie: &'t ValueCollectingTrie<T>,
    node: Option<NodeId>,
    array_rules: Option<NodeId>,
    sink: &'s mut Sink<F, E>,
}

impl<'t, 's, T, F, E> CollectSeed<'t, 's, T, F, E>
where
    F: FnMut(&T, Scalar) -> Result<(), E>,
{
    fn scalar<Er: de::Error>(self, scalar: Scalar) -> Result<(), Er> {
        if let Some(node) = self.node {
            if self.trie.has_rules(node) {
                self.sink.deliver(self.trie.rules(node), scalar.clone())?;
            }
        }
        if let Some(node) = self.array_rules {
            self.sink.deliver(self.trie.rules(node), scalar)?;
        }
        Ok(())
    }
}

impl<'de, 't, 's, T, F, E> DeserializeSeed<'de> for CollectSeed<'t, 's, T, F, E>
where
    F: FnMut(&T, Scalar) -> Result<(), E>,
{
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        if self.node.is_none() && self.array_rules.is_none() {
            deserializer.deserialize_ignored_any(IgnoredAny)?;
            return Ok(());
        }
        deserializer.deserialize_any(self)
    }
}

impl<'de, 't, 's, T, F, E> Visitor<'de> for CollectSeed<'t, 's, T, F, E>
where
    F: FnMut(&T, Scalar) -> Result<(), E>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("any JSON value")
    }

    fn visit_map<A>(self, mut map: A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        while let Some(key) = map.next_key::<String>()? {
            let child = self.node.and_then(|n| self.trie.match_key(n, &key));
            match child {
                Some(child) => map.next_value_seed(CollectSeed {
                    trie: self.trie,
                    node: Some(child),
                    array_rules: None,
                    sink: &mut *self.sink,
                })?,
                None => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        let array_rules = self.node.filter(|n| self.trie.has_rules(*n));
        let mut index = 0usize;
        loop {
            let child = self.node.and_then(|n| self.trie.match_index(n, index));
            let seed = CollectSeed {
                trie: self.trie,
                node: child,
                array_rules,
                sink: &mut *self.sink,
            };
            if seq.next_element_seed(seed)?.is_none() {
                return Ok(());
            }
            index += 1;
        }
    }

    fn visit_bool<Er: de::Error>(self, v: bool) -> Result<(), Er> {
        self.scalar(Scalar::Bool(v))
    }

    fn visit_i64<Er: de::Error>(self, v: i64) -> Result<(), Er> {
        self.scalar(Scalar::Int(v))
    }

    fn visit_u64<Er: de::Error>(self, v: u64) -> Result<(), Er> {
        self.scalar(Scalar::UInt(v))
    }

    fn visit_f64<Er: de::Error>(self, v: f64) -> Result<(), Er> {
        self.scalar(Scalar::Float(v))
    }

    fn visit_str<Er: de::Error>(self, v: &str) -> Result<(), Er> {
        self.scalar(Scalar::String(v.to_string()))
    }

    fn visit_string<Er: de::Error>(self, v: String) -> Result<(), Er> {
        self.scalar(Scalar::String(v))
    }

    fn visit_unit<Er: de::Error>(self) -> Result<(), Er> {
        self.scalar(Scalar::Null)
    }

    fn visit_none<Er: de::Error>(self) -> Result<(), Er> {
        self.scalar(Scalar::Null)
    }
}
