//! Streaming sub-object extraction.
//!
//! A [`SubObjectExtractor`] walks a serde token stream once against an
//! [`ExtractionTrie`]. Selector levels are navigated without copying
//! anything; every concrete match of the selector becomes one sub-document
//! holding only the retained sub-paths. Subtrees outside the trie are
//! skipped with [`IgnoredAny`] and never materialized.

use std::fmt;
use std::io::Read;

use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use objsearch_types::ObjectJsonPath;

use crate::error::ParseError;
use crate::trie::{ExtractionTrie, NodeId, ROOT};

/// Extracts sub-documents for one selector path.
///
/// Build once per object type and reuse across documents.
#[derive(Debug, Clone)]
pub struct SubObjectExtractor {
    trie: ExtractionTrie,
}

impl SubObjectExtractor {
    /// Extractor for `selector`, keeping only `retained` below each match.
    ///
    /// An empty `retained` list keeps each matched subtree whole.
    pub fn new(selector: &ObjectJsonPath, retained: &[ObjectJsonPath]) -> Self {
        Self {
            trie: ExtractionTrie::for_selector(selector, retained),
        }
    }

    pub fn trie(&self) -> &ExtractionTrie {
        &self.trie
    }

    /// Walk `deserializer` once, calling `consumer(address, sub_document)`
    /// for every concrete selector match in document order.
    ///
    /// Returns the number of sub-documents emitted. A consumer error stops
    /// the walk and is returned unchanged.
    pub fn extract<'de, D, E, F>(&self, deserializer: D, consumer: F) -> Result<usize, E>
    where
        D: Deserializer<'de>,
        D::Error: Into<ParseError>,
        E: From<ParseError>,
        F: FnMut(ObjectJsonPath, Value) -> Result<(), E>,
    {
        let mut sink = Sink {
            consumer,
            failure: None,
            emitted: 0,
        };
        let mut address = Vec::new();
        let outcome = SelectorSeed {
            trie: &self.trie,
            node: ROOT,
            address: &mut address,
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
        debug!(emitted = sink.emitted, "Sub-object extraction complete");
        Ok(sink.emitted)
    }

    /// [`Self::extract`] over a JSON byte stream, rejecting trailing garbage.
    pub fn extract_reader<R, E, F>(&self, reader: R, consumer: F) -> Result<usize, E>
    where
        R: Read,
        E: From<ParseError>,
        F: FnMut(ObjectJsonPath, Value) -> Result<(), E>,
    {
        let mut de = serde_json::Deserializer::from_reader(reader);
        let emitted = self.extract(&mut de, consumer)?;
        de.end().map_err(|e| E::from(ParseError::from(e)))?;
        Ok(emitted)
    }

    /// [`Self::extract`] over an in-memory JSON document.
    pub fn extract_slice<E, F>(&self, json: &[u8], consumer: F) -> Result<usize, E>
    where
        E: From<ParseError>,
        F: FnMut(ObjectJsonPath, Value) -> Result<(), E>,
    {
        let mut de = serde_json::Deserializer::from_slice(json);
        let emitted = self.extract(&mut de, consumer)?;
        de.end().map_err(|e| E::from(ParseError::from(e)))?;
        Ok(emitted)
    }
}

/// One-shot extraction: build the trie for `selector` and walk once.
pub fn extract_sub_objects<'de, D, E, F>(
    deserializer: D,
    selector: &ObjectJsonPath,
    retained: &[ObjectJsonPath],
    consumer: F,
) -> Result<usize, E>
where
    D: Deserializer<'de>,
    D::Error: Into<ParseError>,
    E: From<ParseError>,
    F: FnMut(ObjectJsonPath, Value) -> Result<(), E>,
{
    SubObjectExtractor::new(selector, retained).extract(deserializer, consumer)
}

pub fn extract_from_reader<R, E, F>(
    reader: R,
    selector: &ObjectJsonPath,
    retained: &[ObjectJsonPath],
    consumer: F,
) -> Result<usize, E>
where
    R: Read,
    E: From<ParseError>,
    F: FnMut(ObjectJsonPath, Value) -> Result<(), E>,
{
    SubObjectExtractor::new(selector, retained).extract_reader(reader, consumer)
}

pub fn extract_from_slice<E, F>(
    json: &[u8],
    selector: &ObjectJsonPath,
    retained: &[ObjectJsonPath],
    consumer: F,
) -> Result<usize, E>
where
    E: From<ParseError>,
    F: FnMut(ObjectJsonPath, Value) -> Result<(), E>,
{
    SubObjectExtractor::new(selector, retained).extract_slice(json, consumer)
}

/// Collects consumer output and the first consumer failure.
struct Sink<F, E> {
    consumer: F,
    failure: Option<E>,
    emitted: usize,
}

impl<F, E> Sink<F, E>
where
    F: FnMut(ObjectJsonPath, Value) -> Result<(), E>,
{
    fn emit<Er: de::Error>(&mut self, address: &[String], value: Value) -> Result<(), Er> {
        let path = ObjectJsonPath::from_segments(address.iter().cloned());
        match (self.consumer)(path, value) {
            Ok(()) => {
                self.emitted += 1;
                Ok(())
            }
            Err(e) => {
                self.failure = Some(e);
                Err(Er::custom("sub-object consumer failed"))
            }
        }
    }
}

/// Navigates selector levels toward sub-object roots.
struct SelectorSeed<'t, 's, F, E> {
    trie: &'t ExtractionTrie,
    node: NodeId,
    address: &'s mut Vec<String>,
    sink: &'s mut Sink<F, E>,
}

impl<'de, 't, 's, F, E> DeserializeSeed<'de> for SelectorSeed<'t, 's, F, E>
where
    F: FnMut(ObjectJsonPath, Value) -> Result<(), E>,
{
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: Deserializer<'de>,
    {
        if self.trie.skip_level(self.node) {
            return deserializer.deserialize_any(self);
        }
        let value = RetainSeed {
            trie: self.trie,
            node: self.node,
            root: true,
        }
        .deserialize(deserializer)?;
        self.sink.emit(self.address, value.unwrap_or(Value::Null))
    }
}

impl<'de, 't, 's, F, E> Visitor<'de> for SelectorSeed<'t, 's, F, E>
where
    F: FnMut(ObjectJsonPath, Value) -> Result<(), E>,
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
            match self.trie.match_key(self.node, &key) {
                Some(child) => {
                    self.address.push(key);
                    let outcome = map.next_value_seed(SelectorSeed {
                        trie: self.trie,
                        node: child,
                        address: &mut *self.address,
                        sink: &mut *self.sink,
                    });
                    self.address.pop();
                    outcome?;
                }
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
        let mut index = 0usize;
        loop {
            let more = match self.trie.match_index(self.node, index) {
                Some(child) => {
                    self.address.push(index.to_string());
                    let outcome = seq.next_element_seed(SelectorSeed {
                        trie: self.trie,
                        node: child,
                        address: &mut *self.address,
                        sink: &mut *self.sink,
                    });
                    self.address.pop();
                    outcome?.is_some()
                }
                None => seq.next_element::<IgnoredAny>()?.is_some(),
            };
            if !more {
                return Ok(());
            }
            index += 1;
        }
    }

    fn visit_bool<Er: de::Error>(self, _v: bool) -> Result<(), Er> {
        Ok(())
    }

    fn visit_i64<Er: de::Error>(self, _v: i64) -> Result<(), Er> {
        Ok(())
    }

    fn visit_u64<Er: de::Error>(self, _v: u64) -> Result<(), Er> {
        Ok(())
    }

    fn visit_f64<Er: de::Error>(self, _v: f64) -> Result<(), Er> {
        Ok(())
    }

    fn visit_str<Er: de::Error>(self, _v: &str) -> Result<(), Er> {
        Ok(())
    }

    fn visit_unit<Er: de::Error>(self) -> Result<(), Er> {
        Ok(())
    }

    fn visit_none<Er: de::Error>(self) -> Result<(), Er> {
        Ok(())
    }
}

/// Copies the retained part of a subtree.
///
/// Yields `None` for a scalar where the trie expects more structure, except
/// at the sub-object root, where a scalar is emitted verbatim.
struct RetainSeed<'t> {
    trie: &'t ExtractionTrie,
    node: NodeId,
    root: bool,
}

impl<'de, 't> DeserializeSeed<'de> for RetainSeed<'t> {
    type Value = Option<Value>;

    fn deserialize<D>(self, deserializer: D) -> Result<Option<Value>, D::Error>
    where
        D: Deserializer<'de>,
    {
        if self.trie.need_all(self.node) {
            return Value::deserialize(deserializer).map(Some);
        }
        deserializer.deserialize_any(self)
    }
}

impl<'t> RetainSeed<'t> {
    fn scalar(&self, value: Value) -> Option<Value> {
        if self.root {
            Some(value)
        } else {
            None
        }
    }
}

impl<'de, 't> Visitor<'de> for RetainSeed<'t> {
    type Value = Option<Value>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("any JSON value")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Option<Value>, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut out = Map::new();
        while let Some(key) = map.next_key::<String>()? {
            match self.trie.match_key(self.node, &key) {
                Some(child) => {
                    let value = map.next_value_seed(RetainSeed {
                        trie: self.trie,
                        node: child,
                        root: false,
                    })?;
                    if let Some(value) = value {
                        out.insert(key, value);
                    }
                }
                None => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(Some(Value::Object(out)))
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Option<Value>, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut out = Vec::new();
        let mut index = 0usize;
        loop {
            match self.trie.match_index(self.node, index) {
                Some(child) => match seq.next_element_seed(RetainSeed {
                    trie: self.trie,
                    node: child,
                    root: false,
                })? {
                    Some(Some(value)) => out.push(value),
                    Some(None) => {}
                    None => break,
                },
                None => {
                    if seq.next_element::<IgnoredAny>()?.is_none() {
                        break;
                    }
                }
            }
            index += 1;
        }
        Ok(Some(Value::Array(out)))
    }

    fn visit_bool<Er: de::Error>(self, v: bool) -> Result<Option<Value>, Er> {
        Ok(self.scalar(Value::Bool(v)))
    }

    fn visit_i64<Er: de::Error>(self, v: i64) -> Result<Option<Value>, Er> {
        Ok(self.scalar(Value::from(v)))
    }

    fn visit_u64<Er: de::Error>(self, v: u64) -> Result<Option<Value>, Er> {
        Ok(self.scalar(Value::from(v)))
    }

    fn visit_f64<Er: de::Error>(self, v: f64) -> Result<Option<Value>, Er> {
        Ok(self.scalar(Value::from(v)))
    }

    fn visit_str<Er: de::Error>(self, v: &str) -> Result<Option<Value>, Er> {
        Ok(self.scalar(Value::String(v.to_string())))
    }

    fn visit_string<Er: de::Error>(self, v: String) -> Result<Option<Value>, Er> {
        Ok(self.scalar(Value::String(v)))
    }

    fn visit_unit<Er: de::Error>(self) -> Result<Option<Value>, Er> {
        Ok(self.scalar(Value::Null))
    }

    fn visit_none<Er: de::Error>(self) -> Result<Option<Value>, Er> {
        Ok(self.scalar(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn path(text: &str) -> ObjectJsonPath {
        ObjectJsonPath::parse(text).unwrap()
    }

    fn run(selector: &str, retained: &[&str], doc: &str) -> Vec<(String, Value)> {
        let retained: Vec<ObjectJsonPath> = retained.iter().map(|p| path(p)).collect();
        let extractor = SubObjectExtractor::new(&path(selector), &retained);
        let mut out = Vec::new();
        extractor
            .extract_slice::<ParseError, _>(doc.as_bytes(), |address, value| {
                out.push((address.to_string(), value));
                Ok(())
            })
            .unwrap();
        out
    }

    const GENOME: &str = r#"{
        "id": "genome.1",
        "features": [
            {"id": "f0", "location": [["contig1", 10, "+", 200]], "function": "kinase", "dna": "ACGT"},
            {"id": "f1", "location": [["contig1", 500, "-", 90]], "function": "ligase", "dna": "TTGA"},
            {"id": "f2", "location": [["contig2", 3, "+", 33]], "function": null, "dna": "GGCC"}
        ],
        "taxonomy": {"kingdom": "Bacteria"}
    }"#;

    #[test]
    fn test_features_scenario() {
        let out = run("/features/[*]", &["id", "location"], GENOME);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].0, "/features/0");
        assert_eq!(out[1].0, "/features/1");
        assert_eq!(out[2].0, "/features/2");
        assert_eq!(
            out[1].1,
            json!({"id": "f1", "location": [["contig1", 500, "-", 90]]})
        );
        for (_, doc) in &out {
            assert_eq!(doc.as_object().unwrap().len(), 2);
        }
    }

    #[test]
    fn test_whole_document_selector() {
        let out = run("", &[], r#"{"a": 1, "b": [true, null]}"#);
        assert_eq!(out, vec![("/".to_string(), json!({"a": 1, "b": [true, null]}))]);
    }

    #[test]
    fn test_root_retention_keeps_order() {
        let out = run("/", &["z", "a"], r#"{"z": 1, "m": 2, "a": 3}"#);
        let keys: Vec<&String> = out[0].1.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_map_wildcard_selector_uses_keys() {
        let doc = r#"{"samples": {"s1": {"x": 1, "y": 2}, "s/2": {"x": 3, "y": 4}}}"#;
        let out = run("/samples/*", &["x"], doc);
        assert_eq!(
            out,
            vec![
                ("/samples/s1".to_string(), json!({"x": 1})),
                ("/samples/s~12".to_string(), json!({"x": 3})),
            ]
        );
    }

    #[test]
    fn test_nested_wildcards_in_document_order() {
        let doc = r#"{"a": [{"b": [1, 2]}, {"b": []}, {"b": [3]}]}"#;
        let out = run("/a/[*]/b/[*]", &[], doc);
        let addresses: Vec<&str> = out.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(addresses, vec!["/a/0/b/0", "/a/0/b/1", "/a/2/b/0"]);
        assert_eq!(out[2].1, json!(3));
    }

    #[test]
    fn test_retained_array_paths() {
        let doc = r#"{"items": [{"tags": [{"k": "a", "v": 1}, {"k": "b", "v": 2}], "other": 9}]}"#;
        let out = run("/items/[*]", &["tags/[*]/k"], doc);
        assert_eq!(out[0].1, json!({"tags": [{"k": "a"}, {"k": "b"}]}));
    }

    #[test]
    fn test_retained_trailing_wildcard_keeps_subtree() {
        let doc = r#"{"x": {"meta": {"a": [1, {"b": 2}]}, "drop": 1}}"#;
        let out = run("/x", &["meta/*/[*]"], doc);
        assert_eq!(out[0].1, json!({"meta": {"a": [1, {"b": 2}]}}));
    }

    #[test]
    fn test_missing_and_mismatched_paths() {
        let doc = r#"{"features": [{"id": "a"}, 5, {"location": "here"}]}"#;
        let out = run("/features/[*]", &["id", "location/[*]/contig"], doc);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].1, json!({"id": "a"}));
        assert_eq!(out[1].1, json!(5));
        assert_eq!(out[2].1, json!({}));
    }

    #[test]
    fn test_selector_not_present() {
        assert!(run("/nothing/[*]", &[], GENOME).is_empty());
        assert!(run("/id/[*]", &[], GENOME).is_empty());
    }

    #[test]
    fn test_literal_index_selector() {
        let out = run("/features/1", &["id"], GENOME);
        assert_eq!(out, vec![("/features/1".to_string(), json!({"id": "f1"}))]);
    }

    #[test]
    fn test_trailing_selector_wildcards_are_normalized() {
        let out = run("/features/[*]/[*]", &["id"], GENOME);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_malformed_input() {
        let extractor = SubObjectExtractor::new(&path("/a"), &[]);
        let err = extractor
            .extract_slice::<ParseError, _>(br#"{"a": }"#, |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));

        let err = extractor
            .extract_slice::<ParseError, _>(br#"{"a": 1} trailing"#, |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));

        let err = extractor
            .extract_slice::<ParseError, _>(br#"{"a": 1, "b"}"#, |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[derive(Debug)]
    enum TestError {
        Parse(ParseError),
        Stop(usize),
    }

    impl From<ParseError> for TestError {
        fn from(e: ParseError) -> Self {
            TestError::Parse(e)
        }
    }

    #[test]
    fn test_consumer_error_stops_walk() {
        let extractor = SubObjectExtractor::new(&path("/features/[*]"), &[path("id")]);
        let mut seen = 0;
        let err = extractor
            .extract_slice(GENOME.as_bytes(), |_, _| {
                seen += 1;
                if seen == 2 {
                    Err(TestError::Stop(seen))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(matches!(err, TestError::Stop(2)));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_one_shot_entry_point() {
        let mut addresses = Vec::new();
        let count = extract_from_slice::<ParseError, _>(
            GENOME.as_bytes(),
            &path("/taxonomy"),
            &[],
            |address, doc| {
                addresses.push(address.to_string());
                assert_eq!(doc, json!({"kingdom": "Bacteria"}));
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(count, 1);
        assert_eq!(addresses, vec!["/taxonomy"]);
    }

    #[test]
    fn test_reader_and_value_sources() {
        let extractor = SubObjectExtractor::new(&path("/features/[*]"), &[path("id")]);
        let count = extractor
            .extract_reader::<_, ParseError, _>(GENOME.as_bytes(), |_, _| Ok(()))
            .unwrap();
        assert_eq!(count, 3);

        let value: Value = serde_json::from_str(GENOME).unwrap();
        let mut ids = Vec::new();
        extractor
            .extract::<_, ParseError, _>(&value, |_, doc| {
                ids.push(doc["id"].as_str().unwrap().to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(ids, vec!["f0", "f1", "f2"]);
    }
}
