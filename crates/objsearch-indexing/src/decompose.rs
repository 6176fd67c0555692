//! Turning one source document into indexable objects.
//!
//! A rule set is compiled once into an extractor for its selector and two
//! collectors: one for keyword/full-text values, one for the primary key
//! and foreign keys. Each extracted sub-document is then walked by both.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::error::{ErrorType, IndexingError};
use crate::handler::ResolvedReference;
use crate::index_storage::ParsedObject;
use objsearch_parse::{IdCollector, IdMatch, Scalar, SubObjectExtractor, ValueCollector};
use objsearch_types::{Guid, ObjectJsonPath, ObjectTypeParsingRules, SourcePayload};

/// A foreign-key value waiting for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReference {
    /// Index into [`Decomposition::objects`]
    pub object: usize,
    pub key: String,
    pub reference: String,
    pub target_storage_type: String,
}

/// Output of decomposing one document with one rule set.
#[derive(Debug, Clone, Default)]
pub struct Decomposition {
    pub objects: Vec<ParsedObject>,
    pub references: Vec<PendingReference>,
}

impl Decomposition {
    /// Distinct reference strings still to resolve.
    pub fn reference_set(&self) -> BTreeSet<String> {
        self.references.iter().map(|r| r.reference.clone()).collect()
    }

    /// Index resolved references as GUID keywords.
    ///
    /// A reference that did not resolve is a [`ErrorType::GuidNotFound`]
    /// error. A target of an unexpected storage type is skipped.
    pub fn apply_references(&mut self, resolved: &[ResolvedReference]) -> Result<(), IndexingError> {
        let by_reference: HashMap<&str, &ResolvedReference> = resolved
            .iter()
            .map(|r| (r.reference.as_str(), r))
            .collect();

        for pending in self.references.drain(..) {
            let target = by_reference.get(pending.reference.as_str()).ok_or_else(|| {
                IndexingError::non_retriable(
                    ErrorType::GuidNotFound,
                    format!("reference {} did not resolve", pending.reference),
                )
            })?;
            if let Some(found) = &target.storage_object_type {
                if *found != pending.target_storage_type {
                    debug!(
                        reference = %pending.reference,
                        expected = %pending.target_storage_type,
                        found = %found,
                        "Skipping reference to unexpected type"
                    );
                    continue;
                }
            }
            if let Some(object) = self.objects.get_mut(pending.object) {
                object.add_keyword(pending.key, Value::String(target.guid.to_string()));
            }
        }
        Ok(())
    }
}

/// A rule set compiled for repeated use.
#[derive(Debug, Clone)]
pub struct ObjectDecomposer {
    rules: ObjectTypeParsingRules,
    extractor: SubObjectExtractor,
    values: ValueCollector<usize>,
    ids: IdCollector<usize>,
    max_sub_objects: usize,
}

impl ObjectDecomposer {
    pub fn new(rules: ObjectTypeParsingRules, max_sub_objects: usize) -> Self {
        let extractor = SubObjectExtractor::new(&rules.selector_path(), &rules.retained_paths());

        let mut values = ValueCollector::new();
        let mut foreign: Vec<(ObjectJsonPath, usize)> = Vec::new();
        for (index, rule) in rules.indexing_rules.iter().enumerate() {
            if rule.foreign_key.is_some() {
                foreign.push((rule.path.clone(), index));
            } else {
                values.add_rule(&rule.path, index);
            }
        }
        let primary = rules.sub_object.as_ref().map(|s| &s.primary_key_path);
        let ids = IdCollector::new(primary, foreign);

        Self {
            rules,
            extractor,
            values,
            ids,
            max_sub_objects,
        }
    }

    pub fn rules(&self) -> &ObjectTypeParsingRules {
        &self.rules
    }

    /// Decompose the document in `payload` belonging to `object_guid`.
    pub fn decompose(
        &self,
        object_guid: &Guid,
        payload: &SourcePayload,
    ) -> Result<Decomposition, IndexingError> {
        let reader = payload.open()?;
        let mut extracted: Vec<(ObjectJsonPath, Value)> = Vec::new();
        let max = self.max_sub_objects;
        self.extractor.extract_reader(reader, |address, json| {
            if extracted.len() >= max {
                return Err(IndexingError::non_retriable(
                    ErrorType::SubObjectCountExceeded,
                    format!("{} has more than {} sub-objects", object_guid, max),
                ));
            }
            extracted.push((address, json));
            Ok(())
        })?;

        let mut decomposition = Decomposition::default();
        for (address, json) in extracted {
            let index = decomposition.objects.len();
            let object = self.parse_object(object_guid, &address, json, index, &mut decomposition.references)?;
            decomposition.objects.push(object);
        }

        debug!(
            guid = %object_guid,
            object_type = %self.rules.global_object_type,
            objects = decomposition.objects.len(),
            references = decomposition.references.len(),
            "Decomposed source object"
        );
        Ok(decomposition)
    }

    fn parse_object(
        &self,
        object_guid: &Guid,
        address: &ObjectJsonPath,
        json: Value,
        index: usize,
        references: &mut Vec<PendingReference>,
    ) -> Result<ParsedObject, IndexingError> {
        let mut primary: Option<Scalar> = None;
        self.ids.collect::<_, IndexingError, _>(&json, |found| {
            match found {
                IdMatch::Primary(scalar) => {
                    if primary.is_none() && !scalar.is_null() {
                        primary = Some(scalar);
                    }
                }
                IdMatch::Foreign(rule, scalar) => {
                    if let Some(reference) = scalar.as_str() {
                        let rule = &self.rules.indexing_rules[*rule];
                        references.push(PendingReference {
                            object: index,
                            key: rule.key_name(),
                            reference: reference.to_string(),
                            target_storage_type: rule
                                .foreign_key
                                .as_ref()
                                .map(|fk| fk.target_storage_type.clone())
                                .unwrap_or_default(),
                        });
                    }
                }
            }
            Ok(())
        })?;

        let mut found: Vec<(usize, Scalar)> = Vec::new();
        self.values.collect::<_, IndexingError, _>(&json, |rule, scalar| {
            if !scalar.is_null() {
                found.push((*rule, scalar));
            }
            Ok(())
        })?;

        let guid = match &self.rules.sub_object {
            Some(sub) => {
                let id = primary
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| address.to_string());
                object_guid.with_sub_object(sub.sub_object_type.clone(), id)?
            }
            None => object_guid.clone(),
        };

        let mut object = ParsedObject::new(guid, json);
        for (rule, scalar) in found {
            let rule = &self.rules.indexing_rules[rule];
            if rule.full_text {
                object.add_full_text(rule.key_name(), scalar.to_string());
            } else {
                object.add_keyword(rule.key_name(), Value::from(scalar));
            }
        }
        Ok(object)
    }
}
