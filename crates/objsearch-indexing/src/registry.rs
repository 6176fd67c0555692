//! Lookup of parsing rules by storage code and storage object type.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::IndexingError;
use objsearch_types::ObjectTypeParsingRules;

/// Parsing rules keyed by `(storage_code, storage_object_type)`.
///
/// A type may carry several rule sets, e.g. one for the whole object and
/// one per kind of sub-object. Whole-object sets sort first.
#[derive(Debug, Clone, Default)]
pub struct ParsingRulesRegistry {
    rules: HashMap<(String, String), Vec<ObjectTypeParsingRules>>,
}

impl ParsingRulesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a rule set.
    pub fn register(&mut self, rules: ObjectTypeParsingRules) -> Result<(), IndexingError> {
        rules.validate()?;
        debug!(
            object_type = %rules.global_object_type,
            storage_code = %rules.storage_code,
            storage_object_type = %rules.storage_object_type,
            "Registered parsing rules"
        );
        let key = (rules.storage_code.clone(), rules.storage_object_type.clone());
        let sets = self.rules.entry(key).or_default();
        sets.push(rules);
        sets.sort_by_key(|r| r.sub_object.is_some());
        Ok(())
    }

    /// Load every `*.json` file in `dir` as one rule set.
    pub fn load_dir(dir: &Path) -> Result<Self, IndexingError> {
        let mut registry = Self::new();
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        paths.sort();
        for path in paths {
            let text = fs::read_to_string(&path)?;
            registry.register(ObjectTypeParsingRules::from_json(&text)?)?;
        }
        info!(dir = ?dir, rule_sets = registry.len(), "Loaded parsing rules");
        Ok(registry)
    }

    /// Rule sets for an object type; empty when the type is not indexed.
    pub fn rules_for(&self, storage_code: &str, storage_object_type: &str) -> &[ObjectTypeParsingRules] {
        self.rules
            .get(&(storage_code.to_string(), storage_object_type.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of rule sets.
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GENOME: &str = r#"{
        "global_object_type": "Genome",
        "storage_code": "WS",
        "storage_object_type": "KBaseGenomes.Genome",
        "indexing_rules": [{"path": "/scientific_name", "full_text": true}]
    }"#;

    const FEATURE: &str = r#"{
        "global_object_type": "GenomeFeature",
        "storage_code": "WS",
        "storage_object_type": "KBaseGenomes.Genome",
        "sub_object": {"path": "/features/[*]", "sub_object_type": "feature", "primary_key_path": "/id"},
        "indexing_rules": [{"path": "/id"}]
    }"#;

    #[test]
    fn test_whole_object_rules_sort_first() {
        let mut registry = ParsingRulesRegistry::new();
        registry
            .register(ObjectTypeParsingRules::from_json(FEATURE).unwrap())
            .unwrap();
        registry
            .register(ObjectTypeParsingRules::from_json(GENOME).unwrap())
            .unwrap();

        let sets = registry.rules_for("WS", "KBaseGenomes.Genome");
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].global_object_type, "Genome");
        assert_eq!(sets[1].global_object_type, "GenomeFeature");
        assert!(registry.rules_for("WS", "Other").is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_rejects_invalid_rules() {
        let mut rules = ObjectTypeParsingRules::from_json(GENOME).unwrap();
        rules.global_object_type.clear();
        let mut registry = ParsingRulesRegistry::new();
        assert!(matches!(
            registry.register(rules),
            Err(IndexingError::Rules(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in [("genome.json", GENOME), ("feature.json", FEATURE)] {
            let mut file = fs::File::create(dir.path().join(name)).unwrap();
            file.write_all(body.as_bytes()).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = ParsingRulesRegistry::load_dir(dir.path()).unwrap();
        assert_eq!(registry.len(), 2);
    }
}
