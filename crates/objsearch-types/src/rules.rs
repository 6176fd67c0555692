//! Parsing rules: how a stored object type is decomposed and indexed.
//!
//! Rules are authored as JSON, one document per storage object type:
//!
//! ```json
//! {
//!   "global_object_type": "GenomeFeature",
//!   "storage_code": "WS",
//!   "storage_object_type": "Genome",
//!   "sub_object": {
//!     "path": "/features/[*]",
//!     "sub_object_type": "feature",
//!     "primary_key_path": "/id"
//!   },
//!   "indexing_rules": [
//!     { "path": "/function", "full_text": true },
//!     { "path": "/location/[*]/contig", "key_name": "contig" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::RulesError;
use crate::path::{is_wildcard, ObjectJsonPath};

/// Where to find sub-objects inside a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubObjectRule {
    /// Selector path, usually ending in a wildcard
    pub path: ObjectJsonPath,
    /// Type name written into sub-object GUIDs
    pub sub_object_type: String,
    /// Path of the sub-object id, relative to the sub-object
    pub primary_key_path: ObjectJsonPath,
}

/// Foreign key declaration attached to an indexing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRule {
    /// Storage object type the referenced ids point at
    pub target_storage_type: String,
}

/// One indexed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingRule {
    /// Path relative to the (sub-)object
    pub path: ObjectJsonPath,

    /// Key name in the index; defaults to the last literal path segment
    #[serde(default)]
    pub key_name: Option<String>,

    /// Index as full text rather than keyword
    #[serde(default)]
    pub full_text: bool,

    /// Values are references to other objects
    #[serde(default)]
    pub foreign_key: Option<ForeignKeyRule>,
}

impl IndexingRule {
    /// Keyword rule on `path`.
    pub fn keyword(path: ObjectJsonPath) -> Self {
        Self {
            path,
            key_name: None,
            full_text: false,
            foreign_key: None,
        }
    }

    /// Effective key name.
    pub fn key_name(&self) -> String {
        if let Some(name) = &self.key_name {
            return name.clone();
        }
        self.path
            .segments()
            .iter()
            .rev()
            .find(|s| !is_wildcard(s))
            .cloned()
            .unwrap_or_else(|| "value".to_string())
    }
}

/// Complete rule set for one storage object type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTypeParsingRules {
    /// Type name in the search index
    pub global_object_type: String,
    /// Storage system the rules apply to
    pub storage_code: String,
    /// Storage-specific type the rules apply to
    pub storage_object_type: String,
    /// Decomposition into sub-objects; absent means the object is indexed whole
    #[serde(default)]
    pub sub_object: Option<SubObjectRule>,
    /// Indexed fields
    #[serde(default)]
    pub indexing_rules: Vec<IndexingRule>,
}

impl ObjectTypeParsingRules {
    /// Parse and validate a JSON rules document.
    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        let rules: Self = serde_json::from_str(json)?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<(), RulesError> {
        let invalid = |message: &str| RulesError::Invalid {
            object_type: self.global_object_type.clone(),
            message: message.to_string(),
        };
        if self.global_object_type.is_empty() {
            return Err(invalid("global_object_type is empty"));
        }
        if self.storage_code.is_empty() || self.storage_object_type.is_empty() {
            return Err(invalid("storage code and storage object type are required"));
        }
        if let Some(sub) = &self.sub_object {
            if sub.sub_object_type.is_empty() {
                return Err(invalid("sub_object_type is empty"));
            }
        }
        Ok(())
    }

    /// Every sub-path that must survive extraction.
    ///
    /// A root primary key names the sub-object's own value and adds nothing.
    pub fn retained_paths(&self) -> Vec<ObjectJsonPath> {
        let mut paths: Vec<ObjectJsonPath> =
            self.indexing_rules.iter().map(|r| r.path.clone()).collect();
        if let Some(sub) = &self.sub_object {
            if !sub.primary_key_path.is_root() {
                paths.push(sub.primary_key_path.clone());
            }
        }
        paths
    }

    /// Selector for sub-objects, or the root when the object is indexed whole.
    pub fn selector_path(&self) -> ObjectJsonPath {
        self.sub_object
            .as_ref()
            .map(|s| s.path.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENOME_RULES: &str = r#"{
        "global_object_type": "GenomeFeature",
        "storage_code": "WS",
        "storage_object_type": "Genome",
        "sub_object": {
            "path": "/features/[*]",
            "sub_object_type": "feature",
            "primary_key_path": "/id"
        },
        "indexing_rules": [
            { "path": "/function", "full_text": true },
            { "path": "/location/[*]/contig", "key_name": "contig" },
            { "path": "/ontology/*", "foreign_key": { "target_storage_type": "Ontology" } }
        ]
    }"#;

    #[test]
    fn test_from_json() {
        let rules = ObjectTypeParsingRules::from_json(GENOME_RULES).unwrap();
        assert_eq!(rules.global_object_type, "GenomeFeature");
        assert_eq!(rules.indexing_rules.len(), 3);
        assert!(rules.indexing_rules[0].full_text);
        assert_eq!(rules.selector_path().to_string(), "/features/[*]");

        let retained: Vec<String> = rules.retained_paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(
            retained,
            vec!["/function", "/location/[*]/contig", "/ontology/*", "/id"]
        );
    }

    #[test]
    fn test_key_name_defaults() {
        let rules = ObjectTypeParsingRules::from_json(GENOME_RULES).unwrap();
        assert_eq!(rules.indexing_rules[0].key_name(), "function");
        assert_eq!(rules.indexing_rules[1].key_name(), "contig");
        assert_eq!(rules.indexing_rules[2].key_name(), "ontology");
        assert_eq!(
            IndexingRule::keyword(ObjectJsonPath::parse("/[*]").unwrap()).key_name(),
            "value"
        );
    }

    #[test]
    fn test_root_primary_key_is_not_retained() {
        let rules = ObjectTypeParsingRules::from_json(&GENOME_RULES.replace("\"/id\"", "\"/\"")).unwrap();
        let primary = &rules.sub_object.as_ref().unwrap().primary_key_path;
        assert!(primary.is_root());
        let retained: Vec<String> = rules.retained_paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(retained, vec!["/function", "/location/[*]/contig", "/ontology/*"]);
    }

    #[test]
    fn test_validation() {
        let bad = GENOME_RULES.replace("\"feature\"", "\"\"");
        assert!(matches!(
            ObjectTypeParsingRules::from_json(&bad),
            Err(RulesError::Invalid { .. })
        ));

        let bad_path = GENOME_RULES.replace("/function", "/fun~9ction");
        assert!(matches!(
            ObjectTypeParsingRules::from_json(&bad_path),
            Err(RulesError::Json(_))
        ));
    }

    #[test]
    fn test_whole_object_selector_is_root() {
        let rules = ObjectTypeParsingRules {
            global_object_type: "Readme".to_string(),
            storage_code: "FS".to_string(),
            storage_object_type: "text".to_string(),
            sub_object: None,
            indexing_rules: vec![],
        };
        assert!(rules.validate().is_ok());
        assert!(rules.selector_path().is_root());
        assert!(rules.retained_paths().is_empty());
    }
}
