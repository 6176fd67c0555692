//! Globally unique identifiers for indexed objects and sub-objects.
//!
//! Format: `{storage_code}:[{access_group}/]{object_id}[/{version}][:{sub_type}/{sub_id}]`
//!
//! Examples:
//! - `WS:12/7/3` - object 7 in access group 12, version 3
//! - `WS:12/7/3:feature/b0001` - sub-object `feature/b0001` of that version
//! - `FS:readme` - object without access group or version
//!
//! A two-segment body `a/b` is always read as `access_group/object_id`. A GUID
//! carrying a version but no access group therefore serializes to text that
//! parses back differently. The representation is kept as is.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GuidError;

/// Address of a sub-object inside its parent object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct SubObject {
    sub_type: String,
    sub_id: String,
}

/// Identifier for an object or sub-object in a storage system.
///
/// Immutable once built. Equality and ordering are structural over every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Guid {
    storage_code: String,
    access_group_id: Option<i32>,
    object_id: String,
    version: Option<i32>,
    sub_object: Option<SubObject>,
}

impl Guid {
    /// Build a GUID from its parts, validating every field.
    pub fn new(
        storage_code: impl Into<String>,
        access_group_id: Option<i32>,
        object_id: impl Into<String>,
        version: Option<i32>,
        sub_object_type: Option<String>,
        sub_object_id: Option<String>,
    ) -> Result<Self, GuidError> {
        let storage_code = storage_code.into();
        let object_id = object_id.into();
        if storage_code.is_empty() {
            return Err(GuidError::EmptyStorageCode(storage_code));
        }
        if object_id.is_empty() {
            return Err(GuidError::EmptyObjectId(storage_code));
        }
        reject_separators("storage code", &storage_code, &[':'])?;
        reject_separators("object id", &object_id, &['/', ':'])?;
        if let Some(v) = version {
            if v < 0 {
                return Err(GuidError::NegativeVersion(v));
            }
        }
        let sub_object = match (sub_object_type, sub_object_id) {
            (Some(sub_type), Some(sub_id)) if !sub_type.is_empty() && !sub_id.is_empty() => {
                reject_separators("sub-object type", &sub_type, &['/'])?;
                Some(SubObject { sub_type, sub_id })
            }
            (None, None) => None,
            _ => return Err(GuidError::IncompleteSubObject),
        };
        Ok(Self {
            storage_code,
            access_group_id,
            object_id,
            version,
            sub_object,
        })
    }

    /// Shorthand for an object GUID without a sub-object.
    pub fn object(
        storage_code: impl Into<String>,
        access_group_id: Option<i32>,
        object_id: impl Into<String>,
        version: Option<i32>,
    ) -> Result<Self, GuidError> {
        Self::new(storage_code, access_group_id, object_id, version, None, None)
    }

    /// Parse a GUID from its text form.
    pub fn parse(text: &str) -> Result<Self, GuidError> {
        let (code, rest) = text
            .split_once(':')
            .ok_or_else(|| GuidError::MissingStorageCode(text.to_string()))?;
        if code.is_empty() {
            return Err(GuidError::EmptyStorageCode(text.to_string()));
        }
        if rest.is_empty() {
            return Err(GuidError::EmptyObjectId(text.to_string()));
        }

        let (body, sub) = match rest.split_once(':') {
            Some((body, sub)) => (body, Some(sub)),
            None => (rest, None),
        };

        let (sub_type, sub_id) = match sub {
            None => (None, None),
            Some(sub) => {
                let (sub_type, sub_id) = sub
                    .split_once('/')
                    .ok_or(GuidError::IncompleteSubObject)?;
                if sub_type.is_empty() || sub_id.is_empty() {
                    return Err(GuidError::DanglingSeparator(text.to_string()));
                }
                (Some(sub_type.to_string()), Some(sub_id.to_string()))
            }
        };

        let parts: Vec<&str> = body.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(GuidError::DanglingSeparator(text.to_string()));
        }

        let (access_group_id, object_id, version) = match parts.as_slice() {
            [object_id] => (None, *object_id, None),
            [group, object_id] => (
                Some(parse_number(text, "access group id", group)?),
                *object_id,
                None,
            ),
            [group, object_id, version] => (
                Some(parse_number(text, "access group id", group)?),
                *object_id,
                Some(parse_number(text, "version", version)?),
            ),
            _ => return Err(GuidError::TooManySegments(text.to_string())),
        };

        Self::new(code, access_group_id, object_id, version, sub_type, sub_id)
    }

    /// Copy of this GUID addressing a sub-object of the same parent.
    pub fn with_sub_object(
        &self,
        sub_object_type: impl Into<String>,
        sub_object_id: impl Into<String>,
    ) -> Result<Self, GuidError> {
        Self::new(
            self.storage_code.clone(),
            self.access_group_id,
            self.object_id.clone(),
            self.version,
            Some(sub_object_type.into()),
            Some(sub_object_id.into()),
        )
    }

    /// The parent object's GUID.
    pub fn without_sub_object(&self) -> Self {
        Self {
            sub_object: None,
            ..self.clone()
        }
    }

    /// The GUID addressing every version of the object.
    pub fn without_version(&self) -> Self {
        Self {
            version: None,
            ..self.clone()
        }
    }

    pub fn storage_code(&self) -> &str {
        &self.storage_code
    }

    pub fn access_group_id(&self) -> Option<i32> {
        self.access_group_id
    }

    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    pub fn version(&self) -> Option<i32> {
        self.version
    }

    pub fn sub_object_type(&self) -> Option<&str> {
        self.sub_object.as_ref().map(|s| s.sub_type.as_str())
    }

    pub fn sub_object_id(&self) -> Option<&str> {
        self.sub_object.as_ref().map(|s| s.sub_id.as_str())
    }

    /// True when this GUID addresses a sub-object.
    pub fn is_sub_object(&self) -> bool {
        self.sub_object.is_some()
    }
}

/// Sub-object ids are the only field free to hold `/` and `:`.
fn reject_separators(
    field: &'static str,
    value: &str,
    separators: &[char],
) -> Result<(), GuidError> {
    match value.chars().find(|c| separators.contains(c)) {
        Some(separator) => Err(GuidError::ReservedSeparator {
            field,
            value: value.to_string(),
            separator,
        }),
        None => Ok(()),
    }
}

fn parse_number(guid: &str, field: &'static str, value: &str) -> Result<i32, GuidError> {
    value.parse().map_err(|_| GuidError::InvalidNumber {
        guid: guid.to_string(),
        field,
        value: value.to_string(),
    })
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.storage_code)?;
        if let Some(group) = self.access_group_id {
            write!(f, "{}/", group)?;
        }
        write!(f, "{}", self.object_id)?;
        if let Some(version) = self.version {
            write!(f, "/{}", version)?;
        }
        if let Some(sub) = &self.sub_object {
            write!(f, ":{}/{}", sub.sub_type, sub.sub_id)?;
        }
        Ok(())
    }
}

impl FromStr for Guid {
    type Err = GuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Guid {
    type Error = GuidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Guid> for String {
    fn from(guid: Guid) -> Self {
        guid.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_guid() {
        let guid = Guid::parse("WS:12/7/3:feature/b0001").unwrap();
        assert_eq!(guid.storage_code(), "WS");
        assert_eq!(guid.access_group_id(), Some(12));
        assert_eq!(guid.object_id(), "7");
        assert_eq!(guid.version(), Some(3));
        assert_eq!(guid.sub_object_type(), Some("feature"));
        assert_eq!(guid.sub_object_id(), Some("b0001"));
        assert!(guid.is_sub_object());
    }

    #[test]
    fn test_parse_minimal_guid() {
        let guid = Guid::parse("FS:readme").unwrap();
        assert_eq!(guid.access_group_id(), None);
        assert_eq!(guid.object_id(), "readme");
        assert_eq!(guid.version(), None);
        assert!(!guid.is_sub_object());
    }

    #[test]
    fn test_roundtrip_all_unambiguous_combinations() {
        let subs = [None, Some(("feature", "id/with/slash"))];
        for group in [Some(0), Some(42)] {
            for version in [None, Some(0), Some(9)] {
                for sub in subs {
                    let guid = Guid::new(
                        "WS",
                        group,
                        "obj",
                        version,
                        sub.map(|(t, _)| t.to_string()),
                        sub.map(|(_, i)| i.to_string()),
                    )
                    .unwrap();
                    let text = guid.to_string();
                    assert_eq!(Guid::parse(&text).unwrap(), guid, "text: {}", text);
                }
            }
        }

        let bare = Guid::object("FS", None, "readme", None).unwrap();
        assert_eq!(Guid::parse(&bare.to_string()).unwrap(), bare);
    }

    #[test]
    fn test_version_without_access_group_is_ambiguous() {
        let guid = Guid::object("WS", None, "7", Some(3)).unwrap();
        assert_eq!(guid.to_string(), "WS:7/3");
        let reparsed = Guid::parse("WS:7/3").unwrap();
        assert_eq!(reparsed.access_group_id(), Some(7));
        assert_eq!(reparsed.object_id(), "3");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Guid::parse("no-separator"),
            Err(GuidError::MissingStorageCode(_))
        ));
        assert!(matches!(
            Guid::parse(":1/2/3"),
            Err(GuidError::EmptyStorageCode(_))
        ));
        assert!(matches!(
            Guid::parse("WS:1/2/3/4"),
            Err(GuidError::TooManySegments(_))
        ));
        assert!(matches!(
            Guid::parse("WS:x/2/3"),
            Err(GuidError::InvalidNumber { field: "access group id", .. })
        ));
        assert!(matches!(
            Guid::parse("WS:1/2/v3"),
            Err(GuidError::InvalidNumber { field: "version", .. })
        ));
        assert!(matches!(
            Guid::parse("WS:1/2/"),
            Err(GuidError::DanglingSeparator(_))
        ));
        assert!(matches!(
            Guid::parse("WS:1/2:feature/"),
            Err(GuidError::DanglingSeparator(_))
        ));
        assert!(matches!(
            Guid::parse("WS:1/2:feature"),
            Err(GuidError::IncompleteSubObject)
        ));
        assert!(matches!(Guid::parse("WS:"), Err(GuidError::EmptyObjectId(_))));
        assert!(matches!(
            Guid::parse("WS:1/2/-1"),
            Err(GuidError::NegativeVersion(-1))
        ));
    }

    #[test]
    fn test_new_rejects_separators_in_fields() {
        assert_eq!(
            Guid::object("WS", Some(1), "a/b", None),
            Err(GuidError::ReservedSeparator {
                field: "object id",
                value: "a/b".to_string(),
                separator: '/',
            })
        );
        assert!(matches!(
            Guid::object("WS", Some(1), "a:b", Some(2)),
            Err(GuidError::ReservedSeparator { field: "object id", separator: ':', .. })
        ));
        assert!(matches!(
            Guid::object("W:S", None, "7", None),
            Err(GuidError::ReservedSeparator { field: "storage code", .. })
        ));
        let parent = Guid::parse("WS:1/2/3").unwrap();
        assert!(matches!(
            parent.with_sub_object("gene/x", "g1"),
            Err(GuidError::ReservedSeparator { field: "sub-object type", .. })
        ));

        // sub-object ids and types keep their remaining characters
        let child = parent.with_sub_object("ge:ne", "a:b/c").unwrap();
        assert_eq!(Guid::parse(&child.to_string()).unwrap(), child);
    }

    #[test]
    fn test_sub_object_derivation() {
        let parent = Guid::parse("WS:1/2/3").unwrap();
        let child = parent.with_sub_object("gene", "g1").unwrap();
        assert_eq!(child.to_string(), "WS:1/2/3:gene/g1");
        assert_eq!(child.without_sub_object(), parent);
        assert_eq!(parent.without_version().to_string(), "WS:1/2");
        assert!(parent.with_sub_object("", "g1").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let guid = Guid::parse("WS:1/2/3:gene/g1").unwrap();
        let json = serde_json::to_string(&guid).unwrap();
        assert_eq!(json, "\"WS:1/2/3:gene/g1\"");
        let decoded: Guid = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, guid);
        assert!(serde_json::from_str::<Guid>("\"bogus\"").is_err());
    }
}
