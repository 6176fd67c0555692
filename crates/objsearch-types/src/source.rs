//! Source objects as loaded from a storage system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::PathBuf;

/// Where the raw document lives.
///
/// Large documents are written to a scratch file by the storage client and
/// streamed from there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePayload {
    /// Document on disk
    File(PathBuf),
    /// Document held in memory
    Bytes(Vec<u8>),
}

impl SourcePayload {
    /// Buffered reader over the document.
    pub fn open(&self) -> std::io::Result<Box<dyn Read + '_>> {
        match self {
            SourcePayload::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            SourcePayload::Bytes(bytes) => Ok(Box::new(Cursor::new(bytes.as_slice()))),
        }
    }
}

/// Provenance and ownership metadata of a source object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub name: String,
    pub creator: String,
    #[serde(default)]
    pub copier: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub source_tags: BTreeSet<String>,
}

/// A loaded source object: metadata plus the raw document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceData {
    pub metadata: SourceMetadata,
    pub is_public: bool,
    pub data: SourcePayload,
}

impl SourceData {
    pub fn new(metadata: SourceMetadata, is_public: bool, data: SourcePayload) -> Self {
        Self {
            metadata,
            is_public,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}
