//! Durable record of processed files.
//!
//! The ledger is a UTF-8 text file, one record per line:
//! `old_name|new_name|timestamp|signature`. Lines are only ever appended.
//! A `|`, backslash or line break inside a field is written backslash-escaped.
//! Both the old and the new name of every record are indexed, as is the
//! content signature, so a file is recognized after a rename or when a copy
//! shows up under another name.

use chrono::{Local, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::media::ProbeResult;

/// Ledger file name inside the log directory
pub const LEDGER_FILE_NAME: &str = "processed_files.log";

const FIELD_SEPARATOR: char = '|';
const ESCAPE: char = '\\';

fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            ESCAPE => out.push_str("\\\\"),
            FIELD_SEPARATOR => out.push_str("\\|"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Split on unescaped separators and decode escapes. Unknown escapes are kept
/// as written so hand-edited and older lines still read back verbatim.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some(ESCAPE) => current.push(ESCAPE),
                Some(FIELD_SEPARATOR) => current.push(FIELD_SEPARATOR),
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) => {
                    current.push(ESCAPE);
                    current.push(other);
                }
                None => current.push(ESCAPE),
            },
            FIELD_SEPARATOR => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Cheap content fingerprint: `{byte_size}_{duration_seconds}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileSignature(String);

impl FileSignature {
    pub fn new(byte_size: u64, duration: &str) -> Self {
        Self(format!("{}_{}", byte_size, duration))
    }

    /// Signature of a probed file; a missing duration counts as `0`.
    pub fn from_probe(byte_size: u64, probe: &ProbeResult) -> Self {
        Self::new(byte_size, probe.duration.as_deref().unwrap_or("0"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryCategory {
    #[default]
    Video,
    Subtitle,
}

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub old_name: String,
    pub new_name: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub category: EntryCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Where the artifact was mirrored, once uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_path: Option<String>,
}

impl LedgerEntry {
    pub fn new<S1: Into<String>, S2: Into<String>>(
        old_name: S1,
        new_name: S2,
        category: EntryCategory,
        signature: Option<&FileSignature>,
    ) -> Self {
        Self {
            old_name: old_name.into(),
            new_name: new_name.into(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            signature: signature.map(|s| s.as_str().to_string()),
            category,
            output_path: None,
            language: None,
            notes: None,
            remote_path: None,
        }
    }

    pub fn with_output(mut self, output_path: &Path) -> Self {
        self.output_path = Some(output_path.to_string_lossy().to_string());
        self
    }

    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_notes<S: Into<String>>(mut self, notes: S) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// The pipe-delimited ledger line, without the trailing newline
    pub fn to_line(&self) -> String {
        [
            self.old_name.as_str(),
            self.new_name.as_str(),
            self.timestamp.as_str(),
            self.signature.as_deref().unwrap_or(""),
        ]
        .map(escape_field)
        .join("|")
    }

    /// Parse one ledger line; lines with fewer than two fields are ignored.
    pub fn from_line(line: &str) -> Option<Self> {
        let fields = split_fields(line.trim_end_matches(['\r', '\n']));
        let mut parts = fields.iter().map(String::as_str);
        let old_name = parts.next()?.trim();
        let new_name = parts.next()?.trim();
        if old_name.is_empty() || new_name.is_empty() {
            return None;
        }
        let timestamp = parts.next().unwrap_or("").trim().to_string();
        let signature = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let category = if new_name.to_ascii_lowercase().ends_with(".srt") {
            EntryCategory::Subtitle
        } else {
            EntryCategory::Video
        };

        Some(Self {
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
            timestamp,
            signature,
            category,
            output_path: None,
            language: None,
            notes: None,
            remote_path: None,
        })
    }
}

pub type NameIndex = HashMap<String, LedgerEntry>;
pub type SignatureIndex = HashMap<String, LedgerEntry>;

/// Read every record of a pipe-delimited log
pub fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().filter_map(LedgerEntry::from_line).collect())
}

/// Build the name and signature indices of a pipe-delimited log
pub fn read_indices(path: &Path) -> Result<(NameIndex, SignatureIndex)> {
    let mut by_name = NameIndex::new();
    let mut by_signature = SignatureIndex::new();
    for entry in read_entries(path)? {
        index_entry(&mut by_name, &mut by_signature, &entry);
    }
    Ok((by_name, by_signature))
}

fn index_entry(by_name: &mut NameIndex, by_signature: &mut SignatureIndex, entry: &LedgerEntry) {
    by_name.insert(entry.old_name.clone(), entry.clone());
    by_name.insert(entry.new_name.clone(), entry.clone());
    if let Some(signature) = &entry.signature {
        by_signature.insert(signature.clone(), entry.clone());
    }
}

/// Prior match for an input file
#[derive(Debug, Clone, PartialEq)]
pub enum PriorMatch<'a> {
    ByName(&'a LedgerEntry),
    BySignature(&'a LedgerEntry),
}

/// Local processed-files ledger with its in-memory indices
#[derive(Debug)]
pub struct ProcessedLedger {
    path: PathBuf,
    by_name: NameIndex,
    by_signature: SignatureIndex,
}

impl ProcessedLedger {
    /// Load the ledger at `path`; a missing file is an empty ledger
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let (by_name, by_signature) = read_indices(&path)?;
        debug!(
            "Loaded ledger {} ({} names, {} signatures)",
            path.display(),
            by_name.len(),
            by_signature.len()
        );
        Ok(Self {
            path,
            by_name,
            by_signature,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lookup_name(&self, name: &str) -> Option<&LedgerEntry> {
        self.by_name.get(name)
    }

    pub fn lookup_signature(&self, signature: &FileSignature) -> Option<&LedgerEntry> {
        self.by_signature.get(signature.as_str())
    }

    /// Check both indices. The name is consulted first; the signature, when
    /// known, catches renamed or duplicated content.
    pub fn find_prior(&self, name: &str, signature: Option<&FileSignature>) -> Option<PriorMatch<'_>> {
        if let Some(entry) = self.lookup_name(name) {
            return Some(PriorMatch::ByName(entry));
        }
        signature
            .and_then(|s| self.lookup_signature(s))
            .map(PriorMatch::BySignature)
    }

    /// Append one record as a single write and index it
    pub fn append(&mut self, entry: &LedgerEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format!("{}\n", entry.to_line()).as_bytes())?;

        index_entry(&mut self.by_name, &mut self.by_signature, entry);
        Ok(())
    }

    /// All records, in file order
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        read_entries(&self.path)
    }

    /// Convert a legacy log into a JSON snapshot, fold its records into this
    /// ledger and delete it.
    ///
    /// Records whose old name is already indexed are not appended again.
    /// Returns the snapshot path when a conversion happened.
    pub fn migrate_legacy(&mut self, legacy_path: &Path, snapshot_dir: &Path) -> Result<Option<PathBuf>> {
        if !legacy_path.is_file() || legacy_path == self.path {
            return Ok(None);
        }

        let mut converted = read_entries(legacy_path)?;
        for entry in &mut converted {
            if entry.timestamp.is_empty() {
                entry.timestamp = Utc::now().to_rfc3339();
            }
        }

        let snapshot = if converted.is_empty() {
            None
        } else {
            let snapshot = write_snapshot(snapshot_dir, "legacy", &converted)?;
            for entry in &converted {
                if self.lookup_name(&entry.old_name).is_none() {
                    self.append(entry)?;
                }
            }
            Some(snapshot)
        };

        std::fs::remove_file(legacy_path)?;
        match &snapshot {
            Some(path) => info!(
                "Converted legacy log {} ({} records) into {}",
                legacy_path.display(),
                converted.len(),
                path.display()
            ),
            None => warn!("Removed empty legacy log {}", legacy_path.display()),
        }
        Ok(snapshot)
    }
}

/// Write `entries` as a JSON array to `<dir>/<prefix>_<UTC timestamp>.json`
pub fn write_snapshot(dir: &Path, prefix: &str, entries: &[LedgerEntry]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();

    let mut path = dir.join(format!("{}_{}.json", prefix, stamp));
    let mut attempt = 1;
    while path.exists() {
        path = dir.join(format!("{}_{}_{}.json", prefix, stamp, attempt));
        attempt += 1;
    }

    std::fs::write(&path, serde_json::to_string_pretty(entries)?)?;
    Ok(path)
}

/// Read a JSON snapshot back
pub fn read_snapshot(path: &Path) -> Result<Vec<LedgerEntry>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
