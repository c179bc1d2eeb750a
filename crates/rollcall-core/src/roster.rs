//! In-memory roster store.
//!
//! The sample roster is embedded at compile time from `contrib/roster.toml`
//! and parsed once. Every daemon start begins from that seed; nothing is
//! written back.

use crate::types::StudentRecord;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

const SEED_ROSTER: &str = include_str!("../../../contrib/roster.toml");

type SeedRecords = Result<Vec<StudentRecord>, toml::de::Error>;

static SEED_DB: OnceLock<SeedRecords> = OnceLock::new();

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("duplicate student name: {0}")]
    DuplicateName(String),
    #[error("bad roster TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read roster file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

/// Top-level roster file structure.
#[derive(Debug, Deserialize)]
struct RosterFile {
    students: Vec<StudentRecord>,
}

fn seed_db() -> &'static SeedRecords {
    SEED_DB.get_or_init(|| parse_seed(SEED_ROSTER))
}

fn parse_seed(src: &str) -> SeedRecords {
    toml::from_str::<RosterFile>(src).map(|file| file.students)
}

fn parse_records(src: &str) -> Result<Vec<StudentRecord>, RosterError> {
    Ok(parse_seed(src)?)
}

/// The parse outcome is cached, so a bad seed fails every call the same way.
fn roster_from_seed(seed: &SeedRecords) -> Result<Roster, RosterError> {
    Roster::new(seed.clone()?)
}

/// Ordered set of student records with unique names.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    records: Vec<StudentRecord>,
}

impl Roster {
    /// Build a roster, normalizing blank phone numbers and rejecting duplicate names.
    pub fn new(records: Vec<StudentRecord>) -> Result<Self, RosterError> {
        let mut seen = HashSet::with_capacity(records.len());
        let mut normalized = Vec::with_capacity(records.len());
        for mut rec in records {
            if !seen.insert(rec.name.clone()) {
                return Err(RosterError::DuplicateName(rec.name));
            }
            if rec.phone.as_deref().is_some_and(|p| p.trim().is_empty()) {
                rec.phone = None;
            }
            normalized.push(rec);
        }
        Ok(Self { records: normalized })
    }

    /// Fresh copy of the embedded sample roster.
    pub fn seed() -> Result<Self, RosterError> {
        roster_from_seed(seed_db())
    }

    /// Parse a roster from TOML text with a `[[students]]` array.
    pub fn from_toml_str(src: &str) -> Result<Self, RosterError> {
        Self::new(parse_records(src)?)
    }

    /// Load a roster file from disk, in the same format as the embedded seed.
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let src = std::fs::read_to_string(path).map_err(|source| RosterError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let roster = Self::from_toml_str(&src)?;
        tracing::info!(path = %path.display(), students = roster.len(), "loaded roster file");
        Ok(roster)
    }

    pub fn records(&self) -> &[StudentRecord] {
        &self.records
    }

    pub(crate) fn records_mut(&mut self) -> &mut [StudentRecord] {
        &mut self.records
    }

    pub fn get(&self, name: &str) -> Option<&StudentRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
