//! Location mapping: location names to base grid vectors.
//!
//! The mapping is driven by a versioned, read-only keyword table. Matching
//! is case-insensitive substring matching on normalised names; when several
//! keywords match, the longest keyword wins and equal lengths fall back to
//! table order. Names that match nothing map to the origin.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use worldweaver_core::error::ImprovementError;
use worldweaver_core::storylet::Coordinate;

/// Version label of the built-in keyword table.
pub const BUILTIN_TABLE_VERSION: &str = "builtin-1";

/// Largest absolute coordinate component a table entry may use.
const MAX_COMPONENT: i32 = 1000;

/// Built-in table: hubs at the origin, north is negative `y`, east is
/// positive `x`.
const BUILTIN_KEYWORDS: &[(&str, i32, i32)] = &[
    // Hubs
    ("starting area", 0, 0),
    ("center", 0, 0),
    ("hub", 0, 0),
    ("plaza", 0, 0),
    ("square", 0, 0),
    ("courtyard", 0, 0),
    ("main hall", 0, 0),
    // North
    ("north", 0, -2),
    ("northern", 0, -2),
    ("mountain", 0, -3),
    ("peak", 0, -4),
    ("summit", 0, -4),
    ("highlands", 0, -3),
    ("tower", 0, -2),
    // South
    ("south", 0, 2),
    ("southern", 0, 2),
    ("valley", 0, 3),
    ("lowlands", 0, 3),
    ("swamp", 0, 4),
    ("marsh", 0, 4),
    ("bog", 0, 4),
    // East
    ("east", 2, 0),
    ("eastern", 2, 0),
    ("sunrise", 3, 0),
    ("dawn", 3, 0),
    ("coast", 4, 0),
    ("shore", 4, 0),
    ("beach", 4, 0),
    // West
    ("west", -2, 0),
    ("western", -2, 0),
    ("sunset", -3, 0),
    ("dusk", -3, 0),
    ("forest", -3, 0),
    ("woods", -3, 0),
    ("grove", -2, 0),
    // Diagonals
    ("northeast", 2, -2),
    ("northwest", -2, -2),
    ("southeast", 2, 2),
    ("southwest", -2, 2),
    // Settlement
    ("tavern", -1, 1),
    ("inn", -1, 1),
    ("pub", -1, 1),
    ("market", 1, 1),
    ("shop", 1, 1),
    ("vendor", 1, 1),
    ("forge", 1, -1),
    ("smithy", 1, -1),
    ("workshop", 1, -1),
    ("temple", -1, -1),
    ("shrine", -1, -1),
    ("altar", -1, -1),
    ("castle", 0, -1),
    ("fortress", 0, -1),
    ("palace", 0, -1),
    // Underground
    ("cave", -4, -1),
    ("cavern", -4, -1),
    ("grotto", -4, -1),
    ("dungeon", -4, 2),
    ("crypt", -4, 2),
    ("tomb", -4, 2),
    ("underground", -4, 0),
    ("depths", -4, 0),
    // Water
    ("river", 2, 1),
    ("stream", 2, 1),
    ("brook", 2, 1),
    ("lake", 3, 2),
    ("pond", 3, 2),
    ("waterfall", 3, -2),
    ("cascade", 3, -2),
];

/// One keyword and the base vector it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordEntry {
    /// Keyword, matched as a substring of the normalised location name.
    pub keyword: String,
    /// Base x component.
    pub x: i32,
    /// Base y component.
    pub y: i32,
}

impl KeywordEntry {
    /// The entry's base vector.
    #[must_use]
    pub fn vector(&self) -> Coordinate {
        Coordinate::new(self.x, self.y)
    }
}

/// On-disk YAML shape of a keyword table.
#[derive(Debug, Deserialize)]
struct RawKeywordTable {
    version: String,
    keywords: Vec<KeywordEntry>,
}

/// A validated, versioned keyword table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordTable {
    version: String,
    entries: Vec<KeywordEntry>,
    fingerprint: String,
}

impl KeywordTable {
    /// Validates and normalises a keyword table.
    ///
    /// # Errors
    ///
    /// Returns `ImprovementError::Configuration` for a blank version, an
    /// empty table, a blank or duplicate keyword, or a component outside
    /// `±1000`.
    pub fn new(version: &str, entries: Vec<KeywordEntry>) -> Result<Self, ImprovementError> {
        let version = version.trim();
        if version.is_empty() {
            return Err(ImprovementError::Configuration(
                "keyword table version must not be blank".to_owned(),
            ));
        }
        if entries.is_empty() {
            return Err(ImprovementError::Configuration(
                "keyword table must not be empty".to_owned(),
            ));
        }

        let mut seen = BTreeSet::new();
        let mut normalised = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let keyword = normalise(&entry.keyword);
            if keyword.is_empty() {
                return Err(ImprovementError::Configuration(format!(
                    "keyword table entry {index} has a blank keyword"
                )));
            }
            if !seen.insert(keyword.clone()) {
                return Err(ImprovementError::Configuration(format!(
                    "duplicate keyword '{keyword}'"
                )));
            }
            if entry.x.abs() > MAX_COMPONENT || entry.y.abs() > MAX_COMPONENT {
                return Err(ImprovementError::Configuration(format!(
                    "keyword '{keyword}' maps outside ±{MAX_COMPONENT}"
                )));
            }
            normalised.push(KeywordEntry {
                keyword,
                x: entry.x,
                y: entry.y,
            });
        }

        Ok(Self::assemble(version.to_owned(), normalised))
    }

    /// The built-in table.
    #[must_use]
    pub fn builtin() -> Self {
        let entries = BUILTIN_KEYWORDS
            .iter()
            .map(|&(keyword, x, y)| KeywordEntry {
                keyword: keyword.to_owned(),
                x,
                y,
            })
            .collect();
        Self::assemble(BUILTIN_TABLE_VERSION.to_owned(), entries)
    }

    /// Parses a table from YAML of the form
    /// `{ version: "...", keywords: [{ keyword, x, y }, ...] }`.
    ///
    /// # Errors
    ///
    /// Returns `ImprovementError::Configuration` if the YAML is malformed or
    /// the table fails validation.
    pub fn from_yaml_str(input: &str) -> Result<Self, ImprovementError> {
        let raw: RawKeywordTable = serde_yaml::from_str(input).map_err(|e| {
            ImprovementError::Configuration(format!("keyword table is not valid YAML: {e}"))
        })?;
        Self::new(&raw.version, raw.keywords)
    }

    /// Loads a table from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns `ImprovementError::Configuration` if the file cannot be read
    /// or does not hold a valid table.
    pub fn load_from_yaml(path: &Path) -> Result<Self, ImprovementError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ImprovementError::Configuration(format!(
                "cannot read keyword table {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&contents)
    }

    fn assemble(version: String, entries: Vec<KeywordEntry>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(version.as_bytes());
        hasher.update(b"\n");
        for entry in &entries {
            hasher.update(format!("{}\t{}\t{}\n", entry.keyword, entry.x, entry.y).as_bytes());
        }
        let fingerprint = format!("{:x}", hasher.finalize());
        Self {
            version,
            entries,
            fingerprint,
        }
    }

    /// The table's version label.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// SHA-256 of the table's canonical content, hex encoded.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Entries in table order.
    #[must_use]
    pub fn entries(&self) -> &[KeywordEntry] {
        &self.entries
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Maps location names to base grid vectors.
#[derive(Debug, Clone, Default)]
pub struct LocationMapper {
    table: KeywordTable,
}

impl LocationMapper {
    /// Creates a mapper over `table`.
    #[must_use]
    pub fn new(table: KeywordTable) -> Self {
        Self { table }
    }

    /// The keyword table in use.
    #[must_use]
    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    /// The entry that decides `location`'s vector, if any.
    #[must_use]
    pub fn matched_keyword(&self, location: &str) -> Option<&KeywordEntry> {
        let name = normalise(location);
        if name.is_empty() {
            return None;
        }
        // Longest wins; `max_by_key` keeps the last maximum, so iterate in
        // reverse to keep the earliest entry among equal lengths.
        self.table
            .entries
            .iter()
            .rev()
            .filter(|entry| name.contains(entry.keyword.as_str()))
            .max_by_key(|entry| entry.keyword.len())
    }

    /// Base vector for `location`; `(0, 0)` when no keyword matches.
    #[must_use]
    pub fn map(&self, location: &str) -> Coordinate {
        self.matched_keyword(location)
            .map_or_else(Coordinate::default, KeywordEntry::vector)
    }
}

/// Lower-cases, turns `_` and `-` into spaces and collapses whitespace.
fn normalise(name: &str) -> String {
    name.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
