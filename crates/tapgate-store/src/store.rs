//! JSON-backed allow list of card UIDs.
//!
//! The store keeps the authoritative in-memory set and mirrors every
//! mutation to a single JSON file so the list survives power cycles.
//! Writes go to a sibling `.tmp` file first and are renamed over the
//! target, so a power cut mid-write leaves the previous list intact.
//!
//! # File Format
//!
//! ```json
//! {"cards": [{"uid": "04 AB CD EF", "name": "Alice"}]}
//! ```
//!
//! An older flat schema (`{"uids": ["04 AB CD EF"]}`) is still read and
//! upgraded to the current one on first load.
//!
//! Loading never fails: a missing, unreadable or corrupt file logs a
//! warning and the device comes up with an empty list rather than
//! refusing to boot. Mutations do fail loudly when the file cannot be
//! rewritten, but the in-memory change stays applied so the device
//! keeps honoring it until restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tapgate_core::{Card, Uid};
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};

/// One persisted allow-list entry.
#[derive(Debug, Serialize, Deserialize)]
struct CardRecord {
    uid: String,
    #[serde(default)]
    name: String,
}

/// On-disk schema, current first so it wins when both keys are present.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoreFile {
    Current { cards: Vec<CardRecord> },
    Legacy { uids: Vec<String> },
}

#[derive(Debug, Serialize)]
struct StoreFileOut {
    cards: Vec<CardRecord>,
}

/// Allow list of card UIDs with display names, persisted as JSON.
///
/// Entries are keyed by raw UID bytes; since every byte renders as a
/// fixed-width hex pair, byte order and hex order coincide and
/// [`AccessStore::cards`] lists entries sorted by hex UID for free.
#[derive(Debug)]
pub struct AccessStore {
    path: PathBuf,
    cards: BTreeMap<Vec<u8>, String>,
}

impl AccessStore {
    /// Load the allow list from `path`, or start empty when the file is
    /// missing or unreadable.
    ///
    /// A legacy-schema or missing file is rewritten in the current
    /// schema right away; entries that do not parse as UIDs are skipped
    /// with a warning.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut store = Self {
            path,
            cards: BTreeMap::new(),
        };

        let raw = match std::fs::read(&store.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %store.path.display(), "no allow list yet, starting empty");
                store.persist_or_warn();
                return store;
            }
            Err(error) => {
                warn!(path = %store.path.display(), %error, "allow list unreadable, starting empty");
                return store;
            }
        };

        match serde_json::from_slice::<StoreFile>(&raw) {
            Ok(StoreFile::Current { cards }) => {
                for record in cards {
                    store.insert_parsed(&record.uid, record.name);
                }
                debug!(count = store.cards.len(), "allow list loaded");
            }
            Ok(StoreFile::Legacy { uids }) => {
                for uid in uids {
                    store.insert_parsed(&uid, String::new());
                }
                info!(count = store.cards.len(), "legacy allow list upgraded");
                store.persist_or_warn();
            }
            Err(error) => {
                warn!(path = %store.path.display(), %error, "allow list corrupt, starting empty");
                store.persist_or_warn();
            }
        }
        store
    }

    fn insert_parsed(&mut self, uid_hex: &str, name: String) {
        match Uid::parse_hex(uid_hex) {
            Ok(uid) => {
                self.cards.insert(uid.into_bytes(), name);
            }
            Err(error) => warn!(uid = uid_hex, %error, "skipping bad allow list entry"),
        }
    }

    /// Check whether `uid` is on the allow list.
    pub fn check(&self, uid: &Uid) -> bool {
        self.cards.contains_key(uid.as_bytes())
    }

    /// Display name stored for `uid`, if the card is on the list.
    pub fn name_of(&self, uid: &Uid) -> Option<&str> {
        self.cards.get(uid.as_bytes()).map(String::as_str)
    }

    /// Add a card, or update its name when it is already listed.
    ///
    /// Returns the operator message describing what happened. Re-adding
    /// a listed card without a name is a no-op success ("Already
    /// exists"); with a name it renames the card.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadUid`] when `uid_hex` does not parse, or a
    /// persistence error (the in-memory change is kept in that case).
    pub fn add(&mut self, uid_hex: &str, name: &str) -> Result<String> {
        let uid = Uid::parse_hex(uid_hex)?;
        let hex = uid.to_hex();

        if self.cards.contains_key(uid.as_bytes()) {
            if name.is_empty() {
                return Ok("Already exists".to_string());
            }
            self.cards.insert(uid.into_bytes(), name.to_string());
            self.persist()?;
            return Ok(format!("Name updated: {hex} -> {name}"));
        }

        self.cards.insert(uid.into_bytes(), name.to_string());
        self.persist()?;
        Ok(format!("Added: {hex}"))
    }

    /// Remove a card from the allow list.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadUid`], [`StoreError::NotFound`], or a
    /// persistence error (the removal stays applied in memory).
    pub fn remove(&mut self, uid_hex: &str) -> Result<String> {
        let uid = Uid::parse_hex(uid_hex)?;
        if self.cards.remove(uid.as_bytes()).is_none() {
            return Err(StoreError::NotFound);
        }
        self.persist()?;
        Ok(format!("Removed: {}", uid.to_hex()))
    }

    /// Set (or clear, with an empty string) the display name of a
    /// listed card.
    ///
    /// # Errors
    ///
    /// [`StoreError::BadUid`], [`StoreError::NotFound`], or a
    /// persistence error (the rename stays applied in memory).
    pub fn set_name(&mut self, uid_hex: &str, name: &str) -> Result<String> {
        let uid = Uid::parse_hex(uid_hex)?;
        let hex = uid.to_hex();
        match self.cards.get_mut(uid.as_bytes()) {
            Some(current) => {
                *current = name.to_string();
            }
            None => return Err(StoreError::NotFound),
        }
        self.persist()?;
        Ok(format!("Renamed: {hex} -> {name}"))
    }

    /// Remove every card from the allow list.
    ///
    /// # Errors
    ///
    /// A persistence error; the list is already empty in memory then.
    pub fn clear_all(&mut self) -> Result<String> {
        self.cards.clear();
        self.persist()?;
        Ok("Cleared".to_string())
    }

    /// All cards, sorted ascending by hex UID.
    pub fn cards(&self) -> Vec<Card> {
        self.cards
            .iter()
            .filter_map(|(bytes, name)| {
                Uid::new(bytes.clone())
                    .ok()
                    .map(|uid| Card::new(uid, name.clone()))
            })
            .collect()
    }

    /// Number of cards on the allow list.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Whether the allow list is empty.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the list to a temp file, then rename it over the target.
    fn persist(&self) -> Result<()> {
        let records: Vec<CardRecord> = self
            .cards()
            .into_iter()
            .map(|card| CardRecord {
                uid: card.uid.to_hex(),
                name: card.name,
            })
            .collect();
        let json = serde_json::to_vec(&StoreFileOut { cards: records })?;

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn persist_or_warn(&self) {
        if let Err(error) = self.persist() {
            warn!(path = %self.path.display(), %error, "allow list write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> AccessStore {
        AccessStore::load(dir.path().join("uids.json"))
    }

    fn uid(hex: &str) -> Uid {
        Uid::parse_hex(hex).unwrap()
    }

    #[test]
    fn test_missing_file_starts_empty_and_creates_it() {
        let dir = TempDir::new().unwrap();

        let store = store_in(&dir);

        assert!(store.is_empty());
        assert!(store.path().exists());
    }

    #[test]
    fn test_add_persists_across_reload() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        let msg = store.add("15 D6 14", "Alice").unwrap();
        assert_eq!(msg, "Added: 15 D6 14");

        let reloaded = store_in(&dir);
        assert!(reloaded.check(&uid("15 D6 14")));
        assert_eq!(reloaded.name_of(&uid("15 D6 14")), Some("Alice"));
    }

    #[test]
    fn test_add_normalizes_uid_spelling() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        store.add("15:d6:14", "").unwrap();

        assert!(store.check(&uid("15 D6 14")));
        assert_eq!(store.cards()[0].uid.to_hex(), "15 D6 14");
    }

    #[test]
    fn test_add_duplicate_without_name_is_noop_success() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.add("04 AB", "Bob").unwrap();

        let msg = store.add("04AB", "").unwrap();

        assert_eq!(msg, "Already exists");
        assert_eq!(store.name_of(&uid("04 AB")), Some("Bob"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_with_different_name_updates_it() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.add("04 AB", "Bob").unwrap();

        let msg = store.add("04 AB", "Robert").unwrap();

        assert_eq!(msg, "Name updated: 04 AB -> Robert");
        assert_eq!(store.name_of(&uid("04 AB")), Some("Robert"));
        assert_eq!(store.len(), 1);
    }

    #[rstest]
    #[case("")]
    #[case("15 G6")]
    #[case("15D61")]
    fn test_add_rejects_bad_uid(#[case] input: &str) {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        assert!(matches!(store.add(input, ""), Err(StoreError::BadUid(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_deletes_entry() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.add("04 AB", "").unwrap();

        let msg = store.remove("04ab").unwrap();

        assert_eq!(msg, "Removed: 04 AB");
        assert!(!store.check(&uid("04 AB")));

        let reloaded = store_in(&dir);
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_remove_missing_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        assert!(matches!(store.remove("04 AB"), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_set_name_renames_listed_card() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.add("04 AB", "").unwrap();

        let msg = store.set_name("04 AB", "Carol").unwrap();

        assert_eq!(msg, "Renamed: 04 AB -> Carol");
        assert_eq!(store.name_of(&uid("04 AB")), Some("Carol"));
    }

    #[test]
    fn test_set_name_missing_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        assert!(matches!(
            store.set_name("04 AB", "Carol"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_clear_all_empties_list() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.add("04 AB", "").unwrap();
        store.add("15 D6 14", "").unwrap();

        let msg = store.clear_all().unwrap();

        assert_eq!(msg, "Cleared");
        assert!(store.is_empty());
        assert!(store_in(&dir).is_empty());
    }

    #[test]
    fn test_cards_sorted_by_hex_uid() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.add("FF 00", "").unwrap();
        store.add("04 AB CD EF", "").unwrap();
        store.add("04 AB", "").unwrap();

        let hexes: Vec<String> = store.cards().iter().map(|c| c.uid.to_hex()).collect();

        assert_eq!(hexes, vec!["04 AB", "04 AB CD EF", "FF 00"]);
    }

    #[test]
    fn test_legacy_schema_upgraded_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uids.json");
        std::fs::write(&path, r#"{"uids": ["15 D6 14", "04ab"]}"#).unwrap();

        let store = AccessStore::load(&path);

        assert_eq!(store.len(), 2);
        assert!(store.check(&uid("15 D6 14")));
        assert_eq!(store.name_of(&uid("04 AB")), Some(""));

        // The file was rewritten in the current schema.
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"cards\""));
    }

    #[test]
    fn test_corrupt_file_starts_empty_and_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uids.json");
        std::fs::write(&path, "not json at all").unwrap();

        let store = AccessStore::load(&path);

        assert!(store.is_empty());
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"cards\""));
    }

    #[test]
    fn test_unparseable_entries_skipped_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uids.json");
        std::fs::write(
            &path,
            r#"{"cards": [{"uid": "ZZ"}, {"uid": "04 AB", "name": "Bob"}]}"#,
        )
        .unwrap();

        let store = AccessStore::load(&path);

        assert_eq!(store.len(), 1);
        assert_eq!(store.name_of(&uid("04 AB")), Some("Bob"));
    }

    #[test]
    fn test_persist_failure_keeps_memory_applied() {
        let dir = TempDir::new().unwrap();
        // Parent directory never exists, so every write fails.
        let mut store = AccessStore::load(dir.path().join("missing/uids.json"));

        let result = store.add("04 AB", "Bob");

        assert!(matches!(result, Err(StoreError::Persist(_))));
        assert!(store.check(&uid("04 AB")));
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.add("04 AB", "").unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();

        assert!(leftovers.is_empty());
    }
}
