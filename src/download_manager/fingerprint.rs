//! Dedup fingerprints of songs already present in the output directory.
//!
//! A song's fingerprint is its display key (see [`display_key`]). The set is
//! built from the flat output directory plus an optional ledger file listing
//! previously downloaded file names, one per line.

use std::collections::HashSet;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::models::display_key;

/// Extensions of the audio containers the pipeline writes.
pub const AUDIO_EXTENSIONS: [&str; 3] = ["mp3", "flac", "m4a"];

/// Display keys of songs that are already downloaded.
///
/// Owned by a single orchestrator or worker; there is no locking and no
/// sharing between instances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintSet {
    keys: HashSet<String>,
}

impl FingerprintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Returns true if the key was not present yet.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.keys.insert(key.into())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn union(mut self, other: FingerprintSet) -> Self {
        self.keys.extend(other.keys);
        self
    }
}

impl FromIterator<String> for FingerprintSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Whether a file name ends with one of the [`AUDIO_EXTENSIONS`].
pub fn is_audio_file_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            AUDIO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Builds the fingerprint set for `storage_root`, unioned with the keys
/// listed in `ledger` when one is given.
///
/// Never fails: a missing or unreadable directory or ledger contributes
/// nothing.
pub fn scan(storage_root: &Path, ledger: Option<&Path>) -> FingerprintSet {
    let from_directory = scan_directory(storage_root);
    let from_ledger = ledger.map(scan_ledger).unwrap_or_default();

    debug!(
        directory = from_directory.len(),
        ledger = from_ledger.len(),
        "Fingerprint scan of {:?} complete",
        storage_root
    );

    from_directory.union(from_ledger)
}

fn scan_directory(storage_root: &Path) -> FingerprintSet {
    let entries = match fs::read_dir(storage_root) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Output directory {:?} not readable: {}", storage_root, e);
            return FingerprintSet::new();
        }
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_audio_file_name(name))
        .map(|name| display_key(&name).to_string())
        .collect()
}

fn scan_ledger(ledger: &Path) -> FingerprintSet {
    let file = match fs::File::open(ledger) {
        Ok(file) => file,
        Err(e) => {
            debug!("Ledger {:?} not readable: {}", ledger, e);
            return FingerprintSet::new();
        }
    };

    BufReader::new(file)
        .lines()
        .map_while(|line| line.ok())
        .map(|line| line.trim().to_string())
        .filter(|line| is_audio_file_name(line))
        .map(|line| display_key(&line).to_string())
        .collect()
}

/// Appends a downloaded file name to the ledger, creating it if needed.
pub fn record_in_ledger(ledger: &Path, file_name: &str) -> Result<()> {
    if let Some(parent) = ledger.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create ledger directory {:?}", parent))?;
        }
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(ledger)
        .with_context(|| format!("Failed to open ledger {:?}", ledger))?;
    writeln!(file, "{}", file_name).with_context(|| format!("Failed to append to {:?}", ledger))
}

/// Like [`record_in_ledger`] but only logs failures.
pub fn try_record_in_ledger(ledger: Option<&Path>, file_name: &str) {
    if let Some(ledger) = ledger {
        if let Err(e) = record_in_ledger(ledger, file_name) {
            warn!("Could not update ledger: {:#}", e);
        }
    }
}
