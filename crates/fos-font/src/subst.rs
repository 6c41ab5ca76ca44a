//! Font substitution table
//!
//! Maps a requested `(name, charset)` to a replacement name and charset.
//! Entries come from the configuration store (`FontSubstitutes`), from the
//! catalog (English name to localized name) and from callers.

use std::fmt;

use crate::charset::Charset;
use crate::names::names_equal;
use crate::store::{ConfigStore, StoreValue};
use crate::Result;

/// Store key holding substitutions
pub const SUBSTITUTES_KEY: &str = "FontSubstitutes";

/// One side of a substitution: a face name and an optional charset.
///
/// `charset: None` matches any charset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstName {
    pub name: String,
    pub charset: Option<Charset>,
}

impl SubstName {
    pub fn new(name: impl Into<String>, charset: Option<Charset>) -> Self {
        Self {
            name: name.into(),
            charset,
        }
    }

    /// Parse the stored `"Name[,charset]"` form
    pub fn parse(value: &str) -> Self {
        if let Some((name, charset)) = value.rsplit_once(',') {
            if let Ok(cs) = charset.trim().parse::<u8>() {
                return Self::new(name.trim(), Some(Charset(cs)));
            }
        }
        Self::new(value.trim(), None)
    }
}

impl fmt::Display for SubstName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.charset {
            Some(cs) => write!(f, "{},{}", self.name, cs),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A substitution from one name to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstEntry {
    pub from: SubstName,
    pub to: SubstName,
}

impl SubstEntry {
    pub fn new(from: SubstName, to: SubstName) -> Self {
        Self { from, to }
    }
}

/// Substitution table
#[derive(Debug, Default, Clone)]
pub struct SubstTable {
    entries: Vec<SubstEntry>,
}

impl SubstTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Returns false if an entry with the same key exists and
    /// `force` is not set.
    ///
    /// A target name that is itself a charset-agnostic substitution source
    /// is redirected to that entry's target, so chains never exceed one hop.
    pub fn add(&mut self, mut entry: SubstEntry, force: bool) -> bool {
        if let Some(pos) = self.exact_position(&entry.from.name, entry.from.charset) {
            if !force {
                return false;
            }
            let removed = self.entries.remove(pos);
            tracing::trace!("Replacing substitution {} -> {}", removed.from, removed.to);
        }

        if let Some(target) = self.resolve(&entry.to.name, None) {
            if !names_equal(&target.to.name, &entry.from.name) {
                entry.to.name = target.to.name.clone();
            }
        }

        tracing::trace!("Adding substitution {} -> {}", entry.from, entry.to);
        self.entries.push(entry);
        true
    }

    /// Add an entry read from configuration.
    ///
    /// Entries targeting the default pseudo-charset, or crossing charsets,
    /// are rejected unless `allow_cross_charset` is set.
    pub fn ingest(&mut self, from: &str, to: &str, allow_cross_charset: bool) -> bool {
        let entry = SubstEntry::new(SubstName::parse(from), SubstName::parse(to));
        if entry.from.name.is_empty() || entry.to.name.is_empty() {
            return false;
        }
        if !allow_cross_charset
            && (entry.to.charset == Some(Charset::DEFAULT) || entry.from.charset != entry.to.charset)
        {
            tracing::debug!("Rejecting cross-charset substitution {} -> {}", entry.from, entry.to);
            return false;
        }
        self.add(entry, false)
    }

    /// Load every value under the substitutes key
    pub fn load_from_store(&mut self, store: &dyn ConfigStore, allow_cross_charset: bool) -> Result<usize> {
        let mut added = 0;
        for (from, value) in store.enumerate_values(SUBSTITUTES_KEY)? {
            let StoreValue::String(to) = value else {
                tracing::warn!("Ignoring non-string substitution value for {}", from);
                continue;
            };
            if self.ingest(&from, &to, allow_cross_charset) {
                added += 1;
            }
        }
        tracing::debug!("Loaded {} font substitutions", added);
        Ok(added)
    }

    /// Find the entry for `name`. An entry for the exact charset wins over
    /// one whose source charset is `None`, which matches any.
    pub fn resolve(&self, name: &str, charset: Option<Charset>) -> Option<&SubstEntry> {
        self.exact_position(name, charset)
            .or_else(|| self.exact_position(name, None))
            .map(|pos| &self.entries[pos])
    }

    fn exact_position(&self, name: &str, charset: Option<Charset>) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.from.charset == charset && names_equal(&e.from.name, name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubstEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
