//! Split manifests and where they are kept
//!
//! A manifest is a text file of sections, each introduced by `#<SplitName>`
//! and followed by one identifier per line:
//!
//! ```text
//! #Train
//! cat_001.jpg
//! dog_004.jpg
//! #Test
//! cat_002.jpg
//! ```
//!
//! Identifier lines are kept verbatim. An identifier that itself starts with
//! `#` or `\` is written with a leading `\`.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::split_type::SplitType;

/// Identifiers assigned to each split
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitManifest {
    sections: BTreeMap<SplitType, Vec<String>>,
}

impl SplitManifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a section, even if it ends up empty
    pub fn add_section(&mut self, split: SplitType) {
        self.sections.entry(split).or_default();
    }

    /// Assign `id` to `split`
    ///
    /// Blank identifiers and identifiers spanning several lines have no text
    /// form and are rejected.
    pub fn insert(&mut self, split: SplitType, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        if id.trim().is_empty() || id.contains(['\n', '\r']) {
            return Err(Error::InvalidManifest(format!(
                "identifier {id:?} cannot be stored in a manifest"
            )));
        }
        self.sections.entry(split).or_default().push(id);
        Ok(())
    }

    /// Identifiers in `split`
    pub fn ids(&self, split: SplitType) -> &[String] {
        self.sections.get(&split).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Declared sections, in manifest order
    pub fn splits(&self) -> impl Iterator<Item = SplitType> + '_ {
        self.sections.keys().copied()
    }

    /// Total number of identifiers
    pub fn len(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    /// Check if no identifier is assigned
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifier to split lookup
    ///
    /// An identifier listed in several sections resolves to the last one in
    /// manifest order.
    pub fn lookup(&self) -> HashMap<String, SplitType> {
        self.sections
            .iter()
            .flat_map(|(split, ids)| ids.iter().map(move |id| (id.clone(), *split)))
            .collect()
    }

    /// Parse the text form
    pub fn parse(text: &str) -> Result<Self> {
        let mut manifest = Self::new();
        let mut current = None;

        for (number, line) in text.lines().enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('#') {
                let split: SplitType = name.trim().parse().map_err(|_| {
                    Error::InvalidManifest(format!(
                        "line {}: unknown section '{}'",
                        number + 1,
                        name.trim()
                    ))
                })?;
                manifest.add_section(split);
                current = Some(split);
                continue;
            }
            let id = line.strip_prefix('\\').unwrap_or(line);
            match current {
                Some(split) => manifest.insert(split, id)?,
                None => {
                    return Err(Error::InvalidManifest(format!(
                        "line {}: identifier '{id}' precedes the first section",
                        number + 1
                    )))
                }
            }
        }
        Ok(manifest)
    }

    /// Render the text form
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for (split, ids) in &self.sections {
            let _ = writeln!(text, "#{split}");
            for id in ids {
                if id.starts_with(['#', '\\']) {
                    text.push('\\');
                }
                let _ = writeln!(text, "{id}");
            }
        }
        text
    }
}

/// Persistence for a split manifest
pub trait ManifestStore {
    /// Load the stored manifest; `None` if nothing has been stored
    fn load(&self) -> Result<Option<SplitManifest>>;

    /// Store `manifest`, replacing any previous one
    fn save(&self, manifest: &SplitManifest) -> Result<()>;
}

/// Manifest kept in a text file
#[derive(Debug, Clone)]
pub struct FileManifestStore {
    path: PathBuf,
}

impl FileManifestStore {
    /// Store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Manifest file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ManifestStore for FileManifestStore {
    fn load(&self) -> Result<Option<SplitManifest>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)?;
        SplitManifest::parse(&text).map(Some)
    }

    fn save(&self, manifest: &SplitManifest) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, manifest.to_text())?;
        Ok(())
    }
}

/// Manifest kept in memory, for temporary splits and tests
#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    manifest: RefCell<Option<SplitManifest>>,
}

impl MemoryManifestStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `manifest`
    pub fn with_manifest(manifest: SplitManifest) -> Self {
        Self {
            manifest: RefCell::new(Some(manifest)),
        }
    }

    /// Copy of the stored manifest
    pub fn manifest(&self) -> Option<SplitManifest> {
        self.manifest.borrow().clone()
    }
}

impl ManifestStore for MemoryManifestStore {
    fn load(&self) -> Result<Option<SplitManifest>> {
        Ok(self.manifest())
    }

    fn save(&self, manifest: &SplitManifest) -> Result<()> {
        *self.manifest.borrow_mut() = Some(manifest.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn sample() -> SplitManifest {
        let mut manifest = SplitManifest::new();
        manifest.insert(SplitType::Test, "cat_002.jpg").unwrap();
        manifest.insert(SplitType::Train, "cat_001.jpg").unwrap();
        manifest.insert(SplitType::Train, "dog_004.jpg").unwrap();
        manifest.add_section(SplitType::Validation);
        manifest
    }

    #[test]
    fn sections_are_written_in_order() {
        assert_eq!(
            sample().to_text(),
            "#Train\ncat_001.jpg\ndog_004.jpg\n#Validation\n#Test\ncat_002.jpg\n"
        );
    }

    #[test]
    fn text_form_reads_back() {
        let manifest = sample();
        let parsed = SplitManifest::parse(&manifest.to_text()).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.splits().collect::<Vec<_>>().len(), 3);
        assert!(parsed.ids(SplitType::Validation).is_empty());
    }

    #[test]
    fn blank_lines_are_ignored() {
        let parsed = SplitManifest::parse("\n#Train\n\na.jpg\n\n#Test\nb.jpg\n").unwrap();
        assert_eq!(parsed.ids(SplitType::Train), ["a.jpg".to_string()]);
        assert_eq!(parsed.len(), 2);
    }

    #[test_case("a.jpg\n#Train\n" ; "identifier before section")]
    #[test_case("#Holdout\na.jpg\n" ; "unknown section")]
    fn malformed_text_is_rejected(text: &str) {
        assert!(matches!(
            SplitManifest::parse(text),
            Err(Error::InvalidManifest(_))
        ));
    }

    #[test_case("#1.jpg" ; "leading hash")]
    #[test_case("\\raw.jpg" ; "leading backslash")]
    #[test_case(" padded.jpg " ; "surrounding spaces")]
    #[test_case("a#b.jpg" ; "inner hash")]
    fn unusual_identifiers_read_back(id: &str) {
        let mut manifest = SplitManifest::new();
        manifest.insert(SplitType::Train, "plain.jpg").unwrap();
        manifest.insert(SplitType::Train, id).unwrap();
        manifest.insert(SplitType::Test, id).unwrap();

        let parsed = SplitManifest::parse(&manifest.to_text()).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(parsed.ids(SplitType::Train)[1], id);
        assert_eq!(parsed.lookup()[id], SplitType::Test);
    }

    #[test]
    fn windows_line_endings_are_accepted() {
        let parsed = SplitManifest::parse("#Train\r\na.jpg\r\n#Test\r\nb.jpg\r\n").unwrap();
        assert_eq!(parsed.ids(SplitType::Train), ["a.jpg".to_string()]);
        assert_eq!(parsed.ids(SplitType::Test), ["b.jpg".to_string()]);
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[test_case("a\nb.jpg" ; "multi line")]
    fn unwritable_identifiers_are_rejected(id: &str) {
        let mut manifest = SplitManifest::new();
        assert!(matches!(
            manifest.insert(SplitType::Train, id),
            Err(Error::InvalidManifest(_))
        ));
        assert!(manifest.is_empty());
    }

    #[test]
    fn later_sections_win_lookup() {
        let mut manifest = SplitManifest::new();
        manifest.insert(SplitType::Train, "a.jpg").unwrap();
        manifest.insert(SplitType::Test, "a.jpg").unwrap();
        assert_eq!(manifest.lookup()["a.jpg"], SplitType::Test);
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileManifestStore::new(dir.path().join("splits").join("manifest.txt"));
        assert!(store.load().unwrap().is_none());

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryManifestStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&sample()).unwrap();
        assert_eq!(store.manifest(), Some(sample()));
    }
}
