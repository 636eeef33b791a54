//! Classification datasets laid out as one directory per class

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use ml_stream_core::LazyRecord;

use crate::error::{Error, Result};
use crate::files::list_files;

/// Stream of records, one per file, for a directory of class folders
///
/// Each record holds `filename` (the full path), `class_id` and
/// `class_name`. Classes are visited in the order given; a class folder is
/// listed only when the stream reaches it, and its files come out sorted.
#[derive(Debug)]
pub struct ClassDirectorySource {
    root: PathBuf,
    extension: Option<String>,
    classes: VecDeque<(String, i64)>,
    current: Option<(String, i64, std::vec::IntoIter<PathBuf>)>,
}

impl ClassDirectorySource {
    /// Source over the folders of `root` named in `class_map`
    pub fn new<I, S>(root: impl AsRef<Path>, extension: Option<&str>, class_map: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::NotADirectory(root));
        }
        let classes: VecDeque<_> = class_map
            .into_iter()
            .map(|(name, id)| (name.into(), id))
            .collect();
        tracing::debug!(
            "Reading {} classes from {}",
            classes.len(),
            root.display()
        );
        Ok(Self {
            root,
            extension: extension.map(str::to_string),
            classes,
            current: None,
        })
    }

    /// Data directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Iterator for ClassDirectorySource {
    type Item = ml_stream_core::Result<LazyRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((name, id, files)) = &mut self.current {
                if let Some(path) = files.next() {
                    let record = LazyRecord::new()
                        .with("filename", path.to_string_lossy().into_owned())
                        .with("class_id", *id)
                        .with("class_name", name.as_str());
                    return Some(Ok(record));
                }
            }

            let (name, id) = self.classes.pop_front()?;
            match list_files(self.root.join(&name), self.extension.as_deref()) {
                Ok(files) => {
                    tracing::debug!("Class {} ({}): {} files", name, id, files.len());
                    self.current = Some((name, id, files.into_iter()));
                }
                Err(err) => {
                    self.current = None;
                    return Some(Err(err.into()));
                }
            }
        }
    }
}
