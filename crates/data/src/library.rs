use crate::load::{load_json, LIBRARY_FILE};
use anyhow::{bail, Context};
use plib_core::{Collection, Item, ItemId, MemoryCollection, Predicate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// On-disk shape of `library.json`. `root` is relative to the library
/// directory unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryIndex {
    pub root: PathBuf,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl LibraryIndex {
    pub fn from_collection(root: &Path, collection: &dyn Collection) -> Self {
        Self {
            root: root.to_path_buf(),
            items: collection.query(&[]).into_iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Index entries dropped because their file is gone.
    pub removed: Vec<ItemId>,
    /// Files under the root that no index entry names.
    pub strays: Vec<PathBuf>,
    /// Strays moved to the staging directory.
    pub moved: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct Library {
    index_path: PathBuf,
    root: PathBuf,
    files: PathBuf,
    collection: MemoryCollection,
}

impl Library {
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let index_path = dir.join(LIBRARY_FILE);
        let index: LibraryIndex = load_json(&index_path)?;
        let files = dir.join(&index.root);
        let count = index.items.len();
        let collection = MemoryCollection::from_items(index.items)
            .with_context(|| format!("load {}", index_path.display()))?;
        info!(items = count, root = %files.display(), "library loaded");
        Ok(Self {
            index_path,
            root: index.root,
            files,
            collection,
        })
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// The root as written in the index.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory the item files live in.
    pub fn files_dir(&self) -> &Path {
        &self.files
    }

    pub fn collection(&self) -> &MemoryCollection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut MemoryCollection {
        &mut self.collection
    }

    pub fn into_collection(self) -> MemoryCollection {
        self.collection
    }

    pub fn save(&self) -> anyhow::Result<()> {
        save_library_index(&self.index_path, &self.root, &self.collection)
    }

    /// Drops entries whose file is missing and lists files the index does
    /// not know. With a staging directory the strays are moved there.
    pub fn reconcile(&mut self, staging: Option<&Path>) -> anyhow::Result<ReconcileReport> {
        let on_disk = self.scan_files()?;
        let known: BTreeSet<String> = self
            .collection
            .query(&[])
            .iter()
            .map(|item| item.filename())
            .collect();

        let mut report = ReconcileReport::default();
        let missing: Vec<ItemId> = self
            .collection
            .query(&[])
            .iter()
            .filter(|item| !on_disk.contains(&item.filename()))
            .map(|item| item.id)
            .collect();
        for id in missing {
            self.collection.delete(id)?;
            report.removed.push(id);
        }

        for name in on_disk.difference(&known) {
            let path = self.files.join(name);
            if let Some(staging) = staging {
                fs::create_dir_all(staging)
                    .with_context(|| format!("create {}", staging.display()))?;
                let target = staging.join(name);
                fs::rename(&path, &target).with_context(|| {
                    format!("move {} to {}", path.display(), target.display())
                })?;
                report.moved.push(target);
            }
            report.strays.push(path);
        }
        info!(
            removed = report.removed.len(),
            strays = report.strays.len(),
            moved = report.moved.len(),
            "library reconciled"
        );
        Ok(report)
    }

    /// Deletes every marked item: its file first, then its index entry.
    pub fn purge_marked(&mut self) -> anyhow::Result<Vec<ItemId>> {
        let marked: Vec<(ItemId, PathBuf)> = self
            .collection
            .query(&[Predicate::MarkedForDeletion])
            .iter()
            .map(|item| (item.id, item.path_in(&self.files)))
            .collect();
        let mut purged = Vec::with_capacity(marked.len());
        for (id, path) in marked {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    warn!(item = id, path = %path.display(), "marked file already gone");
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("remove {}", path.display()));
                }
            }
            self.collection.delete(id)?;
            purged.push(id);
        }
        info!(purged = purged.len(), "purged marked items");
        Ok(purged)
    }

    fn scan_files(&self) -> anyhow::Result<BTreeSet<String>> {
        if !self.files.is_dir() {
            bail!("library root {} is not a directory", self.files.display());
        }
        let mut names = BTreeSet::new();
        let entries =
            fs::read_dir(&self.files).with_context(|| format!("read {}", self.files.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("read {}", self.files.display()))?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || entry.path() == self.index_path {
                continue;
            }
            names.insert(name);
        }
        Ok(names)
    }
}

pub fn save_library_index(
    path: &Path,
    root: &Path,
    collection: &dyn Collection,
) -> anyhow::Result<()> {
    let index = LibraryIndex::from_collection(root, collection);
    let body = serde_json::to_string_pretty(&index).context("serialize library index")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
    info!(items = index.items.len(), path = %path.display(), "library index saved");
    Ok(())
}
