use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub type ItemId = u32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttrKind {
    Flag,
    Count,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttrDef {
    pub key: String,
    pub title: String,
    pub kind: AttrKind,
}

impl AttrDef {
    /// Bare config keys: `num_*` is a counter, anything else a flag.
    pub fn from_key(key: &str) -> Self {
        let kind = if key.starts_with("num_") {
            AttrKind::Count
        } else {
            AttrKind::Flag
        };
        Self {
            key: key.to_string(),
            title: title_case(key),
            kind,
        }
    }

    pub fn default_value(&self) -> AttrValue {
        match self.kind {
            AttrKind::Flag => AttrValue::Flag(false),
            AttrKind::Count => AttrValue::Count(0),
        }
    }
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AttrValue {
    Flag(bool),
    Count(i64),
}

impl AttrValue {
    pub fn as_i64(self) -> i64 {
        match self {
            AttrValue::Flag(value) => i64::from(value),
            AttrValue::Count(value) => value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub extension: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
    #[serde(default)]
    pub marked_for_deletion: bool,
}

impl Item {
    pub fn new(id: ItemId, extension: impl Into<String>) -> Self {
        Self {
            id,
            extension: extension.into(),
            attrs: BTreeMap::new(),
            marked_for_deletion: false,
        }
    }

    pub fn with_attr(mut self, key: &str, value: AttrValue) -> Self {
        self.attrs.insert(key.to_string(), value);
        self
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.attrs.get(key), Some(AttrValue::Flag(true)))
    }

    /// Missing attributes read as their zero value.
    pub fn count(&self, key: &str) -> i64 {
        self.attrs.get(key).map(|value| value.as_i64()).unwrap_or(0)
    }

    pub fn filename(&self) -> String {
        format!("{:0>8}.{}", self.id, self.extension)
    }

    pub fn path_in(&self, root: &Path) -> PathBuf {
        root.join(self.filename())
    }

    /// Parses the id back out of a library file name.
    pub fn id_from_filename(name: &str) -> Option<ItemId> {
        let (stem, _) = name.rsplit_once('.')?;
        stem.parse().ok()
    }

    pub fn summary(&self, defs: &[AttrDef]) -> String {
        let mut parts = Vec::new();
        for def in defs {
            match def.kind {
                AttrKind::Flag if self.flag(&def.key) => parts.push(def.title.clone()),
                AttrKind::Flag => {}
                AttrKind::Count => {
                    let value = self.count(&def.key);
                    if value != 0 {
                        parts.push(format!("{} {}", def.title, value));
                    }
                }
            }
        }
        if self.marked_for_deletion {
            parts.push("marked for deletion".to_string());
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_zero_padded() {
        let item = Item::new(42, "jpg");
        assert_eq!(item.filename(), "00000042.jpg");
        assert_eq!(Item::id_from_filename("00000042.jpg"), Some(42));
        assert_eq!(Item::id_from_filename("notes.txt"), None);
    }

    #[test]
    fn bare_keys_pick_kind_and_title() {
        let count = AttrDef::from_key("num_views");
        assert_eq!(count.kind, AttrKind::Count);
        assert_eq!(count.title, "Num Views");
        let flag = AttrDef::from_key("favorite");
        assert_eq!(flag.kind, AttrKind::Flag);
        assert_eq!(flag.title, "Favorite");
    }

    #[test]
    fn summary_lists_set_attributes() {
        let defs = vec![AttrDef::from_key("favorite"), AttrDef::from_key("num_views")];
        let item = Item::new(1, "png")
            .with_attr("favorite", AttrValue::Flag(true))
            .with_attr("num_views", AttrValue::Count(3));
        assert_eq!(item.summary(&defs), "Favorite, Num Views 3");
    }
}
