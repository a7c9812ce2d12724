//! Library configuration as read from disk, and its resolution into typed
//! pickers, predicates and game setups.

use crate::{
    AttrDef, AttrKind, BestOfError, BestOfRules, BestOfSetup, Collection, PermissionRules,
    PermissionSetup, Picker, PickerError, Predicate, PredicateError, Scoreboard, Status,
    UnionPicker, ValueExpr, ALL_PICKER_NAME,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate attribute `{0}`")]
    DuplicateAttr(String),
    #[error("duplicate picker `{0}`")]
    DuplicatePicker(String),
    #[error("unknown picker `{0}`")]
    UnknownPicker(String),
    #[error("picker `{0}` has both filters and a union")]
    AmbiguousPicker(String),
    #[error("union picker `{0}` has no children")]
    DegenerateUnion(String),
    #[error("picker `{picker}`: {source}")]
    Filter {
        picker: String,
        #[source]
        source: PredicateError,
    },
    #[error("{context}: {source}")]
    Expr {
        context: &'static str,
        #[source]
        source: PredicateError,
    },
    #[error("invalid union weight: {0}")]
    Weight(#[from] PickerError),
    #[error("permission bound {0} must lie strictly between 0 and 1")]
    Bound(f64),
    #[error("permission game needs at least one draw for your side")]
    NoDraws,
    #[error("best-of rules: {0}")]
    BestOf(#[from] BestOfError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttrTypeName {
    Int,
    Bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttrSpec {
    Key(String),
    Full {
        key: String,
        title: String,
        #[serde(rename = "type")]
        kind: AttrTypeName,
    },
}

impl AttrSpec {
    pub fn to_def(&self) -> AttrDef {
        match self {
            AttrSpec::Key(key) => AttrDef::from_key(key),
            AttrSpec::Full { key, title, kind } => AttrDef {
                key: key.clone(),
                title: title.clone(),
                kind: match kind {
                    AttrTypeName::Int => AttrKind::Count,
                    AttrTypeName::Bool => AttrKind::Flag,
                },
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PickerBody {
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub union: Option<Vec<UnionEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnionEntry {
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub picker: Option<String>,
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PickerSpec {
    pub name: String,
    #[serde(flatten)]
    pub body: PickerBody,
}

/// Either the name of a configured picker or an inline definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PickerRef {
    Named(String),
    Inline(PickerBody),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionConfig {
    #[serde(flatten)]
    pub rules: PermissionRules,
    pub value: ValueExpr,
    pub our_picker: PickerRef,
    pub your_picker: PickerRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BestOfConfig {
    #[serde(flatten)]
    pub rules: BestOfRules,
    pub picker: PickerRef,
    pub trigger: String,
    pub value: ValueExpr,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GamesConfig {
    pub permission: PermissionConfig,
    pub bestof: BestOfConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowseConfig {
    #[serde(default = "default_auto_advance")]
    pub auto_advance_seconds: u64,
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            auto_advance_seconds: default_auto_advance(),
        }
    }
}

fn default_auto_advance() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryConfig {
    pub attributes: Vec<AttrSpec>,
    #[serde(default)]
    pub pickers: Vec<PickerSpec>,
    #[serde(default)]
    pub status: crate::StatusParams,
    pub games: GamesConfig,
    #[serde(default)]
    pub browse: BrowseConfig,
}

/// Configuration with every picker and expression checked and built.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub attributes: Vec<AttrDef>,
    pub pickers: Vec<Picker>,
    pub status: crate::StatusParams,
    pub permission: PermissionSetup,
    pub bestof: BestOfSetup,
    pub browse: BrowseConfig,
}

impl LibraryConfig {
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let mut attributes: Vec<AttrDef> = Vec::with_capacity(self.attributes.len());
        for spec in &self.attributes {
            let def = spec.to_def();
            if attributes.iter().any(|known| known.key == def.key) {
                return Err(ConfigError::DuplicateAttr(def.key));
            }
            attributes.push(def);
        }

        let mut pickers = vec![Picker::all_items()];
        let mut names: HashSet<String> = HashSet::from([ALL_PICKER_NAME.to_string()]);
        for spec in &self.pickers {
            if !names.insert(spec.name.clone()) {
                return Err(ConfigError::DuplicatePicker(spec.name.clone()));
            }
            let picker = build_picker(&spec.name, &spec.body, &attributes, &pickers)?;
            pickers.push(picker);
        }

        let permission = &self.games.permission;
        if !(permission.rules.bound > 0.0 && permission.rules.bound < 1.0) {
            return Err(ConfigError::Bound(permission.rules.bound));
        }
        if permission.rules.your_draws == 0 {
            return Err(ConfigError::NoDraws);
        }
        permission
            .value
            .validate(&attributes)
            .map_err(|source| ConfigError::Expr {
                context: "permission value",
                source,
            })?;
        let permission = PermissionSetup {
            rules: permission.rules.clone(),
            value: permission.value.clone(),
            ours: resolve_ref("our picker", &permission.our_picker, &attributes, &pickers)?,
            yours: resolve_ref("your picker", &permission.your_picker, &attributes, &pickers)?,
        };

        let bestof = &self.games.bestof;
        Scoreboard::new(bestof.rules.max_points.clone())?;
        let trigger =
            Predicate::parse(&bestof.trigger, &attributes).map_err(|source| ConfigError::Expr {
                context: "best-of trigger",
                source,
            })?;
        bestof
            .value
            .validate(&attributes)
            .map_err(|source| ConfigError::Expr {
                context: "best-of value",
                source,
            })?;
        let bestof = BestOfSetup {
            picker: resolve_ref("best-of picker", &bestof.picker, &attributes, &pickers)?,
            trigger,
            value: bestof.value.clone(),
            rules: bestof.rules.clone(),
        };

        Ok(ResolvedConfig {
            attributes,
            pickers,
            status: self.status.clone(),
            permission,
            bestof,
            browse: self.browse.clone(),
        })
    }
}

impl ResolvedConfig {
    pub fn picker(&self, name: &str) -> Option<&Picker> {
        self.pickers.iter().find(|picker| picker.name() == name)
    }

    /// The picker matching the ledger position, or every item when the
    /// configured name does not exist.
    pub fn mood_picker(&self, status: &Status) -> Picker {
        let name = status.mood_picker_name();
        match self.picker(name) {
            Some(picker) => picker.clone(),
            None => {
                warn!(picker = name, "mood picker not configured, using all items");
                Picker::all_items()
            }
        }
    }

    /// Attribute keys the collection's items use but the config does not
    /// declare.
    pub fn undeclared_attrs(&self, collection: &dyn Collection) -> Vec<String> {
        let mut unknown: Vec<String> = collection
            .query(&[])
            .iter()
            .flat_map(|item| item.attrs.keys())
            .filter(|key| !self.attributes.iter().any(|def| &def.key == *key))
            .cloned()
            .collect();
        unknown.sort();
        unknown.dedup();
        unknown
    }
}

fn build_picker(
    name: &str,
    body: &PickerBody,
    attrs: &[AttrDef],
    known: &[Picker],
) -> Result<Picker, ConfigError> {
    let Some(entries) = body.union.as_ref() else {
        return filtered(name, &body.filters, attrs);
    };
    if !body.filters.is_empty() {
        return Err(ConfigError::AmbiguousPicker(name.to_string()));
    }
    if entries.is_empty() {
        return Err(ConfigError::DegenerateUnion(name.to_string()));
    }
    let mut union = UnionPicker::new(name);
    for (idx, entry) in entries.iter().enumerate() {
        let child = match entry.picker.as_deref() {
            Some(child) => known
                .iter()
                .find(|picker| picker.name() == child)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownPicker(child.to_string()))?,
            None => filtered(&format!("{name}#{idx}"), &entry.filters, attrs)?,
        };
        union.add(child, entry.weight)?;
    }
    Ok(Picker::Union(union))
}

fn filtered(name: &str, filters: &[String], attrs: &[AttrDef]) -> Result<Picker, ConfigError> {
    let predicates = filters
        .iter()
        .map(|filter| Predicate::parse(filter, attrs))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ConfigError::Filter {
            picker: name.to_string(),
            source,
        })?;
    Ok(Picker::filtered(name, predicates))
}

fn resolve_ref(
    label: &str,
    reference: &PickerRef,
    attrs: &[AttrDef],
    known: &[Picker],
) -> Result<Picker, ConfigError> {
    match reference {
        PickerRef::Named(name) => known
            .iter()
            .find(|picker| picker.name() == name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownPicker(name.clone())),
        PickerRef::Inline(body) => build_picker(label, body, attrs, known),
    }
}
