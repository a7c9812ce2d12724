//! Random item pickers: a filtered view of the collection, or a weighted
//! mixture of other pickers.

use crate::{Collection, Item, ItemId, Predicate, RngState};
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

pub const ALL_PICKER_NAME: &str = "All";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PickerError {
    #[error("picker `{picker}` matched no items")]
    EmptySelection { picker: String },
    #[error("union picker `{0}` has no weighted children")]
    DegenerateUnion(String),
    #[error("weight for `{picker}` must be positive")]
    InvalidWeight { picker: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Picker {
    Filtered(FilteredPicker),
    Union(UnionPicker),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilteredPicker {
    pub name: String,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionPicker {
    pub name: String,
    children: Vec<(Picker, f64)>,
}

impl Picker {
    pub fn filtered(name: impl Into<String>, predicates: Vec<Predicate>) -> Self {
        Picker::Filtered(FilteredPicker {
            name: name.into(),
            predicates,
        })
    }

    /// Every item in the collection.
    pub fn all_items() -> Self {
        Self::filtered(ALL_PICKER_NAME, Vec::new())
    }

    pub fn name(&self) -> &str {
        match self {
            Picker::Filtered(picker) => &picker.name,
            Picker::Union(picker) => &picker.name,
        }
    }

    pub fn draw(&self, collection: &dyn Collection, rng: &mut RngState) -> Result<Item, PickerError> {
        match self {
            Picker::Filtered(picker) => picker.draw(collection, rng),
            Picker::Union(picker) => picker.draw(collection, rng),
        }
    }

    pub fn all<'a>(&self, collection: &'a dyn Collection) -> Vec<&'a Item> {
        match self {
            Picker::Filtered(picker) => collection.query(&picker.predicates),
            Picker::Union(picker) => {
                let mut seen = BTreeSet::<ItemId>::new();
                let mut out = Vec::new();
                for (child, _) in &picker.children {
                    for item in child.all(collection) {
                        if seen.insert(item.id) {
                            out.push(item);
                        }
                    }
                }
                out
            }
        }
    }
}

impl FilteredPicker {
    fn draw(&self, collection: &dyn Collection, rng: &mut RngState) -> Result<Item, PickerError> {
        let item = collection
            .draw_random(&self.predicates, rng)
            .ok_or_else(|| PickerError::EmptySelection {
                picker: self.name.clone(),
            })?;
        debug!(picker = %self.name, item = item.id, "drew item");
        Ok(item)
    }
}

impl UnionPicker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn add(&mut self, picker: Picker, weight: f64) -> Result<(), PickerError> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(PickerError::InvalidWeight {
                picker: picker.name().to_string(),
            });
        }
        self.children.push((picker, weight));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[(Picker, f64)] {
        &self.children
    }

    pub fn total_weight(&self) -> f64 {
        self.children.iter().map(|(_, weight)| *weight).sum()
    }

    /// Index of the child a roll in `[0, total)` lands on. A remainder of
    /// exactly zero selects the child just subtracted.
    pub fn select_index(&self, roll: f64) -> Option<usize> {
        if self.children.is_empty() {
            return None;
        }
        let mut remaining = roll;
        for (idx, (_, weight)) in self.children.iter().enumerate() {
            remaining -= weight;
            if remaining <= 0.0 {
                return Some(idx);
            }
        }
        Some(self.children.len() - 1)
    }

    fn draw(&self, collection: &dyn Collection, rng: &mut RngState) -> Result<Item, PickerError> {
        let total = self.total_weight();
        if self.children.is_empty() || total <= 0.0 {
            return Err(PickerError::DegenerateUnion(self.name.clone()));
        }
        let roll = rng.next_f64() * total;
        let idx = self
            .select_index(roll)
            .ok_or_else(|| PickerError::DegenerateUnion(self.name.clone()))?;
        let (child, _) = &self.children[idx];
        debug!(union = %self.name, child = %child.name(), roll, "union selected child");
        child.draw(collection, rng)
    }
}

/// Builds the picker for a user's selection of (picker, weight) pairs.
/// Entries with a zero weight count as unselected; with nothing selected
/// the all-items picker is returned.
pub fn select_pickers(name: &str, choices: &[(Picker, f64)]) -> Picker {
    let mut union = UnionPicker::new(name);
    for (picker, weight) in choices.iter().filter(|(_, weight)| *weight > 0.0) {
        if let Err(err) = union.add(picker.clone(), *weight) {
            warn!(%err, "skipping picker selection");
        }
    }
    if union.children.is_empty() {
        return Picker::all_items();
    }
    Picker::Union(union)
}
