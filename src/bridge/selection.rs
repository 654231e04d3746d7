//! Table and form selections.
//!
//! The two views keep separate selected-id lists. Switching views seeds the
//! target list from the source one when the source has a selection, but the
//! lists are never forced to match.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::bus::SelectMode;
use crate::identity::FeatureId;
use crate::types::Properties;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Table,
    Form,
}

/// A candidate offered by the feature picker.
#[derive(Debug, Clone, PartialEq)]
pub struct PickCandidate {
    pub id: FeatureId,
    pub label: String,
}

/// Result of a map click.
#[derive(Debug, Clone, PartialEq)]
pub enum PickResult {
    Nothing,
    /// Exactly one feature under the cursor; it is now selected.
    Selected(FeatureId),
    /// Several features; the user must choose with `choose_picked`.
    Choose(Vec<PickCandidate>),
}

/// On-screen edit buffer of the focused form row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormBuffer {
    pub id: Option<FeatureId>,
    pub values: Properties,
}

impl FormBuffer {
    pub fn load(&mut self, id: Option<FeatureId>, values: Properties) {
        self.id = id;
        self.values = values;
    }

    /// Overwrite buffered fields from an undo snapshot if it is for the
    /// buffered row.
    pub fn restore(&mut self, id: &FeatureId, snapshot: &Properties) -> bool {
        if self.id.as_ref() != Some(id) {
            return false;
        }
        for (k, v) in snapshot {
            self.values.insert(k.clone(), v.clone());
        }
        true
    }
}

fn apply(list: &mut Vec<FeatureId>, ids: &[FeatureId], mode: SelectMode) {
    match mode {
        SelectMode::Replace => {
            list.clear();
            for id in ids {
                if !list.contains(id) {
                    list.push(id.clone());
                }
            }
        }
        SelectMode::Add => {
            for id in ids {
                if !list.contains(id) {
                    list.push(id.clone());
                }
            }
        }
        SelectMode::Toggle => {
            for id in ids {
                match list.iter().position(|x| x == id) {
                    Some(i) => {
                        list.remove(i);
                    }
                    None => list.push(id.clone()),
                }
            }
        }
        SelectMode::Clear => list.clear(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    mode: ViewMode,
    table: Vec<FeatureId>,
    form: Vec<FeatureId>,
    focused: Option<FeatureId>,
    hovered: Option<FeatureId>,
    picker: Vec<PickCandidate>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn table_ids(&self) -> &[FeatureId] {
        &self.table
    }

    pub fn form_ids(&self) -> &[FeatureId] {
        &self.form
    }

    /// Selection of the active view.
    pub fn current(&self) -> &[FeatureId] {
        match self.mode {
            ViewMode::Table => &self.table,
            ViewMode::Form => &self.form,
        }
    }

    pub fn current_set(&self) -> HashSet<FeatureId> {
        self.current().iter().cloned().collect()
    }

    pub fn focused(&self) -> Option<&FeatureId> {
        self.focused.as_ref()
    }

    pub fn hovered(&self) -> Option<&FeatureId> {
        self.hovered.as_ref()
    }

    pub fn set_hovered(&mut self, id: Option<FeatureId>) -> bool {
        if self.hovered == id {
            return false;
        }
        self.hovered = id;
        true
    }

    /// Apply a selection change to the active view.
    pub fn select(&mut self, ids: &[FeatureId], mode: SelectMode) {
        match self.mode {
            ViewMode::Table => apply(&mut self.table, ids, mode),
            ViewMode::Form => {
                apply(&mut self.form, ids, mode);
                self.refocus();
            }
        }
    }

    pub fn focus(&mut self, id: Option<FeatureId>) {
        self.focused = id;
    }

    fn refocus(&mut self) {
        let keep = self
            .focused
            .as_ref()
            .is_some_and(|f| self.form.contains(f));
        if !keep {
            self.focused = self.form.first().cloned();
        }
    }

    pub fn enter_form_mode(&mut self) {
        if self.mode == ViewMode::Form {
            return;
        }
        if !self.table.is_empty() {
            self.form = self.table.clone();
        }
        self.mode = ViewMode::Form;
        self.refocus();
    }

    pub fn enter_table_mode(&mut self) {
        if self.mode == ViewMode::Table {
            return;
        }
        if !self.form.is_empty() {
            self.table = self.form.clone();
        }
        self.mode = ViewMode::Table;
    }

    /// Drop ids that no longer exist from both views.
    pub fn retain(&mut self, exists: impl Fn(&FeatureId) -> bool) {
        self.table.retain(|id| exists(id));
        self.form.retain(|id| exists(id));
        if self.focused.as_ref().is_some_and(|f| !exists(f)) {
            self.focused = None;
        }
        if self.hovered.as_ref().is_some_and(|h| !exists(h)) {
            self.hovered = None;
        }
        if self.mode == ViewMode::Form {
            self.refocus();
        }
    }

    pub fn set_picker(&mut self, candidates: Vec<PickCandidate>) {
        self.picker = candidates;
    }

    pub fn picker(&self) -> &[PickCandidate] {
        &self.picker
    }

    /// Resolve a picker choice. Replaces the active selection with exactly
    /// `id` and closes the picker; `false` if `id` was not offered.
    pub fn choose_picked(&mut self, id: &FeatureId) -> bool {
        if !self.picker.iter().any(|c| &c.id == id) {
            return false;
        }
        self.picker.clear();
        self.select(std::slice::from_ref(id), SelectMode::Replace);
        true
    }
}
