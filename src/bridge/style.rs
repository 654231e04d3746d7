//! Feature style categories.
//!
//! Precedence, highest first: hovered (and not selected), deleted, draft,
//! edited, plain. Every category except hover has a selected variant. A
//! feature that is neither visible, selected nor hovered is not drawn.

use std::collections::HashSet;

use crate::identity::FeatureId;
use crate::store::EditState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleCategory {
    Hover,
    Deleted,
    Draft,
    Edited,
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StyleKey {
    pub category: StyleCategory,
    pub selected: bool,
}

impl StyleKey {
    /// Name of the style entry, e.g. `draftSelected`.
    pub fn name(&self) -> &'static str {
        match (self.category, self.selected) {
            (StyleCategory::Hover, _) => "hover",
            (StyleCategory::Deleted, false) => "deleted",
            (StyleCategory::Deleted, true) => "deletedSelected",
            (StyleCategory::Draft, false) => "draft",
            (StyleCategory::Draft, true) => "draftSelected",
            (StyleCategory::Edited, false) => "edited",
            (StyleCategory::Edited, true) => "editedSelected",
            (StyleCategory::Plain, false) => "plain",
            (StyleCategory::Plain, true) => "plainSelected",
        }
    }
}

/// View state the style depends on besides the store.
#[derive(Debug, Clone, Copy)]
pub struct StyleContext<'a> {
    pub visible: &'a HashSet<FeatureId>,
    pub selected: &'a HashSet<FeatureId>,
    pub hovered: Option<&'a FeatureId>,
}

pub fn resolve_style(id: &FeatureId, state: &EditState, ctx: StyleContext<'_>) -> Option<StyleKey> {
    let selected = ctx.selected.contains(id);
    let hovered = ctx.hovered == Some(id);
    if !ctx.visible.contains(id) && !selected && !hovered {
        return None;
    }
    if hovered && !selected {
        return Some(StyleKey {
            category: StyleCategory::Hover,
            selected: false,
        });
    }
    let category = if state.is_deleted(id) {
        StyleCategory::Deleted
    } else if id.is_draft() {
        StyleCategory::Draft
    } else if state.is_edited(id) {
        StyleCategory::Edited
    } else {
        StyleCategory::Plain
    };
    Some(StyleKey { category, selected })
}
