use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::{StyleId, UserId};

/// One of the two id-set arrays on a user document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverlayField {
    Added,
    Hidden,
}

impl OverlayField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "addedStyles",
            Self::Hidden => "hiddenStyles",
        }
    }
}

/// Per-user adjustments to which shared styles appear. `hidden_styles` always
/// wins over `added_styles` for the same id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOverlay {
    pub user_id: UserId,
    pub added_styles: BTreeSet<StyleId>,
    pub hidden_styles: BTreeSet<StyleId>,
}

impl UserOverlay {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            added_styles: BTreeSet::new(),
            hidden_styles: BTreeSet::new(),
        }
    }

    pub fn set(&self, field: OverlayField) -> &BTreeSet<StyleId> {
        match field {
            OverlayField::Added => &self.added_styles,
            OverlayField::Hidden => &self.hidden_styles,
        }
    }

    fn set_mut(&mut self, field: OverlayField) -> &mut BTreeSet<StyleId> {
        match field {
            OverlayField::Added => &mut self.added_styles,
            OverlayField::Hidden => &mut self.hidden_styles,
        }
    }

    /// Returns true if the set changed.
    pub fn insert(&mut self, field: OverlayField, style_id: StyleId) -> bool {
        self.set_mut(field).insert(style_id)
    }

    /// Returns true if the set changed.
    pub fn remove(&mut self, field: OverlayField, style_id: &StyleId) -> bool {
        self.set_mut(field).remove(style_id)
    }

    pub fn is_hidden(&self, style_id: &StyleId) -> bool {
        self.hidden_styles.contains(style_id)
    }

    pub fn is_added(&self, style_id: &StyleId) -> bool {
        self.added_styles.contains(style_id)
    }

    /// Added ids that survive the hidden set.
    pub fn visible_additions(&self) -> Vec<StyleId> {
        self.added_styles
            .difference(&self.hidden_styles)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_takes_precedence_over_added() {
        let mut overlay = UserOverlay::new(UserId::new("alice"));
        overlay.insert(OverlayField::Added, StyleId::new("poem"));
        overlay.insert(OverlayField::Added, StyleId::new("memo"));
        overlay.insert(OverlayField::Hidden, StyleId::new("poem"));
        assert_eq!(overlay.visible_additions(), vec![StyleId::new("memo")]);
    }

    #[test]
    fn insert_and_remove_report_changes() {
        let mut overlay = UserOverlay::new(UserId::new("alice"));
        assert!(overlay.insert(OverlayField::Hidden, StyleId::new("casual")));
        assert!(!overlay.insert(OverlayField::Hidden, StyleId::new("casual")));
        assert!(overlay.remove(OverlayField::Hidden, &StyleId::new("casual")));
        assert!(!overlay.remove(OverlayField::Hidden, &StyleId::new("casual")));
    }
}
