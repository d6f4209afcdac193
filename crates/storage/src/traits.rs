use async_trait::async_trait;

use stylebook_core::{
    ids::{CreatedBy, StyleId, UserId},
    overlay::{OverlayField, UserOverlay},
    style::{NewStyle, NewVariant, Style, StylePatch, Variant},
};

use crate::error::StorageError;

/// Equality filters for a styles query. `None` means "don't filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleFilter {
    pub is_public: Option<bool>,
    pub created_by: Option<CreatedBy>,
    pub ids: Option<Vec<StyleId>>,
}

impl StyleFilter {
    pub fn system() -> Self {
        Self {
            is_public: Some(true),
            created_by: Some(CreatedBy::System),
            ids: None,
        }
    }

    pub fn public() -> Self {
        Self {
            is_public: Some(true),
            ..Default::default()
        }
    }

    pub fn public_in(ids: Vec<StyleId>) -> Self {
        Self {
            is_public: Some(true),
            created_by: None,
            ids: Some(ids),
        }
    }

    pub fn private_of(user_id: &UserId) -> Self {
        Self {
            is_public: Some(false),
            created_by: Some(CreatedBy::from(user_id)),
            ids: None,
        }
    }

    pub fn matches(&self, style: &Style) -> bool {
        self.is_public.is_none_or(|p| style.is_public == p)
            && self
                .created_by
                .as_ref()
                .is_none_or(|c| &style.created_by == c)
            && self.ids.as_ref().is_none_or(|ids| ids.contains(&style.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayOp {
    Union,
    Remove,
}

/// A batch of set-union / set-difference edits against a user document,
/// applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayUpdate {
    pub edits: Vec<(OverlayField, ArrayOp, StyleId)>,
}

impl OverlayUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn union(mut self, field: OverlayField, style_id: StyleId) -> Self {
        self.edits.push((field, ArrayOp::Union, style_id));
        self
    }

    pub fn remove(mut self, field: OverlayField, style_id: StyleId) -> Self {
        self.edits.push((field, ArrayOp::Remove, style_id));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn apply_to(&self, overlay: &mut UserOverlay) {
        for (field, op, style_id) in &self.edits {
            match op {
                ArrayOp::Union => {
                    overlay.insert(*field, style_id.clone());
                }
                ArrayOp::Remove => {
                    overlay.remove(*field, style_id);
                }
            }
        }
    }
}

/// The remote document store holding styles, their variant sub-collections
/// and per-user overlay documents. Reads may lag writes.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn query_styles(&self, filter: &StyleFilter) -> Result<Vec<Style>, StorageError>;

    async fn get_style(&self, style_id: &StyleId) -> Result<Option<Style>, StorageError>;

    /// Variants of every listed style in one read.
    async fn get_variants(&self, style_ids: &[StyleId]) -> Result<Vec<Variant>, StorageError>;

    /// Creates a private style; the store assigns id and creation time.
    async fn create_style(
        &self,
        draft: &NewStyle,
        created_by: &CreatedBy,
    ) -> Result<Style, StorageError>;

    async fn update_style(&self, style_id: &StyleId, patch: &StylePatch) -> Result<(), StorageError>;

    /// Deletes the style together with its variants.
    async fn delete_style(&self, style_id: &StyleId) -> Result<(), StorageError>;

    async fn create_variant(
        &self,
        style_id: &StyleId,
        draft: &NewVariant,
        created_by: &CreatedBy,
    ) -> Result<Variant, StorageError>;

    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserOverlay>, StorageError>;

    /// Creates the user document if it does not exist yet.
    async fn update_overlay(
        &self,
        user_id: &UserId,
        update: &OverlayUpdate,
    ) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn style(id: &str, is_public: bool, created_by: CreatedBy) -> Style {
        Style {
            id: StyleId::new(id),
            name: id.into(),
            display_name: id.into(),
            description: String::new(),
            prompt_template: "t".into(),
            is_public,
            created_by,
            usage_count: 0,
            created_at: DateTime::<Utc>::default(),
        }
    }

    #[test]
    fn filters_match_on_every_set_field() {
        let alice = UserId::new("alice");
        let system = style("casual", true, CreatedBy::System);
        let private = style("mine", false, CreatedBy::from(&alice));
        let community = style("poem", true, CreatedBy::User(UserId::new("bob")));

        assert!(StyleFilter::system().matches(&system));
        assert!(!StyleFilter::system().matches(&community));
        assert!(StyleFilter::private_of(&alice).matches(&private));
        assert!(!StyleFilter::private_of(&alice).matches(&community));
        assert!(StyleFilter::public_in(vec![StyleId::new("poem")]).matches(&community));
        assert!(!StyleFilter::public_in(vec![StyleId::new("poem")]).matches(&system));
        assert!(StyleFilter::default().matches(&private));
    }

    #[test]
    fn overlay_update_applies_in_order() {
        let mut overlay = UserOverlay::new(UserId::new("alice"));
        OverlayUpdate::new()
            .union(OverlayField::Added, StyleId::new("poem"))
            .remove(OverlayField::Hidden, StyleId::new("poem"))
            .union(OverlayField::Added, StyleId::new("poem"))
            .apply_to(&mut overlay);
        assert_eq!(overlay.added_styles.len(), 1);
        assert!(overlay.hidden_styles.is_empty());
    }
}
