use stylebook_core::{
    catalog::{Catalog, CatalogEntry},
    ids::{StyleId, UserId},
    overlay::UserOverlay,
    selection::Selection,
};

use crate::error::ValidationError;

/// Everything one engine instance holds locally for the signed-in user.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub user_id: Option<UserId>,
    /// Bumped on every login/logout. Work started under an older epoch is
    /// discarded when it completes.
    pub epoch: u64,
    /// Bumped on every catalog replacement.
    pub revision: u64,
    pub catalog: Catalog,
    pub overlay: Option<UserOverlay>,
    /// Last library read, used to resolve add-to-account targets.
    pub library: Vec<CatalogEntry>,
    pub selection: Option<Selection>,
    /// Mutations applied locally whose remote call has not settled.
    pub in_flight: usize,
    /// Mutations begun so far. Tells a settling mutation whether others
    /// started after it.
    pub mutations_started: u64,
}

impl SessionState {
    pub fn require_user(&self) -> Result<UserId, ValidationError> {
        self.user_id.clone().ok_or(ValidationError::NotAuthenticated)
    }

    /// Starts a new session epoch. The old catalog is dropped so nothing
    /// validates against the previous user's styles.
    pub fn begin_epoch(&mut self, user_id: Option<UserId>) -> u64 {
        self.epoch += 1;
        self.user_id = user_id;
        self.catalog = Catalog::default();
        self.overlay = None;
        self.library.clear();
        self.selection = None;
        self.in_flight = 0;
        self.epoch
    }

    pub fn replace_catalog(&mut self, catalog: Catalog) {
        self.catalog = catalog;
        self.revision += 1;
        self.revalidate_selection();
    }

    /// Keeps the selection if it still resolves, otherwise falls back to
    /// the first entry's Default variant.
    pub fn revalidate_selection(&mut self) {
        let still_valid = self
            .selection
            .as_ref()
            .is_some_and(|s| s.resolve(&self.catalog).is_some());
        if !still_valid {
            self.selection = Selection::first_in(&self.catalog);
        }
    }

    /// Catalog first, then the library cache.
    pub fn find_entry(&self, style_id: &StyleId) -> Option<CatalogEntry> {
        self.catalog
            .find(style_id)
            .or_else(|| self.library.iter().find(|e| e.id() == style_id))
            .cloned()
    }

    /// Known locally if visible in the catalog or recorded as added.
    pub fn knows(&self, style_id: &StyleId) -> bool {
        self.catalog.contains(style_id)
            || self
                .overlay
                .as_ref()
                .is_some_and(|o| o.is_added(style_id))
    }

    pub fn same_session(&self, user_id: &UserId, epoch: u64) -> bool {
        self.epoch == epoch && self.user_id.as_ref() == Some(user_id)
    }
}

#[cfg(test)]
mod tests {
    use stylebook_core::ids::VariantId;

    use super::*;

    #[test]
    fn anonymous_session_requires_sign_in() {
        let session = SessionState::default();
        assert_eq!(session.require_user(), Err(ValidationError::NotAuthenticated));
    }

    #[test]
    fn dangling_selection_falls_back_to_first_entry() {
        let mut session = SessionState::default();
        session.replace_catalog(Catalog::fallback());
        session.selection = Some(Selection::new(
            StyleId::new("casual"),
            Some(VariantId::new("gone")),
        ));

        session.replace_catalog(Catalog::fallback().without(&StyleId::new("professional")));
        let selection = session.selection.clone().unwrap();
        assert_eq!(selection.style_id.as_str(), "casual");
        assert!(selection.resolve(&session.catalog).is_some());
    }

    #[test]
    fn valid_selection_survives_replacement() {
        let mut session = SessionState::default();
        session.replace_catalog(Catalog::fallback());
        session.selection = Some(Selection::new(StyleId::new("creative"), None));
        session.replace_catalog(Catalog::fallback());
        assert_eq!(session.selection.unwrap().style_id.as_str(), "creative");
        assert_eq!(session.revision, 2);
    }

    #[test]
    fn new_epoch_clears_local_state() {
        let mut session = SessionState::default();
        session.replace_catalog(Catalog::fallback());
        session.in_flight = 2;
        let epoch = session.begin_epoch(Some(UserId::new("alice")));
        assert_eq!(epoch, 1);
        assert!(session.catalog.is_empty());
        assert_eq!(session.in_flight, 0);
        assert!(session.same_session(&UserId::new("alice"), 1));
        assert!(!session.same_session(&UserId::new("bob"), 1));
    }
}
