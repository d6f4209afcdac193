use stylebook_core::{
    catalog::Catalog,
    overlay::UserOverlay,
    selection::Selection,
};

use crate::session::SessionState;

/// Which local lists a mutation may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotScope {
    pub catalog: bool,
    pub overlay: bool,
}

impl SnapshotScope {
    pub const CATALOG: Self = Self {
        catalog: true,
        overlay: false,
    };

    pub const CATALOG_AND_OVERLAY: Self = Self {
        catalog: true,
        overlay: true,
    };
}

/// The selection is captured with the catalog because every catalog
/// replacement may move it.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub catalog: Catalog,
    pub selection: Option<Selection>,
}

/// Pre-mutation copy of every list in scope. Restoring puts them back
/// verbatim, whatever happened in between.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub catalog_state: Option<CatalogSnapshot>,
    pub overlay_state: Option<Option<UserOverlay>>,
}

impl SessionSnapshot {
    pub fn capture(session: &SessionState, scope: SnapshotScope) -> Self {
        Self {
            catalog_state: scope.catalog.then(|| CatalogSnapshot {
                catalog: session.catalog.clone(),
                selection: session.selection.clone(),
            }),
            overlay_state: scope.overlay.then(|| session.overlay.clone()),
        }
    }

    /// Returns true if the catalog was put back, so listeners need telling.
    pub fn restore(self, session: &mut SessionState) -> bool {
        if let Some(overlay) = self.overlay_state {
            session.overlay = overlay;
        }
        match self.catalog_state {
            Some(CatalogSnapshot { catalog, selection }) => {
                session.catalog = catalog;
                session.selection = selection;
                session.revision += 1;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use stylebook_core::ids::{StyleId, UserId};
    use stylebook_core::overlay::OverlayField;

    use super::*;

    fn signed_in() -> SessionState {
        let mut session = SessionState::default();
        session.begin_epoch(Some(UserId::new("alice")));
        session.overlay = Some(UserOverlay::new(UserId::new("alice")));
        session.replace_catalog(Catalog::fallback());
        session
    }

    #[test]
    fn restore_is_field_for_field() {
        let mut session = signed_in();
        let snapshot = SessionSnapshot::capture(&session, SnapshotScope::CATALOG_AND_OVERLAY);
        let (catalog, overlay, selection) = (
            session.catalog.clone(),
            session.overlay.clone(),
            session.selection.clone(),
        );

        let casual = StyleId::new("casual");
        session.replace_catalog(session.catalog.without(&casual));
        if let Some(overlay) = session.overlay.as_mut() {
            overlay.insert(OverlayField::Hidden, casual);
        }
        assert!(snapshot.clone().restore(&mut session));

        assert_eq!(session.catalog, catalog);
        assert_eq!(session.overlay, overlay);
        assert_eq!(session.selection, selection);
    }

    #[test]
    fn out_of_scope_lists_are_left_alone() {
        let mut session = signed_in();
        let snapshot = SessionSnapshot::capture(&session, SnapshotScope::CATALOG);
        if let Some(overlay) = session.overlay.as_mut() {
            overlay.insert(OverlayField::Added, StyleId::new("poem"));
        }
        snapshot.restore(&mut session);
        assert!(session.overlay.unwrap().is_added(&StyleId::new("poem")));
    }
}
