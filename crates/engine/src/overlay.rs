use std::sync::Arc;

use stylebook_core::{
    ids::{StyleId, UserId},
    overlay::{OverlayField, UserOverlay},
};
use stylebook_storage::{CatalogStore, OverlayUpdate, StorageError};

/// Reads and edits the `addedStyles` / `hiddenStyles` arrays on a user
/// document. Edits are set operations, so repeating one is harmless.
#[derive(Clone)]
pub struct OverlayRepository {
    store: Arc<dyn CatalogStore>,
}

impl OverlayRepository {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// A user without a document has empty sets.
    pub async fn get(&self, user_id: &UserId) -> Result<UserOverlay, StorageError> {
        Ok(self
            .store
            .get_user(user_id)
            .await?
            .unwrap_or_else(|| UserOverlay::new(user_id.clone())))
    }

    pub async fn add_to_overlay(
        &self,
        user_id: &UserId,
        field: OverlayField,
        style_id: &StyleId,
    ) -> Result<(), StorageError> {
        self.apply(user_id, &OverlayUpdate::new().union(field, style_id.clone()))
            .await
    }

    pub async fn remove_from_overlay(
        &self,
        user_id: &UserId,
        field: OverlayField,
        style_id: &StyleId,
    ) -> Result<(), StorageError> {
        self.apply(user_id, &OverlayUpdate::new().remove(field, style_id.clone()))
            .await
    }

    /// Applies several edits in one store write. Empty updates skip the store.
    pub async fn apply(&self, user_id: &UserId, update: &OverlayUpdate) -> Result<(), StorageError> {
        if update.is_empty() {
            return Ok(());
        }
        self.store.update_overlay(user_id, update).await
    }
}

#[cfg(test)]
mod tests {
    use stylebook_storage::SqliteCatalogStore;

    use super::*;

    fn repo() -> OverlayRepository {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        OverlayRepository::new(Arc::new(store))
    }

    #[tokio::test]
    async fn missing_document_reads_as_empty() {
        let overlay = repo().get(&UserId::new("nobody")).await.unwrap();
        assert!(overlay.added_styles.is_empty());
        assert!(overlay.hidden_styles.is_empty());
    }

    #[tokio::test]
    async fn removing_twice_matches_removing_once() {
        let repo = repo();
        let alice = UserId::new("alice");
        let poem = StyleId::new("poem");
        let memo = StyleId::new("memo");
        repo.add_to_overlay(&alice, OverlayField::Added, &poem).await.unwrap();
        repo.add_to_overlay(&alice, OverlayField::Added, &memo).await.unwrap();

        repo.remove_from_overlay(&alice, OverlayField::Added, &poem).await.unwrap();
        let once = repo.get(&alice).await.unwrap();
        repo.remove_from_overlay(&alice, OverlayField::Added, &poem).await.unwrap();
        let twice = repo.get(&alice).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.added_styles.len(), 1);
    }

    #[tokio::test]
    async fn hidden_and_added_are_independent_sets() {
        let repo = repo();
        let alice = UserId::new("alice");
        let poem = StyleId::new("poem");
        repo.add_to_overlay(&alice, OverlayField::Added, &poem).await.unwrap();
        repo.add_to_overlay(&alice, OverlayField::Hidden, &poem).await.unwrap();
        let overlay = repo.get(&alice).await.unwrap();
        assert!(overlay.is_added(&poem));
        assert!(overlay.is_hidden(&poem));
        assert!(overlay.visible_additions().is_empty());
    }
}
