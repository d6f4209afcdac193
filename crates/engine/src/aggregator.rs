use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use stylebook_core::{
    catalog::{Catalog, CatalogEntry},
    ids::{StyleId, UserId},
    overlay::UserOverlay,
    style::{Style, Variant},
};
use stylebook_storage::{CatalogStore, StorageError, StyleFilter};

use crate::overlay::OverlayRepository;

/// A built catalog together with the overlay it was built from.
/// `overlay` is `None` for anonymous sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogView {
    pub catalog: Catalog,
    pub overlay: Option<UserOverlay>,
}

impl CatalogView {
    /// The fixed degraded view served when the store cannot be read.
    pub fn fallback(user_id: Option<&UserId>) -> Self {
        Self {
            catalog: Catalog::fallback(),
            overlay: user_id.map(|u| UserOverlay::new(u.clone())),
        }
    }
}

/// Merges system styles, the user's added community styles and their
/// private styles into one ordered, duplicate-free catalog.
#[derive(Clone)]
pub struct CatalogAggregator {
    store: Arc<dyn CatalogStore>,
    overlays: OverlayRepository,
    batch_size: usize,
}

impl CatalogAggregator {
    pub fn new(store: Arc<dyn CatalogStore>, batch_size: usize) -> Self {
        Self {
            overlays: OverlayRepository::new(Arc::clone(&store)),
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Never fails: any read error yields [`Catalog::fallback`].
    pub async fn build_catalog(&self, user_id: Option<&UserId>) -> Catalog {
        self.build_view(user_id).await.catalog
    }

    pub async fn build_view(&self, user_id: Option<&UserId>) -> CatalogView {
        match self.try_build_view(user_id).await {
            Ok(view) => view,
            Err(e) => {
                warn!(user = ?user_id, error = %e, "catalog read failed, serving fallback styles");
                CatalogView::fallback(user_id)
            }
        }
    }

    pub async fn try_build_view(&self, user_id: Option<&UserId>) -> Result<CatalogView, StorageError> {
        let Some(user_id) = user_id else {
            let system = self.store.query_styles(&StyleFilter::system()).await?;
            let entries = self.attach_variants(system).await?;
            return Ok(CatalogView {
                catalog: Catalog::ordered(entries),
                overlay: None,
            });
        };

        let overlay = self.overlays.get(user_id).await?;

        let system: Vec<Style> = self
            .store
            .query_styles(&StyleFilter::system())
            .await?
            .into_iter()
            .filter(|s| !overlay.is_hidden(&s.id))
            .collect();

        let mut added = Vec::new();
        for chunk in overlay.visible_additions().chunks(self.batch_size) {
            added.extend(
                self.store
                    .query_styles(&StyleFilter::public_in(chunk.to_vec()))
                    .await?
                    .into_iter()
                    .filter(|s| !overlay.is_hidden(&s.id)),
            );
        }

        let private = self
            .store
            .query_styles(&StyleFilter::private_of(user_id))
            .await?;

        debug!(
            user = %user_id,
            system = system.len(),
            added = added.len(),
            private = private.len(),
            "merging catalog sources"
        );

        let merged = dedupe_first_wins(system.into_iter().chain(added).chain(private));
        let entries = self.attach_variants(merged).await?;
        Ok(CatalogView {
            catalog: Catalog::ordered(entries),
            overlay: Some(overlay),
        })
    }

    /// Public community styles (not system), most used first, with variants.
    pub async fn library(&self) -> Result<Vec<CatalogEntry>, StorageError> {
        let community: Vec<Style> = self
            .store
            .query_styles(&StyleFilter::public())
            .await?
            .into_iter()
            .filter(|s| !s.is_system())
            .collect();
        let mut entries = self.attach_variants(community).await?;
        entries.sort_by(|a, b| {
            b.style
                .usage_count
                .cmp(&a.style.usage_count)
                .then_with(|| b.style.created_at.cmp(&a.style.created_at))
        });
        Ok(entries)
    }

    /// Variants for all styles, read in batches of at most `batch_size` ids.
    pub async fn attach_variants(&self, styles: Vec<Style>) -> Result<Vec<CatalogEntry>, StorageError> {
        let ids: Vec<StyleId> = styles.iter().map(|s| s.id.clone()).collect();
        let mut by_style: HashMap<StyleId, Vec<Variant>> = HashMap::new();
        for chunk in ids.chunks(self.batch_size) {
            for variant in self.store.get_variants(chunk).await? {
                by_style
                    .entry(variant.style_id.clone())
                    .or_default()
                    .push(variant);
            }
        }
        Ok(styles
            .into_iter()
            .map(|style| {
                let variants = by_style.remove(&style.id).unwrap_or_default();
                CatalogEntry::new(style, variants)
            })
            .collect())
    }
}

fn dedupe_first_wins(styles: impl Iterator<Item = Style>) -> Vec<Style> {
    let mut seen = HashSet::new();
    styles.filter(|s| seen.insert(s.id.clone())).collect()
}
