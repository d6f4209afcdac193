use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_rank, canonical_system_styles};
use crate::error::CoreError;
use crate::ids::{StyleId, UserId};
use crate::style::{Style, Variant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub style: Style,
    /// Persisted variants only; the synthetic Default is added on read.
    pub variants: Vec<Variant>,
    pub has_variants: bool,
}

impl CatalogEntry {
    pub fn new(style: Style, variants: Vec<Variant>) -> Self {
        let has_variants = !variants.is_empty();
        Self {
            style,
            variants,
            has_variants,
        }
    }

    pub fn id(&self) -> &StyleId {
        &self.style.id
    }

    /// The Default variant followed by the persisted ones.
    pub fn variants_with_default(&self) -> Vec<Variant> {
        let mut all = Vec::with_capacity(self.variants.len() + 1);
        all.push(Variant::default_for(&self.style));
        all.extend(self.variants.iter().cloned());
        all
    }

    pub fn find_variant(&self, variant_id: &str) -> Option<Variant> {
        if variant_id == Variant::DEFAULT_ID {
            return Some(Variant::default_for(&self.style));
        }
        self.variants
            .iter()
            .find(|v| v.id.as_str() == variant_id)
            .cloned()
    }
}

/// Catalog ordering: canonical system styles first in their fixed order,
/// then any other system styles, then everything else. Outside the
/// canonical four, higher usage comes first and newer wins ties.
pub fn compare_entries(a: &CatalogEntry, b: &CatalogEntry) -> Ordering {
    fn tier(entry: &CatalogEntry) -> (u8, usize) {
        match (entry.style.is_system(), canonical_rank(entry.id())) {
            (true, Some(rank)) => (0, rank),
            (true, None) => (1, 0),
            (false, _) => (2, 0),
        }
    }
    tier(a).cmp(&tier(b)).then_with(|| {
        b.style
            .usage_count
            .cmp(&a.style.usage_count)
            .then_with(|| b.style.created_at.cmp(&a.style.created_at))
    })
}

/// Immutable snapshot of the styles one user sees. Every change produces a
/// new `Catalog`; holders of an old one keep seeing the old contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Arc<Vec<CatalogEntry>>,
}

impl Catalog {
    /// Takes entries as already ordered.
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Sorts with [`compare_entries`] before wrapping.
    pub fn ordered(mut entries: Vec<CatalogEntry>) -> Self {
        entries.sort_by(compare_entries);
        Self::new(entries)
    }

    /// The canonical system styles without variants.
    pub fn fallback() -> Self {
        Self::new(
            canonical_system_styles()
                .into_iter()
                .map(|style| CatalogEntry::new(style, Vec::new()))
                .collect(),
        )
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, style_id: &StyleId) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id() == style_id)
    }

    pub fn contains(&self, style_id: &StyleId) -> bool {
        self.find(style_id).is_some()
    }

    pub fn style_ids(&self) -> Vec<StyleId> {
        self.entries.iter().map(|e| e.id().clone()).collect()
    }

    pub fn system(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|e| e.style.is_system())
    }

    pub fn community(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(|e| e.style.is_community())
    }

    pub fn private_for<'a>(&'a self, user_id: &'a UserId) -> impl Iterator<Item = &'a CatalogEntry> {
        self.entries
            .iter()
            .filter(move |e| e.style.is_private_to(user_id))
    }

    /// New catalog with `entry` added (replacing any entry with the same id), re-ordered.
    pub fn with_entry(&self, entry: CatalogEntry) -> Self {
        let mut entries: Vec<CatalogEntry> = self
            .entries
            .iter()
            .filter(|e| e.id() != entry.id())
            .cloned()
            .collect();
        entries.push(entry);
        Self::ordered(entries)
    }

    pub fn without(&self, style_id: &StyleId) -> Self {
        Self::new(
            self.entries
                .iter()
                .filter(|e| e.id() != style_id)
                .cloned()
                .collect(),
        )
    }

    /// New catalog with `f` applied to the entry for `style_id`, re-ordered.
    pub fn map_entry(&self, style_id: &StyleId, f: impl FnOnce(&mut CatalogEntry)) -> Self {
        let mut entries = self.entries.as_ref().clone();
        if let Some(entry) = entries.iter_mut().find(|e| e.id() == style_id) {
            f(entry);
        }
        Self::ordered(entries)
    }

    /// BLAKE3 digest over the MessagePack encoding of every entry.
    pub fn digest(&self) -> Result<[u8; 32], CoreError> {
        let mut hasher = blake3::Hasher::new();
        for entry in self.entries.iter() {
            let bytes =
                rmp_serde::to_vec(entry).map_err(|e| CoreError::Serialization(e.to_string()))?;
            hasher.update(&bytes);
        }
        Ok(*hasher.finalize().as_bytes())
    }
}
