use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogEntry};
use crate::ids::{StyleId, VariantId};
use crate::style::{Variant, render_template};

/// The style and variant the transformation pipeline should use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub style_id: StyleId,
    pub variant_id: VariantId,
}

impl Selection {
    pub fn new(style_id: StyleId, variant_id: Option<VariantId>) -> Self {
        Self {
            style_id,
            variant_id: variant_id.unwrap_or_else(|| VariantId::new(Variant::DEFAULT_ID)),
        }
    }

    pub fn default_of(entry: &CatalogEntry) -> Self {
        Self::new(entry.id().clone(), None)
    }

    /// First catalog entry with its Default variant.
    pub fn first_in(catalog: &Catalog) -> Option<Self> {
        catalog.entries().first().map(Self::default_of)
    }

    pub fn resolve(&self, catalog: &Catalog) -> Option<ResolvedPrompt> {
        let entry = catalog.find(&self.style_id)?;
        let variant = entry.find_variant(self.variant_id.as_str())?;
        Some(ResolvedPrompt {
            style_id: entry.style.id.clone(),
            variant_id: variant.id.clone(),
            label: if variant.is_default() {
                entry.style.display_name.clone()
            } else {
                format!("{} · {}", entry.style.display_name, variant.name)
            },
            prompt: variant.effective_prompt(&entry.style),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub style_id: StyleId,
    pub variant_id: VariantId,
    pub label: String,
    pub prompt: String,
}

impl ResolvedPrompt {
    pub fn render(&self, text: &str) -> String {
        render_template(&self.prompt, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_default_variant_of_system_style() {
        let catalog = Catalog::fallback();
        let selection = Selection::new(StyleId::new("casual"), None);
        let resolved = selection.resolve(&catalog).unwrap();
        assert_eq!(resolved.label, "Casual");
        assert!(resolved.render("hello there").ends_with("hello there"));
        assert!(!resolved.render("hello there").contains("{text}"));
    }

    #[test]
    fn unknown_variant_does_not_resolve() {
        let catalog = Catalog::fallback();
        let selection = Selection::new(StyleId::new("casual"), Some(VariantId::new("nope")));
        assert!(selection.resolve(&catalog).is_none());
    }

    #[test]
    fn first_in_picks_leading_entry() {
        let selection = Selection::first_in(&Catalog::fallback()).unwrap();
        assert_eq!(selection.style_id.as_str(), "professional");
        assert_eq!(selection.variant_id.as_str(), Variant::DEFAULT_ID);
    }
}
