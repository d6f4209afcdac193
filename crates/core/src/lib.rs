pub mod canonical;
pub mod catalog;
pub mod error;
pub mod ids;
pub mod overlay;
pub mod selection;
pub mod style;

pub use catalog::{Catalog, CatalogEntry};
pub use error::CoreError;
pub use ids::*;
pub use overlay::{OverlayField, UserOverlay};
pub use selection::{ResolvedPrompt, Selection};
pub use style::{NewStyle, NewVariant, Style, StylePatch, Variant};
