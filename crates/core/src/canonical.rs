//! Built-in system styles. Their order here is the catalog's fixed leading
//! order, and the same four records form the fallback catalog served when
//! the store cannot be read.

use chrono::{DateTime, Utc};

use crate::ids::{CreatedBy, StyleId};
use crate::style::Style;

pub const CANONICAL_SYSTEM_STYLES: [&str; 4] = ["professional", "casual", "academic", "creative"];

struct Seed {
    id: &'static str,
    display_name: &'static str,
    description: &'static str,
    prompt_template: &'static str,
}

const SEEDS: [Seed; 4] = [
    Seed {
        id: "professional",
        display_name: "Professional",
        description: "Clear, polished and businesslike.",
        prompt_template: "Rewrite the following text in a clear, professional tone suitable for work communication. Keep the meaning intact.\n\n{text}",
    },
    Seed {
        id: "casual",
        display_name: "Casual",
        description: "Relaxed and conversational.",
        prompt_template: "Rewrite the following text in a relaxed, friendly, conversational tone.\n\n{text}",
    },
    Seed {
        id: "academic",
        display_name: "Academic",
        description: "Formal, precise and well structured.",
        prompt_template: "Rewrite the following text in a formal academic register with precise wording and clear structure.\n\n{text}",
    },
    Seed {
        id: "creative",
        display_name: "Creative",
        description: "Vivid and imaginative.",
        prompt_template: "Rewrite the following text in a vivid, imaginative style while preserving its core message.\n\n{text}",
    },
];

/// Position of `style_id` in the canonical system order, if it has one.
pub fn canonical_rank(style_id: &StyleId) -> Option<usize> {
    CANONICAL_SYSTEM_STYLES
        .iter()
        .position(|id| *id == style_id.as_str())
}

pub fn canonical_system_styles() -> Vec<Style> {
    SEEDS
        .iter()
        .map(|seed| Style {
            id: StyleId::new(seed.id),
            name: seed.id.to_string(),
            display_name: seed.display_name.to_string(),
            description: seed.description.to_string(),
            prompt_template: seed.prompt_template.to_string(),
            is_public: true,
            created_by: CreatedBy::System,
            usage_count: 0,
            created_at: DateTime::<Utc>::default(),
        })
        .collect()
}
