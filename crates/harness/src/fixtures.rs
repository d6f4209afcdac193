use chrono::{DateTime, TimeZone, Utc};

use stylebook_core::{
    ids::{CreatedBy, StyleId, UserId, VariantId},
    style::{Style, Variant},
};
use stylebook_storage::{SqliteCatalogStore, StorageError};

pub const POEM: &str = "poem";
pub const POEM_AUTHOR: &str = "bob";

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or_else(DateTime::<Utc>::default)
}

pub fn community_style(id: &str, author: &str, usage_count: u64, created_secs: i64) -> Style {
    Style {
        id: StyleId::new(id),
        name: id.to_string(),
        display_name: capitalize(id),
        description: format!("Community style {id}"),
        prompt_template: format!("Rewrite the text as {id}:\n\n{{text}}"),
        is_public: true,
        created_by: CreatedBy::User(UserId::new(author)),
        usage_count,
        created_at: at(created_secs),
    }
}

pub fn private_style(id: &str, owner: &str, created_secs: i64) -> Style {
    Style {
        is_public: false,
        ..community_style(id, owner, 0, created_secs)
    }
}

pub fn variant(style: &Style, id: &str, name: &str) -> Variant {
    Variant {
        id: VariantId::new(id),
        style_id: style.id.clone(),
        name: name.to_string(),
        description: format!("{name} form"),
        prompt_override: None,
        created_by: style.created_by.clone(),
        is_public: style.is_public,
        usage_count: 0,
        created_at: style.created_at,
    }
}

/// The public "poem" style by bob, with haiku and sonnet variants.
pub fn seed_poem(store: &SqliteCatalogStore) -> Result<Style, StorageError> {
    let poem = community_style(POEM, POEM_AUTHOR, 42, 1_700_000_000);
    store.put_style(&poem)?;
    store.put_variant(&variant(&poem, "poem-haiku", "Haiku"))?;
    store.put_variant(&variant(&poem, "poem-sonnet", "Sonnet"))?;
    Ok(poem)
}

pub fn seed_style(store: &SqliteCatalogStore, style: Style) -> Result<Style, StorageError> {
    store.put_style(&style)?;
    Ok(style)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
