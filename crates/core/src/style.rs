use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{CreatedBy, StyleId, UserId, VariantId};

/// Placeholder a prompt template uses for the text being transformed.
pub const TEXT_PLACEHOLDER: &str = "{text}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub id: StyleId,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub prompt_template: String,
    pub is_public: bool,
    pub created_by: CreatedBy,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Style {
    /// System styles can be hidden but never edited or deleted.
    pub fn is_system(&self) -> bool {
        self.created_by.is_system()
    }

    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        self.created_by.is_user(user_id)
    }

    pub fn is_private_to(&self, user_id: &UserId) -> bool {
        !self.is_public && self.is_owned_by(user_id)
    }

    /// Public, user-authored style from the shared library.
    pub fn is_community(&self) -> bool {
        self.is_public && !self.is_system()
    }

    pub fn render(&self, text: &str) -> String {
        render_template(&self.prompt_template, text)
    }

    pub fn apply_patch(&mut self, patch: &StylePatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(display_name) = &patch.display_name {
            self.display_name = display_name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(prompt_template) = &patch.prompt_template {
            self.prompt_template = prompt_template.clone();
        }
    }
}

pub fn render_template(template: &str, text: &str) -> String {
    if template.contains(TEXT_PLACEHOLDER) {
        template.replace(TEXT_PLACEHOLDER, text)
    } else {
        format!("{template}\n\n{text}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub style_id: StyleId,
    pub name: String,
    pub description: String,
    /// Empty or absent means the prompt is derived from the owning style.
    pub prompt_override: Option<String>,
    pub created_by: CreatedBy,
    pub is_public: bool,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Variant {
    pub const DEFAULT_ID: &'static str = "default";
    pub const DEFAULT_NAME: &'static str = "Default";

    /// The synthetic variant standing for the style itself. Never persisted.
    pub fn default_for(style: &Style) -> Self {
        Self {
            id: VariantId::new(Self::DEFAULT_ID),
            style_id: style.id.clone(),
            name: Self::DEFAULT_NAME.to_string(),
            description: style.description.clone(),
            prompt_override: None,
            created_by: style.created_by.clone(),
            is_public: style.is_public,
            usage_count: style.usage_count,
            created_at: style.created_at,
        }
    }

    pub fn is_default(&self) -> bool {
        self.id.as_str() == Self::DEFAULT_ID
    }

    pub fn effective_prompt(&self, style: &Style) -> String {
        if self.is_default() {
            return style.prompt_template.clone();
        }
        match self.prompt_override.as_deref().map(str::trim) {
            Some(prompt) if !prompt.is_empty() => prompt.to_string(),
            _ => {
                let description = self.description.trim();
                if description.is_empty() {
                    format!("{}\n\nVariant: {}.", style.prompt_template, self.name)
                } else {
                    format!(
                        "{}\n\nVariant: {}. {}",
                        style.prompt_template, self.name, description
                    )
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVariant {
    pub name: String,
    pub description: String,
    pub prompt_override: Option<String>,
}

impl NewVariant {
    pub fn from_variant(variant: &Variant) -> Self {
        Self {
            name: variant.name.clone(),
            description: variant.description.clone(),
            prompt_override: variant.prompt_override.clone(),
        }
    }
}

/// Draft for a private style. Variants are created alongside it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStyle {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub prompt_template: String,
    pub variants: Vec<NewVariant>,
}

impl NewStyle {
    /// Trims fields, defaults the display name and rejects blank required fields.
    pub fn normalized(mut self) -> Result<Self, CoreError> {
        self.name = self.name.trim().to_string();
        self.display_name = self.display_name.trim().to_string();
        self.prompt_template = self.prompt_template.trim().to_string();
        if self.name.is_empty() {
            return Err(CoreError::InvalidData("style name must not be blank".into()));
        }
        if self.prompt_template.is_empty() {
            return Err(CoreError::InvalidData(
                "prompt template must not be blank".into(),
            ));
        }
        if self.display_name.is_empty() {
            self.display_name = self.name.clone();
        }
        for variant in &mut self.variants {
            variant.name = variant.name.trim().to_string();
            if variant.name.is_empty() {
                return Err(CoreError::InvalidData("variant name must not be blank".into()));
            }
            if variant.name.eq_ignore_ascii_case(Variant::DEFAULT_ID) {
                return Err(CoreError::InvalidData(format!(
                    "variant name '{}' is reserved",
                    variant.name
                )));
            }
        }
        Ok(self)
    }

    /// Draft for a private copy of `style`, carrying its persisted variants.
    pub fn copy_of(style: &Style, variants: &[Variant], suffix: &str) -> Self {
        Self {
            name: format!("{}{suffix}", style.name),
            display_name: format!("{}{suffix}", style.display_name),
            description: style.description.clone(),
            prompt_template: style.prompt_template.clone(),
            variants: variants
                .iter()
                .filter(|v| !v.is_default())
                .map(NewVariant::from_variant)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StylePatch {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub prompt_template: Option<String>,
}

impl StylePatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.display_name.is_none()
            && self.description.is_none()
            && self.prompt_template.is_none()
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.is_empty() {
            return Err(CoreError::InvalidData("patch changes nothing".into()));
        }
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(CoreError::InvalidData("style name must not be blank".into()));
        }
        if matches!(&self.prompt_template, Some(t) if t.trim().is_empty()) {
            return Err(CoreError::InvalidData(
                "prompt template must not be blank".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(template: &str) -> Style {
        Style {
            id: StyleId::new("s1"),
            name: "haiku".into(),
            display_name: "Haiku".into(),
            description: "Three short lines".into(),
            prompt_template: template.into(),
            is_public: false,
            created_by: CreatedBy::User(UserId::new("alice")),
            usage_count: 0,
            created_at: DateTime::<Utc>::default(),
        }
    }

    fn variant(prompt_override: Option<&str>, description: &str) -> Variant {
        Variant {
            id: VariantId::new("v1"),
            style_id: StyleId::new("s1"),
            name: "Seasonal".into(),
            description: description.into(),
            prompt_override: prompt_override.map(str::to_string),
            created_by: CreatedBy::User(UserId::new("alice")),
            is_public: false,
            usage_count: 0,
            created_at: DateTime::<Utc>::default(),
        }
    }

    #[test]
    fn override_wins_when_present() {
        let s = style("Rewrite as haiku: {text}");
        let v = variant(Some("Use a kigo."), "ignored");
        assert_eq!(v.effective_prompt(&s), "Use a kigo.");
    }

    #[test]
    fn blank_override_derives_from_style() {
        let s = style("Rewrite as haiku: {text}");
        let v = variant(Some("   "), "Mention a season");
        assert_eq!(
            v.effective_prompt(&s),
            "Rewrite as haiku: {text}\n\nVariant: Seasonal. Mention a season"
        );
    }

    #[test]
    fn default_variant_uses_template() {
        let s = style("Rewrite as haiku: {text}");
        let d = Variant::default_for(&s);
        assert!(d.is_default());
        assert_eq!(d.effective_prompt(&s), s.prompt_template);
    }

    #[test]
    fn render_substitutes_or_appends() {
        assert_eq!(render_template("Shout: {text}", "hi"), "Shout: hi");
        assert_eq!(render_template("Shout it", "hi"), "Shout it\n\nhi");
    }

    #[test]
    fn normalized_rejects_blank_and_reserved_names() {
        let blank = NewStyle {
            name: "  ".into(),
            prompt_template: "x".into(),
            ..Default::default()
        };
        assert!(blank.normalized().is_err());

        let reserved = NewStyle {
            name: "ok".into(),
            prompt_template: "x".into(),
            variants: vec![NewVariant {
                name: "Default".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(reserved.normalized().is_err());

        let fine = NewStyle {
            name: " ok ".into(),
            prompt_template: "x".into(),
            ..Default::default()
        }
        .normalized()
        .unwrap();
        assert_eq!(fine.name, "ok");
        assert_eq!(fine.display_name, "ok");
    }

    #[test]
    fn copy_skips_synthetic_default() {
        let s = style("t");
        let variants = vec![Variant::default_for(&s), variant(None, "d")];
        let draft = NewStyle::copy_of(&s, &variants, " (copy)");
        assert_eq!(draft.name, "haiku (copy)");
        assert_eq!(draft.variants.len(), 1);
        assert_eq!(draft.variants[0].name, "Seasonal");
    }
}
