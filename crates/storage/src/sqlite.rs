use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter, types::Value};

use stylebook_core::{
    canonical::canonical_system_styles,
    ids::{CreatedBy, StyleId, UserId, VariantId},
    overlay::{OverlayField, UserOverlay},
    style::{NewStyle, NewVariant, Style, StylePatch, Variant},
};

use crate::error::StorageError;
use crate::traits::{CatalogStore, OverlayUpdate, StyleFilter};

const STYLE_COLUMNS: &str =
    "id, name, display_name, description, prompt_template, is_public, created_by, usage_count, created_at";
const VARIANT_COLUMNS: &str =
    "id, style_id, name, description, prompt_override, created_by, is_public, usage_count, created_at";

/// Document store backed by a single SQLite connection. Overlay arrays are
/// stored as MessagePack blobs on the user row.
pub struct SqliteCatalogStore {
    conn: Mutex<Connection>,
}

impl SqliteCatalogStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("connection lock poisoned".into()))
    }

    /// Installs the canonical system styles. Existing rows are left alone.
    pub fn seed_system_styles(&self) -> Result<usize, StorageError> {
        let conn = self.conn()?;
        let mut inserted = 0;
        for style in canonical_system_styles() {
            inserted += insert_style_row(&conn, &style, true)?;
        }
        Ok(inserted)
    }

    /// Writes a fully specified style document, replacing any with the same id.
    pub fn put_style(&self, style: &Style) -> Result<(), StorageError> {
        let conn = self.conn()?;
        insert_style_row(&conn, style, false)?;
        Ok(())
    }

    /// Publishes a community style on behalf of `created_by`.
    pub fn publish_style(
        &self,
        draft: &NewStyle,
        created_by: &CreatedBy,
    ) -> Result<Style, StorageError> {
        let style = new_style_record(draft, created_by, true)?;
        let conn = self.conn()?;
        insert_style_row(&conn, &style, false)?;
        Ok(style)
    }

    pub fn put_variant(&self, variant: &Variant) -> Result<(), StorageError> {
        let conn = self.conn()?;
        insert_variant_row(&conn, variant)
    }

    pub fn style_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM styles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn variant_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM variants", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn now_millis() -> Result<DateTime<Utc>, StorageError> {
    from_millis(Utc::now().timestamp_millis())
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::Serialization(format!("invalid timestamp: {ms}")))
}

fn new_style_record(
    draft: &NewStyle,
    created_by: &CreatedBy,
    is_public: bool,
) -> Result<Style, StorageError> {
    Ok(Style {
        id: StyleId::generate(),
        name: draft.name.clone(),
        display_name: draft.display_name.clone(),
        description: draft.description.clone(),
        prompt_template: draft.prompt_template.clone(),
        is_public,
        created_by: created_by.clone(),
        usage_count: 0,
        created_at: now_millis()?,
    })
}

fn insert_style_row(conn: &Connection, style: &Style, keep_existing: bool) -> Result<usize, StorageError> {
    let verb = if keep_existing {
        "INSERT OR IGNORE"
    } else {
        "INSERT OR REPLACE"
    };
    let changed = conn.execute(
        &format!("{verb} INTO styles ({STYLE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            style.id.as_str(),
            style.name,
            style.display_name,
            style.description,
            style.prompt_template,
            style.is_public,
            style.created_by.as_str(),
            style.usage_count as i64,
            style.created_at.timestamp_millis(),
        ],
    )?;
    Ok(changed)
}

fn insert_variant_row(conn: &Connection, variant: &Variant) -> Result<(), StorageError> {
    let result = conn.execute(
        &format!("INSERT INTO variants ({VARIANT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            variant.id.as_str(),
            variant.style_id.as_str(),
            variant.name,
            variant.description,
            variant.prompt_override,
            variant.created_by.as_str(),
            variant.is_public,
            variant.usage_count as i64,
            variant.created_at.timestamp_millis(),
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(StorageError::NotFound(format!("style {}", variant.style_id)))
        }
        Err(e) => Err(StorageError::Sqlite(e)),
    }
}

type StyleRow = (String, String, String, String, String, bool, String, i64, i64);
type VariantRow = (String, String, String, String, Option<String>, String, bool, i64, i64);

fn read_style_row(row: &rusqlite::Row) -> rusqlite::Result<StyleRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn read_variant_row(row: &rusqlite::Row) -> rusqlite::Result<VariantRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn style_from_row(row: StyleRow) -> Result<Style, StorageError> {
    let (id, name, display_name, description, prompt_template, is_public, created_by, usage, created_at) =
        row;
    Ok(Style {
        id: StyleId::new(id),
        name,
        display_name,
        description,
        prompt_template,
        is_public,
        created_by: CreatedBy::parse(&created_by),
        usage_count: usage.max(0) as u64,
        created_at: from_millis(created_at)?,
    })
}

fn variant_from_row(row: VariantRow) -> Result<Variant, StorageError> {
    let (id, style_id, name, description, prompt_override, created_by, is_public, usage, created_at) =
        row;
    Ok(Variant {
        id: VariantId::new(id),
        style_id: StyleId::new(style_id),
        name,
        description,
        prompt_override,
        created_by: CreatedBy::parse(&created_by),
        is_public,
        usage_count: usage.max(0) as u64,
        created_at: from_millis(created_at)?,
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn encode_ids(ids: &BTreeSet<StyleId>) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec(ids).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_ids(bytes: &[u8]) -> Result<BTreeSet<StyleId>, StorageError> {
    rmp_serde::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn load_user(conn: &Connection, user_id: &UserId) -> Result<Option<UserOverlay>, StorageError> {
    let row: Option<(Vec<u8>, Vec<u8>)> = conn
        .query_row(
            "SELECT added_styles, hidden_styles FROM users WHERE user_id = ?1",
            params![user_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match row {
        None => Ok(None),
        Some((added, hidden)) => Ok(Some(UserOverlay {
            user_id: user_id.clone(),
            added_styles: decode_ids(&added)?,
            hidden_styles: decode_ids(&hidden)?,
        })),
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn query_styles(&self, filter: &StyleFilter) -> Result<Vec<Style>, StorageError> {
        let mut sql = format!("SELECT {STYLE_COLUMNS} FROM styles WHERE 1 = 1");
        let mut values: Vec<Value> = Vec::new();
        if let Some(is_public) = filter.is_public {
            sql.push_str(" AND is_public = ?");
            values.push(Value::Integer(is_public as i64));
        }
        if let Some(created_by) = &filter.created_by {
            sql.push_str(" AND created_by = ?");
            values.push(Value::Text(created_by.as_str().to_string()));
        }
        if let Some(ids) = &filter.ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            sql.push_str(&format!(" AND id IN ({})", placeholders(ids.len())));
            values.extend(ids.iter().map(|id| Value::Text(id.as_str().to_string())));
        }
        sql.push_str(" ORDER BY created_at, id");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), read_style_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(style_from_row).collect()
    }

    async fn get_style(&self, style_id: &StyleId) -> Result<Option<Style>, StorageError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {STYLE_COLUMNS} FROM styles WHERE id = ?1"),
                params![style_id.as_str()],
                read_style_row,
            )
            .optional()?;
        row.map(style_from_row).transpose()
    }

    async fn get_variants(&self, style_ids: &[StyleId]) -> Result<Vec<Variant>, StorageError> {
        if style_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {VARIANT_COLUMNS} FROM variants WHERE style_id IN ({}) ORDER BY created_at, id",
            placeholders(style_ids.len())
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params_from_iter(style_ids.iter().map(|id| id.as_str())),
                read_variant_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(variant_from_row).collect()
    }

    async fn create_style(
        &self,
        draft: &NewStyle,
        created_by: &CreatedBy,
    ) -> Result<Style, StorageError> {
        let style = new_style_record(draft, created_by, false)?;
        let conn = self.conn()?;
        insert_style_row(&conn, &style, true)?;
        Ok(style)
    }

    async fn update_style(&self, style_id: &StyleId, patch: &StylePatch) -> Result<(), StorageError> {
        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        let fields = [
            ("name", &patch.name),
            ("display_name", &patch.display_name),
            ("description", &patch.description),
            ("prompt_template", &patch.prompt_template),
        ];
        for (column, value) in fields {
            if let Some(value) = value {
                sets.push(format!("{column} = ?"));
                values.push(Value::Text(value.clone()));
            }
        }
        let conn = self.conn()?;
        if sets.is_empty() {
            let exists: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM styles WHERE id = ?1",
                    params![style_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            return match exists {
                Some(_) => Ok(()),
                None => Err(StorageError::NotFound(format!("style {style_id}"))),
            };
        }
        values.push(Value::Text(style_id.as_str().to_string()));
        let changed = conn.execute(
            &format!("UPDATE styles SET {} WHERE id = ?", sets.join(", ")),
            params_from_iter(values.iter()),
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("style {style_id}")));
        }
        Ok(())
    }

    async fn delete_style(&self, style_id: &StyleId) -> Result<(), StorageError> {
        let changed = self
            .conn()?
            .execute("DELETE FROM styles WHERE id = ?1", params![style_id.as_str()])?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("style {style_id}")));
        }
        Ok(())
    }

    async fn create_variant(
        &self,
        style_id: &StyleId,
        draft: &NewVariant,
        created_by: &CreatedBy,
    ) -> Result<Variant, StorageError> {
        let variant = Variant {
            id: VariantId::generate(),
            style_id: style_id.clone(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            prompt_override: draft.prompt_override.clone(),
            created_by: created_by.clone(),
            is_public: false,
            usage_count: 0,
            created_at: now_millis()?,
        };
        let conn = self.conn()?;
        insert_variant_row(&conn, &variant)?;
        Ok(variant)
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserOverlay>, StorageError> {
        let conn = self.conn()?;
        load_user(&conn, user_id)
    }

    async fn update_overlay(
        &self,
        user_id: &UserId,
        update: &OverlayUpdate,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut overlay =
            load_user(&tx, user_id)?.unwrap_or_else(|| UserOverlay::new(user_id.clone()));
        update.apply_to(&mut overlay);
        tx.execute(
            "INSERT INTO users (user_id, added_styles, hidden_styles) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET
                added_styles = excluded.added_styles,
                hidden_styles = excluded.hidden_styles,
                updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)",
            params![
                user_id.as_str(),
                encode_ids(overlay.set(OverlayField::Added))?,
                encode_ids(overlay.set(OverlayField::Hidden))?,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}
