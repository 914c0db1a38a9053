//! Column-oriented preset records.
//!
//! A saved preset stores one array per slot field (`"delay": [0, 500, ...]`)
//! instead of one object per slot. Loading transposes the columns back into
//! rows and runs them through the guard, so presets saved with a different
//! slot count or an older field set still load.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::{
    guard::{self, SlotRecord},
    model::{
        AudioBed, ChannelTables, Composition, GlobalStyle, ImageSlot, RectBackground, SoundSlot,
        TextSlot,
    },
};

/// Field name to per-slot values.
pub type Columns = BTreeMap<String, Vec<Value>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateRecord {
    pub name: String,
    pub slot_count: usize,
    pub texts: Columns,
    pub images: Columns,
    pub sounds: Columns,
    pub rect: RectBackground,
    pub global_style: GlobalStyle,
    pub audio_bed: Option<AudioBed>,
    pub saved_at: Option<DateTime<Utc>>,
}

#[must_use]
pub fn flatten(
    name: &str,
    tables: &ChannelTables,
    rect: &RectBackground,
    global_style: &GlobalStyle,
    audio_bed: Option<&AudioBed>,
) -> TemplateRecord {
    TemplateRecord {
        name: name.to_string(),
        slot_count: tables.texts.len().max(tables.images.len()).max(tables.sounds.len()),
        texts: to_columns(&tables.texts),
        images: to_columns(&tables.images),
        sounds: to_columns(&tables.sounds),
        rect: rect.clone(),
        global_style: global_style.clone(),
        audio_bed: audio_bed.cloned(),
        saved_at: Some(Utc::now()),
    }
}

/// Rebuilds a composition with exactly `slot_count` slots per channel.
#[instrument(skip(record), fields(template = %record.name, stored = record.slot_count, slot_count))]
#[must_use]
pub fn unflatten(record: &TemplateRecord, slot_count: usize) -> Composition {
    let style = record.global_style.default_text_style.clone();
    let tables = ChannelTables {
        texts: from_columns(&record.texts, slot_count, |_| TextSlot {
            style: style.clone(),
            ..TextSlot::default()
        }),
        images: from_columns(&record.images, slot_count, |_| ImageSlot::default()),
        sounds: from_columns(&record.sounds, slot_count, |_| SoundSlot::default()),
    };
    debug!("template unflattened");

    Composition {
        tables,
        rect: record.rect.clone(),
        style: record.global_style.clone(),
        audio_bed: record.audio_bed.clone(),
    }
}

fn to_columns<T: SlotRecord>(rows: &[T]) -> Columns {
    let mut columns = Columns::new();
    for (index, row) in rows.iter().enumerate() {
        let Ok(Value::Object(fields)) = serde_json::to_value(row) else {
            continue;
        };
        for (key, value) in fields {
            let column = columns.entry(key).or_default();
            column.resize(index, Value::Null);
            column.push(value);
        }
    }
    columns
}

fn from_columns<T, F>(columns: &Columns, slot_count: usize, factory: F) -> Vec<T>
where
    T: SlotRecord,
    F: Fn(usize) -> T,
{
    let rows: Vec<Value> = (0..slot_count)
        .map(|index| {
            let fields: Map<String, Value> = columns
                .iter()
                .filter_map(|(key, column)| {
                    column
                        .get(index)
                        .filter(|value| !value.is_null())
                        .map(|value| (key.clone(), value.clone()))
                })
                .collect();
            Value::Object(fields)
        })
        .collect();
    guard::ensure_raw(Some(&Value::Array(rows)), slot_count, factory)
}
