use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::model::{Channel, ChannelTables, ImageSlot, MIN_Z_INDEX, SoundSlot, TextSlot};

/// A row of a channel table.
pub trait SlotRecord: Clone + Serialize + DeserializeOwned {
    const CHANNEL: Channel;

    fn is_active(&self) -> bool;

    /// Clamps values that are representable but out of range. Returns `true`
    /// when anything changed.
    fn normalize(&mut self) -> bool {
        false
    }
}

impl SlotRecord for TextSlot {
    const CHANNEL: Channel = Channel::Text;

    fn is_active(&self) -> bool {
        TextSlot::is_active(self)
    }
}

impl SlotRecord for ImageSlot {
    const CHANNEL: Channel = Channel::Image;

    fn is_active(&self) -> bool {
        ImageSlot::is_active(self)
    }

    fn normalize(&mut self) -> bool {
        if self.z_index < MIN_Z_INDEX {
            self.z_index = MIN_Z_INDEX;
            return true;
        }
        false
    }
}

impl SlotRecord for SoundSlot {
    const CHANNEL: Channel = Channel::Sound;

    fn is_active(&self) -> bool {
        SoundSlot::is_active(self)
    }

    fn normalize(&mut self) -> bool {
        let clamped = if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            crate::model::DEFAULT_SOUND_VOLUME
        };
        if clamped.to_bits() == self.volume.to_bits() {
            return false;
        }
        self.volume = clamped;
        true
    }
}

/// Brings `table` to exactly `slot_count` records, building missing rows
/// with `factory`. Never fails; returns whether a repair happened.
pub fn ensure_table<T, F>(table: &mut Vec<T>, slot_count: usize, factory: F) -> bool
where
    T: SlotRecord,
    F: Fn(usize) -> T,
{
    let mut repaired = false;

    if table.len() > slot_count {
        table.truncate(slot_count);
        repaired = true;
    }
    while table.len() < slot_count {
        let index = table.len();
        table.push(factory(index));
        repaired = true;
    }
    for record in table.iter_mut() {
        repaired |= record.normalize();
    }

    if repaired {
        debug!(channel = %T::CHANNEL, slot_count, "channel table repaired");
    }
    repaired
}

pub fn ensure_tables<FT, FI, FS>(
    tables: &mut ChannelTables,
    slot_count: usize,
    text_factory: FT,
    image_factory: FI,
    sound_factory: FS,
) -> bool
where
    FT: Fn(usize) -> TextSlot,
    FI: Fn(usize) -> ImageSlot,
    FS: Fn(usize) -> SoundSlot,
{
    let texts = ensure_table(&mut tables.texts, slot_count, text_factory);
    let images = ensure_table(&mut tables.images, slot_count, image_factory);
    let sounds = ensure_table(&mut tables.sounds, slot_count, sound_factory);
    texts || images || sounds
}

/// Rebuilds a typed table from loosely-typed JSON.
///
/// A missing or non-array value yields an all-default table. Each slot that
/// is not an object is rebuilt from `factory`. An object slot keeps its
/// well-formed fields, takes missing or malformed fields from the default,
/// and drops unknown keys.
pub fn ensure_raw<T, F>(raw: Option<&Value>, slot_count: usize, factory: F) -> Vec<T>
where
    T: SlotRecord,
    F: Fn(usize) -> T,
{
    let items: &[Value] = raw.and_then(Value::as_array).map_or(&[], Vec::as_slice);

    let mut table: Vec<T> = (0..slot_count)
        .map(|index| match items.get(index) {
            Some(Value::Object(fields)) => repair_record(fields, factory(index)),
            _ => factory(index),
        })
        .collect();
    ensure_table(&mut table, slot_count, &factory);
    table
}

fn repair_record<T: SlotRecord>(fields: &Map<String, Value>, default: T) -> T {
    let Ok(Value::Object(defaults)) = serde_json::to_value(&default) else {
        return default;
    };

    let mut merged = defaults.clone();
    for (key, value) in fields {
        if defaults.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }

    if let Ok(record) = serde_json::from_value::<T>(Value::Object(merged.clone())) {
        return record;
    }

    for (key, value) in fields {
        let Some(fallback) = defaults.get(key) else {
            continue;
        };
        let mut probe = defaults.clone();
        probe.insert(key.clone(), value.clone());
        if serde_json::from_value::<T>(Value::Object(probe)).is_err() {
            trace!(channel = %T::CHANNEL, field = %key, "malformed field replaced with default");
            merged.insert(key.clone(), fallback.clone());
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or(default)
}
