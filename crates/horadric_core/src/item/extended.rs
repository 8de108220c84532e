//! The extended item section: a strictly ordered field chain where every
//! field's width and presence is a function of values decoded before it.
//! Nothing carries its own length, so locating any single field means
//! walking the whole chain front to back. Offsets computed by one walk are
//! stale after any size-changing mutation and must be re-derived.

use std::ops::Range;

use crate::bitfield::write_field;
use crate::catalog::{Catalog, ItemClass};
use crate::error::SaveError;
use crate::item::{COMPACT_ITEM_LEN, ItemBytes, ItemFlag, ItemView, Quality};
use crate::scanner::ITEM_MARKER;

/// First bit of the walked portion of the extended section.
pub const EXT_START_BIT: usize = 154;

/// Occupied-socket counter, fixed position within extended items.
pub const QUEST_SOCKETS_START: usize = 108;
pub const QUEST_SOCKETS_END: usize = 111;

const QUALITY_START: usize = 150;
const QUALITY_END: usize = 154;

const SENTINEL_BITS: usize = 9;
const PERSONALIZATION_MAX_BITS: usize = 105;

/// A runeword item may carry up to two base-item "superior" modifiers in
/// front of its first sentinel; these are the possible total bit lengths.
const RUNEWORD_SUPERIOR_MOD_LENGTHS: [usize; 6] = [0, 16, 18, 32, 34, 36];

/// Armor-class values are stored with this bias added.
const DEFENSE_BIAS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExtField {
    QuestSockets,
    Quality,
    CustomGraphics,
    ClassSpecific,
    QualityAttributes,
    Runeword,
    Personalization,
    Tome,
    Realm,
    Defense,
    Durability,
    Stack,
    SetId,
    Sockets,
    Mods,
    RunewordMods,
}

/// Bit ranges of every extended field, in chain order. An absent field is
/// recorded with an empty range so later surgery still knows its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedLayout {
    entries: Vec<(ExtField, Range<usize>)>,
    /// Item bit length: one past the final sentinel, rounded up to a byte.
    pub end_bit: usize,
}

impl ExtendedLayout {
    pub fn range(&self, field: ExtField) -> Option<Range<usize>> {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, r)| r.clone())
    }

    pub fn entries(&self) -> &[(ExtField, Range<usize>)] {
        &self.entries
    }
}

#[inline]
fn bit(item: &[u8], k: usize) -> bool {
    (item[k / 8] >> (k % 8)) & 1 == 1
}

fn all_ones(item: &[u8], range: Range<usize>) -> bool {
    range.into_iter().all(|k| bit(item, k))
}

fn all_zeros(item: &[u8], range: Range<usize>) -> bool {
    range.into_iter().all(|k| !bit(item, k))
}

fn field_value(item: &[u8], range: Range<usize>) -> u64 {
    let mut value = 0u64;
    for k in range.rev() {
        value = (value << 1) | u64::from(bit(item, k));
    }
    value
}

fn truncated(reason: &str) -> SaveError {
    SaveError::TruncatedItem {
        offset: 0,
        reason: reason.to_string(),
    }
}

/// Find the sentinel run closing a modification list: nine set bits
/// followed by zero padding up to the next byte boundary. Returns the
/// sentinel's start bit and the byte-aligned end bit.
fn scan_mods_end(item: &[u8], from: usize) -> Result<(usize, usize), SaveError> {
    let total = item.len() * 8;
    if total < SENTINEL_BITS {
        return Err(truncated("buffer too short for a modification sentinel"));
    }
    for p in from..=(total - SENTINEL_BITS) {
        if all_ones(item, p..p + SENTINEL_BITS) {
            let end = (p + SENTINEL_BITS).div_ceil(8) * 8;
            if end <= total && all_zeros(item, p + SENTINEL_BITS..end) {
                return Ok((p, end));
            }
        }
    }
    Err(truncated("modification list sentinel not found"))
}

/// Walk the extended chain of a non-compact item. `item` may extend past
/// the item's real end (for example to the end of the buffer when the
/// length is still unknown); the walk stops at the final sentinel.
fn walk(item: &[u8], catalog: &Catalog) -> Result<ExtendedLayout, SaveError> {
    let view = ItemView::new(item);
    let total = item.len() * 8;
    let need = |at: usize, width: usize, what: &str| -> Result<(), SaveError> {
        if at + width > total {
            Err(truncated(&format!("{what} runs past the end of the item")))
        } else {
            Ok(())
        }
    };

    let mut entries: Vec<(ExtField, Range<usize>)> = vec![
        (
            ExtField::QuestSockets,
            QUEST_SOCKETS_START..QUEST_SOCKETS_END,
        ),
        (ExtField::Quality, QUALITY_START..QUALITY_END),
    ];
    let mut idx = EXT_START_BIT;
    need(0, EXT_START_BIT, "extended section")?;

    let class = view.type_code().and_then(|code| catalog.class(code));
    let quality = view.quality().unwrap_or(Quality::Unspecified(0));
    let is_armor = view.type_code().is_some_and(|c| catalog.is_armor(c));
    let is_weapon = view.type_code().is_some_and(|c| catalog.is_weapon(c));
    let is_stack = view.type_code().is_some_and(|c| catalog.is_stack(c));

    // Custom graphics: 4 bits when the lead bit is set, else just the bit.
    need(idx, 1, "custom graphics")?;
    let size = if bit(item, idx) { 4 } else { 1 };
    need(idx, size, "custom graphics")?;
    entries.push((ExtField::CustomGraphics, idx..idx + size));
    idx += size;

    // Class-specific block, same self-describing pattern, 12 bits.
    need(idx, 1, "class-specific block")?;
    let size = if bit(item, idx) { 12 } else { 1 };
    need(idx, size, "class-specific block")?;
    entries.push((ExtField::ClassSpecific, idx..idx + size));
    idx += size;

    // Quality attributes, shaped by the quality decoded at 150..154.
    let is_charm = class == Some(ItemClass::Charms);
    let size = match quality {
        Quality::Inferior | Quality::Superior => 3,
        Quality::Normal => {
            if is_charm {
                12
            } else {
                0
            }
        }
        Quality::Magic => 22,
        Quality::Set | Quality::Unique => 12,
        Quality::Rare | Quality::Craft => {
            // Prefix/suffix ids, then six affix slots of 1 or 12 bits each.
            let mut size = 16;
            for _ in 0..6 {
                need(idx + size, 1, "rare affix block")?;
                size += if bit(item, idx + size) { 12 } else { 1 };
            }
            size
        }
        Quality::Unspecified(_) => 0,
    };
    need(idx, size, "quality attributes")?;
    entries.push((ExtField::QualityAttributes, idx..idx + size));
    idx += size;

    // Runeword block: 12-bit name id plus 4 spare bits.
    let size = if view.flag(ItemFlag::Runeword) { 16 } else { 0 };
    need(idx, size, "runeword block")?;
    entries.push((ExtField::Runeword, idx..idx + size));
    idx += size;

    // Personalization: 7-bit characters closed by an all-zero group.
    let mut size = 0;
    if view.flag(ItemFlag::Personalized) {
        loop {
            need(idx + size, 7, "personalization")?;
            let group = field_value(item, idx + size..idx + size + 7);
            size += 7;
            if group == 0 {
                break;
            }
            if size >= PERSONALIZATION_MAX_BITS {
                return Err(truncated("personalization terminator not found"));
            }
        }
    }
    entries.push((ExtField::Personalization, idx..idx + size));
    idx += size;

    let size = if class == Some(ItemClass::Tomes) { 5 } else { 0 };
    need(idx, size, "tome block")?;
    entries.push((ExtField::Tome, idx..idx + size));
    idx += size;

    // Realm data: lead bit, then class decides the payload width.
    need(idx, 1, "realm block")?;
    let size = if !bit(item, idx) {
        1
    } else if matches!(
        class,
        Some(ItemClass::Misc) | Some(ItemClass::Gems) | Some(ItemClass::Charms)
            | Some(ItemClass::Runes)
    ) {
        97
    } else {
        4
    };
    need(idx, size, "realm block")?;
    entries.push((ExtField::Realm, idx..idx + size));
    idx += size;

    let size = if is_armor { 11 } else { 0 };
    need(idx, size, "defense")?;
    entries.push((ExtField::Defense, idx..idx + size));
    idx += size;

    // Durability: 8-bit maximum; zero means indestructible, otherwise a
    // 9-bit current-durability field follows.
    let size = if is_armor || is_weapon {
        need(idx, 8, "durability")?;
        if field_value(item, idx..idx + 8) == 0 {
            8
        } else {
            17
        }
    } else {
        0
    };
    need(idx, size, "durability")?;
    entries.push((ExtField::Durability, idx..idx + size));
    idx += size;

    let size = if is_stack { 9 } else { 0 };
    need(idx, size, "stack count")?;
    entries.push((ExtField::Stack, idx..idx + size));
    idx += size;

    let size = if quality == Quality::Set { 5 } else { 0 };
    need(idx, size, "set id")?;
    entries.push((ExtField::SetId, idx..idx + size));
    idx += size;

    let size = if view.flag(ItemFlag::Socketed) { 4 } else { 0 };
    need(idx, size, "socket count")?;
    entries.push((ExtField::Sockets, idx..idx + size));
    idx += size;

    if view.flag(ItemFlag::Runeword) {
        // The first list holds at most the base item's superior modifiers;
        // bounded search over the known lengths for its sentinel.
        let size = RUNEWORD_SUPERIOR_MOD_LENGTHS
            .into_iter()
            .find(|&l| idx + l + SENTINEL_BITS <= total && all_ones(item, idx + l..idx + l + SENTINEL_BITS))
            .ok_or_else(|| truncated("runeword item modification sentinel not found"))?;
        entries.push((ExtField::Mods, idx..idx + size));
        idx += size + SENTINEL_BITS;

        let (rw_end, end_bit) = scan_mods_end(item, idx)?;
        entries.push((ExtField::RunewordMods, idx..rw_end));
        Ok(ExtendedLayout { entries, end_bit })
    } else {
        let (mods_end, end_bit) = scan_mods_end(item, idx)?;
        entries.push((ExtField::Mods, idx..mods_end));
        entries.push((ExtField::RunewordMods, end_bit..end_bit));
        Ok(ExtendedLayout { entries, end_bit })
    }
}

/// Compute the extended layout of one item. `None` for compact items.
pub fn layout(item: &[u8], catalog: &Catalog) -> Result<Option<ExtendedLayout>, SaveError> {
    if item.len() < COMPACT_ITEM_LEN {
        return Err(truncated("item shorter than the compact minimum"));
    }
    if ItemView::new(item).is_compact() {
        return Ok(None);
    }
    walk(item, catalog).map(Some)
}

/// Byte offset one past the end of the item starting at `start`.
///
/// Since no item carries its own length this walks the extended chain to
/// the final sentinel and rounds up to a whole byte; compact items are a
/// fixed 14 bytes, and a bare 4-byte header block counts as its own
/// pseudo-item.
pub fn find_item_end(data: &[u8], start: usize, catalog: &Catalog) -> Result<usize, SaveError> {
    if data.len() < start + 2 || data[start..start + 2] != ITEM_MARKER {
        return Err(SaveError::MalformedSection {
            section: "item list",
            reason: format!("no item marker at byte offset {start}"),
        });
    }
    let next_is_marker =
        data.len() >= start + 6 && data[start + 4..start + 6] == ITEM_MARKER;
    if next_is_marker {
        return Ok(start + 4);
    }
    if data.len() < start + COMPACT_ITEM_LEN {
        return Err(SaveError::TruncatedItem {
            offset: start,
            reason: "slice shorter than the compact minimum".to_string(),
        });
    }
    let slice = &data[start..];
    if ItemView::new(&slice[..COMPACT_ITEM_LEN]).is_compact() {
        return Ok(start + COMPACT_ITEM_LEN);
    }
    let layout = walk(slice, catalog).map_err(|e| match e {
        SaveError::TruncatedItem { reason, .. } => SaveError::TruncatedItem {
            offset: start,
            reason,
        },
        other => other,
    })?;
    Ok(start + layout.end_bit / 8)
}

/// Value of one extended field; `None` when the item is compact, the field
/// is absent, or it is too wide to read as an integer.
pub fn ext_value(
    item: &[u8],
    catalog: &Catalog,
    field: ExtField,
) -> Result<Option<u64>, SaveError> {
    let Some(layout) = layout(item, catalog)? else {
        return Ok(None);
    };
    let Some(range) = layout.range(field) else {
        return Ok(None);
    };
    if range.is_empty() || range.len() > 64 {
        return Ok(None);
    }
    Ok(Some(field_value(item, range)))
}

/// Base armor class, bias removed.
pub fn defense(item: &[u8], catalog: &Catalog) -> Result<Option<i64>, SaveError> {
    Ok(ext_value(item, catalog, ExtField::Defense)?.map(|raw| raw as i64 - DEFENSE_BIAS as i64))
}

/// (current, maximum) durability; `None` for items without the field or
/// with the 8-bit indestructible form.
pub fn durability(item: &[u8], catalog: &Catalog) -> Result<Option<(u32, u32)>, SaveError> {
    let Some(layout) = layout(item, catalog)? else {
        return Ok(None);
    };
    let Some(range) = layout.range(ExtField::Durability) else {
        return Ok(None);
    };
    if range.len() != 17 {
        return Ok(None);
    }
    let raw = field_value(item, range);
    Ok(Some(((raw >> 8) as u32, (raw & 0xFF) as u32)))
}

pub fn stack_count(item: &[u8], catalog: &Catalog) -> Result<Option<u64>, SaveError> {
    ext_value(item, catalog, ExtField::Stack)
}

pub fn socket_count(item: &[u8], catalog: &Catalog) -> Result<u8, SaveError> {
    Ok(ext_value(item, catalog, ExtField::Sockets)?.unwrap_or(0) as u8)
}

/// Number of sockets holding a child item. For quest items only the top
/// bit of the counter is socket-related; the low two bits are quest state.
pub fn occupied_sockets(item: &[u8], catalog: &Catalog) -> Result<u8, SaveError> {
    let Some(raw) = ext_value(item, catalog, ExtField::QuestSockets)? else {
        return Ok(0);
    };
    let view = ItemView::new(item);
    let is_quest = view
        .type_code()
        .and_then(|c| catalog.class(c))
        == Some(ItemClass::QuestItems);
    if is_quest {
        Ok(u8::from(raw & 4 != 0))
    } else {
        Ok(raw as u8)
    }
}

/// Write the occupied-socket counter, preserving quest state bits on
/// quest items. Fixed width, never resizes.
pub fn set_occupied_sockets(
    item: &mut ItemBytes,
    catalog: &Catalog,
    value: u8,
) -> Result<(), SaveError> {
    let sockets = socket_count(item.as_slice(), catalog)?;
    let value = value.min(sockets);
    let view = item.view();
    let is_quest = view
        .type_code()
        .and_then(|c| catalog.class(c))
        == Some(ItemClass::QuestItems);
    let current = ext_value(item.as_slice(), catalog, ExtField::QuestSockets)?.unwrap_or(0) as u8;
    let raw = if is_quest {
        (current & 3) | if value > 0 { 4 } else { 0 }
    } else {
        value
    };
    write_field(
        item.data_mut(),
        QUEST_SOCKETS_START,
        QUEST_SOCKETS_END,
        u64::from(raw),
    )
}

/// Write the base armor class. Fixed 11-bit field, never resizes.
pub fn set_defense(item: &mut ItemBytes, catalog: &Catalog, value: i64) -> Result<(), SaveError> {
    let Some(layout) = layout(item.as_slice(), catalog)? else {
        return Err(SaveError::refused(
            item.view().describe(catalog),
            "compact items carry no defense field",
        ));
    };
    let range = match layout.range(ExtField::Defense) {
        Some(range) if range.len() == 11 => range,
        _ => {
            return Err(SaveError::refused(
                item.view().describe(catalog),
                "item has no defense field",
            ));
        }
    };
    let raw = (value + DEFENSE_BIAS as i64).clamp(0, (1 << 11) - 1) as u64;
    if raw <= DEFENSE_BIAS {
        log::warn!("ignoring non-positive defense value {value}");
        return Ok(());
    }
    write_field(item.data_mut(), range.start, range.end, raw)
}

/// Set current and maximum durability to the same value. Requires the
/// 17-bit form; the 8-bit indestructible form is left alone.
pub fn set_durability(item: &mut ItemBytes, catalog: &Catalog, value: u32) -> Result<(), SaveError> {
    if value == 0 || value > 255 {
        return Err(SaveError::refused(
            item.view().describe(catalog),
            format!("durability {value} outside 1..=255"),
        ));
    }
    let Some(layout) = layout(item.as_slice(), catalog)? else {
        return Err(SaveError::refused(
            item.view().describe(catalog),
            "compact items carry no durability field",
        ));
    };
    let range = match layout.range(ExtField::Durability) {
        Some(range) if range.len() == 17 => range,
        _ => {
            return Err(SaveError::refused(
                item.view().describe(catalog),
                "item has no rewritable durability field",
            ));
        }
    };
    let raw = (u64::from(value) << 8) | u64::from(value);
    write_field(item.data_mut(), range.start, range.end, raw)
}

/// Personalization string, when the flag is set.
pub fn personalization(item: &[u8], catalog: &Catalog) -> Result<Option<String>, SaveError> {
    let Some(layout) = layout(item, catalog)? else {
        return Ok(None);
    };
    let range = match layout.range(ExtField::Personalization) {
        Some(range) if !range.is_empty() => range,
        _ => return Ok(None),
    };
    let mut name = String::new();
    let mut at = range.start;
    while at + 7 <= range.end {
        let ch = field_value(item, at..at + 7) as u32;
        if ch == 0 {
            break;
        }
        if let Some(ch) = char::from_u32(ch) {
            name.push(ch);
        }
        at += 7;
    }
    Ok(Some(name))
}
