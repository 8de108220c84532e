//! Read-only status reporting for CLI and other consumers, in the shape
//! of serializable snapshot types.

use serde::Serialize;

use crate::catalog::Catalog;
use crate::character::rank_title;
use crate::error::SaveError;
use crate::grid::Storage;
use crate::item::extended::{self, ExtField};
use crate::item::{ItemFlag, Parent};
use crate::layout::ItemBlockKind;
use crate::mods::{ModTable, ModificationSet};
use crate::progress::MercenaryInfo;
use crate::save::SaveBuffer;
use crate::bitfield::Bits;
use crate::layout::ItemRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CharacterStatus {
    pub name: String,
    pub class: String,
    pub level: u8,
    pub hardcore: bool,
    pub dead: bool,
    pub rank: Option<String>,
    pub progression: u8,
    pub has_horadric_cube: bool,
    pub cube_item_count: usize,
    pub player_item_count: u16,
    pub mercenary: MercenaryInfo,
    pub version: u32,
    pub file_size: usize,
    pub stored_file_size: u32,
    pub stored_checksum: u32,
    pub computed_checksum: u32,
}

pub fn character_status(save: &SaveBuffer) -> CharacterStatus {
    let class = save.class();
    CharacterStatus {
        name: save.name(),
        class: class.to_string(),
        level: save.header_level(),
        hardcore: save.is_hardcore(),
        dead: save.is_dead(),
        rank: rank_title(save.progression(), save.is_hardcore(), class.is_female())
            .map(str::to_string),
        progression: save.progression(),
        has_horadric_cube: save.has_horadric_cube(),
        cube_item_count: save.cube_contents().len(),
        player_item_count: save.player_item_count(),
        mercenary: save.mercenary(),
        version: save.version(),
        file_size: save.len(),
        stored_file_size: save.stored_file_size(),
        stored_checksum: save.stored_checksum(),
        computed_checksum: save.compute_checksum(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSummary {
    pub block: ItemBlockKind,
    pub index: usize,
    pub name: String,
    pub type_code: Option<String>,
    pub quality: Option<String>,
    pub storage: Storage,
    pub parent: Parent,
    pub row: u8,
    pub col: u8,
    pub item_level: Option<u8>,
    pub ethereal: bool,
    pub sockets: u8,
    pub occupied_sockets: u8,
    pub byte_len: usize,
}

pub fn item_summaries(save: &SaveBuffer, catalog: &Catalog) -> Vec<ItemSummary> {
    save.item_records()
        .iter()
        .map(|record| {
            let view = save.item_view(record);
            let slice = record.range.slice(save.bytes());
            ItemSummary {
                block: record.block,
                index: record.index,
                name: view.describe(catalog),
                type_code: view.type_code().map(|c| c.as_str().to_string()),
                quality: view.quality().map(|q| q.to_string()),
                storage: view.storage(),
                parent: view.parent(),
                row: view.row(),
                col: view.col(),
                item_level: view.item_level(),
                ethereal: view.flag(ItemFlag::Ethereal),
                sockets: extended::socket_count(slice, catalog).unwrap_or(0),
                occupied_sockets: extended::occupied_sockets(slice, catalog).unwrap_or(0),
                byte_len: record.range.len(),
            }
        })
        .collect()
}

/// Decode and render one item's modification lists for display. Entries
/// past an unrecognized id are reported, never dropped.
pub fn describe_modifications(
    save: &SaveBuffer,
    catalog: &Catalog,
    table: &ModTable,
    record: &ItemRecord,
) -> Result<Vec<String>, SaveError> {
    let slice = record.range.slice(save.bytes());
    let Some(layout) = extended::layout(slice, catalog)? else {
        return Ok(Vec::new());
    };
    let bits = Bits::from_bytes(slice);
    let mut lines = Vec::new();
    for field in [ExtField::Mods, ExtField::RunewordMods] {
        let Some(range) = layout.range(field) else {
            continue;
        };
        if range.is_empty() {
            continue;
        }
        let set = ModificationSet::decode(&bits.slice(range), table);
        lines.extend(set.render(table));
    }
    Ok(lines)
}
