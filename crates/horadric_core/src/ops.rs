//! Item mutation operations over a [`SaveBuffer`].
//!
//! Items are addressed through [`ItemRecord`] handles taken from a fresh
//! segmentation snapshot. Every size-changing operation obsoletes all
//! previously derived records; callers re-derive between mutations. A
//! refused operation leaves the buffer byte for byte unchanged.

use crate::bitfield::Bits;
use crate::catalog::{Catalog, ItemClass, ItemGrade, TypeCode};
use crate::error::SaveError;
use crate::grid::{Occupancy, Storage, occupancy};
use crate::item::extended::{
    self, ExtField, QUEST_SOCKETS_END, QUEST_SOCKETS_START, occupied_sockets, socket_count,
};
use crate::item::{
    ItemBytes, ItemFlag, ItemView, Parent, Quality, TPL_HORADRIC_CUBE, TPL_RUNE_EL,
};
use crate::layout::{ByteRange, ItemBlockKind, ItemRecord};
use crate::mods::{MOD_SENTINEL, ModTable, ModificationSet};
use crate::save::{HEADER_LEN, SaveBuffer};
use crate::scanner::{self, ITEM_MARKER, MERCENARY_MARKER, find_marker};

const SOCKETED_FLAG_BIT: usize = 27;
const QUALITY_BITS_START: usize = 150;
const QUALITY_BITS_END: usize = 154;
const MAX_SOCKETS: u8 = 6;

/// Superior-modifier ids for armor and weapon base items.
const SUPERIOR_ARMOR_MOD_IDS: [u16; 2] = [16, 75];
const SUPERIOR_WEAPON_MOD_IDS: [u16; 4] = [17, 22, 68, 75];

/// Jewelize target template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdornmentKind {
    Jewel,
    Charm,
    Ring,
    Amulet,
}

impl AdornmentKind {
    pub fn template(self) -> &'static [u8] {
        match self {
            Self::Jewel => crate::item::TPL_JEWEL,
            Self::Charm => crate::item::TPL_CHARM,
            Self::Ring => crate::item::TPL_RING,
            Self::Amulet => crate::item::TPL_AMULET,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "rin" => Self::Ring,
            "amu" => Self::Amulet,
            "cm1" => Self::Charm,
            _ => Self::Jewel,
        }
    }
}

impl SaveBuffer {
    /// Fresh item snapshot; stale after any size-changing mutation.
    pub fn item_records(&self) -> Vec<ItemRecord> {
        scanner::item_records(self.bytes())
    }

    pub fn item_view(&self, record: &ItemRecord) -> ItemView<'_> {
        ItemView::new(record.range.slice(self.bytes()))
    }

    /// Item enumeration filtered by block, parent relation and storage
    /// kind; a `None` filter matches everything.
    pub fn items_filtered(
        &self,
        block: Option<ItemBlockKind>,
        parent: Option<Parent>,
        storage: Option<Storage>,
    ) -> Vec<ItemRecord> {
        self.item_records()
            .into_iter()
            .filter(|record| {
                if block.is_some_and(|b| b != record.block) {
                    return false;
                }
                let view = self.item_view(record);
                if parent.is_some_and(|p| p != view.parent()) {
                    return false;
                }
                !storage.is_some_and(|s| s != view.storage())
            })
            .collect()
    }

    fn item_bytes(&self, record: &ItemRecord) -> Vec<u8> {
        record.range.slice(self.bytes()).to_vec()
    }

    /// Direct item count stored in the player item header.
    pub fn player_item_count(&self) -> u16 {
        match find_marker(self.bytes(), ITEM_MARKER, HEADER_LEN) {
            Some(pos) if pos + 4 <= self.len() => {
                u16::from_le_bytes([self.bytes()[pos + 2], self.bytes()[pos + 3]])
            }
            _ => 0,
        }
    }

    pub fn mercenary_item_count(&self) -> u16 {
        let Some(pos) = self.find_mercenary_header() else {
            return 0;
        };
        u16::from_le_bytes([self.bytes()[pos + 4], self.bytes()[pos + 5]])
    }

    fn find_mercenary_header(&self) -> Option<usize> {
        let mut from = HEADER_LEN;
        while let Some(pos) = find_marker(self.bytes(), MERCENARY_MARKER, from) {
            if pos + 6 <= self.len() && self.bytes()[pos + 2..pos + 4] == ITEM_MARKER {
                return Some(pos);
            }
            from = pos + 1;
        }
        None
    }

    fn set_block_item_count(&mut self, block: ItemBlockKind, count: u16) -> Result<(), SaveError> {
        let pos = match block {
            ItemBlockKind::PlayerItems => find_marker(self.bytes(), ITEM_MARKER, HEADER_LEN)
                .map(|p| p + 2)
                .ok_or(SaveError::MalformedSection {
                    section: "player items",
                    reason: "player item header not found".to_string(),
                })?,
            ItemBlockKind::MercenaryItems => self
                .find_mercenary_header()
                .map(|p| p + 4)
                .ok_or(SaveError::MalformedSection {
                    section: "mercenary items",
                    reason: "mercenary item header not found".to_string(),
                })?,
            other => {
                return Err(SaveError::MalformedSection {
                    section: other.label(),
                    reason: "section carries no item count".to_string(),
                });
            }
        };
        self.data_mut()[pos..pos + 2].copy_from_slice(&count.to_le_bytes());
        Ok(())
    }

    pub fn has_horadric_cube(&self) -> bool {
        self.item_records().iter().any(|record| {
            record.block == ItemBlockKind::PlayerItems
                && self.item_view(record).type_code().map(|c| c.as_str() == "box") == Some(true)
        })
    }

    /// Items in the Horadric Cube plus their socketed children, in stream
    /// order. Cube items need not be contiguous.
    pub fn cube_contents(&self) -> Vec<ItemRecord> {
        let mut out = Vec::new();
        let mut in_cube = false;
        for record in self.item_records() {
            if record.block != ItemBlockKind::PlayerItems {
                continue;
            }
            let view = self.item_view(&record);
            if view.storage() == Storage::Cube {
                in_cube = true;
            }
            if !in_cube {
                continue;
            }
            if view.storage() == Storage::Cube || view.parent() == Parent::Socketed {
                out.push(record);
            } else {
                in_cube = false;
            }
        }
        out
    }

    /// The item and any children socketed into it, children trailing.
    pub fn item_with_children(
        &self,
        record: &ItemRecord,
        catalog: &Catalog,
    ) -> Result<Vec<ItemRecord>, SaveError> {
        let mut out = vec![*record];
        let occupied = occupied_sockets(record.range.slice(self.bytes()), catalog)?;
        if occupied == 0 {
            return Ok(out);
        }
        let siblings = self.item_records();
        for next in siblings.iter().filter(|r| {
            r.block == record.block && r.index > record.index && r.index <= record.index + occupied as usize
        }) {
            if self.item_view(next).parent() == Parent::Socketed {
                out.push(*next);
            } else {
                break;
            }
        }
        Ok(out)
    }

    /// Remove one item. The owning header count is decremented unless the
    /// item is socketed into another one.
    pub fn drop_item(&mut self, record: &ItemRecord) -> Result<(), SaveError> {
        if record.range.is_empty() || record.range.end > self.len() {
            return Err(SaveError::MalformedSection {
                section: record.block.label(),
                reason: "stale or empty item record".to_string(),
            });
        }
        let counted = self.item_view(record).parent() != Parent::Socketed;
        if counted {
            match record.block {
                ItemBlockKind::PlayerItems => {
                    let count = self.player_item_count().saturating_sub(1);
                    self.set_block_item_count(ItemBlockKind::PlayerItems, count)?;
                }
                ItemBlockKind::MercenaryItems => {
                    let count = self.mercenary_item_count().saturating_sub(1);
                    self.set_block_item_count(ItemBlockKind::MercenaryItems, count)?;
                }
                ItemBlockKind::GolemItem => {}
                other => {
                    return Err(SaveError::refused(
                        other.label(),
                        "dropping from this section is not supported",
                    ));
                }
            }
        }
        self.data_mut().drain(record.range.start..record.range.end);
        Ok(())
    }

    /// Drop several items from one snapshot. Dropping back to front keeps
    /// the remaining records' offsets valid.
    pub fn drop_items(&mut self, mut records: Vec<ItemRecord>) -> Result<(), SaveError> {
        records.sort_by_key(|record| std::cmp::Reverse(record.range.start));
        for record in records {
            self.drop_item(&record)?;
        }
        Ok(())
    }

    /// Insert raw `JM`-item bytes at the head of the player item list and
    /// bump the stored count by the number of non-socketed items.
    pub fn add_items_to_player(&mut self, items: &[u8]) -> Result<(), SaveError> {
        let Some(first) = find_marker(items, ITEM_MARKER, 0) else {
            return Err(SaveError::MalformedSection {
                section: "player items",
                reason: "added block holds no item marker".to_string(),
            });
        };
        let items = &items[first..];
        let added = count_main_items(items);

        let blocks = scanner::segment(self.bytes());
        let insert_at = match blocks.get(&ItemBlockKind::PlayerItems) {
            Some(range) => range.start,
            None => {
                blocks
                    .get(&ItemBlockKind::PlayerHeader)
                    .ok_or(SaveError::MalformedSection {
                        section: "player items",
                        reason: "player item header not found".to_string(),
                    })?
                    .end
            }
        };

        let count = self.player_item_count() + added;
        let data = self.data_mut();
        data.splice(insert_at..insert_at, items.iter().copied());
        self.set_block_item_count(ItemBlockKind::PlayerItems, count)?;
        Ok(())
    }

    /// Raw byte run of the cube contents, parents and children in order.
    pub fn grep_horadric(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for record in self.cube_contents() {
            out.extend_from_slice(record.range.slice(self.bytes()));
        }
        out
    }

    /// Drop every cube item; returns how many were removed.
    pub fn drop_horadric(&mut self) -> Result<usize, SaveError> {
        let records = self.cube_contents();
        let dropped = records.len();
        self.drop_items(records)?;
        Ok(dropped)
    }

    /// Replace the cube contents with a raw item-bytes block.
    pub fn insert_horadric(&mut self, items: &[u8]) -> Result<(), SaveError> {
        self.drop_horadric()?;
        if !items.is_empty() {
            self.add_items_to_player(items)?;
        }
        Ok(())
    }

    pub fn occupancy_map(&self, catalog: &Catalog, storage: Storage) -> Occupancy {
        occupancy(self, catalog, storage)
    }

    /// First-fit placement of detached items into the given storage
    /// surfaces, tried in order. Socketed children travel with their
    /// parent. Returns the items that found no room; the rest is written
    /// into the buffer.
    pub fn place_items(
        &mut self,
        catalog: &Catalog,
        items: Vec<Vec<u8>>,
        targets: &[Storage],
    ) -> Result<Vec<Vec<u8>>, SaveError> {
        let mut remaining = items;
        for &storage in targets {
            remaining = self.place_items_single(catalog, remaining, storage)?;
            if remaining.is_empty() {
                break;
            }
        }
        Ok(remaining)
    }

    fn place_items_single(
        &mut self,
        catalog: &Catalog,
        items: Vec<Vec<u8>>,
        storage: Storage,
    ) -> Result<Vec<Vec<u8>>, SaveError> {
        let mut unplaced = Vec::new();
        let mut pending: Vec<u8> = Vec::new();
        let mut in_sockets = false;

        for item in items {
            let view = ItemView::new(&item);
            if view.parent() == Parent::Socketed {
                if in_sockets {
                    pending.extend_from_slice(&item);
                } else {
                    unplaced.push(item);
                }
                continue;
            }

            in_sockets = false;
            if !pending.is_empty() {
                self.add_items_to_player(&pending)?;
                pending.clear();
            }

            let volume = view.type_code().and_then(|code| catalog.volume(code));
            let slot = volume.and_then(|v| self.occupancy_map(catalog, storage).find_slot(v));
            let is_cube_item = view.type_code().map(|c| c.as_str() == "box") == Some(true);
            // The Cube may never contain itself.
            if slot.is_none() || (is_cube_item && storage == Storage::Cube) {
                unplaced.push(item);
                continue;
            }
            let (row, col) = slot.unwrap();

            let mut placed = ItemBytes::new(item);
            placed.set_row(row as u8)?;
            placed.set_col(col as u8)?;
            placed.set_storage(storage)?;
            placed.set_parent(Parent::Stored)?;
            let occupied = occupied_sockets(placed.as_slice(), catalog)?;
            pending = placed.into_vec();
            if occupied > 0 {
                in_sockets = true;
            } else {
                self.add_items_to_player(&pending)?;
                pending.clear();
            }
        }

        if !pending.is_empty() {
            self.add_items_to_player(&pending)?;
        }
        Ok(unplaced)
    }

    /// Pull all socketed children out of an item, preferring storage near
    /// the parent, and re-store the emptied parent. Runeword parents lose
    /// their runeword magic in the process.
    pub fn separate_socketed_items(
        &mut self,
        catalog: &Catalog,
        table: &ModTable,
        record: &ItemRecord,
    ) -> Result<(), SaveError> {
        let snapshot = self.bytes().to_vec();
        let result = self.separate_socketed_inner(catalog, table, record);
        if result.is_err() {
            *self.data_mut() = snapshot;
        }
        result
    }

    fn separate_socketed_inner(
        &mut self,
        catalog: &Catalog,
        table: &ModTable,
        record: &ItemRecord,
    ) -> Result<(), SaveError> {
        let parent_slice = self.item_bytes(record);
        let view = ItemView::new(&parent_slice);
        let description = view.describe(catalog);
        if socket_count(&parent_slice, catalog)? == 0 {
            return Err(SaveError::refused(description, "item has no sockets"));
        }

        let family = self.item_with_children(record, catalog)?;
        let mut targets = vec![Storage::Cube, Storage::Stash, Storage::Inventory];
        if let Some(pos) = targets.iter().position(|&s| s == view.storage()) {
            targets.remove(pos);
            targets.insert(0, view.storage());
        }

        let mut detached: Vec<Vec<u8>> = Vec::new();
        let mut parent = ItemBytes::new(parent_slice);
        extended::set_occupied_sockets(&mut parent, catalog, 0)?;
        if parent.view().flag(ItemFlag::Runeword) {
            let normalized = normalize_rune_item(parent.as_slice(), catalog, table)?;
            parent.replace(normalized);
        }
        detached.push(parent.into_vec());
        for child in family.iter().skip(1) {
            let mut child_bytes = ItemBytes::new(self.item_bytes(child));
            child_bytes.set_parent(Parent::Stored)?;
            detached.push(child_bytes.into_vec());
        }

        self.drop_items(family)?;
        let unplaced = self.place_items(catalog, detached, &targets)?;
        if !unplaced.is_empty() {
            return Err(SaveError::PlacementFailed { item: description });
        }
        Ok(())
    }

    /// Set or remove sockets, honoring the quality and volume caps and
    /// never orphaning already socketed children.
    pub fn set_sockets(
        &mut self,
        catalog: &Catalog,
        record: &ItemRecord,
        requested: u8,
    ) -> Result<u8, SaveError> {
        let item_slice = self.item_bytes(record);
        let view = ItemView::new(&item_slice);
        let description = view.describe(catalog);

        if view.flag(ItemFlag::Runeword) {
            return Err(SaveError::refused(
                description,
                "runeword magic binds the socket count",
            ));
        }
        let Some(code) = view.type_code() else {
            return Err(SaveError::refused(description, "item has no type code"));
        };
        if catalog.class(code) == Some(ItemClass::QuestItems) {
            return Err(SaveError::refused(description, "quest items keep their sockets"));
        }
        if view.is_compact() || !catalog.is_socketable(code) {
            return Err(SaveError::refused(description, "item cannot carry sockets"));
        }

        let mut count = requested.min(MAX_SOCKETS);
        match view.quality() {
            Some(Quality::Magic) => count = count.min(4),
            Some(Quality::Rare) | Some(Quality::Set) | Some(Quality::Unique)
            | Some(Quality::Craft) => count = count.min(1),
            _ => {}
        }
        let Some((rows, cols)) = catalog.volume(code) else {
            return Err(SaveError::refused(description, "unknown item volume"));
        };
        count = count.min(rows * cols);

        let occupied = occupied_sockets(&item_slice, catalog)?;
        if count < occupied {
            log::info!(
                "cannot reduce '{description}' below its {occupied} occupied sockets"
            );
            count = occupied;
        }
        let current = socket_count(&item_slice, catalog)?;
        if current == count {
            return Ok(count);
        }

        let layout = extended::layout(&item_slice, catalog)?.ok_or_else(|| {
            SaveError::refused(description.clone(), "compact items carry no socket field")
        })?;
        let sockets = layout.range(ExtField::Sockets).unwrap();

        let mut bits = Bits::from_bytes(&item_slice);
        if current > 0 && count > 0 {
            bits.set_value(sockets, u64::from(count));
        } else if current > 0 {
            bits.set_value(SOCKETED_FLAG_BIT..SOCKETED_FLAG_BIT + 1, 0);
            bits.remove(sockets);
            bits.set_value(QUEST_SOCKETS_START..QUEST_SOCKETS_END, 0);
        } else {
            bits.set_value(SOCKETED_FLAG_BIT..SOCKETED_FLAG_BIT + 1, 1);
            bits.insert_value(sockets.start, u64::from(count), 4);
        }

        let rebuilt = bits.to_bytes_trimmed();
        self.data_mut()
            .splice(record.range.start..record.range.end, rebuilt);
        Ok(count)
    }

    /// Strip the intrinsic magic from a magic, rare, set or unique item,
    /// leaving a plain normal-quality base.
    pub fn dispel_magic(&mut self, catalog: &Catalog, record: &ItemRecord) -> Result<(), SaveError> {
        let item_slice = self.item_bytes(record);
        let view = ItemView::new(&item_slice);
        let description = view.describe(catalog);

        let quality = view.quality().unwrap_or(Quality::Unspecified(0));
        if !quality.is_magic() {
            return Err(SaveError::refused(description, "item carries no dispellable magic"));
        }
        let occupied = occupied_sockets(&item_slice, catalog)?;
        if occupied > 0 {
            return Err(SaveError::refused(
                description,
                format!("{occupied} occupied sockets; remove stones and runes first"),
            ));
        }
        let layout = extended::layout(&item_slice, catalog)?.ok_or_else(|| {
            SaveError::refused(description.clone(), "compact items carry no magic")
        })?;

        let is_charm = view.type_code().and_then(|c| catalog.class(c)) == Some(ItemClass::Charms);
        let mods = layout.range(ExtField::Mods).unwrap();
        let set_id = layout.range(ExtField::SetId).unwrap();
        let quality_attributes = layout.range(ExtField::QualityAttributes).unwrap();

        let mut bits = Bits::from_bytes(&item_slice);
        bits.set_value(QUALITY_BITS_START..QUALITY_BITS_END, u64::from(Quality::Normal.raw()));
        bits.set_value(QUEST_SOCKETS_START..QUEST_SOCKETS_END, 0);
        // Surgery from the top down keeps lower ranges valid.
        bits.truncate(mods.start);
        bits.push_value(u64::from(MOD_SENTINEL), 9);
        bits.remove(set_id);
        bits.remove(quality_attributes.clone());
        if is_charm {
            bits.insert_value(quality_attributes.start, 0, 12);
        }

        let rebuilt = bits.to_bytes_trimmed();
        self.data_mut()
            .splice(record.range.start..record.range.end, rebuilt);
        log::info!("dispelled magic on '{description}'");
        Ok(())
    }

    /// Toggle or set the ethereal state, adjusting defense and maximum
    /// durability the way the game balances ethereal bases.
    pub fn set_ethereal(
        &mut self,
        catalog: &Catalog,
        record: &ItemRecord,
        enable: Option<bool>,
    ) -> Result<bool, SaveError> {
        let mut item = ItemBytes::new(self.item_bytes(record));
        let enabled = ethereal_toggle(&mut item, catalog, enable)?;
        let rebuilt = item.into_vec();
        self.data_mut()
            .splice(record.range.start..record.range.end, rebuilt);
        Ok(enabled)
    }

    /// Walk the item's family grade ladder (normal, exceptional, elite,
    /// then around again), re-deriving durability, defense and item level.
    pub fn regrade(
        &mut self,
        catalog: &Catalog,
        record: &ItemRecord,
        target: Option<ItemGrade>,
    ) -> Result<TypeCode, SaveError> {
        let item_slice = self.item_bytes(record);
        let view = ItemView::new(&item_slice);
        let description = view.describe(catalog);

        let Some(old_code) = view.type_code() else {
            return Err(SaveError::refused(description, "item has no type code"));
        };
        let Some(family) = catalog.family(old_code) else {
            return Err(SaveError::refused(description, "item family is not cataloged"));
        };
        if family.codes.len() < 2 {
            return Err(SaveError::refused(description, "item family has a single grade"));
        }
        let old_position = match target {
            Some(grade) => grade.position(),
            None => catalog
                .grade(old_code)
                .map(ItemGrade::position)
                .unwrap_or(0),
        };
        let new_position = (old_position + 1) % family.codes.len();
        let new_code = family.codes[new_position].0;

        let occupied = occupied_sockets(&item_slice, catalog)?;
        let mut item = ItemBytes::new(item_slice);
        if occupied > 0 {
            if new_position < old_position {
                return Err(SaveError::refused(
                    description,
                    format!("cannot downgrade with {occupied} occupied sockets"),
                ));
            }
            if item.view().flag(ItemFlag::Runeword) {
                // Keep the socket count pinned to the occupied runes so the
                // upgrade cannot add empty sockets.
                let layout = extended::layout(item.as_slice(), catalog)?.ok_or_else(|| {
                    SaveError::refused(description.clone(), "compact items cannot be regraded")
                })?;
                let sockets = layout.range(ExtField::Sockets).unwrap();
                if sockets.len() != 4 {
                    return Err(SaveError::refused(
                        description,
                        "unexpected socket field shape",
                    ));
                }
                let mut bits = Bits::from_bytes(item.as_slice());
                bits.set_value(sockets, u64::from(occupied));
                item.replace(bits.to_bytes());
            }
        }

        item.set_type_code(new_code)?;
        let was_ethereal = item.view().flag(ItemFlag::Ethereal);
        if was_ethereal {
            ethereal_toggle(&mut item, catalog, Some(false))?;
        }

        if let Some(stats) = catalog.armor_stats(new_code) {
            let _ = extended::set_durability(&mut item, catalog, stats.durability);
        }
        // Keep the relative position in the armor-class range: a good base
        // stays a good base across grades.
        if catalog.is_armor(new_code) {
            let mut p = 0.5f64;
            if let (Some(old_stats), Ok(Some(current))) = (
                catalog.armor_stats(old_code),
                extended::defense(item.as_slice(), catalog),
            ) && old_stats.ac_max > old_stats.ac_min
            {
                let span = (old_stats.ac_max - old_stats.ac_min) as f64;
                p = ((current as f64 - old_stats.ac_min as f64) / span).clamp(0.0, 1.0);
            }
            if let Some(new_stats) = catalog.armor_stats(new_code) {
                let ac = ((1.0 - p) * new_stats.ac_min as f64 + p * new_stats.ac_max as f64)
                    .round() as i64;
                let _ = extended::set_defense(&mut item, catalog, ac);
            }
        }

        if let Some(level) = item.view().item_level() {
            let delta = 32 * (new_position as i32 - old_position as i32);
            let level = (i32::from(level) + delta).clamp(0, 99) as u8;
            item.set_item_level(level)?;
        }
        if was_ethereal {
            ethereal_toggle(&mut item, catalog, Some(true))?;
        }

        log::info!(
            "regraded '{description}' to '{}'",
            catalog.name(new_code).unwrap_or(new_code.as_str())
        );
        let rebuilt = item.into_vec();
        self.data_mut()
            .splice(record.range.start..record.range.end, rebuilt);
        Ok(new_code)
    }

    /// Clone an item's intrinsic magic into a plain adornment template and
    /// swap the original (with its socketed children) for the new piece.
    pub fn jewelize(
        &mut self,
        catalog: &Catalog,
        record: &ItemRecord,
        kind: AdornmentKind,
    ) -> Result<Option<TypeCode>, SaveError> {
        let snapshot = self.bytes().to_vec();
        let result = self.jewelize_inner(catalog, record, kind);
        if result.is_err() {
            *self.data_mut() = snapshot;
        }
        result
    }

    fn jewelize_inner(
        &mut self,
        catalog: &Catalog,
        record: &ItemRecord,
        kind: AdornmentKind,
    ) -> Result<Option<TypeCode>, SaveError> {
        let item_slice = self.item_bytes(record);
        let view = ItemView::new(&item_slice);
        let description = view.describe(catalog);
        let Some(layout) = extended::layout(&item_slice, catalog)? else {
            return Ok(None);
        };

        let template = kind.template();
        let template_code = ItemView::new(template).type_code().unwrap();
        let quality = view.quality().unwrap_or(Quality::Unspecified(0));
        // Runeword extended indexing is only reliable on plain bases.
        let has_runeword = view.flag(ItemFlag::Runeword)
            && matches!(quality, Quality::Normal | Quality::Superior | Quality::Inferior);

        let same_kind = view.type_code() == Some(template_code);
        let eligible_quality = matches!(
            quality,
            Quality::Rare | Quality::Magic | Quality::Craft | Quality::Unique | Quality::Set
        );
        if !has_runeword
            && (same_kind || socket_count(&item_slice, catalog)? > 0 || !eligible_quality)
        {
            return Ok(None);
        }

        let item_bits = Bits::from_bytes(&item_slice);
        let magic = layout
            .range(if has_runeword {
                ExtField::RunewordMods
            } else {
                ExtField::Mods
            })
            .unwrap();
        if magic.is_empty() {
            return Ok(None);
        }

        // Rebuild the template's tail: its own modification list is just
        // the closing sentinel and its quality attributes are the empty
        // normal-quality form; both give way to the source item's magic.
        let template_layout = extended::layout(template, catalog)?.unwrap();
        let template_mods = template_layout.range(ExtField::Mods).unwrap();
        let template_qa = template_layout.range(ExtField::QualityAttributes).unwrap();
        let mut forged = Bits::from_bytes(template);
        forged.truncate(template_mods.start);
        forged.remove(template_qa.clone());
        forged.extend_from(&item_bits, magic);
        forged.push_value(u64::from(MOD_SENTINEL), 9);

        let qa_at = template_qa.start;
        if has_runeword || matches!(quality, Quality::Unique | Quality::Set) {
            forged.set_value(
                QUALITY_BITS_START..QUALITY_BITS_END,
                u64::from(Quality::Magic.raw()),
            );
            // Empty prefix/suffix pair.
            forged.insert_value(qa_at, 0, 22);
        } else {
            forged.set_value(
                QUALITY_BITS_START..QUALITY_BITS_END,
                u64::from(quality.raw()),
            );
            let qa = layout.range(ExtField::QualityAttributes).unwrap();
            let qa_bits = item_bits.slice(qa);
            for k in (0..qa_bits.len()).rev() {
                forged.insert_value(qa_at, u64::from(qa_bits.get(k)), 1);
            }
        }

        let mut forged = ItemBytes::new(forged.to_bytes_trimmed());
        if let Some(level) = view.item_level() {
            forged.set_item_level(level)?;
        }

        let family = self.item_with_children(record, catalog)?;
        self.drop_items(family)?;
        let unplaced = self.place_items(catalog, vec![forged.into_vec()], &[Storage::Cube])?;
        if !unplaced.is_empty() {
            return Err(SaveError::PlacementFailed { item: description });
        }
        Ok(Some(template_code))
    }

    /// Make sure the player owns a Horadric Cube: spawn one into the
    /// top-left backpack corner, swallowing whatever was stored there.
    pub fn ensure_horadric(&mut self, catalog: &Catalog) -> Result<bool, SaveError> {
        if self.has_horadric_cube() {
            return Ok(false);
        }
        let snapshot = self.bytes().to_vec();
        let result = self.ensure_horadric_inner(catalog);
        if result.is_err() {
            *self.data_mut() = snapshot;
        }
        result
    }

    fn ensure_horadric_inner(&mut self, catalog: &Catalog) -> Result<bool, SaveError> {
        // Orphaned cube-storage items cannot survive without their cube.
        let orphans = self.cube_contents();
        self.drop_items(orphans)?;

        let (cube_rows, cube_cols) = catalog
            .volume(TypeCode::parse("box").unwrap())
            .unwrap_or((2, 2));
        let displaced: Vec<ItemRecord> = self
            .items_filtered(
                Some(ItemBlockKind::PlayerItems),
                Some(Parent::Stored),
                Some(Storage::Inventory),
            )
            .into_iter()
            .filter(|record| {
                let view = self.item_view(record);
                view.row() < cube_rows && view.col() < cube_cols
            })
            .collect();

        let mut block = TPL_HORADRIC_CUBE.to_vec();
        for record in &displaced {
            let mut item = ItemBytes::new(self.item_bytes(record));
            item.set_storage(Storage::Cube)?;
            block.extend_from_slice(item.as_slice());
        }
        self.drop_items(displaced)?;
        self.add_items_to_player(&block)?;
        Ok(true)
    }

    pub fn has_iron_golem(&self) -> bool {
        let blocks = scanner::segment(self.bytes());
        match blocks.get(&ItemBlockKind::GolemHeader) {
            Some(range) if range.len() >= 3 => self.bytes()[range.start + 2] > 0,
            _ => false,
        }
    }

    /// Dispel the iron golem and return its item into player storage.
    pub fn redeem_golem(&mut self, catalog: &Catalog) -> Result<bool, SaveError> {
        if !self.has_iron_golem() {
            return Ok(false);
        }
        let snapshot = self.bytes().to_vec();
        let result = self.redeem_golem_inner(catalog);
        if result.is_err() {
            *self.data_mut() = snapshot;
        }
        result
    }

    fn redeem_golem_inner(&mut self, catalog: &Catalog) -> Result<bool, SaveError> {
        let blocks = scanner::segment(self.bytes());
        let Some(&header) = blocks.get(&ItemBlockKind::GolemHeader) else {
            return Ok(false);
        };
        let items: Vec<Vec<u8>> = self
            .item_records()
            .into_iter()
            .filter(|record| record.block == ItemBlockKind::GolemItem)
            .map(|record| self.item_bytes(&record))
            .collect();
        if items.is_empty() {
            return Ok(false);
        }

        let flag_at = header.start + 2;
        self.data_mut().truncate(flag_at);
        self.data_mut().push(0);

        let unplaced = self.place_items(
            catalog,
            items,
            &[Storage::Cube, Storage::Stash, Storage::Inventory],
        )?;
        if !unplaced.is_empty() {
            return Err(SaveError::PlacementFailed {
                item: "iron golem item".to_string(),
            });
        }
        Ok(true)
    }
}

/// Number of counting (non-socketed) items in a raw `JM` byte run.
pub fn count_main_items(bytes: &[u8]) -> u16 {
    let mut count = 0u16;
    let mut cursor = match find_marker(bytes, ITEM_MARKER, 0) {
        Some(pos) => pos,
        None => return 0,
    };
    loop {
        let end = find_marker(bytes, ITEM_MARKER, cursor + 1).unwrap_or(bytes.len());
        // Anything of six bytes or less is a header fragment, not an item.
        if end - cursor > 6 && ItemView::new(&bytes[cursor..end]).parent() != Parent::Socketed {
            count += 1;
        }
        if end == bytes.len() {
            return count;
        }
        cursor = end;
    }
}

/// Toggle the ethereal flag on detached item bytes, rebalancing defense
/// and maximum durability.
fn ethereal_toggle(
    item: &mut ItemBytes,
    catalog: &Catalog,
    enable: Option<bool>,
) -> Result<bool, SaveError> {
    let description = item.view().describe(catalog);
    if item.view().is_compact() {
        return Err(SaveError::refused(description, "compact items cannot be ethereal"));
    }
    let code = item.view().type_code();
    let is_gear = code.is_some_and(|c| catalog.is_armor(c) || catalog.is_weapon(c));
    if !is_gear {
        return Err(SaveError::refused(description, "only weapons and armor can be ethereal"));
    }

    let current = item.view().flag(ItemFlag::Ethereal);
    let enable = enable.unwrap_or(!current);
    if current == enable {
        return Ok(enable);
    }

    let durability = extended::durability(item.as_slice(), catalog)?;
    let defense = extended::defense(item.as_slice(), catalog)?;

    item.set_flag(ItemFlag::Ethereal, enable)?;
    if let Some(ac) = defense {
        let factor = if enable { 1.5 } else { 0.67 };
        let _ = extended::set_defense(item, catalog, (ac as f64 * factor).round() as i64);
    }
    if let Some((_, max)) = durability {
        let new_max = if enable {
            (f64::from(max) / 2.0 + 1.0).round() as u32
        } else {
            (f64::from(max.saturating_sub(1)) * 2.0).round() as u32
        };
        let _ = extended::set_durability(item, catalog, new_max.clamp(1, 255));
    }
    Ok(enable)
}

/// Strip runeword magic from a base item: the runeword block and every
/// modification except the base's own superior modifiers disappear.
fn normalize_rune_item(
    item: &[u8],
    catalog: &Catalog,
    table: &ModTable,
) -> Result<Vec<u8>, SaveError> {
    let view = ItemView::new(item);
    let quality = view.quality().unwrap_or(Quality::Unspecified(0));
    let plain_base = matches!(quality, Quality::Normal | Quality::Superior);
    if !plain_base || view.bit_len() < 154 || socket_count(item, catalog)? == 0 {
        return Ok(item.to_vec());
    }

    // Ranges from the still-runeworded walk stay valid below the cuts.
    let layout = extended::layout(item, catalog)?.ok_or_else(|| SaveError::TruncatedItem {
        offset: 0,
        reason: "runeword item without extended section".to_string(),
    })?;
    let mods = layout.range(ExtField::Mods).unwrap();
    let runeword_block = layout.range(ExtField::Runeword).unwrap();

    let mut superior_bits = Bits::new();
    if quality == Quality::Superior {
        let is_weapon = view.type_code().is_some_and(|c| catalog.is_weapon(c));
        let allowed: &[u16] = if is_weapon {
            &SUPERIOR_WEAPON_MOD_IDS
        } else {
            &SUPERIOR_ARMOR_MOD_IDS
        };
        let item_bits = Bits::from_bytes(item);
        let run = item_bits.slice(mods.clone());
        let set = ModificationSet::decode(&run, table);
        for entry in &set.entries {
            if allowed.contains(&entry.id) {
                superior_bits.extend_from(&run, entry.range.clone());
            }
        }
    }

    let mut bits = Bits::from_bytes(item);
    bits.set_value(ItemFlag::Runeword.bit()..ItemFlag::Runeword.bit() + 1, 0);
    bits.truncate(mods.start);
    bits.remove(runeword_block);
    let superior_len = superior_bits.len();
    bits.extend_from(&superior_bits, 0..superior_len);
    bits.push_value(u64::from(MOD_SENTINEL), 9);
    Ok(bits.to_bytes_trimmed())
}

/// Build one compact socketable item (rune or gem) stored in the cube.
pub fn create_socketable(
    code: TypeCode,
    storage: Storage,
    row: u8,
    col: u8,
) -> Result<Vec<u8>, SaveError> {
    let mut item = ItemBytes::new(TPL_RUNE_EL.to_vec());
    item.set_storage(storage)?;
    item.set_row(row)?;
    item.set_col(col)?;
    item.set_type_code(code)?;
    Ok(item.into_vec())
}

/// Exchange the Horadric Cube contents of two characters.
///
/// Both new buffers are computed fully in memory and committed together;
/// a failure on either side leaves both untouched.
pub fn exchange_horadric(a: &mut SaveBuffer, b: &mut SaveBuffer) -> Result<(), SaveError> {
    let mut next_a = a.clone();
    let mut next_b = b.clone();

    let cube_a = next_a.grep_horadric();
    let cube_b = next_b.grep_horadric();
    next_a.insert_horadric(&cube_b)?;
    next_b.insert_horadric(&cube_a)?;
    next_a.finalize();
    next_b.finalize();

    *a = next_a;
    *b = next_b;
    Ok(())
}

/// Byte range helper for a detached item run.
pub fn item_run_ranges(bytes: &[u8]) -> Vec<ByteRange> {
    scanner::item_ranges_in(
        bytes,
        ByteRange::new(0, bytes.len()),
    )
}
