//! Section segmentation for the item area of a .d2s buffer.
//!
//! The blob carries no length prefixes: the player item list ends where the
//! corpse header begins, detected by a fixed-size-or-marker-adjacency
//! heuristic, and every later section is found by scanning forward for its
//! own two-byte marker. A failed marker search short-circuits: everything
//! past that point is absent.

use std::collections::BTreeMap;

use crate::layout::{ByteRange, ItemBlockKind, ItemRecord};
use crate::save::HEADER_LEN;

pub const ITEM_MARKER: [u8; 2] = *b"JM";
pub const MERCENARY_MARKER: [u8; 2] = *b"jf";
pub const GOLEM_MARKER: [u8; 2] = *b"kf";

const PLAYER_HEADER_LEN: usize = 4;
const CORPSE_INFO_LEN: usize = 16;

pub fn find_marker(data: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|p| p + from)
}

fn drop_empty(mut blocks: BTreeMap<ItemBlockKind, ByteRange>) -> BTreeMap<ItemBlockKind, ByteRange> {
    blocks.retain(|_, range| !range.is_empty());
    blocks
}

/// Split the buffer into its ordered item blocks.
pub fn segment(data: &[u8]) -> BTreeMap<ItemBlockKind, ByteRange> {
    let n = data.len();
    let mut blocks = BTreeMap::new();

    // Player header: JM plus a two-byte item count, after the fixed header.
    let Some(player_hd) = find_marker(data, ITEM_MARKER, HEADER_LEN) else {
        return blocks;
    };
    let mut cursor = player_hd + PLAYER_HEADER_LEN;
    blocks.insert(
        ItemBlockKind::PlayerHeader,
        ByteRange::new(player_hd, cursor),
    );

    // Player items run until the corpse header. The corpse header is a JM
    // block of 16 payload bytes when a corpse exists, otherwise 4 bytes,
    // recognized by the gap to the next JM or by an adjacent jf/kf marker.
    let player_start = cursor;
    let corpse_hd;
    loop {
        let Some(item_start) = find_marker(data, ITEM_MARKER, cursor) else {
            return drop_empty(blocks);
        };
        let next = find_marker(data, ITEM_MARKER, item_start + 1);
        let gap_is_corpse_info = next.is_some_and(|p| p - item_start == CORPSE_INFO_LEN);
        let next_is_tail_marker = next.is_some_and(|p| {
            p >= 2 && (data[p - 2..p] == MERCENARY_MARKER || data[p - 2..p] == GOLEM_MARKER)
        });
        if next.is_none() || gap_is_corpse_info || next_is_tail_marker {
            let hd_len = if gap_is_corpse_info {
                PLAYER_HEADER_LEN + CORPSE_INFO_LEN
            } else {
                PLAYER_HEADER_LEN
            };
            corpse_hd = ByteRange::new(item_start, (item_start + hd_len).min(n));
            blocks.insert(ItemBlockKind::CorpseHeader, corpse_hd);
            break;
        }
        blocks.insert(
            ItemBlockKind::PlayerItems,
            ByteRange::new(player_start, next.unwrap()),
        );
        cursor = next.unwrap();
    }

    // Corpse items run to the mercenary (or golem) marker, or to EOF.
    let merc_hd_start = find_marker(data, MERCENARY_MARKER, corpse_hd.end);
    let corpse_end = merc_hd_start
        .or_else(|| find_marker(data, GOLEM_MARKER, corpse_hd.end))
        .unwrap_or(n);
    if corpse_hd.end != corpse_end {
        blocks.insert(
            ItemBlockKind::CorpseItems,
            ByteRange::new(corpse_hd.end, corpse_end),
        );
    }

    let Some(merc_start) = merc_hd_start else {
        return drop_empty(blocks);
    };

    // Mercenary header: "jf", and when the mercenary carries items,
    // "jf JM <count>" with the first item's JM right behind it.
    let large = find_marker(data, ITEM_MARKER, merc_start) == Some(merc_start + 2)
        && find_marker(data, ITEM_MARKER, merc_start + 3) == Some(merc_start + 6);
    let merc_hd_end = merc_start + if large { 6 } else { 2 };
    blocks.insert(
        ItemBlockKind::MercenaryHeader,
        ByteRange::new(merc_start, merc_hd_end.min(n)),
    );

    let Some(golem_start) = find_marker(data, GOLEM_MARKER, merc_hd_end) else {
        blocks.insert(
            ItemBlockKind::MercenaryItems,
            ByteRange::new(merc_hd_end.min(n), n),
        );
        return drop_empty(blocks);
    };

    blocks.insert(
        ItemBlockKind::MercenaryItems,
        ByteRange::new(merc_hd_end, golem_start),
    );
    // Golem header: "kf" plus the has-golem flag byte. The golem item is
    // whatever remains of the file.
    blocks.insert(
        ItemBlockKind::GolemHeader,
        ByteRange::new(golem_start, (golem_start + 3).min(n)),
    );
    blocks.insert(
        ItemBlockKind::GolemItem,
        ByteRange::new((golem_start + 3).min(n), n),
    );

    drop_empty(blocks)
}

/// Split one block into per-item byte ranges along its JM markers. A block
/// without any marker is returned whole.
pub fn item_ranges_in(data: &[u8], block: ByteRange) -> Vec<ByteRange> {
    let mut out = Vec::new();
    let mut cursor = block.start;
    loop {
        let found = find_marker(data, ITEM_MARKER, cursor).filter(|&p| p + 2 <= block.end);
        let Some(start) = found else {
            if out.is_empty() {
                out.push(block);
            }
            return out;
        };
        let end = find_marker(data, ITEM_MARKER, start + 1)
            .filter(|&p| p + 2 <= block.end)
            .unwrap_or(block.end);
        out.push(ByteRange::new(start, end));
        if end == block.end {
            return out;
        }
        cursor = end;
    }
}

/// Fresh snapshot of every item in the buffer, ordered by block then offset.
/// Header blocks are skipped; their bytes are reachable via `segment`.
pub fn item_records(data: &[u8]) -> Vec<ItemRecord> {
    let blocks = segment(data);
    let mut out = Vec::new();
    for (&block, &range) in &blocks {
        if block.is_header() {
            continue;
        }
        for (index, item) in item_ranges_in(data, range).into_iter().enumerate() {
            out.push(ItemRecord {
                block,
                index,
                range: item,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with_tail(tail: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(tail);
        data
    }

    #[test]
    fn missing_player_marker_yields_nothing() {
        let data = vec![0u8; HEADER_LEN + 32];
        assert!(segment(&data).is_empty());
    }

    #[test]
    fn player_block_ends_at_empty_corpse_header() {
        // Player header (count 2), two 14-byte items, empty corpse header.
        let mut tail = Vec::new();
        tail.extend_from_slice(b"JM\x02\x00");
        tail.extend_from_slice(&[b'J', b'M', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        tail.extend_from_slice(&[b'J', b'M', 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        tail.extend_from_slice(b"JM\x00\x00");
        let data = buffer_with_tail(&tail);

        let blocks = segment(&data);
        let player = blocks[&ItemBlockKind::PlayerItems];
        assert_eq!(player.len(), 28);
        let corpse_hd = blocks[&ItemBlockKind::CorpseHeader];
        assert_eq!(corpse_hd.len(), 4);
        assert!(!blocks.contains_key(&ItemBlockKind::CorpseItems));
        assert!(!blocks.contains_key(&ItemBlockKind::MercenaryHeader));

        let items = item_ranges_in(&data, player);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].len(), 14);
        assert_eq!(items[1].len(), 14);
    }

    #[test]
    fn corpse_info_gap_is_recognized() {
        let mut tail = Vec::new();
        tail.extend_from_slice(b"JM\x00\x00");
        // Corpse present: the corpse info JM and the corpse item-list JM sit
        // 16 bytes apart, and the 20-byte header swallows both.
        tail.extend_from_slice(b"JM\x01\x00");
        tail.extend_from_slice(&[0u8; 12]);
        tail.extend_from_slice(b"JM\x01\x00");
        tail.extend_from_slice(&[b'J', b'M', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let data = buffer_with_tail(&tail);

        let blocks = segment(&data);
        let corpse_hd = blocks[&ItemBlockKind::CorpseHeader];
        assert_eq!(corpse_hd.len(), 20);
        let corpse_items = blocks[&ItemBlockKind::CorpseItems];
        assert_eq!(corpse_items.len(), 14);
    }

    #[test]
    fn mercenary_and_golem_chain() {
        let mut tail = Vec::new();
        tail.extend_from_slice(b"JM\x00\x00"); // player header, no items
        tail.extend_from_slice(b"JM\x00\x00"); // empty corpse header
        tail.extend_from_slice(b"jfJM\x01\x00"); // mercenary header, 1 item
        tail.extend_from_slice(&[b'J', b'M', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        tail.extend_from_slice(b"kf\x01"); // golem header, golem present
        tail.extend_from_slice(&[b'J', b'M', 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let data = buffer_with_tail(&tail);

        let blocks = segment(&data);
        assert_eq!(blocks[&ItemBlockKind::MercenaryHeader].len(), 6);
        assert_eq!(blocks[&ItemBlockKind::MercenaryItems].len(), 14);
        assert_eq!(blocks[&ItemBlockKind::GolemHeader].len(), 3);
        assert_eq!(blocks[&ItemBlockKind::GolemItem].len(), 14);

        let records = item_records(&data);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].block, ItemBlockKind::MercenaryItems);
        assert_eq!(records[1].block, ItemBlockKind::GolemItem);
    }
}
