mod common;

use common::{cube_rune, plain_sword, socketed_rune, synthetic_save};
use horadric_core::catalog::{Catalog, TypeCode};
use horadric_core::error::SaveError;
use horadric_core::grid::Storage;
use horadric_core::item::extended::{occupied_sockets, socket_count};
use horadric_core::item::{ItemBytes, ItemFlag, Quality, TPL_HORADRIC_CUBE};
use horadric_core::layout::ItemRecord;
use horadric_core::mods::ModTable;

fn cube_record_by_code(save: &horadric_core::SaveBuffer, code: &str) -> ItemRecord {
    *save
        .cube_contents()
        .iter()
        .find(|record| {
            save.item_view(record)
                .type_code()
                .map(|c| c.as_str() == code)
                == Some(true)
        })
        .expect("cube item not found")
}

#[test]
fn drop_and_reinsert_restores_exact_bytes_with_children() {
    let sword = plain_sword(2, 2);
    let rune_r07 = socketed_rune("r07");
    let rune_r10 = socketed_rune("r10");
    let rune_r01 = cube_rune("r01", 3, 2);
    let items: Vec<&[u8]> = vec![
        TPL_HORADRIC_CUBE,
        &sword,
        &rune_r07,
        &rune_r10,
        &rune_r01,
    ];
    let mut save = synthetic_save(&items);
    let count_before = save.player_item_count();

    let cube_bytes = save.grep_horadric();
    // Parent, its two socketed children and the loose rune, in order.
    let mut expected = Vec::new();
    expected.extend_from_slice(&sword);
    expected.extend_from_slice(&socketed_rune("r07"));
    expected.extend_from_slice(&socketed_rune("r10"));
    expected.extend_from_slice(&cube_rune("r01", 3, 2));
    assert_eq!(cube_bytes, expected);

    let dropped = save.drop_horadric().unwrap();
    assert_eq!(dropped, 4);
    assert!(save.grep_horadric().is_empty());

    save.insert_horadric(&cube_bytes).unwrap();
    assert_eq!(save.grep_horadric(), expected);
    assert_eq!(save.player_item_count(), count_before);

    let catalog = Catalog::builtin();
    let sword_record = cube_record_by_code(&save, "ssd");
    let family = save.item_with_children(&sword_record, &catalog).unwrap();
    assert_eq!(family.len(), 3);
}

#[test]
fn socket_count_is_capped_by_volume() {
    // A 1x1 socketable family caps any request at a single socket.
    let catalog = Catalog::from_tsv("swords\nTest Dirk\tzz1\t; 1 1\n", "");
    let mut sword_bytes = ItemBytes::new(plain_sword(0, 0));
    sword_bytes
        .set_type_code(TypeCode::parse("zz1").unwrap())
        .unwrap();
    let sword = sword_bytes.into_vec();
    let items: Vec<&[u8]> = vec![&sword];
    let mut save = synthetic_save(&items);

    let record = cube_record_by_code(&save, "zz1");
    let granted = save.set_sockets(&catalog, &record, 6).unwrap();
    assert_eq!(granted, 1);

    let record = cube_record_by_code(&save, "zz1");
    assert_eq!(
        socket_count(record.range.slice(save.bytes()), &catalog).unwrap(),
        1
    );
}

#[test]
fn socket_mutations_roundtrip_through_resizing() {
    let catalog = Catalog::builtin();
    let sword = plain_sword(0, 0);
    let items: Vec<&[u8]> = vec![&sword];
    let mut save = synthetic_save(&items);
    let len_unsocketed = save.len();

    // Create sockets ex nihilo: the item grows by the 4-bit field.
    let record = cube_record_by_code(&save, "ssd");
    assert_eq!(save.set_sockets(&catalog, &record, 3).unwrap(), 3);
    let record = cube_record_by_code(&save, "ssd");
    let view = save.item_view(&record);
    assert!(view.flag(ItemFlag::Socketed));
    assert_eq!(
        socket_count(record.range.slice(save.bytes()), &catalog).unwrap(),
        3
    );

    // Remove them again: flag cleared, bytes shrink back.
    let record = cube_record_by_code(&save, "ssd");
    assert_eq!(save.set_sockets(&catalog, &record, 0).unwrap(), 0);
    assert_eq!(save.len(), len_unsocketed);
    let record = cube_record_by_code(&save, "ssd");
    assert!(!save.item_view(&record).flag(ItemFlag::Socketed));
}

#[test]
fn occupied_sockets_put_a_floor_under_reduction() {
    let catalog = Catalog::builtin();
    let sword = plain_sword(3, 2);
    let rune_r02 = socketed_rune("r02");
    let rune_r03 = socketed_rune("r03");
    let items: Vec<&[u8]> = vec![
        &sword,
        &rune_r02,
        &rune_r03,
    ];
    let mut save = synthetic_save(&items);
    let before = save.bytes().to_vec();

    let record = cube_record_by_code(&save, "ssd");
    // Asking for 1 socket cannot orphan the two seated runes.
    let granted = save.set_sockets(&catalog, &record, 1).unwrap();
    assert_eq!(granted, 2);

    let record = cube_record_by_code(&save, "ssd");
    assert_eq!(
        socket_count(record.range.slice(save.bytes()), &catalog).unwrap(),
        2
    );
    assert_ne!(save.bytes(), before.as_slice());
}

#[test]
fn refused_mutations_leave_the_buffer_untouched() {
    let catalog = Catalog::builtin();
    let rune = cube_rune("r05", 0, 0);
    let items: Vec<&[u8]> = vec![&rune];
    let mut save = synthetic_save(&items);
    let before = save.bytes().to_vec();

    // Compact runes can neither take sockets nor lose magic.
    let record = cube_record_by_code(&save, "r05");
    let err = save.set_sockets(&catalog, &record, 2).unwrap_err();
    assert!(matches!(err, SaveError::ConstraintViolation { .. }));
    assert_eq!(save.bytes(), before.as_slice());

    let record = cube_record_by_code(&save, "r05");
    let err = save.dispel_magic(&catalog, &record).unwrap_err();
    assert!(matches!(err, SaveError::ConstraintViolation { .. }));
    assert_eq!(save.bytes(), before.as_slice());
}

#[test]
fn separate_socketed_items_preserves_the_stones() {
    let catalog = Catalog::builtin();
    let table = ModTable::builtin();
    let sword = plain_sword(2, 2);
    let rune_r07 = socketed_rune("r07");
    let rune_r10 = socketed_rune("r10");
    let items: Vec<&[u8]> = vec![
        TPL_HORADRIC_CUBE,
        &sword,
        &rune_r07,
        &rune_r10,
    ];
    let mut save = synthetic_save(&items);

    let record = cube_record_by_code(&save, "ssd");
    save.separate_socketed_items(&catalog, &table, &record)
        .unwrap();

    // The parent keeps its sockets but no longer holds anything, and the
    // runes now live free in storage.
    let record = cube_record_by_code(&save, "ssd");
    let slice = record.range.slice(save.bytes());
    assert_eq!(socket_count(slice, &catalog).unwrap(), 2);
    assert_eq!(occupied_sockets(slice, &catalog).unwrap(), 0);

    let summaries = horadric_core::item_summaries(&save, &catalog);
    let freed: Vec<_> = summaries
        .iter()
        .filter(|summary| {
            matches!(summary.type_code.as_deref(), Some("r07") | Some("r10"))
        })
        .collect();
    assert_eq!(freed.len(), 2);
    for rune in freed {
        assert_eq!(rune.parent, horadric_core::Parent::Stored);
    }
}

#[test]
fn ethereal_toggle_rebalances_durability() {
    let catalog = Catalog::builtin();
    let sword = plain_sword(0, 0);
    let items: Vec<&[u8]> = vec![&sword];
    let mut save = synthetic_save(&items);

    let record = cube_record_by_code(&save, "ssd");
    assert!(save.set_ethereal(&catalog, &record, None).unwrap());
    let record = cube_record_by_code(&save, "ssd");
    assert!(save.item_view(&record).flag(ItemFlag::Ethereal));
    let durability = horadric_core::item::extended::durability(
        record.range.slice(save.bytes()),
        &catalog,
    )
    .unwrap()
    .unwrap();
    // 24 / 2 + 1.
    assert_eq!(durability.1, 13);

    // And back again.
    let record = cube_record_by_code(&save, "ssd");
    assert!(!save.set_ethereal(&catalog, &record, None).unwrap());
    let record = cube_record_by_code(&save, "ssd");
    assert!(!save.item_view(&record).flag(ItemFlag::Ethereal));
}

#[test]
fn regrade_walks_the_family_ladder() {
    let catalog = Catalog::builtin();
    let sword = plain_sword(0, 0);
    let items: Vec<&[u8]> = vec![&sword];
    let mut save = synthetic_save(&items);

    let record = cube_record_by_code(&save, "ssd");
    let new_code = save.regrade(&catalog, &record, None).unwrap();
    assert_eq!(new_code.as_str(), "9ss");

    let record = cube_record_by_code(&save, "9ss");
    let view = save.item_view(&record);
    // Item level jumps one grade's worth.
    assert_eq!(view.item_level(), Some(52));
    assert_eq!(view.quality(), Some(Quality::Normal));

    // Two more steps wrap around to normal.
    let record = cube_record_by_code(&save, "9ss");
    assert_eq!(save.regrade(&catalog, &record, None).unwrap().as_str(), "7ss");
    let record = cube_record_by_code(&save, "7ss");
    assert_eq!(save.regrade(&catalog, &record, None).unwrap().as_str(), "ssd");
}

#[test]
fn cube_cannot_swallow_itself() {
    let catalog = Catalog::builtin();
    let items: Vec<&[u8]> = vec![TPL_HORADRIC_CUBE];
    let mut save = synthetic_save(&items);

    let unplaced = save
        .place_items(
            &catalog,
            vec![TPL_HORADRIC_CUBE.to_vec()],
            &[Storage::Cube],
        )
        .unwrap();
    assert_eq!(unplaced.len(), 1);

    // The same item is happily placed into the stash instead.
    let unplaced = save
        .place_items(&catalog, unplaced, &[Storage::Stash])
        .unwrap();
    assert!(unplaced.is_empty());
}

#[test]
fn batch_placement_reports_only_the_overflow() {
    let catalog = Catalog::builtin();
    let items: Vec<&[u8]> = vec![];
    let mut save = synthetic_save(&items);

    // The cube holds 4x3 cells; thirteen 1x1 runes cannot all fit.
    let runes: Vec<Vec<u8>> = (1..=13).map(|i| cube_rune("r01", 0, i % 3)).collect();
    let unplaced = save
        .place_items(&catalog, runes, &[Storage::Cube])
        .unwrap();
    assert_eq!(unplaced.len(), 1);
    assert_eq!(save.cube_contents().len(), 12);

    // No two placed footprints overlap.
    let map = save.occupancy_map(&catalog, Storage::Cube);
    for row in 0..4 {
        for col in 0..3 {
            assert!(map.is_marked(row, col));
        }
    }
}
