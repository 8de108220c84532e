//! Shared synthetic fixtures built through the public API.

use horadric_core::bitfield::Bits;
use horadric_core::catalog::TypeCode;
use horadric_core::item::{ItemBytes, ItemView, Parent, TPL_RUNE_EL};
use horadric_core::save::{HEADER_LEN, SIGNATURE, SUPPORTED_VERSION, SaveBuffer};

pub fn empty_save_bytes() -> Vec<u8> {
    let mut data = vec![0u8; HEADER_LEN];
    data[0..4].copy_from_slice(&SIGNATURE);
    data[4..8].copy_from_slice(&SUPPORTED_VERSION.to_le_bytes());
    data[20..25].copy_from_slice(b"Ahara");
    data[40] = 1;
    data[43] = 1;
    data[335..339].copy_from_slice(b"Woo!");
    data
}

pub fn synthetic_save(items: &[&[u8]]) -> SaveBuffer {
    let mut data = empty_save_bytes();

    data.extend_from_slice(b"gf");
    data.extend_from_slice(&[0xFF, 0x01]);
    data.extend_from_slice(b"if");
    data.extend_from_slice(&[0u8; 30]);

    let counting = items
        .iter()
        .filter(|item| ItemView::new(item).parent() != Parent::Socketed)
        .count() as u16;
    data.extend_from_slice(b"JM");
    data.extend_from_slice(&counting.to_le_bytes());
    for item in items {
        data.extend_from_slice(item);
    }
    data.extend_from_slice(b"JM\x00\x00");

    let mut save = SaveBuffer::from_bytes(data).expect("synthetic save must load");
    save.finalize();
    save
}

/// Extended-section short sword stored in the Cube at (0, 0), durability
/// 24/24, optionally socketed.
pub fn plain_sword(sockets: u8, occupied: u8) -> Vec<u8> {
    let mut bits = Bits::new();
    bits.push_value(u64::from(u16::from_le_bytes(*b"JM")), 16);
    while bits.len() < 154 {
        bits.push_value(0, 1);
    }
    bits.set_value(20..21, 1);
    if sockets > 0 {
        bits.set_value(27..28, 1);
    }
    bits.set_value(73..76, 4);
    let code = b"ssd";
    bits.set_value(76..84, u64::from(code[0]));
    bits.set_value(84..92, u64::from(code[1]));
    bits.set_value(92..100, u64::from(code[2]));
    bits.set_value(108..111, u64::from(occupied));
    bits.set_value(143..150, 20);
    bits.set_value(150..154, 2);

    bits.push_value(0, 3);
    bits.push_value(24, 8);
    bits.push_value(24, 9);
    if sockets > 0 {
        bits.push_value(u64::from(sockets), 4);
    }
    bits.push_value(0x1FF, 9);
    bits.to_bytes()
}

pub fn socketed_rune(code: &str) -> Vec<u8> {
    let mut rune = ItemBytes::new(TPL_RUNE_EL.to_vec());
    rune.set_parent(Parent::Socketed).unwrap();
    rune.set_type_code(TypeCode::parse(code).unwrap()).unwrap();
    rune.into_vec()
}

pub fn cube_rune(code: &str, row: u8, col: u8) -> Vec<u8> {
    let mut rune = ItemBytes::new(TPL_RUNE_EL.to_vec());
    rune.set_type_code(TypeCode::parse(code).unwrap()).unwrap();
    rune.set_row(row).unwrap();
    rune.set_col(col).unwrap();
    rune.into_vec()
}
