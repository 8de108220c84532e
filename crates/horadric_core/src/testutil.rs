//! Synthetic fixture builders shared by the unit tests.

use crate::bitfield::Bits;
use crate::item::{ItemView, Parent};
use crate::save::{HEADER_LEN, SIGNATURE, SUPPORTED_VERSION, SaveBuffer};

/// Minimal valid header-only buffer: signature, version, a name, a class
/// and the quest header the act logic anchors on.
pub(crate) fn empty_save_bytes() -> Vec<u8> {
    let mut data = vec![0u8; HEADER_LEN];
    data[0..4].copy_from_slice(&SIGNATURE);
    data[4..8].copy_from_slice(&SUPPORTED_VERSION.to_le_bytes());
    data[20..25].copy_from_slice(b"Ahara");
    data[40] = 1; // sorceress
    data[43] = 1;
    data[335..339].copy_from_slice(b"Woo!");
    data
}

/// Full synthetic save: header, empty attribute block, zeroed skills, a
/// player item list holding `items`, and an empty corpse header.
pub(crate) fn synthetic_save(items: &[&[u8]]) -> SaveBuffer {
    let mut data = empty_save_bytes();

    data.extend_from_slice(b"gf");
    // Attribute stream holding only the sentinel.
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

/// Extended-section short sword: normal quality, stored in the Cube at
/// (0, 0), durability 24/24, optionally socketed.
pub(crate) fn plain_sword(sockets: u8, occupied: u8) -> Vec<u8> {
    let mut bits = Bits::new();
    bits.push_value(u64::from(u16::from_le_bytes(*b"JM")), 16);
    while bits.len() < 154 {
        bits.push_value(0, 1);
    }
    bits.set_value(20..21, 1); // identified
    if sockets > 0 {
        bits.set_value(27..28, 1); // socketed
    }
    bits.set_value(58..61, 0); // parent: stored
    bits.set_value(73..76, 4); // storage: cube
    let code = b"ssd";
    bits.set_value(76..84, u64::from(code[0]));
    bits.set_value(84..92, u64::from(code[1]));
    bits.set_value(92..100, u64::from(code[2]));
    bits.set_value(108..111, u64::from(occupied));
    bits.set_value(143..150, 20); // item level
    bits.set_value(150..154, 2); // quality: normal

    // Extended tail: custom graphics, class-specific and realm lead bits
    // all clear, then the 17-bit durability pair.
    bits.push_value(0, 3);
    bits.push_value(24, 8);
    bits.push_value(24, 9);
    if sockets > 0 {
        bits.push_value(u64::from(sockets), 4);
    }
    bits.push_value(0x1FF, 9);
    bits.to_bytes()
}

