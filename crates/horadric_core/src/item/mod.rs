//! Per-item codec over the `JM` record layout.
//!
//! The core fields sit at fixed bit offsets counted from the least
//! significant end of the item's little-endian bit view. Compact items are
//! exactly 14 bytes; everything else carries the extended section decoded
//! by [`extended`].

pub mod extended;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bitfield::{read_field, write_field};
use crate::catalog::{Catalog, TypeCode};
use crate::error::SaveError;
use crate::grid::Storage;

/// Byte length of a compact item; 106 bits of payload plus padding.
pub const COMPACT_ITEM_LEN: usize = 14;

const PARENT_START: usize = 58;
const PARENT_END: usize = 61;
const EQUIP_START: usize = 61;
const EQUIP_END: usize = 65;
const COL_START: usize = 65;
const COL_END: usize = 69;
const ROW_START: usize = 69;
const ROW_END: usize = 72;
const STORAGE_START: usize = 73;
const STORAGE_END: usize = 76;
const TYPE_CODE_START: usize = 76;
const TYPE_CODE_END: usize = 100;
const ITEM_LEVEL_START: usize = 143;
const ITEM_LEVEL_END: usize = 150;
const QUALITY_START: usize = 150;
const QUALITY_END: usize = 154;

/// Single-bit item properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemFlag {
    Identified,
    Broken,
    Socketed,
    NewlyFound,
    StarterGear,
    Compact,
    Ethereal,
    Personalized,
    Runeword,
}

impl ItemFlag {
    pub fn bit(self) -> usize {
        match self {
            Self::Identified => 20,
            Self::Broken => 24,
            Self::Socketed => 27,
            Self::NewlyFound => 29,
            Self::StarterGear => 33,
            Self::Compact => 37,
            Self::Ethereal => 38,
            Self::Personalized => 40,
            Self::Runeword => 42,
        }
    }
}

/// Where an item hangs off its owner. `Socketed` children follow their
/// parent item directly in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parent {
    Stored,
    Equipped,
    Belt,
    Cursor,
    Socketed,
    Unspecified(u8),
}

impl Parent {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Stored,
            1 => Self::Equipped,
            2 => Self::Belt,
            4 => Self::Cursor,
            6 => Self::Socketed,
            other => {
                log::warn!("unknown item parent code {other}");
                Self::Unspecified(other)
            }
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Stored => 0,
            Self::Equipped => 1,
            Self::Belt => 2,
            Self::Cursor => 4,
            Self::Socketed => 6,
            Self::Unspecified(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquipSlot {
    None,
    Helmet,
    Amulet,
    Armor,
    WeaponRight,
    WeaponLeft,
    RingRight,
    RingLeft,
    Belt,
    Boots,
    Gloves,
    WeaponAltRight,
    WeaponAltLeft,
    Unspecified(u8),
}

impl EquipSlot {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::Helmet,
            2 => Self::Amulet,
            3 => Self::Armor,
            4 => Self::WeaponRight,
            5 => Self::WeaponLeft,
            6 => Self::RingRight,
            7 => Self::RingLeft,
            8 => Self::Belt,
            9 => Self::Boots,
            10 => Self::Gloves,
            11 => Self::WeaponAltRight,
            12 => Self::WeaponAltLeft,
            other => {
                log::warn!("unknown equipment slot code {other}");
                Self::Unspecified(other)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Inferior,
    Normal,
    Superior,
    Magic,
    Set,
    Rare,
    Unique,
    Craft,
    Unspecified(u8),
}

impl Quality {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Inferior,
            2 => Self::Normal,
            3 => Self::Superior,
            4 => Self::Magic,
            5 => Self::Set,
            6 => Self::Rare,
            7 => Self::Unique,
            8 => Self::Craft,
            other => {
                log::warn!("unknown item quality code {other}");
                Self::Unspecified(other)
            }
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Inferior => 1,
            Self::Normal => 2,
            Self::Superior => 3,
            Self::Magic => 4,
            Self::Set => 5,
            Self::Rare => 6,
            Self::Unique => 7,
            Self::Craft => 8,
            Self::Unspecified(other) => other,
        }
    }

    /// Magically enhanced in the broad sense: carries intrinsic magic.
    pub fn is_magic(self) -> bool {
        matches!(self, Self::Magic | Self::Rare | Self::Set | Self::Unique)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::Inferior => "inferior",
            Self::Normal => "normal",
            Self::Superior => "superior",
            Self::Magic => "magic",
            Self::Set => "set",
            Self::Rare => "rare",
            Self::Unique => "unique",
            Self::Craft => "craft",
            Self::Unspecified(raw) => return write!(f, "unspecified({raw})"),
        };
        f.write_str(name)
    }
}

/// Core fixed-offset fields every item has. Short or legacy slices decode
/// to `Unspecified`/`None` instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCore {
    pub parent: Parent,
    pub equip_slot: EquipSlot,
    pub row: u8,
    pub col: u8,
    pub storage: Storage,
    pub type_code: Option<TypeCode>,
    pub quality: Option<Quality>,
    pub item_level: Option<u8>,
    pub compact: bool,
    pub identified: bool,
    pub socketed: bool,
    pub ethereal: bool,
    pub personalized: bool,
    pub runeword: bool,
}

/// Read-only view over one item's bytes.
#[derive(Debug, Clone, Copy)]
pub struct ItemView<'a> {
    data: &'a [u8],
}

impl<'a> ItemView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn bit_len(&self) -> usize {
        self.data.len() * 8
    }

    pub fn flag(&self, flag: ItemFlag) -> bool {
        let bit = flag.bit();
        if self.bit_len() <= bit {
            return false;
        }
        read_field(self.data, bit, bit + 1).unwrap_or(0) == 1
    }

    pub fn is_compact(&self) -> bool {
        self.flag(ItemFlag::Compact)
    }

    pub fn parent(&self) -> Parent {
        if self.data.len() < 8 {
            return Parent::Unspecified(0xFF);
        }
        Parent::from_raw(read_field(self.data, PARENT_START, PARENT_END).unwrap_or(0) as u8)
    }

    pub fn equip_slot(&self) -> EquipSlot {
        if self.data.len() < 9 {
            return EquipSlot::Unspecified(0xFF);
        }
        EquipSlot::from_raw(read_field(self.data, EQUIP_START, EQUIP_END).unwrap_or(0) as u8)
    }

    pub fn row(&self) -> u8 {
        read_field(self.data, ROW_START, ROW_END).unwrap_or(0) as u8
    }

    pub fn col(&self) -> u8 {
        read_field(self.data, COL_START, COL_END).unwrap_or(0) as u8
    }

    pub fn storage(&self) -> Storage {
        if self.data.len() < 10 {
            return Storage::Unspecified(0xFF);
        }
        Storage::from_raw(read_field(self.data, STORAGE_START, STORAGE_END).unwrap_or(0) as u8)
    }

    pub fn type_code(&self) -> Option<TypeCode> {
        if self.bit_len() < 106 {
            return None;
        }
        let mut bytes = [0u8; 3];
        for (i, slot) in bytes.iter_mut().enumerate() {
            let start = TYPE_CODE_START + i * 8;
            *slot = read_field(self.data, start, start + 8).ok()? as u8;
        }
        Some(TypeCode::new(bytes))
    }

    pub fn quality(&self) -> Option<Quality> {
        if self.bit_len() < 155 {
            return None;
        }
        Some(Quality::from_raw(
            read_field(self.data, QUALITY_START, QUALITY_END).unwrap_or(0) as u8,
        ))
    }

    pub fn item_level(&self) -> Option<u8> {
        if self.bit_len() < 150 {
            return None;
        }
        read_field(self.data, ITEM_LEVEL_START, ITEM_LEVEL_END)
            .ok()
            .map(|v| v as u8)
    }

    pub fn decode_core(&self) -> ItemCore {
        ItemCore {
            parent: self.parent(),
            equip_slot: self.equip_slot(),
            row: self.row(),
            col: self.col(),
            storage: self.storage(),
            type_code: self.type_code(),
            quality: self.quality(),
            item_level: self.item_level(),
            compact: self.is_compact(),
            identified: self.flag(ItemFlag::Identified),
            socketed: self.flag(ItemFlag::Socketed),
            ethereal: self.flag(ItemFlag::Ethereal),
            personalized: self.flag(ItemFlag::Personalized),
            runeword: self.flag(ItemFlag::Runeword),
        }
    }

    /// Short human-readable description for refusal messages and listings.
    pub fn describe(&self, catalog: &Catalog) -> String {
        match self.type_code() {
            Some(code) => match catalog.name(code) {
                Some(name) => name.to_string(),
                None => format!("unknown type code '{code}'"),
            },
            None => "untyped item".to_string(),
        }
    }
}

/// Owned item bytes plus the fixed-width mutators. Each setter re-encodes
/// only its own bit range and never changes the byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemBytes {
    data: Vec<u8>,
}

impl ItemBytes {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn view(&self) -> ItemView<'_> {
        ItemView::new(&self.data)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn replace(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn set_flag(&mut self, flag: ItemFlag, enabled: bool) -> Result<(), SaveError> {
        let bit = flag.bit();
        write_field(&mut self.data, bit, bit + 1, u64::from(enabled))
    }

    pub fn set_parent(&mut self, parent: Parent) -> Result<(), SaveError> {
        write_field(
            &mut self.data,
            PARENT_START,
            PARENT_END,
            u64::from(parent.raw()),
        )
    }

    pub fn set_row(&mut self, row: u8) -> Result<(), SaveError> {
        write_field(&mut self.data, ROW_START, ROW_END, u64::from(row))
    }

    pub fn set_col(&mut self, col: u8) -> Result<(), SaveError> {
        write_field(&mut self.data, COL_START, COL_END, u64::from(col))
    }

    pub fn set_storage(&mut self, storage: Storage) -> Result<(), SaveError> {
        write_field(
            &mut self.data,
            STORAGE_START,
            STORAGE_END,
            u64::from(storage.raw()),
        )
    }

    pub fn set_type_code(&mut self, code: TypeCode) -> Result<(), SaveError> {
        if self.view().bit_len() < 106 {
            return Err(SaveError::TruncatedItem {
                offset: 0,
                reason: "item too short to carry a type code".to_string(),
            });
        }
        let bytes = code.bytes();
        let value = u64::from(bytes[0]) | (u64::from(bytes[1]) << 8) | (u64::from(bytes[2]) << 16);
        write_field(&mut self.data, TYPE_CODE_START, TYPE_CODE_END, value)
    }

    pub fn set_item_level(&mut self, level: u8) -> Result<(), SaveError> {
        if self.view().bit_len() < 150 {
            return Err(SaveError::TruncatedItem {
                offset: 0,
                reason: "item too short to carry an item level".to_string(),
            });
        }
        write_field(
            &mut self.data,
            ITEM_LEVEL_START,
            ITEM_LEVEL_END,
            u64::from(level.min(99)),
        )
    }
}

/// Byte template of an El rune sitting at row 0, column 0 of the Cube.
pub const TPL_RUNE_EL: &[u8] = b"JM\x10\x00\xa0\x00e\x00\x00(\x07\x13\x03\x02";

/// Byte template of a Horadric Cube in the top-left backpack corner.
pub const TPL_HORADRIC_CUBE: &[u8] =
    b"JM\x10\x00\x80\x00e\x00\x00\x22\xf6\x86\x07\x028\xce1\xff\x86\xe0?";

/// Plain, non-magic adornment templates used as jewelize targets.
pub const TPL_JEWEL: &[u8] = b"JM\x10\x00\x80\x00e\x00\x00\xa8Vv\x07\x82\x00\x9dL\xf6\x92,\xff\x01";
pub const TPL_RING: &[u8] = b"JM\x10\x00\x80\x00e\x00\x00(\x97\xe6\x06\x02?L\xd2,\x9f\x04\xff\x01";
pub const TPL_AMULET: &[u8] =
    b"JM\x10\x00\x80\x00e\x00 \x18\xd6V\x07\x82\x1f\x8b\xe3-\x98\x04\xff\x01";
pub const TPL_CHARM: &[u8] =
    b"JM\x10\x00\x80\x00e\x00@8\xd6\x16\x03\x02f\xd0\x0d\xb5\x9e\x0c\x00\xf0\x1f";

const RUNE_NAMES: [&str; 33] = [
    "el", "eld", "tir", "nef", "eth", "ith", "tal", "ral", "ort", "thul", "amn", "sol", "shael",
    "dol", "hel", "io", "lum", "ko", "fal", "lem", "pul", "um", "mal", "ist", "gul", "vex", "ohm",
    "lo", "sur", "ber", "jah", "cham", "zod",
];

/// Resolve a rune name ("jah") or gem spec (`[tasredb][0-4]`, quality 0 =
/// chipped .. 4 = perfect) to its socketable type code.
pub fn socketable_code(name: &str) -> Option<TypeCode> {
    let lower = name.trim().to_ascii_lowercase();

    let bytes = lower.as_bytes();
    if bytes.len() == 2 && bytes[1].is_ascii_digit() {
        let quality = (bytes[1] - b'0').min(4) as usize;
        let codes: [&str; 5] = match bytes[0] {
            b't' => ["gcy", "gfy", "gsy", "gly", "gpy"],
            b'a' => ["gcv", "gfv", "gsv", "gzv", "gpv"],
            b's' => ["gcb", "gfb", "gsb", "glb", "gpb"],
            b'r' => ["gcr", "gfr", "gsr", "glr", "gpr"],
            b'e' => ["gcg", "gfg", "gsg", "glg", "gpg"],
            b'd' => ["gcw", "gfw", "gsw", "glw", "gpw"],
            b'b' => ["skc", "skf", "sku", "skl", "skz"],
            _ => return None,
        };
        return TypeCode::parse(codes[quality]);
    }

    let index = RUNE_NAMES.iter().position(|&n| n == lower)?;
    TypeCode::parse(&format!("r{:02}", index + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    #[test]
    fn rune_template_decodes() {
        let view = ItemView::new(TPL_RUNE_EL);
        assert!(view.is_compact());
        assert_eq!(view.type_code().unwrap().as_str(), "r01");
        assert_eq!(view.parent(), Parent::Stored);
        assert_eq!(view.storage(), Storage::Cube);
        assert_eq!(view.row(), 0);
        assert_eq!(view.col(), 0);
    }

    #[test]
    fn cube_template_decodes() {
        let view = ItemView::new(TPL_HORADRIC_CUBE);
        assert!(!view.is_compact());
        assert_eq!(view.type_code().unwrap().as_str(), "box");
        assert_eq!(view.quality(), Some(Quality::Normal));
        assert_eq!(view.storage(), Storage::Inventory);
    }

    #[test]
    fn adornment_templates_decode() {
        for (template, code) in [
            (TPL_JEWEL, "jew"),
            (TPL_RING, "rin"),
            (TPL_AMULET, "amu"),
            (TPL_CHARM, "cm1"),
        ] {
            let view = ItemView::new(template);
            assert_eq!(view.type_code().unwrap().as_str(), code, "{code} template");
            assert!(!view.is_compact());
        }
    }

    #[test]
    fn core_mutators_roundtrip_without_resizing() {
        let mut item = ItemBytes::new(TPL_RUNE_EL.to_vec());
        item.set_row(2).unwrap();
        item.set_col(1).unwrap();
        item.set_storage(Storage::Stash).unwrap();
        item.set_parent(Parent::Socketed).unwrap();
        item.set_type_code(TypeCode::parse("r31").unwrap()).unwrap();

        let view = item.view();
        assert_eq!(item.as_slice().len(), TPL_RUNE_EL.len());
        assert_eq!(view.row(), 2);
        assert_eq!(view.col(), 1);
        assert_eq!(view.storage(), Storage::Stash);
        assert_eq!(view.parent(), Parent::Socketed);
        assert_eq!(view.type_code().unwrap().as_str(), "r31");
    }

    #[test]
    fn flags_toggle_in_place() {
        let mut item = ItemBytes::new(TPL_HORADRIC_CUBE.to_vec());
        assert!(!item.view().flag(ItemFlag::Ethereal));
        item.set_flag(ItemFlag::Ethereal, true).unwrap();
        assert!(item.view().flag(ItemFlag::Ethereal));
        item.set_flag(ItemFlag::Ethereal, false).unwrap();
        assert!(!item.view().flag(ItemFlag::Ethereal));
    }

    #[test]
    fn short_slices_degrade_to_unspecified() {
        let view = ItemView::new(&[0x4A, 0x4D, 0x00, 0x00]);
        assert!(matches!(view.parent(), Parent::Unspecified(_)));
        assert!(view.type_code().is_none());
        assert!(view.quality().is_none());
    }

    #[test]
    fn socketable_codes_resolve() {
        assert_eq!(socketable_code("Jah").unwrap().as_str(), "r31");
        assert_eq!(socketable_code("zod").unwrap().as_str(), "r33");
        assert_eq!(socketable_code("t0").unwrap().as_str(), "gcy");
        assert_eq!(socketable_code("b4").unwrap().as_str(), "skz");
        assert!(socketable_code("frodo").is_none());
    }

    #[test]
    fn describe_uses_catalog_names() {
        let catalog = Catalog::builtin();
        let view = ItemView::new(TPL_HORADRIC_CUBE);
        assert_eq!(view.describe(&catalog), "Horadric Cube");
    }
}
