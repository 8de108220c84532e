//! Compact key-value attribute list and the fixed skill array.
//!
//! Attributes live behind the `gf` marker as a sentinel-terminated stream
//! of 9-bit ids followed by id-specific value widths; skills are a plain
//! 30-byte array behind the `if` marker.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bitfield::{Bits, read_field};
use crate::error::SaveError;
use crate::save::{HEADER_LEN, SaveBuffer};
use crate::scanner::find_marker;

pub const ATTRIBUTES_MARKER: [u8; 2] = *b"gf";
pub const SKILLS_MARKER: [u8; 2] = *b"if";

/// 9-bit all-ones id terminating the attribute stream.
pub const ATTRIBUTE_SENTINEL: u64 = 0x1FF;

pub const SKILL_COUNT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Attribute {
    Strength,
    Energy,
    Dexterity,
    Vitality,
    UnusedStats,
    UnusedSkills,
    CurrentHp,
    MaxHp,
    CurrentMana,
    MaxMana,
    CurrentStamina,
    MaxStamina,
    Level,
    Experience,
    Gold,
    StashedGold,
}

impl Attribute {
    pub const ALL: [Attribute; 16] = [
        Self::Strength,
        Self::Energy,
        Self::Dexterity,
        Self::Vitality,
        Self::UnusedStats,
        Self::UnusedSkills,
        Self::CurrentHp,
        Self::MaxHp,
        Self::CurrentMana,
        Self::MaxMana,
        Self::CurrentStamina,
        Self::MaxStamina,
        Self::Level,
        Self::Experience,
        Self::Gold,
        Self::StashedGold,
    ];

    pub fn from_raw(raw: u64) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn raw(self) -> u64 {
        Self::ALL.iter().position(|&a| a == self).unwrap() as u64
    }

    /// Stored value width in bits.
    pub fn bit_width(self) -> usize {
        match self {
            Self::Strength | Self::Energy | Self::Dexterity | Self::Vitality
            | Self::UnusedStats => 10,
            Self::UnusedSkills => 8,
            Self::CurrentHp | Self::MaxHp | Self::CurrentMana | Self::MaxMana
            | Self::CurrentStamina | Self::MaxStamina => 21,
            Self::Level => 7,
            Self::Experience => 32,
            Self::Gold | Self::StashedGold => 25,
        }
    }

    /// The 21-bit vitals carry a fixed-point tail: the low byte counts
    /// quarter points in its top two bits.
    pub fn has_quarters(self) -> bool {
        self.bit_width() == 21
    }
}

pub type AttributeMap = BTreeMap<Attribute, u32>;

/// Split a 21-bit vital into (whole, quarters).
pub fn hms_split(value: u32) -> (u32, u32) {
    (value >> 8, (value >> 6) & 3)
}

pub fn hms_encode(whole: u32, quarters: u32) -> u32 {
    (whole << 8) | ((quarters & 3) << 6)
}

pub fn hms_to_string(value: u32) -> String {
    let (whole, quarters) = hms_split(value);
    if quarters > 0 {
        format!("{whole} {quarters}/4")
    } else {
        whole.to_string()
    }
}

fn attributes_start(save: &SaveBuffer) -> Result<usize, SaveError> {
    find_marker(save.bytes(), ATTRIBUTES_MARKER, HEADER_LEN)
        .map(|pos| pos + 2)
        .ok_or(SaveError::MalformedSection {
            section: "attributes",
            reason: "gf marker not found".to_string(),
        })
}

fn skills_start(save: &SaveBuffer) -> Result<usize, SaveError> {
    find_marker(save.bytes(), SKILLS_MARKER, HEADER_LEN)
        .map(|pos| pos + 2)
        .ok_or(SaveError::MalformedSection {
            section: "skills",
            reason: "if marker not found".to_string(),
        })
}

/// Decode the attribute stream into a map of non-zero attributes.
pub fn read_attributes(save: &SaveBuffer) -> Result<AttributeMap, SaveError> {
    let data = save.bytes();
    let start = attributes_start(save)?;
    let mut map = AttributeMap::new();
    let mut bit = start * 8;
    for _ in 0..Attribute::ALL.len() {
        if (bit + 9) > data.len() * 8 {
            return Err(SaveError::MalformedSection {
                section: "attributes",
                reason: "stream runs past the end of the buffer".to_string(),
            });
        }
        let key = read_field(data, bit, bit + 9)?;
        let Some(attr) = Attribute::from_raw(key) else {
            if key != ATTRIBUTE_SENTINEL {
                log::warn!("unsupported attribute id {key}, stopping attribute decode");
            }
            break;
        };
        bit += 9;
        let width = attr.bit_width();
        let value = read_field(data, bit, bit + width)?;
        bit += width;
        map.insert(attr, value as u32);
    }
    Ok(map)
}

/// Re-encode the attribute block between the `gf` and `if` markers.
///
/// Zero-valued entries are omitted, ids are written in canonical order and
/// the stream is closed with the sentinel. Writing `Level` also refreshes
/// the header-level byte so the selection screen stays in sync.
pub fn write_attributes(save: &mut SaveBuffer, map: &AttributeMap) -> Result<(), SaveError> {
    let start = attributes_start(save)?;
    let end = find_marker(save.bytes(), SKILLS_MARKER, start).ok_or(SaveError::MalformedSection {
        section: "skills",
        reason: "if marker not found behind the attribute block".to_string(),
    })?;

    let mut bits = Bits::new();
    for attr in Attribute::ALL {
        let Some(&value) = map.get(&attr) else {
            continue;
        };
        if value == 0 {
            continue;
        }
        if attr == Attribute::Level {
            save.set_header_level(value.min(99) as u8);
        }
        bits.push_value(attr.raw(), 9);
        bits.push_value(u64::from(value), attr.bit_width());
    }
    bits.push_value(ATTRIBUTE_SENTINEL, 9);
    let block = bits.to_bytes();

    let data = save.data_mut();
    data.splice(start..end, block);
    Ok(())
}

pub fn read_skills(save: &SaveBuffer) -> Result<[u8; SKILL_COUNT], SaveError> {
    let start = skills_start(save)?;
    let data = save.bytes();
    if data.len() < start + SKILL_COUNT {
        return Err(SaveError::MalformedSection {
            section: "skills",
            reason: "skill array runs past the end of the buffer".to_string(),
        });
    }
    let mut skills = [0u8; SKILL_COUNT];
    skills.copy_from_slice(&data[start..start + SKILL_COUNT]);
    Ok(skills)
}

pub fn write_skills(save: &mut SaveBuffer, skills: &[u8; SKILL_COUNT]) -> Result<(), SaveError> {
    let start = skills_start(save)?;
    if save.len() < start + SKILL_COUNT {
        return Err(SaveError::MalformedSection {
            section: "skills",
            reason: "skill array runs past the end of the buffer".to_string(),
        });
    }
    save.data_mut()[start..start + SKILL_COUNT].copy_from_slice(skills);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::synthetic_save;

    #[test]
    fn attribute_widths_match_the_wire_layout() {
        assert_eq!(Attribute::Strength.bit_width(), 10);
        assert_eq!(Attribute::UnusedSkills.bit_width(), 8);
        assert_eq!(Attribute::MaxHp.bit_width(), 21);
        assert_eq!(Attribute::Level.bit_width(), 7);
        assert_eq!(Attribute::Experience.bit_width(), 32);
        assert_eq!(Attribute::StashedGold.bit_width(), 25);
        assert!(Attribute::CurrentStamina.has_quarters());
        assert!(!Attribute::Gold.has_quarters());
    }

    #[test]
    fn hms_quarters_roundtrip() {
        let encoded = hms_encode(1200, 3);
        assert_eq!(hms_split(encoded), (1200, 3));
        assert_eq!(hms_to_string(encoded), "1200 3/4");
        assert_eq!(hms_to_string(hms_encode(55, 0)), "55");
    }

    #[test]
    fn attribute_stream_roundtrip() {
        let mut save = synthetic_save(&[]);
        let mut map = AttributeMap::new();
        map.insert(Attribute::Strength, 156);
        map.insert(Attribute::Vitality, 255);
        map.insert(Attribute::Level, 42);
        map.insert(Attribute::Experience, 250_161_148);
        map.insert(Attribute::MaxHp, hms_encode(1200, 1));
        map.insert(Attribute::Gold, 0);

        write_attributes(&mut save, &map).unwrap();
        let decoded = read_attributes(&save).unwrap();

        assert_eq!(decoded.get(&Attribute::Strength), Some(&156));
        assert_eq!(decoded.get(&Attribute::Vitality), Some(&255));
        assert_eq!(decoded.get(&Attribute::Level), Some(&42));
        assert_eq!(decoded.get(&Attribute::Experience), Some(&250_161_148));
        assert_eq!(decoded.get(&Attribute::MaxHp), Some(&hms_encode(1200, 1)));
        // Zero entries are dropped on encode.
        assert_eq!(decoded.get(&Attribute::Gold), None);
        // The header level byte follows the level attribute.
        assert_eq!(save.header_level(), 42);
    }

    #[test]
    fn rewriting_attributes_is_stable() {
        let mut save = synthetic_save(&[]);
        let mut map = AttributeMap::new();
        map.insert(Attribute::Strength, 30);
        map.insert(Attribute::UnusedSkills, 5);
        write_attributes(&mut save, &map).unwrap();
        let first = save.bytes().to_vec();

        let decoded = read_attributes(&save).unwrap();
        write_attributes(&mut save, &decoded).unwrap();
        assert_eq!(save.bytes(), first.as_slice());
    }

    #[test]
    fn skills_roundtrip() {
        let mut save = synthetic_save(&[]);
        let mut skills = [0u8; SKILL_COUNT];
        skills[0] = 20;
        skills[29] = 7;
        write_skills(&mut save, &skills).unwrap();
        assert_eq!(read_skills(&save).unwrap(), skills);
    }
}
