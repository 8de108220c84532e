//! Difficulty progression, waypoints, quests, mercenary state and the
//! attribute-level character operations. All of these are thin byte pokes
//! on top of the fixed header layout and the attribute stream.

use serde::{Deserialize, Serialize};

use crate::attributes::{
    Attribute, AttributeMap, SKILL_COUNT, hms_encode, hms_split, read_attributes, read_skills,
    write_attributes, write_skills,
};
use crate::error::SaveError;
use crate::save::SaveBuffer;

pub const WAYPOINT_COUNT: usize = 39;
pub const QUEST_COUNT: usize = 27;

/// Progression byte values; the two low bits repeat into bits 6..7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
    Normal,
    Nightmare,
    Hell,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Self::Normal, Self::Nightmare, Self::Hell];

    pub fn progression_value(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Nightmare => 5,
            Self::Hell => 10,
        }
    }

    fn waypoint_range(self) -> std::ops::Range<usize> {
        match self {
            Self::Normal => 643..648,
            Self::Nightmare => 667..672,
            Self::Hell => 691..696,
        }
    }

    fn quest_stride(self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Nightmare => 96,
            Self::Hell => 192,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Nightmare => "nightmare",
            Self::Hell => "hell",
        }
    }
}

/// Byte value unlocking the master rank beyond hell.
pub const PROGRESSION_MASTER: u8 = 15;

/// First quest byte offsets relative to the quest area at byte 345, one
/// entry per quest in act order.
const QUEST_OFFSETS: [usize; QUEST_COUNT] = [
    2, 4, 6, 8, 10, 12, // act 1
    18, 20, 22, 24, 26, 28, // act 2
    34, 36, 38, 40, 42, 44, // act 3
    50, 52, 54, // act 4
    70, 72, 74, 76, 78, 80, // act 5
];
const QUEST_AREA_START: usize = 345;
const QUEST_COMPLETE: u16 = 0x1001;

const MERC_DEAD_RANGE: std::ops::Range<usize> = 177..179;
const MERC_SEED_RANGE: std::ops::Range<usize> = 179..183;
const MERC_NAME_RANGE: std::ops::Range<usize> = 183..185;
const MERC_TYPE_RANGE: std::ops::Range<usize> = 185..187;
const MERC_EXPERIENCE_RANGE: std::ops::Range<usize> = 187..191;

/// "Travelled to act" flag offsets inside one difficulty's quest block,
/// relative to the block start behind the `Woo!` header.
const ACT_TRAVEL_OFFSETS: [usize; 5] = [14, 30, 46, 56, 64];
const QUEST_HEADER_MAGIC: &[u8] = b"Woo!";

impl SaveBuffer {
    /// Highest difficulty currently open for play.
    pub fn highest_open_difficulty(&self) -> Difficulty {
        match self.progression() {
            0..=4 => Difficulty::Normal,
            5..=9 => Difficulty::Nightmare,
            _ => Difficulty::Hell,
        }
    }

    pub fn waypoints(&self, difficulty: Difficulty) -> [bool; WAYPOINT_COUNT] {
        let range = difficulty.waypoint_range();
        let bytes = &self.bytes()[range];
        let mut out = [false; WAYPOINT_COUNT];
        for (index, slot) in out.iter_mut().enumerate() {
            *slot = (bytes[index / 8] >> (index % 8)) & 1 == 1;
        }
        out
    }

    /// Apply a waypoint pattern: `1` activates, `0` clears, anything else
    /// leaves the waypoint alone. Raises the accessible acts when a newly
    /// activated waypoint would otherwise be unreachable.
    pub fn set_waypoints(&mut self, difficulty: Difficulty, pattern: &str) -> Result<(), SaveError> {
        let mut waypoints = self.waypoints(difficulty);
        for (index, ch) in pattern.chars().take(WAYPOINT_COUNT).enumerate() {
            match ch {
                '0' => waypoints[index] = false,
                '1' => waypoints[index] = true,
                _ => {}
            }
        }

        let range = difficulty.waypoint_range();
        let mut bytes = [0u8; 5];
        for (index, &active) in waypoints.iter().enumerate() {
            if active {
                bytes[index / 8] |= 1 << (index % 8);
            }
        }
        self.data_mut()[range].copy_from_slice(&bytes);

        let needed = act_required_for_waypoints(&waypoints);
        if needed > self.highest_accessible_act(difficulty)? {
            self.set_highest_accessible_act(difficulty, needed)?;
        }
        Ok(())
    }

    pub fn quest_flags(&self, difficulty: Difficulty) -> [bool; QUEST_COUNT] {
        let mut out = [false; QUEST_COUNT];
        for (index, offset) in QUEST_OFFSETS.iter().enumerate() {
            let at = QUEST_AREA_START + difficulty.quest_stride() + offset;
            out[index] = self.bytes()[at] != 0 || self.bytes()[at + 1] != 0;
        }
        out
    }

    pub fn set_quest(
        &mut self,
        difficulty: Difficulty,
        quest: usize,
        complete: bool,
    ) -> Result<(), SaveError> {
        if quest >= QUEST_COUNT {
            return Err(SaveError::refused(
                format!("quest {quest}"),
                format!("only {QUEST_COUNT} quests exist"),
            ));
        }
        let at = QUEST_AREA_START + difficulty.quest_stride() + QUEST_OFFSETS[quest];
        let value = if complete { QUEST_COMPLETE } else { 0 };
        self.data_mut()[at..at + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Apply a quest pattern: `1` completes, `0` resets, anything else is
    /// left alone.
    pub fn set_quests(&mut self, difficulty: Difficulty, pattern: &str) -> Result<(), SaveError> {
        for (index, ch) in pattern.chars().take(QUEST_COUNT).enumerate() {
            match ch {
                '0' => self.set_quest(difficulty, index, false)?,
                '1' => self.set_quest(difficulty, index, true)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn quest_header_start(&self) -> Result<usize, SaveError> {
        let window = &self.bytes()[335..];
        window
            .windows(QUEST_HEADER_MAGIC.len())
            .position(|w| w == QUEST_HEADER_MAGIC)
            .map(|p| p + 335)
            .ok_or(SaveError::MalformedSection {
                section: "quests",
                reason: "quest header magic not found".to_string(),
            })
    }

    /// Number of acts (beyond act 1) this character has travelled to, read
    /// from the travel flags of the difficulty's quest block.
    pub fn highest_accessible_act(&self, difficulty: Difficulty) -> Result<u8, SaveError> {
        let base = self.quest_header_start()? + 10 + difficulty.quest_stride();
        let mut reached = 0u8;
        for offset in ACT_TRAVEL_OFFSETS {
            if self.bytes()[base + offset] & 1 == 1 {
                reached += 1;
            } else {
                break;
            }
        }
        Ok(reached)
    }

    pub fn set_highest_accessible_act(
        &mut self,
        difficulty: Difficulty,
        acts: u8,
    ) -> Result<(), SaveError> {
        let base = self.quest_header_start()? + 10 + difficulty.quest_stride();
        for &offset in ACT_TRAVEL_OFFSETS.iter().take(acts.min(5) as usize) {
            self.data_mut()[base + offset] |= 1;
        }
        Ok(())
    }

    pub fn mercenary(&self) -> MercenaryInfo {
        let u16_at = |range: std::ops::Range<usize>| {
            u16::from_le_bytes([self.bytes()[range.start], self.bytes()[range.start + 1]])
        };
        let u32_at = |range: std::ops::Range<usize>| {
            let b = &self.bytes()[range];
            u32::from_le_bytes([b[0], b[1], b[2], b[3]])
        };
        MercenaryInfo {
            dead: u16_at(MERC_DEAD_RANGE) > 0,
            seed: u32_at(MERC_SEED_RANGE),
            name_id: u16_at(MERC_NAME_RANGE),
            kind: u16_at(MERC_TYPE_RANGE),
            experience: u32_at(MERC_EXPERIENCE_RANGE),
        }
    }

    /// A non-zero seed is read as "this character has a mercenary".
    pub fn has_mercenary(&self) -> bool {
        self.mercenary().seed != 0
    }

    pub fn set_mercenary_dead(&mut self, dead: bool) {
        let value = u16::from(dead).to_le_bytes();
        self.data_mut()[MERC_DEAD_RANGE].copy_from_slice(&value);
    }

    /// Clear the dead flag and top up current hit points.
    pub fn revive(&mut self) -> Result<(), SaveError> {
        self.set_dead(false);
        let mut attributes = read_attributes(self)?;
        if let Some(&max_hp) = attributes.get(&Attribute::MaxHp) {
            attributes.insert(Attribute::CurrentHp, max_hp);
            write_attributes(self, &attributes)?;
        }
        Ok(())
    }

    /// Set one attribute; zero removes it from the stream.
    pub fn boost_attribute(&mut self, attribute: Attribute, value: u32) -> Result<(), SaveError> {
        let mut attributes = read_attributes(self)?;
        if value == 0 {
            attributes.remove(&attribute);
        } else {
            attributes.insert(attribute, value);
        }
        write_attributes(self, &attributes)
    }

    /// Return every spent attribute point to the unused pool, restoring
    /// the class starting values and shrinking the derived vitals.
    pub fn reset_attributes(&mut self) -> Result<u32, SaveError> {
        let class = self.class();
        let mut attributes = read_attributes(self)?;
        let starting = class.starting_attributes();

        let current = |map: &AttributeMap, attr: Attribute| map.get(&attr).copied().unwrap_or(0);
        let vitality_loss =
            i64::from(current(&attributes, Attribute::Vitality)) - i64::from(starting[3].1);
        let energy_loss =
            i64::from(current(&attributes, Attribute::Energy)) - i64::from(starting[1].1);

        let hp_effect = class.attribute_point_effect(Attribute::Vitality, vitality_loss);
        let mana_effect = class.attribute_point_effect(Attribute::Energy, energy_loss);
        for (attr, loss) in [
            (Attribute::MaxHp, hp_effect.max_hp),
            (Attribute::MaxStamina, hp_effect.max_stamina),
            (Attribute::MaxMana, mana_effect.max_mana),
        ] {
            let (whole, quarters) = hms_split(current(&attributes, attr));
            let mut whole = i64::from(whole) - loss.0;
            let mut quarters = i64::from(quarters) - loss.1;
            while quarters < 0 {
                quarters += 4;
                whole -= 1;
            }
            let whole = whole.max(1) as u32;
            attributes.insert(attr, hms_encode(whole, quarters as u32));
        }

        let mut returned = current(&attributes, Attribute::UnusedStats);
        for (attr, start_value) in starting {
            let spent = current(&attributes, attr).saturating_sub(start_value);
            returned += spent;
            attributes.insert(attr, start_value);
        }
        attributes.insert(Attribute::UnusedStats, returned);
        write_attributes(self, &attributes)?;
        Ok(returned)
    }

    /// Unlearn all skills, returning them as unused skill points.
    pub fn reset_skills(&mut self) -> Result<u32, SaveError> {
        let skills = read_skills(self)?;
        let returned: u32 = skills.iter().map(|&s| u32::from(s)).sum();
        write_skills(self, &[0u8; SKILL_COUNT])?;
        let mut attributes = read_attributes(self)?;
        let unused = attributes.get(&Attribute::UnusedSkills).copied().unwrap_or(0);
        attributes.insert(Attribute::UnusedSkills, unused + returned);
        write_attributes(self, &attributes)?;
        Ok(returned)
    }

    /// Open a higher difficulty, lifting level, experience and stashed
    /// gold to the preset floor and granting the stat and skill points of
    /// the gained levels.
    pub fn enable_difficulty(&mut self, preset: DifficultyPreset) -> Result<bool, SaveError> {
        if self.progression() >= preset.progression {
            log::info!("progression {} is already enabled", preset.progression);
            return Ok(false);
        }
        self.set_progression(preset.progression);

        let mut attributes = read_attributes(self)?;
        let level = attributes.get(&Attribute::Level).copied().unwrap_or(1);
        if level >= preset.level {
            return Ok(true);
        }
        let gained = preset.level - level;
        let unused_stats = attributes.get(&Attribute::UnusedStats).copied().unwrap_or(0);
        let unused_skills = attributes
            .get(&Attribute::UnusedSkills)
            .copied()
            .unwrap_or(0);
        attributes.insert(Attribute::UnusedStats, unused_stats + 5 * gained);
        attributes.insert(Attribute::UnusedSkills, unused_skills + gained);
        attributes.insert(Attribute::Level, preset.level);
        attributes.insert(Attribute::Experience, preset.experience);
        attributes.insert(Attribute::StashedGold, preset.stashed_gold);
        write_attributes(self, &attributes)?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MercenaryInfo {
    pub dead: bool,
    pub seed: u32,
    pub name_id: u16,
    pub kind: u16,
    pub experience: u32,
}

/// Level/experience/gold floors for opening each difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifficultyPreset {
    pub progression: u8,
    pub level: u32,
    pub experience: u32,
    pub stashed_gold: u32,
}

impl DifficultyPreset {
    pub const NIGHTMARE: Self = Self {
        progression: 5,
        level: 38,
        experience: 14_641_810,
        stashed_gold: 1_000_000,
    };

    pub const HELL: Self = Self {
        progression: 10,
        level: 68,
        experience: 250_161_148,
        stashed_gold: 1_750_000,
    };

    /// Victor of hell, one step short of the level cap.
    pub const NIRVANA: Self = Self {
        progression: PROGRESSION_MASTER,
        level: 86,
        experience: 1_196_977_515,
        stashed_gold: 2_200_000,
    };
}

/// Minimum act count needed so every active waypoint stays reachable.
fn act_required_for_waypoints(waypoints: &[bool; WAYPOINT_COUNT]) -> u8 {
    if waypoints[30..39].iter().any(|&w| w) {
        4
    } else if waypoints[27..30].iter().any(|&w| w) {
        3
    } else if waypoints[18..27].iter().any(|&w| w) {
        2
    } else if waypoints[9..18].iter().any(|&w| w) {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::synthetic_save;

    #[test]
    fn waypoints_roundtrip_and_raise_acts() {
        let mut save = synthetic_save(&[]);
        assert_eq!(save.waypoints(Difficulty::Normal), [false; WAYPOINT_COUNT]);

        let mut pattern = String::from("1........1");
        pattern.push_str(&".".repeat(29));
        save.set_waypoints(Difficulty::Normal, &pattern).unwrap();

        let waypoints = save.waypoints(Difficulty::Normal);
        assert!(waypoints[0]);
        assert!(waypoints[9]);
        assert!(!waypoints[1]);
        // Waypoint 9 lives in act 2.
        assert_eq!(save.highest_accessible_act(Difficulty::Normal).unwrap(), 1);

        // Other difficulties are untouched.
        assert_eq!(save.waypoints(Difficulty::Hell), [false; WAYPOINT_COUNT]);
    }

    #[test]
    fn quests_roundtrip() {
        let mut save = synthetic_save(&[]);
        save.set_quest(Difficulty::Nightmare, 0, true).unwrap();
        save.set_quest(Difficulty::Nightmare, 26, true).unwrap();
        let flags = save.quest_flags(Difficulty::Nightmare);
        assert!(flags[0]);
        assert!(flags[26]);
        assert!(!flags[1]);
        assert_eq!(save.quest_flags(Difficulty::Normal), [false; QUEST_COUNT]);

        save.set_quest(Difficulty::Nightmare, 0, false).unwrap();
        assert!(!save.quest_flags(Difficulty::Nightmare)[0]);
        assert!(save.set_quest(Difficulty::Normal, 27, true).is_err());
    }

    #[test]
    fn mercenary_state() {
        let mut save = synthetic_save(&[]);
        assert!(!save.has_mercenary());
        save.set_mercenary_dead(true);
        assert!(save.mercenary().dead);
        save.set_mercenary_dead(false);
        assert!(!save.mercenary().dead);
    }

    #[test]
    fn difficulty_presets_grant_points() {
        let mut save = synthetic_save(&[]);
        let mut attributes = AttributeMap::new();
        attributes.insert(Attribute::Level, 20);
        attributes.insert(Attribute::UnusedStats, 3);
        write_attributes(&mut save, &attributes).unwrap();

        assert!(save.enable_difficulty(DifficultyPreset::NIGHTMARE).unwrap());
        let after = read_attributes(&save).unwrap();
        assert_eq!(after.get(&Attribute::Level), Some(&38));
        assert_eq!(after.get(&Attribute::UnusedStats), Some(&(3 + 5 * 18)));
        assert_eq!(after.get(&Attribute::UnusedSkills), Some(&18));
        assert_eq!(save.progression(), 5);
        assert_eq!(save.highest_open_difficulty(), Difficulty::Nightmare);

        // Already enabled: no further changes.
        assert!(!save.enable_difficulty(DifficultyPreset::NIGHTMARE).unwrap());
    }

    #[test]
    fn revive_heals_to_max() {
        let mut save = synthetic_save(&[]);
        let mut attributes = AttributeMap::new();
        attributes.insert(Attribute::MaxHp, hms_encode(300, 0));
        attributes.insert(Attribute::CurrentHp, hms_encode(5, 0));
        write_attributes(&mut save, &attributes).unwrap();
        save.set_dead(true);

        save.revive().unwrap();
        assert!(!save.is_dead());
        let after = read_attributes(&save).unwrap();
        assert_eq!(
            after.get(&Attribute::CurrentHp),
            after.get(&Attribute::MaxHp)
        );
    }

    #[test]
    fn skill_reset_returns_points() {
        let mut save = synthetic_save(&[]);
        let mut skills = [0u8; SKILL_COUNT];
        skills[3] = 5;
        skills[17] = 2;
        write_skills(&mut save, &skills).unwrap();

        let returned = save.reset_skills().unwrap();
        assert_eq!(returned, 7);
        assert_eq!(read_skills(&save).unwrap(), [0u8; SKILL_COUNT]);
        let attributes = read_attributes(&save).unwrap();
        assert_eq!(attributes.get(&Attribute::UnusedSkills), Some(&7));
    }

    #[test]
    fn attribute_reset_restores_class_start() {
        let mut save = synthetic_save(&[]);
        // Sorceress starts at 10/35/25/10.
        let mut attributes = AttributeMap::new();
        attributes.insert(Attribute::Strength, 30);
        attributes.insert(Attribute::Energy, 40);
        attributes.insert(Attribute::Dexterity, 25);
        attributes.insert(Attribute::Vitality, 20);
        attributes.insert(Attribute::MaxHp, hms_encode(100, 0));
        attributes.insert(Attribute::MaxMana, hms_encode(80, 0));
        attributes.insert(Attribute::MaxStamina, hms_encode(90, 0));
        write_attributes(&mut save, &attributes).unwrap();

        let returned = save.reset_attributes().unwrap();
        // 20 + 5 + 0 + 10 points had been spent.
        assert_eq!(returned, 35);
        let after = read_attributes(&save).unwrap();
        assert_eq!(after.get(&Attribute::Strength), Some(&10));
        assert_eq!(after.get(&Attribute::Energy), Some(&35));
        assert_eq!(after.get(&Attribute::Vitality), Some(&10));
        assert_eq!(after.get(&Attribute::UnusedStats), Some(&35));
        // 10 vitality points worth of HP are gone: 100 - 20 = 80.
        assert_eq!(after.get(&Attribute::MaxHp), Some(&hms_encode(80, 0)));
    }
}
