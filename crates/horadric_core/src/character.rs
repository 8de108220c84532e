use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attributes::Attribute;

/// Character class, byte 40 of the main header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Class {
    Amazon,
    Sorceress,
    Necromancer,
    Paladin,
    Barbarian,
    Druid,
    Assassin,
    Unspecified(u8),
}

impl Class {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Amazon,
            1 => Self::Sorceress,
            2 => Self::Necromancer,
            3 => Self::Paladin,
            4 => Self::Barbarian,
            5 => Self::Druid,
            6 => Self::Assassin,
            other => {
                log::warn!("unknown character class code {other}");
                Self::Unspecified(other)
            }
        }
    }

    pub fn raw(&self) -> u8 {
        match *self {
            Self::Amazon => 0,
            Self::Sorceress => 1,
            Self::Necromancer => 2,
            Self::Paladin => 3,
            Self::Barbarian => 4,
            Self::Druid => 5,
            Self::Assassin => 6,
            Self::Unspecified(other) => other,
        }
    }

    pub fn is_female(&self) -> bool {
        matches!(self, Self::Amazon | Self::Sorceress | Self::Assassin)
    }

    /// Core attribute values a freshly rolled character of this class
    /// starts with. HP, mana and stamina are derived, not listed.
    pub fn starting_attributes(&self) -> [(Attribute, u32); 4] {
        let (strength, energy, dexterity, vitality) = match *self {
            Self::Amazon => (20, 15, 25, 20),
            Self::Sorceress => (10, 35, 25, 10),
            Self::Necromancer => (15, 25, 25, 15),
            Self::Paladin => (25, 15, 20, 25),
            Self::Barbarian => (30, 10, 20, 25),
            Self::Druid => (15, 20, 20, 25),
            Self::Assassin | Self::Unspecified(_) => (20, 25, 20, 20),
        };
        [
            (Attribute::Strength, strength),
            (Attribute::Energy, energy),
            (Attribute::Dexterity, dexterity),
            (Attribute::Vitality, vitality),
        ]
    }

    /// Delta on max HP, max mana and max stamina of spending `n` points
    /// into `attr`, in (whole, quarters) pairs.
    pub fn attribute_point_effect(&self, attr: Attribute, n: i64) -> PointEffect {
        let mut effect = PointEffect::default();
        match *self {
            Self::Amazon | Self::Paladin => match attr {
                Attribute::Vitality => {
                    effect.max_hp = (3 * n, 0);
                    effect.max_stamina = (n, 0);
                }
                Attribute::Energy => effect.max_mana = split_quarters(6 * n),
                _ => {}
            },
            Self::Sorceress | Self::Necromancer | Self::Druid => match attr {
                Attribute::Vitality => {
                    effect.max_hp = (2 * n, 0);
                    effect.max_stamina = (n, 0);
                }
                Attribute::Energy => effect.max_mana = (2 * n, 0),
                _ => {}
            },
            Self::Barbarian => match attr {
                Attribute::Vitality => {
                    effect.max_hp = (4 * n, 0);
                    effect.max_stamina = (n, 0);
                }
                Attribute::Energy => effect.max_mana = (n, 0),
                _ => {}
            },
            Self::Assassin => match attr {
                Attribute::Vitality => {
                    effect.max_hp = (3 * n, 0);
                    effect.max_stamina = split_quarters(5 * n);
                }
                Attribute::Energy => effect.max_mana = split_quarters(7 * n),
                _ => {}
            },
            Self::Unspecified(_) => {}
        }
        effect
    }

    pub fn skill_names(&self) -> Option<&'static [&'static str; 30]> {
        match *self {
            Self::Amazon => Some(&AMAZON_SKILLS),
            Self::Sorceress => Some(&SORCERESS_SKILLS),
            Self::Necromancer => Some(&NECROMANCER_SKILLS),
            Self::Paladin => Some(&PALADIN_SKILLS),
            Self::Barbarian => Some(&BARBARIAN_SKILLS),
            Self::Druid => Some(&DRUID_SKILLS),
            Self::Assassin => Some(&ASSASSIN_SKILLS),
            Self::Unspecified(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Amazon => "Amazon",
            Self::Sorceress => "Sorceress",
            Self::Necromancer => "Necromancer",
            Self::Paladin => "Paladin",
            Self::Barbarian => "Barbarian",
            Self::Druid => "Druid",
            Self::Assassin => "Assassin",
            Self::Unspecified(_) => "Unspecified",
        }
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Unspecified(raw) => write!(f, "Unspecified ({raw})"),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Effect of attribute points in (whole, quarters) pairs; quarters encode
/// the format's 0/4..3/4 fixed-point tail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointEffect {
    pub max_hp: (i64, i64),
    pub max_mana: (i64, i64),
    pub max_stamina: (i64, i64),
}

fn split_quarters(quarters_total: i64) -> (i64, i64) {
    (quarters_total.div_euclid(4), quarters_total.rem_euclid(4))
}

/// Rank title earned by progression, used for status lines.
pub fn rank_title(progression: u8, hardcore: bool, female: bool) -> Option<&'static str> {
    match progression {
        0..=4 => None,
        5..=9 => Some(if hardcore { "Destroyer" } else { "Slayer" }),
        10..=14 => Some(if hardcore { "Conqueror" } else { "Champion" }),
        _ => Some(if hardcore {
            "Guardian"
        } else if female {
            "Matriarch"
        } else {
            "Patriarch"
        }),
    }
}

/// Resolve a skill id from the shared skill numbering to its display name.
/// Class skill blocks start at fixed offsets (Skills.txt numbering).
pub fn skill_name(id: u32) -> Option<&'static str> {
    let (table, offset): (&[&str; 30], u32) = match id {
        6..=35 => (&AMAZON_SKILLS, 6),
        36..=65 => (&SORCERESS_SKILLS, 36),
        66..=95 => (&NECROMANCER_SKILLS, 66),
        96..=125 => (&PALADIN_SKILLS, 96),
        126..=155 => (&BARBARIAN_SKILLS, 126),
        221..=250 => (&DRUID_SKILLS, 221),
        251..=280 => (&ASSASSIN_SKILLS, 251),
        _ => return None,
    };
    Some(table[(id - offset) as usize])
}

pub const AMAZON_SKILLS: [&str; 30] = [
    "Magic Arrow", "Fire Arrow", "Inner Sight", "Critical Strike", "Jab",
    "Cold Arrow", "Multiple Shot", "Dodge", "Power Strike", "Poison Javelin",
    "Exploding Arrow", "Slow Missiles", "Avoid", "Impale", "Lightning Bolt",
    "Ice Arrow", "Guided Arrow", "Penetrate", "Charged Strike", "Plague Javelin",
    "Strafe", "Immolation Arrow", "Decoy", "Evade", "Fend",
    "Freezing Arrow", "Valkyrie", "Pierce", "Lightning Strike", "Lightning Fury",
];

pub const SORCERESS_SKILLS: [&str; 30] = [
    "Fire Bolt", "Warmth", "Charged Bolt", "Ice Bolt", "Frozen Armor",
    "Inferno", "Static Field", "Telekinesis", "Frost Nova", "Ice Blast",
    "Blaze", "Fireball", "Nova", "Lightning", "Shiver Armor",
    "Fire Wall", "Enchant", "Chain Lightning", "Teleport", "Glacial Spike",
    "Meteor", "Thunder Storm", "Energy Shield", "Blizzard", "Chilling Armor",
    "Fire Mastery", "Hydra", "Lightning Mastery", "Frozen Orb", "Cold Mastery",
];

pub const NECROMANCER_SKILLS: [&str; 30] = [
    "Amplify Damage", "Teeth", "Bone Armor", "Skeleton Mastery", "Raise Skeleton",
    "Dim Vision", "Weaken", "Poison Dagger", "Corpse Explosion", "Clay Golem",
    "Iron Maiden", "Terror", "Bone Wall", "Golem Mastery", "Skeletal Mage",
    "Confuse", "Life Tap", "Poison Explosion", "Bone Spear", "Blood Golem",
    "Attract", "Decrepify", "Bone Prison", "Summon Resist", "Iron Golem",
    "Lower Resist", "Poison Nova", "Bone Spirit", "Fire Golem", "Revive",
];

pub const PALADIN_SKILLS: [&str; 30] = [
    "Sacrifice", "Smite", "Might", "Prayer", "Resist Fire",
    "Holy Bolt", "Thorns", "Holy Fire", "Defiance", "Resist Cold",
    "Zeal", "Charge", "Blessed Aim", "Cleansing", "Resist Lightning",
    "Vengeance", "Blessed Hammer", "Concentration", "Holy Freeze", "Vigor",
    "Conversion", "Holy Shield", "Holy Shock", "Sanctuary", "Meditation",
    "Fist of the Heavens", "Fanaticism", "Conviction", "Redemption", "Salvation",
];

pub const BARBARIAN_SKILLS: [&str; 30] = [
    "Bash", "Sword Mastery", "Axe Mastery", "Mace Mastery", "Howl",
    "Find Potion", "Leap", "Double Swing", "Polearm Mastery", "Throwing Mastery",
    "Spear Mastery", "Taunt", "Shout", "Stun", "Double Throw",
    "Increased Stamina", "Find Item", "Leap Attack", "Concentrate", "Iron Skin",
    "Battle Cry", "Frenzy", "Increased Speed", "Battle Orders", "Grim Ward",
    "Whirlwind", "Berserk", "Natural Resistance", "War Cry", "Battle Command",
];

pub const DRUID_SKILLS: [&str; 30] = [
    "Raven", "Poison Creeper", "Werewolf", "Lycanthropy", "Firestorm",
    "Oak Sage", "Summon Spirit Wolf", "Werebear", "Molten Boulder", "Arctic Blast",
    "Carrion Wine", "Feral Rage", "Maul", "Fissure", "Cyclone Armor",
    "Heart of Wolverine", "Summon Dire Wolf", "Rabies", "Fire Claws", "Twister",
    "Solar Creeper", "Hunger", "Shockwave", "Volcano", "Tornado",
    "Spirit of Barbs", "Summon Grizzly", "Fury", "Armageddon", "Hurricane",
];

pub const ASSASSIN_SKILLS: [&str; 30] = [
    "Fire Blast", "Claw Mastery", "Psychic Hammer", "Tiger Strike", "Dragon Talon",
    "Shock Web", "Blade Sentinel", "Burst of Speed", "Fists of Fire", "Dragon Claw",
    "Charged Bolt Sentry", "Wake of Fire", "Weapon Block", "Cloak of Shadows", "Cobra Strike",
    "Blade Fury", "Fade", "Shadow Warrior", "Claws of Thunder", "Dragon Tail",
    "Lightning Sentry", "Wake of Inferno", "Mind Blast", "Blades of Ice", "Dragon Flight",
    "Death Sentry", "Blade Shield", "Venom", "Shadow Master", "Phoenix Strike",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_roundtrip_and_coercion() {
        assert_eq!(Class::from_raw(3), Class::Paladin);
        assert_eq!(Class::from_raw(3).raw(), 3);
        assert_eq!(Class::from_raw(9), Class::Unspecified(9));
        assert_eq!(Class::from_raw(9).raw(), 9);
    }

    #[test]
    fn skill_names_resolve_per_class_block() {
        assert_eq!(skill_name(54), Some("Teleport"));
        assert_eq!(skill_name(6), Some("Magic Arrow"));
        assert_eq!(skill_name(280), Some("Phoenix Strike"));
        assert_eq!(skill_name(300), None);
    }

    #[test]
    fn quarter_effects() {
        let effect = Class::Assassin.attribute_point_effect(Attribute::Energy, 2);
        assert_eq!(effect.max_mana, (3, 2));
        let effect = Class::Barbarian.attribute_point_effect(Attribute::Vitality, 1);
        assert_eq!(effect.max_hp, (4, 0));
    }

    #[test]
    fn rank_titles_follow_progression() {
        assert_eq!(rank_title(0, false, false), None);
        assert_eq!(rank_title(5, true, false), Some("Destroyer"));
        assert_eq!(rank_title(15, false, true), Some("Matriarch"));
    }
}
