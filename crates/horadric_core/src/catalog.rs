//! Item family catalog loaded from tabular resources.
//!
//! `item_codes.tsv` groups 3-letter type codes into families under class
//! headers, ordered along the grade ladder (normal, exceptional, elite and,
//! for circlets, post-elite). `armor_weapons.tsv` maps codes to base
//! durability and armor-class range. Both ship as builtins and can be
//! overridden from disk; a malformed row is skipped, never fatal.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SaveError;

/// 3-letter lowercase item type code as stored in the item's core bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeCode([u8; 3]);

impl TypeCode {
    pub fn new(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    pub fn parse(code: &str) -> Option<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii) {
            return None;
        }
        Some(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn bytes(&self) -> [u8; 3] {
        self.0
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeCode({})", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemClass {
    Other,
    Helm,
    BodyArmor,
    Shields,
    Gloves,
    Boots,
    Belts,
    DruidPelts,
    BarbarianHelms,
    PaladinShields,
    ShrunkenHeads,
    Circlets,
    Axes,
    Maces,
    Swords,
    Daggers,
    Throwing,
    Javelins,
    ThrowingPotions,
    Spears,
    Polearms,
    Bows,
    Crossbows,
    Staves,
    Wands,
    Scepters,
    AssassinKatars,
    SorceressOrbs,
    AmazonWeapons,
    QuestItems,
    Gems,
    Runes,
    Potions,
    Charms,
    Scrolls,
    Tomes,
    Misc,
}

impl ItemClass {
    fn from_header(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "other" => Self::Other,
            "helm" => Self::Helm,
            "body_armor" => Self::BodyArmor,
            "shields" => Self::Shields,
            "gloves" => Self::Gloves,
            "boots" => Self::Boots,
            "belts" => Self::Belts,
            "druid_pelts" => Self::DruidPelts,
            "barbarian_helms" => Self::BarbarianHelms,
            "paladin_shields" => Self::PaladinShields,
            "shrunken_heads" => Self::ShrunkenHeads,
            "circlets" => Self::Circlets,
            "axes" => Self::Axes,
            "maces" => Self::Maces,
            "swords" => Self::Swords,
            "daggers" => Self::Daggers,
            "throwing" => Self::Throwing,
            "javelins" => Self::Javelins,
            "throwing_potions" => Self::ThrowingPotions,
            "spears" => Self::Spears,
            "polearms" => Self::Polearms,
            "bows" => Self::Bows,
            "crossbows" => Self::Crossbows,
            "staves" => Self::Staves,
            "wands" => Self::Wands,
            "scepters" => Self::Scepters,
            "assassin_katars" => Self::AssassinKatars,
            "sorceress_orbs" => Self::SorceressOrbs,
            "amazon_weapons" => Self::AmazonWeapons,
            "quest_items" => Self::QuestItems,
            "gems" => Self::Gems,
            "runes" => Self::Runes,
            "potions" => Self::Potions,
            "charms" => Self::Charms,
            "scrolls" => Self::Scrolls,
            "tomes" => Self::Tomes,
            "misc" => Self::Misc,
            _ => return None,
        })
    }

    /// (rows, cols) an item of this class typically occupies, preferring
    /// large sizes; `item_codes.tsv` may carry a per-family correction.
    pub fn default_volume(self) -> (u8, u8) {
        match self {
            Self::Other
            | Self::Scrolls
            | Self::ThrowingPotions
            | Self::Potions
            | Self::Runes
            | Self::Gems => (1, 1),
            Self::Belts => (1, 2),
            Self::Throwing | Self::Wands | Self::SorceressOrbs | Self::Tomes => (2, 1),
            Self::Helm
            | Self::Gloves
            | Self::Boots
            | Self::DruidPelts
            | Self::BarbarianHelms
            | Self::ShrunkenHeads
            | Self::Circlets => (2, 2),
            Self::Daggers | Self::Javelins | Self::AssassinKatars | Self::Charms => (3, 1),
            Self::BodyArmor | Self::Scepters | Self::Misc => (3, 2),
            Self::Shields
            | Self::PaladinShields
            | Self::Axes
            | Self::Maces
            | Self::Swords
            | Self::Spears
            | Self::Polearms
            | Self::Bows
            | Self::Crossbows
            | Self::Staves
            | Self::AmazonWeapons
            | Self::QuestItems => (4, 2),
        }
    }

    pub fn is_armor(self) -> bool {
        matches!(
            self,
            Self::Helm
                | Self::BodyArmor
                | Self::Shields
                | Self::Gloves
                | Self::Boots
                | Self::Belts
                | Self::DruidPelts
                | Self::BarbarianHelms
                | Self::PaladinShields
                | Self::ShrunkenHeads
                | Self::Circlets
        )
    }

    pub fn is_weapon(self) -> bool {
        matches!(
            self,
            Self::Axes
                | Self::Maces
                | Self::Swords
                | Self::Daggers
                | Self::Throwing
                | Self::Javelins
                | Self::ThrowingPotions
                | Self::Spears
                | Self::Polearms
                | Self::Bows
                | Self::Crossbows
                | Self::Staves
                | Self::Wands
                | Self::Scepters
                | Self::AssassinKatars
                | Self::SorceressOrbs
                | Self::AmazonWeapons
        )
    }

    pub fn is_stack(self) -> bool {
        matches!(self, Self::Throwing | Self::Javelins | Self::ThrowingPotions)
    }

    pub fn is_socketable(self) -> bool {
        matches!(
            self,
            Self::Helm
                | Self::BodyArmor
                | Self::Shields
                | Self::PaladinShields
                | Self::DruidPelts
                | Self::BarbarianHelms
                | Self::ShrunkenHeads
                | Self::Circlets
                | Self::Axes
                | Self::Maces
                | Self::Swords
                | Self::Daggers
                | Self::Spears
                | Self::Polearms
                | Self::Bows
                | Self::Crossbows
                | Self::Staves
                | Self::Wands
                | Self::Scepters
                | Self::AssassinKatars
                | Self::SorceressOrbs
                | Self::AmazonWeapons
        )
    }
}

/// Grade along a family's code ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemGrade {
    Normal,
    Exceptional,
    Elite,
    /// Exclusively for circlets.
    PostElite,
}

impl ItemGrade {
    pub fn from_position(position: usize) -> Option<Self> {
        match position {
            0 => Some(Self::Normal),
            1 => Some(Self::Exceptional),
            2 => Some(Self::Elite),
            3 => Some(Self::PostElite),
            _ => None,
        }
    }

    pub fn position(self) -> usize {
        match self {
            Self::Normal => 0,
            Self::Exceptional => 1,
            Self::Elite => 2,
            Self::PostElite => 3,
        }
    }
}

/// Quest weapons whose class alone does not reveal them as weapons.
const QUEST_WEAPON_CODES: [&str; 8] = ["leg", "hdm", "msf", "hst", "g33", "qf1", "qf2", "hfh"];

#[derive(Debug, Clone)]
pub struct ItemFamily {
    pub class: ItemClass,
    /// Code/name pairs ordered along the grade ladder.
    pub codes: Vec<(TypeCode, String)>,
    rows: Option<u8>,
    cols: Option<u8>,
}

impl ItemFamily {
    pub fn volume(&self) -> (u8, u8) {
        let (rows, cols) = self.class.default_volume();
        (self.rows.unwrap_or(rows), self.cols.unwrap_or(cols))
    }

    pub fn is_weapon(&self) -> bool {
        if self
            .codes
            .iter()
            .any(|(code, _)| QUEST_WEAPON_CODES.contains(&code.as_str()))
        {
            return true;
        }
        self.class.is_weapon()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmorStats {
    pub durability: u32,
    pub ac_min: u32,
    pub ac_max: u32,
}

/// Immutable lookup context built once at startup and passed to the codecs.
#[derive(Debug, Clone)]
pub struct Catalog {
    families: Vec<ItemFamily>,
    armor: BTreeMap<TypeCode, ArmorStats>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self::from_tsv(
            include_str!("../data/item_codes.tsv"),
            include_str!("../data/armor_weapons.tsv"),
        )
    }

    pub fn load_dir(dir: &Path) -> Result<Self, SaveError> {
        let items = fs::read_to_string(dir.join("item_codes.tsv"))
            .map_err(|e| SaveError::io(format!("failed to read item_codes.tsv: {e}")))?;
        let armor = fs::read_to_string(dir.join("armor_weapons.tsv"))
            .map_err(|e| SaveError::io(format!("failed to read armor_weapons.tsv: {e}")))?;
        Ok(Self::from_tsv(&items, &armor))
    }

    pub fn from_tsv(item_codes: &str, armor_weapons: &str) -> Self {
        Self {
            families: parse_item_codes(item_codes),
            armor: parse_armor_weapons(armor_weapons),
        }
    }

    pub fn family(&self, code: TypeCode) -> Option<&ItemFamily> {
        self.families
            .iter()
            .find(|family| family.codes.iter().any(|(c, _)| *c == code))
    }

    pub fn name(&self, code: TypeCode) -> Option<&str> {
        self.family(code)?
            .codes
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| name.as_str())
    }

    pub fn class(&self, code: TypeCode) -> Option<ItemClass> {
        self.family(code).map(|family| family.class)
    }

    pub fn grade(&self, code: TypeCode) -> Option<ItemGrade> {
        let family = self.family(code)?;
        let position = family.codes.iter().position(|(c, _)| *c == code)?;
        ItemGrade::from_position(position)
    }

    /// The code in the same family matching the requested grade.
    pub fn sibling_for_grade(&self, code: TypeCode, grade: ItemGrade) -> Option<TypeCode> {
        self.family(code)?
            .codes
            .get(grade.position())
            .map(|(c, _)| *c)
    }

    pub fn volume(&self, code: TypeCode) -> Option<(u8, u8)> {
        self.family(code).map(ItemFamily::volume)
    }

    pub fn is_armor(&self, code: TypeCode) -> bool {
        self.class(code).is_some_and(ItemClass::is_armor)
    }

    pub fn is_weapon(&self, code: TypeCode) -> bool {
        self.family(code).is_some_and(ItemFamily::is_weapon)
    }

    pub fn is_stack(&self, code: TypeCode) -> bool {
        self.class(code).is_some_and(ItemClass::is_stack)
    }

    pub fn is_socketable(&self, code: TypeCode) -> bool {
        self.class(code).is_some_and(ItemClass::is_socketable)
    }

    pub fn armor_stats(&self, code: TypeCode) -> Option<ArmorStats> {
        self.armor.get(&code).copied()
    }

    pub fn family_count(&self) -> usize {
        self.families.len()
    }
}

fn parse_item_codes(contents: &str) -> Vec<ItemFamily> {
    let mut families = Vec::new();
    let mut current_class = ItemClass::Other;

    for line in contents.lines() {
        let line = line.trim_end_matches('\n');
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        // A trailing "; rows cols" extension overrides the class volume.
        let (line, extension) = match line.split_once(';') {
            Some((head, ext)) => (head.trim_end(), Some(ext)),
            None => (line, None),
        };

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() == 1 {
            match ItemClass::from_header(fields[0].trim()) {
                Some(class) => current_class = class,
                None => log::warn!("unknown item class header '{}'", fields[0].trim()),
            }
            continue;
        }
        if fields.len() % 2 != 0 {
            log::warn!("ignoring item code line with odd field count: {line:?}");
            continue;
        }

        let mut codes = Vec::with_capacity(fields.len() / 2);
        let mut valid = true;
        for pair in fields.chunks(2) {
            let name = pair[0].trim();
            match TypeCode::parse(pair[1].trim()) {
                Some(code) => codes.push((code, name.to_string())),
                None => {
                    log::warn!("invalid type code '{}' in item code line", pair[1].trim());
                    valid = false;
                }
            }
        }
        if !valid || codes.is_empty() {
            continue;
        }

        let (rows, cols) = match extension {
            Some(ext) => {
                let mut numbers = ext
                    .split_whitespace()
                    .filter_map(|v| v.parse::<u8>().ok());
                (numbers.next(), numbers.next())
            }
            None => (None, None),
        };

        families.push(ItemFamily {
            class: current_class,
            codes,
            rows,
            cols,
        });
    }
    families
}

fn parse_armor_weapons(contents: &str) -> BTreeMap<TypeCode, ArmorStats> {
    let mut out = BTreeMap::new();
    for line in contents.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 4 {
            continue;
        }
        let Some(code) = TypeCode::parse(fields[0].trim()) else {
            continue;
        };
        let parsed: Option<(u32, u32, u32)> = (|| {
            Some((
                fields[1].trim().parse().ok()?,
                fields[2].trim().parse().ok()?,
                fields[3].trim().parse().ok()?,
            ))
        })();
        let Some((durability, ac_min, ac_max)) = parsed else {
            log::warn!("invalid armor/weapon stat line: {line:?}");
            continue;
        };
        out.insert(
            code,
            ArmorStats {
                durability,
                ac_min,
                ac_max,
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> TypeCode {
        TypeCode::parse(s).unwrap()
    }

    #[test]
    fn builtin_catalog_resolves_known_codes() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.name(code("r01")), Some("El Rune"));
        assert_eq!(catalog.class(code("box")), Some(ItemClass::QuestItems));
        assert_eq!(catalog.volume(code("box")), Some((2, 2)));
        assert_eq!(catalog.class(code("jew")), Some(ItemClass::Misc));
        assert_eq!(catalog.volume(code("jew")), Some((1, 1)));
        assert!(catalog.is_weapon(code("ssd")));
        assert!(!catalog.is_armor(code("ssd")));
        assert!(catalog.is_armor(code("qui")));
        assert!(catalog.is_stack(code("jav")));
    }

    #[test]
    fn grade_ladder_walks_the_family() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.grade(code("ssd")), Some(ItemGrade::Normal));
        assert_eq!(catalog.grade(code("9ss")), Some(ItemGrade::Exceptional));
        assert_eq!(
            catalog.sibling_for_grade(code("ssd"), ItemGrade::Elite),
            Some(code("7ss"))
        );
        assert_eq!(
            catalog.sibling_for_grade(code("7ss"), ItemGrade::Normal),
            Some(code("ssd"))
        );
    }

    #[test]
    fn quest_weapons_count_as_weapons() {
        let catalog = Catalog::builtin();
        assert!(catalog.is_weapon(code("leg")));
        assert_eq!(catalog.class(code("leg")), Some(ItemClass::QuestItems));
    }

    #[test]
    fn volume_override_from_extension() {
        let tsv = "swords\nTest Blade\tzz1\t; 1 1\n";
        let catalog = Catalog::from_tsv(tsv, "");
        assert_eq!(catalog.volume(code("zz1")), Some((1, 1)));
        assert!(catalog.is_socketable(code("zz1")));
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let tsv = "helm\nBroken\nCap\tcap\n";
        let catalog = Catalog::from_tsv(tsv, "cap\t12\tx\t5\n");
        assert_eq!(catalog.name(code("cap")), Some("Cap"));
        assert!(catalog.armor_stats(code("cap")).is_none());
    }

    #[test]
    fn armor_stats_lookup() {
        let catalog = Catalog::builtin();
        let stats = catalog.armor_stats(code("qui")).unwrap();
        assert!(stats.ac_max >= stats.ac_min);
        assert!(stats.durability > 0);
    }
}
