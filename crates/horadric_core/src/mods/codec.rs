use std::ops::Range;

use serde::Serialize;

use crate::bitfield::Bits;
use crate::character::skill_name;

use super::table::{FieldTemplate, ModTable, Relation, TemplateKind};
use super::MOD_SENTINEL;

/// Decoded value of one modification field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ModValue {
    Int(i64),
    Fixed(f64),
    Skill(u32),
}

impl ModValue {
    fn render(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Fixed(v) => format!("{v}"),
            Self::Skill(id) => skill_name(*id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("unknown skill ({id})")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModField {
    pub template: FieldTemplate,
    /// Bit range within the decoded run.
    pub range: Range<usize>,
    pub raw: u64,
    pub value: ModValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModificationEntry {
    pub id: u16,
    pub name: String,
    pub range: Range<usize>,
    pub fields: Vec<ModField>,
}

impl ModificationEntry {
    /// Human-readable rendering using the table's per-field label slots,
    /// each split at its first comma into prefix and suffix.
    pub fn render(&self, table: &ModTable) -> String {
        let labels = table.get(self.id).map(|spec| spec.labels.as_slice());
        if self.fields.is_empty() {
            return self.name.clone();
        }
        let mut parts = Vec::with_capacity(self.fields.len());
        for (index, field) in self.fields.iter().enumerate() {
            let label = labels
                .and_then(|l| l.get(index))
                .map(String::as_str)
                .unwrap_or("");
            let (prefix, suffix) = label.split_once(',').unwrap_or((label, ""));
            parts.push(format!("{prefix}{}{suffix}", field.value.render()));
        }
        format!("{}: {}", self.name, parts.join(", "))
    }
}

/// Result of decoding one modification run. An unrecognized id or a
/// violated relation stops decoding; everything from that point on is
/// preserved opaquely in `residual`, never guessed at.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModificationSet {
    pub entries: Vec<ModificationEntry>,
    pub residual: Option<Range<usize>>,
}

impl ModificationSet {
    /// Decode entries until the sentinel, an unknown id or the end of the
    /// run. `bits` is the modification section only, sentinel excluded or
    /// included; the walk never reads past it.
    pub fn decode(bits: &Bits, table: &ModTable) -> Self {
        let mut entries = Vec::new();
        let mut index = 0usize;

        while index + 9 <= bits.len() {
            let id = bits.value(index..index + 9) as u16;
            if id == MOD_SENTINEL {
                return Self {
                    entries,
                    residual: None,
                };
            }
            let Some(spec) = table.get(id) else {
                log::warn!("unknown modification id {id} at bit {index}, preserving residual");
                return Self {
                    entries,
                    residual: Some(index..bits.len()),
                };
            };

            let mut cursor = index + 9;
            let mut fields = Vec::with_capacity(spec.params.len());
            let mut prev_raw: Option<u64> = None;
            let mut ok = true;
            for template in &spec.params {
                let width = template.bit_width();
                if cursor + width > bits.len() {
                    ok = false;
                    break;
                }
                let raw = bits.value(cursor..cursor + width);
                let satisfied = match (template.relation, prev_raw) {
                    (Some(Relation::Equal), Some(prev)) => raw == prev,
                    (Some(Relation::AtLeast), Some(prev)) => raw >= prev,
                    _ => true,
                };
                if !satisfied {
                    ok = false;
                    break;
                }
                fields.push(ModField {
                    template: template.clone(),
                    range: cursor..cursor + width,
                    raw,
                    value: decode_value(template, raw),
                });
                prev_raw = Some(raw);
                cursor += width;
            }

            if !ok {
                return Self {
                    entries,
                    residual: Some(index..bits.len()),
                };
            }

            entries.push(ModificationEntry {
                id,
                name: spec.name.clone(),
                range: index..cursor,
                fields,
            });
            index = cursor;
        }

        // Fewer than 9 bits left: padding if zero, residual otherwise.
        let residual = if bits.all_zeros(index..bits.len()) {
            None
        } else {
            Some(index..bits.len())
        };
        Self { entries, residual }
    }

    pub fn render(&self, table: &ModTable) -> Vec<String> {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.render(table))
            .collect();
        if let Some(residual) = &self.residual {
            lines.push(format!(
                "unrecognized modification data ({} bits preserved)",
                residual.len()
            ));
        }
        lines
    }
}

fn decode_value(template: &FieldTemplate, raw: u64) -> ModValue {
    match &template.kind {
        TemplateKind::Literal { bits } => {
            let value = bits
                .iter()
                .enumerate()
                .fold(0i64, |acc, (j, &b)| acc | (i64::from(b) << j));
            ModValue::Int(value)
        }
        TemplateKind::Integer { offset, .. } => ModValue::Int(raw as i64 - offset),
        TemplateKind::FixedPoint { scale, .. } => {
            ModValue::Fixed(raw as f64 / f64::from(1u32 << scale))
        }
        TemplateKind::SkillId => ModValue::Skill(raw as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_mod(bits: &mut Bits, id: u16, fields: &[(u64, usize)]) {
        bits.push_value(u64::from(id), 9);
        for &(value, width) in fields {
            bits.push_value(value, width);
        }
    }

    #[test]
    fn decodes_run_to_sentinel() {
        let table = ModTable::builtin();
        let mut bits = Bits::new();
        // Enhanced Defense +30%, Enhanced Durability +10%.
        push_mod(&mut bits, 16, &[(30, 9)]);
        push_mod(&mut bits, 75, &[(10, 7)]);
        bits.push_value(u64::from(MOD_SENTINEL), 9);

        let set = ModificationSet::decode(&bits, &table);
        assert_eq!(set.entries.len(), 2);
        assert!(set.residual.is_none());
        assert_eq!(set.entries[0].fields[0].value, ModValue::Int(30));
        assert_eq!(set.entries[1].fields[0].value, ModValue::Int(10));
        // The last entry ends right at the sentinel.
        assert_eq!(set.entries[1].range.end, bits.len() - 9);
    }

    #[test]
    fn unknown_id_becomes_residual() {
        let table = ModTable::builtin();
        let mut bits = Bits::new();
        push_mod(&mut bits, 16, &[(5, 9)]);
        // Id 437 is not tabulated; everything from it on is preserved.
        push_mod(&mut bits, 437, &[(0xAB, 12)]);

        let set = ModificationSet::decode(&bits, &table);
        assert_eq!(set.entries.len(), 1);
        assert_eq!(set.residual, Some(18..bits.len()));
    }

    #[test]
    fn integer_offset_and_fixed_point_values() {
        let table = ModTable::builtin();
        let mut bits = Bits::new();
        // Magic Find is stored with offset 100: raw 130 means +30%.
        push_mod(&mut bits, 80, &[(130, 8)]);
        bits.push_value(u64::from(MOD_SENTINEL), 9);
        let set = ModificationSet::decode(&bits, &table);
        assert_eq!(set.entries[0].fields[0].value, ModValue::Int(30));

        // Per-level vitality is a 6-bit fixed-point with 3 fraction bits.
        let mut bits = Bits::new();
        push_mod(&mut bits, 329, &[(4, 6)]);
        bits.push_value(u64::from(MOD_SENTINEL), 9);
        let set = ModificationSet::decode(&bits, &table);
        assert_eq!(set.entries[0].fields[0].value, ModValue::Fixed(0.5));
    }

    #[test]
    fn relation_violation_stops_at_the_entry() {
        let table = ModTable::builtin();
        // Cold damage with maximum below minimum violates the `>` rule.
        let mut bits = Bits::new();
        push_mod(&mut bits, 54, &[(9, 8), (3, 8), (25, 8)]);
        bits.push_value(u64::from(MOD_SENTINEL), 9);
        let set = ModificationSet::decode(&bits, &table);
        assert!(set.entries.is_empty());
        assert_eq!(set.residual, Some(0..bits.len()));

        // A well-ordered pair decodes.
        let mut bits = Bits::new();
        push_mod(&mut bits, 54, &[(3, 8), (9, 8), (25, 8)]);
        bits.push_value(u64::from(MOD_SENTINEL), 9);
        let set = ModificationSet::decode(&bits, &table);
        assert_eq!(set.entries.len(), 1);
        assert_eq!(set.entries[0].fields[1].value, ModValue::Int(9));
    }

    #[test]
    fn skill_fields_resolve_names() {
        let table = ModTable::builtin();
        let mut bits = Bits::new();
        // Teleport (+2) granted as a non-class skill.
        push_mod(&mut bits, 97, &[(54, 9), (2, 6)]);
        bits.push_value(u64::from(MOD_SENTINEL), 9);
        let set = ModificationSet::decode(&bits, &table);
        assert_eq!(set.entries[0].fields[0].value, ModValue::Skill(54));
        let rendered = set.entries[0].render(&table);
        assert!(rendered.contains("Teleport"), "{rendered}");
    }

    #[test]
    fn truncated_run_never_reads_past_the_buffer() {
        let table = ModTable::builtin();
        let mut bits = Bits::new();
        // Id announces a 9-bit field but only 4 bits follow.
        bits.push_value(16, 9);
        bits.push_value(0xF, 4);
        let set = ModificationSet::decode(&bits, &table);
        assert!(set.entries.is_empty());
        assert_eq!(set.residual, Some(0..13));
    }

    #[test]
    fn trailing_padding_is_not_residual() {
        let table = ModTable::builtin();
        let mut bits = Bits::new();
        push_mod(&mut bits, 75, &[(10, 7)]);
        bits.push_value(0, 5);
        let set = ModificationSet::decode(&bits, &table);
        assert_eq!(set.entries.len(), 1);
        assert!(set.residual.is_none());
    }
}
