use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::SaveError;

/// Constraint tying a field to the immediately preceding sibling value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `>`: must be at least the preceding value.
    AtLeast,
    /// `=`: must equal the preceding value.
    Equal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateKind {
    /// Fixed bit pattern, value taken from the template itself. The digits
    /// are little-endian, first character is the lowest bit.
    Literal { bits: Vec<bool> },
    /// Plain integer stored with an additive offset.
    Integer { bits: usize, offset: i64 },
    /// Fixed-point value; `scale` positions the binary point.
    FixedPoint { bits: usize, scale: u32 },
    /// 9-bit skill id.
    SkillId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTemplate {
    pub relation: Option<Relation>,
    pub kind: TemplateKind,
}

impl FieldTemplate {
    /// Parse one template: optional relation prefix, then either a binary
    /// literal or `<bits><type><offset>` with type `i`, `f` or `s`.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return None;
        }
        let (relation, rest) = match spec.as_bytes()[0] {
            b'>' => (Some(Relation::AtLeast), &spec[1..]),
            b'=' => (Some(Relation::Equal), &spec[1..]),
            _ => (None, spec),
        };
        if rest.is_empty() {
            return None;
        }

        if rest.bytes().all(|b| b.is_ascii_digit()) {
            if !rest.bytes().all(|b| b == b'0' || b == b'1') {
                log::warn!("literal template '{spec}' holds non-binary digits");
                return None;
            }
            return Some(Self {
                relation,
                kind: TemplateKind::Literal {
                    bits: rest.bytes().map(|b| b == b'1').collect(),
                },
            });
        }

        let digits_end = rest.bytes().position(|b| !b.is_ascii_digit())?;
        let bits: usize = rest[..digits_end].parse().ok()?;
        let kind_char = rest.as_bytes()[digits_end];
        let suffix = &rest[digits_end + 1..];
        if !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let offset: i64 = if suffix.is_empty() {
            0
        } else {
            suffix.parse().ok()?
        };

        let kind = match kind_char {
            b'i' => TemplateKind::Integer { bits, offset },
            b'f' => TemplateKind::FixedPoint {
                bits,
                scale: offset as u32,
            },
            b's' if bits == 9 => TemplateKind::SkillId,
            _ => return None,
        };
        Some(Self { relation, kind })
    }

    pub fn bit_width(&self) -> usize {
        match &self.kind {
            TemplateKind::Literal { bits } => bits.len(),
            TemplateKind::Integer { bits, .. } => *bits,
            TemplateKind::FixedPoint { bits, .. } => *bits,
            TemplateKind::SkillId => 9,
        }
    }
}

/// One table row: a 9-bit id, a display name, per-field label slots and
/// the ordered field templates.
#[derive(Debug, Clone, PartialEq)]
pub struct ModSpec {
    pub id: u16,
    pub name: String,
    pub labels: Vec<String>,
    pub params: Vec<FieldTemplate>,
}

/// The external modification-definition table, loaded once at startup and
/// immutable for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct ModTable {
    specs: BTreeMap<u16, ModSpec>,
}

impl ModTable {
    pub fn builtin() -> Self {
        Self::from_tsv(include_str!("../../data/mods.tsv"))
    }

    pub fn load_path(path: &Path) -> Result<Self, SaveError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| SaveError::io(format!("failed to read {}: {e}", path.display())))?;
        Ok(Self::from_tsv(&contents))
    }

    /// Parse the tab-separated table. The first line is a header; a row
    /// without a valid 9-digit binary id is skipped.
    pub fn from_tsv(contents: &str) -> Self {
        let mut specs = BTreeMap::new();
        for line in contents.lines().skip(1) {
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let column = |index: usize| fields.get(index).copied().unwrap_or("").trim();

            let id_digits = column(2);
            if id_digits.len() != 9 || !id_digits.bytes().all(|b| b == b'0' || b == b'1') {
                continue;
            }
            let id = id_digits
                .bytes()
                .enumerate()
                .fold(0u16, |acc, (j, b)| acc | (u16::from(b == b'1') << j));

            let name = column(1).to_string();
            if name.is_empty() {
                log::warn!("modification id {id} has no name, skipping row");
                continue;
            }
            let labels: Vec<String> = (3..8).map(|c| column(c).to_string()).collect();
            let mut params = Vec::new();
            let mut valid = true;
            for c in 8..13 {
                let spec = column(c);
                if spec.is_empty() {
                    break;
                }
                match FieldTemplate::parse(spec) {
                    Some(template) => params.push(template),
                    None => {
                        log::warn!("invalid field template '{spec}' for modification {name}");
                        valid = false;
                        break;
                    }
                }
            }
            if !valid {
                continue;
            }
            specs.insert(
                id,
                ModSpec {
                    id,
                    name,
                    labels,
                    params,
                },
            );
        }
        Self { specs }
    }

    pub fn get(&self, id: u16) -> Option<&ModSpec> {
        self.specs.get(&id)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_grammar_cases() {
        let t = FieldTemplate::parse("8i").unwrap();
        assert_eq!(t.relation, None);
        assert_eq!(t.kind, TemplateKind::Integer { bits: 8, offset: 0 });

        let t = FieldTemplate::parse(">8i").unwrap();
        assert_eq!(t.relation, Some(Relation::AtLeast));

        let t = FieldTemplate::parse("=9i").unwrap();
        assert_eq!(t.relation, Some(Relation::Equal));
        assert_eq!(t.bit_width(), 9);

        let t = FieldTemplate::parse("8i100").unwrap();
        assert_eq!(
            t.kind,
            TemplateKind::Integer {
                bits: 8,
                offset: 100
            }
        );

        let t = FieldTemplate::parse("6f3").unwrap();
        assert_eq!(t.kind, TemplateKind::FixedPoint { bits: 6, scale: 3 });

        let t = FieldTemplate::parse("9s").unwrap();
        assert_eq!(t.kind, TemplateKind::SkillId);

        let t = FieldTemplate::parse("1000000").unwrap();
        assert_eq!(t.bit_width(), 7);
        match t.kind {
            TemplateKind::Literal { ref bits } => assert!(bits[0] && !bits[1]),
            _ => panic!("expected literal"),
        }

        assert!(FieldTemplate::parse("").is_none());
        assert!(FieldTemplate::parse("4x").is_none());
        assert!(FieldTemplate::parse("8s").is_none());
    }

    #[test]
    fn builtin_table_resolves_known_ids() {
        let table = ModTable::builtin();
        assert!(!table.is_empty());
        // Enhanced Defense, the superior-armor modifier.
        let spec = table.get(16).unwrap();
        assert_eq!(spec.params.len(), 1);
        assert_eq!(spec.params[0].bit_width(), 9);
        // Enhanced Durability, 7 bits.
        assert_eq!(table.get(75).unwrap().params[0].bit_width(), 7);
        assert!(table.get(511).is_none());
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let tsv = "no\tname\tid\n1\tBroken\t12345\n2\tGood\t000010000\t+,%\t\t\t\t\t9i\n";
        let table = ModTable::from_tsv(tsv);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(16).unwrap().name, "Good");
    }
}
