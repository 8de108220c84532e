//! Magic-affix sub-language: the same ordered, value-dependent field chain
//! pattern as the extended item section, but driven by an external table
//! instead of hard-coded steps.

mod codec;
mod table;

pub use codec::{ModField, ModValue, ModificationEntry, ModificationSet};
pub use table::{FieldTemplate, ModSpec, ModTable, Relation, TemplateKind};

/// 9-bit all-ones id closing a modification list.
pub const MOD_SENTINEL: u16 = 0x1FF;
