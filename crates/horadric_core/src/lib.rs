//! Core codec and mutation engine for Diablo II .d2s save files,
//! version 96 (v1.10-v1.14d).
//!
//! The save is one monolithic little-endian byte blob. This crate locates
//! and mutates the self-describing variable-length item records embedded
//! in it, keeps the storage-grid and socket invariants intact and restores
//! the file-level size and checksum fields before the blob is handed back.
//! File pickers, terminals and windows live elsewhere; everything here
//! works on in-memory buffers.

pub mod attributes;
pub mod bitfield;
pub mod catalog;
pub mod character;
pub mod error;
pub mod grid;
pub mod io;
pub mod item;
pub mod layout;
pub mod mods;
pub mod ops;
pub mod progress;
pub mod save;
pub mod scanner;
pub mod status;

#[cfg(test)]
mod testutil;

pub use catalog::{Catalog, ItemClass, ItemGrade, TypeCode};
pub use character::Class;
pub use error::SaveError;
pub use grid::Storage;
pub use item::{ItemCore, ItemFlag, ItemView, Parent, Quality};
pub use layout::{ByteRange, ItemBlockKind, ItemRecord};
pub use mods::{ModTable, ModificationSet};
pub use ops::{AdornmentKind, exchange_horadric};
pub use progress::{Difficulty, DifficultyPreset, MercenaryInfo};
pub use save::{SUPPORTED_VERSION, SaveBuffer};
pub use status::{CharacterStatus, ItemSummary, character_status, item_summaries};
