//! Fixed-size inventory surfaces and first-fit placement.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::item::{ItemView, Parent};
use crate::layout::ItemBlockKind;
use crate::save::SaveBuffer;
use crate::scanner;

/// Storage kind of a stored item, bits 73..76.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Storage {
    Inventory,
    Cube,
    Stash,
    Unspecified(u8),
}

impl Storage {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Inventory,
            4 => Self::Cube,
            5 => Self::Stash,
            other => Self::Unspecified(other),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Inventory => 1,
            Self::Cube => 4,
            Self::Stash => 5,
            Self::Unspecified(other) => other,
        }
    }

    /// (rows, cols) capacity. The Cube is 4x3, the stash 8x6, the
    /// backpack inventory 4x10.
    pub fn size(self) -> (usize, usize) {
        match self {
            Self::Cube => (4, 3),
            Self::Stash => (8, 6),
            Self::Inventory => (4, 10),
            Self::Unspecified(_) => (0, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::Cube => "cube",
            Self::Stash => "stash",
            Self::Unspecified(_) => "unspecified",
        }
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-major occupancy bitmap for one storage surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupancy {
    pub rows: usize,
    pub cols: usize,
    cells: Vec<bool>,
}

impl Occupancy {
    pub fn empty(storage: Storage) -> Self {
        let (rows, cols) = storage.size();
        Self {
            rows,
            cols,
            cells: vec![false; rows * cols],
        }
    }

    pub fn is_marked(&self, row: usize, col: usize) -> bool {
        self.cells[row * self.cols + col]
    }

    /// Mark an item footprint; cells outside the surface are ignored the
    /// way the replay ignores out-of-range legacy positions.
    pub fn mark(&mut self, row: usize, col: usize, footprint: (u8, u8)) {
        for dr in 0..footprint.0 as usize {
            for dc in 0..footprint.1 as usize {
                let (r, c) = (row + dr, col + dc);
                if r < self.rows && c < self.cols {
                    self.cells[r * self.cols + c] = true;
                }
            }
        }
    }

    fn fits_at(&self, row: usize, col: usize, footprint: (u8, u8)) -> bool {
        let (frows, fcols) = (footprint.0 as usize, footprint.1 as usize);
        if row + frows > self.rows || col + fcols > self.cols {
            return false;
        }
        for dr in 0..frows {
            for dc in 0..fcols {
                if self.is_marked(row + dr, col + dc) {
                    return false;
                }
            }
        }
        true
    }

    /// First free top-left coordinate for the footprint, scanning columns
    /// left to right and rows top to bottom within each column. Never
    /// returns a coordinate whose footprint would leave the surface.
    pub fn find_slot(&self, footprint: (u8, u8)) -> Option<(usize, usize)> {
        let (frows, fcols) = (footprint.0 as usize, footprint.1 as usize);
        if frows == 0 || fcols == 0 || frows > self.rows || fcols > self.cols {
            return None;
        }
        for col in 0..=(self.cols - fcols) {
            for row in 0..=(self.rows - frows) {
                if self.fits_at(row, col, footprint) {
                    return Some((row, col));
                }
            }
        }
        None
    }

    /// Line-wise rendering, `1` for occupied cells. For status output.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.rows * (self.cols + 1));
        for row in 0..self.rows {
            for col in 0..self.cols {
                out.push(if self.is_marked(row, col) { '1' } else { '0' });
            }
            out.push('\n');
        }
        out
    }
}

/// Rebuild the occupancy map of one storage surface by replaying every
/// stored player item with a known footprint.
pub fn occupancy(save: &SaveBuffer, catalog: &Catalog, storage: Storage) -> Occupancy {
    let mut map = Occupancy::empty(storage);
    if map.rows == 0 {
        return map;
    }
    let data = save.bytes();
    let blocks = scanner::segment(data);
    let Some(&player) = blocks.get(&ItemBlockKind::PlayerItems) else {
        return map;
    };
    for range in scanner::item_ranges_in(data, player) {
        let view = ItemView::new(range.slice(data));
        if view.storage() != storage || view.parent() != Parent::Stored {
            continue;
        }
        let Some(code) = view.type_code() else {
            continue;
        };
        let Some(volume) = catalog.volume(code) else {
            continue;
        };
        map.mark(view.row() as usize, view.col() as usize, volume);
    }
    map
}
