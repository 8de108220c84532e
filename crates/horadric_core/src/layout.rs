use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.start..self.end]
    }
}

/// The ordered sections a .d2s item area is segmented into. Headers are
/// carried as blocks of their own because they open with the same `JM`
/// token the items use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemBlockKind {
    PlayerHeader,
    PlayerItems,
    CorpseHeader,
    CorpseItems,
    MercenaryHeader,
    MercenaryItems,
    GolemHeader,
    GolemItem,
}

impl ItemBlockKind {
    pub fn is_header(self) -> bool {
        matches!(
            self,
            Self::PlayerHeader | Self::CorpseHeader | Self::MercenaryHeader | Self::GolemHeader
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::PlayerHeader => "player header",
            Self::PlayerItems => "player items",
            Self::CorpseHeader => "corpse header",
            Self::CorpseItems => "corpse items",
            Self::MercenaryHeader => "mercenary header",
            Self::MercenaryItems => "mercenary items",
            Self::GolemHeader => "golem header",
            Self::GolemItem => "golem item",
        }
    }
}

/// Handle for one item inside a segmentation snapshot. The byte range is
/// only valid against the buffer state it was derived from; any
/// size-changing mutation obsoletes it and the index must be re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemRecord {
    pub block: ItemBlockKind,
    pub index: usize,
    pub range: ByteRange,
}
