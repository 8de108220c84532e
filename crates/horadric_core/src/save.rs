use crate::character::Class;
use crate::error::SaveError;

/// Fixed-size main header preceding the quest, waypoint, attribute, skill
/// and item sections.
pub const HEADER_LEN: usize = 765;

/// File signature, bytes 0..4.
pub const SIGNATURE: [u8; 4] = [0x55, 0xAA, 0x55, 0xAA];

/// The one supported wire version, v1.10-v1.14d.
pub const SUPPORTED_VERSION: u32 = 96;

const VERSION_RANGE: std::ops::Range<usize> = 4..8;
const FILE_SIZE_RANGE: std::ops::Range<usize> = 8..12;
const CHECKSUM_RANGE: std::ops::Range<usize> = 12..16;
const NAME_RANGE: std::ops::Range<usize> = 20..36;
const STATUS_OFFSET: usize = 36;
const PROGRESSION_OFFSET: usize = 37;
const CLASS_OFFSET: usize = 40;
const LEVEL_OFFSET: usize = 43;

const STATUS_HARDCORE: u8 = 0x04;
const STATUS_DEAD: u8 = 0x08;

/// Owns the whole mutable byte sequence of one character.
///
/// Every mutation works in place. The stored size and checksum fields go
/// stale the moment anything changes; `finalize` must run before the bytes
/// are handed back to the game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveBuffer {
    data: Vec<u8>,
}

impl SaveBuffer {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, SaveError> {
        if data.len() < HEADER_LEN {
            return Err(SaveError::BufferTooShort {
                len: data.len(),
                need: HEADER_LEN,
            });
        }
        let signature = [data[0], data[1], data[2], data[3]];
        if signature != SIGNATURE {
            return Err(SaveError::InvalidSignature { found: signature });
        }
        let buffer = Self { data };
        let version = buffer.version();
        if version != SUPPORTED_VERSION {
            return Err(SaveError::UnsupportedVersion { found: version });
        }
        Ok(buffer)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn read_u32(&self, range: std::ops::Range<usize>) -> u32 {
        let b = &self.data[range];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    pub fn version(&self) -> u32 {
        self.read_u32(VERSION_RANGE)
    }

    /// File size as currently written in the header, which may be stale.
    pub fn stored_file_size(&self) -> u32 {
        self.read_u32(FILE_SIZE_RANGE)
    }

    pub fn stored_checksum(&self) -> u32 {
        self.read_u32(CHECKSUM_RANGE)
    }

    /// Rolling shift-add checksum over the whole buffer with the checksum
    /// field itself treated as zero.
    pub fn compute_checksum(&self) -> u32 {
        let mut csum = 0u64;
        for (index, &byte) in self.data.iter().enumerate() {
            let value = if CHECKSUM_RANGE.contains(&index) {
                0
            } else {
                u64::from(byte)
            };
            csum = ((csum << 1) + value) % 0xFFFF_FFFF;
        }
        csum as u32
    }

    pub fn update_file_size(&mut self) {
        let size = (self.data.len() as u32).to_le_bytes();
        self.data[FILE_SIZE_RANGE].copy_from_slice(&size);
    }

    pub fn update_checksum(&mut self) {
        let csum = self.compute_checksum().to_le_bytes();
        self.data[CHECKSUM_RANGE].copy_from_slice(&csum);
    }

    /// Restore the file-level invariants. Must be the unconditional last
    /// step before persisting; running it twice is a no-op.
    pub fn finalize(&mut self) {
        self.update_file_size();
        self.update_checksum();
    }

    pub fn name(&self) -> String {
        let raw = &self.data[NAME_RANGE];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    pub fn class(&self) -> Class {
        Class::from_raw(self.data[CLASS_OFFSET])
    }

    /// Character level shown on the selection screen. Kept in sync with
    /// the level attribute by the attribute writer.
    pub fn header_level(&self) -> u8 {
        self.data[LEVEL_OFFSET]
    }

    pub fn set_header_level(&mut self, level: u8) {
        self.data[LEVEL_OFFSET] = level;
    }

    pub fn is_hardcore(&self) -> bool {
        self.data[STATUS_OFFSET] & STATUS_HARDCORE != 0
    }

    pub fn set_hardcore(&mut self, hardcore: bool) {
        if hardcore {
            self.data[STATUS_OFFSET] |= STATUS_HARDCORE;
        } else {
            self.data[STATUS_OFFSET] &= !STATUS_HARDCORE;
        }
    }

    pub fn is_dead(&self) -> bool {
        self.data[STATUS_OFFSET] & STATUS_DEAD != 0
    }

    pub fn set_dead(&mut self, dead: bool) {
        if dead {
            self.data[STATUS_OFFSET] |= STATUS_DEAD;
        } else {
            self.data[STATUS_OFFSET] &= !STATUS_DEAD;
        }
    }

    pub fn progression(&self) -> u8 {
        self.data[PROGRESSION_OFFSET]
    }

    pub fn set_progression(&mut self, progression: u8) {
        self.data[PROGRESSION_OFFSET] = progression;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::empty_save_bytes;

    #[test]
    fn rejects_short_buffer() {
        let err = SaveBuffer::from_bytes(vec![0u8; 32]).unwrap_err();
        assert_eq!(err, SaveError::BufferTooShort { len: 32, need: 765 });
    }

    #[test]
    fn rejects_bad_signature() {
        let mut data = empty_save_bytes();
        data[0] = 0x00;
        let err = SaveBuffer::from_bytes(data).unwrap_err();
        assert!(matches!(err, SaveError::InvalidSignature { .. }));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut data = empty_save_bytes();
        data[4] = 97;
        let original = data.clone();
        let err = SaveBuffer::from_bytes(data.clone()).unwrap_err();
        assert_eq!(err, SaveError::UnsupportedVersion { found: 97 });
        // The load attempt never mutates the input bytes.
        assert_eq!(data, original);
    }

    #[test]
    fn checksum_update_is_idempotent() {
        let mut save = SaveBuffer::from_bytes(empty_save_bytes()).unwrap();
        save.data_mut().extend_from_slice(b"payload");
        save.finalize();
        let first = save.bytes().to_vec();
        save.finalize();
        assert_eq!(save.bytes(), first.as_slice());
        assert_eq!(save.stored_checksum(), save.compute_checksum());
        assert_eq!(save.stored_file_size() as usize, save.len());
    }

    #[test]
    fn status_bits_roundtrip() {
        let mut save = SaveBuffer::from_bytes(empty_save_bytes()).unwrap();
        assert!(!save.is_hardcore());
        save.set_hardcore(true);
        save.set_dead(true);
        assert!(save.is_hardcore());
        assert!(save.is_dead());
        save.set_dead(false);
        assert!(!save.is_dead());
        assert!(save.is_hardcore());
    }
}
