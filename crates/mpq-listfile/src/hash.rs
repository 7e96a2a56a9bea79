//! MPQ name hashing
//!
//! Archive members are located by three 32-bit hashes of their name: one
//! selects the starting slot in the hash table, the other two identify the
//! entry. All of them are derived from the same 1280-word crypt table.
//!
//! Hashing is case-insensitive and treats `/` and `\` as the same separator,
//! so `war3map.j`, `WAR3MAP.J` and `Scripts/x` / `Scripts\x` collide on
//! purpose.

/// Hash flavours understood by [`hash_string`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashType {
    /// Starting slot in the hash table
    TableIndex = 0,
    /// First name verification hash
    NameA = 1,
    /// Second name verification hash
    NameB = 2,
    /// Encryption key derived from the name
    FileKey = 3,
}

const CRYPT_TABLE_SIZE: usize = 0x500;

const fn build_crypt_table() -> [u32; CRYPT_TABLE_SIZE] {
    let mut table = [0u32; CRYPT_TABLE_SIZE];
    let mut seed: u32 = 0x0010_0001;
    let mut index1 = 0;

    while index1 < 0x100 {
        let mut index2 = index1;
        let mut i = 0;
        while i < 5 {
            seed = (seed * 125 + 3) % 0x002A_AAAB;
            let temp1 = (seed & 0xFFFF) << 0x10;
            seed = (seed * 125 + 3) % 0x002A_AAAB;
            let temp2 = seed & 0xFFFF;
            table[index2] = temp1 | temp2;
            index2 += 0x100;
            i += 1;
        }
        index1 += 1;
    }

    table
}

static CRYPT_TABLE: [u32; CRYPT_TABLE_SIZE] = build_crypt_table();

/// Hash an archive member name.
///
/// Names are hashed as raw bytes, so names in legacy code pages hash the
/// same way the game does.
///
/// # Examples
///
/// ```
/// use mpq_listfile::hash::{hash_string, HashType};
///
/// assert_eq!(hash_string("(hash table)", HashType::FileKey), 0xC3AF3770);
/// ```
pub fn hash_string(name: impl AsRef<[u8]>, hash_type: HashType) -> u32 {
    let offset = (hash_type as usize) << 8;
    let mut seed1: u32 = 0x7FED_7FED;
    let mut seed2: u32 = 0xEEEE_EEEE;

    for &byte in name.as_ref() {
        let ch = normalize_byte(byte);
        seed1 = CRYPT_TABLE[offset + usize::from(ch)] ^ seed1.wrapping_add(seed2);
        seed2 = u32::from(ch)
            .wrapping_add(seed1)
            .wrapping_add(seed2)
            .wrapping_add(seed2 << 5)
            .wrapping_add(3);
    }

    seed1
}

/// Combined 64-bit name hash (`NameA` high, `NameB` low)
pub fn name_hash64(name: impl AsRef<[u8]>) -> u64 {
    let name = name.as_ref();
    (u64::from(hash_string(name, HashType::NameA)) << 32)
        | u64::from(hash_string(name, HashType::NameB))
}

const fn normalize_byte(byte: u8) -> u8 {
    if byte == b'/' {
        b'\\'
    } else {
        byte.to_ascii_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_file_keys() {
        assert_eq!(hash_string("(hash table)", HashType::FileKey), 0xC3AF_3770);
        assert_eq!(hash_string("(block table)", HashType::FileKey), 0xEC83_B3A3);
    }

    #[test]
    fn test_case_insensitive() {
        for hash_type in [HashType::TableIndex, HashType::NameA, HashType::NameB] {
            assert_eq!(
                hash_string("war3map.j", hash_type),
                hash_string("WAR3MAP.J", hash_type)
            );
        }
    }

    #[test]
    fn test_separators_equivalent() {
        assert_eq!(
            name_hash64("Units/Human/Footman.mdx"),
            name_hash64("Units\\Human\\Footman.mdx")
        );
    }

    #[test]
    fn test_non_ascii_bytes_hash_verbatim() {
        // CP-1252 "Ärger.wav": 0xC4 is not upper-cased, unlike ASCII letters
        let raw: &[u8] = b"Sound\\\xC4rger.wav";
        assert_eq!(
            hash_string(raw, HashType::NameA),
            hash_string(b"SOUND\\\xC4RGER.WAV", HashType::NameA)
        );
        assert_ne!(
            hash_string(raw, HashType::NameA),
            hash_string("Sound\\\u{FFFD}rger.wav", HashType::NameA)
        );
    }

    #[test]
    fn test_hash_types_differ() {
        let a = hash_string("(listfile)", HashType::NameA);
        let b = hash_string("(listfile)", HashType::NameB);
        assert_ne!(a, b);
    }
}
