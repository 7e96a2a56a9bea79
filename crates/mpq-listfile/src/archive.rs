//! Archive-side primitives consumed by the listfile subsystem
//!
//! The listfile code never touches hash tables, block tables or compression
//! directly. Everything it needs from an archive goes through
//! [`ListfileArchive`], so the same ingestion, rebuild and enumeration logic
//! runs against any archive implementation. [`crate::memory::MemoryArchive`]
//! is the in-crate implementation.

use crate::error::ListfileResult;
use crate::names;
use std::borrow::Cow;
use std::fmt;
use std::io::{Read, Seek, Write};

/// Any seekable byte stream names can be read from
pub trait NameSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> NameSource for T {}

/// Windows LCID of an archive member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Locale(pub u16);

impl Locale {
    /// Locale-neutral member
    pub const NEUTRAL: Self = Self(0);
    /// Chinese (Taiwan)
    pub const ZHTW: Self = Self(0x0404);
    /// Czech
    pub const CSCZ: Self = Self(0x0405);
    /// German
    pub const DEDE: Self = Self(0x0407);
    /// English (United States)
    pub const ENUS: Self = Self(0x0409);
    /// Spanish
    pub const ESES: Self = Self(0x040A);
    /// French
    pub const FRFR: Self = Self(0x040C);
    /// Italian
    pub const ITIT: Self = Self(0x0410);
    /// Japanese
    pub const JAJP: Self = Self(0x0411);
    /// Korean
    pub const KOKR: Self = Self(0x0412);
    /// Polish
    pub const PLPL: Self = Self(0x0415);
    /// Portuguese (Brazil)
    pub const PTBR: Self = Self(0x0416);
    /// Russian
    pub const RURU: Self = Self(0x0419);
    /// English (United Kingdom)
    pub const ENGB: Self = Self(0x0809);

    /// Check if this is the neutral locale
    pub const fn is_neutral(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Per-member flags, using the on-disk MPQ bit values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileFlags(pub u32);

impl FileFlags {
    /// No flags
    pub const NONE: u32 = 0;
    /// PKWARE implode compression
    pub const IMPLODE: u32 = 0x0000_0100;
    /// Multi-method compression
    pub const COMPRESS: u32 = 0x0000_0200;
    /// Encrypted content
    pub const ENCRYPTED: u32 = 0x0001_0000;
    /// Encryption key adjusted by block offset
    pub const FIX_KEY: u32 = 0x0002_0000;
    /// Stored as a single unit rather than sectors
    pub const SINGLE_UNIT: u32 = 0x0100_0000;
    /// Deletion marker in a patch archive
    pub const DELETE_MARKER: u32 = 0x0200_0000;
    /// Sector checksums follow the sector offset table
    pub const SECTOR_CRC: u32 = 0x0400_0000;
    /// Record describes an existing member
    pub const EXISTS: u32 = 0x8000_0000;

    /// Create flags from a raw value
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Check if a flag is set
    pub const fn has(self, flag: u32) -> bool {
        (self.0 & flag) != 0
    }

    /// Set a flag
    pub fn set(&mut self, flag: u32) {
        self.0 |= flag;
    }

    /// Clear a flag
    pub fn clear(&mut self, flag: u32) {
        self.0 &= !flag;
    }

    /// Check if no flag is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FileFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u32> for FileFlags {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// One per-locale entry of the archive's file table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileRecord {
    /// Name bytes as the listfile spells them, if known.
    ///
    /// Legacy listfiles use the game's code page, so names are not
    /// guaranteed to be UTF-8.
    pub name: Option<Vec<u8>>,
    /// Member flags
    pub flags: FileFlags,
    /// Locale of this variant
    pub locale: Locale,
    /// Uncompressed size in bytes
    pub size: u64,
}

impl FileRecord {
    /// Check if the record describes an existing member
    pub const fn exists(&self) -> bool {
        self.flags.has(FileFlags::EXISTS)
    }

    /// Attach a name unless the record already has one.
    ///
    /// Returns `true` if the name was stored.
    pub fn attach_name(&mut self, name: &[u8]) -> bool {
        if self.name.is_some() {
            return false;
        }
        self.name = Some(name.to_vec());
        true
    }

    /// Name for display, with invalid UTF-8 replaced
    pub fn display_name(&self) -> Option<Cow<'_, str>> {
        self.name.as_deref().map(String::from_utf8_lossy)
    }
}

/// A hash table slot that matched a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashEntry {
    /// Slot position in the hash table
    pub slot: usize,
    /// Locale stored in the slot
    pub locale: Locale,
    /// Referenced position in the file table
    pub block_index: u32,
}

/// Where a stream is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenScope {
    /// Archive member of this locale, falling back to the neutral variant
    Locale(Locale),
    /// First archive member under the name, whatever its locale
    AnyLocale,
    /// A file on the host file system; the name is a path
    LocalFile,
}

/// Parameters for creating a stream inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
    /// Exact number of bytes that will be written
    pub size: u64,
    /// Locale of the new member
    pub locale: Locale,
    /// Member flags
    pub flags: FileFlags,
    /// Overwrite an existing member of the same name and locale
    pub replace_existing: bool,
}

/// On-disk format generation of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum FormatVersion {
    /// Original format (Diablo, StarCraft, Warcraft III)
    #[default]
    V1,
    /// Burning Crusade extended tables
    V2,
    /// Cataclysm HET/BET tables
    V3,
    /// V3 plus table checksums
    V4,
}

/// Archive primitives the listfile subsystem depends on
pub trait ListfileArchive: Sized {
    /// Writer returned by [`ListfileArchive::create_stream`]
    type Writer: Write;

    /// Check if the archive has an extended (direct lookup) index
    fn has_extended_index(&self) -> bool;

    /// Record position of any locale variant of `name` in the extended index
    fn find_in_extended_index(&self, name: &[u8]) -> Option<usize>;

    /// Check if the archive has a basic hash table
    fn has_hash_table(&self) -> bool;

    /// First hash table slot whose name hashes match `name`
    fn first_hash_entry(&self, name: &[u8]) -> Option<HashEntry>;

    /// Next slot after `current` matching `name`, walking the probe sequence
    /// that started at `first`
    fn next_hash_entry(
        &self,
        name: &[u8],
        first: &HashEntry,
        current: &HashEntry,
    ) -> Option<HashEntry>;

    /// The file table
    fn records(&self) -> &[FileRecord];

    /// Mutable access to one file table entry
    fn record_mut(&mut self, index: usize) -> Option<&mut FileRecord>;

    /// Open a stream for reading
    fn open_stream(&self, name: &str, scope: OpenScope) -> ListfileResult<Box<dyn NameSource>>;

    /// Begin writing a member. Nothing is visible until
    /// [`ListfileArchive::finish_stream`] succeeds.
    fn create_stream(&mut self, name: &str, options: CreateOptions)
    -> ListfileResult<Self::Writer>;

    /// Commit a written member, replacing the live one atomically
    fn finish_stream(&mut self, writer: Self::Writer) -> ListfileResult<()>;

    /// Format generation
    fn format_version(&self) -> FormatVersion;

    /// Flags previously recorded for the listfile (empty if never set)
    fn listfile_flags(&self) -> FileFlags;

    /// Record the flags to use for the listfile
    fn set_listfile_flags(&mut self, flags: FileFlags);

    /// Check if the stored listfile may be stale
    fn is_listfile_invalid(&self) -> bool;

    /// Mark the stored listfile as current
    fn clear_listfile_invalid(&mut self);

    /// Number of patch archives layered over this one
    fn patch_count(&self) -> usize;

    /// One patch archive of the chain
    fn patch_mut(&mut self, index: usize) -> Option<&mut Self>;

    /// Default flags for a reserved stream of the given size
    fn default_special_file_flags(&self, size: u64) -> FileFlags {
        if self.format_version() == FormatVersion::V1 {
            return FileFlags::new(FileFlags::COMPRESS | FileFlags::ENCRYPTED | FileFlags::FIX_KEY);
        }
        if size > 0x4000 {
            FileFlags::new(FileFlags::COMPRESS | FileFlags::SECTOR_CRC)
        } else {
            FileFlags::new(FileFlags::COMPRESS | FileFlags::SINGLE_UNIT)
        }
    }

    /// Check if a name is a hash-derived placeholder
    fn is_pseudo_name(&self, name: &[u8]) -> bool {
        names::is_pseudo_name(name)
    }

    /// Check if a name is one of the reserved streams
    fn is_internal_name(&self, name: &[u8]) -> bool {
        names::is_internal_name(name)
    }

    /// All hash table slots matching `name`, in probe order
    fn hash_entries<'a, N: AsRef<[u8]> + ?Sized>(
        &'a self,
        name: &'a N,
    ) -> HashEntries<'a, Self> {
        HashEntries {
            archive: self,
            name: name.as_ref(),
            first: None,
            current: None,
            done: false,
        }
    }
}

/// Iterator over the hash table slots sharing one name
pub struct HashEntries<'a, A> {
    archive: &'a A,
    name: &'a [u8],
    first: Option<HashEntry>,
    current: Option<HashEntry>,
    done: bool,
}

impl<A: ListfileArchive> Iterator for HashEntries<'_, A> {
    type Item = HashEntry;

    fn next(&mut self) -> Option<HashEntry> {
        if self.done {
            return None;
        }

        let next = match (&self.first, &self.current) {
            (Some(first), Some(current)) => self.archive.next_hash_entry(self.name, first, current),
            _ => self.archive.first_hash_entry(self.name),
        };

        match next {
            Some(entry) => {
                self.first.get_or_insert(entry);
                self.current = Some(entry);
                Some(entry)
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_name_is_set_once() {
        let mut record = FileRecord {
            flags: FileFlags::new(FileFlags::EXISTS),
            ..FileRecord::default()
        };
        assert!(record.attach_name(b"a.txt"));
        assert!(!record.attach_name(b"b.txt"));
        assert_eq!(record.name.as_deref(), Some(&b"a.txt"[..]));
        assert!(record.exists());
    }

    #[test]
    fn test_display_name_is_lossy() {
        let record = FileRecord {
            name: Some(b"Sound\\\xC4rger.wav".to_vec()),
            ..FileRecord::default()
        };
        assert_eq!(
            record.display_name().as_deref(),
            Some("Sound\\\u{FFFD}rger.wav")
        );
        assert_eq!(record.name.as_deref(), Some(&b"Sound\\\xC4rger.wav"[..]));
    }

    #[test]
    fn test_flag_ops() {
        let mut flags = FileFlags::default();
        assert!(flags.is_empty());
        flags.set(FileFlags::COMPRESS);
        flags.set(FileFlags::ENCRYPTED);
        assert!(flags.has(FileFlags::COMPRESS));
        flags.clear(FileFlags::COMPRESS);
        assert!(!flags.has(FileFlags::COMPRESS));
        assert_eq!(flags.to_string(), "0x00010000");
    }

    #[test]
    fn test_locale_display() {
        assert_eq!(Locale::ENUS.to_string(), "0x0409");
        assert!(Locale::NEUTRAL.is_neutral());
        assert!(!Locale::DEDE.is_neutral());
    }
}
