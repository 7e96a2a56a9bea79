//! In-memory archive
//!
//! [`MemoryArchive`] keeps an MPQ-style hash table, an optional extended
//! index and the file table in memory. It implements [`ListfileArchive`] and
//! is what tools and tests use when no on-disk archive is involved.
//!
//! Writes are staged: [`ListfileArchive::create_stream`] hands out a
//! [`StagedStream`] and nothing in the archive changes until
//! [`ListfileArchive::finish_stream`] accepts it.

use crate::archive::{
    CreateOptions, FileFlags, FileRecord, FormatVersion, HashEntry, ListfileArchive, Locale,
    NameSource, OpenScope,
};
use crate::error::{ListfileError, ListfileResult};
use crate::hash::{HashType, hash_string, name_hash64};
use crate::names::is_internal_name;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use tracing::debug;

const HASH_ENTRY_FREE: u32 = 0xFFFF_FFFF;
const HASH_ENTRY_DELETED: u32 = 0xFFFF_FFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HashSlot {
    name_a: u32,
    name_b: u32,
    locale: Locale,
    block_index: u32,
}

impl HashSlot {
    const FREE: Self = Self {
        name_a: HASH_ENTRY_FREE,
        name_b: HASH_ENTRY_FREE,
        locale: Locale::NEUTRAL,
        block_index: HASH_ENTRY_FREE,
    };

    const fn is_live(&self) -> bool {
        self.block_index < HASH_ENTRY_DELETED
    }
}

#[derive(Debug, Clone, Default)]
struct StoredData {
    bytes: Vec<u8>,
    /// Bytes past this offset cannot be read
    readable: Option<u64>,
}

/// Archive held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    format: FormatVersion,
    hash_table: Vec<HashSlot>,
    expose_hash_table: bool,
    extended_index: Option<HashMap<u64, usize>>,
    records: Vec<FileRecord>,
    data: Vec<StoredData>,
    listfile_flags: FileFlags,
    listfile_invalid: bool,
    patches: Vec<MemoryArchive>,
}

impl MemoryArchive {
    /// Create a format 1 archive with a hash table of at least
    /// `hash_table_size` slots (rounded up to a power of two)
    pub fn new(hash_table_size: usize) -> Self {
        Self {
            format: FormatVersion::V1,
            hash_table: vec![HashSlot::FREE; hash_table_size.max(1).next_power_of_two()],
            expose_hash_table: true,
            extended_index: None,
            records: Vec::new(),
            data: Vec::new(),
            listfile_flags: FileFlags::default(),
            listfile_invalid: false,
            patches: Vec::new(),
        }
    }

    /// Create a format 3 archive with both an extended index and a hash table
    pub fn with_extended_index(hash_table_size: usize) -> Self {
        Self {
            format: FormatVersion::V3,
            extended_index: Some(HashMap::new()),
            ..Self::new(hash_table_size)
        }
    }

    /// Create a format 3 archive that only exposes its extended index
    pub fn extended_only(hash_table_size: usize) -> Self {
        Self {
            expose_hash_table: false,
            ..Self::with_extended_index(hash_table_size)
        }
    }

    /// Override the format generation
    #[must_use]
    pub const fn with_format(mut self, format: FormatVersion) -> Self {
        self.format = format;
        self
    }

    /// Add a compressed member
    pub fn add_file(
        &mut self,
        name: impl AsRef<[u8]>,
        locale: Locale,
        data: Vec<u8>,
    ) -> ListfileResult<usize> {
        self.add_file_with_flags(name, locale, data, FileFlags::new(FileFlags::COMPRESS))
    }

    /// Add a member with explicit flags.
    ///
    /// Returns the new record's position in the file table.
    pub fn add_file_with_flags(
        &mut self,
        name: impl AsRef<[u8]>,
        locale: Locale,
        data: Vec<u8>,
        flags: FileFlags,
    ) -> ListfileResult<usize> {
        let name = name.as_ref();
        if self.find_slot(name, locale).is_some() {
            return Err(ListfileError::AlreadyExists(lossy(name)));
        }
        self.insert(name, locale, data, flags)
    }

    /// Mark a member deleted; its record stays but no longer exists
    pub fn remove_file(&mut self, name: impl AsRef<[u8]>, locale: Locale) -> ListfileResult<()> {
        let name = name.as_ref();
        let slot = self
            .find_slot(name, locale)
            .ok_or_else(|| ListfileError::NotFound(lossy(name)))?;

        let block_index = self.hash_table[slot].block_index as usize;
        self.hash_table[slot].block_index = HASH_ENTRY_DELETED;
        if let Some(record) = self.records.get_mut(block_index) {
            record.flags.clear(FileFlags::EXISTS);
        }
        if !is_internal_name(name) {
            self.listfile_invalid = true;
        }
        Ok(())
    }

    /// Drop every record name, as if the archive was opened without a listfile
    pub fn forget_names(&mut self) {
        for record in &mut self.records {
            record.name = None;
        }
    }

    /// Make everything past `len` bytes of a record unreadable
    pub fn truncate_readable(&mut self, index: usize, len: u64) {
        if let Some(stored) = self.data.get_mut(index) {
            stored.readable = Some(len);
        }
    }

    /// Append an archive to the patch chain
    pub fn add_patch(&mut self, patch: Self) {
        self.patches.push(patch);
    }

    /// Borrow a patch archive
    pub fn patch(&self, index: usize) -> Option<&Self> {
        self.patches.get(index)
    }

    /// Full content of a member of exactly this locale
    pub fn read_file(&self, name: impl AsRef<[u8]>, locale: Locale) -> ListfileResult<Vec<u8>> {
        let name = name.as_ref();
        let slot = self
            .find_slot(name, locale)
            .ok_or_else(|| ListfileError::NotFound(lossy(name)))?;
        let index = self.hash_table[slot].block_index as usize;
        self.data
            .get(index)
            .map(|stored| stored.bytes.clone())
            .ok_or_else(|| ListfileError::NotFound(lossy(name)))
    }

    /// Point a hash table slot at another file table position
    #[cfg(test)]
    pub(crate) fn set_block_index(&mut self, name: &str, locale: Locale, block_index: u32) {
        if let Some(slot) = self.find_slot(name.as_bytes(), locale) {
            self.hash_table[slot].block_index = block_index;
        }
    }

    fn table_mask(&self) -> usize {
        self.hash_table.len() - 1
    }

    fn probe_start(&self, name: &[u8]) -> usize {
        hash_string(name, HashType::TableIndex) as usize & self.table_mask()
    }

    fn slot_matches(slot: &HashSlot, name_a: u32, name_b: u32) -> bool {
        slot.name_a == name_a && slot.name_b == name_b && slot.block_index != HASH_ENTRY_DELETED
    }

    fn entry_at(&self, slot: usize) -> HashEntry {
        HashEntry {
            slot,
            locale: self.hash_table[slot].locale,
            block_index: self.hash_table[slot].block_index,
        }
    }

    fn probe_entries(&self, name: &[u8]) -> Vec<HashEntry> {
        let mut entries = Vec::new();
        let mut current = self.probe_first(name);
        if let Some(first) = current {
            while let Some(entry) = current {
                entries.push(entry);
                current = self.probe_next(name, &first, &entry);
            }
        }
        entries
    }

    fn probe_first(&self, name: &[u8]) -> Option<HashEntry> {
        let name_a = hash_string(name, HashType::NameA);
        let name_b = hash_string(name, HashType::NameB);
        let start = self.probe_start(name);
        let mut index = start;

        loop {
            let slot = &self.hash_table[index];
            if slot.block_index == HASH_ENTRY_FREE {
                return None;
            }
            if Self::slot_matches(slot, name_a, name_b) {
                return Some(self.entry_at(index));
            }
            index = (index + 1) & self.table_mask();
            if index == start {
                return None;
            }
        }
    }

    fn probe_next(&self, name: &[u8], first: &HashEntry, current: &HashEntry) -> Option<HashEntry> {
        let name_a = hash_string(name, HashType::NameA);
        let name_b = hash_string(name, HashType::NameB);
        let mut index = current.slot;

        loop {
            index = (index + 1) & self.table_mask();
            if index == first.slot {
                return None;
            }
            let slot = &self.hash_table[index];
            if slot.block_index == HASH_ENTRY_FREE {
                return None;
            }
            if Self::slot_matches(slot, name_a, name_b) {
                return Some(self.entry_at(index));
            }
        }
    }

    fn find_slot(&self, name: &[u8], locale: Locale) -> Option<usize> {
        self.probe_entries(name)
            .into_iter()
            .find(|entry| entry.locale == locale)
            .map(|entry| entry.slot)
    }

    fn insert(
        &mut self,
        name: &[u8],
        locale: Locale,
        bytes: Vec<u8>,
        mut flags: FileFlags,
    ) -> ListfileResult<usize> {
        let start = self.probe_start(name);
        let mut slot = start;
        while self.hash_table[slot].is_live() {
            slot = (slot + 1) & self.table_mask();
            if slot == start {
                return Err(ListfileError::HashTableFull);
            }
        }

        let index = self.records.len();
        let block_index = u32::try_from(index).map_err(|_| ListfileError::HashTableFull)?;
        flags.set(FileFlags::EXISTS);

        self.hash_table[slot] = HashSlot {
            name_a: hash_string(name, HashType::NameA),
            name_b: hash_string(name, HashType::NameB),
            locale,
            block_index,
        };
        self.records.push(FileRecord {
            name: Some(name.to_vec()),
            flags,
            locale,
            size: bytes.len() as u64,
        });
        self.data.push(StoredData {
            bytes,
            readable: None,
        });
        if let Some(extended) = &mut self.extended_index {
            extended.entry(name_hash64(name)).or_insert(index);
        }
        if !is_internal_name(name) {
            self.listfile_invalid = true;
        }

        Ok(index)
    }

    fn open_record(&self, index: usize) -> Box<dyn NameSource> {
        let stored = self.data[index].clone();
        match stored.readable {
            Some(readable) => Box::new(PartialStream {
                inner: Cursor::new(stored.bytes),
                readable,
            }),
            None => Box::new(Cursor::new(stored.bytes)),
        }
    }

    fn live_entries(&self, name: &[u8]) -> impl Iterator<Item = HashEntry> + '_ {
        self.probe_entries(name).into_iter().filter(|entry| {
            self.records
                .get(entry.block_index as usize)
                .is_some_and(FileRecord::exists)
        })
    }
}

impl ListfileArchive for MemoryArchive {
    type Writer = StagedStream;

    fn has_extended_index(&self) -> bool {
        self.extended_index.is_some()
    }

    fn find_in_extended_index(&self, name: &[u8]) -> Option<usize> {
        self.extended_index
            .as_ref()?
            .get(&name_hash64(name))
            .copied()
    }

    fn has_hash_table(&self) -> bool {
        self.expose_hash_table
    }

    fn first_hash_entry(&self, name: &[u8]) -> Option<HashEntry> {
        self.probe_first(name)
    }

    fn next_hash_entry(
        &self,
        name: &[u8],
        first: &HashEntry,
        current: &HashEntry,
    ) -> Option<HashEntry> {
        self.probe_next(name, first, current)
    }

    fn records(&self) -> &[FileRecord] {
        &self.records
    }

    fn record_mut(&mut self, index: usize) -> Option<&mut FileRecord> {
        self.records.get_mut(index)
    }

    fn open_stream(&self, name: &str, scope: OpenScope) -> ListfileResult<Box<dyn NameSource>> {
        let entry = match scope {
            OpenScope::LocalFile => {
                let file = File::open(name).map_err(|e| {
                    if e.kind() == io::ErrorKind::NotFound {
                        ListfileError::NotFound(name.to_string())
                    } else {
                        ListfileError::Io(e)
                    }
                })?;
                debug!("Opened local file {name}");
                return Ok(Box::new(file));
            }
            OpenScope::AnyLocale => self.live_entries(name.as_bytes()).next(),
            OpenScope::Locale(locale) => {
                let entries: Vec<HashEntry> = self.live_entries(name.as_bytes()).collect();
                entries
                    .iter()
                    .find(|entry| entry.locale == locale)
                    .or_else(|| entries.iter().find(|entry| entry.locale.is_neutral()))
                    .copied()
            }
        };

        let entry = entry.ok_or_else(|| ListfileError::NotFound(name.to_string()))?;
        Ok(self.open_record(entry.block_index as usize))
    }

    fn create_stream(
        &mut self,
        name: &str,
        options: CreateOptions,
    ) -> ListfileResult<StagedStream> {
        if !options.replace_existing
            && self.find_slot(name.as_bytes(), options.locale).is_some()
        {
            return Err(ListfileError::AlreadyExists(name.to_string()));
        }

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(usize::try_from(options.size).unwrap_or(usize::MAX))?;

        Ok(StagedStream {
            name: name.to_string(),
            options,
            buffer,
        })
    }

    fn finish_stream(&mut self, writer: StagedStream) -> ListfileResult<()> {
        let StagedStream {
            name,
            options,
            buffer,
        } = writer;

        let actual = buffer.len() as u64;
        if actual != options.size {
            return Err(ListfileError::SizeMismatch {
                expected: options.size,
                actual,
            });
        }

        match self.find_slot(name.as_bytes(), options.locale) {
            Some(_) if !options.replace_existing => Err(ListfileError::AlreadyExists(name)),
            Some(slot) => {
                let index = self.hash_table[slot].block_index as usize;
                let mut flags = options.flags;
                flags.set(FileFlags::EXISTS);
                self.records[index] = FileRecord {
                    name: Some(name.into_bytes()),
                    flags,
                    locale: options.locale,
                    size: actual,
                };
                self.data[index] = StoredData {
                    bytes: buffer,
                    readable: None,
                };
                Ok(())
            }
            None => self
                .insert(name.as_bytes(), options.locale, buffer, options.flags)
                .map(|_| ()),
        }
    }

    fn format_version(&self) -> FormatVersion {
        self.format
    }

    fn listfile_flags(&self) -> FileFlags {
        self.listfile_flags
    }

    fn set_listfile_flags(&mut self, flags: FileFlags) {
        self.listfile_flags = flags;
    }

    fn is_listfile_invalid(&self) -> bool {
        self.listfile_invalid
    }

    fn clear_listfile_invalid(&mut self) {
        self.listfile_invalid = false;
    }

    fn patch_count(&self) -> usize {
        self.patches.len()
    }

    fn patch_mut(&mut self, index: usize) -> Option<&mut Self> {
        self.patches.get_mut(index)
    }
}

fn lossy(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

/// Pending member content; committed by [`ListfileArchive::finish_stream`]
#[derive(Debug)]
pub struct StagedStream {
    name: String,
    options: CreateOptions,
    buffer: Vec<u8>,
}

impl StagedStream {
    /// Name the stream will be stored under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.buffer.len() as u64
    }
}

impl Write for StagedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Stream whose tail is missing: reports the full size, reads end early
struct PartialStream {
    inner: Cursor<Vec<u8>>,
    readable: u64,
}

impl Read for PartialStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let position = self.inner.position();
        if position >= self.readable {
            return Ok(0);
        }
        let room = usize::try_from(self.readable - position).unwrap_or(usize::MAX);
        let len = buf.len().min(room);
        self.inner.read(&mut buf[..len])
    }
}

impl Seek for PartialStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
