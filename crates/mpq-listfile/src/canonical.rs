//! Canonical listfile rebuild
//!
//! The stored listfile is regenerated from the names currently attached to
//! the file table: sorted case-insensitively, with case-insensitive
//! duplicates collapsed, one name per CRLF-terminated line.
//!
//! Locale variants of one member share a name, so they collapse to a single
//! line. Patch annotations are not written back; the catalog only lists
//! member names. Names are written byte for byte as they were read, whatever
//! code page they use.

use crate::archive::{CreateOptions, FileFlags, ListfileArchive, Locale};
use crate::error::ListfileResult;
use crate::names::LISTFILE_NAME;
use std::cmp::Ordering;
use std::io::{self, Write};
use tracing::{debug, warn};

const LINE_TERMINATOR: &[u8; 2] = b"\r\n";

/// Compare two names the way the listfile is ordered (ASCII case folded)
pub fn compare_names(a: &[u8], b: &[u8]) -> Ordering {
    a.iter()
        .map(u8::to_ascii_lowercase)
        .cmp(b.iter().map(u8::to_ascii_lowercase))
}

/// Sorted, case-insensitively unique list of names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalNameList {
    names: Vec<Vec<u8>>,
    sorted: bool,
}

impl CanonicalNameList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a finalized list from any collection of names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        let mut list = Self {
            names: names.into_iter().map(Into::into).collect(),
            sorted: false,
        };
        list.finalize();
        list
    }

    /// Reserve room for `additional` names, reporting allocation failure
    pub fn try_reserve(&mut self, additional: usize) -> ListfileResult<()> {
        self.names.try_reserve(additional)?;
        Ok(())
    }

    /// Add a name; the list must be finalized again before use
    pub fn push(&mut self, name: impl Into<Vec<u8>>) {
        self.names.push(name.into());
        self.sorted = false;
    }

    /// Sort and collapse case-insensitive duplicates.
    ///
    /// The sort is stable, so of several spellings of one name the one that
    /// was pushed first survives.
    pub fn finalize(&mut self) {
        if self.sorted {
            return;
        }
        self.names.sort_by(|a, b| compare_names(a, b));
        self.names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
        self.sorted = true;
    }

    /// The names, in listfile order once finalized
    pub fn names(&self) -> &[Vec<u8>] {
        &self.names
    }

    /// Number of names
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Size of the serialized listfile in bytes
    pub fn encoded_len(&self) -> u64 {
        self.names
            .iter()
            .map(|name| name.len() as u64 + LINE_TERMINATOR.len() as u64)
            .sum()
    }

    /// Write every name followed by CRLF
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        for name in &self.names {
            writer.write_all(name)?;
            writer.write_all(LINE_TERMINATOR)?;
        }
        Ok(())
    }

    /// Serialize into a byte vector
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(usize::try_from(self.encoded_len()).unwrap_or(0));
        for name in &self.names {
            out.extend_from_slice(name);
            out.extend_from_slice(LINE_TERMINATOR);
        }
        out
    }
}

/// Collect the names worth listing from an archive's file table
fn collect_names<A: ListfileArchive>(archive: &A) -> ListfileResult<CanonicalNameList> {
    let records = archive.records();
    let mut list = CanonicalNameList::new();
    list.try_reserve(records.len())?;

    for record in records {
        if !record.exists() {
            continue;
        }
        if let Some(name) = &record.name
            && !archive.is_pseudo_name(name)
            && !archive.is_internal_name(name)
        {
            list.push(name.as_slice());
        }
    }

    list.finalize();
    Ok(list)
}

/// Rebuild the archive's listfile from its named records and store it.
///
/// Returns the number of lines written. The new listfile only becomes
/// visible once the archive commits the finished stream, so a failure while
/// writing leaves the previous listfile in place.
///
/// # Errors
///
/// Returns `NotEnoughMemory` if the scratch list cannot be allocated, and
/// propagates any error from creating, writing or finishing the stream.
pub fn rebuild_and_save<A: ListfileArchive>(archive: &mut A) -> ListfileResult<usize> {
    let mut list = collect_names(archive)?;

    let flags = if list.is_empty() {
        list = CanonicalNameList::from_names([LISTFILE_NAME]);
        FileFlags::new(FileFlags::ENCRYPTED | FileFlags::COMPRESS)
    } else {
        if archive.listfile_flags().is_empty() {
            let defaults = archive.default_special_file_flags(list.encoded_len());
            archive.set_listfile_flags(defaults);
        }
        archive.listfile_flags()
    };

    let options = CreateOptions {
        size: list.encoded_len(),
        locale: Locale::NEUTRAL,
        flags,
        replace_existing: true,
    };
    debug!(
        "Saving listfile: {} names, {} bytes, flags {}",
        list.len(),
        options.size,
        flags
    );

    let mut writer = archive.create_stream(LISTFILE_NAME, options)?;
    if let Err(e) = list.write_to(&mut writer) {
        warn!("Writing listfile failed: {e}");
        return Err(e.into());
    }
    archive.finish_stream(writer)?;
    archive.clear_listfile_invalid();

    Ok(list.len())
}
