//! Wildcard-filtered enumeration of a listfile
//!
//! A [`ListfileFinder`] scans one listfile from the start and yields every
//! name the mask accepts. It cannot be rewound; open a new one to scan
//! again.

use crate::archive::{ListfileArchive, NameSource, OpenScope};
use crate::config::ListfileConfig;
use crate::error::{ListfileError, ListfileResult};
use crate::names::LISTFILE_NAME;
use crate::reader::NameCache;
use crate::wildcard::WildcardMask;
use std::fmt;
use tracing::debug;

/// Lifecycle of a [`ListfileFinder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Names may still follow
    Scanning,
    /// The listfile has been read to its end
    Exhausted,
    /// Resources were released
    Closed,
}

/// Enumeration cursor over a listfile
///
/// The cursor owns the stream it was opened on and releases it on
/// [`ListfileFinder::close`] or drop.
pub struct ListfileFinder {
    stream: Option<Box<dyn NameSource>>,
    cache: Option<NameCache>,
    mask: WildcardMask,
    state: CursorState,
}

impl ListfileFinder {
    /// Open the archive's own listfile, or the local file at `listfile`
    pub fn open<A: ListfileArchive>(
        archive: &A,
        listfile: Option<&str>,
        mask: Option<&str>,
    ) -> ListfileResult<Self> {
        Self::open_with_config(archive, listfile, mask, &ListfileConfig::default())
    }

    /// Open with an explicit reader configuration.
    ///
    /// The internal listfile is opened whatever its locale, since some
    /// archives only carry a localized copy.
    ///
    /// # Errors
    ///
    /// Propagates the open error (usually `NotFound`); fails with
    /// `FileCorrupt` if the stream cannot be paged.
    pub fn open_with_config<A: ListfileArchive>(
        archive: &A,
        listfile: Option<&str>,
        mask: Option<&str>,
        config: &ListfileConfig,
    ) -> ListfileResult<Self> {
        let stream = match listfile {
            None => archive.open_stream(LISTFILE_NAME, OpenScope::AnyLocale)?,
            Some(path) => archive.open_stream(path, OpenScope::LocalFile)?,
        };
        Self::from_stream(stream, mask, config)
    }

    /// Build a cursor over an already opened stream, taking ownership of it
    pub fn from_stream(
        mut stream: Box<dyn NameSource>,
        mask: Option<&str>,
        config: &ListfileConfig,
    ) -> ListfileResult<Self> {
        config.validate()?;
        let wildcard = WildcardMask::new(mask)?;
        let cache = NameCache::open(stream.as_mut(), mask, config)
            .map_err(|e| ListfileError::FileCorrupt(e.to_string()))?;

        debug!("Listfile enumeration started, mask {:?}", mask);
        Ok(Self {
            stream: Some(stream),
            cache: Some(cache),
            mask: wildcard,
            state: CursorState::Scanning,
        })
    }

    /// Current state
    pub const fn state(&self) -> CursorState {
        self.state
    }

    /// Mask names are filtered with
    pub fn mask(&self) -> Option<&str> {
        self.mask.as_str()
    }

    /// Next matching name.
    ///
    /// # Errors
    ///
    /// Returns `NoMoreFiles` once the listfile is exhausted or the cursor is
    /// closed.
    pub fn find_next(&mut self) -> ListfileResult<String> {
        self.next().ok_or(ListfileError::NoMoreFiles)
    }

    /// Next matching name as the listfile spells it, byte for byte.
    ///
    /// The mask is applied to a lossy decoding of the name.
    pub fn next_bytes(&mut self) -> Option<Vec<u8>> {
        if self.state != CursorState::Scanning {
            return None;
        }
        let (Some(cache), Some(stream)) = (self.cache.as_mut(), self.stream.as_mut()) else {
            return None;
        };

        loop {
            let Some(name) = cache.next_name_bytes(stream.as_mut()) else {
                self.state = CursorState::Exhausted;
                return None;
            };
            if self.mask.matches(&String::from_utf8_lossy(&name)) {
                return Some(name);
            }
        }
    }

    /// Release the page buffer and the stream. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.cache = None;
        self.stream = None;
        self.state = CursorState::Closed;
    }
}

impl Iterator for ListfileFinder {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.next_bytes()
            .map(|name| String::from_utf8_lossy(&name).into_owned())
    }
}

impl fmt::Debug for ListfileFinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListfileFinder")
            .field("mask", &self.mask.as_str())
            .field("state", &self.state)
            .field("position", &self.cache.as_ref().map(NameCache::position))
            .finish_non_exhaustive()
    }
}

/// Open a cursor and fetch its first matching name.
///
/// # Errors
///
/// Fails like [`ListfileFinder::open`], or with `NoMoreFiles` when no name
/// matches.
pub fn find_first<A: ListfileArchive>(
    archive: &A,
    listfile: Option<&str>,
    mask: Option<&str>,
) -> ListfileResult<(ListfileFinder, String)> {
    let mut finder = ListfileFinder::open(archive, listfile, mask)?;
    let first = finder.find_next()?;
    Ok((finder, first))
}
