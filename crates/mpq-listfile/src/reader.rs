//! Paged listfile reader
//!
//! A listfile is read one fixed-size page at a time, so memory use stays
//! bounded no matter how large the catalog is. Names are separated by CR
//! and/or LF; any run of bytes `<= 0x20` between names is skipped.
//!
//! Blizzard patch archives annotate names with their provenance:
//!
//! ```text
//! Pass1\Files\MacOS\unconditional\user\Info.plist~Patch(Data#frFR#base-frFR,1326)
//! ```
//!
//! The annotation is removed while reading (see [`strip_patch_suffix`]).
//!
//! A stream that cannot deliver a full page (partial or damaged archives)
//! ends the name sequence instead of failing it, so callers still get every
//! name in the readable prefix and nothing from past the damage.
//!
//! A line that holds nothing but an annotation is skipped rather than taken
//! as the end of the listfile.

use crate::config::ListfileConfig;
use crate::error::{ListfileError, ListfileResult};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use tracing::{debug, trace, warn};

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

/// Paging state over one opened name source
///
/// The cache never owns the stream; every call that needs bytes takes it as
/// an argument. This lets a caller that owns the stream (the enumeration
/// cursor) keep both side by side.
#[derive(Debug)]
pub struct NameCache {
    mask: Option<String>,
    file_size: u64,
    page_offset: u64,
    page_size: usize,
    max_name_length: usize,
    buffer: Vec<u8>,
    pos: usize,
    end: usize,
    exhausted: bool,
}

impl NameCache {
    /// Load the first page of `stream`.
    ///
    /// # Errors
    ///
    /// - `EmptySource` if the stream is empty or the first page reads nothing
    /// - `NotEnoughMemory` if the page buffer cannot be allocated
    /// - `InvalidConfig` if `config` does not validate
    pub fn open<S: Read + Seek + ?Sized>(
        stream: &mut S,
        mask: Option<&str>,
        config: &ListfileConfig,
    ) -> ListfileResult<Self> {
        config.validate()?;

        let file_size = stream.seek(SeekFrom::End(0))?;
        if file_size == 0 {
            return Err(ListfileError::EmptySource);
        }
        stream.seek(SeekFrom::Start(0))?;

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(config.page_size)?;
        buffer.resize(config.page_size, 0);

        let mut cache = Self {
            mask: mask.map(str::to_string),
            file_size,
            page_offset: 0,
            page_size: config.page_size,
            max_name_length: config.max_name_length,
            buffer,
            pos: 0,
            end: 0,
            exhausted: false,
        };

        let wanted = cache.page_len_at(0);
        let loaded = fill_page(stream, &mut cache.buffer[..wanted]);
        if loaded == 0 {
            return Err(ListfileError::EmptySource);
        }
        cache.end = loaded;
        if loaded < wanted {
            cache.end_after_short_page(wanted, loaded);
        }

        debug!(
            "Opened name source: {} bytes, page size {}",
            file_size, config.page_size
        );
        Ok(cache)
    }

    /// Mask supplied at open time
    pub fn mask(&self) -> Option<&str> {
        self.mask.as_deref()
    }

    /// Total size of the underlying stream
    pub const fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Absolute stream offset of the next unread byte
    pub const fn position(&self) -> u64 {
        self.page_offset + self.pos as u64
    }

    /// Name buffer capacity this cache was configured with
    pub const fn max_name_length(&self) -> usize {
        self.max_name_length
    }

    fn page_len_at(&self, offset: u64) -> usize {
        let remaining = self.file_size.saturating_sub(offset);
        usize::try_from(remaining).map_or(self.page_size, |r| r.min(self.page_size))
    }

    /// Load the next page once the current one is consumed.
    ///
    /// Returns the number of bytes loaded; `0` means the sequence is over,
    /// either because the stream ended or because a page could not be read.
    fn reload<S: Read + Seek + ?Sized>(&mut self, stream: &mut S) -> usize {
        if self.pos < self.end {
            return self.end - self.pos;
        }
        if self.exhausted {
            return 0;
        }

        self.page_offset += self.page_size as u64;
        if self.page_offset >= self.file_size {
            self.exhausted = true;
            return 0;
        }

        let wanted = self.page_len_at(self.page_offset);
        if let Err(e) = stream.seek(SeekFrom::Start(self.page_offset)) {
            warn!("Cannot seek name source to {}: {e}", self.page_offset);
            self.exhausted = true;
            return 0;
        }

        let loaded = fill_page(stream, &mut self.buffer[..wanted]);
        if loaded == 0 {
            warn!(
                "Name source unreadable at offset {} of {}, ending name sequence",
                self.page_offset, self.file_size
            );
            self.exhausted = true;
            return 0;
        }

        trace!("Loaded {} bytes at offset {}", loaded, self.page_offset);
        self.pos = 0;
        self.end = loaded;
        if loaded < wanted {
            self.end_after_short_page(wanted, loaded);
        }
        loaded
    }

    /// Serve what a short page delivered, then stop. Reading on at the next
    /// page would splice a truncated line onto the one after the damage.
    fn end_after_short_page(&mut self, wanted: usize, loaded: usize) {
        warn!(
            "Name source short at offset {} ({} of {} bytes), ending name sequence after it",
            self.page_offset, loaded, wanted
        );
        self.exhausted = true;
    }

    /// Make sure at least one unread byte is in the window
    fn ensure_byte<S: Read + Seek + ?Sized>(&mut self, stream: &mut S) -> Option<u8> {
        if self.pos == self.end && self.reload(stream) == 0 {
            return None;
        }
        Some(self.buffer[self.pos])
    }

    /// Read the raw bytes of the next line into `out`.
    ///
    /// At most `max_len - 1` bytes are kept; the remainder of an overlong
    /// line is skipped. A trailing patch annotation is removed. Returns the
    /// number of bytes in `out`; `0` means no more names.
    pub fn read_line_bytes<S: Read + Seek + ?Sized>(
        &mut self,
        stream: &mut S,
        max_len: usize,
        out: &mut Vec<u8>,
    ) -> usize {
        let limit = max_len.saturating_sub(1);

        loop {
            out.clear();

            // Skip newlines, spaces, tabs and other non-printable bytes
            loop {
                match self.ensure_byte(stream) {
                    None => return 0,
                    Some(b) if b > 0x20 => break,
                    Some(_) => self.pos += 1,
                }
            }

            let mut hit_limit = true;
            while out.len() < limit {
                match self.ensure_byte(stream) {
                    Some(b) if b != CR && b != LF => {
                        out.push(b);
                        self.pos += 1;
                    }
                    _ => {
                        hit_limit = false;
                        break;
                    }
                }
            }

            if hit_limit {
                while let Some(b) = self.ensure_byte(stream) {
                    if b == CR || b == LF {
                        break;
                    }
                    self.pos += 1;
                }
            }

            let kept = strip_patch_suffix(out).len();
            out.truncate(kept);

            // A line holding nothing but an annotation is not a name
            if !out.is_empty() || limit == 0 {
                return out.len();
            }
        }
    }

    /// Read the next name, or an empty string once the sequence is over
    pub fn read_line<S: Read + Seek + ?Sized>(&mut self, stream: &mut S, max_len: usize) -> String {
        let mut bytes = Vec::new();
        if self.read_line_bytes(stream, max_len, &mut bytes) == 0 {
            return String::new();
        }

        match String::from_utf8(bytes) {
            Ok(name) => name,
            Err(e) => {
                let name = String::from_utf8_lossy(e.as_bytes()).into_owned();
                debug!("Name is not valid UTF-8, decoded lossily: {name}");
                name
            }
        }
    }

    /// Read the next name with the configured buffer capacity
    pub fn next_name<S: Read + Seek + ?Sized>(&mut self, stream: &mut S) -> Option<String> {
        let name = self.read_line(stream, self.max_name_length);
        (!name.is_empty()).then_some(name)
    }

    /// Read the next name as raw bytes, without any decoding
    pub fn next_name_bytes<S: Read + Seek + ?Sized>(&mut self, stream: &mut S) -> Option<Vec<u8>> {
        let mut name = Vec::new();
        let len = self.read_line_bytes(stream, self.max_name_length, &mut name);
        (len != 0).then_some(name)
    }
}

/// Read until `buf` is full, the stream ends, or the stream fails
fn fill_page<S: Read + ?Sized>(stream: &mut S, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("Read from name source failed: {e}");
                break;
            }
        }
    }
    filled
}

/// Remove a `~P...` patch annotation from a name.
///
/// Only the last `~` is considered, and only when the byte right after it is
/// `P`. Any other `~` is a legitimate path character and stays.
///
/// ```
/// use mpq_listfile::reader::strip_patch_suffix;
///
/// assert_eq!(strip_patch_suffix(b"foo/bar.txt~Patch(Data#1)"), b"foo/bar.txt");
/// assert_eq!(strip_patch_suffix(b"foo/bar~baz.txt"), b"foo/bar~baz.txt");
/// ```
pub fn strip_patch_suffix(line: &[u8]) -> &[u8] {
    match line.iter().rposition(|&b| b == b'~') {
        Some(tilde) if line.get(tilde + 1) == Some(&b'P') => &line[..tilde],
        _ => line,
    }
}

/// Non-owning reader over an opened stream
///
/// The stream stays with the caller and is left open when the reader is
/// dropped.
pub struct PagedNameReader<'a, S: ?Sized> {
    stream: &'a mut S,
    cache: NameCache,
}

impl<'a, S: Read + Seek + ?Sized> PagedNameReader<'a, S> {
    /// Open a reader over `stream` with the default configuration
    pub fn new(stream: &'a mut S) -> ListfileResult<Self> {
        Self::with_config(stream, None, &ListfileConfig::default())
    }

    /// Open a reader with an optional mask and explicit configuration
    pub fn with_config(
        stream: &'a mut S,
        mask: Option<&str>,
        config: &ListfileConfig,
    ) -> ListfileResult<Self> {
        let cache = NameCache::open(stream, mask, config)?;
        Ok(Self { stream, cache })
    }

    /// Read the next name with an explicit buffer capacity
    pub fn read_line(&mut self, max_len: usize) -> String {
        self.cache.read_line(&mut *self.stream, max_len)
    }

    /// Next name as raw bytes
    pub fn next_bytes(&mut self) -> Option<Vec<u8>> {
        self.cache.next_name_bytes(&mut *self.stream)
    }

    /// The paging state
    pub const fn cache(&self) -> &NameCache {
        &self.cache
    }

    /// Release the page buffer, leaving the stream open
    pub fn close(self) {}
}

impl<S: Read + Seek + ?Sized> Iterator for PagedNameReader<'_, S> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.cache.next_name(&mut *self.stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::{self, Cursor};

    fn names_with_page(data: &[u8], page_size: usize) -> Vec<String> {
        let mut stream = Cursor::new(data.to_vec());
        let config = ListfileConfig::new().with_page_size(page_size);
        PagedNameReader::with_config(&mut stream, None, &config)
            .expect("Test operation should succeed")
            .collect()
    }

    /// Stream that reports its full size but fails every read past `readable`
    struct DamagedStream {
        inner: Cursor<Vec<u8>>,
        readable: u64,
    }

    impl Read for DamagedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.inner.position() >= self.readable {
                return Err(io::Error::other("sector checksum mismatch"));
            }
            let room = (self.readable - self.inner.position()) as usize;
            let len = buf.len().min(room);
            self.inner.read(&mut buf[..len])
        }
    }

    impl Seek for DamagedStream {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_basic_lines() {
        let names = names_with_page(b"a.txt\r\nb.txt\r\n\r\n  c.txt\n", 0x1000);
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn test_no_trailing_newline() {
        assert_eq!(names_with_page(b"one\r\ntwo", 4), vec!["one", "two"]);
    }

    #[test]
    fn test_inner_spaces_kept() {
        assert_eq!(
            names_with_page(b"Background Downloader.app\\Info.plist\r\n", 7),
            vec!["Background Downloader.app\\Info.plist"]
        );
    }

    #[test]
    fn test_patch_suffix_stripped() {
        let names = names_with_page(
            b"foo/bar.txt~Patch(Data#1)\r\nfoo/bar~baz.txt\r\n",
            0x1000,
        );
        assert_eq!(names, vec!["foo/bar.txt", "foo/bar~baz.txt"]);
    }

    #[test]
    fn test_only_last_tilde_counts() {
        assert_eq!(strip_patch_suffix(b"a~Pb~c"), b"a~Pb~c");
        assert_eq!(strip_patch_suffix(b"a~b~P"), b"a~b");
        assert_eq!(strip_patch_suffix(b"trailing~"), b"trailing~");
        assert_eq!(strip_patch_suffix(b"~p(lower)"), b"~p(lower)");
    }

    #[test]
    fn test_annotation_only_line_skipped() {
        assert_eq!(names_with_page(b"~Patch(x)\r\nreal.txt\r\n", 8), vec!["real.txt"]);
    }

    #[test]
    fn test_empty_source() {
        let mut stream = Cursor::new(Vec::new());
        assert!(matches!(
            PagedNameReader::new(&mut stream),
            Err(ListfileError::EmptySource)
        ));
    }

    #[test]
    fn test_whitespace_only_source() {
        assert!(names_with_page(b" \r\n\t\r\n", 2).is_empty());
    }

    #[test]
    fn test_overlong_line_truncated() {
        let mut stream = Cursor::new(b"abcdefghij\r\nxyz\r\n".to_vec());
        let mut reader = PagedNameReader::new(&mut stream).expect("Test operation should succeed");
        assert_eq!(reader.read_line(5), "abcd");
        assert_eq!(reader.read_line(5), "xyz");
        assert_eq!(reader.read_line(5), "");
    }

    #[test]
    fn test_damaged_block_ends_sequence() {
        let data = b"first.txt\r\nsecond.txt\r\nthird.txt\r\n".to_vec();
        let mut stream = DamagedStream {
            inner: Cursor::new(data),
            readable: 16,
        };
        let config = ListfileConfig::new().with_page_size(16);
        let names: Vec<String> = PagedNameReader::with_config(&mut stream, None, &config)
            .expect("Test operation should succeed")
            .collect();
        // The name crossing into the unreadable page keeps only its readable prefix
        assert_eq!(names, vec!["first.txt", "secon"]);
    }

    /// Stream with an unreadable region in the middle
    struct HoleStream {
        inner: Cursor<Vec<u8>>,
        hole: std::ops::Range<u64>,
    }

    impl Read for HoleStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let position = self.inner.position();
            if self.hole.contains(&position) {
                return Err(io::Error::other("bad sector"));
            }
            let len = if position < self.hole.start {
                buf.len().min((self.hole.start - position) as usize)
            } else {
                buf.len()
            };
            self.inner.read(&mut buf[..len])
        }
    }

    impl Seek for HoleStream {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_unreadable_block_mid_file_ends_sequence() {
        let data = b"aaaaaaaaaaaaaa\r\nbbbbbbbbbbbbbb\r\ncccccccccccccc\r\n".to_vec();
        let mut stream = HoleStream {
            inner: Cursor::new(data),
            hole: 20..32,
        };
        let config = ListfileConfig::new().with_page_size(16);
        let names: Vec<String> = PagedNameReader::with_config(&mut stream, None, &config)
            .expect("Test operation should succeed")
            .collect();
        // Nothing from past the hole, and no name glued across it
        assert_eq!(names, vec!["aaaaaaaaaaaaaa", "bbbb"]);
    }

    #[test]
    fn test_unreadable_block_in_first_page() {
        let data = b"first\r\nsecond\r\nthird\r\n".to_vec();
        let mut stream = HoleStream {
            inner: Cursor::new(data),
            hole: 10..12,
        };
        let config = ListfileConfig::new().with_page_size(64);
        let names: Vec<String> = PagedNameReader::with_config(&mut stream, None, &config)
            .expect("Test operation should succeed")
            .collect();
        assert_eq!(names, vec!["first", "sec"]);
    }

    #[test]
    fn test_non_utf8_bytes_kept() {
        let mut stream = Cursor::new(b"Sound\\\xC4rger.wav\r\nplain.txt\r\n".to_vec());
        let mut reader = PagedNameReader::new(&mut stream).expect("Test operation should succeed");
        assert_eq!(reader.next_bytes().as_deref(), Some(&b"Sound\\\xC4rger.wav"[..]));
        assert_eq!(reader.next().as_deref(), Some("plain.txt"));
        assert_eq!(reader.next_bytes(), None);
    }

    #[test]
    fn test_reader_leaves_stream_usable() {
        let mut stream = Cursor::new(b"a\r\nb\r\n".to_vec());
        {
            let reader = PagedNameReader::new(&mut stream).expect("Test operation should succeed");
            assert_eq!(reader.cache().file_size(), 6);
            reader.close();
        }
        stream.set_position(0);
        let mut first = [0u8; 1];
        stream.read_exact(&mut first).expect("Test operation should succeed");
        assert_eq!(&first, b"a");
    }

    #[test]
    fn test_position_is_monotonic() {
        let mut stream = Cursor::new(b"aa\r\nbbb\r\ncccc\r\nd\r\n".to_vec());
        let config = ListfileConfig::new().with_page_size(3);
        let mut cache =
            NameCache::open(&mut stream, Some("*.txt"), &config).expect("Test operation should succeed");
        assert_eq!(cache.mask(), Some("*.txt"));

        let mut last = cache.position();
        while cache.next_name(&mut stream).is_some() {
            assert!(cache.position() >= last);
            last = cache.position();
        }
    }

    proptest! {
        #[test]
        fn prop_page_size_independent(
            names in prop::collection::vec("[A-Za-z0-9_\\\\.~ ]{1,24}", 0..20),
            page_size in 1usize..64,
        ) {
            let mut data = Vec::new();
            for name in &names {
                data.extend_from_slice(name.as_bytes());
                data.extend_from_slice(b"\r\n");
            }
            prop_assume!(!data.is_empty());

            let reference = names_with_page(&data, 0x1000);
            prop_assert_eq!(names_with_page(&data, page_size), reference);
        }

        #[test]
        fn prop_line_never_exceeds_limit(
            data in prop::collection::vec(any::<u8>(), 1..512),
            max_len in 2usize..40,
            page_size in 1usize..32,
        ) {
            let mut stream = Cursor::new(data);
            let config = ListfileConfig::new().with_page_size(page_size);
            if let Ok(mut cache) = NameCache::open(&mut stream, None, &config) {
                let mut out = Vec::new();
                loop {
                    let len = cache.read_line_bytes(&mut stream, max_len, &mut out);
                    prop_assert!(len <= max_len - 1);
                    prop_assert_eq!(len, out.len());
                    if len == 0 {
                        break;
                    }
                }
            }
        }
    }
}
