//! Bulk listfile ingestion
//!
//! Names are loaded into an archive and every archive of its patch chain,
//! either from the archives' own listfiles or from one external listfile.
//! Ingestion is best effort: a missing listfile, an unreadable one or a name
//! no index knows about is counted and skipped. Only running out of memory
//! (or an invalid configuration) stops it.
//!
//! The locale used to pick listfile copies is passed explicitly in
//! [`IngestOptions`]; ingestion never changes archive-wide state other than
//! record names.

use crate::archive::{ListfileArchive, Locale, NameSource, OpenScope};
use crate::assign::assign_name_for_all_locales;
use crate::config::ListfileConfig;
use crate::error::{ListfileError, ListfileResult};
use crate::names::{LISTFILE_NAME, RESERVED_NAMES};
use crate::reader::NameCache;
use std::ops::AddAssign;
use tracing::{debug, info, trace, warn};

/// Outcome of an ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Archives processed (primary plus patches)
    pub segments: usize,
    /// Listfiles read to their end
    pub sources_read: usize,
    /// Listfiles that could not be opened or paged
    pub sources_skipped: usize,
    /// Names read from all listfiles
    pub names_read: usize,
    /// Names attached to at least one index entry
    pub names_assigned: usize,
    /// Names no index entry referenced
    pub names_unmatched: usize,
}

impl IngestReport {
    /// Check if nothing was skipped
    pub const fn is_complete(&self) -> bool {
        self.sources_skipped == 0 && self.names_unmatched == 0
    }
}

impl AddAssign for IngestReport {
    fn add_assign(&mut self, other: Self) {
        self.segments += other.segments;
        self.sources_read += other.sources_read;
        self.sources_skipped += other.sources_skipped;
        self.names_read += other.names_read;
        self.names_assigned += other.names_assigned;
        self.names_unmatched += other.names_unmatched;
    }
}

/// Parameters for [`add_listfile_with_options`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// External listfile path; `None` reads the archives' own listfiles
    pub listfile: Option<String>,
    /// Locale used when an archive has a single listfile lookup
    pub preferred_locale: Locale,
    /// Reader configuration
    pub config: ListfileConfig,
}

impl IngestOptions {
    /// Options for an external listfile
    pub fn external(path: impl Into<String>) -> Self {
        Self {
            listfile: Some(path.into()),
            ..Self::default()
        }
    }

    /// Set the preferred locale
    #[must_use]
    pub const fn with_locale(mut self, locale: Locale) -> Self {
        self.preferred_locale = locale;
        self
    }

    /// Set the reader configuration
    #[must_use]
    pub const fn with_config(mut self, config: ListfileConfig) -> Self {
        self.config = config;
        self
    }
}

const fn is_fatal(error: &ListfileError) -> bool {
    matches!(
        error,
        ListfileError::NotEnoughMemory | ListfileError::InvalidConfig(_)
    )
}

/// Load names from `listfile` (or the archives' own listfiles) into the
/// archive and its whole patch chain
pub fn add_listfile<A: ListfileArchive>(
    archive: &mut A,
    listfile: Option<&str>,
) -> ListfileResult<IngestReport> {
    let options = IngestOptions {
        listfile: listfile.map(str::to_string),
        ..IngestOptions::default()
    };
    add_listfile_with_options(archive, &options)
}

/// Ingest with explicit options.
///
/// After each archive is processed, the reserved stream names are attached
/// too, so they are known to later lookups.
pub fn add_listfile_with_options<A: ListfileArchive>(
    archive: &mut A,
    options: &IngestOptions,
) -> ListfileResult<IngestReport> {
    options.config.validate()?;

    let mut report = ingest_segment(archive, options)?;
    for index in 0..archive.patch_count() {
        if let Some(patch) = archive.patch_mut(index) {
            report += ingest_segment(patch, options)?;
        }
    }

    info!(
        "Listfile ingestion: {} archives, {} listfiles read, {} skipped, {}/{} names assigned",
        report.segments,
        report.sources_read,
        report.sources_skipped,
        report.names_assigned,
        report.names_read
    );
    Ok(report)
}

/// Read every name from an opened stream and attach it to the archive.
///
/// The stream is left open.
///
/// # Errors
///
/// `NotEnoughMemory` if the page buffer cannot be allocated; `FileCorrupt`
/// for any other reason the stream cannot be paged.
pub fn add_arbitrary_listfile<A: ListfileArchive, S: NameSource + ?Sized>(
    archive: &mut A,
    stream: &mut S,
    config: &ListfileConfig,
) -> ListfileResult<IngestReport> {
    let mut cache = NameCache::open(stream, None, config).map_err(|e| match e {
        ListfileError::NotEnoughMemory | ListfileError::InvalidConfig(_) => e,
        other => ListfileError::FileCorrupt(other.to_string()),
    })?;

    let mut report = IngestReport {
        sources_read: 1,
        ..IngestReport::default()
    };

    // Raw bytes: the hash and the rewritten catalog must see the name as stored
    while let Some(name) = cache.next_name_bytes(stream) {
        report.names_read += 1;
        match assign_name_for_all_locales(archive, &name) {
            Ok(_) => report.names_assigned += 1,
            Err(e) if e.is_soft() => {
                trace!("Skipping name: {e}");
                report.names_unmatched += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

fn ingest_segment<A: ListfileArchive>(
    archive: &mut A,
    options: &IngestOptions,
) -> ListfileResult<IngestReport> {
    let mut report = IngestReport {
        segments: 1,
        ..IngestReport::default()
    };

    match &options.listfile {
        Some(path) => {
            report += ingest_source(archive, path, OpenScope::LocalFile, &options.config)?;
        }
        None if archive.has_hash_table() => {
            // One listfile per locale (BrooDat.mpq ships several)
            let locales: Vec<Locale> = archive
                .hash_entries(LISTFILE_NAME)
                .map(|entry| entry.locale)
                .collect();
            if locales.is_empty() {
                debug!("Archive has no listfile");
                report.sources_skipped += 1;
            }
            for locale in locales {
                report += ingest_source(
                    archive,
                    LISTFILE_NAME,
                    OpenScope::Locale(locale),
                    &options.config,
                )?;
            }
        }
        None => {
            report += ingest_source(
                archive,
                LISTFILE_NAME,
                OpenScope::Locale(options.preferred_locale),
                &options.config,
            )?;
        }
    }

    register_reserved_names(archive);
    Ok(report)
}

fn ingest_source<A: ListfileArchive>(
    archive: &mut A,
    name: &str,
    scope: OpenScope,
    config: &ListfileConfig,
) -> ListfileResult<IngestReport> {
    let skipped = IngestReport {
        sources_skipped: 1,
        ..IngestReport::default()
    };

    let mut stream = match archive.open_stream(name, scope.clone()) {
        Ok(stream) => stream,
        Err(e) if is_fatal(&e) => return Err(e),
        Err(e) => {
            warn!("Cannot open listfile {name} ({scope:?}): {e}");
            return Ok(skipped);
        }
    };

    debug!("Ingesting listfile {name} ({scope:?})");
    match add_arbitrary_listfile(archive, stream.as_mut(), config) {
        Ok(report) => Ok(report),
        Err(e) if is_fatal(&e) => Err(e),
        Err(e) => {
            warn!("Skipping listfile {name}: {e}");
            Ok(skipped)
        }
    }
}

fn register_reserved_names<A: ListfileArchive>(archive: &mut A) {
    for name in RESERVED_NAMES {
        if let Err(e) = assign_name_for_all_locales(archive, name) {
            trace!("Reserved stream not present: {e}");
        }
    }
}
