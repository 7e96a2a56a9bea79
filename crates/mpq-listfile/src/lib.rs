//! Listfile support for MPQ archives
//!
#![allow(clippy::cast_possible_truncation)] // Hash table indices fit the table
#![allow(clippy::doc_markdown)] // MPQ-specific terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::missing_errors_doc)] // Error variants are documented on the enum
//! MPQ archives store members by hash, not by name. The `(listfile)` member
//! is a plain text catalog of member names that lets tools recover them.
//! This crate reads such catalogs, attaches the names to an archive's file
//! table, enumerates them with wildcard masks and regenerates the catalog
//! after the archive changed.
//!
//! # Components
//!
//! - **Reader**: paged, bounded-memory name reader ([`PagedNameReader`])
//! - **Ingestion**: loading names into an archive and its patch chain
//!   ([`add_listfile`])
//! - **Rebuild**: writing a sorted, deduplicated listfile ([`rebuild_and_save`])
//! - **Enumeration**: wildcard-filtered cursor over a listfile
//!   ([`ListfileFinder`])
//!
//! Archive access goes through the [`ListfileArchive`] trait.
//! [`MemoryArchive`] implements it in memory.
//!
//! # Example
//!
//! ```
//! use mpq_listfile::{Locale, MemoryArchive, add_listfile, rebuild_and_save};
//!
//! let mut archive = MemoryArchive::new(16);
//! archive.add_file("war3map.j", Locale::NEUTRAL, b"globals".to_vec())?;
//! archive.forget_names();
//!
//! let mut names = std::io::Cursor::new(b"war3map.j\r\n".to_vec());
//! let report = mpq_listfile::add_arbitrary_listfile(
//!     &mut archive,
//!     &mut names,
//!     &mpq_listfile::ListfileConfig::default(),
//! )?;
//! assert_eq!(report.names_assigned, 1);
//!
//! assert_eq!(rebuild_and_save(&mut archive)?, 1);
//! let again = add_listfile(&mut archive, None)?;
//! assert_eq!(again.sources_read, 1);
//! # Ok::<(), mpq_listfile::ListfileError>(())
//! ```

#![warn(missing_docs)]

pub mod archive;
pub mod assign;
pub mod canonical;
pub mod config;
pub mod cursor;
pub mod error;
/// MPQ name hashing
pub mod hash;
pub mod ingest;
pub mod memory;
/// Reserved and placeholder member names
pub mod names;
pub mod reader;
/// Wildcard masks for enumeration
pub mod wildcard;

pub use archive::{
    CreateOptions, FileFlags, FileRecord, FormatVersion, HashEntry, ListfileArchive, Locale,
    NameSource, OpenScope,
};
pub use assign::assign_name_for_all_locales;
pub use canonical::{CanonicalNameList, compare_names, rebuild_and_save};
pub use config::ListfileConfig;
pub use cursor::{CursorState, ListfileFinder, find_first};
pub use error::{ListfileError, ListfileResult};
pub use ingest::{
    IngestOptions, IngestReport, add_arbitrary_listfile, add_listfile, add_listfile_with_options,
};
pub use memory::{MemoryArchive, StagedStream};
pub use names::{ATTRIBUTES_NAME, LISTFILE_NAME, SIGNATURE_NAME};
pub use reader::{NameCache, PagedNameReader, strip_patch_suffix};
pub use wildcard::WildcardMask;
