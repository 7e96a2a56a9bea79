//! Attaching recovered names to file records
//!
//! One name can stand for several records: the same member stored once per
//! locale. Every one of them receives the name.

use crate::archive::ListfileArchive;
use crate::error::{ListfileError, ListfileResult};
use tracing::trace;

/// Attach `name` to every locale variant of the member it hashes to.
///
/// Returns the number of records the name now refers to (records that were
/// already named count too; their names are left untouched).
///
/// # Errors
///
/// Returns `CanNotComplete` if no index entry references the name.
pub fn assign_name_for_all_locales<A: ListfileArchive>(
    archive: &mut A,
    name: impl AsRef<[u8]>,
) -> ListfileResult<usize> {
    let name = name.as_ref();
    let unknown = || ListfileError::CanNotComplete(String::from_utf8_lossy(name).into_owned());

    if archive.has_extended_index() {
        let index = archive.find_in_extended_index(name).ok_or_else(unknown)?;

        if let Some(record) = archive.record_mut(index) {
            record.attach_name(name);
        }
        return Ok(1);
    }

    if !archive.has_hash_table() {
        return Err(unknown());
    }

    let record_count = archive.records().len();
    let block_indices: Vec<u32> = archive
        .hash_entries(name)
        .map(|entry| entry.block_index)
        .collect();

    if block_indices.is_empty() {
        return Err(unknown());
    }

    let mut attached = 0;
    for block_index in block_indices {
        let index = block_index as usize;
        if index >= record_count {
            trace!(
                "Hash entry for {} points past the file table ({block_index})",
                String::from_utf8_lossy(name)
            );
            continue;
        }
        if let Some(record) = archive.record_mut(index) {
            record.attach_name(name);
            attached += 1;
        }
    }

    Ok(attached)
}
