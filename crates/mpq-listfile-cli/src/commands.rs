//! Command handlers

use anyhow::{Context, Result};
use mpq_listfile::{CanonicalNameList, ListfileConfig, ListfileFinder, PagedNameReader};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Print every name of `listfile` matching `mask`, one per line.
///
/// Names are written as stored, without re-encoding. Returns the number of
/// names printed.
pub fn list<W: Write>(
    listfile: &Path,
    mask: Option<&str>,
    config: &ListfileConfig,
    out: &mut W,
) -> Result<usize> {
    let file = File::open(listfile)
        .with_context(|| format!("cannot open listfile {}", listfile.display()))?;
    let mut finder = ListfileFinder::from_stream(Box::new(file), mask, config)
        .with_context(|| format!("cannot read listfile {}", listfile.display()))?;

    let mut count = 0;
    while let Some(name) = finder.next_bytes() {
        out.write_all(&name)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    out.flush()?;

    debug!("Listed {count} names from {}", listfile.display());
    Ok(count)
}

/// Merge `inputs` into a canonical listfile.
///
/// Inputs that cannot be opened or are empty are skipped with a warning.
/// Returns the number of names written.
pub fn canonicalize(
    inputs: &[impl AsRef<Path>],
    output: Option<&Path>,
    config: &ListfileConfig,
) -> Result<usize> {
    let list = merge_inputs(inputs, config)?;

    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("cannot create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            list.write_to(&mut writer)?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            list.write_to(&mut lock)?;
            lock.flush()?;
        }
    }

    Ok(list.len())
}

fn merge_inputs(inputs: &[impl AsRef<Path>], config: &ListfileConfig) -> Result<CanonicalNameList> {
    let mut list = CanonicalNameList::new();

    for input in inputs {
        let path = input.as_ref();
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                continue;
            }
        };
        let mut reader = match PagedNameReader::with_config(&mut file, None, config) {
            Ok(reader) => reader,
            Err(e) if e.is_soft() => {
                warn!("Skipping {}: {e}", path.display());
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let before = list.len();
        while let Some(name) = reader.next_bytes() {
            list.push(name);
        }
        debug!("Read {} names from {}", list.len() - before, path.display());
    }

    list.finalize();
    Ok(list)
}
