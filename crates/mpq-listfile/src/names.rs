//! Reserved stream names and name classifiers

/// Name of the listfile stream
pub const LISTFILE_NAME: &str = "(listfile)";

/// Name of the attributes stream
pub const ATTRIBUTES_NAME: &str = "(attributes)";

/// Name of the weak signature stream
pub const SIGNATURE_NAME: &str = "(signature)";

/// Streams registered as named records after every ingestion pass
pub const RESERVED_NAMES: [&str; 3] = [LISTFILE_NAME, SIGNATURE_NAME, ATTRIBUTES_NAME];

/// Check if a name is one of the reserved streams (case-insensitive)
pub fn is_internal_name(name: impl AsRef<[u8]>) -> bool {
    let name = name.as_ref();
    name.first() == Some(&b'(')
        && RESERVED_NAMES
            .iter()
            .any(|reserved| reserved.as_bytes().eq_ignore_ascii_case(name))
}

/// Record index encoded in a placeholder name such as `File00000042.wav`
///
/// Archives without a listfile expose their members under names of the form
/// `File` + eight decimal digits + `.` + extension.
pub fn pseudo_name_index(name: impl AsRef<[u8]>) -> Option<u32> {
    let bytes = name.as_ref();
    if bytes.len() < 13 || !bytes[..4].eq_ignore_ascii_case(b"file") || bytes[12] != b'.' {
        return None;
    }

    let digits = &bytes[4..12];
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    digits
        .iter()
        .try_fold(0u32, |acc, d| acc.checked_mul(10)?.checked_add(u32::from(d - b'0')))
}

/// Check if a name is a hash-derived placeholder
pub fn is_pseudo_name(name: impl AsRef<[u8]>) -> bool {
    pseudo_name_index(name).is_some()
}

/// Placeholder name for a record whose real name is unknown
pub fn pseudo_name(index: u32, extension: &str) -> String {
    format!("File{index:08}.{extension}")
}
