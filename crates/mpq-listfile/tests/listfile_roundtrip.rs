#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! End-to-end listfile tests
//!
//! Archives are built in memory, stripped of their names, and recovered
//! through ingestion; the rebuilt listfile is then enumerated again.

use mpq_listfile::{
    ATTRIBUTES_NAME, FileFlags, FormatVersion, IngestOptions, LISTFILE_NAME, ListfileArchive,
    ListfileConfig, ListfileError, ListfileFinder, Locale, MemoryArchive, PagedNameReader,
    SIGNATURE_NAME, add_listfile, add_listfile_with_options, assign_name_for_all_locales,
    rebuild_and_save,
};
use pretty_assertions::assert_eq;
use std::io::Cursor;

const MAP_FILES: [&str; 4] = [
    "war3map.j",
    "war3map.w3e",
    "Units\\Human\\Footman.mdx",
    "Sound\\Music\\mp3Music\\Human1.mp3",
];

fn map_archive() -> MemoryArchive {
    let mut archive = MemoryArchive::new(64);
    for name in MAP_FILES {
        archive
            .add_file(name, Locale::NEUTRAL, name.as_bytes().to_vec())
            .expect("Test operation should succeed");
    }
    archive
        .add_file(ATTRIBUTES_NAME, Locale::NEUTRAL, vec![0; 16])
        .expect("Test operation should succeed");
    archive
}

fn listfile_text(archive: &MemoryArchive) -> String {
    let bytes = archive
        .read_file(LISTFILE_NAME, Locale::NEUTRAL)
        .expect("Test operation should succeed");
    String::from_utf8(bytes).expect("Test operation should succeed")
}

fn named(archive: &MemoryArchive) -> Vec<String> {
    let mut names: Vec<String> = archive
        .records()
        .iter()
        .filter_map(|r| r.display_name().map(String::from))
        .collect();
    names.sort();
    names
}

#[test]
fn test_rebuild_then_recover_names() {
    let mut archive = map_archive();
    rebuild_and_save(&mut archive).expect("Test operation should succeed");
    let before = named(&archive);

    archive.forget_names();
    assert!(archive.records().iter().all(|r| r.name.is_none()));

    let report = add_listfile(&mut archive, None).expect("Test operation should succeed");
    assert_eq!(report.segments, 1);
    assert_eq!(report.sources_read, 1);
    assert_eq!(report.names_read, MAP_FILES.len());
    assert_eq!(report.names_assigned, MAP_FILES.len());
    assert!(report.is_complete());

    // Reserved streams come back too, although the listfile never lists them
    assert_eq!(named(&archive), before);
}

#[test]
fn test_listfile_content_is_canonical() {
    let mut archive = map_archive();
    rebuild_and_save(&mut archive).expect("Test operation should succeed");

    assert_eq!(
        listfile_text(&archive),
        "Sound\\Music\\mp3Music\\Human1.mp3\r\n\
         Units\\Human\\Footman.mdx\r\n\
         war3map.j\r\n\
         war3map.w3e\r\n"
    );
}

#[test]
fn test_enumerate_rebuilt_listfile() {
    let mut archive = map_archive();
    rebuild_and_save(&mut archive).expect("Test operation should succeed");

    let maps: Vec<String> = ListfileFinder::open(&archive, None, Some("WAR3MAP.*"))
        .expect("Test operation should succeed")
        .collect();
    assert_eq!(maps, vec!["war3map.j", "war3map.w3e"]);

    let models: Vec<String> = ListfileFinder::open(&archive, None, Some("units/*.mdx"))
        .expect("Test operation should succeed")
        .collect();
    assert_eq!(models, vec!["Units\\Human\\Footman.mdx"]);
}

#[test]
fn test_patch_chain_is_ingested() {
    let mut base = map_archive();
    rebuild_and_save(&mut base).expect("Test operation should succeed");

    let mut patch = MemoryArchive::with_extended_index(16).with_format(FormatVersion::V3);
    patch
        .add_file("war3map.j", Locale::NEUTRAL, b"patched".to_vec())
        .expect("Test operation should succeed");
    patch
        .add_file(SIGNATURE_NAME, Locale::NEUTRAL, vec![0; 8])
        .expect("Test operation should succeed");
    patch.forget_names();
    base.add_patch(patch);
    base.forget_names();

    // One external listfile serves the whole chain
    let dir = tempfile::tempdir().expect("Test operation should succeed");
    let path = dir.path().join("listfile.txt");
    std::fs::write(&path, MAP_FILES.join("\r\n")).expect("Test operation should succeed");

    let options = IngestOptions::external(path.to_str().expect("Test operation should succeed"));
    let report =
        add_listfile_with_options(&mut base, &options).expect("Test operation should succeed");

    assert_eq!(report.segments, 2);
    assert_eq!(report.sources_read, 2);
    // The patch only knows one of the four names
    assert_eq!(report.names_unmatched, MAP_FILES.len() - 1);

    let patch = base.patch(0).expect("Test operation should succeed");
    assert_eq!(named(patch), vec![SIGNATURE_NAME.to_string(), "war3map.j".to_string()]);
}

#[test]
fn test_patch_without_listfile_is_skipped() {
    let mut base = map_archive();
    rebuild_and_save(&mut base).expect("Test operation should succeed");
    base.add_patch(MemoryArchive::new(8));
    base.forget_names();

    let report = add_listfile(&mut base, None).expect("Test operation should succeed");
    assert_eq!(report.segments, 2);
    assert_eq!(report.sources_read, 1);
    assert_eq!(report.sources_skipped, 1);
    assert_eq!(report.names_assigned, MAP_FILES.len());
}

#[test]
fn test_missing_external_listfile_is_skipped() {
    let mut archive = map_archive();
    let report = add_listfile(&mut archive, Some("/nonexistent/listfile.txt"))
        .expect("Test operation should succeed");
    assert_eq!(report.sources_skipped, 1);
    assert_eq!(report.names_read, 0);
}

#[test]
fn test_damaged_listfile_yields_readable_prefix() {
    let mut archive = map_archive();
    let content = b"war3map.j\r\nwar3map.w3e\r\n".repeat(2);
    let index = archive
        .add_file(LISTFILE_NAME, Locale::NEUTRAL, content)
        .expect("Test operation should succeed");
    // Only the first page survives
    archive.truncate_readable(index, 16);
    archive.forget_names();

    let config = ListfileConfig::new().with_page_size(16);
    let options = IngestOptions::default().with_config(config);
    let report =
        add_listfile_with_options(&mut archive, &options).expect("Test operation should succeed");

    assert_eq!(report.sources_read, 1);
    assert_eq!(report.names_read, 2);
    assert_eq!(archive.records()[0].name.as_deref(), Some(&b"war3map.j"[..]));
}

#[test]
fn test_patch_annotations_are_dropped_on_rewrite() {
    let mut archive = MemoryArchive::new(16);
    archive
        .add_file("Info.plist", Locale::NEUTRAL, b"plist".to_vec())
        .expect("Test operation should succeed");
    archive.forget_names();

    let mut source = Cursor::new(b"Info.plist~Patch(Data#frFR#base-frFR,1326)\r\n".to_vec());
    mpq_listfile::add_arbitrary_listfile(&mut archive, &mut source, &ListfileConfig::default())
        .expect("Test operation should succeed");
    rebuild_and_save(&mut archive).expect("Test operation should succeed");

    assert_eq!(listfile_text(&archive), "Info.plist\r\n");
}

#[test]
fn test_empty_archive_listfile() {
    let mut archive = MemoryArchive::new(8).with_format(FormatVersion::V4);
    assert_eq!(
        rebuild_and_save(&mut archive).expect("Test operation should succeed"),
        1
    );
    assert_eq!(listfile_text(&archive), "(listfile)\r\n");
    assert_eq!(
        archive.records()[0].flags,
        FileFlags::new(FileFlags::EXISTS | FileFlags::ENCRYPTED | FileFlags::COMPRESS)
    );
}

#[test]
fn test_large_listfile_uses_sector_crc() {
    let mut archive = MemoryArchive::new(2048).with_format(FormatVersion::V2);
    for i in 0..1000 {
        archive
            .add_file(&format!("Data\\Textures\\tile{i:04}.blp"), Locale::NEUTRAL, Vec::new())
            .expect("Test operation should succeed");
    }
    rebuild_and_save(&mut archive).expect("Test operation should succeed");
    assert_eq!(
        archive.listfile_flags(),
        FileFlags::new(FileFlags::COMPRESS | FileFlags::SECTOR_CRC)
    );
}

#[test]
fn test_assignment_after_rebuild_keeps_first_spelling() {
    let mut archive = MemoryArchive::new(16);
    for locale in [Locale::NEUTRAL, Locale::ESES, Locale::ITIT] {
        archive
            .add_file("Interface\\Glues\\Intro.blp", locale, Vec::new())
            .expect("Test operation should succeed");
    }

    assert_eq!(
        assign_name_for_all_locales(&mut archive, "INTERFACE\\GLUES\\INTRO.BLP")
            .expect("Test operation should succeed"),
        3
    );
    rebuild_and_save(&mut archive).expect("Test operation should succeed");
    assert_eq!(listfile_text(&archive), "Interface\\Glues\\Intro.blp\r\n");
}

#[test]
fn test_reader_over_caller_stream() {
    let mut stream = Cursor::new(b"  a.txt\r\n\r\n\tb.txt\nc.txt".to_vec());
    let names: Vec<String> = PagedNameReader::new(&mut stream)
        .expect("Test operation should succeed")
        .collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    // The stream is still usable afterwards
    assert_eq!(stream.get_ref().len(), 23);
}

#[test]
fn test_enumeration_needs_a_listfile() {
    let archive = map_archive();
    let error = ListfileFinder::open(&archive, None, None).expect_err("no listfile stored");
    assert!(error.is_not_found());
    assert!(matches!(error, ListfileError::NotFound(_)));
}
