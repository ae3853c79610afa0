mod common;

use common::{Fixture, mimes};
use filetime::FileTime;
use mimedb_format::writer::{CacheWriter, MagicDefinition, MatchletDefinition, TypeDefinition};
use mimedb_provider::LayerStatus;
use std::sync::Arc;
use std::thread;

fn system() -> CacheWriter {
    CacheWriter::new()
        .with(TypeDefinition::new("text/foo").glob("*.foo"))
        .with(TypeDefinition::new("text/x-shared").glob("*.shared").alias("text/x-old-shared"))
}

#[test]
fn test_user_layer_deletes_system_globs() {
    let user = CacheWriter::new()
        .with(TypeDefinition::new("text/foo").delete_globs())
        .with(TypeDefinition::new("application/x-foo").glob_with("*.foo", 60, false));
    let fixture = Fixture::new(vec![user, system()]);
    let found = fixture.database.classify_by_name("x.foo");
    assert_eq!(found.len(), 1);
    assert_eq!((found[0].mime.as_str(), found[0].weight), ("application/x-foo", 60));
    assert_eq!(fixture.database.classify("x.foo", b""), "application/x-foo");
    assert!(fixture.database.glob_patterns("text/foo").is_empty());
}

#[test]
fn test_layers_union_without_duplicates() {
    let user = CacheWriter::new()
        .with(TypeDefinition::new("text/x-shared").glob_with("*.shared", 70, false))
        .with(TypeDefinition::new("text/x-user").glob("*.shared"));
    let fixture = Fixture::new(vec![user, system()]);
    let found = fixture.database.classify_by_name("a.shared");
    let summary: Vec<_> = found.iter().map(|found| (found.mime.as_str(), found.weight)).collect();
    assert_eq!(summary, [("text/x-shared", 70), ("text/x-user", 50)]);
    assert_eq!(fixture.database.resolve_alias("text/x-old-shared"), "text/x-shared");
}

#[test]
fn test_corrupt_layer_falls_back_to_remaining_layers() {
    let fixture = Fixture::new(vec![CacheWriter::new(), system()]);
    std::fs::write(fixture.cache_path(0), b"definitely not a mime cache, but long enough for a header").unwrap();

    assert_eq!(mimes(&fixture.database, "x.foo"), ["text/foo"]);
    let layers = fixture.database.chain().layers();
    assert_eq!(layers[0].status(), LayerStatus::Invalid);
    assert!(layers[0].invalid_reason().is_some());
    assert_eq!(layers[1].status(), LayerStatus::Ready);
}

#[test]
fn test_truncated_section_table_marks_layer_invalid() {
    let fixture = Fixture::new(vec![system()]);
    let mut bytes = std::fs::read(fixture.cache_path(0)).unwrap();
    bytes.truncate(48);
    std::fs::write(fixture.cache_path(0), bytes).unwrap();

    assert!(fixture.database.classify_by_name("x.foo").is_empty());
    assert_eq!(fixture.database.classify("x.foo", b"words"), "text/plain");
    assert_eq!(fixture.database.chain().layers()[0].status(), LayerStatus::Invalid);
}

#[test]
fn test_missing_cache_is_an_empty_layer() {
    let fixture = Fixture::new(vec![system()]);
    std::fs::remove_file(fixture.cache_path(0)).unwrap();
    assert!(fixture.database.classify_by_name("x.foo").is_empty());
    assert_eq!(fixture.database.chain().layers()[0].status(), LayerStatus::Ready);
}

#[test]
fn test_changed_cache_is_reloaded() {
    let fixture = Fixture::new(vec![system()]);
    filetime::set_file_mtime(fixture.cache_path(0), FileTime::from_unix_time(1_000_000, 0)).unwrap();
    assert_eq!(mimes(&fixture.database, "x.foo"), ["text/foo"]);

    CacheWriter::new()
        .with(TypeDefinition::new("text/x-foo-v2").glob("*.foo"))
        .write(fixture.cache_path(0))
        .unwrap();
    filetime::set_file_mtime(fixture.cache_path(0), FileTime::from_unix_time(2_000_000, 0)).unwrap();
    assert_eq!(mimes(&fixture.database, "x.foo"), ["text/x-foo-v2"]);
}

#[test]
fn test_stamp_file_change_triggers_reload() {
    let fixture = Fixture::with_config(vec![system()], |config| {
        let packages = config.layers[0].directory.join("packages");
        config.layers[0].stamp_files.push(packages);
    });
    let packages = fixture.dir(0).join("packages");
    std::fs::write(&packages, b"").unwrap();
    filetime::set_file_mtime(&packages, FileTime::from_unix_time(1_000_000, 0)).unwrap();

    let layer = &fixture.database.chain().layers()[0];
    let first = layer.snapshot().unwrap();
    assert!(Arc::ptr_eq(&first, &layer.snapshot().unwrap()));

    filetime::set_file_mtime(&packages, FileTime::from_unix_time(2_000_000, 0)).unwrap();
    let reloaded = layer.snapshot().unwrap();
    assert!(!Arc::ptr_eq(&first, &reloaded));
    assert!(reloaded.knows("text/foo"));
}

#[test]
fn test_types_file_extends_known_types() {
    let fixture = Fixture::new(vec![system()]);
    assert!(!fixture.database.is_known_type("application/x-listed-only"));
    std::fs::write(fixture.dir(0).join("types"), "application/x-listed-only\n").unwrap();
    fixture.database.reload();
    assert!(fixture.database.is_known_type("application/x-listed-only"));
}

#[test]
fn test_explicit_reload() {
    let fixture = Fixture::with_config(vec![system()], |config| config.recheck_interval = 3600);
    assert_eq!(mimes(&fixture.database, "x.foo"), ["text/foo"]);
    CacheWriter::new().with(TypeDefinition::new("text/x-foo-v2").glob("*.foo")).write(fixture.cache_path(0)).unwrap();
    assert_eq!(mimes(&fixture.database, "x.foo"), ["text/foo"]);
    fixture.database.reload();
    assert_eq!(mimes(&fixture.database, "x.foo"), ["text/x-foo-v2"]);
}

#[test]
fn test_concurrent_lookups_are_deterministic() {
    let layer = CacheWriter::new()
        .with(
            TypeDefinition::new("image/gif")
                .glob("*.gif")
                .magic(MagicDefinition::new(50).matchlet(MatchletDefinition::string(0, "GIF8"))),
        )
        .with(TypeDefinition::new("application/x-a").glob("*.dup"))
        .with(TypeDefinition::new("application/x-b").glob("*.dup"));
    let fixture = Fixture::with_config(vec![layer, system()], |config| config.recheck_interval = 3600);
    let database = &fixture.database;

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(move || {
                    (
                        database.classify_by_name("clip.dup"),
                        database.classify("photo.dup", b"GIF89a"),
                        database.classify_by_content(b"GIF89a"),
                    )
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(results[0].0.len(), 2);
    assert_eq!(results[0].1, "application/x-a");
}
