//! Backend contract checks run against every driver.
//!
//! Each check receives a fresh [`Storage`]; `for_each_backend` builds one
//! per driver flavor (memory, SQLite in memory and on disk, filesystem).

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use tempfile::TempDir;
use twin_crypto::{Blake3Digest, OsRandom, RandomSource};
use twin_types::{Bucket, Lookup};

use crate::config::{DriverKind, StorageConfig};
use crate::plugin::Storage;

struct Backend {
    storage: Storage,
    // Keeps the on-disk location alive for the storage's lifetime.
    _dir: Option<TempDir>,
}

fn open(kind: DriverKind, in_memory: bool) -> Backend {
    let dir = (kind.is_on_disk() && !in_memory).then(|| tempfile::tempdir().unwrap());
    let path = match &dir {
        Some(dir) => dir.path().to_path_buf(),
        None => ":memory:".into(),
    };
    let storage = Storage::try_new(
        &StorageConfig::new(kind, path),
        Arc::new(Blake3Digest::OBJECT),
        Arc::new(OsRandom),
    )
    .unwrap();
    Backend { storage, _dir: dir }
}

fn backends() -> Vec<(&'static str, Backend)> {
    vec![
        ("memory", open(DriverKind::Memory, true)),
        ("sqlite-memory", open(DriverKind::Sqlite, true)),
        ("sqlite-file", open(DriverKind::Sqlite, false)),
        ("filesystem", open(DriverKind::Filesystem, false)),
    ]
}

fn for_each_backend(check: impl Fn(&str, &Storage)) {
    for (name, backend) in backends() {
        check(name, &backend.storage);
        backend.storage.cleanup();
    }
}

// ---------------------------------------------------------------------------
// Single-threaded properties
// ---------------------------------------------------------------------------

#[test]
fn round_trip() {
    for_each_backend(|name, s| {
        for bucket in Bucket::ALL {
            assert!(s.store("key-1", b"value-1", bucket), "{name}");
            assert_eq!(s.load("key-1", bucket), Lookup::Found(b"value-1".to_vec()), "{name}");
        }
    });
}

#[test]
fn empty_value_round_trips() {
    for_each_backend(|name, s| {
        assert!(s.store("empty", b"", Bucket::Primary), "{name}");
        assert_eq!(s.load("empty", Bucket::Primary), Lookup::Found(Vec::new()), "{name}");
    });
}

#[test]
fn negative_lookup() {
    for_each_backend(|name, s| {
        for bucket in Bucket::ALL {
            assert_eq!(s.load("never-stored", bucket), Lookup::NotFound, "{name}");
        }
    });
}

#[test]
fn store_is_idempotent() {
    for_each_backend(|name, s| {
        assert!(s.store("k", b"v", Bucket::Secondary), "{name}");
        assert!(s.store("k", b"v", Bucket::Secondary), "{name}");
        assert_eq!(s.load("k", Bucket::Secondary), Lookup::Found(b"v".to_vec()), "{name}");
    });
}

#[test]
fn root_persistence() {
    for_each_backend(|name, s| {
        assert_eq!(s.load_root(), "", "{name}");
        assert!(s.store_root("abc123"), "{name}");
        assert_eq!(s.load_root(), "abc123", "{name}");
    });
}

#[test]
fn bulk_erase_leaves_other_bucket() {
    for_each_backend(|name, s| {
        for i in 0..20 {
            let key = format!("k{i}");
            assert!(s.store(&key, b"doomed", Bucket::Primary), "{name}");
            assert!(s.store(&key, b"kept", Bucket::Secondary), "{name}");
        }
        assert!(s.empty_bucket(Bucket::Primary), "{name}");
        for i in 0..20 {
            let key = format!("k{i}");
            assert_eq!(s.load(&key, Bucket::Primary), Lookup::NotFound, "{name}");
            assert_eq!(s.load(&key, Bucket::Secondary), Lookup::Found(b"kept".to_vec()), "{name}");
        }
    });
}

#[test]
fn bucket_usable_after_erase() {
    for_each_backend(|name, s| {
        assert!(s.store("a", b"1", Bucket::Primary), "{name}");
        assert!(s.empty_bucket(Bucket::Primary), "{name}");
        assert!(s.empty_bucket(Bucket::Primary), "{name}: erasing an empty bucket");
        assert!(s.store("a", b"2", Bucket::Primary), "{name}");
        assert_eq!(s.load("a", Bucket::Primary), Lookup::Found(b"2".to_vec()), "{name}");
    });
}

#[test]
fn erase_keeps_root() {
    for_each_backend(|name, s| {
        assert!(s.store_root("root-hash"), "{name}");
        assert!(s.empty_bucket(Bucket::Primary), "{name}");
        assert!(s.empty_bucket(Bucket::Secondary), "{name}");
        assert_eq!(s.load_root(), "root-hash", "{name}");
    });
}

#[test]
fn buckets_are_isolated() {
    for_each_backend(|name, s| {
        assert!(s.store("k", b"v1", Bucket::Primary), "{name}");
        assert!(s.store("k", b"v2", Bucket::Secondary), "{name}");
        assert_eq!(s.load("k", Bucket::Primary), Lookup::Found(b"v1".to_vec()), "{name}");
        assert_eq!(s.load("k", Bucket::Secondary), Lookup::Found(b"v2".to_vec()), "{name}");
    });
}

#[test]
fn stats_follow_contents() {
    for_each_backend(|name, s| {
        assert!(s.store("a", b"12345", Bucket::Primary), "{name}");
        assert!(s.store("b", b"678", Bucket::Primary), "{name}");
        let stats = s.stats(Bucket::Primary).unwrap();
        assert_eq!((stats.entries, stats.bytes), (2, 8), "{name}");
        assert_eq!(s.stats(Bucket::Secondary).unwrap().entries, 0, "{name}");
        assert!(s.empty_bucket(Bucket::Primary), "{name}");
        assert_eq!(s.stats(Bucket::Primary).unwrap().entries, 0, "{name}");
    });
}

#[test]
fn scenario_store_load_erase() {
    for_each_backend(|name, s| {
        assert!(s.store("k1", b"v1", Bucket::Primary), "{name}");
        assert_eq!(s.load("k1", Bucket::Primary), Lookup::Found(b"v1".to_vec()), "{name}");
        assert!(s.empty_bucket(Bucket::Primary), "{name}");
        assert_eq!(s.load("k1", Bucket::Primary), Lookup::NotFound, "{name}");
    });
}

#[test]
fn scenario_root_overwrite() {
    for_each_backend(|name, s| {
        assert!(s.store_root("abc123"), "{name}");
        assert_eq!(s.load_root(), "abc123", "{name}");
        assert!(s.store_root("def456"), "{name}");
        assert_eq!(s.load_root(), "def456", "{name}");
    });
}

#[test]
fn long_keys_round_trip() {
    let plain = "k".repeat(300);
    let spaced = format!("{} x", "k".repeat(150));
    for_each_backend(|name, s| {
        for key in [&plain, &spaced] {
            assert!(s.store(key, key.as_bytes(), Bucket::Primary), "{name}");
        }
        for key in [&plain, &spaced] {
            assert_eq!(
                s.load(key, Bucket::Primary),
                Lookup::Found(key.clone().into_bytes()),
                "{name}"
            );
        }
    });
}

#[test]
fn repeated_key_keeps_first_value() {
    for_each_backend(|name, s| {
        assert!(s.store("k", b"first", Bucket::Primary), "{name}");
        assert!(s.store("k", b"second", Bucket::Primary), "{name}");
        assert_eq!(s.load("k", Bucket::Primary), Lookup::Found(b"first".to_vec()), "{name}");
    });
}

// ---------------------------------------------------------------------------
// Failed erase
// ---------------------------------------------------------------------------

#[test]
fn sqlite_erase_blocked_by_writer_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        sqlite_busy_timeout_ms: 50,
        ..StorageConfig::new(DriverKind::Sqlite, dir.path())
    };
    let s = Storage::try_new(&config, Arc::new(Blake3Digest::OBJECT), Arc::new(OsRandom)).unwrap();
    assert!(s.store("k1", b"v1", Bucket::Primary));
    assert!(s.store("k2", b"v2", Bucket::Primary));

    let writer = rusqlite::Connection::open(dir.path().join(&config.sqlite_file)).unwrap();
    writer.execute_batch("BEGIN IMMEDIATE").unwrap();
    assert!(!s.empty_bucket(Bucket::Primary));
    writer.execute_batch("ROLLBACK").unwrap();

    assert_eq!(s.load("k1", Bucket::Primary), Lookup::Found(b"v1".to_vec()));
    assert_eq!(s.load("k2", Bucket::Primary), Lookup::Found(b"v2".to_vec()));
    assert_eq!(s.stats(Bucket::Primary).unwrap().entries, 2);
}

#[test]
fn filesystem_erase_with_blocked_trash_keeps_files() {
    let dir = tempfile::tempdir().unwrap();
    let random: Arc<dyn RandomSource> = Arc::new(|| "taken".to_string());
    let s = Storage::try_new(
        &StorageConfig::new(DriverKind::Filesystem, dir.path()),
        Arc::new(Blake3Digest::OBJECT),
        random,
    )
    .unwrap();
    assert!(s.store("k1", b"v1", Bucket::Primary));
    // Created after init so the startup sweep leaves it alone.
    let blocker = dir.path().join("taken.trash");
    std::fs::create_dir(&blocker).unwrap();
    std::fs::write(blocker.join("occupied"), b"x").unwrap();

    assert!(!s.empty_bucket(Bucket::Primary));
    assert_eq!(s.load("k1", Bucket::Primary), Lookup::Found(b"v1".to_vec()));
    assert!(s.store("k2", b"v2", Bucket::Primary));
    s.cleanup();
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_disjoint_writers() {
    for_each_backend(|name, s| {
        thread::scope(|scope| {
            for t in 0..8 {
                scope.spawn(move || {
                    for i in 0..25 {
                        let key = format!("t{t}-k{i}");
                        assert!(s.store(&key, key.as_bytes(), Bucket::Primary), "{name}");
                    }
                });
            }
        });
        for t in 0..8 {
            for i in 0..25 {
                let key = format!("t{t}-k{i}");
                assert_eq!(
                    s.load(&key, Bucket::Primary),
                    Lookup::Found(key.clone().into_bytes()),
                    "{name}"
                );
            }
        }
    });
}

#[test]
fn concurrent_same_key_writers() {
    for_each_backend(|name, s| {
        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..10 {
                        assert!(s.store("shared", b"same bytes", Bucket::Secondary), "{name}");
                    }
                });
            }
        });
        assert_eq!(
            s.load("shared", Bucket::Secondary),
            Lookup::Found(b"same bytes".to_vec()),
            "{name}"
        );
    });
}

#[test]
fn root_is_linearizable() {
    for_each_backend(|name, s| {
        let submitted: HashSet<String> = (0..16).map(|i| format!("root-{i:02}")).collect();
        thread::scope(|scope| {
            for root in &submitted {
                scope.spawn(move || assert!(s.store_root(root), "{name}"));
            }
        });
        assert!(submitted.contains(&s.load_root()), "{name}");
    });
}

#[test]
fn readers_during_erase_see_all_or_nothing() {
    for_each_backend(|name, s| {
        assert!(s.store("stable", b"value", Bucket::Primary), "{name}");
        thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..50 {
                    match s.load("stable", Bucket::Primary) {
                        Lookup::Found(v) => assert_eq!(v, b"value", "{name}"),
                        Lookup::NotFound => {}
                    }
                }
            });
            assert!(s.empty_bucket(Bucket::Primary), "{name}");
        });
    });
}

// ---------------------------------------------------------------------------
// Generated inputs
// ---------------------------------------------------------------------------

fn bucket_strategy() -> impl Strategy<Value = Bucket> {
    prop_oneof![Just(Bucket::Primary), Just(Bucket::Secondary)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn round_trip_for_any_key(
        key in "[a-zA-Z0-9%./ _-]{1,160}",
        value in proptest::collection::vec(any::<u8>(), 0..256),
        bucket in bucket_strategy(),
    ) {
        for (name, backend) in backends() {
            let s = &backend.storage;
            prop_assert!(s.store(&key, &value, bucket), "{}", name);
            prop_assert_eq!(s.load(&key, bucket), Lookup::Found(value.clone()), "{}", name);
            prop_assert_eq!(s.load(&key, bucket.other()), Lookup::NotFound, "{}", name);
        }
    }

    #[test]
    fn distinct_keys_never_collide(
        a in "[a-z.%]{1,8}",
        b in "[a-z.%]{1,8}",
    ) {
        prop_assume!(a != b);
        for (name, backend) in backends() {
            let s = &backend.storage;
            prop_assert!(s.store(&a, b"first", Bucket::Primary), "{}", name);
            prop_assert!(s.store(&b, b"second", Bucket::Primary), "{}", name);
            prop_assert_eq!(
                s.load(&a, Bucket::Primary),
                Lookup::Found(b"first".to_vec()),
                "{}",
                name
            );
        }
    }
}
