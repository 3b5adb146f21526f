//! Integration tests: the full Env -> Dbi -> pool -> scan pipeline.
//!
//! These exercise the adapter the way a consumer would: open an environment
//! in a fresh directory, move typed data through transact, and read it back
//! through the pooled read paths.

use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use burrow_kv::{Config, Env, KeyRange, KvError, Op, Value, ValueKind, WriteFlags};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn test_env() -> (Env, TempDir) {
    let dir = TempDir::new().unwrap();
    let cfg = Config { init_db_size_mb: 1, ..Default::default() };
    let env = Env::open_with(dir.path(), cfg).unwrap();
    (env, dir)
}

/// Insert keys 1..=n as U64 with "v{i}" string values.
fn preload(env: &Env, dbi: &str, n: u64) {
    env.open_dbi(dbi).unwrap();
    let ops: Vec<Op> = (1..=n)
        .map(|i| Op::put(dbi, Value::U64(i), Value::str(format!("v{}", i))))
        .collect();
    env.transact(&ops).unwrap();
}

fn keys_of(pairs: &[(Value, Value)]) -> Vec<u64> {
    pairs
        .iter()
        .map(|(k, _)| match k {
            Value::U64(n) => *n,
            other => panic!("expected U64 key, got {:?}", other),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Basic put / get / del
// ---------------------------------------------------------------------------

#[test]
fn test_put_get_entries() {
    let (env, _dir) = test_env();
    env.open_dbi("a").unwrap();

    env.transact(&[Op::put("a", Value::U64(1), Value::str("x"))]).unwrap();

    let got = env.get_value("a", &Value::U64(1), ValueKind::Str).unwrap();
    assert_eq!(got, Some(Value::str("x")));
    assert_eq!(env.entries("a").unwrap(), 1);
}

#[test]
fn test_del_reports_not_found_as_none() {
    let (env, _dir) = test_env();
    env.open_dbi("a").unwrap();

    env.transact(&[Op::put("a", Value::U64(1), Value::str("x"))]).unwrap();
    env.transact(&[Op::del("a", Value::U64(1))]).unwrap();

    assert_eq!(env.get_value("a", &Value::U64(1), ValueKind::Str).unwrap(), None);
    assert_eq!(env.entries("a").unwrap(), 0);

    // deleting an absent key inside a batch is tolerated
    env.transact(&[Op::del("a", Value::U64(99))]).unwrap();
}

#[test]
fn test_batch_applies_in_order() {
    let (env, _dir) = test_env();
    env.open_dbi("a").unwrap();

    env.transact(&[
        Op::put("a", Value::U64(1), Value::str("first")),
        Op::put("a", Value::U64(1), Value::str("second")),
        Op::put("a", Value::U64(2), Value::str("kept")),
        Op::del("a", Value::U64(2)),
    ])
    .unwrap();

    assert_eq!(
        env.get_value("a", &Value::U64(1), ValueKind::Str).unwrap(),
        Some(Value::str("second"))
    );
    assert_eq!(env.get_value("a", &Value::U64(2), ValueKind::Str).unwrap(), None);
}

#[test]
fn test_batch_is_atomic() {
    let (env, _dir) = test_env();
    env.open_dbi("a").unwrap();
    env.transact(&[Op::put("a", Value::U64(7), Value::str("old"))]).unwrap();

    // the second op fails (no-overwrite on an existing key); the first op
    // must not become visible
    let err = env
        .transact(&[
            Op::put("a", Value::U64(1), Value::str("phantom")),
            Op::put_flags("a", Value::U64(7), Value::str("clash"), WriteFlags::NO_OVERWRITE),
        ])
        .unwrap_err();
    assert!(matches!(err, KvError::Transact { .. }));

    assert_eq!(env.get_value("a", &Value::U64(1), ValueKind::Str).unwrap(), None);
    assert_eq!(
        env.get_value("a", &Value::U64(7), ValueKind::Str).unwrap(),
        Some(Value::str("old"))
    );
}

#[test]
fn test_oversized_key_is_an_error() {
    let (env, _dir) = test_env();
    env.open_dbi("a").unwrap();

    let key = Value::data(vec![0x55u8; 4096]);
    let err = env.transact(&[Op::put("a", key, Value::str("v"))]).unwrap_err();
    let KvError::Transact { source, .. } = err else {
        panic!("expected Transact error, got {}", err)
    };
    let KvError::Encoding(codec_err) = *source else {
        panic!("expected Encoding error")
    };
    assert!(format!("{}", codec_err).contains("BufferOverflow"));
}

// ---------------------------------------------------------------------------
// Range grammar
// ---------------------------------------------------------------------------

#[test]
fn test_double_bounded_ranges() {
    let (env, _dir) = test_env();
    preload(&env, "a", 100);

    let lo = Value::U64(20);
    let hi = Value::U64(30);

    let pairs = env
        .get_range("a", &KeyRange::Closed(&lo, &hi), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&pairs), (20..=30).collect::<Vec<_>>());

    let pairs = env
        .get_range("a", &KeyRange::ClosedOpen(&lo, &hi), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&pairs), (20..30).collect::<Vec<_>>());

    let pairs = env
        .get_range("a", &KeyRange::Open(&lo, &hi), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&pairs), (21..30).collect::<Vec<_>>());

    let pairs = env
        .get_range("a", &KeyRange::OpenClosed(&lo, &hi), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&pairs), (21..=30).collect::<Vec<_>>());

    // backward: first operand is the high end
    let pairs = env
        .get_range("a", &KeyRange::ClosedBack(&hi, &lo), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&pairs), (20..=30).rev().collect::<Vec<_>>());

    let pairs = env
        .get_range("a", &KeyRange::OpenBack(&hi, &lo), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&pairs), (21..30).rev().collect::<Vec<_>>());
}

#[test]
fn test_single_bounded_and_unbounded_ranges() {
    let (env, _dir) = test_env();
    preload(&env, "a", 10);

    let k = Value::U64(7);

    let all = env.get_range("a", &KeyRange::All, ValueKind::U64, ValueKind::Str).unwrap();
    assert_eq!(keys_of(&all), (1..=10).collect::<Vec<_>>());

    let back = env.get_range("a", &KeyRange::AllBack, ValueKind::U64, ValueKind::Str).unwrap();
    assert_eq!(keys_of(&back), (1..=10).rev().collect::<Vec<_>>());

    let at_least = env
        .get_range("a", &KeyRange::AtLeast(&k), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&at_least), vec![7, 8, 9, 10]);

    let at_least_back = env
        .get_range("a", &KeyRange::AtLeastBack(&k), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&at_least_back), vec![7, 6, 5, 4, 3, 2, 1]);

    let at_most = env
        .get_range("a", &KeyRange::AtMost(&k), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&at_most), vec![1, 2, 3, 4, 5, 6, 7]);

    let at_most_back = env
        .get_range("a", &KeyRange::AtMostBack(&k), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&at_most_back), vec![10, 9, 8, 7]);

    let greater = env
        .get_range("a", &KeyRange::GreaterThan(&k), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&greater), vec![8, 9, 10]);

    let greater_back = env
        .get_range("a", &KeyRange::GreaterThanBack(&k), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&greater_back), vec![6, 5, 4, 3, 2, 1]);

    let less = env
        .get_range("a", &KeyRange::LessThan(&k), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&less), vec![1, 2, 3, 4, 5, 6]);

    // a backward stop bound: walk from the last key down to 7, exclusive
    let less_back = env
        .get_range("a", &KeyRange::LessThanBack(&k), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&less_back), vec![10, 9, 8]);
}

#[test]
fn test_range_seek_between_keys() {
    let (env, _dir) = test_env();
    env.open_dbi("a").unwrap();
    // even keys only: bounds fall between stored keys
    let ops: Vec<Op> = (1..=10u64)
        .map(|i| Op::put("a", Value::U64(2 * i), Value::str("v")))
        .collect();
    env.transact(&ops).unwrap();

    let lo = Value::U64(5);
    let hi = Value::U64(13);
    let pairs = env
        .get_range("a", &KeyRange::Closed(&lo, &hi), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&pairs), vec![6, 8, 10, 12]);

    let pairs = env
        .get_range("a", &KeyRange::ClosedBack(&hi, &lo), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(keys_of(&pairs), vec![12, 10, 8, 6]);
}

#[test]
fn test_empty_ranges() {
    let (env, _dir) = test_env();
    preload(&env, "a", 10);

    let lo = Value::U64(5);
    let hi = Value::U64(5);
    // (5, 5) is empty by construction
    let pairs = env
        .get_range("a", &KeyRange::Open(&lo, &hi), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert!(pairs.is_empty());

    // past the last key
    let k = Value::U64(1000);
    let pairs = env
        .get_range("a", &KeyRange::AtLeast(&k), ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert!(pairs.is_empty());

    // empty DBI
    env.open_dbi("empty").unwrap();
    assert_eq!(env.range_count("empty", &KeyRange::All).unwrap(), 0);
    assert_eq!(
        env.get_first("empty", &KeyRange::All, ValueKind::U64, ValueKind::Str).unwrap(),
        None
    );
}

#[test]
fn test_range_count_matches_get_range() {
    let (env, _dir) = test_env();
    preload(&env, "a", 50);

    let lo = Value::U64(10);
    let hi = Value::U64(40);
    let ranges = [
        KeyRange::All,
        KeyRange::AllBack,
        KeyRange::AtLeast(&lo),
        KeyRange::AtMostBack(&hi),
        KeyRange::Closed(&lo, &hi),
        KeyRange::ClosedOpenBack(&hi, &lo),
        KeyRange::Open(&lo, &hi),
        KeyRange::GreaterThan(&lo),
        KeyRange::LessThanBack(&hi),
    ];
    for range in &ranges {
        let pairs = env.get_range("a", range, ValueKind::U64, ValueKind::Str).unwrap();
        let count = env.range_count("a", range).unwrap();
        assert_eq!(count as usize, pairs.len(), "count mismatch for {:?}", range);
    }
}

#[test]
fn test_get_first_and_get_some() {
    let (env, _dir) = test_env();
    preload(&env, "a", 10);

    let first = env
        .get_first("a", &KeyRange::All, ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(first, Some((Value::U64(1), Value::str("v1"))));

    let last = env
        .get_first("a", &KeyRange::AllBack, ValueKind::U64, ValueKind::Str)
        .unwrap();
    assert_eq!(last, Some((Value::U64(10), Value::str("v10"))));

    // first value whose decoded text ends in "7"
    let hit = env
        .get_some("a", &KeyRange::All, ValueKind::U64, ValueKind::Str, |_k, v| {
            v.ends_with(b"7")
        })
        .unwrap();
    assert_eq!(hit, Some((Value::U64(7), Value::str("v7"))));

    let miss = env
        .get_some("a", &KeyRange::All, ValueKind::U64, ValueKind::Str, |_k, _v| false)
        .unwrap();
    assert_eq!(miss, None);
}

#[test]
fn test_range_filter_and_count() {
    let (env, _dir) = test_env();
    preload(&env, "a", 20);

    // even keys: the last encoded key byte is even
    let mut even = |k: &[u8], _v: &[u8]| k[7] % 2 == 0;

    let pairs = env
        .range_filter("a", &KeyRange::All, ValueKind::U64, ValueKind::Str, &mut even)
        .unwrap();
    assert_eq!(keys_of(&pairs), (1..=10).map(|i| 2 * i).collect::<Vec<_>>());

    let count = env.range_filter_count("a", &KeyRange::All, &mut even).unwrap();
    assert_eq!(count as usize, pairs.len());
}

#[test]
fn test_str_keys_sort_lexicographically() {
    let (env, _dir) = test_env();
    env.open_dbi("s").unwrap();
    for name in ["cherry", "apple", "banana", "apricot"] {
        env.transact(&[Op::put("s", Value::str(name), Value::U64(1))]).unwrap();
    }

    let lo = Value::str("apple");
    let hi = Value::str("banana");
    let pairs = env
        .get_range("s", &KeyRange::Closed(&lo, &hi), ValueKind::Str, ValueKind::U64)
        .unwrap();
    let names: Vec<_> = pairs
        .iter()
        .map(|(k, _)| match k {
            Value::Str(s) => s.as_str(),
            other => panic!("expected Str key, got {:?}", other),
        })
        .collect();
    assert_eq!(names, vec!["apple", "apricot", "banana"]);
}

// ---------------------------------------------------------------------------
// Value buffer growth
// ---------------------------------------------------------------------------

#[test]
fn test_oversized_value_autogrows() {
    let (env, _dir) = test_env();
    env.open_dbi("a").unwrap();

    // four times the default value buffer capacity
    let big = vec![0xC3u8; 64 * 1024];
    env.transact(&[Op::put("a", Value::U64(1), Value::data(big.clone()))]).unwrap();

    let got = env.get_value("a", &Value::U64(1), ValueKind::Data).unwrap();
    assert_eq!(got, Some(Value::Data(big)));

    // the grown buffer keeps serving normal-sized values
    env.transact(&[Op::put("a", Value::U64(2), Value::str("small"))]).unwrap();
    assert_eq!(
        env.get_value("a", &Value::U64(2), ValueKind::Str).unwrap(),
        Some(Value::str("small"))
    );
}

// ---------------------------------------------------------------------------
// Map growth
// ---------------------------------------------------------------------------

#[test]
fn test_map_full_grows_and_commits_whole_batch() {
    let (env, _dir) = test_env();
    env.open_dbi("a").unwrap();

    let initial = env.info().unwrap().map_size;

    // ~2.4 MB of values against a 1 MB map: the batch cannot fit until the
    // map grows
    let value = Value::data(vec![0x7Fu8; 8 * 1024]);
    let ops: Vec<Op> = (0..300u64).map(|i| Op::put("a", Value::U64(i), value.clone())).collect();
    env.transact(&ops).unwrap();

    assert_eq!(env.entries("a").unwrap(), 300);
    assert!(env.info().unwrap().map_size > initial);

    // spot-check the data actually landed
    let got = env.get_value("a", &Value::U64(299), ValueKind::Data).unwrap();
    assert_eq!(got, Some(value));
}

// ---------------------------------------------------------------------------
// DBI lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_drop_dbi_vs_clear_dbi() {
    let (env, _dir) = test_env();
    preload(&env, "a", 5);

    // clear keeps the handle, empties the DBI
    env.clear_dbi("a").unwrap();
    assert_eq!(env.entries("a").unwrap(), 0);
    env.transact(&[Op::put("a", Value::U64(1), Value::str("back"))]).unwrap();
    assert_eq!(env.entries("a").unwrap(), 1);

    // drop removes the handle entirely
    env.drop_dbi("a").unwrap();
    assert!(matches!(env.get_dbi("a"), Err(KvError::UnknownDbi(_))));
    assert!(matches!(env.entries("a"), Err(KvError::UnknownDbi(_))));
}

#[test]
fn test_persistence_across_reopen() {
    let dir = TempDir::new().unwrap();
    let cfg = Config { init_db_size_mb: 1, ..Default::default() };
    {
        let env = Env::open_with(dir.path(), cfg.clone()).unwrap();
        env.open_dbi("a").unwrap();
        env.transact(&[Op::put("a", Value::U64(1), Value::str("durable"))]).unwrap();
        env.close().unwrap();
    }
    {
        let env = Env::open_with(dir.path(), cfg).unwrap();
        env.open_dbi("a").unwrap();
        assert_eq!(
            env.get_value("a", &Value::U64(1), ValueKind::Str).unwrap(),
            Some(Value::str("durable"))
        );
        assert_eq!(env.entries("a").unwrap(), 1);
    }
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn test_parallel_readers_stay_within_pool_cap() {
    let (env, _dir) = test_env();
    preload(&env, "a", 100);
    let env = Arc::new(env);

    let mut handles = Vec::new();
    for t in 0..16u64 {
        let env = Arc::clone(&env);
        handles.push(thread::spawn(move || {
            for i in 0..1000u64 {
                let key = Value::U64(1 + (t * 7 + i) % 100);
                let got = env.get_value("a", &key, ValueKind::Str).unwrap();
                assert!(got.is_some());
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert!(env.rtx_pool().allocated() <= 10, "pool exceeded use_readers");
}

#[test]
fn test_readers_race_writers() {
    let (env, _dir) = test_env();
    preload(&env, "a", 50);
    let env = Arc::new(env);

    let writer = {
        let env = Arc::clone(&env);
        thread::spawn(move || {
            for i in 0..50u64 {
                env.transact(&[Op::put("a", Value::U64(100 + i), Value::str("new"))]).unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let env = Arc::clone(&env);
        readers.push(thread::spawn(move || {
            for i in 0..200u64 {
                // the preloaded half is always visible
                let key = Value::U64(1 + i % 50);
                assert!(env.get_value("a", &key, ValueKind::Str).unwrap().is_some());
            }
        }));
    }

    writer.join().unwrap();
    for h in readers {
        h.join().unwrap();
    }
    assert_eq!(env.entries("a").unwrap(), 100);
}
