use std::error::Error;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use monsoon_settings::{
    BackendError, JsonFileBackend, MemoryBackend, SettingChange, SettingValue, SettingsBackend,
    SettingsError, SettingsStore,
};

fn memory_store() -> Arc<SettingsStore> {
    Arc::new(SettingsStore::new(Arc::new(MemoryBackend::new())))
}

struct UnreachableBackend;

impl SettingsBackend for UnreachableBackend {
    fn get(&self, _key: &str) -> Result<Option<SettingValue>, BackendError> {
        Err(BackendError::Transport {
            operation: "get",
            source: Box::new(io::Error::new(io::ErrorKind::ConnectionRefused, "daemon down")),
        })
    }

    fn set(&self, _key: &str, _value: SettingValue) -> Result<(), BackendError> {
        Err(BackendError::Transport {
            operation: "set",
            source: Box::new(io::Error::new(io::ErrorKind::ConnectionRefused, "daemon down")),
        })
    }
}

#[test]
fn missing_key_reports_setting_not_found() {
    let store = memory_store();
    match store.retrieve("torrent/max_peers") {
        Err(SettingsError::SettingNotFound { key }) => {
            assert_eq!(key, "/apps/monsoon/torrent/max_peers");
        }
        other => panic!("expected SettingNotFound, got {other:?}"),
    }
}

#[test]
fn stored_values_round_trip() -> anyhow::Result<()> {
    let store = memory_store();
    let columns = vec!["name".to_string(), "progress".to_string()];
    store.store("ui/columns", columns.clone())?;
    store.store("ui/width", 800_i64)?;
    store.store("ui/maximised", true)?;
    store.store("paths/download", "/srv/downloads")?;

    assert_eq!(store.retrieve("ui/columns")?, SettingValue::TextList(columns.clone()));
    assert_eq!(store.retrieve_as::<Vec<String>>("ui/columns")?, columns);
    assert_eq!(store.retrieve_as::<i64>("ui/width")?, 800);
    assert!(store.retrieve_as::<bool>("ui/maximised")?);
    assert_eq!(store.retrieve_as::<String>("paths/download")?, "/srv/downloads");
    assert_eq!(
        store.retrieve_absolute("/apps/monsoon/ui/width")?,
        SettingValue::Integer(800)
    );
    store.flush()?;
    Ok(())
}

#[test]
fn typed_retrieval_reports_mismatch() {
    let store = memory_store();
    store.store("ui/width", "wide").unwrap();
    match store.retrieve_as::<i64>("ui/width") {
        Err(SettingsError::TypeMismatch {
            expected, found, ..
        }) => {
            assert_eq!(expected, "integer");
            assert_eq!(found, "text");
        }
        other => panic!("expected TypeMismatch, got {other:?}"),
    }
}

#[test]
fn transport_failures_propagate_unchanged() {
    let store = SettingsStore::new(Arc::new(UnreachableBackend));
    let err = store.retrieve("ui/width").unwrap_err();
    let SettingsError::Backend {
        operation, source, ..
    } = &err
    else {
        panic!("expected backend failure, got {err:?}");
    };
    assert_eq!(*operation, "retrieve");
    assert!(matches!(source, BackendError::Transport { operation: "get", .. }));
    let root = err
        .source()
        .and_then(|backend| backend.source())
        .expect("transport cause should be preserved");
    assert_eq!(root.to_string(), "daemon down");

    assert!(matches!(
        store.store("ui/width", 1_i64),
        Err(SettingsError::Backend { operation: "store", .. })
    ));
}

#[test]
fn listeners_fire_once_per_store_on_covered_keys() {
    let store = memory_store();
    let exact = Arc::new(AtomicUsize::new(0));
    let directory = Arc::new(Mutex::new(Vec::new()));

    let counter = Arc::clone(&exact);
    store.add_listener("ui/width", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let seen = Arc::clone(&directory);
    let id = store.add_listener("ui/", move |change: &SettingChange| {
        seen.lock().unwrap().push(change.key.clone());
    });

    store.store("ui/width", 1_i64).unwrap();
    store.store("ui/width", 2_i64).unwrap();
    store.store("ui/height", 3_i64).unwrap();
    store.store("torrent/max_peers", 4_i64).unwrap();
    store.store("uid", 5_i64).unwrap();

    assert_eq!(exact.load(Ordering::SeqCst), 2);
    assert_eq!(
        *directory.lock().unwrap(),
        ["ui/width", "ui/width", "ui/height"]
    );

    assert!(store.remove_listener(id));
    assert!(!store.remove_listener(id));
    store.store("ui/height", 6_i64).unwrap();
    assert_eq!(directory.lock().unwrap().len(), 3);
}

#[test]
fn listeners_accept_absolute_paths_under_the_prefix() {
    let store = memory_store();
    let widths = Arc::new(AtomicUsize::new(0));
    let everything = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&widths);
    store.add_listener("/apps/monsoon/ui/width", move |change| {
        assert_eq!(change.absolute_key, "/apps/monsoon/ui/width");
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&everything);
    store.add_listener("/apps/monsoon/", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    store.store("ui/width", 640_i64).unwrap();
    store.store("ui/height", 480_i64).unwrap();

    assert_eq!(widths.load(Ordering::SeqCst), 1);
    assert_eq!(everything.load(Ordering::SeqCst), 2);
}

#[test]
fn listener_may_reenter_the_same_namespace() {
    let store = memory_store();
    let mirror = Arc::clone(&store);
    store.add_listener("ui/width", move |change| {
        let current = mirror.retrieve("ui/width").expect("value should be visible");
        assert_eq!(current, change.value);
        mirror
            .store("ui/width_mirror", change.value.clone())
            .expect("nested store should not deadlock");
    });

    store.store("ui/width", 1024_i64).unwrap();
    assert_eq!(store.retrieve_as::<i64>("ui/width_mirror").unwrap(), 1024);
}

#[test]
fn concurrent_writers_in_one_namespace_all_land() {
    let store = memory_store();
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notified);
    store.add_listener("torrent", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handles: Vec<_> = (0..8_i64)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for round in 0..25_i64 {
                    store
                        .store(&format!("torrent/worker_{worker}"), round)
                        .expect("store should succeed");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    assert_eq!(notified.load(Ordering::SeqCst), 200);
    for worker in 0..8 {
        assert_eq!(
            store
                .retrieve_as::<i64>(&format!("torrent/worker_{worker}"))
                .unwrap(),
            24
        );
    }
}

#[test]
fn file_backed_store_persists_across_instances() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("settings.json");

    let store = SettingsStore::new(Arc::new(JsonFileBackend::open(&path)?));
    store.store("paths/download", "/srv/downloads")?;

    let reopened = SettingsStore::new(Arc::new(JsonFileBackend::open(&path)?));
    assert_eq!(
        reopened.retrieve_as::<String>("paths/download")?,
        "/srv/downloads"
    );
    assert!(matches!(
        reopened.retrieve("paths/missing"),
        Err(SettingsError::SettingNotFound { .. })
    ));
    Ok(())
}

#[test]
fn malformed_keys_are_rejected() {
    let store = memory_store();
    assert!(matches!(
        store.store("", 1_i64),
        Err(SettingsError::InvalidKey { .. })
    ));
    assert!(matches!(
        store.retrieve("/ui/width"),
        Err(SettingsError::InvalidKey { .. })
    ));
}
