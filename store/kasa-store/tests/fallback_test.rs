//! End-to-end fallback scenarios through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kasa_store::{
    BackendKind, BackendProber, Candidate, Connector, Document, FacadeState, Filter, FindOptions,
    RecordStore, Records, StorageError, StorageFacade, StorageResult, StoreConfig,
};
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};

/// Network backend that never answers.
struct Blackhole {
    probes: AtomicUsize,
}

#[async_trait]
impl Connector for Blackhole {
    fn target(&self) -> String {
        "mongodb://10.255.255.1:27017".to_string()
    }

    async fn probe(&self) -> StorageResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn connect(&self) -> StorageResult<Arc<dyn RecordStore>> {
        Err(StorageError::connection("unreachable"))
    }
}

fn embedded_facade(dir: &std::path::Path) -> Arc<StorageFacade> {
    let config = StoreConfig::default().with_data_dir(dir).embedded_only();
    Arc::new(StorageFacade::from_config(&config))
}

#[tokio::test]
async fn test_smith_family_on_embedded_store() {
    let dir = tempdir().unwrap();
    let facade = embedded_facade(dir.path());

    let id = assert_ok!(
        facade
            .insert("families", Document::new().with("name", "Smith Family"))
            .await
    );
    assert!(!id.is_empty());
    assert_eq!(facade.state(), FacadeState::Bound(BackendKind::Embedded));

    let found = assert_ok!(
        facade
            .find(
                "families",
                &Filter::eq("name", "Smith Family"),
                &FindOptions::new()
            )
            .await
    );
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].engine_id(), Some(id.as_str()));
    assert!(found[0].get_str("createdAt").is_some());

    // On disk as a pretty-printed JSON array
    let raw = std::fs::read_to_string(dir.path().join("families.json")).unwrap();
    let parsed: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed.as_array().map(Vec::len), Some(1));
    assert!(raw.contains('\n'));
}

#[tokio::test]
async fn test_unreachable_backends_fall_through_in_bounded_time() {
    let dir = tempdir().unwrap();
    let remote = Arc::new(Blackhole {
        probes: AtomicUsize::new(0),
    });
    let local = Arc::new(Blackhole {
        probes: AtomicUsize::new(0),
    });
    let facade = StorageFacade::new(
        BackendProber::new(dir.path())
            .with_candidate(Candidate::new(
                BackendKind::Remote,
                Duration::from_millis(300),
                remote.clone(),
            ))
            .with_candidate(Candidate::new(
                BackendKind::Local,
                Duration::from_millis(200),
                local.clone(),
            )),
    );

    let start = Instant::now();
    let kind = facade.init().await;
    let elapsed = start.elapsed();

    assert_eq!(kind, BackendKind::Embedded);
    assert_eq!(remote.probes.load(Ordering::SeqCst), 1);
    assert_eq!(local.probes.load(Ordering::SeqCst), 1);
    assert!(elapsed >= Duration::from_millis(500), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");

    // Never re-probed
    assert_ok!(facade.count("families", &Filter::all()).await);
    assert_eq!(remote.probes.load(Ordering::SeqCst), 1);
}

#[cfg(feature = "mongodb")]
#[tokio::test]
async fn test_unreachable_database_falls_back_to_embedded() {
    let dir = tempdir().unwrap();
    let config = StoreConfig::default()
        .with_data_dir(dir.path())
        .with_remote_uri("mongodb://127.0.0.1:1")
        .with_local_uri(Some("mongodb://127.0.0.1:2".to_string()))
        .with_remote_timeout(Duration::from_millis(500))
        .with_local_timeout(Duration::from_millis(500));
    let facade = StorageFacade::from_config(&config);

    let start = Instant::now();
    assert_eq!(facade.init().await, BackendKind::Embedded);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_concurrent_inserts_through_facade() {
    let dir = tempdir().unwrap();
    let facade = embedded_facade(dir.path());

    let (a, b) = tokio::join!(
        facade.insert("members", Document::new().with("name", "Dana")),
        facade.insert("members", Document::new().with("name", "Ron")),
    );
    assert_ok!(a);
    assert_ok!(b);

    let names: Vec<String> = facade
        .find(
            "members",
            &Filter::all(),
            &FindOptions::new().sort_by("name", kasa_store::SortOrder::Ascending),
        )
        .await
        .unwrap()
        .iter()
        .filter_map(|d| d.get_str("name").map(str::to_string))
        .collect();
    assert_eq!(names, vec!["Dana", "Ron"]);
}

#[tokio::test]
async fn test_update_of_missing_user() {
    let dir = tempdir().unwrap();
    let facade = embedded_facade(dir.path());

    let modified = assert_ok!(
        facade
            .update(
                "users",
                &Filter::eq("email", "a@x.com"),
                Document::new().with("role", "admin"),
            )
            .await
    );
    assert_eq!(modified, 0);
    assert_eq!(assert_ok!(facade.count("users", &Filter::all()).await), 0);
}

#[tokio::test]
async fn test_json_filter_shapes() {
    let dir = tempdir().unwrap();
    let facade = embedded_facade(dir.path());
    for (first, email) in [("Dana", "dana@x.com"), ("Ron", "ron@y.com")] {
        assert_ok!(
            facade
                .insert(
                    "users",
                    Document::new().with("firstName", first).with("email", email),
                )
                .await
        );
    }

    let filter = Filter::from_json(&json!({
        "$or": [
            {"firstName": {"$regex": "^da", "$options": "i"}},
            {"email": "ron@y.com"}
        ]
    }))
    .unwrap();
    assert_eq!(assert_ok!(facade.count("users", &filter).await), 2);

    assert_err!(Filter::from_json(&json!({"age": {"$gt": 3}})));
}

#[tokio::test]
async fn test_records_survive_restart() {
    let dir = tempdir().unwrap();
    let family_id = {
        let records = Records::new(embedded_facade(dir.path()));
        let family = records
            .create_family(Document::new().with("name", "Smith Family"))
            .await
            .unwrap();
        family.app_id().unwrap().to_string()
    };

    let records = Records::new(embedded_facade(dir.path()));
    let family = records.get_family(&family_id).await.unwrap().unwrap();
    assert_eq!(family.get_str("name"), Some("Smith Family"));

    let status = serde_json::to_value(records.status()).unwrap();
    assert_eq!(status["backendKind"], "embedded");
}
