//! Response formatter tests
//!
//! Tests for store delegation and the inline / summary fallbacks.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use atelier_core::{
    Artifact, ArtifactRendering, ArtifactStore, ResponseFormatter, StorageMetadata, TurnResponse,
};
use chrono::Utc;
use common::MockStore;

fn metadata() -> StorageMetadata {
    StorageMetadata {
        owner: "acme".into(),
        thread_id: Some("t-1".into()),
        session_key: "k1".into(),
        prompt: "draw a cat".into(),
        created_at: Utc::now(),
    }
}

fn one_image(size: usize) -> TurnResponse {
    TurnResponse {
        text: "here you go".into(),
        artifacts: vec![Artifact::new(vec![0x42u8; size], "image/png")],
        usage: None,
    }
}

#[tokio::test]
async fn test_store_locator_is_referenced() {
    let store = Arc::new(MockStore::default());
    let formatter = ResponseFormatter::new(Some(store.clone() as Arc<dyn ArtifactStore>), 100);

    // Far above the inline limit; the store takes it anyway
    let out = formatter.format_turn(&one_image(10_000), &metadata()).await;

    assert_eq!(
        out.renderings,
        vec![ArtifactRendering::Stored {
            locator: "https://images.test/k1/1.png".into()
        }]
    );
    assert!(out.text.contains("![Generated image](https://images.test/k1/1.png)"));
    assert!(out.text.contains("Size: 10000 bytes"));
    assert!(!out.text.contains("data:image/png"));

    let seen = store.last_metadata.lock().clone().unwrap();
    assert_eq!(seen.owner, "acme");
    assert_eq!(seen.thread_id.as_deref(), Some("t-1"));
    assert_eq!(seen.prompt, "draw a cat");
}

#[tokio::test]
async fn test_store_failure_falls_back_to_inline() {
    let store = Arc::new(MockStore::failing());
    let formatter = ResponseFormatter::new(Some(store.clone() as Arc<dyn ArtifactStore>), 1_000);

    let out = formatter.format_turn(&one_image(30), &metadata()).await;

    assert_eq!(out.renderings, vec![ArtifactRendering::Inline]);
    assert!(out.text.contains("![Generated image](data:image/png;base64,"));
    assert_eq!(store.stored.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_store_failure_with_large_artifact_summarizes() {
    let formatter =
        ResponseFormatter::new(Some(Arc::new(MockStore::failing()) as Arc<dyn ArtifactStore>), 1_000);

    let out = formatter.format_turn(&one_image(4_096), &metadata()).await;

    assert_eq!(out.renderings, vec![ArtifactRendering::Summary]);
    assert!(out.text.contains("[Image generated successfully]"));
    assert!(out.text.contains("Size: 4096 bytes (4.0 KB)"));
    assert!(out.text.contains("too large to display inline"));
    assert!(!out.text.contains("base64"));
}

#[tokio::test]
async fn test_default_limit_matches_config_default() {
    let formatter = ResponseFormatter::default();
    assert_eq!(formatter.inline_limit(), atelier_core::defaults::INLINE_LIMIT_BYTES);

    // 37_500 bytes encode to exactly 50_000 characters; one more byte tips it over
    let out = formatter.format_turn(&one_image(37_500), &metadata()).await;
    assert_eq!(out.renderings, vec![ArtifactRendering::Inline]);
    let out = formatter.format_turn(&one_image(37_501), &metadata()).await;
    assert_eq!(out.renderings, vec![ArtifactRendering::Summary]);
}

#[tokio::test]
async fn test_with_store_switches_to_delegation() {
    let store = Arc::new(MockStore::default());
    let formatter = ResponseFormatter::default().with_store(store.clone());

    let response = TurnResponse {
        text: String::new(),
        artifacts: vec![
            Artifact::new(b"one".to_vec(), "image/png"),
            Artifact::new(b"two".to_vec(), "image/png"),
        ],
        usage: None,
    };
    let out = formatter.format_turn(&response, &metadata()).await;

    assert_eq!(out.renderings.len(), 2);
    assert_eq!(store.stored.load(Ordering::SeqCst), 2);
    assert!(out.text.contains("--- Image 2 ---"));
    assert!(out.text.contains("https://images.test/k1/2.png"));
}
