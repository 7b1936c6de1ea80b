//! End-to-end flows across the assembled service: media ingest with
//! derivatives, text indexing, retrieval, and delete.

mod common;

use std::io::Cursor;

use stowage::search::{SearchHit, SearchMode, SearchOptions};
use stowage::store::OpCtx;
use stowage::ErrorKind;

#[test]
fn photo_ingest_classifies_places_and_derives() {
    let fixture = common::service();
    let service = &fixture.service;

    let record = service
        .ingest_media(
            "t1",
            &mut Cursor::new(common::png_bytes()),
            "photo.JPG",
            Some("image/jpeg"),
            None,
            &OpCtx::none(),
        )
        .unwrap();

    // Extension signal wins; canonical path sits under the category tree.
    assert_eq!(record.category, "photos");
    let parts: Vec<&str> = record.path.split('/').collect();
    assert_eq!(parts.len(), 5);
    assert_eq!(parts[0], "photos");
    assert!(parts[4].starts_with("t1_"));
    assert!(parts[4].ends_with(".jpg"));

    // All three derivatives exist on disk.
    assert_eq!(record.thumbs.len(), 3);
    let labels: Vec<&str> = record.thumbs.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(labels, vec!["small", "medium", "large"]);

    // Catalog row agrees with the bytes on disk.
    let (fetched, bytes) = service.fetch_media("t1", &record.id).unwrap();
    assert_eq!(fetched.size_bytes, bytes.len() as u64);
    assert_eq!(bytes, common::png_bytes());
}

#[test]
fn media_roundtrip_returns_original_bytes() {
    let fixture = common::service();
    let body = b"the exact bytes that went in must come back out".to_vec();
    let record = fixture
        .service
        .ingest_media(
            "t1",
            &mut Cursor::new(body.clone()),
            "notes.txt",
            Some("text/plain"),
            None,
            &OpCtx::none(),
        )
        .unwrap();
    let (_, bytes) = fixture.service.fetch_media("t1", &record.id).unwrap();
    assert_eq!(bytes, body);
}

#[test]
fn empty_file_ingest_succeeds_with_category_from_extension() {
    let fixture = common::service();
    let record = fixture
        .service
        .ingest_media(
            "t1",
            &mut Cursor::new(Vec::new()),
            "empty.png",
            None,
            None,
            &OpCtx::none(),
        )
        .unwrap();
    assert_eq!(record.category, "photos");
    assert_eq!(record.size_bytes, 0);
    assert!(record.thumbs.is_empty());
}

#[test]
fn semantic_retrieval_ranks_matching_file_first() {
    let fixture = common::service();
    let service = &fixture.service;

    let nn = service
        .ingest_media(
            "t1",
            &mut Cursor::new(b"neural network training".to_vec()),
            "ml.txt",
            Some("text/plain"),
            None,
            &OpCtx::none(),
        )
        .unwrap();
    let bread = service
        .ingest_media(
            "t1",
            &mut Cursor::new(b"baking sourdough".to_vec()),
            "bread.txt",
            Some("text/plain"),
            None,
            &OpCtx::none(),
        )
        .unwrap();
    assert_eq!(service.index_file("t1", &nn.id, &OpCtx::none()).unwrap(), 1);
    assert_eq!(service.index_file("t1", &bread.id, &OpCtx::none()).unwrap(), 1);

    // The stub gateway embeds identical text identically; query with the
    // indexed phrase so the match is exact and the other file strictly
    // farther.
    let response = service
        .search(
            "t1",
            "neural network training",
            &SearchOptions {
                mode: SearchMode::Semantic,
                top_k: 3,
                categories: None,
            },
        )
        .unwrap();

    let distances: Vec<(String, f32)> = response
        .hits
        .iter()
        .map(|hit| match hit {
            SearchHit::Chunk {
                source_file_id,
                distance,
                ..
            } => (source_file_id.clone(), *distance),
            other => panic!("expected chunk hits, got {other:?}"),
        })
        .collect();
    assert_eq!(distances[0].0, nn.id);
    assert!(distances[0].1 < distances[1].1);
}

#[test]
fn indexing_marks_the_file_and_fills_the_prefix_index() {
    let fixture = common::service();
    let service = &fixture.service;
    let record = service
        .ingest_media(
            "t1",
            &mut Cursor::new(b"alpha beta gamma".to_vec()),
            "words.txt",
            Some("text/plain"),
            None,
            &OpCtx::none(),
        )
        .unwrap();
    service.index_file("t1", &record.id, &OpCtx::none()).unwrap();

    let files = service.list_files("t1").unwrap();
    assert!(files[0].indexed);

    let response = service
        .search(
            "t1",
            "alp",
            &SearchOptions {
                mode: SearchMode::Prefix,
                top_k: 5,
                categories: None,
            },
        )
        .unwrap();
    match &response.hits[0] {
        SearchHit::Token {
            token,
            source_file_ids,
            ..
        } => {
            assert_eq!(token, "alpha");
            assert_eq!(source_file_ids, &vec![record.id.clone()]);
        }
        other => panic!("expected token hit, got {other:?}"),
    }
}

#[test]
fn category_filter_limits_semantic_hits() {
    let fixture = common::service();
    let service = &fixture.service;
    let doc = service
        .ingest_media(
            "t1",
            &mut Cursor::new(b"shared phrase in a document".to_vec()),
            "a.txt",
            Some("text/plain"),
            None,
            &OpCtx::none(),
        )
        .unwrap();
    let code = service
        .ingest_media(
            "t1",
            &mut Cursor::new(b"shared phrase in some code".to_vec()),
            "b.rs",
            Some("text/plain"),
            None,
            &OpCtx::none(),
        )
        .unwrap();
    service.index_file("t1", &doc.id, &OpCtx::none()).unwrap();
    service.index_file("t1", &code.id, &OpCtx::none()).unwrap();

    let response = service
        .search(
            "t1",
            "shared phrase",
            &SearchOptions {
                mode: SearchMode::Semantic,
                top_k: 10,
                categories: Some(vec!["code".into()]),
            },
        )
        .unwrap();
    assert!(!response.hits.is_empty());
    for hit in &response.hits {
        match hit {
            SearchHit::Chunk { source_file_id, .. } => assert_eq!(source_file_id, &code.id),
            other => panic!("expected chunk hit, got {other:?}"),
        }
    }
}

#[test]
fn delete_file_removes_everything_and_is_idempotent() {
    let fixture = common::service();
    let service = &fixture.service;
    let record = service
        .ingest_media(
            "t1",
            &mut Cursor::new(b"transient content".to_vec()),
            "gone.txt",
            Some("text/plain"),
            None,
            &OpCtx::none(),
        )
        .unwrap();
    service.index_file("t1", &record.id, &OpCtx::none()).unwrap();
    let usage_before = service.tenant("t1").unwrap().unwrap().usage_bytes;
    assert!(usage_before > 0);

    service.delete_file("t1", &record.id).unwrap();
    assert_eq!(service.tenant("t1").unwrap().unwrap().usage_bytes, 0);
    assert!(service.list_files("t1").unwrap().is_empty());

    // Deleted content no longer surfaces in retrieval.
    let response = service
        .search(
            "t1",
            "tra",
            &SearchOptions {
                mode: SearchMode::Prefix,
                top_k: 5,
                categories: None,
            },
        )
        .unwrap();
    assert!(response.hits.is_empty());

    // Second delete: not-found, never a crash.
    let err = service.delete_file("t1", &record.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn tenants_never_see_each_other() {
    let fixture = common::service();
    let service = &fixture.service;
    service.create_tenant("t2", 1024 * 1024).unwrap();

    let record = service
        .ingest_media(
            "t1",
            &mut Cursor::new(b"tenant one secret".to_vec()),
            "secret.txt",
            Some("text/plain"),
            None,
            &OpCtx::none(),
        )
        .unwrap();
    service.index_file("t1", &record.id, &OpCtx::none()).unwrap();

    assert!(service.list_files("t2").unwrap().is_empty());
    let err = service.fetch_media("t2", &record.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let response = service
        .search(
            "t2",
            "secret words",
            &SearchOptions {
                mode: SearchMode::Hybrid,
                top_k: 10,
                categories: None,
            },
        )
        .unwrap();
    assert!(response.hits.is_empty());
}
