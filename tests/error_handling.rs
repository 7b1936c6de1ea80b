//! Error taxonomy behavior at the service boundary.

mod common;

use std::io::Cursor;

use serde_json::json;
use stowage::store::{CancelToken, OpCtx};
use stowage::ErrorKind;

#[test]
fn quota_exceeded_mid_stream_leaves_no_trace() {
    let fixture = common::service_with_quota(100);
    let service = &fixture.service;

    service
        .ingest_media(
            "t1",
            &mut Cursor::new(vec![0u8; 60]),
            "base.bin",
            None,
            None,
            &OpCtx::none(),
        )
        .unwrap();

    let err = service
        .ingest_media(
            "t1",
            &mut Cursor::new(vec![0u8; 50]),
            "over.bin",
            None,
            None,
            &OpCtx::none(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
    assert!(err.shape().hint.is_some());

    // No file row, unchanged usage.
    assert_eq!(service.list_files("t1").unwrap().len(), 1);
    assert_eq!(service.tenant("t1").unwrap().unwrap().usage_bytes, 60);
}

#[test]
fn quota_boundary_is_byte_exact() {
    let fixture = common::service_with_quota(100);
    let service = &fixture.service;
    service
        .ingest_media(
            "t1",
            &mut Cursor::new(vec![0u8; 99]),
            "a.bin",
            None,
            None,
            &OpCtx::none(),
        )
        .unwrap();
    // quota-1 used; one more byte fits exactly.
    service
        .ingest_media(
            "t1",
            &mut Cursor::new(vec![1u8]),
            "b.bin",
            None,
            None,
            &OpCtx::none(),
        )
        .unwrap();
    let err = service
        .ingest_media(
            "t1",
            &mut Cursor::new(vec![2u8]),
            "c.bin",
            None,
            None,
            &OpCtx::none(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
}

#[test]
fn json_quota_rejection_writes_nothing() {
    let fixture = common::service_with_quota(10);
    let service = &fixture.service;
    let big = json!({"text": "x".repeat(64)});
    let err = service
        .ingest_json("t1", &big, &[], &OpCtx::none())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
    assert!(service.list_json("t1").unwrap().is_empty());
    assert_eq!(service.tenant("t1").unwrap().unwrap().usage_bytes, 0);
    // No orphan payload either.
    let report = service.reconcile().unwrap();
    assert!(report.dropped_relational.is_empty());
    assert!(report.dropped_documents.is_empty());
}

#[test]
fn unknown_tenant_is_forbidden() {
    let fixture = common::service();
    let service = &fixture.service;
    let err = service
        .ingest_media(
            "ghost",
            &mut Cursor::new(vec![0u8; 4]),
            "x.bin",
            None,
            None,
            &OpCtx::none(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = service.list_files("ghost").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[test]
fn inactive_tenant_cannot_write_but_can_read() {
    let fixture = common::service();
    let service = &fixture.service;
    let record = service
        .ingest_media(
            "t1",
            &mut Cursor::new(b"kept".to_vec()),
            "kept.txt",
            Some("text/plain"),
            None,
            &OpCtx::none(),
        )
        .unwrap();

    service.set_tenant_active("t1", false).unwrap();
    let err = service
        .ingest_media(
            "t1",
            &mut Cursor::new(b"more".to_vec()),
            "more.txt",
            None,
            None,
            &OpCtx::none(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    // Reads keep working for forensics.
    let (fetched, _) = service.fetch_media("t1", &record.id).unwrap();
    assert_eq!(fetched.id, record.id);
}

#[test]
fn cancelled_ingest_maps_to_cancelled_and_cleans_up() {
    let fixture = common::service();
    let service = &fixture.service;
    let token = CancelToken::new();
    token.cancel();
    let err = service
        .ingest_media(
            "t1",
            &mut Cursor::new(vec![0u8; 32]),
            "c.bin",
            None,
            None,
            &OpCtx::none().with_cancel(token),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(service.tenant("t1").unwrap().unwrap().usage_bytes, 0);
    assert_eq!(service.guard().inflight_bytes("t1"), 0);
}

#[test]
fn expired_deadline_maps_to_timeout() {
    let fixture = common::service();
    let ctx = OpCtx::none().with_timeout(std::time::Duration::from_secs(0));
    std::thread::sleep(std::time::Duration::from_millis(5));
    let err = fixture
        .service
        .ingest_media(
            "t1",
            &mut Cursor::new(vec![0u8; 8]),
            "t.bin",
            None,
            None,
            &ctx,
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
}

#[test]
fn indexing_binary_content_is_a_validation_error() {
    let fixture = common::service();
    let service = &fixture.service;
    let record = service
        .ingest_media(
            "t1",
            &mut Cursor::new(vec![0xFFu8, 0xFE, 0x00, 0x9C]),
            "blob.bin",
            None,
            None,
            &OpCtx::none(),
        )
        .unwrap();
    let err = service
        .index_file("t1", &record.id, &OpCtx::none())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn missing_artifacts_are_not_found() {
    let fixture = common::service();
    let service = &fixture.service;
    assert_eq!(
        service.fetch_media("t1", "file_missing").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        service.fetch_json("t1", "doc_missing").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        service
            .index_file("t1", "file_missing", &OpCtx::none())
            .unwrap_err()
            .kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn empty_query_is_a_validation_error() {
    let fixture = common::service();
    let err = fixture
        .service
        .search("t1", "  ", &Default::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn error_shapes_carry_kind_and_message() {
    let fixture = common::service_with_quota(1);
    let err = fixture
        .service
        .ingest_media(
            "t1",
            &mut Cursor::new(vec![0u8; 16]),
            "big.bin",
            None,
            None,
            &OpCtx::none(),
        )
        .unwrap_err();
    let shape = err.shape();
    assert_eq!(shape.kind, ErrorKind::QuotaExceeded);
    assert!(shape.message.contains("t1"));
}
