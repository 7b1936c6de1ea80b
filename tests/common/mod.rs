//! Shared fixtures for the integration suite.

use std::sync::Arc;

use stowage::embedding::{EmbeddingConfig, StubGateway};
use stowage::{Service, ServiceConfig};

/// Small dimension keeps the stub cheap while exercising the same paths.
pub const DIM: usize = 64;

pub struct TestService {
    /// Held for its Drop; removing it would delete the storage root.
    pub _dir: tempfile::TempDir,
    pub service: Service,
}

/// A fully wired service over a temp root with the deterministic stub
/// gateway and one tenant `t1` carrying the given quota.
pub fn service_with_quota(quota: u64) -> TestService {
    let dir = tempfile::tempdir().expect("temp root");
    let config = ServiceConfig::default()
        .with_root_dir(dir.path())
        .with_embedding(EmbeddingConfig::default().with_dimension(DIM));
    let gateway = Arc::new(StubGateway::new(DIM, true));
    let service = Service::open(config, gateway).expect("service opens");
    service.create_tenant("t1", quota).expect("tenant created");
    TestService {
        _dir: dir,
        service,
    }
}

pub fn service() -> TestService {
    service_with_quota(100 * 1024 * 1024)
}

/// Encoded opaque PNG, 320x160.
pub fn png_bytes() -> Vec<u8> {
    use image::{Rgb, RgbImage};
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.png");
    RgbImage::from_pixel(320, 160, Rgb([12u8, 180, 90]))
        .save(&path)
        .unwrap();
    std::fs::read(&path).unwrap()
}
