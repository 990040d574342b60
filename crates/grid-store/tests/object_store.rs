//! Integration test: stores kept in object storage.
//!
//! Uses the in-memory `object_store` implementation so no MinIO is needed.

use std::sync::Arc;

use grid_store::{
    BlockCache, CompressionKind, Dimensions, ObjectStoreBackend, StoreConfig, StoreError,
    StoreReader, StoreWriter,
};
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use test_utils::create_temperature_series;
use test_utils::fixtures::{resources, scale, shapes};

async fn upload(store: &Arc<dyn ObjectStore>, name: &str) -> Vec<f32> {
    let (d0, d1, c0, c1) = shapes::HOURLY_WEEK;
    let values = create_temperature_series(d0 as usize, d1 as usize);
    let dims = Dimensions::new(d0, d1, c0, c1).expect("Failed to create dimensions");
    let mut writer = StoreWriter::new(dims, CompressionKind::LossyInteger, scale::TEMPERATURE)
        .expect("Failed to create writer");
    writer.write_all(&values).expect("Failed to write values");
    let bytes = writer.finish().expect("Failed to finish store").into_bytes();
    store
        .put(&Path::from(name), bytes)
        .await
        .expect("Failed to upload store");
    values
}

#[tokio::test]
async fn test_object_store_roundtrip() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let values = upload(&store, resources::TEMPERATURE_2M).await;

    let backend = ObjectStoreBackend::open(store, resources::TEMPERATURE_2M)
        .await
        .expect("Failed to open object");
    let reader = StoreReader::open(backend).await.expect("Failed to open store");
    assert_eq!(reader.compression(), CompressionKind::LossyInteger);

    let out = reader.read(10..12, 24..48).await.expect("Failed to read");
    for (i, v) in out.iter().enumerate() {
        let expected = values[(10 + i / 24) * 168 + 24 + i % 24];
        assert!((v - expected).abs() <= 0.5 / scale::TEMPERATURE + 1e-4);
    }
}

#[tokio::test]
async fn test_object_store_through_block_cache() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let values = upload(&store, resources::PRECIPITATION).await;

    let cache = Arc::new(BlockCache::new(4096, 16).expect("Failed to create cache"));
    let backend = ObjectStoreBackend::open(Arc::clone(&store), resources::PRECIPITATION)
        .await
        .expect("Failed to open object");
    let reader = StoreReader::open_cached(backend, Arc::clone(&cache), StoreConfig::default())
        .await
        .expect("Failed to open store");

    let a = reader.read(0..100, 0..168).await.expect("Failed to read");
    let b = reader.read(0..100, 0..168).await.expect("Failed to read");
    assert_eq!(a, b);
    for (x, y) in values.iter().zip(&a) {
        assert!((x - y).abs() <= 0.5 / scale::TEMPERATURE + 1e-4);
    }
    assert!(cache.stats().entries > 0);
}

#[tokio::test]
async fn test_missing_object_is_not_found() {
    let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
    let result = ObjectStoreBackend::open(store, resources::MISSING).await;
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}
