#![forbid(unsafe_code)]
//! E2E write-through tests: payloads survive eviction and process
//! restarts because every `store` reaches the device synchronously.

use shoal_block::{ByteBlockDevice, DeviceTable, FileByteDevice, MemBlockDevice};
use shoal_cache::{BufCache, CacheConfig};
use shoal_types::cancel::CancelToken;
use shoal_types::{BlockNumber, BlockSize, DeviceId};
use std::io::Write;
use std::sync::Arc;

const BS: u32 = 512;

fn block_size() -> BlockSize {
    BlockSize::new(BS).expect("valid block size")
}

#[test]
fn payload_round_trips_through_eviction() {
    let dev = Arc::new(MemBlockDevice::new(block_size(), 256));
    let table = DeviceTable::single(dev).expect("table");
    let cache = BufCache::new(
        table,
        CacheConfig {
            capacity: 8,
            shards: 3,
            block_size: block_size(),
        },
    )
    .expect("cache");
    let cx = CancelToken::new();

    let h = cache.load(&cx, DeviceId(0), BlockNumber(5)).expect("load");
    cache.with_data_mut(&h, |d| d.fill(0xC3)).expect("fill");
    cache.store(&cx, &h).expect("write-through");
    cache.release(h).expect("release");

    // Cycle enough fresh blocks to recycle every slot.
    for b in 100..108_u64 {
        let h = cache.load(&cx, DeviceId(0), BlockNumber(b)).expect("load");
        cache.release(h).expect("release");
    }
    assert!(
        !cache.contains(DeviceId(0), BlockNumber(5)),
        "block 5 must have been evicted"
    );

    // Reloading misses and reads the stored payload back from the device.
    let h = cache
        .load(&cx, DeviceId(0), BlockNumber(5))
        .expect("reload");
    let intact = cache
        .with_data(&h, |d| d.iter().all(|&b| b == 0xC3))
        .expect("read");
    cache.release(h).expect("release");
    assert!(intact, "payload lost across eviction and reload");
}

#[test]
fn file_backed_store_survives_cache_teardown() {
    let block_size = BlockSize::new(1024).expect("valid");
    let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
    tmp.write_all(&vec![0_u8; 64 * 1024]).expect("fill image");
    tmp.flush().expect("flush");
    let cx = CancelToken::new();

    let config = CacheConfig {
        capacity: 8,
        shards: 3,
        block_size,
    };

    {
        let byte_dev = FileByteDevice::open(tmp.path()).expect("open");
        let dev = Arc::new(ByteBlockDevice::new(byte_dev, block_size).expect("device"));
        let table = DeviceTable::single(dev).expect("table");
        let cache = BufCache::new(table, config).expect("cache");

        let h = cache.load(&cx, DeviceId(0), BlockNumber(9)).expect("load");
        cache.with_data_mut(&h, |d| d.fill(0x7E)).expect("fill");
        cache.store(&cx, &h).expect("write-through");
        cache.release(h).expect("release");
    }

    // A brand-new cache over the same image sees the stored payload.
    let byte_dev = FileByteDevice::open(tmp.path()).expect("reopen");
    let dev = Arc::new(ByteBlockDevice::new(byte_dev, block_size).expect("device"));
    let table = DeviceTable::single(dev).expect("table");
    let cache = BufCache::new(table, config).expect("cache");

    let h = cache.load(&cx, DeviceId(0), BlockNumber(9)).expect("load");
    let intact = cache
        .with_data(&h, |d| d.iter().all(|&b| b == 0x7E))
        .expect("read");
    cache.release(h).expect("release");
    assert!(intact, "write-through did not reach the image");
}
