use std::time::{Duration, Instant};

use tempfile::TempDir;

use super::{test_pool, write_wav, TEST_RATE};
use crate::audio::{byte_offset_to_duration, duration_to_byte_offset, Source};
use crate::models::{PcmSpec, SourceKind};

// Bounds are loose enough for unoptimized builds on slow CI machines.

#[test]
fn test_static_decode_throughput() {
    let dir = TempDir::new().unwrap();
    // 10 seconds of CD-quality stereo
    let path = write_wav(dir.path(), "long.wav", 44100, 2, 16, 441_000);
    let (pool, driver) = test_pool(4);

    let start = Instant::now();
    let source = Source::new(&pool, &path, SourceKind::Static).unwrap();
    let elapsed = start.elapsed();

    println!("Static decode of 10 s took {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(5));
    assert_eq!(source.duration(), Some(Duration::from_secs(10)));
    assert_eq!(driver.buffer_count(), 1);
}

#[test]
fn test_tick_cost_with_busy_pool() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "loop.wav", TEST_RATE, 1, 16, 4000);
    let (pool, driver) = test_pool(32);

    let sources: Vec<Source> = (0..32)
        .map(|_| {
            let source = Source::new(&pool, &path, SourceKind::Stream).unwrap();
            source.set_looping(true);
            assert!(source.play());
            source
        })
        .collect();

    let mut worst = Duration::ZERO;
    for _ in 0..20 {
        driver.advance(Duration::from_millis(100));
        let start = Instant::now();
        pool.tick();
        worst = worst.max(start.elapsed());
    }

    println!("Worst tick over 32 streams: {:?}", worst);
    assert!(worst < Duration::from_millis(500));
    assert!(sources.iter().all(|s| s.is_playing()));
    assert_eq!(pool.free_voices(), 0);
}

#[test]
fn test_offset_conversion_is_cheap() {
    let spec = PcmSpec::new(2, 48000, 16);
    let start = Instant::now();
    let mut total = 0u64;
    for millis in 0..200_000u64 {
        let offset = duration_to_byte_offset(Duration::from_millis(millis), &spec);
        total = total.wrapping_add(byte_offset_to_duration(offset, &spec).as_nanos() as u64);
    }
    let elapsed = start.elapsed();

    println!("200k round trips took {:?}", elapsed);
    assert!(total > 0);
    assert!(elapsed < Duration::from_secs(2));
}
