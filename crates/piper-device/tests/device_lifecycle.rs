//! Device-level behaviour with the producer loops running on a paused clock.
//!
//! Run with: cargo test -p piper-device --test device_lifecycle

use ndarray::{ArrayD, IxDyn};
use piper_core::{AcquisitionState, InboundFrame};
use piper_device::{DeviceSettings, PiperDevice};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

fn device(save_to: &std::path::Path) -> PiperDevice {
    PiperDevice::new(DeviceSettings {
        save_to: save_to.to_path_buf(),
        pattern_size: 32,
        channel_capacity: 64,
        ..DeviceSettings::default()
    })
    .unwrap()
}

fn read_frame_file(path: &std::path::Path) -> ArrayD<f32> {
    let npy = npyz::NpyFile::new(std::fs::File::open(path).unwrap()).unwrap();
    let shape: Vec<usize> = npy.shape().iter().map(|&n| n as usize).collect();
    ArrayD::from_shape_vec(IxDyn(&shape), npy.into_vec::<f32>().unwrap()).unwrap()
}

fn drain<T: Clone>(rx: &mut tokio::sync::broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(item) => out.push(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return out,
            Err(TryRecvError::Lagged(n)) => panic!("receiver lagged by {}", n),
        }
    }
}

// =============================================================================
// Primary stream
// =============================================================================

#[tokio::test(start_paused = true)]
async fn ten_acquiring_ticks_emit_trains_two_to_eleven() {
    let dir = tempfile::tempdir().unwrap();
    let device = device(dir.path());
    let mut frames = device.subscribe_primary();

    device.toggle_acquisition();
    device.start().unwrap();

    // Ticks at 0, 100, ..., 900 ms.
    tokio::time::sleep(Duration::from_millis(950)).await;
    device.toggle_acquisition();
    tokio::time::sleep(Duration::from_millis(500)).await;

    let ids: Vec<u64> = drain(&mut frames).iter().map(|f| f.train_id).collect();
    assert_eq!(ids, (2..=11).collect::<Vec<_>>());

    device.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn reacquiring_restarts_at_train_two() {
    let dir = tempfile::tempdir().unwrap();
    let device = device(dir.path());
    let mut frames = device.subscribe_primary();
    device.start().unwrap();

    device.toggle_acquisition();
    tokio::time::sleep(Duration::from_millis(350)).await;
    device.toggle_acquisition();
    tokio::time::sleep(Duration::from_millis(200)).await;
    drain(&mut frames);

    device.toggle_acquisition();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let first = drain(&mut frames).first().map(|f| f.train_id);
    assert_eq!(first, Some(2));

    device.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn acquiring_without_consumers_keeps_counting_trains() {
    let dir = tempfile::tempdir().unwrap();
    let device = device(dir.path());
    device.toggle_acquisition();
    device.start().unwrap();

    // Ticks at 0, 100, ..., 900 ms go nowhere but still advance the train id.
    tokio::time::sleep(Duration::from_millis(950)).await;
    let mut frames = device.subscribe_primary();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let ids: Vec<u64> = drain(&mut frames).iter().map(|f| f.train_id).collect();
    assert_eq!(ids, vec![12, 13]);
    assert_eq!(device.state(), AcquisitionState::Acquiring);

    device.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn idle_device_emits_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let device = device(dir.path());
    let mut frames = device.subscribe_primary();
    let mut patterns = device.subscribe_patterns();
    device.start().unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(drain(&mut frames).is_empty());
    assert!(drain(&mut patterns).is_empty());
    assert_eq!(device.state(), AcquisitionState::Idle);

    device.shutdown().await.unwrap();
}

// =============================================================================
// Pattern stream
// =============================================================================

#[tokio::test(start_paused = true)]
async fn processing_cycles_patterns_and_publishes_throughput() {
    let dir = tempfile::tempdir().unwrap();
    let device = device(dir.path());
    let mut patterns = device.subscribe_patterns();
    let mut throughput = device.throughput().subscribe();

    device.toggle_processing();
    device.start().unwrap();

    // Ticks at 0, 100, ..., 1000 ms; the window closes on the last one.
    tokio::time::sleep(Duration::from_millis(1050)).await;

    let emitted = drain(&mut patterns);
    assert_eq!(emitted.len(), 11);
    assert!(Arc::ptr_eq(&emitted[0], &emitted[3]));
    assert!(Arc::ptr_eq(&emitted[1], &emitted[4]));
    assert!(!Arc::ptr_eq(&emitted[0], &emitted[1]));
    assert_eq!(emitted[0].dim(), (32, 32));

    assert!(throughput.has_changed().unwrap());
    let hz = *throughput.borrow_and_update();
    assert!((hz - 11.0).abs() < 1e-6, "throughput was {}", hz);

    // Leaving Processing zeroes the metric.
    device.toggle_processing();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(device.throughput().get(), 0.0);

    device.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn throughput_is_published_without_pattern_consumers() {
    let dir = tempfile::tempdir().unwrap();
    let device = device(dir.path());
    device.toggle_processing();
    device.start().unwrap();

    // Ticks at 0, 100, ..., 2000 ms; windows close at 1000 and 2000 ms.
    tokio::time::sleep(Duration::from_millis(2050)).await;

    let hz = device.throughput().get();
    assert!((hz - 10.0).abs() < 1e-6, "throughput was {}", hz);
    assert_eq!(device.status().throughput_hz, hz);

    device.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn only_one_stream_emits_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let device = device(dir.path());
    let mut frames = device.subscribe_primary();
    let mut patterns = device.subscribe_patterns();
    device.start().unwrap();

    device.toggle_acquisition();
    tokio::time::sleep(Duration::from_millis(250)).await;
    device.toggle_processing();
    let frames_before = drain(&mut frames).len();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(frames_before > 0);
    assert!(drain(&mut frames).is_empty());
    assert!(!drain(&mut patterns).is_empty());
    assert_eq!(device.state(), AcquisitionState::Processing);

    device.shutdown().await.unwrap();
}

// =============================================================================
// Ingest
// =============================================================================

async fn wait_for_count(device: &PiperDevice, count: u64) {
    for _ in 0..500 {
        if device.saved_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("saved_count stuck at {}", device.saved_count());
}

#[tokio::test]
async fn inbound_frames_are_saved_and_counted() {
    let dir = tempfile::tempdir().unwrap();
    let device = device(&dir.path().join("frames"));
    device.start().unwrap();
    let input = device.input();

    let image = ArrayD::from_shape_fn(IxDyn(&[8, 6, 2]), |idx| (idx[0] * 6 + idx[1]) as f32);
    input
        .send(InboundFrame::new("A/B:C", vec![7], image.clone()))
        .await
        .unwrap();
    input
        .send(InboundFrame::new("A/B:C", vec![8], ArrayD::zeros(IxDyn(&[8, 6]))))
        .await
        .unwrap();
    input
        .send(InboundFrame::new("A/B:C", vec![9], image))
        .await
        .unwrap();

    wait_for_count(&device, 3).await;

    let saved = dir.path().join("frames").join("A_B_C_7.npy");
    let array = read_frame_file(&saved);
    assert_eq!(array.shape(), &[8, 6]);
    assert_eq!(array[IxDyn(&[2, 3])], 15.0);
    assert!(!dir.path().join("frames").join("A_B_C_8.npy").exists());
    assert!(dir.path().join("frames").join("A_B_C_9.npy").exists());

    device.shutdown().await.unwrap();
}

#[tokio::test]
async fn save_directory_change_applies_to_later_frames() {
    let dir = tempfile::tempdir().unwrap();
    let device = device(&dir.path().join("first"));
    device.start().unwrap();
    let input = device.input();
    let image = || ArrayD::<f32>::zeros(IxDyn(&[4, 4, 1]));

    input.send(InboundFrame::new("det", vec![1], image())).await.unwrap();
    wait_for_count(&device, 1).await;

    device.set_save_to(dir.path().join("second")).unwrap();
    input.send(InboundFrame::new("det", vec![2], image())).await.unwrap();
    wait_for_count(&device, 2).await;

    assert!(dir.path().join("first").join("det_1.npy").exists());
    assert!(dir.path().join("second").join("det_2.npy").exists());

    device.shutdown().await.unwrap();
}
