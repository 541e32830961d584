use std::{io::Write, sync::atomic::Ordering, thread};

use pl4_core::{ByteSource, PACKET_SIZE};
use pl4_recorder::{
    create_device, csv_paths, AcquisitionPipeline, ChannelSink, CsvSink, DeviceKind,
    OutputFormat, Pl4Device, RecorderConfig, SimCorruption, SimulatedDevice,
};
use pl4_types::Emission;
use tempfile::{tempdir, NamedTempFile};

// ===========================================================================
// Helpers
// ===========================================================================

/// Сырой захват: `packets` чистых кадров от симулятора.
fn capture(packets: u64) -> Vec<u8> {
    let mut sim = SimulatedDevice::unpaced().with_packet_limit(packets);
    sim.burst_packets = packets as usize;
    sim.start().unwrap();
    let n = sim.available().unwrap();
    sim.pull(n).unwrap()
}

fn replay_config(
    input: &std::path::Path,
    output: &std::path::Path,
) -> RecorderConfig {
    RecorderConfig {
        device: DeviceKind::File,
        input_path: Some(input.to_path_buf()),
        output_path: output.to_path_buf(),
        format: OutputFormat::Csv,
        duration_secs: Some(10),
        cycle_ms: 0,
        stats_interval_secs: 60,
        ..RecorderConfig::default()
    }
}

fn parse_column(
    text: &str,
    column: usize,
) -> Vec<u64> {
    text.lines()
        .skip(1)
        .map(|l| l.split(',').nth(column).unwrap().parse().unwrap())
        .collect()
}

// ===========================================================================
// Сценарии
// ===========================================================================

#[test]
fn test_capture_replay_to_csv() {
    let mut input = NamedTempFile::new().unwrap();
    input.write_all(&capture(512)).unwrap();
    input.flush().unwrap();

    let dir = tempdir().unwrap();
    let output = dir.path().join("replay");
    let config = replay_config(input.path(), &output);

    let device = create_device(&config).unwrap();
    let mut sink = CsvSink::create(&output).unwrap();
    let (pipeline, metrics) = AcquisitionPipeline::new(config);
    pipeline.run(device, &mut sink).unwrap();

    let (high_path, low_path) = csv_paths(&output);
    let high = std::fs::read_to_string(high_path).unwrap();
    let low = std::fs::read_to_string(low_path).unwrap();

    assert_eq!(low.lines().count(), 1 + 512);
    assert_eq!(high.lines().count(), 1 + 2_048);
    assert_eq!(metrics.checksum_errors.load(Ordering::Relaxed), 0);

    // Метки времени строго возрастают, шаг медленного потока 1/256 с
    let low_ts = parse_column(&low, 0);
    for w in low_ts.windows(2) {
        assert_eq!(w[1] - w[0], 3_906_250);
    }
    let high_ts = parse_column(&high, 0);
    assert!(high_ts.windows(2).all(|w| w[0] < w[1]));

    // Счётчик повторяется 4 раза в быстром потоке
    let high_counters = parse_column(&high, 1);
    assert_eq!(&high_counters[..8], &[0, 0, 0, 0, 1, 1, 1, 1]);
}

#[test]
fn test_capture_with_garbage_prefix() {
    let mut bytes = vec![0x00, 0x01, 0x02, 0x03, 0x04];
    bytes.extend(capture(64));

    let mut input = NamedTempFile::new().unwrap();
    input.write_all(&bytes).unwrap();
    input.flush().unwrap();

    let dir = tempdir().unwrap();
    let output = dir.path().join("garbage");
    let config = replay_config(input.path(), &output);

    let device = create_device(&config).unwrap();
    let mut sink = CsvSink::create(&output).unwrap();
    let (pipeline, metrics) = AcquisitionPipeline::new(config);
    pipeline.run(device, &mut sink).unwrap();

    assert_eq!(metrics.packets_decoded.load(Ordering::Relaxed), 64);
    assert_eq!(metrics.bytes_skipped.load(Ordering::Relaxed), 5);
}

#[test]
fn test_channel_sink_feeds_consumer_thread() {
    let (tx, rx) = crossbeam_channel::bounded::<Emission>(64);

    let consumer = thread::spawn(move || {
        let mut packets = 0usize;
        let mut last_ts = 0u64;
        for emission in rx.iter() {
            for s in emission.low.iter() {
                assert!(s.timestamp_ns > last_ts, "порядок сохраняется");
                last_ts = s.timestamp_ns;
            }
            packets += emission.packet_count();
        }
        packets
    });

    let config = RecorderConfig {
        duration_secs: Some(10),
        cycle_ms: 0,
        stats_interval_secs: 60,
        sim_paced: false,
        ..RecorderConfig::default()
    };
    let (pipeline, metrics) = AcquisitionPipeline::new(config);
    let mut sink = ChannelSink::new(tx, metrics.clone());
    let device = Box::new(SimulatedDevice::unpaced().with_packet_limit(640));
    pipeline.run(device, &mut sink).unwrap();
    drop(sink);

    let received = consumer.join().unwrap();
    let dropped = metrics.emissions_dropped.load(Ordering::Relaxed);
    assert_eq!(received + dropped as usize * 64, 640);
}

#[test]
fn test_noisy_simulator_skip_policy() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("noisy");
    let config = RecorderConfig {
        output_path: output.clone(),
        duration_secs: Some(10),
        cycle_ms: 0,
        stats_interval_secs: 60,
        desync_policy: "skip".parse().unwrap(),
        ..RecorderConfig::default()
    };

    let corruption = SimCorruption {
        bit_flip_rate: 0.05,
        drop_byte_rate: 0.02,
        garbage_rate: 0.05,
        seed: 2024,
    };
    let device = Box::new(SimulatedDevice::new(false, corruption).with_packet_limit(2_000));

    let mut sink = CsvSink::create(&output).unwrap();
    let (pipeline, metrics) = AcquisitionPipeline::new(config);
    pipeline.run(device, &mut sink).unwrap();

    let decoded = metrics.packets_decoded.load(Ordering::Relaxed);
    assert!(decoded > 1_500, "большинство кадров восстановлено: {decoded}");
    assert!(decoded < 2_000);
    assert!(metrics.bytes_skipped.load(Ordering::Relaxed) > 0);

    // В выходе только целые пакеты: 4 строки быстрого потока на каждую строку медленного
    let (high_path, low_path) = csv_paths(&output);
    let high = std::fs::read_to_string(high_path).unwrap().lines().count() - 1;
    let low = std::fs::read_to_string(low_path).unwrap().lines().count() - 1;
    assert_eq!(high, low * 4);
    assert_eq!(low as u64, decoded);
}

#[test]
fn test_truncated_capture_tail() {
    let mut bytes = capture(10);
    bytes.truncate(bytes.len() - PACKET_SIZE / 2);

    let mut input = NamedTempFile::new().unwrap();
    input.write_all(&bytes).unwrap();
    input.flush().unwrap();

    let dir = tempdir().unwrap();
    let output = dir.path().join("tail");
    let config = replay_config(input.path(), &output);

    let device = create_device(&config).unwrap();
    let mut sink = CsvSink::create(&output).unwrap();
    let (pipeline, metrics) = AcquisitionPipeline::new(config);
    pipeline.run(device, &mut sink).unwrap();

    assert_eq!(metrics.packets_decoded.load(Ordering::Relaxed), 9);
    assert_eq!(metrics.short_frames.load(Ordering::Relaxed), 1);
}
