//! Бенчмарки горячего пути декодирования PL4

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pl4_core::{
    checksum,
    encode::{constant_packet, encode_packet},
    AcquisitionClock, DecoderConfig, DesyncPolicy, MemorySource, Pl4Decoder, PACKET_SIZE,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Поток из `packets` чистых кадров.
fn clean_stream(packets: usize) -> Vec<u8> {
    (0..packets)
        .flat_map(|i| {
            let v = (i % 100) as f64;
            *encode_packet(&constant_packet(i as u8, [v, -v, v / 1_000.0, -v / 1_000.0]))
                .as_bytes()
        })
        .collect()
}

/// Тот же поток с битовыми ошибками и мусором между кадрами.
fn noisy_stream(packets: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(0xB0C4);
    let clean = clean_stream(packets);
    let mut out = Vec::with_capacity(clean.len() + packets);

    for frame in clean.chunks(PACKET_SIZE) {
        if rng.gen_bool(0.05) {
            let len = rng.gen_range(1..8);
            out.extend((0..len).map(|_| rng.gen_range(0..0xAAu8)));
        }
        let mut f = frame.to_vec();
        if rng.gen_bool(0.05) {
            f[rng.gen_range(1..PACKET_SIZE)] ^= 0x10;
        }
        out.extend(f);
    }

    out
}

fn bench_decode_single(c: &mut Criterion) {
    let frame = encode_packet(&constant_packet(7, [12.5, -40.0, 0.75, -0.125]));

    c.bench_function("decode_frame", |b| {
        b.iter(|| pl4_core::decode(black_box(&frame)))
    });

    c.bench_function("validate_checksum", |b| {
        b.iter(|| checksum::validate(black_box(frame.as_bytes())))
    });
}

fn bench_process_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_cycle");

    // 25, 256, 1024 пакетов: 100 мс, 1 с и 4 с сигнала
    for packets in [25usize, 256, 1_024] {
        let clean = clean_stream(packets);
        let noisy = noisy_stream(packets);
        group.throughput(Throughput::Bytes(clean.len() as u64));

        group.bench_with_input(BenchmarkId::new("clean", packets), &clean, |b, bytes| {
            b.iter(|| {
                let mut dec = Pl4Decoder::new(DecoderConfig::default(), AcquisitionClock::new(0));
                let mut src = MemorySource::from_bytes(bytes);
                black_box(dec.process_cycle(&mut src).ok())
            })
        });

        group.bench_with_input(BenchmarkId::new("noisy", packets), &noisy, |b, bytes| {
            b.iter(|| {
                let mut dec = Pl4Decoder::new(
                    DecoderConfig {
                        desync_policy: DesyncPolicy::SkipWindow,
                    },
                    AcquisitionClock::new(0),
                );
                let mut src = MemorySource::from_bytes(bytes);
                black_box(dec.process_cycle(&mut src).ok())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode_single, bench_process_cycle);
criterion_main!(benches);
