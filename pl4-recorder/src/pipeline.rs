use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::{info, warn};
use pl4_core::{AcquisitionClock, Pl4Decoder, NANOS_PER_SEC};

use crate::{
    device::Pl4Device, metrics::AcquisitionMetrics, sink::SampleSink, RecorderConfig,
    RecorderError, RecorderResult,
};

/// Оркестрирует сессию сбора.
///
/// Однопоточный: на каждом тике планировщика один цикл декодирования, затем
/// эмиссия (если есть) уходит в приёмник. Остановка по `stop_flag`, лимиту
/// времени или концу данных устройства.
pub struct AcquisitionPipeline {
    config: RecorderConfig,
    metrics: Arc<AcquisitionMetrics>,
    stop_flag: Arc<AtomicBool>,
}

impl AcquisitionPipeline {
    /// Создаёт пайплайн. Возвращает также shared-ссылку на метрики.
    pub fn new(config: RecorderConfig) -> (Self, Arc<AcquisitionMetrics>) {
        let metrics = AcquisitionMetrics::new();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let p = Self {
            config,
            metrics: metrics.clone(),
            stop_flag,
        };

        (p, metrics)
    }

    /// Флаг остановки. Устанавливает в `true` для graceful shutdown.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop_flag.clone()
    }

    /// Запускает сбор. Блокируется до завершения.
    pub fn run(
        self,
        mut device: Box<dyn Pl4Device>,
        sink: &mut dyn SampleSink,
    ) -> RecorderResult<()> {
        let info = device.info()?;

        info!("Starting acquisition: {} ({info})", device.name());
        info!(
            "Output: {:?} as {}, duration: {:?}, cycle: {} ms, desync: {}",
            self.config.output_path,
            self.config.format,
            self.config.duration_secs,
            self.config.cycle_ms,
            self.config.desync_policy
        );

        device.start()?;

        let mut decoder = Pl4Decoder::new(
            self.config.decoder_config(),
            AcquisitionClock::start_now(),
        );

        let loop_result = self.acquisition_loop(device.as_mut(), &mut decoder, sink);

        // Незавершённый кадр в конце данных уже не дополнится
        if decoder.flush_partial().is_some() {
            self.metrics.short_frames.fetch_add(1, Ordering::Relaxed);
        }

        if let Err(e) = device.stop() {
            warn!("Failed to stop device: {e}");
        }

        let finish_result = sink.finish();
        loop_result?;
        finish_result?;

        let clock = decoder.clock();
        info!(
            "Signal covered: {:.3}s ({} packets)",
            clock.signal_duration_ns() as f64 / NANOS_PER_SEC as f64,
            clock.packet_count()
        );

        Ok(())
    }

    fn acquisition_loop(
        &self,
        device: &mut dyn Pl4Device,
        decoder: &mut Pl4Decoder,
        sink: &mut dyn SampleSink,
    ) -> RecorderResult<()> {
        let cfg = &self.config;
        let cycle_period = Duration::from_millis(cfg.cycle_ms);
        let stats_interval = Duration::from_secs(cfg.stats_interval_secs);

        let session_start = Instant::now();
        let mut last_stats = Instant::now();

        loop {
            // Проверяем ограничение по времени
            if let Some(dur) = cfg.duration_secs {
                if session_start.elapsed().as_secs() >= dur {
                    info!("Duration limit reached ({dur}s). Finalizing...");
                    break;
                }
            }

            // Проверяем внешний stop_flag (Ctrl+C)
            if self.stop_flag.load(Ordering::Relaxed) {
                info!("Stop signal received. Finalizing...");
                break;
            }

            let tick = Instant::now();
            let report = decoder.process_cycle(&mut *device)?;
            self.metrics.record_cycle(&report);

            if let Some(emission) = report.emission {
                match sink.emit(emission) {
                    Ok(()) => {}
                    Err(e @ RecorderError::Sink(_)) => return Err(e),
                    Err(e) => {
                        self.metrics.sink_errors.fetch_add(1, Ordering::Relaxed);
                        warn!("Sink error: {e}");
                        // Не прерываем: пробуем продолжить
                    }
                }
            }

            if device.is_exhausted() {
                info!("Device has no more data. Finalizing...");
                break;
            }

            // Периодически выводим статистику
            if last_stats.elapsed() >= stats_interval {
                self.log_progress(&session_start);
                last_stats = Instant::now();
            }

            if let Some(rest) = cycle_period.checked_sub(tick.elapsed()) {
                if !rest.is_zero() {
                    thread::sleep(rest);
                }
            }
        }

        Ok(())
    }

    fn log_progress(
        &self,
        start: &Instant,
    ) {
        let m = &self.metrics;

        info!(
            "[ {:.0}s ] packets={} ({:.1}/s) bad={} desync={} overflow={} ({:.2}% lost)",
            start.elapsed().as_secs_f64(),
            m.packets_decoded.load(Ordering::Relaxed),
            m.packet_rate_hz(start),
            m.checksum_errors.load(Ordering::Relaxed),
            m.desync_events.load(Ordering::Relaxed),
            m.overflow_warnings.load(Ordering::Relaxed),
            m.error_rate_pct(),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pl4_core::DesyncPolicy;
    use tempfile::tempdir;

    use super::*;
    use crate::{
        device::SimulatedDevice,
        sink::{csv_paths, CsvSink, JsonLinesSink},
        DeviceKind, OutputFormat, SimCorruption,
    };

    fn test_config(path: PathBuf) -> RecorderConfig {
        RecorderConfig {
            device: DeviceKind::Simulated,
            output_path: path,
            format: OutputFormat::Csv,
            duration_secs: Some(5),
            cycle_ms: 0,
            stats_interval_secs: 60, // не выводим stats в тестах
            sim_paced: false,
            sim_packet_limit: Some(300),
            ..RecorderConfig::default()
        }
    }

    fn limited_sim(limit: u64) -> Box<dyn Pl4Device> {
        Box::new(SimulatedDevice::unpaced().with_packet_limit(limit))
    }

    #[test]
    fn test_pipeline_writes_csv() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("session");
        let config = test_config(output.clone());

        let mut sink = CsvSink::create(&output).unwrap();
        let (pipeline, metrics) = AcquisitionPipeline::new(config);
        pipeline.run(limited_sim(300), &mut sink).unwrap();

        let (high_path, low_path) = csv_paths(&output);
        let high = std::fs::read_to_string(high_path).unwrap();
        let low = std::fs::read_to_string(low_path).unwrap();

        assert_eq!(high.lines().count(), 1 + 300 * 4);
        assert_eq!(low.lines().count(), 1 + 300);
        assert_eq!(metrics.packets_decoded.load(Ordering::Relaxed), 300);
        assert_eq!(metrics.high_samples.load(Ordering::Relaxed), 1_200);
    }

    #[test]
    fn test_pipeline_writes_jsonl() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("session.jsonl");
        let mut config = test_config(output.clone());
        config.format = OutputFormat::JsonLines;

        let mut sink = JsonLinesSink::create(&output).unwrap();
        let (pipeline, metrics) = AcquisitionPipeline::new(config);
        pipeline.run(limited_sim(128), &mut sink).unwrap();

        let text = std::fs::read_to_string(&output).unwrap();
        // 64 пакета на опрос -> 2 эмиссии
        assert_eq!(text.lines().count(), 2);
        assert_eq!(metrics.emissions.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_pipeline_stop_flag_works() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("session");
        let mut config = test_config(output.clone());
        config.duration_secs = None;
        config.cycle_ms = 20;

        let mut sink = CsvSink::create(&output).unwrap();
        let (pipeline, metrics) = AcquisitionPipeline::new(config);
        let stop = pipeline.stop_flag();

        // Останавливаем через 200 мс из отдельного потока
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            stop.store(true, Ordering::Relaxed);
        });

        let device = Box::new(SimulatedDevice::new(true, SimCorruption::none()));
        let result = pipeline.run(device, &mut sink);
        assert!(result.is_ok(), "graceful stop не должен быть ошибкой");
        assert!(metrics.cycles.load(Ordering::Relaxed) > 1);
    }

    #[test]
    fn test_pipeline_counts_corruption() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("noisy");
        let mut config = test_config(output.clone());
        config.desync_policy = DesyncPolicy::SkipWindow;

        let corruption = SimCorruption {
            bit_flip_rate: 0.2,
            drop_byte_rate: 0.0,
            garbage_rate: 0.0,
            seed: 1,
        };
        let device = Box::new(SimulatedDevice::new(false, corruption).with_packet_limit(300));

        let mut sink = CsvSink::create(&output).unwrap();
        let (pipeline, metrics) = AcquisitionPipeline::new(config);
        pipeline.run(device, &mut sink).unwrap();

        let decoded = metrics.packets_decoded.load(Ordering::Relaxed);
        let bad = metrics.checksum_errors.load(Ordering::Relaxed);
        assert!(bad > 0, "повреждённые кадры отброшены");
        assert_eq!(decoded + bad, 300, "каждый кадр либо принят, либо отброшен");
    }
}
