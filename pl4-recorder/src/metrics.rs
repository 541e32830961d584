use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use pl4_core::CycleReport;

/// Метрики сессии, обновляемые lock-free.
#[derive(Debug, Default)]
pub struct AcquisitionMetrics {
    pub cycles: AtomicU64,
    pub packets_decoded: AtomicU64,
    pub high_samples: AtomicU64,
    pub low_samples: AtomicU64,
    pub emissions: AtomicU64,
    pub emissions_dropped: AtomicU64,
    pub checksum_errors: AtomicU64,
    pub desync_events: AtomicU64,
    pub short_frames: AtomicU64,
    pub overflow_warnings: AtomicU64,
    pub packets_discarded: AtomicU64,
    pub bytes_skipped: AtomicU64,
    pub sink_errors: AtomicU64,
}

/// Snapshot метрик для отображения / тестирования.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub duration_secs: f64,
    pub cycles: u64,
    pub packets_decoded: u64,
    pub high_samples: u64,
    pub low_samples: u64,
    pub emissions: u64,
    pub emissions_dropped: u64,
    pub checksum_errors: u64,
    pub desync_events: u64,
    pub short_frames: u64,
    pub overflow_warnings: u64,
    pub packets_discarded: u64,
    pub bytes_skipped: u64,
    pub sink_errors: u64,
    pub packet_rate_hz: f64,
    pub error_rate_pct: f64,
}

impl AcquisitionMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Учитывает итог одного цикла.
    pub fn record_cycle(
        &self,
        report: &CycleReport,
    ) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.packets_decoded
            .fetch_add(report.packets_decoded as u64, Ordering::Relaxed);
        self.checksum_errors
            .fetch_add(report.checksum_errors() as u64, Ordering::Relaxed);
        self.desync_events
            .fetch_add(report.desync_events() as u64, Ordering::Relaxed);
        self.short_frames
            .fetch_add(report.short_frames() as u64, Ordering::Relaxed);
        self.packets_discarded
            .fetch_add(report.packets_discarded as u64, Ordering::Relaxed);
        self.bytes_skipped
            .fetch_add(report.bytes_skipped as u64, Ordering::Relaxed);

        if report.overflowed() {
            self.overflow_warnings.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(e) = &report.emission {
            self.emissions.fetch_add(1, Ordering::Relaxed);
            self.high_samples
                .fetch_add(e.high.len() as u64, Ordering::Relaxed);
            self.low_samples
                .fetch_add(e.low.len() as u64, Ordering::Relaxed);
        }
    }

    /// Декодированных пакетов в секунду.
    pub fn packet_rate_hz(
        &self,
        elapsed: &Instant,
    ) -> f64 {
        let secs = elapsed.elapsed().as_secs_f64();

        if secs < 1e-9 {
            return 0.0;
        }

        self.packets_decoded.load(Ordering::Relaxed) as f64 / secs
    }

    /// Доля отброшенных кадров (0.0-100.0).
    pub fn error_rate_pct(&self) -> f64 {
        let decoded = self.packets_decoded.load(Ordering::Relaxed);
        let failed = self.checksum_errors.load(Ordering::Relaxed)
            + self.short_frames.load(Ordering::Relaxed);
        let total = decoded + failed;

        if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64 * 100.0
        }
    }

    /// Итоговая сводка для вывода в конце сессии.
    pub fn summary(
        &self,
        elapsed: &Instant,
    ) -> MetricsSummary {
        MetricsSummary {
            duration_secs: elapsed.elapsed().as_secs_f64(),
            cycles: self.cycles.load(Ordering::Relaxed),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            high_samples: self.high_samples.load(Ordering::Relaxed),
            low_samples: self.low_samples.load(Ordering::Relaxed),
            emissions: self.emissions.load(Ordering::Relaxed),
            emissions_dropped: self.emissions_dropped.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            desync_events: self.desync_events.load(Ordering::Relaxed),
            short_frames: self.short_frames.load(Ordering::Relaxed),
            overflow_warnings: self.overflow_warnings.load(Ordering::Relaxed),
            packets_discarded: self.packets_discarded.load(Ordering::Relaxed),
            bytes_skipped: self.bytes_skipped.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            packet_rate_hz: self.packet_rate_hz(elapsed),
            error_rate_pct: self.error_rate_pct(),
        }
    }
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "  Duration      : {:.1}s", self.duration_secs)?;
        writeln!(f, "  Cycles        : {}", self.cycles)?;
        writeln!(
            f,
            "  Packets       : {} ({:.1} /s)",
            self.packets_decoded, self.packet_rate_hz
        )?;
        writeln!(f, "  1024 Hz       : {} samples", self.high_samples)?;
        writeln!(f, "  256 Hz        : {} samples", self.low_samples)?;
        writeln!(
            f,
            "  Emissions     : {} ({} dropped)",
            self.emissions, self.emissions_dropped
        )?;
        writeln!(
            f,
            "  Bad checksum  : {} ({:.2}%)",
            self.checksum_errors, self.error_rate_pct
        )?;
        writeln!(
            f,
            "  Desync        : {} ({} packets discarded)",
            self.desync_events, self.packets_discarded
        )?;
        writeln!(f, "  Short frames  : {}", self.short_frames)?;
        writeln!(f, "  Bytes skipped : {}", self.bytes_skipped)?;
        writeln!(f, "  Overflows     : {}", self.overflow_warnings)?;
        writeln!(f, "  Sink errors   : {}", self.sink_errors)?;
        write!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")
    }
}
