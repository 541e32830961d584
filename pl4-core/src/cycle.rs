use log::{debug, trace, warn};
use pl4_types::{DecodeError, DecodedPacket, Emission, Pl4Error, Pl4Result};

use crate::{
    checksum,
    clock::AcquisitionClock,
    decoder,
    format::{RawFrame, PACKET_SIZE},
    mux::StreamMultiplexer,
    source::ByteSource,
    sync::{PacketSynchronizer, SyncStep},
};

/// Что делать, если в окне нет маркера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DesyncPolicy {
    /// Прервать цикл без эмиссии, накопленное в цикле отбрасывается
    #[default]
    AbortCycle,
    /// Отбросить только это окно и продолжить цикл
    SkipWindow,
}

/// Настройки декодера.
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    pub desync_policy: DesyncPolicy,
}

/// Итог одного цикла обработки.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Байт в буфере транспорта на старте цикла
    pub queued: usize,
    /// Попыток прочитать кадр
    pub frames_attempted: usize,
    /// Успешно декодированных пакетов
    pub packets_decoded: usize,
    /// Байт мусора, отброшенных синхронизатором
    pub bytes_skipped: usize,
    /// Пакетов, декодированных, но отброшенных из-за прерывания цикла
    pub packets_discarded: usize,
    /// Восстановленные локально ошибки в порядке появления
    pub advisories: Vec<DecodeError>,
    /// Цикл прерван из-за рассинхронизации
    pub aborted: bool,
    /// Оба потока цикла (`None`, если пакетов не было)
    pub emission: Option<Emission>,
}

/// Накопительная статистика декодера.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodeStats {
    pub cycles: u64,
    pub emissions: u64,
    pub packets_decoded: u64,
    pub packets_discarded: u64,
    pub checksum_errors: u64,
    pub desync_events: u64,
    pub short_frames: u64,
    pub overflow_warnings: u64,
    pub bytes_skipped: u64,
}

/// Состояния цикла обработки.
#[derive(Debug)]
enum CycleState {
    Idle,
    Synchronizing,
    Validating(RawFrame),
    Decoding(RawFrame),
    Accumulating(DecodedPacket),
    Emitting,
}

/// Ядро декодирования потока PL4.
///
/// Владеет часами сессии, синхронизатором и мультиплексором. Однопоточный:
/// внешний планировщик вызывает [`Pl4Decoder::process_cycle`] по таймеру.
#[derive(Debug)]
pub struct Pl4Decoder {
    config: DecoderConfig,
    clock: AcquisitionClock,
    sync: PacketSynchronizer,
    mux: StreamMultiplexer,
    stats: DecodeStats,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl CycleReport {
    pub fn checksum_errors(&self) -> usize {
        self.count(|e| matches!(e, DecodeError::InvalidChecksum { .. }))
    }

    pub fn desync_events(&self) -> usize {
        self.count(|e| matches!(e, DecodeError::Desync { .. }))
    }

    pub fn short_frames(&self) -> usize {
        self.count(|e| matches!(e, DecodeError::FrameLength { .. }))
    }

    pub fn overflowed(&self) -> bool {
        self.count(|e| matches!(e, DecodeError::BufferOverflow { .. })) > 0
    }

    fn count(
        &self,
        pred: impl Fn(&DecodeError) -> bool,
    ) -> usize {
        self.advisories.iter().filter(|e| pred(e)).count()
    }
}

impl DecodeStats {
    fn record(
        &mut self,
        report: &CycleReport,
    ) {
        self.cycles += 1;
        self.emissions += report.emission.is_some() as u64;
        self.packets_decoded += report.packets_decoded as u64;
        self.packets_discarded += report.packets_discarded as u64;
        self.checksum_errors += report.checksum_errors() as u64;
        self.desync_events += report.desync_events() as u64;
        self.short_frames += report.short_frames() as u64;
        self.overflow_warnings += report.overflowed() as u64;
        self.bytes_skipped += report.bytes_skipped as u64;
    }
}

impl Pl4Decoder {
    pub fn new(
        config: DecoderConfig,
        clock: AcquisitionClock,
    ) -> Self {
        Self {
            config,
            clock,
            sync: PacketSynchronizer::new(),
            mux: StreamMultiplexer::new(),
            stats: DecodeStats::default(),
        }
    }

    pub fn clock(&self) -> &AcquisitionClock {
        &self.clock
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Байт незавершённого кадра, ждущих следующего цикла.
    pub fn pending_bytes(&self) -> usize {
        self.sync.pending()
    }

    /// Новый старт сбора: сбрасывает часы и всё, что не успело уйти.
    pub fn restart(
        &mut self,
        time_start_ns: u64,
    ) {
        self.clock.restart(time_start_ns);
        self.mux.discard();
        self.sync.drop_partial();
    }

    /// Конец данных: отбрасывает незавершённый кадр, если он остался.
    ///
    /// Отброшенный хвост учитывается в [`DecodeStats::short_frames`].
    pub fn flush_partial(&mut self) -> Option<DecodeError> {
        let dropped = self.sync.drop_partial();
        if dropped.is_some() {
            self.stats.short_frames += 1;
        }
        dropped
    }

    /// Один цикл: разбирает все целые кадры, доступные в буфере транспорта.
    ///
    /// Незавершённый кадр в конце буфера не теряется: он дополняется в
    /// следующем цикле. Цикл заканчивается раньше, если транспорт опустел.
    ///
    /// Ошибки декодирования обрабатываются внутри и попадают в
    /// [`CycleReport::advisories`]. Наружу выходят только ошибки транспорта.
    pub fn process_cycle<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Pl4Result<CycleReport> {
        let mut report = CycleReport {
            queued: source.available()?,
            ..CycleReport::default()
        };

        if report.queued >= source.capacity() {
            warn!("The receive buffer is full. Please increase the cycle rate.");
            report.advisories.push(DecodeError::BufferOverflow {
                queued: report.queued,
            });
        }

        let frames = (report.queued + self.sync.pending()).div_ceil(PACKET_SIZE);
        let mut state = CycleState::Idle;

        loop {
            trace!("cycle state: {state:?}");

            state = match state {
                CycleState::Idle if report.frames_attempted >= frames => CycleState::Emitting,

                CycleState::Idle => match source.available() {
                    Ok(0) => {
                        trace!("source drained after {} frames", report.frames_attempted);
                        CycleState::Emitting
                    }
                    Ok(_) => CycleState::Synchronizing,
                    Err(e) => {
                        self.stats.record(&report);
                        return Err(e);
                    }
                },

                CycleState::Synchronizing => {
                    report.frames_attempted += 1;

                    match self.sync.next_frame(source) {
                        Ok(SyncStep::Frame(aligned)) => {
                            report.bytes_skipped += aligned.skipped;
                            CycleState::Validating(aligned.frame)
                        }
                        Ok(SyncStep::Partial { skipped, .. }) => {
                            report.bytes_skipped += skipped;
                            CycleState::Emitting
                        }
                        Ok(SyncStep::Drained) => CycleState::Emitting,
                        Err(Pl4Error::Decode(e @ DecodeError::Desync { .. })) => {
                            report.advisories.push(e);

                            if self.config.desync_policy == DesyncPolicy::AbortCycle {
                                report.aborted = true;
                                report.packets_discarded = self.mux.discard();
                                warn!(
                                    "Cycle aborted on desync, {} decoded packets dropped",
                                    report.packets_discarded
                                );
                                break;
                            }

                            CycleState::Idle
                        }
                        Err(Pl4Error::Decode(e)) => {
                            warn!("Frame dropped: {e}");
                            report.advisories.push(e);
                            CycleState::Idle
                        }
                        Err(e) => {
                            self.stats.record(&report);
                            return Err(e);
                        }
                    }
                }

                CycleState::Validating(frame) => match checksum::validate(frame.as_bytes()) {
                    Ok(()) => CycleState::Decoding(frame),
                    Err(e) => {
                        warn!("Invalid checksum (counter={})", frame.counter());
                        report.advisories.push(e);
                        CycleState::Idle
                    }
                },

                CycleState::Decoding(frame) => CycleState::Accumulating(decoder::decode(&frame)),

                CycleState::Accumulating(packet) => {
                    let ts = self.clock.advance();
                    self.mux.push(&packet, &ts);
                    report.packets_decoded += 1;
                    CycleState::Idle
                }

                CycleState::Emitting => {
                    report.emission = self.mux.take();
                    break;
                }
            };
        }

        if let Some(emission) = &report.emission {
            debug!(
                "Emitting {} high-rate / {} low-rate samples",
                emission.high.len(),
                emission.low.len()
            );
        }

        self.stats.record(&report);
        Ok(report)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl std::fmt::Display for DesyncPolicy {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            DesyncPolicy::AbortCycle => write!(f, "abort"),
            DesyncPolicy::SkipWindow => write!(f, "skip"),
        }
    }
}

impl std::str::FromStr for DesyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" | "abort-cycle" => Ok(DesyncPolicy::AbortCycle),
            "skip" | "skip-window" => Ok(DesyncPolicy::SkipWindow),
            _ => Err(format!("Unknown desync policy: '{s}'. Use: abort, skip")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        encode::{constant_packet, encode_packet},
        source::MemorySource,
    };

    fn decoder(policy: DesyncPolicy) -> Pl4Decoder {
        Pl4Decoder::new(
            DecoderConfig {
                desync_policy: policy,
            },
            AcquisitionClock::new(1_000_000_000),
        )
    }

    fn frame(counter: u8) -> Vec<u8> {
        encode_packet(&constant_packet(counter, [10.0, 20.0, 0.5, 0.25]))
            .as_bytes()
            .to_vec()
    }

    #[test]
    fn test_empty_source_no_emission() {
        let mut dec = decoder(DesyncPolicy::AbortCycle);
        let report = dec.process_cycle(&mut MemorySource::new()).unwrap();

        assert!(report.emission.is_none());
        assert_eq!(report.frames_attempted, 0);
        assert_eq!(dec.stats().cycles, 1);
        assert_eq!(dec.stats().emissions, 0);
    }

    #[test]
    fn test_desync_aborts_cycle() {
        let mut stream = frame(1);
        stream.extend_from_slice(&[0x00; PACKET_SIZE]);
        stream.extend(frame(2));

        let mut dec = decoder(DesyncPolicy::AbortCycle);
        let mut src = MemorySource::from_bytes(&stream);
        let report = dec.process_cycle(&mut src).unwrap();

        assert!(report.aborted);
        assert!(report.emission.is_none(), "прерванный цикл ничего не отдаёт");
        assert_eq!(report.packets_discarded, 1);
        assert_eq!(report.desync_events(), 1);
        assert_eq!(src.len(), PACKET_SIZE, "третий кадр остаётся на следующий цикл");

        let next = dec.process_cycle(&mut src).unwrap();
        assert_eq!(next.emission.unwrap().low.counters(), vec![2]);
        assert_eq!(dec.clock().packet_count(), 2, "часы учли оба пакета");
    }

    #[test]
    fn test_desync_skip_window_continues() {
        let mut stream = frame(1);
        stream.extend_from_slice(&[0x00; PACKET_SIZE]);
        stream.extend(frame(2));

        let mut dec = decoder(DesyncPolicy::SkipWindow);
        let report = dec
            .process_cycle(&mut MemorySource::from_bytes(&stream))
            .unwrap();

        assert!(!report.aborted);
        assert_eq!(report.emission.unwrap().low.counters(), vec![1, 2]);
        assert_eq!(dec.stats().desync_events, 1);
    }

    #[test]
    fn test_overflow_is_advisory_only() {
        let mut src = MemorySource::with_capacity(2 * PACKET_SIZE);
        src.extend(&frame(1));
        src.extend(&frame(2));
        src.extend(&frame(3));

        let mut dec = decoder(DesyncPolicy::AbortCycle);
        let report = dec.process_cycle(&mut src).unwrap();

        assert!(report.overflowed());
        assert_eq!(report.packets_decoded, 2);
        assert_eq!(dec.stats().overflow_warnings, 1);
    }

    #[test]
    fn test_restart_drops_clock_state() {
        let mut dec = decoder(DesyncPolicy::AbortCycle);
        dec.process_cycle(&mut MemorySource::from_bytes(&frame(0)))
            .unwrap();
        assert_eq!(dec.clock().packet_count(), 1);

        dec.restart(5_000_000_000);
        assert_eq!(dec.clock().packet_count(), 0);
        assert_eq!(dec.clock().time_start_ns(), 5_000_000_000);
    }

    #[test]
    fn test_garbage_prefix_keeps_cycle_under_abort_policy() {
        let mut stream = vec![0x01u8, 0x02, 0x03];
        for c in 0..4 {
            stream.extend(frame(c));
        }

        let mut dec = decoder(DesyncPolicy::AbortCycle);
        let mut src = MemorySource::from_bytes(&stream);
        let report = dec.process_cycle(&mut src).unwrap();

        assert!(!report.aborted, "пустое окно в конце не рассинхронизация");
        assert!(report.advisories.is_empty());
        assert_eq!(report.bytes_skipped, 3);
        assert_eq!(report.packets_decoded, 4);
        assert_eq!(report.emission.unwrap().packet_count(), 4);
        assert!(src.is_empty());
    }

    #[test]
    fn test_split_frame_completes_next_cycle() {
        let second = frame(2);
        let mut src = MemorySource::from_bytes(&frame(1));
        src.extend(&second[..10]);

        let mut dec = decoder(DesyncPolicy::AbortCycle);
        let first = dec.process_cycle(&mut src).unwrap();
        assert!(first.advisories.is_empty());
        assert_eq!(first.packets_decoded, 1);
        assert_eq!(dec.pending_bytes(), 10);

        src.extend(&second[10..]);
        src.extend(&frame(3));
        let next = dec.process_cycle(&mut src).unwrap();

        assert_eq!(next.emission.unwrap().low.counters(), vec![2, 3]);
        assert_eq!(dec.pending_bytes(), 0);
        assert_eq!(dec.stats().short_frames, 0);
    }

    #[test]
    fn test_flush_partial_counts_short_frame() {
        let mut src = MemorySource::from_bytes(&frame(1)[..20]);
        let mut dec = decoder(DesyncPolicy::AbortCycle);

        let report = dec.process_cycle(&mut src).unwrap();
        assert!(report.emission.is_none());
        assert_eq!(dec.pending_bytes(), 20);

        assert!(matches!(
            dec.flush_partial(),
            Some(DecodeError::FrameLength { found: 20, .. })
        ));
        assert_eq!(dec.stats().short_frames, 1);
        assert_eq!(dec.flush_partial(), None);
    }

    #[test]
    fn test_desync_policy_parse() {
        assert_eq!(
            "abort".parse::<DesyncPolicy>().unwrap(),
            DesyncPolicy::AbortCycle
        );
        assert_eq!(
            "SKIP".parse::<DesyncPolicy>().unwrap(),
            DesyncPolicy::SkipWindow
        );
        assert!("retry".parse::<DesyncPolicy>().is_err());
        assert_eq!(DesyncPolicy::default().to_string(), "abort");
    }
}
