use std::time::{SystemTime, UNIX_EPOCH};

use pl4_types::{HIGH_RATE_HZ, LOW_RATE_HZ};

pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Выборок быстрого потока на один пакет
pub const HIGH_RATE_PER_PACKET: usize = (HIGH_RATE_HZ / LOW_RATE_HZ) as usize;

/// Метки времени всех выборок одного пакета.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketTimestamps {
    /// Выборка каналов 3/4
    pub low_ns: u64,
    /// Четыре выборки каналов 1/2
    pub high_ns: [u64; HIGH_RATE_PER_PACKET],
}

/// Часы сессии сбора данных.
///
/// Время не синхронизируется с моментом прихода байт: метки экстраполируются
/// из числа декодированных пакетов и момента старта. Потерянные пакеты не
/// обнаруживаются, поэтому после потери все последующие метки навсегда
/// опережают реальное время на длительность потерянных пакетов.
///
/// Выборка `n` потока с частотой `r` получает метку
/// `time_start + floor(n * 10^9 / r)` нс: шаг медленного потока ровно
/// 3 906 250 нс, быстрого чередуется между 976 562 и 976 563 нс, а потоки
/// между собой не расходятся.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionClock {
    time_start_ns: u64,
    packet_count: u64,
}

impl AcquisitionClock {
    pub fn new(time_start_ns: u64) -> Self {
        Self {
            time_start_ns,
            packet_count: 0,
        }
    }

    /// Часы со стартом в текущий момент.
    pub fn start_now() -> Self {
        Self::new(unix_now_ns())
    }

    /// Новый старт сбора: единственный способ сбросить счётчик.
    pub fn restart(
        &mut self,
        time_start_ns: u64,
    ) {
        self.time_start_ns = time_start_ns;
        self.packet_count = 0;
    }

    pub fn time_start_ns(&self) -> u64 {
        self.time_start_ns
    }

    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Учитывает очередной декодированный пакет и возвращает его метки.
    pub fn advance(&mut self) -> PacketTimestamps {
        self.packet_count += 1;
        self.timestamps_for(self.packet_count)
    }

    /// Метки пакета с номером `packet_count` (нумерация с 1).
    pub fn timestamps_for(
        &self,
        packet_count: u64,
    ) -> PacketTimestamps {
        let first_high = packet_count * HIGH_RATE_PER_PACKET as u64;
        let mut high_ns = [0u64; HIGH_RATE_PER_PACKET];

        for (k, ts) in high_ns.iter_mut().enumerate() {
            *ts = self.sample_time_ns(first_high + k as u64, HIGH_RATE_HZ);
        }

        PacketTimestamps {
            low_ns: self.sample_time_ns(packet_count, LOW_RATE_HZ),
            high_ns,
        }
    }

    /// Метка выборки с индексом `index` в потоке с частотой `rate_hz`.
    pub fn sample_time_ns(
        &self,
        index: u64,
        rate_hz: u32,
    ) -> u64 {
        let offset = index as u128 * NANOS_PER_SEC as u128 / rate_hz as u128;
        self.time_start_ns.saturating_add(offset as u64)
    }

    /// Длительность сигнала, покрытая декодированными пакетами.
    pub fn signal_duration_ns(&self) -> u64 {
        self.sample_time_ns(self.packet_count, LOW_RATE_HZ) - self.time_start_ns
    }
}

/// Текущее время Unix в наносекундах.
pub fn unix_now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
