use serde::{Deserialize, Serialize};

use crate::Channel;

/// Один декодированный пакет PL4.
///
/// Пакет несёт по 4 выборки каналов 1 и 2 (1024 Гц) и по одной выборке
/// каналов 3 и 4 (256 Гц). Значения уже откалиброваны: мкВ для 1/2, мВ для 3/4.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecodedPacket {
    /// Циклический счётчик пакетов (0..=255)
    pub counter: u8,
    pub ch1: [f64; 4],
    pub ch2: [f64; 4],
    pub ch3: f64,
    pub ch4: f64,
}

impl DecodedPacket {
    /// Выборки канала в порядке следования в пакете.
    pub fn samples(
        &self,
        channel: Channel,
    ) -> &[f64] {
        match channel {
            Channel::Ch1 => &self.ch1,
            Channel::Ch2 => &self.ch2,
            Channel::Ch3 => std::slice::from_ref(&self.ch3),
            Channel::Ch4 => std::slice::from_ref(&self.ch4),
        }
    }

    /// Ожидаемый счётчик следующего пакета без потерь.
    pub fn next_counter(&self) -> u8 {
        self.counter.wrapping_add(1)
    }
}
