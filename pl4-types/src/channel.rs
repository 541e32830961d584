use serde::{Deserialize, Serialize};

use crate::{Pl4Error, Pl4Result};

/// Цена младшего разряда АЦП для каналов 1 и 2, мкВ.
///
/// `((Vref * 2) / 2^24) / gain_ina = ((2.048 * 2) / 2^24) / 20.61161164`,
/// пересчитано в микровольты. Знак отрицательный: входной каскад
/// инвертирует полярность.
pub const UV_PER_LSB: f64 = -0.011_844_810_06;

/// Цена младшего разряда АЦП для каналов 3 и 4, мВ.
///
/// `(Vref * 2) / 2^24 = (2.048 * 2) / 2^24` В, пересчитано в милливольты.
pub const MV_PER_LSB: f64 = -0.000_244_140_625;

/// Частота быстрого потока (каналы 1 и 2), Гц
pub const HIGH_RATE_HZ: u32 = 1_024;

/// Частота медленного потока (каналы 3 и 4), Гц
pub const LOW_RATE_HZ: u32 = 256;

/// Аналоговый канал PhysioLOG-4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Channel {
    Ch1 = 1,
    Ch2 = 2,
    Ch3 = 3,
    Ch4 = 4,
}

/// Поток, в который попадают выборки канала
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamRate {
    /// 1024 Гц, каналы 1 и 2
    High,
    /// 256 Гц, каналы 3 и 4
    Low,
}

/// Физическая единица откалиброванной выборки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Microvolt,
    Millivolt,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Ch1, Channel::Ch2, Channel::Ch3, Channel::Ch4];

    pub fn from_u8(v: u8) -> Pl4Result<Self> {
        match v {
            1 => Ok(Channel::Ch1),
            2 => Ok(Channel::Ch2),
            3 => Ok(Channel::Ch3),
            4 => Ok(Channel::Ch4),
            _ => Err(Pl4Error::protocol(format!("Unknown channel: {v}"))),
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub const fn stream(&self) -> StreamRate {
        match self {
            Channel::Ch1 | Channel::Ch2 => StreamRate::High,
            Channel::Ch3 | Channel::Ch4 => StreamRate::Low,
        }
    }

    pub const fn unit(&self) -> Unit {
        match self.stream() {
            StreamRate::High => Unit::Microvolt,
            StreamRate::Low => Unit::Millivolt,
        }
    }

    /// Множитель «сырое значение → физическая величина».
    pub const fn scale(&self) -> f64 {
        match self.unit() {
            Unit::Microvolt => UV_PER_LSB,
            Unit::Millivolt => MV_PER_LSB,
        }
    }
}

impl StreamRate {
    pub fn hz(&self) -> u32 {
        match self {
            StreamRate::High => HIGH_RATE_HZ,
            StreamRate::Low => LOW_RATE_HZ,
        }
    }

    /// Сколько выборок каждого канала этого потока несёт один пакет.
    pub fn samples_per_packet(&self) -> usize {
        (self.hz() / LOW_RATE_HZ) as usize
    }
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Microvolt => "uV",
            Unit::Millivolt => "mV",
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl std::fmt::Display for Channel {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "ch{}", self.as_u8())
    }
}
