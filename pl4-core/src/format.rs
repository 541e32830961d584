//! Формат пакета PhysioLOG-4
//!
//! Устройство непрерывно шлёт пакеты фиксированной длины 37 байт. Все
//! многобайтовые поля хранятся в порядке big-endian.
//!
//! ```text
//! [0]      HEADER    u8         маркер начала пакета 0xAA
//! [1]      COUNTER   u8         циклический счётчик пакетов
//! [2..32]  SLOTS     10 × i24   выборки в порядке каналов 1,2,3,1,2,1,2,4,1,2
//! [32..35] RESERVED  3 байта    не используются
//! [35..37] CHECKSUM  2 байта    сумма всех 37 байт ≡ 0 (mod 256)
//! ```

use byteorder::{BigEndian, ByteOrder};
use pl4_types::{Channel, DecodeError};

/// Маркер начала пакета
pub const HEADER_MARKER: u8 = 0xAA;

/// Размер пакета в байтах
pub const PACKET_SIZE: usize = 37;

/// Смещение счётчика пакетов
pub const COUNTER_OFFSET: usize = 1;

/// Смещение первого слота выборки
pub const SLOTS_OFFSET: usize = 2;

/// Размер одного слота (24-битное целое в дополнительном коде)
pub const SLOT_SIZE: usize = 3;

/// Количество слотов в пакете
pub const SLOT_COUNT: usize = 10;

/// Начало зарезервированной области после последнего слота
pub const RESERVED_OFFSET: usize = SLOTS_OFFSET + SLOT_COUNT * SLOT_SIZE;

/// Смещение поля контрольной суммы
pub const CHECKSUM_OFFSET: usize = 35;

/// Размер поля контрольной суммы
pub const CHECKSUM_SIZE: usize = 2;

/// Диапазон 24-битной выборки
pub const SAMPLE_MIN: i32 = -(1 << 23);
pub const SAMPLE_MAX: i32 = (1 << 23) - 1;

/// Номинальный размер приёмного буфера транспорта (FTDI)
pub const DEFAULT_BUFFER_CAPACITY: usize = 65_536;

/// Описание одного слота: где лежит, какой канал, какой множитель.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotSpec {
    pub offset: usize,
    pub channel: Channel,
    pub scale: f64,
}

/// Раскладка каналов по слотам пакета.
pub static CHANNEL_LAYOUT: [SlotSpec; SLOT_COUNT] = [
    slot(0, Channel::Ch1),
    slot(1, Channel::Ch2),
    slot(2, Channel::Ch3),
    slot(3, Channel::Ch1),
    slot(4, Channel::Ch2),
    slot(5, Channel::Ch1),
    slot(6, Channel::Ch2),
    slot(7, Channel::Ch4),
    slot(8, Channel::Ch1),
    slot(9, Channel::Ch2),
];

const fn slot(
    index: usize,
    channel: Channel,
) -> SlotSpec {
    SlotSpec {
        offset: SLOTS_OFFSET + index * SLOT_SIZE,
        channel,
        scale: channel.scale(),
    }
}

/// Пакет ровно из [`PACKET_SIZE`] байт.
///
/// Длина гарантирована типом; маркер и контрольная сумма не проверяются.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame([u8; PACKET_SIZE]);

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl SlotSpec {
    /// Сырое знаковое значение слота.
    pub fn raw(
        &self,
        frame: &RawFrame,
    ) -> i32 {
        BigEndian::read_i24(&frame.0[self.offset..self.offset + SLOT_SIZE])
    }

    /// Откалиброванное значение слота.
    pub fn value(
        &self,
        frame: &RawFrame,
    ) -> f64 {
        self.raw(frame) as f64 * self.scale
    }
}

impl RawFrame {
    pub fn from_bytes(bytes: [u8; PACKET_SIZE]) -> Self {
        RawFrame(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PACKET_SIZE] {
        &self.0
    }

    pub fn has_header(&self) -> bool {
        self.0[0] == HEADER_MARKER
    }

    pub fn counter(&self) -> u8 {
        self.0[COUNTER_OFFSET]
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl TryFrom<&[u8]> for RawFrame {
    type Error = DecodeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; PACKET_SIZE] = bytes.try_into().map_err(|_| DecodeError::FrameLength {
            expected: PACKET_SIZE,
            found: bytes.len(),
        })?;

        Ok(RawFrame(arr))
    }
}

impl AsRef<[u8]> for RawFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
