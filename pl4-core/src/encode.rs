//! Сборка синтетических пакетов: обратная операция к декодеру.
//!
//! Используется симулятором устройства, тестами и бенчмарками.

use byteorder::{BigEndian, ByteOrder};
use pl4_types::{Channel, DecodedPacket};

use crate::{
    checksum,
    format::{
        RawFrame, CHANNEL_LAYOUT, COUNTER_OFFSET, HEADER_MARKER, PACKET_SIZE, SAMPLE_MAX,
        SAMPLE_MIN, SLOT_COUNT, SLOT_SIZE,
    },
};

/// Переводит физическую величину в 24-битное сырое значение с насыщением.
pub fn quantize(
    value: f64,
    scale: f64,
) -> i32 {
    let raw = (value / scale).round();

    if raw.is_nan() {
        return 0;
    }

    raw.clamp(SAMPLE_MIN as f64, SAMPLE_MAX as f64) as i32
}

/// Собирает кадр из счётчика и десяти сырых значений слотов.
///
/// Значения вне 24-битного диапазона насыщаются.
pub fn encode_raw(
    counter: u8,
    slots: &[i32; SLOT_COUNT],
) -> RawFrame {
    let mut bytes = [0u8; PACKET_SIZE];
    bytes[0] = HEADER_MARKER;
    bytes[COUNTER_OFFSET] = counter;

    for (layout, &raw) in CHANNEL_LAYOUT.iter().zip(slots.iter()) {
        let raw = raw.clamp(SAMPLE_MIN, SAMPLE_MAX);
        BigEndian::write_i24(&mut bytes[layout.offset..layout.offset + SLOT_SIZE], raw);
    }

    checksum::seal(&mut bytes);
    RawFrame::from_bytes(bytes)
}

/// Собирает кадр из откалиброванного пакета.
///
/// `decode(&encode_packet(p))` совпадает с `p` с точностью до шага
/// квантования каждого канала.
pub fn encode_packet(packet: &DecodedPacket) -> RawFrame {
    let mut slots = [0i32; SLOT_COUNT];
    let mut next = [0usize; 4];

    for (slot, layout) in slots.iter_mut().zip(CHANNEL_LAYOUT.iter()) {
        let idx = (layout.channel.as_u8() - 1) as usize;
        let value = packet.samples(layout.channel)[next[idx]];
        next[idx] += 1;
        *slot = quantize(value, layout.scale);
    }

    encode_raw(packet.counter, &slots)
}

/// Пакет с одинаковыми значениями во всех выборках каждого канала.
pub fn constant_packet(
    counter: u8,
    values: [f64; 4],
) -> DecodedPacket {
    DecodedPacket {
        counter,
        ch1: [values[0]; 4],
        ch2: [values[1]; 4],
        ch3: values[2],
        ch4: values[3],
    }
}

/// Шаг квантования канала (модуль множителя).
pub fn resolution(channel: Channel) -> f64 {
    channel.scale().abs()
}
