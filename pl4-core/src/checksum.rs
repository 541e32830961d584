use pl4_types::DecodeError;

use crate::format::{CHECKSUM_OFFSET, CHECKSUM_SIZE, PACKET_SIZE};

/// Сумма байт по модулю 256.
pub fn byte_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Проверяет, что сумма всех байт кадра равна 0 по модулю 256.
pub fn validate(bytes: &[u8]) -> Result<(), DecodeError> {
    match byte_sum(bytes) {
        0 => Ok(()),
        sum => Err(DecodeError::InvalidChecksum { sum }),
    }
}

/// Заполняет поле контрольной суммы так, чтобы кадр проходил [`validate`].
///
/// Старший байт поля обнуляется, младший дополняет сумму до 0.
pub fn seal(frame: &mut [u8; PACKET_SIZE]) {
    frame[CHECKSUM_OFFSET..CHECKSUM_OFFSET + CHECKSUM_SIZE].fill(0);
    let sum = byte_sum(&frame[..]);
    frame[PACKET_SIZE - 1] = sum.wrapping_neg();
}
