use pl4_types::{Channel, DecodeError, DecodedPacket};

use crate::{checksum, format::RawFrame, format::CHANNEL_LAYOUT};

/// Декодирует кадр с уже проверенной контрольной суммой.
///
/// Всегда успешна: длина гарантирована [`RawFrame`], а каждый из десяти слотов
/// даёт значение при любом содержимом.
pub fn decode(frame: &RawFrame) -> DecodedPacket {
    let mut packet = DecodedPacket {
        counter: frame.counter(),
        ch1: [0.0; 4],
        ch2: [0.0; 4],
        ch3: 0.0,
        ch4: 0.0,
    };
    let mut n1 = 0;
    let mut n2 = 0;

    for layout in &CHANNEL_LAYOUT {
        let value = layout.value(frame);
        match layout.channel {
            Channel::Ch1 => {
                packet.ch1[n1] = value;
                n1 += 1;
            }
            Channel::Ch2 => {
                packet.ch2[n2] = value;
                n2 += 1;
            }
            Channel::Ch3 => packet.ch3 = value,
            Channel::Ch4 => packet.ch4 = value,
        }
    }

    packet
}

/// Проверяет длину, маркер и контрольную сумму, затем декодирует.
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedPacket, DecodeError> {
    let frame = RawFrame::try_from(bytes)?;
    if !frame.has_header() {
        return Err(DecodeError::Desync {
            window_len: bytes.len(),
        });
    }
    checksum::validate(frame.as_bytes())?;
    Ok(decode(&frame))
}
