//! Командный протокол устройства: запуск, остановка, подтверждение и
//! сведения об устройстве.
//!
//! Команда: `AA AA | id: u16 BE | size: u16 BE | checksum: u16 BE`, где
//! контрольная сумма дополняет сумму предыдущих байт до 65536.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use pl4_types::{Pl4Error, Pl4Result};

use crate::format::HEADER_MARKER;

/// Размер команды без полезной нагрузки
pub const COMMAND_SIZE: usize = 8;

/// Размер ответа ACK (заголовок, id, размер, 41 байт нагрузки, сумма)
pub const ACK_RESPONSE_SIZE: usize = 49;

/// Размер ответа INFO
pub const INFO_RESPONSE_SIZE: usize = 18;

/// Идентификаторы команд.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandId {
    Ack = 0x0000,
    Info = 0x0003,
    Start = 0x000B,
    Stop = 0x000C,
}

/// Сведения из ответа на INFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: u16,
    pub software_version: u16,
    pub hardware_version: u16,
    pub serial_number: u32,
}

impl CommandId {
    pub fn from_u16(id: u16) -> Option<Self> {
        match id {
            0x0000 => Some(CommandId::Ack),
            0x0003 => Some(CommandId::Info),
            0x000B => Some(CommandId::Start),
            0x000C => Some(CommandId::Stop),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Контрольная сумма команды: `(65536 - sum) mod 65536`.
pub fn command_checksum(bytes: &[u8]) -> u16 {
    let sum = bytes.iter().fold(0u16, |acc, &b| acc.wrapping_add(b as u16));
    sum.wrapping_neg()
}

/// Собирает команду без полезной нагрузки.
pub fn encode_command(id: CommandId) -> [u8; COMMAND_SIZE] {
    let mut buf = [0u8; COMMAND_SIZE];
    buf[0] = HEADER_MARKER;
    buf[1] = HEADER_MARKER;
    BigEndian::write_u16(&mut buf[2..4], id.as_u16());
    BigEndian::write_u16(&mut buf[4..6], COMMAND_SIZE as u16);

    let checksum = command_checksum(&buf[..6]);
    BigEndian::write_u16(&mut buf[6..8], checksum);
    buf
}

/// Устройство подтвердило команду: полный ответ, id = ACK, статус 0.
pub fn is_ack(response: &[u8]) -> bool {
    response.len() == ACK_RESPONSE_SIZE
        && BigEndian::read_u16(&response[2..4]) == CommandId::Ack.as_u16()
        && response[6] == 0x00
}

impl DeviceInfo {
    /// Разбирает ответ на INFO.
    ///
    /// Раскладка: `AA AA | id | size | device_id | sw | hw | serial: u32 | checksum`.
    pub fn parse(response: &[u8]) -> Pl4Result<Self> {
        if response.len() != INFO_RESPONSE_SIZE {
            return Err(Pl4Error::protocol(format!(
                "INFO response must be {INFO_RESPONSE_SIZE} bytes, got {}",
                response.len()
            )));
        }

        if response[0] != HEADER_MARKER || response[1] != HEADER_MARKER {
            return Err(Pl4Error::protocol(format!(
                "INFO response has invalid header {:02X} {:02X}",
                response[0], response[1]
            )));
        }

        Ok(Self {
            device_id: BigEndian::read_u16(&response[6..8]),
            software_version: BigEndian::read_u16(&response[8..10]),
            hardware_version: BigEndian::read_u16(&response[10..12]),
            serial_number: BigEndian::read_u32(&response[12..16]),
        })
    }

    /// Ответ на INFO в том виде, в каком его шлёт устройство.
    pub fn to_response(&self) -> [u8; INFO_RESPONSE_SIZE] {
        let mut buf = [0u8; INFO_RESPONSE_SIZE];
        buf[0] = HEADER_MARKER;
        buf[1] = HEADER_MARKER;
        BigEndian::write_u16(&mut buf[2..4], CommandId::Info.as_u16());
        BigEndian::write_u16(&mut buf[4..6], INFO_RESPONSE_SIZE as u16);
        BigEndian::write_u16(&mut buf[6..8], self.device_id);
        BigEndian::write_u16(&mut buf[8..10], self.software_version);
        BigEndian::write_u16(&mut buf[10..12], self.hardware_version);
        BigEndian::write_u32(&mut buf[12..16], self.serial_number);

        let checksum = command_checksum(&buf[..16]);
        BigEndian::write_u16(&mut buf[16..18], checksum);
        buf
    }
}

/// Положительный ответ ACK, как его шлёт устройство.
pub fn ack_response() -> [u8; ACK_RESPONSE_SIZE] {
    let mut buf = [0u8; ACK_RESPONSE_SIZE];
    buf[0] = HEADER_MARKER;
    buf[1] = HEADER_MARKER;
    BigEndian::write_u16(&mut buf[2..4], CommandId::Ack.as_u16());
    BigEndian::write_u16(&mut buf[4..6], ACK_RESPONSE_SIZE as u16);

    let checksum = command_checksum(&buf[..ACK_RESPONSE_SIZE - 2]);
    BigEndian::write_u16(&mut buf[ACK_RESPONSE_SIZE - 2..], checksum);
    buf
}

impl fmt::Display for CommandId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            CommandId::Ack => "ACK",
            CommandId::Info => "INFO",
            CommandId::Start => "START",
            CommandId::Stop => "STOP",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "device_id={} sw={} hw={} serial={}",
            self.device_id, self.software_version, self.hardware_version, self.serial_number
        )
    }
}
