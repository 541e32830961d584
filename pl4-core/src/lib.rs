//! Ядро декодирования потока PhysioLOG-4 (PL4)
//!
//! Разбирает 37-байтовые кадры носимого регистратора, восстанавливает
//! синхронизацию после мусора в потоке, проверяет контрольную сумму,
//! переводит сырые 24-битные значения в физические единицы и расставляет
//! метки времени для двух потоков: 1024 Гц (каналы 1/2) и 256 Гц (каналы 3/4).
//!
//! # Быстрый старт
//!
//! ```no_run
//! use pl4_core::{AcquisitionClock, DecoderConfig, MemorySource, Pl4Decoder};
//!
//! let capture = std::fs::read("capture.pl4")?;
//! let mut source = MemorySource::from_bytes(&capture);
//! let mut decoder = Pl4Decoder::new(DecoderConfig::default(), AcquisitionClock::start_now());
//!
//! let report = decoder.process_cycle(&mut source)?;
//! if let Some(emission) = report.emission {
//!     println!("{} / {} samples", emission.high.len(), emission.low.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod checksum;
pub mod clock;
pub mod command;
pub mod cycle;
pub mod decoder;
pub mod encode;
pub mod format;
pub mod mux;
pub mod source;
pub mod sync;

pub use clock::*;
pub use command::*;
pub use cycle::*;
pub use decoder::{decode, decode_bytes};
pub use format::*;
pub use mux::*;
pub use source::*;
pub use sync::*;

/// Версия библиотеки.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        assert_eq!(PACKET_SIZE, 37);
        assert_eq!(HEADER_MARKER, 0xAA);
        assert_eq!(COMMAND_SIZE, 8);
        assert!(!VERSION.is_empty());
    }
}
