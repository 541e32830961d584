use log::{debug, warn};
use pl4_types::{DecodeError, Pl4Result};

use crate::{
    format::{RawFrame, HEADER_MARKER, PACKET_SIZE},
    source::ByteSource,
};

/// Кадр, выровненный по маркеру.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignedFrame {
    pub frame: RawFrame,
    /// Сколько байт мусора отброшено перед маркером
    pub skipped: usize,
}

/// Итог одного шага синхронизации.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// Целый кадр, начинающийся с маркера
    Frame(AlignedFrame),
    /// Начало кадра найдено, но байт не хватило: хвост ждёт следующего цикла
    Partial { skipped: usize, held: usize },
    /// Транспорт не отдал ни одного байта
    Drained,
}

/// Ищет начало пакета в потоке байт.
///
/// Если окно начинается с маркера, оно и есть кадр. Иначе ищем первый маркер
/// на смещении `k`, берём хвост окна и дочитываем `k` байт у транспорта.
/// Недочитанный кадр остаётся внутри синхронизатора и дополняется первыми
/// байтами следующего окна. Контрольная сумма здесь не проверяется.
#[derive(Debug, Default)]
pub struct PacketSynchronizer {
    partial: Vec<u8>,
    realigned: u64,
    bytes_skipped: u64,
}

/// Позиция первого маркера в окне.
pub fn find_marker(window: &[u8]) -> Option<usize> {
    window.iter().position(|&b| b == HEADER_MARKER)
}

impl PacketSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Собирает одно окно в [`PACKET_SIZE`] байт (отложенный хвост плюс
    /// свежие байты) и выравнивает его.
    pub fn next_frame<S: ByteSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Pl4Result<SyncStep> {
        let mut window = std::mem::take(&mut self.partial);
        window.extend(source.pull(PACKET_SIZE - window.len())?);
        self.align(window, source)
    }

    /// Выравнивает уже прочитанное окно, при необходимости дочитывая байты.
    pub fn align<S: ByteSource + ?Sized>(
        &mut self,
        mut window: Vec<u8>,
        source: &mut S,
    ) -> Pl4Result<SyncStep> {
        if window.is_empty() {
            return Ok(SyncStep::Drained);
        }

        let skipped = match find_marker(&window) {
            Some(0) => 0,
            Some(k) => {
                warn!("Invalid header, marker found at offset {k}");
                window.drain(..k);
                window.extend(source.pull(k)?);
                self.realigned += 1;
                self.bytes_skipped += k as u64;
                k
            }
            None => {
                warn!("Invalid header, no marker in {} bytes", window.len());
                self.bytes_skipped += window.len() as u64;
                return Err(DecodeError::Desync {
                    window_len: window.len(),
                }
                .into());
            }
        };

        if window.len() < PACKET_SIZE {
            let held = window.len();
            debug!("Incomplete frame, {held} bytes held for the next cycle");
            self.partial = window;
            return Ok(SyncStep::Partial { skipped, held });
        }

        let frame = RawFrame::try_from(window.as_slice())?;
        if skipped > 0 {
            debug!("Realigned frame, counter={}", frame.counter());
        }

        Ok(SyncStep::Frame(AlignedFrame { frame, skipped }))
    }

    /// Сколько байт незавершённого кадра ждут продолжения.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Выбрасывает незавершённый кадр (конец данных или новый старт).
    ///
    /// Возвращает `FrameLength`, если отбрасывать было что.
    pub fn drop_partial(&mut self) -> Option<DecodeError> {
        if self.partial.is_empty() {
            return None;
        }

        let found = std::mem::take(&mut self.partial).len();
        warn!("Incomplete frame dropped ({found} bytes)");
        Some(DecodeError::FrameLength {
            expected: PACKET_SIZE,
            found,
        })
    }

    /// Сколько кадров восстановлено пересканированием.
    pub fn realigned(&self) -> u64 {
        self.realigned
    }

    /// Сколько байт отброшено как мусор.
    pub fn bytes_skipped(&self) -> u64 {
        self.bytes_skipped
    }
}

#[cfg(test)]
mod tests {
    use pl4_types::Pl4Error;

    use super::*;
    use crate::{encode::encode_raw, source::MemorySource};

    fn frame_bytes(counter: u8) -> [u8; PACKET_SIZE] {
        *encode_raw(counter, &[counter as i32; 10]).as_bytes()
    }

    #[test]
    fn test_aligned_window_passes_through() {
        let bytes = frame_bytes(3);
        let mut src = MemorySource::from_bytes(&bytes);
        let mut sync = PacketSynchronizer::new();

        let SyncStep::Frame(aligned) = sync.next_frame(&mut src).unwrap() else {
            panic!("ожидался целый кадр");
        };
        assert_eq!(aligned.skipped, 0);
        assert_eq!(aligned.frame.as_bytes(), &bytes);
        assert!(src.is_empty(), "ровно 37 байт потреблено");
    }

    #[test]
    fn test_garbage_prefix_recovered() {
        let garbage = [0x01u8, 0x02, 0x03, 0x10, 0x55];
        let bytes = frame_bytes(42);

        let mut stream = garbage.to_vec();
        stream.extend_from_slice(&bytes);
        let mut src = MemorySource::from_bytes(&stream);
        let mut sync = PacketSynchronizer::new();

        let SyncStep::Frame(aligned) = sync.next_frame(&mut src).unwrap() else {
            panic!("ожидался целый кадр");
        };
        assert_eq!(aligned.skipped, garbage.len());
        assert_eq!(aligned.frame.as_bytes(), &bytes, "мусор отброшен");
        assert_eq!(sync.realigned(), 1);
        assert_eq!(sync.bytes_skipped(), 5);
        assert!(src.is_empty());
    }

    #[test]
    fn test_no_marker_is_desync() {
        let mut src = MemorySource::from_bytes(&[0x11u8; PACKET_SIZE]);
        let mut sync = PacketSynchronizer::new();

        let err = sync.next_frame(&mut src).unwrap_err();
        assert!(matches!(
            err,
            Pl4Error::Decode(DecodeError::Desync {
                window_len: PACKET_SIZE
            })
        ));
        assert_eq!(sync.bytes_skipped(), PACKET_SIZE as u64);
    }

    #[test]
    fn test_short_tail_held_until_next_window() {
        let bytes = frame_bytes(1);
        let mut src = MemorySource::from_bytes(&bytes[..20]);
        let mut sync = PacketSynchronizer::new();

        assert_eq!(
            sync.next_frame(&mut src).unwrap(),
            SyncStep::Partial {
                skipped: 0,
                held: 20
            }
        );
        assert_eq!(sync.pending(), 20);

        // Остаток кадра и следующий кадр приходят позже
        src.extend(&bytes[20..]);
        src.extend(&frame_bytes(2));

        let SyncStep::Frame(first) = sync.next_frame(&mut src).unwrap() else {
            panic!("хвост должен дополниться до целого кадра");
        };
        assert_eq!(first.frame.as_bytes(), &bytes);
        assert_eq!(sync.pending(), 0);

        let SyncStep::Frame(second) = sync.next_frame(&mut src).unwrap() else {
            panic!("второй кадр цел");
        };
        assert_eq!(second.frame.counter(), 2);
    }

    #[test]
    fn test_realigned_tail_held_when_source_runs_dry() {
        let bytes = frame_bytes(9);
        let mut stream = vec![0x01u8, 0x02, 0x03, 0x04, 0x05];
        stream.extend_from_slice(&bytes[..34]);
        let mut src = MemorySource::from_bytes(&stream);
        let mut sync = PacketSynchronizer::new();

        assert_eq!(
            sync.next_frame(&mut src).unwrap(),
            SyncStep::Partial {
                skipped: 5,
                held: 34
            }
        );

        src.extend(&bytes[34..]);
        let SyncStep::Frame(aligned) = sync.next_frame(&mut src).unwrap() else {
            panic!("кадр восстановлен во втором окне");
        };
        assert_eq!(aligned.skipped, 0);
        assert_eq!(aligned.frame.as_bytes(), &bytes);
    }

    #[test]
    fn test_empty_source_is_drained_not_desync() {
        let mut src = MemorySource::new();
        let mut sync = PacketSynchronizer::new();

        assert_eq!(sync.next_frame(&mut src).unwrap(), SyncStep::Drained);
        assert_eq!(sync.bytes_skipped(), 0);
    }

    #[test]
    fn test_drop_partial_reports_frame_length() {
        let mut src = MemorySource::from_bytes(&frame_bytes(4)[..10]);
        let mut sync = PacketSynchronizer::new();
        sync.next_frame(&mut src).unwrap();

        assert_eq!(
            sync.drop_partial(),
            Some(DecodeError::FrameLength {
                expected: PACKET_SIZE,
                found: 10
            })
        );
        assert_eq!(sync.pending(), 0);
        assert_eq!(sync.drop_partial(), None);
    }

    #[test]
    fn test_find_marker() {
        assert_eq!(find_marker(&[]), None);
        assert_eq!(find_marker(&[0xAA]), Some(0));
        assert_eq!(find_marker(&[0x00, 0x00, 0xAA, 0xAA]), Some(2));
    }
}
