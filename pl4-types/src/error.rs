use thiserror::Error;

/// Результат для операций PL4
pub type Pl4Result<T> = std::result::Result<T, Pl4Error>;

/// Ошибки декодирования отдельного кадра.
///
/// Все варианты восстанавливаются локально (кадр или окно пропускается) и
/// никогда не доходят до потребителя потоков.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// В окне нет ни одного байта-маркера 0xAA
    #[error("Desync: no header marker in {window_len}-byte window")]
    Desync { window_len: usize },

    /// Сумма байт кадра не равна 0 по модулю 256
    #[error("Invalid checksum: byte sum is {sum:#04x}, expected 0x00")]
    InvalidChecksum { sum: u8 },

    /// Кадр не той длины (транспорт вернул меньше байт)
    #[error("Invalid frame length: expected {expected}, found {found}")]
    FrameLength { expected: usize, found: usize },

    /// Приёмный буфер транспорта заполнен (только предупреждение)
    #[error("Receive buffer full: {queued} bytes queued, data may be lost upstream")]
    BufferOverflow { queued: usize },
}

/// Ошибки ядра и транспортного слоя.
#[derive(Debug, Error)]
pub enum Pl4Error {
    /// Восстановимая ошибка декодирования
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Фатальная ошибка транспорта (устройство недоступно)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Ошибки ввода/вывода (автоконвертируются из std::io::Error)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Нарушение протокола команд устройства
    #[error("Protocol violation: {0}")]
    Protocol(String),
}

impl Pl4Error {
    /// Удобные конструкторы
    pub fn transport<S: Into<String>>(s: S) -> Self {
        Self::Transport(s.into())
    }

    pub fn protocol<S: Into<String>>(s: S) -> Self {
        Self::Protocol(s.into())
    }

    /// `true` для ошибок, после которых цикл обработки продолжается.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Pl4Error::Decode(_))
    }
}
