use pl4_core::CommandId;
use pl4_types::Pl4Error;
use thiserror::Error;

pub type RecorderResult<T> = std::result::Result<T, RecorderError>;

#[derive(Debug, Error)]
pub enum RecorderError {
    /// Регистратор не найден
    #[error("PL4 device not found: {0}")]
    DeviceNotFound(String),

    /// Ошибка устройства
    #[error("PL4 device error: {0}")]
    DeviceError(String),

    /// Устройство не подтвердило команду
    #[error("Device did not acknowledge {0}")]
    NotAcknowledged(CommandId),

    /// Ошибка ядра декодирования или транспорта
    #[error("PL4 error: {0}")]
    Pl4(#[from] Pl4Error),

    /// Ошибка записи файла
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Потребитель отключился
    #[error("Sink error: {0}")]
    Sink(String),

    /// Некорректная конфигурация
    #[error("Invalid configuration: {0}")]
    Config(String),
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for RecorderError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => RecorderError::DeviceNotFound(e.to_string()),
            _ => RecorderError::DeviceError(e.to_string()),
        }
    }
}
