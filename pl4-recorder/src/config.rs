use std::path::PathBuf;

use pl4_core::{DecoderConfig, DesyncPolicy};

/// Скорость порта FTDI VCP регистратора
pub const DEFAULT_BAUD_RATE: u32 = 921_600;

/// Источник байт (выбор при старте).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    /// Встроенный симулятор (не требует железа).
    Simulated,
    /// Воспроизведение сырого захвата из файла.
    File,
    /// Регистратор на последовательном порту (требует feature `serial`).
    Serial,
}

/// Формат выходных файлов.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Два CSV: `<stem>_1024hz.csv` и `<stem>_256hz.csv`
    Csv,
    /// Одна эмиссия на строку
    JsonLines,
}

/// Повреждения, которые симулятор вносит в поток.
#[derive(Debug, Clone, PartialEq)]
pub struct SimCorruption {
    /// Вероятность инвертировать один бит в кадре
    pub bit_flip_rate: f64,
    /// Вероятность потерять один байт кадра
    pub drop_byte_rate: f64,
    /// Вероятность вставить пачку мусора перед кадром
    pub garbage_rate: f64,
    /// Зерно генератора (повторяемые прогоны)
    pub seed: u64,
}

/// Полная конфигурация сессии сбора.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Источник байт
    pub device: DeviceKind,
    /// Последовательный порт (`/dev/ttyUSB0`, `COM3`)
    pub port: Option<String>,
    /// Скорость порта
    pub baud_rate: u32,
    /// Файл захвата для `DeviceKind::File`
    pub input_path: Option<PathBuf>,
    /// Выход (для CSV это основа имени двух файлов)
    pub output_path: PathBuf,
    /// Формат выхода
    pub format: OutputFormat,
    /// Ограничение по времени (None = до Ctrl+C или конца захвата)
    pub duration_secs: Option<u64>,
    /// Период цикла опроса (мс). 0 = без пауз
    pub cycle_ms: u64,
    /// Интервал вывода статистики (секунды)
    pub stats_interval_secs: u64,
    /// Реакция на рассинхронизацию
    pub desync_policy: DesyncPolicy,
    /// Симулятор выдаёт кадры в темпе реального времени
    pub sim_paced: bool,
    /// Повреждения потока в симуляторе
    pub sim_corruption: SimCorruption,
    /// Остановить симулятор после N пакетов
    pub sim_packet_limit: Option<u64>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl RecorderConfig {
    /// Настройки ядра декодирования.
    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            desync_policy: self.desync_policy,
        }
    }

    /// Проверяет согласованность опций до открытия устройства.
    pub fn validate(&self) -> Result<(), String> {
        match self.device {
            DeviceKind::File if self.input_path.is_none() => {
                Err("--input is required for the file device".to_string())
            }
            DeviceKind::Serial if self.port.is_none() => {
                Err("--port is required for the serial device".to_string())
            }
            _ => self.sim_corruption.validate(),
        }
    }
}

impl SimCorruption {
    pub fn none() -> Self {
        Self {
            bit_flip_rate: 0.0,
            drop_byte_rate: 0.0,
            garbage_rate: 0.0,
            seed: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.bit_flip_rate > 0.0 || self.drop_byte_rate > 0.0 || self.garbage_rate > 0.0
    }

    fn validate(&self) -> Result<(), String> {
        for (name, rate) in [
            ("bit flip", self.bit_flip_rate),
            ("drop byte", self.drop_byte_rate),
            ("garbage", self.garbage_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(format!("{name} rate must be within 0..=1, got {rate}"));
            }
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для DeviceKind, OutputFormat, RecorderConfig
////////////////////////////////////////////////////////////////////////////////

impl std::fmt::Display for DeviceKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            DeviceKind::Simulated => write!(f, "sim"),
            DeviceKind::File => write!(f, "file"),
            DeviceKind::Serial => write!(f, "serial"),
        }
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sim" | "simulated" => Ok(DeviceKind::Simulated),
            "file" | "replay" => Ok(DeviceKind::File),
            "serial" | "usb" | "ftdi" => Ok(DeviceKind::Serial),
            _ => Err(format!("Unknown device type: '{s}'. Use: sim, file, serial")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::JsonLines => write!(f, "jsonl"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "jsonl" | "json-lines" | "ndjson" => Ok(OutputFormat::JsonLines),
            _ => Err(format!("Unknown output format: '{s}'. Use: csv, jsonl")),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            device: DeviceKind::Simulated,
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            input_path: None,
            output_path: PathBuf::from("recording"),
            format: OutputFormat::Csv,
            duration_secs: None,
            cycle_ms: 100,
            stats_interval_secs: 5,
            desync_policy: DesyncPolicy::AbortCycle,
            sim_paced: true,
            sim_corruption: SimCorruption::none(),
            sim_packet_limit: None,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
