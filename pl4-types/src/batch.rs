use serde::{Deserialize, Serialize};

/// Общий интерфейс выборок обоих потоков.
pub trait Sample {
    /// Метка времени выборки (Unix, наносекунды)
    fn timestamp_ns(&self) -> u64;
    /// Счётчик пакета, из которого взята выборка
    fn counter(&self) -> u8;
}

/// Выборка быстрого потока: каналы 1 и 2, мкВ, 1024 Гц.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighRateSample {
    pub timestamp_ns: u64,
    pub counter: u8,
    pub ch1: f64,
    pub ch2: f64,
}

/// Выборка медленного потока: каналы 3 и 4, мВ, 256 Гц.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LowRateSample {
    pub timestamp_ns: u64,
    pub counter: u8,
    pub ch3: f64,
    pub ch4: f64,
}

/// Упорядоченная по времени пачка выборок одного потока.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch<S> {
    samples: Vec<S>,
}

pub type HighRateBatch = Batch<HighRateSample>;
pub type LowRateBatch = Batch<LowRateSample>;

/// Результат одного цикла обработки: оба потока отдаются потребителю вместе.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Emission {
    pub high: HighRateBatch,
    pub low: LowRateBatch,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<S: Sample> Batch<S> {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(
        &mut self,
        sample: S,
    ) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[S] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, S> {
        self.samples.iter()
    }

    pub fn timestamps(&self) -> Vec<u64> {
        self.samples.iter().map(Sample::timestamp_ns).collect()
    }

    pub fn counters(&self) -> Vec<u8> {
        self.samples.iter().map(Sample::counter).collect()
    }

    /// Интервал времени `[first, last]`, покрытый пачкой.
    pub fn time_span_ns(&self) -> Option<(u64, u64)> {
        let first = self.samples.first()?.timestamp_ns();
        let last = self.samples.last()?.timestamp_ns();
        Some((first, last))
    }
}

impl Emission {
    /// Количество пакетов, из которых собрана эмиссия.
    pub fn packet_count(&self) -> usize {
        self.low.len()
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.low.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Sample for HighRateSample {
    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    fn counter(&self) -> u8 {
        self.counter
    }
}

impl Sample for LowRateSample {
    fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    fn counter(&self) -> u8 {
        self.counter
    }
}

impl<S> Default for Batch<S> {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
        }
    }
}

impl<'a, S> IntoIterator for &'a Batch<S> {
    type Item = &'a S;
    type IntoIter = std::slice::Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
