use std::collections::VecDeque;

use pl4_types::Pl4Result;

use crate::format::DEFAULT_BUFFER_CAPACITY;

/// Источник сырых байт для цикла декодирования.
///
/// Реализуется транспортом (USB/serial, файл с захватом, симулятор). Ядро
/// никогда не ждёт сверх того, что делает сам `pull`.
pub trait ByteSource {
    /// Сколько байт уже лежит в приёмном буфере.
    fn available(&mut self) -> Pl4Result<usize>;

    /// Читает до `n` байт. Может вернуть меньше, если данные кончились или
    /// истёк таймаут чтения.
    fn pull(
        &mut self,
        n: usize,
    ) -> Pl4Result<Vec<u8>>;

    /// Ёмкость приёмного буфера. Заполненный буфер означает переполнение.
    fn capacity(&self) -> usize {
        DEFAULT_BUFFER_CAPACITY
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn available(&mut self) -> Pl4Result<usize> {
        (**self).available()
    }

    fn pull(
        &mut self,
        n: usize,
    ) -> Pl4Result<Vec<u8>> {
        (**self).pull(n)
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn available(&mut self) -> Pl4Result<usize> {
        (**self).available()
    }

    fn pull(
        &mut self,
        n: usize,
    ) -> Pl4Result<Vec<u8>> {
        (**self).pull(n)
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }
}

/// Источник поверх буфера в памяти.
///
/// Удобен для тестов и воспроизведения захватов: `available` никогда не
/// превышает `capacity`, как у настоящего драйвера.
#[derive(Debug, Clone)]
pub struct MemorySource {
    buf: VecDeque<u8>,
    capacity: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: VecDeque::new(),
            capacity,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut src = Self::new();
        src.extend(bytes);
        src
    }

    /// Дописывает байты в конец буфера (приход данных от устройства).
    pub fn extend(
        &mut self,
        bytes: &[u8],
    ) {
        self.buf.extend(bytes.iter().copied());
    }

    /// Всего байт в буфере, включая не помещающиеся в `capacity`.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSource for MemorySource {
    fn available(&mut self) -> Pl4Result<usize> {
        Ok(self.buf.len().min(self.capacity))
    }

    fn pull(
        &mut self,
        n: usize,
    ) -> Pl4Result<Vec<u8>> {
        let n = n.min(self.buf.len());
        Ok(self.buf.drain(..n).collect())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
