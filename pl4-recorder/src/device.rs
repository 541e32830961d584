// Устройства отдают сырые байты ядру через ByteSource. Симулятор собирает
// настоящие 37-байтовые кадры энкодером ядра и умеет портить поток (seeded
// StdRng), так что pipeline видит данные почти как с живого регистратора.
// FileDevice воспроизводит сырой захват, SerialDevice работает с FTDI VCP.

use std::{
    collections::VecDeque,
    f64::consts::PI,
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
    time::Instant,
};

use log::{debug, info};
use pl4_core::{
    encode::encode_packet, ByteSource, DeviceInfo, DEFAULT_BUFFER_CAPACITY, HEADER_MARKER,
    NANOS_PER_SEC, PACKET_SIZE,
};
use pl4_types::{DecodedPacket, Pl4Result, HIGH_RATE_HZ, LOW_RATE_HZ};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{DeviceKind, RecorderConfig, RecorderError, RecorderResult, SimCorruption};

/// Абстракция регистратора PL4.
// Реализации: [`SimulatedDevice`], [`FileDevice`] и `SerialDevice`
// (feature `serial`).
pub trait Pl4Device: ByteSource + Send {
    /// Имя для логов
    fn name(&self) -> String;

    /// Сведения об устройстве (команда INFO)
    fn info(&mut self) -> RecorderResult<DeviceInfo>;

    /// Запускает сбор: очистка буферов, START, ожидание ACK
    fn start(&mut self) -> RecorderResult<()>;

    /// Останавливает сбор: STOP, очистка буферов
    fn stop(&mut self) -> RecorderResult<()>;

    /// Данных больше не будет (конец захвата, лимит симулятора)
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Читает до `n` байт, пока источник не вернёт 0 или не истечёт таймаут.
pub fn read_best_effort<R: Read + ?Sized>(
    reader: &mut R,
    n: usize,
) -> io::Result<Vec<u8>> {
    let mut out = vec![0u8; n];
    let mut filled = 0;

    while filled < n {
        match reader.read(&mut out[filled..]) {
            Ok(0) => break,
            Ok(k) => filled += k,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    out.truncate(filled);
    Ok(out)
}

////////////////////////////////////////////////////////////////////////////////
// Симулятор
////////////////////////////////////////////////////////////////////////////////

/// Синтетический регистратор: синус на каналах 1/2, пилы на 3/4.
pub struct SimulatedDevice {
    /// Выдавать пакеты в темпе 256 в секунду реального времени
    pub paced: bool,
    /// Пакетов на один опрос без темпа
    pub burst_packets: usize,
    /// Остановиться после N пакетов
    pub packet_limit: Option<u64>,
    /// Ёмкость приёмного буфера
    pub capacity: usize,
    /// Частота синуса на каналах 1/2 (Гц)
    pub tone_freq_hz: f64,
    /// Амплитуда синуса (мкВ)
    pub amplitude_uv: f64,
    corruption: SimCorruption,
    rng: StdRng,
    buf: VecDeque<u8>,
    generated: u64,
    lost_bytes: u64,
    started: Option<Instant>,
}

impl SimulatedDevice {
    pub fn new(
        paced: bool,
        corruption: SimCorruption,
    ) -> Self {
        let corruption = SimCorruption {
            bit_flip_rate: corruption.bit_flip_rate.clamp(0.0, 1.0),
            drop_byte_rate: corruption.drop_byte_rate.clamp(0.0, 1.0),
            garbage_rate: corruption.garbage_rate.clamp(0.0, 1.0),
            seed: corruption.seed,
        };

        Self {
            paced,
            burst_packets: 64,
            packet_limit: None,
            capacity: DEFAULT_BUFFER_CAPACITY,
            tone_freq_hz: 10.0,
            amplitude_uv: 100.0,
            rng: StdRng::seed_from_u64(corruption.seed),
            corruption,
            buf: VecDeque::new(),
            generated: 0,
            lost_bytes: 0,
            started: None,
        }
    }

    /// Без темпа и без повреждений: удобно для тестов.
    pub fn unpaced() -> Self {
        Self::new(false, SimCorruption::none())
    }

    pub fn with_packet_limit(
        mut self,
        limit: u64,
    ) -> Self {
        self.packet_limit = Some(limit);
        self
    }

    /// Сколько пакетов сгенерировано с момента старта.
    pub fn generated_packets(&self) -> u64 {
        self.generated
    }

    /// Байты, не поместившиеся в приёмный буфер.
    pub fn lost_bytes(&self) -> u64 {
        self.lost_bytes
    }

    /// Пакет с номером `index` (счётчик = младший байт номера).
    pub fn packet(
        &self,
        index: u64,
    ) -> DecodedPacket {
        let mut ch1 = [0.0; 4];
        let mut ch2 = [0.0; 4];

        for k in 0..4 {
            let t = (index * 4 + k as u64) as f64 / HIGH_RATE_HZ as f64;
            let phase = 2.0 * PI * self.tone_freq_hz * t;
            ch1[k] = self.amplitude_uv * phase.sin();
            ch2[k] = self.amplitude_uv * phase.cos();
        }

        let ramp = (index % LOW_RATE_HZ as u64) as f64 / LOW_RATE_HZ as f64;

        DecodedPacket {
            counter: index as u8,
            ch1,
            ch2,
            ch3: ramp - 0.5,
            ch4: 0.5 - ramp,
        }
    }

    fn limit_reached(&self) -> bool {
        self.packet_limit.is_some_and(|l| self.generated >= l)
    }

    fn due_packets(&self) -> u64 {
        let Some(start) = self.started else {
            return self.generated;
        };

        let due = if self.paced {
            (start.elapsed().as_nanos() * LOW_RATE_HZ as u128 / NANOS_PER_SEC as u128) as u64
        } else {
            self.generated + self.burst_packets as u64
        };

        match self.packet_limit {
            Some(limit) => due.min(limit),
            None => due,
        }
    }

    /// Кадр пакета `index` с учётом настроенных повреждений.
    fn wire_bytes(
        &mut self,
        index: u64,
    ) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 * PACKET_SIZE);

        if self.rng.gen_bool(self.corruption.garbage_rate) {
            let len = self.rng.gen_range(1..=PACKET_SIZE);
            // Мусор без маркера
            bytes.extend((0..len).map(|_| self.rng.gen_range(0..HEADER_MARKER)));
        }

        let start = bytes.len();
        bytes.extend_from_slice(encode_packet(&self.packet(index)).as_bytes());

        if self.rng.gen_bool(self.corruption.bit_flip_rate) {
            let pos = start + self.rng.gen_range(1..PACKET_SIZE);
            bytes[pos] ^= 1 << self.rng.gen_range(0..8);
        }

        if self.rng.gen_bool(self.corruption.drop_byte_rate) {
            let pos = start + self.rng.gen_range(1..PACKET_SIZE);
            bytes.remove(pos);
        }

        bytes
    }

    /// Кладёт следующий пакет в буфер. Что не влезает, теряется побайтно,
    /// как в переполненном FIFO приёмника.
    fn push_packet(&mut self) {
        let bytes = self.wire_bytes(self.generated);
        self.generated += 1;

        let room = self.capacity.saturating_sub(self.buf.len());
        if bytes.len() > room {
            self.lost_bytes += (bytes.len() - room) as u64;
        }

        self.buf.extend(bytes.into_iter().take(room));
    }

    fn fill(&mut self) {
        let due = self.due_packets();
        while self.generated < due {
            self.push_packet();
        }
    }
}

impl ByteSource for SimulatedDevice {
    fn available(&mut self) -> Pl4Result<usize> {
        self.fill();
        Ok(self.buf.len())
    }

    fn pull(
        &mut self,
        n: usize,
    ) -> Pl4Result<Vec<u8>> {
        // Как чтение с таймаутом: недостающие байты «успевают прийти»
        while self.buf.len() < n.min(self.capacity)
            && self.started.is_some()
            && !self.limit_reached()
        {
            self.push_packet();
        }

        let n = n.min(self.buf.len());
        Ok(self.buf.drain(..n).collect())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Pl4Device for SimulatedDevice {
    fn name(&self) -> String {
        if self.paced {
            "Simulated PL4".to_string()
        } else {
            "Simulated PL4 (unpaced)".to_string()
        }
    }

    fn info(&mut self) -> RecorderResult<DeviceInfo> {
        Ok(DeviceInfo {
            device_id: 0x0004,
            software_version: 1,
            hardware_version: 1,
            serial_number: 1,
        })
    }

    fn start(&mut self) -> RecorderResult<()> {
        self.buf.clear();
        self.generated = 0;
        self.started = Some(Instant::now());

        if self.corruption.is_active() {
            info!(
                "Simulator corruption: flip={} drop={} garbage={} seed={}",
                self.corruption.bit_flip_rate,
                self.corruption.drop_byte_rate,
                self.corruption.garbage_rate,
                self.corruption.seed
            );
        }

        Ok(())
    }

    fn stop(&mut self) -> RecorderResult<()> {
        self.started = None;
        self.buf.clear();
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.limit_reached() && self.buf.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Воспроизведение захвата
////////////////////////////////////////////////////////////////////////////////

/// Сырой захват из файла, отдаваемый порциями как с устройства.
pub struct FileDevice {
    path: PathBuf,
    reader: BufReader<File>,
    buf: VecDeque<u8>,
    /// Байт, «приходящих» за один опрос
    pub chunk_bytes: usize,
    /// Ёмкость приёмного буфера
    pub capacity: usize,
    eof: bool,
}

impl FileDevice {
    pub fn open<P: AsRef<Path>>(path: P) -> RecorderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .map_err(|e| RecorderError::DeviceNotFound(format!("{}: {e}", path.display())))?;

        Ok(Self {
            path,
            reader: BufReader::new(file),
            buf: VecDeque::new(),
            chunk_bytes: PACKET_SIZE * 64,
            capacity: DEFAULT_BUFFER_CAPACITY,
            eof: false,
        })
    }

    fn refill(
        &mut self,
        want: usize,
    ) -> io::Result<()> {
        if self.eof || want == 0 {
            return Ok(());
        }

        let chunk = read_best_effort(&mut self.reader, want)?;
        if chunk.len() < want {
            debug!("Capture {} exhausted", self.path.display());
            self.eof = true;
        }
        self.buf.extend(chunk);
        Ok(())
    }
}

impl ByteSource for FileDevice {
    fn available(&mut self) -> Pl4Result<usize> {
        let room = self.capacity.saturating_sub(self.buf.len());
        self.refill(self.chunk_bytes.min(room))?;
        Ok(self.buf.len().min(self.capacity))
    }

    fn pull(
        &mut self,
        n: usize,
    ) -> Pl4Result<Vec<u8>> {
        if self.buf.len() < n {
            self.refill(n - self.buf.len())?;
        }

        let n = n.min(self.buf.len());
        Ok(self.buf.drain(..n).collect())
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Pl4Device for FileDevice {
    fn name(&self) -> String {
        format!("Capture {}", self.path.display())
    }

    fn info(&mut self) -> RecorderResult<DeviceInfo> {
        Ok(DeviceInfo {
            device_id: 0,
            software_version: 0,
            hardware_version: 0,
            serial_number: 0,
        })
    }

    fn start(&mut self) -> RecorderResult<()> {
        Ok(())
    }

    fn stop(&mut self) -> RecorderResult<()> {
        Ok(())
    }

    fn is_exhausted(&self) -> bool {
        self.eof && self.buf.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Последовательный порт
////////////////////////////////////////////////////////////////////////////////

#[cfg(feature = "serial")]
pub use serial::SerialDevice;

#[cfg(feature = "serial")]
mod serial {
    use std::{io::Write, time::Duration};

    use log::{debug, info};
    use pl4_core::{
        encode_command, is_ack, ByteSource, CommandId, DeviceInfo, ACK_RESPONSE_SIZE,
        INFO_RESPONSE_SIZE,
    };
    use pl4_types::{Pl4Error, Pl4Result};
    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

    use super::{read_best_effort, Pl4Device};
    use crate::{RecorderError, RecorderResult};

    /// Таймаут чтения порта
    const READ_TIMEOUT: Duration = Duration::from_secs(2);

    /// Регистратор на FTDI VCP: 8N1, без управления потоком.
    pub struct SerialDevice {
        port_name: String,
        port: Box<dyn SerialPort>,
    }

    impl SerialDevice {
        pub fn open(
            port_name: &str,
            baud_rate: u32,
        ) -> RecorderResult<Self> {
            let port = serialport::new(port_name, baud_rate)
                .data_bits(DataBits::Eight)
                .stop_bits(StopBits::One)
                .parity(Parity::None)
                .flow_control(FlowControl::None)
                .timeout(READ_TIMEOUT)
                .open()?;

            info!("Opened {port_name} @ {baud_rate} baud");

            Ok(Self {
                port_name: port_name.to_string(),
                port,
            })
        }

        fn command(
            &mut self,
            id: CommandId,
        ) -> RecorderResult<()> {
            debug!("> {id}");
            self.port.write_all(&encode_command(id))?;
            self.port.flush()?;
            Ok(())
        }

        fn purge(&mut self) -> RecorderResult<()> {
            self.port.clear(ClearBuffer::All)?;
            Ok(())
        }
    }

    impl ByteSource for SerialDevice {
        fn available(&mut self) -> Pl4Result<usize> {
            self.port
                .bytes_to_read()
                .map(|n| n as usize)
                .map_err(|e| Pl4Error::transport(e.to_string()))
        }

        fn pull(
            &mut self,
            n: usize,
        ) -> Pl4Result<Vec<u8>> {
            Ok(read_best_effort(&mut self.port, n)?)
        }
    }

    impl Pl4Device for SerialDevice {
        fn name(&self) -> String {
            format!("PL4 on {}", self.port_name)
        }

        fn info(&mut self) -> RecorderResult<DeviceInfo> {
            self.command(CommandId::Info)?;
            let response = read_best_effort(&mut self.port, INFO_RESPONSE_SIZE)?;
            Ok(DeviceInfo::parse(&response)?)
        }

        fn start(&mut self) -> RecorderResult<()> {
            self.purge()?;
            self.command(CommandId::Start)?;

            let response = read_best_effort(&mut self.port, ACK_RESPONSE_SIZE)?;
            if !is_ack(&response) {
                return Err(RecorderError::NotAcknowledged(CommandId::Start));
            }

            Ok(())
        }

        fn stop(&mut self) -> RecorderResult<()> {
            self.command(CommandId::Stop)?;
            self.purge()
        }
    }
}

/// Создаёт нужное устройство по конфигурации.
pub fn create_device(config: &RecorderConfig) -> RecorderResult<Box<dyn Pl4Device>> {
    config.validate().map_err(RecorderError::Config)?;

    match &config.device {
        DeviceKind::Simulated => {
            let mut dev = SimulatedDevice::new(config.sim_paced, config.sim_corruption.clone());
            dev.packet_limit = config.sim_packet_limit;
            Ok(Box::new(dev))
        }
        DeviceKind::File => {
            let path = config
                .input_path
                .as_ref()
                .ok_or_else(|| RecorderError::Config("--input is required".to_string()))?;
            Ok(Box::new(FileDevice::open(path)?))
        }
        DeviceKind::Serial => {
            #[cfg(feature = "serial")]
            {
                let port = config
                    .port
                    .as_deref()
                    .ok_or_else(|| RecorderError::Config("--port is required".to_string()))?;
                Ok(Box::new(SerialDevice::open(port, config.baud_rate)?))
            }
            #[cfg(not(feature = "serial"))]
            Err(RecorderError::DeviceNotFound(
                "Compiled without serial support. \
                 Rebuild with: cargo build --features serial"
                    .to_string(),
            ))
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
