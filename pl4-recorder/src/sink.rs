use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{atomic::Ordering, Arc},
};

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, info};
use pl4_types::Emission;

use crate::{AcquisitionMetrics, OutputFormat, RecorderError, RecorderResult};

/// Потребитель эмиссий: не более одной за цикл.
pub trait SampleSink {
    /// Принимает оба потока одного цикла
    fn emit(
        &mut self,
        emission: Emission,
    ) -> RecorderResult<()>;

    /// Сбрасывает буферы в конце сессии
    fn finish(&mut self) -> RecorderResult<()>;
}

/// Пути двух CSV: `<stem>_1024hz.csv` и `<stem>_256hz.csv` рядом с `output`.
pub fn csv_paths(output: &Path) -> (PathBuf, PathBuf) {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string());

    (
        output.with_file_name(format!("{stem}_1024hz.csv")),
        output.with_file_name(format!("{stem}_256hz.csv")),
    )
}

/// Два CSV-файла, по одному на поток.
pub struct CsvSink {
    high: BufWriter<File>,
    low: BufWriter<File>,
    high_path: PathBuf,
    low_path: PathBuf,
    rows: u64,
}

impl CsvSink {
    pub fn create(output: &Path) -> RecorderResult<Self> {
        let (high_path, low_path) = csv_paths(output);

        let mut high = BufWriter::new(File::create(&high_path)?);
        let mut low = BufWriter::new(File::create(&low_path)?);
        writeln!(high, "timestamp_ns,counter,ch1_uv,ch2_uv")?;
        writeln!(low, "timestamp_ns,counter,ch3_mv,ch4_mv")?;

        Ok(Self {
            high,
            low,
            high_path,
            low_path,
            rows: 0,
        })
    }

    pub fn paths(&self) -> (&Path, &Path) {
        (&self.high_path, &self.low_path)
    }
}

impl SampleSink for CsvSink {
    fn emit(
        &mut self,
        emission: Emission,
    ) -> RecorderResult<()> {
        for s in emission.high.iter() {
            writeln!(
                self.high,
                "{},{},{:.6},{:.6}",
                s.timestamp_ns, s.counter, s.ch1, s.ch2
            )?;
        }

        for s in emission.low.iter() {
            writeln!(
                self.low,
                "{},{},{:.9},{:.9}",
                s.timestamp_ns, s.counter, s.ch3, s.ch4
            )?;
        }

        self.rows += (emission.high.len() + emission.low.len()) as u64;
        Ok(())
    }

    fn finish(&mut self) -> RecorderResult<()> {
        self.high.flush()?;
        self.low.flush()?;
        info!(
            "CSV written: {:?}, {:?} ({} rows)",
            self.high_path, self.low_path, self.rows
        );
        Ok(())
    }
}

/// Одна эмиссия в JSON на строку.
pub struct JsonLinesSink {
    writer: BufWriter<File>,
    path: PathBuf,
    lines: u64,
}

impl JsonLinesSink {
    pub fn create(path: &Path) -> RecorderResult<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            path: path.to_path_buf(),
            lines: 0,
        })
    }
}

impl SampleSink for JsonLinesSink {
    fn emit(
        &mut self,
        emission: Emission,
    ) -> RecorderResult<()> {
        serde_json::to_writer(&mut self.writer, &emission)?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    fn finish(&mut self) -> RecorderResult<()> {
        self.writer.flush()?;
        info!("JSON lines written: {:?} ({} emissions)", self.path, self.lines);
        Ok(())
    }
}

/// Передаёт эмиссии другому потоку через ограниченный канал.
///
/// Заполненный канал не блокирует цикл сбора: эмиссия отбрасывается и
/// учитывается в `emissions_dropped`.
pub struct ChannelSink {
    tx: Sender<Emission>,
    metrics: Arc<AcquisitionMetrics>,
}

impl ChannelSink {
    pub fn new(
        tx: Sender<Emission>,
        metrics: Arc<AcquisitionMetrics>,
    ) -> Self {
        Self { tx, metrics }
    }

    /// Сколько эмиссий отброшено из-за заполненного канала.
    pub fn dropped(&self) -> u64 {
        self.metrics.emissions_dropped.load(Ordering::Relaxed)
    }
}

impl SampleSink for ChannelSink {
    fn emit(
        &mut self,
        emission: Emission,
    ) -> RecorderResult<()> {
        match self.tx.try_send(emission) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(e)) => {
                debug!("Consumer is behind, dropping {} packets", e.packet_count());
                self.metrics
                    .emissions_dropped
                    .fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(RecorderError::Sink("consumer disconnected".to_string()))
            }
        }
    }

    fn finish(&mut self) -> RecorderResult<()> {
        Ok(())
    }
}

/// Создаёт файловый приёмник по формату.
pub fn create_sink(
    format: OutputFormat,
    output: &Path,
) -> RecorderResult<Box<dyn SampleSink>> {
    match format {
        OutputFormat::Csv => Ok(Box::new(CsvSink::create(output)?)),
        OutputFormat::JsonLines => Ok(Box::new(JsonLinesSink::create(output)?)),
    }
}
