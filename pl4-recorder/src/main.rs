use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use clap::Parser;
use log::{error, info, warn, LevelFilter};
use pl4_core::DesyncPolicy;
use pl4_recorder::{
    create_device, create_sink, AcquisitionPipeline, DeviceKind, OutputFormat, RecorderConfig,
    SimCorruption, DEFAULT_BAUD_RATE,
};

#[derive(Parser, Debug)]
#[command(
    name = "pl4-recorder",
    version = env!("CARGO_PKG_VERSION"),
    about = "Record PhysioLOG-4 biosignal streams to CSV or JSON lines",
    long_about = None,
)]
struct Cli {
    /// Источник: sim, file, serial
    #[arg(short, long, default_value = "sim")]
    device: String,
    /// Последовательный порт (/dev/ttyUSB0, COM3)
    #[arg(short, long)]
    port: Option<String>,
    /// Скорость порта
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// Файл сырого захвата для --device file
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Выход: для csv это основа имени двух файлов
    #[arg(short, long, default_value = "recording")]
    output: PathBuf,
    /// Формат выхода: csv, jsonl
    #[arg(long, default_value = "csv")]
    format: String,
    /// Ограничение записи (секунды). По умолчанию: до Ctrl+C
    #[arg(short = 't', long)]
    duration: Option<u64>,
    /// Период цикла опроса (мс)
    #[arg(long, default_value = "100")]
    cycle_ms: u64,
    /// Интервал вывода статистики (секунды)
    #[arg(long, default_value = "5")]
    stats_interval: u64,
    /// Реакция на рассинхронизацию: abort, skip
    #[arg(long, default_value = "abort")]
    desync: String,
    /// Симулятор: вероятность битовой ошибки на кадр
    #[arg(long, default_value = "0.0")]
    sim_flip_rate: f64,
    /// Симулятор: вероятность потери байта на кадр
    #[arg(long, default_value = "0.0")]
    sim_drop_rate: f64,
    /// Симулятор: вероятность пачки мусора перед кадром
    #[arg(long, default_value = "0.0")]
    sim_garbage_rate: f64,
    /// Симулятор: зерно генератора
    #[arg(long, default_value = "0")]
    sim_seed: u64,
    /// Симулятор: выдавать данные без привязки к реальному времени
    #[arg(long)]
    sim_unpaced: bool,
    /// Симулятор: остановиться после N пакетов
    #[arg(long)]
    sim_packets: Option<u64>,
    /// Вывести сведения об устройстве и выйти
    #[arg(long)]
    info: bool,
    /// Тихий режим (только ошибки)
    #[arg(short, long)]
    quiet: bool,
}

fn parse_or_exit<T: std::str::FromStr<Err = String>>(
    flag: &str,
    value: &str,
) -> T {
    match value.parse() {
        Ok(v) => v,
        Err(e) => {
            error!("{flag}: {e}");
            std::process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_target(false)
        .format_timestamp_millis()
        .init();

    let device_kind: DeviceKind = parse_or_exit("--device", &cli.device);
    let format: OutputFormat = parse_or_exit("--format", &cli.format);
    let desync_policy: DesyncPolicy = parse_or_exit("--desync", &cli.desync);

    let config = RecorderConfig {
        device: device_kind,
        port: cli.port.clone(),
        baud_rate: cli.baud,
        input_path: cli.input.clone(),
        output_path: cli.output.clone(),
        format,
        duration_secs: cli.duration,
        cycle_ms: cli.cycle_ms,
        stats_interval_secs: cli.stats_interval,
        desync_policy,
        sim_paced: !cli.sim_unpaced,
        sim_corruption: SimCorruption {
            bit_flip_rate: cli.sim_flip_rate,
            drop_byte_rate: cli.sim_drop_rate,
            garbage_rate: cli.sim_garbage_rate,
            seed: cli.sim_seed,
        },
        sim_packet_limit: cli.sim_packets,
    };

    let mut device = match create_device(&config) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to open device: {e}");
            std::process::exit(1);
        }
    };

    if cli.info {
        match device.info() {
            Ok(info) => {
                println!("{}: {info}", device.name());
                return;
            }
            Err(e) => {
                error!("INFO request failed: {e}");
                std::process::exit(1);
            }
        }
    }

    let mut sink = match create_sink(config.format, &config.output_path) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create output: {e}");
            std::process::exit(1);
        }
    };

    let (pipeline, metrics) = AcquisitionPipeline::new(config);
    let stop_flag: Arc<AtomicBool> = pipeline.stop_flag();

    let stop_ctrlc = stop_flag.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        if stop_ctrlc.swap(true, Ordering::SeqCst) {
            // Второй Ctrl+C: принудительный выход
            warn!("Force exit");
            std::process::exit(130);
        }
        warn!("Ctrl+C received, stopping device and flushing output...");
    }) {
        warn!("Failed to set Ctrl+C handler: {e}");
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Device        : {}", cli.device);
    info!("  Streams       : 1024 Hz (ch1/ch2, µV), 256 Hz (ch3/ch4, mV)");
    info!("  Cycle         : {} ms", cli.cycle_ms);
    info!("  Desync policy : {desync_policy}");
    info!("  Format        : {format}");
    info!("  Output        : {:?}", cli.output);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let session_start = Instant::now();

    if let Err(e) = pipeline.run(device, sink.as_mut()) {
        error!("Acquisition failed: {e}");
        std::process::exit(1);
    }

    // --- Итоговая статистика ---
    let summary = metrics.summary(&session_start);
    info!("\n{summary}");

    if summary.overflow_warnings > 0 {
        warn!(
            "⚠ Receive buffer was full {} times. Consider a shorter --cycle-ms",
            summary.overflow_warnings
        );
    }

    if summary.sink_errors > 0 {
        warn!(
            "⚠ {} write errors occurred. Check disk space and I/O.",
            summary.sink_errors
        );
        std::process::exit(1);
    }

    info!("✓ Acquisition complete: {:?}", cli.output);
}
