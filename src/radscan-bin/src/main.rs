// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! radscan command-line front-end: opens a source, runs a local analyzer
//! and logs the spectrum/channel/inspector traffic it produces.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

mod config;

use config::Config;
use radscan_analyzer::lookup_class;
use radscan_core::config::AnalyzerMode;
use radscan_core::Analyzer as _;
use radscan_core::msg::{AnalyzerEvent, InitStatus, InspectorEvent};
use radscan_core::source::{FileFormat, SourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeKind {
    Channel,
    Wide,
}

#[derive(Debug, Parser)]
#[command(
    name = "radscan",
    version = env!("CARGO_PKG_VERSION"),
    about = "Real-time IQ spectrum analyzer"
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
    /// IQ recording to analyze (raw interleaved complex float32)
    #[arg(short = 'f', long = "file")]
    file: Option<PathBuf>,
    /// SoapySDR device args (e.g. "driver=rtlsdr"); needs the soapysdr-sys
    /// feature
    #[arg(short = 'd', long = "device")]
    device: Option<String>,
    /// Sample rate in samples/s
    #[arg(short = 's', long = "samp-rate")]
    samp_rate: Option<u64>,
    /// Center frequency in Hz
    #[arg(short = 'F', long = "frequency")]
    frequency: Option<f64>,
    /// Operating mode
    #[arg(short = 'm', long = "mode", value_enum)]
    mode: Option<ModeKind>,
    /// Sweep range lower bound in Hz (wide mode)
    #[arg(long = "min-freq")]
    min_freq: Option<f64>,
    /// Sweep range upper bound in Hz (wide mode)
    #[arg(long = "max-freq")]
    max_freq: Option<f64>,
    /// Stop after this many seconds
    #[arg(short = 't', long = "duration")]
    duration: Option<f64>,
    /// Log level (overrides config file)
    #[arg(short = 'l', long = "log-level")]
    log_level: Option<String>,
}

fn init_tracing(level: Option<&str>) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.unwrap_or("info")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("cannot load configuration: {error}");
            std::process::exit(1);
        }
    };

    init_tracing(
        cli.log_level
            .as_deref()
            .or(config.general.log_level.as_deref()),
    );

    // CLI overrides.
    if let Some(path) = cli.file {
        config.source.kind = SourceKind::File {
            path,
            format: FileFormat::RawCf32,
        };
    } else if let Some(args) = cli.device {
        config.source.kind = SourceKind::Sdr { args };
    }
    if let Some(samp_rate) = cli.samp_rate {
        config.source.samp_rate = samp_rate;
    }
    if let Some(frequency) = cli.frequency {
        config.source.freq_hz = frequency;
    }
    if let Some(mode) = cli.mode {
        config.analyzer.mode = match mode {
            ModeKind::Channel => AnalyzerMode::Channel,
            ModeKind::Wide => AnalyzerMode::WideSpectrum,
        };
    }
    if let Some(min_freq) = cli.min_freq {
        config.analyzer.min_freq_hz = min_freq;
    }
    if let Some(max_freq) = cli.max_freq {
        config.analyzer.max_freq_hz = max_freq;
    }

    let class = lookup_class("local").expect("local analyzer class");
    let analyzer = match (class.make)(&config.source, config.analyzer) {
        Ok(analyzer) => analyzer,
        Err(error) => {
            error!("analyzer construction failed: {error}");
            std::process::exit(1);
        }
    };

    if let Some(seconds) = cli.duration {
        let analyzer = analyzer.clone();
        std::thread::Builder::new()
            .name("run-timer".to_string())
            .spawn(move || {
                std::thread::sleep(Duration::from_secs_f64(seconds));
                info!("run time elapsed, halting");
                analyzer.req_halt();
            })
            .expect("failed to spawn run timer");
    }

    let mut psd_frames: u64 = 0;
    loop {
        match analyzer.read() {
            AnalyzerEvent::SourceInit { status, detail } => match status {
                InitStatus::Success => info!("source initialized"),
                InitStatus::Failure => {
                    error!(
                        "source initialization failed: {}",
                        detail.unwrap_or_default()
                    );
                    analyzer.req_halt();
                }
            },
            AnalyzerEvent::Psd(frame) => {
                psd_frames += 1;
                if psd_frames % 25 == 1 {
                    info!(
                        "PSD #{}: {} bins at {:.0} Hz, N0 {:.1} dB, {:.0} sps measured",
                        psd_frames,
                        frame.psd_db.len(),
                        frame.center_freq_hz,
                        frame.n0_db,
                        frame.measured_samp_rate
                    );
                }
            }
            AnalyzerEvent::Channel(update) => {
                if !update.channels.is_empty() {
                    let dump = serde_json::to_string(&update.channels).unwrap_or_default();
                    info!("{} channel(s): {}", update.channels.len(), dump);
                }
            }
            AnalyzerEvent::Inspector(event) => match event {
                InspectorEvent::Signal {
                    handle,
                    name,
                    value,
                } => info!("inspector {}: {} = {:.2}", handle, name, value),
                other => info!("inspector event: {:?}", other),
            },
            AnalyzerEvent::SourceInfo(info) => {
                info!(
                    "source info: {:.0} Hz, {} sps effective",
                    info.frequency_hz, info.effective_samp_rate
                );
            }
            AnalyzerEvent::Eos(info) => {
                warn!(
                    "end of stream{}",
                    info.detail
                        .map(|d| format!(": {d}"))
                        .unwrap_or_default()
                );
                analyzer.req_halt();
            }
            AnalyzerEvent::Halt => {
                info!("halt acknowledged, shutting down");
                break;
            }
        }
    }
}
