// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! IQ recording source: raw interleaved complex float32.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::error::SourceError;
use crate::Sample;

use super::{FileFormat, Permissions, Source, SourceConfig, SourceInfo};

/// Default largest single read, in samples.
const FILE_SOURCE_MTU: usize = 8192;

const BYTES_PER_SAMPLE: u64 = 8;

struct FileState {
    reader: BufReader<File>,
    started: bool,
}

/// Recording-backed source. Non-realtime: the analyzer throttles reads.
pub struct FileSource {
    state: Mutex<FileState>,
    info: Mutex<SourceInfo>,
    /// Samples delivered so far; drives `get_time` for recordings.
    consumed: AtomicU64,
    total_samples: u64,
    samp_rate: u64,
    force_eos: AtomicBool,
    capturing: AtomicBool,
}

impl FileSource {
    pub fn open(
        path: &Path,
        format: FileFormat,
        config: &SourceConfig,
    ) -> Result<Self, SourceError> {
        let FileFormat::RawCf32 = format;

        if config.samp_rate == 0 {
            return Err(SourceError::device("file source needs a sample rate"));
        }

        let file = File::open(path)
            .map_err(|e| SourceError::device(format!("cannot open {}: {e}", path.display())))?;
        let total_bytes = file
            .metadata()
            .map_err(|e| SourceError::device(format!("cannot stat {}: {e}", path.display())))?
            .len();
        let total_samples = total_bytes / BYTES_PER_SAMPLE;

        tracing::info!(
            "opened IQ recording {} ({} samples at {} sps)",
            path.display(),
            total_samples,
            config.samp_rate
        );

        let info = SourceInfo {
            permissions: Permissions::all_file(),
            mtu: FILE_SOURCE_MTU,
            source_samp_rate: config.samp_rate,
            effective_samp_rate: config.samp_rate,
            measured_samp_rate: config.samp_rate as f64,
            frequency_hz: config.freq_hz,
            bandwidth_hz: config.bandwidth_hz,
            antenna: None,
            dc_remove: false,
            agc: false,
            source_start: None,
            realtime: false,
            seekable: true,
        };

        Ok(Self {
            state: Mutex::new(FileState {
                reader: BufReader::new(file),
                started: false,
            }),
            info: Mutex::new(info),
            consumed: AtomicU64::new(0),
            total_samples,
            samp_rate: config.samp_rate,
            force_eos: AtomicBool::new(false),
            capturing: AtomicBool::new(false),
        })
    }

    fn reject(&self, what: &'static str) -> Result<(), SourceError> {
        tracing::debug!("file source rejects {}", what);
        Err(SourceError::NotPermitted(what))
    }
}

impl Source for FileSource {
    fn info(&self) -> SourceInfo {
        let mut info = self.info.lock().expect("file source info mutex").clone();
        info.measured_samp_rate = self.samp_rate as f64;
        info
    }

    fn start(&self) -> Result<(), SourceError> {
        let mut state = self.state.lock().expect("file source state mutex");
        if state.started {
            return Err(SourceError::device("capture already started"));
        }
        state.started = true;
        self.capturing.store(true, Ordering::Release);
        self.info.lock().expect("file source info mutex").source_start = Some(SystemTime::now());
        Ok(())
    }

    fn cancel(&self) {
        self.force_eos.store(true, Ordering::Release);
        self.capturing.store(false, Ordering::Release);
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }

    fn read(&self, buf: &mut [Sample]) -> Result<usize, SourceError> {
        if self.force_eos.load(Ordering::Acquire) {
            return Err(SourceError::Eos);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock().expect("file source state mutex");
        if !state.started {
            return Err(SourceError::device("read before start"));
        }

        let max = buf.len().min(FILE_SOURCE_MTU);
        let mut raw = vec![0u8; max * BYTES_PER_SAMPLE as usize];
        let mut filled = 0usize;
        while filled < raw.len() {
            match state.reader.read(&mut raw[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let samples = filled / BYTES_PER_SAMPLE as usize;
        if samples == 0 {
            self.capturing.store(false, Ordering::Release);
            return Err(SourceError::Eos);
        }

        for (i, out) in buf[..samples].iter_mut().enumerate() {
            let base = i * BYTES_PER_SAMPLE as usize;
            let re = f32::from_le_bytes(raw[base..base + 4].try_into().expect("4-byte chunk"));
            let im = f32::from_le_bytes(raw[base + 4..base + 8].try_into().expect("4-byte chunk"));
            *out = Sample::new(re, im);
        }

        self.consumed.fetch_add(samples as u64, Ordering::AcqRel);
        Ok(samples)
    }

    fn set_frequency(&self, freq_hz: f64) -> Result<(), SourceError> {
        // Recordings cannot retune, but the nominal frequency is mutable so
        // wide-sweep dry runs against files keep working.
        self.info.lock().expect("file source info mutex").frequency_hz = freq_hz;
        Ok(())
    }

    fn set_gain(&self, _name: &str, _db: f64) -> Result<(), SourceError> {
        self.reject("set_gain")
    }

    fn set_antenna(&self, _name: &str) -> Result<(), SourceError> {
        self.reject("set_antenna")
    }

    fn set_bandwidth(&self, _bw_hz: f64) -> Result<(), SourceError> {
        self.reject("set_bandwidth")
    }

    fn set_ppm(&self, _ppm: f64) -> Result<(), SourceError> {
        self.reject("set_ppm")
    }

    fn set_dc_remove(&self, _enabled: bool) -> Result<(), SourceError> {
        self.reject("set_dc_remove")
    }

    fn set_agc(&self, _enabled: bool) -> Result<(), SourceError> {
        self.reject("set_agc")
    }

    fn get_time(&self) -> SystemTime {
        let start = self
            .info
            .lock()
            .expect("file source info mutex")
            .source_start
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let consumed = self.consumed.load(Ordering::Acquire);
        start + Duration::from_secs_f64(consumed as f64 / self.samp_rate as f64)
    }

    fn seek(&self, pos: Duration) -> Result<(), SourceError> {
        let sample = (pos.as_secs_f64() * self.samp_rate as f64) as u64;
        let sample = sample.min(self.total_samples);
        let mut state = self.state.lock().expect("file source state mutex");
        state
            .reader
            .seek(SeekFrom::Start(sample * BYTES_PER_SAMPLE))
            .map_err(SourceError::from)?;
        self.consumed.store(sample, Ordering::Release);
        Ok(())
    }

    fn max_size(&self) -> Option<u64> {
        Some(self.total_samples)
    }

    fn is_real_time(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_recording(samples: &[Sample]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "radscan-file-src-{}-{}.cf32",
            std::process::id(),
            samples.len()
        ));
        let mut file = File::create(&path).expect("create recording");
        for s in samples {
            file.write_all(&s.re.to_le_bytes()).expect("write re");
            file.write_all(&s.im.to_le_bytes()).expect("write im");
        }
        path
    }

    fn ramp(len: usize) -> Vec<Sample> {
        (0..len)
            .map(|i| Sample::new(i as f32, -(i as f32)))
            .collect()
    }

    #[test]
    fn reads_back_samples_then_eos() {
        let samples = ramp(100);
        let path = write_recording(&samples);
        let config = SourceConfig {
            samp_rate: 1000,
            ..Default::default()
        };
        let source = FileSource::open(&path, FileFormat::RawCf32, &config).expect("open");
        source.start().expect("start");

        let mut buf = vec![Sample::new(0.0, 0.0); 64];
        let n = source.read(&mut buf).expect("first read");
        assert_eq!(n, 64);
        assert_eq!(buf[10], samples[10]);

        let n = source.read(&mut buf).expect("second read");
        assert_eq!(n, 36);

        assert!(matches!(source.read(&mut buf), Err(SourceError::Eos)));
        assert!(!source.is_capturing());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn cancel_forces_eos() {
        let path = write_recording(&ramp(32));
        let config = SourceConfig {
            samp_rate: 1000,
            ..Default::default()
        };
        let source = FileSource::open(&path, FileFormat::RawCf32, &config).expect("open");
        source.start().expect("start");
        source.cancel();
        let mut buf = vec![Sample::new(0.0, 0.0); 16];
        assert!(matches!(source.read(&mut buf), Err(SourceError::Eos)));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn seek_repositions_stream_time() {
        let path = write_recording(&ramp(2000));
        let config = SourceConfig {
            samp_rate: 1000,
            ..Default::default()
        };
        let source = FileSource::open(&path, FileFormat::RawCf32, &config).expect("open");
        source.start().expect("start");
        source.seek(Duration::from_secs(1)).expect("seek");

        let mut buf = vec![Sample::new(0.0, 0.0); 4];
        source.read(&mut buf).expect("read after seek");
        assert_eq!(buf[0].re, 1000.0);
        assert_eq!(source.max_size(), Some(2000));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn mutators_report_not_permitted() {
        let path = write_recording(&ramp(8));
        let config = SourceConfig {
            samp_rate: 1000,
            ..Default::default()
        };
        let source = FileSource::open(&path, FileFormat::RawCf32, &config).expect("open");
        assert!(matches!(
            source.set_gain("LNA", 10.0),
            Err(SourceError::NotPermitted("set_gain"))
        ));
        assert!(source.set_frequency(7_000_000.0).is_ok());
        let _ = std::fs::remove_file(path);
    }
}
