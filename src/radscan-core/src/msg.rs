// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Message model of the analyzer: control messages posted to the input
//! queue and events published on the output queue.
//!
//! Ownership of payloads travels with the message. Draining a stale queue
//! therefore just drops the messages; there is no separate disposal hook.

use std::collections::BTreeMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::AnalyzerParams;
use crate::source::SourceInfo;

/// Dense integer identifying an inspector within the analyzer's table.
/// Handles are never reused for the lifetime of an analyzer.
pub type InspectorHandle = usize;

/// Identifies a worker thread in halt acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub u32);

/// Outcome carried by the SOURCE_INIT status event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    Success,
    Failure,
}

/// End-of-stream notification.
#[derive(Debug, Clone, Default)]
pub struct EosInfo {
    pub detail: Option<String>,
}

/// One detected channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Center frequency (power centroid), Hz.
    pub fc_hz: f64,
    pub f_lo_hz: f64,
    pub f_hi_hz: f64,
    pub bw_hz: f64,
    pub snr_db: f32,
    /// Peak signal level, dB.
    pub s0_db: f32,
    /// Noise floor estimate, dB.
    pub n0_db: f32,
}

/// Periodic detected-channel list.
#[derive(Debug, Clone, Default)]
pub struct ChannelUpdate {
    pub channels: Vec<ChannelInfo>,
}

/// PSD frame flag: the acquisition wrapped around a file source.
pub const PSD_FLAG_LOOPED: u32 = 1 << 0;

/// One power-spectral-density frame.
#[derive(Debug, Clone)]
pub struct PsdFrame {
    /// Power per bin in dB, FFT-shifted (DC at the center).
    pub psd_db: Vec<f32>,
    /// Noise floor estimate, dB.
    pub n0_db: f32,
    pub samp_rate: u64,
    pub measured_samp_rate: f64,
    /// Center frequency of the acquisition this frame belongs to, Hz.
    pub center_freq_hz: f64,
    /// Source time of the frame (stream time for file sources).
    pub timestamp: SystemTime,
    /// Wall-clock time the frame was produced.
    pub rt_timestamp: SystemTime,
    pub flags: u32,
}

/// Throttle override; `samp_rate == 0` resets to the source rate.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleRequest {
    pub samp_rate: u64,
}

/// Typed value of one inspector configuration field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Inspector configuration: a named set of typed fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspectorConfig {
    pub fields: BTreeMap<String, ConfigValue>,
}

impl InspectorConfig {
    pub fn set(&mut self, name: impl Into<String>, value: ConfigValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        match self.fields.get(name)? {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.fields.get(name)? {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            ConfigValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

/// Inspector-scoped command, carried by `ControlMsg::Inspector`.
pub struct InspectorRequest {
    /// Caller-chosen id echoed back in acknowledgements.
    pub request_id: u32,
    pub kind: InspectorRequestKind,
}

pub enum InspectorRequestKind {
    Open {
        /// Inspector class name (`"power"`, `"audio"`, `"baud"`).
        class: String,
        /// Channel center frequency relative to the acquisition center, Hz.
        fc_hz: f64,
        bw_hz: f64,
        precise: bool,
        /// Optional sink for demodulated PCM; the caller keeps the sender
        /// and subscribes to it. Only the `audio` class publishes here.
        pcm: Option<broadcast::Sender<Vec<f32>>>,
    },
    Close {
        handle: InspectorHandle,
    },
    SetConfig {
        handle: InspectorHandle,
        config: InspectorConfig,
    },
}

/// Inspector-scoped event on the output queue.
#[derive(Debug, Clone)]
pub enum InspectorEvent {
    Opened {
        request_id: u32,
        handle: InspectorHandle,
        class: String,
        /// Sample rate of the extracted channel handed to the inspector.
        channel_samp_rate: f64,
    },
    Closed {
        request_id: u32,
        handle: InspectorHandle,
    },
    ConfigUpdated {
        request_id: u32,
        handle: InspectorHandle,
    },
    /// Applied coalesced frequency change.
    FrequencyChanged {
        handle: InspectorHandle,
        freq_hz: f64,
    },
    /// Applied coalesced bandwidth change.
    BandwidthChanged {
        handle: InspectorHandle,
        bw_hz: f64,
    },
    /// A measurement published by the inspector (e.g. `power`, `baud`).
    Signal {
        handle: InspectorHandle,
        name: &'static str,
        value: f64,
    },
    /// The request named a handle outside the table.
    WrongHandle {
        request_id: u32,
        handle: InspectorHandle,
    },
    /// The inspector exists but is not in a state that admits the request.
    WrongState {
        request_id: u32,
        handle: InspectorHandle,
    },
    /// The request failed for another reason (unknown class, bad config).
    Error {
        request_id: u32,
        detail: String,
    },
}

/// Message on the analyzer's input queue.
///
/// `Eos` and `Channel` are produced by the capture callbacks and forwarded
/// to the output queue by the control thread; the rest come from callers.
pub enum ControlMsg {
    Halt,
    Inspector(InspectorRequest),
    Eos(EosInfo),
    Channel(ChannelUpdate),
    Throttle(ThrottleRequest),
    Params(Box<AnalyzerParams>),
    /// Halt acknowledgement from a worker thread.
    WorkerHalted(WorkerId),
}

/// Event on the analyzer's output queue.
pub enum AnalyzerEvent {
    SourceInit {
        status: InitStatus,
        detail: Option<String>,
    },
    Eos(EosInfo),
    Channel(ChannelUpdate),
    Psd(PsdFrame),
    Inspector(InspectorEvent),
    /// Refreshed source information after a slow-control completion.
    SourceInfo(SourceInfo),
    /// Halt acknowledgement.
    Halt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspector_config_typed_access() {
        let mut config = InspectorConfig::default();
        config.set("audio.cutoff", ConfigValue::Float(3000.0));
        config.set("audio.agc", ConfigValue::Bool(true));
        config.set("audio.taps", ConfigValue::Int(64));

        assert_eq!(config.get_float("audio.cutoff"), Some(3000.0));
        assert_eq!(config.get_float("audio.taps"), Some(64.0));
        assert_eq!(config.get_bool("audio.agc"), Some(true));
        assert_eq!(config.get_float("audio.agc"), None);
        assert_eq!(config.get_bool("missing"), None);
    }

    #[test]
    fn config_serializes_flat() {
        let mut config = InspectorConfig::default();
        config.set("fsk.bps", ConfigValue::Int(1200));
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(json.contains("fsk.bps"), "json was {json}");
        let back: InspectorConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.get_float("fsk.bps"), Some(1200.0));
    }
}
