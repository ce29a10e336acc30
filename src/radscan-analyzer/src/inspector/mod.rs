// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-channel inspectors: demodulation/measurement units fed by the
//! scheduler with extracted channel samples.
//!
//! Inspector classes are looked up by name in a process-wide registry,
//! built once on first use. Built-in classes: `power` (mean power
//! reports), `audio` (demodulated PCM + level), `baud` (cyclic
//! autocorrelation baud estimate).

mod audio;
mod baud;
mod power;

use std::sync::OnceLock;

use radscan_core::msg::InspectorConfig;
use radscan_core::Sample;
use tokio::sync::broadcast;

pub use audio::AudioInspector;
pub use baud::BaudInspector;
pub use power::PowerInspector;

/// Lifecycle state of an inspector table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InspectorState {
    Init = 0,
    Running = 1,
    Halted = 2,
}

impl InspectorState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Halted,
            _ => Self::Init,
        }
    }
}

/// Everything an inspector needs to configure itself at open time.
pub struct InspectorContext {
    /// Sample rate of the extracted channel stream, samples/s.
    pub channel_samp_rate: f64,
    /// Channel bandwidth requested at open, Hz.
    pub bw_hz: f64,
    /// Sink for demodulated PCM; the caller keeps the sender.
    pub pcm: Option<broadcast::Sender<Vec<f32>>>,
}

/// Measurement sink: `(name, value)` pairs become `Signal` events stamped
/// with the inspector handle by the scheduler.
pub type SignalSink<'a> = dyn FnMut(&'static str, f64) + 'a;

/// A demodulator/measurement unit bound to one tuner channel.
pub trait Inspector: Send {
    fn class(&self) -> &'static str;

    /// Consume one block of extracted channel samples.
    fn feed(&mut self, samples: &[Sample], sink: &mut SignalSink);

    /// Apply a parameter update in place.
    fn set_config(&mut self, config: &InspectorConfig) -> Result<(), String>;
}

type InspectorFactory = fn(&InspectorContext) -> Box<dyn Inspector>;

struct InspectorClass {
    name: &'static str,
    make: InspectorFactory,
}

fn registry() -> &'static [InspectorClass] {
    static REGISTRY: OnceLock<Vec<InspectorClass>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        vec![
            InspectorClass {
                name: "power",
                make: |ctx| Box::new(PowerInspector::new(ctx)),
            },
            InspectorClass {
                name: "audio",
                make: |ctx| Box::new(AudioInspector::new(ctx)),
            },
            InspectorClass {
                name: "baud",
                make: |ctx| Box::new(BaudInspector::new(ctx)),
            },
        ]
    })
}

/// Instantiate an inspector of the named class, if it exists.
pub fn make_inspector(class: &str, ctx: &InspectorContext) -> Option<Box<dyn Inspector>> {
    registry()
        .iter()
        .find(|c| c.name == class)
        .map(|c| (c.make)(ctx))
}

/// Names of all registered inspector classes.
pub fn class_names() -> Vec<&'static str> {
    registry().iter().map(|c| c.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> InspectorContext {
        InspectorContext {
            channel_samp_rate: 48_000.0,
            bw_hz: 12_000.0,
            pcm: None,
        }
    }

    #[test]
    fn registry_builds_known_classes() {
        for name in ["power", "audio", "baud"] {
            let insp = make_inspector(name, &ctx()).unwrap_or_else(|| panic!("class {name}"));
            assert_eq!(insp.class(), name);
        }
        assert!(make_inspector("psk", &ctx()).is_none());
    }

    #[test]
    fn class_names_stable() {
        assert_eq!(class_names(), vec!["power", "audio", "baud"]);
    }
}
