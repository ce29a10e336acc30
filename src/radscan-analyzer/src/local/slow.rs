// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Slow-control path: mutators that touch hardware are coalesced under the
//! hot-config mutex and applied on the slow worker, off the caller thread
//! and off the capture loop. Completion publishes a refreshed source-info
//! snapshot on the output queue.

use std::sync::Arc;

use radscan_core::msg::{AnalyzerEvent, ControlMsg};

use crate::mq::MessageQueue;
use crate::worker::{TaskStatus, WorkerTask};

use super::Shared;

/// Latest requested value per setter; `None` means untouched. Repeated
/// calls before the slow worker runs overwrite in place.
#[derive(Default)]
pub(crate) struct SlowSettings {
    /// Device frequency (LNB already subtracted), Hz.
    pub freq_hz: Option<f64>,
    pub gains: Vec<(String, f64)>,
    pub antenna: Option<String>,
    pub bandwidth_hz: Option<f64>,
    pub ppm: Option<f64>,
    pub dc_remove: Option<bool>,
    pub agc: Option<bool>,
}

impl SlowSettings {
    fn is_empty(&self) -> bool {
        self.freq_hz.is_none()
            && self.gains.is_empty()
            && self.antenna.is_none()
            && self.bandwidth_hz.is_none()
            && self.ppm.is_none()
            && self.dc_remove.is_none()
            && self.agc.is_none()
    }
}

/// Guarded by the hot-config mutex (a leaf in the lock order).
#[derive(Default)]
pub(crate) struct HotConf {
    pub pending: SlowSettings,
    /// A slow task is already queued and will pick `pending` up.
    pub queued: bool,
}

/// Stage a mutation and make sure a slow task is queued to apply it.
pub(crate) fn submit(shared: &Arc<Shared>, mutate: impl FnOnce(&mut SlowSettings)) -> bool {
    let need_dispatch = {
        let mut hotconf = shared.hotconf.lock().expect("hotconf mutex");
        mutate(&mut hotconf.pending);
        if hotconf.queued {
            false
        } else {
            hotconf.queued = true;
            true
        }
    };

    if need_dispatch {
        let dispatched = shared
            .slow_wk
            .lock()
            .expect("slow worker")
            .push_task(SlowTask {
                shared: shared.clone(),
            });
        if !dispatched {
            shared.hotconf.lock().expect("hotconf mutex").queued = false;
            return false;
        }
    }
    true
}

struct SlowTask {
    shared: Arc<Shared>,
}

impl WorkerTask<ControlMsg> for SlowTask {
    fn run(&mut self, _mq_out: &Arc<MessageQueue<ControlMsg>>) -> TaskStatus {
        let shared = &self.shared;
        let settings = {
            let mut hotconf = shared.hotconf.lock().expect("hotconf mutex");
            hotconf.queued = false;
            std::mem::take(&mut hotconf.pending)
        };
        if settings.is_empty() {
            return TaskStatus::Done;
        }

        let source = &shared.source;
        if let Some(freq_hz) = settings.freq_hz {
            if let Err(error) = source.set_frequency(freq_hz) {
                tracing::warn!("set_frequency({:.0}) failed: {}", freq_hz, error);
            }
        }
        for (name, db) in &settings.gains {
            if let Err(error) = source.set_gain(name, *db) {
                tracing::warn!("set_gain({}, {:.1}) failed: {}", name, db, error);
            }
        }
        if let Some(antenna) = &settings.antenna {
            if let Err(error) = source.set_antenna(antenna) {
                tracing::warn!("set_antenna({}) failed: {}", antenna, error);
            }
        }
        if let Some(bw_hz) = settings.bandwidth_hz {
            if let Err(error) = source.set_bandwidth(bw_hz) {
                tracing::warn!("set_bandwidth({:.0}) failed: {}", bw_hz, error);
            }
        }
        if let Some(ppm) = settings.ppm {
            if let Err(error) = source.set_ppm(ppm) {
                tracing::warn!("set_ppm({:.2}) failed: {}", ppm, error);
            }
        }
        if let Some(enabled) = settings.dc_remove {
            if let Err(error) = source.set_dc_remove(enabled) {
                tracing::warn!("set_dc_remove({}) failed: {}", enabled, error);
            }
        }
        if let Some(enabled) = settings.agc {
            if let Err(error) = source.set_agc(enabled) {
                tracing::warn!("set_agc({}) failed: {}", enabled, error);
            }
        }

        // Refresh the cached info and tell the consumer what actually
        // stuck; hardware is free to have rounded or refused values.
        let fresh = source.info();
        let center_freq_hz = fresh.frequency_hz;
        {
            let mut cached = shared.source_info.lock().expect("source info mutex");
            *cached = fresh;
        }
        shared
            .loop_state
            .lock()
            .expect("loop mutex")
            .center_freq_hz = center_freq_hz;
        shared
            .mq_out
            .write(AnalyzerEvent::SourceInfo(shared.info_snapshot()));

        TaskStatus::Done
    }
}
