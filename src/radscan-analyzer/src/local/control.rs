// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The control thread: the central multiplexer between capture events and
//! slow-control messages on the analyzer's input queue.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use radscan_core::config::AnalyzerMode;
use radscan_core::msg::{AnalyzerEvent, ControlMsg, InitStatus, ThrottleRequest};

use crate::state::AnalyzerState;

use super::inspmsg::handle_inspector_request;
use super::{ChannelCaptureTask, Shared, WideCaptureTask};

pub(crate) fn control_thread(shared: Arc<Shared>) {
    // Initial push of the capture callback onto the source worker.
    let pushed = {
        let worker = shared.source_wk.lock().expect("source worker");
        match shared.mode {
            AnalyzerMode::Channel => worker.push_task(ChannelCaptureTask::new(shared.clone())),
            AnalyzerMode::WideSpectrum => worker.push_task(WideCaptureTask::new(shared.clone())),
        }
    };
    if !pushed {
        shared.mq_out.write(AnalyzerEvent::SourceInit {
            status: InitStatus::Failure,
            detail: Some("failed to push source callback to worker".to_string()),
        });
        finish(&shared, false);
        return;
    }

    shared.state.advance(AnalyzerState::Running);
    shared.mq_out.write(AnalyzerEvent::SourceInit {
        status: InitStatus::Success,
        detail: None,
    });

    let mut halt_acked = false;

    'outer: loop {
        // First read blocks; then pop until the queue is empty before
        // going back to sleep.
        let mut msg = shared.mq_in.read();
        loop {
            match msg {
                ControlMsg::Halt => {
                    shared.ack_halt();
                    halt_acked = true;
                    break 'outer;
                }

                ControlMsg::Inspector(request) => {
                    // The parser owns the payload from here on; replies go
                    // straight to the output queue.
                    handle_inspector_request(&shared, request);
                }

                // Capture-side notifications are forwarded; ownership moves
                // to the output queue.
                ControlMsg::Eos(info) => {
                    tracing::info!("end of stream{}", match &info.detail {
                        Some(detail) => format!(": {detail}"),
                        None => String::new(),
                    });
                    shared.state.advance(AnalyzerState::Stopping);
                    shared.mq_out.write(AnalyzerEvent::Eos(info));
                }
                ControlMsg::Channel(update) => {
                    shared.mq_out.write(AnalyzerEvent::Channel(update));
                }

                ControlMsg::Throttle(request) => handle_throttle(&shared, request),

                ControlMsg::Params(params) => handle_params(&shared, &params),

                ControlMsg::WorkerHalted(id) => {
                    tracing::debug!("stray worker-halted ack from {:?}", id);
                }
            }

            match shared.mq_in.poll() {
                Some(next) => msg = next,
                None => break,
            }
        }
    }

    finish(&shared, halt_acked);
}

fn finish(shared: &Arc<Shared>, halt_acked: bool) {
    if shared.source.is_capturing() {
        shared.source.cancel();
    }
    if !halt_acked {
        shared.wait_for_halt();
    }
    shared.running.store(false, Ordering::Release);
    shared.state.advance(AnalyzerState::Stopping);
}

fn handle_throttle(shared: &Arc<Shared>, request: ThrottleRequest) {
    let rate = if request.samp_rate == 0 {
        shared.source_samp_rate()
    } else {
        request.samp_rate
    };
    shared
        .throttle
        .lock()
        .expect("throttle mutex")
        .reset(rate);
    shared.effective_samp_rate.store(rate, Ordering::Release);
    tracing::debug!("throttle set to {} sps", rate);
}

fn handle_params(shared: &Arc<Shared>, params: &radscan_core::AnalyzerParams) {
    let mut loop_state = shared.loop_state.lock().expect("loop mutex");

    // Only a subset of the detector template may change at runtime.
    let mut det_params = loop_state.detector.params().clone();
    det_params.window_size = params.detector.window_size;
    det_params.window = params.detector.window;
    det_params.fc = params.detector.fc;
    Shared::readjust_detector(&mut loop_state, det_params);

    loop_state.interval_channels = params.channel_update_int;

    if (loop_state.interval_psd - params.psd_update_int).abs() > 1e-6 {
        loop_state.interval_psd = params.psd_update_int;
        loop_state.psd_frames = 0;
        loop_state.last_psd = Instant::now();
    }
}
