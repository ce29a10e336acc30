// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Inspector command parser, run on the control thread.
//!
//! OPEN creates the table entry, opens the tuner channel and binds the
//! scheduler task before the acknowledgement goes out, so the next capture
//! cycle already feeds the inspector. CLOSE only flips the state; the
//! capture path unbinds the channel at its next delivery attempt.

use std::sync::Arc;

use radscan_core::msg::{
    AnalyzerEvent, InspectorConfig, InspectorEvent, InspectorHandle, InspectorRequest,
    InspectorRequestKind,
};
use radscan_dsp::TunerChannelParams;
use tokio::sync::broadcast;

use crate::inspector::{class_names, make_inspector, InspectorContext, InspectorState};
use crate::sched::TaskInfo;
use crate::table::InspectorEntry;

use super::{Shared, GUARD_BAND_PROPORTION};

pub(crate) fn handle_inspector_request(shared: &Arc<Shared>, request: InspectorRequest) {
    let request_id = request.request_id;
    match request.kind {
        InspectorRequestKind::Open {
            class,
            fc_hz,
            bw_hz,
            precise,
            pcm,
        } => open(shared, request_id, &class, fc_hz, bw_hz, precise, pcm),
        InspectorRequestKind::Close { handle } => close(shared, request_id, handle),
        InspectorRequestKind::SetConfig { handle, config } => {
            set_config(shared, request_id, handle, &config)
        }
    }
}

fn emit(shared: &Shared, event: InspectorEvent) {
    shared.mq_out.write(AnalyzerEvent::Inspector(event));
}

fn open(
    shared: &Arc<Shared>,
    request_id: u32,
    class: &str,
    fc_hz: f64,
    bw_hz: f64,
    precise: bool,
    pcm: Option<broadcast::Sender<Vec<f32>>>,
) {
    // Class names are static; resolve the borrowed name up front.
    let Some(class_name) = class_names().iter().copied().find(|n| *n == class) else {
        tracing::warn!("open request for unknown inspector class `{}'", class);
        emit(
            shared,
            InspectorEvent::Error {
                request_id,
                detail: format!("unknown inspector class: {class}"),
            },
        );
        return;
    };

    let samp_rate = shared.effective_samp_rate() as f64;
    let params = TunerChannelParams {
        f0_norm: (fc_hz / samp_rate).clamp(-0.5, 0.5),
        bw_norm: (bw_hz / samp_rate).clamp(1e-6, 1.0),
        guard: GUARD_BAND_PROPORTION,
        precise,
    };

    // Lock order: inspector list, then sched.
    let mut table = shared.inspectors.lock().expect("inspector list mutex");
    let mut sched_state = shared.sched_state.lock().expect("sched lock");

    let channel = sched_state.tuner.open_channel(params);
    let decimation = sched_state.tuner.decimation(channel).unwrap_or(1);
    let channel_samp_rate = samp_rate / decimation as f64;

    let ctx = InspectorContext {
        channel_samp_rate,
        bw_hz,
        pcm,
    };
    let Some(inner) = make_inspector(class_name, &ctx) else {
        sched_state.tuner.close_channel(channel);
        emit(
            shared,
            InspectorEvent::Error {
                request_id,
                detail: format!("inspector construction failed: {class_name}"),
            },
        );
        return;
    };

    let handle = table.next_handle();
    let entry = Arc::new(InspectorEntry::new(
        handle,
        class_name,
        channel_samp_rate,
        inner,
    ));
    *entry.channel.lock().expect("inspector channel") = Some(channel);
    table.insert(entry.clone());

    sched_state
        .tasks
        .insert(channel, Arc::new(TaskInfo::new(entry.clone(), channel)));

    // Task registered and bound; the inspector is actually running now.
    entry.set_state(InspectorState::Running);

    drop(sched_state);
    drop(table);

    tracing::info!(
        "inspector {} (`{}') opened at {:+.0} Hz / {:.0} Hz wide, channel rate {:.0} sps",
        handle,
        class_name,
        fc_hz,
        bw_hz,
        channel_samp_rate
    );
    emit(
        shared,
        InspectorEvent::Opened {
            request_id,
            handle,
            class: class_name.to_string(),
            channel_samp_rate,
        },
    );
}

fn close(shared: &Arc<Shared>, request_id: u32, handle: InspectorHandle) {
    let table = shared.inspectors.lock().expect("inspector list mutex");
    let Some(entry) = table.get(handle) else {
        emit(shared, InspectorEvent::WrongHandle { request_id, handle });
        return;
    };

    match entry.state() {
        InspectorState::Init | InspectorState::Running => {
            // The scheduler observes the state change and releases the
            // channel binding from the capture path; no separate unbind.
            entry.set_state(InspectorState::Halted);
            drop(table);
            tracing::info!("inspector {} closed", handle);
            emit(shared, InspectorEvent::Closed { request_id, handle });
        }
        InspectorState::Halted => {
            emit(shared, InspectorEvent::WrongState { request_id, handle });
        }
    }
}

fn set_config(
    shared: &Arc<Shared>,
    request_id: u32,
    handle: InspectorHandle,
    config: &InspectorConfig,
) {
    let table = shared.inspectors.lock().expect("inspector list mutex");
    let Some(entry) = table.get(handle) else {
        emit(shared, InspectorEvent::WrongHandle { request_id, handle });
        return;
    };
    if entry.state() == InspectorState::Halted {
        emit(shared, InspectorEvent::WrongState { request_id, handle });
        return;
    }

    let result = entry
        .inner
        .lock()
        .expect("inspector mutex")
        .set_config(config);
    drop(table);

    match result {
        Ok(()) => emit(shared, InspectorEvent::ConfigUpdated { request_id, handle }),
        Err(detail) => emit(shared, InspectorEvent::Error { request_id, detail }),
    }
}
