//! Drives a `Coordinator` the way an interception hook would: two concurrent
//! sessions fed with synthetic tones, plus a burst for a source nobody is
//! recording.
//!
//! Usage: `hook-capture-demo [config.json]`. Set `RUST_LOG=info` (or `debug`)
//! to see the lifecycle.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hook_capture_core::{
    CaptureConfiguration, CaptureDelegate, CaptureError, Coordinator, CoordinatorState, FrameDelivery,
    SessionRecord,
};

/// Prints finished sessions as their JSON sidecar would look.
struct PrintingDelegate;

impl CaptureDelegate for PrintingDelegate {
    fn on_state_changed(&self, state: CoordinatorState) {
        log::info!("coordinator is {}", state.name());
    }

    fn on_session_finished(&self, record: &SessionRecord) {
        match serde_json::to_string_pretty(record) {
            Ok(json) => println!("{}", json),
            Err(e) => log::warn!("cannot print record for {}: {}", record.id, e),
        }
    }

    fn on_error(&self, error: &CaptureError) {
        log::error!("capture error: {}", error);
    }
}

/// One chunk of a 16-bit mono sine tone.
fn tone(frequency: f64, sample_rate: u32, samples: usize, phase: usize) -> Vec<u8> {
    (0..samples)
        .flat_map(|i| {
            let t = (phase + i) as f64 / f64::from(sample_rate);
            let sample = (f64::from(i16::MAX) * 0.5 * (2.0 * std::f64::consts::PI * frequency * t).sin()) as i16;
            sample.to_le_bytes()
        })
        .collect()
}

fn load_config() -> Result<CaptureConfiguration, CaptureError> {
    match env::args_os().nth(1) {
        Some(path) => CaptureConfiguration::from_json_file(&PathBuf::from(path)),
        None => Ok(CaptureConfiguration::default()),
    }
}

fn run() -> Result<(), CaptureError> {
    let config = load_config()?;
    let sample_rate = config.sample_rate;
    let chunk_samples = config.read_chunk_bytes / config.bytes_per_sample().max(1);

    let mut coordinator = Coordinator::new(config);
    coordinator.set_delegate(Arc::new(PrintingDelegate));
    coordinator.initialize()?;

    let sessions: Vec<_> = [("call-left", 440.0), ("call-right", 660.0)]
        .into_iter()
        .filter_map(|(source, frequency)| coordinator.on_session_start(source).map(|id| (id, source, frequency)))
        .collect();

    for round in 0..20 {
        for (_, source, frequency) in &sessions {
            let chunk = tone(*frequency, sample_rate, chunk_samples, round * chunk_samples);
            coordinator.on_frame_captured(&chunk, 0, chunk.len(), source);
        }
        let stray = tone(220.0, sample_rate, 64, round * 64);
        if coordinator.on_frame_captured(&stray, 0, stray.len(), "notification") == FrameDelivery::Dropped {
            log::warn!("stray frame dropped");
        }
        thread::sleep(Duration::from_millis(10));
    }

    for summary in coordinator.list_sessions() {
        log::info!(
            "{} from {}: {} bytes, {} frames, {:.2}s",
            summary.id,
            summary.source,
            summary.sink_size,
            summary.frames_captured,
            summary.elapsed.as_secs_f64()
        );
    }

    for (id, _, _) in &sessions {
        coordinator.on_session_stop(id);
    }
    let stats = coordinator.stats();
    coordinator.shutdown();

    log::info!(
        "processed {} frames ({} persisted, {} failed, {} dropped, {} lost by slow sessions)",
        stats.processed,
        stats.persisted,
        stats.stage_failures,
        stats.dropped,
        stats.feed_dropped
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("demo failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
