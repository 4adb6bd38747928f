//! aural-probe - introspection and smoke-test CLI for the aural bridge
//!
//! Commands:
//! - `devices` (default): list every audio device across all hosts
//! - `hosts`: list available host APIs
//! - `tone [SECS]`: play a 440 Hz sine on the default output and report
//!   the measured callback CPU load

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use aural_core::{
    CpalEngine, Engine, Sample, SampleFormat, Stream, StreamFlow, StreamParams,
};

const TONE_HZ: f64 = 440.0;

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("devices") => list_devices(),
        Some("hosts") => list_hosts(),
        Some("tone") => {
            let secs = match args.get(1) {
                Some(raw) => raw
                    .parse::<f64>()
                    .with_context(|| format!("invalid duration: {}", raw))?,
                None => 2.0,
            };
            play_tone(secs)
        }
        Some(other) => {
            bail!("unknown command '{}' (expected devices, hosts, or tone)", other)
        }
    }
}

fn list_devices() -> Result<()> {
    let engine = CpalEngine::new()?;
    println!("{}", engine.version_text());

    let hosts = engine.host_apis()?;
    let devices = engine.devices()?;
    let default_input = engine.default_input_device()?;
    let default_output = engine.default_output_device()?;

    println!("{} devices across {} hosts:", devices.len(), hosts.len());
    for (index, device) in devices.iter().enumerate() {
        // The same identifier StreamParams accepts for device selection
        let label = device.id(&hosts).display_label();
        let mut markers = String::new();
        if default_input == Some(index) {
            markers.push_str(" [default in]");
        }
        if default_output == Some(index) {
            markers.push_str(" [default out]");
        }
        println!(
            "  {:3}  {}  (in: {}, out: {}, {} Hz, out latency {:.1}-{:.1} ms){}",
            index,
            label,
            device.max_input_channels,
            device.max_output_channels,
            device.default_sample_rate,
            device.default_low_output_latency * 1000.0,
            device.default_high_output_latency * 1000.0,
            markers,
        );
    }
    Ok(())
}

fn list_hosts() -> Result<()> {
    let engine = CpalEngine::new()?;
    let hosts = engine.host_apis()?;
    println!("{} host APIs ({} engine):", hosts.len(), engine.name());
    for host in &hosts {
        println!(
            "  {} ({}): {} devices, default in: {:?}, default out: {:?}",
            host.name,
            host.id,
            host.device_count,
            host.default_input_device,
            host.default_output_device,
        );
    }
    Ok(())
}

fn play_tone(secs: f64) -> Result<()> {
    if !secs.is_finite() || secs <= 0.0 {
        bail!("duration must be positive");
    }

    let engine = CpalEngine::new()?;
    let params = StreamParams::output_only(2)
        .with_sample_format(SampleFormat::F32)
        .with_frames_per_buffer(256);
    let sample_rate = params.sample_rate as f64;
    let channels = params.output_channels as usize;

    // Stop from inside the callback once enough frames have played
    let total_frames = (secs * sample_rate) as u64;
    let frames_done = Arc::new(AtomicU64::new(0));
    let frames_done_cb = frames_done.clone();

    let mut phase = 0.0f64;
    let step = TONE_HZ / sample_rate;

    let mut stream: Stream =
        Stream::open(&engine, &params, move |_input, output, _time, _flags| {
            for frame in output.chunks_mut(channels) {
                let value = (phase * std::f64::consts::TAU).sin() * 0.2;
                for s in frame.iter_mut() {
                    *s = Sample::Float(value);
                }
                phase = (phase + step).fract();
            }
            let frames = (output.len() / channels) as u64;
            let done = frames_done_cb.fetch_add(frames, Ordering::Relaxed) + frames;
            if done >= total_frames {
                StreamFlow::Complete
            } else {
                StreamFlow::Continue
            }
        })?;

    log::info!("Playing {:.0} Hz tone for {:.1}s", TONE_HZ, secs);
    stream.start()?;

    while stream.is_active()? {
        std::thread::sleep(Duration::from_millis(50));
    }
    // Let the final buffer play out
    std::thread::sleep(Duration::from_millis(100));

    println!(
        "Done. Stream time {:.2}s, callback CPU load {:.1}%",
        stream.time(),
        stream.cpu_load() * 100.0
    );
    stream.stop()?;
    stream.close()?;
    Ok(())
}
