//! Compare two WAV recordings through the full session pipeline.
//!
//! Usage: `matchcheck <master.wav> <user.wav> [chunk_samples]`
//!
//! Loads both files, builds a master bundle from the first, streams the
//! second through a session in chunks, and prints the finalized result and
//! telemetry as JSON.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};

use callmatch::{MasterBundle, RegistryConfig, SessionConfig, SessionRegistry};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let master_path = args
        .next()
        .map(PathBuf::from)
        .context("usage: matchcheck <master.wav> <user.wav> [chunk_samples]")?;
    let user_path = args
        .next()
        .map(PathBuf::from)
        .context("usage: matchcheck <master.wav> <user.wav> [chunk_samples]")?;
    let chunk_samples: usize = args
        .next()
        .map(|s| s.parse())
        .transpose()
        .context("chunk_samples must be an integer")?
        .unwrap_or(4096);

    let (master_pcm, master_rate) = read_wav_mono(&master_path)?;
    let (user_pcm, user_rate) = read_wav_mono(&user_path)?;
    if master_rate != user_rate {
        bail!(
            "sample rate mismatch: master {} Hz vs user {} Hz",
            master_rate,
            user_rate
        );
    }

    let config = SessionConfig {
        sample_rate: master_rate,
        ..SessionConfig::default()
    };
    let master = MasterBundle::from_pcm(&master_pcm, &config)
        .with_context(|| format!("failed to extract master features from '{}'", master_path.display()))?;
    eprintln!(
        "master: {:.2}s, {} feature frames, median f0 {:?}",
        master.duration_seconds(),
        master.features().len(),
        master.stats().median_f0_hz
    );

    let registry = SessionRegistry::new(RegistryConfig::default());
    let desc = registry.create(master, config)?;
    registry.start(&desc.session_id)?;
    for chunk in user_pcm.chunks(chunk_samples) {
        registry.append(&desc.session_id, chunk)?;
    }
    let result = registry.finalize(&desc.session_id)?;
    let snapshot = registry.get(&desc.session_id)?;
    registry.destroy(&desc.session_id)?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    eprintln!(
        "telemetry: {}",
        serde_json::to_string_pretty(&snapshot.metrics)?
    );
    Ok(())
}

/// Read a WAV file as mono f32 samples, averaging channels.
fn read_wav_mono(path: &PathBuf) -> Result<(Vec<f32>, u32)> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open WAV '{}'", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, bits @ (24 | 32)) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
        (format, bits) => bail!("unsupported WAV format: {:?} {} bits", format, bits),
    };

    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}
