//! WAV helpers for the 16 kHz mono 16-bit chunks the capture stage produces.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::VadError;

pub const SAMPLE_RATE: u32 = 16_000;

fn check_spec(spec: &WavSpec) -> Result<(), VadError> {
    if spec.channels != 1 {
        return Err(VadError::Format(format!("expected mono, got {} channels", spec.channels)));
    }
    if spec.bits_per_sample != 16 || spec.sample_format != SampleFormat::Int {
        return Err(VadError::Format(format!(
            "expected 16-bit PCM, got {}-bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }
    Ok(())
}

/// Read a whole mono 16-bit file. Returns the samples and the sample rate.
pub fn read_mono(path: &Path) -> Result<(Vec<i16>, u32), VadError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    check_spec(&spec)?;
    let samples = reader.samples::<i16>().collect::<Result<Vec<_>, _>>()?;
    Ok((samples, spec.sample_rate))
}

/// Read the samples between `start_s` and `end_s`.
pub fn read_range(path: &Path, start_s: f64, end_s: f64) -> Result<Vec<i16>, VadError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    check_spec(&spec)?;

    let rate = f64::from(spec.sample_rate);
    let total = reader.len();
    let start = ((start_s.max(0.0) * rate) as u32).min(total);
    let end = ((end_s.max(0.0) * rate) as u32).min(total);
    if end <= start {
        return Ok(Vec::new());
    }

    reader.seek(start)?;
    reader
        .samples::<i16>()
        .take((end - start) as usize)
        .collect::<Result<Vec<_>, _>>()
        .map_err(VadError::from)
}

/// Write samples as a 16 kHz mono 16-bit WAV, the same format capture emits.
pub fn write_mono(path: &Path, samples: &[i16]) -> Result<(), VadError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
