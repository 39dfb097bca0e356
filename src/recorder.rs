use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

use crate::error::CaptureError;

/// Result of the one-time microphone probe performed at startup.
#[derive(Debug, Clone)]
pub enum MicCapability {
    Supported,
    Unsupported(String),
}

/// Probe for a usable input device. Called once at construction; call sites
/// branch on the stored result instead of re-probing.
pub fn detect_capability() -> MicCapability {
    let host = cpal::default_host();
    match host.default_input_device() {
        Some(device) => {
            log::info!("Input device: {:?}", device.description());
            MicCapability::Supported
        }
        None => MicCapability::Unsupported("no audio input device found".into()),
    }
}

/// Start capturing audio from the default input device.
/// Samples are appended to the shared buffer at ~16kHz mono f32.
/// Drop the returned `Stream` to release the microphone.
pub fn start_capture(
    buffer: Arc<Mutex<Vec<f32>>>,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::DeviceUnavailable("no input device found".into()))?;

    let supported_configs: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| classify(&e.to_string()))?
        .collect();

    // Try to find a config that supports 16kHz mono
    let target_rate: u32 = 16000;
    let desired = supported_configs.iter().find(|c| {
        c.channels() == 1
            && c.min_sample_rate() <= target_rate
            && c.max_sample_rate() >= target_rate
            && c.sample_format() == cpal::SampleFormat::F32
    });

    let (config, native_rate, downsample_factor) = if let Some(cfg) = desired {
        let config = cfg.with_sample_rate(target_rate).config();
        (config, 16000u32, 1usize)
    } else {
        // Fall back to default config, downsample later
        let default_config = device
            .default_input_config()
            .map_err(|e| classify(&e.to_string()))?;
        let rate = default_config.sample_rate();
        let factor = (rate / 16000).max(1) as usize;
        let actual_rate = rate / factor as u32;
        log::info!(
            "Using native rate {rate}Hz, downsampling by {factor}x to ~{actual_rate}Hz"
        );
        (default_config.config(), actual_rate, factor)
    };

    let channels = config.channels as usize;

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut buf = buffer.lock().unwrap();
                for (i, chunk) in data.chunks(channels).enumerate() {
                    if i % downsample_factor == 0 {
                        let mono = chunk.iter().sum::<f32>() / channels as f32;
                        buf.push(mono);
                    }
                }
            },
            |err| log::error!("Input stream error: {err}"),
            None,
        )
        .map_err(classify_build_error)?;

    stream.play().map_err(|e| CaptureError::Stream(e.to_string()))?;
    Ok((stream, native_rate))
}

fn classify_build_error(e: cpal::BuildStreamError) -> CaptureError {
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("device disappeared".into())
        }
        other => classify(&other.to_string()),
    }
}

/// Hosts report access problems inconsistently; a denied microphone usually
/// surfaces as a backend-specific message rather than a dedicated variant.
fn classify(message: &str) -> CaptureError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("denied") || lower.contains("permission") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::DeviceUnavailable(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_messages_classify_as_permission_errors() {
        assert!(matches!(
            classify("Access denied by the OS"),
            CaptureError::PermissionDenied
        ));
        assert!(matches!(
            classify("insufficient permission for capture"),
            CaptureError::PermissionDenied
        ));
        assert!(matches!(
            classify("device is busy"),
            CaptureError::DeviceUnavailable(_)
        ));
    }
}
