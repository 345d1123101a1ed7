//! System microphone input via cpal

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use parking_lot::Mutex;

use super::source::{AudioBackend, AudioBlock, AudioRequest, AudioStream, BlockAssembler, BlockSink};
use crate::error::SensorError;

/// Opens system input devices through the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }

    /// List available input devices
    pub fn list_devices() -> Vec<String> {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default()
    }

    /// Get the default input device name
    pub fn default_device_name() -> Option<String> {
        let host = cpal::default_host();
        host.default_input_device().and_then(|d| d.name().ok())
    }

    fn find_device(name: Option<&str>) -> Result<cpal::Device, SensorError> {
        let host = cpal::default_host();

        if let Some(name) = name {
            host.input_devices()
                .map_err(|e| SensorError::AudioDeviceUnavailable(format!("Failed to enumerate devices: {}", e)))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| SensorError::AudioDeviceUnavailable(format!("Device '{}' not found", name)))
        } else {
            host.default_input_device()
                .ok_or_else(|| SensorError::AudioDeviceUnavailable("No default input device".to_string()))
        }
    }
}

/// Callback-side state: re-blocks device buffers and forwards them to the sink
struct Delivery {
    assembler: BlockAssembler,
    sink: BlockSink,
    scratch: Vec<f32>,
    /// Stream error reported since the last emitted block
    pending_status: Option<String>,
}

impl Delivery {
    fn push<T>(&mut self, data: &[T])
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        self.scratch.clear();
        self.scratch.extend(data.iter().map(|&s| f32::from_sample(s)));

        let sink = &mut self.sink;
        let pending_status = &mut self.pending_status;
        self.assembler.push(&self.scratch, |samples| {
            let status = pending_status.take();
            let block = match status.as_deref() {
                Some(status) => AudioBlock::flagged(samples, status),
                None => AudioBlock::new(samples),
            };
            sink(block);
        });
    }
}

/// A playing cpal stream. Not `Send`: it lives and dies on the capture thread.
struct CpalStream {
    stream: Option<cpal::Stream>,
}

impl AudioStream for CpalStream {
    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    delivery: Arc<Mutex<Delivery>>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let err_delivery = Arc::clone(&delivery);
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            delivery.lock().push(data);
        },
        move |err| {
            tracing::warn!("Audio input error: {}", err);
            err_delivery.lock().pending_status = Some(err.to_string());
        },
        None,
    )
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&self, request: &AudioRequest, sink: BlockSink) -> Result<Box<dyn AudioStream>, SensorError> {
        let device = Self::find_device(request.device.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| SensorError::AudioDeviceUnavailable(format!("Failed to get input config: {}", e)))?;
        let sample_format = supported.sample_format();
        let channels = supported.channels();

        let delivery = Arc::new(Mutex::new(Delivery {
            assembler: BlockAssembler::new(request.block_size, channels as usize),
            sink,
            scratch: Vec::with_capacity(request.block_size * channels as usize),
            pending_status: None,
        }));

        let requested = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(request.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let build = |config: &cpal::StreamConfig| {
            let delivery = Arc::clone(&delivery);
            match sample_format {
                cpal::SampleFormat::F32 => build_stream::<f32>(&device, config, delivery).map_err(|e| e.to_string()),
                cpal::SampleFormat::I16 => build_stream::<i16>(&device, config, delivery).map_err(|e| e.to_string()),
                cpal::SampleFormat::U16 => build_stream::<u16>(&device, config, delivery).map_err(|e| e.to_string()),
                other => Err(format!("{:?}", other)),
            }
        };

        let stream = match build(&requested) {
            Ok(stream) => stream,
            Err(e) => {
                if !matches!(
                    sample_format,
                    cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::U16
                ) {
                    return Err(SensorError::UnsupportedFormat(e));
                }
                let fallback: cpal::StreamConfig = supported.config();
                tracing::warn!(
                    "{}Hz not accepted by '{}' ({}), using {}Hz",
                    request.sample_rate,
                    device_name,
                    e,
                    fallback.sample_rate.0
                );
                build(&fallback).map_err(|e| {
                    SensorError::AudioDeviceUnavailable(format!("Failed to build stream: {}", e))
                })?
            }
        };

        stream
            .play()
            .map_err(|e| SensorError::AudioDeviceUnavailable(format!("Failed to start stream: {}", e)))?;

        tracing::info!("Microphone opened: {} ({} channels)", device_name, channels);

        Ok(Box::new(CpalStream { stream: Some(stream) }))
    }
}
