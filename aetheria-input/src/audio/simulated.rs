//! Synthetic microphone for running without audio hardware

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rand::Rng;

use super::source::{AudioBackend, AudioBlock, AudioRequest, AudioStream, BlockSink};
use crate::error::SensorError;

/// Produces a noise floor with periodic breath-like bursts at real-time cadence
#[derive(Debug, Clone)]
pub struct SimulatedMicrophone {
    /// Peak amplitude of the burst tone
    pub breath_amplitude: f32,
    /// Amplitude of the uniform noise floor
    pub noise_amplitude: f32,
    /// Full cycle length (burst + rest)
    pub period: Duration,
    /// Length of the burst within each cycle
    pub breath_length: Duration,
}

impl Default for SimulatedMicrophone {
    fn default() -> Self {
        Self {
            breath_amplitude: 0.5,
            noise_amplitude: 0.02,
            period: Duration::from_secs(5),
            breath_length: Duration::from_secs(2),
        }
    }
}

impl SimulatedMicrophone {
    /// Breath envelope at `elapsed` seconds into the run (0.0 - 1.0)
    fn envelope(&self, elapsed: f32) -> f32 {
        let period = self.period.as_secs_f32().max(0.001);
        let length = self.breath_length.as_secs_f32().min(period);
        let phase = elapsed % period;
        if phase >= length || length <= 0.0 {
            return 0.0;
        }
        (std::f32::consts::PI * phase / length).sin()
    }
}

struct SimulatedStream {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AudioStream for SimulatedStream {
    fn close(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl AudioBackend for SimulatedMicrophone {
    fn name(&self) -> &str {
        "simulated"
    }

    fn open(&self, request: &AudioRequest, mut sink: BlockSink) -> Result<Box<dyn AudioStream>, SensorError> {
        if request.sample_rate == 0 || request.block_size == 0 {
            return Err(SensorError::AudioDeviceUnavailable(format!(
                "Invalid stream parameters {}Hz / {} samples",
                request.sample_rate, request.block_size
            )));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let mic = self.clone();
        let sample_rate = request.sample_rate;
        let block_size = request.block_size;
        let block_period = Duration::from_secs_f64(block_size as f64 / sample_rate as f64);

        let handle = std::thread::Builder::new()
            .name("simulated-mic".to_string())
            .spawn(move || {
                let mut rng = rand::rng();
                let mut block = vec![0.0f32; block_size];
                let start = Instant::now();
                let mut next_block = start;
                let mut sample_index: u64 = 0;

                while !stop_flag.load(Ordering::Acquire) {
                    for sample in block.iter_mut() {
                        let t = sample_index as f32 / sample_rate as f32;
                        let tone = (2.0 * std::f32::consts::PI * 180.0 * t).sin();
                        let noise = rng.random_range(-1.0f32..1.0) * mic.noise_amplitude;
                        *sample = mic.envelope(t) * mic.breath_amplitude * tone + noise;
                        sample_index += 1;
                    }
                    sink(AudioBlock::new(&block));

                    next_block += block_period;
                    let now = Instant::now();
                    if next_block > now {
                        std::thread::sleep(next_block - now);
                    }
                }
            })
            .map_err(|e| SensorError::AudioDeviceUnavailable(format!("Failed to spawn simulator: {}", e)))?;

        tracing::info!("Simulated microphone opened ({}Hz, {} samples/block)", sample_rate, block_size);

        Ok(Box::new(SimulatedStream {
            stop,
            handle: Some(handle),
        }))
    }
}
