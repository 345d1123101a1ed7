//! Audio backend seam and block re-chunking

use crate::error::SensorError;

/// Default sample rate requested from the input device
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default number of mono samples per delivered block
pub const DEFAULT_BLOCK_SIZE: usize = 1024;

/// Parameters for opening an audio input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRequest {
    /// Device name (None = default input device)
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Mono samples per block handed to the sink
    pub block_size: usize,
}

impl Default for AudioRequest {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// One block of mono samples delivered by a backend
#[derive(Debug, Clone, Copy)]
pub struct AudioBlock<'a> {
    pub samples: &'a [f32],
    /// Non-fatal condition reported alongside the block (overrun, stream error)
    pub status: Option<&'a str>,
}

impl<'a> AudioBlock<'a> {
    pub fn new(samples: &'a [f32]) -> Self {
        Self {
            samples,
            status: None,
        }
    }

    pub fn flagged(samples: &'a [f32], status: &'a str) -> Self {
        Self {
            samples,
            status: Some(status),
        }
    }
}

/// Push callback receiving every block from the device's delivery thread
pub type BlockSink = Box<dyn FnMut(AudioBlock<'_>) + Send + 'static>;

/// An open audio input. Delivery stops once closed.
pub trait AudioStream {
    /// Release the device. Called exactly once by the capture loop.
    fn close(&mut self);
}

/// Factory for audio inputs (hardware, simulated, or mock)
pub trait AudioBackend: Send + Sync {
    /// Human-readable backend name for logs
    fn name(&self) -> &str;

    /// Open the input described by `request` and start delivering blocks to `sink`
    fn open(&self, request: &AudioRequest, sink: BlockSink) -> Result<Box<dyn AudioStream>, SensorError>;
}

/// Re-chunks interleaved device buffers into fixed-size mono blocks.
///
/// Devices deliver whatever buffer size the driver picked; the breath filter
/// expects constant-size blocks.
#[derive(Debug)]
pub struct BlockAssembler {
    pending: Vec<f32>,
    block_size: usize,
    channels: usize,
}

impl BlockAssembler {
    pub fn new(block_size: usize, channels: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            pending: Vec::with_capacity(block_size),
            block_size,
            channels: channels.max(1),
        }
    }

    /// Append interleaved samples, calling `emit` for every completed block
    pub fn push<F>(&mut self, interleaved: &[f32], mut emit: F)
    where
        F: FnMut(&[f32]),
    {
        for frame in interleaved.chunks(self.channels) {
            let mono = frame.iter().sum::<f32>() / frame.len() as f32;
            self.pending.push(mono);

            if self.pending.len() == self.block_size {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }

    /// Samples buffered towards the next block
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
