//! Microphone capture and breath envelope
//!
//! A backend pushes fixed-size mono blocks from its delivery thread; each
//! block runs through the noise-gated RMS envelope in [`BreathFilter`] and the
//! result is published for lock-free reads.

mod breath;
mod capture;
mod simulated;
mod source;
#[cfg(feature = "microphone")]
mod system_input;

// Re-export public API
pub use breath::{rms, BreathFilter, BreathFilterConfig};
pub use capture::{AudioCapture, BreathState, DEFAULT_BREATH_MULTIPLIER};
pub use simulated::SimulatedMicrophone;
pub use source::{
    AudioBackend, AudioBlock, AudioRequest, AudioStream, BlockAssembler, BlockSink, DEFAULT_BLOCK_SIZE,
    DEFAULT_SAMPLE_RATE,
};
#[cfg(feature = "microphone")]
pub use system_input::CpalBackend;
