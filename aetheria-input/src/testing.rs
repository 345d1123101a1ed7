//! Mock devices that record open and close calls

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use image::RgbImage;
use parking_lot::Mutex;

use crate::audio::{AudioBackend, AudioBlock, AudioRequest, AudioStream, BlockSink};
use crate::camera::{VideoBackend, VideoSource};
use crate::error::SensorError;

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

struct MicInner {
    unavailable: bool,
    opens: AtomicUsize,
    closes: AtomicUsize,
    sink_tx: Sender<MockSink>,
    sink_rx: Receiver<MockSink>,
}

/// Audio backend whose blocks are pushed by the test
#[derive(Clone)]
pub struct MockMicrophone {
    inner: Arc<MicInner>,
}

impl MockMicrophone {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn unavailable() -> Self {
        Self::build(true)
    }

    fn build(unavailable: bool) -> Self {
        let (sink_tx, sink_rx) = crossbeam_channel::unbounded();
        Self {
            inner: Arc::new(MicInner {
                unavailable,
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                sink_tx,
                sink_rx,
            }),
        }
    }

    /// Wait for the next successful `open` and return its delivery handle
    pub fn wait_for_sink(&self, timeout: Duration) -> Option<MockSink> {
        self.inner.sink_rx.recv_timeout(timeout).ok()
    }

    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }
}

/// Delivers blocks to the sink registered by the capture loop
#[derive(Clone)]
pub struct MockSink(Arc<Mutex<BlockSink>>);

impl MockSink {
    pub fn deliver(&self, samples: &[f32]) {
        let mut sink = self.0.lock();
        (*sink)(AudioBlock::new(samples));
    }
}

struct MockMicStream {
    inner: Arc<MicInner>,
}

impl AudioStream for MockMicStream {
    fn close(&mut self) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioBackend for MockMicrophone {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&self, _request: &AudioRequest, sink: BlockSink) -> Result<Box<dyn AudioStream>, SensorError> {
        if self.inner.unavailable {
            return Err(SensorError::AudioDeviceUnavailable("mock device missing".to_string()));
        }
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        let _ = self.inner.sink_tx.send(MockSink(Arc::new(Mutex::new(sink))));
        Ok(Box::new(MockMicStream {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct CameraInner {
    unavailable: bool,
    opens: AtomicUsize,
    releases: AtomicUsize,
    failed_reads: AtomicUsize,
    frame_tx: Sender<RgbImage>,
    frame_rx: Receiver<RgbImage>,
}

/// Video backend whose frames are queued by the test
#[derive(Clone)]
pub struct MockCamera {
    inner: Arc<CameraInner>,
}

impl MockCamera {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn unavailable() -> Self {
        Self::build(true)
    }

    fn build(unavailable: bool) -> Self {
        let (frame_tx, frame_rx) = crossbeam_channel::unbounded();
        Self {
            inner: Arc::new(CameraInner {
                unavailable,
                opens: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                failed_reads: AtomicUsize::new(0),
                frame_tx,
                frame_rx,
            }),
        }
    }

    /// Queue a frame for the next read
    pub fn push_frame(&self, frame: RgbImage) {
        let _ = self.inner.frame_tx.send(frame);
    }

    /// Frames queued but not yet read
    pub fn queued(&self) -> usize {
        self.inner.frame_rx.len()
    }

    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.inner.releases.load(Ordering::SeqCst)
    }

    pub fn failed_reads(&self) -> usize {
        self.inner.failed_reads.load(Ordering::SeqCst)
    }
}

struct MockCameraSource {
    inner: Arc<CameraInner>,
}

impl VideoSource for MockCameraSource {
    fn read_frame(&mut self) -> Result<RgbImage, SensorError> {
        match self.inner.frame_rx.recv_timeout(Duration::from_millis(5)) {
            Ok(frame) => Ok(frame),
            Err(_) => {
                self.inner.failed_reads.fetch_add(1, Ordering::SeqCst);
                Err(SensorError::FrameRead("no frame queued".to_string()))
            }
        }
    }

    fn release(&mut self) {
        self.inner.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl VideoBackend for MockCamera {
    fn name(&self) -> &str {
        "mock"
    }

    fn open(&self, index: u32) -> Result<Box<dyn VideoSource>, SensorError> {
        if self.inner.unavailable {
            return Err(SensorError::CameraUnavailable {
                index,
                reason: "mock camera missing".to_string(),
            });
        }
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockCameraSource {
            inner: Arc::clone(&self.inner),
        }))
    }
}
