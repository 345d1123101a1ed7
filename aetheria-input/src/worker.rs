//! Named background thread with cooperative stop and bounded join

use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::SensorError;

/// How long `start` waits for a stopped loop to release its device
pub const RESTART_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to an acquisition thread.
///
/// The thread body receives a stop receiver: it is signalled by
/// [`Worker::signal_stop`] and disconnects when the handle is dropped. The
/// thread holds the sending half of a completion channel, so its exit can be
/// awaited with a timeout even though `JoinHandle::join` cannot.
pub struct Worker {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
}

impl Worker {
    /// Spawn `body` on a thread called `name`.
    pub fn spawn<F>(name: &'static str, body: F) -> Result<Self, SensorError>
    where
        F: FnOnce(Receiver<()>) + Send + 'static,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // Dropped when the body returns or unwinds
                let _done = done_tx;
                body(stop_rx);
            })
            .map_err(|source| SensorError::ThreadSpawn { name, source })?;

        Ok(Self {
            name,
            handle: Some(handle),
            stop_tx: Some(stop_tx),
            done_rx,
        })
    }

    /// Ask the thread to exit at its next iteration boundary. Never blocks.
    pub fn signal_stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
    }

    /// Whether the thread body has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait up to `timeout` for the thread to exit, then join it.
    ///
    /// Returns `false` if the thread is still running (for example blocked
    /// inside a device read); the handle is kept so a later call can retry.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        match self.done_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("{} thread did not exit within {:?}", self.name, timeout);
                self.handle = Some(handle);
                false
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    tracing::error!("{} thread panicked", self.name);
                }
                true
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.signal_stop();
    }
}
