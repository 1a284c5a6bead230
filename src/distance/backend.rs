//! Compute device for pairwise distances.
//!
//! The device owns a rayon pool sized from the parallelism hint and a byte
//! ledger of resident buffers. A [`DeviceBuffer`] releases its bytes when
//! dropped, so the ledger returns to zero on every exit path, including an
//! early `?` return or a solver failure further down the pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::trace;

use crate::error::{Result, TopologyError};

#[derive(Debug, Default)]
struct Counters {
    resident: AtomicUsize,
    peak: AtomicUsize,
    live_buffers: AtomicUsize,
}

/// Shared byte ledger of a device
#[derive(Debug, Clone, Default)]
pub struct DeviceMemory {
    counters: Arc<Counters>,
}

impl DeviceMemory {
    pub fn resident_bytes(&self) -> usize {
        self.counters.resident.load(Ordering::SeqCst)
    }

    pub fn peak_bytes(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn live_buffers(&self) -> usize {
        self.counters.live_buffers.load(Ordering::SeqCst)
    }

    /// Start a new peak measurement from the current residency.
    pub fn reset_peak(&self) {
        self.counters.peak.store(self.resident_bytes(), Ordering::SeqCst);
    }

    fn reserve(&self, bytes: usize) {
        let now = self.counters.resident.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.counters.peak.fetch_max(now, Ordering::SeqCst);
        self.counters.live_buffers.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self, bytes: usize) {
        self.counters.resident.fetch_sub(bytes, Ordering::SeqCst);
        self.counters.live_buffers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// CPU compute device backed by a dedicated rayon pool
pub struct ComputeDevice {
    pool: ThreadPool,
    memory: DeviceMemory,
}

impl ComputeDevice {
    /// `n_threads = None` uses every available core.
    pub fn cpu(n_threads: Option<usize>) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads.unwrap_or(0))
            .thread_name(|i| format!("distance-{i}"))
            .build()
            .map_err(|e| TopologyError::InvalidConfig(format!("thread pool: {e}")))?;
        Ok(Self {
            pool,
            memory: DeviceMemory::default(),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn memory(&self) -> &DeviceMemory {
        &self.memory
    }

    /// Place a host matrix on the device.
    pub fn upload(&self, data: Array2<f64>) -> DeviceBuffer {
        DeviceBuffer::new(data, self.memory.clone())
    }

    /// Run `op` inside the device's worker pool.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

impl std::fmt::Debug for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeDevice")
            .field("threads", &self.threads())
            .field("resident_bytes", &self.memory.resident_bytes())
            .finish()
    }
}

/// Device-resident matrix; its bytes are released on drop
#[derive(Debug)]
pub struct DeviceBuffer {
    data: Array2<f64>,
    bytes: usize,
    memory: DeviceMemory,
}

impl DeviceBuffer {
    fn new(data: Array2<f64>, memory: DeviceMemory) -> Self {
        let bytes = data.len() * std::mem::size_of::<f64>();
        memory.reserve(bytes);
        trace!(bytes, "device buffer allocated");
        Self { data, bytes, memory }
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Synchronise back to host memory and free the device copy.
    pub fn into_host(mut self) -> Array2<f64> {
        std::mem::take(&mut self.data)
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        self.memory.release(self.bytes);
        trace!(bytes = self.bytes, "device buffer released");
    }
}
