// buffers.rs — Scoped lifetime for intermediate tensors.
//
// Every tensor a pipeline allocates is registered with the ScopeFrame of the
// run_scoped call it belongs to. The frame is a drop guard: when the scope
// exits (Ok, Err, early return or unwinding) its references are dropped, so
// only tensors moved into the returned value outlive the call.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use candle_core::Tensor;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct BufferScope {
    active_scopes: AtomicUsize,
    live_buffers: AtomicUsize,
    released_total: AtomicU64,
}

/// Point-in-time counters, reported by the `stats` request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStats {
    pub active_scopes: usize,
    pub live_buffers: usize,
    pub released_total: u64,
}

/// Buffers registered during one `run_scoped` call.
pub struct ScopeFrame<'s> {
    owner: &'s BufferScope,
    buffers: Vec<Tensor>,
}

impl ScopeFrame<'_> {
    /// Register an intermediate tensor. It is released when the scope exits.
    pub fn track(&mut self, tensor: Tensor) -> Tensor {
        self.owner.live_buffers.fetch_add(1, Ordering::SeqCst);
        self.buffers.push(tensor.clone());
        tensor
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.buffers.len()
    }
}

impl Drop for ScopeFrame<'_> {
    fn drop(&mut self) {
        let released = self.buffers.len();
        self.buffers.clear();
        self.owner.live_buffers.fetch_sub(released, Ordering::SeqCst);
        self.owner.released_total.fetch_add(released as u64, Ordering::SeqCst);
        self.owner.active_scopes.fetch_sub(1, Ordering::SeqCst);
        if released > 0 {
            log::debug!("Released {} intermediate buffers", released);
        }
    }
}

impl BufferScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` with a fresh frame and release everything it tracked on exit.
    pub fn run_scoped<R>(&self, work: impl FnOnce(&mut ScopeFrame<'_>) -> R) -> R {
        self.active_scopes.fetch_add(1, Ordering::SeqCst);
        let mut frame = ScopeFrame {
            owner: self,
            buffers: Vec::new(),
        };
        work(&mut frame)
    }

    /// Release retained model parameters. Teardown only.
    ///
    /// Returns whether anything was retained.
    pub fn release_all<P>(&self, retained: Option<P>) -> bool {
        let active = self.active_scopes.load(Ordering::SeqCst);
        if active > 0 {
            log::warn!("Releasing model parameters while {} scope(s) are still running", active);
        }
        match retained {
            Some(params) => {
                drop(params);
                log::info!("Released retained model parameters");
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            active_scopes: self.active_scopes.load(Ordering::SeqCst),
            live_buffers: self.live_buffers.load(Ordering::SeqCst),
            released_total: self.released_total.load(Ordering::SeqCst),
        }
    }
}
