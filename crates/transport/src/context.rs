//! Transport context: shutdown signal and socket budget.
//!
//! One context is created by `start` and released by `stop`. Every socket
//! the transport opens holds a [`SocketPermit`] from it, and every blocking
//! socket operation races against its [`Shutdown`] signal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Result, TransportError};

pub(crate) struct Context {
    shutdown: watch::Sender<bool>,
    sockets: Arc<AtomicUsize>,
    max_sockets: usize,
}

impl Context {
    pub(crate) fn new(max_sockets: usize) -> Result<Arc<Self>> {
        if max_sockets == 0 {
            return Err(TransportError::Setup(
                "create context failed: socket limit is 0".to_string(),
            ));
        }
        let (shutdown, _) = watch::channel(false);
        Ok(Arc::new(Self {
            shutdown,
            sockets: Arc::new(AtomicUsize::new(0)),
            max_sockets,
        }))
    }

    pub(crate) fn shutdown_signal(&self) -> Shutdown {
        Shutdown {
            rx: self.shutdown.subscribe(),
        }
    }

    /// Wake every task waiting on a [`Shutdown`] from this context.
    pub(crate) fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Reserve one socket slot.
    pub(crate) fn acquire_socket(&self) -> Result<SocketPermit> {
        let mut current = self.sockets.load(Ordering::Relaxed);
        loop {
            if current >= self.max_sockets {
                return Err(TransportError::Setup(format!(
                    "create socket failed: {} sockets already open",
                    current
                )));
            }
            match self.sockets.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Ok(SocketPermit {
                        sockets: Arc::clone(&self.sockets),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn open_sockets(&self) -> usize {
        self.sockets.load(Ordering::Acquire)
    }
}

/// Held by an open socket; frees its slot on drop.
#[derive(Debug)]
pub(crate) struct SocketPermit {
    sockets: Arc<AtomicUsize>,
}

impl Drop for SocketPermit {
    fn drop(&mut self) {
        self.sockets.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Receiving end of the context's shutdown signal.
#[derive(Clone)]
pub(crate) struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Resolves once the context is shut down (or dropped).
    pub(crate) async fn wait(&mut self) {
        // An error means the context is gone, which counts as shut down.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
