//! Retry helpers: interrupted system calls and bind port fallback.

use std::future::Future;
use std::io;
use std::ops::Range;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{Result, TransportError};

/// Range fallback bind ports are drawn from.
pub const FALLBACK_PORTS: Range<u16> = 10000..50000;

/// Run `op` until it finishes with anything other than
/// [`io::ErrorKind::Interrupted`]. No backoff, no limit.
pub(crate) async fn retry_interrupted<T, F, Fut>(mut op: F) -> io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match op().await {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Ports to try when binding: the requested one, then pseudo-random
/// fallbacks seeded by wall-clock time plus the requested port.
pub struct PortCandidates {
    next: Option<u16>,
    rng: StdRng,
}

impl PortCandidates {
    pub fn new(port: u16) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::with_seed(port, now.wrapping_add(port as u64))
    }

    pub fn with_seed(port: u16, seed: u64) -> Self {
        Self {
            next: Some(port),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Iterator for PortCandidates {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        Some(
            self.next
                .take()
                .unwrap_or_else(|| self.rng.gen_range(FALLBACK_PORTS)),
        )
    }
}

/// Try `attempt` on successive port candidates, at most `max_retry + 1`
/// times. Returns the first socket that binds together with its port.
pub(crate) async fn bind_with_retry<T, F, Fut>(
    candidates: PortCandidates,
    max_retry: usize,
    mut attempt: F,
) -> Result<(T, u16)>
where
    F: FnMut(u16) -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let attempts = max_retry + 1;
    for port in candidates.take(attempts) {
        match attempt(port).await {
            Ok(socket) => return Ok((socket, port)),
            Err(e) => debug!(port, error = %e, "bind attempt failed"),
        }
    }
    Err(TransportError::BindExhausted { attempts })
}
