//! Simulated echo peer for testing without hardware
//!
//! Behaves like the echo firmware on the wire: every byte written to the
//! channel is queued to be read back, optionally after a fixed latency and
//! with a seeded random drop probability for lossy-line testing.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::transport::Channel;

/// How the simulated peer responds to received bytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeerBehavior {
    /// Echo every byte back
    Echo,
    /// Never respond (device offline or wedged)
    Silent,
    /// Echo, but drop each byte with the given probability
    Lossy {
        /// Probability in [0, 1] that a byte is dropped instead of echoed
        drop_probability: f64,
    },
}

/// In-memory [`Channel`] that acts as the echo device
pub struct SimulatedEcho {
    behavior: PeerBehavior,
    /// Delay before an echoed byte becomes readable
    latency: Duration,
    rng: StdRng,
    /// Echoed bytes with the instant they become available
    queue: VecDeque<(Instant, u8)>,
    /// Everything the host wrote, for test inspection
    written: Arc<Mutex<Vec<u8>>>,
}

impl SimulatedEcho {
    /// Create an echoing peer with no latency
    pub fn new() -> Self {
        Self::with_behavior(PeerBehavior::Echo)
    }

    /// Create a peer with the given behavior
    pub fn with_behavior(behavior: PeerBehavior) -> Self {
        Self {
            behavior,
            latency: Duration::ZERO,
            rng: StdRng::seed_from_u64(0x5eed),
            queue: VecDeque::new(),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the echo latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reseed the drop RNG (lossy behavior is deterministic under a seed)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Shared handle to the log of bytes the host has written. Clone it
    /// before handing the peer to a connection.
    pub fn written_log(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }

    fn ready_count(&self) -> usize {
        let now = Instant::now();
        self.queue.iter().take_while(|(at, _)| *at <= now).count()
    }
}

impl Default for SimulatedEcho {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for SimulatedEcho {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let now = Instant::now();
        let mut n = 0;
        while n < buf.len() {
            match self.queue.front() {
                Some((at, _)) if *at <= now => {
                    if let Some((_, byte)) = self.queue.pop_front() {
                        buf[n] = byte;
                        n += 1;
                    }
                }
                _ => break,
            }
        }
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "no echo ready"));
        }
        Ok(n)
    }
}

impl Write for SimulatedEcho {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "written log poisoned"))?
            .extend_from_slice(buf);

        let ready_at = Instant::now() + self.latency;
        for &byte in buf {
            match self.behavior {
                PeerBehavior::Echo => self.queue.push_back((ready_at, byte)),
                PeerBehavior::Silent => {}
                PeerBehavior::Lossy { drop_probability } => {
                    if !self.rng.gen_bool(drop_probability.clamp(0.0, 1.0)) {
                        self.queue.push_back((ready_at, byte));
                    }
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Channel for SimulatedEcho {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.queue.clear();
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(self.ready_count() as u32)
    }
}
