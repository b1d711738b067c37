//! Data-connection lifecycle: byte accounting, speed-driven packet-size
//! adaptation, no-data-transfer watchdog, and optional DEFLATE
//! compression (§4.2, L4).
//!
//! [`crate::ftp::transfer`] negotiates and opens the raw socket; this
//! module owns it for the lifetime of one transfer and reports the
//! worker-addressed events described in §4.2 ("connected",
//! "listening-for-con", "closed", "flush-data").

use crate::ftp::speed_meter::SpeedMeter;
use crate::ftp::transfer::DataStream;
use flate2::write::DeflateEncoder;
use flate2::read::DeflateDecoder;
use flate2::Compression;
use std::io::{self, Read, Write};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Lifecycle states (§3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataConState {
    NotAllocated,
    OnlyAllocated,
    Listening,
    Connecting,
    Connected,
    Closed,
}

/// Packet-size stepdown ladder (grounded in the source's data-connection
/// throughput adaptation): always ends at 512, a size every server
/// accepts.
const PACKET_SIZE_LADDER: [usize; 5] = [32768, 8192, 4096, 1024, 512];

const DEFAULT_FLUSH_SIZE: usize = 32 * 1024;

/// Classification of a data-connection failure, surfacing enough detail
/// for the worker to pick a retry class (§4.1, §4.2 `get-error`).
#[derive(Debug, Clone, Default)]
pub struct DataConError {
    pub os_error: Option<i32>,
    pub low_memory: bool,
    pub no_transfer_timeout: bool,
    pub ssl_error: bool,
    pub decompress_error: bool,
}

/// One packet-size re-evaluation window: records the speed measured
/// just before and just after a size change.
struct AdaptationWindow {
    changed_at: Instant,
    size_index: usize,
    speed_before_change: f64,
}

/// A single transfer's data socket plus its throughput- and
/// watchdog-adaptive bookkeeping.
pub struct DataConnection {
    state: DataConState,
    stream: Option<DataStream>,
    speed_meter: SpeedMeter,
    bytes_total: u64,
    flush_size: usize,
    compress: bool,
    deflate_level: u32,
    last_evaluated_at: Instant,
    adaptation: Option<AdaptationWindow>,
    no_data_transfer_timeout_sec: u64,
    error: Option<DataConError>,
}

impl DataConnection {
    pub fn new(no_data_transfer_timeout_sec: u64, compress: bool) -> Self {
        Self {
            state: DataConState::NotAllocated,
            stream: None,
            speed_meter: SpeedMeter::new(),
            bytes_total: 0,
            flush_size: DEFAULT_FLUSH_SIZE,
            compress,
            deflate_level: 6,
            last_evaluated_at: Instant::now(),
            adaptation: None,
            no_data_transfer_timeout_sec,
            error: None,
        }
    }

    pub fn state(&self) -> DataConState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == DataConState::Connected
    }

    /// Attach a freshly negotiated stream and mark the connection
    /// `connected` (§4.2 "report connected").
    pub fn attach(&mut self, stream: DataStream) {
        self.stream = Some(stream);
        self.state = DataConState::Connected;
        self.speed_meter.just_connected();
        self.last_evaluated_at = Instant::now();
    }

    pub fn mark_listening(&mut self) {
        self.state = DataConState::Listening;
    }

    pub fn mark_connecting(&mut self) {
        self.state = DataConState::Connecting;
    }

    pub fn mark_only_allocated(&mut self) {
        self.state = DataConState::OnlyAllocated;
    }

    /// Close the stream and record the final state. Callers decide
    /// separately whether the target file should be rolled back.
    pub fn close(&mut self) {
        self.stream = None;
        self.state = DataConState::Closed;
    }

    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    pub fn speed_bps(&self) -> f64 {
        self.speed_meter.get_speed()
    }

    pub fn current_packet_size(&self) -> usize {
        self.flush_size
    }

    /// True once `no-data-transfer-timeout` seconds have passed without
    /// activity while still `connected` (§4.1 watchdog).
    pub fn no_data_transfer_timed_out(&self) -> bool {
        self.state == DataConState::Connected
            && self.speed_meter.idle_seconds() >= self.no_data_transfer_timeout_sec as f64
    }

    pub fn take_error(&mut self) -> Option<DataConError> {
        self.error.take()
    }

    /// Read up to `flush_size` bytes for a download flush, applying
    /// DEFLATE decompression when configured. Returns `Ok(None)` at EOF.
    pub async fn read_flush_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let flush_size = self.flush_size;
        let compress = self.compress;
        let stream = self.stream.as_mut().ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no data stream"))?;

        let mut raw = vec![0u8; flush_size];
        let n = match stream {
            DataStream::Plain(s) => s.read(&mut raw).await?,
            DataStream::Tls(s) => s.read(&mut raw).await?,
        };
        if n == 0 {
            return Ok(None);
        }
        raw.truncate(n);
        self.bytes_total += n as u64;
        self.speed_meter.on_write(n as u64);
        self.maybe_adapt_packet_size();

        if compress {
            let mut decoder = DeflateDecoder::new(&raw[..]);
            let mut out = Vec::new();
            // A missing end-of-stream marker is observed to be unreliable
            // across server implementations; don't treat it as fatal.
            let _ = decoder.read_to_end(&mut out);
            Ok(Some(out))
        } else {
            Ok(Some(raw))
        }
    }

    /// Write one upload chunk, applying DEFLATE compression when
    /// configured, and update byte/speed accounting.
    pub async fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        let compress = self.compress;
        let level = self.deflate_level;
        let payload = if compress {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
            encoder.write_all(data)?;
            encoder.finish()?
        } else {
            data.to_vec()
        };

        let stream = self.stream.as_mut().ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no data stream"))?;
        match stream {
            DataStream::Plain(s) => s.write_all(&payload).await?,
            DataStream::Tls(s) => s.write_all(&payload).await?,
        }
        self.bytes_total += data.len() as u64;
        self.speed_meter.on_write(data.len() as u64);
        self.maybe_adapt_packet_size();
        Ok(())
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            match stream {
                DataStream::Plain(s) => s.shutdown().await?,
                DataStream::Tls(s) => s.shutdown().await?,
            }
        }
        Ok(())
    }

    /// Too-big-packet adaptation (§4.1): measure throughput in the
    /// 1-second window after a size change; a drop below a third of the
    /// pre-change speed records the old size as "too big" and steps
    /// down the ladder. Re-evaluate every 5 seconds regardless.
    fn maybe_adapt_packet_size(&mut self) {
        let now = Instant::now();
        let speed = self.speed_meter.get_speed();

        if let Some(window) = &self.adaptation {
            if now.duration_since(window.changed_at).as_secs_f64() >= 1.0 {
                let threshold = window.speed_before_change / 3.0;
                if window.speed_before_change > 0.0 && speed < threshold {
                    self.step_down_from(window.size_index);
                }
                self.adaptation = None;
            }
        }

        if now.duration_since(self.last_evaluated_at).as_secs_f64() >= 5.0 {
            self.last_evaluated_at = now;
            let current_index = PACKET_SIZE_LADDER
                .iter()
                .position(|&s| s == self.flush_size)
                .unwrap_or(0);
            self.adaptation = Some(AdaptationWindow {
                changed_at: now,
                size_index: current_index,
                speed_before_change: speed,
            });
        }
    }

    fn step_down_from(&mut self, index: usize) {
        let next = (index + 1).min(PACKET_SIZE_LADDER.len() - 1);
        self.flush_size = PACKET_SIZE_LADDER[next];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_allocated() {
        let dc = DataConnection::new(30, false);
        assert_eq!(dc.state(), DataConState::NotAllocated);
        assert_eq!(dc.current_packet_size(), 32768);
    }

    #[test]
    fn watchdog_false_before_connected() {
        let dc = DataConnection::new(30, false);
        assert!(!dc.no_data_transfer_timed_out());
    }

    #[test]
    fn step_down_never_goes_past_512() {
        let mut dc = DataConnection::new(30, false);
        for _ in 0..10 {
            dc.step_down_from(4);
        }
        assert_eq!(dc.current_packet_size(), 512);
    }

    #[test]
    fn step_down_advances_one_rung() {
        let mut dc = DataConnection::new(30, false);
        dc.step_down_from(0);
        assert_eq!(dc.current_packet_size(), 8192);
    }
}
