//! Fixed-size frame codec.
//!
//! Every message on the wire is exactly `frame_size` bytes:
//!
//! ```text
//! [u32 LE body length][MessagePack body][zero padding]
//! ```
//!
//! Frames are sized up front for a report carrying `capacity` child tasks, so
//! neither side ever has to announce a length before the payload.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::WireError;

/// Bytes taken by the body length prefix.
pub const LENGTH_PREFIX: usize = 4;

/// Upper bound on one encoded task (worst case is 60 bytes).
pub const TASK_RECORD_BYTES: usize = 64;

/// Headroom for a report's answered payload, count, outcome, and failure reason.
pub const REPORT_OVERHEAD: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    frame_size: usize,
}

impl FrameCodec {
    /// A codec whose frames hold a report with up to `capacity` children.
    pub fn for_batch(capacity: u32) -> Self {
        Self {
            frame_size: LENGTH_PREFIX + REPORT_OVERHEAD + capacity as usize * TASK_RECORD_BYTES,
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Largest body that fits in one frame.
    pub fn body_capacity(&self) -> usize {
        self.frame_size - LENGTH_PREFIX
    }

    /// Serialize `value` into a padded frame.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, WireError> {
        let body = rmp_serde::to_vec(value)?;
        if body.len() > self.body_capacity() {
            return Err(WireError::Oversize {
                len: body.len(),
                capacity: self.body_capacity(),
            });
        }
        let mut frame = vec![0u8; self.frame_size];
        frame[..LENGTH_PREFIX].copy_from_slice(&(body.len() as u32).to_le_bytes());
        frame[LENGTH_PREFIX..LENGTH_PREFIX + body.len()].copy_from_slice(&body);
        Ok(frame)
    }

    /// Deserialize a frame produced by [`encode`](Self::encode).
    pub fn decode<T: DeserializeOwned>(&self, frame: &[u8]) -> Result<T, WireError> {
        self.check_len(frame)?;
        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&frame[..LENGTH_PREFIX]);
        let len = u32::from_le_bytes(prefix) as usize;
        if len > self.body_capacity() {
            return Err(WireError::MalformedFrame(format!(
                "length prefix {len} exceeds body capacity {}",
                self.body_capacity()
            )));
        }
        Ok(rmp_serde::from_slice(&frame[LENGTH_PREFIX..LENGTH_PREFIX + len])?)
    }

    /// Reject frames that are not exactly `frame_size` bytes.
    pub fn check_len(&self, frame: &[u8]) -> Result<(), WireError> {
        if frame.len() != self.frame_size {
            return Err(WireError::MalformedFrame(format!(
                "expected {} bytes, got {}",
                self.frame_size,
                frame.len()
            )));
        }
        Ok(())
    }
}
