//! Free-space pre-flight.
//!
//! Both the plaintext archive and the ciphertext sit next to each other in the
//! output directory until the plaintext is removed, so the payload size is
//! scaled by [`SPACE_FACTOR`] before it is compared with the free space.

use std::io;
use std::path::Path;

use tracing::debug;

use crate::error::{BackupError, Result};
use crate::probe::human_size;

/// Multiplier applied to the payload size.
pub const SPACE_FACTOR: f64 = 2.5;

/// Reports the bytes available to an unprivileged writer on the filesystem
/// holding a directory.
pub trait FreeSpace {
    fn available(&self, dir: &Path) -> io::Result<u64>;
}

/// [`FreeSpace`] backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsFreeSpace;

impl FreeSpace for FsFreeSpace {
    fn available(&self, dir: &Path) -> io::Result<u64> {
        fs2::available_space(dir)
    }
}

/// Bytes needed for a payload of `size` bytes, `ceil(size * 2.5)`.
pub fn required_bytes(size: u64) -> u64 {
    let scaled = (size as u128 * 5).div_ceil(2);
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

/// Fails when `size * 2.5` exceeds `available`. Exact equality passes.
pub fn ensure_capacity(size: u64, available: u64) -> Result<()> {
    // Compare `size * 5 > available * 2` to stay exact.
    if size as u128 * 5 > available as u128 * 2 {
        return Err(BackupError::InsufficientSpace {
            required: required_bytes(size),
            available,
        });
    }
    Ok(())
}

/// Runs the pre-flight against the filesystem holding `dir`.
pub fn check_free_space(size: u64, dir: &Path, probe: &dyn FreeSpace) -> Result<()> {
    let available = probe.available(dir)?;
    debug!(
        "{} required ({} x {SPACE_FACTOR}), {} available in '{}'",
        human_size(required_bytes(size)),
        human_size(size),
        human_size(available),
        dir.display()
    );
    ensure_capacity(size, available)
}
