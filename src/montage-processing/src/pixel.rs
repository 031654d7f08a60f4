//! Frame geometry, pixel buffers and the recycling buffer pool

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use tracing::trace;

use crate::error::EncodeError;

/// Output frame dimensions in pixels, fixed for a whole encode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// Create a frame size; both dimensions must be positive
    pub fn new(width: u32, height: u32) -> Result<Self, EncodeError> {
        if width == 0 || height == 0 {
            return Err(EncodeError::EncoderSetup(format!(
                "frame size must be positive, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Memory layout of a pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 32 bits per pixel, bytes ordered A, R, G, B, color premultiplied by alpha
    Argb32PremultipliedFirst,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Argb32PremultipliedFirst => 4,
        }
    }

    /// Name of the matching ffmpeg raw pixel format
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Argb32PremultipliedFirst => "argb",
        }
    }
}

/// Canonical layout handed to the encoder
pub const CANONICAL_PIXEL_FORMAT: PixelFormat = PixelFormat::Argb32PremultipliedFirst;

/// A pool-owned frame buffer
///
/// Exclusively writable between [`PixelBufferPool::acquire`] and submission to
/// the encoder. Dropping it hands the storage back to the pool it came from.
pub struct PixelBuffer {
    data: Vec<u8>,
    size: FrameSize,
    format: PixelFormat,
    pool: Weak<PoolShared>,
}

impl PixelBuffer {
    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn bytes_per_row(&self) -> usize {
        self.size.width as usize * self.format.bytes_per_pixel()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Reset every pixel to fully transparent black
    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Drop for PixelBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.recycle(std::mem::take(&mut self.data));
        }
    }
}

struct PoolState {
    free: Vec<Vec<u8>>,
    allocated: usize,
}

struct PoolShared {
    state: Mutex<PoolState>,
}

impl PoolShared {
    fn recycle(&self, data: Vec<u8>) {
        if let Ok(mut state) = self.state.lock() {
            state.free.push(data);
            trace!("pixel buffer returned to pool ({} free)", state.free.len());
        }
    }
}

/// Fixed-capacity ring of reusable frame buffers
///
/// Size, format and capacity are fixed at construction. At most `capacity`
/// buffers are outstanding at once.
#[derive(Clone)]
pub struct PixelBufferPool {
    size: FrameSize,
    format: PixelFormat,
    capacity: usize,
    buffer_len: usize,
    shared: Arc<PoolShared>,
}

impl PixelBufferPool {
    pub fn new(size: FrameSize, format: PixelFormat, capacity: usize) -> Result<Self, EncodeError> {
        if capacity == 0 {
            return Err(EncodeError::BufferPool("pool capacity must be at least 1".to_string()));
        }

        let buffer_len = (size.width as usize)
            .checked_mul(size.height as usize)
            .and_then(|px| px.checked_mul(format.bytes_per_pixel()))
            .ok_or_else(|| EncodeError::BufferPool(format!("buffer for {} overflows", size)))?;

        Ok(Self {
            size,
            format,
            capacity,
            buffer_len,
            shared: Arc::new(PoolShared {
                state: Mutex::new(PoolState {
                    free: Vec::with_capacity(capacity),
                    allocated: 0,
                }),
            }),
        })
    }

    /// Take a buffer from the pool, allocating while under capacity
    ///
    /// Returns `None` when every buffer is outstanding. Recycled buffers keep
    /// their previous contents.
    pub fn acquire(&self) -> Option<PixelBuffer> {
        let mut state = self.shared.state.lock().ok()?;

        let data = match state.free.pop() {
            Some(data) => data,
            None if state.allocated < self.capacity => {
                state.allocated += 1;
                vec![0u8; self.buffer_len]
            }
            None => return None,
        };

        Some(PixelBuffer {
            data,
            size: self.size,
            format: self.format,
            pool: Arc::downgrade(&self.shared),
        })
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Byte length of every buffer handed out by this pool
    pub fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Buffers currently sitting in the pool, ready for reuse
    pub fn available(&self) -> usize {
        self.shared
            .state
            .lock()
            .map(|state| state.free.len() + (self.capacity - state.allocated))
            .unwrap_or(0)
    }
}

impl fmt::Debug for PixelBufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBufferPool")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_rejects_zero() {
        assert!(FrameSize::new(0, 10).is_err());
        assert!(FrameSize::new(10, 0).is_err());
        assert_eq!(FrameSize::new(1024, 1024).unwrap().to_string(), "1024x1024");
    }

    #[test]
    fn test_pool_rejects_zero_capacity() {
        let size = FrameSize::new(4, 4).unwrap();
        let err = PixelBufferPool::new(size, CANONICAL_PIXEL_FORMAT, 0).unwrap_err();
        assert!(matches!(err, EncodeError::BufferPool(_)));
    }

    #[test]
    fn test_pool_buffer_layout() {
        let size = FrameSize::new(6, 3).unwrap();
        let pool = PixelBufferPool::new(size, CANONICAL_PIXEL_FORMAT, 2).unwrap();
        let buffer = pool.acquire().unwrap();

        assert_eq!(buffer.data().len(), 6 * 3 * 4);
        assert_eq!(buffer.bytes_per_row(), 24);
        assert_eq!(buffer.format(), PixelFormat::Argb32PremultipliedFirst);
    }

    #[test]
    fn test_pool_exhaustion_and_recycling() {
        let size = FrameSize::new(2, 2).unwrap();
        let pool = PixelBufferPool::new(size, CANONICAL_PIXEL_FORMAT, 2).unwrap();

        let mut first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert_eq!(pool.available(), 0);

        first.data_mut()[0] = 0xAB;
        drop(first);
        assert_eq!(pool.available(), 1);

        // Recycled storage comes back with its old contents until cleared
        let mut reused = pool.acquire().unwrap();
        assert_eq!(reused.data()[0], 0xAB);
        reused.clear();
        assert!(reused.data().iter().all(|&b| b == 0));

        drop(second);
        drop(reused);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_buffer_outliving_pool_is_dropped_quietly() {
        let size = FrameSize::new(2, 2).unwrap();
        let pool = PixelBufferPool::new(size, CANONICAL_PIXEL_FORMAT, 1).unwrap();
        let buffer = pool.acquire().unwrap();
        drop(pool);
        drop(buffer);
    }
}
