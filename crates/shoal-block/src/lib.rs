#![forbid(unsafe_code)]
//! Block device layer for the shoal buffer cache.
//!
//! Provides the byte- and block-addressed device traits, a file-backed
//! device using `pread`/`pwrite` style I/O, an in-memory device for tests
//! and benches, and [`BlockStore`] — the multi-device interface the cache
//! consumes. All reads and writes are synchronous: they block the calling
//! thread until the underlying device completes.

use parking_lot::Mutex;
use shoal_error::{Result, ShoalError};
use shoal_types::cancel::CancelToken;
use shoal_types::{BlockNumber, BlockSize, DeviceId};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

#[inline]
fn cx_checkpoint(cx: &CancelToken) -> Result<()> {
    cx.checkpoint().map_err(|_| ShoalError::Cancelled)
}

/// Owned block payload.
///
/// Invariant: length == block size of the originating device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBuf {
    bytes: Vec<u8>,
}

impl BlockBuf {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

/// Byte-addressed device for fixed-offset I/O (pread/pwrite semantics).
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, cx: &CancelToken, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all bytes in `buf` to `offset`.
    fn write_all_at(&self, cx: &CancelToken, offset: u64, buf: &[u8]) -> Result<()>;

    /// Flush pending writes to stable storage.
    fn sync(&self, cx: &CancelToken) -> Result<()>;
}

/// File-backed byte device using Linux `pread`/`pwrite` style I/O.
///
/// Uses `std::os::unix::fs::FileExt`, which is thread-safe and does not
/// require a shared seek position.
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
    writable: bool,
}

impl FileByteDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (file, writable) = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map(|file| (file, true))
            .or_else(|_| {
                OpenOptions::new()
                    .read(true)
                    .open(path.as_ref())
                    .map(|file| (file, false))
            })?;
        let len = file.metadata()?.len();
        Ok(Self {
            file: Arc::new(file),
            len,
            writable,
        })
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_exact_at(&self, cx: &CancelToken, offset: u64, buf: &mut [u8]) -> Result<()> {
        cx_checkpoint(cx)?;
        let end = offset
            .checked_add(
                u64::try_from(buf.len())
                    .map_err(|_| ShoalError::Format("read length overflows u64".to_owned()))?,
            )
            .ok_or_else(|| ShoalError::Format("read range overflows u64".to_owned()))?;
        if end > self.len {
            return Err(ShoalError::Format(format!(
                "read out of bounds: offset={offset} len={} device_len={}",
                buf.len(),
                self.len
            )));
        }

        self.file.read_exact_at(buf, offset)?;
        cx_checkpoint(cx)?;
        Ok(())
    }

    fn write_all_at(&self, cx: &CancelToken, offset: u64, buf: &[u8]) -> Result<()> {
        cx_checkpoint(cx)?;
        if !self.writable {
            return Err(ShoalError::PermissionDenied);
        }
        let end = offset
            .checked_add(
                u64::try_from(buf.len())
                    .map_err(|_| ShoalError::Format("write length overflows u64".to_owned()))?,
            )
            .ok_or_else(|| ShoalError::Format("write range overflows u64".to_owned()))?;
        if end > self.len {
            return Err(ShoalError::Format(format!(
                "write out of bounds: offset={offset} len={} device_len={}",
                buf.len(),
                self.len
            )));
        }

        self.file.write_all_at(buf, offset)?;
        cx_checkpoint(cx)?;
        Ok(())
    }

    fn sync(&self, cx: &CancelToken) -> Result<()> {
        cx_checkpoint(cx)?;
        self.file.sync_all()?;
        cx_checkpoint(cx)?;
        Ok(())
    }
}

/// Block-addressed I/O interface for a single device.
pub trait BlockDevice: Send + Sync {
    /// Read a block by number.
    fn read_block(&self, cx: &CancelToken, block: BlockNumber) -> Result<BlockBuf>;

    /// Write a block by number. `data.len()` MUST equal `block_size()`.
    fn write_block(&self, cx: &CancelToken, block: BlockNumber, data: &[u8]) -> Result<()>;

    /// Device block size.
    fn block_size(&self) -> BlockSize;

    /// Total number of blocks.
    fn block_count(&self) -> u64;

    /// Flush pending writes to stable storage.
    fn sync(&self, cx: &CancelToken) -> Result<()>;
}

/// Adapter exposing a [`ByteDevice`] as fixed-size blocks.
#[derive(Debug)]
pub struct ByteBlockDevice<D: ByteDevice> {
    inner: D,
    block_size: BlockSize,
    block_count: u64,
}

impl<D: ByteDevice> ByteBlockDevice<D> {
    pub fn new(inner: D, block_size: BlockSize) -> Result<Self> {
        let len = inner.len_bytes();
        let block_size_u64 = u64::from(block_size.get());
        let remainder = len % block_size_u64;
        if remainder != 0 {
            return Err(ShoalError::Format(format!(
                "device length is not block-aligned: len_bytes={len} block_size={} remainder={remainder}",
                block_size.get()
            )));
        }
        let block_count = len / block_size_u64;
        Ok(Self {
            inner,
            block_size,
            block_count,
        })
    }

    #[must_use]
    pub fn inner(&self) -> &D {
        &self.inner
    }

    fn block_offset(&self, block: BlockNumber) -> Result<u64> {
        if block.0 >= self.block_count {
            return Err(ShoalError::Format(format!(
                "block out of range: block={} block_count={}",
                block.0, self.block_count
            )));
        }
        self.block_size
            .block_to_byte(block)
            .ok_or_else(|| ShoalError::Format("block offset overflow".to_owned()))
    }
}

impl<D: ByteDevice> BlockDevice for ByteBlockDevice<D> {
    fn read_block(&self, cx: &CancelToken, block: BlockNumber) -> Result<BlockBuf> {
        cx_checkpoint(cx)?;
        let offset = self.block_offset(block)?;
        let mut buf = vec![0_u8; self.block_size.bytes()];
        self.inner.read_exact_at(cx, offset, &mut buf)?;
        Ok(BlockBuf::new(buf))
    }

    fn write_block(&self, cx: &CancelToken, block: BlockNumber, data: &[u8]) -> Result<()> {
        cx_checkpoint(cx)?;
        if data.len() != self.block_size.bytes() {
            return Err(ShoalError::Format(format!(
                "write_block data size mismatch: got={} expected={}",
                data.len(),
                self.block_size.bytes()
            )));
        }
        let offset = self.block_offset(block)?;
        self.inner.write_all_at(cx, offset, data)
    }

    fn block_size(&self) -> BlockSize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn sync(&self, cx: &CancelToken) -> Result<()> {
        self.inner.sync(cx)
    }
}

/// In-memory block device for tests and benches.
#[derive(Debug)]
pub struct MemBlockDevice {
    bytes: Mutex<Vec<u8>>,
    block_size: BlockSize,
    block_count: u64,
}

impl MemBlockDevice {
    #[must_use]
    pub fn new(block_size: BlockSize, block_count: u64) -> Self {
        let len = usize::try_from(block_count).expect("block_count fits usize") * block_size.bytes();
        Self {
            bytes: Mutex::new(vec![0_u8; len]),
            block_size,
            block_count,
        }
    }

    fn range(&self, block: BlockNumber) -> Result<std::ops::Range<usize>> {
        if block.0 >= self.block_count {
            return Err(ShoalError::Format(format!(
                "block out of range: block={} block_count={}",
                block.0, self.block_count
            )));
        }
        let start = usize::try_from(block.0).expect("block fits usize") * self.block_size.bytes();
        Ok(start..start + self.block_size.bytes())
    }
}

impl BlockDevice for MemBlockDevice {
    fn read_block(&self, cx: &CancelToken, block: BlockNumber) -> Result<BlockBuf> {
        cx_checkpoint(cx)?;
        let range = self.range(block)?;
        let bytes = self.bytes.lock();
        Ok(BlockBuf::new(bytes[range].to_vec()))
    }

    fn write_block(&self, cx: &CancelToken, block: BlockNumber, data: &[u8]) -> Result<()> {
        cx_checkpoint(cx)?;
        if data.len() != self.block_size.bytes() {
            return Err(ShoalError::Format(format!(
                "write_block data size mismatch: got={} expected={}",
                data.len(),
                self.block_size.bytes()
            )));
        }
        let range = self.range(block)?;
        let mut bytes = self.bytes.lock();
        bytes[range].copy_from_slice(data);
        drop(bytes);
        Ok(())
    }

    fn block_size(&self) -> BlockSize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn sync(&self, cx: &CancelToken) -> Result<()> {
        cx_checkpoint(cx)
    }
}

/// Multi-device interface consumed by the cache: synchronous read and
/// write of a `(DeviceId, BlockNumber)` identity, payload fixed to one
/// uniform block size across all devices.
pub trait BlockStore: Send + Sync {
    fn read_block(&self, cx: &CancelToken, device: DeviceId, block: BlockNumber)
        -> Result<BlockBuf>;

    fn write_block(
        &self,
        cx: &CancelToken,
        device: DeviceId,
        block: BlockNumber,
        data: &[u8],
    ) -> Result<()>;

    fn block_size(&self) -> BlockSize;
}

/// Maps `DeviceId` values to per-device [`BlockDevice`]s.
///
/// Device ids are dense: id `n` is the device at index `n`. All devices
/// must share one block size; this is checked at construction.
pub struct DeviceTable {
    devices: Vec<Arc<dyn BlockDevice>>,
    block_size: BlockSize,
}

impl std::fmt::Debug for DeviceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTable")
            .field("devices", &self.devices.len())
            .field("block_size", &self.block_size)
            .finish()
    }
}

impl DeviceTable {
    pub fn new(devices: Vec<Arc<dyn BlockDevice>>) -> Result<Self> {
        let Some(first) = devices.first() else {
            return Err(ShoalError::Format("device table is empty".to_owned()));
        };
        let block_size = first.block_size();
        for (idx, dev) in devices.iter().enumerate() {
            if dev.block_size() != block_size {
                return Err(ShoalError::Format(format!(
                    "device {idx} block_size={} differs from device 0 block_size={}",
                    dev.block_size().get(),
                    block_size.get()
                )));
            }
        }
        Ok(Self {
            devices,
            block_size,
        })
    }

    /// Table with a single device at id 0.
    pub fn single(device: Arc<dyn BlockDevice>) -> Result<Self> {
        Self::new(vec![device])
    }

    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device(&self, device: DeviceId) -> Result<&Arc<dyn BlockDevice>> {
        self.devices.get(device.0 as usize).ok_or_else(|| {
            ShoalError::Format(format!(
                "unknown device id {} (table has {} devices)",
                device.0,
                self.devices.len()
            ))
        })
    }
}

impl BlockStore for DeviceTable {
    fn read_block(
        &self,
        cx: &CancelToken,
        device: DeviceId,
        block: BlockNumber,
    ) -> Result<BlockBuf> {
        self.device(device)?.read_block(cx, block)
    }

    fn write_block(
        &self,
        cx: &CancelToken,
        device: DeviceId,
        block: BlockNumber,
        data: &[u8],
    ) -> Result<()> {
        self.device(device)?.write_block(cx, block, data)
    }

    fn block_size(&self) -> BlockSize {
        self.block_size
    }
}
