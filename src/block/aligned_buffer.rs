use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;
use trackable::error::ErrorKindExt;

use crate::block::BlockSize;
use crate::{ErrorKind, Result};

/// 指定のブロック境界に開始位置が揃えられた、ゼロ初期化済みのバイト列.
///
/// 確保は失敗し得る(i.e., 確保に失敗してもプロセスはアボートしない)点が`Vec<u8>`との主な違い.
///
/// Unix系のプラットフォームで、ブロックサイズがページサイズの約数の場合には、
/// 匿名メモリマッピング(`mmap`)で領域が確保される.
/// この場合、各ページは最初にアクセスされた時点で初めて物理メモリに割り当てられる.
///
/// 内部的なメモリ管理の方法が異なるだけで、基本的には通常のバイト列(e.g., `&[u8]`)と同様に扱うことが可能.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    backing: Backing,
    block_size: BlockSize,
}
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}
impl AlignedBuffer {
    /// 新しい`AlignedBuffer`インスタンスを生成する.
    ///
    /// 結果のバイト列は全てゼロで初期化されている.
    ///
    /// # Errors
    ///
    /// - `size`が`0`ないしメモリ上で表現不可能な場合には`ErrorKind::InvalidInput`
    /// - 領域を確保できなかった場合には`ErrorKind::OutOfMemory`
    pub fn zeroed(size: usize, block_size: BlockSize) -> Result<Self> {
        let layout = track!(Self::layout(size, block_size))?;
        let (ptr, backing) = track!(allocate_zeroed(layout))?;
        Ok(AlignedBuffer {
            ptr,
            len: size,
            backing,
            block_size,
        })
    }

    /// `size`バイトのバッファを`block_size`境界で確保するためのレイアウトを返す.
    ///
    /// 実際に確保を行うことなく、サイズとブロックサイズの組み合わせを検証するために使われる.
    pub(crate) fn layout(size: usize, block_size: BlockSize) -> Result<Layout> {
        track_assert_ne!(size, 0, ErrorKind::InvalidInput);
        let layout = track!(
            Layout::from_size_align(size, usize::from(block_size.as_u16()))
                .map_err(|e| ErrorKind::InvalidInput.cause(e))
        )?;
        Ok(layout)
    }

    /// このバッファのブロックサイズを返す.
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// バッファの先頭アドレスを返す.
    ///
    /// 診断用途の値であり、これを使ってバッファにアクセスしてはいけない.
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}
impl Deref for AlignedBuffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}
impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}
impl AsRef<[u8]> for AlignedBuffer {
    fn as_ref(&self) -> &[u8] {
        &*self
    }
}
impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        match self.backing {
            #[cfg(unix)]
            Backing::Mapped => {
                unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len) };
            }
            Backing::Heap(layout) => unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) },
        }
    }
}
impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "AlignedBuffer {{ address: {:#018x}, len: {}, backing: {:?}, block_size: {:?} }}",
            self.address(),
            self.len,
            self.backing,
            self.block_size
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum Backing {
    #[cfg(unix)]
    Mapped,
    Heap(Layout),
}

#[cfg(unix)]
fn allocate_zeroed(layout: Layout) -> Result<(NonNull<u8>, Backing)> {
    if page_size() % layout.align() == 0 {
        track!(map_anonymous(layout.size()))
    } else {
        track!(heap_zeroed(layout))
    }
}
#[cfg(not(unix))]
fn allocate_zeroed(layout: Layout) -> Result<(NonNull<u8>, Backing)> {
    track!(heap_zeroed(layout))
}

#[cfg(unix)]
fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        usize::from(BlockSize::PAGE)
    }
}

/// 匿名マッピングのページは、最初のアクセス時にゼロ埋めされた状態で割り当てられる.
#[cfg(unix)]
fn map_anonymous(len: usize) -> Result<(NonNull<u8>, Backing)> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        track_panic!(
            ErrorKind::OutOfMemory,
            "Cannot map {} bytes: {}",
            len,
            std::io::Error::last_os_error()
        );
    }
    match NonNull::new(ptr as *mut u8) {
        Some(ptr) => Ok((ptr, Backing::Mapped)),
        None => track_panic!(ErrorKind::OutOfMemory, "Cannot map {} bytes", len),
    }
}

fn heap_zeroed(layout: Layout) -> Result<(NonNull<u8>, Backing)> {
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    match NonNull::new(ptr) {
        Some(ptr) => Ok((ptr, Backing::Heap(layout))),
        None => track_panic!(
            ErrorKind::OutOfMemory,
            "Cannot allocate {} bytes (alignment={})",
            layout.size(),
            layout.align()
        ),
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn zeroed_works() -> TestResult {
        let buf = track!(AlignedBuffer::zeroed(10, BlockSize::new(512)?))?;
        assert_eq!(buf.len(), 10);
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(buf.address() % 512, 0);
        Ok(())
    }

    #[test]
    fn alignment_follows_block_size() -> TestResult {
        let block_size = BlockSize::new(4096)?;
        for _ in 0..8 {
            let buf = track!(AlignedBuffer::zeroed(100, block_size))?;
            assert!(block_size.is_aligned(buf.address() as u64));
        }
        Ok(())
    }

    #[test]
    fn block_size_larger_than_page_works() -> TestResult {
        let block_size = BlockSize::new(32 * 1024)?;
        let mut buf = track!(AlignedBuffer::zeroed(100, block_size))?;
        assert!(block_size.is_aligned(buf.address() as u64));
        assert!(buf.iter().all(|&b| b == 0));
        buf[99] = 1;
        assert_eq!(buf[99], 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn large_buffer_is_zeroed_on_demand() -> TestResult {
        let size = 64 * 1024 * 1024;
        let mut buf = track!(AlignedBuffer::zeroed(size, BlockSize::default()))?;
        assert!(format!("{:?}", buf).contains("Mapped"));
        assert_eq!(buf[0], 0);
        assert_eq!(buf[size - 1], 0);
        buf[size / 2] = 7;
        assert_eq!(buf[size / 2], 7);
        Ok(())
    }

    #[test]
    fn layout_rejects_unrepresentable_sizes() -> TestResult {
        let e = AlignedBuffer::layout(isize::MAX as usize, BlockSize::default()).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));

        let e = AlignedBuffer::layout(1000, track!(BlockSize::new(1536))?).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
        Ok(())
    }

    #[test]
    fn write_through_deref_mut_works() -> TestResult {
        let mut buf = track!(AlignedBuffer::zeroed(4, BlockSize::min()))?;
        buf.copy_from_slice(b"foo!");
        assert_eq!(&buf[..], b"foo!");
        Ok(())
    }

    #[test]
    fn zero_size_is_rejected() {
        assert_eq!(
            AlignedBuffer::zeroed(0, BlockSize::min())
                .err()
                .map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn unsatisfiable_size_is_out_of_memory() {
        // アドレス空間に収まらないサイズ
        let result = AlignedBuffer::zeroed(1 << 62, BlockSize::min());
        assert_eq!(result.err().map(|e| *e.kind()), Some(ErrorKind::OutOfMemory));
    }
}
