//! 確保済みのメモリチャンク群を管理するレジストリ.
//!
//! [Registry]は固定長のチャンクを確保順に保持し、それらの列挙および一括解放を提供する.
//! 保持しているチャンクの内容は、[dump]モジュールによってファイルに書き出される.
//!
//! レジストリの状態は永続化されず、プロセスの終了(ないし`Registry`の破棄)と共に全て解放される.
//!
//! [Registry]: struct.Registry.html
//! [dump]: ../dump/index.html
use slog::Logger;
use std::fmt;
use std::iter::Enumerate;
use std::slice;

pub use self::builder::RegistryBuilder;
pub use self::chunk::Chunk;

use crate::block::{AlignedBuffer, BlockSize};
use crate::metrics::RegistryMetrics;
use crate::{ErrorKind, Result};

mod builder;
mod chunk;

/// デフォルトのチャンクサイズ(10GiB).
pub const CHUNK_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// デフォルトの保持可能な最大チャンク数.
pub const MAX_CHUNKS: usize = 100;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// 確保済みのメモリチャンク群を保持するレジストリ.
///
/// チャンクは確保順に`0`から始まるインデックスで識別され、
/// `[0, len())`の範囲のインデックスは常に有効なチャンクを指している.
///
/// # 並行性
///
/// ダンプ処理は`&Registry`を借用した状態で行われるため、
/// ダンプ中に`allocate`や`release_all`が呼び出されることはない.
#[derive(Debug)]
pub struct Registry {
    chunks: Vec<Chunk>,
    chunk_size: usize,
    max_chunks: usize,
    block_size: BlockSize,
    metrics: RegistryMetrics,
    logger: Logger,
}
impl Registry {
    /// デフォルト設定で空のレジストリを生成する.
    ///
    /// 設定を変更したい場合には`RegistryBuilder`を使用すること.
    pub fn new() -> Result<Self> {
        track!(RegistryBuilder::new().build())
    }

    /// 新しいチャンクを確保して、レジストリの末尾に追加する.
    ///
    /// チャンクの内容はゼロで初期化される.
    ///
    /// # Errors
    ///
    /// - 既に最大数のチャンクを保持している場合には`ErrorKind::CapacityExceeded`
    /// - アロケータが領域を確保できなかった場合には`ErrorKind::OutOfMemory`
    ///
    /// いずれの場合もレジストリの状態は変更されない.
    pub fn allocate(&mut self) -> Result<ChunkInfo> {
        track!(self.allocate_with(|_| {}))
    }

    /// `allocate`メソッドに、チャンクの内容の初期化を加えたメソッド.
    ///
    /// `init`はチャンクがレジストリに登録される前に一度だけ呼び出される.
    /// 登録後のチャンクの内容が変更されることはない.
    pub fn allocate_with<F>(&mut self, init: F) -> Result<ChunkInfo>
    where
        F: FnOnce(&mut [u8]),
    {
        let mut buf = match track!(self.allocate_buffer()) {
            Ok(buf) => buf,
            Err(e) => {
                self.metrics.count_failure(*e.kind());
                warn!(self.logger, "Cannot allocate a chunk: {}", e;
                      "chunks" => self.chunks.len(), "chunk_size" => self.chunk_size);
                return Err(e);
            }
        };
        init(&mut buf[..]);

        let index = self.chunks.len();
        self.chunks.push(Chunk::new(buf));
        self.metrics.allocated_chunks.increment();

        let info = ChunkInfo::new(index, &self.chunks[index]);
        info!(self.logger, "Allocated {:.2} GB (Chunk #{})", info.size as f64 / GIB, info.number();
              "address" => format!("{:#018x}", info.address));
        Ok(info)
    }

    /// 保持している全てのチャンクを確保順に列挙する.
    ///
    /// 返り値のイテレータは遅延評価され、副作用を持たない.
    /// 最初から列挙し直したい場合には、再度このメソッドを呼び出すか、イテレータを複製すれば良い.
    pub fn list(&self) -> Allocations {
        Allocations {
            inner: self.chunks.iter().enumerate(),
        }
    }

    /// 保持しているチャンクの一覧を表示するためのオブジェクトを返す.
    pub fn listing(&self) -> Listing {
        Listing(self)
    }

    /// 保持している全てのチャンクを解放して、レジストリを空にする.
    ///
    /// 解放したチャンクの数を返す.
    /// 既に空の場合には何も行わず`0`を返す.
    pub fn release_all(&mut self) -> usize {
        let released = self.chunks.len();
        if released == 0 {
            return 0;
        }
        self.chunks.clear();
        self.metrics.released_chunks.add_u64(released as u64);
        info!(self.logger, "Freed all allocated memory"; "chunks" => released);
        released
    }

    /// 保持しているチャンクの数を返す.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// チャンクを一つも保持していない場合には`true`を返す.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 保持可能なチャンクの最大数を返す.
    pub fn capacity(&self) -> usize {
        self.max_chunks
    }

    /// 一つのチャンクのサイズ(バイト単位)を返す.
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size as u64
    }

    /// チャンクのバッファの開始位置が揃えられているブロック境界を返す.
    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// 保持しているチャンクの合計サイズ(バイト単位)を返す.
    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(Chunk::size).sum()
    }

    /// 保持しているチャンク群を確保順に返す.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// レジストリのメトリクスを返す.
    pub fn metrics(&self) -> &RegistryMetrics {
        &self.metrics
    }

    fn allocate_buffer(&self) -> Result<AlignedBuffer> {
        track_assert!(
            self.chunks.len() < self.max_chunks,
            ErrorKind::CapacityExceeded,
            "Maximum allocations ({}) reached",
            self.max_chunks
        );
        track!(AlignedBuffer::zeroed(self.chunk_size, self.block_size))
    }
}

/// チャンクの情報.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkInfo {
    /// レジストリ内でのインデックス(`0`始まり).
    pub index: usize,

    /// チャンクのバッファの先頭アドレス(表示用).
    pub address: usize,

    /// チャンクのサイズ(バイト単位).
    pub size: u64,
}
impl ChunkInfo {
    fn new(index: usize, chunk: &Chunk) -> Self {
        ChunkInfo {
            index,
            address: chunk.address(),
            size: chunk.size(),
        }
    }

    /// 表示用の`1`始まりの番号を返す.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

/// レジストリが保持するチャンク群を列挙するためのイテレータ.
///
/// `Registry::list`メソッドによって生成される.
#[derive(Debug, Clone)]
pub struct Allocations<'a> {
    inner: Enumerate<slice::Iter<'a, Chunk>>,
}
impl<'a> Iterator for Allocations<'a> {
    type Item = ChunkInfo;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|(index, chunk)| ChunkInfo::new(index, chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
impl<'a> ExactSizeIterator for Allocations<'a> {}

/// チャンクの一覧の表形式での表示.
///
/// `Registry::listing`メソッドによって生成される.
#[derive(Debug)]
pub struct Listing<'a>(&'a Registry);
impl<'a> fmt::Display for Listing<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let registry = self.0;
        if registry.is_empty() {
            return writeln!(f, "No memory allocated yet.");
        }

        writeln!(f, "===============================================")?;
        writeln!(f, "{:<6} {:<18} {:<10}", "Index", "Address", "Size(GB)")?;
        writeln!(f, "-----------------------------------------------")?;
        for info in registry.list() {
            writeln!(
                f,
                "{:<6} {:#018x} {:8.2}",
                info.number(),
                info.address,
                info.size as f64 / GIB
            )?;
        }
        writeln!(f, "-----------------------------------------------")?;
        writeln!(
            f,
            "Total: {} chunk(s), {:.2} GB",
            registry.len(),
            registry.total_bytes() as f64 / GIB
        )?;
        writeln!(f, "===============================================")
    }
}
