use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};
use std::convert::TryFrom;
use trackable::error::ErrorKindExt;

use crate::block::{AlignedBuffer, BlockSize};
use crate::metrics::RegistryMetrics;
use crate::registry::{Registry, CHUNK_SIZE, MAX_CHUNKS};
use crate::{ErrorKind, Result};

/// `Registry`のビルダ.
#[derive(Debug, Clone)]
pub struct RegistryBuilder {
    chunk_size: u64,
    max_chunks: usize,
    block_size: BlockSize,
    metrics: MetricBuilder,
    logger: Logger,
}
impl RegistryBuilder {
    /// デフォルト設定で`RegistryBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        RegistryBuilder {
            chunk_size: CHUNK_SIZE,
            max_chunks: MAX_CHUNKS,
            block_size: BlockSize::default(),
            metrics: MetricBuilder::new(),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// 一つのチャンクのサイズ(バイト単位)を設定する.
    ///
    /// 全てのチャンクは、このサイズで確保される.
    ///
    /// デフォルト値は`CHUNK_SIZE`(10GiB).
    pub fn chunk_size(&mut self, size: u64) -> &mut Self {
        self.chunk_size = size;
        self
    }

    /// レジストリが保持可能なチャンクの最大数を設定する.
    ///
    /// デフォルト値は`MAX_CHUNKS`(100).
    pub fn max_chunks(&mut self, n: usize) -> &mut Self {
        self.max_chunks = n;
        self
    }

    /// チャンクのバッファの開始位置を揃えるブロック境界を設定する.
    ///
    /// ダイレクトI/Oでダンプを行う場合には、
    /// ダンプ先のブロックサイズを包含する値である必要がある.
    ///
    /// デフォルト値は`BlockSize::default()`.
    pub fn block_size(&mut self, block_size: BlockSize) -> &mut Self {
        self.block_size = block_size;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// レジストリ用の logger を登録する
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// 空の`Registry`を生成する.
    ///
    /// # Errors
    ///
    /// 以下の場合には、種類が`ErrorKind::InvalidInput`のエラーが返される:
    ///
    /// - チャンクサイズが`0`ないし、このプラットフォームのメモリ上で表現できない
    /// - チャンクサイズとブロックサイズの組み合わせでは領域を確保できない
    /// - チャンクの最大数が`0`
    pub fn build(&self) -> Result<Registry> {
        track_assert_ne!(self.chunk_size, 0, ErrorKind::InvalidInput);
        track_assert_ne!(self.max_chunks, 0, ErrorKind::InvalidInput);
        let chunk_size = track!(usize::try_from(self.chunk_size)
            .map_err(|e| ErrorKind::InvalidInput.cause(e)))?;
        track!(AlignedBuffer::layout(chunk_size, self.block_size))?;

        let metrics = RegistryMetrics::new(&self.metrics);
        metrics.chunk_size_bytes.set(self.chunk_size as f64);
        Ok(Registry {
            chunks: Vec::new(),
            chunk_size,
            max_chunks: self.max_chunks,
            block_size: self.block_size,
            metrics,
            logger: self.logger.clone(),
        })
    }
}
impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
