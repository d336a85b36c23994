use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};

use crate::block::BlockSize;
use crate::dump::DumpCoordinator;
use crate::metrics::DumpMetrics;
use crate::sink::FileSinkBuilder;

/// `DumpCoordinator`のビルダ.
#[derive(Debug, Clone)]
pub struct DumpBuilder {
    sink: FileSinkBuilder,
    metrics: MetricBuilder,
    logger: Logger,
}
impl DumpBuilder {
    /// デフォルト設定で`DumpBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        DumpBuilder {
            sink: FileSinkBuilder::new(),
            metrics: MetricBuilder::new(),
            logger: Logger::root(Discard, o!()),
        }
    }

    /// ダンプファイルへの書き込みにダイレクトI/Oを使用するかどうかを設定する.
    ///
    /// `true`の場合には、レジストリのチャンクサイズおよびブロック境界が、
    /// `block_size`メソッドで指定した値に揃っている必要がある.
    ///
    /// デフォルト値は`false`.
    pub fn direct_io(&mut self, enabled: bool) -> &mut Self {
        self.sink.direct_io(enabled);
        self
    }

    /// ダイレクトI/Oを使用する場合の、ダンプ先デバイスのブロックサイズを設定する.
    ///
    /// デフォルト値は`BlockSize::default()`.
    pub fn block_size(&mut self, block_size: BlockSize) -> &mut Self {
        self.sink.block_size(block_size);
        self
    }

    /// ダンプ先のディレクトリが存在しない場合に、それを作成するかどうかを設定する.
    ///
    /// `false`の場合には、存在しないダンプ先へのダンプは警告となる.
    ///
    /// デフォルト値は`false`.
    pub fn create_parent_dirs(&mut self, enabled: bool) -> &mut Self {
        self.sink.create_parent_dirs(enabled);
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// ダンプ処理用の logger を登録する
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// 指定された設定で`DumpCoordinator`を生成する.
    pub fn finish(&self) -> DumpCoordinator {
        DumpCoordinator {
            sink: self.sink.clone(),
            metrics: DumpMetrics::new(&self.metrics),
            logger: self.logger.clone(),
        }
    }
}
impl Default for DumpBuilder {
    fn default() -> Self {
        Self::new()
    }
}
