//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

use crate::ErrorKind;

/// [`Registry`]のメトリクス.
///
/// [`Registry`]: ../registry/struct.Registry.html
#[derive(Debug, Clone)]
pub struct RegistryMetrics {
    pub(crate) chunk_size_bytes: Gauge,
    pub(crate) allocated_chunks: Counter,
    pub(crate) released_chunks: Counter,
    pub(crate) capacity_exceeded_failures: Counter,
    pub(crate) out_of_memory_failures: Counter,
}
impl RegistryMetrics {
    /// 一つのチャンクのサイズ.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// chunkdump_registry_chunk_size_bytes <GAUGE>
    /// ```
    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_bytes.value() as u64
    }

    /// 確保されたチャンクの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// chunkdump_registry_allocated_chunks_total <COUNTER>
    /// ```
    pub fn allocated_chunks(&self) -> u64 {
        self.allocated_chunks.value() as u64
    }

    /// 解放されたチャンクの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// chunkdump_registry_released_chunks_total <COUNTER>
    /// ```
    pub fn released_chunks(&self) -> u64 {
        self.released_chunks.value() as u64
    }

    /// 現在レジストリが保持しているチャンクの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// chunkdump_registry_allocated_chunks_total - chunkdump_registry_released_chunks_total
    /// ```
    pub fn live_chunks(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_chunks();
        let inc = self.allocated_chunks();
        inc - dec
    }

    /// 確保に失敗した回数.
    ///
    /// 返り値のタプルの第一要素は`reason="capacity_exceeded"`ラベルを持ち、
    /// 第二要素は`reason="out_of_memory"`ラベルを持つ.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// chunkdump_registry_allocation_failures_total { reason="capacity_exceeded|out_of_memory" } <COUNTER>
    /// ```
    pub fn allocation_failures(&self) -> (u64, u64) {
        (
            self.capacity_exceeded_failures.value() as u64,
            self.out_of_memory_failures.value() as u64,
        )
    }

    pub(crate) fn count_failure(&self, kind: ErrorKind) {
        match kind {
            ErrorKind::CapacityExceeded => self.capacity_exceeded_failures.increment(),
            ErrorKind::OutOfMemory => self.out_of_memory_failures.increment(),
            _ => {}
        }
    }

    pub(crate) fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("chunkdump").subsystem("registry");
        RegistryMetrics {
            chunk_size_bytes: builder
                .gauge("chunk_size_bytes")
                .help("Size of a chunk")
                .finish()
                .expect("Never fails"),
            allocated_chunks: builder
                .counter("allocated_chunks_total")
                .help("Number of allocated chunks")
                .finish()
                .expect("Never fails"),
            released_chunks: builder
                .counter("released_chunks_total")
                .help("Number of released chunks")
                .finish()
                .expect("Never fails"),
            capacity_exceeded_failures: builder
                .counter("allocation_failures_total")
                .help("Number of failed allocations")
                .label("reason", "capacity_exceeded")
                .finish()
                .expect("Never fails"),
            out_of_memory_failures: builder
                .counter("allocation_failures_total")
                .help("Number of failed allocations")
                .label("reason", "out_of_memory")
                .finish()
                .expect("Never fails"),
        }
    }
}

/// [`DumpCoordinator`]のメトリクス.
///
/// [`DumpCoordinator`]: ../dump/struct.DumpCoordinator.html
#[derive(Debug, Clone)]
pub struct DumpMetrics {
    pub(crate) dumps: Counter,
    pub(crate) workers: Counter,
    pub(crate) written_bytes: Counter,
    pub(crate) last_elapsed_seconds: Gauge,
    pub(crate) warnings: DumpWarningCounter,
}
impl DumpMetrics {
    /// 実行されたダンプ操作の数.
    ///
    /// 「ダンプ対象がなかった」場合は含まれない.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// chunkdump_dump_operations_total <COUNTER>
    /// ```
    pub fn dumps(&self) -> u64 {
        self.dumps.value() as u64
    }

    /// 起動されたワーカーの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// chunkdump_dump_workers_total <COUNTER>
    /// ```
    pub fn workers(&self) -> u64 {
        self.workers.value() as u64
    }

    /// ダンプ先に書き込まれたバイト数の合計.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// chunkdump_dump_written_bytes_total <COUNTER>
    /// ```
    pub fn written_bytes(&self) -> u64 {
        self.written_bytes.value() as u64
    }

    /// 直近のダンプ操作全体の所要時間(秒).
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// chunkdump_dump_last_elapsed_seconds <GAUGE>
    /// ```
    pub fn last_elapsed_seconds(&self) -> f64 {
        self.last_elapsed_seconds.value()
    }

    /// ワーカーが報告した警告の数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// chunkdump_dump_warnings_total { kind="file_create|short_write|sync|other" } <COUNTER>
    /// ```
    pub fn warnings(&self) -> &DumpWarningCounter {
        &self.warnings
    }

    /// 新しい`DumpMetrics`インスタンスを生成する.
    ///
    /// `DumpWorker`を直接生成する場合に使用する.
    /// `DumpCoordinator`は`DumpBuilder::metrics`で指定された設定から、これを生成する.
    pub fn new(builder: &MetricBuilder) -> Self {
        let mut builder = builder.clone();
        builder.namespace("chunkdump").subsystem("dump");
        DumpMetrics {
            dumps: builder
                .counter("operations_total")
                .help("Number of dump operations")
                .finish()
                .expect("Never fails"),
            workers: builder
                .counter("workers_total")
                .help("Number of spawned dump workers")
                .finish()
                .expect("Never fails"),
            written_bytes: builder
                .counter("written_bytes_total")
                .help("Number of bytes written to dump files")
                .finish()
                .expect("Never fails"),
            last_elapsed_seconds: builder
                .gauge("last_elapsed_seconds")
                .help("Wall-clock time of the last dump operation")
                .finish()
                .expect("Never fails"),
            warnings: DumpWarningCounter::new(&builder),
        }
    }
}

/// ダンプ時の警告の種類毎のカウンタ.
#[derive(Debug, Clone)]
pub struct DumpWarningCounter {
    pub(crate) file_create: Counter,
    pub(crate) short_write: Counter,
    pub(crate) sync: Counter,
    pub(crate) other: Counter,
}
impl DumpWarningCounter {
    /// `kind="file_create"`
    pub fn file_create(&self) -> u64 {
        self.file_create.value() as u64
    }

    /// `kind="short_write"`
    pub fn short_write(&self) -> u64 {
        self.short_write.value() as u64
    }

    /// `kind="sync"`
    pub fn sync(&self) -> u64 {
        self.sync.value() as u64
    }

    /// `kind="other"`
    pub fn other(&self) -> u64 {
        self.other.value() as u64
    }

    /// 全ての種類の合計値.
    pub fn sum(&self) -> u64 {
        self.file_create() + self.short_write() + self.sync() + self.other()
    }

    pub(crate) fn increment(&self, kind: ErrorKind) {
        match kind {
            ErrorKind::FileCreate => self.file_create.increment(),
            ErrorKind::ShortWrite => self.short_write.increment(),
            ErrorKind::SyncFailed => self.sync.increment(),
            _ => self.other.increment(),
        }
    }

    fn new(builder: &MetricBuilder) -> Self {
        let counter = |kind| {
            builder
                .counter("warnings_total")
                .help("Number of warnings reported by dump workers")
                .label("kind", kind)
                .finish()
                .expect("Never fails")
        };
        DumpWarningCounter {
            file_create: counter("file_create"),
            short_write: counter("short_write"),
            sync: counter("sync"),
            other: counter("other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;

    use super::*;

    #[test]
    fn registry_metrics_works() {
        let metrics = RegistryMetrics::new(&MetricBuilder::new());
        metrics.allocated_chunks.add_u64(3);
        metrics.released_chunks.increment();
        metrics.count_failure(ErrorKind::CapacityExceeded);
        metrics.count_failure(ErrorKind::OutOfMemory);
        metrics.count_failure(ErrorKind::OutOfMemory);
        metrics.count_failure(ErrorKind::InvalidInput);

        assert_eq!(metrics.live_chunks(), 2);
        assert_eq!(metrics.allocation_failures(), (1, 2));
    }

    #[test]
    fn warning_counter_works() {
        let metrics = DumpMetrics::new(&MetricBuilder::new());
        metrics.warnings.increment(ErrorKind::ShortWrite);
        metrics.warnings.increment(ErrorKind::ShortWrite);
        metrics.warnings.increment(ErrorKind::SyncFailed);
        metrics.warnings.increment(ErrorKind::Other);

        assert_eq!(metrics.warnings().short_write(), 2);
        assert_eq!(metrics.warnings().sync(), 1);
        assert_eq!(metrics.warnings().file_create(), 0);
        assert_eq!(metrics.warnings().sum(), 4);
    }
}
