use chrono::{Local, NaiveDateTime};
use slog::Logger;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;
use trackable::error::ErrorKindExt;

use crate::dump::{file_name, DumpBuilder, DumpResult, DumpSummary, DumpWorker};
use crate::dump::{MAX_DESTINATIONS, MAX_PATH_LEN};
use crate::metrics::DumpMetrics;
use crate::partition::{self, DestinationAssignment};
use crate::registry::{Chunk, Registry};
use crate::sink::{DumpSink, FileSinkBuilder};
use crate::timer::{CpuStopwatch, Stopwatch};
use crate::{ErrorKind, Result};

/// ダンプ操作の調整役.
///
/// チャンク群をダンプ先群に割り当て、ダンプ先毎に一つのスレッドでワーカーを実行し、
/// 全てのワーカーの終了を待機して結果を集計する.
///
/// 複数のダンプ先が同一の物理デバイス上にある場合でも、特に考慮は行われない.
#[derive(Debug, Clone)]
pub struct DumpCoordinator {
    pub(crate) sink: FileSinkBuilder,
    pub(crate) metrics: DumpMetrics,
    pub(crate) logger: Logger,
}
impl DumpCoordinator {
    /// デフォルト設定で`DumpCoordinator`を生成する.
    ///
    /// 設定を変更したい場合には`DumpBuilder`を使用すること.
    pub fn new() -> Self {
        DumpBuilder::new().finish()
    }

    /// ダンプ処理のメトリクスを返す.
    pub fn metrics(&self) -> &DumpMetrics {
        &self.metrics
    }

    /// レジストリが保持する全てのチャンクを、指定されたダンプ先群にダンプする.
    ///
    /// 各ダンプ先には`dump_file_YYYYMMDD_HHMMSS.bin`という名前のファイルが作成される.
    /// 時刻はこのメソッドの呼び出し時のローカル時刻.
    ///
    /// `dump_at`メソッドも参照のこと.
    pub fn dump<P: AsRef<Path>>(
        &self,
        registry: &Registry,
        destinations: &[P],
    ) -> Result<DumpSummary> {
        let timestamp = Local::now().naive_local();
        track!(self.dump_at(registry, destinations, timestamp))
    }

    /// 指定時刻に基づくファイル名で、レジストリが保持する全てのチャンクをダンプする.
    ///
    /// レジストリが空の場合には、何も行わずに`DumpSummary::is_nothing_to_dump`が`true`となる結果を返す.
    ///
    /// 個々のダンプ先でのエラーは、このメソッドの失敗とはならず、結果に警告として記録される.
    ///
    /// # Errors
    ///
    /// 以下の場合には、ワーカーを一つも起動することなくエラーが返される:
    ///
    /// - `destinations`が空: `ErrorKind::NoDestinations`
    /// - `destinations`の数が`MAX_DESTINATIONS`を超えている: `ErrorKind::InvalidInput`
    /// - パスが空ないし`MAX_PATH_LEN`バイトを超えるダンプ先がある: `ErrorKind::InvalidInput`
    /// - 同じパスのダンプ先が複数含まれている: `ErrorKind::InvalidInput`
    /// - ダイレクトI/Oが有効で、チャンクがそのブロックサイズに揃っていない: `ErrorKind::InvalidInput`
    pub fn dump_at<P: AsRef<Path>>(
        &self,
        registry: &Registry,
        destinations: &[P],
        timestamp: NaiveDateTime,
    ) -> Result<DumpSummary> {
        if registry.is_empty() {
            info!(self.logger, "No memory allocated yet. Nothing to dump.");
            return Ok(DumpSummary::nothing_to_dump());
        }
        track!(self.check_destinations(destinations))?;
        track!(self.check_alignment(registry))?;

        let file_name = file_name(&timestamp);
        let assignments = track!(partition::assign(registry.len(), destinations))?;
        info!(self.logger, "Starting memory dump";
              "file_name" => &file_name,
              "chunks" => registry.len(),
              "destinations" => assignments.len());

        let cpu_stopwatch = CpuStopwatch::start();
        let stopwatch = Stopwatch::start();
        let sink = &self.sink;
        let results = self.run_workers(registry.chunks(), assignments, &file_name, |path| {
            sink.create(path)
        });
        let elapsed = stopwatch.elapsed();
        let cpu_time = cpu_stopwatch.elapsed();

        let summary = DumpSummary {
            file_name: Some(file_name),
            results,
            elapsed,
            cpu_time,
        };
        self.metrics.dumps.increment();
        self.metrics.last_elapsed_seconds.set(summary.elapsed_seconds());
        info!(self.logger, "Memory dump completed";
              "total_bytes" => summary.total_bytes(),
              "elapsed_seconds" => summary.elapsed_seconds(),
              "cpu_seconds" => summary.cpu_seconds(),
              "warnings" => summary.warnings().count());
        Ok(summary)
    }

    fn check_destinations<P: AsRef<Path>>(&self, destinations: &[P]) -> Result<()> {
        track_assert!(!destinations.is_empty(), ErrorKind::NoDestinations);
        track_assert!(
            destinations.len() <= MAX_DESTINATIONS,
            ErrorKind::InvalidInput,
            "Too many destinations: {} (max={})",
            destinations.len(),
            MAX_DESTINATIONS
        );
        let mut seen = HashSet::new();
        for d in destinations {
            track_assert!(
                seen.insert(d.as_ref()),
                ErrorKind::InvalidInput,
                "Duplicate destination: {}",
                d.as_ref().display()
            );
            let len = d.as_ref().as_os_str().len();
            track_assert_ne!(len, 0, ErrorKind::InvalidInput, "Empty destination path");
            track_assert!(
                len <= MAX_PATH_LEN,
                ErrorKind::InvalidInput,
                "Too long destination path: {} bytes (max={})",
                len,
                MAX_PATH_LEN
            );
        }
        Ok(())
    }

    fn check_alignment(&self, registry: &Registry) -> Result<()> {
        if let Some(block_size) = self.sink.direct_io_block_size() {
            track_assert!(
                registry.block_size().contains(block_size),
                ErrorKind::InvalidInput,
                "Chunks are not aligned to the direct I/O block size: chunk_alignment={}, block_size={}",
                registry.block_size().as_u16(),
                block_size.as_u16()
            );
            track_assert!(
                block_size.is_aligned(registry.chunk_size()),
                ErrorKind::InvalidInput,
                "Chunk size is not a multiple of the direct I/O block size: chunk_size={}, block_size={}",
                registry.chunk_size(),
                block_size.as_u16()
            );
        }
        Ok(())
    }

    fn run_workers<F, S>(
        &self,
        chunks: &[Chunk],
        assignments: Vec<DestinationAssignment>,
        file_name: &str,
        open: F,
    ) -> Vec<DumpResult>
    where
        F: Fn(&Path) -> Result<S> + Sync,
        S: DumpSink,
    {
        let open = &open;
        thread::scope(|scope| {
            let handles = assignments
                .into_iter()
                .map(|assignment| {
                    let file_path = assignment.destination().join(file_name);
                    let fallback = (assignment.clone(), file_path.clone());
                    let worker = DumpWorker::new(
                        assignment,
                        file_path,
                        self.logger.clone(),
                        self.metrics.clone(),
                    );
                    self.metrics.workers.increment();
                    let handle = scope.spawn(move || worker.run(chunks, |path| open(path)));
                    (fallback, handle)
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|((assignment, file_path), handle)| match handle.join() {
                    Ok(result) => result,
                    Err(_) => self.worker_panicked(assignment, file_path),
                })
                .collect()
        })
    }

    fn worker_panicked(&self, assignment: DestinationAssignment, file_path: PathBuf) -> DumpResult {
        let e = track!(crate::Error::from(ErrorKind::Other.cause(format!(
            "Dump worker for {} panicked",
            file_path.display()
        ))));
        self.metrics.warnings.increment(ErrorKind::Other);
        crit!(self.logger, "Dump worker panicked"; "file" => file_path.display().to_string());
        DumpResult {
            destination: assignment.destination().to_path_buf(),
            file_path,
            chunks: assignment.chunks(),
            bytes_written: 0,
            elapsed: Default::default(),
            warnings: vec![e],
        }
    }
}
impl Default for DumpCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use std::fs;
    use tempdir::TempDir;
    use trackable::result::TestResult;

    use super::*;
    use crate::block::BlockSize;
    use crate::registry::RegistryBuilder;
    use crate::sink::MemorySink;

    fn timestamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(3, 4, 5))
            .expect("valid timestamp")
    }

    fn new_registry(chunks: usize, chunk_size: u64) -> Result<Registry> {
        let mut registry = track!(RegistryBuilder::new().chunk_size(chunk_size).build())?;
        for i in 0..chunks {
            track!(registry.allocate_with(|buf| {
                for (j, b) in buf.iter_mut().enumerate() {
                    *b = (i * 31 + j) as u8;
                }
            }))?;
        }
        Ok(registry)
    }

    fn concat(registry: &Registry, chunks: std::ops::Range<usize>) -> Vec<u8> {
        registry.chunks()[chunks]
            .iter()
            .flat_map(|c| c.as_bytes().iter().cloned())
            .collect()
    }

    fn subdirs(dir: &TempDir, names: &[&str]) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for name in names {
            let path = dir.path().join(name);
            track_io!(fs::create_dir(&path))?;
            paths.push(path);
        }
        Ok(paths)
    }

    #[test]
    fn dump_works() -> TestResult {
        let dir = track_io!(TempDir::new("chunkdump_test"))?;
        let destinations = track!(subdirs(&dir, &["a", "b", "c"]))?;
        let registry = track!(new_registry(10, 4096))?;

        let coordinator = DumpCoordinator::new();
        let summary = track!(coordinator.dump_at(&registry, &destinations, timestamp()))?;
        assert_eq!(summary.file_name(), Some("dump_file_20240102_030405.bin"));
        assert_eq!(summary.results().len(), 3);
        assert_eq!(summary.total_bytes(), 10 * 4096);
        assert_eq!(summary.warnings().count(), 0);

        let ranges = summary
            .results()
            .iter()
            .map(|r| r.chunks())
            .collect::<Vec<_>>();
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);

        for (result, destination) in summary.results().iter().zip(&destinations) {
            assert_eq!(result.destination(), destination.as_path());
            assert_eq!(
                result.file_path(),
                destination.join("dump_file_20240102_030405.bin").as_path()
            );
            let bytes = track_io!(fs::read(result.file_path()))?;
            assert_eq!(bytes.len() as u64, result.bytes_written());
            assert_eq!(bytes, concat(&registry, result.chunks()));
        }

        let metrics = coordinator.metrics();
        assert_eq!(metrics.dumps(), 1);
        assert_eq!(metrics.workers(), 3);
        assert_eq!(metrics.written_bytes(), 10 * 4096);
        assert_eq!(metrics.warnings().sum(), 0);
        Ok(())
    }

    #[test]
    fn more_destinations_than_chunks() -> TestResult {
        let dir = track_io!(TempDir::new("chunkdump_test"))?;
        let destinations = track!(subdirs(&dir, &["a", "b", "c", "d", "e"]))?;
        let registry = track!(new_registry(2, 512))?;

        let summary = track!(DumpCoordinator::new().dump_at(&registry, &destinations, timestamp()))?;
        let sizes = summary
            .results()
            .iter()
            .map(|r| r.bytes_written())
            .collect::<Vec<_>>();
        assert_eq!(sizes, vec![512, 512, 0, 0, 0]);

        // チャンクが割り当てられなかったダンプ先にも空のファイルが作成される
        for result in summary.results() {
            let metadata = track_io!(fs::metadata(result.file_path()))?;
            assert_eq!(metadata.len(), result.bytes_written());
            assert!(result.is_clean());
        }
        Ok(())
    }

    #[test]
    fn nothing_to_dump() -> TestResult {
        let dir = track_io!(TempDir::new("chunkdump_test"))?;
        let registry = track!(new_registry(0, 512))?;

        let coordinator = DumpCoordinator::new();
        let summary = track!(coordinator.dump_at(&registry, &[dir.path()], timestamp()))?;
        assert!(summary.is_nothing_to_dump());
        assert_eq!(summary.file_name(), None);
        assert_eq!(summary.total_bytes(), 0);
        assert_eq!(
            summary.to_string(),
            "[INFO] No memory allocated yet. Nothing to dump.\n"
        );

        // ファイルは作成されない
        assert_eq!(track_io!(fs::read_dir(dir.path()))?.count(), 0);
        assert_eq!(coordinator.metrics().dumps(), 0);

        // ダンプ先が空でも、チャンクがなければエラーにはならない
        let none: &[&Path] = &[];
        let summary = track!(coordinator.dump_at(&registry, none, timestamp()))?;
        assert!(summary.is_nothing_to_dump());
        Ok(())
    }

    #[test]
    fn invalid_destinations_are_rejected() -> TestResult {
        let dir = track_io!(TempDir::new("chunkdump_test"))?;
        let registry = track!(new_registry(1, 512))?;
        let coordinator = DumpCoordinator::new();

        let none: &[&Path] = &[];
        let e = coordinator.dump_at(&registry, none, timestamp()).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::NoDestinations));

        let too_many = (0..=MAX_DESTINATIONS)
            .map(|i| dir.path().join(i.to_string()))
            .collect::<Vec<_>>();
        let e = coordinator.dump_at(&registry, &too_many, timestamp()).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));

        let e = coordinator
            .dump_at(&registry, &[Path::new("")], timestamp())
            .err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));

        let too_long = dir.path().join("x".repeat(MAX_PATH_LEN));
        let e = coordinator
            .dump_at(&registry, &[dir.path(), too_long.as_path()], timestamp())
            .err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));

        // いずれの場合もファイルは作成されない
        assert_eq!(track_io!(fs::read_dir(dir.path()))?.count(), 0);
        assert_eq!(coordinator.metrics().workers(), 0);

        let names = (0..MAX_DESTINATIONS)
            .map(|i| i.to_string())
            .collect::<Vec<_>>();
        let names = names.iter().map(|n| n.as_str()).collect::<Vec<_>>();
        let max = track!(subdirs(&dir, &names))?;
        let summary = track!(coordinator.dump_at(&registry, &max, timestamp()))?;
        assert_eq!(summary.results().len(), MAX_DESTINATIONS);
        assert_eq!(summary.total_bytes(), 512);
        Ok(())
    }

    #[test]
    fn duplicate_destinations_are_rejected() -> TestResult {
        let dir = track_io!(TempDir::new("chunkdump_test"))?;
        let destinations = track!(subdirs(&dir, &["a", "b"]))?;
        let registry = track!(new_registry(2, 512))?;
        let coordinator = DumpCoordinator::new();

        let duplicated = [&destinations[0], &destinations[1], &destinations[0]];
        let e = coordinator.dump_at(&registry, &duplicated, timestamp()).err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));

        for d in &destinations {
            assert_eq!(track_io!(fs::read_dir(d))?.count(), 0);
        }
        assert_eq!(coordinator.metrics().workers(), 0);
        Ok(())
    }

    #[test]
    fn panicking_worker_is_reported_as_warning() -> TestResult {
        let registry = track!(new_registry(3, 512))?;
        let assignments = track!(partition::assign(registry.len(), &["a", "b", "c"]))?;
        let coordinator = DumpCoordinator::new();

        let results = coordinator.run_workers(registry.chunks(), assignments, "dump.bin", |path| {
            if path.starts_with("b") {
                panic!("cannot open {}", path.display());
            }
            Ok(MemorySink::new(1024))
        });
        assert_eq!(results.len(), 3);
        assert!(results[0].is_clean());
        assert!(results[2].is_clean());
        assert_eq!(results[0].bytes_written() + results[2].bytes_written(), 1024);

        let failed = &results[1];
        assert_eq!(failed.file_path(), Path::new("b/dump.bin"));
        assert_eq!(failed.chunks(), 1..2);
        assert_eq!(failed.bytes_written(), 0);
        assert_eq!(failed.warnings().len(), 1);
        assert_eq!(*failed.warnings()[0].kind(), ErrorKind::Other);

        let metrics = coordinator.metrics();
        assert_eq!(metrics.workers(), 3);
        assert_eq!(metrics.warnings().other(), 1);
        Ok(())
    }

    #[test]
    fn unwritable_destination_does_not_abort_others() -> TestResult {
        let dir = track_io!(TempDir::new("chunkdump_test"))?;
        let a = dir.path().join("a");
        let missing = dir.path().join("missing");
        let c = dir.path().join("c");
        track_io!(fs::create_dir(&a))?;
        track_io!(fs::create_dir(&c))?;
        let registry = track!(new_registry(3, 512))?;

        let coordinator = DumpCoordinator::new();
        let summary = track!(coordinator.dump_at(&registry, &[&a, &missing, &c], timestamp()))?;
        let results = summary.results();
        assert!(results[0].is_clean());
        assert!(results[2].is_clean());
        assert_eq!(results[1].bytes_written(), 0);
        assert_eq!(results[1].warnings().len(), 1);
        assert_eq!(*results[1].warnings()[0].kind(), ErrorKind::FileCreate);
        assert!(!missing.exists());

        assert_eq!(summary.total_bytes(), 2 * 512);
        assert_eq!(
            track_io!(fs::read(results[2].file_path()))?,
            concat(&registry, 2..3)
        );
        assert_eq!(coordinator.metrics().warnings().file_create(), 1);

        let report = summary.to_string();
        assert!(report.starts_with("[WARNING] Memory dump completed with 1 warning(s):"));
        assert!(report.contains("Total Data Written: 0.00 GB"));
        Ok(())
    }

    #[test]
    fn create_parent_dirs_works() -> TestResult {
        let dir = track_io!(TempDir::new("chunkdump_test"))?;
        let nested = dir.path().join("foo/bar");
        let registry = track!(new_registry(2, 512))?;

        let coordinator = DumpBuilder::new().create_parent_dirs(true).finish();
        let summary = track!(coordinator.dump_at(&registry, &[&nested], timestamp()))?;
        assert_eq!(summary.warnings().count(), 0);
        assert_eq!(
            track_io!(fs::read(nested.join("dump_file_20240102_030405.bin")))?,
            concat(&registry, 0..2)
        );
        Ok(())
    }

    #[test]
    fn existing_dump_file_is_overwritten() -> TestResult {
        let dir = track_io!(TempDir::new("chunkdump_test"))?;
        let path = dir.path().join("dump_file_20240102_030405.bin");
        track_io!(fs::write(&path, vec![0xFF; 10_000]))?;
        let registry = track!(new_registry(1, 512))?;

        track!(DumpCoordinator::new().dump_at(&registry, &[dir.path()], timestamp()))?;
        assert_eq!(track_io!(fs::read(&path))?, concat(&registry, 0..1));
        Ok(())
    }

    #[test]
    fn direct_io_requires_aligned_chunks() -> TestResult {
        let dir = track_io!(TempDir::new("chunkdump_test"))?;
        let mut registry = track!(RegistryBuilder::new()
            .chunk_size(1000)
            .block_size(BlockSize::min())
            .build())?;
        track!(registry.allocate())?;

        let coordinator = DumpBuilder::new()
            .direct_io(true)
            .block_size(BlockSize::min())
            .finish();
        let e = coordinator
            .dump_at(&registry, &[dir.path()], timestamp())
            .err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));

        let coordinator = DumpBuilder::new()
            .direct_io(true)
            .block_size(track!(BlockSize::new(BlockSize::PAGE))?)
            .finish();
        let e = coordinator
            .dump_at(&registry, &[dir.path()], timestamp())
            .err();
        assert_eq!(e.map(|e| *e.kind()), Some(ErrorKind::InvalidInput));
        assert_eq!(track_io!(fs::read_dir(dir.path()))?.count(), 0);
        Ok(())
    }

    #[test]
    fn report_works() -> TestResult {
        let dir = track_io!(TempDir::new("chunkdump_test"))?;
        let registry = track!(new_registry(2, 512))?;

        let summary = track!(DumpCoordinator::new().dump_at(&registry, &[dir.path()], timestamp()))?;
        let report = summary.to_string();
        assert!(report.starts_with("[SUCCESS] Memory dump completed:\n"));
        assert!(report.contains("dump_file_20240102_030405.bin"));
        assert!(report.contains("    Chunks: #1-#2\n"));
        assert!(report.contains("  Total Data Written: 0.00 GB\n"));
        assert!(report.contains("  Wall-Clock Time: "));
        assert!(report.contains("  CPU Time: "));
        assert!(report.ends_with("===============================================\n"));
        Ok(())
    }
}
