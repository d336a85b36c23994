use slog::Logger;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use trackable::error::ErrorKindExt;

use crate::dump::{headline, DumpResult};
use crate::metrics::DumpMetrics;
use crate::partition::DestinationAssignment;
use crate::registry::Chunk;
use crate::sink::DumpSink;
use crate::timer::Stopwatch;
use crate::{Error, ErrorKind, Result};

/// 一つのダンプ先を担当するワーカー.
///
/// 割り当てられた範囲のチャンク群を、インデックスの昇順にダンプファイルに書き込み、
/// 最後にフラッシュおよび物理デバイスへの同期を行う.
///
/// ワーカーは途中でエラーが発生しても中断されることはなく、
/// エラーは全て結果の警告として報告される.
#[derive(Debug)]
pub struct DumpWorker {
    assignment: DestinationAssignment,
    file_path: PathBuf,
    logger: Logger,
    metrics: DumpMetrics,
}
impl DumpWorker {
    /// 新しい`DumpWorker`インスタンスを生成する.
    ///
    /// 通常は`DumpCoordinator`がダンプ先毎に生成するが、
    /// 任意の`DumpSink`実装にダンプしたい場合には直接生成して`run`を呼び出せば良い.
    ///
    /// # Examples
    ///
    /// ```
    /// #[macro_use]
    /// extern crate slog;
    ///
    /// use chunkdump::dump::DumpWorker;
    /// use chunkdump::metrics::DumpMetrics;
    /// use chunkdump::partition;
    /// use chunkdump::registry::RegistryBuilder;
    /// use chunkdump::sink::MemorySink;
    /// use prometrics::metrics::MetricBuilder;
    /// use slog::{Discard, Logger};
    ///
    /// # fn main() -> Result<(), chunkdump::Error> {
    /// let mut registry = RegistryBuilder::new().chunk_size(4096).build()?;
    /// registry.allocate()?;
    ///
    /// let assignment = partition::assign(registry.len(), &["memory"])?.remove(0);
    /// let worker = DumpWorker::new(
    ///     assignment,
    ///     "memory/dump.bin".into(),
    ///     Logger::root(Discard, o!()),
    ///     DumpMetrics::new(&MetricBuilder::new()),
    /// );
    ///
    /// let mut sink = MemorySink::new(8192);
    /// let result = worker.run(registry.chunks(), |_| Ok(&mut sink));
    /// assert!(result.is_clean());
    /// assert_eq!(sink.as_bytes(), registry.chunks()[0].as_bytes());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        assignment: DestinationAssignment,
        file_path: PathBuf,
        logger: Logger,
        metrics: DumpMetrics,
    ) -> Self {
        let logger = logger.new(o!("file" => file_path.display().to_string()));
        DumpWorker {
            assignment,
            file_path,
            logger,
            metrics,
        }
    }

    /// ダンプファイルのパスを返す.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// ダンプを実行する.
    ///
    /// `chunks`はレジストリが保持するチャンク群全体で、
    /// その内の割り当てられた範囲のみが書き込まれる.
    ///
    /// ダンプ先は`open`にダンプファイルのパスを渡して生成される.
    /// 結果の所要時間は、`open`の呼び出し前から、ダンプ先のクローズ(破棄)後までの時間となる.
    pub fn run<F, S>(self, chunks: &[Chunk], open: F) -> DumpResult
    where
        F: FnOnce(&Path) -> Result<S>,
        S: DumpSink,
    {
        let stopwatch = Stopwatch::start();
        let mut warnings = Vec::new();
        debug!(self.logger, "Dump worker started";
               "first_chunk" => self.assignment.first_chunk_index(),
               "chunks" => self.assignment.len());

        let bytes_written = match track!(open(&self.file_path)) {
            Err(e) => {
                let e = ErrorKind::FileCreate.cause(format!(
                    "Failed to create dump file {}: {}",
                    self.file_path.display(),
                    headline(&e)
                ));
                self.report(track!(Error::from(e)), &mut warnings);
                0
            }
            Ok(mut sink) => {
                let bytes_written = self.write_chunks(&mut sink, chunks, &mut warnings);
                if let Err(e) = track!(self.finish(&mut sink)) {
                    self.report(e, &mut warnings);
                }
                bytes_written
            }
        };
        self.metrics.written_bytes.add_u64(bytes_written);

        let elapsed = stopwatch.elapsed();
        info!(self.logger, "Dump worker finished";
              "bytes" => bytes_written,
              "elapsed_seconds" => elapsed.as_secs_f64(),
              "warnings" => warnings.len());
        DumpResult {
            destination: self.assignment.destination().to_path_buf(),
            file_path: self.file_path,
            chunks: self.assignment.chunks(),
            bytes_written,
            elapsed,
            warnings,
        }
    }

    fn write_chunks<S: DumpSink>(
        &self,
        sink: &mut S,
        chunks: &[Chunk],
        warnings: &mut Vec<Error>,
    ) -> u64 {
        let assigned = match chunks.get(self.assignment.chunks()) {
            Some(assigned) => assigned,
            None => {
                let e = ErrorKind::Other.cause(format!(
                    "Assigned chunks {:?} are out of range (chunks={})",
                    self.assignment.chunks(),
                    chunks.len()
                ));
                self.report(track!(Error::from(e)), warnings);
                return 0;
            }
        };

        let mut total = 0;
        for (index, chunk) in self.assignment.chunks().zip(assigned) {
            let (written, io_error) = write_fully(sink, chunk.as_bytes());
            total += written;
            if written < chunk.size() {
                let mut message = format!(
                    "Chunk #{}: Wrote {} bytes instead of {} bytes",
                    index + 1,
                    written,
                    chunk.size()
                );
                if let Some(e) = io_error {
                    message.push_str(&format!(" ({})", e));
                }
                let e = ErrorKind::ShortWrite.cause(message);
                self.report(track!(Error::from(e)), warnings);
            }
            debug!(self.logger, "Chunk #{} written", index + 1; "bytes" => written);
        }
        total
    }

    fn finish<S: DumpSink>(&self, sink: &mut S) -> Result<()> {
        if let Err(e) = sink.flush() {
            track_panic!(ErrorKind::SyncFailed, "Flush failed: {}", e);
        }
        if let Err(e) = sink.sync() {
            track_panic!(ErrorKind::SyncFailed, "Sync failed: {}", headline(&e));
        }
        Ok(())
    }

    fn report(&self, e: Error, warnings: &mut Vec<Error>) {
        self.metrics.warnings.increment(*e.kind());
        warn!(self.logger, "{}", headline(&e));
        warnings.push(e);
    }
}

/// バッファの全ての内容の書き込みを試みて、実際に書き込めたバイト数を返す.
///
/// 部分的な書き込みは、`0`バイトの書き込みないしエラーが発生するまで継続される.
fn write_fully<W: Write>(writer: &mut W, mut buf: &[u8]) -> (u64, Option<io::Error>) {
    let mut written = 0;
    while !buf.is_empty() {
        match writer.write(buf) {
            Ok(0) => break,
            Ok(n) => {
                written += n as u64;
                buf = &buf[n..];
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return (written, Some(e)),
        }
    }
    (written, None)
}
