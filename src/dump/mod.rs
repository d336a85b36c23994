//! レジストリが保持するチャンク群のファイルへのダンプ.
//!
//! 一回のダンプ操作は以下の流れで行われる:
//!
//! 1. [DumpCoordinator]が、チャンク群をダンプ先群に[分割]する
//! 2. ダンプ先毎に一つのOSスレッドが起動され、その上で[DumpWorker]が動作する
//!    - 各ワーカーは、割り当てられたチャンク群を順番にファイルに書き込み、物理デバイスへの同期を行う
//! 3. 全てのワーカーの終了を待機した上で、結果が[DumpSummary]に集計される
//!
//! ワーカーで発生したエラー(e.g., ファイル作成の失敗、書き込みの不足、同期の失敗)は、
//! ダンプ操作全体を失敗させることはなく、各ダンプ先の結果に警告として記録される.
//!
//! ダンプファイルはチャンクの内容を単純に連結したものであり、ヘッダ等は含まれない.
//!
//! [DumpCoordinator]: struct.DumpCoordinator.html
//! [分割]: ../partition/index.html
//! [DumpWorker]: struct.DumpWorker.html
//! [DumpSummary]: struct.DumpSummary.html
use chrono::NaiveDateTime;
use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use self::builder::DumpBuilder;
pub use self::coordinator::DumpCoordinator;
pub use self::worker::DumpWorker;

use crate::Error;

mod builder;
mod coordinator;
mod worker;

/// 一回のダンプ操作で指定可能なダンプ先の最大数.
pub const MAX_DESTINATIONS: usize = 32;

/// ダンプ先のパスの最大長(バイト単位).
pub const MAX_PATH_LEN: usize = 511;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// ダンプ操作の時刻から、ダンプファイルの名前を生成する.
///
/// 一回のダンプ操作では、全てのダンプ先で同じ名前が使用される.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use chunkdump::dump::file_name;
///
/// let timestamp = NaiveDate::from_ymd_opt(2024, 1, 2)
///     .and_then(|d| d.and_hms_opt(3, 4, 5))
///     .unwrap();
/// assert_eq!(file_name(&timestamp), "dump_file_20240102_030405.bin");
/// ```
pub fn file_name(timestamp: &NaiveDateTime) -> String {
    timestamp.format("dump_file_%Y%m%d_%H%M%S.bin").to_string()
}

/// エラーの表示文字列の先頭行(i.e., 追跡履歴を除いた部分)を返す.
fn headline(e: &Error) -> String {
    e.to_string().lines().next().unwrap_or_default().to_owned()
}

/// 一つのダンプ先に対するダンプ結果.
#[derive(Debug, Clone)]
pub struct DumpResult {
    pub(crate) destination: PathBuf,
    pub(crate) file_path: PathBuf,
    pub(crate) chunks: Range<usize>,
    pub(crate) bytes_written: u64,
    pub(crate) elapsed: Duration,
    pub(crate) warnings: Vec<Error>,
}
impl DumpResult {
    /// ダンプ先のパスを返す.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// ダンプファイルのパスを返す.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// このダンプ先に割り当てられたチャンクのインデックスの範囲を返す.
    pub fn chunks(&self) -> Range<usize> {
        self.chunks.clone()
    }

    /// 実際に書き込まれたバイト数を返す.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// ファイルのオープンからクローズまでの所要時間を返す.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// ファイルのオープンからクローズまでの所要時間(秒)を返す.
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// ワーカーが報告した警告群を返す.
    ///
    /// 警告の種類は`ErrorKind::FileCreate`、`ErrorKind::ShortWrite`、
    /// `ErrorKind::SyncFailed`ないし`ErrorKind::Other`のいずれか.
    pub fn warnings(&self) -> &[Error] {
        &self.warnings
    }

    /// 警告なしでダンプが完了した場合には`true`を返す.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// 一回のダンプ操作全体の結果.
#[derive(Debug, Clone)]
pub struct DumpSummary {
    pub(crate) file_name: Option<String>,
    pub(crate) results: Vec<DumpResult>,
    pub(crate) elapsed: Duration,
    pub(crate) cpu_time: Option<Duration>,
}
impl DumpSummary {
    pub(crate) fn nothing_to_dump() -> Self {
        DumpSummary {
            file_name: None,
            results: Vec::new(),
            elapsed: Duration::from_secs(0),
            cpu_time: None,
        }
    }

    /// ダンプ対象のチャンクが存在しなかった場合には`true`を返す.
    ///
    /// この場合、ワーカーは一つも起動されておらず、ファイルも作成されていない.
    pub fn is_nothing_to_dump(&self) -> bool {
        self.results.is_empty()
    }

    /// 全てのダンプ先で共通のダンプファイルの名前を返す.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_ref().map(|s| s.as_str())
    }

    /// ダンプ先毎の結果を、ダンプ先の指定順に返す.
    pub fn results(&self) -> &[DumpResult] {
        &self.results
    }

    /// 全てのダンプ先に書き込まれたバイト数の合計を返す.
    pub fn total_bytes(&self) -> u64 {
        self.results.iter().map(|r| r.bytes_written).sum()
    }

    /// ワーカー群の起動から終了の待機までの所要時間を返す.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// ワーカー群の起動から終了の待機までの所要時間(秒)を返す.
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// ダンプ操作の間にプロセスが消費したCPU時間(秒)を返す.
    ///
    /// プラットフォームが未サポートの場合には`None`が返る.
    pub fn cpu_seconds(&self) -> Option<f64> {
        self.cpu_time.map(|d| d.as_secs_f64())
    }

    /// 全てのダンプ先の警告群を返す.
    pub fn warnings(&self) -> impl Iterator<Item = &Error> {
        self.results.iter().flat_map(|r| r.warnings.iter())
    }
}
impl fmt::Display for DumpSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_nothing_to_dump() {
            return writeln!(f, "[INFO] No memory allocated yet. Nothing to dump.");
        }

        let warnings = self.warnings().count();
        if warnings == 0 {
            writeln!(f, "[SUCCESS] Memory dump completed:")?;
        } else {
            writeln!(
                f,
                "[WARNING] Memory dump completed with {} warning(s):",
                warnings
            )?;
        }
        for r in &self.results {
            writeln!(f, "  File: {}", r.file_path.display())?;
            if r.chunks.start < r.chunks.end {
                writeln!(f, "    Chunks: #{}-#{}", r.chunks.start + 1, r.chunks.end)?;
            } else {
                writeln!(f, "    Chunks: none")?;
            }
            writeln!(
                f,
                "    Data Written: {:.2} GB",
                r.bytes_written as f64 / GIB
            )?;
            writeln!(f, "    Wall-Clock Time: {:.6} seconds", r.elapsed_seconds())?;
            for w in &r.warnings {
                writeln!(f, "    [WARNING] {}", headline(w))?;
            }
        }
        writeln!(
            f,
            "  Total Data Written: {:.2} GB",
            self.total_bytes() as f64 / GIB
        )?;
        writeln!(f, "  Wall-Clock Time: {:.6} seconds", self.elapsed_seconds())?;
        match self.cpu_seconds() {
            Some(cpu) => writeln!(f, "  CPU Time: {:.6} seconds", cpu)?,
            None => writeln!(f, "  CPU Time: unsupported")?,
        }
        writeln!(f, "===============================================")
    }
}
