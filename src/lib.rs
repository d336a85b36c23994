//! Chunk Dump.
//!
//! `chunkdump`は、大きな固定長のメモリチャンク群を確保および保持し、
//! その内容を複数のディレクトリに並列にダンプするためのライブラリ.
//!
//! ストレージの書き込み性能の計測(e.g., 複数デバイスへの同時書き込みのスループット)を主な用途としている.
//!
//! # 特徴
//!
//! - チャンクは固定長(デフォルトは10GiB)で、確保時にゼロで初期化される
//! - 一つの[Registry]が保持可能なチャンク数には上限(デフォルトは100)がある
//! - ダンプ時には、チャンク群が連続した範囲としてダンプ先群に均等に[分割]される
//! - 一つのダンプ先に対して一つのOSスレッドが割り当てられ、各スレッドは独立にファイルへの書き込みと同期を行う
//! - 各ダンプ先の所要時間、全体の所要時間およびプロセスのCPU時間が計測される
//! - 永続化されるのはダンプファイルのみで、チャンクの一覧等の状態はプロセスの終了と共に失われる
//!
//! # モジュールの依存関係
//!
//! ```text
//! dump => (registry, partition, sink, timer) => block
//! ```
//!
//! - [registry]モジュール:
//!   - チャンク群を保持する[Registry]構造体を提供
//! - [partition]モジュール:
//!   - チャンク群をダンプ先群に割り当てるための関数群を提供
//! - [sink]モジュール:
//!   - ダンプの書き込み先を抽象化した[DumpSink]トレイトと、そのファイル実装である[FileSink]を提供
//! - [dump]モジュール:
//!   - ワーカースレッド群を使ってダンプを実行する[DumpCoordinator]を提供
//! - [block]モジュール:
//!   - ブロック境界に揃えられたバッファ等の、ダイレクトI/O用の補助的な機能を提供
//!
//! # Examples
//!
//! ```
//! use chunkdump::dump::DumpCoordinator;
//! use chunkdump::registry::RegistryBuilder;
//! # use tempdir::TempDir;
//!
//! # fn main() -> Result<(), chunkdump::Error> {
//! # let dir = TempDir::new("chunkdump_doc").unwrap();
//! # let (dir1, dir2) = (dir.path().join("ssd0"), dir.path().join("ssd1"));
//! # std::fs::create_dir(&dir1).unwrap();
//! # std::fs::create_dir(&dir2).unwrap();
//! let mut registry = RegistryBuilder::new().chunk_size(4096).build()?;
//! registry.allocate()?;
//! registry.allocate()?;
//! print!("{}", registry.listing());
//!
//! let summary = DumpCoordinator::new().dump(&registry, &[dir1, dir2])?;
//! assert_eq!(summary.total_bytes(), 2 * 4096);
//! print!("{}", summary);
//! # Ok(())
//! # }
//! ```
//!
//! [Registry]: ./registry/struct.Registry.html
//! [registry]: ./registry/index.html
//! [分割]: ./partition/index.html
//! [partition]: ./partition/index.html
//! [sink]: ./sink/index.html
//! [DumpSink]: ./sink/trait.DumpSink.html
//! [FileSink]: ./sink/struct.FileSink.html
//! [dump]: ./dump/index.html
//! [DumpCoordinator]: ./dump/struct.DumpCoordinator.html
//! [block]: ./block/index.html
#![warn(missing_docs)]
extern crate chrono;
extern crate libc;
extern crate prometrics;
#[cfg(test)]
extern crate tempdir;
#[macro_use]
extern crate trackable;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};

macro_rules! track_io {
    ($expr:expr) => {
        $expr.map_err(|e: ::std::io::Error| track!(crate::Error::from(e)))
    };
}

pub mod block;
pub mod dump;
pub mod metrics;
pub mod partition;
pub mod registry;
pub mod sink;
pub mod timer;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
