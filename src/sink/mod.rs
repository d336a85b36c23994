//! ダンプ先のインターフェース定義と実装群.
//!
//! このモジュールは[DumpWorker](../dump/struct.DumpWorker.html)がチャンクの内容の書き出しに使用する
//! 出力先を提供する.
use std::io::Write;

pub use self::file::{FileSink, FileSinkBuilder};
pub use self::memory::MemorySink;

use crate::Result;

mod file;
mod memory;

/// ダンプ先を表すトレイト.
///
/// 通常の`Write`に加えて、書き込んだ内容を物理デバイスに同期するための操作を提供する.
///
/// `write`は要求よりも少ないバイト数しか書き込まないことがあり、
/// 利用側はその場合にも実際に書き込まれたバイト数を正しく扱う必要がある.
pub trait DumpSink: Write {
    /// 書き込まれた内容を、物理デバイスに同期する.
    ///
    /// このメソッドが成功した時点で、それまでに書き込まれた内容が永続化されていることが保証される.
    /// 内部的にバッファ管理等を行っておらず、常に内容が同期されている場合には、
    /// このメソッド内で特に何かを行う必要はない.
    fn sync(&mut self) -> Result<()>;

    /// これまでに書き込まれたバイト数を返す.
    fn position(&self) -> u64;
}
impl<'a, S: DumpSink + ?Sized> DumpSink for &'a mut S {
    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }
    fn position(&self) -> u64 {
        (**self).position()
    }
}
