use std::cmp;
use std::io::{self, Write};

use crate::sink::DumpSink;
use crate::{ErrorKind, Result};

/// メモリベースの`DumpSink`の実装.
///
/// 指定された容量までのバイト列を保持し、それを超える書き込みは部分的にしか行われない.
///
/// # 注意
///
/// これは主にテストや性能計測用途を意図した実装であり、
/// `DumpSink`が本来要求する"永続性"は満たしていない.
#[derive(Debug)]
pub struct MemorySink {
    bytes: Vec<u8>,
    capacity: usize,
    max_write_size: usize,
    fail_sync: bool,
    syncs: usize,
}
impl MemorySink {
    /// 新しい`MemorySink`インスタンスを生成する.
    ///
    /// 容量が`capacity`を超える書き込みは、容量に収まる分だけが行われる.
    pub fn new(capacity: usize) -> Self {
        MemorySink {
            bytes: Vec::new(),
            capacity,
            max_write_size: usize::MAX,
            fail_sync: false,
            syncs: 0,
        }
    }

    /// 一回の`write`呼び出しで書き込まれる最大のバイト数を設定する.
    ///
    /// デフォルト値は`usize::MAX`.
    pub fn max_write_size(mut self, size: usize) -> Self {
        self.max_write_size = size;
        self
    }

    /// `sync`が常に失敗するようにする.
    pub fn fail_sync(mut self) -> Self {
        self.fail_sync = true;
        self
    }

    /// これまでに書き込まれたバイト列を返す.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 成功した`sync`の呼び出し回数を返す.
    pub fn syncs(&self) -> usize {
        self.syncs
    }
}
impl DumpSink for MemorySink {
    fn sync(&mut self) -> Result<()> {
        track_assert!(!self.fail_sync, ErrorKind::Other, "Sync is configured to fail");
        self.syncs += 1;
        Ok(())
    }
    fn position(&self) -> u64 {
        self.bytes.len() as u64
    }
}
impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let remaining = self.capacity - self.bytes.len();
        let len = cmp::min(cmp::min(remaining, self.max_write_size), buf.len());
        self.bytes.extend_from_slice(&buf[..len]);
        Ok(len)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
