use std::ops::Deref;

use crate::block::{AlignedBuffer, BlockSize};

/// レジストリが所有する固定長のメモリチャンク.
///
/// 生成後は内容が変更されることはなく、[`Registry`]から読み取り専用のビューとしてのみ参照される.
///
/// [`Registry`]: ./struct.Registry.html
#[derive(Debug)]
pub struct Chunk {
    buf: AlignedBuffer,
}
impl Chunk {
    pub(crate) fn new(buf: AlignedBuffer) -> Self {
        Chunk { buf }
    }

    /// チャンクの内容を返す.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// チャンクのサイズ(バイト単位)を返す.
    pub fn size(&self) -> u64 {
        self.buf.len() as u64
    }

    /// チャンクのバッファの先頭アドレスを返す.
    ///
    /// 表示用の値であり、プログラムのロジックには使われない.
    pub fn address(&self) -> usize {
        self.buf.address()
    }

    /// バッファの開始位置が揃えられているブロック境界を返す.
    pub fn block_size(&self) -> BlockSize {
        self.buf.block_size()
    }
}
impl Deref for Chunk {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.as_bytes()
    }
}
impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
