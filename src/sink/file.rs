use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use crate::block::BlockSize;
use crate::sink::DumpSink;
use crate::{ErrorKind, Result};

/// `FileSink`のビルダ
///
/// 三つのメンバを持ち、それぞれ次の意味を表す:
/// direct_io: バッファリングなしI/Oを行うかどうか（Linux: O_DIRECT, Mac: F_NOCACHE）
/// block_size: バッファリングなしI/Oを行う際に、書き込みバッファが揃っている必要があるブロック境界
/// create_parent_dirs: ファイルの親ディレクトリが存在しない場合に作成するかどうか
#[derive(Debug, Clone)]
pub struct FileSinkBuilder {
    direct_io: bool,
    block_size: BlockSize,
    create_parent_dirs: bool,
}
impl FileSinkBuilder {
    /// デフォルト設定で`FileSinkBuilder`インスタンスを作成する
    ///
    /// デフォルトでは、direct_io = false、block_size = `BlockSize::default()`、
    /// create_parent_dirs = falseとなる
    pub fn new() -> Self {
        FileSinkBuilder {
            direct_io: false,
            block_size: BlockSize::default(),
            create_parent_dirs: false,
        }
    }

    #[cfg(target_os = "linux")]
    fn open_options(&self) -> fs::OpenOptions {
        use std::os::unix::fs::OpenOptionsExt;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);

        if self.direct_io {
            options.custom_flags(libc::O_DIRECT);
        }
        options
    }
    #[cfg(not(target_os = "linux"))]
    fn open_options(&self) -> fs::OpenOptions {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        options
    }

    #[cfg(target_os = "macos")]
    fn set_fnocache_if_flag_is_on(&self, file: &File) -> Result<()> {
        use std::os::unix::io::AsRawFd;

        if self.direct_io {
            if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) } != 0 {
                track_io!(Err(io::Error::last_os_error()))
            } else {
                Ok(())
            }
        } else {
            Ok(())
        }
    }
    #[cfg(not(target_os = "macos"))]
    fn set_fnocache_if_flag_is_on(&self, _file: &File) -> Result<()> {
        Ok(())
    }

    /// direct_ioのon/offを設定する
    pub fn direct_io(&mut self, enabled: bool) -> &mut Self {
        self.direct_io = enabled;
        self
    }

    /// バッファリングなしI/Oの際のブロックサイズを設定する
    pub fn block_size(&mut self, block_size: BlockSize) -> &mut Self {
        self.block_size = block_size;
        self
    }

    /// create_parent_dirsのon/offを設定する
    pub fn create_parent_dirs(&mut self, enabled: bool) -> &mut Self {
        self.create_parent_dirs = enabled;
        self
    }

    /// バッファリングなしI/Oが有効な場合には、そのブロックサイズを返す.
    pub fn direct_io_block_size(&self) -> Option<BlockSize> {
        if self.direct_io {
            Some(self.block_size)
        } else {
            None
        }
    }

    /// 新しい`FileSink`インスタンスを生成する.
    ///
    /// `filepath`が既に存在する場合には、その内容は切り詰められる.
    pub fn create<P: AsRef<Path>>(&self, filepath: P) -> Result<FileSink> {
        if self.create_parent_dirs {
            if let Some(dir) = filepath.as_ref().parent() {
                track_io!(fs::create_dir_all(dir))?;
            }
        }
        let file = track_io!(self.open_options().open(filepath))?;
        track!(self.set_fnocache_if_flag_is_on(&file))?;
        Ok(FileSink {
            file,
            position: 0,
            direct_io_block_size: self.direct_io_block_size(),
        })
    }
}
impl Default for FileSinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// ファイルベースの`DumpSink`の実装.
///
/// ファイルは常に新規作成ないし切り詰められた状態でオープンされ、先頭から順に書き込まれる.
///
/// 同期には`fsync`相当の操作(データおよびメタデータの同期)が用いられる.
///
/// # 参考
///
/// `O_DIRECT`と`O_SYNC/O_DSYNC`に関して:
///
/// - [http://stackoverflow.com/questions/5055859/](http://stackoverflow.com/questions/5055859/)
/// - [https://lwn.net/Articles/457667/](https://lwn.net/Articles/457667/)
#[derive(Debug)]
pub struct FileSink {
    file: File,
    position: u64,
    direct_io_block_size: Option<BlockSize>,
}
impl FileSink {
    /// デフォルト設定で`FileSink`インスタンスを生成する.
    ///
    /// デフォルト設定では、バッファリングありのI/Oを行う.
    pub fn create<P: AsRef<Path>>(filepath: P) -> Result<Self> {
        FileSinkBuilder::new().create(filepath)
    }

    fn check_alignment(&self, buf: &[u8]) -> Result<()> {
        if let Some(block_size) = self.direct_io_block_size {
            track_assert!(
                block_size.is_aligned(buf.len() as u64),
                ErrorKind::InvalidInput;
                buf.len(), block_size
            );
            track_assert!(
                block_size.is_aligned(buf.as_ptr() as u64),
                ErrorKind::InvalidInput;
                block_size
            );
        }
        Ok(())
    }

    #[cfg(test)]
    fn inner(&self) -> &File {
        &self.file
    }
}
impl DumpSink for FileSink {
    fn sync(&mut self) -> Result<()> {
        track_io!(self.file.sync_all())?;
        Ok(())
    }
    fn position(&self) -> u64 {
        self.position
    }
}
impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        track!(self.check_alignment(buf))?;

        // `Interrupted`等のエラー種別は、呼び出し側で判定できるようにそのまま返す
        let written_size = self.file.write(buf)?;
        self.position += written_size as u64;
        Ok(written_size)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
