use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if let Some(e) = e.get_ref().and_then(|e| e.downcast_ref::<Error>()).cloned() {
            e
        } else if e.kind() == std::io::ErrorKind::InvalidInput {
            ErrorKind::InvalidInput.cause(e).into()
        } else {
            ErrorKind::Other.cause(e).into()
        }
    }
}
impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        if *e.kind() == ErrorKind::InvalidInput {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
        } else {
            std::io::Error::new(std::io::ErrorKind::Other, e)
        }
    }
}

/// 発生し得るエラーの種別.
///
/// ダンプ処理中に検出されたもの(`FileCreate`, `ShortWrite`, `SyncFailed`)は、
/// ダンプ全体を失敗させることはなく、各宛先の結果に警告として記録される.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// レジストリが保持可能なチャンク数の上限に達している.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者が`Registry::release_all`でチャンク群を解放する
    CapacityExceeded,

    /// アロケータがチャンク用の領域を確保できなかった.
    ///
    /// レジストリの状態は変更されない.
    ///
    /// # 典型的な対応策
    ///
    /// - 不要なチャンクを解放した上でリトライする
    OutOfMemory,

    /// ダンプ先が一つも指定されていない.
    ///
    /// この場合はワーカーは一つも起動されない.
    NoDestinations,

    /// ダンプ先ファイルの作成(ないしオープン)に失敗した.
    ///
    /// 該当する宛先の書き込みバイト数は`0`となるが、他の宛先の処理は継続される.
    FileCreate,

    /// チャンクの一部しか書き込めなかった.
    ///
    /// 書き込みバイト数には、実際に書き込めた分だけが計上される.
    ShortWrite,

    /// フラッシュないし物理デバイスへの同期に失敗した.
    ///
    /// 書き込まれたデータが永続化されていない可能性がある.
    SyncFailed,

    /// 入力が不正.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// その他エラー.
    ///
    /// E.g., 想定外のI/Oエラー、ワーカースレッドのパニック
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}
