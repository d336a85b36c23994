//! チャンク群のダンプ先への割り当て.
//!
//! `M`個のチャンクを`N`個のダンプ先に、連続した範囲として均等に割り当てる.
//! 各ダンプ先には`M / N`個のチャンクが割り当てられ、
//! 先頭から`M % N`個のダンプ先には、さらに一つずつ追加で割り当てられる.
//!
//! そのため、任意の二つのダンプ先に割り当てられたチャンク数の差は、高々`1`となる.
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::{ErrorKind, Result};

/// 一つのダンプ先に割り当てられたチャンクの範囲.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationAssignment {
    destination: PathBuf,
    chunks: Range<usize>,
}
impl DestinationAssignment {
    /// ダンプ先のパスを返す.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// 割り当てられたチャンクのインデックスの範囲を返す.
    ///
    /// 範囲が空の場合でも、ダンプ先のファイルは作成される.
    pub fn chunks(&self) -> Range<usize> {
        self.chunks.clone()
    }

    /// 割り当てられた最初のチャンクのインデックスを返す.
    ///
    /// 範囲が空の場合には、直前のダンプ先の範囲の終端と等しい.
    pub fn first_chunk_index(&self) -> usize {
        self.chunks.start
    }

    /// 割り当てられた最後のチャンクのインデックスを返す.
    ///
    /// 範囲が空の場合には`None`が返る.
    pub fn last_chunk_index(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.chunks.end - 1)
        }
    }

    /// 割り当てられたチャンクの数を返す.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// 一つもチャンクが割り当てられていない場合には`true`を返す.
    pub fn is_empty(&self) -> bool {
        self.chunks.start >= self.chunks.end
    }
}

/// `chunk_count`個のチャンクを`destination_count`個の連続した範囲に分割する.
///
/// # Errors
///
/// `destination_count`が`0`の場合には、種類が`ErrorKind::NoDestinations`のエラーが返される.
///
/// # Examples
///
/// ```
/// use chunkdump::partition::split_ranges;
///
/// assert_eq!(split_ranges(10, 3).unwrap(), vec![0..4, 4..7, 7..10]);
/// assert_eq!(split_ranges(2, 4).unwrap(), vec![0..1, 1..2, 2..2, 2..2]);
/// ```
pub fn split_ranges(chunk_count: usize, destination_count: usize) -> Result<Vec<Range<usize>>> {
    track_assert_ne!(destination_count, 0, ErrorKind::NoDestinations);

    let base = chunk_count / destination_count;
    let extra = chunk_count % destination_count;
    let mut start = 0;
    let ranges = (0..destination_count)
        .map(|i| {
            let len = if i < extra { base + 1 } else { base };
            let range = start..start + len;
            start += len;
            range
        })
        .collect();
    Ok(ranges)
}

/// `chunk_count`個のチャンクを、与えられた順序でダンプ先群に割り当てる.
///
/// 最初のダンプ先には、先頭の連続したチャンク群が割り当てられる.
///
/// # Errors
///
/// `destinations`が空の場合には、種類が`ErrorKind::NoDestinations`のエラーが返される.
pub fn assign<P: AsRef<Path>>(
    chunk_count: usize,
    destinations: &[P],
) -> Result<Vec<DestinationAssignment>> {
    let ranges = track!(split_ranges(chunk_count, destinations.len()))?;
    let assignments = destinations
        .iter()
        .zip(ranges)
        .map(|(destination, chunks)| DestinationAssignment {
            destination: destination.as_ref().to_path_buf(),
            chunks,
        })
        .collect();
    Ok(assignments)
}
