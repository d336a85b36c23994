//! 所要時間の計測.
//!
//! 壁時計時間は単調増加するクロック([`Instant`])で計測し、
//! プロセスのCPU時間はプラットフォーム毎の実装で取得する.
//! CPU時間を取得できないプラットフォームでは`None`が返される.
//!
//! [`Instant`]: https://doc.rust-lang.org/std/time/struct.Instant.html
use std::time::{Duration, Instant};

/// 壁時計時間を計測するためのストップウォッチ.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}
impl Stopwatch {
    /// 計測を開始する.
    pub fn start() -> Self {
        Stopwatch {
            start: Instant::now(),
        }
    }

    /// 開始からの経過時間を返す.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// プロセスのCPU時間(ユーザ時間とシステム時間の合計)を計測するためのストップウォッチ.
#[derive(Debug, Clone, Copy)]
pub struct CpuStopwatch {
    start: Option<Duration>,
}
impl CpuStopwatch {
    /// 計測を開始する.
    pub fn start() -> Self {
        CpuStopwatch {
            start: process_cpu_time(),
        }
    }

    /// 開始から消費されたCPU時間を返す.
    ///
    /// このプラットフォームでCPU時間が取得できない場合には`None`が返る.
    pub fn elapsed(&self) -> Option<Duration> {
        let start = self.start?;
        let now = process_cpu_time()?;
        Some(now.checked_sub(start).unwrap_or_default())
    }
}

/// 現在のプロセスが消費したCPU時間の累計を返す.
#[cfg(unix)]
pub fn process_cpu_time() -> Option<Duration> {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) } != 0 {
        return None;
    }
    Some(timeval_to_duration(usage.ru_utime) + timeval_to_duration(usage.ru_stime))
}

/// 現在のプロセスが消費したCPU時間の累計を返す.
///
/// このプラットフォームでは未サポートのため、常に`None`を返す.
#[cfg(not(unix))]
pub fn process_cpu_time() -> Option<Duration> {
    None
}

#[cfg(unix)]
fn timeval_to_duration(tv: libc::timeval) -> Duration {
    Duration::from_secs(tv.tv_sec as u64) + Duration::from_micros(tv.tv_usec as u64)
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn stopwatch_works() {
        let stopwatch = Stopwatch::start();
        thread::sleep(Duration::from_millis(10));
        let first = stopwatch.elapsed();
        assert!(first >= Duration::from_millis(10));
        assert!(stopwatch.elapsed() >= first);
    }

    #[cfg(unix)]
    #[test]
    fn cpu_time_is_available_on_unix() {
        let stopwatch = CpuStopwatch::start();

        // 少しだけCPUを消費する
        let mut x = 0u64;
        for i in 0..1_000_000u64 {
            x = x.wrapping_mul(31).wrapping_add(i);
        }
        assert_ne!(x, 1);

        assert!(process_cpu_time().is_some());
        assert!(stopwatch.elapsed().is_some());
    }
}
