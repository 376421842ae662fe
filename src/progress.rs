//! 进度信息与人类可读的格式化
//!
//! 进度只是观测性副作用，与正确性无关。

use std::time::{Duration, Instant};

/// 每处理完一个块后的进度快照
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// 已处理的明文字节数
    pub processed: u64,
    /// 明文总字节数
    pub total: u64,
    /// 瞬时吞吐量（字节/秒）
    pub throughput: f64,
    /// 预计剩余时间（仅加密时计算）
    pub eta: Option<Duration>,
}

impl Progress {
    /// 完成百分比（0-100）
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = (self.processed as f64 / self.total as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }
}

pub(crate) struct ProgressTracker {
    start: Instant,
    processed: u64,
    total: u64,
    with_eta: bool,
}

impl ProgressTracker {
    pub(crate) fn new(total: u64, with_eta: bool) -> Self {
        Self {
            start: Instant::now(),
            processed: 0,
            total,
            with_eta,
        }
    }

    pub(crate) fn advance(&mut self, bytes: usize) -> Progress {
        self.processed += bytes as u64;
        snapshot(self.processed, self.total, self.start.elapsed(), self.with_eta)
    }
}

fn snapshot(processed: u64, total: u64, elapsed: Duration, with_eta: bool) -> Progress {
    let secs = elapsed.as_secs_f64().max(0.001);
    let throughput = processed as f64 / secs;

    let eta = with_eta.then(|| {
        let remaining = total.saturating_sub(processed) as f64;
        if throughput > 0.0 {
            Duration::from_secs_f64(remaining / throughput)
        } else {
            Duration::ZERO
        }
    });

    Progress {
        processed,
        total,
        throughput,
        eta,
    }
}

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// 格式化字节数，例如 `1.50 MB`、`512.0 B`
pub fn format_bytes(n: u64) -> String {
    format_scaled(n as f64)
}

/// 格式化吞吐量，例如 `12.3 MB/s`
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_scaled(bytes_per_sec))
}

/// 格式化剩余时间：`3m 20s`、`45s`，未知时为 `—`
pub fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(d) => {
            let total = d.as_secs();
            let (m, s) = (total / 60, total % 60);
            if m > 0 {
                format!("{m}m {s}s")
            } else {
                format!("{s}s")
            }
        }
        None => "—".to_string(),
    }
}

fn format_scaled(mut n: f64) -> String {
    if !n.is_finite() || n < 0.0 {
        return "0 B".to_string();
    }

    let mut unit = 0;
    while n >= 1024.0 && unit < UNITS.len() - 1 {
        n /= 1024.0;
        unit += 1;
    }

    let decimals: usize = if n < 10.0 && unit > 0 { 2 } else { 1 };
    format!("{n:.decimals$} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_scaled() {
        assert_eq!(format_bytes(0), "0.0 B");
        assert_eq!(format_bytes(512), "512.0 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 + 512 * 1024), "3.50 MB");
        assert_eq!(format_bytes(20 * 1024 * 1024 * 1024), "20.0 GB");
    }

    #[test]
    fn speed_and_eta() {
        assert_eq!(format_speed(2048.0), "2.00 KB/s");
        assert_eq!(format_speed(f64::NAN), "0 B/s");
        assert_eq!(format_eta(Some(Duration::from_secs(200))), "3m 20s");
        assert_eq!(format_eta(Some(Duration::from_secs(45))), "45s");
        assert_eq!(format_eta(None), "—");
    }

    #[test]
    fn snapshot_computes_throughput_and_eta() {
        let p = snapshot(1000, 3000, Duration::from_secs(2), true);
        assert_eq!(p.throughput, 500.0);
        assert_eq!(p.eta, Some(Duration::from_secs(4)));
        assert_eq!(p.percent(), 33);

        let decrypt = snapshot(1000, 3000, Duration::from_secs(2), false);
        assert_eq!(decrypt.eta, None);
    }

    #[test]
    fn empty_total_is_complete() {
        let p = snapshot(0, 0, Duration::ZERO, true);
        assert_eq!(p.percent(), 100);
        assert_eq!(p.eta, Some(Duration::ZERO));
    }
}
