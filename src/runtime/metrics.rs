use std::time::Instant;

use itertools::Itertools;

use crate::core::protocol::PerformanceMetrics;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Resource snapshot taken when the execute phase starts.
#[derive(Debug)]
pub struct ResourceProbe {
    started: Instant,
    cpu_start: f64,
    memory_start: f64,
}

impl ResourceProbe {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            cpu_start: cpu_seconds().unwrap_or(0.0),
            memory_start: resident_mb().unwrap_or(0.0),
        }
    }

    pub fn finish(self, source: &str, captured_stdout: &str) -> PerformanceMetrics {
        let cpu_time = cpu_seconds()
            .map(|now| (now - self.cpu_start).max(0.0))
            .unwrap_or(0.0);

        PerformanceMetrics {
            execution_time: self.started.elapsed().as_secs_f64(),
            cpu_time,
            memory_start: self.memory_start,
            memory_peak: peak_mb().unwrap_or(0.0).max(self.memory_start),
            libraries_used: import_lines(source),
            code_lines: code_lines(source),
            output_size: captured_stdout.len() as u64,
        }
    }
}

/// Metrics for an attempt that never reached the execute phase.
pub fn unmeasured(source: &str, captured_stdout: &str) -> PerformanceMetrics {
    PerformanceMetrics {
        libraries_used: import_lines(source),
        code_lines: code_lines(source),
        output_size: captured_stdout.len() as u64,
        ..PerformanceMetrics::default()
    }
}

pub fn code_lines(source: &str) -> u64 {
    source.lines().filter(|l| !l.trim().is_empty()).count() as u64
}

/// Import statements in source order, without duplicates.
pub fn import_lines(source: &str) -> Vec<String> {
    source
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("import ") || l.starts_with("from "))
        .map(str::to_string)
        .unique()
        .collect()
}

#[cfg(unix)]
fn rusage() -> Option<libc::rusage> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::uninit();
    // Safety: getrusage only writes into the provided struct.
    let ret = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if ret != 0 {
        return None;
    }
    // Safety: getrusage returned 0, the struct is initialized.
    Some(unsafe { usage.assume_init() })
}

#[cfg(unix)]
fn cpu_seconds() -> Option<f64> {
    let usage = rusage()?;
    let seconds = |tv: libc::timeval| tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0;
    Some(seconds(usage.ru_utime) + seconds(usage.ru_stime))
}

#[cfg(unix)]
fn peak_mb() -> Option<f64> {
    let usage = rusage()?;
    // ru_maxrss is in bytes on macOS and kilobytes elsewhere.
    let bytes = if cfg!(target_os = "macos") {
        usage.ru_maxrss as f64
    } else {
        usage.ru_maxrss as f64 * 1024.0
    };
    Some(bytes / BYTES_PER_MB)
}

#[cfg(target_os = "linux")]
fn resident_mb() -> Option<f64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: f64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    // Safety: sysconf has no memory-safety preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(pages * page_size as f64 / BYTES_PER_MB)
}

#[cfg(not(target_os = "linux"))]
fn resident_mb() -> Option<f64> {
    None
}

#[cfg(not(unix))]
fn cpu_seconds() -> Option<f64> {
    None
}

#[cfg(not(unix))]
fn peak_mb() -> Option<f64> {
    None
}
