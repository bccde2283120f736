//! Adaptive peak picking over an onset envelope

/// Window sizes for [`peak_pick`], all in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakWindows {
    pub pre_max: usize,
    pub post_max: usize,
    pub pre_avg: usize,
    pub post_avg: usize,
    pub wait: usize,
}

/// Indices of peaks in `x`
///
/// Frame `n` is a peak when all of the following hold:
/// 1. `x[n] == max(x[n - pre_max .. n + post_max])`
/// 2. `x[n] >= mean(x[n - pre_avg .. n + post_avg]) + delta`
/// 3. more than `wait` frames have passed since the previous peak
///
/// Windows are clipped at the edges. Frames with `x[n] == 0` never count.
pub fn peak_pick(x: &[f32], windows: PeakWindows, delta: f32) -> Vec<usize> {
    let mut peaks = Vec::new();
    let mut last_peak: Option<usize> = None;

    for n in 0..x.len() {
        let value = x[n];
        if value == 0.0 {
            continue;
        }

        let max_window = window(x, n, windows.pre_max, windows.post_max);
        let local_max = max_window.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if max_window.is_empty() || value != local_max {
            continue;
        }

        let avg_window = window(x, n, windows.pre_avg, windows.post_avg);
        if avg_window.is_empty() {
            continue;
        }
        let local_mean = avg_window.iter().sum::<f32>() / avg_window.len() as f32;
        if value < local_mean + delta {
            continue;
        }

        if last_peak.map_or(true, |last| n > last + windows.wait) {
            peaks.push(n);
            last_peak = Some(n);
        }
    }

    peaks
}

fn window(x: &[f32], n: usize, pre: usize, post: usize) -> &[f32] {
    let start = n.saturating_sub(pre);
    let end = (n + post).min(x.len());
    if start >= end {
        &[]
    } else {
        &x[start..end]
    }
}
