//! Peak detection with a minimum-width filter.
//!
//! Peaks are local maxima (plateaus resolve to their midpoint). Prominence is
//! measured against the lowest point on either side before the signal rises
//! above the peak again, and width is taken at half prominence with linear
//! interpolation between samples. Peaks narrower than the threshold are
//! dropped.

/// One detected peak and the properties used to filter it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub prominence: f64,
    pub width: f64,
    pub left_ip: f64,
    pub right_ip: f64,
}

/// Per-window peak statistics, always computed from a single detection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeakSummary {
    pub count: usize,
    /// Sum of prominences.
    pub amplitude: f64,
    /// Sum of widths at half prominence, in samples.
    pub duration: f64,
}

/// Detect peaks at least `min_width` samples wide.
pub fn detect_peaks(x: &[f64], min_width: f64) -> Vec<Peak> {
    local_maxima(x)
        .into_iter()
        .map(|index| {
            let (prominence, left_base, right_base) = prominence(x, index);
            let (left_ip, right_ip) = half_prominence_bounds(x, index, prominence, left_base, right_base);
            Peak {
                index,
                prominence,
                width: right_ip - left_ip,
                left_ip,
                right_ip,
            }
        })
        .filter(|peak| peak.width >= min_width)
        .collect()
}

/// Count, amplitude and duration of the peaks in one window.
pub fn summarize(x: &[f64], min_width: f64) -> PeakSummary {
    detect_peaks(x, min_width)
        .iter()
        .fold(PeakSummary::default(), |acc, peak| PeakSummary {
            count: acc.count + 1,
            amplitude: acc.amplitude + peak.prominence,
            duration: acc.duration + peak.width,
        })
}

fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }
    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

fn prominence(x: &[f64], peak: usize) -> (f64, usize, usize) {
    let height = x[peak];

    let mut left_min = height;
    let mut left_base = peak;
    let mut i = peak as isize;
    while i >= 0 && x[i as usize] <= height {
        if x[i as usize] < left_min {
            left_min = x[i as usize];
            left_base = i as usize;
        }
        i -= 1;
    }

    let mut right_min = height;
    let mut right_base = peak;
    let mut j = peak;
    while j < x.len() && x[j] <= height {
        if x[j] < right_min {
            right_min = x[j];
            right_base = j;
        }
        j += 1;
    }

    (height - left_min.max(right_min), left_base, right_base)
}

fn half_prominence_bounds(
    x: &[f64],
    peak: usize,
    prominence: f64,
    left_base: usize,
    right_base: usize,
) -> (f64, f64) {
    let height = x[peak] - prominence * 0.5;

    let mut i = peak;
    while left_base < i && height < x[i] {
        i -= 1;
    }
    let mut left_ip = i as f64;
    if x[i] < height {
        left_ip += (height - x[i]) / (x[i + 1] - x[i]);
    }

    let mut j = peak;
    while j < right_base && height < x[j] {
        j += 1;
    }
    let mut right_ip = j as f64;
    if x[j] < height {
        right_ip -= (height - x[j]) / (x[j - 1] - x[j]);
    }

    (left_ip, right_ip)
}
