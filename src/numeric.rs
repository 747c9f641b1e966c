//! Array helpers shared by the synthesis and detection stages.

/// `n` evenly spaced samples over the closed interval `[start, stop]`.
///
/// # Examples
///
/// ```
/// use cytosim::numeric::linspace;
///
/// assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
/// assert_eq!(linspace(0.0, 1.0, 1), vec![0.0]);
/// ```
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Cumulative trapezoidal integral of `y` over `x`, with a leading zero so the
/// output has the same length as the input.
pub fn cumulative_trapezoid(y: &[f64], x: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(y.len());
    if y.is_empty() {
        return out;
    }
    out.push(0.0);
    let mut acc = 0.0;
    for i in 1..y.len().min(x.len()) {
        acc += 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
        out.push(acc);
    }
    out
}

/// Linear interpolation of `values` (sampled at integer positions) at the
/// fractional position `position`. Positions outside the array clamp to the
/// edge values.
pub fn interpolate_at(values: &[f64], position: f64) -> f64 {
    let Some(&last) = values.last() else {
        return f64::NAN;
    };
    if position <= 0.0 {
        return values[0];
    }
    let max = (values.len() - 1) as f64;
    if position >= max {
        return last;
    }
    let lower = position.floor() as usize;
    let frac = position - lower as f64;

    values[lower] + frac * (values[lower + 1] - values[lower])
}

/// Normalized Gaussian kernel with standard deviation `sigma` (in samples),
/// truncated at four standard deviations.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    if !(sigma > 0.0) {
        return vec![1.0];
    }
    let radius = (4.0 * sigma).ceil() as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|k| (-((k * k) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let norm: f64 = kernel.iter().sum();

    kernel.into_iter().map(|k| k / norm).collect()
}

/// Convolution of `signal` with `kernel` keeping the length of `signal`
/// (centered). Samples beyond the edges mirror the signal, `d c b a | a b c d
/// | d c b a`, so a constant signal stays constant up to its ends.
pub fn convolve_same(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    if kernel.is_empty() {
        return signal.to_vec();
    }
    let half = (kernel.len() / 2) as isize;
    let n = signal.len() as isize;

    (0..n)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, &w)| w * signal[reflect(i + half - k as isize, n)])
                .sum()
        })
        .collect()
}

fn reflect(j: isize, n: isize) -> usize {
    let period = 2 * n;
    let j = j.rem_euclid(period);
    (if j < n { j } else { period - 1 - j }) as usize
}

/// Index of the (first) maximum of `values` within `[start, end)`.
pub(crate) fn argmax(values: &[f64], start: usize, end: usize) -> usize {
    let mut index = start;
    for i in start..end {
        if values[i] > values[index] {
            index = i;
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_endpoints() {
        let t = linspace(0.0, 4.0, 128);
        assert_eq!(t.len(), 128);
        assert_eq!(t[0], 0.0);
        assert!((t[127] - 4.0).abs() < 1e-12);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn trapezoid_of_line() {
        let x = linspace(0.0, 2.0, 21);
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v).collect();
        let cumulative = cumulative_trapezoid(&y, &x);

        assert_eq!(cumulative.len(), 21);
        assert_eq!(cumulative[0], 0.0);
        assert!((cumulative[20] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn interpolation() {
        let values = [0.0, 10.0, 20.0];
        assert_eq!(interpolate_at(&values, 0.5), 5.0);
        assert_eq!(interpolate_at(&values, 1.25), 12.5);
        assert_eq!(interpolate_at(&values, -1.0), 0.0);
        assert_eq!(interpolate_at(&values, 7.0), 20.0);
        assert!(interpolate_at(&[], 0.0).is_nan());
    }

    #[test]
    fn kernel_is_normalized() {
        let kernel = gaussian_kernel(2.5);
        assert_eq!(kernel.len() % 2, 1);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(gaussian_kernel(0.0), vec![1.0]);
    }

    #[test]
    fn convolution_preserves_constants() {
        let signal = vec![2.0; 50];
        let smoothed = convolve_same(&signal, &gaussian_kernel(1.0));

        assert_eq!(smoothed.len(), 50);
        assert!(smoothed.iter().all(|&x| (x - 2.0).abs() < 1e-12));
    }

    #[test]
    fn convolution_mirrors_the_edges() {
        let smoothed = convolve_same(&[1.0, 2.0, 3.0], &[0.25, 0.5, 0.25]);
        for (x, expected) in smoothed.iter().zip([1.25, 2.0, 2.75]) {
            assert!((x - expected).abs() < 1e-12);
        }

        // Kernel wider than the signal folds back more than once.
        let smoothed = convolve_same(&[3.0, 3.0], &gaussian_kernel(2.0));
        assert!(smoothed.iter().all(|&x| (x - 3.0).abs() < 1e-12));
    }

    #[test]
    fn convolution_with_identity() {
        let signal = vec![1.0, 5.0, 3.0];
        assert_eq!(convolve_same(&signal, &[1.0]), signal);
    }

    #[test]
    fn argmax_first_maximum() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0], 0, 4), 1);
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0], 2, 4), 2);
    }
}
