// Summary statistics over samples.  Undefined values are `None`, never zero or NaN, so that the
// table code can render them as "N/A".

use itertools::{Itertools, MinMaxResult};

/// Count-aware summary of a sample.  `mean` is defined for n >= 1, `stddev` (sample standard
/// deviation with Bessel's correction) and `stderr` (standard error of the mean) for n >= 2.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Summary {
    pub n: usize,
    pub mean: Option<f64>,
    pub stddev: Option<f64>,
    pub stderr: Option<f64>,
}

pub fn summarize(samples: &[f64]) -> Summary {
    let n = samples.len();
    let mean = mean(samples);
    let (stddev, stderr) = match mean {
        Some(m) if n >= 2 => {
            let ss = samples.iter().map(|x| (x - m) * (x - m)).sum::<f64>();
            let sd = (ss / (n - 1) as f64).sqrt();
            (Some(sd), Some(sd / (n as f64).sqrt()))
        }
        _ => (None, None),
    };
    Summary {
        n,
        mean,
        stddev,
        stderr,
    }
}

pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Min, max and mean of a nonempty sample.  NaN values are not expected (the parsers never
/// produce them) and would make min and max meaningless.

pub fn extent(samples: &[f64]) -> Option<Extent> {
    let (min, max) = match samples.iter().minmax_by(|a, b| a.total_cmp(b)) {
        MinMaxResult::NoElements => return None,
        MinMaxResult::OneElement(x) => (*x, *x),
        MinMaxResult::MinMax(lo, hi) => (*lo, *hi),
    };
    Some(Extent {
        min,
        max,
        mean: mean(samples)?,
    })
}

#[cfg(test)]
fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_summarize() {
    let s = summarize(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
    assert!(s.n == 8);
    assert!(close(s.mean.unwrap(), 5.0));
    // Sum of squared deviations is 32, so the sample variance is 32/7
    let sd = (32.0f64 / 7.0).sqrt();
    assert!(close(s.stddev.unwrap(), sd));
    assert!(close(s.stderr.unwrap(), sd / 8.0f64.sqrt()));
}

#[test]
fn test_summarize_stderr_relation() {
    for xs in [vec![1.0, 2.0], vec![10.0, 10.5, 11.0, 13.25], vec![-3.0, 0.0, 3.0, 100.0, 7.5]] {
        let s = summarize(&xs);
        let n = xs.len() as f64;
        let m = xs.iter().sum::<f64>() / n;
        let sd = (xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
        assert!(close(s.stddev.unwrap(), sd));
        assert!(close(s.stderr.unwrap(), s.stddev.unwrap() / n.sqrt()));
    }
}

#[test]
fn test_summarize_small() {
    let s = summarize(&[]);
    assert!(s.n == 0);
    assert!(s.mean.is_none());
    assert!(s.stddev.is_none());
    assert!(s.stderr.is_none());

    let s = summarize(&[42.0]);
    assert!(s.n == 1);
    assert!(s.mean == Some(42.0));
    assert!(s.stddev.is_none());
    assert!(s.stderr.is_none());

    // Two identical values have a defined, zero, deviation
    let s = summarize(&[3.0, 3.0]);
    assert!(s.stddev == Some(0.0));
    assert!(s.stderr == Some(0.0));
}

#[test]
fn test_extent() {
    assert!(extent(&[]).is_none());
    let e = extent(&[3.5]).unwrap();
    assert!(e.min == 3.5 && e.max == 3.5 && e.mean == 3.5);
    let e = extent(&[4.0, 1.0, 7.0]).unwrap();
    assert!(e.min == 1.0);
    assert!(e.max == 7.0);
    assert!(close(e.mean, 4.0));
}
