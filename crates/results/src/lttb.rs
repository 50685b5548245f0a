// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Largest-Triangle-Three-Buckets downsampling.

use serde::{Deserialize, Serialize};

/// A plotted sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Elapsed milliseconds
    pub x: f64,
    /// Value
    pub y: f64,
}

impl Point {
    /// Create a point.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Reduce `points` to at most `threshold` samples, keeping the first and
/// last point and, per bucket, the point spanning the largest triangle with
/// its neighbours.
///
/// A threshold of zero, or one not smaller than the input, returns the input
/// unchanged.
pub fn downsample(points: &[Point], threshold: usize) -> Vec<Point> {
    let len = points.len();
    if threshold == 0 || threshold >= len {
        return points.to_vec();
    }
    match threshold {
        1 => return vec![points[0]],
        2 => return vec![points[0], points[len - 1]],
        _ => {}
    }

    let mut sampled = Vec::with_capacity(threshold);
    let every = (len - 2) as f64 / (threshold - 2) as f64;
    let mut a = 0usize;
    sampled.push(points[a]);

    for i in 0..threshold - 2 {
        let avg_start = ((i + 1) as f64 * every).floor() as usize + 1;
        let avg_end = (((i + 2) as f64 * every).floor() as usize + 1).min(len);
        let avg_len = (avg_end - avg_start) as f64;
        let (sum_x, sum_y) = points[avg_start..avg_end]
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        let (avg_x, avg_y) = (sum_x / avg_len, sum_y / avg_len);

        let range_start = (i as f64 * every).floor() as usize + 1;
        let range_end = ((i + 1) as f64 * every).floor() as usize + 1;
        let anchor = points[a];

        let mut max_area = -1.0;
        let mut next = range_start;
        for (offset, p) in points[range_start..range_end].iter().enumerate() {
            let area = ((anchor.x - avg_x) * (p.y - anchor.y) - (anchor.x - p.x) * (avg_y - anchor.y))
                .abs()
                * 0.5;
            if area > max_area {
                max_area = area;
                next = range_start + offset;
            }
        }

        sampled.push(points[next]);
        a = next;
    }

    sampled.push(points[len - 1]);
    sampled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> Vec<Point> {
        (0..n)
            .map(|i| Point::new(i as f64, ((i * 7919) % 101) as f64))
            .collect()
    }

    #[test]
    fn test_threshold_bounds_output() {
        let points = series(1000);
        for threshold in [1, 2, 3, 10, 99, 500, 999] {
            let out = downsample(&points, threshold);
            assert!(out.len() <= threshold, "threshold {}", threshold);
        }
    }

    #[test]
    fn test_large_threshold_keeps_everything() {
        let points = series(50);
        assert_eq!(downsample(&points, 50), points);
        assert_eq!(downsample(&points, 4000), points);
        assert_eq!(downsample(&points, 0), points);
    }

    #[test]
    fn test_keeps_endpoints_and_order() {
        let points = series(300);
        let out = downsample(&points, 20);
        assert_eq!(out.len(), 20);
        assert_eq!(out[0], points[0]);
        assert_eq!(out[19], points[299]);
        assert!(out.windows(2).all(|w| w[0].x < w[1].x));
    }

    #[test]
    fn test_preserves_spike() {
        let mut points: Vec<Point> = (0..100).map(|i| Point::new(i as f64, 1.0)).collect();
        points[42].y = 500.0;
        let out = downsample(&points, 10);
        assert!(out.iter().any(|p| p.y == 500.0));
    }

    #[test]
    fn test_empty_input() {
        assert!(downsample(&[], 10).is_empty());
    }
}
