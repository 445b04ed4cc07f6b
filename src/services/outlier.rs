//! Virality ratio of a reel against its own profile's baseline.

/// View statistics of one profile's scraped reels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewBaseline {
    pub mean: f64,
    pub median: i64,
    pub count: usize,
}

impl ViewBaseline {
    pub fn from_views(views: &[i64]) -> Self {
        if views.is_empty() {
            return Self {
                mean: 0.0,
                median: 0,
                count: 0,
            };
        }

        let mut sorted = views.to_vec();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2
        } else {
            sorted[mid]
        };
        let mean = sorted.iter().map(|&v| v as f64).sum::<f64>() / sorted.len() as f64;

        Self {
            mean,
            median,
            count: sorted.len(),
        }
    }

    /// `views / mean`, two decimals. Zero when there is no baseline.
    pub fn outlier_score(&self, views: i64) -> f64 {
        if self.mean <= 0.0 || views <= 0 {
            return 0.0;
        }
        round2(views as f64 / self.mean)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_has_zero_baseline() {
        let baseline = ViewBaseline::from_views(&[]);
        assert_eq!(baseline.count, 0);
        assert_eq!(baseline.outlier_score(10_000), 0.0);
    }

    #[test]
    fn mean_and_median() {
        let baseline = ViewBaseline::from_views(&[100, 400, 200, 300]);
        assert_eq!(baseline.mean, 250.0);
        assert_eq!(baseline.median, 250);

        let odd = ViewBaseline::from_views(&[5, 1, 9]);
        assert_eq!(odd.median, 5);
    }

    #[test]
    fn score_is_ratio_to_mean_rounded() {
        let baseline = ViewBaseline::from_views(&[1_000, 2_000, 3_000]);
        assert_eq!(baseline.outlier_score(2_000), 1.0);
        assert_eq!(baseline.outlier_score(10_000), 5.0);
        assert_eq!(baseline.outlier_score(1_234), 0.62);
        assert_eq!(baseline.outlier_score(0), 0.0);
    }

    #[test]
    fn all_zero_views_score_zero() {
        let baseline = ViewBaseline::from_views(&[0, 0, 0]);
        assert_eq!(baseline.outlier_score(0), 0.0);
    }
}
