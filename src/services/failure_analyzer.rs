//! Gap-to-ceiling analysis per category.

use serde::Serialize;

use crate::domain::models::{Category, RunResult};

/// How far one category sits below the reference ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryGap {
    /// Category measured.
    pub category: Category,
    /// Mean F1, in percent.
    pub f1: f64,
    /// Mean judge score, in percent.
    pub judge: f64,
    /// Items in the category.
    pub n: usize,
    /// `ceiling_f1 - f1`; negative when the category beats the ceiling.
    pub gap: f64,
}

/// Priority label shown next to a gap.
pub fn priority_label(gap: f64) -> &'static str {
    if gap > 10.0 {
        "HIGH"
    } else if gap > 5.0 {
        "medium"
    } else {
        "low"
    }
}

/// Advisory ranking of categories by gap to a fixed ceiling F1.
#[derive(Debug, Clone, Copy)]
pub struct FailureAnalyzer {
    ceiling_f1: f64,
}

impl FailureAnalyzer {
    /// Analyzer measuring gaps against `ceiling_f1`.
    pub fn new(ceiling_f1: f64) -> Self {
        Self { ceiling_f1 }
    }

    /// Reference ceiling F1.
    pub fn ceiling_f1(&self) -> f64 {
        self.ceiling_f1
    }

    /// Gaps sorted descending; equal gaps keep category order.
    pub fn analyze(&self, run: &RunResult) -> Vec<CategoryGap> {
        // by_category iterates in category order and the sort is stable
        let mut gaps: Vec<CategoryGap> = run
            .by_category
            .iter()
            .map(|(&category, stats)| CategoryGap {
                category,
                f1: stats.avg_f1,
                judge: stats.avg_judge,
                n: stats.n,
                gap: self.ceiling_f1 - stats.avg_f1,
            })
            .collect();
        gaps.sort_by(|a, b| b.gap.total_cmp(&a.gap));
        gaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CategoryStats, RunConfig};
    use std::collections::BTreeMap;

    fn run(stats: &[(Category, f64)]) -> RunResult {
        let by_category: BTreeMap<_, _> = stats
            .iter()
            .map(|&(c, f1)| {
                (
                    c,
                    CategoryStats {
                        avg_f1: f1,
                        avg_judge: 0.0,
                        n: 4,
                    },
                )
            })
            .collect();
        RunResult {
            overall_f1: 0.0,
            overall_judge: 0.0,
            elapsed_seconds: 0.0,
            label: String::new(),
            by_category,
            config: RunConfig::default(),
            not_found_rate: 0.0,
        }
    }

    #[test]
    fn test_sorted_by_gap_descending() {
        let gaps = FailureAnalyzer::new(67.9).analyze(&run(&[
            (Category::Decisions, 60.0),
            (Category::Bugs, 20.0),
            (Category::Procedures, 70.0),
        ]));

        let order: Vec<_> = gaps.iter().map(|g| g.category).collect();
        assert_eq!(order, vec![Category::Bugs, Category::Decisions, Category::Procedures]);
        assert!((gaps[0].gap - 47.9).abs() < 1e-9);
        assert!(gaps[2].gap < 0.0);
    }

    #[test]
    fn test_ties_follow_category_order() {
        let gaps = FailureAnalyzer::new(50.0).analyze(&run(&[
            (Category::Procedures, 30.0),
            (Category::Solutions, 30.0),
            (Category::Decisions, 30.0),
        ]));

        let order: Vec<_> = gaps.iter().map(|g| g.category).collect();
        assert_eq!(order, vec![Category::Decisions, Category::Solutions, Category::Procedures]);
    }

    #[test]
    fn test_priority_labels() {
        assert_eq!(priority_label(12.0), "HIGH");
        assert_eq!(priority_label(7.5), "medium");
        assert_eq!(priority_label(-3.0), "low");
    }
}
