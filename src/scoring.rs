// src/scoring.rs

use super::*;
use crate::knowledge::MarkerPolarity;
use tracing::debug;

const BASELINE: f64 = 50.0;
const PATTERN_WEIGHT: f64 = 0.6;
const BALANCE_WEIGHT: f64 = 0.4;
const MARKER_MIN: f64 = -10.0;
const MARKER_MAX: f64 = 10.0;
const COMBINATION_STEP: f64 = 2.0;
const COMBINATION_MIN: f64 = -5.0;
const COMBINATION_MAX: f64 = 10.0;
const SOLAR_TERM_BONUS: f64 = 2.0;

/// Contribution of each factor to the composite score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub baseline: f64,
    pub pattern: f64,
    pub balance: f64,
    pub markers: f64,
    pub ten_god_combinations: f64,
    pub solar_term: f64,
    pub total: u32,
}

impl BaziEngine {
    /// Half the bonus of each favorable marker minus half the penalty of each unfavorable one.
    pub fn marker_score(&self, markers: &[ActiveMarker]) -> f64 {
        let score: f64 = markers
            .iter()
            .map(|marker| match marker.polarity {
                MarkerPolarity::Favorable => marker.weight / 2.0,
                MarkerPolarity::Unfavorable => -marker.weight / 2.0,
                MarkerPolarity::Mixed => 0.0,
            })
            .sum();
        score.clamp(MARKER_MIN, MARKER_MAX)
    }

    /// Good and bad relation pairs present among the chart's ten gods.
    pub fn ten_god_combination_score(&self, ten_gods: &ByPillar<Option<TenGod>>) -> f64 {
        let present: Vec<TenGod> = ten_gods.values().flatten().copied().collect();
        let has_pair = |[a, b]: &[TenGod; 2]| present.contains(a) && present.contains(b);

        let scoring = &self.knowledge.scoring;
        let good = scoring.good_combinations.iter().filter(|pair| has_pair(*pair)).count() as f64;
        let bad = scoring.bad_combinations.iter().filter(|pair| has_pair(*pair)).count() as f64;
        ((good - bad) * COMBINATION_STEP).clamp(COMBINATION_MIN, COMBINATION_MAX)
    }

    pub fn composite_score(
        &self,
        level: &PatternLevel,
        balance: &ElementBalance,
        markers: &[ActiveMarker],
        ten_gods: &ByPillar<Option<TenGod>>,
        solar_term_resolved: bool,
    ) -> ScoreBreakdown {
        let pattern = (level.score as f64 - BASELINE) * PATTERN_WEIGHT;
        let balance = (balance.balance_index - BASELINE) * BALANCE_WEIGHT;
        let markers = self.marker_score(markers);
        let ten_god_combinations = self.ten_god_combination_score(ten_gods);
        let solar_term = if solar_term_resolved { SOLAR_TERM_BONUS } else { 0.0 };

        let raw = BASELINE + pattern + balance + markers + ten_god_combinations + solar_term;
        let total = raw.round().clamp(0.0, 100.0) as u32;

        debug!(
            pattern,
            balance,
            markers,
            ten_god_combinations,
            solar_term,
            total,
            "composite score"
        );

        ScoreBreakdown {
            baseline: BASELINE,
            pattern,
            balance,
            markers,
            ten_god_combinations,
            solar_term,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::Symbol;
    use approx::assert_relative_eq;

    fn setup() -> BaziEngine {
        BaziEngine::standard()
    }

    fn marker(polarity: MarkerPolarity, weight: f64) -> ActiveMarker {
        ActiveMarker {
            name: "test".into(),
            polarity,
            magnitude: 0.5,
            weight,
            description: String::new(),
            targets: vec![Symbol::Branch(Branch::Zi)],
            present: Vec::new(),
        }
    }

    fn gods(year: TenGod, month: TenGod, hour: TenGod) -> ByPillar<Option<TenGod>> {
        ByPillar {
            year: Some(year),
            month: Some(month),
            day: Some(TenGod::Companion),
            hour: Some(hour),
        }
    }

    fn level(score: i32) -> PatternLevel {
        PatternLevel {
            grade: PatternGrade::Ordinary,
            label: "普通".to_string(),
            score,
            description: String::new(),
            multiple: false,
            best_pattern: None,
        }
    }

    #[test]
    fn test_marker_score_clamped() {
        let engine = setup();
        let markers = vec![
            marker(MarkerPolarity::Favorable, 5.0),
            marker(MarkerPolarity::Unfavorable, 4.0),
            marker(MarkerPolarity::Mixed, 9.0),
        ];
        assert_relative_eq!(engine.marker_score(&markers), 0.5);

        let many = vec![marker(MarkerPolarity::Favorable, 5.0); 6];
        assert_relative_eq!(engine.marker_score(&many), 10.0);
    }

    #[test]
    fn test_ten_god_combinations() {
        let engine = setup();
        // 正官 + 正印 is good.
        let good = gods(TenGod::DirectOfficer, TenGod::DirectResource, TenGod::RobWealth);
        assert_relative_eq!(engine.ten_god_combination_score(&good), 2.0);

        // 伤官 + 正官 and 七杀 + 正官 are bad.
        let bad = gods(TenGod::HurtingOfficer, TenGod::DirectOfficer, TenGod::SevenKillings);
        assert_relative_eq!(engine.ten_god_combination_score(&bad), -4.0);

        let none = ByPillar {
            year: None,
            month: None,
            day: None,
            hour: None,
        };
        assert_relative_eq!(engine.ten_god_combination_score(&none), 0.0);
    }

    #[test]
    fn test_composite_score_arithmetic() {
        let engine = setup();
        let chart = ByPillar {
            year: "庚午".parse().unwrap(),
            month: "壬午".parse().unwrap(),
            day: "辛亥".parse().unwrap(),
            hour: "乙未".parse().unwrap(),
        };
        let mut balance = engine.element_balance(&chart);
        balance.balance_index = 90.0;
        let markers = vec![marker(MarkerPolarity::Favorable, 4.0)];
        let ten_gods = gods(TenGod::RobWealth, TenGod::HurtingOfficer, TenGod::IndirectWealth);

        let score = engine.composite_score(&level(58), &balance, &markers, &ten_gods, true);
        // 50 + 4.8 + 16 + 2 + 0 + 2
        assert_relative_eq!(score.pattern, 4.8, epsilon = 1e-9);
        assert_relative_eq!(score.balance, 16.0, epsilon = 1e-9);
        assert_eq!(score.total, 75);

        let unresolved = engine.composite_score(&level(58), &balance, &markers, &ten_gods, false);
        assert_eq!(unresolved.total, 73);
    }

    #[test]
    fn test_composite_score_bounds() {
        let engine = setup();
        let chart = ByPillar {
            year: "甲子".parse().unwrap(),
            month: "甲子".parse().unwrap(),
            day: "甲子".parse().unwrap(),
            hour: "甲子".parse().unwrap(),
        };
        let mut balance = engine.element_balance(&chart);
        balance.balance_index = 0.0;
        let markers = vec![marker(MarkerPolarity::Unfavorable, 40.0)];
        let ten_gods = gods(TenGod::RobWealth, TenGod::DirectWealth, TenGod::RobWealth);
        let score = engine.composite_score(&level(-200), &balance, &markers, &ten_gods, false);
        assert_eq!(score.total, 0);
    }
}
