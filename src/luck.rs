// src/luck.rs

use super::*;
use crate::calendar::year_pillar;
use crate::knowledge::MarkerPolarity;
use tracing::debug;

const DAYS_PER_YEAR_OF_LUCK: i64 = 3;
const MONTHS_PER_REMAINING_DAY: f64 = 4.0;
const YEARS_PER_STAGE: u32 = 10;

const ANNUAL_CLASH_PENALTY: f64 = 5.0;
const ANNUAL_COMBINATION_BONUS: f64 = 3.0;
const ANNUAL_MIN_SCORE: f64 = 40.0;
const ANNUAL_MAX_SCORE: f64 = 95.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "顺排")]
    Forward,
    #[serde(rename = "逆排")]
    Reverse,
}

/// One ten-year luck stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LuckStage {
    pub pillar: Pillar,
    pub relation: Option<TenGod>,
    pub element: Option<Element>,
    pub score: i32,
    pub start_age: u32,
    pub end_age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LuckCycle {
    /// Fractional age at which the first stage begins.
    pub onset_age: f64,
    pub start_age: u32,
    pub direction: Direction,
    pub stages: Vec<LuckStage>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionKind {
    #[serde(rename = "冲")]
    Clash,
    #[serde(rename = "合")]
    Combination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchInteraction {
    pub kind: InteractionKind,
    pub position: PillarPosition,
}

/// Projection for a single calendar year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualStage {
    pub year: i32,
    pub pillar: Pillar,
    pub relation: Option<TenGod>,
    pub markers: Vec<String>,
    pub interactions: Vec<BranchInteraction>,
    pub score: f64,
}

impl BaziEngine {
    /// Forward for yang day masters of men and yin day masters of women.
    pub fn luck_direction(&self, day_master: Stem, sex: Sex) -> Direction {
        let polarity = self.knowledge.stem_polarity(day_master);
        match (sex, polarity) {
            (Sex::Male, Some(Polarity::Yang)) | (Sex::Female, Some(Polarity::Yin)) => Direction::Forward,
            _ => Direction::Reverse,
        }
    }

    /// Three days to the term boundary count as one year, one day as four months.
    pub fn onset_age(&self, instant: NaiveDateTime, direction: Direction) -> f64 {
        let days = self.days_to_term_boundary(instant, direction == Direction::Forward);
        let years = days / DAYS_PER_YEAR_OF_LUCK;
        let months = ((days % DAYS_PER_YEAR_OF_LUCK) as f64 * MONTHS_PER_REMAINING_DAY).floor();
        years as f64 + months / 12.0
    }

    pub fn calculate_luck_cycle(
        &self,
        month_pillar: Pillar,
        day_master: Stem,
        direction: Direction,
        onset_age: f64,
    ) -> LuckCycle {
        let onset_age = if onset_age.is_finite() { onset_age.max(0.0) } else { 0.0 };
        let start_age = onset_age.floor() as u32;
        let step = match direction {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        };

        let stages = (0..self.config.decade_stages)
            .map(|i| {
                let pillar = month_pillar.offset(step * i as i64);
                let relation = self.ten_god(day_master, pillar.stem());
                let stage_start = start_age + YEARS_PER_STAGE * i as u32;
                LuckStage {
                    pillar,
                    relation,
                    element: self.knowledge.stem_element(pillar.stem()),
                    score: relation
                        .map(|r| self.knowledge.relation_score(r))
                        .unwrap_or(self.knowledge.scoring.default_relation_score),
                    start_age: stage_start,
                    end_age: stage_start + YEARS_PER_STAGE - 1,
                }
            })
            .collect();

        debug!(?direction, onset_age, "luck cycle calculated");
        LuckCycle {
            onset_age,
            start_age,
            direction,
            stages,
        }
    }

    /// Clash and combination of a year branch against each base pillar.
    pub fn branch_interactions(&self, pillars: &FourPillars, branch: Branch) -> Vec<BranchInteraction> {
        let clash = self.knowledge.clash_partner(branch);
        let combination = self.knowledge.combination_partner(branch);

        let mut interactions = Vec::new();
        for (position, pillar) in pillars.iter() {
            if clash == Some(pillar.branch()) {
                interactions.push(BranchInteraction {
                    kind: InteractionKind::Clash,
                    position,
                });
            }
            if combination == Some(pillar.branch()) {
                interactions.push(BranchInteraction {
                    kind: InteractionKind::Combination,
                    position,
                });
            }
        }
        interactions
    }

    pub fn annual_stage(&self, pillars: &FourPillars, day_master: Stem, year: i32) -> AnnualStage {
        let pillar = year_pillar(year);
        let relation = self.ten_god(day_master, pillar.stem());
        let markers = self.evaluate_markers(pillar, pillar, None);
        let interactions = self.branch_interactions(pillars, pillar.branch());

        let mut score = relation
            .map(|r| self.knowledge.relation_score(r))
            .unwrap_or(self.knowledge.scoring.default_relation_score) as f64;
        if interactions.iter().any(|i| i.kind == InteractionKind::Clash) {
            score -= ANNUAL_CLASH_PENALTY;
        }
        if interactions.iter().any(|i| i.kind == InteractionKind::Combination) {
            score += ANNUAL_COMBINATION_BONUS;
        }
        for marker in &markers {
            match marker.polarity {
                MarkerPolarity::Favorable => score += marker.weight,
                MarkerPolarity::Unfavorable => score -= marker.weight,
                MarkerPolarity::Mixed => {}
            }
        }

        AnnualStage {
            year,
            pillar,
            relation,
            markers: markers.into_iter().map(|m| m.name).collect(),
            interactions,
            score: score.clamp(ANNUAL_MIN_SCORE, ANNUAL_MAX_SCORE),
        }
    }

    pub fn calculate_annual_cycle(
        &self,
        pillars: &FourPillars,
        day_master: Stem,
        first_year: i32,
    ) -> Vec<AnnualStage> {
        (0..self.config.annual_stages)
            .map(|i| self.annual_stage(pillars, day_master, first_year + i as i32))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn setup() -> BaziEngine {
        BaziEngine::standard()
    }

    fn reference_pillars() -> FourPillars {
        ByPillar {
            year: "庚午".parse().unwrap(),
            month: "壬午".parse().unwrap(),
            day: "辛亥".parse().unwrap(),
            hour: "乙未".parse().unwrap(),
        }
    }

    #[test]
    fn test_direction() {
        let engine = setup();
        assert_eq!(engine.luck_direction(Stem::Jia, Sex::Male), Direction::Forward);
        assert_eq!(engine.luck_direction(Stem::Jia, Sex::Female), Direction::Reverse);
        assert_eq!(engine.luck_direction(Stem::Xin, Sex::Male), Direction::Reverse);
        assert_eq!(engine.luck_direction(Stem::Xin, Sex::Female), Direction::Forward);
    }

    #[test]
    fn test_onset_age_from_term_distance() {
        let engine = setup();
        // 芒种 1990 falls on 06-06 12:00; 06-15 14:15 is 9 whole days later.
        let instant = NaiveDate::from_ymd_opt(1990, 6, 15)
            .unwrap()
            .and_hms_opt(14, 15, 36)
            .unwrap();
        assert_relative_eq!(engine.onset_age(instant, Direction::Reverse), 3.0);
        // 夏至 1990 falls on 06-21 12:00: 5 whole days ahead.
        assert_relative_eq!(engine.onset_age(instant, Direction::Forward), 1.0 + 8.0 / 12.0);
    }

    #[test]
    fn test_reverse_luck_cycle() {
        let engine = setup();
        let cycle = engine.calculate_luck_cycle("壬午".parse().unwrap(), Stem::Xin, Direction::Reverse, 3.0);
        assert_eq!(cycle.stages.len(), 10);
        assert_eq!(cycle.stages[0].pillar.to_string(), "壬午");
        assert_eq!(cycle.stages[1].pillar.to_string(), "辛巳");
        assert_eq!(cycle.stages[2].pillar.to_string(), "庚辰");
        assert_eq!(cycle.stages[0].start_age, 3);
        assert_eq!(cycle.stages[0].end_age, 12);
        assert_eq!(cycle.stages[9].start_age, 93);
        assert_eq!(cycle.stages[0].relation, Some(TenGod::HurtingOfficer));
        assert_eq!(cycle.stages[0].score, 60);
    }

    #[test]
    fn test_forward_luck_cycle_wraps() {
        let engine = setup();
        let cycle = engine.calculate_luck_cycle("癸亥".parse().unwrap(), Stem::Jia, Direction::Forward, 7.5);
        assert_eq!(cycle.start_age, 7);
        assert_eq!(cycle.stages[1].pillar.to_string(), "甲子");
        assert_eq!(cycle.stages[1].start_age, 17);
        assert_eq!(cycle.direction, Direction::Forward);
    }

    #[test]
    fn test_branch_interactions() {
        let engine = setup();
        // 子 clashes with the two 午 pillars; 丑 combines with nothing here.
        let interactions = engine.branch_interactions(&reference_pillars(), Branch::Zi);
        assert_eq!(interactions.len(), 2);
        assert!(interactions.iter().all(|i| i.kind == InteractionKind::Clash));
        assert_eq!(interactions[0].position, PillarPosition::Year);
        assert_eq!(interactions[1].position, PillarPosition::Month);

        // 未 combines with both 午 pillars and clashes with nothing.
        let interactions = engine.branch_interactions(&reference_pillars(), Branch::Wei);
        assert_eq!(interactions.len(), 2);
        assert!(interactions.iter().all(|i| i.kind == InteractionKind::Combination));
    }

    #[test]
    fn test_annual_cycle() {
        let engine = setup();
        let stages = engine.calculate_annual_cycle(&reference_pillars(), Stem::Xin, 2024);
        assert_eq!(stages.len(), 10);
        assert_eq!(stages[0].year, 2024);
        assert_eq!(stages[0].pillar.to_string(), "甲辰");
        assert_eq!(stages[9].year, 2033);
        for stage in &stages {
            assert!((40.0..=95.0).contains(&stage.score));
        }
    }

    #[test]
    fn test_annual_score_components() {
        let engine = setup();
        // 2026 丙午: 正官 75 for 辛; no clash or combination against 午/午/亥/未 besides 午未.
        let stage = engine.annual_stage(&reference_pillars(), Stem::Xin, 2026);
        assert_eq!(stage.pillar.to_string(), "丙午");
        assert_eq!(stage.relation, Some(TenGod::DirectOfficer));
        assert!(stage
            .interactions
            .iter()
            .any(|i| i.kind == InteractionKind::Combination && i.position == PillarPosition::Hour));
        assert!(stage.markers.contains(&"天乙贵人".to_string()));
        assert!(stage.markers.contains(&"羊刃".to_string()));
        // 75 + 3 (合) + 5 (天乙) + 3 (文昌) + 3 (将星) + 2 (红鸾) - 4 (羊刃) = 87
        assert_relative_eq!(stage.score, 87.0);
    }

    fn engine_with_relation_score(score: i32) -> BaziEngine {
        let mut knowledge = (*KnowledgeBase::standard()).clone();
        for relation in &mut knowledge.scoring.relation_scores {
            relation.score = score;
        }
        BaziEngine::new(Arc::new(knowledge), EngineConfig::default())
    }

    #[test]
    fn test_annual_score_clamped() {
        // 2026 adds +12 on top of the relation score: 合 +3 and markers +9.
        let low = engine_with_relation_score(0).annual_stage(&reference_pillars(), Stem::Xin, 2026);
        assert_relative_eq!(low.score, 40.0);

        let high = engine_with_relation_score(200).annual_stage(&reference_pillars(), Stem::Xin, 2026);
        assert_relative_eq!(high.score, 95.0);

        let middle = engine_with_relation_score(50).annual_stage(&reference_pillars(), Stem::Xin, 2026);
        assert_relative_eq!(middle.score, 62.0);
    }
}
