// src/palaces.rs

use super::*;
use crate::calendar::year_pillar;
use crate::knowledge::{FortuneLevel, MarkerPolarity, Symbol};
use std::collections::BTreeMap;
use tracing::debug;

// ---------------------------
// ## Fortune score weights
// ---------------------------

const ELEMENT_MAX: f64 = 30.0;
const IDEAL_FRACTION: f64 = 0.2;
const PATTERN_MAX: f64 = 25.0;
const MARKER_BASE: f64 = 10.0;
const MARKER_MAX: f64 = 20.0;
const STAR_BASE: f64 = 7.5;
const STAR_MAX: f64 = 15.0;
const STAR_HARMONY_BONUS: f64 = 3.0;
const STAR_CLASH_PENALTY: f64 = 2.0;
const PALACE_BASE: f64 = 5.0;
const PALACE_MAX: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StarCombination {
    pub branch: Branch,
    /// Other members of the branch's three-harmony group.
    pub trine: Vec<Branch>,
    /// Other cardinal branches, empty unless the branch is 子/午/卯/酉.
    pub cardinal: Vec<Branch>,
    pub clash: Option<Branch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchRestraint {
    pub branch: Branch,
    pub restrains: Vec<Branch>,
    pub restrained_by: Vec<Branch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conjunction {
    pub name: String,
    pub active: bool,
    pub bonus: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformationKind {
    #[serde(rename = "化禄")]
    Lu,
    #[serde(rename = "化权")]
    Quan,
    #[serde(rename = "化科")]
    Ke,
    #[serde(rename = "化忌")]
    Ji,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transformation {
    pub kind: TransformationKind,
    pub star: String,
    /// Whether the transformed star sits in this palace.
    pub present: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PalaceState {
    #[serde(rename = "旺")]
    Flourishing,
    #[serde(rename = "衰")]
    Declining,
    #[serde(rename = "平")]
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlyingStar {
    pub year: i32,
    pub branch: Branch,
    pub element: Option<Element>,
    pub nayin: Option<Nayin>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Palace {
    pub name: String,
    pub description: String,
    pub branch: Branch,
    pub element: Option<Element>,
    pub stars: Vec<String>,
    pub transformations: Vec<Transformation>,
    /// Percent share of each element over the eight chart symbols plus the palace branch.
    pub element_ratios: BTreeMap<Element, f64>,
    pub state: PalaceState,
    pub flying_star: Option<FlyingStar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PalaceAnalysis {
    pub life_branch: Branch,
    pub life_nayin: Option<Nayin>,
    pub palaces: Vec<Palace>,
}

impl PalaceAnalysis {
    pub fn palace(&self, name: &str) -> Option<&Palace> {
        self.palaces.iter().find(|p| p.name == name)
    }

    /// The palace sitting on the life branch.
    pub fn life_palace(&self) -> Option<&Palace> {
        self.palaces.iter().find(|p| p.branch == self.life_branch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FortuneScore {
    pub element: f64,
    pub pattern: f64,
    pub markers: f64,
    pub stars: f64,
    pub palace: f64,
    pub total: f64,
    pub level: FortuneLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtendedAnalysis {
    pub star_combinations: ByPillar<StarCombination>,
    pub restraints: ByPillar<BranchRestraint>,
    pub conjunctions: Vec<Conjunction>,
    pub palaces: PalaceAnalysis,
    pub fortune: FortuneScore,
}

impl BaziEngine {
    // ---------------------------
    // ## Branch relations
    // ---------------------------

    pub fn star_combination(&self, branch: Branch) -> StarCombination {
        let tables = &self.knowledge.palaces;
        let trine = tables
            .trine_groups
            .iter()
            .find(|group| group.contains(&branch))
            .map(|group| group.iter().copied().filter(|&b| b != branch).collect())
            .unwrap_or_default();
        let cardinal = if tables.cardinal.contains(&branch) {
            tables.cardinal.iter().copied().filter(|&b| b != branch).collect()
        } else {
            Vec::new()
        };

        StarCombination {
            branch,
            trine,
            cardinal,
            clash: self.knowledge.clash_partner(branch),
        }
    }

    /// Element restraint between each branch and the other three.
    pub fn branch_restraints(&self, pillars: &FourPillars) -> ByPillar<BranchRestraint> {
        let kb = &self.knowledge;
        let restrains = |a: Branch, b: Branch| match (kb.branch_element(a), kb.branch_element(b)) {
            (Some(ea), Some(eb)) => kb.restrains(ea) == Some(eb),
            _ => false,
        };

        let restraint_for = |position: PillarPosition| {
            let branch = pillars.get(position).branch();
            let others: Vec<Branch> = pillars
                .iter()
                .filter(|(p, _)| *p != position)
                .map(|(_, pillar)| pillar.branch())
                .collect();
            BranchRestraint {
                branch,
                restrains: others.iter().copied().filter(|&o| restrains(branch, o)).collect(),
                restrained_by: others.iter().copied().filter(|&o| restrains(o, branch)).collect(),
            }
        };

        ByPillar {
            year: restraint_for(PillarPosition::Year),
            month: restraint_for(PillarPosition::Month),
            day: restraint_for(PillarPosition::Day),
            hour: restraint_for(PillarPosition::Hour),
        }
    }

    /// A conjunction is active when every named marker is active and its
    /// first target branch lies in the chart.
    pub fn key_conjunctions(&self, pillars: &FourPillars, markers: &[ActiveMarker]) -> Vec<Conjunction> {
        let branches = pillars.branches();
        self.knowledge
            .palaces
            .key_conjunctions
            .iter()
            .map(|conjunction| {
                let active = conjunction.markers.iter().all(|name| {
                    markers
                        .iter()
                        .find(|m| &m.name == name)
                        .and_then(|m| m.targets.first())
                        .is_some_and(|target| match target {
                            Symbol::Branch(b) => branches.contains(b),
                            Symbol::Stem(_) => false,
                        })
                });
                Conjunction {
                    name: conjunction.name.clone(),
                    active,
                    bonus: conjunction.bonus,
                }
            })
            .collect()
    }

    // ---------------------------
    // ## Palaces
    // ---------------------------

    pub fn life_palace_branch(&self, pillars: &FourPillars) -> Branch {
        Branch::cyclic((pillars.day.branch().index() + pillars.hour.branch().index()) as i64)
    }

    /// Active markers pointing at the branch, then main stars placed there.
    pub fn palace_stars(&self, life_branch: Branch, branch: Branch, markers: &[ActiveMarker]) -> Vec<String> {
        let markers = markers
            .iter()
            .filter(|m| m.targets.contains(&Symbol::Branch(branch)))
            .map(|m| m.name.clone());
        let main_stars = self
            .knowledge
            .palaces
            .main_stars
            .iter()
            .filter(|star| Branch::cyclic((life_branch.index() + star.offset) as i64) == branch)
            .map(|star| star.name.clone());
        markers.chain(main_stars).collect()
    }

    pub fn palace_transformations(&self, year_stem: Stem, stars: &[String]) -> Vec<Transformation> {
        let Some(table) = self.knowledge.transformations(year_stem) else {
            return Vec::new();
        };
        [
            (TransformationKind::Lu, &table.lu),
            (TransformationKind::Quan, &table.quan),
            (TransformationKind::Ke, &table.ke),
            (TransformationKind::Ji, &table.ji),
        ]
        .into_iter()
        .map(|(kind, star)| Transformation {
            kind,
            star: star.clone(),
            present: stars.contains(star),
        })
        .collect()
    }

    pub fn palace_element_ratios(&self, pillars: &FourPillars, branch: Branch) -> BTreeMap<Element, f64> {
        let kb = &self.knowledge;
        let elements: Vec<Element> = pillars
            .stems()
            .into_iter()
            .filter_map(|s| kb.stem_element(s))
            .chain(pillars.branches().into_iter().filter_map(|b| kb.branch_element(b)))
            .chain(kb.branch_element(branch))
            .collect();

        let total = elements.len() as f64;
        Element::all()
            .map(|element| {
                let count = elements.iter().filter(|&&e| e == element).count() as f64;
                let ratio = if total > 0.0 { count / total * 100.0 } else { 0.0 };
                (element, ratio)
            })
            .collect()
    }

    /// Compares the palace element with the first strongest and first weakest
    /// element of the balance, in 木火土金水 order.
    pub fn palace_state(&self, element: Option<Element>, balance: &ElementBalance) -> PalaceState {
        let Some(element) = element else {
            return PalaceState::Neutral;
        };

        let mut strongest = Element::Wood;
        let mut weakest = Element::Wood;
        let mut max = f64::NEG_INFINITY;
        let mut min = f64::INFINITY;
        for e in Element::all() {
            let weight = balance.weight(e);
            if weight > max {
                max = weight;
                strongest = e;
            }
            if weight < min {
                min = weight;
                weakest = e;
            }
        }

        if element == strongest {
            PalaceState::Flourishing
        } else if element == weakest {
            PalaceState::Declining
        } else {
            PalaceState::Neutral
        }
    }

    /// Palace branch advanced by the target year's branch, read with the year's stem.
    pub fn flying_star(&self, branch: Branch, year: i32) -> FlyingStar {
        let year_pillar = year_pillar(year);
        let fly = Branch::cyclic((branch.index() + year_pillar.branch().index()) as i64);
        FlyingStar {
            year,
            branch: fly,
            element: self.knowledge.branch_element(fly),
            nayin: Pillar::new(year_pillar.stem(), fly).and_then(|p| self.nayin(p)),
        }
    }

    pub fn analyze_palaces(&self, chart: &Chart, target_year: Option<i32>) -> PalaceAnalysis {
        let pillars = &chart.pillars;
        let life_branch = self.life_palace_branch(pillars);

        let palaces = self
            .knowledge
            .palaces
            .palaces
            .iter()
            .map(|definition| {
                let branch = Branch::cyclic((life_branch.index() + definition.offset) as i64);
                let element = self.knowledge.branch_element(branch);
                let stars = self.palace_stars(life_branch, branch, &chart.markers);
                Palace {
                    name: definition.name.clone(),
                    description: definition.description.clone(),
                    branch,
                    element,
                    transformations: self.palace_transformations(pillars.year.stem(), &stars),
                    stars,
                    element_ratios: self.palace_element_ratios(pillars, branch),
                    state: self.palace_state(element, &chart.element_balance),
                    flying_star: target_year.map(|year| self.flying_star(branch, year)),
                }
            })
            .collect();

        PalaceAnalysis {
            life_branch,
            life_nayin: Pillar::new(chart.day_master, life_branch).and_then(|p| self.nayin(p)),
            palaces,
        }
    }

    // ---------------------------
    // ## Fortune score
    // ---------------------------

    pub fn element_fortune(&self, balance: &ElementBalance) -> f64 {
        if balance.total <= 0.0 {
            return ELEMENT_MAX / 2.0;
        }
        let deviation: f64 = Element::all()
            .map(|e| (balance.fraction(e) - IDEAL_FRACTION).abs())
            .sum();
        (ELEMENT_MAX - deviation * ELEMENT_MAX).clamp(0.0, ELEMENT_MAX)
    }

    pub fn pattern_fortune(&self, patterns: &PatternAnalysis) -> f64 {
        if patterns.patterns.is_empty() {
            return PATTERN_MAX / 2.0;
        }
        (patterns.level.score as f64 / 100.0 * PATTERN_MAX).clamp(0.0, PATTERN_MAX)
    }

    pub fn marker_fortune(&self, markers: &[ActiveMarker]) -> f64 {
        let score = markers.iter().fold(MARKER_BASE, |score, m| match m.polarity {
            MarkerPolarity::Favorable => score + m.magnitude * 5.0,
            MarkerPolarity::Unfavorable => score - m.magnitude * 5.0,
            MarkerPolarity::Mixed => score + m.magnitude,
        });
        score.clamp(0.0, MARKER_MAX)
    }

    pub fn star_fortune(&self, combinations: &ByPillar<StarCombination>, conjunctions: &[Conjunction]) -> f64 {
        let mut score = STAR_BASE;
        for combination in combinations.values() {
            if !combination.trine.is_empty() && !combination.cardinal.is_empty() {
                score += STAR_HARMONY_BONUS;
            }
            if combination.clash.is_some() {
                score -= STAR_CLASH_PENALTY;
            }
        }
        score += conjunctions
            .iter()
            .filter(|c| c.active)
            .map(|c| c.bonus)
            .sum::<f64>();
        score.clamp(0.0, STAR_MAX)
    }

    pub fn palace_fortune(&self, analysis: &PalaceAnalysis) -> f64 {
        let Some(life) = analysis.life_palace() else {
            return PALACE_BASE;
        };
        let score = life
            .transformations
            .iter()
            .filter(|t| t.present)
            .fold(PALACE_BASE, |score, t| match t.kind {
                TransformationKind::Lu => score + 2.0,
                TransformationKind::Quan => score + 1.5,
                TransformationKind::Ke => score + 1.0,
                TransformationKind::Ji => score - 3.0,
            });
        score.clamp(0.0, PALACE_MAX)
    }

    pub fn fortune_level(&self, total: f64) -> FortuneLevel {
        self.knowledge
            .palaces
            .fortune_levels
            .iter()
            .find(|threshold| total >= threshold.min_score)
            .map(|threshold| threshold.level)
            .unwrap_or(FortuneLevel::GreatMisfortune)
    }

    pub fn extended_analysis(&self, chart: &Chart, target_year: Option<i32>) -> ExtendedAnalysis {
        let pillars = &chart.pillars;
        let star_combinations = pillars.map(|p| self.star_combination(p.branch()));
        let restraints = self.branch_restraints(pillars);
        let conjunctions = self.key_conjunctions(pillars, &chart.markers);
        let palaces = self.analyze_palaces(chart, target_year);

        let element = self.element_fortune(&chart.element_balance);
        let pattern = self.pattern_fortune(&chart.patterns);
        let markers = self.marker_fortune(&chart.markers);
        let stars = self.star_fortune(&star_combinations, &conjunctions);
        let palace = self.palace_fortune(&palaces);
        let total = element + pattern + markers + stars + palace;
        let level = self.fortune_level(total);

        debug!(total, ?level, life_branch = %palaces.life_branch, "extended analysis");

        ExtendedAnalysis {
            star_combinations,
            restraints,
            conjunctions,
            palaces,
            fortune: FortuneScore {
                element,
                pattern,
                markers,
                stars,
                palace,
                total,
                level,
            },
        }
    }
}
