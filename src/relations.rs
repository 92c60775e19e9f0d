// src/relations.rs

use super::*;
use crate::knowledge::{MarkerDefinition, MarkerPolarity, PillarSlot, Symbol};
use std::collections::BTreeMap;
use tracing::trace;

/// Weight of each visible stem in the element balance.
const STEM_WEIGHT: f64 = 1.0;
/// Full weight of a chart (8 symbols); element scores are relative to it.
const CHART_WEIGHT: f64 = 8.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HiddenStem {
    pub stem: Stem,
    pub weight: f64,
    pub relation: Option<TenGod>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Nayin {
    pub name: String,
    pub element: Element,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementBalance {
    pub weights: BTreeMap<Element, f64>,
    pub total: f64,
    /// Share of the total, in percent.
    pub ratios: BTreeMap<Element, f64>,
    /// Weight relative to a full chart, in percent.
    pub scores: BTreeMap<Element, f64>,
    pub strongest: Element,
    pub weakest: Element,
    pub balance_index: f64,
}

impl ElementBalance {
    pub fn weight(&self, element: Element) -> f64 {
        self.weights.get(&element).copied().unwrap_or(0.0)
    }

    /// Fraction of the total weight held by `element`; 0 for an empty chart.
    pub fn fraction(&self, element: Element) -> f64 {
        if self.total > 0.0 {
            self.weight(element) / self.total
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveMarker {
    pub name: String,
    pub polarity: MarkerPolarity,
    pub magnitude: f64,
    pub weight: f64,
    pub description: String,
    /// Symbols the marker points at.
    pub targets: Vec<Symbol>,
    /// Targets that also appear among the chart's own stems and branches.
    pub present: Vec<Symbol>,
}

impl ActiveMarker {
    pub fn is_present(&self) -> bool {
        !self.present.is_empty()
    }
}

/// Everything derived from the four pillars before pattern classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relations {
    pub nayin: ByPillar<Option<Nayin>>,
    pub hidden_stems: ByPillar<Vec<HiddenStem>>,
    pub ten_gods: ByPillar<Option<TenGod>>,
    pub element_balance: ElementBalance,
    pub markers: Vec<ActiveMarker>,
    pub void_branches: ByPillar<Option<[Branch; 2]>>,
    pub life_stages: ByPillar<Option<LifeStage>>,
}

impl BaziEngine {
    /// Role of `other` relative to the day element in the five-element cycles.
    pub fn element_role(&self, day_element: Element, other: Element) -> Option<ElementRole> {
        let kb = &self.knowledge;
        if other == day_element {
            Some(ElementRole::Peer)
        } else if kb.generates(day_element) == Some(other) {
            Some(ElementRole::Output)
        } else if kb.restrains(day_element) == Some(other) {
            Some(ElementRole::Wealth)
        } else if kb.restrained_by(day_element) == Some(other) {
            Some(ElementRole::Authority)
        } else if kb.generated_by(day_element) == Some(other) {
            Some(ElementRole::Resource)
        } else {
            None
        }
    }

    pub fn element_for_role(&self, day_element: Element, role: ElementRole) -> Option<Element> {
        let kb = &self.knowledge;
        match role {
            ElementRole::Peer => Some(day_element),
            ElementRole::Output => kb.generates(day_element),
            ElementRole::Wealth => kb.restrains(day_element),
            ElementRole::Authority => kb.restrained_by(day_element),
            ElementRole::Resource => kb.generated_by(day_element),
        }
    }

    /// Ten-god relation of `other` to the day master.
    pub fn ten_god(&self, day_master: Stem, other: Stem) -> Option<TenGod> {
        let kb = &self.knowledge;
        let day = kb.stem_attributes(day_master)?;
        let target = kb.stem_attributes(other)?;
        let same = day.polarity == target.polarity;

        let relation = match self.element_role(day.element, target.element)? {
            ElementRole::Peer if same => TenGod::Companion,
            ElementRole::Peer => TenGod::RobWealth,
            ElementRole::Output if same => TenGod::EatingGod,
            ElementRole::Output => TenGod::HurtingOfficer,
            ElementRole::Resource if same => TenGod::IndirectResource,
            ElementRole::Resource => TenGod::DirectResource,
            ElementRole::Wealth if same => TenGod::IndirectWealth,
            ElementRole::Wealth => TenGod::DirectWealth,
            ElementRole::Authority if same => TenGod::SevenKillings,
            ElementRole::Authority => TenGod::DirectOfficer,
        };
        Some(relation)
    }

    pub fn hidden_stems(&self, day_master: Stem, branch: Branch) -> Vec<HiddenStem> {
        self.knowledge
            .hidden_stems(branch)
            .iter()
            .map(|hidden| HiddenStem {
                stem: hidden.stem,
                weight: hidden.weight,
                relation: self.ten_god(day_master, hidden.stem),
            })
            .collect()
    }

    /// Stems weigh 1.0 each; branches contribute their hidden stems' weights.
    pub fn element_balance(&self, pillars: &FourPillars) -> ElementBalance {
        let kb = &self.knowledge;
        let mut weights: BTreeMap<Element, f64> = Element::all().map(|e| (e, 0.0)).collect();

        for pillar in pillars.values() {
            if let Some(element) = kb.stem_element(pillar.stem()) {
                *weights.entry(element).or_insert(0.0) += STEM_WEIGHT;
            }
            for hidden in kb.hidden_stems(pillar.branch()) {
                if let Some(element) = kb.stem_element(hidden.stem) {
                    *weights.entry(element).or_insert(0.0) += hidden.weight;
                }
            }
        }

        let total: f64 = weights.values().sum();
        let ratios = weights
            .iter()
            .map(|(&e, &w)| (e, if total > 0.0 { w / total * 100.0 } else { 0.0 }))
            .collect();
        let scores = weights
            .iter()
            .map(|(&e, &w)| (e, (w / CHART_WEIGHT * 100.0).round()))
            .collect();

        // Stable sort keeps cycle order among equal weights.
        let mut ranked: Vec<(Element, f64)> = weights.iter().map(|(&e, &w)| (e, w)).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let strongest = ranked.first().map(|r| r.0).unwrap_or(Element::Wood);
        let weakest = ranked.last().map(|r| r.0).unwrap_or(Element::Wood);

        let count = weights.len() as f64;
        let mean = total / count;
        let variance = weights.values().map(|w| (w - mean).powi(2)).sum::<f64>() / count;
        let balance_index = (100.0 - variance.sqrt() * 20.0).max(0.0).round();

        ElementBalance {
            weights,
            total,
            ratios,
            scores,
            strongest,
            weakest,
            balance_index,
        }
    }

    fn slot_key(slot: PillarSlot, year: Pillar, day: Pillar, month_branch: Option<Branch>) -> Option<Symbol> {
        match slot {
            PillarSlot::YearStem => Some(Symbol::Stem(year.stem())),
            PillarSlot::YearBranch => Some(Symbol::Branch(year.branch())),
            PillarSlot::MonthBranch => month_branch.map(Symbol::Branch),
            PillarSlot::DayStem => Some(Symbol::Stem(day.stem())),
            PillarSlot::DayBranch => Some(Symbol::Branch(day.branch())),
        }
    }

    /// Targets of one marker for the given keys; empty when the rule does not fire.
    pub fn marker_targets(
        &self,
        marker: &MarkerDefinition,
        year: Pillar,
        day: Pillar,
        month_branch: Option<Branch>,
    ) -> Vec<Symbol> {
        let mut targets = Vec::new();
        for lookup in &marker.lookups {
            let Some(key) = Self::slot_key(lookup.slot, year, day, month_branch) else {
                continue;
            };
            if let Some(entry) = lookup.entries.iter().find(|e| e.key == key) {
                for target in &entry.targets {
                    if !targets.contains(target) {
                        targets.push(*target);
                    }
                }
            }
        }
        targets
    }

    /// Markers whose rule returns at least one target, in knowledge-base order.
    pub fn evaluate_markers(
        &self,
        year: Pillar,
        day: Pillar,
        month_branch: Option<Branch>,
    ) -> Vec<ActiveMarker> {
        self.knowledge
            .markers
            .iter()
            .filter_map(|marker| {
                let targets = self.marker_targets(marker, year, day, month_branch);
                if targets.is_empty() {
                    return None;
                }
                Some(ActiveMarker {
                    name: marker.name.clone(),
                    polarity: marker.polarity,
                    magnitude: marker.magnitude,
                    weight: marker.weight,
                    description: marker.description.clone(),
                    targets,
                    present: Vec::new(),
                })
            })
            .collect()
    }

    /// Markers for a chart, with the targets found among its own symbols.
    pub fn chart_markers(&self, pillars: &FourPillars) -> Vec<ActiveMarker> {
        let symbols: Vec<Symbol> = pillars
            .stems()
            .into_iter()
            .map(Symbol::Stem)
            .chain(pillars.branches().into_iter().map(Symbol::Branch))
            .collect();

        let mut markers = self.evaluate_markers(pillars.year, pillars.day, Some(pillars.month.branch()));
        for marker in &mut markers {
            marker.present = marker
                .targets
                .iter()
                .filter(|t| symbols.contains(t))
                .copied()
                .collect();
        }
        markers
    }

    /// The two branches left out of the pillar's ten-day decade (xun).
    pub fn void_branches(&self, pillar: Pillar) -> Option<[Branch; 2]> {
        let offset = (pillar.stem().index() as i64 - pillar.branch().index() as i64).rem_euclid(12);
        self.knowledge.void_pair(offset as usize / 2)
    }

    pub fn life_stage(&self, day_master: Stem, branch: Branch) -> Option<LifeStage> {
        let kb = &self.knowledge;
        let attributes = kb.stem_attributes(day_master)?;
        let ordering = kb.life_stage_ordering(attributes.element, attributes.polarity)?;
        let position = ordering.iter().position(|&b| b == branch)?;
        LifeStage::from_index(position)
    }

    pub fn nayin(&self, pillar: Pillar) -> Option<Nayin> {
        self.knowledge.nayin_entry(pillar).map(|entry| Nayin {
            name: entry.name.clone(),
            element: entry.element,
        })
    }

    pub fn derive_relations(&self, pillars: &FourPillars) -> Relations {
        let day_master = pillars.day.stem();

        let relations = Relations {
            nayin: pillars.map(|p| self.nayin(*p)),
            hidden_stems: pillars.map(|p| self.hidden_stems(day_master, p.branch())),
            ten_gods: pillars.map(|p| self.ten_god(day_master, p.stem())),
            element_balance: self.element_balance(pillars),
            markers: self.chart_markers(pillars),
            void_branches: pillars.map(|p| self.void_branches(*p)),
            life_stages: pillars.map(|p| self.life_stage(day_master, p.branch())),
        };

        trace!(
            strongest = %relations.element_balance.strongest,
            weakest = %relations.element_balance.weakest,
            balance_index = relations.element_balance.balance_index,
            markers = relations.markers.len(),
            "relations derived"
        );
        relations
    }
}
