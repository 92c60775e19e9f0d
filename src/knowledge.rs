// src/knowledge.rs
//
// Read-only reference data for the whole pipeline. The bundled dataset lives in
// `data/knowledge.json`; callers may load their own with `from_json`/`from_path`.

use super::*;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

static STANDARD_KNOWLEDGE: &str = include_str!("../data/knowledge.json");
static STANDARD: OnceLock<Arc<KnowledgeBase>> = OnceLock::new();

// ---------------------------
// ## Symbols and lookup slots
// ---------------------------

/// A stem or a branch; marker tables mix both.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Symbol {
    Stem(Stem),
    Branch(Branch),
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Symbol::Stem(stem) => write!(f, "{}", stem),
            Symbol::Branch(branch) => write!(f, "{}", branch),
        }
    }
}

impl FromStr for Symbol {
    type Err = BaziError;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(stem) = s.parse::<Stem>() {
            return Ok(Symbol::Stem(stem));
        }
        s.parse::<Branch>().map(Symbol::Branch)
    }
}

impl TryFrom<String> for Symbol {
    type Error = BaziError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.to_string()
    }
}

/// Chart position a marker rule reads its key from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PillarSlot {
    YearStem,
    YearBranch,
    MonthBranch,
    DayStem,
    DayBranch,
}

impl PillarSlot {
    fn keys_stem(self) -> bool {
        matches!(self, PillarSlot::YearStem | PillarSlot::DayStem)
    }
}

// ---------------------------
// ## Tables
// ---------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemAttributes {
    pub stem: Stem,
    pub element: Element,
    pub polarity: Polarity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchAttributes {
    pub branch: Branch,
    pub element: Element,
    pub polarity: Polarity,
}

/// One edge pair of the generating and restraining cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementCycleEntry {
    pub element: Element,
    pub generates: Element,
    pub restrains: Element,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenStemWeight {
    pub stem: Stem,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchHiddenStems {
    pub branch: Branch,
    pub stems: Vec<HiddenStemWeight>,
}

/// Branch at which each of the twelve life stages falls, starting at 长生.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifeStageOrdering {
    pub element: Element,
    pub polarity: Polarity,
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NayinEntry {
    pub name: String,
    pub element: Element,
}

/// Month, day, hour and minute of a solar term in a given year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermMoment {
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermYear {
    pub year: i32,
    pub moments: Vec<TermMoment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermBranch {
    pub term: SolarTerm,
    pub branch: Branch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarTermTable {
    /// Exact moments for specific years, in term order.
    pub bundled: Vec<TermYear>,
    /// Day-of-month constants for years up to 2000.
    pub constants_20th: Vec<f64>,
    /// Day-of-month constants for years after 2000.
    pub constants_21st: Vec<f64>,
    pub year_fraction: f64,
    /// The twelve sectional terms that open a solar month.
    pub month_starts: Vec<TermBranch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemStart {
    pub key: Stem,
    pub start: Stem,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerPolarity {
    #[serde(rename = "吉")]
    Favorable,
    #[serde(rename = "凶")]
    Unfavorable,
    #[serde(rename = "中")]
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerEntry {
    pub key: Symbol,
    pub targets: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerLookup {
    pub slot: PillarSlot,
    pub entries: Vec<MarkerEntry>,
}

/// A symbolic marker ("神煞") and the lookups that activate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerDefinition {
    pub name: String,
    pub polarity: MarkerPolarity,
    pub magnitude: f64,
    /// Bonus when favorable, penalty when unfavorable.
    #[serde(default)]
    pub weight: f64,
    pub description: String,
    pub lookups: Vec<MarkerLookup>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    Standard,
    Special,
    Transformation,
    Composite,
    External,
}

impl PatternCategory {
    /// Special and transformation patterns rank above standard ones.
    pub fn is_special(self) -> bool {
        matches!(self, PatternCategory::Special | PatternCategory::Transformation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternUpgrade {
    pub requires_any: Vec<TenGod>,
    pub name: String,
    pub bonus: i32,
    pub description: String,
}

/// Declarative matcher for one pattern template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum PatternRule {
    /// Month stem stands in `relation` to the day master.
    MonthRelation {
        relation: TenGod,
        #[serde(default)]
        upgrade: Option<PatternUpgrade>,
    },
    /// Day element ratio exceeds `min_ratio`.
    Dominance { min_ratio: f64 },
    /// Weak day master yielding to a dominant element.
    Yielding {
        toward: ElementRole,
        max_day_ratio: f64,
        min_target_ratio: f64,
    },
    /// Year and month stems form this unordered pair.
    StemPair { stems: [Stem; 2], element: Element },
    /// Exactly two elements present, balanced within the ratio bounds.
    ElementPair { min_ratio: f64, max_ratio: f64 },
    /// Any of the four pillars is one of these.
    PillarMembership { pillars: Vec<Pillar> },
    /// Year, month and day stems contain one of these sets.
    StemSet { sets: Vec<Vec<Stem>> },
    /// Two of the four pillars are identical.
    RepeatedPillar,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternTemplate {
    pub name: String,
    pub category: PatternCategory,
    pub score: i32,
    pub description: String,
    pub rule: PatternRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiSpecialRule {
    pub name: String,
    pub bonus: i32,
    pub cap: i32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositePair {
    pub name: String,
    pub score: i32,
    pub description: String,
    /// Each group must be satisfied by one pattern name from it.
    pub requires: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRules {
    pub multi_special: MultiSpecialRule,
    pub pairs: Vec<CompositePair>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PatternGrade {
    #[serde(rename = "上等")]
    Upper,
    #[serde(rename = "中上")]
    UpperMiddle,
    #[serde(rename = "中等")]
    Middle,
    #[serde(rename = "中下")]
    LowerMiddle,
    #[serde(rename = "普通")]
    Ordinary,
}

impl PatternGrade {
    pub fn label(self) -> &'static str {
        match self {
            PatternGrade::Upper => "上等",
            PatternGrade::UpperMiddle => "中上",
            PatternGrade::Middle => "中等",
            PatternGrade::LowerMiddle => "中下",
            PatternGrade::Ordinary => "普通",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeThreshold {
    pub grade: PatternGrade,
    pub min_score: i32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRules {
    /// Checked in order; the first threshold met wins.
    pub thresholds: Vec<GradeThreshold>,
    /// Used when patterns exist but none meets a threshold.
    pub ordinary_description: String,
    pub default_score: i32,
    /// Used when the chart has no pattern at all.
    pub empty_description: String,
    pub multiple_count: usize,
    /// Appended to the grade label when `multiple_count` patterns are active.
    pub multiple_label: String,
    pub multiple_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthRules {
    pub strong_ratio: f64,
    pub strong_useful: Vec<ElementRole>,
    pub strong_avoid: Vec<ElementRole>,
    pub weak_useful: Vec<ElementRole>,
    pub weak_avoid: Vec<ElementRole>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationScore {
    pub relation: TenGod,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTables {
    pub relation_scores: Vec<RelationScore>,
    pub default_relation_score: i32,
    pub good_combinations: Vec<[TenGod; 2]>,
    pub bad_combinations: Vec<[TenGod; 2]>,
    /// Six clashing branch pairs.
    pub clashes: Vec<[Branch; 2]>,
    /// Six combining branch pairs.
    pub combinations: Vec<[Branch; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PalaceDefinition {
    pub name: String,
    pub offset: usize,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarPlacement {
    pub name: String,
    pub element: Element,
    /// Branches counted forward from the life palace.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemTransformations {
    pub stem: Stem,
    pub lu: String,
    pub quan: String,
    pub ke: String,
    pub ji: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyConjunction {
    pub name: String,
    pub markers: Vec<String>,
    #[serde(default)]
    pub bonus: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FortuneLevel {
    #[serde(rename = "大吉")]
    GreatFortune,
    #[serde(rename = "吉")]
    Fortune,
    #[serde(rename = "小吉")]
    MinorFortune,
    #[serde(rename = "平")]
    Even,
    #[serde(rename = "小凶")]
    MinorMisfortune,
    #[serde(rename = "凶")]
    Misfortune,
    #[serde(rename = "大凶")]
    GreatMisfortune,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FortuneThreshold {
    pub level: FortuneLevel,
    pub min_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PalaceTables {
    pub palaces: Vec<PalaceDefinition>,
    pub main_stars: Vec<StarPlacement>,
    pub transformations: Vec<StemTransformations>,
    pub trine_groups: Vec<[Branch; 3]>,
    pub cardinal: Vec<Branch>,
    pub key_conjunctions: Vec<KeyConjunction>,
    pub fortune_levels: Vec<FortuneThreshold>,
}

// ---------------------------
// ## KnowledgeBase
// ---------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub stems: Vec<StemAttributes>,
    pub branches: Vec<BranchAttributes>,
    pub element_cycle: Vec<ElementCycleEntry>,
    pub hidden_stems: Vec<BranchHiddenStems>,
    pub life_stages: Vec<LifeStageOrdering>,
    /// Void branch pairs indexed by decade (xun) of the 60-cycle.
    pub void_pairs: Vec<[Branch; 2]>,
    pub nayin: Vec<NayinEntry>,
    pub solar_terms: SolarTermTable,
    pub month_stem_starts: Vec<StemStart>,
    pub hour_stem_starts: Vec<StemStart>,
    pub markers: Vec<MarkerDefinition>,
    pub patterns: Vec<PatternTemplate>,
    pub composites: CompositeRules,
    pub grades: GradeRules,
    pub strength: StrengthRules,
    pub scoring: ScoringTables,
    pub palaces: PalaceTables,
}

impl KnowledgeBase {
    /// The bundled dataset, parsed once per process.
    pub fn standard() -> Arc<KnowledgeBase> {
        STANDARD
            .get_or_init(|| {
                let knowledge = KnowledgeBase::from_json(STANDARD_KNOWLEDGE)
                    .expect("bundled knowledge base is valid");
                Arc::new(knowledge)
            })
            .clone()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let knowledge: KnowledgeBase = serde_json::from_str(json)?;
        knowledge.validate()?;
        debug!(
            markers = knowledge.markers.len(),
            patterns = knowledge.patterns.len(),
            "knowledge base loaded"
        );
        Ok(knowledge)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading knowledge base");
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Structural checks so that lookups inside the pipeline never need to fail.
    pub fn validate(&self) -> Result<()> {
        fn fail<T>(message: String) -> Result<T> {
            Err(BaziError::Knowledge(message))
        }

        if self.stems.len() != 10 || self.stems.iter().map(|s| s.stem).collect::<HashSet<_>>().len() != 10 {
            return fail("stems must list each of the 10 stems once".into());
        }
        if self.branches.len() != 12
            || self.branches.iter().map(|b| b.branch).collect::<HashSet<_>>().len() != 12
        {
            return fail("branches must list each of the 12 branches once".into());
        }
        if self.element_cycle.len() != 5
            || self.element_cycle.iter().map(|e| e.element).collect::<HashSet<_>>().len() != 5
        {
            return fail("element cycle must cover the 5 elements once".into());
        }
        if self.hidden_stems.len() != 12
            || self.hidden_stems.iter().map(|h| h.branch).collect::<HashSet<_>>().len() != 12
        {
            return fail("hidden stems must list each of the 12 branches once".into());
        }
        for entry in &self.hidden_stems {
            if entry.stems.is_empty() || entry.stems.iter().any(|h| h.weight < 0.0) {
                return fail(format!("hidden stems of {} are empty or negative", entry.branch));
            }
        }
        if self.life_stages.len() != 10 {
            return fail("life stages need one ordering per element and polarity".into());
        }
        for ordering in &self.life_stages {
            let distinct: HashSet<_> = ordering.branches.iter().collect();
            if ordering.branches.len() != 12 || distinct.len() != 12 {
                return fail(format!(
                    "life stage ordering {}{:?} is not a permutation of the 12 branches",
                    ordering.element, ordering.polarity
                ));
            }
        }
        if self.void_pairs.len() != 6 {
            return fail("void pairs must have 6 entries".into());
        }
        if self.nayin.len() != 30 {
            return fail(format!("nayin table has {} entries, expected 30", self.nayin.len()));
        }

        let terms = &self.solar_terms;
        if terms.constants_20th.len() != SolarTerm::COUNT || terms.constants_21st.len() != SolarTerm::COUNT {
            return fail("solar term constants must have 24 entries per century".into());
        }
        for year in &terms.bundled {
            if year.moments.len() != SolarTerm::COUNT {
                return fail(format!("bundled solar terms for {} must have 24 entries", year.year));
            }
        }
        if terms.month_starts.len() != 12
            || terms.month_starts.iter().map(|t| t.branch).collect::<HashSet<_>>().len() != 12
        {
            return fail("solar month starts must map 12 terms onto the 12 branches".into());
        }
        if self.month_stem_starts.len() != 10 || self.hour_stem_starts.len() != 10 {
            return fail("stem start tables must have 10 entries".into());
        }

        let mut names = HashSet::new();
        for marker in &self.markers {
            if !names.insert(marker.name.as_str()) {
                return fail(format!("duplicate marker {}", marker.name));
            }
            if !(0.0..=1.0).contains(&marker.magnitude) || marker.weight < 0.0 {
                return fail(format!("marker {} has magnitude outside [0, 1] or negative weight", marker.name));
            }
            for lookup in &marker.lookups {
                for entry in &lookup.entries {
                    let keyed_by_stem = matches!(entry.key, Symbol::Stem(_));
                    if keyed_by_stem != lookup.slot.keys_stem() {
                        return fail(format!(
                            "marker {} keys {} on slot {:?}",
                            marker.name, entry.key, lookup.slot
                        ));
                    }
                }
            }
        }

        let mut names = HashSet::new();
        for template in &self.patterns {
            if !names.insert(template.name.as_str()) {
                return fail(format!("duplicate pattern {}", template.name));
            }
        }

        if self.scoring.relation_scores.iter().any(|r| r.score < 0) {
            return fail("relation scores must be non-negative".into());
        }
        if self.scoring.clashes.len() != 6 || self.scoring.combinations.len() != 6 {
            return fail("clash and combination tables need 6 pairs each".into());
        }
        if self.palaces.palaces.len() != 12 {
            return fail("palace table needs 12 palaces".into());
        }

        Ok(())
    }

    // ---------------------------
    // ## Lookups
    // ---------------------------

    pub fn stem_attributes(&self, stem: Stem) -> Option<&StemAttributes> {
        self.stems.iter().find(|s| s.stem == stem)
    }

    pub fn stem_element(&self, stem: Stem) -> Option<Element> {
        self.stem_attributes(stem).map(|s| s.element)
    }

    pub fn stem_polarity(&self, stem: Stem) -> Option<Polarity> {
        self.stem_attributes(stem).map(|s| s.polarity)
    }

    pub fn branch_element(&self, branch: Branch) -> Option<Element> {
        self.branches
            .iter()
            .find(|b| b.branch == branch)
            .map(|b| b.element)
    }

    pub fn generates(&self, element: Element) -> Option<Element> {
        self.element_cycle
            .iter()
            .find(|e| e.element == element)
            .map(|e| e.generates)
    }

    pub fn restrains(&self, element: Element) -> Option<Element> {
        self.element_cycle
            .iter()
            .find(|e| e.element == element)
            .map(|e| e.restrains)
    }

    pub fn generated_by(&self, element: Element) -> Option<Element> {
        self.element_cycle
            .iter()
            .find(|e| e.generates == element)
            .map(|e| e.element)
    }

    pub fn restrained_by(&self, element: Element) -> Option<Element> {
        self.element_cycle
            .iter()
            .find(|e| e.restrains == element)
            .map(|e| e.element)
    }

    /// Hidden stems of a branch; empty when the branch is missing.
    pub fn hidden_stems(&self, branch: Branch) -> &[HiddenStemWeight] {
        self.hidden_stems
            .iter()
            .find(|h| h.branch == branch)
            .map(|h| h.stems.as_slice())
            .unwrap_or(&[])
    }

    pub fn life_stage_ordering(&self, element: Element, polarity: Polarity) -> Option<&[Branch]> {
        self.life_stages
            .iter()
            .find(|o| o.element == element && o.polarity == polarity)
            .map(|o| o.branches.as_slice())
    }

    pub fn void_pair(&self, xun: usize) -> Option<[Branch; 2]> {
        self.void_pairs.get(xun).copied()
    }

    pub fn nayin_entry(&self, pillar: Pillar) -> Option<&NayinEntry> {
        self.nayin.get(pillar.cycle_index() / 2)
    }

    pub fn month_stem_start(&self, year_stem: Stem) -> Option<Stem> {
        self.month_stem_starts
            .iter()
            .find(|s| s.key == year_stem)
            .map(|s| s.start)
    }

    pub fn hour_stem_start(&self, day_stem: Stem) -> Option<Stem> {
        self.hour_stem_starts
            .iter()
            .find(|s| s.key == day_stem)
            .map(|s| s.start)
    }

    /// Branch whose solar month this term opens, if it is a sectional term.
    pub fn month_start_branch(&self, term: SolarTerm) -> Option<Branch> {
        self.solar_terms
            .month_starts
            .iter()
            .find(|t| t.term == term)
            .map(|t| t.branch)
    }

    pub fn bundled_terms(&self, year: i32) -> Option<&[TermMoment]> {
        self.solar_terms
            .bundled
            .iter()
            .find(|y| y.year == year)
            .map(|y| y.moments.as_slice())
    }

    pub fn relation_score(&self, relation: TenGod) -> i32 {
        self.scoring
            .relation_scores
            .iter()
            .find(|r| r.relation == relation)
            .map(|r| r.score)
            .unwrap_or(self.scoring.default_relation_score)
    }

    pub fn marker(&self, name: &str) -> Option<&MarkerDefinition> {
        self.markers.iter().find(|m| m.name == name)
    }

    pub fn clash_partner(&self, branch: Branch) -> Option<Branch> {
        pair_partner(&self.scoring.clashes, branch)
    }

    pub fn combination_partner(&self, branch: Branch) -> Option<Branch> {
        pair_partner(&self.scoring.combinations, branch)
    }

    pub fn transformations(&self, stem: Stem) -> Option<&StemTransformations> {
        self.palaces.transformations.iter().find(|t| t.stem == stem)
    }
}

fn pair_partner(pairs: &[[Branch; 2]], branch: Branch) -> Option<Branch> {
    pairs.iter().find_map(|&[a, b]| {
        if a == branch {
            Some(b)
        } else if b == branch {
            Some(a)
        } else {
            None
        }
    })
}
