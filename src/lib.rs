// src/lib.rs

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub mod cache;
pub mod calendar;
pub mod config;
pub mod knowledge;
pub mod luck;
pub mod palaces;
pub mod patterns;
pub mod relations;
pub mod scoring;

pub use cache::{CacheKey, CacheStats, ChartCache, MemoizedEngine};
pub use calendar::{CalendarPosition, SolarTermInfo};
pub use config::EngineConfig;
pub use knowledge::{
    FortuneLevel, KnowledgeBase, MarkerPolarity, PatternCategory, PatternGrade, Symbol,
};
pub use luck::{AnnualStage, BranchInteraction, Direction, InteractionKind, LuckCycle, LuckStage};
pub use palaces::{ExtendedAnalysis, FortuneScore, PalaceAnalysis};
pub use patterns::{Pattern, PatternAnalysis, PatternLevel};
pub use relations::{ActiveMarker, ElementBalance, HiddenStem, Nayin, Relations};
pub use scoring::ScoreBreakdown;

/// Earliest calendar year accepted at the input boundary.
pub const MIN_YEAR: i32 = 1900;
/// Latest calendar year accepted at the input boundary.
pub const MAX_YEAR: i32 = 2100;

// ---------------------------
// ## Enumerations
// ---------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Element {
    #[serde(rename = "木")]
    Wood,
    #[serde(rename = "火")]
    Fire,
    #[serde(rename = "土")]
    Earth,
    #[serde(rename = "金")]
    Metal,
    #[serde(rename = "水")]
    Water,
}

impl Element {
    pub fn all() -> impl Iterator<Item = Element> {
        [
            Element::Wood,
            Element::Fire,
            Element::Earth,
            Element::Metal,
            Element::Water,
        ]
        .into_iter()
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let element_str = match self {
            Element::Wood => "木",
            Element::Fire => "火",
            Element::Earth => "土",
            Element::Metal => "金",
            Element::Water => "水",
        };
        write!(f, "{}", element_str)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    #[serde(rename = "阳")]
    Yang,
    #[serde(rename = "阴")]
    Yin,
}

const STEM_CHARS: [char; 10] = ['甲', '乙', '丙', '丁', '戊', '己', '庚', '辛', '壬', '癸'];
const BRANCH_CHARS: [char; 12] = [
    '子', '丑', '寅', '卯', '辰', '巳', '午', '未', '申', '酉', '戌', '亥',
];

/// The ten heavenly stems, in cyclic order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stem {
    #[serde(rename = "甲")]
    Jia,
    #[serde(rename = "乙")]
    Yi,
    #[serde(rename = "丙")]
    Bing,
    #[serde(rename = "丁")]
    Ding,
    #[serde(rename = "戊")]
    Wu,
    #[serde(rename = "己")]
    Ji,
    #[serde(rename = "庚")]
    Geng,
    #[serde(rename = "辛")]
    Xin,
    #[serde(rename = "壬")]
    Ren,
    #[serde(rename = "癸")]
    Gui,
}

impl Stem {
    pub fn from_index(index: usize) -> Option<Stem> {
        match index {
            0 => Some(Stem::Jia),
            1 => Some(Stem::Yi),
            2 => Some(Stem::Bing),
            3 => Some(Stem::Ding),
            4 => Some(Stem::Wu),
            5 => Some(Stem::Ji),
            6 => Some(Stem::Geng),
            7 => Some(Stem::Xin),
            8 => Some(Stem::Ren),
            9 => Some(Stem::Gui),
            _ => None,
        }
    }

    /// Stem at a cyclic offset; any integer is wrapped into 0..10.
    pub fn cyclic(index: i64) -> Stem {
        Stem::from_index(index.rem_euclid(10) as usize).unwrap_or(Stem::Jia)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn all() -> impl Iterator<Item = Stem> {
        (0..10).filter_map(Stem::from_index)
    }

    pub fn as_char(self) -> char {
        STEM_CHARS[self.index()]
    }

    pub fn from_char(c: char) -> Option<Stem> {
        STEM_CHARS
            .iter()
            .position(|&s| s == c)
            .and_then(Stem::from_index)
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for Stem {
    type Err = BaziError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Stem::from_char(c).ok_or_else(|| BaziError::UnknownSymbol(s.to_string())),
            _ => Err(BaziError::UnknownSymbol(s.to_string())),
        }
    }
}

/// The twelve earthly branches, in cyclic order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Branch {
    #[serde(rename = "子")]
    Zi,
    #[serde(rename = "丑")]
    Chou,
    #[serde(rename = "寅")]
    Yin,
    #[serde(rename = "卯")]
    Mao,
    #[serde(rename = "辰")]
    Chen,
    #[serde(rename = "巳")]
    Si,
    #[serde(rename = "午")]
    Wu,
    #[serde(rename = "未")]
    Wei,
    #[serde(rename = "申")]
    Shen,
    #[serde(rename = "酉")]
    You,
    #[serde(rename = "戌")]
    Xu,
    #[serde(rename = "亥")]
    Hai,
}

impl Branch {
    pub fn from_index(index: usize) -> Option<Branch> {
        match index {
            0 => Some(Branch::Zi),
            1 => Some(Branch::Chou),
            2 => Some(Branch::Yin),
            3 => Some(Branch::Mao),
            4 => Some(Branch::Chen),
            5 => Some(Branch::Si),
            6 => Some(Branch::Wu),
            7 => Some(Branch::Wei),
            8 => Some(Branch::Shen),
            9 => Some(Branch::You),
            10 => Some(Branch::Xu),
            11 => Some(Branch::Hai),
            _ => None,
        }
    }

    /// Branch at a cyclic offset; any integer is wrapped into 0..12.
    pub fn cyclic(index: i64) -> Branch {
        Branch::from_index(index.rem_euclid(12) as usize).unwrap_or(Branch::Zi)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn all() -> impl Iterator<Item = Branch> {
        (0..12).filter_map(Branch::from_index)
    }

    pub fn as_char(self) -> char {
        BRANCH_CHARS[self.index()]
    }

    pub fn from_char(c: char) -> Option<Branch> {
        BRANCH_CHARS
            .iter()
            .position(|&b| b == c)
            .and_then(Branch::from_index)
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl FromStr for Branch {
    type Err = BaziError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                Branch::from_char(c).ok_or_else(|| BaziError::UnknownSymbol(s.to_string()))
            }
            _ => Err(BaziError::UnknownSymbol(s.to_string())),
        }
    }
}

/// Relation of a stem to the day master.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TenGod {
    #[serde(rename = "比肩")]
    Companion,
    #[serde(rename = "劫财")]
    RobWealth,
    #[serde(rename = "食神")]
    EatingGod,
    #[serde(rename = "伤官")]
    HurtingOfficer,
    #[serde(rename = "偏财")]
    IndirectWealth,
    #[serde(rename = "正财")]
    DirectWealth,
    #[serde(rename = "七杀")]
    SevenKillings,
    #[serde(rename = "正官")]
    DirectOfficer,
    #[serde(rename = "偏印")]
    IndirectResource,
    #[serde(rename = "正印")]
    DirectResource,
}

impl TenGod {
    pub fn all() -> impl Iterator<Item = TenGod> {
        [
            TenGod::Companion,
            TenGod::RobWealth,
            TenGod::EatingGod,
            TenGod::HurtingOfficer,
            TenGod::IndirectWealth,
            TenGod::DirectWealth,
            TenGod::SevenKillings,
            TenGod::DirectOfficer,
            TenGod::IndirectResource,
            TenGod::DirectResource,
        ]
        .into_iter()
    }
}

/// How an element stands toward the day master's element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementRole {
    /// Same element.
    Peer,
    /// Element the day master generates.
    Output,
    /// Element the day master restrains.
    Wealth,
    /// Element that restrains the day master.
    Authority,
    /// Element that generates the day master.
    Resource,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifeStage {
    #[serde(rename = "长生")]
    Birth,
    #[serde(rename = "沐浴")]
    Bathing,
    #[serde(rename = "冠带")]
    Capping,
    #[serde(rename = "临官")]
    Office,
    #[serde(rename = "帝旺")]
    Prosperity,
    #[serde(rename = "衰")]
    Decline,
    #[serde(rename = "病")]
    Sickness,
    #[serde(rename = "死")]
    Death,
    #[serde(rename = "墓")]
    Tomb,
    #[serde(rename = "绝")]
    Extinction,
    #[serde(rename = "胎")]
    Conception,
    #[serde(rename = "养")]
    Nurture,
}

impl LifeStage {
    pub fn from_index(index: usize) -> Option<LifeStage> {
        match index {
            0 => Some(LifeStage::Birth),
            1 => Some(LifeStage::Bathing),
            2 => Some(LifeStage::Capping),
            3 => Some(LifeStage::Office),
            4 => Some(LifeStage::Prosperity),
            5 => Some(LifeStage::Decline),
            6 => Some(LifeStage::Sickness),
            7 => Some(LifeStage::Death),
            8 => Some(LifeStage::Tomb),
            9 => Some(LifeStage::Extinction),
            10 => Some(LifeStage::Conception),
            11 => Some(LifeStage::Nurture),
            _ => None,
        }
    }
}

/// The 24 solar terms, starting from Minor Cold in early January.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SolarTerm {
    #[serde(rename = "小寒")]
    MinorCold,
    #[serde(rename = "大寒")]
    MajorCold,
    #[serde(rename = "立春")]
    StartOfSpring,
    #[serde(rename = "雨水")]
    RainWater,
    #[serde(rename = "惊蛰")]
    AwakeningOfInsects,
    #[serde(rename = "春分")]
    SpringEquinox,
    #[serde(rename = "清明")]
    PureBrightness,
    #[serde(rename = "谷雨")]
    GrainRain,
    #[serde(rename = "立夏")]
    StartOfSummer,
    #[serde(rename = "小满")]
    GrainBuds,
    #[serde(rename = "芒种")]
    GrainInEar,
    #[serde(rename = "夏至")]
    SummerSolstice,
    #[serde(rename = "小暑")]
    MinorHeat,
    #[serde(rename = "大暑")]
    MajorHeat,
    #[serde(rename = "立秋")]
    StartOfAutumn,
    #[serde(rename = "处暑")]
    EndOfHeat,
    #[serde(rename = "白露")]
    WhiteDew,
    #[serde(rename = "秋分")]
    AutumnEquinox,
    #[serde(rename = "寒露")]
    ColdDew,
    #[serde(rename = "霜降")]
    FrostDescent,
    #[serde(rename = "立冬")]
    StartOfWinter,
    #[serde(rename = "小雪")]
    MinorSnow,
    #[serde(rename = "大雪")]
    MajorSnow,
    #[serde(rename = "冬至")]
    WinterSolstice,
}

impl SolarTerm {
    pub const COUNT: usize = 24;

    pub fn from_index(index: usize) -> Option<SolarTerm> {
        use SolarTerm::*;
        const ORDER: [SolarTerm; 24] = [
            MinorCold,
            MajorCold,
            StartOfSpring,
            RainWater,
            AwakeningOfInsects,
            SpringEquinox,
            PureBrightness,
            GrainRain,
            StartOfSummer,
            GrainBuds,
            GrainInEar,
            SummerSolstice,
            MinorHeat,
            MajorHeat,
            StartOfAutumn,
            EndOfHeat,
            WhiteDew,
            AutumnEquinox,
            ColdDew,
            FrostDescent,
            StartOfWinter,
            MinorSnow,
            MajorSnow,
            WinterSolstice,
        ];
        ORDER.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn all() -> impl Iterator<Item = SolarTerm> {
        (0..Self::COUNT).filter_map(SolarTerm::from_index)
    }

    /// Following term; Winter Solstice wraps to next year's Minor Cold.
    pub fn next(self) -> SolarTerm {
        SolarTerm::from_index((self.index() + 1) % Self::COUNT).unwrap_or(SolarTerm::MinorCold)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PillarPosition {
    Year,
    Month,
    Day,
    Hour,
}

impl PillarPosition {
    pub fn all() -> impl Iterator<Item = PillarPosition> {
        [
            PillarPosition::Year,
            PillarPosition::Month,
            PillarPosition::Day,
            PillarPosition::Hour,
        ]
        .into_iter()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

// ---------------------------
// ## Structures
// ---------------------------

/// One stem-branch pair of the sexagenary cycle.
///
/// Only the 60 pairs whose stem and branch indices share parity exist; the
/// constructors refuse the other 60.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pillar {
    stem: Stem,
    branch: Branch,
}

impl Pillar {
    pub fn new(stem: Stem, branch: Branch) -> Option<Pillar> {
        if stem.index() % 2 == branch.index() % 2 {
            Some(Pillar { stem, branch })
        } else {
            None
        }
    }

    /// Pillar at position `index` of the 60-cycle, 甲子 being 0.
    pub fn from_cycle_index(index: i64) -> Pillar {
        let index = index.rem_euclid(60);
        Pillar {
            stem: Stem::cyclic(index),
            branch: Branch::cyclic(index),
        }
    }

    pub fn cycle_index(self) -> usize {
        let (s, b) = (self.stem.index() as i64, self.branch.index() as i64);
        (6 * s - 5 * b).rem_euclid(60) as usize
    }

    pub fn stem(self) -> Stem {
        self.stem
    }

    pub fn branch(self) -> Branch {
        self.branch
    }

    /// Step `offset` positions along the 60-cycle (negative steps backward).
    pub fn offset(self, offset: i64) -> Pillar {
        Pillar::from_cycle_index(self.cycle_index() as i64 + offset)
    }
}

impl fmt::Display for Pillar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.stem, self.branch)
    }
}

impl FromStr for Pillar {
    type Err = BaziError;

    fn from_str(s: &str) -> Result<Self> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 2 {
            return Err(BaziError::InvalidPillar(s.to_string()));
        }
        let stem = Stem::from_char(chars[0]).ok_or_else(|| BaziError::InvalidPillar(s.to_string()))?;
        let branch =
            Branch::from_char(chars[1]).ok_or_else(|| BaziError::InvalidPillar(s.to_string()))?;
        Pillar::new(stem, branch).ok_or_else(|| BaziError::InvalidPillar(s.to_string()))
    }
}

impl TryFrom<String> for Pillar {
    type Error = BaziError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Pillar> for String {
    fn from(pillar: Pillar) -> Self {
        pillar.to_string()
    }
}

/// One value per pillar position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ByPillar<T> {
    pub year: T,
    pub month: T,
    pub day: T,
    pub hour: T,
}

impl<T> ByPillar<T> {
    pub fn get(&self, position: PillarPosition) -> &T {
        match position {
            PillarPosition::Year => &self.year,
            PillarPosition::Month => &self.month,
            PillarPosition::Day => &self.day,
            PillarPosition::Hour => &self.hour,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PillarPosition, &T)> {
        PillarPosition::all().map(move |position| (position, self.get(position)))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        [&self.year, &self.month, &self.day, &self.hour].into_iter()
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> ByPillar<U> {
        ByPillar {
            year: f(&self.year),
            month: f(&self.month),
            day: f(&self.day),
            hour: f(&self.hour),
        }
    }
}

pub type FourPillars = ByPillar<Pillar>;

impl ByPillar<Pillar> {
    pub fn stems(&self) -> [Stem; 4] {
        [
            self.year.stem(),
            self.month.stem(),
            self.day.stem(),
            self.hour.stem(),
        ]
    }

    pub fn branches(&self) -> [Branch; 4] {
        [
            self.year.branch(),
            self.month.branch(),
            self.day.branch(),
            self.hour.branch(),
        ]
    }
}

/// Birth data as supplied by the caller: local civil time, no time zone.
/// Only built through [`BirthInfo::new`], so every value is validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BirthInfoFields")]
pub struct BirthInfo {
    date_time: NaiveDateTime,
    /// Decimal degrees, east positive.
    longitude: f64,
    sex: Sex,
}

#[derive(Deserialize)]
struct BirthInfoFields {
    date_time: NaiveDateTime,
    longitude: f64,
    sex: Sex,
}

impl TryFrom<BirthInfoFields> for BirthInfo {
    type Error = BaziError;

    fn try_from(fields: BirthInfoFields) -> Result<Self> {
        BirthInfo::new(fields.date_time, fields.longitude, fields.sex)
    }
}

impl BirthInfo {
    pub fn new(date_time: NaiveDateTime, longitude: f64, sex: Sex) -> Result<Self> {
        let birth_info = BirthInfo {
            date_time,
            longitude,
            sex,
        };
        birth_info.validate()?;
        Ok(birth_info)
    }

    fn validate(&self) -> Result<()> {
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(BaziError::InvalidInput(format!(
                "longitude {} is outside [-180, 180]",
                self.longitude
            )));
        }
        let year = self.date_time.year();
        if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
            return Err(BaziError::InvalidInput(format!(
                "year {} is outside {}..={}",
                year, MIN_YEAR, MAX_YEAR
            )));
        }
        Ok(())
    }

    pub fn date_time(&self) -> NaiveDateTime {
        self.date_time
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn sex(&self) -> Sex {
        self.sex
    }
}

/// The complete four-pillar chart with every derived attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub birth_info: BirthInfo,
    pub true_solar_time: NaiveDateTime,
    pub pillars: FourPillars,
    pub day_master: Stem,
    pub solar_term: Option<SolarTermInfo>,
    pub nayin: ByPillar<Option<Nayin>>,
    pub hidden_stems: ByPillar<Vec<HiddenStem>>,
    pub ten_gods: ByPillar<Option<TenGod>>,
    pub element_balance: ElementBalance,
    pub markers: Vec<ActiveMarker>,
    pub void_branches: ByPillar<Option<[Branch; 2]>>,
    pub life_stages: ByPillar<Option<LifeStage>>,
    pub patterns: PatternAnalysis,
    pub luck_cycle: LuckCycle,
    pub annual_cycle: Vec<AnnualStage>,
    pub score: ScoreBreakdown,
    pub total_score: u32,
}

impl Chart {
    pub fn calculate(birth_info: &BirthInfo, engine: &BaziEngine) -> Self {
        // Calendar: pillars and solar term
        let position = engine.calculate_pillars(birth_info);
        let pillars = position.pillars.clone();
        let day_master = position.day_master;

        // Relations: balance, ten gods, markers
        let relations = engine.derive_relations(&pillars);

        // Patterns
        let patterns = engine.classify_patterns(
            &pillars,
            &relations.element_balance,
            &relations.ten_gods,
            day_master,
        );

        // Luck cycles
        let direction = engine.luck_direction(day_master, birth_info.sex());
        let onset_age = engine.onset_age(position.true_solar_time, direction);
        let luck_cycle = engine.calculate_luck_cycle(pillars.month, day_master, direction, onset_age);
        let annual_cycle = engine.calculate_annual_cycle(
            &pillars,
            day_master,
            engine.config().first_annual_year(),
        );

        // Composite score
        let score = engine.composite_score(
            &patterns.level,
            &relations.element_balance,
            &relations.markers,
            &relations.ten_gods,
            position.solar_term.is_some(),
        );

        tracing::debug!(
            pillars = %format!("{} {} {} {}", pillars.year, pillars.month, pillars.day, pillars.hour),
            total = score.total,
            "chart calculated"
        );

        let Relations {
            nayin,
            hidden_stems,
            ten_gods,
            element_balance,
            markers,
            void_branches,
            life_stages,
        } = relations;

        Chart {
            birth_info: birth_info.clone(),
            true_solar_time: position.true_solar_time,
            pillars,
            day_master,
            solar_term: position.solar_term,
            nayin,
            hidden_stems,
            ten_gods,
            element_balance,
            markers,
            void_branches,
            life_stages,
            patterns,
            luck_cycle,
            annual_cycle,
            total_score: score.total,
            score,
        }
    }
}

// ---------------------------
// ## Error Handling
// ---------------------------

#[derive(Debug, Error)]
pub enum BaziError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid pillar: {0:?}")]
    InvalidPillar(String),

    #[error("Unknown stem or branch: {0:?}")]
    UnknownSymbol(String),

    #[error("Knowledge base error: {0}")]
    Knowledge(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BaziError>;

// ---------------------------
// ## BaziEngine Structure
// ---------------------------

/// Pipeline entry point. Holds the injected knowledge base and engine
/// configuration; every calculation is a pure function of these and its input.
#[derive(Debug, Clone)]
pub struct BaziEngine {
    knowledge: Arc<KnowledgeBase>,
    config: EngineConfig,
}

impl BaziEngine {
    pub fn new(knowledge: Arc<KnowledgeBase>, config: EngineConfig) -> Self {
        BaziEngine { knowledge, config }
    }

    /// Engine over the bundled knowledge base with default configuration.
    pub fn standard() -> Self {
        BaziEngine::new(KnowledgeBase::standard(), EngineConfig::default())
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn generate(&self, birth_info: &BirthInfo) -> Chart {
        Chart::calculate(birth_info, self)
    }
}
