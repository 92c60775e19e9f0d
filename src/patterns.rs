// src/patterns.rs

use super::*;
use crate::knowledge::{PatternRule, PatternTemplate};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    pub name: String,
    pub category: PatternCategory,
    pub score: i32,
    pub description: String,
    /// Element the pattern is built around, where it has one.
    pub element: Option<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternLevel {
    pub grade: PatternGrade,
    /// Grade label, qualified when several patterns are active.
    pub label: String,
    /// Rounded mean score of all active patterns.
    pub score: i32,
    pub description: String,
    pub multiple: bool,
    pub best_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FavorableElement {
    pub role: ElementRole,
    pub element: Element,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternAnalysis {
    pub patterns: Vec<Pattern>,
    pub level: PatternLevel,
    pub main_pattern: Option<Pattern>,
    pub day_master_strong: bool,
    pub useful: Vec<FavorableElement>,
    pub avoid: Vec<FavorableElement>,
}

/// Chart facts the matchers read.
struct MatchContext<'a> {
    pillars: &'a FourPillars,
    balance: &'a ElementBalance,
    ten_gods: &'a ByPillar<Option<TenGod>>,
    day_element: Option<Element>,
}

impl BaziEngine {
    /// Classifies a chart into its active patterns, level and useful/avoid elements.
    pub fn classify_patterns(
        &self,
        pillars: &FourPillars,
        balance: &ElementBalance,
        ten_gods: &ByPillar<Option<TenGod>>,
        day_master: Stem,
    ) -> PatternAnalysis {
        let context = MatchContext {
            pillars,
            balance,
            ten_gods,
            day_element: self.knowledge.stem_element(day_master),
        };

        let mut patterns: Vec<Pattern> = self
            .knowledge
            .patterns
            .iter()
            .filter_map(|template| self.match_template(template, &context))
            .collect();

        if let Some(composite) = self.composite_pattern(&patterns) {
            patterns.push(composite);
        }

        let level = self.pattern_level(&patterns);
        let main_pattern = Self::main_pattern(&patterns);
        let (day_master_strong, useful, avoid) = self.favorable_elements(balance, day_master);

        debug!(
            count = patterns.len(),
            main = ?main_pattern.as_ref().map(|p| p.name.as_str()),
            grade = ?level.grade,
            "patterns classified"
        );

        PatternAnalysis {
            patterns,
            level,
            main_pattern,
            day_master_strong,
            useful,
            avoid,
        }
    }

    fn match_template(&self, template: &PatternTemplate, ctx: &MatchContext) -> Option<Pattern> {
        let pattern = |name: &str, score: i32, description: &str, element: Option<Element>| Pattern {
            name: name.to_string(),
            category: template.category,
            score,
            description: description.to_string(),
            element,
        };
        let day_fraction = || ctx.day_element.map(|e| ctx.balance.fraction(e)).unwrap_or(0.0);

        match &template.rule {
            PatternRule::MonthRelation { relation, upgrade } => {
                if ctx.ten_gods.month != Some(*relation) {
                    return None;
                }
                // Upgraded when a controlling relation appears anywhere in the chart.
                if let Some(upgrade) = upgrade {
                    let controlled = ctx
                        .ten_gods
                        .values()
                        .flatten()
                        .any(|god| upgrade.requires_any.contains(god));
                    if controlled {
                        return Some(pattern(
                            &upgrade.name,
                            template.score + upgrade.bonus,
                            &upgrade.description,
                            None,
                        ));
                    }
                }
                Some(pattern(&template.name, template.score, &template.description, None))
            }
            PatternRule::Dominance { min_ratio } => {
                let day_element = ctx.day_element?;
                (day_fraction() > *min_ratio).then(|| {
                    pattern(&template.name, template.score, &template.description, Some(day_element))
                })
            }
            PatternRule::Yielding {
                toward,
                max_day_ratio,
                min_target_ratio,
            } => {
                let day_element = ctx.day_element?;
                if day_fraction() >= *max_day_ratio {
                    return None;
                }
                let target = self.element_for_role(day_element, *toward)?;
                (ctx.balance.fraction(target) > *min_target_ratio).then(|| {
                    pattern(&template.name, template.score, &template.description, Some(target))
                })
            }
            PatternRule::StemPair { stems, element } => {
                let (year, month) = (ctx.pillars.year.stem(), ctx.pillars.month.stem());
                let matched = (year == stems[0] && month == stems[1]) || (year == stems[1] && month == stems[0]);
                matched.then(|| pattern(&template.name, template.score, &template.description, Some(*element)))
            }
            PatternRule::ElementPair { min_ratio, max_ratio } => {
                let present: Vec<f64> = Element::all()
                    .map(|e| ctx.balance.weight(e))
                    .filter(|&w| w > 0.0)
                    .collect();
                if present.len() != 2 {
                    return None;
                }
                let ratio = present[0] / present[1];
                (*min_ratio..=*max_ratio)
                    .contains(&ratio)
                    .then(|| pattern(&template.name, template.score, &template.description, None))
            }
            PatternRule::PillarMembership { pillars } => ctx
                .pillars
                .values()
                .any(|p| pillars.contains(p))
                .then(|| pattern(&template.name, template.score, &template.description, None)),
            PatternRule::StemSet { sets } => {
                let stems = [
                    ctx.pillars.year.stem(),
                    ctx.pillars.month.stem(),
                    ctx.pillars.day.stem(),
                ];
                sets.iter()
                    .any(|set| !set.is_empty() && set.iter().all(|s| stems.contains(s)))
                    .then(|| pattern(&template.name, template.score, &template.description, None))
            }
            PatternRule::RepeatedPillar => {
                let all: Vec<Pillar> = ctx.pillars.values().copied().collect();
                let repeated = all
                    .iter()
                    .enumerate()
                    .any(|(i, p)| all[i + 1..].contains(p));
                repeated.then(|| pattern(&template.name, template.score, &template.description, None))
            }
        }
    }

    /// Synthesizes at most one composite pattern from the active ones.
    pub fn composite_pattern(&self, patterns: &[Pattern]) -> Option<Pattern> {
        let rules = &self.knowledge.composites;

        let specials: Vec<&Pattern> = patterns.iter().filter(|p| p.category.is_special()).collect();
        if specials.len() > 1 {
            let best = specials.iter().map(|p| p.score).max().unwrap_or(0);
            let multi = &rules.multi_special;
            return Some(Pattern {
                name: multi.name.clone(),
                category: PatternCategory::Composite,
                score: (best + multi.bonus).min(multi.cap),
                description: multi.description.clone(),
                element: None,
            });
        }

        let standard: Vec<&str> = patterns
            .iter()
            .filter(|p| p.category == PatternCategory::Standard)
            .map(|p| p.name.as_str())
            .collect();
        if standard.len() < 2 {
            return None;
        }

        rules
            .pairs
            .iter()
            .find(|pair| {
                pair.requires
                    .iter()
                    .all(|group| group.iter().any(|name| standard.contains(&name.as_str())))
            })
            .map(|pair| Pattern {
                name: pair.name.clone(),
                category: PatternCategory::Composite,
                score: pair.score,
                description: pair.description.clone(),
                element: None,
            })
    }

    pub fn pattern_level(&self, patterns: &[Pattern]) -> PatternLevel {
        let grades = &self.knowledge.grades;

        // First pattern wins ties.
        let Some(best) = patterns.iter().reduce(|best, p| if p.score > best.score { p } else { best }) else {
            return PatternLevel {
                grade: PatternGrade::Ordinary,
                label: PatternGrade::Ordinary.label().to_string(),
                score: grades.default_score,
                description: grades.empty_description.clone(),
                multiple: false,
                best_pattern: None,
            };
        };

        let (grade, description) = grades
            .thresholds
            .iter()
            .find(|t| best.score >= t.min_score)
            .map(|t| (t.grade, t.description.as_str()))
            .unwrap_or((PatternGrade::Ordinary, grades.ordinary_description.as_str()));
        let mean = patterns.iter().map(|p| p.score as f64).sum::<f64>() / patterns.len() as f64;

        let multiple = patterns.len() >= grades.multiple_count;
        let mut label = grade.label().to_string();
        let mut description = description.to_string();
        if multiple {
            label.push_str(&grades.multiple_label);
            description.push_str(&grades.multiple_description);
        }

        PatternLevel {
            grade,
            label,
            score: mean.round() as i32,
            description,
            multiple,
            best_pattern: Some(best.name.clone()),
        }
    }

    /// Highest-scoring special pattern, else standard, else any.
    pub fn main_pattern(patterns: &[Pattern]) -> Option<Pattern> {
        let highest = |filter: &dyn Fn(&Pattern) -> bool| {
            patterns
                .iter()
                .filter(|p| filter(*p))
                .reduce(|best, p| if p.score > best.score { p } else { best })
                .cloned()
        };

        highest(&|p: &Pattern| p.category.is_special())
            .or_else(|| highest(&|p: &Pattern| p.category == PatternCategory::Standard))
            .or_else(|| highest(&|_: &Pattern| true))
    }

    /// Strength of the day master and the element roles that help or hurt it.
    pub fn favorable_elements(
        &self,
        balance: &ElementBalance,
        day_master: Stem,
    ) -> (bool, Vec<FavorableElement>, Vec<FavorableElement>) {
        let rules = &self.knowledge.strength;
        let Some(day_element) = self.knowledge.stem_element(day_master) else {
            return (false, Vec::new(), Vec::new());
        };

        let strong = balance.fraction(day_element) > rules.strong_ratio;
        let (useful, avoid) = if strong {
            (&rules.strong_useful, &rules.strong_avoid)
        } else {
            (&rules.weak_useful, &rules.weak_avoid)
        };

        let resolve = |roles: &[ElementRole]| -> Vec<FavorableElement> {
            roles
                .iter()
                .filter_map(|&role| {
                    self.element_for_role(day_element, role)
                        .map(|element| FavorableElement { role, element })
                })
                .collect()
        };

        (strong, resolve(useful.as_slice()), resolve(avoid.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> BaziEngine {
        BaziEngine::standard()
    }

    fn analyze(engine: &BaziEngine, pillars: [&str; 4]) -> PatternAnalysis {
        let chart = ByPillar {
            year: pillars[0].parse().unwrap(),
            month: pillars[1].parse().unwrap(),
            day: pillars[2].parse().unwrap(),
            hour: pillars[3].parse().unwrap(),
        };
        let relations = engine.derive_relations(&chart);
        engine.classify_patterns(
            &chart,
            &relations.element_balance,
            &relations.ten_gods,
            chart.day.stem(),
        )
    }

    fn names(analysis: &PatternAnalysis) -> Vec<&str> {
        analysis.patterns.iter().map(|p| p.name.as_str()).collect()
    }

    fn standard(name: &str, score: i32) -> Pattern {
        Pattern {
            name: name.to_string(),
            category: PatternCategory::Standard,
            score,
            description: String::new(),
            element: None,
        }
    }

    fn special(name: &str, score: i32) -> Pattern {
        Pattern {
            category: PatternCategory::Special,
            ..standard(name, score)
        }
    }

    #[test]
    fn test_reference_chart_patterns() {
        // 辛 day with 壬 month stem: 伤官, and no 印 anywhere.
        let engine = setup();
        let analysis = analyze(&engine, ["庚午", "壬午", "辛亥", "乙未"]);
        assert_eq!(names(&analysis), vec!["伤官见官格"]);
        assert_eq!(analysis.level.grade, PatternGrade::LowerMiddle);
        assert_eq!(analysis.level.score, 58);
        assert_eq!(analysis.main_pattern.unwrap().name, "伤官见官格");
        assert!(!analysis.day_master_strong);
    }

    #[test]
    fn test_seven_killings_upgrade() {
        // 甲 day, 庚 month (七杀), 丙 hour (食神) controls it.
        let engine = setup();
        let analysis = analyze(&engine, ["甲子", "庚午", "甲寅", "丙寅"]);
        let pattern = analysis.patterns.iter().find(|p| p.name == "七杀有制格").unwrap();
        assert_eq!(pattern.score, 80);
        // 甲寅 day also forms 日德格.
        assert!(names(&analysis).contains(&"日德格"));
    }

    #[test]
    fn test_transformation_pair_is_unordered() {
        let engine = setup();
        let forward = analyze(&engine, ["甲子", "己巳", "丙寅", "戊子"]);
        let reverse = analyze(&engine, ["己巳", "甲戌", "丙寅", "戊子"]);
        assert!(names(&forward).contains(&"甲己化土"));
        assert!(names(&reverse).contains(&"甲己化土"));
        let pattern = forward.patterns.iter().find(|p| p.name == "甲己化土").unwrap();
        assert_eq!(pattern.element, Some(Element::Earth));
        assert_eq!(pattern.category, PatternCategory::Transformation);
    }

    #[test]
    fn test_repeated_pillar_is_external() {
        let engine = setup();
        let analysis = analyze(&engine, ["庚午", "壬午", "辛亥", "庚午"]);
        let pattern = analysis.patterns.iter().find(|p| p.name == "蝴蝶双飞格").unwrap();
        assert_eq!(pattern.category, PatternCategory::External);
        assert_eq!(pattern.score, 76);
    }

    #[test]
    fn test_dominance() {
        // 甲寅/乙卯 heavy wood chart.
        let engine = setup();
        let analysis = analyze(&engine, ["甲寅", "乙卯", "甲寅", "乙亥"]);
        let pattern = analysis.patterns.iter().find(|p| p.name == "专旺格").unwrap();
        assert_eq!(pattern.element, Some(Element::Wood));
        assert!(analysis.day_master_strong);
    }

    #[test]
    fn test_multi_special_composite() {
        let engine = setup();
        let patterns = vec![special("金神格", 83), special("魁罡格", 80), standard("正官格", 75)];
        let composite = engine.composite_pattern(&patterns).unwrap();
        assert_eq!(composite.name, "多重特殊格局");
        assert_eq!(composite.score, 88);

        let capped = vec![special("两神成像格", 90), special("从财格", 88)];
        assert_eq!(engine.composite_pattern(&capped).unwrap().score, 95);
    }

    #[test]
    fn test_standard_pair_composites() {
        let engine = setup();
        let officer_seal = vec![standard("正官格", 75), standard("正印格", 78)];
        assert_eq!(engine.composite_pattern(&officer_seal).unwrap().name, "官印相生格");

        let wealth_officer = vec![standard("偏财格", 72), standard("正官格", 75)];
        assert_eq!(engine.composite_pattern(&wealth_officer).unwrap().name, "财官双美格");

        let eating_wealth = vec![standard("食神格", 68), standard("正财格", 70)];
        assert_eq!(engine.composite_pattern(&eating_wealth).unwrap().name, "食神生财格");

        let unrelated = vec![standard("比肩格", 60), standard("劫财格", 62)];
        assert!(engine.composite_pattern(&unrelated).is_none());
        assert!(engine.composite_pattern(&[standard("正官格", 75)]).is_none());
    }

    #[test]
    fn test_pattern_level() {
        let engine = setup();
        let empty = engine.pattern_level(&[]);
        assert_eq!(empty.grade, PatternGrade::Ordinary);
        assert_eq!(empty.score, 50);
        assert_eq!(empty.label, "普通");
        assert_eq!(empty.description, "无明显格局，普通命造");

        let level = engine.pattern_level(&[standard("正官格", 75), standard("正印格", 78), special("金神格", 83)]);
        assert_eq!(level.grade, PatternGrade::UpperMiddle);
        assert_eq!(level.score, 79);
        assert!(level.multiple);
        assert_eq!(level.label, "中上（多重格局）");
        assert_eq!(level.description, "格局不错，有所作为，具备多种格局特征");
        assert_eq!(level.best_pattern.as_deref(), Some("金神格"));

        let pair = engine.pattern_level(&[standard("正官格", 75), standard("正印格", 78)]);
        assert!(!pair.multiple);
        assert_eq!(pair.label, "中上");
        assert_eq!(pair.description, "格局不错，有所作为");

        let low = engine.pattern_level(&[standard("伤官见官格", 50)]);
        assert_eq!(low.grade, PatternGrade::Ordinary);
        assert_eq!(low.description, "格局平常，普通命造");
    }

    #[test]
    fn test_main_pattern_prefers_special() {
        let patterns = vec![standard("正印格", 78), special("魁罡格", 80), special("日德格", 78)];
        assert_eq!(BaziEngine::main_pattern(&patterns).unwrap().name, "魁罡格");

        let ties = vec![standard("偏财格", 72), standard("比肩格", 72)];
        assert_eq!(BaziEngine::main_pattern(&ties).unwrap().name, "偏财格");
        assert!(BaziEngine::main_pattern(&[]).is_none());
    }

    #[test]
    fn test_weak_day_master_elements() {
        let engine = setup();
        let analysis = analyze(&engine, ["庚午", "壬午", "辛亥", "乙未"]);
        let useful: Vec<ElementRole> = analysis.useful.iter().map(|f| f.role).collect();
        assert_eq!(useful, vec![ElementRole::Resource, ElementRole::Peer]);
        assert_eq!(analysis.useful[0].element, Element::Earth);
        assert_eq!(analysis.avoid.len(), 3);
    }
}
