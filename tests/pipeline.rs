use bazi_core::{
    BaziEngine, BaziError, BirthInfo, Direction, EngineConfig, KnowledgeBase, MemoizedEngine, Sex, Stem,
};
use chrono::NaiveDate;
use std::io::Write;
use std::sync::Arc;

fn reference_birth() -> BirthInfo {
    BirthInfo::new(
        NaiveDate::from_ymd_opt(1990, 6, 15)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap(),
        116.4,
        Sex::Male,
    )
    .unwrap()
}

fn pinned_config() -> EngineConfig {
    EngineConfig {
        annual_start_year: Some(2024),
        ..EngineConfig::default()
    }
}

fn engine() -> BaziEngine {
    BaziEngine::standard().with_config(pinned_config())
}

#[test]
fn test_reference_chart() {
    let chart = engine().generate(&reference_birth());

    let pillars: Vec<String> = chart.pillars.values().map(|p| p.to_string()).collect();
    assert_eq!(pillars, ["庚午", "壬午", "辛亥", "乙未"]);
    assert_eq!(chart.day_master, Stem::Xin);
    assert_eq!(chart.luck_cycle.direction, Direction::Reverse);
    assert_eq!(chart.luck_cycle.stages.len(), 10);
    assert_eq!(chart.annual_cycle.len(), 10);
    assert_eq!(chart.annual_cycle[0].year, 2024);
    assert_eq!(chart.total_score, chart.score.total);
    assert!(chart.total_score <= 100);
    assert_eq!(chart.patterns.main_pattern.as_ref().unwrap().name, "伤官见官格");
}

#[test]
fn test_pipeline_is_deterministic() {
    let engine = engine();
    let first = engine.generate(&reference_birth());
    let second = engine.generate(&reference_birth());
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_chart_serializes_with_characters() {
    let chart = engine().generate(&reference_birth());
    let json = serde_json::to_value(&chart).unwrap();
    assert_eq!(json["pillars"]["year"], "庚午");
    assert_eq!(json["day_master"], "辛");
    assert_eq!(json["luck_cycle"]["direction"], "逆排");
}

#[test]
fn test_extended_analysis_from_chart() {
    let engine = engine();
    let chart = engine.generate(&reference_birth());
    let extended = engine.extended_analysis(&chart, Some(2026));
    assert_eq!(extended.palaces.palaces.len(), 12);
    assert!((0.0..=100.0).contains(&extended.fortune.total));
}

#[test]
fn test_memoized_engine_returns_cached_chart() {
    let memo = MemoizedEngine::new(engine());
    let first = memo.generate(&reference_birth());
    let second = memo.generate(&reference_birth());
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(memo.cache().stats().hits, 1);
    assert_eq!(*first, memo.engine().generate(&reference_birth()));
}

#[test]
fn test_knowledge_base_from_file() {
    let json = KnowledgeBase::standard().to_json_pretty().unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let knowledge = KnowledgeBase::from_path(file.path()).unwrap();
    let engine = BaziEngine::new(Arc::new(knowledge), pinned_config());
    assert_eq!(engine.generate(&reference_birth()), self::engine().generate(&reference_birth()));
}

#[test]
fn test_invalid_knowledge_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"{"stems": []}"#).unwrap();
    assert!(matches!(
        KnowledgeBase::from_path(file.path()),
        Err(BaziError::Json(_))
    ));
    assert!(matches!(
        KnowledgeBase::from_path("/nonexistent/knowledge.json"),
        Err(BaziError::Io(_))
    ));
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(br#"{"decade_stages": 8, "annual_start_year": 2030}"#)
        .unwrap();
    let config = EngineConfig::from_path(file.path()).unwrap();
    assert_eq!(config.decade_stages, 8);
    assert_eq!(config.cache_capacity, 1000);

    let chart = BaziEngine::standard().with_config(config).generate(&reference_birth());
    assert_eq!(chart.luck_cycle.stages.len(), 8);
    assert_eq!(chart.annual_cycle[0].year, 2030);

    let mut bad = tempfile::NamedTempFile::new().unwrap();
    bad.write_all(br#"{"reference_meridian": 500.0}"#).unwrap();
    assert!(matches!(
        EngineConfig::from_path(bad.path()),
        Err(BaziError::Config(_))
    ));
}

#[test]
fn test_invalid_birth_info() {
    let date_time = NaiveDate::from_ymd_opt(1850, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert!(matches!(
        BirthInfo::new(date_time, 116.4, Sex::Female),
        Err(BaziError::InvalidInput(_))
    ));
}
