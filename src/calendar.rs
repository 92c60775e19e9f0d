// src/calendar.rs

use super::*;
use chrono::{Duration, NaiveDate, Timelike};
use tracing::{debug, trace, warn};

const MILLIS_PER_DAY: i64 = 86_400_000;
/// Minutes of clock offset per degree of longitude.
const MINUTES_PER_DEGREE: f64 = 4.0;

/// The solar-term window containing an instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolarTermInfo {
    pub current: SolarTerm,
    pub current_at: NaiveDateTime,
    pub next: SolarTerm,
    pub next_at: NaiveDateTime,
    pub days_since_current: i64,
    pub days_until_next: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarPosition {
    pub true_solar_time: NaiveDateTime,
    pub pillars: FourPillars,
    pub day_master: Stem,
    pub solar_term: Option<SolarTermInfo>,
}

/// Year pillar of a calendar year; 4 CE was 甲子.
pub fn year_pillar(year: i32) -> Pillar {
    Pillar::from_cycle_index(year as i64 - 4)
}

/// Day pillar counted from 1900-01-01, a 甲戌 day.
pub fn day_pillar(date: NaiveDate) -> Pillar {
    let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN);
    let days = date.signed_duration_since(epoch).num_days();
    Pillar::from_cycle_index(days + 10)
}

/// Two-hour branch of a clock hour; 23:00 already belongs to 子.
pub fn hour_branch(hour: u32) -> Branch {
    Branch::cyclic((((hour + 1) % 24) / 2) as i64)
}

fn whole_days(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

impl BaziEngine {
    /// Shift local civil time by the longitude's offset from the reference meridian.
    pub fn true_solar_time(&self, local: NaiveDateTime, longitude: f64) -> NaiveDateTime {
        let offset_minutes = (longitude - self.config.reference_meridian) * MINUTES_PER_DEGREE;
        let offset_ms = (offset_minutes * 60_000.0).round() as i64;
        local + Duration::milliseconds(offset_ms)
    }

    /// Moment of a solar term: the bundled table when it covers the year, else the formula.
    pub fn solar_term_moment(&self, year: i32, term: SolarTerm) -> NaiveDateTime {
        let bundled = self
            .knowledge
            .bundled_terms(year)
            .and_then(|moments| moments.get(term.index()))
            .and_then(|m| NaiveDate::from_ymd_opt(year, m.month, m.day)?.and_hms_opt(m.hour, m.minute, 0));

        match bundled {
            Some(moment) => moment,
            None => self.solar_term_by_formula(year, term),
        }
    }

    /// Approximate term date at noon from the per-century constants.
    ///
    /// This does not apply a flat "+1 day after 2000" to one constant set.
    /// Years up to 2000 and years after it each get their own 24 constants,
    /// applied to the two-digit year, which already absorbs that correction.
    pub fn solar_term_by_formula(&self, year: i32, term: SolarTerm) -> NaiveDateTime {
        let table = &self.knowledge.solar_terms;
        let constants = if year <= 2000 {
            &table.constants_20th
        } else {
            &table.constants_21st
        };
        let index = term.index();
        let constant = constants.get(index).copied().unwrap_or(0.0);
        let short_year = year.rem_euclid(100) as f64;

        // January and February terms precede the leap day of their own year.
        let leap_days = if index < 4 {
            ((short_year - 1.0) / 4.0).floor()
        } else {
            (short_year / 4.0).floor()
        };
        let day = ((short_year * table.year_fraction + constant).floor() - leap_days).clamp(1.0, 31.0) as u32;
        let month = (index / 2 + 1) as u32;

        let date = (1..=day)
            .rev()
            .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
            .unwrap_or(NaiveDate::MIN);
        trace!(year, term = ?term, %date, "solar term from formula");
        date.and_hms_opt(12, 0, 0).unwrap_or_default()
    }

    /// Linear scan of the instant's year for the term window containing it.
    /// Instants before 小寒 fall in the 冬至 window opened the previous year.
    pub fn solar_term_at(&self, instant: NaiveDateTime) -> Option<SolarTermInfo> {
        let year = instant.year();
        SolarTerm::all()
            .find_map(|term| self.term_window(year, term, instant))
            .or_else(|| self.term_window(year - 1, SolarTerm::WinterSolstice, instant))
    }

    fn term_window(&self, year: i32, term: SolarTerm, instant: NaiveDateTime) -> Option<SolarTermInfo> {
        let current_at = self.solar_term_moment(year, term);
        if instant < current_at {
            return None;
        }
        let next = term.next();
        let next_year = if next == SolarTerm::MinorCold { year + 1 } else { year };
        let next_at = self.solar_term_moment(next_year, next);
        if instant >= next_at {
            return None;
        }
        Some(SolarTermInfo {
            current: term,
            current_at,
            next,
            next_at,
            days_since_current: whole_days(current_at, instant),
            days_until_next: whole_days(instant, next_at),
        })
    }

    /// Month branch from the active solar term, falling back to the calendar month.
    pub fn month_branch(&self, instant: NaiveDateTime, term: Option<&SolarTermInfo>) -> Branch {
        let fallback = Branch::cyclic(instant.month0() as i64);

        let Some(info) = term else {
            warn!(%instant, "no solar term window found, using calendar month");
            return fallback;
        };

        // Non-sectional terms continue the month opened by the preceding sectional term.
        let sectional = if self.knowledge.month_start_branch(info.current).is_some() {
            info.current
        } else {
            SolarTerm::from_index((info.current.index() + SolarTerm::COUNT - 1) % SolarTerm::COUNT)
                .unwrap_or(info.current)
        };
        self.knowledge.month_start_branch(sectional).unwrap_or(fallback)
    }

    pub fn month_pillar(&self, year_stem: Stem, month_branch: Branch) -> Pillar {
        let start = self.knowledge.month_stem_start(year_stem).unwrap_or_else(|| {
            // Five-tiger rule: 甲/己 years open with 丙寅.
            Stem::cyclic((year_stem.index() as i64 % 5) * 2 + 2)
        });
        let distance = (month_branch.index() as i64 - Branch::Yin.index() as i64).rem_euclid(12);
        let stem = Stem::cyclic(start.index() as i64 + distance);
        Pillar::new(stem, month_branch).unwrap_or_else(|| Pillar::from_cycle_index(0))
    }

    pub fn hour_pillar(&self, day_stem: Stem, hour: u32) -> Pillar {
        let branch = hour_branch(hour);
        let start = self.knowledge.hour_stem_start(day_stem).unwrap_or_else(|| {
            // Five-rat rule: 甲/己 days open with 甲子.
            Stem::cyclic((day_stem.index() as i64 % 5) * 2)
        });
        let stem = Stem::cyclic(start.index() as i64 + branch.index() as i64);
        Pillar::new(stem, branch).unwrap_or_else(|| Pillar::from_cycle_index(0))
    }

    /// Whole days from the instant to the next term (forward) or since the current one.
    pub fn days_to_term_boundary(&self, instant: NaiveDateTime, forward: bool) -> i64 {
        match self.solar_term_at(instant) {
            Some(info) if forward => info.days_until_next.max(0),
            Some(info) => info.days_since_current.max(0),
            None => 0,
        }
    }

    pub fn calculate_pillars(&self, birth_info: &BirthInfo) -> CalendarPosition {
        let true_solar_time = self.true_solar_time(birth_info.date_time(), birth_info.longitude());

        // The year pillar follows the civil year; only the month uses solar terms.
        let year = year_pillar(true_solar_time.year());
        let solar_term = self.solar_term_at(true_solar_time);
        let month_branch = self.month_branch(true_solar_time, solar_term.as_ref());
        let month = self.month_pillar(year.stem(), month_branch);
        let day = day_pillar(true_solar_time.date());
        let hour = self.hour_pillar(day.stem(), true_solar_time.hour());

        debug!(
            %true_solar_time,
            year = %year,
            month = %month,
            day = %day,
            hour = %hour,
            term = ?solar_term.as_ref().map(|t| t.current),
            "pillars resolved"
        );

        CalendarPosition {
            true_solar_time,
            pillars: ByPillar {
                year,
                month,
                day,
                hour,
            },
            day_master: day.stem(),
            solar_term,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> BaziEngine {
        BaziEngine::standard()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_year_pillar() {
        assert_eq!(year_pillar(1984).to_string(), "甲子");
        assert_eq!(year_pillar(1990).to_string(), "庚午");
        assert_eq!(year_pillar(2024).to_string(), "甲辰");
    }

    #[test]
    fn test_day_pillar_epoch() {
        let epoch = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap();
        assert_eq!(day_pillar(epoch).to_string(), "甲戌");
        let next = NaiveDate::from_ymd_opt(1900, 1, 2).unwrap();
        assert_eq!(day_pillar(next).to_string(), "乙亥");
        let sixty = NaiveDate::from_ymd_opt(1900, 3, 2).unwrap();
        assert_eq!(day_pillar(sixty), day_pillar(epoch));
    }

    #[test]
    fn test_hour_branch_boundaries() {
        assert_eq!(hour_branch(23), Branch::Zi);
        assert_eq!(hour_branch(0), Branch::Zi);
        assert_eq!(hour_branch(1), Branch::Chou);
        assert_eq!(hour_branch(11), Branch::Wu);
        assert_eq!(hour_branch(14), Branch::Wei);
        assert_eq!(hour_branch(22), Branch::Hai);
    }

    #[test]
    fn test_hour_pillar_stems() {
        let engine = setup();
        assert_eq!(engine.hour_pillar(Stem::Jia, 0).to_string(), "甲子");
        assert_eq!(engine.hour_pillar(Stem::Yi, 0).to_string(), "丙子");
        assert_eq!(engine.hour_pillar(Stem::Xin, 14).to_string(), "乙未");
    }

    #[test]
    fn test_month_pillar_stems() {
        let engine = setup();
        assert_eq!(engine.month_pillar(Stem::Jia, Branch::Yin).to_string(), "丙寅");
        assert_eq!(engine.month_pillar(Stem::Geng, Branch::Wu).to_string(), "壬午");
        // 子 and 丑 close the cycle that 寅 opens.
        assert_eq!(engine.month_pillar(Stem::Jia, Branch::Zi).to_string(), "丙子");
        assert_eq!(engine.month_pillar(Stem::Jia, Branch::Chou).to_string(), "丁丑");
    }

    #[test]
    fn test_true_solar_time_offset() {
        let engine = setup();
        let local = at(1990, 6, 15, 14, 30);
        let shifted = engine.true_solar_time(local, 116.4);
        assert_eq!(shifted, local - Duration::milliseconds(864_000));
        assert_eq!(engine.true_solar_time(local, 120.0), local);
    }

    #[test]
    fn test_bundled_term_moment() {
        let engine = setup();
        let spring = engine.solar_term_moment(2024, SolarTerm::StartOfSpring);
        assert_eq!(spring, at(2024, 2, 4, 16, 27));
    }

    #[test]
    fn test_formula_term_moment() {
        let engine = setup();
        assert_eq!(
            engine.solar_term_moment(2025, SolarTerm::StartOfSpring),
            at(2025, 2, 3, 12, 0)
        );
        assert_eq!(
            engine.solar_term_moment(1990, SolarTerm::GrainInEar),
            at(1990, 6, 6, 12, 0)
        );
    }

    #[test]
    fn test_solar_term_window() {
        let engine = setup();
        let info = engine.solar_term_at(at(2024, 3, 1, 0, 0)).unwrap();
        assert_eq!(info.current, SolarTerm::RainWater);
        assert_eq!(info.next, SolarTerm::AwakeningOfInsects);
        assert_eq!(engine.month_branch(at(2024, 3, 1, 0, 0), Some(&info)), Branch::Yin);
    }

    #[test]
    fn test_winter_solstice_wraps_to_next_year() {
        let engine = setup();
        let info = engine.solar_term_at(at(2024, 12, 30, 12, 0)).unwrap();
        assert_eq!(info.current, SolarTerm::WinterSolstice);
        assert_eq!(info.next, SolarTerm::MinorCold);
        assert_eq!(info.next_at.year(), 2025);
        assert_eq!(engine.month_branch(at(2024, 12, 30, 12, 0), Some(&info)), Branch::Zi);
    }

    #[test]
    fn test_month_branch_fallback_without_term() {
        let engine = setup();
        assert_eq!(engine.month_branch(at(2024, 1, 2, 0, 0), None), Branch::Zi);
        assert_eq!(engine.month_branch(at(2024, 7, 2, 0, 0), None), Branch::Wu);
    }

    #[test]
    fn test_early_january_uses_previous_solstice() {
        let engine = setup();
        let instant = at(2024, 1, 2, 0, 0);
        let info = engine.solar_term_at(instant).unwrap();
        assert_eq!(info.current, SolarTerm::WinterSolstice);
        assert_eq!(info.current_at.year(), 2023);
        assert_eq!(info.next, SolarTerm::MinorCold);
        assert_eq!(info.next_at, engine.solar_term_moment(2024, SolarTerm::MinorCold));
        assert_eq!(engine.month_branch(instant, Some(&info)), Branch::Zi);
        assert!(engine.days_to_term_boundary(instant, true) > 0);
        assert!(engine.days_to_term_boundary(instant, false) > 0);
    }

    #[test]
    fn test_day_pillar_steps_through_supported_range() {
        let mut date = NaiveDate::from_ymd_opt(MIN_YEAR, 1, 1).unwrap();
        let last = NaiveDate::from_ymd_opt(MAX_YEAR, 12, 31).unwrap();
        let mut previous = day_pillar(date);
        while date < last {
            date = date.succ_opt().unwrap();
            let pillar = day_pillar(date);
            assert_eq!(pillar.stem().index(), (previous.stem().index() + 1) % 10, "{date}");
            assert_eq!(pillar.branch().index(), (previous.branch().index() + 1) % 12, "{date}");
            assert_eq!(pillar.stem().index() % 2, pillar.branch().index() % 2, "{date}");
            previous = pillar;
        }

        for year in MIN_YEAR..=MAX_YEAR {
            let pillar = year_pillar(year);
            assert_eq!(pillar.stem().index() % 2, pillar.branch().index() % 2, "{year}");
        }
    }

    #[test]
    fn test_reference_pillars() {
        let engine = setup();
        let birth = BirthInfo::new(at(1990, 6, 15, 14, 30), 116.4, Sex::Male).unwrap();
        let position = engine.calculate_pillars(&birth);
        assert_eq!(position.pillars.year.to_string(), "庚午");
        assert_eq!(position.pillars.month.to_string(), "壬午");
        assert_eq!(position.pillars.day.to_string(), "辛亥");
        assert_eq!(position.pillars.hour.to_string(), "乙未");
        assert_eq!(position.day_master, Stem::Xin);
        assert_eq!(position.solar_term.unwrap().current, SolarTerm::GrainInEar);
    }
}
