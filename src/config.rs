// src/config.rs

use super::*;
use chrono::Local;
use std::path::Path;

/// Engine settings that are not part of the knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Standard meridian of the civil time zone, degrees east.
    pub reference_meridian: f64,
    pub decade_stages: usize,
    pub annual_stages: usize,
    /// First annual stage; the current local year when unset.
    pub annual_start_year: Option<i32>,
    /// Charts kept by `MemoizedEngine`; 0 disables caching.
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            reference_meridian: 120.0,
            decade_stages: 10,
            annual_stages: 10,
            annual_start_year: None,
            cache_capacity: 1000,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.reference_meridian.is_finite() || !(-180.0..=180.0).contains(&self.reference_meridian) {
            return Err(BaziError::Config(format!(
                "reference meridian {} is outside [-180, 180]",
                self.reference_meridian
            )));
        }
        if let Some(year) = self.annual_start_year {
            if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
                return Err(BaziError::Config(format!(
                    "annual start year {} is outside {}..={}",
                    year, MIN_YEAR, MAX_YEAR
                )));
            }
        }
        Ok(())
    }

    pub fn first_annual_year(&self) -> i32 {
        self.annual_start_year.unwrap_or_else(|| Local::now().year())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.decade_stages, 10);
        assert_eq!(config.annual_stages, 10);
        assert_eq!(config.cache_capacity, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json(r#"{"annual_start_year": 2024}"#).unwrap();
        assert_eq!(config.annual_start_year, Some(2024));
        assert_eq!(config.first_annual_year(), 2024);
        assert_eq!(config.reference_meridian, 120.0);
    }

    #[test]
    fn test_invalid_meridian_rejected() {
        let result = EngineConfig::from_json(r#"{"reference_meridian": 500.0}"#);
        assert!(matches!(result, Err(BaziError::Config(_))));
    }
}
