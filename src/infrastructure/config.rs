use crate::domain::layout::DisplayWindow;
use crate::domain::local_calendar::LocalCalendar;
use crate::infrastructure::error::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

const ENGINE_JSON: &str = "engine.json";
const SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub schema: u8,
    pub timezone: String,
    pub display_window: DisplayWindow,
    pub lane_gap_percent: f64,
    pub list_horizon_days: u32,
    pub api_base_url: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema: 1,
            timezone: "Etc/GMT-3".to_string(),
            display_window: DisplayWindow::default(),
            lane_gap_percent: 1.0,
            list_horizon_days: 30,
            api_base_url: "http://127.0.0.1:8080/api/".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.display_window
            .validate()
            .map_err(EngineError::InvalidConfig)?;
        if !self.lane_gap_percent.is_finite() || !(0.0..10.0).contains(&self.lane_gap_percent) {
            return Err(EngineError::InvalidConfig(
                "laneGapPercent must be between 0 and 10".to_string(),
            ));
        }
        if self.list_horizon_days == 0 {
            return Err(EngineError::InvalidConfig(
                "listHorizonDays must be > 0".to_string(),
            ));
        }
        self.calendar()?;
        self.api_base_url()?;
        Ok(())
    }

    pub fn calendar(&self) -> Result<LocalCalendar, EngineError> {
        LocalCalendar::from_name(&self.timezone)
    }

    pub fn api_base_url(&self) -> Result<Url, EngineError> {
        Url::parse(self.api_base_url.trim()).map_err(|error| {
            EngineError::InvalidConfig(format!(
                "invalid apiBaseUrl '{}': {error}",
                self.api_base_url
            ))
        })
    }
}

pub fn ensure_default_config(config_dir: &Path) -> Result<(), EngineError> {
    let path = config_dir.join(ENGINE_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&EngineConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

pub fn load_config(config_dir: &Path) -> Result<EngineConfig, EngineError> {
    let path = config_dir.join(ENGINE_JSON);
    let raw = fs::read_to_string(&path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| EngineError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SCHEMA_VERSION {
        return Err(EngineError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }

    let config: EngineConfig = serde_json::from_value(parsed)?;
    config.validate()?;
    Ok(config)
}
