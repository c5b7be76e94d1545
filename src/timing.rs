//! Peak-hour classification in the region's civil time
//!
//! Windows are evaluated against the local wall clock of the region the
//! request belongs to, never against server time.

use chrono::{DateTime, Datelike, Timelike, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Which days a peak window applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DayScope {
    #[default]
    Every,
    Weekdays,
    Weekend,
}

impl DayScope {
    fn matches(&self, day: Weekday) -> bool {
        let weekend = matches!(day, Weekday::Sat | Weekday::Sun);
        match self {
            DayScope::Every => true,
            DayScope::Weekdays => !weekend,
            DayScope::Weekend => weekend,
        }
    }
}

/// A named local-time interval of expected high load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakWindow {
    pub name: String,
    /// First peak hour (inclusive, 0-23)
    pub start_hour: u32,
    /// Last peak hour (inclusive, 0-23)
    pub end_hour: u32,
    #[serde(default)]
    pub days: DayScope,
}

impl PeakWindow {
    pub fn new(name: impl Into<String>, start_hour: u32, end_hour: u32, days: DayScope) -> Self {
        Self {
            name: name.into(),
            start_hour,
            end_hour,
            days,
        }
    }

    /// Whether `hour` on `day` falls inside this window
    pub fn contains(&self, hour: u32, day: Weekday) -> bool {
        self.days.matches(day) && hour >= self.start_hour && hour <= self.end_hour
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.start_hour > 23 || self.end_hour > 23 {
            return Err(format!("peak window '{}' hours must be within 0-23", self.name));
        }
        if self.start_hour > self.end_hour {
            return Err(format!(
                "peak window '{}' starts after it ends ({} > {})",
                self.name, self.start_hour, self.end_hour
            ));
        }
        Ok(())
    }
}

/// Default windows: morning commute, lunch, evening, weekend daytime
pub fn default_peak_windows() -> Vec<PeakWindow> {
    vec![
        PeakWindow::new("morning", 7, 9, DayScope::Weekdays),
        PeakWindow::new("lunch", 11, 14, DayScope::Every),
        PeakWindow::new("evening", 18, 22, DayScope::Every),
        PeakWindow::new("weekend", 10, 22, DayScope::Weekend),
    ]
}

/// Classifies a local instant as peak or off-peak
#[derive(Debug, Clone)]
pub struct TimeWindowClassifier {
    windows: Vec<PeakWindow>,
}

impl TimeWindowClassifier {
    pub fn new(windows: Vec<PeakWindow>) -> Self {
        Self { windows }
    }

    /// True if the local hour falls in any configured window
    pub fn is_peak(&self, now_local: &DateTime<Tz>) -> bool {
        self.active_window(now_local).is_some()
    }

    /// First window containing the local instant
    pub fn active_window(&self, now_local: &DateTime<Tz>) -> Option<&PeakWindow> {
        let hour = now_local.hour();
        let day = now_local.weekday();
        self.windows.iter().find(|w| w.contains(hour, day))
    }

    pub fn windows(&self) -> &[PeakWindow] {
        &self.windows
    }
}

impl Default for TimeWindowClassifier {
    fn default() -> Self {
        Self::new(default_peak_windows())
    }
}

/// Region code to IANA time zone mapping
#[derive(Debug, Clone)]
pub struct RegionZones {
    zones: BTreeMap<String, Tz>,
}

impl RegionZones {
    /// Build from `region -> zone name` pairs, rejecting unknown zone names
    pub fn from_names(names: &BTreeMap<String, String>) -> Result<Self, String> {
        let mut zones = BTreeMap::new();
        for (region, name) in names {
            let tz: Tz = name
                .parse()
                .map_err(|_| format!("unknown time zone '{}' for region '{}'", name, region))?;
            zones.insert(region.to_uppercase(), tz);
        }
        Ok(Self { zones })
    }

    /// Zone for `region`; unknown regions fall back to UTC
    pub fn zone_for(&self, region: &str) -> Tz {
        match self.zones.get(&region.to_uppercase()) {
            Some(tz) => *tz,
            None => {
                warn!("No time zone configured for region '{}', using UTC", region);
                Tz::UTC
            }
        }
    }
}

/// Default region table
pub fn default_region_zones() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("BR".to_string(), "America/Sao_Paulo".to_string()),
        ("BR-AM".to_string(), "America/Manaus".to_string()),
        ("PT".to_string(), "Europe/Lisbon".to_string()),
    ])
}
