//! Agronomic interpretation of soil readings for the live cards.

use super::data::{SensorReading, TemperatureUnit};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

pub const PH_OPTIMAL: RangeInclusive<f64> = 6.0..=7.0;
pub const TEMPERATURE_OPTIMAL: RangeInclusive<f64> = 25.0..=30.0;
pub const TEMPERATURE_ACCEPTABLE: RangeInclusive<f64> = 20.0..=35.0;

/// Rating attached to a measured value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Optimal,
    Acceptable,
    Attention,
    Low,
    High,
}

impl Level {
    pub fn label(self) -> &'static str {
        match self {
            Self::Optimal => "Optimal",
            Self::Acceptable => "Acceptable",
            Self::Attention => "Attention",
            Self::Low => "Low",
            Self::High => "High",
        }
    }

    /// CSS class used by the page cards.
    pub fn css_class(self) -> &'static str {
        match self {
            Self::Optimal => "level-optimal",
            Self::Acceptable => "level-acceptable",
            _ => "level-attention",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    Nitrogen,
    Phosphorus,
    Potassium,
}

impl Nutrient {
    pub const ALL: [Nutrient; 3] = [Self::Nitrogen, Self::Phosphorus, Self::Potassium];

    /// Optimal concentration in ppm.
    pub fn optimal_range(self) -> RangeInclusive<f64> {
        match self {
            Self::Nitrogen => 40.0..=60.0,
            Self::Phosphorus => 20.0..=35.0,
            Self::Potassium => 150.0..=250.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nitrogen => "Nitrogen (N)",
            Self::Phosphorus => "Phosphorus (P)",
            Self::Potassium => "Potassium (K)",
        }
    }

    pub fn value_in(self, reading: &SensorReading) -> f64 {
        match self {
            Self::Nitrogen => reading.nitrogen,
            Self::Phosphorus => reading.phosphorus,
            Self::Potassium => reading.potassium,
        }
    }
}

/// A rated value with advice for the grower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub title: String,
    pub level: Level,
    pub advice: String,
}

pub fn ph_level(ph: f64) -> Level {
    if PH_OPTIMAL.contains(&ph) {
        Level::Optimal
    } else {
        Level::Attention
    }
}

pub fn temperature_level(celsius: f64) -> Level {
    if TEMPERATURE_OPTIMAL.contains(&celsius) {
        Level::Optimal
    } else if TEMPERATURE_ACCEPTABLE.contains(&celsius) {
        Level::Acceptable
    } else {
        Level::Attention
    }
}

pub fn nutrient_level(nutrient: Nutrient, ppm: f64) -> Level {
    let range = nutrient.optimal_range();
    if ppm < *range.start() {
        Level::Low
    } else if ppm > *range.end() {
        Level::High
    } else {
        Level::Optimal
    }
}

pub fn assess_ph(ph: f64) -> Assessment {
    let level = ph_level(ph);
    let advice = match level {
        Level::Optimal => format!(
            "Current pH of {:.2} is within 6.0 - 7.0. Continue current soil management practices.",
            ph
        ),
        _ if ph < *PH_OPTIMAL.start() => format!(
            "Current pH of {:.2} is acidic. Consider liming to raise soil pH towards 6.0 - 7.0.",
            ph
        ),
        _ => format!(
            "Current pH of {:.2} is alkaline. Consider sulfur or organic matter to lower soil pH.",
            ph
        ),
    };
    Assessment {
        title: format!("pH Status: {}", level.label()),
        level,
        advice,
    }
}

pub fn assess_temperature(celsius: f64, unit: TemperatureUnit) -> Assessment {
    let level = temperature_level(celsius);
    let shown = format!("{:.1}{}", unit.from_celsius(celsius), unit.symbol());
    let advice = match level {
        Level::Optimal => format!("Soil temperature of {} is in the optimal band.", shown),
        Level::Acceptable => format!(
            "Soil temperature of {} is acceptable. Monitor closely for optimal growth conditions.",
            shown
        ),
        _ => format!(
            "Soil temperature of {} is outside the tolerated band. Check irrigation and shading.",
            shown
        ),
    };
    Assessment {
        title: format!("Temperature Status: {}", level.label()),
        level,
        advice,
    }
}

pub fn assess_nutrient(nutrient: Nutrient, ppm: f64) -> Assessment {
    let level = nutrient_level(nutrient, ppm);
    let range = nutrient.optimal_range();
    let advice = match level {
        Level::Low => format!(
            "{} at {:.0} ppm is below {:.0} ppm. Plan a fertilizer application.",
            nutrient.name(),
            ppm,
            range.start()
        ),
        Level::High => format!(
            "{} at {:.0} ppm is above {:.0} ppm. Hold further applications.",
            nutrient.name(),
            ppm,
            range.end()
        ),
        _ => format!("{} at {:.0} ppm is optimal.", nutrient.name(), ppm),
    };
    Assessment {
        title: format!("{}: {}", nutrient.name(), level.label()),
        level,
        advice,
    }
}

/// All assessments for a reading: pH, temperature, then N, P and K.
pub fn assess_reading(reading: &SensorReading, unit: TemperatureUnit) -> Vec<Assessment> {
    let mut out = vec![
        assess_ph(reading.ph),
        assess_temperature(reading.temperature, unit),
    ];
    out.extend(
        Nutrient::ALL
            .iter()
            .map(|n| assess_nutrient(*n, n.value_in(reading))),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ph_bounds() {
        assert_eq!(ph_level(6.0), Level::Optimal);
        assert_eq!(ph_level(7.0), Level::Optimal);
        assert_eq!(ph_level(5.99), Level::Attention);
        assert_eq!(ph_level(7.01), Level::Attention);
        assert!(assess_ph(5.2).advice.contains("acidic"));
        assert!(assess_ph(8.1).advice.contains("alkaline"));
    }

    #[test]
    fn test_temperature_bands() {
        assert_eq!(temperature_level(27.0), Level::Optimal);
        assert_eq!(temperature_level(23.6), Level::Acceptable);
        assert_eq!(temperature_level(36.0), Level::Attention);
        let a = assess_temperature(25.0, TemperatureUnit::Fahrenheit);
        assert!(a.advice.contains("77.0°F"));
    }

    #[test]
    fn test_nutrient_ranges() {
        assert_eq!(nutrient_level(Nutrient::Nitrogen, 39.0), Level::Low);
        assert_eq!(nutrient_level(Nutrient::Nitrogen, 45.0), Level::Optimal);
        assert_eq!(nutrient_level(Nutrient::Phosphorus, 36.0), Level::High);
        assert_eq!(nutrient_level(Nutrient::Potassium, 186.0), Level::Optimal);
    }

    #[test]
    fn test_assess_reading_order() {
        let reading = SensorReading {
            id: 1,
            device_id: uuid::Uuid::new_v4(),
            recorded_at: None,
            ph: 6.68,
            temperature: 23.6,
            nitrogen: 44.0,
            phosphorus: 29.0,
            potassium: 35.0,
            signal_quality: None,
        };
        let all = assess_reading(&reading, TemperatureUnit::Celsius);
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].level, Level::Optimal);
        assert_eq!(all[1].level, Level::Acceptable);
        assert_eq!(all[4].level, Level::Low);
    }
}
