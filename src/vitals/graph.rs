use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::VitalsRecord;

static BLOOD_PRESSURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{2,3})\s*/\s*(\d{2,3})\s*$").expect("blood pressure pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BloodPressure {
    pub systolic: u16,
    pub diastolic: u16,
}

/// Split a `"SYS/DIA"` reading. Anything but two 2-3 digit numbers
/// separated by a slash yields `None`.
pub fn parse_blood_pressure(raw: &str) -> Option<BloodPressure> {
    let captures = BLOOD_PRESSURE_RE.captures(raw)?;
    Some(BloodPressure {
        systolic: captures[1].parse().ok()?,
        diastolic: captures[2].parse().ok()?,
    })
}

/// Vitals reshaped into parallel arrays for charting.
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphData {
    pub dates: Vec<String>,
    pub heart_rate: Vec<i64>,
    pub temperature: Vec<f64>,
    pub systolic: Vec<Option<u16>>,
    pub diastolic: Vec<Option<u16>>,
    pub glucose: Vec<i64>,
}

impl GraphData {
    /// Points are ordered by their raw date string.
    pub fn from_records(records: &[VitalsRecord]) -> Self {
        let mut ordered: Vec<&VitalsRecord> = records.iter().collect();
        ordered.sort_by(|a, b| a.date.cmp(&b.date));

        let mut graph = GraphData::default();
        for record in ordered {
            let pressure = parse_blood_pressure(&record.blood_pressure);
            graph.dates.push(record.date.clone());
            graph.heart_rate.push(record.heart_rate);
            graph.temperature.push(record.body_temperature);
            graph.systolic.push(pressure.map(|bp| bp.systolic));
            graph.diastolic.push(pressure.map(|bp| bp.diastolic));
            graph.glucose.push(record.blood_glucose);
        }
        graph
    }
}
