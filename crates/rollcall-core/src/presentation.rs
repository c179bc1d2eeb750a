//! Table and chart views of the roster.
//!
//! Everything here is a pure function of the roster and is recomputed in
//! full on every call.

use crate::roster::Roster;
use crate::types::StudentRecord;
use serde::{Deserialize, Serialize};

/// Rows below this percentage are flagged in the table.
pub const TARGET_PERCENTAGE: f64 = 75.0;

const BUCKET_LOW_UPPER: f64 = 50.0;
const BUCKET_MID_UPPER: f64 = 80.0;

const COLOR_LOW: &str = "rgb(239, 68, 68)";
const COLOR_MID: &str = "rgb(249, 115, 22)";
const COLOR_HIGH: &str = "rgb(34, 197, 94)";

/// One rendered roster row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub name: String,
    pub total_hours: u32,
    pub hours_present: u32,
    /// Attendance percentage rounded to one decimal.
    pub percentage: f64,
    /// Display form, e.g. `"97.5%"`, or `"0%"` when no hours are scheduled.
    pub percentage_label: String,
    pub below_target: bool,
    /// `tel:` link, present only when the student has a phone number.
    pub call_link: Option<String>,
}

impl TableRow {
    fn from_record(rec: &StudentRecord) -> Self {
        let raw = rec.attendance_percentage();
        let percentage = (raw * 10.0).round() / 10.0;
        let percentage_label = if rec.total_hours == 0 {
            "0%".to_string()
        } else {
            format!("{percentage:.1}%")
        };
        Self {
            name: rec.name.clone(),
            total_hours: rec.total_hours,
            hours_present: rec.hours_present,
            percentage,
            percentage_label,
            below_target: percentage < TARGET_PERCENTAGE,
            call_link: rec.phone.as_ref().map(|p| format!("tel:{p}")),
        }
    }
}

/// Student counts per attendance band. Lower bounds are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    /// Below 50%.
    pub below_50: usize,
    /// 50% up to but excluding 80%.
    pub from_50_to_79: usize,
    /// 80% and above.
    pub from_80: usize,
}

impl Histogram {
    fn add(&mut self, percentage: f64) {
        if percentage < BUCKET_LOW_UPPER {
            self.below_50 += 1;
        } else if percentage < BUCKET_MID_UPPER {
            self.from_50_to_79 += 1;
        } else {
            self.from_80 += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.below_50 + self.from_50_to_79 + self.from_80
    }
}

/// Labelled bucket counts and colours, ready for a pie-chart renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub labels: [String; 3],
    pub data: [usize; 3],
    pub colors: [String; 3],
}

pub fn table_rows(roster: &Roster) -> Vec<TableRow> {
    roster.records().iter().map(TableRow::from_record).collect()
}

/// Bucket the unrounded percentages of every student.
pub fn histogram(roster: &Roster) -> Histogram {
    let mut hist = Histogram::default();
    for rec in roster.records() {
        hist.add(rec.attendance_percentage());
    }
    hist
}

pub fn chart_data(roster: &Roster) -> ChartData {
    let h = histogram(roster);
    ChartData {
        labels: [
            format!("Below 50% ({})", h.below_50),
            format!("50% - 79% ({})", h.from_50_to_79),
            format!("80% - 100% ({})", h.from_80),
        ],
        data: [h.below_50, h.from_50_to_79, h.from_80],
        colors: [COLOR_LOW.into(), COLOR_MID.into(), COLOR_HIGH.into()],
    }
}
