use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One student's attendance record. `name` is the match key for recognition results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub name: String,
    pub total_hours: u32,
    pub hours_present: u32,
    /// Contact number; `None` when the roster leaves it blank.
    #[serde(default)]
    pub phone: Option<String>,
    /// Last calendar day (UTC) this student was credited.
    #[serde(default)]
    pub last_attendance_date: Option<NaiveDate>,
}

impl StudentRecord {
    pub fn new(name: impl Into<String>, total_hours: u32, hours_present: u32) -> Self {
        Self {
            name: name.into(),
            total_hours,
            hours_present,
            phone: None,
            last_attendance_date: None,
        }
    }

    /// Attendance as a percentage of total hours, 0.0 when no hours are scheduled.
    pub fn attendance_percentage(&self) -> f64 {
        if self.total_hours == 0 {
            return 0.0;
        }
        // Multiply first so exact ratios like 78/80 stay exact.
        f64::from(self.hours_present) * 100.0 / f64::from(self.total_hours)
    }
}

/// A still frame ready for upload, encoded as a `data:image/jpeg;base64,...` URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapturedImage(String);

impl CapturedImage {
    pub fn from_data_uri(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_data_uri(&self) -> &str {
        &self.0
    }

    /// Encoded size in bytes, including the data-URI prefix.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Axis-aligned face rectangle in raw (unmirrored) frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}
