//! Applies a recognition batch to the roster.

use crate::roster::Roster;
use chrono::NaiveDate;
use std::collections::HashSet;

/// Credit every named student once for `today`.
///
/// A student is credited when their name appears in `present` and they have
/// not already been credited on `today`. Crediting adds exactly one hour and
/// stamps the date, so repeated names and repeated batches on the same day
/// are no-ops. A credit that would push `hours_present` past `total_hours`
/// is refused and logged.
///
/// Returns the number of records changed.
pub fn reconcile(roster: &mut Roster, present: &[String], today: NaiveDate) -> usize {
    let names: HashSet<&str> = present.iter().map(String::as_str).collect();

    let unknown: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| !roster.contains(name))
        .collect();
    if !unknown.is_empty() {
        tracing::warn!(?unknown, "recognized names not on roster");
    }

    let mut updated = 0;
    for student in roster.records_mut() {
        if !names.contains(student.name.as_str()) {
            continue;
        }
        if student.last_attendance_date == Some(today) {
            tracing::debug!(student = %student.name, "already credited today");
            continue;
        }
        if student.hours_present >= student.total_hours {
            tracing::warn!(
                student = %student.name,
                hours_present = student.hours_present,
                total_hours = student.total_hours,
                "credit refused: present hours already at total"
            );
            continue;
        }
        student.hours_present += 1;
        student.last_attendance_date = Some(today);
        updated += 1;
        tracing::info!(
            student = %student.name,
            hours_present = student.hours_present,
            %today,
            "attendance credited"
        );
    }

    updated
}
