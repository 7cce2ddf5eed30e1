//! Recurrence calculator.
//! Weekly/Biweekly step in days; Monthly..Annual step in calendar months,
//! clamping to the last day of shorter months (Jan 31 + 1 month = Feb 28/29).

use chrono::{Days, Months, NaiveDate};
use upkeep_core::Result;

use crate::record::Frequency;

/// Compute the next due date after `reference`. `None` for `AsNeeded`,
/// or if the result would fall outside chrono's representable range.
pub fn compute_next_date(frequency: Frequency, reference: NaiveDate) -> Option<NaiveDate> {
    match frequency {
        Frequency::AsNeeded => None,
        Frequency::Weekly => reference.checked_add_days(Days::new(7)),
        Frequency::Biweekly => reference.checked_add_days(Days::new(14)),
        Frequency::Monthly => reference.checked_add_months(Months::new(1)),
        Frequency::Quarterly => reference.checked_add_months(Months::new(3)),
        Frequency::Semiannual => reference.checked_add_months(Months::new(6)),
        Frequency::Annual => reference.checked_add_months(Months::new(12)),
    }
}

/// Parse a frequency value and compute the next due date.
/// Unrecognized values fail with `InvalidFrequency`.
pub fn next_due_date(frequency: &str, reference: NaiveDate) -> Result<Option<NaiveDate>> {
    let frequency: Frequency = frequency.parse()?;
    Ok(compute_next_date(frequency, reference))
}
