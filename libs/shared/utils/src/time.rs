use chrono::{Local, NaiveDateTime};

/// Server-local wall clock. Slot dates and times are stored without a zone and
/// are interpreted in the same clock.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Whole and fractional hours from `now` until `at`; negative once `at` has passed.
pub fn hours_until(at: NaiveDateTime, now: NaiveDateTime) -> f64 {
    (at - now).num_seconds() as f64 / 3600.0
}
