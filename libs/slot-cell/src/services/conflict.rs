use chrono::NaiveTime;

/// Whether `[s1, e1)` and `[s2, e2)` clash on the same day.
///
/// Half-open: a slot ending at 09:30 does not clash with one starting at 09:30.
pub fn intervals_conflict(s1: NaiveTime, e1: NaiveTime, s2: NaiveTime, e2: NaiveTime) -> bool {
    let overlaps = s1 < e2 && s2 < e1;
    let first_contains_second = s1 <= s2 && e2 <= e1;
    let second_contains_first = s2 <= s1 && e1 <= e2;

    overlaps || first_contains_second || second_contains_first
}
