/// Detects newly released hints by comparing list lengths between snapshots.
///
/// The baseline always follows the latest snapshot, so a list that shrinks and
/// regrows announces the regrown entries again.
#[derive(Debug, Default)]
pub struct HintTracker {
    seen: usize,
}

impl HintTracker {
    /// Number of hints new since the previous observation. A fresh tracker
    /// has seen none, so hints already out on entry are announced too.
    pub fn observe(&mut self, hints: &[String]) -> usize {
        let current = hints.len();
        let fresh = current.saturating_sub(self.seen);
        self.seen = current;
        fresh
    }
}

pub fn new_hint_notice(fresh: usize) -> Option<&'static str> {
    match fresh {
        0 => None,
        1 => Some("New hint available!"),
        _ => Some("New hints available!"),
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    fn hints(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("hint {i}")).collect()
    }

    #[test]
    fn observe__first_snapshot_announces_existing_hints() {
        let mut tracker = HintTracker::default();

        assert_eq!(3, tracker.observe(&hints(3)));
        assert_eq!(0, tracker.observe(&hints(3)));
    }

    #[test]
    fn observe__counts_growth_since_last_snapshot() {
        let mut tracker = HintTracker::default();
        tracker.observe(&hints(1));

        assert_eq!(2, tracker.observe(&hints(3)));
        assert_eq!(Some("New hints available!"), new_hint_notice(2));
        assert_eq!(Some("New hint available!"), new_hint_notice(1));
        assert_eq!(None, new_hint_notice(0));
    }

    #[test]
    fn observe__shrink_then_regrow_reports_again() {
        // given
        let mut tracker = HintTracker::default();
        tracker.observe(&hints(2));

        // when
        let after_shrink = tracker.observe(&hints(1));
        let after_regrow = tracker.observe(&hints(2));

        // then
        assert_eq!(0, after_shrink);
        assert_eq!(1, after_regrow);
    }
}
