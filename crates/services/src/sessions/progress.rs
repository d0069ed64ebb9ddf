use assess_core::model::Outcome;
use assess_core::scoring::percent_half_up;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    /// Answered or skipped.
    pub attended: usize,
    pub remaining: usize,
    pub completion_percentage: u8,
}

/// Per-item status parallel to the session's item order.
///
/// Derived from the response map on every mutation; there is no setter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressTracker {
    statuses: Vec<Outcome>,
    attended: usize,
}

impl ProgressTracker {
    pub(crate) fn derive(statuses: Vec<Outcome>) -> Self {
        let attended = statuses.iter().filter(|o| o.is_attended()).count();
        Self { statuses, attended }
    }

    #[must_use]
    pub fn statuses(&self) -> &[Outcome] {
        &self.statuses
    }

    #[must_use]
    pub fn status_at(&self, position: usize) -> Option<Outcome> {
        self.statuses.get(position).copied()
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.statuses.len()
    }

    #[must_use]
    pub fn attended(&self) -> usize {
        self.attended
    }

    /// `attended / item_count * 100`, rounded half-up.
    #[must_use]
    pub fn completion_percentage(&self) -> u8 {
        let attended = u32::try_from(self.attended).unwrap_or(u32::MAX);
        let total = u32::try_from(self.statuses.len()).unwrap_or(u32::MAX);
        percent_half_up(attended, total)
    }

    #[must_use]
    pub fn is_fully_attended(&self) -> bool {
        self.attended == self.statuses.len()
    }

    /// First position at or after `from` that is still unseen, wrapping around.
    #[must_use]
    pub fn next_unseen(&self, from: usize) -> Option<usize> {
        let len = self.statuses.len();
        (0..len)
            .map(|offset| (from + offset) % len)
            .find(|&i| self.statuses[i] == Outcome::Unseen)
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            total: self.statuses.len(),
            attended: self.attended,
            remaining: self.statuses.len() - self.attended,
            completion_percentage: self.completion_percentage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_counts_answers_and_skips() {
        let tracker = ProgressTracker::derive(vec![
            Outcome::Correct,
            Outcome::Skipped,
            Outcome::Unseen,
            Outcome::Incorrect,
        ]);
        assert_eq!(tracker.attended(), 3);
        assert_eq!(tracker.completion_percentage(), 75);
        assert_eq!(
            tracker.progress(),
            SessionProgress {
                total: 4,
                attended: 3,
                remaining: 1,
                completion_percentage: 75,
            }
        );
        assert!(!tracker.is_fully_attended());
    }

    #[test]
    fn next_unseen_wraps_around() {
        let tracker = ProgressTracker::derive(vec![
            Outcome::Unseen,
            Outcome::Correct,
            Outcome::Skipped,
        ]);
        assert_eq!(tracker.next_unseen(1), Some(0));
        assert_eq!(tracker.next_unseen(0), Some(0));

        let done = ProgressTracker::derive(vec![Outcome::Correct]);
        assert_eq!(done.next_unseen(0), None);
        assert!(done.is_fully_attended());
    }

    #[test]
    fn empty_tracker_reports_zero() {
        let tracker = ProgressTracker::default();
        assert_eq!(tracker.completion_percentage(), 0);
        assert_eq!(tracker.next_unseen(0), None);
    }
}
