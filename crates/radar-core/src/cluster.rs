//! Fuzzy phase clustering over a historical event sequence.
//!
//! For each requested phase the clusterer finds the phase's member events,
//! computes a time centroid, and returns every event of the *original*
//! sequence (any phase, or none) whose distance from the centroid is within
//! a fuzziness-scaled radius. Phases are processed independently; an event
//! may appear in more than one phase's cluster.

use crate::event::{Event, Phase};
use chrono::TimeDelta;

/// Clusters a time-sorted event sequence into development phases.
pub struct PhaseClusterer {
    fuzziness: u32,
    events: Vec<Event>,
}

impl PhaseClusterer {
    /// `fuzziness` is a percentage in `0..=100` scaling the cluster radius.
    /// The input is re-sorted by time; callers need not pre-sort.
    pub fn new(mut events: Vec<Event>, fuzziness: u32) -> Self {
        events.sort_by_key(|e| e.time);
        Self { fuzziness, events }
    }

    /// The clusters for `phases`, concatenated in request order.
    ///
    /// An empty phase list returns the whole sorted sequence unchanged.
    pub fn cluster(&self, phases: &[Phase]) -> Vec<Event> {
        if phases.is_empty() {
            return self.events.clone();
        }
        phases.iter().flat_map(|&phase| self.phase_cluster(phase)).collect()
    }

    /// One phase's cluster: centroid of the phase members, then every event
    /// within `fuzziness% * max_radius` seconds of it.
    fn phase_cluster(&self, phase: Phase) -> Vec<Event> {
        let members: Vec<&Event> =
            self.events.iter().filter(|e| e.phase() == Some(phase)).collect();
        let (Some(first), Some(last)) = (members.first(), members.last()) else {
            return Vec::new();
        };

        let start = first.time;
        let sum: i64 = members
            .iter()
            .map(|e| e.time.signed_duration_since(start).num_seconds())
            .sum();
        // Whole-second mean offset, truncated like the stored timestamps.
        let mean_offset = sum / members.len() as i64;
        let center = start + TimeDelta::seconds(mean_offset);

        let to_start = center.signed_duration_since(start).num_seconds();
        let to_end = last.time.signed_duration_since(center).num_seconds();
        let max_radius = to_start.max(to_end);
        let radius = i64::from(self.fuzziness) * max_radius / 100;

        self.events
            .iter()
            .filter(|e| e.time.signed_duration_since(center).num_seconds().abs() <= radius)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(secs: i64, event_type: &str, parameters: &str) -> Event {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("base time");
        Event::at("alice", event_type, parameters, base + TimeDelta::seconds(secs))
    }

    fn coding(secs: i64) -> Event {
        at(secs, "MODE", "Edit")
    }

    #[test]
    fn empty_phase_list_passes_the_sequence_through() {
        let events = vec![coding(10), coding(0), at(5, "SAVE", "a.cpp")];
        let clusterer = PhaseClusterer::new(events, 50);
        let out = clusterer.cluster(&[]);
        assert_eq!(out.len(), 3);
        assert!(out.windows(2).all(|w| w[0].time <= w[1].time), "output is time-sorted");
    }

    #[test]
    fn phase_with_no_members_contributes_nothing() {
        let clusterer = PhaseClusterer::new(vec![coding(0), coding(10)], 100);
        assert!(clusterer.cluster(&[Phase::Deployment]).is_empty());
    }

    /// Members at 0/10/20 s, fuzziness 50: center 10 s, radius 5 s, so only
    /// the 10 s member survives.
    #[test]
    fn half_fuzziness_keeps_the_inner_cluster() {
        let clusterer = PhaseClusterer::new(vec![coding(0), coding(10), coding(20)], 50);
        let out = clusterer.cluster(&[Phase::Coding]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time, coding(10).time);
    }

    /// The cluster draws from the whole stream: an unrelated event inside
    /// the radius is included even though its phase differs.
    #[test]
    fn cluster_includes_foreign_events_inside_the_radius() {
        let events = vec![coding(0), coding(10), coding(20), at(12, "SAVE", "a.cpp")];
        let clusterer = PhaseClusterer::new(events, 50);
        let out = clusterer.cluster(&[Phase::Coding]);
        let types: Vec<&str> = out.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["MODE", "SAVE"]);
    }

    /// fuzziness = 100 spans the full member range.
    #[test]
    fn full_fuzziness_covers_every_member() {
        let events = vec![coding(0), coding(3), coding(10), coding(40)];
        let clusterer = PhaseClusterer::new(events.clone(), 100);
        let out = clusterer.cluster(&[Phase::Coding]);
        assert_eq!(out.len(), events.len());
    }

    #[test]
    fn zero_fuzziness_keeps_only_the_centroid_event() {
        let clusterer = PhaseClusterer::new(vec![coding(0), coding(10), coding(20)], 0);
        let out = clusterer.cluster(&[Phase::Coding]);
        assert_eq!(out.len(), 1, "radius 0 admits exactly the event at the center");
    }

    #[test]
    fn clusters_concatenate_in_request_order_with_duplicates_allowed() {
        let events = vec![
            coding(0),
            coding(10),
            at(5, "SCM_COMMIT", "r1"),
            at(15, "SCM_COMMIT", "r2"),
        ];
        let clusterer = PhaseClusterer::new(events, 100);
        let out = clusterer.cluster(&[Phase::Coding, Phase::Deployment]);
        // Both phase windows cover the whole range here, so each contributes
        // its full span and events repeat across clusters.
        assert!(out.len() > 4);
        let first_commit = out.iter().position(|e| e.event_type == "SCM_COMMIT");
        assert!(first_commit.is_some());
    }

    /// The mean offset truncates toward zero, matching the stored
    /// whole-second timestamps.
    #[test]
    fn mean_offset_truncates() {
        // Offsets 0, 1, 1: mean 2/3 -> 0, center == start.
        let clusterer = PhaseClusterer::new(vec![coding(0), coding(1), coding(1)], 0);
        let out = clusterer.cluster(&[Phase::Coding]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time, coding(0).time);
    }
}
