//! K-way merge of child transitions inside a validity window.
//!
//! Every referenced position gets its own cursor into its child's timeline.
//! A min-heap keyed by each lane's next pending timestamp yields transitions
//! in global chronological order without materializing the cross product of
//! timelines. Ties are broken by position so the stream is deterministic.

use crate::feature::Child;
use crate::timeline::Timeline;
use crate::window::ValidityWindow;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// One child version transition at a reference position.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a, C> {
    /// When the new version took effect
    pub timestamp: DateTime<Utc>,
    /// Index into the parent's reference list
    pub position: usize,
    /// The new version
    pub version: &'a C,
}

impl<C: Child> Event<'_, C> {
    /// State the position moves to; `None` for a deletion.
    #[must_use]
    pub fn state(&self) -> Option<&C> {
        self.version.visible().then_some(self.version)
    }
}

struct Lane<'a, C> {
    position: usize,
    timeline: &'a Timeline<C>,
    cursor: usize,
}

/// Iterator over the transitions of all tracked positions, in time order.
pub struct EventMerger<'a, C> {
    window: ValidityWindow,
    lanes: Vec<Lane<'a, C>>,
    heap: BinaryHeap<Reverse<(DateTime<Utc>, usize)>>,
}

impl<'a, C: Child> EventMerger<'a, C> {
    /// Merge the timelines of every position; `None` positions are not tracked.
    #[must_use]
    pub fn new(window: ValidityWindow, timelines: &[Option<&'a Timeline<C>>]) -> Self {
        let mut merger = Self {
            window,
            lanes: Vec::with_capacity(timelines.len()),
            heap: BinaryHeap::with_capacity(timelines.len()),
        };

        for (position, timeline) in timelines.iter().enumerate() {
            let Some(timeline) = timeline else {
                continue;
            };

            let lane = merger.lanes.len();
            merger.lanes.push(Lane {
                position,
                timeline,
                cursor: timeline.position_after(window.start),
            });
            merger.schedule(lane);
        }

        merger
    }

    /// Push the lane's next transition onto the heap if it lies in the window.
    fn schedule(&mut self, lane: usize) {
        let Lane {
            timeline, cursor, ..
        } = &self.lanes[lane];

        if let Some(next) = timeline.versions().get(*cursor) {
            if self.window.admits_transition(next.timestamp()) {
                self.heap.push(Reverse((next.timestamp(), lane)));
            }
        }
    }
}

impl<'a, C: Child> Iterator for EventMerger<'a, C> {
    type Item = Event<'a, C>;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse((timestamp, lane)) = self.heap.pop()?;

        let entry = &mut self.lanes[lane];
        let timeline: &'a Timeline<C> = entry.timeline;
        let version = &timeline.versions()[entry.cursor];
        let position = entry.position;
        entry.cursor += 1;

        self.schedule(lane);

        Some(Event {
            timestamp,
            position,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureId;
    use crate::timeline::tests::{child, deleted, ts, TestChild};

    fn timeline(id: i64, versions: Vec<TestChild>) -> Timeline<TestChild> {
        Timeline::build(FeatureId::node(id), versions).unwrap()
    }

    fn collect(
        window: ValidityWindow,
        timelines: &[Option<&Timeline<TestChild>>],
    ) -> Vec<(i64, usize, u32)> {
        EventMerger::new(window, timelines)
            .map(|e| {
                (
                    e.timestamp.timestamp() - ts(0).timestamp(),
                    e.position,
                    e.version.version,
                )
            })
            .collect()
    }

    #[test]
    fn merges_in_chronological_order() {
        let a = timeline(1, vec![child(1, 1, -5, 0), child(1, 2, 3, 0), child(1, 3, 9, 0)]);
        let b = timeline(2, vec![child(2, 1, -5, 0), child(2, 2, 6, 0)]);

        let events = collect(ValidityWindow::new(ts(0), None), &[Some(&a), Some(&b)]);
        assert_eq!(events, vec![(3, 0, 2), (6, 1, 2), (9, 0, 3)]);
    }

    #[test]
    fn clips_to_window() {
        let a = timeline(
            1,
            vec![
                child(1, 1, -5, 0),
                child(1, 2, 0, 0),
                child(1, 3, 4, 0),
                child(1, 4, 10, 0),
                child(1, 5, 12, 0),
            ],
        );

        let events = collect(ValidityWindow::new(ts(0), Some(ts(10))), &[Some(&a)]);
        assert_eq!(events, vec![(4, 0, 3)]);
    }

    #[test]
    fn ties_are_separate_events_in_position_order() {
        let a = timeline(1, vec![child(1, 1, 5, 0)]);
        let b = timeline(2, vec![child(2, 1, 5, 0)]);

        let events = collect(ValidityWindow::new(ts(0), None), &[Some(&b), Some(&a)]);
        assert_eq!(events, vec![(5, 0, 1), (5, 1, 1)]);
    }

    #[test]
    fn repeated_reference_gets_own_cursor() {
        let a = timeline(1, vec![child(1, 1, -1, 0), child(1, 2, 2, 0)]);

        let events = collect(ValidityWindow::new(ts(0), None), &[Some(&a), None, Some(&a)]);
        assert_eq!(events, vec![(2, 0, 2), (2, 2, 2)]);
    }

    #[test]
    fn deletion_event_has_no_state() {
        let a = timeline(1, vec![child(1, 1, -1, 0), deleted(1, 2, 4)]);

        let window = ValidityWindow::new(ts(0), None);
        let timelines = [Some(&a)];
        let events: Vec<_> = EventMerger::new(window, &timelines).collect();

        assert_eq!(events.len(), 1);
        assert!(events[0].state().is_none());
    }

    #[test]
    fn empty_window_yields_nothing() {
        let a = timeline(1, vec![child(1, 1, 5, 0)]);
        let events = collect(ValidityWindow::new(ts(10), Some(ts(3))), &[Some(&a)]);
        assert!(events.is_empty());
    }
}
