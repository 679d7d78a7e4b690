//! Update coalescing: rate-limits and batches inbound updates.
//!
//! Protects constrained devices from update storms. At most one update is
//! applied per rate window; arrivals inside an active window queue and are
//! merged on flush, in arrival order, with later fields winning. Queued
//! updates are never dropped, only delayed and merged.
//!
//! The coalescer is a deterministic state machine: it owns no timers.
//! `offer` reports the deadline at which the dispatch loop must call
//! `flush`, so all timing stays on the loop's single logical thread.

use crate::config::SyncConfig;
use chrono::Duration as ChronoDuration;
use reviewroom_core::{DataSource, SnapshotUpdate, Timestamp};
use tracing::trace;

/// A queued update tagged with its arrival time and origin.
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub update: SnapshotUpdate,
    pub source: DataSource,
    pub arrived_at: Timestamp,
}

/// Outcome of offering an update to the coalescer.
#[derive(Debug, Clone, PartialEq)]
pub enum CoalesceOutcome {
    /// Outside the rate window with nothing queued: apply immediately.
    Apply(SnapshotUpdate, DataSource),
    /// Queued; the dispatch loop must flush once the deadline passes.
    Scheduled(Timestamp),
}

pub struct UpdateCoalescer {
    pending: Vec<PendingUpdate>,
    last_applied_at: Option<Timestamp>,
    deadline: Option<Timestamp>,
    rate_window: ChronoDuration,
    debounce_delay: ChronoDuration,
    max_flush_delay: ChronoDuration,
}

impl UpdateCoalescer {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            pending: Vec::new(),
            last_applied_at: None,
            deadline: None,
            rate_window: ChronoDuration::from_std(config.rate_window)
                .unwrap_or(ChronoDuration::MAX),
            debounce_delay: ChronoDuration::from_std(config.debounce_delay)
                .unwrap_or(ChronoDuration::MAX),
            max_flush_delay: ChronoDuration::from_std(config.max_flush_delay)
                .unwrap_or(ChronoDuration::MAX),
        }
    }

    /// Offer an inbound update.
    ///
    /// Returns `Apply` when the update may reach the consumer right away,
    /// or `Scheduled` with the flush deadline when it was queued. Each
    /// arrival re-arms the debounce, but the deadline never exceeds
    /// `first_queued_at + max_flush_delay`, so sustained inbound traffic
    /// cannot starve the flush.
    pub fn offer(
        &mut self,
        update: SnapshotUpdate,
        source: DataSource,
        now: Timestamp,
    ) -> CoalesceOutcome {
        let window_open = self
            .last_applied_at
            .map_or(true, |applied| now - applied >= self.rate_window);
        if self.pending.is_empty() && window_open {
            self.last_applied_at = Some(now);
            return CoalesceOutcome::Apply(update, source);
        }

        self.pending.push(PendingUpdate {
            update,
            source,
            arrived_at: now,
        });
        let first_queued_at = self
            .pending
            .first()
            .map(|pending| pending.arrived_at)
            .unwrap_or(now);

        let debounced = now + self.debounce_delay;
        let capped = first_queued_at + self.max_flush_delay;
        let mut deadline = debounced.min(capped);
        // The rate window bounds apply-frequency, never data freshness.
        if let Some(applied) = self.last_applied_at {
            deadline = deadline.max(applied + self.rate_window);
        }
        self.deadline = Some(deadline);
        trace!(
            queued = self.pending.len(),
            deadline = %deadline,
            "queued update inside rate window"
        );
        CoalesceOutcome::Scheduled(deadline)
    }

    /// Merge and drain the queue.
    ///
    /// All queued updates combine in arrival order (later fields win on
    /// key conflicts) into a single update; the rate window restarts at
    /// `now`. Returns `None` when nothing is queued.
    pub fn flush(&mut self, now: Timestamp) -> Option<(SnapshotUpdate, DataSource)> {
        let mut drained = self.pending.drain(..);
        let first = drained.next()?;
        let (update, source) = drained.fold(
            (first.update, first.source),
            |(merged, _), next| (merged.merge(next.update), next.source),
        );
        self.deadline = None;
        self.last_applied_at = Some(now);
        Some((update, source))
    }

    /// The currently armed flush deadline, if any updates are queued.
    pub fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop queued updates and timers, e.g. on filter change or teardown.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.deadline = None;
        self.last_applied_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reviewroom_core::{ReviewPatch, ReviewSnapshot, SnapshotDelta};
    use uuid::Uuid;

    fn coalescer() -> UpdateCoalescer {
        UpdateCoalescer::new(&SyncConfig::default())
    }

    fn full() -> SnapshotUpdate {
        SnapshotUpdate::Full(ReviewSnapshot::default())
    }

    fn titled_delta(id: Uuid, title: &str) -> SnapshotUpdate {
        SnapshotUpdate::Partial(SnapshotDelta {
            active: Some(vec![ReviewPatch {
                id,
                title: Some(title.to_string()),
                ..ReviewPatch::default()
            }]),
            ..SnapshotDelta::default()
        })
    }

    #[test]
    fn test_idle_update_applies_immediately() {
        let mut coalescer = coalescer();
        let now = Utc::now();
        match coalescer.offer(full(), DataSource::Api, now) {
            CoalesceOutcome::Apply(_, source) => assert_eq!(source, DataSource::Api),
            other => panic!("expected immediate apply, got {:?}", other),
        }
        assert!(!coalescer.has_pending());
    }

    #[test]
    fn test_updates_inside_window_queue_and_merge_in_order() {
        let mut coalescer = coalescer();
        let t0 = Utc::now();
        let id = Uuid::new_v4();

        // An applied update opens the rate window.
        coalescer.offer(full(), DataSource::Api, t0);

        let u1 = coalescer.offer(
            titled_delta(id, "first"),
            DataSource::Websocket,
            t0 + ChronoDuration::milliseconds(50),
        );
        let u2 = coalescer.offer(
            titled_delta(id, "second"),
            DataSource::Websocket,
            t0 + ChronoDuration::milliseconds(100),
        );
        assert!(matches!(u1, CoalesceOutcome::Scheduled(_)));
        assert!(matches!(u2, CoalesceOutcome::Scheduled(_)));

        // Exactly one flush combining U1 then U2, U2's fields winning.
        let (merged, source) = coalescer
            .flush(t0 + ChronoDuration::seconds(2))
            .expect("queued updates must flush");
        assert_eq!(source, DataSource::Websocket);
        match merged {
            SnapshotUpdate::Partial(delta) => {
                let patches = delta.active.unwrap();
                assert_eq!(patches.len(), 1);
                assert_eq!(patches[0].title.as_deref(), Some("second"));
            }
            SnapshotUpdate::Full(_) => panic!("two deltas must merge into one delta"),
        }
        assert!(coalescer.flush(t0 + ChronoDuration::seconds(3)).is_none());
    }

    #[test]
    fn test_flush_deadline_respects_rate_window() {
        let mut coalescer = coalescer();
        let t0 = Utc::now();
        coalescer.offer(full(), DataSource::Api, t0);

        let arrival = t0 + ChronoDuration::milliseconds(100);
        match coalescer.offer(full(), DataSource::Websocket, arrival) {
            CoalesceOutcome::Scheduled(deadline) => {
                // Debounce alone would fire at t0+600ms, still inside the
                // 2s window; the deadline is pushed to the window edge.
                assert_eq!(deadline, t0 + ChronoDuration::seconds(2));
            }
            other => panic!("expected scheduled flush, got {:?}", other),
        }
    }

    #[test]
    fn test_sustained_traffic_cannot_starve_flush() {
        let mut coalescer = coalescer();
        let t0 = Utc::now();
        coalescer.offer(full(), DataSource::Api, t0);

        // New arrivals every 400ms re-arm the debounce forever; the cap
        // bounds the deadline at first_queued_at + max_flush_delay.
        let first_arrival = t0 + ChronoDuration::milliseconds(400);
        let mut last_deadline = None;
        for i in 1..=20 {
            let arrival = t0 + ChronoDuration::milliseconds(400 * i);
            if let CoalesceOutcome::Scheduled(deadline) =
                coalescer.offer(full(), DataSource::Websocket, arrival)
            {
                last_deadline = Some(deadline);
            }
        }
        assert_eq!(
            last_deadline.unwrap(),
            first_arrival + ChronoDuration::seconds(4)
        );
    }

    #[test]
    fn test_second_apply_after_window_expires() {
        let mut coalescer = coalescer();
        let t0 = Utc::now();
        coalescer.offer(full(), DataSource::Api, t0);

        let later = t0 + ChronoDuration::seconds(3);
        assert!(matches!(
            coalescer.offer(full(), DataSource::Websocket, later),
            CoalesceOutcome::Apply(_, DataSource::Websocket)
        ));
    }

    #[test]
    fn test_clear_drops_queue_and_window() {
        let mut coalescer = coalescer();
        let t0 = Utc::now();
        coalescer.offer(full(), DataSource::Api, t0);
        coalescer.offer(full(), DataSource::Websocket, t0 + ChronoDuration::milliseconds(10));
        assert!(coalescer.has_pending());

        coalescer.clear();
        assert!(!coalescer.has_pending());
        assert!(coalescer.deadline().is_none());
        // After a clear the next update applies immediately again.
        assert!(matches!(
            coalescer.offer(full(), DataSource::Api, t0 + ChronoDuration::milliseconds(20)),
            CoalesceOutcome::Apply(_, _)
        ));
    }
}
