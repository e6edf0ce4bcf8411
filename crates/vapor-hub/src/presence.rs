//! Presence tracking with a sliding liveness window.

use crate::lock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;
use vapor_types::{ParticipantId, RoomId, SessionId};

/// Presence state of one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    pub participant_id: ParticipantId,
    pub room_id: RoomId,
    pub online: bool,
    /// Monotonic timestamp used for the liveness window.
    pub last_seen: Instant,
    /// Wall-clock timestamp reported to clients.
    pub last_seen_at: DateTime<Utc>,
    /// Session currently representing the participant, if connected.
    pub session_id: Option<SessionId>,
    /// Set by an explicit `isOnline: false`; activity no longer revives the
    /// participant until it reports itself online or joins again.
    pub away: bool,
}

impl PresenceRecord {
    fn stamp(&mut self) {
        self.last_seen = Instant::now();
        self.last_seen_at = Utc::now();
    }
}

/// Result of [`PresenceTracker::touch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Touch {
    /// No record exists for the participant.
    Unknown,
    /// Last-seen refreshed; online state unchanged.
    Refreshed,
    /// The participant had been swept offline and is back online.
    Revived(PresenceRecord),
}

/// Thread-safe presence tracker keyed by participant.
#[derive(Clone)]
pub struct PresenceTracker {
    records: Arc<RwLock<HashMap<ParticipantId, PresenceRecord>>>,
    window: Duration,
}

impl PresenceTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            window,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ParticipantId, PresenceRecord>> {
        lock::read(&self.records, "presence")
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ParticipantId, PresenceRecord>> {
        lock::write(&self.records, "presence")
    }

    /// Marks a participant online under the given session.
    pub fn mark_online(
        &self,
        participant_id: &ParticipantId,
        room_id: &RoomId,
        session_id: SessionId,
    ) -> PresenceRecord {
        let mut records = self.write();
        let record = records
            .entry(participant_id.clone())
            .or_insert_with(|| PresenceRecord {
                participant_id: participant_id.clone(),
                room_id: room_id.clone(),
                online: true,
                last_seen: Instant::now(),
                last_seen_at: Utc::now(),
                session_id: None,
                away: false,
            });
        record.room_id = room_id.clone();
        record.online = true;
        record.away = false;
        record.session_id = Some(session_id);
        record.stamp();
        record.clone()
    }

    /// Marks a participant offline.
    ///
    /// With `expected_session` set, the change only applies if that session
    /// still represents the participant; a superseded session's teardown is
    /// then a no-op. Returns the updated record, or `None` if nothing changed.
    pub fn mark_offline(
        &self,
        participant_id: &ParticipantId,
        expected_session: Option<SessionId>,
    ) -> Option<PresenceRecord> {
        let mut records = self.write();
        let Some(record) = records.get_mut(participant_id) else {
            tracing::debug!(participant_id = %participant_id, "mark_offline: no presence record");
            return None;
        };
        if expected_session.is_some() && record.session_id != expected_session {
            tracing::debug!(
                participant_id = %participant_id,
                "mark_offline: session superseded, keeping presence"
            );
            return None;
        }
        record.online = false;
        record.session_id = None;
        record.stamp();
        Some(record.clone())
    }

    /// Records activity for a participant.
    pub fn touch(&self, participant_id: &ParticipantId) -> Touch {
        let mut records = self.write();
        let Some(record) = records.get_mut(participant_id) else {
            return Touch::Unknown;
        };
        record.stamp();
        if !record.online && !record.away && record.session_id.is_some() {
            record.online = true;
            return Touch::Revived(record.clone());
        }
        Touch::Refreshed
    }

    /// Sets the online flag explicitly (`participant:update-status`).
    pub fn set_status(&self, participant_id: &ParticipantId, online: bool) -> Option<PresenceRecord> {
        let mut records = self.write();
        let record = records.get_mut(participant_id)?;
        record.online = online;
        record.away = !online;
        record.stamp();
        Some(record.clone())
    }

    /// Returns `true` if the participant is flagged online and was seen
    /// within the liveness window.
    pub fn is_online(&self, participant_id: &ParticipantId) -> bool {
        self.read()
            .get(participant_id)
            .is_some_and(|r| r.online && r.last_seen.elapsed() < self.window)
    }

    /// Current record of a participant.
    pub fn record(&self, participant_id: &ParticipantId) -> Option<PresenceRecord> {
        self.read().get(participant_id).cloned()
    }

    /// Participants of a room that are currently online.
    pub fn online_in_room(&self, room_id: &RoomId) -> Vec<ParticipantId> {
        let now = Instant::now();
        let mut online: Vec<ParticipantId> = self
            .read()
            .values()
            .filter(|r| &r.room_id == room_id && r.online)
            .filter(|r| now.saturating_duration_since(r.last_seen) < self.window)
            .map(|r| r.participant_id.clone())
            .collect();
        online.sort();
        online
    }

    /// Flips every online record whose last activity is outside the window
    /// to offline and returns the changed records.
    ///
    /// The session id is kept so that the next inbound event revives the
    /// participant through [`PresenceTracker::touch`].
    pub fn sweep(&self, now: Instant) -> Vec<PresenceRecord> {
        let mut records = self.write();
        let mut expired = Vec::new();
        for record in records.values_mut() {
            if record.online && now.saturating_duration_since(record.last_seen) >= self.window {
                record.online = false;
                expired.push(record.clone());
            }
        }
        expired
    }

    /// Drops the participant's record (used when the directory deletes it).
    pub fn forget(&self, participant_id: &ParticipantId) -> Option<PresenceRecord> {
        self.write().remove(participant_id)
    }

    /// Drops every record belonging to a room.
    pub fn forget_room(&self, room_id: &RoomId) {
        self.write().retain(|_, r| &r.room_id != room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(45);

    #[tokio::test(start_paused = true)]
    async fn online_until_window_elapses() {
        let tracker = PresenceTracker::new(WINDOW);
        let p1 = ParticipantId::from("p1");
        tracker.mark_online(&p1, &"r1".into(), SessionId::generate());
        assert!(tracker.is_online(&p1));

        tokio::time::advance(Duration::from_secs(44)).await;
        assert!(tracker.is_online(&p1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!tracker.is_online(&p1));
    }

    #[tokio::test(start_paused = true)]
    async fn touch_extends_liveness() {
        let tracker = PresenceTracker::new(WINDOW);
        let p1 = ParticipantId::from("p1");
        tracker.mark_online(&p1, &"r1".into(), SessionId::generate());

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(tracker.touch(&p1), Touch::Refreshed);
        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(tracker.is_online(&p1));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_flips_stale_and_touch_revives() {
        let tracker = PresenceTracker::new(WINDOW);
        let p1 = ParticipantId::from("p1");
        let p2 = ParticipantId::from("p2");
        tracker.mark_online(&p1, &"r1".into(), SessionId::generate());
        tokio::time::advance(Duration::from_secs(30)).await;
        tracker.mark_online(&p2, &"r1".into(), SessionId::generate());
        tokio::time::advance(Duration::from_secs(20)).await;

        let expired = tracker.sweep(Instant::now());
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].participant_id, p1);
        assert!(!tracker.is_online(&p1));
        assert!(tracker.is_online(&p2));
        assert!(tracker.sweep(Instant::now()).is_empty());

        match tracker.touch(&p1) {
            Touch::Revived(record) => assert!(record.online),
            other => panic!("expected revival, got {other:?}"),
        }
        assert!(tracker.is_online(&p1));
    }

    #[tokio::test]
    async fn mark_offline_respects_session_guard() {
        let tracker = PresenceTracker::new(WINDOW);
        let p1 = ParticipantId::from("p1");
        let old = SessionId::generate();
        let new = SessionId::generate();
        tracker.mark_online(&p1, &"r1".into(), old);
        tracker.mark_online(&p1, &"r1".into(), new);

        assert!(tracker.mark_offline(&p1, Some(old)).is_none());
        assert!(tracker.is_online(&p1));

        let record = tracker.mark_offline(&p1, Some(new)).expect("record should change");
        assert!(!record.online);
        assert!(record.session_id.is_none());
        // An offline participant without a session is not revived by activity.
        assert_eq!(tracker.touch(&p1), Touch::Refreshed);
        assert!(!tracker.is_online(&p1));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_offline_is_not_revived_by_activity() {
        let tracker = PresenceTracker::new(WINDOW);
        let p1 = ParticipantId::from("p1");
        tracker.mark_online(&p1, &"r1".into(), SessionId::generate());

        let record = tracker.set_status(&p1, false).expect("record exists");
        assert!(record.away);
        assert_eq!(tracker.touch(&p1), Touch::Refreshed);
        assert!(!tracker.is_online(&p1));

        let record = tracker.set_status(&p1, true).expect("record exists");
        assert!(record.online && !record.away);
        tokio::time::advance(WINDOW).await;
        tracker.sweep(Instant::now());
        assert!(matches!(tracker.touch(&p1), Touch::Revived(_)));
    }

    #[tokio::test]
    async fn missing_participant_is_noop() {
        let tracker = PresenceTracker::new(WINDOW);
        let ghost = ParticipantId::from("ghost");
        assert!(tracker.mark_offline(&ghost, None).is_none());
        assert_eq!(tracker.touch(&ghost), Touch::Unknown);
        assert!(tracker.set_status(&ghost, true).is_none());
        assert!(!tracker.is_online(&ghost));
    }

    #[tokio::test]
    async fn online_in_room_filters_by_room() {
        let tracker = PresenceTracker::new(WINDOW);
        tracker.mark_online(&"p1".into(), &"r1".into(), SessionId::generate());
        tracker.mark_online(&"p2".into(), &"r2".into(), SessionId::generate());
        tracker.mark_online(&"p3".into(), &"r1".into(), SessionId::generate());
        tracker.set_status(&"p3".into(), false);

        assert_eq!(tracker.online_in_room(&"r1".into()), vec![ParticipantId::from("p1")]);
    }
}
