//! Liveness filtering for ephemeral participant state.

use crate::model::participant::{Participant, ParticipantId, SessionId};
use std::collections::BTreeMap;

pub type ParticipantsBySession = BTreeMap<SessionId, Vec<Participant>>;

/// Keeps participants seen less than `threshold_ms` before `now_ms`.
///
/// A participant exactly `threshold_ms` old is stale. Sessions left without
/// participants are dropped. The input is not modified.
pub fn filter_stale(
    participants: &ParticipantsBySession,
    threshold_ms: i64,
    now_ms: i64,
) -> ParticipantsBySession {
    participants
        .iter()
        .filter_map(|(session, members)| {
            let live: Vec<Participant> = members
                .iter()
                .filter(|participant| now_ms - participant.last_seen_ms < threshold_ms)
                .cloned()
                .collect();
            (!live.is_empty()).then(|| (session.clone(), live))
        })
        .collect()
}

/// Last-seen records for every session, re-filtered on each update.
#[derive(Debug, Clone, Default)]
pub struct PresenceRoster {
    threshold_ms: i64,
    sessions: ParticipantsBySession,
}

impl PresenceRoster {
    pub fn new(threshold_ms: i64) -> Self {
        Self {
            threshold_ms,
            sessions: BTreeMap::new(),
        }
    }

    pub fn threshold_ms(&self) -> i64 {
        self.threshold_ms
    }

    /// Records a heartbeat and returns the live view at `now_ms`.
    pub fn touch(
        &mut self,
        session_id: &str,
        participant_id: ParticipantId,
        last_seen_ms: i64,
        now_ms: i64,
    ) -> ParticipantsBySession {
        let members = self.sessions.entry(session_id.to_string()).or_default();
        match members.iter_mut().find(|member| member.id == participant_id) {
            Some(member) => member.last_seen_ms = member.last_seen_ms.max(last_seen_ms),
            None => members.push(Participant::new(participant_id, session_id, last_seen_ms)),
        }
        self.live(now_ms)
    }

    /// Removes one participant, e.g. on an explicit leave.
    pub fn leave(&mut self, session_id: &str, participant_id: ParticipantId) -> bool {
        let Some(members) = self.sessions.get_mut(session_id) else {
            return false;
        };
        let before = members.len();
        members.retain(|member| member.id != participant_id);
        let removed = members.len() != before;
        if members.is_empty() {
            self.sessions.remove(session_id);
        }
        removed
    }

    pub fn live(&self, now_ms: i64) -> ParticipantsBySession {
        filter_stale(&self.sessions, self.threshold_ms, now_ms)
    }

    /// Drops records that are stale at `now_ms`; returns how many went.
    pub fn prune(&mut self, now_ms: i64) -> usize {
        let before: usize = self.sessions.values().map(Vec::len).sum();
        self.sessions = self.live(now_ms);
        before - self.sessions.values().map(Vec::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::{filter_stale, ParticipantsBySession, PresenceRoster};
    use crate::model::participant::Participant;
    use uuid::Uuid;

    #[test]
    fn boundary_is_exclusive() {
        let threshold = 30_000;
        let now = 100_000;
        let stale = Participant::new(Uuid::new_v4(), "s1", now - threshold);
        let fresh = Participant::new(Uuid::new_v4(), "s1", now - threshold + 1);
        let input = ParticipantsBySession::from([(
            "s1".to_string(),
            vec![stale.clone(), fresh.clone()],
        )]);
        let live = filter_stale(&input, threshold, now);
        assert_eq!(live["s1"], vec![fresh]);
        assert_eq!(input["s1"].len(), 2);
    }

    #[test]
    fn empty_sessions_are_dropped() {
        let input = ParticipantsBySession::from([
            ("gone".to_string(), vec![Participant::new(Uuid::new_v4(), "gone", 0)]),
            ("here".to_string(), vec![Participant::new(Uuid::new_v4(), "here", 90)]),
        ]);
        let live = filter_stale(&input, 50, 100);
        assert_eq!(live.keys().collect::<Vec<_>>(), vec!["here"]);
    }

    #[test]
    fn roster_touch_refreshes_and_prunes() {
        let mut roster = PresenceRoster::new(1_000);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        roster.touch("room", alice, 0, 0);
        let live = roster.touch("room", bob, 500, 500);
        assert_eq!(live["room"].len(), 2);

        let live = roster.touch("room", bob, 1_200, 1_200);
        assert_eq!(live["room"].len(), 1);
        assert_eq!(live["room"][0].id, bob);

        assert_eq!(roster.prune(1_200), 1);
        assert!(roster.leave("room", bob));
        assert!(roster.live(1_200).is_empty());
    }
}
