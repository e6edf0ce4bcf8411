//! Room membership, presence and fan-out behaviour of the hub.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use vapor_hub::{DisabledProvisioner, EventReceiver, Hub, HubConfig, MemoryDirectory};
use vapor_types::events::{RoomTarget, TypingPayload};
use vapor_types::{
    Ack, ClientFrame, ErrorKind, HubError, InboundEvent, OutboundEvent, ParticipantProfile,
    Reaction, SessionId,
};

fn profile(id: &str, room: &str) -> ParticipantProfile {
    ParticipantProfile {
        id: id.into(),
        room_id: room.into(),
        display_name: format!("User {id}"),
        avatar: "cat".to_string(),
    }
}

fn setup(config: HubConfig) -> (Hub, MemoryDirectory) {
    let directory = MemoryDirectory::new();
    directory.insert_room("r1".into());
    directory.insert_room("r2".into());
    for id in ["p1", "p2", "p3"] {
        directory.upsert_participant(profile(id, "r1")).expect("room exists");
    }
    directory.upsert_participant(profile("q1", "r2")).expect("room exists");
    let hub = Hub::new(
        Arc::new(directory.clone()),
        Arc::new(DisabledProvisioner),
        config,
    );
    (hub, directory)
}

fn test_hub() -> Hub {
    setup(HubConfig::default()).0
}

fn send(hub: &Hub, session: SessionId, event: InboundEvent) {
    hub.dispatch(
        session,
        ClientFrame {
            request_id: Some(json!(1)),
            event,
        },
    )
    .expect("dispatch should succeed");
}

fn drain(rx: &mut EventReceiver) -> Vec<OutboundEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push((*event).clone());
    }
    events
}

fn ack_of(events: &[OutboundEvent]) -> Ack {
    events
        .iter()
        .find_map(|e| match e {
            OutboundEvent::Ack(ack) => Some(ack.clone()),
            _ => None,
        })
        .expect("an ack should have been sent")
}

fn room_join(room: &str, participant: &str) -> InboundEvent {
    InboundEvent::RoomJoin(RoomTarget {
        room_id: room.into(),
        participant_id: participant.into(),
    })
}

fn join(hub: &Hub, participant: &str) -> (SessionId, EventReceiver) {
    let (session, mut rx) = hub.open_session();
    send(hub, session, room_join("r1", participant));
    assert!(ack_of(&drain(&mut rx)).success);
    (session, rx)
}

fn presence_updates(events: &[OutboundEvent], participant: &str) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            OutboundEvent::ParticipantUpdate(p) if p.id.0 == participant => Some(p.is_online),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_join_announces_presence_to_others() {
    let hub = test_hub();
    let (_s1, mut rx1) = join(&hub, "p1");
    let (s2, mut rx2) = hub.open_session();
    send(&hub, s2, room_join("r1", "p2"));

    let ack = ack_of(&drain(&mut rx2));
    assert!(ack.success);
    assert_eq!(ack.room_id.map(|r| r.0), Some("r1".to_string()));
    assert_eq!(ack.participant_id.map(|p| p.0), Some("p2".to_string()));
    assert_eq!(presence_updates(&drain(&mut rx1), "p2"), vec![true]);
    assert!(hub.is_online(&"p2".into()));
}

#[tokio::test]
async fn test_join_twice_keeps_single_entry() {
    let hub = test_hub();
    let (_s1, mut rx1) = join(&hub, "p1");
    let (s2, mut rx2) = join(&hub, "p2");
    drain(&mut rx1);

    send(&hub, s2, room_join("r1", "p2"));
    assert!(ack_of(&drain(&mut rx2)).success);
    assert_eq!(hub.registry().room_size(&"r1".into()), 2);
    assert!(drain(&mut rx1).is_empty(), "repeat join must not re-announce");
}

#[tokio::test]
async fn test_join_rejects_unknown_room_and_foreign_participant() {
    let hub = test_hub();
    let (session, mut rx) = hub.open_session();

    send(&hub, session, room_join("missing", "p1"));
    assert_eq!(ack_of(&drain(&mut rx)).error, Some(ErrorKind::RoomNotFound));

    send(&hub, session, room_join("r1", "ghost"));
    assert_eq!(ack_of(&drain(&mut rx)).error, Some(ErrorKind::ParticipantNotFound));

    // q1 belongs to r2.
    send(&hub, session, room_join("r1", "q1"));
    assert_eq!(ack_of(&drain(&mut rx)).error, Some(ErrorKind::ParticipantNotFound));
    assert!(hub.registry().binding(session).is_none());
}

#[tokio::test]
async fn test_reconnect_supersedes_old_session() {
    let hub = test_hub();
    let (_s1, mut rx1) = join(&hub, "p1");
    let (old, _old_rx) = join(&hub, "p2");
    let (new, mut new_rx) = join(&hub, "p2");
    drain(&mut rx1);

    assert!(hub.registry().binding(old).is_none());
    assert_eq!(hub.registry().room_size(&"r1".into()), 2);

    // The stale connection finally drops: no presence change is announced.
    hub.disconnect(old);
    assert!(drain(&mut rx1).is_empty());
    assert!(hub.is_online(&"p2".into()));

    hub.message_new(&"r1".into(), json!({"id": "m1"})).expect("room exists");
    assert!(matches!(drain(&mut new_rx).as_slice(), [OutboundEvent::MessageNew(_)]));

    hub.disconnect(new);
    assert_eq!(presence_updates(&drain(&mut rx1), "p2"), vec![false]);
    assert!(!hub.is_online(&"p2".into()));
}

#[tokio::test]
async fn test_room_leave_marks_offline_and_keeps_connection() {
    let hub = test_hub();
    let (_s1, mut rx1) = join(&hub, "p1");
    let (s2, mut rx2) = join(&hub, "p2");
    drain(&mut rx1);

    // Leaving a room the session is not in is ignored.
    send(
        &hub,
        s2,
        InboundEvent::RoomLeave(RoomTarget {
            room_id: "r2".into(),
            participant_id: "p2".into(),
        }),
    );
    assert!(hub.registry().binding(s2).is_some());

    send(
        &hub,
        s2,
        InboundEvent::RoomLeave(RoomTarget {
            room_id: "r1".into(),
            participant_id: "p2".into(),
        }),
    );
    assert_eq!(presence_updates(&drain(&mut rx1), "p2"), vec![false]);
    assert!(hub.registry().contains(s2));
    assert!(hub.registry().binding(s2).is_none());

    // An unbound session gets no room traffic.
    drain(&mut rx2);
    hub.message_delete(&"r1".into(), "m1".to_string()).expect("room exists");
    assert!(drain(&mut rx2).is_empty());
}

#[tokio::test]
async fn test_typing_excludes_sender_and_requires_membership() {
    let hub = test_hub();
    let (s1, mut rx1) = join(&hub, "p1");
    let (_s2, mut rx2) = join(&hub, "p2");
    drain(&mut rx1);

    send(
        &hub,
        s1,
        InboundEvent::TypingStart(TypingPayload {
            room_id: "r1".into(),
            participant_id: "p1".into(),
            display_name: Some("User p1".to_string()),
            avatar: Some("cat".to_string()),
        }),
    );
    match drain(&mut rx2).as_slice() {
        [OutboundEvent::TypingStart(indicator)] => {
            assert_eq!(indicator.participant_id.0, "p1");
            assert_eq!(indicator.display_name.as_deref(), Some("User p1"));
        }
        other => panic!("unexpected events: {other:?}"),
    }
    assert!(drain(&mut rx1).is_empty());

    let (outsider, _rx) = hub.open_session();
    send(
        &hub,
        outsider,
        InboundEvent::TypingStop(TypingPayload {
            room_id: "r1".into(),
            participant_id: "p3".into(),
            display_name: None,
            avatar: None,
        }),
    );
    assert!(drain(&mut rx1).is_empty());
    assert!(drain(&mut rx2).is_empty());
}

#[tokio::test]
async fn test_status_update_is_broadcast() {
    let hub = test_hub();
    let (s1, _rx1) = join(&hub, "p1");
    let (_s2, mut rx2) = join(&hub, "p2");

    send(
        &hub,
        s1,
        InboundEvent::UpdateStatus {
            participant_id: "p1".into(),
            is_online: false,
        },
    );
    assert_eq!(presence_updates(&drain(&mut rx2), "p1"), vec![false]);
    assert!(!hub.is_online(&"p1".into()));
}

#[tokio::test(start_paused = true)]
async fn test_sweep_flips_quiet_participants_and_activity_revives() {
    let hub = test_hub();
    let (s1, mut rx1) = join(&hub, "p1");
    let (s2, mut rx2) = join(&hub, "p2");
    drain(&mut rx1);

    tokio::time::advance(Duration::from_secs(30)).await;
    send(&hub, s2, InboundEvent::Heartbeat);
    tokio::time::advance(Duration::from_secs(20)).await;

    assert_eq!(hub.sweep_presence(), 1);
    assert_eq!(presence_updates(&drain(&mut rx2), "p1"), vec![false]);
    assert_eq!(presence_updates(&drain(&mut rx1), "p1"), vec![false]);
    assert!(!hub.is_online(&"p1".into()));
    assert!(hub.is_online(&"p2".into()));

    send(&hub, s1, InboundEvent::Heartbeat);
    assert_eq!(presence_updates(&drain(&mut rx2), "p1"), vec![true]);
    assert!(hub.is_online(&"p1".into()));
    // Heartbeats are not acknowledged and the revival is not echoed back.
    assert!(drain(&mut rx1).is_empty());
}

#[tokio::test]
async fn test_slow_consumer_does_not_block_room() {
    let (hub, _directory) = setup(HubConfig {
        session_queue_capacity: 2,
        ..HubConfig::default()
    });
    let (_slow, _slow_rx) = join(&hub, "p1");
    let (_fast, mut fast_rx) = join(&hub, "p2");

    for i in 0..5 {
        hub.message_new(&"r1".into(), json!({ "id": i })).expect("room exists");
        let events = drain(&mut fast_rx);
        assert!(matches!(events.as_slice(), [OutboundEvent::MessageNew(m)] if m["id"] == i));
    }
}

#[tokio::test]
async fn test_emitters_fan_out_and_reject_unknown_rooms() {
    let (hub, directory) = setup(HubConfig::default());
    let (_s1, mut rx1) = join(&hub, "p1");

    let delivered = hub
        .reaction_add(
            &"r1".into(),
            Reaction {
                message_id: "m1".to_string(),
                user_id: "p2".to_string(),
                emoji: "🔥".to_string(),
            },
        )
        .expect("room exists");
    assert_eq!(delivered, 1);
    assert!(matches!(drain(&mut rx1).as_slice(), [OutboundEvent::ReactionAdd(_)]));

    assert_eq!(
        hub.message_new(&"nowhere".into(), json!({})),
        Err(HubError::RoomNotFound("nowhere".into()))
    );

    directory.upsert_participant(profile("p4", "r1")).expect("room exists");
    hub.participant_join(profile("p4", "r1")).expect("room exists");
    match drain(&mut rx1).as_slice() {
        [OutboundEvent::ParticipantJoin(p)] => {
            assert_eq!(p.id.0, "p4");
            assert!(!p.is_online);
        }
        other => panic!("unexpected events: {other:?}"),
    }

    assert_eq!(
        hub.participant_update(&"ghost".into()),
        Err(HubError::ParticipantNotFound("ghost".into()))
    );

    hub.participant_leave(&"r1".into(), &"p4".into()).expect("room exists");
    assert!(matches!(
        drain(&mut rx1).as_slice(),
        [OutboundEvent::ParticipantLeave(id)] if id.0 == "p4"
    ));
}

#[tokio::test]
async fn test_close_room_ends_call_and_unbinds_everyone() {
    let hub = test_hub();
    let (s1, mut rx1) = join(&hub, "p1");
    let (s2, mut rx2) = join(&hub, "p2");
    send(
        &hub,
        s1,
        InboundEvent::CallStart(RoomTarget {
            room_id: "r1".into(),
            participant_id: "p1".into(),
        }),
    );
    let call_id = ack_of(&drain(&mut rx1)).call_id.expect("call started");
    drain(&mut rx2);

    assert_eq!(hub.close_room(&"r1".into()), 2);

    for rx in [&mut rx1, &mut rx2] {
        let events = drain(rx);
        assert!(matches!(
            events.as_slice(),
            [OutboundEvent::CallEnded { call_id: ended }, OutboundEvent::RoomExpired { .. }] if *ended == call_id
        ));
    }
    assert!(hub.active_call(&"r1".into()).is_none());
    assert_eq!(hub.registry().room_size(&"r1".into()), 0);
    assert!(hub.registry().contains(s1) && hub.registry().contains(s2));
    assert!(!hub.is_online(&"p1".into()));
}

#[tokio::test]
async fn test_room_status_snapshot() {
    let hub = test_hub();
    let (_s1, _rx1) = join(&hub, "p1");
    let (_s2, _rx2) = join(&hub, "p2");

    let status = hub.room_status(&"r1".into()).expect("room exists");
    assert_eq!(status.connected_sessions, 2);
    assert_eq!(status.online_participants.len(), 2);
    assert!(status.active_call.is_none());
    assert!(hub.room_status(&"nope".into()).is_err());
}

#[tokio::test]
async fn test_disconnect_unbound_session_is_harmless() {
    let hub = test_hub();
    let (session, _rx) = hub.open_session();
    hub.disconnect(session);
    hub.disconnect(session);
    assert!(!hub.registry().contains(session));
}

#[tokio::test]
async fn test_participant_removed_mid_session_still_cleans_up() {
    let (hub, directory) = setup(HubConfig::default());
    let (s1, mut rx1) = join(&hub, "p1");
    let (_s2, mut rx2) = join(&hub, "p2");
    send(
        &hub,
        s1,
        InboundEvent::CallStart(RoomTarget {
            room_id: "r1".into(),
            participant_id: "p1".into(),
        }),
    );
    let call_id = ack_of(&drain(&mut rx1)).call_id.expect("call started");

    directory.remove_participant(&"p1".into()).expect("p1 exists");
    hub.participant_leave(&"r1".into(), &"p1".into()).expect("room exists");
    drain(&mut rx2);

    send(
        &hub,
        s1,
        InboundEvent::TypingStart(TypingPayload {
            room_id: "r1".into(),
            participant_id: "p1".into(),
            display_name: None,
            avatar: None,
        }),
    );
    send(
        &hub,
        s1,
        InboundEvent::CallStart(RoomTarget {
            room_id: "r1".into(),
            participant_id: "p1".into(),
        }),
    );
    let ack = ack_of(&drain(&mut rx1));
    assert!(!ack.success);
    assert_eq!(ack.error, Some(ErrorKind::ParticipantNotFound));

    hub.disconnect(s1);

    let events = drain(&mut rx2);
    assert!(events.iter().any(|e| matches!(
        e,
        OutboundEvent::CallParticipantLeft { participant_id, .. } if participant_id.0 == "p1"
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, OutboundEvent::CallEnded { call_id: id } if *id == call_id)));
    assert!(hub.active_call(&"r1".into()).is_none());
    assert!(!hub.registry().contains(s1));
    assert_eq!(hub.registry().room_size(&"r1".into()), 1);
}

#[tokio::test]
async fn test_explicit_offline_survives_heartbeats() {
    let hub = test_hub();
    let (s1, _rx1) = join(&hub, "p1");
    let (_s2, mut rx2) = join(&hub, "p2");

    send(
        &hub,
        s1,
        InboundEvent::UpdateStatus {
            participant_id: "p1".into(),
            is_online: false,
        },
    );
    send(&hub, s1, InboundEvent::Heartbeat);
    send(&hub, s1, InboundEvent::Heartbeat);

    assert_eq!(presence_updates(&drain(&mut rx2), "p1"), vec![false]);
    assert!(!hub.is_online(&"p1".into()));

    send(
        &hub,
        s1,
        InboundEvent::UpdateStatus {
            participant_id: "p1".into(),
            is_online: true,
        },
    );
    assert_eq!(presence_updates(&drain(&mut rx2), "p1"), vec![true]);
    assert!(hub.is_online(&"p1".into()));
}
