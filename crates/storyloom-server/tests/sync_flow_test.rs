//! Integration tests for the document sync flow.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use uuid::Uuid;

use storyloom_core::clock::Clock;
use storyloom_core::command::{Command, CommandKind};
use storyloom_core::graph::{NodeKind, Position, StoryNode};
use storyloom_core::version::VersionVector;
use storyloom_sync::wire::Frame;

fn scene(title: &str) -> StoryNode {
    StoryNode {
        id: Uuid::new_v4(),
        kind: NodeKind::Scene,
        title: title.to_owned(),
        body: String::new(),
        position: Position::new(1.0, 2.0),
    }
}

#[tokio::test]
async fn test_push_is_acked_broadcast_and_visible_in_snapshot() {
    let (app, state) = common::build_test_app();
    let document_id = Uuid::new_v4();
    let host = state.registry.get_or_create(document_id);
    let mut fan_out = host.subscribe();

    let author = Uuid::new_v4();
    let node = scene("opening");
    let replies = host.handle_push(
        vec![Command::new(
            author,
            1,
            Utc::now(),
            CommandKind::AddNode {
                node: node.clone(),
                edges: vec![],
            },
        )],
        &VersionVector::new(),
        state.clock.now(),
    );

    // The pushing client gets an ack at sequence 1.
    assert!(matches!(
        replies[0],
        Frame::Ack {
            server_sequence: 1,
            ..
        }
    ));

    // Every subscriber (including the pusher) sees the canonical event.
    let Frame::Event { event, .. } = fan_out.recv().await.unwrap() else {
        panic!("expected event frame");
    };
    assert_eq!(event.server_sequence, 1);
    assert_eq!(event.command.author_id, author);

    // The snapshot endpoint serves the materialized state.
    let (status, json) =
        common::get_json(app, &format!("/api/v1/documents/{document_id}/snapshot")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["version"], 1);
    assert_eq!(json["state"]["nodes"][node.id.to_string()]["title"], "opening");
}

#[tokio::test]
async fn test_catch_up_replays_only_events_after_the_requested_sequence() {
    let (_app, state) = common::build_test_app();
    let document_id = Uuid::new_v4();
    let host = state.registry.get_or_create(document_id);
    let author = Uuid::new_v4();

    for i in 1..=3 {
        host.handle_push(
            vec![Command::new(
                author,
                i,
                Utc::now(),
                CommandKind::AddNode {
                    node: scene(&format!("scene-{i}")),
                    edges: vec![],
                },
            )],
            &VersionVector::new(),
            state.clock.now(),
        );
    }

    let frames = host.catch_up(1);
    let sequences: Vec<u64> = frames
        .iter()
        .map(|frame| match frame {
            Frame::Event { event, .. } => event.server_sequence,
            other => panic!("unexpected frame: {other:?}"),
        })
        .collect();
    assert_eq!(sequences, vec![2, 3]);
}
