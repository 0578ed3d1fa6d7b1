//! The entity scope tree: lookups, subtype discipline, output buffers.

mod common;

use common::{TestServer, message, status};
use serde_json::json;

#[tokio::test]
async fn entities_resolve_through_every_matching_subtype_scope() {
    let server = TestServer::new("subtypes");
    let id = server.create_game("world").await;

    // The troll is an entity, a tangible, a thing, a being and a creature.
    for scope in ["entity", "tangible", "thing", "being", "creature"] {
        let response = server
            .request(json!({
                "method": "get",
                "scope": scope,
                "args": {"game_id": id, "name": "troll"}
            }))
            .await;
        assert_eq!(status(&response), 200, "scope {scope}");
        assert_eq!(response["entity"], json!({"name": "troll", "type": "creature"}));
    }

    // It is not a place, and the 404 message names the scope.
    let response = server
        .request(json!({
            "method": "get",
            "scope": "place",
            "args": {"game_id": id, "name": "troll"}
        }))
        .await;
    assert_eq!(status(&response), 404);
    assert_eq!(message(&response), "place not found");

    let response = server
        .request(json!({
            "method": "get",
            "scope": "room",
            "args": {"game_id": id, "name": "start"}
        }))
        .await;
    assert_eq!(status(&response), 200);
    assert_eq!(response["entity"], json!({"name": "start", "type": "room"}));

    // Resources sit under entity but outside the tangible branch.
    let response = server
        .request(json!({
            "method": "get",
            "scope": "resource",
            "args": {"game_id": id, "name": "gold"}
        }))
        .await;
    assert_eq!(status(&response), 200);

    let response = server
        .request(json!({
            "method": "get",
            "scope": "tangible",
            "args": {"game_id": id, "name": "gold"}
        }))
        .await;
    assert_eq!(status(&response), 404);
    assert_eq!(message(&response), "tangible not found");
}

#[tokio::test]
async fn lists_are_scoped_to_the_subtype() {
    let server = TestServer::new("lists");
    let id = server.create_game("world").await;

    let response = server
        .request(json!({
            "method": "get",
            "scope": "entity",
            "action": "list",
            "args": {"game_id": id}
        }))
        .await;
    assert_eq!(status(&response), 200);
    // start, cave, candle, troll, gold.
    assert_eq!(response["entities"].as_array().unwrap().len(), 5);

    let response = server
        .request(json!({
            "method": "get",
            "scope": "place",
            "action": "list",
            "args": {"game_id": id}
        }))
        .await;
    let names: Vec<&str> = response["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["cave", "start"]);

    let response = server
        .request(json!({
            "method": "get",
            "scope": "object",
            "action": "list",
            "args": {"game_id": id}
        }))
        .await;
    let names: Vec<&str> = response["entities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["candle"]);

    let response = server
        .request(json!({
            "method": "get",
            "scope": "entity",
            "action": "list",
            "args": {"game_id": 99}
        }))
        .await;
    assert_eq!(status(&response), 404);
    assert_eq!(message(&response), "game not found");
}

#[tokio::test]
async fn output_round_trips_through_the_buffer() {
    let server = TestServer::new("output");
    let id = server.create_game("world").await;

    server
        .request(json!({
            "method": "post",
            "scope": "player",
            "args": {"game_id": id, "name": "player"}
        }))
        .await;

    let response = server
        .request(json!({
            "method": "post",
            "scope": "entity",
            "action": "output",
            "args": {"game_id": id, "name": "player", "channel": "test", "message": "hi"}
        }))
        .await;
    assert_eq!(status(&response), 200);

    let response = server
        .request(json!({
            "method": "get",
            "scope": "entity",
            "action": "output",
            "args": {"game_id": id, "name": "player", "channel": "test"}
        }))
        .await;
    assert_eq!(status(&response), 200);
    let messages = response["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["order"], json!(0));
    assert_eq!(messages[0]["content"], json!("hi\n"));
    assert!(messages[0]["timestamp"].is_u64());

    // Output reads consume: a second fetch is empty.
    let response = server
        .request(json!({
            "method": "get",
            "scope": "entity",
            "action": "output",
            "args": {"game_id": id, "name": "player", "channel": "test"}
        }))
        .await;
    assert_eq!(status(&response), 200);
    assert_eq!(response["messages"], json!([]));
}

#[tokio::test]
async fn output_arguments_are_validated() {
    let server = TestServer::new("output-args");
    let id = server.create_game("world").await;

    // The channel is required for reads and validated before the entity.
    let response = server
        .request(json!({
            "method": "get",
            "scope": "entity",
            "action": "output",
            "args": {"game_id": id, "name": "nobody"}
        }))
        .await;
    assert_eq!(status(&response), 400);
    assert_eq!(message(&response), "missing required channel");

    let response = server
        .request(json!({
            "method": "post",
            "scope": "entity",
            "action": "output",
            "args": {"game_id": id, "name": "troll"}
        }))
        .await;
    assert_eq!(status(&response), 400);
    assert_eq!(message(&response), "missing required message");

    let response = server
        .request(json!({
            "method": "post",
            "scope": "entity",
            "action": "output",
            "args": {"game_id": id, "name": "troll", "message": {"no": "objects"}}
        }))
        .await;
    assert_eq!(status(&response), 400);
    assert_eq!(
        message(&response),
        "message must be a string or other scalar type"
    );

    let response = server
        .request(json!({
            "method": "post",
            "scope": "entity",
            "action": "output",
            "args": {"game_id": id, "name": "nobody", "message": "hi"}
        }))
        .await;
    assert_eq!(status(&response), 404);
    assert_eq!(message(&response), "entity not found");
}

#[tokio::test]
async fn messages_without_a_channel_land_on_notifications() {
    let server = TestServer::new("default-channel");
    let id = server.create_game("world").await;

    server
        .request(json!({
            "method": "post",
            "scope": "entity",
            "action": "output",
            "args": {"game_id": id, "name": "troll", "message": "grumble"}
        }))
        .await;

    let response = server
        .request(json!({
            "method": "get",
            "scope": "entity",
            "action": "output",
            "args": {"game_id": id, "name": "troll", "channel": "notifications"}
        }))
        .await;
    let messages = response["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], json!("grumble\n"));
}

#[tokio::test]
async fn pubsub_output_driver_refuses_reads_with_501() {
    let server = TestServer::with_config("pubsub", |config| {
        config.output.driver = "channel".to_string();
    });
    let id = server.create_game("world").await;

    // Writes always work.
    let response = server
        .request(json!({
            "method": "post",
            "scope": "entity",
            "action": "output",
            "args": {"game_id": id, "name": "troll", "channel": "test", "message": "hi"}
        }))
        .await;
    assert_eq!(status(&response), 200);

    // Reads cannot be served by a pub/sub driver.
    let response = server
        .request(json!({
            "method": "get",
            "scope": "entity",
            "action": "output",
            "args": {"game_id": id, "name": "troll", "channel": "test"}
        }))
        .await;
    assert_eq!(status(&response), 501);
}
