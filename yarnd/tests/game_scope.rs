//! The game scope end to end: creation, lookup, meta, lifecycle, listing.

mod common;

use common::{DEFINITION_FILE, TestServer, message, status};
use serde_json::json;

#[tokio::test]
async fn definitions_lists_the_definition_directory() {
    let server = TestServer::new("definitions");

    let response = server
        .request(json!({"method": "get", "scope": "game", "action": "definitions"}))
        .await;

    assert_eq!(status(&response), 200);
    assert_eq!(response["definitions"], json!([DEFINITION_FILE]));
}

#[tokio::test]
async fn create_fetch_destroy_round_trip() {
    let server = TestServer::new("lifecycle");

    let response = server
        .request(json!({
            "method": "post",
            "scope": "game",
            "args": {"name": "myGame", "definition": DEFINITION_FILE}
        }))
        .await;
    assert_eq!(status(&response), 200);
    assert_eq!(response["id"], json!(0));

    let response = server
        .request(json!({"method": "get", "scope": "game", "args": {"id": 0}}))
        .await;
    assert_eq!(status(&response), 200);
    assert_eq!(response["id"], json!(0));
    assert_eq!(response["name"], json!("myGame"));
    assert_eq!(response["definition"], json!(DEFINITION_FILE));
    assert_eq!(response["current_time"], json!(0));
    assert_eq!(response["is_running"], json!(false));

    let response = server
        .request(json!({"method": "delete", "scope": "game", "args": {"id": 0}}))
        .await;
    assert_eq!(status(&response), 200);

    let response = server
        .request(json!({"method": "get", "scope": "game", "args": {"id": 0}}))
        .await;
    assert_eq!(status(&response), 404);
    assert_eq!(message(&response), "game not found");
}

#[tokio::test]
async fn creation_validates_its_arguments() {
    let server = TestServer::new("create-validation");

    let cases = vec![
        (json!({}), "missing required name"),
        (json!({"name": 4, "definition": DEFINITION_FILE}), "game name must be a string"),
        (json!({"name": "   ", "definition": DEFINITION_FILE}), "missing required name"),
        (json!({"name": "a"}), "missing required definition path"),
        (
            json!({"name": "a", "definition": true}),
            "game definition filename must be a string",
        ),
        (
            json!({"name": "a", "definition": "/etc/game.json"}),
            "definition path must be relative",
        ),
        (
            json!({"name": "a", "definition": DEFINITION_FILE, "mood": {"bad": true}}),
            "meta values cannot be objects or arrays",
        ),
    ];

    for (args, expected) in cases {
        let response = server
            .request(json!({"method": "post", "scope": "game", "args": args}))
            .await;
        assert_eq!(status(&response), 400, "for args {args}");
        assert_eq!(message(&response), expected, "for args {args}");
    }

    // A definition the engine cannot load surfaces as an internal error.
    let response = server
        .request(json!({
            "method": "post",
            "scope": "game",
            "args": {"name": "a", "definition": "missing.json"}
        }))
        .await;
    assert_eq!(status(&response), 500);
}

#[tokio::test]
async fn meta_set_and_get() {
    let server = TestServer::new("meta");
    let id = server.create_game("metaGame").await;

    let response = server
        .request(json!({
            "method": "set",
            "scope": "game",
            "action": "meta",
            "args": {"id": id, "meta": {"k": "v"}}
        }))
        .await;
    assert_eq!(status(&response), 200);

    let response = server
        .request(json!({
            "method": "get",
            "scope": "game",
            "action": "meta",
            "args": {"id": id, "meta": ["k"]}
        }))
        .await;
    assert_eq!(status(&response), 200);
    assert_eq!(response["meta"], json!({"k": "v"}));

    // Non-scalar values are rejected.
    let response = server
        .request(json!({
            "method": "set",
            "scope": "game",
            "action": "meta",
            "args": {"id": id, "meta": {"k": [1, 2]}}
        }))
        .await;
    assert_eq!(status(&response), 400);
    assert_eq!(message(&response), "meta values cannot be objects or arrays");

    // Scalars set at creation time land in meta too.
    let response = server
        .request(json!({
            "method": "post",
            "scope": "game",
            "args": {"name": "seeded", "definition": DEFINITION_FILE, "difficulty": "hard", "level": 3}
        }))
        .await;
    let seeded = response["id"].as_u64().unwrap();

    let response = server
        .request(json!({
            "method": "get",
            "scope": "game",
            "action": "meta",
            "args": {"id": seeded, "meta": ["difficulty", "level"]}
        }))
        .await;
    assert_eq!(response["meta"], json!({"difficulty": "hard", "level": "3"}));
}

#[tokio::test]
async fn start_stop_and_the_running_flag() {
    let server = TestServer::new("running");
    let id = server.create_game("runner").await;

    let response = server
        .request(json!({"method": "get", "scope": "game", "action": "is_running", "args": {"id": id}}))
        .await;
    assert_eq!(response["is_running"], json!(false));

    let response = server
        .request(json!({"method": "set", "scope": "game", "action": "start", "args": {"id": id}}))
        .await;
    assert_eq!(status(&response), 200);

    let response = server
        .request(json!({"method": "get", "scope": "game", "action": "is_running", "args": {"id": id}}))
        .await;
    assert_eq!(response["is_running"], json!(true));

    let response = server
        .request(json!({"method": "set", "scope": "game", "action": "stop", "args": {"id": id}}))
        .await;
    assert_eq!(status(&response), 200);

    let response = server
        .request(json!({"method": "get", "scope": "game", "action": "time", "args": {"id": id}}))
        .await;
    assert_eq!(status(&response), 200);
    assert!(response["current_time"].is_u64());
}

#[tokio::test]
async fn list_supports_filters_and_meta_projection() {
    let server = TestServer::new("list");
    let apple = server.create_game("apple").await;
    let apricot = server.create_game("apricot").await;
    let banana = server.create_game("banana").await;

    server
        .request(json!({"method": "set", "scope": "game", "action": "start", "args": {"id": banana}}))
        .await;

    // No filters: everything.
    let response = server
        .request(json!({"method": "get", "scope": "game", "action": "list"}))
        .await;
    assert_eq!(status(&response), 200);
    assert_eq!(response["games"].as_array().unwrap().len(), 3);

    // One group: name prefix AND not running.
    let response = server
        .request(json!({
            "method": "get",
            "scope": "game",
            "action": "list",
            "args": {"filters": {"name_starts": "ap", "is_running": false}}
        }))
        .await;
    let ids: Vec<u64> = response["games"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![apple, apricot]);

    // A union of two groups.
    let response = server
        .request(json!({
            "method": "get",
            "scope": "game",
            "action": "list",
            "args": {"filters": [{"name_starts": "ban"}, {"name_starts": "apple"}]}
        }))
        .await;
    let ids: Vec<u64> = response["games"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![apple, banana]);

    // Unsupported rules are a validation error.
    let response = server
        .request(json!({
            "method": "get",
            "scope": "game",
            "action": "list",
            "args": {"filters": {"color": "red"}}
        }))
        .await;
    assert_eq!(status(&response), 400);
    assert_eq!(message(&response), "Unsupported filter 'color'");

    // So are filters of the wrong shape.
    let response = server
        .request(json!({
            "method": "get",
            "scope": "game",
            "action": "list",
            "args": {"filters": "is_running"}
        }))
        .await;
    assert_eq!(status(&response), 400);
    assert_eq!(
        message(&response),
        "filters must be expressed as a JSON object or array"
    );

    // Meta projection fills requested keys in.
    server
        .request(json!({
            "method": "set",
            "scope": "game",
            "action": "meta",
            "args": {"id": apple, "meta": {"flavor": "sweet"}}
        }))
        .await;
    let response = server
        .request(json!({
            "method": "get",
            "scope": "game",
            "action": "list",
            "args": {"include_meta": ["flavor"], "filters": {"name_starts": "apple"}}
        }))
        .await;
    assert_eq!(response["games"][0]["flavor"], json!("sweet"));
}

#[tokio::test]
async fn statistics_exposes_the_simulation_view() {
    let server = TestServer::new("stats");
    let id = server.create_game("statGame").await;

    let response = server
        .request(json!({"method": "get", "scope": "game", "action": "statistics", "args": {"id": id}}))
        .await;
    assert_eq!(status(&response), 200);
    let statistics = response["statistics"].as_object().unwrap();
    assert_eq!(statistics["players"], json!(0));
    assert_eq!(statistics["is_running"], json!(false));
    assert!(statistics.get("status").is_none());

    // Global statistics count players across games and report versions.
    let response = server
        .request(json!({"method": "get", "scope": "global", "action": "statistics"}))
        .await;
    assert_eq!(status(&response), 200);
    assert_eq!(response["players"], json!(0));
    assert!(response["version"]["major"].is_u64());
    assert!(response["lib_version"]["patch"].is_u64());
}

#[tokio::test]
async fn config_elides_hidden_settings() {
    let server = TestServer::new("config");

    let response = server
        .request(json!({"method": "get", "scope": "global", "action": "config"}))
        .await;
    assert_eq!(status(&response), 200);

    let config = response["config"].as_object().unwrap();
    assert!(config.contains_key("network.port"));
    assert!(config.contains_key("output.driver"));
    // Server-side paths are hidden.
    assert!(!config.contains_key("resources.definitions_path"));
    assert!(!config.contains_key("state.save_path"));
    assert!(!config.contains_key("extensions.path"));
}
