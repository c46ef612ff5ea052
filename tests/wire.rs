//! Wire shape of the request/response types
//!
//! The transport layer is external; these tests pin the JSON field names
//! and defaults it relies on.

use std::sync::Arc;
use stride::{Engine, EngineConfig, GenerateRequest, GenerateResponse, MemoryStore, Role};

#[test]
fn request_defaults_apply_on_deserialization() {
    let request: GenerateRequest =
        serde_json::from_str(r#"{ "business_type": "order" }"#).unwrap();
    assert_eq!(request.business_type, "order");
    assert_eq!(request.count, 1);
    assert_eq!(request.time_key, None);
    assert!(!request.include_routing);
    assert_eq!(request.custom_step_size, None);
    assert_eq!(request.force_shard_type, None);
}

#[test]
fn response_serializes_with_wire_field_names() {
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(EngineConfig::for_role(Role::Odd), store.clone(), store).unwrap();

    let request: GenerateRequest = serde_json::from_str(
        r#"{
            "business_type": "order",
            "time_key": "20260801",
            "count": 3,
            "include_routing": true,
            "shard_db_count": 4,
            "force_shard_type": 1
        }"#,
    )
    .unwrap();
    let response = engine.generate(&request).unwrap();

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["business_type"], "order");
    assert_eq!(json["time_key"], "20260801");
    assert_eq!(json["shard_type"], 1);
    assert_eq!(json["ids"].as_array().unwrap().len(), 3);
    assert!(json["timestamp_ms"].as_i64().unwrap() > 0);
    assert_eq!(json["routing"]["routing_key"], json["ids"][0]);

    // And the response round-trips.
    let back: GenerateResponse = serde_json::from_value(json).unwrap();
    assert_eq!(back.ids, response.ids);
    assert_eq!(back.node_id, response.node_id);
}
