use super::*;
use serde_json::json;

fn record(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("record must be an object"),
    }
}

#[test]
fn test_bind_copies_only_required_fields() {
    let template: Message = serde_json::from_value(json!({
        "selector": {"function": {"func": "f", "params": {}}},
        "attributes_req": ["a", "b"]
    }))
    .unwrap();

    let bound = bind_attributes(&template, &record(json!({"a": 1, "b": 2, "c": 3})));

    assert_eq!(bound.params().unwrap(), &record(json!({"a": 1, "b": 2})));
    // Template untouched
    assert!(template.params().unwrap().is_empty());
}

#[test]
fn test_bind_overwrites_and_skips_missing() {
    let template = Message::call("load_node_charts")
        .param("NodeLabel", "old")
        .param("keep", true)
        .requiring(["NodeLabel", "Population"]);

    let bound = parse_comm_msg(&template, &record(json!({"NodeLabel": "80202_5"})));

    assert_eq!(
        bound.params().unwrap(),
        &record(json!({"NodeLabel": "80202_5", "keep": true}))
    );
}

#[test]
fn test_bind_ignores_non_function_selectors() {
    let template = Message::to_class("n_1").requiring(["NodeLabel"]);
    let bound = bind_attributes(&template, &record(json!({"NodeLabel": "1"})));

    assert_eq!(bound, template);
}

#[test]
fn test_selector_kinds() {
    let id: Selector = serde_json::from_value(json!({"id": "map"})).unwrap();
    assert_eq!(id, Selector::Id("map".to_string()));

    let class: Selector = serde_json::from_value(json!({"class": "n_1_map"})).unwrap();
    assert_eq!(class, Selector::Class("n_1_map".to_string()));

    // Unknown keys become attribute matches
    let attr: Selector = serde_json::from_value(json!({"param": "x_1_y_2"})).unwrap();
    assert_eq!(
        attr,
        Selector::Attribute {
            name: "param".to_string(),
            value: "x_1_y_2".to_string()
        }
    );

    let numeric: Selector = serde_json::from_value(json!({"time": 5})).unwrap();
    assert_eq!(
        numeric,
        Selector::Attribute {
            name: "time".to_string(),
            value: "5".to_string()
        }
    );
}

#[test]
fn test_selector_requires_exactly_one_key() {
    assert_eq!(
        Selector::try_from(json!({})).unwrap_err(),
        SelectorError::Empty
    );
    assert!(matches!(
        Selector::try_from(json!({"id": "a", "class": "b"})).unwrap_err(),
        SelectorError::MultipleKeys(_)
    ));
    assert_eq!(
        Selector::try_from(json!("map")).unwrap_err(),
        SelectorError::NotAnObject
    );
}

#[test]
fn test_function_selector_needs_command_name() {
    assert!(matches!(
        Selector::try_from(json!({"function": {"params": {}}})).unwrap_err(),
        SelectorError::InvalidFunction(_)
    ));
    assert!(matches!(
        Selector::try_from(json!({"function": {"func": 3}})).unwrap_err(),
        SelectorError::InvalidFunction(_)
    ));

    // params defaults to empty
    let selector = Selector::try_from(json!({"function": {"func": "update_widgets"}})).unwrap();
    assert_eq!(
        selector,
        Selector::Function {
            command: "update_widgets".to_string(),
            params: Map::new()
        }
    );
}

#[test]
fn test_message_serializes_with_command_name() {
    let message = Message::call("update_widgets").param("time", 3).on("click");
    let wire = serde_json::to_value(&message).unwrap();

    assert_eq!(
        wire,
        json!({
            "event": "click",
            "selector": {"function": {"func": "update_widgets", "params": {"time": 3}}}
        })
    );

    let back: Message = serde_json::from_value(wire).unwrap();
    assert_eq!(back, message);
}

#[test]
fn test_missing_fields_deserialize_as_absent() {
    let empty: Message = serde_json::from_value(json!({})).unwrap();
    assert_eq!(empty, Message::default());

    let event_only: Message = serde_json::from_value(json!({"event": "click"})).unwrap();
    assert_eq!(event_only.event.as_deref(), Some("click"));
    assert!(event_only.selector.is_none());
}

#[test]
fn test_default_event() {
    let message = Message::to_id("a");
    assert_eq!(message.with_default_event().event.as_deref(), Some(DEFAULT_EVENT));

    let click = Message::to_id("a").on("click");
    assert_eq!(click.with_default_event().event.as_deref(), Some("click"));
}
