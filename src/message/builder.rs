use super::{Message, Selector};
use serde_json::{Map, Value};

/// Bind fields of a triggering record into a message's function params.
///
/// For function selectors, each field named in `attributes_req` that is
/// present in `record` is copied into `params` in order, overwriting any
/// previous value. Missing fields are skipped. Other selector kinds are
/// returned unchanged. The template is never modified.
pub fn bind_attributes(message: &Message, record: &Map<String, Value>) -> Message {
    let mut bound = message.clone();

    if let Some(Selector::Function { params, .. }) = &mut bound.selector {
        for field in &message.attributes_req {
            if let Some(value) = record.get(field) {
                params.insert(field.clone(), value.clone());
            }
        }
    }

    bound
}

/// Alias of [`bind_attributes`]
pub fn parse_comm_msg(message: &Message, record: &Map<String, Value>) -> Message {
    bind_attributes(message, record)
}
