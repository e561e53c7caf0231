// Built-in commands reachable from function selectors

use super::Controller;
use crate::bus::MessageBus;
use crate::data::{catalog_model, CatalogEntry};
use crate::entity::NODE_LABEL;
use crate::message::Message;
use crate::state::DashboardState;
use crate::temporal::as_number;
use crate::widgets::heatmap::param_key;
use crate::widgets::{sanitize_name, NO_DATA_COLOR};
use anyhow::{bail, Result};
use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

pub const UPDATE_WIDGETS: &str = "update_widgets";
pub const SELECT_TIME: &str = "select_time";
pub const LOAD_NODE_CHARTS: &str = "load_node_charts";
pub const STYLE_SELECTED_HM_PARAM: &str = "style_selected_hm_param";
pub const EMIT_PARAM_KEY_BY_HEADER: &str = "emit_param_key_by_header";
pub const EMIT_PARAM_KEY_BY_PARAMS: &str = "emit_param_key_by_params";
pub const SELECT_GAZETTEER: &str = "select_gazetteer";

const DEFAULT_PARAM_EVENT: &str = "click";
const SELECTED_STROKE: &str = "black";
const SELECTED_STROKE_WIDTH: f64 = 2.0;

/// String form of a param; numbers are accepted for labels like `80203`
fn text_param(params: &Map<String, Value>, name: &str) -> Option<String> {
    match params.get(name)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn number_param(params: &Map<String, Value>, name: &str) -> Option<f64> {
    params.get(name).and_then(as_number)
}

fn event_param(params: &Map<String, Value>) -> String {
    text_param(params, "event").unwrap_or_else(|| DEFAULT_PARAM_EVENT.to_string())
}

pub(crate) fn register_builtin(
    bus: &MessageBus,
    controller: &Controller,
    catalog: Arc<RwLock<Vec<CatalogEntry>>>,
) {
    let commands = bus.commands();

    let c = controller.clone();
    commands.register(UPDATE_WIDGETS, move |bus: &MessageBus, params: &Map<String, Value>| {
        update_widgets(&c, bus, params)
    });

    let c = controller.clone();
    commands.register(SELECT_TIME, move |bus: &MessageBus, params: &Map<String, Value>| {
        select_time(&c, bus, params)
    });

    let state = Arc::clone(controller.state());
    commands.register(LOAD_NODE_CHARTS, move |bus: &MessageBus, params: &Map<String, Value>| {
        load_node_charts(&state, bus, params)
    });

    let state = Arc::clone(controller.state());
    commands.register(
        STYLE_SELECTED_HM_PARAM,
        move |bus: &MessageBus, params: &Map<String, Value>| {
            style_selected_hm_param(&state, bus, params)
        },
    );

    commands.register(EMIT_PARAM_KEY_BY_HEADER, emit_param_key_by_header);
    commands.register(EMIT_PARAM_KEY_BY_PARAMS, emit_param_key_by_params);

    let state = Arc::clone(controller.state());
    commands.register(SELECT_GAZETTEER, move |_: &MessageBus, params: &Map<String, Value>| {
        select_gazetteer(&state, &catalog, params)
    });
}

/// `{time}`: render the frame at a timeline position (what the slider sends)
fn update_widgets(controller: &Controller, bus: &MessageBus, params: &Map<String, Value>) -> Result<()> {
    let Some(position) = number_param(params, "time") else {
        debug!("update_widgets without time, skipping");
        return Ok(());
    };
    if position < 0.0 {
        bail!("Timeline position must not be negative, got {}", position);
    }

    controller.render(bus, position.round() as usize);
    Ok(())
}

/// `{time_idx}`: render a time key
fn select_time(controller: &Controller, bus: &MessageBus, params: &Map<String, Value>) -> Result<()> {
    let Some(time) = number_param(params, "time_idx") else {
        debug!("select_time without time_idx, skipping");
        return Ok(());
    };

    controller.render_time(bus, time.round() as i64);
    Ok(())
}

/// `{NodeLabel}`: select a node.
///
/// The previous node's elements get their stroke back, the new node's
/// elements are outlined and sent a `mouseover` while blacklisted so their
/// own messages are not re-emitted. Param highlights are dropped. Without a
/// `NodeLabel` the current node is highlighted again.
fn load_node_charts(state: &DashboardState, bus: &MessageBus, params: &Map<String, Value>) -> Result<()> {
    let requested = text_param(params, NODE_LABEL);
    let previous = state.node_select();

    if requested.is_some() && requested == previous {
        return Ok(());
    }
    let Some(node) = requested.or_else(|| previous.clone()) else {
        debug!("load_node_charts without NodeLabel and no node selected");
        return Ok(());
    };

    let scene = bus.scene();

    if let Some(previous) = previous.as_deref().filter(|p| *p != node) {
        for id in scene.select_class(previous) {
            scene.update(&id, |element| {
                element.style.stroke = Some(NO_DATA_COLOR.to_string());
                element.style.stroke_width = None;
            });
        }
    }

    state.select_node(Some(node.clone()));
    state.clear_params();

    let ids = scene.select_class(&node);
    for id in &ids {
        scene.update(id, |element| {
            element.style.stroke = Some(SELECTED_STROKE.to_string());
            element.style.stroke_width = Some(SELECTED_STROKE_WIDTH);
        });
    }

    {
        let _blacklisted = bus.blacklist().scope(ids.iter().cloned());
        for id in &ids {
            bus.dispatch(id, "mouseover");
        }
    }

    info!(node = %node, elements = ids.len(), "Node highlighted");
    Ok(())
}

/// `{name, ts_color}`: toggle the highlight of the elements of a param
/// class. The first selection remembers their fills; toggling off restores
/// them.
fn style_selected_hm_param(
    state: &DashboardState,
    bus: &MessageBus,
    params: &Map<String, Value>,
) -> Result<()> {
    let Some(name) = text_param(params, "name") else {
        debug!("style_selected_hm_param without name, skipping");
        return Ok(());
    };
    let class_name = sanitize_name(&name);
    let scene = bus.scene();

    let selection = state.toggle_param(&class_name, || {
        scene
            .select_class(&class_name)
            .into_iter()
            .map(|id| {
                let fill = scene.get(&id).and_then(|element| element.style.fill);
                (id, fill)
            })
            .collect()
    });

    if selection.toggled {
        if let Some(color) = text_param(params, "ts_color") {
            for id in scene.select_class(&class_name) {
                scene.update(&id, |element| element.style.fill = Some(color.clone()));
            }
        }
    } else {
        for (id, fill) in &selection.fill {
            scene.update(id, |element| element.style.fill = fill.clone());
        }
    }

    debug!(param = %class_name, toggled = selection.toggled, "Param highlight toggled");
    Ok(())
}

/// `{name, event}`: send `event` to the elements whose `param` is the
/// sanitized series name
fn emit_param_key_by_header(bus: &MessageBus, params: &Map<String, Value>) -> Result<()> {
    let Some(name) = text_param(params, "name") else {
        debug!("emit_param_key_by_header without name, skipping");
        return Ok(());
    };

    bus.emit(&Message::to_attr("param", sanitize_name(&name)).on(event_param(params)));
    Ok(())
}

/// `{x_attr, y_attr, <x_attr>, <y_attr>, event}`: send `event` to the
/// elements whose `param` is the key of the (x, y) parameter pair
fn emit_param_key_by_params(bus: &MessageBus, params: &Map<String, Value>) -> Result<()> {
    let (Some(x_attr), Some(y_attr)) = (text_param(params, "x_attr"), text_param(params, "y_attr"))
    else {
        debug!("emit_param_key_by_params without x_attr/y_attr, skipping");
        return Ok(());
    };
    let (Some(x), Some(y)) = (params.get(&x_attr), params.get(&y_attr)) else {
        debug!(x_attr = %x_attr, y_attr = %y_attr, "Parameter values missing, skipping");
        return Ok(());
    };

    let key = param_key(&x_attr, x, &y_attr, y);
    bus.emit(&Message::to_attr("param", key).on(event_param(params)));
    Ok(())
}

/// `{value}`: select a gazetteer; its model is looked up in the catalog
fn select_gazetteer(
    state: &DashboardState,
    catalog: &RwLock<Vec<CatalogEntry>>,
    params: &Map<String, Value>,
) -> Result<()> {
    let Some(value) = text_param(params, "value") else {
        debug!("select_gazetteer without value, skipping");
        return Ok(());
    };

    let model = {
        let catalog = catalog.read().unwrap_or_else(PoisonError::into_inner);
        catalog_model(&catalog, &value).map(str::to_string)
    };
    state.select_gazetteer(value, model);
    Ok(())
}
