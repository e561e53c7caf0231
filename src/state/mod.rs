// Dashboard selection state and change broadcast

mod engine;
mod selection;

pub use engine::DashboardState;
pub use selection::{ParamSelection, SelectionChanged, SelectionField, SelectionState};
