//! Runtime element picking.

pub mod events;
pub mod inspector;

pub use events::{EventBus, Flow, InputEvent, Phase, Target};
pub use inspector::{Inspector, InspectorState, DISMISS_KEY, TOGGLE_KEY};
