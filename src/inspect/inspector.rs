use crate::dispatch::PatchRequest;
use crate::inspect::events::{EventBus, Flow, InputEvent, Phase, Target};
use crate::registry::RegistryHandle;
use crate::span::{SpanId, TaggedElement};
use crate::tagger::{TagPayload, ID_ATTRIBUTE, SOURCE_ATTRIBUTE};

/// Key that toggles the inspector.
pub const TOGGLE_KEY: &str = "`";
/// Key that disables the inspector and clears its selection.
pub const DISMISS_KEY: &str = "Escape";

/// Hover and selection state of the inspector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectorState {
    pub enabled: bool,
    pub hovered: Option<Target>,
    pub selected: Option<Target>,
}

impl InspectorState {
    fn reset(&mut self) {
        self.hovered = None;
        self.selected = None;
    }
}

/// Element picker: routes input through capture-phase handlers, tracks the
/// hovered and selected tagged elements, and turns a command typed against
/// the selection into a [`PatchRequest`].
pub struct Inspector {
    bus: EventBus<InspectorState>,
    state: InspectorState,
    registry: RegistryHandle,
}

impl Inspector {
    /// In non-development builds no handlers are installed and every event
    /// passes through.
    pub fn new(registry: RegistryHandle, dev: bool) -> Self {
        let mut bus = EventBus::new();
        if dev {
            install_handlers(&mut bus);
        }
        Self {
            bus,
            state: InspectorState::default(),
            registry,
        }
    }

    pub fn handle(&mut self, event: &InputEvent) -> Flow {
        self.bus.dispatch(&mut self.state, event)
    }

    /// Extra handlers from the host application share the same table.
    pub fn bus_mut(&mut self) -> &mut EventBus<InspectorState> {
        &mut self.bus
    }

    pub fn state(&self) -> &InspectorState {
        &self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled
    }

    /// Resolve the current selection to its source element.
    pub fn selected_element(&self) -> Option<TaggedElement> {
        let target = self.state.selected.as_ref()?;
        let from_registry = target
            .attribute(ID_ATTRIBUTE)
            .and_then(|id| self.registry.lookup(&SpanId::from(id)));
        from_registry.or_else(|| {
            target
                .attribute(SOURCE_ATTRIBUTE)
                .and_then(|payload| TagPayload::decode(payload).ok())
        })
    }

    /// Build a request for `command` against the selected element.
    ///
    /// Returns `None` when nothing is selected, the selection no longer
    /// resolves, or the command is blank.
    pub fn submit(&self, command: &str) -> Option<PatchRequest> {
        if !self.state.enabled || command.trim().is_empty() {
            return None;
        }
        let element = self.selected_element()?;
        Some(PatchRequest::new(command, element.filename, element.span))
    }
}

fn install_handlers(bus: &mut EventBus<InspectorState>) {
    bus.on(Phase::Capture, 100, |state, event| {
        let InputEvent::Key { key } = event else {
            return Flow::Continue;
        };
        match key.as_str() {
            TOGGLE_KEY => {
                if state.enabled {
                    state.reset();
                }
                state.enabled = !state.enabled;
                Flow::Consumed
            }
            DISMISS_KEY => {
                state.reset();
                state.enabled = false;
                Flow::Consumed
            }
            _ => Flow::Continue,
        }
    });

    bus.on(Phase::Capture, 50, |state, event| {
        if !state.enabled {
            return Flow::Continue;
        }
        match event {
            InputEvent::PointerOver { target } if is_tagged(target) => {
                state.hovered = Some(target.clone());
                Flow::Consumed
            }
            InputEvent::Click { target } if is_tagged(target) => {
                state.selected = Some(target.clone());
                Flow::Consumed
            }
            _ => Flow::Continue,
        }
    });
}

fn is_tagged(target: &Target) -> bool {
    target.attribute(ID_ATTRIBUTE).is_some()
}
