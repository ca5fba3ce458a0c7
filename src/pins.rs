//! Pin matrix: an N-pin tri-state bus with synchronous change notification.

/// Logical state of a single pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    /// High-impedance input, no pull.
    InputFloating,
    /// Input with an internal pull-up.
    InputPulledUp,
    /// Input with an internal pull-down.
    InputPulledDown,
    /// Driven low.
    OutputLow,
    /// Driven high.
    OutputHigh,
}

impl PinState {
    /// The logical level a reader observes, or `None` for a floating input
    /// (no driver, nothing to observe).
    pub fn level(self) -> Option<bool> {
        match self {
            PinState::InputFloating => None,
            PinState::InputPulledUp => Some(true),
            PinState::InputPulledDown => Some(false),
            PinState::OutputLow => Some(false),
            PinState::OutputHigh => Some(true),
        }
    }
}

/// Pins per port, matching the nRF52832 GPIO port width.
pub const PINS_PER_PORT: usize = 32;

/// Identifies a single pin by port and pin-within-port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PinId {
    port: u8,
    pin: u8,
}

impl PinId {
    /// Construct a pin identifier. `pin` must be `< PINS_PER_PORT`.
    pub const fn new(port: u8, pin: u8) -> Self {
        assert!((pin as usize) < PINS_PER_PORT, "pin index out of range");
        Self { port, pin }
    }

    fn index(self) -> usize {
        self.port as usize * PINS_PER_PORT + self.pin as usize
    }
}

type Listener = Box<dyn FnMut(PinId, bool)>;

/// A fixed array of pins with subscriber-based change notification.
///
/// Writes that do not change the pin's logical level do not invoke any
/// subscriber — there is no diffing beyond "did the level change."
pub struct PinMatrix {
    ports: usize,
    states: Vec<PinState>,
    listeners: Vec<Vec<Listener>>,
}

impl PinMatrix {
    /// Create a matrix with `ports` ports of [`PINS_PER_PORT`] pins each, all
    /// initialized to [`PinState::InputFloating`].
    pub fn new(ports: usize) -> Self {
        let total = ports * PINS_PER_PORT;
        Self {
            ports,
            states: vec![PinState::InputFloating; total],
            listeners: (0..total).map(|_| Vec::new()).collect(),
        }
    }

    /// Overwrite a pin's state. Subscribers registered on this pin are
    /// invoked, in registration order, if and only if the logical level
    /// changed.
    pub fn set(&mut self, id: PinId, state: PinState) {
        let idx = self.checked_index(id);
        let before = self.states[idx].level();
        self.states[idx] = state;
        let after = state.level();
        if before != after {
            if let Some(level) = after {
                for listener in &mut self.listeners[idx] {
                    listener(id, level);
                }
            }
        }
    }

    /// Read a pin's current state.
    pub fn get(&self, id: PinId) -> PinState {
        self.states[self.checked_index(id)]
    }

    /// Register a listener invoked whenever `id`'s logical level changes.
    pub fn subscribe(&mut self, id: PinId, callback: impl FnMut(PinId, bool) + 'static) {
        let idx = self.checked_index(id);
        self.listeners[idx].push(Box::new(callback));
    }

    /// Reset every pin to [`PinState::InputFloating`]. No subscriber is
    /// invoked: reset is a hard re-initialization, not an observed
    /// transition.
    pub fn reset(&mut self) {
        self.states.fill(PinState::InputFloating);
    }

    fn checked_index(&self, id: PinId) -> usize {
        assert!((id.port as usize) < self.ports, "port out of range");
        id.index()
    }
}
