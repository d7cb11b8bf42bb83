//! Device activation for the generic joystick adapter
//!
//! Any number of joysticks may be connected, but only one is authoritative.
//! Devices are tracked from their connect notification, the first device to
//! produce a deliberate input becomes active, and only its state is decoded
//! until it disconnects.

use crate::controller::generic::{JoystickReport, LayoutHint, MappingPolicy, MappingTable};
use crate::controller::snapshot::Snapshot;
use crate::controller::DeviceAdapter;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

pub type DeviceId = usize;

pub const DEFAULT_ACTIVATION_DEADZONE: f64 = 0.8;

/// One physical controller as reported by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: String,
    pub buttons: usize,
    pub axes: usize,
    pub hats: usize,
    pub layout: LayoutHint,
}

impl DeviceDescriptor {
    /// Devices with no buttons, axes or hats are virtual noise from the transport
    pub fn is_input_device(&self) -> bool {
        self.buttons > 0 || self.axes > 0 || self.hats > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Connected(DeviceDescriptor),
    Disconnected(DeviceId),
    ButtonDown { id: DeviceId, index: usize },
    AxisMoved { id: DeviceId, index: usize, value: f64 },
    HatMoved { id: DeviceId, index: usize, x: i8, y: i8 },
}

impl DeviceEvent {
    pub fn device(&self) -> DeviceId {
        match self {
            DeviceEvent::Connected(descriptor) => descriptor.id,
            DeviceEvent::Disconnected(id)
            | DeviceEvent::ButtonDown { id, .. }
            | DeviceEvent::AxisMoved { id, .. }
            | DeviceEvent::HatMoved { id, .. } => *id,
        }
    }

    /// Whether this event counts as a deliberate input
    pub fn is_activation(&self, deadzone: f64) -> bool {
        match self {
            DeviceEvent::ButtonDown { .. } => true,
            DeviceEvent::AxisMoved { value, .. } => value.abs() > deadzone,
            DeviceEvent::HatMoved { x, y, .. } => *x != 0 || *y != 0,
            DeviceEvent::Connected(_) | DeviceEvent::Disconnected(_) => false,
        }
    }
}

/// Joystick transport with hot-plug notifications
pub trait JoystickBackend {
    /// Everything that happened since the last call, oldest first
    fn drain_events(&mut self) -> Vec<DeviceEvent>;

    /// Current raw state of a device, `None` if it is unknown to the backend
    fn report(&self, id: DeviceId) -> Option<JoystickReport>;

    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    NoDevice,
    AwaitingActivation,
    Active(DeviceId),
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationState::NoDevice => write!(f, "no device"),
            ActivationState::AwaitingActivation => write!(f, "awaiting activation"),
            ActivationState::Active(id) => write!(f, "active (device {})", id),
        }
    }
}

#[derive(Debug)]
struct KnownDevice {
    descriptor: DeviceDescriptor,
    table: MappingTable,
}

#[derive(Debug)]
struct ActiveDevice {
    id: DeviceId,
    // Buttons held at activation stay hidden until released
    masked: HashSet<String>,
}

pub struct ActivationStateMachine<B: JoystickBackend> {
    backend: Option<B>,
    policy: MappingPolicy,
    activation_deadzone: f64,
    devices: BTreeMap<DeviceId, KnownDevice>,
    active: Option<ActiveDevice>,
}

impl<B: JoystickBackend> ActivationStateMachine<B> {
    pub fn new(backend: B, policy: MappingPolicy, activation_deadzone: f64) -> Self {
        info!(
            "Activation state machine ready, activation deadzone {}",
            activation_deadzone
        );
        Self {
            backend: Some(backend),
            policy,
            activation_deadzone,
            devices: BTreeMap::new(),
            active: None,
        }
    }

    pub fn state(&self) -> ActivationState {
        match (&self.active, self.devices.is_empty()) {
            (Some(active), _) => ActivationState::Active(active.id),
            (None, true) => ActivationState::NoDevice,
            (None, false) => ActivationState::AwaitingActivation,
        }
    }

    /// Ids of every accepted device, in ascending order
    pub fn available(&self) -> Vec<DeviceId> {
        self.devices.keys().copied().collect()
    }

    pub fn active_name(&self) -> Option<&str> {
        let active = self.active.as_ref()?;
        self.devices
            .get(&active.id)
            .map(|device| device.descriptor.name.as_str())
    }

    /// Processes pending device events, then decodes the active device.
    ///
    /// Returns `None` on the tick a device activates, on the tick the active
    /// device disconnects, and whenever no device is active.
    pub fn read(&mut self) -> Option<Snapshot> {
        let events = match self.backend.as_mut() {
            Some(backend) => backend.drain_events(),
            None => return None,
        };

        let mut suppress = false;
        for event in events {
            suppress |= self.handle_event(event);
        }
        if suppress {
            return None;
        }

        let active = self.active.as_mut()?;
        let device = self.devices.get(&active.id)?;
        let report = self.backend.as_ref()?.report(active.id)?;
        let mut snapshot = device.table.decode(&report);

        active.masked.retain(|button| snapshot.is_pressed(button));
        for button in &active.masked {
            snapshot.set_button(button.as_str(), false);
        }

        Some(snapshot)
    }

    /// Returns true when this tick must not yield a snapshot.
    fn handle_event(&mut self, event: DeviceEvent) -> bool {
        match event {
            DeviceEvent::Connected(descriptor) => {
                self.add_device(descriptor);
                false
            }
            DeviceEvent::Disconnected(id) => self.remove_device(id),
            input => {
                if self.active.is_some() || !input.is_activation(self.activation_deadzone) {
                    return false;
                }
                self.activate(input.device())
            }
        }
    }

    fn add_device(&mut self, descriptor: DeviceDescriptor) {
        if self.devices.contains_key(&descriptor.id) {
            return;
        }
        if !descriptor.is_input_device() {
            warn!(
                "Ignoring non-input device '{}' (id {})",
                descriptor.name, descriptor.id
            );
            return;
        }
        let Some(table) = self.policy.resolve(&descriptor.name, descriptor.layout) else {
            warn!(
                "No mapping table for '{}' (id {}), device ignored",
                descriptor.name, descriptor.id
            );
            return;
        };

        info!(
            "Controller available: '{}' (id {}, {} buttons, {} axes, {} hats)",
            descriptor.name, descriptor.id, descriptor.buttons, descriptor.axes, descriptor.hats
        );
        self.devices
            .insert(descriptor.id, KnownDevice { descriptor, table });
        debug!("Activation state: {}", self.state());
    }

    fn remove_device(&mut self, id: DeviceId) -> bool {
        if let Some(device) = self.devices.remove(&id) {
            info!(
                "Controller '{}' (id {}) disconnected",
                device.descriptor.name, id
            );
        }

        let was_active = self.active.as_ref().is_some_and(|active| active.id == id);
        if was_active {
            self.active = None;
            warn!("Active controller lost, control paused ({})", self.state());
        }
        was_active
    }

    fn activate(&mut self, id: DeviceId) -> bool {
        let Some(device) = self.devices.get(&id) else {
            return false;
        };

        let masked: HashSet<String> = self
            .backend
            .as_ref()
            .and_then(|backend| backend.report(id))
            .map(|report| {
                device
                    .table
                    .decode(&report)
                    .pressed_buttons()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        info!(
            "Controller activated: '{}' (id {})",
            device.descriptor.name, id
        );
        self.active = Some(ActiveDevice { id, masked });
        true
    }
}

impl<B: JoystickBackend> DeviceAdapter for ActivationStateMachine<B> {
    fn poll(&mut self) -> Option<Snapshot> {
        self.read()
    }

    fn is_active(&self) -> bool {
        self.active.is_some()
    }

    fn close(&mut self) {
        self.active = None;
        self.devices.clear();
        if let Some(mut backend) = self.backend.take() {
            info!("Closing joystick backend");
            backend.close();
        }
    }

    fn describe(&self) -> String {
        match self.active_name() {
            Some(name) => format!("joystick '{}'", name),
            None => format!("joystick ({})", self.state()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::generic::UnknownDevicePolicy;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeBackend {
        events: Vec<DeviceEvent>,
        reports: HashMap<DeviceId, JoystickReport>,
        closed: bool,
    }

    impl JoystickBackend for FakeBackend {
        fn drain_events(&mut self) -> Vec<DeviceEvent> {
            std::mem::take(&mut self.events)
        }

        fn report(&self, id: DeviceId) -> Option<JoystickReport> {
            self.reports.get(&id).cloned()
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn pad(id: DeviceId, buttons: usize, axes: usize, hats: usize) -> DeviceDescriptor {
        DeviceDescriptor {
            id,
            name: format!("Pad {}", id),
            buttons,
            axes,
            hats,
            layout: LayoutHint::Standard,
        }
    }

    fn report_with(pressed: &[usize]) -> JoystickReport {
        let mut buttons = vec![false; 11];
        for index in pressed {
            buttons[*index] = true;
        }
        JoystickReport {
            buttons,
            axes: vec![0.0, 0.0, 0.0, 0.0, -1.0, -1.0],
            hats: vec![(0, 0)],
        }
    }

    fn machine() -> ActivationStateMachine<FakeBackend> {
        ActivationStateMachine::new(
            FakeBackend::default(),
            MappingPolicy::default(),
            DEFAULT_ACTIVATION_DEADZONE,
        )
    }

    fn push(machine: &mut ActivationStateMachine<FakeBackend>, event: DeviceEvent) {
        if let Some(backend) = machine.backend.as_mut() {
            backend.events.push(event);
        }
    }

    fn set_report(machine: &mut ActivationStateMachine<FakeBackend>, id: DeviceId, report: JoystickReport) {
        if let Some(backend) = machine.backend.as_mut() {
            backend.reports.insert(id, report);
        }
    }

    #[test]
    fn devices_without_inputs_are_rejected() {
        let mut machine = machine();
        push(&mut machine, DeviceEvent::Connected(pad(0, 0, 0, 0)));
        push(&mut machine, DeviceEvent::Connected(pad(1, 1, 0, 0)));
        assert!(machine.read().is_none());

        assert_eq!(machine.available(), vec![1]);
        assert_eq!(machine.state(), ActivationState::AwaitingActivation);
    }

    #[test]
    fn small_axis_motion_does_not_activate() {
        let mut machine = machine();
        push(&mut machine, DeviceEvent::Connected(pad(0, 11, 6, 1)));
        push(
            &mut machine,
            DeviceEvent::AxisMoved {
                id: 0,
                index: 0,
                value: 0.8,
            },
        );
        push(
            &mut machine,
            DeviceEvent::HatMoved {
                id: 0,
                index: 0,
                x: 0,
                y: 0,
            },
        );
        assert!(machine.read().is_none());
        assert_eq!(machine.state(), ActivationState::AwaitingActivation);

        push(
            &mut machine,
            DeviceEvent::AxisMoved {
                id: 0,
                index: 0,
                value: -0.81,
            },
        );
        set_report(&mut machine, 0, report_with(&[]));
        assert!(machine.read().is_none());
        assert_eq!(machine.state(), ActivationState::Active(0));
    }

    #[test]
    fn activating_press_is_masked_until_released() {
        let mut machine = machine();
        push(&mut machine, DeviceEvent::Connected(pad(0, 11, 6, 1)));
        set_report(&mut machine, 0, report_with(&[0]));
        push(&mut machine, DeviceEvent::ButtonDown { id: 0, index: 0 });

        // activation tick yields nothing
        assert!(machine.read().is_none());
        assert_eq!(machine.state(), ActivationState::Active(0));

        // still held: hidden
        let snapshot = machine.read().unwrap();
        assert!(!snapshot.is_pressed("A"));

        set_report(&mut machine, 0, report_with(&[]));
        assert!(!machine.read().unwrap().is_pressed("A"));

        set_report(&mut machine, 0, report_with(&[0]));
        assert!(machine.read().unwrap().is_pressed("A"));
    }

    #[test]
    fn other_devices_are_ignored_while_one_is_active() {
        let mut machine = machine();
        push(&mut machine, DeviceEvent::Connected(pad(0, 11, 6, 1)));
        push(&mut machine, DeviceEvent::Connected(pad(1, 11, 6, 1)));
        set_report(&mut machine, 0, report_with(&[]));
        set_report(&mut machine, 1, report_with(&[1]));
        push(&mut machine, DeviceEvent::ButtonDown { id: 0, index: 0 });
        assert!(machine.read().is_none());

        push(&mut machine, DeviceEvent::ButtonDown { id: 1, index: 1 });
        let snapshot = machine.read().unwrap();
        assert_eq!(machine.state(), ActivationState::Active(0));
        assert!(!snapshot.is_pressed("B"));
    }

    #[test]
    fn losing_the_active_device_pauses_until_reactivation() {
        let mut machine = machine();
        push(&mut machine, DeviceEvent::Connected(pad(0, 11, 6, 1)));
        push(&mut machine, DeviceEvent::Connected(pad(1, 11, 6, 1)));
        set_report(&mut machine, 0, report_with(&[]));
        set_report(&mut machine, 1, report_with(&[]));
        push(&mut machine, DeviceEvent::ButtonDown { id: 0, index: 0 });
        machine.read();
        assert!(machine.read().is_some());

        push(&mut machine, DeviceEvent::Disconnected(0));
        assert!(machine.read().is_none());
        assert_eq!(machine.state(), ActivationState::AwaitingActivation);
        assert!(machine.read().is_none());

        push(
            &mut machine,
            DeviceEvent::HatMoved {
                id: 1,
                index: 0,
                x: 0,
                y: 1,
            },
        );
        assert!(machine.read().is_none());
        assert_eq!(machine.state(), ActivationState::Active(1));

        push(&mut machine, DeviceEvent::Disconnected(1));
        assert!(machine.read().is_none());
        assert_eq!(machine.state(), ActivationState::NoDevice);
    }

    #[test]
    fn rejected_family_never_becomes_available() {
        let policy = MappingPolicy {
            unknown_device: UnknownDevicePolicy::Reject,
            ..MappingPolicy::default()
        };
        let mut machine =
            ActivationStateMachine::new(FakeBackend::default(), policy, DEFAULT_ACTIVATION_DEADZONE);
        let mut unknown = pad(0, 11, 6, 1);
        unknown.layout = LayoutHint::Native;
        push(&mut machine, DeviceEvent::Connected(unknown));
        push(&mut machine, DeviceEvent::ButtonDown { id: 0, index: 0 });
        assert!(machine.read().is_none());
        assert_eq!(machine.state(), ActivationState::NoDevice);
    }

    #[test]
    fn close_releases_backend() {
        let mut machine = machine();
        push(&mut machine, DeviceEvent::Connected(pad(0, 11, 6, 1)));
        machine.read();
        machine.close();
        assert!(machine.backend.is_none());
        assert!(machine.read().is_none());
        assert_eq!(machine.state(), ActivationState::NoDevice);
    }
}
