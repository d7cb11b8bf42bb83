use crate::controller::activation::{DeviceDescriptor, DeviceEvent, DeviceId, JoystickBackend};
use crate::controller::error::DeviceError;
use crate::controller::generic::{JoystickReport, LayoutHint};
use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs, MappingSource};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, error, info};

/// Button indices of the standard layout, in DEFAULT-table order
pub const STANDARD_BUTTONS: [Button; 11] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::Select,
    Button::Start,
    Button::LeftThumb,
    Button::RightThumb,
    Button::Mode,
];

const STICK_AXES: [Axis; 4] = [
    Axis::LeftStickX,
    Axis::LeftStickY,
    Axis::RightStickX,
    Axis::RightStickY,
];

const LT_AXIS: usize = 4;
const RT_AXIS: usize = 5;
const AXIS_COUNT: usize = 6;

// gilrs reports up-positive; the index layout is down-positive like SDL
fn stick_index(axis: Axis) -> Option<(usize, f64)> {
    match axis {
        Axis::LeftStickX => Some((0, 1.0)),
        Axis::LeftStickY => Some((1, -1.0)),
        Axis::RightStickX => Some((2, 1.0)),
        Axis::RightStickY => Some((3, -1.0)),
        _ => None,
    }
}

fn trigger_index(button: Button) -> Option<usize> {
    match button {
        Button::LeftTrigger2 => Some(LT_AXIS),
        Button::RightTrigger2 => Some(RT_AXIS),
        _ => None,
    }
}

fn is_dpad(button: Button) -> bool {
    matches!(
        button,
        Button::DPadUp | Button::DPadDown | Button::DPadLeft | Button::DPadRight
    )
}

/// Trigger pull in [0, 1] as a rest-at-minus-one axis
fn trigger_axis(pull: f32) -> f64 {
    f64::from(pull) * 2.0 - 1.0
}

fn trigger_pull(gamepad: &Gamepad<'_>, button: Button) -> f32 {
    gamepad
        .button_data(button)
        .map(|data| data.value())
        .unwrap_or(0.0)
}

fn dpad_vector(gamepad: &Gamepad<'_>) -> (i8, i8) {
    let pressed = |button| i8::from(gamepad.is_pressed(button));
    let mut x = pressed(Button::DPadRight) - pressed(Button::DPadLeft);
    let mut y = pressed(Button::DPadUp) - pressed(Button::DPadDown);

    // Some drivers expose the d-pad as a pair of axes instead
    if x == 0 {
        x = axis_direction(gamepad.value(Axis::DPadX));
    }
    if y == 0 {
        y = axis_direction(gamepad.value(Axis::DPadY));
    }
    (x, y)
}

fn axis_direction(value: f32) -> i8 {
    if value > 0.5 {
        1
    } else if value < -0.5 {
        -1
    } else {
        0
    }
}

fn describe(id: DeviceId, gamepad: &Gamepad<'_>) -> DeviceDescriptor {
    let buttons = STANDARD_BUTTONS
        .iter()
        .filter(|button| gamepad.button_code(**button).is_some())
        .count();
    let sticks = STICK_AXES
        .iter()
        .filter(|axis| gamepad.axis_code(**axis).is_some())
        .count();
    let triggers = [Button::LeftTrigger2, Button::RightTrigger2]
        .iter()
        .filter(|button| gamepad.button_code(**button).is_some())
        .count();
    let has_dpad = [Button::DPadUp, Button::DPadDown, Button::DPadLeft, Button::DPadRight]
        .iter()
        .any(|button| gamepad.button_code(*button).is_some())
        || gamepad.axis_code(Axis::DPadX).is_some();

    // Without an SDL mapping gilrs still names buttons from the evdev codes,
    // so reports keep the standard order either way
    if gamepad.mapping_source() == MappingSource::None {
        debug!("'{}' has no SDL mapping, using driver button names", gamepad.name());
    }

    DeviceDescriptor {
        id,
        name: gamepad.name().to_string(),
        buttons,
        axes: sticks + triggers,
        hats: usize::from(has_dpad),
        layout: LayoutHint::Standard,
    }
}

/// Builds a report in the standard layout.
///
/// `pressed` lists held buttons, `sticks` holds gilrs stick values in
/// [`STICK_AXES`] order (up-positive), `triggers` the LT/RT pull in [0, 1]
/// and `dpad` the up-positive d-pad vector.
pub fn standard_report(
    pressed: &[Button],
    sticks: [f32; 4],
    triggers: (f32, f32),
    dpad: (i8, i8),
) -> JoystickReport {
    let buttons = STANDARD_BUTTONS
        .iter()
        .map(|button| pressed.contains(button))
        .collect();

    let mut axes = vec![0.0; AXIS_COUNT];
    for (axis, value) in STICK_AXES.iter().zip(sticks) {
        if let Some((index, sign)) = stick_index(*axis) {
            axes[index] = f64::from(value) * sign;
        }
    }
    axes[LT_AXIS] = trigger_axis(triggers.0);
    axes[RT_AXIS] = trigger_axis(triggers.1);

    JoystickReport {
        buttons,
        axes,
        hats: vec![dpad],
    }
}

/// Joystick backend over `gilrs`, exposing its standard gamepad layout as
/// index-addressable reports
pub struct GilrsBackend {
    gilrs: Gilrs,
    devices: BTreeMap<DeviceId, GamepadId>,
    pending: VecDeque<DeviceEvent>,
}

impl GilrsBackend {
    pub fn create() -> Result<Self, DeviceError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(DeviceError::Backend(e.to_string()));
            }
        };

        let mut backend = Self {
            gilrs,
            devices: BTreeMap::new(),
            pending: VecDeque::new(),
        };

        // Gamepads present before startup never produce a Connected event
        let present: Vec<GamepadId> = backend
            .gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, _)| id)
            .collect();
        info!("Found {} connected gamepads", present.len());
        for gamepad_id in present {
            if let Some(event) = backend.connect(gamepad_id) {
                backend.pending.push_back(event);
            }
        }

        Ok(backend)
    }

    fn connect(&mut self, gamepad_id: GamepadId) -> Option<DeviceEvent> {
        let id: DeviceId = gamepad_id.into();
        let gamepad = self.gilrs.connected_gamepad(gamepad_id)?;
        let descriptor = describe(id, &gamepad);
        debug!("gilrs gamepad {:?} -> device {:?}", gamepad_id, descriptor);
        self.devices.insert(id, gamepad_id);
        Some(DeviceEvent::Connected(descriptor))
    }

    fn convert(&mut self, gamepad_id: GamepadId, event: EventType) -> Option<DeviceEvent> {
        let id: DeviceId = gamepad_id.into();
        match event {
            EventType::Connected => self.connect(gamepad_id),
            EventType::Disconnected => {
                self.devices.remove(&id);
                Some(DeviceEvent::Disconnected(id))
            }
            EventType::ButtonPressed(button, _) if is_dpad(button) => self.hat_event(gamepad_id),
            EventType::ButtonPressed(button, _) => STANDARD_BUTTONS
                .iter()
                .position(|candidate| *candidate == button)
                .map(|index| DeviceEvent::ButtonDown { id, index }),
            EventType::ButtonChanged(button, value, _) => {
                trigger_index(button).map(|index| DeviceEvent::AxisMoved {
                    id,
                    index,
                    value: trigger_axis(value),
                })
            }
            EventType::AxisChanged(Axis::DPadX | Axis::DPadY, _, _) => self.hat_event(gamepad_id),
            EventType::AxisChanged(axis, value, _) => {
                stick_index(axis).map(|(index, sign)| DeviceEvent::AxisMoved {
                    id,
                    index,
                    value: f64::from(value) * sign,
                })
            }
            _ => None,
        }
    }

    fn hat_event(&self, gamepad_id: GamepadId) -> Option<DeviceEvent> {
        let gamepad = self.gilrs.connected_gamepad(gamepad_id)?;
        let (x, y) = dpad_vector(&gamepad);
        Some(DeviceEvent::HatMoved {
            id: gamepad_id.into(),
            index: 0,
            x,
            y,
        })
    }
}

impl JoystickBackend for GilrsBackend {
    fn drain_events(&mut self) -> Vec<DeviceEvent> {
        let mut events: Vec<DeviceEvent> = self.pending.drain(..).collect();
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            if let Some(converted) = self.convert(id, event) {
                events.push(converted);
            }
        }
        events
    }

    fn report(&self, id: DeviceId) -> Option<JoystickReport> {
        let gamepad_id = self.devices.get(&id)?;
        let gamepad = self.gilrs.connected_gamepad(*gamepad_id)?;

        let pressed: Vec<Button> = STANDARD_BUTTONS
            .iter()
            .copied()
            .filter(|button| gamepad.is_pressed(*button))
            .collect();
        let sticks = STICK_AXES.map(|axis| gamepad.value(axis));
        let triggers = (
            trigger_pull(&gamepad, Button::LeftTrigger2),
            trigger_pull(&gamepad, Button::RightTrigger2),
        );

        Some(standard_report(
            &pressed,
            sticks,
            triggers,
            dpad_vector(&gamepad),
        ))
    }

    fn close(&mut self) {
        info!("Releasing {} gilrs gamepads", self.devices.len());
        self.devices.clear();
        self.pending.clear();
    }
}
