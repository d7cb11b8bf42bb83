//! Drives the whole tick path: scripted joystick backend, activation,
//! table decode, action pipeline and a recording sink.

use padmapper::controller::activation::{
    ActivationState, ActivationStateMachine, DeviceDescriptor, DeviceEvent, DeviceId,
    JoystickBackend, DEFAULT_ACTIVATION_DEADZONE,
};
use gilrs::Button;
use padmapper::controller::generic::{
    FamilySelection, JoystickReport, LayoutHint, MappingPolicy, UnknownDevicePolicy,
};
use padmapper::controller::gilrs_backend::standard_report;
use padmapper::controller::snapshot::AnalogChannel;
use padmapper::controller::DeviceAdapter;
use padmapper::engine::{EngineSettings, MappingEngine, TickOutcome};
use padmapper::mapping::action::ActionConfig;
use padmapper::mapping::keys::MouseButton;
use padmapper::mapping::pipeline::ActionPipeline;
use padmapper::mapping::sink::{OutputCommand, RecordingSink};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const BUTTON_A: usize = 0;
const BUTTON_B: usize = 1;
const AXIS_RT: usize = 5;

#[derive(Default)]
struct Script {
    events: Vec<DeviceEvent>,
    reports: HashMap<DeviceId, JoystickReport>,
    closed: bool,
}

/// Backend whose state the test keeps editing after the engine owns it
#[derive(Clone, Default)]
struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    fn push(&self, event: DeviceEvent) {
        self.script.lock().unwrap().events.push(event);
    }

    fn set_report(&self, id: DeviceId, report: JoystickReport) {
        self.script.lock().unwrap().reports.insert(id, report);
    }

    fn unplug(&self, id: DeviceId) {
        let mut script = self.script.lock().unwrap();
        script.reports.remove(&id);
        script.events.push(DeviceEvent::Disconnected(id));
    }

    fn is_closed(&self) -> bool {
        self.script.lock().unwrap().closed
    }
}

impl JoystickBackend for ScriptedBackend {
    fn drain_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.script.lock().unwrap().events)
    }

    fn report(&self, id: DeviceId) -> Option<JoystickReport> {
        self.script.lock().unwrap().reports.get(&id).cloned()
    }

    fn close(&mut self) {
        self.script.lock().unwrap().closed = true;
    }
}

fn standard_pad(id: DeviceId) -> DeviceDescriptor {
    DeviceDescriptor {
        id,
        name: "Test Pad".to_string(),
        buttons: 11,
        axes: 6,
        hats: 1,
        layout: LayoutHint::Standard,
    }
}

fn idle_report() -> JoystickReport {
    JoystickReport {
        buttons: vec![false; 11],
        axes: vec![0.0, 0.0, 0.0, 0.0, -1.0, -1.0],
        hats: vec![(0, 0)],
    }
}

fn report_with(pressed: &[usize]) -> JoystickReport {
    let mut report = idle_report();
    for index in pressed {
        report.buttons[*index] = true;
    }
    report
}

fn engine_with(
    backend: &ScriptedBackend,
    actions: &[ActionConfig],
    sink: &RecordingSink,
) -> MappingEngine<padmapper::engine::Running> {
    let adapter = ActivationStateMachine::new(
        backend.clone(),
        MappingPolicy::default(),
        DEFAULT_ACTIVATION_DEADZONE,
    );
    MappingEngine::create(
        Box::new(adapter),
        ActionPipeline::from_configs(actions),
        Box::new(sink.clone()),
        EngineSettings::default(),
    )
    .start()
}

/// Connects pad 0 and activates it with a press of B that is then released.
fn activate(
    engine: &mut MappingEngine<padmapper::engine::Running>,
    backend: &ScriptedBackend,
    now: Instant,
) {
    backend.push(DeviceEvent::Connected(standard_pad(0)));
    backend.set_report(0, report_with(&[BUTTON_B]));
    backend.push(DeviceEvent::ButtonDown {
        id: 0,
        index: BUTTON_B,
    });
    assert_eq!(engine.tick(now), TickOutcome::NoData);

    backend.set_report(0, idle_report());
    assert_eq!(engine.tick(now), TickOutcome::Mapped);
}

fn left_click() -> ActionConfig {
    ActionConfig::Click {
        button: "A".to_string(),
        mouse_button: MouseButton::Left,
    }
}

#[test]
fn activating_press_is_masked_until_released() {
    let backend = ScriptedBackend::default();
    let sink = RecordingSink::new();
    let mut engine = engine_with(&backend, &[left_click()], &sink);
    let t0 = Instant::now();

    assert_eq!(engine.tick(t0), TickOutcome::Inactive);

    backend.push(DeviceEvent::Connected(standard_pad(0)));
    backend.set_report(0, report_with(&[BUTTON_A]));
    backend.push(DeviceEvent::ButtonDown {
        id: 0,
        index: BUTTON_A,
    });
    // activation tick yields nothing
    assert_eq!(engine.tick(t0), TickOutcome::NoData);

    // still held: masked, no click
    assert_eq!(engine.tick(t0 + Duration::from_millis(10)), TickOutcome::Mapped);
    assert!(sink.commands().is_empty());

    backend.set_report(0, idle_report());
    engine.tick(t0 + Duration::from_millis(20));
    assert!(sink.commands().is_empty());

    backend.set_report(0, report_with(&[BUTTON_A]));
    engine.tick(t0 + Duration::from_millis(30));
    backend.set_report(0, idle_report());
    engine.tick(t0 + Duration::from_millis(40));

    assert_eq!(
        sink.commands(),
        vec![
            OutputCommand::Press(MouseButton::Left),
            OutputCommand::Release(MouseButton::Left),
        ]
    );
}

#[test]
fn held_trigger_scrolls_with_repeat_timing() {
    let backend = ScriptedBackend::default();
    let sink = RecordingSink::new();
    let actions = [ActionConfig::AnalogScroll {
        axis: AnalogChannel::Rt,
        threshold: 0.01,
        scroll_speed: 15.0,
        initial_delay: 0.3,
        repeat_rate: 0.05,
    }];
    let mut engine = engine_with(&backend, &actions, &sink);
    let start = Instant::now();
    activate(&mut engine, &backend, start);

    // rt axis at 0.0 decodes to a half pull
    let mut pulled = idle_report();
    pulled.axes[AXIS_RT] = 0.0;
    backend.set_report(0, pulled);

    let t0 = start + Duration::from_secs(1);
    for step in 0..4 {
        engine.tick(t0 + Duration::from_millis(100 * step));
    }
    backend.set_report(0, idle_report());
    engine.tick(t0 + Duration::from_millis(400));
    engine.tick(t0 + Duration::from_millis(500));

    assert_eq!(sink.scrolls(), vec![15.0, 15.0]);
}

#[test]
fn disconnect_releases_held_click_and_pauses() {
    let backend = ScriptedBackend::default();
    let sink = RecordingSink::new();
    let mut engine = engine_with(&backend, &[left_click()], &sink);
    let t0 = Instant::now();
    activate(&mut engine, &backend, t0);

    backend.set_report(0, report_with(&[BUTTON_A]));
    engine.tick(t0 + Duration::from_millis(10));
    assert_eq!(sink.take(), vec![OutputCommand::Press(MouseButton::Left)]);

    backend.unplug(0);
    assert_eq!(
        engine.tick(t0 + Duration::from_millis(20)),
        TickOutcome::Inactive
    );
    assert_eq!(sink.take(), vec![OutputCommand::Release(MouseButton::Left)]);

    // nothing else is released on later idle ticks
    assert_eq!(
        engine.tick(t0 + Duration::from_millis(30)),
        TickOutcome::Inactive
    );
    assert!(sink.commands().is_empty());
}

#[test]
fn stop_releases_and_closes_backend() {
    let backend = ScriptedBackend::default();
    let sink = RecordingSink::new();
    let mut engine = engine_with(&backend, &[left_click()], &sink);
    let t0 = Instant::now();
    activate(&mut engine, &backend, t0);

    backend.set_report(0, report_with(&[BUTTON_A]));
    engine.tick(t0 + Duration::from_millis(10));

    let stopped = engine.stop();
    stopped.log_summary();

    assert_eq!(
        sink.commands(),
        vec![
            OutputCommand::Press(MouseButton::Left),
            OutputCommand::Release(MouseButton::Left),
        ]
    );
    assert!(backend.is_closed());
    assert_eq!(stopped.stats().total.ticks, 3);
}

#[test]
fn device_without_inputs_is_never_available() {
    let backend = ScriptedBackend::default();
    let mut machine = ActivationStateMachine::new(
        backend.clone(),
        MappingPolicy::default(),
        DEFAULT_ACTIVATION_DEADZONE,
    );

    backend.push(DeviceEvent::Connected(DeviceDescriptor {
        id: 4,
        name: "Virtual Keyboard Bridge".to_string(),
        buttons: 0,
        axes: 0,
        hats: 0,
        layout: LayoutHint::Native,
    }));
    backend.push(DeviceEvent::ButtonDown { id: 4, index: 0 });

    assert!(machine.poll().is_none());
    assert!(machine.available().is_empty());
    assert_eq!(machine.state(), ActivationState::NoDevice);
}

#[test]
fn single_button_device_can_activate() {
    let backend = ScriptedBackend::default();
    let mut machine = ActivationStateMachine::new(
        backend.clone(),
        MappingPolicy::default(),
        DEFAULT_ACTIVATION_DEADZONE,
    );

    backend.push(DeviceEvent::Connected(DeviceDescriptor {
        id: 2,
        name: "Foot Pedal".to_string(),
        buttons: 1,
        axes: 0,
        hats: 0,
        layout: LayoutHint::Native,
    }));
    assert!(machine.poll().is_none());
    assert_eq!(machine.available(), vec![2]);
    assert_eq!(machine.state(), ActivationState::AwaitingActivation);

    backend.set_report(
        2,
        JoystickReport {
            buttons: vec![true],
            axes: vec![],
            hats: vec![],
        },
    );
    backend.push(DeviceEvent::ButtonDown { id: 2, index: 0 });
    assert!(machine.poll().is_none());
    assert_eq!(machine.state(), ActivationState::Active(2));
    assert_eq!(machine.active_name(), Some("Foot Pedal"));

    // DEFAULT table maps index 0 to A; still masked while held
    let snapshot = machine.poll().unwrap();
    assert!(!snapshot.is_pressed("A"));
}

#[test]
fn second_pad_is_ignored_while_first_is_active() {
    let backend = ScriptedBackend::default();
    let sink = RecordingSink::new();
    let mut engine = engine_with(&backend, &[left_click()], &sink);
    let t0 = Instant::now();
    activate(&mut engine, &backend, t0);

    backend.push(DeviceEvent::Connected(standard_pad(1)));
    backend.set_report(1, report_with(&[BUTTON_A]));
    backend.push(DeviceEvent::ButtonDown {
        id: 1,
        index: BUTTON_A,
    });
    engine.tick(t0 + Duration::from_millis(10));
    engine.tick(t0 + Duration::from_millis(20));

    assert!(sink.commands().is_empty());
}

#[test]
fn unknown_native_device_follows_policy() {
    let mystery = DeviceDescriptor {
        id: 7,
        name: "Mystery Stick".to_string(),
        buttons: 8,
        axes: 2,
        hats: 0,
        layout: LayoutHint::Native,
    };

    let backend = ScriptedBackend::default();
    let mut rejecting = ActivationStateMachine::new(
        backend.clone(),
        MappingPolicy {
            family: FamilySelection::Auto,
            unknown_device: UnknownDevicePolicy::Reject,
            custom: None,
        },
        DEFAULT_ACTIVATION_DEADZONE,
    );
    backend.push(DeviceEvent::Connected(mystery.clone()));
    rejecting.poll();
    assert!(rejecting.available().is_empty());

    let backend = ScriptedBackend::default();
    let mut fallback = ActivationStateMachine::new(
        backend.clone(),
        MappingPolicy::default(),
        DEFAULT_ACTIVATION_DEADZONE,
    );
    backend.push(DeviceEvent::Connected(mystery));
    fallback.poll();
    assert_eq!(fallback.available(), vec![7]);
}

#[test]
fn xbox_pad_from_gilrs_keeps_standard_order() {
    let backend = ScriptedBackend::default();
    // a forced family must not reinterpret gilrs' standard indices
    let mut machine = ActivationStateMachine::new(
        backend.clone(),
        MappingPolicy {
            family: FamilySelection::Microsoft,
            ..MappingPolicy::default()
        },
        DEFAULT_ACTIVATION_DEADZONE,
    );
    backend.push(DeviceEvent::Connected(DeviceDescriptor {
        id: 0,
        name: "Xbox Wireless Controller".to_string(),
        buttons: 11,
        axes: 6,
        hats: 1,
        layout: LayoutHint::Standard,
    }));
    backend.set_report(0, standard_report(&[], [0.0; 4], (0.0, 0.0), (0, 0)));
    backend.push(DeviceEvent::AxisMoved {
        id: 0,
        index: 0,
        value: 0.95,
    });
    assert!(machine.poll().is_none());

    // Select sits at standard index 8 and the right stick's X at axis 2
    backend.set_report(
        0,
        standard_report(&[Button::Select], [0.0, 0.0, 0.7, 0.0], (0.0, 0.0), (0, 0)),
    );
    let snapshot = machine.poll().unwrap();
    assert!(snapshot.is_pressed("MENU"));
    assert!(!snapshot.is_pressed("LS"));
    assert_eq!(snapshot.rx, f64::from(0.7f32));
    assert_eq!(snapshot.ry, 0.0);
    assert_eq!(snapshot.lt, 0.0);
}
