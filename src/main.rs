use color_eyre::{eyre::eyre, Result};
use padmapper::config::{AppConfig, DeviceConfig, GenericDeviceConfig, HidConfig};
use padmapper::controller::activation::ActivationStateMachine;
use padmapper::controller::gilrs_backend::GilrsBackend;
use padmapper::controller::hid::HidAdapter;
use padmapper::controller::hidapi_source::HidapiSource;
use padmapper::controller::DeviceAdapter;
use padmapper::engine::MappingEngine;
use padmapper::mapping::pipeline::ActionPipeline;
use padmapper::mapping::sink::{ChannelSink, OutputCommand, TracingSink};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const OUTPUT_QUEUE: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())
        .map_err(|e| eyre!("Failed to load mapping config: {}", e))?;

    let adapter = open_adapter(&config.device)?;
    let pipeline = ActionPipeline::from_configs(&config.effective_actions());

    let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE);
    let injector = tokio::spawn(run_injector(output_rx));

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        signal_token.cancel();
    });

    let engine = MappingEngine::create(
        adapter,
        pipeline,
        Box::new(ChannelSink::new(output_tx)),
        config.engine.clone(),
    )
    .start();

    // gilrs handles are not Send, so the engine runs on the main task
    let stopped = engine.run_until_cancelled(token).await;
    stopped.log_summary();

    // dropping the engine closes the output channel
    drop(stopped);
    if let Err(e) = injector.await {
        warn!("Injector task ended abnormally: {}", e);
    }

    Ok(())
}

fn open_adapter(device: &DeviceConfig) -> Result<Box<dyn DeviceAdapter>> {
    match device {
        DeviceConfig::Gilrs(generic) => open_gilrs(generic),
        DeviceConfig::Hid(hid) => open_hid(hid),
    }
}

fn open_gilrs(generic: &GenericDeviceConfig) -> Result<Box<dyn DeviceAdapter>> {
    info!(
        "Opening gilrs backend (family {:?}, unknown devices {:?})",
        generic.family, generic.unknown_device
    );
    let backend =
        GilrsBackend::create().map_err(|e| eyre!("Failed to open gilrs backend: {}", e))?;
    Ok(Box::new(ActivationStateMachine::new(
        backend,
        generic.policy(),
        generic.activation_deadzone,
    )))
}

fn open_hid(hid: &HidConfig) -> Result<Box<dyn DeviceAdapter>> {
    let source = match &hid.path {
        Some(path) => HidapiSource::open_path(path),
        None => HidapiSource::open(hid.vendor_id, hid.product_id),
    }
    .map_err(|e| eyre!("Failed to open HID device: {}", e))?;

    Ok(Box::new(HidAdapter::new(
        source,
        Duration::from_millis(hid.read_timeout_ms),
    )))
}

/// Stand-in injector: applies every forwarded command to a logging sink.
async fn run_injector(mut commands: mpsc::Receiver<OutputCommand>) {
    let mut sink = TracingSink::new();
    while let Some(command) = commands.recv().await {
        if let Err(e) = command.apply_to(&mut sink) {
            warn!("Injector failed on {}: {}", command, e);
        }
    }
    info!("Injector stopped after {} commands", sink.delivered());
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
