use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use evdev_rs::enums::EV_ABS;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use dialpadd::config::{self, ConfigStore};
use dialpadd::controller::DialpadController;
use dialpadd::dialpad::{Dialpad, track_modifiers};
use dialpadd::geometry::TouchpadGeometry;
use dialpadd::gesture::Classifier;
use dialpadd::input_devices::{EvdevReader, discover, event_path};
use dialpadd::keymap::{KeyMapHandle, KeymapUpdater};
use dialpadd::layout::LayoutModel;
use dialpadd::layout_watcher;
use dialpadd::session::{DesktopSession, PassthroughChain, SessionKind};
use dialpadd::shortcut::{ActiveModifiers, ShortcutResolver};
use dialpadd::shutdown::{self, Shutdown};
use dialpadd::touchpad_bus::I2cTouchpad;
use dialpadd::virtual_device::{VirtualKeyboard, device_name};

/// Turn the circle printed on an ASUS touchpad into a jog dial
///
/// Holding the top-right icon toggles the dial-pad. While enabled, sliding
/// around the circle and tapping its center send the shortcuts configured for
/// the focused application.
#[derive(Debug, Clone, clap::Parser)]
struct Args {
    /// Built-in touchpad layout (see `--list-layouts`)
    #[arg(required_unless_present = "list_layouts")]
    layout: Option<String>,
    /// Directory holding the `dialpad_dev` settings file
    #[arg(default_value = "./")]
    config_dir: PathBuf,
    /// Print the built-in layouts and exit
    #[arg(long)]
    list_layouts: bool,
}

const DISCOVERY_TRIES: u32 = 5;
const DISCOVERY_DELAY: Duration = Duration::from_millis(100);
const IDLE_CHECK_PERIOD: Duration = Duration::from_secs(1);
/// How long device creation waits for the first keyboard layout.
const FIRST_LAYOUT_TIMEOUT: Duration = Duration::from_secs(2);
/// External editors may still be writing when the watcher fires.
const RELOAD_DELAY: Duration = Duration::from_millis(100);

fn init_logging() {
    let filter = EnvFilter::try_from_env("LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    if args.list_layouts {
        for name in LayoutModel::names() {
            println!("{name}");
        }
        return Ok(());
    }
    let layout_name = args.layout.context("no layout given")?;
    let layout = LayoutModel::builtin(&layout_name)?;
    info!("Using layout {:?}", layout.name);

    let mut session = DesktopSession::connect()?;

    let devices = tokio::task::spawn_blocking(|| discover(DISCOVERY_TRIES, DISCOVERY_DELAY))
        .await??;
    let touchpad_info = devices.touchpad;
    info!(
        "Touchpad {:?} on event{}, i2c-{} @ {:#04x}",
        touchpad_info.name, touchpad_info.event_node, touchpad_info.i2c_bus, touchpad_info.i2c_address
    );

    let bus = I2cTouchpad::open(touchpad_info.i2c_bus, touchpad_info.i2c_address)?;
    let mut touchpad = EvdevReader::open(event_path(touchpad_info.event_node))?;
    let max_x = touchpad
        .abs_max(EV_ABS::ABS_X)
        .context("touchpad reports no ABS_X range")?;
    debug!("Touchpad max x {max_x}");

    let config = ConfigStore::new(&args.config_dir);
    let config_path = config.path().to_path_buf();
    let controller = Arc::new(DialpadController::new(Arc::new(bus), config));

    let geometry = TouchpadGeometry::from_layout(&layout, max_x, controller.tunables().slice_count)?;
    let table = Arc::new(layout.shortcuts);

    // virtual device and keymap
    let keyboard = Arc::new(Mutex::new(VirtualKeyboard::new(
        device_name(&touchpad_info.name),
        table.key_codes(),
    )));
    let keymap = KeyMapHandle::default();
    let mut updater = KeymapUpdater::new(keymap.clone(), keyboard.clone(), table.symbols());
    let first_layout = updater.first_load();

    let (trigger, shutdown) = shutdown::channel();
    spawn_layout_watcher(&mut session, updater, shutdown.clone())?;

    if tokio::time::timeout(FIRST_LAYOUT_TIMEOUT, first_layout)
        .await
        .is_err()
    {
        warn!("No keyboard layout yet, symbol shortcuts stay unresolved until one arrives");
    }
    {
        let keyboard = keyboard.clone();
        tokio::task::spawn_blocking(move || {
            let mut keyboard = keyboard
                .lock()
                .map_err(|_| anyhow!("virtual device lock poisoned"))?;
            keyboard.create()
        })
        .await??;
    }

    {
        let controller = controller.clone();
        tokio::task::spawn_blocking(move || controller.startup()).await?;
    }

    // keyboard modifiers
    let modifiers = ActiveModifiers::new(table.modifiers());
    match devices.keyboard {
        Some(info) => {
            let mut reader = EvdevReader::open(event_path(info.event_node))?;
            let modifiers = modifiers.clone();
            info!("Tracking modifiers on {:?}", info.name);
            thread::Builder::new()
                .name("keyboard".into())
                .spawn(move || {
                    if let Err(e) = track_modifiers(&mut reader, &modifiers) {
                        error!("Keyboard listener stopped: {e:#}");
                    }
                })
                .context("failed to spawn keyboard thread")?;
        }
        None => warn!("No keyboard found, modifier shortcuts will never match"),
    }

    let idle = tokio::spawn(idle_timer(controller.clone(), shutdown.clone()));

    let (_config_watcher, mut config_changes) = {
        let controller = controller.clone();
        config::watch(&config_path, move || controller.is_writing())?
    };
    info!("Watching {config_path:?} for changes");
    let reloads = {
        let controller = controller.clone();
        let mut shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    change = config_changes.recv() => if change.is_none() { break },
                    _ = shutdown.wait() => break,
                }
                info!("Detected external change of config file, loading changes");
                tokio::time::sleep(RELOAD_DELAY).await;
                let controller = controller.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || controller.reload_from_disk()).await {
                    error!("Config reload panicked: {e}");
                }
            }
        })
    };

    // touchpad
    let resolver = ShortcutResolver::new(table.clone(), session.window_titles(), keymap);
    let passthrough = Box::new(PassthroughChain::new(
        touchpad_info.name.clone(),
        touchpad_info.event_node,
    ));
    let mut dialpad = Dialpad::new(
        Classifier::new(geometry),
        controller.clone(),
        resolver,
        keyboard,
        modifiers,
        passthrough,
    );
    let (touch_done, touch_stopped) = oneshot::channel();
    thread::Builder::new()
        .name("touchpad".into())
        .spawn(move || {
            info!("Listening to touchpad events...");
            let _ = touch_done.send(dialpad.run(&mut touchpad));
        })
        .context("failed to spawn touchpad thread")?;

    tokio::select! {
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => info!("Interrupted, shutting down"),
            Err(e) => error!("Failed to listen for interrupt: {e}"),
        },
        res = touch_stopped => match res {
            Ok(Err(e)) => error!("Touchpad listener stopped: {e:#}"),
            Ok(Ok(())) => info!("Touchpad listener finished"),
            Err(_) => error!("Touchpad listener panicked"),
        },
    }

    info!("Clean up started");
    tokio::task::spawn_blocking(move || controller.shutdown()).await?;
    trigger.trigger();
    let _ = tokio::join!(idle, reloads);
    info!("Clean up finished");
    Ok(())
}

fn spawn_layout_watcher(
    session: &mut DesktopSession,
    updater: KeymapUpdater,
    shutdown: Shutdown,
) -> Result<()> {
    if session.kind() == SessionKind::X11 {
        tokio::spawn(layout_watcher::poll_x11(updater, shutdown));
        return Ok(());
    }
    let conn = session
        .take_wayland()
        .context("Wayland session without a connection")?;
    thread::Builder::new()
        .name("layout-watcher".into())
        .spawn(move || {
            if let Err(e) = layout_watcher::run_wayland(conn, updater, shutdown) {
                warn!("Keyboard layout watcher stopped: {e:#}");
            }
        })
        .context("failed to spawn layout watcher thread")?;
    Ok(())
}

async fn idle_timer(controller: Arc<DialpadController>, mut shutdown: Shutdown) {
    let mut interval = tokio::time::interval(IDLE_CHECK_PERIOD);
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.wait() => break,
        }
        let controller = controller.clone();
        let now = Instant::now();
        match tokio::task::spawn_blocking(move || controller.check_idle(now)).await {
            Ok(true) => debug!("Dial-pad disabled due to inactivity"),
            Ok(false) => {}
            Err(e) => error!("Idle check panicked: {e}"),
        }
    }
}
