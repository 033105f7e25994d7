use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::info;
use tokio::sync::broadcast;

use ghostamp::config::{sanitize_config, Config};
use ghostamp::playlist_loader::PlaylistLoader;
use ghostamp::protocol::{ConfigMessage, GuiMessage, Message};
use ghostamp::relay_client::{RelayClient, TokenSource};
use ghostamp::remote::{BridgeEngine, EngineFactory, PlayerEngine, RemoteController, WebApiClient};
use ghostamp::session::SessionManager;
use ghostamp::shell_bridge::ShellBridge;
use ghostamp::sync_controller::SyncController;

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    let config_dir = dirs::config_dir().ok_or("could not determine user config directory")?;
    let config_file = config_dir.join("ghostamp.toml");

    if !config_file.exists() {
        let default_config = Config::default();
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        std::fs::write(&config_file, toml::to_string(&default_config)?)?;
    }

    let config_content = std::fs::read_to_string(&config_file)?;
    Ok(sanitize_config(
        toml::from_str::<Config>(&config_content).unwrap_or_default(),
    ))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config = load_config()?;

    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);

    let relay = Arc::new(RelayClient::new(&config.relay));
    let token_source: Arc<dyn TokenSource> = Arc::clone(&relay) as Arc<dyn TokenSource>;
    let remote_controller: Arc<dyn RemoteController> = Arc::new(WebApiClient::new(
        &config.remote.api_base_url,
        Arc::clone(&token_source),
    ));

    let engine_factory: EngineFactory = {
        let bridge_base_url = config.remote.bridge_base_url.clone();
        let device_name = config.remote.device_name.clone();
        Box::new(move || {
            Box::new(BridgeEngine::new(&bridge_base_url, &device_name)) as Box<dyn PlayerEngine>
        })
    };
    let session = Arc::new(SessionManager::new(
        engine_factory,
        token_source,
        Arc::clone(&remote_controller),
        bus_sender.clone(),
        Duration::from_millis(config.remote.init_timeout_ms),
    ));

    // Session event pump: forwards engine events while no initialization
    // holds the engine.
    let session_pump = Arc::clone(&session);
    let mut session_bus_receiver = bus_sender.subscribe();
    thread::spawn(move || loop {
        loop {
            match session_bus_receiver.try_recv() {
                Ok(Message::Gui(GuiMessage::WindowClosed)) => return,
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => break,
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(broadcast::error::TryRecvError::Closed) => return,
            }
        }
        session_pump.pump_engine_events();
        thread::sleep(Duration::from_millis(50));
    });

    // Setup sync controller
    let controller_bus_receiver = bus_sender.subscribe();
    let controller_bus_sender = bus_sender.clone();
    let controller_config = config.clone();
    let controller_session = Arc::clone(&session);
    let controller_remote = Arc::clone(&remote_controller);
    let controller_handle = thread::spawn(move || {
        let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut sync_controller = SyncController::new(
                controller_bus_receiver,
                controller_bus_sender,
                &controller_config,
                controller_session,
                controller_remote,
            );
            sync_controller.run();
        }));
        if let Err(payload) = run_result {
            log::error!(
                "SyncController thread terminated due to panic: {}",
                panic_payload_to_string(payload.as_ref())
            );
        }
    });

    // Setup playlist loader
    let loader_bus_receiver = bus_sender.subscribe();
    let loader_bus_sender = bus_sender.clone();
    let loader_relay = Arc::clone(&relay);
    thread::spawn(move || {
        let mut playlist_loader =
            PlaylistLoader::new(loader_bus_receiver, loader_bus_sender, loader_relay);
        playlist_loader.run();
    });

    let _ = bus_sender.send(Message::Config(ConfigMessage::ConfigChanged(config.clone())));

    // The bridge pump runs on the main thread and returns when the GUI
    // window closes.
    let mut shell_bridge = ShellBridge::new(bus_sender.subscribe(), bus_sender.clone(), &config.remote);
    shell_bridge.run();

    let _ = controller_handle.join();
    session.disconnect();
    info!("Application exiting");
    Ok(())
}
