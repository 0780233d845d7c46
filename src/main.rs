use chrono::Local;
use clap::Parser;
use log::{error, info, warn};
use peercall::calls::{CallManager, CallManagerConfig, SyntheticDevices, WebRtcPeerFactory};
use peercall::config::{ClientConfig, Command};
use peercall::http::UreqHttpClient;
use peercall::ice_config::{IceConfigService, IceFetchConfig};
use peercall::socket;
use peercall::types::UserId;
use peercall::types::events::CallEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

const TOKEN_POLL_INTERVAL: Duration = Duration::from_secs(30);

// Demo client: places or answers one call at a time with synthetic media.
//
// Usage:
//   cargo run -- -u alice call bob           # call bob, Ctrl-C hangs up
//   cargo run -- -u bob listen               # answer every incoming call
//   cargo run -- -u bob --video listen       # same, with a camera track
//   cargo run -- -u bob --token-file tok listen  # re-read tok to follow re-logins

fn main() {
    let config = ClientConfig::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(async {
        if let Err(e) = run(config).await {
            error!("{:#}", e);
        }
    });
}

async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let token = match (&config.token, &config.token_file) {
        (Some(token), _) => Some(token.clone()),
        (None, Some(path)) => Some(tokio::fs::read_to_string(path).await?.trim().to_string()),
        (None, None) => None,
    };

    let http_client = Arc::new(UreqHttpClient::new());
    let ice = Arc::new(IceConfigService::new(
        http_client,
        IceFetchConfig::new(&config.api_url, token.clone()),
    ));
    // Load up front so the first call does not wait for the fetch.
    let ice_config = ice.get().await;
    info!(
        "Using {} ICE servers (relay only: {})",
        ice_config.servers.len(),
        ice_config.relay_only
    );

    let token_watch = config
        .token_file
        .clone()
        .map(|path| tokio::spawn(ice.clone().watch_token_file(path, TOKEN_POLL_INTERVAL)));

    let (signaling, signals) = socket::connect(&config.signaling_url, token.as_deref()).await?;
    info!("Connected to signaling relay as {}", config.user);

    let (manager, peer_events) = CallManager::new(
        UserId::new(config.user.clone()),
        CallManagerConfig {
            capture_video: config.video,
            ..Default::default()
        },
        signaling.clone(),
        Arc::new(SyntheticDevices::default()),
        Arc::new(WebRtcPeerFactory::new()?),
        ice,
    );
    let mut events = manager.subscribe();
    let run_loop = tokio::spawn(manager.clone().run(signals, peer_events));

    let auto_answer = match &config.command {
        Command::Call { user } => {
            // Failures end the session and are reported as events below.
            if let Err(e) = manager.call(UserId::new(user.clone())).await {
                error!("Call failed: {}", e);
            }
            false
        }
        Command::Listen => {
            info!("Waiting for calls, Ctrl-C to quit");
            true
        }
    };

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if handle_event(&manager, event, auto_answer) {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!("Missed {} call events", n),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Hanging up");
                manager.leave().await;
                break;
            }
        }
    }

    signaling.disconnect().await;
    run_loop.abort();
    if let Some(watch) = token_watch {
        watch.abort();
    }
    Ok(())
}

/// Logs one call event. Returns `true` when the demo should exit.
fn handle_event(manager: &Arc<CallManager>, event: CallEvent, auto_answer: bool) -> bool {
    match event {
        CallEvent::IncomingCall { from } => {
            info!("Incoming call from {}", from);
            if auto_answer {
                let manager = manager.clone();
                tokio::spawn(async move {
                    if let Err(e) = manager.answer().await {
                        error!("Failed to answer call from {}: {}", from, e);
                    }
                });
            }
        }
        CallEvent::MissedCall { from } => info!("Missed call from {}", from),
        CallEvent::StateChanged(state) => info!("Call state: {:?}", state),
        CallEvent::MediaConnectivity { connected } => {
            info!("Media {}", if connected { "connected" } else { "disconnected" })
        }
        CallEvent::RemoteTrack { kind } => info!("Receiving remote {}", kind),
        CallEvent::RemoteCameraToggled { enabled } => {
            info!("Remote camera {}", if enabled { "on" } else { "off" })
        }
        CallEvent::Alert { message } => warn!("{}", message),
        CallEvent::CallEnded { reason } => {
            info!("Call ended: {:?}", reason);
            return !auto_answer;
        }
        CallEvent::OnlineUsers(users) => info!("{} users online", users.len()),
    }
    false
}
