use clap::Parser;
use client::network::{ClientConfig, ClientNetworkManager, ClientState};
use log::{info, warn};
use shared::{NetworkEvent, NetworkManager, SystemClock, UdpTransport, Vec2};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Local address to bind the UDP socket to
    #[arg(short = 'b', long, default_value = "0.0.0.0:0")]
    bind: String,

    /// Commands sent per second
    #[arg(short = 'r', long, default_value = "30")]
    rate: u32,

    /// Fire once every N commands, 0 never fires
    #[arg(short = 'f', long, default_value = "15")]
    fire_every: u32,

    /// Stop after this many seconds, 0 runs until Ctrl+C
    #[arg(short = 'd', long, default_value = "0")]
    duration: u64,

    /// Seconds without server traffic before giving up
    #[arg(long, default_value = "10")]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = ClientConfig::new(args.server.parse()?);
    config.timeout = Duration::from_secs(args.timeout);

    info!("Starting headless client...");
    info!("Connecting to: {}", config.server_addr);

    let transport = UdpTransport::bind(&args.bind).await?;
    let mut client =
        ClientNetworkManager::new(config, Box::new(transport), Box::new(SystemClock::new()));
    client.connect()?;

    let rate = args.rate.max(1);
    let mut frame = interval(Duration::from_secs_f64(1.0 / rate as f64));
    frame.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let deadline = tokio::time::sleep(if args.duration == 0 {
        Duration::MAX
    } else {
        Duration::from_secs(args.duration)
    });
    tokio::pin!(deadline);

    let mut step: u32 = 0;
    loop {
        tokio::select! {
            _ = frame.tick() => {}
            _ = &mut shutdown => {
                info!("Received Ctrl+C, leaving");
                break;
            }
            _ = &mut deadline => {
                info!("Run time elapsed, leaving");
                break;
            }
        }

        client.update();
        for event in client.poll_events() {
            match event {
                NetworkEvent::PlayerJoined { player_id } => info!("Joined as player {}", player_id),
                NetworkEvent::PlayerLeft { reason, .. } => warn!("Left the game: {:?}", reason),
                NetworkEvent::SnapshotApplied { tick } if tick % 60 == 0 => {
                    info!(
                        "Tick {}: {} entities, rtt {:?}",
                        tick,
                        client.view().len(),
                        client.rtt()
                    );
                }
                NetworkEvent::SnapshotApplied { .. } => {}
            }
        }

        if client.state() == ClientState::Disconnected {
            warn!("Connection lost");
            break;
        }
        if client.state() != ClientState::Connected {
            continue;
        }

        // Circle around the spawn point
        step = step.wrapping_add(1);
        let angle = step as f32 / rate as f32;
        if let Err(e) = client.send_move(Vec2::new(angle.cos(), angle.sin())) {
            warn!("Move not sent: {}", e);
        }
        if args.fire_every > 0 && step % args.fire_every == 0 {
            if let Err(e) = client.fire() {
                warn!("Fire not sent: {}", e);
            }
        }
    }

    client.shutdown();
    Ok(())
}
