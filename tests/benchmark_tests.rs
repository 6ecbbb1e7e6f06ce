//! Performance benchmarks for the tick pipeline

use server::config::ServerConfig;
use server::network::ServerNetworkManager;
use server::scheduler::JobScheduler;
use server::session::SessionManager;
use server::simulation::{Job, NoSpawns};
use shared::{
    Command, EntityKind, EntityState, Handshake, Intent, ManualClock, MemoryNetwork, Message,
    Snapshot, SnapshotEntity, TickSnapshot, Vec2,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

fn projectiles(count: u32) -> Vec<EntityState> {
    (1..=count)
        .map(|id| {
            EntityState::new(
                EntityKind::Projectile,
                id,
                Vec2::new((id % 1280) as f32, (id % 720) as f32),
                Vec2::new(600.0, 0.0),
                0,
            )
        })
        .collect()
}

/// Benchmarks one scheduling phase over many independent jobs
#[test]
fn benchmark_scheduler_throughput() {
    let scheduler = JobScheduler::new(4).unwrap();
    let previous = TickSnapshot::new(0, projectiles(5_000));
    let jobs: Vec<Job> = previous.entities().iter().cloned().map(Job::npc).collect();

    let iterations = 100;
    let start = Instant::now();

    for tick in 1..=iterations {
        let results = scheduler.run_tick(&jobs, &previous, tick, 1.0 / 60.0);
        assert_eq!(results.len(), jobs.len());
    }

    let duration = start.elapsed();
    println!(
        "Scheduler: {} ticks of {} jobs in {:?} ({:.2} ms/tick)",
        iterations,
        jobs.len(),
        duration,
        duration.as_millis() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 5000);
}

/// Benchmarks snapshot encoding, done once per tick
#[test]
fn benchmark_snapshot_encoding() {
    let snapshot = TickSnapshot::new(1, projectiles(1_000));
    let message = Message::Snapshot(Snapshot {
        tick: snapshot.tick(),
        entities: snapshot.to_wire(),
    });

    let iterations = 1_000;
    let start = Instant::now();

    let mut total_bytes = 0;
    for _ in 0..iterations {
        total_bytes += message.encode().unwrap().len();
    }

    let duration = start.elapsed();
    println!(
        "Snapshot encoding: {} iterations in {:?} ({} bytes each)",
        iterations,
        duration,
        total_bytes / iterations
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks decoding of a large snapshot on the client side
#[test]
fn benchmark_snapshot_decoding() {
    let entities: Vec<SnapshotEntity> = projectiles(1_000).iter().map(|e| e.to_wire()).collect();
    let bytes = Message::Snapshot(Snapshot { tick: 7, entities })
        .encode()
        .unwrap();

    let iterations = 1_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = Message::decode(&bytes).unwrap();
    }

    let duration = start.elapsed();
    println!("Snapshot decoding: {} iterations in {:?}", iterations, duration);

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks handshake resolution against a full session table
#[test]
fn benchmark_session_resolution() {
    let mut sessions = SessionManager::new(1_000);
    let peers: Vec<SocketAddr> = (0..1_000u16)
        .map(|port| SocketAddr::from(([127, 0, 0, 1], 10_000 + port)))
        .collect();

    let start = Instant::now();

    for round in 0..10 {
        for peer in &peers {
            let now = Duration::from_millis(round);
            let id = sessions
                .resolve_or_create(*peer, &Handshake::request(), now)
                .unwrap()
                .id();
            sessions.touch(id, now, round > 0);
        }
    }

    let duration = start.elapsed();
    println!("Session resolution: 10,000 handshakes in {:?}", duration);

    assert_eq!(sessions.len(), 1_000);
    assert_eq!(sessions.active_count(), 1_000);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks full ticks with a busy player population
#[test]
fn benchmark_server_tick() {
    let network = MemoryNetwork::new();
    let clock = ManualClock::new();
    let server_addr = SocketAddr::from(([127, 0, 0, 1], 8080));
    let mut server = ServerNetworkManager::new(
        ServerConfig {
            workers: 4,
            ..ServerConfig::default()
        },
        Box::new(network.endpoint(server_addr)),
        Box::new(clock.clone()),
        Box::new(NoSpawns),
    )
    .unwrap();

    let peers: Vec<SocketAddr> = (0..32u16)
        .map(|port| SocketAddr::from(([127, 0, 0, 2], 20_000 + port)))
        .collect();
    for peer in &peers {
        let _ = network.endpoint(*peer);
        network.inject(
            *peer,
            server_addr,
            Message::Handshake(Handshake::request()).encode().unwrap(),
        );
    }

    let iterations = 600u32;
    let start = Instant::now();

    for tick in 1..=iterations {
        for (index, peer) in peers.iter().enumerate() {
            let angle = tick as f32 * 0.05 + index as f32;
            let command = Message::Command(Command {
                sequence: tick,
                intent: Intent::Move {
                    direction: Vec2::new(angle.cos(), angle.sin()),
                },
            });
            network.inject(*peer, server_addr, command.encode().unwrap());
        }
        clock.advance(Duration::from_millis(16));
        server.tick();
        for peer in &peers {
            network.drain(*peer);
        }
    }

    let duration = start.elapsed();
    println!(
        "Server tick: {} ticks with {} players in {:?} ({:.3} ms/tick)",
        iterations,
        peers.len(),
        duration,
        duration.as_millis() as f64 / iterations as f64
    );

    assert_eq!(server.snapshot().count(EntityKind::Player), 32);
    assert!(duration.as_millis() < 5000);
}
