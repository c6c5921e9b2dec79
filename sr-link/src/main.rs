//! Entry point for `sr-link`.
//!
//! Parses CLI arguments and dispatches into either **simulate** or
//! **station** mode.  All protocol work is delegated to library modules;
//! `main.rs` owns only process setup (logging, argument parsing) and the
//! numbered test traffic both modes send.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use clap::{Args, Parser, Subcommand};

use sr_link::link::LinkConfig;
use sr_link::simulator::{Simulator, SimulatorConfig, StationId};
use sr_link::socket::FrameSocket;
use sr_link::station::{StationConfig, StationHandle};
use sr_link::timer::TimerConfig;

/// Selective-repeat data link over an unreliable frame channel.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run two stations over the in-process simulated channel.
    Simulate {
        /// Packets each station sends to the other.
        #[arg(short = 'n', long, default_value_t = 1000)]
        packets: u64,
        /// Probability that a frame is lost.
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        /// Probability that a frame has a bit flipped.
        #[arg(long, default_value_t = 0.0)]
        corrupt: f64,
        /// Probability that a frame is delayed past later ones.
        #[arg(long, default_value_t = 0.0)]
        reorder: f64,
        /// RNG seed for the fault model.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Run one station over UDP against a peer station.
    Station {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Peer station address (e.g. 127.0.0.1:9001).
        #[arg(short, long)]
        peer: SocketAddr,
        /// Packets to send.
        #[arg(long, default_value_t = 100)]
        count: u64,
        /// Packets to wait for from the peer before closing.
        #[arg(long, default_value_t = 100)]
        expect: u64,
        /// Milliseconds to keep acknowledging the peer after finishing.
        #[arg(long, default_value_t = 1000)]
        linger_ms: u64,
        #[command(flatten)]
        link: LinkArgs,
    },
}

/// Parameters both peers must agree on.
#[derive(Args)]
struct LinkArgs {
    /// Fixed packet size in bytes (at least 8).
    #[arg(long, default_value_t = sr_link::frame::DEFAULT_PACKET_LEN)]
    packet_len: usize,
    /// DATA frame retransmission timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
}

impl LinkArgs {
    fn config(&self) -> Result<LinkConfig> {
        ensure!(self.packet_len >= 8, "packet length must be at least 8 bytes");
        Ok(LinkConfig {
            packet_len: self.packet_len,
            timers: TimerConfig {
                data_timeout: Duration::from_millis(self.timeout_ms),
            },
        })
    }
}

/// Packet `id`: the id in the first 8 bytes, then a pattern derived from it.
fn numbered_packet(id: u64, len: usize) -> Vec<u8> {
    let mut packet: Vec<u8> = (0..len).map(|k| (id as u8).wrapping_add(k as u8)).collect();
    packet[..8].copy_from_slice(&id.to_be_bytes());
    packet
}

fn simulate(packets: u64, faults: SimulatorConfig, link: LinkConfig) -> Result<()> {
    let mut sim = Simulator::new(link, faults);
    for id in 0..packets {
        sim.send(StationId::A, numbered_packet(id, link.packet_len));
        sim.send(StationId::B, numbered_packet(id, link.packet_len));
    }

    // Generous: every frame could need many timeouts on a bad channel.
    let limit = link.timers.data_timeout * 1000 + Duration::from_secs(packets);
    let settled = sim.run_until_idle(limit)?;

    let channel = sim.channel_stats();
    println!(
        "virtual time {:?}; channel carried={} dropped={} corrupted={} reordered={} expired={}",
        sim.now(),
        channel.carried,
        channel.dropped,
        channel.corrupted,
        channel.reordered,
        channel.expired
    );
    for id in [StationId::A, StationId::B] {
        println!("station {id}: {}", sim.stats(id));
    }
    ensure!(settled, "simulation did not settle within {limit:?}");

    for id in [StationId::A, StationId::B] {
        let received = sim.received(id);
        ensure!(
            received.len() as u64 == packets,
            "station {id} received {} of {packets} packets",
            received.len()
        );
        for (expected, packet) in (0..packets).zip(received) {
            if *packet != numbered_packet(expected, link.packet_len) {
                bail!("station {id} received packet out of order at {expected}");
            }
        }
    }
    println!("all {packets} packets delivered in order in both directions");
    Ok(())
}

async fn station(
    bind: SocketAddr,
    peer: SocketAddr,
    count: u64,
    expect: u64,
    config: StationConfig,
) -> Result<()> {
    let socket = FrameSocket::bind(bind, peer)
        .await
        .with_context(|| format!("binding {bind}"))?;
    let mut handle = StationHandle::spawn(socket, config);

    let packet_len = config.link.packet_len;
    let tx = handle.sender();
    let producer = tokio::spawn(async move {
        for id in 0..count {
            if tx.send(numbered_packet(id, packet_len)).await.is_err() {
                break;
            }
        }
        log::info!("queued {count} packets");
    });

    for expected in 0..expect {
        let packet = handle
            .recv()
            .await
            .context("station stopped before all packets arrived")?;
        ensure!(
            packet == numbered_packet(expected, packet_len),
            "packet {expected} out of order or corrupted"
        );
    }
    log::info!("received {expect} packets");

    producer.await?;
    let stats = handle.close().await?;
    println!("{stats}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Simulate {
            packets,
            loss,
            corrupt,
            reorder,
            seed,
            link,
        } => {
            let faults = SimulatorConfig {
                loss_rate: loss,
                corrupt_rate: corrupt,
                reorder_rate: reorder,
                seed,
                ..SimulatorConfig::default()
            };
            faults.validate().context("invalid fault model")?;
            log::info!("Simulating {packets} packets each way with {faults:?}");
            simulate(packets, faults, link.config()?)
        }
        Mode::Station {
            bind,
            peer,
            count,
            expect,
            linger_ms,
            link,
        } => {
            log::info!("Starting station on {bind}, peer {peer}");
            let config = StationConfig {
                link: link.config()?,
                linger: Duration::from_millis(linger_ms),
            };
            station(bind, peer, count, expect, config).await
        }
    }
}
