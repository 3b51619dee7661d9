mod report;

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use gamenet::{ReliabilityConfig, Session, SessionEvent, SystemClock, UdpTransport};

use report::Report;

#[derive(Parser)]
#[command(name = "gamenet-demo")]
#[command(about = "Loopback traffic run between two gamenet sessions")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    #[arg(short, long, default_value_t = 40100, help = "Sender port; the receiver binds port + 1")]
    port: u16,

    #[arg(short = 'n', long, default_value_t = 200, help = "Messages per channel")]
    count: u32,

    #[arg(long, default_value_t = 10, help = "Delay between sends in ms")]
    interval_ms: u64,

    #[arg(long, default_value_t = 5000, help = "How long to wait for outstanding ACKs")]
    settle_ms: u64,

    #[arg(short, long, help = "JSON file with reliability settings")]
    config: Option<PathBuf>,

    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

type DemoSession = Session<UdpTransport, SystemClock>;

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config(args.config.as_deref())?;
    let sender_addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .context("Invalid bind address")?;
    let receiver_port = args
        .port
        .checked_add(1)
        .context("Port leaves no room for the receiver")?;
    let receiver_addr = SocketAddr::new(sender_addr.ip(), receiver_port);

    // Both ends read one clock so one-way latency is meaningful
    let clock = SystemClock::new();
    let mut sender = Session::with_clock(
        UdpTransport::bind(sender_addr, receiver_addr)
            .with_context(|| format!("Failed to bind {}", sender_addr))?,
        clock.clone(),
        config.clone(),
    )?;
    let mut receiver = Session::with_clock(
        UdpTransport::bind(receiver_addr, sender_addr)
            .with_context(|| format!("Failed to bind {}", receiver_addr))?,
        clock,
        config,
    )?;

    log::info!(
        "Sending {} messages per channel from {} to {}",
        args.count,
        sender_addr,
        receiver_addr
    );

    let started = Instant::now();
    let mut report = Report::default();

    for i in 0..args.count {
        sender.send_reliable(format!("reliable #{}", i))?;
        sender.send_unreliable(format!("unreliable #{}", i))?;
        pump(&mut sender, &mut receiver, &mut report)?;
        thread::sleep(Duration::from_millis(args.interval_ms));
    }

    let settle_deadline = Instant::now() + Duration::from_millis(args.settle_ms);
    while sender.in_flight_count() > 0 && Instant::now() < settle_deadline {
        pump(&mut sender, &mut receiver, &mut report)?;
        thread::sleep(Duration::from_millis(1));
    }
    pump(&mut sender, &mut receiver, &mut report)?;

    if sender.in_flight_count() > 0 {
        log::warn!(
            "{} reliable packet(s) still unacknowledged after {} ms",
            sender.in_flight_count(),
            args.settle_ms
        );
    }

    report.finish(
        sender.stats(),
        receiver.stats(),
        started.elapsed().as_millis() as u64,
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ReliabilityConfig> {
    let Some(path) = path else {
        return Ok(ReliabilityConfig::default());
    };

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: ReliabilityConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    config.validate()?;

    log::info!("Loaded reliability config from {}", path.display());
    Ok(config)
}

fn pump(sender: &mut DemoSession, receiver: &mut DemoSession, report: &mut Report) -> Result<()> {
    sender.poll()?;
    receiver.poll()?;

    for delivery in receiver.drain_deliveries() {
        report.record(&delivery);
    }

    for event in sender.drain_events() {
        if let SessionEvent::DeliveryFailure { sequence, attempts } = event {
            log::warn!("R#{} lost after {} attempts", sequence, attempts);
        }
    }
    receiver.drain_events().for_each(drop);

    Ok(())
}
