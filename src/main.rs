// src/main.rs

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};

use sangeet_audio::config::Config;
use sangeet_audio::consumers::{Consumer, OutputDrain};
use sangeet_audio::core::{FnObserver, PlayerEvent, PlayerObserver, format_utc_ns, utc_ns_now};
use sangeet_audio::player::{AudioPlayer, Command};
use sangeet_audio::storage::FsStorage;

enum ConsoleInput {
    Command(Command),
    Start(String),
    StopNow,
    Status,
    Quit,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg = match std::env::args().nth(1) {
        Some(path) => {
            let cfg = Config::load(&path)?;
            info!("[sangeet] loaded {}", path);
            cfg
        }
        None => {
            info!("[sangeet] no config given, using defaults");
            Config::default()
        }
    };
    let storage = match std::env::var("SANGEET_MOUNT") {
        Ok(root) => FsStorage::with_root(root),
        Err(_) => FsStorage::new(),
    };

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[sangeet] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    // ------------------------------------------------------------
    // Player + output
    // ------------------------------------------------------------
    let ui: Arc<dyn PlayerObserver> = Arc::new(FnObserver::new("console-ui", |event| {
        match event {
            PlayerEvent::ResetToIdle => info!("[ui] play button reset after EOF"),
            PlayerEvent::StateChanged { from, to, .. } => info!("[ui] {:?} -> {:?}", from, to),
            PlayerEvent::StartFailed { path, reason } => {
                warn!("[ui] could not play {} ({}), press play to retry", path, reason)
            }
            other => debug!("[ui] {}", other.to_json()),
        }
    }));

    let mut player = AudioPlayer::init(cfg.clone(), Arc::new(storage), vec![ui])?;

    let mut drain = OutputDrain::new("speaker", &cfg.output);
    drain.attach_input_buffer(player.buffer());
    drain.start()?;

    let console = spawn_console_reader();

    // ------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------
    info!("[sangeet] running: play | pause | stop | bt-up | bt-down | start <path> | stop-now | status | quit");

    let mut last_stats = Instant::now();

    while running.load(Ordering::Relaxed) {
        match console.recv_timeout(Duration::from_millis(100)) {
            Ok(ConsoleInput::Command(cmd)) => {
                if !player.send(cmd) {
                    warn!("[sangeet] command {} dropped", cmd);
                }
            }
            Ok(ConsoleInput::Start(path)) => {
                let ok = player.start(&path);
                info!("[sangeet] start {} -> {}", path, ok);
            }
            Ok(ConsoleInput::StopNow) => player.stop(),
            Ok(ConsoleInput::Status) => print_status(&player, &drain),
            Ok(ConsoleInput::Quit) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // stdin closed; keep playing until Ctrl+C
                std::thread::sleep(Duration::from_millis(100));
            }
        }

        if last_stats.elapsed() >= Duration::from_secs(5) {
            let stats = player.buffer().stats();
            debug!(
                "[sangeet] state={:?} fill={}/{} full_events={}",
                player.state(),
                stats.fill,
                stats.capacity,
                stats.full_events
            );
            last_stats = Instant::now();
        }
    }

    // ------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------
    info!("[sangeet] shutting down…");
    player.shutdown();
    if let Err(e) = drain.stop() {
        error!("[sangeet] drain stop failed: {}", e);
    }
    info!("[sangeet] shutdown complete");

    Ok(())
}

fn spawn_console_reader() -> Receiver<ConsoleInput> {
    let (tx, rx) = channel::unbounded();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let input = match line.split_once(' ') {
                Some(("start", path)) => ConsoleInput::Start(path.trim().to_string()),
                _ => match line {
                    "status" => ConsoleInput::Status,
                    "quit" | "exit" => ConsoleInput::Quit,
                    "stop-now" => ConsoleInput::StopNow,
                    other => match other.parse::<Command>() {
                        Ok(cmd) => ConsoleInput::Command(cmd),
                        Err(e) => {
                            warn!("[console] {}", e);
                            continue;
                        }
                    },
                },
            };

            if tx.send(input).is_err() {
                break;
            }
        }
    });

    rx
}

fn print_status(player: &AudioPlayer, drain: &OutputDrain) {
    let stats = player.buffer().stats();
    let drain_status = drain.status();

    println!(
        "[{}] state={:?} playing={} session={} track={} buffer={}/{} written={} read={} full_events={} drained={} underruns={} dropped_cmds={}",
        format_utc_ns(utc_ns_now()),
        player.state(),
        player.is_playing(),
        player.session().session_id(),
        player.session().source().unwrap_or_else(|| "-".to_string()),
        stats.fill,
        stats.capacity,
        stats.bytes_written,
        stats.bytes_read,
        stats.full_events,
        drain_status.bytes_consumed,
        drain_status.underruns,
        player.commands().dropped()
    );
}
