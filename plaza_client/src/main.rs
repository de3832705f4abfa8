//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p plaza_client -- [--addr 127.0.0.1:2567] [--room my_room] [--name Player]
//!                                [--config client.json] [--no-media] [--media-url ws://...]
//!
//! The client joins the room, renders headless at the configured frame rate,
//! and takes pointer/window input from the console:
//!   click <x> <y> <z>  - Primary click on a world point
//!   click              - Primary click on nothing
//!   back               - Leave the room (back button)
//!   resize <w> <h>     - Resize the viewport
//!   status             - Show client status
//!   quit               - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use plaza_client::{
    console::{self, ConsoleCommand},
    input::PointerEvent,
    media::{HeadlessSurface, MediaBridge, NullMediaTransport},
    room::RoomConnection,
    Game, RoomClient,
};
use plaza_shared::{config::ClientConfig, render::HeadlessScene};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

fn parse_args() -> anyhow::Result<ClientConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let text = std::fs::read_to_string(&args[i + 1])
                .with_context(|| format!("read config {}", args[i + 1]))?;
            ClientConfig::from_json_str(&text).context("parse config")?
        }
        _ => ClientConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--room" if i + 1 < args.len() => {
                cfg.room_name = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--media-url" if i + 1 < args.len() => {
                cfg.media.url = args[i + 1].clone();
                i += 2;
            }
            "--no-media" => {
                cfg.media.enabled = false;
                i += 1;
            }
            _ => i += 1,
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_addr, room = %cfg.room_name, "Starting client");

    let room = RoomClient::join(&cfg).await.context("join room")?;

    let mut media = MediaBridge::new(
        NullMediaTransport::default(),
        HeadlessSurface::new(),
        cfg.media.url.clone(),
    );
    if cfg.media.enabled {
        if let Err(e) = media.connect(&room.grant_requester()).await {
            error!(error = %e, "Media unavailable for this session");
        }
    }

    let mut game = Game::new(HeadlessScene::new(), room, &cfg)?;
    game.bootstrap();

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Joined. {}", console::USAGE);
    println!();

    let mut frames = tokio::time::interval(Duration::from_secs_f32(1.0 / cfg.frame_hz as f32));
    frames.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        while let Ok(line) = console_rx.try_recv() {
            match console::parse(&line) {
                Ok(Some(ConsoleCommand::Click(point))) => {
                    match game.on_pointer_down(&PointerEvent::primary(point)) {
                        Ok(Some(cmd)) => println!("Moving to {:?}", cmd.payload),
                        Ok(None) => println!("Nothing picked"),
                        Err(e) => println!("Error: {e}"),
                    }
                }
                Ok(Some(ConsoleCommand::Back)) => {
                    if let Err(e) = game.press_back() {
                        warn!(error = %e, "Leave request failed");
                    }
                }
                Ok(Some(ConsoleCommand::Resize(w, h))) => game.resize(w, h),
                Ok(Some(ConsoleCommand::Status)) => {
                    println!("Phase: {:?}", game.phase());
                    println!("Room: {}", game.room().room_name());
                    println!("Session: {}", game.room().session_id());
                    println!("Avatars: {}", game.registry().len());
                    println!("Frames: {}", game.scene().frames_rendered);
                    println!("Media: {:?} ({} tracks)", media.state(), media.attached_tracks());
                }
                Ok(Some(ConsoleCommand::Quit)) => {
                    if let Err(e) = game.press_back() {
                        warn!(error = %e, "Leave request failed");
                    }
                }
                Ok(None) => {}
                Err(msg) => println!("{msg}"),
            }
        }

        media.pump();

        frames.tick().await;
        if !game.frame() {
            let code = game.menu().map(|m| m.leave_code).unwrap_or_default();
            println!("Back at menu (leave code {code}).");
            break;
        }
    }

    media.disconnect().await;
    Ok(())
}
