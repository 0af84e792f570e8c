// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info};

use roomlink::config::Config;
use roomlink::console::{self, Input};
use roomlink::{ConnectionState, EventKind, Session, SessionEvent};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);

    if let Err(e) = run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let session = Session::websocket(config.settings());
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    for kind in EventKind::INBOUND.into_iter().chain([EventKind::ConnectionStateChange]) {
        let out_tx = out_tx.clone();
        session.on(kind, move |event| {
            let _ = out_tx.send(console::render(event));
            Ok(())
        });
    }

    // (Re)join on every successful connect.
    {
        let handle = session.clone();
        let room = config.room.clone();
        let user = config.user.clone();
        session.on(EventKind::ConnectionStateChange, move |event| {
            if let SessionEvent::ConnectionStateChange(change) = event {
                if change.state == ConnectionState::Connected {
                    handle.join_room(&room, &user);
                }
            }
            Ok(())
        });
    }

    info!(url = %config.url, room = %config.room, user = %config.user, "starting");
    session.connect(config.session_config());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut typing = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(line) = out_rx.recv() => println!("{line}"),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match console::parse_line(&line) {
                    Input::Message(text) => {
                        if typing {
                            session.set_typing(&config.room, &config.user, false);
                            typing = false;
                        }
                        session.send_message(&config.room, &config.user, &text);
                    }
                    Input::Typing(on) => {
                        typing = on;
                        session.set_typing(&config.room, &config.user, on);
                    }
                    Input::Info => {
                        session.get_room_info(&config.room);
                    }
                    Input::Leave => {
                        session.leave_room(&config.room, &config.user);
                    }
                    Input::Reconnect => session.force_reconnect(),
                    Input::Stats => println!("{}", serde_json::to_string_pretty(&session.stats())?),
                    Input::Help => println!("{}", console::HELP),
                    Input::Quit => break,
                    Input::Empty => {}
                    Input::Unknown(cmd) => eprintln!("unknown command: {cmd} (try /help)"),
                }
            }
        }
    }

    session.leave_room(&config.room, &config.user);
    session.destroy();
    info!("bye");
    Ok(())
}
