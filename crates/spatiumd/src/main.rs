//! Spatium Daemon - plays back a stepping engine's output
//!
//! This daemon owns one playback session:
//! - The reference food-grid engine on a blocking task
//! - Frame pacing, score downsampling and annotations
//! - IPC server for UI clients (newline-delimited JSON over TCP)
//!
//! Configuration locations:
//! - Linux: ~/.local/share/spatium/config.json
//! - Windows: %APPDATA%\spatium\config.json
//! - MacOS: ~/Library/Application Support/spatium/config.json
//!
//! `SPATIUM_HOME` replaces the directory.

use serde::{Deserialize, Serialize};
use spatium::session::SinkEvent;
use spatium_games::FoodGridEngine;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

mod channel;
mod config;
mod paths;
mod session;

use channel::EngineChannel;
use config::RuntimeConfig;
use paths::AppPaths;
use session::{spawn_session, ControlRequest, SessionHandle, StateSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    GetState,
    Start,
    Stop,
    Step,
    SetFramerate { fps: u32 },
    Subscribe,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    State(Box<StateSnapshot>),
    Success { message: String },
    Error { message: String },
}

async fn write_line<T: Serialize>(
    writer: &mut OwnedWriteHalf,
    value: &T,
) -> Result<(), Box<dyn std::error::Error>> {
    writer
        .write_all(serde_json::to_string(value)?.as_bytes())
        .await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

async fn handle_client(
    stream: TcpStream,
    session: SessionHandle,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let resp = Response::Error {
                    message: format!("Invalid request: {}", e),
                };
                write_line(&mut writer, &resp).await?;
                continue;
            }
        };

        let response = match request {
            Request::GetState => match session.state().await {
                Ok(snapshot) => Response::State(Box::new(snapshot)),
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },
            Request::Start => reply(session.control(ControlRequest::Start).await),
            Request::Stop => reply(session.control(ControlRequest::Stop).await),
            Request::Step => reply(session.control(ControlRequest::Step).await),
            Request::SetFramerate { fps } => {
                if fps > 1000 {
                    Response::Error {
                        message: "fps must be within 0-1000".to_string(),
                    }
                } else {
                    reply(session.control(ControlRequest::SetFramerate { fps }).await)
                }
            }
            Request::Subscribe => {
                // The connection becomes a one-way event stream.
                return stream_events(&session, &mut writer).await;
            }
            Request::Shutdown => {
                write_line(
                    &mut writer,
                    &Response::Success {
                        message: "Shutting down".to_string(),
                    },
                )
                .await?;
                info!("Shutdown requested by client");
                session.shutdown();
                return Ok(());
            }
        };
        write_line(&mut writer, &response).await?;
    }
    Ok(())
}

fn reply(result: Result<String, String>) -> Response {
    match result {
        Ok(message) => Response::Success { message },
        Err(message) => Response::Error { message },
    }
}

async fn stream_events(
    session: &SessionHandle,
    writer: &mut OwnedWriteHalf,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = session.subscribe();
    write_line(
        writer,
        &Response::Success {
            message: "Subscribed".to_string(),
        },
    )
    .await?;
    loop {
        let event: SinkEvent = tokio::select! {
            _ = session.cancelled() => return Ok(()),
            received = events.recv() => match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscriber lagged, skipped {} events", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        };
        write_line(writer, &event).await?;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Setup application paths and configuration
    let paths = AppPaths::resolve()?;
    let mut config = RuntimeConfig::load(&paths.config_file())?;
    config.apply_env()?;
    info!("Config loaded from {}", paths.root().display());

    let listener = TcpListener::bind(config.listen_addr.as_str()).await?;
    info!("Spatium daemon listening on {}", config.listen_addr);

    let channel = EngineChannel::spawn(FoodGridEngine::new());
    let (session, session_task) = spawn_session(config, channel);

    // Stop the session cleanly on Ctrl-C.
    {
        let session = session.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C: shutting down");
                session.shutdown();
            }
        });
    }

    // Accept client connections
    loop {
        let (stream, addr) = tokio::select! {
            _ = session.cancelled() => break,
            accepted = listener.accept() => accepted?,
        };
        info!("Client connected: {}", addr);
        let session = session.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, session).await {
                error!("Client handler error: {}", e);
            }
        });
    }

    if let Err(e) = session_task.await {
        error!("Session task failed: {}", e);
    }
    info!("Spatium daemon stopped");
    Ok(())
}
