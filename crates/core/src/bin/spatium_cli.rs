//! CLI client for the `spatiumd` daemon.
//!
//! Examples:
//!   spatium-cli status
//!   spatium-cli start
//!   spatium-cli stop
//!   spatium-cli step
//!   spatium-cli fps 30
//!   spatium-cli watch
//!
//! By default it talks to 127.0.0.1:9877; override with `--addr host:port`.

use serde::{Deserialize, Serialize};
use spatium::session::{PlaybackState, SinkEvent};
use spatium::step::RenderingInfo;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process;
use std::time::Duration;

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

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StateSnapshot {
    playback: PlaybackState,
    #[serde(default)]
    backlog: usize,
    #[serde(default)]
    last_score: Option<f64>,
    #[serde(default)]
    mean_score: Option<f64>,
}

fn print_state(s: StateSnapshot) {
    let p = s.playback;
    println!(
        "state={} running={} ready={} fps={} cursor={}/{} backlog={}",
        p.state, p.running, p.ready, p.fps, p.cursor, p.len, s.backlog
    );
    println!(
        "episodes_scored={} annotations={} last_score={} mean_score={}",
        p.scores,
        p.annotations,
        s.last_score.map_or("-".to_string(), |v| format!("{v:.1}")),
        s.mean_score.map_or("-".to_string(), |v| format!("{v:.2}")),
    );
    if let Some(err) = p.error {
        println!("error: {err}");
    }
}

fn print_event(event: SinkEvent) {
    match event {
        SinkEvent::Frame { cursor, len, step } => {
            let position = match &step.rendering_info {
                Some(RenderingInfo::Point(p)) => format!(" at ({}, {})", p.x, p.y),
                Some(RenderingInfo::Layers { width, height, .. }) => {
                    format!(" on {width}x{height}")
                }
                None => String::new(),
            };
            let score = step
                .kind()
                .score()
                .map_or(String::new(), |s| format!(" score={s}"));
            println!(
                "[{cursor}/{len}] episode={} step={} action={}{position}{score}",
                step.episode, step.step_index, step.action
            );
        }
        SinkEvent::Series(series) => {
            if let Some(last) = series.y.last() {
                println!("series: {} bins, last={last:.2}", series.y.len());
            }
        }
        SinkEvent::Overlay(overlay) => {
            for a in overlay.annotations {
                println!("annotation @{}: {}", a.x, a.text);
            }
        }
        SinkEvent::Log { message } => println!("log: {message}"),
        SinkEvent::SessionError { message } => eprintln!("session error: {message}"),
    }
}

fn usage() -> ! {
    eprintln!("spatium-cli (talks to spatiumd @ 127.0.0.1:9877 by default)");
    eprintln!("Usage: spatium-cli [--addr host:port] <command> [args]\n");
    eprintln!("Commands:");
    eprintln!("  status                      Show playback state");
    eprintln!("  start | stop                Control playback");
    eprintln!("  step                        Advance exactly one step");
    eprintln!("  fps <0-1000>                Set playback framerate (0 = unthrottled)");
    eprintln!("  watch                       Stream frames, series and annotations");
    eprintln!("  shutdown                    Stop the engine and exit daemon");
    process::exit(1);
}

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    let mut addr = "127.0.0.1:9877".to_string();
    if args.len() >= 2 && args[0] == "--addr" {
        addr = args[1].clone();
        args.drain(0..2);
    }

    if args.is_empty() {
        usage();
    }

    (addr, args)
}

fn connect(addr: &str, req: &Request) -> Result<(TcpStream, BufReader<TcpStream>), String> {
    let mut stream = TcpStream::connect(addr).map_err(|e| format!("connect: {e}"))?;
    let reader = BufReader::new(stream.try_clone().map_err(|e| format!("clone: {e}"))?);

    let line = serde_json::to_string(req).map_err(|e| format!("serialize: {e}"))?;
    stream
        .write_all(line.as_bytes())
        .and_then(|_| stream.write_all(b"\n"))
        .map_err(|e| format!("send: {e}"))?;
    Ok((stream, reader))
}

fn send_request(addr: &str, req: &Request) -> Result<Response, String> {
    let (stream, mut reader) = connect(addr, req)?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .map_err(|e| format!("set_read_timeout: {e}"))?;

    let mut resp_line = String::new();
    reader
        .read_line(&mut resp_line)
        .map_err(|e| format!("recv: {e}"))?;
    serde_json::from_str(&resp_line).map_err(|e| format!("parse response: {e}"))
}

fn watch(addr: &str) -> Result<(), String> {
    let (_stream, reader) = connect(addr, &Request::Subscribe)?;
    for line in reader.lines() {
        let line = line.map_err(|e| format!("recv: {e}"))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SinkEvent>(&line) {
            Ok(event) => print_event(event),
            Err(_) => match serde_json::from_str::<Response>(&line) {
                Ok(Response::Error { message }) => return Err(message),
                Ok(_) => {}
                Err(e) => return Err(format!("parse event: {e}")),
            },
        }
    }
    Ok(())
}

fn main() {
    let (addr, args) = parse_args();
    let cmd = &args[0];

    let make_error = |msg: &str| -> ! {
        eprintln!("{}", msg);
        process::exit(1);
    };

    let req = match cmd.as_str() {
        "status" => Request::GetState,
        "start" => Request::Start,
        "stop" => Request::Stop,
        "step" => Request::Step,
        "shutdown" => Request::Shutdown,
        "fps" => {
            if args.len() < 2 {
                usage();
            }
            let fps: u32 = args[1]
                .parse()
                .unwrap_or_else(|_| make_error("fps must be a number (0-1000)"));
            Request::SetFramerate { fps }
        }
        "watch" => {
            if let Err(e) = watch(&addr) {
                eprintln!("Failed: {e}");
                process::exit(1);
            }
            process::exit(0);
        }
        _ => usage(),
    };

    match send_request(&addr, &req) {
        Ok(Response::State(s)) => print_state(*s),
        Ok(Response::Success { message }) => println!("{message}"),
        Ok(Response::Error { message }) => {
            eprintln!("Error: {message}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed: {e}");
            process::exit(1);
        }
    }
}
