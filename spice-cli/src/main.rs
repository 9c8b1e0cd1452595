use clap::Parser;
use slog::{info, o};
use spice_client::Session;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "Connects to a SPICE server and drives the session's event loop.")]
struct Args {
    #[arg(long)]
    host: String,

    #[arg(long, default_value_t = 5900)]
    port: u16,

    #[arg(long, env = "SPICE_PASSWORD")]
    password: Option<String>,

    #[arg(long)]
    no_playback: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let log = spice_client::logging::terminal_logger().new(o!("app" => "spice-cli"));

    let mut session = Session::connect(&args.host, args.port, args.password.as_deref(), !args.no_playback, log.clone())?;

    session.set_clipboard_callbacks(
        Some(Box::new({
            let log = log.clone();
            move |types| {
                info!(log, "peer offered clipboard"; "types" => ?types);
            }
        })),
        Some(Box::new({
            let log = log.clone();
            move |clipboard_type, data| {
                info!(log, "clipboard data received"; "type" => ?clipboard_type, "bytes" => data.len());
            }
        })),
        Box::new({
            let log = log.clone();
            move || {
                info!(log, "peer released clipboard");
            }
        }),
        Box::new({
            let log = log.clone();
            move |clipboard_type| {
                info!(log, "peer requested clipboard"; "type" => ?clipboard_type);
            }
        }),
    )?;

    if !args.no_playback {
        session.set_audio_callbacks(
            Box::new({
                let log = log.clone();
                move |channels, frequency, mode| {
                    info!(log, "playback started"; "channels" => channels, "frequency" => frequency, "mode" => ?mode);
                }
            }),
            Some(Box::new({
                let log = log.clone();
                move |channels| {
                    info!(log, "playback volume changed"; "channels" => ?channels);
                }
            })),
            Some(Box::new({
                let log = log.clone();
                move |mute| {
                    info!(log, "playback mute changed"; "mute" => mute);
                }
            })),
            Box::new({
                let log = log.clone();
                move || {
                    info!(log, "playback stopped");
                }
            }),
            Box::new(|_time, _samples| {}),
        )?;
    }

    info!(log, "connecting"; "host" => &args.host, "port" => args.port);

    loop {
        let events = session.process(Duration::from_millis(100))?;
        for event in events {
            match event {
                spice_client::SessionEvent::Notify(message) => info!(log, "server notify"; "message" => message),
                spice_client::SessionEvent::Disconnected(reason) => {
                    info!(log, "disconnected"; "reason" => ?reason);
                    return Ok(());
                }
            }
        }
    }
}
