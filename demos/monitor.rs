//! Watch a speaker and optionally send it one command.
//!
//! ```text
//! cargo run --example monitor -- 192.168.1.40
//! cargo run --example monitor -- 192.168.1.40 source AUX
//! cargo run --example monitor -- 192.168.1.40 volume 25
//! cargo run --example monitor -- 192.168.1.40 mute
//! cargo run --example monitor -- 192.168.1.40 off
//! ```

use kef_wireless::{ClientOptions, ConnectionState, KefClient, KefEvent, Source};
use std::error::Error;

enum Action {
    Watch,
    Source(Source),
    Volume(i32),
    Mute,
    Off,
}

fn parse_action(args: &[String]) -> Result<Action, Box<dyn Error>> {
    let action = match args.first().map(String::as_str) {
        None => Action::Watch,
        Some("source") => Action::Source(args.get(1).ok_or("missing input name")?.parse()?),
        Some("volume") => Action::Volume(args.get(1).ok_or("missing volume")?.parse()?),
        Some("mute") => Action::Mute,
        Some("off") => Action::Off,
        Some(other) => return Err(format!("unknown command: {}", other).into()),
    };
    Ok(action)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let host = args.first().ok_or("usage: monitor <host> [command]")?;
    let mut action = parse_action(&args[1..])?;

    let client = KefClient::new(
        ClientOptions::new(host.as_str())
            .with_connect_on_construction(false)
            .with_check_state_interval_ms(10_000),
    )?;
    let mut events = client.subscribe();
    client.connect()?;

    while let Ok(event) = events.recv().await {
        match event {
            KefEvent::Lifecycle { state, cause } => {
                match cause {
                    Some(cause) => println!("socket {} ({})", state, cause),
                    None => println!("socket {}", state),
                }
                if state == ConnectionState::Connected {
                    if let Err(e) = client.check_state().await {
                        eprintln!("state check failed: {}", e);
                    }
                }
            }
            KefEvent::TransportError(e) => eprintln!("socket error: {}", e),
            KefEvent::State(state) => {
                println!(
                    "power {:?} | source {:?} | volume {:?} | muted {:?}",
                    state.power, state.source, state.volume, state.muted
                );

                // Relative commands need a reported baseline, so act on the first state event.
                let result = match std::mem::replace(&mut action, Action::Watch) {
                    Action::Watch => Ok(()),
                    Action::Source(source) => client.turn_on_or_switch_source(source).await,
                    Action::Volume(volume) => client.set_volume(volume).await,
                    Action::Mute => client.mute_toggle().await,
                    Action::Off => client.turn_off().await,
                };
                if let Err(e) = result {
                    eprintln!("command failed: {}", e);
                }
            }
        }
    }

    Ok(())
}
