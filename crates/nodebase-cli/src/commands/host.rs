//! `nodebase host <service>`: host an instance on the relay.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use nodebase_tunnel::{build_ws_url, HostEvent, HostOptions, InstanceHost, WebSocketChannel};

use super::input::{text_payload, Input, TEXT_MESSAGE};

pub async fn run(
    relay: &str,
    server_token: Option<&str>,
    service: &str,
    name: &str,
    reclaim: Option<String>,
    instance_token: Option<String>,
) -> Result<()> {
    let url = build_ws_url(relay, server_token)?;
    let (channel, mut inbound) = WebSocketChannel::connect(url.as_str()).await?;

    let mut options = HostOptions::new(service).name(name);
    options.server_token = server_token.map(str::to_string);
    options.instance_token = instance_token;
    options.reclaim_uuid = reclaim;

    let (mut host, mut events) = InstanceHost::new(channel, options);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = inbound.recv() => match event {
                Some(event) => host.handle_event(event),
                None => break,
            },
            Some(event) = events.recv() => {
                if !print_event(&event) {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match Input::parse(&line) {
                    Ok(Input::Quit) => {
                        host.disconnect();
                        break;
                    }
                    Ok(input) => handle_input(&host, input),
                    Err(e) => eprintln!("{e:#}"),
                },
                None => stdin_open = false,
            },
            _ = &mut ctrl_c => {
                info!("interrupted, closing instance");
                host.disconnect();
                break;
            }
        }
    }

    Ok(())
}

fn handle_input(host: &InstanceHost<WebSocketChannel>, input: Input) {
    let sent = match input {
        Input::Empty | Input::Quit => return,
        Input::Kick(user) => host.kick_user(&user),
        Input::Send { msg_type, payload } => host.broadcast(&msg_type, payload),
        Input::Text(text) => host.broadcast(TEXT_MESSAGE, text_payload(&text, None)),
    };
    if !sent {
        eprintln!("not sent: no active instance");
    }
}

/// Print a host event. Returns `false` once the session is over.
fn print_event(event: &HostEvent) -> bool {
    match event {
        HostEvent::Opened => println!("connected to relay"),
        HostEvent::Created(ack) => println!(
            "instance created: {} ({})",
            ack.uuid.as_deref().unwrap_or("?"),
            ack.name.as_deref().unwrap_or("?")
        ),
        HostEvent::Reclaimed(ack) => println!(
            "instance reclaimed: {} ({})",
            ack.uuid.as_deref().unwrap_or("?"),
            ack.name.as_deref().unwrap_or("?")
        ),
        HostEvent::Error(reason) => eprintln!("error: {reason}"),
        HostEvent::Message(envelope) => println!("{} {}", envelope.msg_type, envelope.payload),
        HostEvent::Closed => {
            println!("disconnected");
            return false;
        }
    }
    true
}
