//! `nodebase join <service> <uuid>`: join an instance as a participant.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use nodebase_tunnel::{
    build_ws_url, ClientEvent, ClientOptions, InstanceClient, WebSocketChannel,
};

use super::input::{text_payload, Input, TEXT_MESSAGE};

pub async fn run(
    relay: &str,
    server_token: Option<&str>,
    service: &str,
    uuid: &str,
    user: Option<String>,
    instance_token: Option<String>,
) -> Result<()> {
    let url = build_ws_url(relay, server_token)?;
    let (channel, mut inbound) = WebSocketChannel::connect(url.as_str()).await?;

    let mut options = ClientOptions::new(service, uuid);
    options.user_id = user;
    options.instance_token = instance_token;
    options.server_token = server_token.map(str::to_string);

    let (mut client, mut events) = InstanceClient::new(channel, options);
    info!(user_id = %client.user_id(), instance = %uuid, "joining");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = inbound.recv() => match event {
                Some(event) => client.handle_event(event),
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
                        client.disconnect();
                        break;
                    }
                    Ok(input) => handle_input(&client, input),
                    Err(e) => eprintln!("{e:#}"),
                },
                None => stdin_open = false,
            },
            _ = &mut ctrl_c => {
                info!("interrupted, leaving instance");
                client.disconnect();
                break;
            }
        }
    }

    Ok(())
}

fn handle_input(client: &InstanceClient<WebSocketChannel>, input: Input) {
    let sent = match input {
        Input::Empty | Input::Quit => return,
        Input::Kick(_) => {
            eprintln!("only the host can kick");
            return;
        }
        Input::Send { msg_type, payload } => client.send(&msg_type, payload),
        Input::Text(text) => {
            client.send(TEXT_MESSAGE, text_payload(&text, Some(client.user_id())))
        }
    };
    if !sent {
        eprintln!("not sent: not connected");
    }
}

/// Print a client event. Returns `false` once the session is over.
fn print_event(event: &ClientEvent) -> bool {
    match event {
        ClientEvent::Opened => println!("connected to relay"),
        ClientEvent::Joined(ack) => println!(
            "joined {} ({})",
            ack.instance_uuid.as_deref().unwrap_or("?"),
            ack.instance_name.as_deref().unwrap_or("?")
        ),
        ClientEvent::Kicked(payload) => {
            println!("kicked by host {payload}");
            return false;
        }
        ClientEvent::Error(reason) => eprintln!("error: {reason}"),
        ClientEvent::Message(envelope) => println!("{} {}", envelope.msg_type, envelope.payload),
        ClientEvent::Closed => {
            println!("disconnected");
            return false;
        }
    }
    true
}
