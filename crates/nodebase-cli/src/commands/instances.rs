//! `nodebase instances <service>`: list instances on the relay.

use anyhow::Result;
use tracing::info;

pub async fn run(relay: &str, service: &str, server_token: Option<&str>) -> Result<()> {
    info!(relay, service, "listing instances");
    let instances = nodebase_tunnel::list_instances(relay, service, server_token).await?;

    if instances.is_empty() {
        println!("(no instances)");
        return Ok(());
    }

    println!("{:<38} {:<24} {}", "UUID", "NAME", "TOKEN");
    for instance in &instances {
        let token = match instance.has_token {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        };
        println!(
            "{:<38} {:<24} {}",
            instance.uuid,
            instance.name.as_deref().unwrap_or("-"),
            token
        );
    }
    Ok(())
}
