//! `nodebase token`: print a fresh control token.

use anyhow::Result;

pub fn run() -> Result<()> {
    println!("{}", nodebase_supervisor::generate_control_token());
    Ok(())
}
