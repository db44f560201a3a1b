//! `nodebase argv`: show how a command line is tokenized.

use anyhow::Result;

pub fn run(command: &str) -> Result<()> {
    let argv = nodebase_supervisor::parse_command_line(Some(command))?;
    for arg in argv {
        println!("{arg}");
    }
    Ok(())
}
