//! Interactive settings editor (`piradio --setup`).
use std::io::{BufRead, Write};

use anyhow::Context;
use piradio_proto::config::{Config, SETTINGS};

/// Walk through every editable setting, showing the current value.  An empty
/// answer keeps it; an invalid one is reported and asked again.
pub fn run_editor<R: BufRead, W: Write>(config: &mut Config, mut input: R, mut output: W) -> anyhow::Result<()> {
    writeln!(output, "=== Settings ===")?;

    for setting in SETTINGS {
        writeln!(output, "Hint: {}", setting.help)?;
        loop {
            let current = config.get(setting.key)?;
            write!(output, "{} [{}]: ", setting.title, current)?;
            output.flush()?;

            let mut answer = String::new();
            let read = input
                .read_line(&mut answer)
                .context("Failed to read settings input")?;
            let answer = answer.trim();
            if read == 0 || answer.is_empty() {
                break;
            }
            match config.set(setting.key, answer) {
                Ok(()) => break,
                Err(e) => writeln!(output, "Error, {}", e)?,
            }
        }
        writeln!(output)?;
    }
    Ok(())
}
