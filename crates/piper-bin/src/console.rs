//! Line-oriented control console.
//!
//! Stands in for the host's slot calls when running stand-alone:
//!
//! ```text
//! acquire         toggle acquisition
//! process         toggle processing
//! status          print state, throughput and save progress
//! save-to <dir>   change the save directory
//! help            list commands
//! quit            shut down
//! ```

use anyhow::{bail, Result};
use piper_device::PiperDevice;
use std::path::PathBuf;

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Acquire,
    Process,
    Status,
    SaveTo(PathBuf),
    Help,
    Quit,
}

/// One-line command summary.
pub const HELP: &str = "commands: acquire | process | status | save-to <dir> | help | quit";

impl Command {
    /// Parse a non-empty console line.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "acquire" => Command::Acquire,
            "process" => Command::Process,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "save-to" => {
                if rest.is_empty() {
                    bail!("save-to needs a directory");
                }
                Command::SaveTo(PathBuf::from(rest))
            }
            other => bail!("unknown command {:?} ({})", other, HELP),
        };

        if !rest.is_empty() && !matches!(command, Command::SaveTo(_)) {
            bail!("{} takes no arguments", word);
        }
        Ok(command)
    }
}

/// Apply `command` to the device and return the text to show.
///
/// [`Command::Quit`] is handled by the caller and yields an empty reply here.
pub fn execute(device: &PiperDevice, command: Command) -> Result<String> {
    let reply = match command {
        Command::Acquire => {
            let t = device.toggle_acquisition();
            format!("{} -> {}", t.from, t.to)
        }
        Command::Process => {
            let t = device.toggle_processing();
            format!("{} -> {}", t.from, t.to)
        }
        Command::Status => {
            let s = device.status();
            format!(
                "state={} throughput={:.2} {} saved={} save_to={}",
                s.state,
                s.throughput_hz,
                device.throughput().units(),
                s.saved_count,
                s.save_to.display()
            )
        }
        Command::SaveTo(dir) => {
            device.set_save_to(dir)?;
            format!("save_to={}", device.save_to().display())
        }
        Command::Help => HELP.to_string(),
        Command::Quit => String::new(),
    };
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use piper_device::DeviceSettings;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("acquire").unwrap(), Command::Acquire);
        assert_eq!(Command::parse("  PROCESS ").unwrap(), Command::Process);
        assert_eq!(Command::parse("status").unwrap(), Command::Status);
        assert_eq!(Command::parse("exit").unwrap(), Command::Quit);
        assert_eq!(
            Command::parse("save-to /tmp/run 7").unwrap(),
            Command::SaveTo(PathBuf::from("/tmp/run 7"))
        );
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(Command::parse("save-to").is_err());
        assert!(Command::parse("acquire now").is_err());
        assert!(Command::parse("launch").is_err());
    }

    #[test]
    fn executes_against_device() {
        let dir = tempfile::tempdir().unwrap();
        let device = PiperDevice::new(DeviceSettings {
            save_to: dir.path().to_path_buf(),
            pattern_size: 8,
            ..DeviceSettings::default()
        })
        .unwrap();

        assert_eq!(
            execute(&device, Command::Acquire).unwrap(),
            "NORMAL -> ACQUIRING"
        );
        assert_eq!(
            execute(&device, Command::Process).unwrap(),
            "ACQUIRING -> PROCESSING"
        );
        let status = execute(&device, Command::Status).unwrap();
        assert!(status.starts_with("state=PROCESSING"));
        assert!(status.contains("throughput=0.00 Hz"), "{}", status);

        let next = dir.path().join("next");
        let reply = execute(&device, Command::SaveTo(next.clone())).unwrap();
        assert!(reply.ends_with(&next.display().to_string()));
        assert!(execute(&device, Command::SaveTo(PathBuf::new())).is_err());
    }
}
