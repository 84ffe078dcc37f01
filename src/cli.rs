// Command line interface: pick a role, layer flags over the config file

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ConfigError, RuntimeConfig};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tank-link",
    about = "Encrypted LoRa control link and motion ramp runtime for a tank rover"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Run on the rover: receive frames and drive the motors
    Receiver(ReceiverOpts),
    /// Run on the base station: relay command requests over the radio
    Transmitter(LinkOpts),
    /// Transmitter and receiver over an in-memory link, scripted drive
    Simulate(SimOpts),
    /// Print a fresh random link key
    Keygen,
}

#[derive(Args, Debug, Clone)]
pub struct LinkOpts {
    /// JSON config file; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Link key, 64 hex characters
    #[arg(long, env = "TANK_LINK_KEY", hide_env_values = true)]
    pub key: Option<String>,
    /// Radio modem serial device
    #[arg(long)]
    pub radio: Option<String>,
    /// Radio modem baud rate
    #[arg(long)]
    pub baud: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct ReceiverOpts {
    #[command(flatten)]
    pub link: LinkOpts,
    /// H-bridge board serial device (simulated motors when omitted)
    #[arg(long)]
    pub motors: Option<String>,
    /// Watchdog timeout in milliseconds
    #[arg(long)]
    pub watchdog_ms: Option<u64>,
    /// Ramp step in PWM units
    #[arg(long)]
    pub ramp_step: Option<u8>,
    /// Ramp interval in milliseconds
    #[arg(long)]
    pub ramp_interval_ms: Option<u16>,
}

#[derive(Args, Debug, Clone)]
pub struct SimOpts {
    /// JSON config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

fn load(path: Option<&PathBuf>) -> Result<RuntimeConfig, ConfigError> {
    match path {
        Some(path) => RuntimeConfig::from_file(path),
        None => Ok(RuntimeConfig::default()),
    }
}

impl LinkOpts {
    pub fn resolve(&self) -> Result<RuntimeConfig, ConfigError> {
        let mut config = load(self.config.as_ref())?;
        self.apply(&mut config);
        Ok(config.normalized())
    }

    fn apply(&self, config: &mut RuntimeConfig) {
        if let Some(key) = &self.key {
            config.key = Some(key.clone());
        }
        if let Some(radio) = &self.radio {
            config.radio_port = radio.clone();
        }
        if let Some(baud) = self.baud {
            config.radio_baudrate = baud;
        }
    }
}

impl ReceiverOpts {
    pub fn resolve(&self) -> Result<RuntimeConfig, ConfigError> {
        let mut config = self.link.resolve()?;
        if let Some(motors) = &self.motors {
            config.motor_port = Some(motors.clone());
        }
        if let Some(ms) = self.watchdog_ms {
            config.watchdog_timeout_ms = ms;
        }
        if let Some(step) = self.ramp_step {
            config.ramp_step = step;
        }
        if let Some(ms) = self.ramp_interval_ms {
            config.ramp_interval_ms = ms;
        }
        Ok(config.normalized())
    }
}

impl SimOpts {
    pub fn resolve(&self) -> Result<RuntimeConfig, ConfigError> {
        Ok(load(self.config.as_ref())?.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiver_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "tank-link",
            "receiver",
            "--key",
            &"00".repeat(32),
            "--radio",
            "/dev/ttyACM0",
            "--motors",
            "/dev/ttyUSB1",
            "--ramp-step",
            "0",
        ])
        .expect("parse");

        let Cmd::Receiver(opts) = cli.cmd else {
            panic!("expected receiver");
        };
        let config = opts.resolve().expect("resolve");
        assert_eq!(config.radio_port, "/dev/ttyACM0");
        assert_eq!(config.motor_port.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.ramp_step, 1);
        assert!(config.frame_key().is_ok());
    }

    #[test]
    fn test_keygen_parses() {
        let cli = Cli::try_parse_from(["tank-link", "keygen"]).expect("parse");
        assert!(matches!(cli.cmd, Cmd::Keygen));
    }
}
