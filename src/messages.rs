// Message types exchanged with the command source and the status boundary

use serde::{Deserialize, Serialize};

/// Command kind carried in every control frame
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    #[default]
    Stop = 0,
    Forward = 1,
    Backward = 2,
    Left = 3,
    Right = 4,
    SetSpeed = 5,
}

impl Command {
    /// Map a wire code to a command; unknown codes degrade to Stop
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Command::Forward,
            2 => Command::Backward,
            3 => Command::Left,
            4 => Command::Right,
            5 => Command::SetSpeed,
            _ => Command::Stop,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a user-facing command name ("forward", "setspeed", ...).
    /// Anything unrecognised becomes Stop.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "forward" => Command::Forward,
            "backward" => Command::Backward,
            "left" => Command::Left,
            "right" => Command::Right,
            "setspeed" | "set_speed" | "speed" => Command::SetSpeed,
            _ => Command::Stop,
        }
    }
}

/// Command from UI/gateway -> transmitter
///
/// Speeds are optional and arrive as plain integers; the transmitter
/// clamps them into 0-255.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_speed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_speed: Option<i64>,
}

impl CommandRequest {
    pub fn new(command: Command) -> Self {
        Self {
            command: command_name(command).to_string(),
            left_speed: None,
            right_speed: None,
        }
    }

    pub fn with_speeds(command: Command, left: u8, right: u8) -> Self {
        Self {
            command: command_name(command).to_string(),
            left_speed: Some(left.into()),
            right_speed: Some(right.into()),
        }
    }

    pub fn kind(&self) -> Command {
        Command::from_name(&self.command)
    }
}

fn command_name(command: Command) -> &'static str {
    match command {
        Command::Stop => "stop",
        Command::Forward => "forward",
        Command::Backward => "backward",
        Command::Left => "left",
        Command::Right => "right",
        Command::SetSpeed => "setspeed",
    }
}

/// Last commanded maneuver (not the instantaneous ramped output)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoverState {
    #[default]
    Stop,
    Forward,
    Backward,
    Left,
    Right,
}

/// Link health as seen by the receiver watchdog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkHealth {
    Ok,
    Silent,
}

/// Periodic receiver status (observational only)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiverStatus {
    pub state: RoverState,
    pub left_speed: u8,
    pub right_speed: u8,
    pub left_command: i16,
    pub right_command: i16,
    pub link: LinkHealth,
    pub last_sequence: Option<u32>,
    pub frames_accepted: u64,
    pub auth_failures: u64,
    pub stale_frames: u64,
    pub uptime_s: u64,
}

/// Periodic transmitter status, mirrors what the gateway reports upstream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransmitterStatus {
    #[serde(rename = "type")]
    pub kind: String,
    pub tank_id: String,
    pub state: String,
    pub left_speed: u8,
    pub right_speed: u8,
    pub next_sequence: u32,
    pub frames_sent: u64,
    pub tx_failures: u64,
    pub uptime: u64,
}
