pub mod cli;
pub mod config;
pub mod failsafe;
pub mod messages;
pub mod motor;
pub mod protocol;
pub mod radio;
pub mod receiver;
pub mod sim;
pub mod transmitter;
