pub mod app;
pub mod canvas;
pub mod cli;
pub mod color;
pub mod command;
pub mod config;
pub mod flock;
pub mod ipc;
pub mod overlay;
pub mod render;
mod registry;
pub mod sampler;
pub mod wayland;

pub use app::App;
pub use cli::{Cli, Launch, MonitorTarget};
pub use color::Rgb;
pub use command::{Command, Response};
pub use config::Config;
pub use overlay::{Mode, Overlay};
pub use wayland::Wayland;
