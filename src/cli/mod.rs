mod args;

pub use args::{Args, Command, LogFormat, OutputFormat};
