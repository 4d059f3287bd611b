mod json;
mod yaml;

pub use json::JsonFormatter;
pub use yaml::YamlFormatter;

use anyhow::Result;

use crate::cli::OutputFormat;
use crate::registration::Notification;

impl Notification {
    pub fn format(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => JsonFormatter::format(self),
            OutputFormat::Yaml => YamlFormatter::format(self),
        }
    }
}
