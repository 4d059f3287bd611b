use anyhow::{Context, Result};

use crate::registration::Notification;

pub struct JsonFormatter;

impl JsonFormatter {
    /// One notification per line
    pub fn format(notification: &Notification) -> Result<String> {
        serde_json::to_string(notification).context("Failed to serialize notification as JSON")
    }
}
