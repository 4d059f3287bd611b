use anyhow::{Context, Result};

use crate::registration::Notification;

pub struct YamlFormatter;

impl YamlFormatter {
    /// A YAML document, starting with a `---` separator
    pub fn format(notification: &Notification) -> Result<String> {
        let body =
            serde_yaml::to_string(notification).context("Failed to serialize notification as YAML")?;
        Ok(format!("---\n{}", body.trim_end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::notification;

    #[test]
    fn test_document_separator() {
        let out = YamlFormatter::format(&notification(vec!["x".to_string()])).unwrap();
        assert!(out.starts_with("---\n"));
        assert!(out.contains("source: k8s-events"));
        assert!(out.contains("type: update"));
        assert!(!out.ends_with('\n'));

        let parsed: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(parsed["event"]["name"].as_str(), Some("web-1"));
        assert_eq!(parsed["diffs"][0].as_str(), Some("x"));
    }
}
