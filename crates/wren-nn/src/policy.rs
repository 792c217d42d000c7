use std::fmt;

use wren_core::error::{Error, Result};

/// Construction-time behavior switches for a layer.
///
/// `feedback_output` turns on gradient buffering: forward calls keep what
/// the matching backward call needs. `update` marks layers with trainable
/// parameters; elementwise layers have none and reject it.
///
/// Both default to off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerPolicy {
    pub feedback_output: bool,
    pub update: bool,
}

impl LayerPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feedback_output(mut self, enabled: bool) -> Self {
        self.feedback_output = enabled;
        self
    }

    pub fn with_update(mut self, enabled: bool) -> Self {
        self.update = enabled;
        self
    }

    /// Parse named options, e.g. `[("gradient-buffering", "enabled")]`.
    ///
    /// Recognized names: `gradient-buffering` (alias `feedback-output`) and
    /// `update`. Values: `enabled` / `disabled` (`on` / `off`, `true` /
    /// `false` also accepted). Later options override earlier ones.
    pub fn from_options(options: &[(&str, &str)]) -> Result<Self> {
        let mut policy = Self::default();
        for &(name, value) in options {
            let invalid = || Error::InvalidPolicy {
                option: name.to_string(),
                value: value.to_string(),
            };
            let enabled = parse_switch(value).ok_or_else(invalid)?;
            match name.trim() {
                "gradient-buffering" | "feedback-output" => policy.feedback_output = enabled,
                "update" => policy.update = enabled,
                _ => return Err(invalid()),
            }
        }
        Ok(policy)
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "enabled" | "on" | "true" => Some(true),
        "disabled" | "off" | "false" => Some(false),
        _ => None,
    }
}

impl fmt::Display for LayerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = |on: bool| if on { "enabled" } else { "disabled" };
        write!(
            f,
            "gradient-buffering={}, update={}",
            state(self.feedback_output),
            state(self.update)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_disabled() {
        let p = LayerPolicy::default();
        assert!(!p.feedback_output);
        assert!(!p.update);
        assert_eq!(LayerPolicy::from_options(&[]).unwrap(), p);
    }

    #[test]
    fn test_from_options() {
        let p = LayerPolicy::from_options(&[("gradient-buffering", "enabled")]).unwrap();
        assert!(p.feedback_output);
        let p = LayerPolicy::from_options(&[
            ("feedback-output", "on"),
            ("gradient-buffering", "Disabled"),
        ])
        .unwrap();
        assert!(!p.feedback_output);
    }

    #[test]
    fn test_invalid_options() {
        let err = LayerPolicy::from_options(&[("dropout", "enabled")]).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidPolicy {
                option: "dropout".into(),
                value: "enabled".into()
            }
        );
        assert!(LayerPolicy::from_options(&[("gradient-buffering", "maybe")]).is_err());
    }

    #[test]
    fn test_display() {
        let p = LayerPolicy::new().with_feedback_output(true);
        assert_eq!(p.to_string(), "gradient-buffering=enabled, update=disabled");
    }
}
