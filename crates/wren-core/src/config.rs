// Runtime configuration read from the environment
//
//   WREN_DEVICE   default device tag for `Expr::eval_register` and
//                 `evaluate` ("cpu" when unset or empty)
//   WREN_EAGER    "1" / "true" / "yes" / "on": `eval_register` computes the
//                 node before returning its handle
//
// The environment is read once per process. A bad WREN_DEVICE is reported
// every time the configuration is asked for, not silently replaced.

use std::env;
use std::sync::OnceLock;

use crate::device::DeviceTag;
use crate::error::Result;

pub const DEVICE_VAR: &str = "WREN_DEVICE";
pub const EAGER_VAR: &str = "WREN_EAGER";

/// Process-wide evaluation settings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuntimeConfig {
    pub default_device: DeviceTag,
    pub eager: bool,
}

static GLOBAL: OnceLock<Result<RuntimeConfig>> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

impl RuntimeConfig {
    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let default_device = match lookup(DEVICE_VAR) {
            Some(value) if !value.trim().is_empty() => value.parse()?,
            _ => DeviceTag::Cpu,
        };
        let eager = lookup(EAGER_VAR).is_some_and(|v| parse_bool(&v));
        Ok(RuntimeConfig {
            default_device,
            eager,
        })
    }

    /// Build from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// The configuration read from the environment on first use.
    pub fn global() -> Result<&'static RuntimeConfig> {
        GLOBAL
            .get_or_init(Self::from_env)
            .as_ref()
            .map_err(|e| e.clone())
    }
}
