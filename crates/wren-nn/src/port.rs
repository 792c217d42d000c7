// Ports: role-keyed inputs and outputs of a layer
//
// A layer declares which roles it reads and writes. Values travel between
// layers in a PortMap keyed by role:
//
//   forward:   PortMap { Input  => x }   ->  PortMap { Output => y }
//   backward:  PortMap { Output => dy }  ->  PortMap { Input  => dx }
//
// An empty map from `feed_backward` means "no gradient": the layer was built
// without backward support.

use std::collections::BTreeMap;
use std::fmt;

use wren_core::error::{Error, Result};
use wren_core::expr::Operand;

/// Role of a value at a layer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Port {
    Input,
    Output,
}

impl Port {
    pub fn name(&self) -> &'static str {
        match self {
            Port::Input => "input",
            Port::Output => "output",
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Values keyed by port role.
#[derive(Clone, Default, PartialEq)]
pub struct PortMap {
    entries: BTreeMap<Port, Operand>,
}

impl PortMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map holding one value.
    pub fn single(port: Port, value: impl Into<Operand>) -> Self {
        Self::new().set(port, value)
    }

    /// Set the value for `port`, replacing any previous one.
    pub fn set(mut self, port: Port, value: impl Into<Operand>) -> Self {
        self.entries.insert(port, value.into());
        self
    }

    /// The value for a required role.
    pub fn get(&self, port: Port) -> Result<&Operand> {
        self.entries.get(&port).ok_or_else(|| Error::MissingPort {
            port: port.name().to_string(),
        })
    }

    /// Remove and return the value for a required role.
    pub fn take(&mut self, port: Port) -> Result<Operand> {
        self.entries.remove(&port).ok_or_else(|| Error::MissingPort {
            port: port.name().to_string(),
        })
    }

    pub fn contains(&self, port: Port) -> bool {
        self.entries.contains_key(&port)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ports(&self) -> impl Iterator<Item = Port> + '_ {
        self.entries.keys().copied()
    }

    /// Reject roles outside `declared`.
    pub fn validate(&self, declared: &[Port]) -> Result<()> {
        match self.ports().find(|p| !declared.contains(p)) {
            Some(port) => Err(Error::UnexpectedPort {
                port: port.name().to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for PortMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k.name(), v)))
            .finish()
    }
}
