use crate::error::{Error, Result};
use regex::Regex;
use std::collections::BTreeMap;

/// Launch configuration of one service. Immutable once handed to the supervisor.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    /// Unique within a run; also the container name.
    pub id: String,
    /// Container image, or the executable for the native runtime.
    pub image: String,
    pub args: Vec<String>,
    /// `None` means the variable is forwarded from the parent environment.
    pub env: BTreeMap<String, Option<String>>,
    /// Port the service listens on, as advertised to applications.
    pub port: Option<String>,
    pub port_forwards: Vec<String>,
    pub mounts: Vec<String>,
    /// Every pattern must match some log line, in any order, before the
    /// service counts as ready.
    pub startup_patterns: Vec<Regex>,
}

impl ServiceDescriptor {
    pub fn new(id: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            port: None,
            port_forwards: Vec::new(),
            mounts: Vec::new(),
            startup_patterns: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), Some(value.into()));
        self
    }

    /// Forward `name` from the parent environment.
    pub fn forward_env(mut self, name: impl Into<String>) -> Self {
        self.env.insert(name.into(), None);
        self
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    pub fn port_forward(mut self, spec: impl Into<String>) -> Self {
        self.port_forwards.push(spec.into());
        self
    }

    pub fn mount(mut self, spec: impl Into<String>) -> Self {
        self.mounts.push(spec.into());
        self
    }

    /// Add a readiness pattern. Invalid regular expressions are rejected here,
    /// never at start time.
    pub fn startup_pattern(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            Error::Catalog(format!(
                "Invalid start pattern '{}' for service '{}': {}",
                pattern, self.id, e
            ))
        })?;
        self.startup_patterns.push(regex);
        Ok(self)
    }

    /// Parse an `env` entry: `NAME=VALUE`, or a bare `NAME` to forward.
    pub(crate) fn parse_env_entry(entry: &str) -> (String, Option<String>) {
        match entry.split_once('=') {
            Some((name, value)) => (name.to_string(), Some(value.to_string())),
            None => (entry.to_string(), None),
        }
    }
}
