// src/registry/marker.rs

use crate::registry::ProcessSnapshot;
use crate::types::InstanceId;

/// Environment variable carrying the bare instance id.
pub const INSTANCE_ID_ENV: &str = "INSTANCE_ID";

/// Property name used for the option-channel token (`-Dinstance.id=<id>`).
pub const INSTANCE_ID_PROPERTY: &str = "instance.id";

/// The tag that links an OS process back to a logical instance.
///
/// It is injected twice: as `INSTANCE_ID=<id>` and as `-Dinstance.id=<id>`
/// appended to the options channel, so it shows up either in the process
/// environment or on the command line of runtimes that expand the options
/// variable into arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker {
    id: InstanceId,
}

impl Marker {
    pub fn new(id: InstanceId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn env_value(&self) -> String {
        self.id.to_string()
    }

    pub fn option_token(&self) -> String {
        format!("-D{INSTANCE_ID_PROPERTY}={}", self.id)
    }

    /// Append the option token to an existing options-channel value.
    pub fn append_to(&self, existing: Option<&str>) -> String {
        match existing.map(str::trim) {
            Some(prev) if !prev.is_empty() => format!("{prev} {}", self.option_token()),
            _ => self.option_token(),
        }
    }

    /// Whole-token match against a process' environment and command line.
    pub fn matches(&self, process: &ProcessSnapshot) -> bool {
        let id = self.env_value();
        let token = self.option_token();

        let env_hit = process.environ.iter().any(|entry| {
            let Some((key, value)) = entry.split_once('=') else {
                return false;
            };
            (key == INSTANCE_ID_ENV && value == id)
                || value.split_whitespace().any(|t| t == token)
        });

        env_hit
            || process
                .cmd
                .iter()
                .any(|arg| arg.split_whitespace().any(|t| t == token))
    }
}
