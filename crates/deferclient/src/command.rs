// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Remote commands issued by the collector and the registry that keeps each of
//! them from running more than once.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Agent state as known by the collector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    #[serde(rename = "Name", default)]
    pub name: String,
}

impl Agent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// One diagnostic action requested by the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub command_type: String,
    #[serde(default)]
    pub requested: bool,
    #[serde(default)]
    pub executed: bool,
}

impl Command {
    pub fn new(id: i64, kind: CommandKind) -> Self {
        Self {
            id,
            command_type: kind.to_string(),
            requested: true,
            executed: false,
        }
    }

    pub fn kind(&self) -> CommandKind {
        CommandKind::from(self.command_type.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Trace,
    CpuProfile,
    MemProfile,
    Unknown(String),
}

impl From<&str> for CommandKind {
    fn from(value: &str) -> Self {
        match value {
            "trace" => CommandKind::Trace,
            "cpu-profile" => CommandKind::CpuProfile,
            "mem-profile" => CommandKind::MemProfile,
            other => CommandKind::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Trace => write!(f, "trace"),
            CommandKind::CpuProfile => write!(f, "cpu-profile"),
            CommandKind::MemProfile => write!(f, "mem-profile"),
            CommandKind::Unknown(other) => write!(f, "{other}"),
        }
    }
}

/// Reply sent by the collector to a send that asked for response analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorResponse {
    #[serde(rename = "AgentID", default)]
    pub agent: Agent,
    #[serde(
        rename = "Commands",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "null_as_empty"
    )]
    pub commands: Vec<Command>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Command>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<Command>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Set of command ids that have been dispatched.
///
/// Ids are never removed: a command runs at most once for the lifetime of the
/// registry.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    running: Mutex<HashSet<i64>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `id` as running. Returns false if it was already marked.
    pub fn try_start(&self, id: i64) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    pub fn is_running(&self, id: i64) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    pub fn len(&self) -> usize {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
