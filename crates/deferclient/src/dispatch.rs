// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::client::DeferPanicClient;
use crate::command::{CollectorResponse, Command, CommandKind, CommandRegistry};
use crate::config::{CPU_PROFILE_PATH, MEM_PROFILE_PATH, TRACE_PATH};
use crate::profiler::Profiler;

/// Result of one dispatched capture, posted back to the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureUpload {
    #[serde(rename = "CommandId")]
    pub command_id: i64,
    #[serde(rename = "Out", with = "serde_base64")]
    pub out: Vec<u8>,
    /// Executable the trace was taken from, sent with trace captures only
    #[serde(
        rename = "Pkg",
        with = "serde_base64",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub pkg: Vec<u8>,
    /// Set when the capture could not be produced
    #[serde(rename = "Ignored")]
    pub ignored: bool,
}

mod serde_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = base64::engine::general_purpose::STANDARD.encode(value);
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Launches the captures requested in collector replies, once per command id.
pub struct RemoteCommandDispatcher {
    registry: Arc<CommandRegistry>,
    profiler: Arc<dyn Profiler>,
}

impl RemoteCommandDispatcher {
    pub fn new(profiler: Arc<dyn Profiler>) -> Self {
        Self {
            registry: Arc::new(CommandRegistry::new()),
            profiler,
        }
    }

    /// Same registry, different profiler
    pub fn with_profiler(&self, profiler: Arc<dyn Profiler>) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            profiler,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Spawns a capture task for every command of `response` not seen before.
    /// Returns the number of tasks launched.
    pub fn dispatch(&self, client: &DeferPanicClient, response: CollectorResponse) -> usize {
        let mut launched = 0;
        for command in response.commands {
            let kind = command.kind();
            if let CommandKind::Unknown(command_type) = &kind {
                warn!("Unknown command {command_type}");
                continue;
            }
            if !self.registry.try_start(command.id) {
                continue;
            }

            debug!(
                "Dispatching {kind} command {} for agent {}",
                command.id, response.agent.name
            );
            let client_clone = client.clone();
            let profiler = Arc::clone(&self.profiler);
            client.spawn(async move {
                run_capture(client_clone, profiler, command, kind).await;
            });
            launched += 1;
        }
        launched
    }
}

async fn run_capture(
    client: DeferPanicClient,
    profiler: Arc<dyn Profiler>,
    command: Command,
    kind: CommandKind,
) {
    let (captured, path) = match kind {
        CommandKind::Trace => (profiler.trace().await, TRACE_PATH),
        CommandKind::CpuProfile => (profiler.cpu_profile().await, CPU_PROFILE_PATH),
        CommandKind::MemProfile => (profiler.mem_profile().await, MEM_PROFILE_PATH),
        CommandKind::Unknown(_) => return,
    };

    let upload = match captured {
        Ok(out) => {
            let pkg = match kind {
                CommandKind::Trace => profiler.trace_package().await.unwrap_or_default(),
                _ => Vec::new(),
            };
            CaptureUpload {
                command_id: command.id,
                out,
                pkg,
                ignored: false,
            }
        }
        Err(e) => {
            error!("Command {} could not be executed: {e}", command.id);
            CaptureUpload {
                command_id: command.id,
                out: Vec::new(),
                pkg: Vec::new(),
                ignored: true,
            }
        }
    };

    match serde_json::to_vec(&upload) {
        Ok(body) => {
            client
                .postit(Bytes::from(body), &client.config().url(path), false)
                .await
        }
        Err(e) => error!("Failed to serialize {kind} upload: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::test_support::{collector_reply, eventually, CountingProfiler, RecordingTransport};
    use reqwest::StatusCode;
    use tracing_test::traced_test;

    fn client_with(
        transport: Arc<RecordingTransport>,
        profiler: Arc<CountingProfiler>,
    ) -> DeferPanicClient {
        let config = ClientConfig {
            api_base: "http://collector/v1.17".to_string(),
            ..ClientConfig::with_token("token")
        };
        DeferPanicClient::with_transport(config, transport)
            .unwrap()
            .with_profiler(profiler)
    }

    fn response(commands: &[Command]) -> CollectorResponse {
        serde_json::from_str(&collector_reply(commands)).unwrap()
    }

    #[tokio::test]
    async fn test_each_kind_uploads_to_its_endpoint() {
        let transport = Arc::new(RecordingTransport::default());
        let profiler = Arc::new(CountingProfiler::default());
        let client = client_with(transport.clone(), profiler.clone());

        let launched = client.analyse_response(
            collector_reply(&[
                Command::new(1, CommandKind::Trace),
                Command::new(2, CommandKind::CpuProfile),
                Command::new(3, CommandKind::MemProfile),
            ])
            .as_bytes(),
        );
        assert_eq!(launched, 3);
        assert!(eventually(|| transport.requests().len() == 3).await);

        let trace = transport.requests_to("/uploads/trace/create").remove(0);
        assert_eq!(trace.json()["CommandId"], 1);
        assert_eq!(trace.json()["Out"], "dHJhY2U=");
        assert_eq!(trace.json()["Pkg"], "cGtn");
        assert_eq!(trace.json()["Ignored"], false);

        let cpu = transport.requests_to("/uploads/cpuprofile/create").remove(0);
        assert_eq!(cpu.json()["CommandId"], 2);
        assert!(cpu.json().get("Pkg").is_none());

        let mem = transport.requests_to("/uploads/memprofile/create").remove(0);
        assert_eq!(mem.json()["CommandId"], 3);
        assert_eq!(mem.json()["Out"], "");
        assert_eq!(mem.json()["Ignored"], true);
        assert!(mem.json().get("Pkg").is_none());
        assert_eq!(profiler.count(), 3);
    }

    #[tokio::test]
    async fn test_repeated_command_is_not_dispatched_again() {
        let transport = Arc::new(RecordingTransport::default());
        let profiler = Arc::new(CountingProfiler::default());
        let client = client_with(transport.clone(), profiler.clone());
        let dispatcher = RemoteCommandDispatcher::new(profiler.clone());

        let first = dispatcher.dispatch(&client, response(&[Command::new(5, CommandKind::Trace)]));
        let second = dispatcher.dispatch(
            &client,
            response(&[
                Command::new(5, CommandKind::Trace),
                Command::new(5, CommandKind::CpuProfile),
            ]),
        );

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert!(eventually(|| transport.requests().len() == 1).await);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(profiler.count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_one_reply_run_once() {
        let transport = Arc::new(RecordingTransport::default());
        let profiler = Arc::new(CountingProfiler::default());
        let client = client_with(transport.clone(), profiler.clone());

        let launched = client.analyse_response(
            collector_reply(&[
                Command::new(9, CommandKind::Trace),
                Command::new(9, CommandKind::Trace),
            ])
            .as_bytes(),
        );

        assert_eq!(launched, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unknown_command_is_logged_and_skipped() {
        let transport = Arc::new(RecordingTransport::replying(StatusCode::OK, ""));
        let profiler = Arc::new(CountingProfiler::default());
        let client = client_with(transport.clone(), profiler.clone());

        let launched = client.analyse_response(
            collector_reply(&[Command::new(4, CommandKind::Unknown("goroutines".into()))])
                .as_bytes(),
        );

        assert_eq!(launched, 0);
        assert!(logs_contain("Unknown command goroutines"));
        assert!(!client.commands().is_running(4));
        assert_eq!(profiler.count(), 0);
    }

    #[test]
    fn test_capture_upload_round_trips_base64() {
        let upload = CaptureUpload {
            command_id: 3,
            out: vec![0, 159, 146, 150],
            pkg: Vec::new(),
            ignored: false,
        };
        let json = serde_json::to_string(&upload).unwrap();
        assert_eq!(json, r#"{"CommandId":3,"Out":"AJ+Slg==","Ignored":false}"#);
        assert_eq!(
            serde_json::from_str::<CaptureUpload>(&json).unwrap(),
            upload
        );
    }

    #[test]
    fn test_trace_upload_carries_package() {
        let upload = CaptureUpload {
            command_id: 1,
            out: b"Out".to_vec(),
            pkg: b"Pkg".to_vec(),
            ignored: false,
        };
        let json = serde_json::to_value(&upload).unwrap();
        assert_eq!(json["Pkg"], "UGtn");

        let decoded: CaptureUpload = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.pkg, b"Pkg");
    }
}
