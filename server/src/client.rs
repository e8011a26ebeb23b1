use crate::machine::Machine;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sicide_core::wire::{
    Ack, BeginRequest, LoadResponse, MemoryRequest, MemoryResponse, StepResponse,
    SyntaxCheckRequest, SyntaxCheckResponse, SyntaxFileResult,
};
use sicide_core::{Error, LoadOutcome, LoadRequest, MachineMode, RegisterSnapshot, Result};
use serde_json::json;
use tracing::debug;

/// HTTP client for the simulator's POST-only JSON API.
#[derive(Debug, Clone)]
pub struct HttpMachine {
    client: Client,
    base_url: String,
}

fn transport(err: reqwest::Error) -> Error {
    Error::Transport(err.to_string())
}

impl HttpMachine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(%url, "simulator request");

        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("/{endpoint} answered {status}: {text}")));
        }

        res.json::<R>().await.map_err(transport)
    }
}

impl Machine for HttpMachine {
    async fn begin(&self, mode: MachineMode) -> Result<()> {
        let ack: Ack = self
            .post("begin", &BeginRequest { mode })
            .await
            .map_err(|e| Error::RemoteUnavailable(e.to_string()))?;
        if ack.ok {
            debug!(message = %ack.message, "simulator reset");
            Ok(())
        } else {
            Err(Error::RemoteUnavailable(ack.message))
        }
    }

    async fn load(&self, request: &LoadRequest) -> Result<LoadOutcome> {
        let response: LoadResponse = self.post("load", request).await?;
        response.into_outcome()
    }

    async fn step(&self) -> Result<RegisterSnapshot> {
        let response: StepResponse = self.post("step", &json!({})).await?;
        response.into_registers()
    }

    async fn memory(&self, start: u32, end: u32) -> Result<Vec<u8>> {
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }
        let response: MemoryResponse = self.post("memory", &MemoryRequest { start, end }).await?;
        response.into_values()
    }

    async fn syntax_check(
        &self,
        texts: Vec<String>,
        file_names: Vec<String>,
    ) -> Result<Vec<SyntaxFileResult>> {
        let response: SyntaxCheckResponse = self
            .post("syntax-check", &SyntaxCheckRequest { texts, file_names })
            .await?;
        if response.files.is_empty() && !response.ok {
            return Err(Error::Remote(response.message));
        }
        Ok(response.files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{http::StatusCode, Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    async fn spawn_fake(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn simulator() -> Router {
        Router::new()
            .route(
                "/begin",
                post(|Json(body): Json<Value>| async move {
                    match body["type"].as_str() {
                        Some("sic") | Some("sicxe") => {
                            Json(json!({"ok": true, "message": "Simulation initialized"}))
                        }
                        _ => Json(json!({"ok": false, "message": "Unknown type"})),
                    }
                }),
            )
            .route(
                "/load",
                post(|Json(body): Json<Value>| async move {
                    let file = body["filePaths"][0].as_str().unwrap_or_default().to_string();
                    Json(json!({
                        "ok": true,
                        "message": "OK",
                        "files": [{
                            "fileName": file,
                            "listing": {"rows": [{"addressHex": "001000", "rawCodeHex": "4B101036"}], "watch": []}
                        }],
                        "registers": {"A":0,"X":0,"L":0,"S":0,"T":0,"B":0,"SW":0,"PC":4096,"F":"0.0"}
                    }))
                }),
            )
            .route(
                "/step",
                post(|| async {
                    Json(json!({
                        "ok": true,
                        "message": "stepped",
                        "registers": {"A":1,"X":0,"L":0,"S":0,"T":0,"B":0,"SW":0,"PC":4099,"F":"0.0"}
                    }))
                }),
            )
            .route(
                "/memory",
                post(|Json(body): Json<Value>| async move {
                    let start = body["start"].as_u64().unwrap_or(0);
                    let end = body["end"].as_u64().unwrap_or(0);
                    let values: Vec<u64> = (start..=end).map(|a| a & 0xFF).collect();
                    Json(json!({"start": start, "end": end, "values": values}))
                }),
            )
            .route(
                "/syntax-check",
                post(|| async {
                    Json(json!({
                        "ok": false,
                        "message": "Errors found.",
                        "files": [
                            {"fileName": "main.asm", "ok": true},
                            {"fileName": "util.asm", "ok": false, "compileErrors": [{"row": 3, "col": 5, "message": "bad", "nonbreaking": false}]}
                        ]
                    }))
                }),
            )
    }

    #[tokio::test]
    async fn round_trips_against_fake_simulator() {
        let machine = HttpMachine::new(spawn_fake(simulator()).await);

        machine.begin(MachineMode::Sicxe).await.unwrap();

        let request = LoadRequest {
            file_paths: vec!["/p/main.asm".into()],
            output_dir: "/p/out".into(),
            ..LoadRequest::default()
        };
        let LoadOutcome::Loaded { registers, files } = machine.load(&request).await.unwrap() else {
            panic!("expected a successful load");
        };
        assert_eq!(registers.pc, 0x1000);
        assert_eq!(files[0].file_name, "/p/main.asm");

        let snapshot = machine.step().await.unwrap();
        assert_eq!((snapshot.a, snapshot.pc), (1, 4099));

        assert_eq!(machine.memory(0x10FE, 0x1101).await.unwrap(), vec![0xFE, 0xFF, 0x00, 0x01]);

        let results = machine
            .syntax_check(vec!["".into(), "".into()], vec!["main.asm".into(), "util.asm".into()])
            .await
            .unwrap();
        assert!(results[0].ok);
        assert_eq!(results[1].compile_errors[0].row, 3);
    }

    #[tokio::test]
    async fn rejected_begin_is_remote_unavailable() {
        let app = Router::new().route(
            "/begin",
            post(|| async { Json(json!({"ok": false, "message": "no engine"})) }),
        );
        let machine = HttpMachine::new(spawn_fake(app).await);
        assert_eq!(
            machine.begin(MachineMode::Sic).await,
            Err(Error::RemoteUnavailable("no engine".into()))
        );
    }

    #[tokio::test]
    async fn server_error_is_transport_failure() {
        let app = Router::new().route(
            "/step",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let machine = HttpMachine::new(spawn_fake(app).await);
        match machine.step().await {
            Err(Error::Transport(message)) => assert!(message.contains("500")),
            other => panic!("expected a transport failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_simulator_is_transport_failure() {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let machine = HttpMachine::new(format!("http://{addr}/"));
        assert!(matches!(machine.step().await, Err(Error::Transport(_))));
        assert!(matches!(
            machine.begin(MachineMode::Sicxe).await,
            Err(Error::RemoteUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn inverted_memory_range_is_rejected_locally() {
        let machine = HttpMachine::new("http://127.0.0.1:9");
        assert_eq!(
            machine.memory(5, 1).await,
            Err(Error::InvalidRange { start: 5, end: 1 })
        );
    }
}
