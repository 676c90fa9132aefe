use std::time::Duration;

use garden_runtime::{
    decode_error_body, decode_parcels_json, decode_status_json, Command, GardenService,
    ParcelBatch, SimulationState, TransportError,
};
use reqwest::{Client, Method};
use tracing::trace;

/// [`GardenService`] over the simulation's REST API.
#[derive(Debug, Clone)]
pub struct HttpGardenService {
    client: Client,
    base_url: String,
}

impl HttpGardenService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, method: Method, path: &str) -> Result<String, TransportError> {
        let url = self.url(path);
        trace!(target: "garden::http", %method, %url, "http.request");
        let response = self
            .client
            .request(method, &url)
            .send()
            .await
            .map_err(|err| TransportError::Request {
                endpoint: path.to_string(),
                message: err.to_string(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Request {
                endpoint: path.to_string(),
                message: err.to_string(),
            })?;

        if !status.is_success() {
            let message = decode_error_body(&body)
                .map(|error| error.message)
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            return Err(TransportError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }
}

fn command_route(command: Command) -> (Method, String) {
    match command {
        Command::Start => (Method::POST, "simulation/start".to_string()),
        Command::Pause => (Method::POST, "simulation/pause".to_string()),
        Command::Reset => (Method::POST, "simulation/reset".to_string()),
        Command::Step => (Method::POST, "simulation/step".to_string()),
        Command::SetSpeed(speed) => (
            Method::PUT,
            format!("simulation/speed?speedMultiplier={}", speed.get()),
        ),
    }
}

impl GardenService for HttpGardenService {
    async fn fetch_parcels(&self) -> Result<ParcelBatch, TransportError> {
        let path = "parcels";
        let body = self.send(Method::GET, path).await?;
        decode_parcels_json(&body).map_err(|source| TransportError::Decode {
            endpoint: path.to_string(),
            source,
        })
    }

    async fn fetch_status(&self) -> Result<SimulationState, TransportError> {
        let path = "simulation/status";
        let body = self.send(Method::GET, path).await?;
        decode_status_json(&body).map_err(|source| TransportError::Decode {
            endpoint: path.to_string(),
            source,
        })
    }

    async fn execute(&self, command: Command) -> Result<(), TransportError> {
        let (method, path) = command_route(command);
        self.send(method, &path).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use garden_runtime::SpeedMultiplier;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one canned response and hand back the request line it answered.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let read = socket.read(&mut buf).await.expect("read");
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket
                .write_all(response.as_bytes())
                .await
                .expect("write");
            let text = String::from_utf8_lossy(&request).into_owned();
            text.lines().next().unwrap_or_default().to_string()
        });
        (format!("http://{addr}/api/"), handle)
    }

    fn service(base: &str) -> HttpGardenService {
        HttpGardenService::new(base, Duration::from_secs(2)).expect("client")
    }

    #[test]
    fn speed_route_carries_query_parameter() {
        let speed = SpeedMultiplier::new(2.5).expect("speed");
        let (method, path) = command_route(Command::SetSpeed(speed));
        assert_eq!(method, Method::PUT);
        assert_eq!(path, "simulation/speed?speedMultiplier=2.5");
        assert_eq!(
            command_route(Command::Step),
            (Method::POST, "simulation/step".to_string())
        );
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let service = service("http://localhost:8080/api/");
        assert_eq!(service.base_url(), "http://localhost:8080/api");
    }

    #[tokio::test]
    async fn fetch_status_decodes_body() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"currentStep": 42, "isRunning": true, "speedMultiplier": 2.0}"#,
        )
        .await;
        let state = service(&base).fetch_status().await.expect("status");
        assert_eq!(state.current_step, 42);
        assert!(state.is_running);
        assert_eq!(
            server.await.expect("server"),
            "GET /api/simulation/status HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn fetch_parcels_normalizes_coordinates() {
        let (base, _server) = serve_once(
            "200 OK",
            r#"[{"id": 1, "xcoordinate": 0, "ycoordinate": 1}, {"id": 2, "xCoordinate": 3, "yCoordinate": 4}]"#,
        )
        .await;
        let batch = service(&base).fetch_parcels().await.expect("parcels");
        assert_eq!(batch.parcels.len(), 2);
        assert!(batch.parcels.iter().all(|parcel| parcel.coord.is_some()));
    }

    #[tokio::test]
    async fn error_body_message_is_surfaced() {
        let (base, server) = serve_once(
            "409 Conflict",
            r#"{"status": 409, "message": "Simulation already running", "timestamp": 1700000000000}"#,
        )
        .await;
        let err = service(&base)
            .execute(Command::Start)
            .await
            .expect_err("conflict");
        match err {
            TransportError::Status {
                status, message, ..
            } => {
                assert_eq!(status, 409);
                assert_eq!(message, "Simulation already running");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            server.await.expect("server"),
            "POST /api/simulation/start HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn undecodable_status_is_a_decode_error() {
        let (base, _server) = serve_once("200 OK", "not json").await;
        let err = service(&base).fetch_status().await.expect_err("decode");
        assert!(matches!(err, TransportError::Decode { .. }));
        assert_eq!(err.endpoint(), "simulation/status");
    }

    #[tokio::test]
    async fn refused_connection_is_a_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);
        let err = service(&format!("http://{addr}/api"))
            .fetch_parcels()
            .await
            .expect_err("refused");
        assert!(matches!(err, TransportError::Request { .. }));
    }
}
