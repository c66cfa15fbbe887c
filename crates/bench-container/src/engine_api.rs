//! Docker Engine API client over the local Unix socket.

use crate::error::RuntimeError;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::StatusCode;
use hyper_util::client::legacy::Client;
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Error body returned by the Engine API.
#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Clone)]
pub(crate) struct EngineApi {
    socket: PathBuf,
    client: Client<UnixConnector, Full<Bytes>>,
}

impl fmt::Debug for EngineApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineApi")
            .field("socket", &self.socket)
            .finish()
    }
}

impl EngineApi {
    pub(crate) fn new(socket: impl AsRef<Path>) -> Self {
        Self {
            socket: socket.as_ref().to_path_buf(),
            client: Client::unix(),
        }
    }

    pub(crate) fn socket(&self) -> &Path {
        &self.socket
    }

    /// `GET path`; returns the body of a 2xx response.
    pub(crate) async fn get(&self, path: &str) -> Result<Bytes, RuntimeError> {
        let uri: hyper::Uri = Uri::new(&self.socket, path).into();
        let response = self.client.get(uri).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();
        check_status(status, &body)?;
        Ok(body)
    }
}

fn check_status(status: StatusCode, body: &[u8]) -> Result<(), RuntimeError> {
    if status.is_success() {
        return Ok(());
    }
    let message = serde_json::from_slice::<ApiMessage>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());
    Err(RuntimeError::Api {
        status: status.as_u16(),
        body: message,
    })
}
