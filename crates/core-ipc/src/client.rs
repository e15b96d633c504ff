//! Minimal synchronous client: one request, one response. Used by the
//! control tooling and the integration tests.

use crate::frame::{FrameError, read_frame, write_frame};
use crate::messages::{DecodeError, Request, Response};
use std::os::unix::net::UnixStream;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect failed: {0}")]
    Connect(std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

pub struct IpcClient {
    stream: UnixStream,
}

impl IpcClient {
    pub fn connect(name: &str) -> Result<Self, ClientError> {
        Self::connect_path(&crate::server::socket_path(name))
    }

    pub fn connect_path(path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path).map_err(ClientError::Connect)?;
        Ok(Self { stream })
    }

    pub fn request(&mut self, request: &Request) -> Result<Response, ClientError> {
        write_frame(&mut self.stream, &request.encode()).map_err(FrameError::Io)?;
        self.read_response()
    }

    /// Read the next server frame; responses and key-event notifications
    /// share the stream when investigate mode is active.
    pub fn read_response(&mut self) -> Result<Response, ClientError> {
        let frame = read_frame(&mut self.stream)?;
        Ok(Response::decode(&frame)?)
    }

    /// Escape hatch for framing tests.
    pub fn stream_mut(&mut self) -> &mut UnixStream {
        &mut self.stream
    }
}
