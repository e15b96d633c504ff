//! core-ipc: the control-plane wire protocol and message loop.
//!
//! Framing is `u32 length | u32 type | payload`, big-endian, 1 MiB payload
//! cap. [`messages`] carries the typed request/response set with the exact
//! wire codes, [`payload`] the JSON schemas for introspection responses,
//! [`server`] the per-connection message loop, and [`client`] a small
//! synchronous counterpart.

pub mod client;
pub mod frame;
pub mod messages;
pub mod payload;
pub mod server;

pub use client::{ClientError, IpcClient};
pub use frame::{Frame, FrameError, MAX_PAYLOAD, read_frame, write_frame};
pub use messages::{DecodeError, InvestigateReply, Request, Response, codes};
pub use payload::{ConfigPayload, KeymapEntry, KeymapsPayload, MetricsPayload, StatusPayload};
pub use server::{ControlBackend, IpcServer, socket_path};
