//! Typed request/response messages and their exact wire codes.
//!
//! The investigate family (0x1001..0x1005) uses fixed 256-byte text fields
//! for compatibility with existing clients; the command family (0x2001..)
//! carries UTF-8 payloads, JSON for the introspection responses.

use crate::frame::Frame;
use thiserror::Error;

pub mod codes {
    pub const CMD_INVESTIGATE_WINDOW: u32 = 0x1001;
    pub const RSP_INVESTIGATE_WINDOW: u32 = 0x1002;
    pub const CMD_ENABLE_INVESTIGATE_MODE: u32 = 0x1003;
    pub const CMD_DISABLE_INVESTIGATE_MODE: u32 = 0x1004;
    pub const NTF_KEY_EVENT: u32 = 0x1005;

    pub const CMD_RELOAD: u32 = 0x2001;
    pub const CMD_STOP: u32 = 0x2002;
    pub const CMD_START: u32 = 0x2003;
    pub const CMD_GET_STATUS: u32 = 0x2004;
    pub const CMD_GET_CONFIG: u32 = 0x2005;
    pub const CMD_GET_KEYMAPS: u32 = 0x2006;
    pub const CMD_GET_METRICS: u32 = 0x2007;
    pub const CMD_SET_ENABLED: u32 = 0x2008;
    pub const CMD_SWITCH_CONFIG: u32 = 0x2009;

    pub const RSP_OK: u32 = 0x2100;
    pub const RSP_ERROR: u32 = 0x2101;
    pub const RSP_STATUS: u32 = 0x2102;
    pub const RSP_CONFIG: u32 = 0x2103;
    pub const RSP_KEYMAPS: u32 = 0x2104;
    pub const RSP_METRICS: u32 = 0x2105;
}

/// Width of each fixed text field in the investigate family.
pub const FIXED_TEXT: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown message type {0:#06x}")]
    UnknownType(u32),
    #[error("bad payload for {type_code:#06x}: {reason}")]
    BadPayload { type_code: u32, reason: String },
}

// -------------------------------------------------------------------------------------------------
// Requests
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    InvestigateWindow(u64),
    EnableInvestigateMode,
    DisableInvestigateMode,
    /// Optional config name/path; empty payload reloads the current file.
    Reload(Option<String>),
    Stop,
    Start,
    GetStatus,
    GetConfig,
    GetKeymaps,
    GetMetrics,
    SetEnabled(bool),
    SwitchConfig(String),
}

impl Request {
    pub fn decode(frame: &Frame) -> Result<Self, DecodeError> {
        let bad = |reason: &str| DecodeError::BadPayload {
            type_code: frame.type_code,
            reason: reason.to_string(),
        };
        match frame.type_code {
            codes::CMD_INVESTIGATE_WINDOW => {
                let bytes: [u8; 8] = frame
                    .payload
                    .as_slice()
                    .try_into()
                    .map_err(|_| bad("expected 8-byte window handle"))?;
                Ok(Self::InvestigateWindow(u64::from_be_bytes(bytes)))
            }
            codes::CMD_ENABLE_INVESTIGATE_MODE => Ok(Self::EnableInvestigateMode),
            codes::CMD_DISABLE_INVESTIGATE_MODE => Ok(Self::DisableInvestigateMode),
            codes::CMD_RELOAD => {
                if frame.payload.is_empty() {
                    Ok(Self::Reload(None))
                } else {
                    let text = String::from_utf8(frame.payload.clone())
                        .map_err(|_| bad("reload payload must be UTF-8"))?;
                    Ok(Self::Reload(Some(text)))
                }
            }
            codes::CMD_STOP => Ok(Self::Stop),
            codes::CMD_START => Ok(Self::Start),
            codes::CMD_GET_STATUS => Ok(Self::GetStatus),
            codes::CMD_GET_CONFIG => Ok(Self::GetConfig),
            codes::CMD_GET_KEYMAPS => Ok(Self::GetKeymaps),
            codes::CMD_GET_METRICS => Ok(Self::GetMetrics),
            codes::CMD_SET_ENABLED => match frame.payload.as_slice() {
                [0] => Ok(Self::SetEnabled(false)),
                [1] => Ok(Self::SetEnabled(true)),
                _ => Err(bad("expected a single 0/1 byte")),
            },
            codes::CMD_SWITCH_CONFIG => {
                let text = String::from_utf8(frame.payload.clone())
                    .map_err(|_| bad("switch payload must be UTF-8"))?;
                Ok(Self::SwitchConfig(text))
            }
            other => Err(DecodeError::UnknownType(other)),
        }
    }

    pub fn encode(&self) -> Frame {
        match self {
            Self::InvestigateWindow(hwnd) => Frame::new(
                codes::CMD_INVESTIGATE_WINDOW,
                hwnd.to_be_bytes().to_vec(),
            ),
            Self::EnableInvestigateMode => Frame::new(codes::CMD_ENABLE_INVESTIGATE_MODE, vec![]),
            Self::DisableInvestigateMode => {
                Frame::new(codes::CMD_DISABLE_INVESTIGATE_MODE, vec![])
            }
            Self::Reload(path) => Frame::new(
                codes::CMD_RELOAD,
                path.as_deref().unwrap_or_default().as_bytes().to_vec(),
            ),
            Self::Stop => Frame::new(codes::CMD_STOP, vec![]),
            Self::Start => Frame::new(codes::CMD_START, vec![]),
            Self::GetStatus => Frame::new(codes::CMD_GET_STATUS, vec![]),
            Self::GetConfig => Frame::new(codes::CMD_GET_CONFIG, vec![]),
            Self::GetKeymaps => Frame::new(codes::CMD_GET_KEYMAPS, vec![]),
            Self::GetMetrics => Frame::new(codes::CMD_GET_METRICS, vec![]),
            Self::SetEnabled(enabled) => {
                Frame::new(codes::CMD_SET_ENABLED, vec![u8::from(*enabled)])
            }
            Self::SwitchConfig(path) => {
                Frame::new(codes::CMD_SWITCH_CONFIG, path.as_bytes().to_vec())
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Responses
// -------------------------------------------------------------------------------------------------

/// The investigate-window reply with its fixed-width text fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvestigateReply {
    pub keymap_name: String,
    pub matched_class_regex: String,
    pub matched_title_regex: String,
    pub active_modifiers: String,
    pub is_default: bool,
}

impl InvestigateReply {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FIXED_TEXT * 4 + 1);
        for field in [
            &self.keymap_name,
            &self.matched_class_regex,
            &self.matched_title_regex,
            &self.active_modifiers,
        ] {
            out.extend_from_slice(&fixed_text(field));
        }
        out.push(u8::from(self.is_default));
        out
    }

    fn decode(payload: &[u8]) -> Result<Self, String> {
        if payload.len() != FIXED_TEXT * 4 + 1 {
            return Err(format!(
                "expected {} bytes, got {}",
                FIXED_TEXT * 4 + 1,
                payload.len()
            ));
        }
        let field = |i: usize| read_fixed_text(&payload[i * FIXED_TEXT..(i + 1) * FIXED_TEXT]);
        Ok(Self {
            keymap_name: field(0),
            matched_class_regex: field(1),
            matched_title_regex: field(2),
            active_modifiers: field(3),
            is_default: payload[FIXED_TEXT * 4] != 0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(Option<String>),
    Error(String),
    /// JSON text payloads.
    Status(String),
    Config(String),
    Keymaps(String),
    Metrics(String),
    Investigate(InvestigateReply),
    /// Server-initiated live key-event line (investigate mode).
    KeyEvent(String),
}

impl Response {
    pub fn encode(&self) -> Frame {
        match self {
            Self::Ok(message) => Frame::new(
                codes::RSP_OK,
                message.as_deref().unwrap_or_default().as_bytes().to_vec(),
            ),
            Self::Error(message) => Frame::new(codes::RSP_ERROR, message.as_bytes().to_vec()),
            Self::Status(json) => Frame::new(codes::RSP_STATUS, json.as_bytes().to_vec()),
            Self::Config(json) => Frame::new(codes::RSP_CONFIG, json.as_bytes().to_vec()),
            Self::Keymaps(json) => Frame::new(codes::RSP_KEYMAPS, json.as_bytes().to_vec()),
            Self::Metrics(json) => Frame::new(codes::RSP_METRICS, json.as_bytes().to_vec()),
            Self::Investigate(reply) => Frame::new(codes::RSP_INVESTIGATE_WINDOW, reply.encode()),
            Self::KeyEvent(line) => Frame::new(codes::NTF_KEY_EVENT, fixed_text(line).to_vec()),
        }
    }

    pub fn decode(frame: &Frame) -> Result<Self, DecodeError> {
        let text = || {
            String::from_utf8(frame.payload.clone()).map_err(|_| DecodeError::BadPayload {
                type_code: frame.type_code,
                reason: "payload must be UTF-8".to_string(),
            })
        };
        match frame.type_code {
            codes::RSP_OK => {
                let text = text()?;
                Ok(Self::Ok((!text.is_empty()).then_some(text)))
            }
            codes::RSP_ERROR => Ok(Self::Error(text()?)),
            codes::RSP_STATUS => Ok(Self::Status(text()?)),
            codes::RSP_CONFIG => Ok(Self::Config(text()?)),
            codes::RSP_KEYMAPS => Ok(Self::Keymaps(text()?)),
            codes::RSP_METRICS => Ok(Self::Metrics(text()?)),
            codes::RSP_INVESTIGATE_WINDOW => InvestigateReply::decode(&frame.payload)
                .map(Self::Investigate)
                .map_err(|reason| DecodeError::BadPayload {
                    type_code: frame.type_code,
                    reason,
                }),
            codes::NTF_KEY_EVENT => Ok(Self::KeyEvent(read_fixed_text(&frame.payload))),
            other => Err(DecodeError::UnknownType(other)),
        }
    }
}

/// NUL-padded fixed-width text; oversized input is truncated at a char
/// boundary.
fn fixed_text(text: &str) -> [u8; FIXED_TEXT] {
    let mut out = [0u8; FIXED_TEXT];
    let mut end = text.len().min(FIXED_TEXT - 1);
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    out[..end].copy_from_slice(&text.as_bytes()[..end]);
    out
}

fn read_fixed_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_codes_match_the_wire_contract() {
        assert_eq!(Request::InvestigateWindow(1).encode().type_code, 0x1001);
        assert_eq!(Request::EnableInvestigateMode.encode().type_code, 0x1003);
        assert_eq!(Request::DisableInvestigateMode.encode().type_code, 0x1004);
        assert_eq!(Request::Reload(None).encode().type_code, 0x2001);
        assert_eq!(Request::Stop.encode().type_code, 0x2002);
        assert_eq!(Request::Start.encode().type_code, 0x2003);
        assert_eq!(Request::GetStatus.encode().type_code, 0x2004);
        assert_eq!(Request::GetConfig.encode().type_code, 0x2005);
        assert_eq!(Request::GetKeymaps.encode().type_code, 0x2006);
        assert_eq!(Request::GetMetrics.encode().type_code, 0x2007);
    }

    #[test]
    fn response_codes_match_the_wire_contract() {
        assert_eq!(Response::Ok(None).encode().type_code, 0x2100);
        assert_eq!(Response::Error(String::new()).encode().type_code, 0x2101);
        assert_eq!(Response::Status(String::new()).encode().type_code, 0x2102);
        assert_eq!(Response::Config(String::new()).encode().type_code, 0x2103);
        assert_eq!(Response::Keymaps(String::new()).encode().type_code, 0x2104);
        assert_eq!(Response::Metrics(String::new()).encode().type_code, 0x2105);
        assert_eq!(
            Response::Investigate(InvestigateReply::default())
                .encode()
                .type_code,
            0x1002
        );
        assert_eq!(
            Response::KeyEvent(String::new()).encode().type_code,
            0x1005
        );
    }

    #[test]
    fn requests_round_trip() {
        let requests = [
            Request::InvestigateWindow(0xDEAD_BEEF),
            Request::EnableInvestigateMode,
            Request::Reload(None),
            Request::Reload(Some("work.json".to_string())),
            Request::SetEnabled(true),
            Request::SetEnabled(false),
            Request::SwitchConfig("/etc/yamy/gaming.json".to_string()),
            Request::GetMetrics,
        ];
        for request in requests {
            assert_eq!(Request::decode(&request.encode()), Ok(request));
        }
    }

    #[test]
    fn unknown_request_type_is_rejected() {
        let frame = Frame::new(0x9999, vec![]);
        assert_eq!(
            Request::decode(&frame),
            Err(DecodeError::UnknownType(0x9999))
        );
    }

    #[test]
    fn investigate_window_payload_is_a_be_u64() {
        let frame = Request::InvestigateWindow(0x0102_0304_0506_0708).encode();
        assert_eq!(frame.payload, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let bad = Frame::new(codes::CMD_INVESTIGATE_WINDOW, vec![1, 2, 3]);
        assert!(matches!(
            Request::decode(&bad),
            Err(DecodeError::BadPayload { .. })
        ));
    }

    #[test]
    fn investigate_reply_uses_fixed_256_byte_fields() {
        let reply = InvestigateReply {
            keymap_name: "browser".to_string(),
            matched_class_regex: "^Firefox$".to_string(),
            matched_title_regex: String::new(),
            active_modifiers: "Shift M00".to_string(),
            is_default: false,
        };
        let frame = Response::Investigate(reply.clone()).encode();
        assert_eq!(frame.payload.len(), 256 * 4 + 1);
        match Response::decode(&frame).unwrap() {
            Response::Investigate(decoded) => assert_eq!(decoded, reply),
            other => panic!("expected investigate reply, got {other:?}"),
        }
    }

    #[test]
    fn key_event_notifications_are_fixed_width() {
        let frame = Response::KeyEvent("press   0x1E [] -> +0x0F".to_string()).encode();
        assert_eq!(frame.payload.len(), 256);
        match Response::decode(&frame).unwrap() {
            Response::KeyEvent(line) => assert_eq!(line, "press   0x1E [] -> +0x0F"),
            other => panic!("expected key event, got {other:?}"),
        }
    }

    #[test]
    fn oversized_fixed_text_truncates_on_a_char_boundary() {
        let long = "キー".repeat(100);
        let bytes = fixed_text(&long);
        let text = read_fixed_text(&bytes);
        assert!(text.chars().all(|c| c == 'キ' || c == 'ー'));
        assert!(text.len() < 256);
    }
}
