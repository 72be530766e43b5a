//! Response classification
//!
//! Recognises the three response shapes a device sends after a command:
//!
//! ```text
//! CMD_RESP:OK,<payload>
//! CMD_RESP:ERR,<payload>
//! CMD_RESP:OK
//! ```
//!
//! Everything else (boot banners, log output, telemetry) is not a response.

use serde::{Deserialize, Serialize};

const OK_TOKEN: &str = "CMD_RESP:OK";
const ERR_TOKEN: &str = "CMD_RESP:ERR";

/// Classified result of a response line.
///
/// Serializes as `{"ret": "OK" | "ERR", "data": <payload>}`. A bare
/// `CMD_RESP:OK` carries an empty `data`, so `{"ret":"OK","data":""}` reads
/// back as [`ResponseOutcome::OkEmpty`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireOutcome", from = "WireOutcome")]
pub enum ResponseOutcome {
    /// `CMD_RESP:OK,<payload>`
    Ok(String),
    /// Bare `CMD_RESP:OK`
    OkEmpty,
    /// `CMD_RESP:ERR,<payload>`, or a synthetic timeout
    Err(String),
}

#[derive(Serialize, Deserialize)]
enum WireRet {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERR")]
    Err,
}

#[derive(Serialize, Deserialize)]
struct WireOutcome {
    ret: WireRet,
    #[serde(default)]
    data: String,
}

impl From<ResponseOutcome> for WireOutcome {
    fn from(outcome: ResponseOutcome) -> Self {
        match outcome {
            ResponseOutcome::Ok(data) => Self {
                ret: WireRet::Ok,
                data,
            },
            ResponseOutcome::OkEmpty => Self {
                ret: WireRet::Ok,
                data: String::new(),
            },
            ResponseOutcome::Err(data) => Self {
                ret: WireRet::Err,
                data,
            },
        }
    }
}

impl From<WireOutcome> for ResponseOutcome {
    fn from(wire: WireOutcome) -> Self {
        match wire.ret {
            WireRet::Ok if wire.data.is_empty() => ResponseOutcome::OkEmpty,
            WireRet::Ok => ResponseOutcome::Ok(wire.data),
            WireRet::Err => ResponseOutcome::Err(wire.data),
        }
    }
}

impl ResponseOutcome {
    /// Payload reported when no response arrived in time
    pub const TIMEOUT_PAYLOAD: &'static str = "Resp Timeout";

    /// The synthetic outcome for a response wait that hit its deadline
    pub fn timeout() -> Self {
        ResponseOutcome::Err(Self::TIMEOUT_PAYLOAD.to_string())
    }

    /// Check if the device accepted the command
    pub fn is_ok(&self) -> bool {
        !matches!(self, ResponseOutcome::Err(_))
    }

    /// Check if this is the synthetic timeout outcome
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResponseOutcome::Err(p) if p == Self::TIMEOUT_PAYLOAD)
    }

    /// Payload text, empty for [`ResponseOutcome::OkEmpty`]
    pub fn payload(&self) -> &str {
        match self {
            ResponseOutcome::Ok(p) | ResponseOutcome::Err(p) => p,
            ResponseOutcome::OkEmpty => "",
        }
    }
}

/// Classify one line. Returns `None` when the line is not a command response.
pub fn classify(line: &str) -> Option<ResponseOutcome> {
    if let Some(rest) = line.strip_prefix(OK_TOKEN) {
        if let Some(payload) = rest.strip_prefix(',') {
            return Some(ResponseOutcome::Ok(trim_one_space(payload).to_string()));
        }
    }

    if let Some(payload) = line
        .strip_prefix(ERR_TOKEN)
        .and_then(|rest| rest.strip_prefix(','))
    {
        return Some(ResponseOutcome::Err(trim_one_space(payload).to_string()));
    }

    if line == OK_TOKEN {
        return Some(ResponseOutcome::OkEmpty);
    }

    None
}

/// Strip at most one leading whitespace character
pub(crate) fn trim_one_space(s: &str) -> &str {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_whitespace() => chars.as_str(),
        _ => s,
    }
}
