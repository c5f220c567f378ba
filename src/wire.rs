//! Protobuf messages of the playing field protocol.
//!
//! Two gRPC services are involved:
//!
//! - `strategy.Strategy`, served by every agent: `HandleRequest` reports the opponent's last
//!   move and returns the agent's next one.
//! - `playing_field.PlayingField`, served by the coordinator: `Subscribe` registers an agent.
//!
//! The messages are declared by hand with `prost` derives. Enum fields travel as plain
//! `int32` so that values outside [`OpponentSignal`]/[`OwnMove`] reach the handler and can be
//! rejected instead of silently decoding to the default variant.

use thiserror::Error;
use tonic::Code;

use crate::decision::{OpponentSignal, OwnMove};

/// Fully qualified name of the agent service.
pub const STRATEGY_SERVICE: &str = "strategy.Strategy";
/// Route of `Strategy.HandleRequest`.
pub const HANDLE_REQUEST_PATH: &str = "/strategy.Strategy/HandleRequest";
/// Fully qualified name of the coordinator service.
pub const PLAYING_FIELD_SERVICE: &str = "playing_field.PlayingField";
/// Route of `PlayingField.Subscribe`.
pub const SUBSCRIBE_PATH: &str = "/playing_field.PlayingField/Subscribe";

/// Round request.
#[derive(Clone, Copy, PartialEq, Eq, prost::Message)]
pub struct HandleRequestRequest {
    /// Raw `OpponentAction` value, see [`OpponentSignal`].
    #[prost(int32, tag = "1")]
    pub opponent_action: i32,
}

/// Round response.
#[derive(Clone, Copy, PartialEq, Eq, prost::Message)]
pub struct HandleRequestResponse {
    /// Raw `PlayerAction` value, see [`OwnMove`].
    #[prost(int32, tag = "1")]
    pub player_action: i32,
}

/// Registration record announced to the playing field.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct StrategyInfo {
    /// Display name of the agent.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Publicly reachable base address, e.g. `https://localhost:50051`.
    #[prost(string, tag = "2")]
    pub address: String,
}

/// Acknowledgement of a registration.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct SubscribeResponse {
    /// gRPC status code. Only `OK` (0) means the agent was accepted.
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Failure detail from the playing field.
    #[prost(string, tag = "2")]
    pub details: String,
}

impl SubscribeResponse {
    /// The agent was accepted.
    pub fn accepted() -> Self {
        SubscribeResponse {
            code: Code::Ok as i32,
            details: String::new(),
        }
    }

    /// The agent was refused with `code`.
    pub fn rejected(code: Code, details: impl Into<String>) -> Self {
        SubscribeResponse {
            code: code as i32,
            details: details.into(),
        }
    }

    /// `code` as a gRPC status code. Unknown values map to [`Code::Unknown`].
    pub fn status_code(&self) -> Code {
        Code::from_i32(self.code)
    }
}

/// An integer that does not name any value of the target enum.
#[derive(Error, PartialEq, Eq, Debug, Clone, Copy)]
#[error("unknown {kind} value {value}")]
pub struct UnknownEnumValue {
    /// Name of the target enum.
    pub kind: &'static str,
    /// Offending value.
    pub value: i32,
}

impl From<OpponentSignal> for i32 {
    fn from(signal: OpponentSignal) -> i32 {
        match signal {
            OpponentSignal::None => 0,
            OpponentSignal::Defected => 1,
        }
    }
}

impl TryFrom<i32> for OpponentSignal {
    type Error = UnknownEnumValue;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OpponentSignal::None),
            1 => Ok(OpponentSignal::Defected),
            _ => Err(UnknownEnumValue {
                kind: "OpponentAction",
                value,
            }),
        }
    }
}

impl From<OwnMove> for i32 {
    fn from(action: OwnMove) -> i32 {
        match action {
            OwnMove::Cooperate => 0,
            OwnMove::Defect => 1,
        }
    }
}

impl TryFrom<i32> for OwnMove {
    type Error = UnknownEnumValue;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OwnMove::Cooperate),
            1 => Ok(OwnMove::Defect),
            _ => Err(UnknownEnumValue {
                kind: "PlayerAction",
                value,
            }),
        }
    }
}
