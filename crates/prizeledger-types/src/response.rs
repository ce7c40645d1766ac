//! Caller-facing result envelope.
//!
//! Every public operation is exposed to the controller layer as
//! `{"success": true, ...payload}` or
//! `{"success": false, "error": "...", "code": "StateError"}`.
//! Nothing panics or throws across this boundary.

use serde::{Deserialize, Serialize};

use crate::{ErrorKind, LedgerError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response<T> {
    Success {
        success: True,
        #[serde(flatten)]
        payload: T,
    },
    Failure {
        success: False,
        error: String,
        code: ErrorKind,
    },
}

/// Serializes as the JSON literal `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct True;

/// Serializes as the JSON literal `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct False;

macro_rules! bool_literal {
    ($ty:ident, $value:literal) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_bool($value)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                if bool::deserialize(d)? == $value {
                    Ok($ty)
                } else {
                    Err(serde::de::Error::custom(concat!("expected ", $value)))
                }
            }
        }
    };
}

bool_literal!(True, true);
bool_literal!(False, false);

impl<T> Response<T> {
    #[must_use]
    pub fn from_result(result: crate::Result<T>) -> Self {
        match result {
            Ok(payload) => Self::Success {
                success: True,
                payload,
            },
            Err(err) => Self::failure(&err),
        }
    }

    #[must_use]
    pub fn failure(err: &LedgerError) -> Self {
        Self::Failure {
            success: False,
            error: err.to_string(),
            code: err.kind(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The error kind, if this is a failure.
    #[must_use]
    pub fn code(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { code, .. } => Some(*code),
        }
    }

    #[must_use]
    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            Self::Failure { .. } => None,
        }
    }
}

impl<T> From<crate::Result<T>> for Response<T> {
    fn from(result: crate::Result<T>) -> Self {
        Self::from_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TournamentId;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Receipt {
        transaction_id: String,
    }

    #[test]
    fn success_flattens_payload() {
        let resp = Response::from_result(Ok(Receipt {
            transaction_id: "tx_1".into(),
        }));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["transaction_id"], "tx_1");
        assert!(resp.is_success());
    }

    #[test]
    fn failure_carries_code() {
        let resp: Response<Receipt> =
            Response::from_result(Err(LedgerError::EscrowAlreadyExists(TournamentId::new())));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "StateError");
        assert!(json["error"].as_str().unwrap().starts_with("PL_ERR_300"));
        assert_eq!(resp.code(), Some(ErrorKind::State));
    }

    #[test]
    fn envelope_roundtrips() {
        let resp: Response<Receipt> = Response::from_result(Err(LedgerError::MissingPayoutMethod));
        let json = serde_json::to_string(&resp).unwrap();
        let back: Response<Receipt> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);

        let ok = Response::from_result(Ok(Receipt {
            transaction_id: "tx_2".into(),
        }));
        let back: Response<Receipt> = serde_json::from_str(&serde_json::to_string(&ok).unwrap()).unwrap();
        assert_eq!(back, ok);
    }
}
