//! Line protocol
//!
//! One request per line, one response per request:
//!
//! ```text
//! GET <pv>               -> OK <pv> <value>
//! PUT <pv> <value...>    -> OK
//! PUTW <pv> <value...>   -> OK            (after asynchronous completion)
//! INFO <pv>              -> OK <json>
//! LIST                   -> OK <pv> <pv> ...
//! MONITOR <pv>           -> OK, then EVENT <pv> <value> per update
//! ```
//!
//! Failures answer `ERR <message>`. Verbs are case-insensitive. Everything
//! after the PV name of a `PUT` is the value, so strings and file names may
//! contain spaces.

use std::fmt;
use std::str::FromStr;

use crate::error::BridgeError;

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Request {
    Get { pv: String },
    Put { pv: String, value: String },
    PutWait { pv: String, value: String },
    Info { pv: String },
    List,
    Monitor { pv: String },
}

impl FromStr for Request {
    type Err = BridgeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']).trim_start();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim_start()),
            None => (line, ""),
        };

        match verb.to_ascii_uppercase().as_str() {
            "GET" => Ok(Request::Get { pv: single_pv(verb, rest)? }),
            "INFO" => Ok(Request::Info { pv: single_pv(verb, rest)? }),
            "MONITOR" => Ok(Request::Monitor { pv: single_pv(verb, rest)? }),
            "LIST" if rest.trim().is_empty() => Ok(Request::List),
            "LIST" => Err(BridgeError::Protocol("LIST takes no arguments".to_string())),
            "PUT" => {
                let (pv, value) = pv_and_value(verb, rest)?;
                Ok(Request::Put { pv, value })
            }
            "PUTW" => {
                let (pv, value) = pv_and_value(verb, rest)?;
                Ok(Request::PutWait { pv, value })
            }
            "" => Err(BridgeError::Protocol("empty request".to_string())),
            other => Err(BridgeError::Protocol(format!("unknown command '{}'", other))),
        }
    }
}

fn single_pv(verb: &str, rest: &str) -> Result<String, BridgeError> {
    let rest = rest.trim();
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(BridgeError::Protocol(format!(
            "{} expects exactly one PV name",
            verb.to_ascii_uppercase()
        )));
    }
    Ok(rest.to_string())
}

fn pv_and_value(verb: &str, rest: &str) -> Result<(String, String), BridgeError> {
    match rest.split_once(char::is_whitespace) {
        Some((pv, value)) if !value.is_empty() => Ok((pv.to_string(), value.to_string())),
        _ => Err(BridgeError::Protocol(format!(
            "{} expects a PV name and a value",
            verb.to_ascii_uppercase()
        ))),
    }
}

/// A line sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Success, with an optional payload.
    Ok(Option<String>),
    /// Failure with a message.
    Err(String),
    /// Monitor update.
    Event {
        /// Full PV name.
        pv: String,
        /// Formatted value.
        value: String,
    },
}

impl Response {
    /// Success without payload.
    pub fn ok() -> Self {
        Response::Ok(None)
    }

    /// Success with payload.
    pub fn ok_with(payload: impl Into<String>) -> Self {
        Response::Ok(Some(payload.into()))
    }
}

impl From<BridgeError> for Response {
    fn from(err: BridgeError) -> Self {
        Response::Err(err.to_string())
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok(None) => f.write_str("OK"),
            Response::Ok(Some(payload)) => write!(f, "OK {}", payload),
            // Messages are single-line on the wire.
            Response::Err(message) => write!(f, "ERR {}", message.replace('\n', " ")),
            Response::Event { pv, value } => write!(f, "EVENT {} {}", pv, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_and_list() {
        assert_eq!(
            "get IN:LARMOR:CASCADE:STATE".parse::<Request>().unwrap(),
            Request::Get {
                pv: "IN:LARMOR:CASCADE:STATE".into()
            }
        );
        assert_eq!("LIST\r\n".parse::<Request>().unwrap(), Request::List);
    }

    #[test]
    fn test_put_value_keeps_spaces() {
        let request: Request = "PUT P:FILENAME:SP /data/run 12.dat".parse().unwrap();
        assert_eq!(
            request,
            Request::Put {
                pv: "P:FILENAME:SP".into(),
                value: "/data/run 12.dat".into()
            }
        );
    }

    #[test]
    fn test_malformed_requests() {
        assert!("PUT P:BINX:SP".parse::<Request>().is_err());
        assert!("GET".parse::<Request>().is_err());
        assert!("GET A B".parse::<Request>().is_err());
        assert!("LIST extra".parse::<Request>().is_err());
        assert!("FROB X".parse::<Request>().is_err());
        assert!("".parse::<Request>().is_err());
    }

    #[test]
    fn test_response_formatting() {
        assert_eq!(Response::ok().to_string(), "OK");
        assert_eq!(Response::ok_with("P:BINX 2").to_string(), "OK P:BINX 2");
        assert_eq!(
            Response::from(BridgeError::ReadOnly("P:BINX".into())).to_string(),
            "ERR Process variable 'P:BINX' is read-only"
        );
        assert_eq!(
            Response::Event {
                pv: "P:STATE".into(),
                value: "1".into()
            }
            .to_string(),
            "EVENT P:STATE 1"
        );
    }
}
