//! JSON command handling for the UDP control channel.
//!
//! A datagram holds one request object with optional `get` and `post`
//! members. The whole request is parsed into typed commands first, so a
//! syntax error anywhere rejects it before any state changes. Updates are
//! applied before queries are answered, and each produces zero or more
//! reply datagrams.

use log::{info, warn};
use serde_json::{json, Map, Value};

use ndnfw_core::{Forwarder, Mode, RuleKind};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Query {
    Mode,
    Rules(RuleKind),
    Pit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Update {
    Mode(Mode),
    Append(RuleKind, String),
    Delete(RuleKind, String),
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Request {
    queries: Vec<Query>,
    updates: Vec<Update>,
}

/// Why a request was refused; rendered as the `reason` of a syntax error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
enum SyntaxError {
    #[error("error while parsing")]
    Parse,
    #[error("value has to be object")]
    NotObject,
    #[error("only 'get' and 'post' are supported")]
    UnknownMethod,
    #[error("only 'mode', 'rules' or 'pit' are supported in 'get' method")]
    UnknownQuery,
    #[error("only 'mode', 'append-accept', 'append-drop', 'delete-accept', or 'delete-drop' are supported in 'post' method")]
    UnknownUpdate,
    #[error("value has to be array")]
    NotArray,
    #[error("'{0}' array has to be empty")]
    NotEmpty(&'static str),
    #[error("value in 'rules' array has to be 'white' or 'black'")]
    BadRuleKind,
    #[error("value in 'mode' array has to be 'accept' or 'drop'")]
    BadMode,
    #[error("value in array has to be string")]
    NotString,
}

/// Execute one control datagram and return the replies to send back.
pub fn handle_command(forwarder: &mut Forwarder, datagram: &[u8]) -> Vec<String> {
    let request = match parse_request(datagram) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected control request: {}", e);
            return vec![status("syntax error", &e.to_string())];
        }
    };

    let mut replies = Vec::new();
    for update in request.updates {
        apply_update(forwarder, update, &mut replies);
    }
    for query in request.queries {
        replies.push(answer_query(forwarder, query));
    }
    replies
}

fn status(kind: &str, reason: &str) -> String {
    json!({ "status": kind, "reason": reason }).to_string()
}

fn apply_update(forwarder: &mut Forwarder, update: Update, replies: &mut Vec<String>) {
    let firewall = forwarder.firewall_mut();
    let result = match update {
        Update::Mode(mode) => {
            info!("Default mode set to {}", mode);
            firewall.set_mode(mode);
            Ok(())
        }
        Update::Append(kind, prefix) => firewall.append(kind, &prefix).map(|()| {
            info!("Appended {} to {}", prefix, kind);
        }),
        Update::Delete(kind, prefix) => firewall.delete(kind, &prefix).map(|()| {
            info!("Deleted {} from {}", prefix, kind);
        }),
    };

    if let Err(e) = result {
        warn!("{}", e);
        replies.push(status("warning", &e.to_string()));
    }
}

fn answer_query(forwarder: &Forwarder, query: Query) -> String {
    let firewall = forwarder.firewall();
    let reply = match query {
        Query::Mode => json!({ "mode": firewall.mode() }),
        Query::Rules(kind) => {
            let rules: Vec<&str> = firewall.list(kind).collect();
            let mut reply = Map::new();
            reply.insert(kind.to_string(), json!(rules));
            Value::Object(reply)
        }
        Query::Pit => json!({ "pit": forwarder.pit().snapshot() }),
    };
    reply.to_string()
}

fn parse_request(datagram: &[u8]) -> Result<Request, SyntaxError> {
    let document: Value = serde_json::from_slice(datagram).map_err(|_| SyntaxError::Parse)?;
    let members = document.as_object().ok_or(SyntaxError::NotObject)?;

    if members.keys().any(|method| method != "get" && method != "post") {
        return Err(SyntaxError::UnknownMethod);
    }

    let mut request = Request::default();
    if let Some(get) = members.get("get") {
        parse_get(get, &mut request.queries)?;
    }
    if let Some(post) = members.get("post") {
        parse_post(post, &mut request.updates)?;
    }
    Ok(request)
}

fn array<'a>(value: &'a Value) -> Result<&'a Vec<Value>, SyntaxError> {
    value.as_array().ok_or(SyntaxError::NotArray)
}

fn parse_get(get: &Value, queries: &mut Vec<Query>) -> Result<(), SyntaxError> {
    let members = get.as_object().ok_or(SyntaxError::NotObject)?;
    for (member, value) in members {
        let values = match member.as_str() {
            "mode" | "rules" | "pit" => array(value)?,
            _ => return Err(SyntaxError::UnknownQuery),
        };

        match member.as_str() {
            "mode" if values.is_empty() => queries.push(Query::Mode),
            "mode" => return Err(SyntaxError::NotEmpty("mode")),
            "pit" if values.is_empty() => queries.push(Query::Pit),
            "pit" => return Err(SyntaxError::NotEmpty("pit")),
            _ => {
                for value in values {
                    let kind = match value.as_str() {
                        Some("white" | "allow") => RuleKind::Whitelist,
                        Some("black" | "deny") => RuleKind::Blacklist,
                        _ => return Err(SyntaxError::BadRuleKind),
                    };
                    queries.push(Query::Rules(kind));
                }
            }
        }
    }
    Ok(())
}

fn parse_post(post: &Value, updates: &mut Vec<Update>) -> Result<(), SyntaxError> {
    let members = post.as_object().ok_or(SyntaxError::NotObject)?;
    for (member, value) in members {
        let rule: Option<fn(RuleKind, String) -> Update> = match member.as_str() {
            "mode" => None,
            "append-accept" | "append-drop" => Some(Update::Append),
            "delete-accept" | "delete-drop" => Some(Update::Delete),
            _ => return Err(SyntaxError::UnknownUpdate),
        };
        let values = array(value)?;

        let Some(rule) = rule else {
            for value in values {
                let mode = match value.as_str() {
                    Some("accept") => Mode::Accept,
                    Some("drop") => Mode::Drop,
                    _ => return Err(SyntaxError::BadMode),
                };
                updates.push(Update::Mode(mode));
            }
            continue;
        };

        let kind = if member.ends_with("accept") {
            RuleKind::Whitelist
        } else {
            RuleKind::Blacklist
        };
        for value in values {
            let prefix = value.as_str().ok_or(SyntaxError::NotString)?;
            updates.push(rule(kind, prefix.to_string()));
        }
    }
    Ok(())
}
