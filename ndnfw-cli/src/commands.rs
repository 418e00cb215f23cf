use clap::ArgMatches;
use serde_json::{json, Map, Value};

/// Build the control request for a parsed `rules` subcommand.
pub fn rules_request(matches: &ArgMatches) -> Option<Value> {
    match matches.subcommand() {
        Some(("list", sub_matches)) => {
            let list = sub_matches.get_one::<String>("list")?;
            Some(json!({ "get": { "rules": [list] } }))
        }
        Some((action @ ("append" | "delete"), sub_matches)) => {
            let policy = sub_matches.get_one::<String>("policy")?;
            let prefixes: Vec<&String> = sub_matches.get_many::<String>("prefix")?.collect();
            let mut post = Map::new();
            post.insert(format!("{}-{}", action, policy), json!(prefixes));
            Some(json!({ "post": post }))
        }
        _ => None,
    }
}

/// Build the control request for a parsed `mode` subcommand.
pub fn mode_request(matches: &ArgMatches) -> Value {
    match matches.subcommand() {
        Some(("set", sub_matches)) => match sub_matches.get_one::<String>("mode") {
            Some(mode) => json!({ "post": { "mode": [mode] } }),
            None => json!({ "get": { "mode": [] } }),
        },
        _ => json!({ "get": { "mode": [] } }),
    }
}

pub fn pit_request() -> Value {
    json!({ "get": { "pit": [] } })
}

/// Render one reply datagram for the terminal.
pub fn format_reply(reply: &[u8]) -> String {
    match serde_json::from_slice::<Value>(reply) {
        Ok(Value::Object(members)) => {
            if let (Some(status), Some(reason)) = (members.get("status"), members.get("reason")) {
                let status = status.as_str().unwrap_or("error");
                let reason = reason.as_str().unwrap_or_default();
                return format!("{}: {}", status, reason);
            }
            if let Some(mode) = members.get("mode").and_then(Value::as_str) {
                return format!("mode: {}", mode);
            }
            for list in ["whitelist", "blacklist"] {
                if let Some(rules) = members.get(list).and_then(Value::as_array) {
                    let mut out = format!("{} ({} rules)", list, rules.len());
                    for rule in rules {
                        out.push_str("\n  ");
                        out.push_str(rule.as_str().unwrap_or_default());
                    }
                    return out;
                }
            }
            if let Some(entries) = members.get("pit").and_then(Value::as_array) {
                let mut out = format!("pit ({} entries)", entries.len());
                for entry in entries {
                    out.push_str(&format!(
                        "\n  {} faces={} valid_for={}ms",
                        entry["name"].as_str().unwrap_or_default(),
                        entry["faces"],
                        entry["valid_for_ms"]
                    ));
                }
                return out;
            }
            Value::Object(members).to_string()
        }
        _ => String::from_utf8_lossy(reply).into_owned(),
    }
}
