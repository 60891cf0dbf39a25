//! Output formatting utilities.

use openbadges_issuer::IssuedBadge;
use serde_json::{json, Value};

/// Formats an issued badge as JSON.
pub fn format_json(issued: &IssuedBadge) -> Value {
    json!({
        "badge": issued.badge_id.as_str(),
        "recipient": issued.recipient,
        "uid": issued.uid.as_str(),
        "path": issued.path.display().to_string(),
        "alg": issued.alg.as_str(),
        "expires": issued.expires,
    })
}

/// Prints the confirmation line for an issued badge.
pub fn print_summary(issued: &IssuedBadge, json_output: bool) {
    if json_output {
        println!(
            "{}",
            serde_json::to_string(&format_json(issued)).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        println!("{}", issued);
    }
}
