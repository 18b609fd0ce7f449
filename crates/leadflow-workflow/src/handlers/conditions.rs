use tracing::info;

use leadflow_core::error::Result;

use super::HandlerEnv;
use crate::graph::context::{ExecutionContext, NodeOutcome};
use crate::graph::node::PositiveResponseConfig;

/// First keyword contained in `text`, compared case-insensitively.
///
/// Plain substring matching: "si" also matches inside "posizione".
pub fn match_positive<'k>(text: &str, keywords: &'k [String]) -> Option<&'k str> {
    let text = text.to_lowercase();
    keywords
        .iter()
        .map(String::as_str)
        .find(|kw| !kw.is_empty() && text.contains(&kw.to_lowercase()))
}

/// Did the lead answer the welcome message positively?
///
/// No reply at all, or a reply without a positive keyword, stops the branch.
pub async fn check_positive_response(
    config: &PositiveResponseConfig,
    ctx: &ExecutionContext,
    env: &HandlerEnv<'_>,
) -> Result<NodeOutcome> {
    let latest = match ctx.lead_id() {
        Some(lead_id) => env.store.latest_incoming_message(lead_id).await?,
        None => None,
    };
    let Some(reply) = latest else {
        info!(lead_id = ?ctx.lead_id(), "No reply from lead yet");
        return Ok(NodeOutcome::ok()
            .with("result", false)
            .with("reason", "No response from lead")
            .proceed(false));
    };

    let keywords = config
        .keywords
        .as_deref()
        .unwrap_or(env.settings.positive_keywords.as_slice());
    let matched = match_positive(&reply.message, keywords);
    let positive = matched.is_some();

    info!(lead_id = %reply.lead_id, positive, "Lead reply checked");
    Ok(NodeOutcome::ok()
        .with("result", positive)
        .with("message", reply.message)
        .with("matched_keyword", matched)
        .proceed(positive))
}
