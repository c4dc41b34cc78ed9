//! Upfront planning and adaptive replanning.
//!
//! Two mechanisms around the react loop:
//!
//! 1. Plan generation — before the loop, a short 2-4 step numbered plan
//!    anchors the agent's reasoning for the turn.
//! 2. Adaptive replanning — after a tool call, ask whether the observation
//!    *blocks* the plan (the cat wasn't there, the path is obstructed).
//!    If so, a one-sentence revised next step is appended to the tool
//!    result so the agent course-corrects without resetting the turn.
//!
//! The trigger is an observation contradicting the plan's assumptions, not
//! a technical tool failure — those are handled at the dispatch layer.
//! Every helper here degrades to "no plan" / "not blocked" on failure; a
//! planning hiccup must never break a turn.

use serde_json::Value;
use tracing::debug;

use familiar_llm::Backend;

const PLAN_PROMPT: &str = "You are helping an embodied AI agent plan its actions for ONE turn.
Given the request and available tools, write a numbered list of 2-4 concrete steps.
Each step must name which tool to call and why. One sentence per step.
Write in the same language as the request. No headers, no explanations — just the list.

Available tools: {tools}
Request: {request}

Action plan:";

const PLAN_BLOCKED_PROMPT: &str = "An embodied AI agent has an action plan and just executed one step.
Decide whether the observation BLOCKS further progress on the plan.

\"Blocked\" means: the observation contradicts a key assumption in the plan,
or makes the next planned step impossible/pointless.
\"NOT blocked\" means: the step succeeded or partially succeeded and the plan can continue.

Plan:
{plan}

Step executed: {tool}({args_summary})
Observation received: {result_summary}

Reply with exactly one word: \"blocked\" or \"ok\".";

const REPLAN_PROMPT: &str = "An embodied AI agent's plan was blocked by an unexpected observation.
Suggest a revised next step in ONE sentence.
Write in the same language as the goal. Be concrete (name the tool if relevant).

Original plan:
{plan}

Step that got blocked: {tool}({args_summary})
Observation: {result_summary}

Revised next step:";

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn args_summary(args: &Value) -> String {
    let summary = args
        .as_object()
        .map(|o| {
            o.iter()
                .take(3)
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    if summary.is_empty() {
        "no args".to_string()
    } else {
        summary
    }
}

/// Generate the upfront action plan. Returns `""` when there is nothing to
/// plan around or the backend fails.
pub async fn generate_plan(backend: &dyn Backend, user_input: &str, tool_names: &[String]) -> String {
    if user_input.trim().is_empty() || tool_names.is_empty() {
        return String::new();
    }
    let prompt = PLAN_PROMPT
        .replace("{tools}", &tool_names.join(", "))
        .replace("{request}", &truncate(user_input, 300));
    backend.complete(&prompt, 150).await.trim().to_string()
}

/// Ask whether this observation blocks the current plan. `false` on any
/// failure so the loop always continues.
pub async fn check_plan_blocked(
    backend: &dyn Backend,
    plan: &str,
    tool_name: &str,
    tool_args: &Value,
    result: &str,
) -> bool {
    if plan.is_empty() {
        return false;
    }
    let prompt = PLAN_BLOCKED_PROMPT
        .replace("{plan}", &truncate(plan, 400))
        .replace("{tool}", tool_name)
        .replace("{args_summary}", &args_summary(tool_args))
        .replace("{result_summary}", &truncate(result, 300));
    let answer = backend.complete(&prompt, 5).await;
    let blocked = answer.trim().to_lowercase() == "blocked";
    if blocked {
        debug!(tool = tool_name, "plan reported blocked");
    }
    blocked
}

/// Suggest a revised next step. Only called after a positive blocked check.
/// Returns `""` on failure.
pub async fn generate_replan(
    backend: &dyn Backend,
    plan: &str,
    tool_name: &str,
    tool_args: &Value,
    result: &str,
) -> String {
    let prompt = REPLAN_PROMPT
        .replace("{plan}", &truncate(plan, 400))
        .replace("{tool}", tool_name)
        .replace("{args_summary}", &args_summary(tool_args))
        .replace("{result_summary}", &truncate(result, 300));
    backend.complete(&prompt, 80).await.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn args_summary_takes_first_three() {
        let args = json!({"a": 1, "b": "x", "c": true, "d": 4});
        let summary = args_summary(&args);
        assert_eq!(summary.split(", ").count(), 3);
        assert!(summary.contains("a=1"));
    }

    #[test]
    fn args_summary_handles_empty() {
        assert_eq!(args_summary(&json!({})), "no args");
        assert_eq!(args_summary(&json!(null)), "no args");
    }
}
