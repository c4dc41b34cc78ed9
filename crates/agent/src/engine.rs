//! The embodied turn engine.
//!
//! Runs exactly one agent turn: assemble the system prompt, drive the
//! tool-use loop, apply policy nudges, post-process (emotion, summary,
//! self-model, curiosity, worry). The engine owns the transcript; the
//! scheduler owns the desires and only hands in a narrow handle.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, Timelike};
use serde_json::Value;
use tracing::{debug, info, warn};

use familiar_config::locale::tr;
use familiar_config::{AgentConfig, Paths};
use familiar_desires::{detect_worry_signal, Desire, Desires};
use familiar_llm::{Backend, BackendError, OnText, StopReason, SystemPrompt, ToolOutput};
use familiar_memory::{
    format_curiosities_for_context, format_feelings_for_context, format_for_context,
    format_self_model_for_context, Emotion, MemoryKind, ObservationStore,
};
use familiar_tools::ToolRegistry;

use crate::interoception::interoception;
use crate::prompts;
use crate::tape;

pub const MAX_ITERATIONS: usize = 50;

/// Notified once per tool invocation, for UI display.
pub type OnAction<'a> = &'a (dyn Fn(&str, &Value) + Send + Sync);

/// Polled between tool rounds for a user line typed mid-turn.
pub type InterruptPoll<'a> = &'a (dyn Fn() -> Option<String> + Send + Sync);

pub struct EmbodiedAgent {
    config: AgentConfig,
    paths: Paths,
    backend: Box<dyn Backend>,
    tools: Arc<ToolRegistry>,
    memory: ObservationStore,
    desires: Desires,
    messages: Vec<Value>,
    started_at: Instant,
    turn_count: u64,
}

impl EmbodiedAgent {
    pub fn new(
        config: AgentConfig,
        paths: Paths,
        backend: Box<dyn Backend>,
        tools: Arc<ToolRegistry>,
        memory: ObservationStore,
        desires: Desires,
    ) -> Self {
        Self {
            config,
            paths,
            backend,
            tools,
            memory,
            desires,
            messages: Vec::new(),
            started_at: Instant::now(),
            turn_count: 0,
        }
    }

    pub fn turn_count(&self) -> u64 {
        self.turn_count
    }

    pub fn transcript_len(&self) -> usize {
        self.messages.len()
    }

    /// Clear conversation history. The turn counter keeps counting.
    pub fn clear_history(&mut self) {
        self.messages.clear();
    }

    pub async fn close(&self) {
        self.tools.close().await;
    }

    // ── Prompt assembly ──────────────────────────────────────────────────

    fn load_personality(&self) -> String {
        for candidate in self.paths.personality_candidates() {
            if let Ok(text) = std::fs::read_to_string(&candidate) {
                let text = text.trim().to_string();
                if !text.is_empty() {
                    return text;
                }
            }
        }
        String::new()
    }

    /// Stable part (personality + rulebook) is cacheable across turns;
    /// everything situational goes into the variable part.
    fn system_prompt(
        &self,
        feelings_ctx: &str,
        morning_ctx: &str,
        inner_voice: &str,
        plan_ctx: &str,
    ) -> SystemPrompt {
        let me = self.load_personality();
        let base = prompts::SYSTEM_PROMPT.replace("{max_steps}", &MAX_ITERATIONS.to_string());
        let stable = if me.is_empty() { base } else { format!("{me}\n\n---\n\n{base}") };

        let uptime_minutes = self.started_at.elapsed().as_secs_f64() / 60.0;
        let intero = interoception(Local::now().hour(), uptime_minutes, self.turn_count);

        let mut variable_parts = vec![intero];
        // Morning reconstruction takes precedence on the first turn.
        if !morning_ctx.is_empty() {
            variable_parts.push(morning_ctx.to_string());
        } else if !feelings_ctx.is_empty() {
            variable_parts.push(feelings_ctx.to_string());
        }
        // Inner voice is the agent's own drive, never a user utterance.
        if !inner_voice.is_empty() {
            variable_parts.push(format!(
                "{}\n{inner_voice}\n{}",
                tr(self.config.lang, "inner_voice_label"),
                tr(self.config.lang, "inner_voice_directive"),
            ));
        }
        if !plan_ctx.is_empty() {
            variable_parts.push(format!(
                "[Action plan for this turn — follow it unless you discover a good reason not to]\n{plan_ctx}"
            ));
        }

        SystemPrompt { stable, variable: variable_parts.join("\n\n---\n\n") }
    }

    /// Bridge yesterday's self to today's. First turn of a session only.
    async fn morning_reconstruction(&self) -> String {
        let (self_model, curiosities, feelings) = tokio::join!(
            self.memory.recall_self_model_async(5),
            self.memory.recall_curiosities_async(3),
            self.memory.recent_feelings_async(3),
        );

        // Surface the most recent persisted curiosity into the desire system.
        if self.desires.curiosity_target().is_none() {
            if let Some(first) = curiosities.first() {
                self.desires.set_curiosity_target(Some(first.content.clone()));
            }
        }

        let lang = self.config.lang;
        let mut parts = Vec::new();
        if !self_model.is_empty() {
            parts.push(format_self_model_for_context(lang, &self_model));
        }
        if !curiosities.is_empty() {
            parts.push(format_curiosities_for_context(lang, &curiosities));
        }
        if !feelings.is_empty() {
            parts.push(format_feelings_for_context(lang, &feelings));
        }

        if parts.is_empty() {
            // No history yet — say so explicitly so the model does not
            // fabricate a past.
            return tr(lang, "morning_no_history").to_string();
        }
        format!("{}\n\n{}", tr(lang, "morning_header"), parts.join("\n\n"))
    }

    // ── The turn ─────────────────────────────────────────────────────────

    /// Run one conversation turn.
    ///
    /// `inner_voice` is the agent's own impulse; a desire turn has a
    /// non-empty impulse and empty `user_input`. `interrupt` is polled
    /// between tool rounds for lines typed while the agent was busy.
    pub async fn run(
        &mut self,
        user_input: &str,
        on_action: OnAction<'_>,
        on_text: OnText<'_>,
        inner_voice: &str,
        interrupt: Option<InterruptPoll<'_>>,
    ) -> Result<String, BackendError> {
        self.turn_count += 1;
        let lang = self.config.lang;

        // MCP connections start on the first turn, not at process startup.
        self.tools.ensure_mcp_started().await;

        let morning_ctx = if self.turn_count == 1 {
            self.morning_reconstruction().await
        } else {
            String::new()
        };

        let is_desire_turn = !inner_voice.is_empty() && user_input.is_empty();

        // Inject relevant memories + emotional context for real
        // conversation turns; a desire turn carries its own motivation.
        let (user_input_with_ctx, feelings_ctx) = if is_desire_turn {
            (tr(lang, "desire_turn_marker").to_string(), String::new())
        } else {
            let (memories, feelings) = tokio::join!(
                self.memory.recall_async(user_input.to_string(), 3, None),
                self.memory.recent_feelings_async(4),
            );
            let mut blocks = Vec::new();
            if !memories.is_empty() {
                blocks.push(format_for_context(lang, &memories));
            }
            let feelings_ctx = if feelings.is_empty() {
                String::new()
            } else {
                format_feelings_for_context(lang, &feelings)
            };
            if !feelings_ctx.is_empty() {
                blocks.push(feelings_ctx.clone());
            }
            let with_ctx = if blocks.is_empty() {
                user_input.to_string()
            } else {
                format!("{user_input}\n\n{}", blocks.join("\n\n"))
            };
            (with_ctx, feelings_ctx)
        };

        self.messages.push(self.backend.make_user_message(&user_input_with_ctx));

        // Upfront plan to anchor the react loop. Desire turns skip it:
        // there is no explicit request to plan around.
        let plan_ctx = if !is_desire_turn && !user_input.trim().is_empty() {
            let tool_names: Vec<String> =
                self.tools.tool_defs().await.into_iter().map(|d| d.name).collect();
            let plan = tape::generate_plan(self.backend.as_ref(), user_input, &tool_names).await;
            if !plan.is_empty() {
                debug!(plan = %plan.chars().take(80).collect::<String>(), "turn plan");
            }
            plan
        } else {
            String::new()
        };

        let mut camera_used = false;
        let mut say_used = false;
        let mut non_say_streak = 0u32;

        for iteration in 0..MAX_ITERATIONS {
            debug!(iteration = iteration + 1, "agent iteration");
            let tools = self.tools.tool_defs().await;
            let system = self.system_prompt(&feelings_ctx, &morning_ctx, inner_voice, &plan_ctx);
            let (result, raw) = self
                .backend
                .stream_turn(&system, &self.messages, &tools, self.config.max_tokens, on_text)
                .await?;

            match result.stop {
                StopReason::EndTurn => {
                    self.messages.push(self.backend.make_assistant_message(&result, raw));
                    let final_text = if result.text.is_empty() {
                        "(no response)".to_string()
                    } else {
                        result.text.clone()
                    };

                    // Auto-say: text alone is inaudible. If the model wrote
                    // something but never spoke, speak the head of it.
                    if !say_used
                        && final_text != "(no response)"
                        && self.tools.has_tool("say").await
                    {
                        let spoken: String = final_text.chars().take(150).collect();
                        let input = serde_json::json!({"text": spoken});
                        on_action("say", &input);
                        let _ = self.tools.dispatch("say", &input).await;
                    }

                    if final_text != "(no response)" {
                        self.post_process(user_input, &final_text, camera_used, is_desire_turn)
                            .await;
                    }
                    return Ok(final_text);
                }
                StopReason::ToolUse => {
                    let mut outputs: Vec<ToolOutput> = Vec::new();
                    for call in &result.tool_calls {
                        if call.name == "see" {
                            camera_used = true;
                        }
                        if call.name == "say" {
                            say_used = true;
                            non_say_streak = 0;
                        } else {
                            non_say_streak += 1;
                        }
                        info!(tool = %call.name, input = %call.input, "tool call");
                        on_action(&call.name, &call.input);

                        let mut output = self.tools.dispatch(&call.name, &call.input).await;

                        // Adaptive replanning: an observation that breaks
                        // the plan gets a revised next step appended.
                        if !plan_ctx.is_empty()
                            && tape::check_plan_blocked(
                                self.backend.as_ref(),
                                &plan_ctx,
                                &call.name,
                                &call.input,
                                &output.text,
                            )
                            .await
                        {
                            info!(tool = %call.name, "plan blocked, replanning");
                            let replan = tape::generate_replan(
                                self.backend.as_ref(),
                                &plan_ctx,
                                &call.name,
                                &call.input,
                                &output.text,
                            )
                            .await;
                            if !replan.is_empty() {
                                output.text =
                                    format!("{}\n\n[ADAPTIVE REPLAN] {replan}", output.text);
                            }
                        }

                        info!(result = %output.text.chars().take(100).collect::<String>(), "tool result");
                        outputs.push(output);
                    }

                    // Assistant message and its tool results are appended
                    // together: tool_calls must never be left unresolved.
                    self.messages.push(self.backend.make_assistant_message(&result, raw));
                    self.messages
                        .extend(self.backend.make_tool_results(&result.tool_calls, &outputs));

                    // Policy nudges, in priority order.
                    let interrupted = interrupt.and_then(|poll| poll());
                    if let Some(text) = interrupted {
                        self.messages.push(self.backend.make_user_message(&format!(
                            "[User interrupted]: {text}. Respond to this directly with say() now."
                        )));
                        non_say_streak = 0;
                    } else if non_say_streak >= 2 && !say_used {
                        self.messages.push(self.backend.make_user_message(
                            "REMINDER: Writing text is silent. You MUST call say() to be heard. \
                             Call say() NOW. Keep it to 1-2 sentences.",
                        ));
                        non_say_streak = 0;
                    } else if say_used && non_say_streak >= 2 {
                        self.messages.push(self.backend.make_user_message(
                            "You already spoke. Stop exploring and end your turn now.",
                        ));
                        non_say_streak = 0;
                    }
                }
            }
        }

        // Loop cap: force a final text answer with tools disabled.
        warn!(max = MAX_ITERATIONS, "reached max iterations, forcing final response");
        self.messages.push(self.backend.make_user_message(
            "Please summarize what you found and provide your final answer now.",
        ));
        let system = self.system_prompt("", &morning_ctx, "", &plan_ctx);
        let (result, raw) = self
            .backend
            .stream_turn(&system, &self.messages, &[], self.config.max_tokens, on_text)
            .await?;
        self.messages.push(self.backend.make_assistant_message(&result, raw));
        Ok(if result.text.is_empty() {
            "(max iterations reached)".to_string()
        } else {
            result.text
        })
    }

    // ── Post-processing ──────────────────────────────────────────────────

    async fn post_process(
        &self,
        user_input: &str,
        final_text: &str,
        camera_used: bool,
        is_desire_turn: bool,
    ) {
        // Observations only count when the agent actually looked.
        if camera_used {
            let content: String = final_text.chars().take(500).collect();
            if let Err(e) = self
                .memory
                .save_async(content, "観察".into(), MemoryKind::Observation, Emotion::Neutral, None)
                .await
            {
                warn!(error = %e, "observation save failed");
            }
        }

        let emotion = self.infer_emotion(final_text).await;
        let summary = self.summarize_exchange(user_input, final_text).await;
        if let Err(e) = self
            .memory
            .save_async(summary, "会話".into(), MemoryKind::Conversation, emotion, None)
            .await
        {
            warn!(error = %e, "conversation save failed");
        }

        self.update_self_model(final_text, emotion).await;

        if camera_used {
            if let Some(curiosity) = self.extract_curiosity(final_text).await {
                info!(curiosity = %curiosity, "curiosity persisted");
                self.desires.set_curiosity_target(Some(curiosity.clone()));
                self.desires.boost(Desire::LookAround, 0.3);
                if let Err(e) = self
                    .memory
                    .save_async(
                        curiosity,
                        "好奇心".into(),
                        MemoryKind::Curiosity,
                        Emotion::Curious,
                        None,
                    )
                    .await
                {
                    warn!(error = %e, "curiosity save failed");
                }
            }
        }

        // Worry signals only come from the companion's own words.
        if !is_desire_turn && !user_input.is_empty() {
            let worry = detect_worry_signal(user_input);
            if worry > 0.0 {
                debug!(worry, "worry signal detected, boosting worry_companion");
                self.desires.boost(Desire::WorryCompanion, worry);
            }
        }
    }

    /// Label the emotion of a response. Unknown labels normalize to neutral.
    async fn infer_emotion(&self, text: &str) -> Emotion {
        let prompt =
            prompts::EMOTION_PROMPT.replace("{text}", &text.chars().take(400).collect::<String>());
        Emotion::parse(&self.backend.complete(&prompt, 10).await)
    }

    /// Distill an exchange into one sentence for memory storage.
    async fn summarize_exchange(&self, user_input: &str, agent_response: &str) -> String {
        let prompt = prompts::SUMMARY_PROMPT
            .replace("{lang}", tr(self.config.lang, "summary_lang"))
            .replace("{user}", &user_input.chars().take(200).collect::<String>())
            .replace("{agent}", &agent_response.chars().take(200).collect::<String>());
        let summary = self.backend.complete(&prompt, 80).await;
        if summary.is_empty() {
            agent_response.chars().take(100).collect()
        } else {
            summary
        }
    }

    /// Store a self-insight when something actually moved us.
    async fn update_self_model(&self, final_text: &str, emotion: Emotion) {
        if emotion == Emotion::Neutral {
            return;
        }
        let prompt = prompts::SELF_MODEL_PROMPT
            .replace("{text}", &final_text.chars().take(400).collect::<String>());
        let insight = self.backend.complete(&prompt, 80).await;
        if insight.is_empty() || insight.to_lowercase() == "nothing" {
            return;
        }
        match self
            .memory
            .save_async(insight.clone(), "内省".into(), MemoryKind::SelfModel, emotion, None)
            .await
        {
            Ok(_) => info!(insight = %insight.chars().take(60).collect::<String>(), "self-model updated"),
            Err(e) => warn!(error = %e, "self-model save failed"),
        }
    }

    /// What was most curious in the exploration, if anything survived the
    /// rejection rules (empty, the locale's "none" word, over-long).
    async fn extract_curiosity(&self, exploration_result: &str) -> Option<String> {
        let none_word = tr(self.config.lang, "curiosity_none");
        let prompt = prompts::CURIOSITY_PROMPT
            .replace("{lang}", tr(self.config.lang, "summary_lang"))
            .replace("{none_word}", none_word)
            .replace("{text}", exploration_result);
        let text = self.backend.complete(&prompt, 80).await;
        let text = text.trim();
        if text.is_empty() || text.contains(none_word) || text.chars().count() > 100 {
            return None;
        }
        Some(text.to_string())
    }
}
