//! Response generation for thinker agents.
//!
//! The [`ResponseGenerator`] turns a persona plus recent conversation
//! history into one thinker-voiced reply and its dollar cost. Generation
//! streams: extended-thinking deltas are rewritten into a first-person
//! internal monologue and broadcast to the room as throttled
//! `thinker_thinking` previews while the response assembles.
//!
//! Two auxiliary decisions also live here because they shape the reply
//! itself: the response-style tier (length/tone instruction plus token
//! budget) and the splitting of a finished reply into display bubbles.

use crate::agora::chance::Chance;
use crate::agora::event::RoomEvent;
use crate::agora::llm_client::{CompletionRequest, LlmClient, LlmError, LlmTokenUsage, StreamEvent};
use crate::agora::message::{ChatMessage, Thinker};
use crate::agora::room::RoomRegistry;
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cost per token for prompt input (Claude Sonnet class, $3/MTok).
pub const INPUT_COST_PER_TOKEN: f64 = 0.000_003;
/// Cost per token for completion output ($15/MTok).
pub const OUTPUT_COST_PER_TOKEN: f64 = 0.000_015;
/// Extended thinking bills at the output rate.
pub const THINKING_COST_PER_TOKEN: f64 = 0.000_015;

/// How many trailing messages feed the prompt.
const HISTORY_WINDOW: usize = 20;
/// Extended-thinking budget added on top of every response budget.
const THINKING_BUDGET_TOKENS: usize = 2000;

/// Below this many characters a reply is never split into bubbles.
const BUBBLE_MIN_SPLIT_CHARS: usize = 60;
/// Up to this length a reply may stay a single bubble by choice.
const SINGLE_BUBBLE_MAX_CHARS: usize = 250;
/// Above this length a lone bubble is force-split at a sentence boundary.
const FORCED_SPLIT_CHARS: usize = 300;

/// Discourse transitions that prefer to open a new bubble.
const TRANSITION_MARKERS: &[&str] = &[
    "However",
    "But ",
    "Still,",
    "And yet",
    "On the other hand",
    "That said",
    "Then again",
];

/// Phrase rewrites that turn raw model reasoning into something closer to a
/// person musing to themselves.
const MONOLOGUE_REWRITES: &[(&str, &str)] = &[
    ("I should", "Perhaps I should"),
    ("I need to", "I suppose I must"),
    ("I want to", "I find myself wanting to"),
    ("The user", "They"),
    ("the user", "they"),
];

/// Contemplative openers. Selection hashes the fragment, so the same
/// partial thought always receives the same opener within a run.
const CONTEMPLATIVE_PREFIXES: &[&str] = &[
    "Hmm... ",
    "Let me see... ",
    "I wonder... ",
    "Now then... ",
    "Ah, but... ",
];

/// Length/tone tier for one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStyle {
    /// One-clause follow-up to the thinker's own previous message.
    VeryBrief,
    /// Single-sentence reaction.
    Brief,
    /// One or two sentences.
    Medium,
    /// A few sentences engaging with the discussion.
    Substantive,
    /// A longer exploration of the idea.
    Extended,
}

impl ResponseStyle {
    /// Natural-language instruction appended to the persona prompt.
    pub fn instruction(&self) -> &'static str {
        match self {
            ResponseStyle::VeryBrief => {
                "Respond with a very brief follow-up thought, one short sentence, \
                 like 'Though I should add...' or 'Actually, on reflection...'"
            }
            ResponseStyle::Brief => {
                "Give a brief, direct reaction in a single sentence, like \
                 'I couldn't agree more' or 'That is precisely my concern'"
            }
            ResponseStyle::Medium => "Give a short response of one or two sentences",
            ResponseStyle::Substantive => "Give a substantive response (2-4 sentences)",
            ResponseStyle::Extended => {
                "Give a more extended response exploring the idea deeply (4-6 sentences)"
            }
        }
    }

    /// Token budget for the visible reply.
    pub fn max_tokens(&self) -> usize {
        match self {
            ResponseStyle::VeryBrief => 60,
            ResponseStyle::Brief => 80,
            ResponseStyle::Medium => 160,
            ResponseStyle::Substantive => 300,
            ResponseStyle::Extended => 500,
        }
    }
}

/// Pick a style tier for the next reply, biased by context: a thinker who
/// just spoke leans toward an ultra-brief follow-up, one who was addressed
/// directly leans toward a fuller answer.
pub fn choose_response_style(
    thinker_name: &str,
    messages: &[ChatMessage],
    chance: &mut dyn Chance,
) -> ResponseStyle {
    let recent = tail(messages, 5);
    let just_spoke = recent
        .last()
        .map(|m| m.sender_name.as_deref() == Some(thinker_name))
        .unwrap_or(false);
    let lowered = thinker_name.to_lowercase();
    let addressed = tail(recent, 2)
        .iter()
        .any(|m| m.content.to_lowercase().contains(&lowered));

    let roll = chance.roll();
    if just_spoke && roll < 0.3 {
        return ResponseStyle::VeryBrief;
    }
    if addressed {
        if roll < 0.15 {
            ResponseStyle::Brief
        } else if roll < 0.45 {
            ResponseStyle::Medium
        } else if roll < 0.85 {
            ResponseStyle::Substantive
        } else {
            ResponseStyle::Extended
        }
    } else if roll < 0.2 {
        ResponseStyle::Brief
    } else if roll < 0.5 {
        ResponseStyle::Medium
    } else if roll < 0.85 {
        ResponseStyle::Substantive
    } else {
        ResponseStyle::Extended
    }
}

/// Throttling knobs for thinking previews.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Base interval between previews, scaled by the room's speed
    /// multiplier.
    pub interval: Duration,
    /// Fragments shorter than this are suppressed to avoid flashing
    /// half-formed thoughts at clients.
    pub min_chars: usize,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        PreviewConfig {
            interval: Duration::from_millis(300),
            min_chars: 24,
        }
    }
}

/// A finished reply: the full text (bubble splitting happens afterwards)
/// and the dollar cost of generating it.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub text: String,
    pub cost: f64,
}

/// Streams thinker replies and prices them.
#[derive(Clone)]
pub struct ResponseGenerator {
    llm: Arc<dyn LlmClient>,
    rooms: Arc<RoomRegistry>,
    preview: PreviewConfig,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, rooms: Arc<RoomRegistry>) -> Self {
        ResponseGenerator {
            llm,
            rooms,
            preview: PreviewConfig::default(),
        }
    }

    pub fn with_preview_config(mut self, preview: PreviewConfig) -> Self {
        self.preview = preview;
        self
    }

    /// Generate one in-character reply for `thinker`, streaming thinking
    /// previews to the room along the way.
    pub async fn generate(
        &self,
        conversation_id: &str,
        thinker: &Thinker,
        messages: &[ChatMessage],
        topic: &str,
        style: ResponseStyle,
    ) -> Result<GeneratedReply, LlmError> {
        let prompt = build_persona_prompt(thinker, messages, topic, style.instruction());
        self.run_stream(conversation_id, &thinker.name, prompt, style.max_tokens())
            .await
    }

    /// Generate a short message inviting the (quiet) human participant back
    /// into the discussion, addressed to them by name.
    pub async fn generate_invitation(
        &self,
        conversation_id: &str,
        thinker: &Thinker,
        messages: &[ChatMessage],
        topic: &str,
        user_name: &str,
    ) -> Result<GeneratedReply, LlmError> {
        let prompt = build_invitation_prompt(thinker, messages, topic, user_name);
        self.run_stream(conversation_id, &thinker.name, prompt, 80).await
    }

    /// Drive one streaming completion to the end, broadcasting throttled
    /// thinking previews. If the room is paused mid-stream the stream keeps
    /// draining but no further preview leaves this function.
    async fn run_stream(
        &self,
        conversation_id: &str,
        thinker_name: &str,
        prompt: String,
        max_tokens: usize,
    ) -> Result<GeneratedReply, LlmError> {
        let request = CompletionRequest {
            prompt,
            max_tokens: max_tokens + THINKING_BUDGET_TOKENS,
            thinking_budget: THINKING_BUDGET_TOKENS,
        };

        let mut stream = self.llm.stream_completion(request).await?;

        let speed = self.rooms.speed(conversation_id).await;
        let throttle = self.preview.interval.mul_f64(speed);
        let mut last_preview: Option<Instant> = None;

        let mut thinking_text = String::new();
        let mut response_text = String::new();
        let mut usage = LlmTokenUsage::default();

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Thinking(delta) => {
                    thinking_text.push_str(&delta);
                    if self.rooms.is_paused(conversation_id).await {
                        continue;
                    }
                    let due = last_preview
                        .map(|at| at.elapsed() >= throttle)
                        .unwrap_or(true);
                    if due {
                        let fragment = preview_fragment(&thinking_text);
                        if fragment.chars().count() >= self.preview.min_chars {
                            self.rooms
                                .broadcast(
                                    conversation_id,
                                    RoomEvent::ThinkerThinking {
                                        thinker: thinker_name.to_string(),
                                        preview: stylize_thinking(&fragment),
                                    },
                                )
                                .await;
                            last_preview = Some(Instant::now());
                        }
                    }
                }
                StreamEvent::Text(delta) => response_text.push_str(&delta),
                StreamEvent::Usage(reported) => usage = reported,
            }
        }

        // Providers do not report thinking tokens separately; estimate one
        // token per four characters of reasoning text.
        let thinking_tokens = thinking_text.chars().count() / 4;
        let cost = usage.input_tokens as f64 * INPUT_COST_PER_TOKEN
            + usage.output_tokens as f64 * OUTPUT_COST_PER_TOKEN
            + thinking_tokens as f64 * THINKING_COST_PER_TOKEN;

        log::debug!(
            "generated {} chars for '{}' in conversation {} (cost ${:.6})",
            response_text.len(),
            thinker_name,
            conversation_id,
            cost
        );

        Ok(GeneratedReply {
            text: response_text.trim().to_string(),
            cost,
        })
    }
}

/// Assemble the persona prompt: who the thinker is, what the room is
/// discussing, the recent transcript, and the style instruction.
fn build_persona_prompt(
    thinker: &Thinker,
    messages: &[ChatMessage],
    topic: &str,
    style_instruction: &str,
) -> String {
    let history = transcript(messages);
    format!(
        "You are simulating {name} in a group discussion.\n\n\
         ABOUT {upper}:\n\
         Bio: {bio}\n\
         Known positions: {positions}\n\
         Communication style: {style}\n\n\
         DISCUSSION TOPIC: {topic}\n\n\
         CONVERSATION SO FAR:\n{history}\n\n\
         Now respond as {name} would. Guidelines:\n\
         - Stay in character based on their known views and communication style\n\
         - Use modern English regardless of their era\n\
         - If discussing something that didn't exist in their time, acknowledge it\n\
         - Engage with what others have said: agree, disagree, build on ideas\n\
         - Don't be preachy or lecture-like\n\
         - Show personality through your response style\n\n\
         RESPONSE STYLE: {instruction}\n\n\
         Respond with ONLY what {name} would say, nothing else.",
        name = thinker.name,
        upper = thinker.name.to_uppercase(),
        bio = thinker.bio,
        positions = thinker.positions,
        style = thinker.style,
        topic = topic,
        history = history,
        instruction = style_instruction,
    )
}

/// Prompt for inviting the human participant back into the conversation.
fn build_invitation_prompt(
    thinker: &Thinker,
    messages: &[ChatMessage],
    topic: &str,
    user_name: &str,
) -> String {
    let history = transcript(messages);
    format!(
        "You are simulating {name} in a group discussion about: {topic}\n\n\
         ABOUT {upper}:\n\
         Bio: {bio}\n\
         Communication style: {style}\n\n\
         CONVERSATION SO FAR:\n{history}\n\n\
         {user} has been quiet for a while. As {name}, turn to them and draw \
         them back into the discussion with one short, natural question \
         addressed to them by name. One or two sentences at most.\n\n\
         Respond with ONLY what {name} would say, nothing else.",
        name = thinker.name,
        upper = thinker.name.to_uppercase(),
        bio = thinker.bio,
        style = thinker.style,
        topic = topic,
        history = history,
        user = user_name,
    )
}

fn transcript(messages: &[ChatMessage]) -> String {
    tail(messages, HISTORY_WINDOW)
        .iter()
        .map(|m| format!("{}: {}", m.sender_label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    if items.len() > n {
        &items[items.len() - n..]
    } else {
        items
    }
}

/// Extract a displayable fragment from accumulated thinking text: the last
/// ~150 characters snapped to a sentence start, with any leading partial
/// word dropped and an ellipsis appended when the thought is mid-flight.
pub fn preview_fragment(thinking: &str) -> String {
    let text = thinking.trim();
    if text.is_empty() {
        return String::new();
    }

    let total_chars = text.chars().count();
    let mut window: String = if total_chars > 150 {
        text.chars().skip(total_chars - 150).collect()
    } else {
        text.to_string()
    };

    if total_chars > 150 {
        // Try to start at a sentence boundary near the head of the window.
        for punct in &[". ", "! ", "? ", "\n"] {
            if let Some(idx) = window.find(punct) {
                if idx < 50 {
                    window = window[idx + punct.len()..].to_string();
                    break;
                }
            }
        }
    }

    // Drop an incomplete word at the start.
    let starts_clean = window
        .chars()
        .next()
        .map(|c| c.is_uppercase())
        .unwrap_or(false);
    if !starts_clean {
        if let Some(space) = window.find(' ') {
            window = window[space + 1..].to_string();
        }
    }

    let mut fragment = window.trim().to_string();
    if !fragment.is_empty()
        && !fragment.ends_with('.')
        && !fragment.ends_with('!')
        && !fragment.ends_with('?')
    {
        fragment.push_str("...");
    }
    fragment
}

/// Rewrite a thinking fragment into first-person monologue style and add a
/// deterministic contemplative opener chosen by hashing the fragment.
pub fn stylize_thinking(fragment: &str) -> String {
    let mut text = fragment.to_string();
    for (from, to) in MONOLOGUE_REWRITES {
        text = text.replace(from, to);
    }
    let digest = Sha256::digest(fragment.as_bytes());
    let prefix = CONTEMPLATIVE_PREFIXES[digest[0] as usize % CONTEMPLATIVE_PREFIXES.len()];
    format!("{}{}", prefix, text)
}

/// Split a finished reply into 1..N display bubbles to mimic natural
/// multi-message texting.
///
/// Short replies stay whole. Longer ones either remain a single bubble (a
/// coin flip, only while under 250 characters) or split at sentence
/// boundaries toward a randomly drawn target chunk size, preferring to
/// open a new bubble at discourse transitions. A lone bubble still over
/// 300 characters is force-split at the sentence boundary nearest past the
/// midpoint.
pub fn split_into_bubbles(text: &str, chance: &mut dyn Chance) -> Vec<String> {
    let text = text.trim();
    let total_chars = text.chars().count();
    if total_chars < BUBBLE_MIN_SPLIT_CHARS {
        return vec![text.to_string()];
    }

    let mut bubbles = if total_chars <= SINGLE_BUBBLE_MAX_CHARS && chance.roll() < 0.5 {
        vec![text.to_string()]
    } else {
        let target = {
            let strategy = chance.roll();
            if strategy < 0.33 {
                chance.range(80.0, 140.0)
            } else if strategy < 0.8 {
                chance.range(140.0, 220.0)
            } else {
                chance.range(220.0, 300.0)
            }
        } as usize;
        chunk_sentences(&split_sentences(text), target)
    };

    if bubbles.len() == 1 && bubbles[0].chars().count() > FORCED_SPLIT_CHARS {
        if let Some((head, rest)) = forced_midpoint_split(&bubbles[0]) {
            bubbles = vec![head, rest];
        }
    }

    bubbles
}

/// Split text into sentences, keeping terminators. A boundary is a `.`,
/// `!` or `?` followed by whitespace or end of text.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '.' || c == '!' || c == '?' {
            let boundary = match chars.peek() {
                Some((_, next)) => next.is_whitespace(),
                None => true,
            };
            if boundary {
                let end = idx + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = end;
            }
        }
    }
    let trailing = text[start..].trim();
    if !trailing.is_empty() {
        sentences.push(trailing.to_string());
    }
    sentences
}

/// Greedily pack sentences into chunks around `target` characters,
/// starting a fresh chunk early when a sentence opens with a discourse
/// transition.
fn chunk_sentences(sentences: &[String], target: usize) -> Vec<String> {
    let mut bubbles = Vec::new();
    let mut current = String::new();
    for sentence in sentences {
        let opens_transition = TRANSITION_MARKERS
            .iter()
            .any(|marker| sentence.starts_with(marker));
        let current_len = current.chars().count();
        let would_overflow =
            !current.is_empty() && current_len + 1 + sentence.chars().count() > target;
        let transition_break = opens_transition && current_len >= 40;
        if would_overflow || transition_break {
            bubbles.push(std::mem::take(&mut current));
        }
        if current.is_empty() {
            current.push_str(sentence);
        } else {
            current.push(' ');
            current.push_str(sentence);
        }
    }
    if !current.is_empty() {
        bubbles.push(current);
    }
    bubbles
}

/// Split at the sentence boundary nearest past the midpoint. Returns
/// `None` when the text is a single sentence and cannot be split cleanly.
fn forced_midpoint_split(text: &str) -> Option<(String, String)> {
    let sentences = split_sentences(text);
    if sentences.len() < 2 {
        return None;
    }
    let midpoint = text.chars().count() / 2;
    let mut cumulative = 0;
    for (i, sentence) in sentences.iter().enumerate() {
        cumulative += sentence.chars().count() + 1;
        if cumulative > midpoint && i + 1 < sentences.len() {
            return Some((sentences[..=i].join(" "), sentences[i + 1..].join(" ")));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agora::chance::SeededChance;
    use crate::agora::llm_client::CompletionStream;
    use crate::agora::message::SenderKind;
    use async_trait::async_trait;
    use chrono::Utc;

    fn message(sender: SenderKind, name: Option<&str>, content: &str) -> ChatMessage {
        ChatMessage {
            id: "m".to_string(),
            sender,
            sender_name: name.map(|n| n.to_string()),
            content: content.to_string(),
            cost: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn short_text_is_never_split() {
        let mut chance = SeededChance::new(1);
        let text = "  Brief indeed.  ";
        let bubbles = split_into_bubbles(text, &mut chance);
        assert_eq!(bubbles, vec!["Brief indeed.".to_string()]);
    }

    #[test]
    fn long_text_sometimes_splits_and_bubbles_end_at_sentences() {
        let text = "The question of justice cannot be settled by decree. \
                    Every generation must argue it anew, in its own words. \
                    However, the argument itself has a shape that recurs. \
                    We weigh the one against the many and flinch at both answers. \
                    That tension is not a flaw in our reasoning but the subject itself.";
        assert!(text.chars().count() > 300);

        let mut saw_split = false;
        for seed in 0..50 {
            let mut chance = SeededChance::new(seed);
            let bubbles = split_into_bubbles(text, &mut chance);
            assert!(!bubbles.is_empty());
            if bubbles.len() >= 2 {
                saw_split = true;
            }
            for bubble in &bubbles {
                let last = bubble.chars().last().unwrap();
                assert!(
                    last == '.' || last == '!' || last == '?',
                    "bubble did not end at a sentence boundary: {:?}",
                    bubble
                );
            }
        }
        assert!(saw_split, "no seed produced a multi-bubble split");
    }

    #[test]
    fn forced_split_lands_past_the_midpoint() {
        let text = "First sentence here. Second sentence follows. Third one closes.";
        let (head, rest) = forced_midpoint_split(text).unwrap();
        assert!(head.chars().count() > text.chars().count() / 2);
        assert!(head.ends_with('.'));
        assert!(rest.ends_with('.'));
    }

    #[test]
    fn single_sentence_cannot_be_force_split() {
        assert!(forced_midpoint_split("One long unbroken run of words with no boundary").is_none());
    }

    #[test]
    fn preview_fragment_appends_ellipsis_mid_thought() {
        let fragment = preview_fragment("Considering whether the premise even holds");
        assert!(fragment.ends_with("..."));
    }

    #[test]
    fn preview_fragment_of_empty_is_empty() {
        assert_eq!(preview_fragment("   "), "");
    }

    #[test]
    fn stylize_is_deterministic_and_rewrites_phrases() {
        let a = stylize_thinking("I should examine the premise first");
        let b = stylize_thinking("I should examine the premise first");
        assert_eq!(a, b);
        assert!(a.contains("Perhaps I should"));
        assert!(CONTEMPLATIVE_PREFIXES.iter().any(|p| a.starts_with(p)));
    }

    #[test]
    fn different_fragments_can_get_different_prefixes() {
        let mut seen = std::collections::HashSet::new();
        for i in 0..64 {
            let styled = stylize_thinking(&format!("thought number {}", i));
            let prefix = CONTEMPLATIVE_PREFIXES
                .iter()
                .find(|p| styled.starts_with(*p))
                .unwrap();
            seen.insert(*prefix);
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn very_brief_only_after_own_message() {
        let own_last = vec![
            message(SenderKind::User, None, "What do you all make of this?"),
            message(SenderKind::Thinker, Some("Laplace"), "Determinism, naturally."),
        ];
        let other_last = vec![
            message(SenderKind::Thinker, Some("Laplace"), "Determinism, naturally."),
            message(SenderKind::User, None, "What do you all make of this?"),
        ];

        let mut saw_very_brief = false;
        for seed in 0..200 {
            let mut chance = SeededChance::new(seed);
            if choose_response_style("Laplace", &own_last, &mut chance)
                == ResponseStyle::VeryBrief
            {
                saw_very_brief = true;
            }
            let mut chance = SeededChance::new(seed);
            assert_ne!(
                choose_response_style("Laplace", &other_last, &mut chance),
                ResponseStyle::VeryBrief
            );
        }
        assert!(saw_very_brief);
    }

    struct ScriptedLlm {
        events: Vec<StreamEvent>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn stream_completion(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionStream, LlmError> {
            let events: Vec<Result<StreamEvent, LlmError>> =
                self.events.iter().cloned().map(Ok).collect();
            Ok(Box::pin(futures_util::stream::iter(events)))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn generation_prices_tokens_and_streams_previews() {
        let thinking = "Weighing the premise carefully before committing to an answer here. \
                        It rests on an analogy that may not survive scrutiny.";
        let llm = Arc::new(ScriptedLlm {
            events: vec![
                StreamEvent::Thinking(thinking.to_string()),
                StreamEvent::Text("The analogy fails.".to_string()),
                StreamEvent::Usage(LlmTokenUsage {
                    input_tokens: 1000,
                    output_tokens: 100,
                }),
            ],
        });
        let rooms = Arc::new(RoomRegistry::new());
        let mut conn = rooms.connect("c1").await;
        let generator = ResponseGenerator::new(llm, rooms.clone());

        let thinker = Thinker::new("Hume", "Philosopher.", "Empiricism.", "Wry.");
        let reply = generator
            .generate("c1", &thinker, &[], "analogies", ResponseStyle::Brief)
            .await
            .unwrap();

        assert_eq!(reply.text, "The analogy fails.");
        let thinking_tokens = (thinking.chars().count() / 4) as f64;
        let expected = 1000.0 * INPUT_COST_PER_TOKEN
            + 100.0 * OUTPUT_COST_PER_TOKEN
            + thinking_tokens * THINKING_COST_PER_TOKEN;
        assert!((reply.cost - expected).abs() < 1e-12);

        let mut saw_preview = false;
        while let Ok(event) = conn.events.try_recv() {
            if let RoomEvent::ThinkerThinking { preview, .. } = event {
                assert!(!preview.is_empty());
                saw_preview = true;
            }
        }
        assert!(saw_preview);
    }

    #[tokio::test]
    async fn paused_room_suppresses_previews_but_drains_stream() {
        let llm = Arc::new(ScriptedLlm {
            events: vec![
                StreamEvent::Thinking(
                    "A long enough fragment of reasoning that would otherwise preview.".to_string(),
                ),
                StreamEvent::Text("Quiet reply.".to_string()),
            ],
        });
        let rooms = Arc::new(RoomRegistry::new());
        let mut conn = rooms.connect("c1").await;
        rooms.pause("c1").await;
        let generator = ResponseGenerator::new(llm, rooms.clone());

        let thinker = Thinker::new("Hume", "Philosopher.", "Empiricism.", "Wry.");
        let reply = generator
            .generate("c1", &thinker, &[], "anything", ResponseStyle::Brief)
            .await
            .unwrap();

        // The stream is still consumed to completion.
        assert_eq!(reply.text, "Quiet reply.");
        while let Ok(event) = conn.events.try_recv() {
            assert!(
                !matches!(event, RoomEvent::ThinkerThinking { .. }),
                "preview broadcast while paused"
            );
        }
    }
}
