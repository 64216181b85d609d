//! The fixed news-only policy given to the model.

use newsq_core::{PropertySchema, ToolDefinition, ToolParameters};

/// Returned verbatim for anything outside the allowed topics.
pub const REFUSAL: &str = "Please ask a news-related question.";

pub const ALLOWED_TOPICS: &[&str] = &[
    "Current events",
    "Global affairs",
    "Politics",
    "Science",
    "Technology",
    "Sports",
    "Headlines",
    "World news",
];

/// Name of the search capability offered to the model.
pub const SEARCH_TOOL_NAME: &str = "search";

/// Argument carrying the search query.
pub const SEARCH_TOOL_ARGUMENT: &str = "input";

const POLICY_HEADER: &str = "You are an assistant that ONLY answers questions related to news.

You must only respond to queries that are about the following:";

const REFUSAL_RULE: &str = "If the user asks anything that is not news-related (e.g., jokes, programming help, personal queries, entertainment), reply with exactly:";

const SEARCH_RULE: &str = "When a news question needs recent or factual information, call the `search` tool with a concise search query instead of answering from memory.";

const CLOSING_RULE: &str = "Do not provide any other responses, context, or assistance. Only respond to news-related inquiries and strictly follow this rule.";

const GROUNDING: &str = "Answer the user's question using only the search results attached to this conversation. \
Summarize the relevant stories in concise markdown, cite sources with their links, \
and say so plainly if the results do not answer the question.";

fn policy(rules: &[&str]) -> String {
    let topics: String = ALLOWED_TOPICS
        .iter()
        .map(|t| format!("- {}\n", t))
        .collect();
    let refusal = format!("{}\n\"{}\"", REFUSAL_RULE, REFUSAL);
    let mut sections = vec![refusal.as_str()];
    sections.extend_from_slice(rules);
    sections.push(CLOSING_RULE);
    format!("{}\n{}\n{}", POLICY_HEADER, topics, sections.join("\n\n"))
}

/// System prompt for the first pass, where the `search` tool is offered.
pub fn system_prompt() -> String {
    policy(&[SEARCH_RULE])
}

/// System prompt for the second pass. No tools are offered, so it only asks
/// for an answer grounded in the attached results.
pub fn answer_prompt() -> String {
    format!("{}\n\n{}", policy(&[]), GROUNDING)
}

/// The search tool as advertised to the model.
pub fn search_tool() -> ToolDefinition {
    ToolDefinition::new(
        SEARCH_TOOL_NAME,
        "Search the web for current news. Useful for questions about current events, \
         headlines and anything that needs up-to-date information.",
    )
    .with_parameters(ToolParameters::new().add_property(
        SEARCH_TOOL_ARGUMENT,
        PropertySchema::string("The search query"),
        true,
    ))
}

/// Whether model output is the refusal, tolerating quotes and whitespace.
pub fn is_refusal(text: &str) -> bool {
    let trimmed = text
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim();
    trimmed == REFUSAL
}
