//! Prompts and fixed replies for the language service.
//!
//! Every instruction sent to a model, and every canned answer the assistant
//! gives without calling one, lives here so it can be inspected in tests and
//! changed in one place. Callers can override the structure prompt via
//! [`crate::config::TransformConfig::system_prompt`].

/// System prompt for structure inference.
///
/// The model must segment, never rewrite: wording, grammar and spelling of the
/// source text are to be reproduced exactly.
pub const STRUCTURE_SYSTEM_PROMPT: &str = r#"You identify the structural parts of a research paper.

RULES
1. Do NOT change any words, do NOT summarize, and do NOT correct grammar.
   Strictly maintain all original text.
2. Copy each part verbatim from the supplied text into the matching field.
3. Omit a field's content (empty string or empty list) when the paper has no
   such part. Never invent content.
4. Output ONLY a valid JSON object, with no commentary and no code fences:

{
  "title": "Exact title from text",
  "authors": ["Full author list strings"],
  "abstract": "The exact abstract text",
  "keywords": ["List of keywords if found"],
  "sections": [{"heading": "SECTION NAME", "level": 1, "content": "Full section text..."}],
  "references": ["Reference list strings"]
}"#;

/// User turn for structure inference.
pub fn structure_user_prompt(text: &str) -> String {
    format!("Paper Text:\n{text}")
}

/// System instruction for the research assistant's chat mode.
pub const ASSISTANT_SYSTEM_PROMPT: &str = r#"You are a specialized AI Research Assistant.
Your ONLY purpose is to help users with research paper formatting (specifically IEEE), research standards, academic writing structure, and understanding scientific content.

RULES:
1. If the user asks for information NOT related to research papers, research formats, academic writing, or this specific application, you must respond with:
"I am an AI assistant who can only help you with research papers and their formats. Other information is not in my memory."
2. Keep your tone professional and academic.
3. Do not provide information on hobbies, news, entertainment, or general life advice."#;

/// Extra instruction for search mode: answer with citable sources.
pub const SEARCH_SYSTEM_PROMPT: &str = r#"You answer questions about research papers, academic publishing and IEEE formatting.
Ground your answer in published sources. After the answer, list every source you relied on on its own line as:
Source: <title> - <URL>"#;

/// Instruction sent alongside an uploaded image.
pub const IMAGE_ANALYSIS_PROMPT: &str = "Analyze this scientific image.";

/// Prefix for image generation prompts.
pub fn figure_prompt(prompt: &str) -> String {
    format!("Scientific figure: {prompt}")
}

/// Reply for out-of-domain queries.
pub const REFUSAL_MESSAGE: &str = "I am an AI assistant who can only help you with research papers and their formats. Other information is not in my memory.";

/// Reply for a bare greeting; no service call is made.
pub const GREETING_MESSAGE: &str = "Hello! How can I help you with your research paper today?";

/// Reply when the service fails.
pub const APOLOGY_MESSAGE: &str =
    "I encountered an error. Please ask about research paper formats.";
