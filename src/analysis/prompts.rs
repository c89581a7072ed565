//! Prompt templates for insight analysis.

/// Prompt for analyzing insight text. `{content}` and `{context}` are
/// replaced before the call; the model must answer with a single JSON
/// object matching the fields of `InsightAnalysis`.
pub const TEXT_ANALYSIS_PROMPT: &str = r#"You are a financial analyst. Analyze the following market news item and respond with ONLY a JSON object, no prose before or after.

News item:
{content}
{context}
Respond with exactly this JSON shape:
{"summary": "<2-3 sentence summary of what happened and why it matters>",
 "action": "<one of: buy, sell, hold, watch>",
 "confidence": <number between 0 and 1>,
 "event_time": "<ISO-8601 timestamp of the described event, or null>",
 "levels": {"support": <number or null>, "resistance": <number or null>}}"#;

/// Section inserted into the text prompt when image analysis ran first.
pub const IMAGE_CONTEXT_SECTION: &str = "\nChart context from the attached image:\n{image_context}\n";

/// Prompt for describing an attached chart image.
pub const IMAGE_ANALYSIS_PROMPT: &str = "Describe this price chart for {symbol}: trend direction, notable support and resistance levels, and any chart patterns. Answer in 2-4 plain sentences.";
