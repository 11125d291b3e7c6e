//! Tolerant parsing of model output into an [`Explanation`]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Used when the parsed object has no description
pub const DEFAULT_DESCRIPTION: &str = "No description found.";
/// Used when the parsed object has no treatment, and by the fallback
pub const DEFAULT_TREATMENT: &str = "Consult a dermatologist.";

/// One way of turning model output into an explanation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// The whole text is a JSON object
    DirectJson,
    /// The text is a JSON object wrapped in markdown code fences
    FenceStripped,
    /// A JSON object is embedded somewhere in surrounding prose
    BraceDelimited,
    /// Raw text used as the description
    Fallback,
}

/// Strategy that produced an explanation
pub type ExplanationSource = ParseStrategy;

/// Strategies in the order they are tried; the last one always succeeds
pub const PARSE_ORDER: [ParseStrategy; 4] = [
    ParseStrategy::DirectJson,
    ParseStrategy::FenceStripped,
    ParseStrategy::BraceDelimited,
    ParseStrategy::Fallback,
];

/// Structured explanation of a condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub description: String,
    pub treatment: String,
    pub references: Vec<String>,
    #[serde(skip, default = "fallback_source")]
    pub source: ExplanationSource,
}

fn fallback_source() -> ExplanationSource {
    ParseStrategy::Fallback
}

impl Explanation {
    /// Raw text as description with the generic treatment
    #[must_use]
    pub fn fallback(raw: &str) -> Self {
        Self {
            description: raw.to_string(),
            treatment: DEFAULT_TREATMENT.to_string(),
            references: Vec::new(),
            source: ParseStrategy::Fallback,
        }
    }

    fn from_object(object: &Map<String, Value>, source: ExplanationSource) -> Self {
        Self {
            description: text_field(object, "description")
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            treatment: text_field(object, "treatment")
                .unwrap_or_else(|| DEFAULT_TREATMENT.to_string()),
            references: references_field(object),
            source,
        }
    }
}

impl ParseStrategy {
    /// Apply this strategy to `text`
    ///
    /// Returns `None` when the strategy does not yield a JSON object.
    #[must_use]
    pub fn apply(self, text: &str) -> Option<Explanation> {
        let object = match self {
            ParseStrategy::DirectJson => parse_object(text.trim()),
            ParseStrategy::FenceStripped => parse_object(&strip_fences(text)),
            ParseStrategy::BraceDelimited => {
                let cleaned = strip_fences(text);
                balanced_object(&cleaned)
                    .and_then(parse_object)
                    .or_else(|| outer_brace_span(&cleaned).and_then(parse_object))
            }
            ParseStrategy::Fallback => return Some(Explanation::fallback(text.trim())),
        };
        object.map(|object| Explanation::from_object(&object, self))
    }
}

/// Parse model output, trying each strategy in [`PARSE_ORDER`]
///
/// Never fails: text with no recoverable JSON object becomes a fallback
/// explanation carrying the raw text.
#[must_use]
pub fn parse_explanation(text: &str) -> Explanation {
    let explanation = PARSE_ORDER
        .iter()
        .find_map(|strategy| strategy.apply(text))
        .unwrap_or_else(|| Explanation::fallback(text.trim()));

    match explanation.source {
        ParseStrategy::DirectJson => debug!("Parsed explanation as JSON"),
        ParseStrategy::Fallback => warn!("No JSON object in model output, using raw text"),
        source => debug!("Parsed explanation after cleanup ({:?})", source),
    }

    explanation
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Remove ```` ```json ```` / ```` ``` ```` markers at the start or end of each line
fn strip_fences(text: &str) -> String {
    text.lines()
        .map(|line| {
            let line = line.trim();
            let line = line
                .strip_prefix("```json")
                .or_else(|| line.strip_prefix("```"))
                .unwrap_or(line);
            line.strip_suffix("```").unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// First `{...}` whose braces balance, ignoring braces inside JSON strings
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Span from the first `{` to the last `}`
fn outer_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn references_field(object: &Map<String, Value>) -> Vec<String> {
    match object.get("references") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(single)) => vec![single.clone()],
        _ => Vec::new(),
    }
}
