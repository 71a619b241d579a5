//! Typed records coerced out of free-form completions.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub trait StructuredOutput: DeserializeOwned + Sized {
    const NAME: &'static str;

    /// The required string field; must be non-empty after trimming.
    fn primary(&self) -> &str;

    fn normalize(self) -> Self {
        self
    }

    /// Recover a record from a reply that ignored JSON mode.
    fn from_plain_text(_text: &str) -> Option<Self> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedQuery {
    pub sql_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedAnswer {
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedQuestion {
    pub question: String,
}

impl StructuredOutput for GeneratedQuery {
    const NAME: &'static str = "sql_query";

    fn primary(&self) -> &str {
        &self.sql_query
    }

    fn normalize(self) -> Self {
        GeneratedQuery {
            sql_query: normalize_sql(&self.sql_query),
        }
    }

    fn from_plain_text(text: &str) -> Option<Self> {
        let sql = extract_fenced(text, "sql")
            .or_else(|| extract_fenced(text, ""))
            .unwrap_or_else(|| text.trim().to_string());
        let head = sql.trim_start().to_ascii_uppercase();
        if head.starts_with("SELECT") || head.starts_with("WITH") || head.starts_with("VALUES") {
            Some(GeneratedQuery { sql_query: sql })
        } else {
            None
        }
    }
}

impl StructuredOutput for GeneratedAnswer {
    const NAME: &'static str = "answer";

    fn primary(&self) -> &str {
        &self.answer
    }

    fn normalize(self) -> Self {
        GeneratedAnswer {
            answer: self.answer.trim().to_string(),
        }
    }

    fn from_plain_text(text: &str) -> Option<Self> {
        Some(GeneratedAnswer {
            answer: text.trim().to_string(),
        })
    }
}

impl StructuredOutput for GeneratedQuestion {
    const NAME: &'static str = "question";

    fn primary(&self) -> &str {
        &self.question
    }

    fn normalize(self) -> Self {
        GeneratedQuestion {
            question: self.question.trim().trim_matches('`').trim().to_string(),
        }
    }

    fn from_plain_text(text: &str) -> Option<Self> {
        let question = extract_fenced(text, "").unwrap_or_else(|| text.trim().to_string());
        Some(GeneratedQuestion { question })
    }
}

/// Parse a completion into `T`, trying JSON first and the plain-text fallback second.
pub fn parse<T: StructuredOutput>(raw: &str) -> Result<T> {
    let json = extract_json(raw);
    let parsed = match serde_json::from_str::<T>(&json) {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("{} reply was not JSON ({}), trying plain text", T::NAME, e);
            T::from_plain_text(raw)
        }
    };

    match parsed.map(T::normalize) {
        Some(value) if !value.primary().trim().is_empty() => Ok(value),
        _ => Err(Error::MalformedOutput {
            expected: T::NAME,
            raw: truncate(raw, 500),
        }),
    }
}

/// Strip whitespace and trailing semicolons so equivalent SQL text compares equal.
pub fn normalize_sql(sql: &str) -> String {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace()).to_string()
}

/// Extract JSON from a reply (handles markdown code blocks and surrounding chatter)
pub fn extract_json(response: &str) -> String {
    let trimmed = response.trim();

    if let Some(inner) = extract_fenced(trimmed, "json") {
        return inner;
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return trimmed[start..=end].to_string();
        }
    }

    trimmed.to_string()
}

/// Contents of the first ``` fenced block. `lang` of "" matches any block.
///
/// A fence with no newline before its closing ``` (```sql SELECT 1```) is read
/// as a single line whose first word may be the language tag.
pub fn extract_fenced(text: &str, lang: &str) -> Option<String> {
    let mut search_from = 0;
    while let Some(found) = text[search_from..].find("```") {
        let open = search_from + found + 3;
        let rest = &text[open..];
        let first_close = rest.find("```");

        let (tag, body, close) = match rest.find('\n') {
            Some(line_end) if first_close.map_or(true, |c| line_end < c) => {
                let body_start = line_end + 1;
                let close = rest[body_start..].find("```").map(|i| body_start + i);
                // An unterminated block runs to the end of the reply
                let body = &rest[body_start..close.unwrap_or(rest.len())];
                (rest[..line_end].trim(), body, close)
            }
            _ => {
                let inner = &rest[..first_close.unwrap_or(rest.len())];
                match inner.trim_start().split_once(char::is_whitespace) {
                    Some((tag, body)) if !lang.is_empty() && tag.eq_ignore_ascii_case(lang) => {
                        (tag, body, first_close)
                    }
                    _ => ("", inner, first_close),
                }
            }
        };

        if lang.is_empty() || tag.eq_ignore_ascii_case(lang) {
            return Some(body.trim().to_string());
        }

        match close {
            Some(close) => search_from = open + close + 3,
            None => return None,
        }
    }
    None
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}... (truncated)", head)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let query: GeneratedQuery =
            parse(r#"{"sql_query": "SELECT count(*) FROM orders;"}"#).unwrap();
        assert_eq!(query.sql_query, "SELECT count(*) FROM orders");
    }

    #[test]
    fn parses_json_inside_chatter_and_fences() {
        let raw = "Sure! Here it is:\n```json\n{\"answer\": \"There were 42 orders.\"}\n```";
        let answer: GeneratedAnswer = parse(raw).unwrap();
        assert_eq!(answer.answer, "There were 42 orders.");

        let raw = "Result: {\"question\": \"Which team misses the most due dates?\"} hope that helps";
        let question: GeneratedQuestion = parse(raw).unwrap();
        assert_eq!(question.question, "Which team misses the most due dates?");
    }

    #[test]
    fn falls_back_to_sql_fence() {
        let raw = "Based on the provided schema and question, here is the query:\n```sql\nSELECT name\nFROM steps\nLIMIT 3;\n```";
        let query: GeneratedQuery = parse(raw).unwrap();
        assert_eq!(query.sql_query, "SELECT name\nFROM steps\nLIMIT 3");
    }

    #[test]
    fn falls_back_to_bare_sql() {
        let query: GeneratedQuery = parse("WITH t AS (SELECT 1) SELECT * FROM t").unwrap();
        assert!(query.sql_query.starts_with("WITH"));
    }

    #[test]
    fn rejects_prose_as_sql() {
        let err = parse::<GeneratedQuery>("Insufficient schema information to answer this query.")
            .unwrap_err();
        assert!(matches!(err, Error::MalformedOutput { expected: "sql_query", .. }));
    }

    #[test]
    fn rejects_empty_required_field() {
        assert!(parse::<GeneratedQuery>(r#"{"sql_query": "   "}"#).is_err());
        assert!(parse::<GeneratedAnswer>("   ").is_err());
    }

    #[test]
    fn question_from_generic_fence() {
        let raw = "```\nWhat share of steps are automated per week?\n```";
        let question: GeneratedQuestion = parse(raw).unwrap();
        assert_eq!(question.question, "What share of steps are automated per week?");
    }

    #[test]
    fn fenced_block_selection() {
        let text = "```python\nprint(1)\n```\nand\n```sql\nSELECT 1\n```";
        assert_eq!(extract_fenced(text, "sql").as_deref(), Some("SELECT 1"));
        assert_eq!(extract_fenced(text, "").as_deref(), Some("print(1)"));
        assert_eq!(extract_fenced("```sql\nSELECT 2", "sql").as_deref(), Some("SELECT 2"));
        assert_eq!(extract_fenced("no fences", "sql"), None);
    }

    #[test]
    fn single_line_fences() {
        assert_eq!(extract_fenced("```sql SELECT 1```", "sql").as_deref(), Some("SELECT 1"));
        assert_eq!(
            extract_fenced("Try ```SELECT 2``` then", "").as_deref(),
            Some("SELECT 2")
        );
        assert_eq!(extract_fenced("```sql SELECT 3", "sql").as_deref(), Some("SELECT 3"));
        assert_eq!(extract_fenced("```python print(1)```", "sql"), None);

        let query: GeneratedQuery =
            parse("Here you go: ```sql SELECT count(*) FROM orders;```").unwrap();
        assert_eq!(query.sql_query, "SELECT count(*) FROM orders");
        let query: GeneratedQuery = parse("```SELECT 1```").unwrap();
        assert_eq!(query.sql_query, "SELECT 1");
    }
}
