//! Parsing structured data out of model replies.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

fn list_marker() -> Option<&'static Regex> {
    static MARKER: OnceLock<Option<Regex>> = OnceLock::new();
    MARKER
        .get_or_init(|| Regex::new(r"^\s*(?:[-*•]+|\d+[.):]|#+)\s*").ok())
        .as_ref()
}

fn json_object() -> Option<&'static Regex> {
    static OBJECT: OnceLock<Option<Regex>> = OnceLock::new();
    OBJECT.get_or_init(|| Regex::new(r"(?s)\{.*\}").ok()).as_ref()
}

/// Extracts up to `max` search queries from a model reply.
///
/// The first `[...]` block that parses as a JSON array of strings wins,
/// wherever it starts.
/// Otherwise each non-empty line is a query, with list markers, quotes and
/// trailing commas removed. Blank and repeated queries are dropped.
#[must_use]
pub fn parse_query_list(reply: &str, max: usize) -> Vec<String> {
    let candidates = json_array(reply).unwrap_or_else(|| reply.lines().map(clean_line).collect());

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty() && q != "[" && q != "]")
        .filter(|q| seen.insert(q.clone()))
        .take(max)
        .collect()
}

fn json_array(reply: &str) -> Option<Vec<String>> {
    // Preambles may contain brackets too, so every opening bracket is a
    // candidate start, and queries may contain brackets, so every closing
    // bracket after it is a candidate end.
    reply.match_indices('[').find_map(|(start, _)| {
        let tail = &reply[start..];
        tail.match_indices(']')
            .find_map(|(end, _)| serde_json::from_str::<Vec<String>>(&tail[..=end]).ok())
    })
}

fn clean_line(line: &str) -> String {
    let line = match list_marker() {
        Some(marker) => marker.replace(line, "").into_owned(),
        None => line.to_string(),
    };
    line.trim()
        .trim_end_matches(',')
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

/// A research persona picked for the question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRole {
    /// Display name, e.g. `"💰 Finance Agent"`.
    pub server: String,
    /// System prompt for the persona.
    pub agent_role_prompt: String,
}

/// Extracts an [`AgentRole`] JSON object from a model reply.
#[must_use]
pub fn parse_agent_role(reply: &str) -> Option<AgentRole> {
    let found = json_object()?.find(reply)?;
    let role: AgentRole = serde_json::from_str(found.as_str()).ok()?;
    (!role.agent_role_prompt.trim().is_empty()).then_some(role)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_array_with_preamble() {
        let reply = "Sure! Here are the queries:\n[\"nba center age\", \"point guard average age\", \"nba roster ages 2024\"]\nGood luck.";
        assert_eq!(
            parse_query_list(reply, 3),
            vec!["nba center age", "point guard average age", "nba roster ages 2024"]
        );
    }

    #[test]
    fn test_json_array_with_brackets_inside() {
        let reply = r#"["rust [async] book", "tokio"]"#;
        assert_eq!(parse_query_list(reply, 5), vec!["rust [async] book", "tokio"]);
    }

    #[test]
    fn test_json_array_after_bracketed_preamble() {
        let reply = r#"Here are [3] queries: ["nba center age", "point guard age"]"#;
        assert_eq!(parse_query_list(reply, 3), vec!["nba center age", "point guard age"]);
    }

    #[test]
    fn test_line_fallback() {
        let reply = "1. first query\n2) \"second query\",\n- third query\n\n* first query";
        assert_eq!(parse_query_list(reply, 10), vec!["first query", "second query", "third query"]);
    }

    #[test]
    fn test_max_applies() {
        assert_eq!(parse_query_list(r#"["a", "b", "c", "d"]"#, 2), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_reply() {
        assert!(parse_query_list("   \n", 3).is_empty());
        assert!(parse_query_list("[]", 3).is_empty());
    }

    #[test]
    fn test_agent_role() {
        let reply = "response:\n{\n  \"server\": \"💰 Finance Agent\",\n  \"agent_role_prompt\": \"You are a finance analyst.\"\n}";
        let role = parse_agent_role(reply).unwrap();
        assert_eq!(role.server, "💰 Finance Agent");
        assert_eq!(role.agent_role_prompt, "You are a finance analyst.");

        assert!(parse_agent_role("no json here").is_none());
        assert!(parse_agent_role(r#"{"server": "x"}"#).is_none());
    }
}
