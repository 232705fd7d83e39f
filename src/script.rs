//! Dialogue script parsing: `Speaker: Text`, one line per utterance.
//!
//! `parse_dialogue` is the lenient parser the panel uses: lines that don't
//! match are dropped. `parse_with_diagnostics` runs the same grammar but
//! reports why each rejected line was rejected.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

static LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:]+):\s*(.+)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: String,
    pub text: String,
}

impl DialogueLine {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingColon,
    EmptySpeaker,
    EmptyText,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            RejectReason::MissingColon => "expected \"Speaker: Text\"",
            RejectReason::EmptySpeaker => "speaker name is empty",
            RejectReason::EmptyText => "no text after the speaker",
        };
        f.write_str(msg)
    }
}

/// A rejected line. `line_number` is 1-based against the raw input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineDiagnostic {
    pub line_number: usize,
    pub reason: RejectReason,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedScript {
    pub lines: Vec<DialogueLine>,
    pub diagnostics: Vec<LineDiagnostic>,
}

/// Parse a script, silently dropping lines that aren't `Speaker: Text`.
pub fn parse_dialogue(script: &str) -> Vec<DialogueLine> {
    script.lines().filter_map(|raw| parse_line(raw).ok()?).collect()
}

/// Parse a script and report every non-blank line that was rejected.
pub fn parse_with_diagnostics(script: &str) -> ParsedScript {
    let mut parsed = ParsedScript::default();

    for (idx, raw) in script.lines().enumerate() {
        match parse_line(raw) {
            Ok(Some(line)) => parsed.lines.push(line),
            Ok(None) => {}
            Err(reason) => parsed.diagnostics.push(LineDiagnostic {
                line_number: idx + 1,
                reason,
                content: raw.trim().to_string(),
            }),
        }
    }

    if !parsed.diagnostics.is_empty() {
        log::debug!(
            "[SCRIPT] {} lines parsed, {} rejected",
            parsed.lines.len(),
            parsed.diagnostics.len()
        );
    }

    parsed
}

/// `Ok(None)` for blank lines, `Err` for lines that don't fit the grammar.
fn parse_line(raw: &str) -> Result<Option<DialogueLine>, RejectReason> {
    let line = raw.trim();
    if line.is_empty() {
        return Ok(None);
    }

    if let Some(caps) = LINE_PATTERN.captures(line) {
        return Ok(Some(DialogueLine::new(caps[1].trim(), caps[2].trim())));
    }

    match line.split_once(':') {
        None => Err(RejectReason::MissingColon),
        Some((speaker, _)) if speaker.trim().is_empty() => Err(RejectReason::EmptySpeaker),
        Some(_) => Err(RejectReason::EmptyText),
    }
}

/// Distinct speaker names, sorted.
pub fn unique_speakers(dialogue: &[DialogueLine]) -> Vec<String> {
    dialogue
        .iter()
        .map(|d| d.speaker.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Everything one speaker says, joined with spaces.
pub fn combine_for_speaker(dialogue: &[DialogueLine], speaker: &str) -> String {
    dialogue
        .iter()
        .filter(|d| d.speaker == speaker)
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn full_text(dialogue: &[DialogueLine]) -> String {
    dialogue
        .iter()
        .map(|d| d.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_malformed_lines() {
        let lines = parse_dialogue("Alice: Hello there\ninvalid line\nBob: Hi!");
        assert_eq!(
            lines,
            vec![
                DialogueLine::new("Alice", "Hello there"),
                DialogueLine::new("Bob", "Hi!"),
            ]
        );
    }

    #[test]
    fn trims_speaker_and_text() {
        let lines = parse_dialogue("  Peter :   Y'know, Stewie  \r\n");
        assert_eq!(lines, vec![DialogueLine::new("Peter", "Y'know, Stewie")]);
    }

    #[test]
    fn keeps_colons_inside_text() {
        let lines = parse_dialogue("Stewie: Note: the time is 10:30");
        assert_eq!(lines[0].speaker, "Stewie");
        assert_eq!(lines[0].text, "Note: the time is 10:30");
    }

    #[test]
    fn preserves_order_and_repeated_speakers() {
        let lines = parse_dialogue("A: one\nB: two\nA: three");
        let speakers: Vec<_> = lines.iter().map(|l| l.speaker.as_str()).collect();
        assert_eq!(speakers, vec!["A", "B", "A"]);
    }

    #[test]
    fn empty_script_yields_nothing() {
        assert!(parse_dialogue("").is_empty());
        assert!(parse_dialogue("\n   \n").is_empty());
    }

    #[test]
    fn diagnostics_report_line_and_reason() {
        let parsed = parse_with_diagnostics("\nAlice: Hi\nno colon here\n: orphan\nBob:\n");
        assert_eq!(parsed.lines, vec![DialogueLine::new("Alice", "Hi")]);
        assert_eq!(parsed.diagnostics.len(), 3);

        assert_eq!(parsed.diagnostics[0].line_number, 3);
        assert_eq!(parsed.diagnostics[0].reason, RejectReason::MissingColon);
        assert_eq!(parsed.diagnostics[1].line_number, 4);
        assert_eq!(parsed.diagnostics[1].reason, RejectReason::EmptySpeaker);
        assert_eq!(parsed.diagnostics[2].line_number, 5);
        assert_eq!(parsed.diagnostics[2].reason, RejectReason::EmptyText);
        assert_eq!(parsed.diagnostics[2].content, "Bob:");
    }

    #[test]
    fn lenient_and_diagnostic_parsers_agree() {
        let script = "Peter: a\nbad\nStewie: b\n:x\nLois: c";
        assert_eq!(parse_dialogue(script), parse_with_diagnostics(script).lines);
    }

    #[test]
    fn speaker_helpers() {
        let lines = parse_dialogue("Stewie: Indeed.\nPeter: Heh.\nStewie: Quite.");
        assert_eq!(unique_speakers(&lines), vec!["Peter", "Stewie"]);
        assert_eq!(combine_for_speaker(&lines, "Stewie"), "Indeed. Quite.");
        assert_eq!(full_text(&lines), "Indeed. Heh. Quite.");
    }
}
