//! Tag grammar: `{{ <key> }}`. A key whose trimmed body starts and ends
//! with a backtick is a literal escape (the backticks are stripped and
//! the text inside is emitted verbatim, never dispatched). Every other
//! key has a replace type, taken as the lowercased prefix up to the
//! first dot — except the `agent` family, which needs its second
//! segment to disambiguate `agent.version` from `agent.accountid`.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index {
    One(i64),
    Range(i64, i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Ssm,
    Gcsm,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceType {
    Config,
    AgentVersion,
    AgentAccountId,
    Lookup(Source),
    LookupCustom(Source),
    TOutput { optional: bool },
    TModule,
    OutputOptional,
}

/// A single `{{ ... }}` occurrence, located by byte span in the source
/// text so the caller can splice in the resolved replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Literal {
        span: Range<usize>,
        text: String,
    },
    Reference {
        span: Range<usize>,
        replace_type: ReplaceType,
        key: String,
        index: Option<Index>,
    },
}

impl Tag {
    pub fn span(&self) -> Range<usize> {
        match self {
            Tag::Literal { span, .. } => span.clone(),
            Tag::Reference { span, .. } => span.clone(),
        }
    }
}

/// Finds every `{{ ... }}` occurrence in `text` and parses it into a
/// `Tag`. Malformed tags (unclosed braces) are left untouched — the
/// caller only ever sees well-formed occurrences.
pub fn scan(text: &str) -> Vec<Tag> {
    let mut tags = Vec::new();
    let bytes = text.as_bytes();
    let mut cursor = 0usize;

    while let Some(open_rel) = text[cursor..].find("{{") {
        let open = cursor + open_rel;
        let Some(close_rel) = text[open + 2..].find("}}") else {
            break;
        };
        let close = open + 2 + close_rel;
        let span = open..close + 2;
        let body = text[open + 2..close].trim();

        if let Some(literal) = strip_backtick_escape(body) {
            tags.push(Tag::Literal {
                span,
                text: literal.to_string(),
            });
        } else if let Some(parsed) = parse_reference(body) {
            tags.push(Tag::Reference {
                span,
                replace_type: parsed.0,
                key: parsed.1,
                index: parsed.2,
            });
        }
        // else: not a recognized tag shape, left as-is in the output.

        cursor = close + 2;
    }

    debug_assert!(cursor <= bytes.len());
    tags
}

fn strip_backtick_escape(body: &str) -> Option<&str> {
    if body.len() >= 2 && body.starts_with('`') && body.ends_with('`') {
        Some(&body[1..body.len() - 1])
    } else {
        None
    }
}

fn parse_reference(body: &str) -> Option<(ReplaceType, String, Option<Index>)> {
    let (head, rest) = body.split_once('.')?;
    let head_lower = head.to_ascii_lowercase();

    let (replace_type, key_start) = match head_lower.as_str() {
        "config" => (ReplaceType::Config, body),
        "agent" => {
            let (second, remainder) = rest.split_once('.').unwrap_or((rest, ""));
            match second.to_ascii_lowercase().as_str() {
                "version" => (ReplaceType::AgentVersion, remainder),
                "accountid" => (ReplaceType::AgentAccountId, remainder),
                _ => return None,
            }
        }
        "ssm" => (ReplaceType::Lookup(Source::Ssm), rest),
        "gcsm" => (ReplaceType::Lookup(Source::Gcsm), rest),
        "output" => (ReplaceType::Lookup(Source::Output), rest),
        "ssm-custom" => (ReplaceType::LookupCustom(Source::Ssm), rest),
        "gcsm-custom" => (ReplaceType::LookupCustom(Source::Gcsm), rest),
        "output-custom" => (ReplaceType::LookupCustom(Source::Output), rest),
        "output-optional" => (ReplaceType::OutputOptional, rest),
        "toutput-optional" => (ReplaceType::TOutput { optional: true }, rest),
        "toutput" => (ReplaceType::TOutput { optional: false }, rest),
        "tmodule" => (ReplaceType::TModule, rest),
        _ => return None,
    };

    let (key, index) = split_index(key_start);
    Some((replace_type, key.to_string(), index))
}

/// Splits a trailing `[i]` or `[i-j]` off the last path segment.
fn split_index(key: &str) -> (&str, Option<Index>) {
    let Some(open) = key.rfind('[') else {
        return (key, None);
    };
    if !key.ends_with(']') {
        return (key, None);
    }
    let inner = &key[open + 1..key.len() - 1];
    let index = if let Some((lo, hi)) = inner.split_once('-') {
        match (lo.trim().parse::<i64>(), hi.trim().parse::<i64>()) {
            (Ok(lo), Ok(hi)) => Some(Index::Range(lo, hi)),
            _ => None,
        }
    } else {
        inner.trim().parse::<i64>().ok().map(Index::One)
    };
    match index {
        Some(idx) => (&key[..open], Some(idx)),
        None => (key, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_escape_strips_backticks() {
        let tags = scan("prefix {{ `raw {{ text }}` }} suffix");
        assert_eq!(tags.len(), 1);
        match &tags[0] {
            Tag::Literal { text, .. } => assert_eq!(text, "raw {{ text }}"),
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn config_path_has_no_index() {
        let tags = scan("{{ config.prefix }}");
        match &tags[0] {
            Tag::Reference { replace_type, key, index, .. } => {
                assert_eq!(*replace_type, ReplaceType::Config);
                assert_eq!(key, "config.prefix");
                assert!(index.is_none());
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn agent_version_disambiguates_from_accountid() {
        let tags = scan("{{ agent.version.net.main }} {{ agent.accountid }}");
        assert_eq!(tags.len(), 2);
        assert!(matches!(tags[0], Tag::Reference { replace_type: ReplaceType::AgentVersion, .. }));
        assert!(matches!(tags[1], Tag::Reference { replace_type: ReplaceType::AgentAccountId, .. }));
    }

    #[test]
    fn output_lookup_parses_index_range() {
        let tags = scan("{{ output.net.main.subnets[0-2] }}");
        match &tags[0] {
            Tag::Reference { replace_type, key, index, .. } => {
                assert_eq!(*replace_type, ReplaceType::Lookup(Source::Output));
                assert_eq!(key, "net.main.subnets");
                assert_eq!(*index, Some(Index::Range(0, 2)));
            }
            other => panic!("expected reference, got {other:?}"),
        }
    }

    #[test]
    fn toutput_optional_is_distinct_from_output_optional() {
        let tags = scan("{{ toutput-optional.vpc.id }} {{ output-optional.net.main.missing }}");
        assert!(matches!(tags[0], Tag::Reference { replace_type: ReplaceType::TOutput { optional: true }, .. }));
        assert!(matches!(tags[1], Tag::Reference { replace_type: ReplaceType::OutputOptional, .. }));
    }
}
