//! Line parser for the directive grammar.
//!
//! One call classifies one line. The parser is a pure function of its
//! input text: it performs no I/O, which keeps the whole load phase unit
//! testable offline.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use super::directive::{Directive, DirectiveKind};
use super::size::{parse_size, SizeParseError};
use crate::instance::MIN_FREE_DEFAULT;

/// Configuration errors. Any of these aborts the entire load phase;
/// a partially valid configuration is unsafe to run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{}:{line}: unknown verb '{verb}'", file.display())]
    UnknownVerb {
        file: PathBuf,
        line: u32,
        verb: String,
    },

    #[error("{}:{line}: missing '/' between subsystem and probe in '{target}'", file.display())]
    MissingSlash {
        file: PathBuf,
        line: u32,
        target: String,
    },

    #[error("{}:{line}: {source}", file.display())]
    BadSize {
        file: PathBuf,
        line: u32,
        #[source]
        source: SizeParseError,
    },

    #[error("failed to read config file {}: {source}", file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Instance-level fields implied by a directive, applied to the current
/// instance by the loader.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InstanceFields {
    pub buffer_size: Option<u64>,
    pub max_file_size: Option<u64>,
    pub min_free_percent: Option<u8>,
}

/// Result of parsing one meaningful configuration line.
#[derive(Debug, Clone)]
pub struct ParsedLine {
    pub directive: Directive,
    pub fields: InstanceFields,
}

/// Parse one configuration line.
///
/// Returns `Ok(None)` for blank lines, comment lines, and lines with a
/// verb but no target (skipped, matching the original grammar's
/// tolerance). Unknown verbs and malformed targets are config-fatal.
pub fn parse_line(line: &str, file: &Path, lineno: u32) -> Result<Option<ParsedLine>, ConfigError> {
    let text = line.trim_start();
    if text.is_empty() || text.starts_with('#') {
        return Ok(None);
    }

    let (verb, rest) = split_token(text);
    let (target, rest) = split_token(rest);
    if target.is_empty() {
        return Ok(None);
    }
    let argument = {
        let rest = rest.trim_end();
        (!rest.is_empty()).then(|| rest.to_string())
    };

    let mut fields = InstanceFields::default();
    let kind = match verb {
        "instance" => {
            if let Some(arg) = &argument {
                fields.buffer_size =
                    Some(parse_size(arg).map_err(|source| ConfigError::BadSize {
                        file: file.to_path_buf(),
                        line: lineno,
                        source,
                    })?);
            }
            DirectiveKind::DefineInstance
        }
        "modprobe" => DirectiveKind::LoadModule,
        "enable" | "disable" => {
            if !target.contains('/') {
                return Err(ConfigError::MissingSlash {
                    file: file.to_path_buf(),
                    line: lineno,
                    target: target.to_string(),
                });
            }
            if verb == "enable" {
                DirectiveKind::Enable
            } else {
                DirectiveKind::Disable
            }
        }
        "saveto" => {
            fields.max_file_size = Some(match &argument {
                Some(arg) => parse_size(arg).map_err(|source| ConfigError::BadSize {
                    file: file.to_path_buf(),
                    line: lineno,
                    source,
                })?,
                None => u64::MAX,
            });
            DirectiveKind::SaveTo
        }
        "minfree" => {
            let pct = target.parse::<i64>().unwrap_or(0);
            fields.min_free_percent = Some(if pct > 0 && pct <= 100 {
                pct as u8
            } else {
                warn!(
                    file = %file.display(),
                    line = lineno,
                    value = target,
                    default = MIN_FREE_DEFAULT,
                    "minfree outside (0,100], using default"
                );
                MIN_FREE_DEFAULT
            });
            DirectiveKind::MinFree
        }
        "logrotate" => DirectiveKind::RotateHint,
        _ => {
            return Err(ConfigError::UnknownVerb {
                file: file.to_path_buf(),
                line: lineno,
                verb: verb.to_string(),
            });
        }
    };

    Ok(Some(ParsedLine {
        directive: Directive {
            kind,
            target: target.to_string(),
            argument,
            file: file.to_path_buf(),
            line: lineno,
        },
        fields,
    }))
}

/// Split off the first whitespace-delimited token, returning it and the
/// remainder with leading whitespace stripped.
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], s[idx..].trim_start()),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<ParsedLine> {
        parse_line(line, Path::new("test.conf"), 1).unwrap()
    }

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        assert!(parse("").is_none());
        assert!(parse("   ").is_none());
        assert!(parse("# a comment").is_none());
        assert!(parse("   # indented comment").is_none());
    }

    #[test]
    fn test_verb_without_target_skipped() {
        assert!(parse("enable").is_none());
        assert!(parse("saveto   ").is_none());
    }

    #[test]
    fn test_instance_with_buffer_size() {
        let parsed = parse("instance foo 4096k").unwrap();
        assert_eq!(parsed.directive.kind, DirectiveKind::DefineInstance);
        assert_eq!(parsed.directive.target, "foo");
        assert_eq!(parsed.fields.buffer_size, Some(4096 * 1024));
    }

    #[test]
    fn test_instance_without_buffer_size() {
        let parsed = parse("instance foo").unwrap();
        assert_eq!(parsed.fields.buffer_size, None);
    }

    #[test]
    fn test_saveto_with_max_size() {
        let parsed = parse("saveto /var/log/x.log 10m").unwrap();
        assert_eq!(parsed.directive.kind, DirectiveKind::SaveTo);
        assert_eq!(parsed.directive.target, "/var/log/x.log");
        assert_eq!(parsed.fields.max_file_size, Some(10 * 1024 * 1024));
    }

    #[test]
    fn test_saveto_without_max_size_is_unbounded() {
        let parsed = parse("saveto /var/log/x.log").unwrap();
        assert_eq!(parsed.fields.max_file_size, Some(u64::MAX));
    }

    #[test]
    fn test_minfree_in_range() {
        let parsed = parse("minfree 12").unwrap();
        assert_eq!(parsed.directive.kind, DirectiveKind::MinFree);
        assert_eq!(parsed.fields.min_free_percent, Some(12));
    }

    #[test]
    fn test_minfree_out_of_range_clamps_to_default() {
        assert_eq!(
            parse("minfree 150").unwrap().fields.min_free_percent,
            Some(MIN_FREE_DEFAULT)
        );
        assert_eq!(
            parse("minfree 0").unwrap().fields.min_free_percent,
            Some(MIN_FREE_DEFAULT)
        );
        assert_eq!(
            parse("minfree abc").unwrap().fields.min_free_percent,
            Some(MIN_FREE_DEFAULT)
        );
    }

    #[test]
    fn test_enable_with_filter_preserves_whitespace() {
        let parsed = parse("enable sched/sched_switch prev_comm == \"cc1\"").unwrap();
        assert_eq!(parsed.directive.kind, DirectiveKind::Enable);
        assert_eq!(parsed.directive.target, "sched/sched_switch");
        assert_eq!(
            parsed.directive.argument.as_deref(),
            Some("prev_comm == \"cc1\"")
        );
    }

    #[test]
    fn test_disable_directive() {
        let parsed = parse("disable sched/all").unwrap();
        assert_eq!(parsed.directive.kind, DirectiveKind::Disable);
    }

    #[test]
    fn test_enable_without_slash_is_config_fatal() {
        let err = parse_line("enable sched_switch", Path::new("a.conf"), 7).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSlash { line: 7, .. }));
    }

    #[test]
    fn test_unknown_verb_is_config_fatal() {
        let err = parse_line("frobnicate x", Path::new("a.conf"), 3).unwrap_err();
        match err {
            ConfigError::UnknownVerb { line, verb, .. } => {
                assert_eq!(line, 3);
                assert_eq!(verb, "frobnicate");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_size_is_config_fatal() {
        let err = parse_line("instance foo 12q4", Path::new("a.conf"), 2).unwrap_err();
        assert!(matches!(err, ConfigError::BadSize { line: 2, .. }));
    }

    #[test]
    fn test_logrotate_verb_is_reserved() {
        let parsed = parse("logrotate daily").unwrap();
        assert_eq!(parsed.directive.kind, DirectiveKind::RotateHint);
    }

    #[test]
    fn test_tabs_as_field_separators() {
        let parsed = parse("instance\tfdr\t1m").unwrap();
        assert_eq!(parsed.directive.target, "fdr");
        assert_eq!(parsed.fields.buffer_size, Some(1024 * 1024));
    }
}
