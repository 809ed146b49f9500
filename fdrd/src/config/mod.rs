//! Configuration grammar for fdrd instance files.
//!
//! Config files are line-oriented: each non-blank, non-comment line is
//! `verb target [argument-rest-of-line]`. The parser classifies one line at
//! a time ([`parser`]); the loader ([`loader`]) walks discovered files and
//! assembles the instance registry. Size arguments take the kernel-style
//! k/m/g unit suffixes ([`size`]).

mod directive;
mod loader;
mod parser;
mod size;

pub use directive::{Directive, DirectiveKind};
pub use loader::{
    discover_config_files, is_config_file, load_config_files, CONFIG_SUFFIX, DEFAULT_CONFIG_DIR,
};
pub use parser::{parse_line, ConfigError, InstanceFields, ParsedLine};
pub use size::{parse_size, SizeParseError};
