//! Text-form parsers and printers for the two grammars the directory
//! server exchanges with clients as plain text: distinguished names
//! (RFC 4514) and search filters (RFC 4515).
//!
//! Both parsers are hand-written recursive-descent scanners over a
//! `Peekable<CharIndices>`, matching the grain size of the grammars (no
//! generated-parser machinery is warranted for either). Callers needing
//! the data types these parsers build should depend on `dirsrv-core`
//! directly; this crate only converts between that AST and its text form.

mod dn_parser;
mod error;
mod filter_parser;
mod pretty_printer;

pub use dn_parser::{parse_dn, parse_rdn};
pub use error::{DslError, DslResult};
pub use filter_parser::parse_filter;
pub use pretty_printer::print_filter;
