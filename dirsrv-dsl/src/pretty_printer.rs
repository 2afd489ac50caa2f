//! RFC 4515 filter text rendering.
//!
//! DN pretty-printing needs no dedicated module: `Dn::to_user_string` and
//! `Dn::to_normalized_string` on the core type already produce correctly
//! escaped RFC 4514 text. Filters have no such home in `dirsrv-core` since
//! their AST is meant to stay independent of any one wire form, so the
//! printer for the RFC 4515 form lives here next to its parser.

use dirsrv_core::{ExtensibleFilter, Filter, SubstringFilter};

/// Render `filter` back to RFC 4515 text. Always fully parenthesized, so
/// `print_filter(&parse_filter(s)?)` round-trips to a canonical form even
/// when `s` wasn't canonical itself.
pub fn print_filter(filter: &Filter) -> String {
    match filter {
        Filter::And(children) => format!("(&{})", print_children(children)),
        Filter::Or(children) => format!("(|{})", print_children(children)),
        Filter::Not(inner) => format!("(!{})", print_filter(inner)),
        Filter::Equality { attr, value } => format!("({attr}={})", escape(value)),
        Filter::GreaterOrEqual { attr, value } => format!("({attr}>={})", escape(value)),
        Filter::LessOrEqual { attr, value } => format!("({attr}<={})", escape(value)),
        Filter::ApproxMatch { attr, value } => format!("({attr}~={})", escape(value)),
        Filter::Present { attr } => format!("({attr}=*)"),
        Filter::Substring(s) => print_substring(s),
        Filter::Extensible(ext) => print_extensible(ext),
    }
}

fn print_children(children: &[Filter]) -> String {
    children.iter().map(print_filter).collect::<Vec<_>>().join("")
}

fn print_substring(s: &SubstringFilter) -> String {
    let mut value = String::new();
    if let Some(initial) = &s.initial {
        value.push_str(&escape(initial));
    }
    value.push('*');
    for any in &s.any {
        value.push_str(&escape(any));
        value.push('*');
    }
    if let Some(final_) = &s.final_ {
        value.push_str(&escape(final_));
    }
    format!("({}={value})", s.attr)
}

fn print_extensible(ext: &ExtensibleFilter) -> String {
    let mut out = String::from("(");
    if let Some(attr) = &ext.attr {
        out.push_str(attr);
    }
    if ext.dn_attributes {
        out.push_str(":dn");
    }
    if let Some(rule) = &ext.matching_rule {
        out.push(':');
        out.push_str(rule);
    }
    out.push_str(":=");
    out.push_str(&escape(&ext.value));
    out.push(')');
    out
}

/// Escape the characters RFC 4515 §3 reserves in a filter value: `*`,
/// `(`, `)`, `\`, and NUL, each as a `\XX` hex pair.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'*' | b'(' | b')' | b'\\' | 0 => out.push_str(&format!("\\{b:02x}")),
            _ => out.push(b as char),
        }
    }
    out
}
