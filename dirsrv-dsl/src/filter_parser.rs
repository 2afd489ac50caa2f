//! RFC 4515 filter text parsing: `(&(cn=alice)(!(uid=bob)))` and friends.

use crate::error::{DslError, DslResult};
use dirsrv_core::{ExtensibleFilter, Filter, SubstringFilter};
use std::iter::Peekable;
use std::str::CharIndices;

pub fn parse_filter(input: &str) -> DslResult<Filter> {
    let mut p = FilterParser::new(input);
    let filter = p.parse_filter()?;
    if let Some(rest) = p.remaining() {
        return Err(DslError::TrailingInput(rest));
    }
    Ok(filter)
}

struct FilterParser<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> FilterParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn pos(&mut self) -> usize {
        self.chars.peek().map(|(i, _)| *i).unwrap_or(self.source.len())
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn remaining(&mut self) -> Option<String> {
        let rest: String = std::iter::from_fn(|| self.chars.next().map(|(_, c)| c)).collect();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    fn expect(&mut self, expected: char, context: &'static str) -> DslResult<()> {
        match self.advance() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(DslError::UnexpectedChar {
                found: c,
                pos: self.pos(),
                context,
            }),
            None => Err(DslError::UnexpectedEof(context)),
        }
    }

    /// `filter = "(" filtercomp ")"`; the outer parens are mandatory.
    fn parse_filter(&mut self) -> DslResult<Filter> {
        self.expect('(', "filter")?;
        let filter = self.parse_filtercomp()?;
        self.expect(')', "filter")?;
        Ok(filter)
    }

    fn parse_filtercomp(&mut self) -> DslResult<Filter> {
        match self.peek() {
            Some('&') => {
                self.advance();
                Ok(Filter::And(self.parse_filterlist()?))
            }
            Some('|') => {
                self.advance();
                Ok(Filter::Or(self.parse_filterlist()?))
            }
            Some('!') => {
                self.advance();
                Ok(Filter::Not(Box::new(self.parse_filter()?)))
            }
            Some(_) => self.parse_item(),
            None => Err(DslError::UnexpectedEof("filter component")),
        }
    }

    /// One or more complete `(filter)` expressions in a row, for `&`/`|`.
    fn parse_filterlist(&mut self) -> DslResult<Vec<Filter>> {
        let mut filters = Vec::new();
        while self.peek() == Some('(') {
            filters.push(self.parse_filter()?);
        }
        Ok(filters)
    }

    /// `item = simple / present / substring / extensible`, distinguished
    /// by scanning the attribute descriptor and the operator that follows.
    fn parse_item(&mut self) -> DslResult<Filter> {
        let desc = self.parse_until_operator()?;
        match self.peek() {
            Some('~') => {
                self.advance();
                self.expect('=', "approx filter")?;
                let value = self.parse_value()?;
                Ok(Filter::ApproxMatch { attr: desc, value })
            }
            Some('>') => {
                self.advance();
                self.expect('=', "greaterOrEqual filter")?;
                let value = self.parse_value()?;
                Ok(Filter::GreaterOrEqual { attr: desc, value })
            }
            Some('<') => {
                self.advance();
                self.expect('=', "lessOrEqual filter")?;
                let value = self.parse_value()?;
                Ok(Filter::LessOrEqual { attr: desc, value })
            }
            Some(':') => {
                let attr = if desc.is_empty() { None } else { Some(desc) };
                self.parse_extensible_after_colon(attr)
            }
            Some('=') => {
                self.advance();
                self.parse_equality_or_substring(desc)
            }
            Some(c) => Err(DslError::UnexpectedChar {
                found: c,
                pos: self.pos(),
                context: "filter operator",
            }),
            None => Err(DslError::UnexpectedEof("filter operator")),
        }
    }

    /// Reads an attribute descriptor or a `:dn` / `:rule` extensible-match
    /// prefix up to the operator that disambiguates the item kind.
    fn parse_until_operator(&mut self) -> DslResult<String> {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if matches!(c, '~' | '>' | '<' | '=' | ':' | ')') {
                break;
            }
            s.push(c);
            self.advance();
        }
        Ok(s)
    }

    /// `equality / substring`: `=` followed by a value that may contain
    /// unescaped `*` to signal a substring match.
    fn parse_equality_or_substring(&mut self, attr: String) -> DslResult<Filter> {
        let raw = self.parse_raw_value()?;
        if raw.text == "*" {
            return Ok(Filter::Present { attr });
        }
        if !raw.contains_unescaped_star() {
            return Ok(Filter::Equality {
                attr,
                value: unescape_value(&raw.text),
            });
        }
        let parts: Vec<&str> = split_unescaped_star(&raw.text);
        let initial = if parts[0].is_empty() { None } else { Some(unescape_value(parts[0])) };
        let final_ = if parts[parts.len() - 1].is_empty() {
            None
        } else {
            Some(unescape_value(parts[parts.len() - 1]))
        };
        let any = parts[1..parts.len() - 1]
            .iter()
            .map(|p| unescape_value(p))
            .collect();
        Ok(Filter::Substring(SubstringFilter {
            attr,
            initial,
            any,
            final_,
        }))
    }

    fn parse_extensible_after_colon(&mut self, attr: Option<String>) -> DslResult<Filter> {
        let mut dn_attributes = false;
        let mut matching_rule = None;
        loop {
            self.advance(); // consume ':'
            if self.peek() == Some('=') {
                self.advance();
                let value = self.parse_value()?;
                return Ok(Filter::Extensible(ExtensibleFilter {
                    matching_rule,
                    attr,
                    value,
                    dn_attributes,
                }));
            }
            let token = self.parse_until(|c| c == ':' || c == '=')?;
            if token.eq_ignore_ascii_case("dn") {
                dn_attributes = true;
            } else {
                matching_rule = Some(token);
            }
            if self.peek() != Some(':') {
                return Err(DslError::UnexpectedEof("extensible filter"));
            }
        }
    }

    fn parse_until(&mut self, stop: impl Fn(char) -> bool) -> DslResult<String> {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if stop(c) {
                break;
            }
            s.push(c);
            self.advance();
        }
        Ok(s)
    }

    /// A value up to the unescaped `)` that closes this item.
    fn parse_value(&mut self) -> DslResult<String> {
        if self.peek() == Some(')') {
            return Ok(String::new());
        }
        let raw = self.parse_raw_value()?;
        Ok(unescape_value(&raw.text))
    }

    fn parse_raw_value(&mut self) -> DslResult<RawValueSpan> {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            match c {
                ')' => break,
                '\\' => {
                    s.push(c);
                    self.advance();
                    let Some(hex1) = self.advance() else {
                        return Err(DslError::UnexpectedEof("hex escape"));
                    };
                    let Some(hex2) = self.advance() else {
                        return Err(DslError::UnexpectedEof("hex escape"));
                    };
                    s.push(hex1);
                    s.push(hex2);
                }
                _ => {
                    s.push(c);
                    self.advance();
                }
            }
        }
        Ok(RawValueSpan { text: s })
    }

}

struct RawValueSpan {
    text: String,
}

trait ContainsUnescapedStar {
    fn contains_unescaped_star(&self) -> bool;
}

impl ContainsUnescapedStar for RawValueSpan {
    fn contains_unescaped_star(&self) -> bool {
        let mut chars = self.text.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\\' {
                chars.next();
                chars.next();
            } else if c == '*' {
                return true;
            }
        }
        false
    }
}

fn split_unescaped_star(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 3;
            continue;
        }
        if bytes[i] == b'*' {
            parts.push(&s[start..i]);
            start = i + 1;
        }
        i += 1;
    }
    parts.push(&s[start..]);
    parts
}

/// Unescape a raw filter value's `\XX` hex pairs (RFC 4515 §3).
fn unescape_value(raw: &str) -> String {
    let mut out = Vec::new();
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&raw[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_equality() {
        let f = parse_filter("(cn=alice)").unwrap();
        assert_eq!(
            f,
            Filter::Equality {
                attr: "cn".to_string(),
                value: "alice".to_string()
            }
        );
    }

    #[test]
    fn parses_and_of_two_clauses() {
        let f = parse_filter("(&(cn=alice)(sn=smith))").unwrap();
        match f {
            Filter::And(children) => assert_eq!(children.len(), 2),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn parses_negation() {
        let f = parse_filter("(!(cn=alice))").unwrap();
        assert!(matches!(f, Filter::Not(_)));
    }

    #[test]
    fn parses_presence() {
        let f = parse_filter("(cn=*)").unwrap();
        assert_eq!(f, Filter::Present { attr: "cn".to_string() });
    }

    #[test]
    fn parses_substring_with_initial_any_final() {
        let f = parse_filter("(cn=al*ice*x)").unwrap();
        match f {
            Filter::Substring(s) => {
                assert_eq!(s.initial.as_deref(), Some("al"));
                assert_eq!(s.any, vec!["ice".to_string()]);
                assert_eq!(s.final_.as_deref(), Some("x"));
            }
            other => panic!("expected Substring, got {other:?}"),
        }
    }

    #[test]
    fn parses_greater_or_equal() {
        let f = parse_filter("(age>=21)").unwrap();
        assert_eq!(
            f,
            Filter::GreaterOrEqual {
                attr: "age".to_string(),
                value: "21".to_string()
            }
        );
    }

    #[test]
    fn unescapes_hex_pair_in_value() {
        let f = parse_filter("(cn=Lu\\c4\\8di\\c4\\87)").unwrap();
        match f {
            Filter::Equality { value, .. } => assert_eq!(value, "Lučić"),
            other => panic!("expected Equality, got {other:?}"),
        }
    }

    #[test]
    fn parses_extensible_with_dn_and_rule() {
        let f = parse_filter("(cn:dn:2.5.13.2:=alice)").unwrap();
        match f {
            Filter::Extensible(ext) => {
                assert_eq!(ext.attr.as_deref(), Some("cn"));
                assert!(ext.dn_attributes);
                assert_eq!(ext.matching_rule.as_deref(), Some("2.5.13.2"));
                assert_eq!(ext.value, "alice");
            }
            other => panic!("expected Extensible, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_closing_paren() {
        assert!(parse_filter("(cn=alice").is_err());
    }
}
