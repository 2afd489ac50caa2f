//! RFC 4514 DN text parsing.
//!
//! `dirsrv-core`'s `Dn::from_str` is a deliberately simplified parser for
//! internal use; this is the real one, handling backslash-escaped special
//! characters, hex-pair escapes, and the `#`-prefixed hex-string value
//! form (RFC 4514 §3 `hexstring`).

use crate::error::{DslError, DslResult};
use dirsrv_core::{Ava, Dn, Rdn};
use std::iter::Peekable;
use std::str::CharIndices;

const SPECIAL_CHARS: &[char] = &[',', '+', '"', '\\', '<', '>', ';', '='];

/// Parse a full DN string, leaf RDN first (RFC 4514 §2 textual order).
pub fn parse_dn(input: &str) -> DslResult<Dn> {
    let mut p = DnParser::new(input);
    let dn = p.parse_dn()?;
    p.expect_eof()?;
    Ok(dn)
}

/// Parse a single RDN, e.g. for use outside a full DN (a `newrdn` in a
/// modify-DN request).
pub fn parse_rdn(input: &str) -> DslResult<Rdn> {
    let mut p = DnParser::new(input);
    let rdn = p.parse_rdn()?;
    p.expect_eof()?;
    Ok(rdn)
}

struct DnParser<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> DnParser<'a> {
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

    fn expect_eof(&mut self) -> DslResult<()> {
        if let Some(c) = self.peek() {
            return Err(DslError::UnexpectedChar {
                found: c,
                pos: self.pos(),
                context: "end of DN",
            });
        }
        Ok(())
    }

    fn parse_dn(&mut self) -> DslResult<Dn> {
        if self.peek().is_none() {
            return Ok(Dn::root());
        }
        let mut rdns = vec![self.parse_rdn()?];
        while self.peek() == Some(',') {
            self.advance();
            rdns.push(self.parse_rdn()?);
        }
        Ok(Dn::from_rdns(rdns))
    }

    fn parse_rdn(&mut self) -> DslResult<Rdn> {
        let mut avas = vec![self.parse_ava()?];
        while self.peek() == Some('+') {
            self.advance();
            avas.push(self.parse_ava()?);
        }
        Ok(Rdn::from_avas(avas))
    }

    fn parse_ava(&mut self) -> DslResult<Ava> {
        let attr = self.parse_attribute_type()?;
        if self.advance() != Some('=') {
            return Err(DslError::UnexpectedChar {
                found: self.peek().unwrap_or('\0'),
                pos: self.pos(),
                context: "AVA (expected '=')",
            });
        }
        let value = self.parse_attribute_value()?;
        Ok(Ava::new(attr, value))
    }

    fn parse_attribute_type(&mut self) -> DslResult<String> {
        let start = self.pos();
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c == '=' {
                break;
            }
            s.push(c);
            self.advance();
        }
        let trimmed = s.trim().to_string();
        if trimmed.is_empty() {
            return Err(DslError::EmptyAttributeType(start));
        }
        Ok(trimmed)
    }

    /// `attributeValue` per RFC 4514 §3: either a hex-string (`#...`) or a
    /// run of characters with backslash escaping, terminated by an
    /// unescaped `,`, `+`, or end of input.
    fn parse_attribute_value(&mut self) -> DslResult<String> {
        if self.peek() == Some('#') {
            return self.parse_hex_value();
        }
        let mut chars: Vec<(char, bool)> = Vec::new();
        while let Some(c) = self.peek() {
            match c {
                ',' | '+' => break,
                '\\' => {
                    self.advance();
                    chars.push((self.parse_escape()?, true));
                }
                _ => {
                    chars.push((c, false));
                    self.advance();
                }
            }
        }
        // Unescaped leading/trailing spaces are insignificant; an escaped
        // one is part of the value (RFC 4514 §3).
        let start = chars.iter().position(|(c, esc)| *esc || *c != ' ').unwrap_or(chars.len());
        let end = chars
            .iter()
            .rposition(|(c, esc)| *esc || *c != ' ')
            .map(|i| i + 1)
            .unwrap_or(0);
        Ok(chars[start.min(end)..end].iter().map(|(c, _)| c).collect())
    }

    fn parse_hex_value(&mut self) -> DslResult<String> {
        let start = self.pos();
        self.advance(); // consume '#'
        let mut hex = String::new();
        while let Some(c) = self.peek() {
            if c == ',' || c == '+' {
                break;
            }
            hex.push(c);
            self.advance();
        }
        let bytes = hex::decode(hex.trim()).map_err(|_| DslError::InvalidHexEscape(start))?;
        String::from_utf8(bytes).map_err(|_| DslError::InvalidUtf8(start))
    }

    /// One escape sequence after a consumed backslash: either a hex pair
    /// (`\XX`) or a literal special character (`\,`, `\+`, `\"`, etc).
    fn parse_escape(&mut self) -> DslResult<char> {
        let pos = self.pos();
        let Some(c) = self.peek() else {
            return Err(DslError::UnexpectedEof("escape sequence"));
        };
        if c.is_ascii_hexdigit() {
            let hi = c;
            self.advance();
            let Some(lo) = self.peek() else {
                return Err(DslError::InvalidHexEscape(pos));
            };
            if !lo.is_ascii_hexdigit() {
                return Err(DslError::InvalidHexEscape(pos));
            }
            self.advance();
            let byte = u8::from_str_radix(&format!("{hi}{lo}"), 16)
                .map_err(|_| DslError::InvalidHexEscape(pos))?;
            return Ok(byte as char);
        }
        if SPECIAL_CHARS.contains(&c) || c == ' ' || c == '#' {
            self.advance();
            return Ok(c);
        }
        Err(DslError::UnexpectedChar {
            found: c,
            pos,
            context: "escape sequence",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_single_rdn() {
        let dn = parse_dn("cn=alice").unwrap();
        assert_eq!(dn.size(), 1);
        assert_eq!(dn.leaf_rdn().unwrap().value_of("cn"), Some("alice"));
    }

    #[test]
    fn parses_multi_rdn_dn_in_leaf_first_order() {
        let dn = parse_dn("cn=alice,ou=users,dc=example,dc=com").unwrap();
        assert_eq!(dn.size(), 4);
        assert_eq!(dn.rdn(0).unwrap().value_of("cn"), Some("alice"));
        assert_eq!(dn.rdn(3).unwrap().value_of("dc"), Some("com"));
    }

    #[test]
    fn parses_multi_valued_rdn() {
        let dn = parse_dn("cn=alice+uid=asmith,dc=example").unwrap();
        let leaf = dn.leaf_rdn().unwrap();
        assert!(leaf.is_multi_valued());
        assert_eq!(leaf.value_of("uid"), Some("asmith"));
    }

    #[test]
    fn unescapes_backslash_comma_inside_value() {
        let dn = parse_dn("cn=Smith\\, Alice,dc=example").unwrap();
        assert_eq!(dn.leaf_rdn().unwrap().value_of("cn"), Some("Smith, Alice"));
    }

    #[test]
    fn unescapes_hex_pair() {
        let dn = parse_dn("cn=Lu\\c4\\8di\\c4\\87,dc=example").unwrap();
        assert_eq!(dn.leaf_rdn().unwrap().value_of("cn"), Some("Lučić"));
    }

    #[test]
    fn parses_hash_prefixed_hex_string_value() {
        // "hi" as hex
        let dn = parse_dn("cn=#6869,dc=example").unwrap();
        assert_eq!(dn.leaf_rdn().unwrap().value_of("cn"), Some("hi"));
    }

    #[test]
    fn empty_string_parses_to_root_dn() {
        let dn = parse_dn("").unwrap();
        assert!(dn.is_root());
    }

    #[test]
    fn rejects_empty_attribute_type() {
        assert!(parse_dn("=alice,dc=example").is_err());
    }

    #[test]
    fn trims_insignificant_surrounding_whitespace() {
        let dn = parse_dn("cn = alice , dc = example").unwrap();
        assert_eq!(dn.leaf_rdn().unwrap().value_of("cn"), Some("alice"));
    }
}
