/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use crate::errors::{ErrorCode, ErrorLog};

/// Identifiers keep at most this many significant characters.
pub const SIGCHARS: usize = 52;

pub fn skip_space(s: &str) -> &str {
    s.trim_start()
}

fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '?' || c == '@'
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '?' || c == '@'
}

/// Parse an identifier. Returns the (length-limited) id and the remainder;
/// the id is empty when the input does not start one.
pub fn parse_id(s: &str) -> (String, &str) {
    if !s.chars().next().is_some_and(is_id_start) {
        return (String::new(), s);
    }
    let mut end = s.len();
    for (i, c) in s.char_indices().skip(1) {
        if !is_id_char(c) {
            end = i;
            break;
        }
    }
    let mut id = s[..end].to_string();
    id.truncate(SIGCHARS);
    (id, &s[end..])
}

/// Parse a double-quoted string starting at the opening quote. A doubled
/// delimiter stands for a literal quote character.
pub fn parse_quoted_string(s: &str) -> (String, &str) {
    let bytes = s.as_bytes();
    let delim = bytes[0];
    let mut out = String::new();
    let mut i = 1;
    while i < bytes.len() {
        if bytes[i] == delim {
            if i + 1 < bytes.len() && bytes[i + 1] == delim {
                out.push(delim as char);
                i += 2;
            } else {
                return (out, skip_space(&s[i + 1..]));
            }
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    (out, &s[i..])
}

/// Collect one argument: everything up to a terminator character that sits
/// outside quotes, parentheses and brackets, with whitespace outside quotes
/// squeezed out. Bracketing problems are reported but parsing continues.
pub fn parse_arg<'a>(s: &'a str, term: &str, log: &mut ErrorLog) -> (String, &'a str) {
    let mut out = String::new();
    let mut parens = 0i32;
    let mut brackets = 0i32;
    let mut quoted = false;
    let mut dquoted = false;

    let mut rest = skip_space(s);
    let mut chars = rest.char_indices();
    loop {
        let Some((i, c)) = chars.next() else {
            rest = "";
            break;
        };
        let plain = !quoted && !dquoted;
        if plain && (c == ';' || (term.contains(c) && parens == 0 && brackets == 0)) {
            rest = &rest[i..];
            break;
        }
        if plain && c.is_whitespace() {
            continue;
        }
        out.push(c);
        match c {
            '(' if plain => parens += 1,
            ')' if plain => {
                parens -= 1;
                if parens < 0 {
                    log.report(ErrorCode::UnmatchedRightParen, Some(out.clone()));
                    parens = 0;
                }
            }
            '[' if plain => brackets += 1,
            ']' if plain => {
                brackets -= 1;
                if brackets < 0 {
                    log.report(ErrorCode::UnmatchedRightBracket, Some(out.clone()));
                    brackets = 0;
                }
            }
            '\'' if !dquoted => quoted = !quoted,
            '"' if !quoted => dquoted = !dquoted,
            _ => {}
        }
    }

    if parens != 0 || brackets != 0 || quoted || dquoted {
        log.report(ErrorCode::IncompleteParameterSpec, None);
    }
    (out, rest)
}

/// Uppercase everything outside single or double quotes. Mixed quote
/// content like `'my "x"'` keeps its case.
pub fn capitalize(s: &str) -> String {
    let mut quote: Option<char> = None;
    s.chars()
        .map(|c| match quote {
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                c.to_ascii_uppercase()
            }
            Some(q) => {
                if c == q {
                    quote = None;
                }
                c
            }
        })
        .collect()
}

/// Squeeze whitespace and cut a trailing comment from an operand field,
/// honoring quoted sub-strings (including backslash escapes inside single
/// quotes). Returns None on an unterminated string.
pub fn compact_operands(s: &str) -> Option<String> {
    let mut out = String::new();
    let mut quoted = false;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if !quoted {
            match c {
                ';' => break,
                c if c.is_whitespace() => {}
                '\'' => {
                    quoted = true;
                    out.push(c);
                }
                c => out.push(c),
            }
        } else {
            match c {
                '\\' => {
                    out.push(c);
                    if let Some(e) = chars.next() {
                        out.push(e);
                    }
                }
                '\'' => {
                    quoted = false;
                    out.push(c);
                }
                c => out.push(c),
            }
        }
    }
    if quoted { None } else { Some(out) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_charset() {
        assert_eq!(parse_id("foo_bar$2:rest"), ("foo_bar$2".into(), ":rest".into()));
        assert_eq!(parse_id("9bad").0, "");
        assert_eq!(parse_id("@sys").0, "@sys");
    }

    #[test]
    fn quoted_string_doubles_delimiter() {
        let (s, rest) = parse_quoted_string("\"he said \"\"hi\"\"\", tail");
        assert_eq!(s, "he said \"hi\"");
        assert_eq!(rest, ", tail");
    }

    #[test]
    fn arg_respects_nesting() {
        let mut log = ErrorLog::new();
        let (arg, rest) = parse_arg("foo(a, b), next", ",", &mut log);
        assert_eq!(arg, "foo(a,b)");
        assert_eq!(rest, ", next");
    }

    #[test]
    fn compact_strips_comment_keeps_quotes() {
        assert_eq!(
            compact_operands("#'a b' , d0 ; comment").as_deref(),
            Some("#'a b',d0")
        );
        assert_eq!(compact_operands("'open"), None);
    }
}
