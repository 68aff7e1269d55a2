//! Shell-style argument tokeniser for the command dispatcher (spec §4.6).
//!
//! Quote-aware, `\`-escape aware, no globbing, no variable expansion — just
//! enough shell syntax for operators to pass a k-line reason or search
//! string containing spaces without the dispatcher misreading it as
//! multiple arguments.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("trailing backslash")]
    TrailingBackslash,
}

/// Split `line` into whitespace-separated tokens, honouring single quotes,
/// double quotes, and `\`-escapes outside of single quotes.
pub fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(TokenizeError::UnterminatedQuote),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c) => current.push(c),
                            None => return Err(TokenizeError::TrailingBackslash),
                        },
                        Some(c) => current.push(c),
                        None => return Err(TokenizeError::UnterminatedQuote),
                    }
                }
            }
            '\\' => {
                in_token = true;
                match chars.next() {
                    Some(c) => current.push(c),
                    None => return Err(TokenizeError::TrailingBackslash),
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(tokenize("kcheck nick foo* 5").unwrap(), vec!["kcheck", "nick", "foo*", "5"]);
    }

    #[test]
    fn double_quotes_keep_spaces_together() {
        assert_eq!(
            tokenize(r#"ktag 42 "open proxy""#).unwrap(),
            vec!["ktag", "42", "open proxy"]
        );
    }

    #[test]
    fn backslash_escapes_a_space_outside_quotes() {
        assert_eq!(tokenize(r"kcheck reason open\ proxy").unwrap(), vec!["kcheck", "reason", "open proxy"]);
    }

    #[test]
    fn single_quotes_do_not_process_backslashes() {
        assert_eq!(tokenize(r"kcheck reason 'a\b'").unwrap(), vec!["kcheck", "reason", r"a\b"]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        assert_eq!(tokenize(r#"kcheck "open"#), Err(TokenizeError::UnterminatedQuote));
    }

    #[test]
    fn empty_line_yields_no_tokens() {
        assert_eq!(tokenize("   ").unwrap(), Vec::<String>::new());
    }
}
