use crate::error::ParseError;

/// One word of command input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Text with quotes and escapes removed
    pub text: String,
    /// Byte offset of the first character in the input
    pub start: usize,
    /// Byte offset just past the last character
    pub end: usize,
}

/// Split a line into whitespace separated tokens
///
/// `"..."` and `'...'` group words, `\` escapes the next character. Quotes
/// may appear mid-token (`a"b c"` is the single token `ab c`).
pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    loop {
        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        let Some(&(start, _)) = chars.peek() else {
            break;
        };

        let mut text = String::new();
        let mut quote: Option<(char, usize)> = None;
        let mut end = start;

        while let Some((i, c)) = chars.next() {
            match (quote, c) {
                (_, '\\') => match chars.next() {
                    Some((j, escaped)) => {
                        text.push(escaped);
                        end = j + escaped.len_utf8();
                        continue;
                    }
                    None => text.push('\\'),
                },
                (None, '"' | '\'') => quote = Some((c, i)),
                (Some((open, _)), c) if c == open => quote = None,
                (None, c) if c.is_whitespace() => break,
                (_, c) => text.push(c),
            }
            end = i + c.len_utf8();
        }

        if let Some((_, position)) = quote {
            return Err(ParseError::UnterminatedQuote { position });
        }
        tokens.push(Token { text, start, end });
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(input: &str) -> Vec<String> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|token| token.text)
            .collect()
    }

    #[test]
    fn test_whitespace_split() {
        assert_eq!(texts("  tp 10\t20   30 "), vec!["tp", "10", "20", "30"]);
        assert!(texts("   ").is_empty());
    }

    #[test]
    fn test_quotes_and_escapes() {
        assert_eq!(
            texts(r#"say "hello world" 'it is' a\ b"#),
            vec!["say", "hello world", "it is", "a b"]
        );
        assert_eq!(texts(r#"say "a \"quoted\" word""#), vec!["say", r#"a "quoted" word"#]);
        assert_eq!(texts(r#"name"d thing""#), vec!["named thing"]);
        assert_eq!(texts(r#"say """#), vec!["say", ""]);
    }

    #[test]
    fn test_offsets() {
        let tokens = tokenize(r#"tp "a b" c"#).unwrap();
        assert_eq!((tokens[0].start, tokens[0].end), (0, 2));
        assert_eq!((tokens[1].start, tokens[1].end), (3, 8));
        assert_eq!((tokens[2].start, tokens[2].end), (9, 10));
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(
            tokenize(r#"say "oops"#),
            Err(ParseError::UnterminatedQuote { position: 4 })
        );
    }
}
