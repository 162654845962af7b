use dern_core::DernError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Quote,
    Integer(i32),
    Real(f64),
    String(String),
    Character(char),
    Symbol(String),
    Boolean(bool),
    Nil,
    MultilineComment(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub col: usize,
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexing failure. `Incomplete` means the text ended in the middle of a
/// token and more input may complete it.
#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    Incomplete,
    Invalid(DernError),
}

impl LexError {
    fn invalid(msg: impl Into<String>) -> Self {
        LexError::Invalid(DernError::read(msg))
    }
}

pub fn is_delimiter(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '(' | ')' | '[' | ']' | '|' | '\'' | ';')
}

/// Cursor over a character buffer producing one token at a time.
pub struct Lexer<'a> {
    chars: &'a [char],
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(chars: &'a [char], pos: usize, line: usize) -> Self {
        Lexer {
            chars,
            pos,
            line,
            col: 1,
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn line(&self) -> usize {
        self.line
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_line_comments(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == ';' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    /// Next token, or `Ok(None)` once only whitespace and comments remain.
    pub fn next_token(&mut self) -> Result<Option<SpannedToken>, LexError> {
        self.skip_whitespace_and_line_comments();
        let span = Span {
            line: self.line,
            col: self.col,
        };
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let token = match ch {
            '(' => {
                self.bump();
                Token::LParen
            }
            ')' => {
                self.bump();
                Token::RParen
            }
            '\'' => {
                self.bump();
                Token::Quote
            }
            '#' => self.read_multiline_comment()?,
            '[' => self.read_string()?,
            '|' => Token::Character(self.read_character()?),
            '{' => self.read_radix_number()?,
            ']' => return Err(LexError::invalid("String must begin with character '['")),
            _ if ch.is_ascii_digit()
                || (ch == '-' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())) =>
            {
                self.read_plain_number()?
            }
            _ => self.read_symbol()?,
        };
        Ok(Some(SpannedToken { token, span }))
    }

    fn read_multiline_comment(&mut self) -> Result<Token, LexError> {
        self.bump();
        match self.peek() {
            Some('!') => {
                self.bump();
            }
            None => return Err(LexError::Incomplete),
            Some(_) => {
                return Err(LexError::invalid(
                    "Exclamation mark '!' expected after '#' to start multiline comment",
                ))
            }
        }
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('!') if self.peek() == Some('#') => {
                    self.bump();
                    return Ok(Token::MultilineComment(text));
                }
                Some(c) => text.push(c),
                None => return Err(LexError::Incomplete),
            }
        }
    }

    fn read_string(&mut self) -> Result<Token, LexError> {
        self.bump();
        let mut s = String::new();
        loop {
            let mark = self.pos;
            match self.peek() {
                None => return Err(LexError::Incomplete),
                Some(']') => {
                    self.bump();
                    break;
                }
                Some('|') => match self.read_character() {
                    Ok(c) => s.push(c),
                    Err(LexError::Incomplete) => {
                        if self.chars[mark..].contains(&']') {
                            return Err(LexError::invalid(
                                "Problem with a character embedded in string: (character is not complete)",
                            ));
                        }
                        return Err(LexError::Incomplete);
                    }
                    Err(LexError::Invalid(e)) => {
                        return Err(LexError::invalid(format!(
                            "Problem with a character embedded in string: ({e})"
                        )))
                    }
                },
                Some(_) => {
                    if let Some(c) = self.bump() {
                        s.push(c);
                    }
                }
            }
        }
        match self.peek() {
            Some(c) if !is_delimiter(c) => Err(LexError::invalid(
                "After last ']' of string there must be dern delimiter",
            )),
            _ => Ok(Token::String(s)),
        }
    }

    /// Reads `|x|`, `|newline|`, `|41|` and friends. The cursor must be on
    /// the opening bar.
    fn read_character(&mut self) -> Result<char, LexError> {
        self.bump();
        let mut name = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::Incomplete),
                Some('|') if !name.is_empty() || self.peek_at(1) != Some('|') => {
                    self.bump();
                    break;
                }
                Some('|') => {
                    // `|||` is the bar character itself
                    self.bump();
                    self.bump();
                    return Ok('|');
                }
                Some(c) => {
                    self.bump();
                    name.push(c);
                }
            }
        }
        decode_character(&name)
    }

    fn read_radix_number(&mut self) -> Result<Token, LexError> {
        self.bump();
        let base = match self.bump() {
            None => return Err(LexError::Incomplete),
            Some('X') => 16,
            Some('D') => 10,
            Some('O') => 8,
            Some('B') => 2,
            Some(_) => return Err(LexError::invalid("Number expected one of 'XDOB'")),
        };
        let negative = match self.bump() {
            None => return Err(LexError::Incomplete),
            Some('-') => true,
            Some('+') => false,
            Some(_) => return Err(LexError::invalid("Number expected one of '+-'")),
        };

        let mut digits = String::new();
        let mut dot_read = false;
        let mut last = None;
        loop {
            let Some(c) = self.peek() else {
                return Err(LexError::Incomplete);
            };
            self.bump();
            match c {
                ' ' => continue,
                '}' => break,
                '.' => {
                    if dot_read {
                        return Err(LexError::invalid("Number can contain only one '.' character"));
                    }
                    if digits.is_empty() {
                        return Err(LexError::invalid("Character '.' cannot start a number"));
                    }
                    dot_read = true;
                    digits.push('.');
                }
                c if c.is_ascii_hexdigit() => {
                    if !c.is_digit(base) {
                        return Err(LexError::invalid(match base {
                            2 => "Binary number can contain only '0' and '1' digits.",
                            8 => "Octal number can contain only digits '0' - '7'.",
                            _ => "Decimal number can contain only digits '0' - '9'.",
                        }));
                    }
                    digits.push(c);
                }
                other => {
                    return Err(LexError::invalid(format!(
                        "Number cannot contain character '{other}'"
                    )))
                }
            }
            last = Some(c);
        }
        if last == Some('.') {
            return Err(LexError::invalid("Character '.' cannot end a number"));
        }
        if digits.is_empty() {
            return Err(LexError::invalid("Number cannot be empty"));
        }

        let sign = if negative { -1.0 } else { 1.0 };
        if dot_read {
            let (int_part, frac_part) = digits.split_once('.').unwrap_or((&digits, ""));
            let mut value = 0.0f64;
            for d in int_part.chars().filter_map(|c| c.to_digit(base)) {
                value = value * f64::from(base) + f64::from(d);
            }
            let mut scale = 1.0 / f64::from(base);
            for d in frac_part.chars().filter_map(|c| c.to_digit(base)) {
                value += f64::from(d) * scale;
                scale /= f64::from(base);
            }
            Ok(Token::Real(sign * value))
        } else {
            let magnitude = i64::from_str_radix(&digits, base)
                .map_err(|_| LexError::invalid(format!("Number is too large: {digits}")))?;
            let value = if negative { -magnitude } else { magnitude };
            i32::try_from(value)
                .map(Token::Integer)
                .map_err(|_| LexError::invalid(format!("Number is too large: {digits}")))
        }
    }

    fn read_plain_number(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            self.bump();
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let body = text.strip_prefix('-').unwrap_or(&text);

        let mut dots = 0;
        for c in body.chars() {
            match c {
                '.' => dots += 1,
                c if c.is_ascii_digit() => {}
                other => {
                    return Err(LexError::invalid(format!(
                        "Number cannot contain character '{other}'"
                    )))
                }
            }
        }
        if dots > 1 {
            return Err(LexError::invalid("Number can contain only one '.' character"));
        }
        if body.ends_with('.') {
            return Err(LexError::invalid("Character '.' cannot end a number"));
        }
        if dots == 1 {
            text.parse::<f64>()
                .map(Token::Real)
                .map_err(|_| LexError::invalid(format!("Invalid real number: {text}")))
        } else {
            text.parse::<i32>()
                .map(Token::Integer)
                .map_err(|_| LexError::invalid(format!("Number is too large: {text}")))
        }
    }

    fn read_symbol(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            self.bump();
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        Ok(match name.as_str() {
            "" => return Err(LexError::invalid("Symbol cannot be empty")),
            "true" => Token::Boolean(true),
            "false" => Token::Boolean(false),
            "nil" => Token::Nil,
            _ => Token::Symbol(name),
        })
    }
}

/// Decode the text between the bars of a character literal.
pub fn decode_character(name: &str) -> Result<char, LexError> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (None, _) => return Err(LexError::invalid("Character cannot be empty: ||")),
        (Some(c), None) => return Ok(c),
        _ => {}
    }
    match name {
        "bar" => Ok('|'),
        "newline" => Ok('\n'),
        "tab" => Ok('\t'),
        "string-start" => Ok('['),
        "string-end" => Ok(']'),
        hex if hex.chars().all(|c| c.is_ascii_hexdigit()) => {
            let count = hex.chars().count();
            if count > 8 {
                return Err(LexError::invalid(format!(
                    "Number of hex digits ({count}) in character definition may not be larger than eight"
                )));
            }
            u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| LexError::invalid(format!("Unknown character constant |{name}|")))
        }
        _ => Err(LexError::invalid(format!("Unknown character constant |{name}|"))),
    }
}

/// Tokenize a complete text. Incomplete input is reported as an error.
pub fn tokenize(input: &str) -> Result<Vec<SpannedToken>, DernError> {
    let chars: Vec<char> = input.chars().collect();
    let mut lexer = Lexer::new(&chars, 0, 1);
    let mut tokens = Vec::new();
    loop {
        match lexer.next_token() {
            Ok(Some(tok)) => tokens.push(tok),
            Ok(None) => return Ok(tokens),
            Err(LexError::Incomplete) => {
                return Err(DernError::read("Unexpected end of input"))
            }
            Err(LexError::Invalid(e)) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input)
            .unwrap_or_else(|e| panic!("tokenize {input:?}: {e}"))
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    fn error(input: &str) -> String {
        tokenize(input).unwrap_err().to_string()
    }

    #[test]
    fn test_plain_numbers() {
        assert_eq!(
            tokens("12 -7 3.25 -0.5"),
            vec![
                Token::Integer(12),
                Token::Integer(-7),
                Token::Real(3.25),
                Token::Real(-0.5)
            ]
        );
        assert_eq!(error("1.2.3"), "Number can contain only one '.' character");
        assert_eq!(error("12a"), "Number cannot contain character 'a'");
    }

    #[test]
    fn test_radix_numbers() {
        assert_eq!(
            tokens("{D+10} {X+FF} {B-101} {O+17} {D+1 000} {D+2.5}"),
            vec![
                Token::Integer(10),
                Token::Integer(255),
                Token::Integer(-5),
                Token::Integer(15),
                Token::Integer(1000),
                Token::Real(2.5)
            ]
        );
        assert_eq!(error("{B+102}"), "Binary number can contain only '0' and '1' digits.");
        assert_eq!(error("{D+1.}"), "Character '.' cannot end a number");
    }

    #[test]
    fn test_characters() {
        assert_eq!(
            tokens("|a| |bar| |newline| |tab| |41| |string-start| |||"),
            vec![
                Token::Character('a'),
                Token::Character('|'),
                Token::Character('\n'),
                Token::Character('\t'),
                Token::Character('A'),
                Token::Character('['),
                Token::Character('|'),
            ]
        );
        assert_eq!(error("|nope|"), "Unknown character constant |nope|");
        assert_eq!(
            error("|123456789|"),
            "Number of hex digits (9) in character definition may not be larger than eight"
        );
    }

    #[test]
    fn test_strings_with_embedded_characters() {
        assert_eq!(
            tokens("[a|bar|b|string-end|c|newline|]"),
            vec![Token::String("a|b]c\n".into())]
        );
        assert_eq!(
            error("[a|zz|b]"),
            "Problem with a character embedded in string: (Unknown character constant |zz|)"
        );
        assert_eq!(
            error("[x]y"),
            "After last ']' of string there must be dern delimiter"
        );
    }

    #[test]
    fn test_symbols_and_keywords() {
        assert_eq!(
            tokens("(+= x 'y) -== ... true false nil"),
            vec![
                Token::LParen,
                Token::Symbol("+=".into()),
                Token::Symbol("x".into()),
                Token::Quote,
                Token::Symbol("y".into()),
                Token::RParen,
                Token::Symbol("-==".into()),
                Token::Symbol("...".into()),
                Token::Boolean(true),
                Token::Boolean(false),
                Token::Nil,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            tokens("; line\n#!multi\nline!# 1"),
            vec![
                Token::MultilineComment("multi\nline".into()),
                Token::Integer(1)
            ]
        );
    }

    #[test]
    fn test_incomplete_input() {
        for input in ["[abc", "|a", "#!open", "{D+12"] {
            let chars: Vec<char> = input.chars().collect();
            let mut lexer = Lexer::new(&chars, 0, 1);
            assert_eq!(lexer.next_token().unwrap_err(), LexError::Incomplete, "{input}");
        }
    }
}
