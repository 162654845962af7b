use dern_core::DernError;

use crate::lexer::{LexError, Lexer, Token};

/// A read but not yet evaluated form. The VM turns these into heap values.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Nil,
    Boolean(bool),
    Integer(i32),
    Real(f64),
    String(String),
    Character(char),
    Symbol(String),
    Vector(Vec<Datum>),
    MultilineComment(String),
}

impl Datum {
    pub fn symbol(name: &str) -> Datum {
        Datum::Symbol(name.to_string())
    }
}

/// Growable source buffer that remembers how far it has been read.
///
/// The REPL appends lines with [`Input::push_str`]; [`read_datum`] consumes
/// one complete form at a time and leaves an incomplete tail in place.
#[derive(Debug, Clone, Default)]
pub struct Input {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Input {
    pub fn new(text: &str) -> Self {
        Input {
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    pub fn push_str(&mut self, text: &str) {
        self.chars.extend(text.chars());
    }

    /// Line number of the read position, starting at 1.
    pub fn line(&self) -> usize {
        self.line
    }

    /// True while unread text other than whitespace and comments remains.
    pub fn has_pending(&self) -> bool {
        let mut lexer = Lexer::new(&self.chars, self.pos, self.line);
        !matches!(lexer.next_token(), Ok(None))
    }

    pub fn clear(&mut self) {
        self.chars.clear();
        self.pos = 0;
    }

    fn skip_to_end(&mut self) {
        self.line += self.chars[self.pos..].iter().filter(|c| **c == '\n').count();
        self.pos = self.chars.len();
    }
}

fn next_significant(lexer: &mut Lexer<'_>) -> Result<Option<Token>, LexError> {
    loop {
        match lexer.next_token()? {
            Some(t) if matches!(t.token, Token::MultilineComment(_)) => continue,
            Some(t) => return Ok(Some(t.token)),
            None => return Ok(None),
        }
    }
}

fn parse_datum(lexer: &mut Lexer<'_>, token: Token) -> Result<Datum, LexError> {
    Ok(match token {
        Token::LParen => {
            let mut items = Vec::new();
            loop {
                match next_significant(lexer)? {
                    None => return Err(LexError::Incomplete),
                    Some(Token::RParen) => break,
                    Some(tok) => items.push(parse_datum(lexer, tok)?),
                }
            }
            Datum::Vector(items)
        }
        Token::RParen => {
            return Err(LexError::Invalid(DernError::read(
                "Right parenthesis ')' without matching '('",
            )))
        }
        Token::Quote => match next_significant(lexer)? {
            None => return Err(LexError::Incomplete),
            Some(tok) => Datum::Vector(vec![Datum::symbol("quote"), parse_datum(lexer, tok)?]),
        },
        Token::Integer(n) => Datum::Integer(n),
        Token::Real(f) => Datum::Real(f),
        Token::String(s) => Datum::String(s),
        Token::Character(c) => Datum::Character(c),
        Token::Symbol(s) => Datum::Symbol(s),
        Token::Boolean(b) => Datum::Boolean(b),
        Token::Nil => Datum::Nil,
        Token::MultilineComment(text) => Datum::MultilineComment(text),
    })
}

/// Read the next complete form from `input`.
///
/// Returns `Ok(None)` when the input is exhausted or ends in an incomplete
/// form; in the latter case nothing is consumed so more text can be pushed.
/// On a syntax error the rest of the buffer is discarded.
pub fn read_datum(input: &mut Input) -> Result<Option<Datum>, DernError> {
    let mut lexer = Lexer::new(&input.chars, input.pos, input.line);
    let result = match lexer.next_token() {
        Ok(None) => Ok(None),
        Ok(Some(tok)) => parse_datum(&mut lexer, tok.token).map(Some),
        Err(e) => Err(e),
    };
    match result {
        Ok(datum) => {
            input.pos = lexer.pos();
            input.line = lexer.line();
            Ok(datum)
        }
        Err(LexError::Incomplete) => Ok(None),
        Err(LexError::Invalid(e)) => {
            input.skip_to_end();
            Err(e)
        }
    }
}

/// Read exactly one form from a complete text.
pub fn read(text: &str) -> Result<Datum, DernError> {
    let mut input = Input::new(text);
    match read_datum(&mut input)? {
        Some(d) => Ok(d),
        None if input.has_pending() => Err(DernError::read("Unexpected end of input")),
        None => Err(DernError::read("No input")),
    }
}

/// Read every form in a complete text. Top-level multiline comments are
/// dropped.
pub fn read_many(text: &str) -> Result<Vec<Datum>, DernError> {
    let mut input = Input::new(text);
    let mut out = Vec::new();
    while let Some(d) = read_datum(&mut input)? {
        if !matches!(d, Datum::MultilineComment(_)) {
            out.push(d);
        }
    }
    if input.has_pending() {
        return Err(DernError::read("Unexpected end of input"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Datum {
        Datum::symbol(s)
    }

    #[test]
    fn test_read_nested_vectors_and_quote() {
        assert_eq!(
            read("(define x as '(1 [a]))").unwrap(),
            Datum::Vector(vec![
                sym("define"),
                sym("x"),
                sym("as"),
                Datum::Vector(vec![
                    sym("quote"),
                    Datum::Vector(vec![Datum::Integer(1), Datum::String("a".into())])
                ])
            ])
        );
    }

    #[test]
    fn test_comments_inside_forms_are_skipped() {
        assert_eq!(
            read("(+ 1 #! two !# 2 ; three\n)").unwrap(),
            Datum::Vector(vec![sym("+"), Datum::Integer(1), Datum::Integer(2)])
        );
    }

    #[test]
    fn test_incomplete_input_is_not_consumed() {
        let mut input = Input::new("(+ 1");
        assert_eq!(read_datum(&mut input).unwrap(), None);
        assert!(input.has_pending());
        input.push_str(" 2)");
        assert_eq!(
            read_datum(&mut input).unwrap(),
            Some(Datum::Vector(vec![sym("+"), Datum::Integer(1), Datum::Integer(2)]))
        );
        assert!(!input.has_pending());
    }

    #[test]
    fn test_read_many_counts_lines() {
        let mut input = Input::new("1\n2\n(3\n)");
        let mut n = 0;
        while read_datum(&mut input).unwrap().is_some() {
            n += 1;
        }
        assert_eq!(n, 3);
        assert_eq!(input.line(), 4);
        assert_eq!(read_many("#!c!# 1 2").unwrap().len(), 2);
    }

    #[test]
    fn test_errors() {
        assert!(read(")").is_err());
        assert_eq!(read("(1 2").unwrap_err().to_string(), "Unexpected end of input");
        assert!(read_many("(1) (2").is_err());
        let mut input = Input::new("|zz| 1");
        assert!(read_datum(&mut input).is_err());
        assert!(!input.has_pending());
    }
}
