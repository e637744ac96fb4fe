use super::error::{ErrorKind, Result};
use super::token::Token;
use combine::error::{ParseError, StreamError};
use combine::parser::char::{alpha_num, digit, letter};
use combine::parser::choice::or;
use combine::parser::{EasyParser, Parser};
use combine::stream::position::{self, SourcePosition};
use combine::stream::{Stream, StreamErrorFor};
use combine::{any, choice, eof, many, many1, optional, parser, satisfy, skip_many, token};

fn fraction<Input>() -> impl Parser<Input, Output = String>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (token('.'), many(digit())).map(|(dot, digits): (char, String)| {
        let mut text = dot.to_string();
        text.push_str(&digits);
        text
    })
}

// Digits with at most one '.'; a second '.' is left for the next token.
fn number<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    let whole = (many1(digit()), optional(fraction())).map(
        |(mut text, frac): (String, Option<String>)| {
            if let Some(frac) = frac {
                text.push_str(&frac);
            }
            text
        },
    );

    or(whole, fraction()).and_then(|text: String| {
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|e| StreamErrorFor::<Input>::other(e))
    })
}

fn ident<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (letter(), many(alpha_num())).map(|(first, rest): (char, String)| {
        let mut s = first.to_string();
        s.push_str(&rest);
        match s.as_ref() {
            "def" => Token::Def,
            "extern" => Token::Extern,
            id => Token::Identifier(id.to_owned()),
        }
    })
}

// Stops in front of the newline; the newline itself lexes as a symbol.
fn comment<Input>() -> impl Parser<Input, Output = ()>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    (token('#'), skip_many(satisfy(|c: char| c != '\n'))).map(|_| ())
}

fn lex_<Input>() -> impl Parser<Input, Output = Token>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    skip_many(token(' ')).with(choice((
        ident(),
        number(),
        comment().with(lex()),
        eof().map(|_| Token::EndOfInput),
        any().map(Token::Symbol),
    )))
}

parser! {
    pub(crate) fn lex[Input]()(Input) -> Token
        where [Input: Stream<Token=char>]
    {
        lex_()
    }
}

/// Pull-based tokenizer over one chunk of source text.
///
/// `EndOfInput` is returned once the text is exhausted, and again on every
/// following call.
pub struct Lexer<'a> {
    input: position::Stream<&'a str, SourcePosition>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            input: position::Stream::new(source),
        }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        match lex().easy_parse(self.input.clone()) {
            Ok((token, rest)) => {
                self.input = rest;
                Ok(token)
            }
            Err(e) => Err(ErrorKind::Lex(e.to_string()).into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::super::token::Token::*;
    use super::*;

    fn tokens(s: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(s);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            let done = token == EndOfInput;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    #[test]
    fn test_number() {
        assert_eq!(number().easy_parse("1.0").map(|x| x.0), Ok(Number(1.0)));
        assert_eq!(number().easy_parse("42").map(|x| x.0), Ok(Number(42.0)));
        assert_eq!(number().easy_parse(".5").map(|x| x.0), Ok(Number(0.5)));
        assert_eq!(number().easy_parse("3.").map(|x| x.0), Ok(Number(3.0)));
    }

    #[test]
    fn test_number_second_dot_ends_literal() {
        assert_eq!(tokens("1.2.3"), vec![Number(1.2), Number(0.3), EndOfInput]);
    }

    #[test]
    fn test_lone_dot_is_lex_error() {
        let err = Lexer::new(".").next_token().unwrap_err();
        match err.kind() {
            ErrorKind::Lex(_) => {}
            k => panic!("unexpected error kind: {:?}", k),
        }
        assert!(err.is_fatal());
    }

    #[test]
    fn test_ident() {
        assert_eq!(
            ident().easy_parse("test").map(|x| x.0),
            Ok(Identifier("test".to_owned()))
        );
        assert_eq!(
            ident().easy_parse("x1y2").map(|x| x.0),
            Ok(Identifier("x1y2".to_owned()))
        );
        assert_eq!(ident().easy_parse("def").map(|x| x.0), Ok(Def));
        assert_eq!(ident().easy_parse("extern").map(|x| x.0), Ok(Extern));
        assert_eq!(
            ident().easy_parse("define").map(|x| x.0),
            Ok(Identifier("define".to_owned()))
        );
    }

    #[test]
    fn test_comment() {
        assert_eq!(comment().easy_parse("#hoge").map(|x| x.0), Ok(()));
        assert_eq!(tokens("# only a comment"), vec![EndOfInput]);
        assert_eq!(
            tokens("#comment\n1.0"),
            vec![Symbol('\n'), Number(1.0), EndOfInput]
        );
    }

    #[test]
    fn test_definition_tokens() {
        assert_eq!(
            tokens("def foo(x y) x+y"),
            vec![
                Def,
                Identifier("foo".to_owned()),
                Symbol('('),
                Identifier("x".to_owned()),
                Identifier("y".to_owned()),
                Symbol(')'),
                Identifier("x".to_owned()),
                Symbol('+'),
                Identifier("y".to_owned()),
                EndOfInput,
            ]
        );
    }

    #[test]
    fn test_only_spaces_are_skipped() {
        assert_eq!(
            tokens("1\n\t2"),
            vec![Number(1.0), Symbol('\n'), Symbol('\t'), Number(2.0), EndOfInput]
        );
    }

    #[test]
    fn test_end_of_input_repeats() {
        let mut lexer = Lexer::new("   ");
        assert_eq!(lexer.next_token().unwrap(), EndOfInput);
        assert_eq!(lexer.next_token().unwrap(), EndOfInput);
    }
}
