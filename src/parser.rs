use super::ast::{Expr, Function, Prototype};
use super::error::{Error, Result};
use super::lexer::Lexer;
use super::token::Token;

/// Recursive descent parser with one token of lookahead.
///
/// Binary expressions are parsed by precedence climbing over the table in
/// `Token::precedence`. Every parse method expects `current` to sit on the
/// first token of its construct and leaves it on the first token after it.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Parser { lexer, current })
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect_symbol(&mut self, c: char, msg: &str) -> Result<()> {
        if self.current != Token::Symbol(c) {
            return Err(Error::parse(msg));
        }
        self.advance()
    }

    fn current_binop(&self) -> Option<(char, u8)> {
        match self.current {
            Token::Symbol(op) => self.current.precedence().map(|prec| (op, prec)),
            _ => None,
        }
    }

    fn parse_number_expr(&mut self, n: f64) -> Result<Expr> {
        self.advance()?;
        Ok(Expr::Number(n))
    }

    fn parse_paren_expr(&mut self) -> Result<Expr> {
        self.advance()?;
        let e = self.parse_expr()?;
        self.expect_symbol(')', "expected ')'")?;
        Ok(e)
    }

    fn parse_identifier_expr(&mut self, name: String) -> Result<Expr> {
        self.advance()?;
        if self.current != Token::Symbol('(') {
            return Ok(Expr::Variable(name));
        }
        self.advance()?;

        let mut args = Vec::new();
        if self.current != Token::Symbol(')') {
            loop {
                args.push(self.parse_expr()?);
                match self.current {
                    Token::Symbol(')') => break,
                    Token::Symbol(',') => self.advance()?,
                    _ => return Err(Error::parse("expected ')' or ',' in argument list")),
                }
            }
        }
        self.advance()?;

        Ok(Expr::Call(name, args))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.current {
            Token::Identifier(ref name) => {
                let name = name.clone();
                self.parse_identifier_expr(name)
            }
            Token::Number(n) => self.parse_number_expr(n),
            Token::Symbol('(') => self.parse_paren_expr(),
            _ => Err(Error::parse(
                "unexpected token when expecting an expression",
            )),
        }
    }

    pub fn parse_expr(&mut self) -> Result<Expr> {
        let lhs = self.parse_primary()?;
        self.parse_bin_op_rhs(0, lhs)
    }

    fn parse_bin_op_rhs(&mut self, min_prec: u8, mut lhs: Expr) -> Result<Expr> {
        loop {
            let (op, prec) = match self.current_binop() {
                Some((op, prec)) if prec >= min_prec => (op, prec),
                _ => return Ok(lhs),
            };
            self.advance()?;

            let mut rhs = self.parse_primary()?;
            if let Some((_, next_prec)) = self.current_binop() {
                if next_prec > prec {
                    rhs = self.parse_bin_op_rhs(prec + 1, rhs)?;
                }
            }

            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    pub fn parse_prototype(&mut self) -> Result<Prototype> {
        let name = match self.current {
            Token::Identifier(ref name) => name.clone(),
            _ => return Err(Error::parse("expected function name in prototype")),
        };
        self.advance()?;
        self.expect_symbol('(', "expected '(' in prototype")?;

        let mut params = Vec::new();
        while let Token::Identifier(ref param) = self.current {
            params.push(param.clone());
            self.advance()?;
        }
        self.expect_symbol(')', "expected ')' in prototype")?;

        Ok(Prototype::new(name, params))
    }

    pub fn parse_definition(&mut self) -> Result<Function> {
        self.advance()?;
        let proto = self.parse_prototype()?;
        let body = self.parse_expr()?;
        Ok(Function { proto, body })
    }

    pub fn parse_extern(&mut self) -> Result<Prototype> {
        self.advance()?;
        self.parse_prototype()
    }

    pub fn parse_top_level_expr(&mut self) -> Result<Function> {
        let body = self.parse_expr()?;
        Ok(Function {
            proto: Prototype::anonymous(),
            body,
        })
    }
}

#[cfg(test)]
mod test {
    use super::super::error::ErrorKind;
    use super::*;

    fn num(n: f64) -> Expr {
        Expr::Number(n)
    }

    fn var(name: &str) -> Expr {
        Expr::Variable(name.to_owned())
    }

    fn expr(s: &str) -> Result<Expr> {
        let mut parser = Parser::new(s)?;
        let e = parser.parse_expr()?;
        assert_eq!(parser.current(), &Token::EndOfInput);
        Ok(e)
    }

    fn parse_error(result: Result<impl std::fmt::Debug>) -> String {
        let err = result.unwrap_err();
        match err.kind() {
            ErrorKind::Parse(msg) => msg.clone(),
            k => panic!("unexpected error kind: {:?}", k),
        }
    }

    #[test]
    fn test_primary() {
        assert_eq!(expr("1.0").unwrap(), num(1.0));
        assert_eq!(expr("y").unwrap(), var("y"));
        assert_eq!(expr("(((2)))").unwrap(), num(2.0));
    }

    #[test]
    fn test_expr() {
        assert_eq!(
            expr("1+2").unwrap(),
            Expr::binary('+', num(1.0), num(2.0))
        );

        assert_eq!(
            expr("1+2*3").unwrap(),
            Expr::binary('+', num(1.0), Expr::binary('*', num(2.0), num(3.0)))
        );

        assert_eq!(
            expr("1*2+3").unwrap(),
            Expr::binary('+', Expr::binary('*', num(1.0), num(2.0)), num(3.0))
        );

        assert_eq!(
            expr("(1+2)*3").unwrap(),
            Expr::binary('*', Expr::binary('+', num(1.0), num(2.0)), num(3.0))
        );
    }

    #[test]
    fn test_left_associative() {
        assert_eq!(
            expr("1-2-3").unwrap(),
            Expr::binary('-', Expr::binary('-', num(1.0), num(2.0)), num(3.0))
        );
    }

    #[test]
    fn test_lookahead_absorbs_tighter_operators() {
        assert_eq!(
            expr("a<b+c*d").unwrap(),
            Expr::binary(
                '<',
                var("a"),
                Expr::binary('+', var("b"), Expr::binary('*', var("c"), var("d")))
            )
        );

        // '-' binds tighter than '+', so the nested run keeps absorbing it.
        assert_eq!(
            expr("1+2*3-4").unwrap(),
            Expr::binary(
                '+',
                num(1.0),
                Expr::binary('-', Expr::binary('*', num(2.0), num(3.0)), num(4.0))
            )
        );
    }

    #[test]
    fn test_unknown_operator_ends_expression() {
        let mut parser = Parser::new("1/2").unwrap();
        assert_eq!(parser.parse_expr().unwrap(), num(1.0));
        assert_eq!(parser.current(), &Token::Symbol('/'));
    }

    #[test]
    fn test_call() {
        assert_eq!(
            expr("foo(1, 2)").unwrap(),
            Expr::Call("foo".to_owned(), vec![num(1.0), num(2.0)])
        );
        assert_eq!(
            expr("foo(y, 4.0)").unwrap(),
            Expr::Call("foo".to_owned(), vec![var("y"), num(4.0)])
        );
        assert_eq!(expr("foo()").unwrap(), Expr::Call("foo".to_owned(), vec![]));
        assert_eq!(
            expr("f(g(x)+1)").unwrap(),
            Expr::Call(
                "f".to_owned(),
                vec![Expr::binary(
                    '+',
                    Expr::Call("g".to_owned(), vec![var("x")]),
                    num(1.0)
                )]
            )
        );
    }

    #[test]
    fn test_call_missing_comma() {
        let msg = parse_error(expr("foo(1 2)"));
        assert!(msg.contains("expected ')' or ','"), "{}", msg);
    }

    #[test]
    fn test_expression_errors() {
        assert_eq!(
            parse_error(expr(")")),
            "unexpected token when expecting an expression"
        );
        assert_eq!(parse_error(expr("(1+2")), "expected ')'");
        assert_eq!(
            parse_error(expr("1+")),
            "unexpected token when expecting an expression"
        );
        assert_eq!(
            parse_error(expr("foo(1,")),
            "unexpected token when expecting an expression"
        );
    }

    #[test]
    fn test_prototype() {
        let mut parser = Parser::new("f()").unwrap();
        assert_eq!(
            parser.parse_prototype().unwrap(),
            Prototype::new("f", vec![])
        );

        let mut parser = Parser::new("g(a b c)").unwrap();
        assert_eq!(
            parser.parse_prototype().unwrap(),
            Prototype::new("g", vec!["a".to_owned(), "b".to_owned(), "c".to_owned()])
        );
    }

    #[test]
    fn test_prototype_errors() {
        let proto = |s: &str| Parser::new(s).unwrap().parse_prototype();
        assert_eq!(
            parse_error(proto("(x)")),
            "expected function name in prototype"
        );
        assert_eq!(parse_error(proto("f x)")), "expected '(' in prototype");
        assert_eq!(parse_error(proto("f(x, y)")), "expected ')' in prototype");
    }

    #[test]
    fn test_definition() {
        let mut parser = Parser::new("def foo(x y) x+y").unwrap();
        assert_eq!(
            parser.parse_definition().unwrap(),
            Function {
                proto: Prototype::new("foo", vec!["x".to_owned(), "y".to_owned()]),
                body: Expr::binary('+', var("x"), var("y")),
            }
        );
        assert_eq!(parser.current(), &Token::EndOfInput);
    }

    #[test]
    fn test_definition_accepts_duplicate_params() {
        let mut parser = Parser::new("def foo(x x) x").unwrap();
        let f = parser.parse_definition().unwrap();
        assert_eq!(f.proto.params, vec!["x".to_owned(), "x".to_owned()]);
        assert_eq!(f.body, var("x"));
    }

    #[test]
    fn test_definition_without_body() {
        let mut parser = Parser::new("def foo(x)").unwrap();
        assert_eq!(
            parse_error(parser.parse_definition()),
            "unexpected token when expecting an expression"
        );
    }

    #[test]
    fn test_extern() {
        let mut parser = Parser::new("extern sin(x);").unwrap();
        assert_eq!(
            parser.parse_extern().unwrap(),
            Prototype::new("sin", vec!["x".to_owned()])
        );
        assert_eq!(parser.current(), &Token::Symbol(';'));
    }

    #[test]
    fn test_top_level_expr() {
        let mut parser = Parser::new("1+2").unwrap();
        let f = parser.parse_top_level_expr().unwrap();
        assert!(f.proto.is_anonymous());
        assert!(f.proto.params.is_empty());
        assert_eq!(f.body, Expr::binary('+', num(1.0), num(2.0)));
    }

    #[test]
    fn test_lex_error_surfaces_through_parser() {
        let err = Parser::new("1+.").unwrap().parse_expr().unwrap_err();
        assert!(err.is_fatal());
    }
}
