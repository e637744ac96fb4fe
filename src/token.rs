#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    EndOfInput,
    Def,
    Extern,
    Identifier(String),
    Number(f64),
    Symbol(char),
}

impl Token {
    /// Binding strength of a binary operator, `None` for anything else.
    pub fn precedence(&self) -> Option<u8> {
        match self {
            Token::Symbol('<') => Some(10),
            Token::Symbol('+') => Some(20),
            Token::Symbol('-') => Some(30),
            Token::Symbol('*') => Some(40),
            _ => None,
        }
    }
}
