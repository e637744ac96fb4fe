use failure::{Backtrace, Context, Fail};
use std::fmt::{self, Display};

#[derive(Debug)]
pub struct Error {
    inner: Context<ErrorKind>,
}

#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum ErrorKind {
    #[fail(display = "lex error: {}", _0)]
    Lex(String),
    #[fail(display = "{}", _0)]
    Parse(String),
    #[fail(display = "{}", _0)]
    Codegen(String),
    #[fail(display = "evaluation failed: {}", _0)]
    Eval(String),
    #[fail(display = "failed to read input")]
    Io,
    #[fail(display = "configuration error: {}", _0)]
    Config(String),
}

impl Fail for Error {
    fn cause(&self) -> Option<&dyn Fail> {
        self.inner.cause()
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        self.inner.backtrace()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.inner.get_context()
    }

    /// Lexical, input and configuration failures stop the driver instead of
    /// resynchronizing.
    pub fn is_fatal(&self) -> bool {
        match self.kind() {
            ErrorKind::Lex(_) | ErrorKind::Io | ErrorKind::Config(_) => true,
            _ => false,
        }
    }

    /// Messages of the underlying failures, outermost first.
    pub fn causes(&self) -> Vec<String> {
        let fail: &dyn Fail = self;
        fail.iter_causes().map(|cause| cause.to_string()).collect()
    }

    pub(crate) fn parse(msg: impl Into<String>) -> Error {
        Error::from(ErrorKind::Parse(msg.into()))
    }

    pub(crate) fn codegen(msg: impl Into<String>) -> Error {
        Error::from(ErrorKind::Codegen(msg.into()))
    }

    pub(crate) fn eval(msg: impl Into<String>) -> Error {
        Error::from(ErrorKind::Eval(msg.into()))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error {
            inner: Context::new(kind),
        }
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(inner: Context<ErrorKind>) -> Error {
        Error { inner }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error {
            inner: e.context(ErrorKind::Io),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
