use logos::Logos;

use super::DeclError;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \n\r\t\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // keywords are contextual: `type` is also a fine property name
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Word(String),

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r"[0-9]+n", |lex| {
        let s = lex.slice();
        s[..s.len() - 1].to_string()
    })]
    BigInt(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unescape(lex.slice()))]
    Str(String),

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("<")]
    Less,

    #[token(">")]
    Greater,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token("?")]
    Question,

    #[token("|")]
    Pipe,

    #[token("&")]
    Amp,

    #[token("=")]
    Assign,

    #[token("=>")]
    FatArrow,

    #[token(".")]
    Dot,

    #[token("...")]
    Ellipsis,

    #[token("-")]
    Minus,
}

// strip quotes, resolve the common escapes
fn unescape(quoted: &str) -> String {
    let inner = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

pub type Spanned = (Token, std::ops::Range<usize>);

pub fn tokenize(src: &str) -> Result<Vec<Spanned>, DeclError> {
    let mut out = Vec::new();
    for (token, span) in Token::lexer(src).spanned() {
        match token {
            Ok(token) => out.push((token, span)),
            Err(()) => {
                return Err(DeclError::new(
                    format!("unexpected input `{}`", &src[span.clone()]),
                    span.start,
                ));
            }
        }
    }
    Ok(out)
}
