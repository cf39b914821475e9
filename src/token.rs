// ABOUTME: Hand-written, stateful, flag-driven tokenizer (not a combinator parser)
// Lexing here is context-sensitive: whether `-` is unary or binary, whether a
// `(` is even legal next, and whether a newline means anything all depend on
// what was legally allowed to come before this byte.

use crate::error::CompileError;
use bitflags::bitflags;

bitflags! {
    /// What kind of token is legal to come next. Threaded through every call
    /// to `next_token` and updated by it; the caller never has to reason
    /// about lexer state directly.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TokenFlags: u16 {
        const TNUMBER = 1 << 0;
        const TWORD   = 1 << 1;
        const TOPEN   = 1 << 2;
        const TCLOSE  = 1 << 3;
        const TOP     = 1 << 4;
        const UNARY   = 1 << 5;
        const COMMA   = 1 << 6;
        const TOP_LEVEL = 1 << 7;
    }
}

impl TokenFlags {
    /// State at the very start of a (top-level) expression: a number, a
    /// word, an open paren, or a unary operator may come first.
    pub fn initial() -> Self {
        TokenFlags::TNUMBER | TokenFlags::TWORD | TokenFlags::TOPEN | TokenFlags::UNARY | TokenFlags::TOP_LEVEL
    }
}

pub(crate) fn is_first_var_byte(c: u8) -> bool {
    (c >= b'@' && c != b'^' && c != b'|') || c == b'$'
}

fn is_var_byte(c: u8) -> bool {
    is_first_var_byte(c) || c == b'#' || c.is_ascii_digit()
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpTok {
    Power,
    Multiply,
    Divide,
    Remainder,
    Plus,
    Minus,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    EqOp,
    NeOp,
    BitAnd,
    BitOr,
    BitXor,
    LogicalAnd,
    LogicalOr,
    Assign,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOpTok {
    Neg,
    Not,
    BitNot,
}

const BINARY_OPS: &[(&str, BinOpTok)] = &[
    ("**", BinOpTok::Power),
    ("*", BinOpTok::Multiply),
    ("/", BinOpTok::Divide),
    ("%", BinOpTok::Remainder),
    ("+", BinOpTok::Plus),
    ("-", BinOpTok::Minus),
    ("<<", BinOpTok::Shl),
    (">>", BinOpTok::Shr),
    ("<=", BinOpTok::Le),
    ("<", BinOpTok::Lt),
    (">=", BinOpTok::Ge),
    (">", BinOpTok::Gt),
    ("==", BinOpTok::EqOp),
    ("!=", BinOpTok::NeOp),
    ("&&", BinOpTok::LogicalAnd),
    ("&", BinOpTok::BitAnd),
    ("||", BinOpTok::LogicalOr),
    ("|", BinOpTok::BitOr),
    ("^", BinOpTok::BitXor),
    ("=", BinOpTok::Assign),
    (",", BinOpTok::Comma),
];

const UNARY_OPS: &[(&str, UnOpTok)] = &[("-", UnOpTok::Neg), ("!", UnOpTok::Not), ("^", UnOpTok::BitNot)];

fn lookup_binary_op(s: &[u8]) -> Option<BinOpTok> {
    BINARY_OPS
        .iter()
        .find(|(lit, _)| lit.as_bytes() == s)
        .map(|(_, op)| *op)
}

fn lookup_unary_op(s: &[u8]) -> Option<UnOpTok> {
    UNARY_OPS.iter().find(|(lit, _)| lit.as_bytes() == s).map(|(_, op)| *op)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'a> {
    Number(f32),
    Word(&'a str),
    Open,
    Close,
    Binary(BinOpTok),
    Unary(UnOpTok),
}

/// Advances past one token, returning it and the number of bytes consumed.
/// Returns `Ok(None)` at end of input. Comments and plain whitespace are
/// consumed internally and never surface as a token, except that a newline
/// may surface as a synthetic `,` (`Comma`) token — see `flags`' `TOP_LEVEL`
/// handling below.
pub fn next_token<'a>(src: &'a str, pos: &mut usize, flags: &mut TokenFlags) -> Result<Option<Token<'a>>, CompileError> {
    let bytes = src.as_bytes();
    loop {
        if *pos >= bytes.len() {
            return Ok(None);
        }
        let c = bytes[*pos];

        if c == b'#' {
            // Comment: runs to, but does not consume, the newline.
            let start = *pos;
            while *pos < bytes.len() && bytes[*pos] != b'\n' {
                *pos += 1;
            }
            let _ = start;
            continue;
        }

        if c == b'\n' {
            let start = *pos;
            while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
                *pos += 1;
            }
            if flags.contains(TokenFlags::TOP) {
                if *pos == bytes.len() || bytes[*pos] == b')' {
                    flags.remove(TokenFlags::COMMA);
                } else {
                    *flags = TokenFlags::TNUMBER | TokenFlags::TWORD | TokenFlags::TOPEN | TokenFlags::UNARY | TokenFlags::COMMA;
                    return Ok(Some(Token::Binary(BinOpTok::Comma)));
                }
            }
            let _ = start;
            continue;
        }

        if c.is_ascii_whitespace() {
            *pos += 1;
            continue;
        }

        if flags.contains(TokenFlags::TNUMBER) && c.is_ascii_digit() {
            let start = *pos;
            while *pos < bytes.len() && (bytes[*pos].is_ascii_digit() || bytes[*pos] == b'.') {
                *pos += 1;
            }
            let text = &src[start..*pos];
            let n: f32 = text.parse().map_err(|_| CompileError::UnexpectedNumber(start))?;
            *flags = TokenFlags::TOP | TokenFlags::TCLOSE;
            return Ok(Some(Token::Number(n)));
        }

        if flags.contains(TokenFlags::TWORD) && is_first_var_byte(c) {
            let start = *pos;
            while *pos < bytes.len() && is_var_byte(bytes[*pos]) {
                *pos += 1;
            }
            let text = &src[start..*pos];
            *flags = TokenFlags::TOPEN | TokenFlags::TOP | TokenFlags::TCLOSE;
            return Ok(Some(Token::Word(text)));
        }

        if flags.contains(TokenFlags::TOPEN) && c == b'(' {
            *pos += 1;
            *flags = TokenFlags::TNUMBER | TokenFlags::TWORD | TokenFlags::TOPEN | TokenFlags::UNARY;
            return Ok(Some(Token::Open));
        }

        if flags.contains(TokenFlags::TCLOSE) && c == b')' {
            *pos += 1;
            *flags = TokenFlags::TOP | TokenFlags::TCLOSE;
            return Ok(Some(Token::Close));
        }

        // A paren that isn't legal here (flag bit unset) is a dedicated
        // lexical error, not an unknown operator.
        if c == b'(' || c == b')' {
            return Err(CompileError::UnexpectedParen(*pos));
        }

        // Operator: greedily extend the match, backing off to the longest
        // recognized prefix (see DESIGN.md for why this needs to grow past
        // a failing prefix at least once, e.g. `!` alone isn't a binary op
        // but `!=` is).
        let start = *pos;
        let unary_allowed = flags.contains(TokenFlags::UNARY);
        if unary_allowed {
            if let Some(op) = lookup_unary_op(&bytes[start..start + 1]) {
                *pos += 1;
                *flags = TokenFlags::TNUMBER | TokenFlags::TWORD | TokenFlags::TOPEN | TokenFlags::UNARY;
                return Ok(Some(Token::Unary(op)));
            }
        }

        let mut i = 0usize;
        let mut found = false;
        while start + i < bytes.len() {
            let ch = bytes[start + i];
            if is_var_byte(ch) || ch.is_ascii_whitespace() || ch == b'(' || ch == b')' {
                break;
            }
            if lookup_binary_op(&bytes[start..=start + i]).is_some() {
                found = true;
            } else if found {
                break;
            }
            i += 1;
        }
        if !found {
            return Err(CompileError::UnknownOperator(start));
        }
        *pos = start + i;
        let op = lookup_binary_op(&bytes[start..*pos]).unwrap();
        *flags = TokenFlags::TNUMBER | TokenFlags::TWORD | TokenFlags::TOPEN | TokenFlags::UNARY;
        return Ok(Some(Token::Binary(op)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token<'_>> {
        let mut pos = 0;
        let mut flags = TokenFlags::initial();
        let mut out = Vec::new();
        while let Some(tok) = next_token(src, &mut pos, &mut flags).unwrap() {
            out.push(tok);
        }
        out
    }

    #[test]
    fn tokenizes_simple_arithmetic() {
        assert_eq!(
            tokens("2+3*4"),
            vec![
                Token::Number(2.0),
                Token::Binary(BinOpTok::Plus),
                Token::Number(3.0),
                Token::Binary(BinOpTok::Multiply),
                Token::Number(4.0),
            ]
        );
    }

    #[test]
    fn leading_minus_is_unary() {
        assert_eq!(tokens("-5"), vec![Token::Unary(UnOpTok::Neg), Token::Number(5.0)]);
    }

    #[test]
    fn minus_after_operand_is_binary() {
        assert_eq!(
            tokens("5-3"),
            vec![Token::Number(5.0), Token::Binary(BinOpTok::Minus), Token::Number(3.0)]
        );
    }

    #[test]
    fn minus_after_open_paren_is_unary() {
        assert_eq!(
            tokens("(-5)"),
            vec![Token::Open, Token::Unary(UnOpTok::Neg), Token::Number(5.0), Token::Close]
        );
    }

    #[test]
    fn distinguishes_bang_from_bang_equals() {
        assert_eq!(
            tokens("!x"),
            vec![Token::Unary(UnOpTok::Not), Token::Word("x")]
        );
        assert_eq!(
            tokens("1!=2"),
            vec![Token::Number(1.0), Token::Binary(BinOpTok::NeOp), Token::Number(2.0)]
        );
    }

    #[test]
    fn distinguishes_single_and_double_char_operators() {
        assert_eq!(tokens("1<2"), vec![Token::Number(1.0), Token::Binary(BinOpTok::Lt), Token::Number(2.0)]);
        assert_eq!(tokens("1<=2"), vec![Token::Number(1.0), Token::Binary(BinOpTok::Le), Token::Number(2.0)]);
        assert_eq!(tokens("2**3"), vec![Token::Number(2.0), Token::Binary(BinOpTok::Power), Token::Number(3.0)]);
    }

    #[test]
    fn comment_runs_to_but_not_past_newline() {
        let mut pos = 0;
        let mut flags = TokenFlags::initial();
        // Comment consumed, no token produced, but TOP_LEVEL's newline
        // handling means we still see the trailing "1" as a fresh number.
        let first = next_token("# comment\n1", &mut pos, &mut flags).unwrap();
        assert_eq!(first, Some(Token::Number(1.0)));
    }

    #[test]
    fn word_may_not_start_with_digit() {
        assert_eq!(tokens("x1"), vec![Token::Word("x1")]);
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let mut pos = 0;
        let mut flags = TokenFlags::initial();
        assert!(next_token(":::", &mut pos, &mut flags).is_err());
    }

    #[test]
    fn leading_dot_is_not_a_number() {
        let mut pos = 0;
        let mut flags = TokenFlags::initial();
        assert_eq!(next_token(".5", &mut pos, &mut flags), Err(CompileError::UnknownOperator(0)));
    }

    #[test]
    fn paren_out_of_position_is_a_dedicated_error() {
        let mut pos = 0;
        let mut flags = TokenFlags::initial();
        // A number's post-flags don't include TOPEN, so `(` right after it
        // is not a legal call-open here.
        let _ = next_token("5(", &mut pos, &mut flags).unwrap();
        assert_eq!(next_token("5(", &mut pos, &mut flags), Err(CompileError::UnexpectedParen(1)));
    }

    #[test]
    fn unary_is_legal_immediately_after_an_injected_newline_comma() {
        let mut pos = 0;
        let mut flags = TokenFlags::initial();
        let mut out = Vec::new();
        while let Some(tok) = next_token("5\n-3", &mut pos, &mut flags).unwrap() {
            out.push(tok);
        }
        assert_eq!(
            out,
            vec![
                Token::Number(5.0),
                Token::Binary(BinOpTok::Comma),
                Token::Unary(UnOpTok::Neg),
                Token::Number(3.0),
            ]
        );
    }
}
