//! A tiny condition-expression language for `AddressBreakPoint` predicates.
//! Source text like `"ax == 0x0100"` is parsed once into an AST and wrapped
//! in a [`CompiledExpr`] that evaluates in `O(expression size)` against an
//! [`EvalContext`] — a small recursive-descent interpreter rather than a
//! bytecode VM or a pulled-in parser-combinator crate.

use std::fmt;

/// What a compiled expression needs from its caller to evaluate: named
/// register reads and a memory read that must bypass the read-breakpoint
/// holder.
pub trait EvalContext {
    /// Looks up a register or flag by its lowercase assembly name (`"ax"`,
    /// `"al"`, `"cs"`, `"cf"`, `"zf"`, …). Returns `None` for an unknown name.
    fn register(&self, name: &str) -> Option<i64>;

    /// Reads `width` bytes (1/2/4) at linear address `address`, sign-agnostic
    /// (callers compare against literals, which are parsed as unsigned).
    /// Must not invoke memory-read breakpoint monitoring.
    fn read_memory_sneaky(&self, address: u32, width: u8) -> u32;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakpointExprError {
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("expected {0} at offset {1}")]
    Expected(&'static str, usize),
    #[error("invalid numeric literal {0:?}")]
    InvalidNumber(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Num(i64),
    Reg(String),
    Mem { width: u8, addr: Box<Expr> },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

/// A condition predicate compiled once at breakpoint-creation time and
/// evaluated on every potential trigger thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledExpr {
    source: String,
    ast: Expr,
}

impl CompiledExpr {
    pub fn parse(source: &str) -> Result<Self, BreakpointExprError> {
        let ast = Parser::new(source).parse_expr_top()?;
        Ok(CompiledExpr {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the predicate; a non-zero result is "true" (mirrors C-style
    /// truthiness, since every leaf is an integer).
    pub fn evaluate(&self, ctx: &dyn EvalContext) -> bool {
        eval(&self.ast, ctx) != 0
    }
}

fn eval(e: &Expr, ctx: &dyn EvalContext) -> i64 {
    match e {
        Expr::Num(n) => *n,
        Expr::Reg(name) => ctx.register(name).unwrap_or(0),
        Expr::Mem { width, addr } => ctx.read_memory_sneaky(eval(addr, ctx) as u32, *width) as i64,
        Expr::Not(a) => (eval(a, ctx) == 0) as i64,
        Expr::Neg(a) => -eval(a, ctx),
        Expr::Bin(op, a, b) => {
            let (l, r) = (eval(a, ctx), eval(b, ctx));
            match op {
                BinOp::Or => ((l != 0) || (r != 0)) as i64,
                BinOp::And => ((l != 0) && (r != 0)) as i64,
                BinOp::Eq => (l == r) as i64,
                BinOp::Ne => (l != r) as i64,
                BinOp::Lt => (l < r) as i64,
                BinOp::Le => (l <= r) as i64,
                BinOp::Gt => (l > r) as i64,
                BinOp::Ge => (l >= r) as i64,
                BinOp::BitOr => l | r,
                BinOp::BitXor => l ^ r,
                BinOp::BitAnd => l & r,
                BinOp::Shl => l << (r & 0x3F),
                BinOp::Shr => ((l as u64) >> (r & 0x3F)) as i64,
                BinOp::Add => l.wrapping_add(r),
                BinOp::Sub => l.wrapping_sub(r),
                BinOp::Mul => l.wrapping_mul(r),
                BinOp::Div => {
                    if r == 0 {
                        0
                    } else {
                        l.wrapping_div(r)
                    }
                }
                BinOp::Mod => {
                    if r == 0 {
                        0
                    } else {
                        l.wrapping_rem(r)
                    }
                }
            }
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser {
            src,
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn parse_expr_top(&mut self) -> Result<Expr, BreakpointExprError> {
        let e = self.parse_or()?;
        self.skip_ws();
        if self.pos != self.chars.len() {
            return Err(BreakpointExprError::UnexpectedChar(self.chars[self.pos], self.pos));
        }
        Ok(e)
    }

    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn matches(&mut self, s: &str) -> bool {
        self.skip_ws();
        let rest: String = self.chars[self.pos..].iter().collect();
        if rest.starts_with(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr, BreakpointExprError> {
        let mut lhs = self.parse_and()?;
        loop {
            if self.matches("||") {
                let rhs = self.parse_and()?;
                lhs = Expr::Bin(BinOp::Or, Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Expr, BreakpointExprError> {
        let mut lhs = self.parse_cmp()?;
        loop {
            if self.matches("&&") {
                let rhs = self.parse_cmp()?;
                lhs = Expr::Bin(BinOp::And, Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_cmp(&mut self) -> Result<Expr, BreakpointExprError> {
        let lhs = self.parse_bitor()?;
        let op = if self.matches("==") {
            BinOp::Eq
        } else if self.matches("!=") {
            BinOp::Ne
        } else if self.matches("<=") {
            BinOp::Le
        } else if self.matches(">=") {
            BinOp::Ge
        } else if self.matches("<") {
            BinOp::Lt
        } else if self.matches(">") {
            BinOp::Gt
        } else {
            return Ok(lhs);
        };
        let rhs = self.parse_bitor()?;
        Ok(Expr::Bin(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_bitor(&mut self) -> Result<Expr, BreakpointExprError> {
        let mut lhs = self.parse_bitxor()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('|') && self.chars.get(self.pos + 1) != Some(&'|') {
                self.pos += 1;
                let rhs = self.parse_bitxor()?;
                lhs = Expr::Bin(BinOp::BitOr, Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_bitxor(&mut self) -> Result<Expr, BreakpointExprError> {
        let mut lhs = self.parse_bitand()?;
        loop {
            if self.matches("^") {
                let rhs = self.parse_bitand()?;
                lhs = Expr::Bin(BinOp::BitXor, Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_bitand(&mut self) -> Result<Expr, BreakpointExprError> {
        let mut lhs = self.parse_shift()?;
        loop {
            self.skip_ws();
            if self.peek() == Some('&') && self.chars.get(self.pos + 1) != Some(&'&') {
                self.pos += 1;
                let rhs = self.parse_shift()?;
                lhs = Expr::Bin(BinOp::BitAnd, Box::new(lhs), Box::new(rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_shift(&mut self) -> Result<Expr, BreakpointExprError> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = if self.matches("<<") {
                BinOp::Shl
            } else if self.matches(">>") {
                BinOp::Shr
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_add()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_add(&mut self) -> Result<Expr, BreakpointExprError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = if self.matches("+") {
                BinOp::Add
            } else if self.matches("-") {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_mul()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_mul(&mut self) -> Result<Expr, BreakpointExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.matches("*") {
                BinOp::Mul
            } else if self.matches("/") {
                BinOp::Div
            } else if self.matches("%") {
                BinOp::Mod
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, BreakpointExprError> {
        if self.matches("!") {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if self.matches("-") {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, BreakpointExprError> {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return Err(BreakpointExprError::UnexpectedEof);
        };
        if c == '(' {
            self.pos += 1;
            let e = self.parse_or()?;
            self.skip_ws();
            if self.peek() != Some(')') {
                return Err(BreakpointExprError::Expected("')'", self.pos));
            }
            self.pos += 1;
            return Ok(e);
        }
        if c == '[' {
            self.pos += 1;
            let addr = self.parse_or()?;
            self.skip_ws();
            if self.peek() != Some(']') {
                return Err(BreakpointExprError::Expected("']'", self.pos));
            }
            self.pos += 1;
            return Ok(Expr::Mem { width: 2, addr: Box::new(addr) });
        }
        if c.is_ascii_digit() {
            return self.parse_number();
        }
        if c.is_alphabetic() || c == '_' {
            return self.parse_ident_or_sized_mem();
        }
        Err(BreakpointExprError::UnexpectedChar(c, self.pos))
    }

    fn parse_ident(&mut self) -> String {
        self.skip_ws();
        let start = self.pos;
        while self
            .chars
            .get(self.pos)
            .is_some_and(|c| c.is_alphanumeric() || *c == '_')
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_ident_or_sized_mem(&mut self) -> Result<Expr, BreakpointExprError> {
        let ident = self.parse_ident();
        let width = match ident.as_str() {
            "byte" => Some(1u8),
            "word" => Some(2u8),
            "dword" => Some(4u8),
            _ => None,
        };
        if let Some(width) = width {
            self.skip_ws();
            if self.peek() == Some('[') {
                self.pos += 1;
                let addr = self.parse_or()?;
                self.skip_ws();
                if self.peek() != Some(']') {
                    return Err(BreakpointExprError::Expected("']'", self.pos));
                }
                self.pos += 1;
                return Ok(Expr::Mem { width, addr: Box::new(addr) });
            }
        }
        Ok(Expr::Reg(ident.to_ascii_lowercase()))
    }

    fn parse_number(&mut self) -> Result<Expr, BreakpointExprError> {
        self.skip_ws();
        let start = self.pos;
        if self.chars.get(self.pos) == Some(&'0') && matches!(self.chars.get(self.pos + 1), Some('x') | Some('X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.chars.get(self.pos).is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let text: String = self.chars[digits_start..self.pos].iter().collect();
            return i64::from_str_radix(&text, 16)
                .map(Expr::Num)
                .map_err(|_| BreakpointExprError::InvalidNumber(text));
        }
        while self.chars.get(self.pos).is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<i64>()
            .map(Expr::Num)
            .map_err(|_| BreakpointExprError::InvalidNumber(text))
    }
}

impl fmt::Display for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCtx {
        ax: i64,
    }
    impl EvalContext for FakeCtx {
        fn register(&self, name: &str) -> Option<i64> {
            match name {
                "ax" => Some(self.ax),
                _ => None,
            }
        }
        fn read_memory_sneaky(&self, _address: u32, _width: u8) -> u32 {
            0
        }
    }

    #[test]
    fn ax_equality_triggers_at_the_right_value() {
        let expr = CompiledExpr::parse("ax == 0x0100").unwrap();
        assert!(!expr.evaluate(&FakeCtx { ax: 0 }));
        assert!(expr.evaluate(&FakeCtx { ax: 0x100 }));
    }

    #[test]
    fn precedence_and_parens() {
        let expr = CompiledExpr::parse("ax > 1 && (ax < 10 || ax == 100)").unwrap();
        assert!(expr.evaluate(&FakeCtx { ax: 5 }));
        assert!(expr.evaluate(&FakeCtx { ax: 100 }));
        assert!(!expr.evaluate(&FakeCtx { ax: 50 }));
    }

    #[test]
    fn memory_dereference_reads_sneakily() {
        struct MemCtx;
        impl EvalContext for MemCtx {
            fn register(&self, _name: &str) -> Option<i64> {
                None
            }
            fn read_memory_sneaky(&self, address: u32, width: u8) -> u32 {
                assert_eq!(address, 0x1000);
                assert_eq!(width, 1);
                0x42
            }
        }
        let expr = CompiledExpr::parse("byte[0x1000] == 0x42").unwrap();
        assert!(expr.evaluate(&MemCtx));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(CompiledExpr::parse("ax == 1)").is_err());
    }
}
