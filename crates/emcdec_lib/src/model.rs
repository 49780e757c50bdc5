use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MathOp {
    Equal,
    Inf,
    InfEq,
    Or,
    And,
    NEqual,
    Sup,
    SupEq,
    Add,
    LAnd,
    LOr,
    Multiply,
    Minus,
    LShift,
    Xor,
    RShift,
}

impl MathOp {
    pub const ALL: [MathOp; 16] = [
        MathOp::Equal,
        MathOp::Inf,
        MathOp::InfEq,
        MathOp::Or,
        MathOp::And,
        MathOp::NEqual,
        MathOp::Sup,
        MathOp::SupEq,
        MathOp::Add,
        MathOp::LAnd,
        MathOp::LOr,
        MathOp::Multiply,
        MathOp::Minus,
        MathOp::LShift,
        MathOp::Xor,
        MathOp::RShift,
    ];

    pub fn from_mnemonic(s: &str) -> Option<MathOp> {
        let op = match s {
            "EQUAL" => MathOp::Equal,
            "INF" => MathOp::Inf,
            "INFEQ" => MathOp::InfEq,
            "OR" => MathOp::Or,
            "AND" => MathOp::And,
            "NEQUAL" => MathOp::NEqual,
            "SUP" => MathOp::Sup,
            "SUPEQ" => MathOp::SupEq,
            "ADD" => MathOp::Add,
            "LAND" => MathOp::LAnd,
            "LOR" => MathOp::LOr,
            "MULTIPLY" => MathOp::Multiply,
            "MINUS" => MathOp::Minus,
            "LSHIFT" => MathOp::LShift,
            "XOR" => MathOp::Xor,
            "RSHIFT" => MathOp::RShift,
            _ => return None,
        };
        Some(op)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            MathOp::Equal => "EQUAL",
            MathOp::Inf => "INF",
            MathOp::InfEq => "INFEQ",
            MathOp::Or => "OR",
            MathOp::And => "AND",
            MathOp::NEqual => "NEQUAL",
            MathOp::Sup => "SUP",
            MathOp::SupEq => "SUPEQ",
            MathOp::Add => "ADD",
            MathOp::LAnd => "LAND",
            MathOp::LOr => "LOR",
            MathOp::Multiply => "MULTIPLY",
            MathOp::Minus => "MINUS",
            MathOp::LShift => "LSHIFT",
            MathOp::Xor => "XOR",
            MathOp::RShift => "RSHIFT",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            MathOp::Equal => "==",
            MathOp::Inf => "<",
            MathOp::InfEq => "<=",
            MathOp::Or => "||",
            MathOp::And => "&&",
            MathOp::NEqual => "!=",
            MathOp::Sup => ">",
            MathOp::SupEq => ">=",
            MathOp::Add => "+",
            MathOp::LAnd => "&",
            MathOp::LOr => "|",
            MathOp::Multiply => "*",
            MathOp::Minus => "-",
            MathOp::LShift => "<<",
            MathOp::Xor => "^",
            MathOp::RShift => ">>",
        }
    }

    pub fn complement(self) -> Option<MathOp> {
        match self {
            MathOp::Equal => Some(MathOp::NEqual),
            MathOp::NEqual => Some(MathOp::Equal),
            MathOp::Inf => Some(MathOp::SupEq),
            MathOp::SupEq => Some(MathOp::Inf),
            MathOp::InfEq => Some(MathOp::Sup),
            MathOp::Sup => Some(MathOp::InfEq),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryKind {
    Not,
    Negate,
    BitNot,
}

impl UnaryKind {
    pub fn from_operand(v: i64) -> Option<UnaryKind> {
        match v {
            0 => Some(UnaryKind::Not),
            1 => Some(UnaryKind::Negate),
            2 => Some(UnaryKind::BitNot),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            UnaryKind::Not => "!",
            UnaryKind::Negate => "-",
            UnaryKind::BitNot => "~",
        }
    }
}

// Folded instructions stay in the arena, so a ReturnValueRef never dangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub(crate) usize);

impl InstrId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Literal(i64),
    ArgumentRef(u32),
    LocalVarRef(u32),
    ReturnValueRef(InstrId),
    BinaryOp {
        op: MathOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    UnaryOp {
        kind: UnaryKind,
        operand: Box<Expression>,
    },
}

impl Expression {
    pub fn math_op(&self) -> Option<MathOp> {
        match self {
            Expression::BinaryOp { op, .. } => Some(*op),
            _ => None,
        }
    }

    // rendering order: rhs first
    pub fn referenced_calls(&self, out: &mut Vec<InstrId>) {
        match self {
            Expression::ReturnValueRef(id) => out.push(*id),
            Expression::BinaryOp { lhs, rhs, .. } => {
                rhs.referenced_calls(out);
                lhs.referenced_calls(out);
            }
            Expression::UnaryOp { operand, .. } => operand.referenced_calls(out),
            Expression::Literal(_) | Expression::ArgumentRef(_) | Expression::LocalVarRef(_) => {}
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(v) => write!(f, "lit {}", hex(*v)),
            Expression::ArgumentRef(i) => write!(f, "arg{i}"),
            Expression::LocalVarRef(i) => write!(f, "var{i}"),
            Expression::ReturnValueRef(id) => write!(f, "ret(#{})", id.0),
            Expression::BinaryOp { op, lhs, rhs } => write!(f, "({rhs} {} {lhs})", op.mnemonic()),
            Expression::UnaryOp { kind, operand } => write!(f, "{}{operand}", kind.symbol()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructionKind {
    Assignment(Expression),
    FuncCall { name: String },
    Goto { target: usize },
    ConditionalGoto { target: usize, condition: Expression },
    Return,
    NoOp { mnemonic: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub addr: usize,
    pub is_jump_target: bool,
    pub kind: InstructionKind,
}

impl Instruction {
    pub fn new(addr: usize, kind: InstructionKind) -> Self {
        Self {
            addr,
            is_jump_target: false,
            kind,
        }
    }

    pub fn goto_target(&self) -> Option<usize> {
        match &self.kind {
            InstructionKind::Goto { target } | InstructionKind::ConditionalGoto { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub fn is_assignment(&self) -> bool {
        matches!(self.kind, InstructionKind::Assignment(_))
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.kind, InstructionKind::NoOp { .. })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.is_jump_target { '*' } else { ' ' };
        write!(f, "{:04x}{mark} ", self.addr)?;
        match &self.kind {
            InstructionKind::Assignment(v) => write!(f, "Assignment {v}"),
            InstructionKind::FuncCall { name } => write!(f, "FuncCall {name}"),
            InstructionKind::Goto { target } => write!(f, "Goto {}", hex(*target as i64)),
            InstructionKind::ConditionalGoto { target, condition } => {
                write!(f, "IfNot ( {condition} ) Goto {}", hex(*target as i64))
            }
            InstructionKind::Return => write!(f, "Return"),
            InstructionKind::NoOp { mnemonic } => write!(f, "NoOp {mnemonic}"),
        }
    }
}

pub(crate) fn hex(v: i64) -> String {
    if v < 0 {
        format!("-0x{:x}", v.unsigned_abs())
    } else {
        format!("0x{:x}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn every_mnemonic_round_trips() {
        for op in MathOp::ALL {
            assert_eq!(MathOp::from_mnemonic(op.mnemonic()), Some(op));
        }
        assert_eq!(MathOp::from_mnemonic("DIVIDE"), None);
    }

    #[test]
    fn complement_is_involutive() {
        let mut paired = 0;
        for op in MathOp::ALL {
            if let Some(c) = op.complement() {
                assert_ne!(c, op);
                assert_eq!(c.complement(), Some(op));
                paired += 1;
            }
        }
        assert_eq!(paired, 6);
        assert_eq!(MathOp::Add.complement(), None);
        assert_eq!(MathOp::Inf.complement(), Some(MathOp::SupEq));
        assert_eq!(MathOp::InfEq.complement(), Some(MathOp::Sup));
        assert_eq!(MathOp::Equal.complement(), Some(MathOp::NEqual));
    }

    #[test]
    fn unary_operands() {
        assert_eq!(UnaryKind::from_operand(0), Some(UnaryKind::Not));
        assert_eq!(UnaryKind::from_operand(1), Some(UnaryKind::Negate));
        assert_eq!(UnaryKind::from_operand(2), Some(UnaryKind::BitNot));
        assert_eq!(UnaryKind::from_operand(3), None);
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(hex(0), "0x0");
        assert_eq!(hex(0x1a), "0x1a");
        assert_eq!(hex(-1), "-0x1");
    }

    #[test]
    fn referenced_calls_follow_render_order() {
        let e = Expression::BinaryOp {
            op: MathOp::Add,
            lhs: Box::new(Expression::ReturnValueRef(InstrId(4))),
            rhs: Box::new(Expression::UnaryOp {
                kind: UnaryKind::Not,
                operand: Box::new(Expression::ReturnValueRef(InstrId(1))),
            }),
        };
        let mut calls = Vec::new();
        e.referenced_calls(&mut calls);
        assert_eq!(calls, vec![InstrId(1), InstrId(4)]);
        assert_eq!(e.math_op(), Some(MathOp::Add));
    }
}
