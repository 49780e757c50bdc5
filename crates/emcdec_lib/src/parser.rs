use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use crate::builtins::BuiltinRegistry;
use crate::model::{Expression, InstrId, Instruction, InstructionKind, MathOp, UnaryKind};
use crate::EmcError;

// `arena` keeps every instruction ever emitted, folded ones included;
// `order` is the live list, sorted by address.
#[derive(Debug, Clone)]
pub struct Script {
    arena: Vec<Instruction>,
    order: Vec<InstrId>,
    labels: BTreeMap<u32, usize>,
    goto_targets: BTreeSet<usize>,
}

impl Script {
    pub fn get(&self, id: InstrId) -> &Instruction {
        &self.arena[id.0]
    }

    pub fn live_ids(&self) -> &[InstrId] {
        &self.order
    }

    pub fn instructions(&self) -> impl Iterator<Item = (InstrId, &Instruction)> {
        self.order.iter().map(|&id| (id, &self.arena[id.0]))
    }

    pub fn labels(&self) -> &BTreeMap<u32, usize> {
        &self.labels
    }

    pub fn goto_targets(&self) -> &BTreeSet<usize> {
        &self.goto_targets
    }

    pub fn resolve(&self, addr: usize) -> Option<InstrId> {
        resolve_in(&self.arena, &self.order, addr)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn resolve_in(arena: &[Instruction], order: &[InstrId], addr: usize) -> Option<InstrId> {
    let pos = order.partition_point(|id| arena[id.0].addr < addr);
    order.get(pos).copied()
}

pub(crate) fn parse_hex(text: &str) -> Option<i64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    i64::from_str_radix(digits, 16).ok()
}

pub struct Parser<'r> {
    registry: &'r BuiltinRegistry,
    arena: Vec<Instruction>,
    order: Vec<InstrId>,
    stack: Vec<InstrId>,
    labels: BTreeMap<u32, usize>,
    goto_targets: BTreeSet<usize>,
    current_offset: usize,
}

impl<'r> Parser<'r> {
    pub fn new(registry: &'r BuiltinRegistry) -> Self {
        Self {
            registry,
            arena: Vec::new(),
            order: Vec::new(),
            stack: Vec::new(),
            labels: BTreeMap::new(),
            goto_targets: BTreeSet::new(),
            current_offset: 0,
        }
    }

    pub fn process<I, S>(mut self, lines: I) -> Result<Script, EmcError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.process_line(line.as_ref())?;
            self.current_offset += 1;
        }
        self.finalize()
    }

    fn line(&self) -> usize {
        self.current_offset + 1
    }

    fn process_line(&mut self, line: &str) -> Result<(), EmcError> {
        let mut tokens = line.split_whitespace();
        let mnemonic = match tokens.next() {
            Some(m) if !m.starts_with('#') => m,
            _ => return Ok(()),
        };
        let params: Vec<&str> = tokens.collect();

        match mnemonic {
            "LABEL" => {
                let label = self.operand(mnemonic, &params)?;
                let label = u32::try_from(label).map_err(|_| self.invalid_operand(mnemonic, params[0]))?;
                if self.labels.contains_key(&label) {
                    return Err(EmcError::LabelRedefined {
                        line: self.line(),
                        label,
                    });
                }
                self.labels.insert(label, self.current_offset + 1);
            }
            "PUSH" => {
                let v = self.operand(mnemonic, &params)?;
                self.push_value(Expression::Literal(v));
            }
            "PUSHARG" => {
                let i = self.index_operand(mnemonic, &params)?;
                self.push_value(Expression::ArgumentRef(i));
            }
            "PUSHVAR" => {
                let i = self.index_operand(mnemonic, &params)?;
                self.push_value(Expression::LocalVarRef(i));
            }
            "UNARY" => {
                let k = self.operand(mnemonic, &params)?;
                let kind = UnaryKind::from_operand(k).ok_or(EmcError::InvalidUnary {
                    line: self.line(),
                    operand: k,
                })?;
                let id = *self.stack.last().ok_or_else(|| self.underflow(mnemonic, 1))?;
                if let InstructionKind::Assignment(v) = &mut self.arena[id.0].kind {
                    let inner = std::mem::replace(v, Expression::Literal(0));
                    *v = Expression::UnaryOp {
                        kind,
                        operand: Box::new(inner),
                    };
                }
            }
            "CALL" => {
                let name = params.first().ok_or_else(|| self.missing_operand(mnemonic))?;
                if self.registry.lookup(name).is_none() {
                    debug!("line {}: call to unregistered builtin {name}", self.line());
                }
                self.emit(InstructionKind::FuncCall {
                    name: (*name).to_string(),
                });
            }
            "JUMP" => {
                let target = self.addr_operand(mnemonic, &params)?;
                self.goto_targets.insert(target);
                self.emit(InstructionKind::Goto { target });
            }
            "IFNOTGO" => {
                let target = self.addr_operand(mnemonic, &params)?;
                let cond = self.pop_pending(mnemonic, 1)?;
                let condition = self.fold(cond);
                self.goto_targets.insert(target);
                self.emit(InstructionKind::ConditionalGoto { target, condition });
            }
            "PUSHRC" => match self.operand(mnemonic, &params)? {
                0 => {
                    let pos = self
                        .order
                        .iter()
                        .rposition(|id| matches!(self.arena[id.0].kind, InstructionKind::FuncCall { .. }))
                        .ok_or(EmcError::MissingCall { line: self.line() })?;
                    let call = self.order.remove(pos);
                    debug!("line {}: folding call #{} into return value", self.line(), call.0);
                    self.push_value(Expression::ReturnValueRef(call));
                }
                // saves ip before a JUMP, nothing to show
                1 => {}
                operand => return Err(self.unexpected_operand(mnemonic, operand)),
            },
            "POPRC" => match self.operand(mnemonic, &params)? {
                0 => {}
                1 => {
                    self.emit(InstructionKind::Return);
                }
                operand => return Err(self.unexpected_operand(mnemonic, operand)),
            },
            "STACKRWD" => {
                if let Some(n) = self.optional_operand(mnemonic, &params)? {
                    self.rewind(n);
                }
            }
            "STACKFWD" => {
                self.optional_operand(mnemonic, &params)?;
            }
            m => {
                if let Some(op) = MathOp::from_mnemonic(m) {
                    if self.stack.len() < 2 {
                        return Err(self.underflow(m, 2));
                    }
                    let lhs_id = self.pop_pending(m, 2)?;
                    let rhs_id = self.pop_pending(m, 1)?;
                    let lhs = self.fold(lhs_id);
                    let rhs = self.fold(rhs_id);
                    self.push_value(Expression::BinaryOp {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    });
                } else {
                    warn!("line {}: unhandled mnemonic {m}", self.line());
                    self.emit(InstructionKind::NoOp {
                        mnemonic: m.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self, kind: InstructionKind) -> InstrId {
        let id = InstrId(self.arena.len());
        self.arena.push(Instruction::new(self.current_offset, kind));
        self.order.push(id);
        id
    }

    fn push_value(&mut self, value: Expression) {
        let id = self.emit(InstructionKind::Assignment(value));
        self.stack.push(id);
    }

    fn pop_pending(&mut self, mnemonic: &str, needed: usize) -> Result<InstrId, EmcError> {
        self.stack.pop().ok_or_else(|| self.underflow(mnemonic, needed))
    }

    fn fold(&mut self, id: InstrId) -> Expression {
        if let Some(pos) = self.order.iter().rposition(|&o| o == id) {
            self.order.remove(pos);
        }
        match &self.arena[id.0].kind {
            InstructionKind::Assignment(v) => v.clone(),
            _ => unreachable!("working stack only holds assignments"),
        }
    }

    fn rewind(&mut self, n: i64) {
        let n = usize::try_from(n).unwrap_or(0);
        if let Some(&last) = self.order.last() {
            if let InstructionKind::FuncCall { name } = &self.arena[last.0].kind {
                if let Some(sig) = self.registry.lookup(name) {
                    if sig.params.len() != n {
                        warn!(
                            "line {}: STACKRWD {n} after {name}, which takes {} arguments",
                            self.line(),
                            sig.params.len()
                        );
                    }
                }
            }
        }
        let keep = self.stack.len().saturating_sub(n);
        self.stack.truncate(keep);
    }

    fn operand(&self, mnemonic: &str, params: &[&str]) -> Result<i64, EmcError> {
        self.optional_operand(mnemonic, params)?
            .ok_or_else(|| self.missing_operand(mnemonic))
    }

    fn optional_operand(&self, mnemonic: &str, params: &[&str]) -> Result<Option<i64>, EmcError> {
        match params.first() {
            None => Ok(None),
            Some(text) => parse_hex(text)
                .map(Some)
                .ok_or_else(|| self.invalid_operand(mnemonic, text)),
        }
    }

    fn index_operand(&self, mnemonic: &str, params: &[&str]) -> Result<u32, EmcError> {
        let v = self.operand(mnemonic, params)?;
        u32::try_from(v).map_err(|_| self.invalid_operand(mnemonic, params[0]))
    }

    fn addr_operand(&self, mnemonic: &str, params: &[&str]) -> Result<usize, EmcError> {
        let v = self.operand(mnemonic, params)?;
        usize::try_from(v).map_err(|_| self.invalid_operand(mnemonic, params[0]))
    }

    fn underflow(&self, mnemonic: &str, needed: usize) -> EmcError {
        EmcError::StackUnderflow {
            line: self.line(),
            mnemonic: mnemonic.to_string(),
            needed,
            available: self.stack.len(),
        }
    }

    fn missing_operand(&self, mnemonic: &str) -> EmcError {
        EmcError::MissingOperand {
            line: self.line(),
            mnemonic: mnemonic.to_string(),
        }
    }

    fn invalid_operand(&self, mnemonic: &str, text: &str) -> EmcError {
        EmcError::InvalidOperand {
            line: self.line(),
            mnemonic: mnemonic.to_string(),
            text: text.to_string(),
        }
    }

    fn unexpected_operand(&self, mnemonic: &str, operand: i64) -> EmcError {
        EmcError::UnexpectedOperand {
            line: self.line(),
            mnemonic: mnemonic.to_string(),
            operand,
        }
    }

    fn finalize(self) -> Result<Script, EmcError> {
        let Parser {
            mut arena,
            order,
            labels: raw_labels,
            goto_targets,
            ..
        } = self;

        let mut labels = BTreeMap::new();
        for (&label, &addr) in &raw_labels {
            let id = resolve_in(&arena, &order, addr).ok_or(EmcError::UnresolvedLabel {
                line: addr,
                label,
                addr,
            })?;
            debug!("label {label:#x} -> {:#x}", arena[id.0].addr);
            labels.insert(label, arena[id.0].addr);
        }

        for &target in &goto_targets {
            match resolve_in(&arena, &order, target) {
                Some(id) => arena[id.0].is_jump_target = true,
                None => debug!("jump target {target:#x} falls off the end of the script"),
            }
        }

        Ok(Script {
            arena,
            order,
            labels,
            goto_targets,
        })
    }
}

pub fn parse(source: &str, registry: &BuiltinRegistry) -> Result<Script, EmcError> {
    Parser::new(registry).process(source.lines())
}
