use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use crate::builtins::BuiltinRegistry;
use crate::model::{hex, Expression, InstrId, Instruction, InstructionKind};
use crate::parser::Script;

const INDENT: usize = 2;

// Parameter n of a call names the value emitted n+1 slots before the
// instruction that performs or embeds the call. Bound before any text is
// produced.
pub struct CodeGen<'a> {
    script: &'a Script,
    registry: &'a BuiltinRegistry,
    bindings: HashMap<InstrId, &'a str>,
    labels_at: BTreeMap<usize, Vec<u32>>,
}

impl<'a> CodeGen<'a> {
    pub fn new(script: &'a Script, registry: &'a BuiltinRegistry) -> Self {
        let mut labels_at: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
        for (&label, &addr) in script.labels() {
            labels_at.entry(addr).or_default().push(label);
        }
        let mut cg = Self {
            script,
            registry,
            bindings: HashMap::new(),
            labels_at,
        };
        cg.bind_arguments();
        cg
    }

    // NoOps take no slot
    fn slots(&self) -> Vec<InstrId> {
        self.script
            .instructions()
            .filter(|(_, i)| !i.is_noop())
            .map(|(id, _)| id)
            .collect()
    }

    fn calls_of(&self, id: InstrId) -> Vec<InstrId> {
        let mut calls = Vec::new();
        match &self.script.get(id).kind {
            InstructionKind::FuncCall { .. } => calls.push(id),
            InstructionKind::Assignment(v) => v.referenced_calls(&mut calls),
            InstructionKind::ConditionalGoto { condition, .. } => condition.referenced_calls(&mut calls),
            InstructionKind::Goto { .. } | InstructionKind::Return | InstructionKind::NoOp { .. } => {}
        }
        calls
    }

    fn bind_arguments(&mut self) {
        let script = self.script;
        let registry = self.registry;
        let slots = self.slots();
        for (pos, &id) in slots.iter().enumerate() {
            for call in self.calls_of(id) {
                let name = match &script.get(call).kind {
                    InstructionKind::FuncCall { name } => name.as_str(),
                    _ => continue,
                };
                let Some(sig) = registry.lookup(name) else {
                    continue;
                };
                let at = script.get(id).addr;
                for (i, param) in sig.params.iter().enumerate() {
                    let Some(arg_pos) = pos.checked_sub(i + 1) else {
                        warn!("{name} at {at:#x}: no value for argument {}", param.name);
                        break;
                    };
                    let arg = slots[arg_pos];
                    let arg_inst = script.get(arg);
                    if !arg_inst.is_assignment() {
                        warn!(
                            "{name} at {at:#x}: argument {} lines up with a non-value instruction at {:#x}",
                            param.name, arg_inst.addr
                        );
                        continue;
                    }
                    debug!("binding {:#x} to {name}.{}", arg_inst.addr, param.name);
                    self.bindings.insert(arg, param.name.as_str());
                }
            }
        }
    }

    pub fn process(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut indent = 0usize;
        let mut slot = 0usize;

        for (id, inst) in self.script.instructions() {
            if inst.is_jump_target {
                lines.push(String::new());
                lines.push(format!("JUMP_TARGET_{}:", hex(inst.addr as i64)));
                indent = INDENT;
            }

            if let Some(text) = self.gen_inst(id, inst, slot) {
                lines.push(format!("{:indent$}{text}", ""));
            }
            if !inst.is_noop() {
                slot += 1;
            }

            if let Some(labels) = self.labels_at.get(&inst.addr) {
                for label in labels {
                    lines.push(String::new());
                    lines.push(format!("LABEL_{label}:"));
                }
                indent = INDENT;
            }
        }
        lines
    }

    fn gen_inst(&self, id: InstrId, inst: &Instruction, slot: usize) -> Option<String> {
        match &inst.kind {
            InstructionKind::Assignment(v) => {
                let value = self.gen_val(v, false);
                Some(match self.bindings.get(&id) {
                    Some(name) => format!("{name} := {value}"),
                    None => format!("var_{slot} := {value}"),
                })
            }
            InstructionKind::FuncCall { name } => Some(self.gen_func_call(name)),
            InstructionKind::Goto { target } => Some(self.gen_goto(*target)),
            InstructionKind::ConditionalGoto { target, condition } => {
                let invert = condition.math_op().and_then(|op| op.complement()).is_some();
                let cond = self.gen_val(condition, invert);
                let goto = self.gen_goto(*target);
                if invert {
                    Some(format!("if({cond}) then {goto}"))
                } else {
                    Some(format!("if(! {cond}) then {goto}"))
                }
            }
            InstructionKind::Return => Some("return".into()),
            InstructionKind::NoOp { .. } => None,
        }
    }

    fn gen_goto(&self, target: usize) -> String {
        // jumps off the end keep their raw address
        let addr = self
            .script
            .resolve(target)
            .map(|id| self.script.get(id).addr)
            .unwrap_or(target);
        format!("Goto {}", hex(addr as i64))
    }

    fn gen_func_call(&self, name: &str) -> String {
        match self.registry.lookup(name) {
            None => format!("{name}(TODO ARGS)"),
            Some(sig) => {
                let params: Vec<&str> = sig.params.iter().map(|p| p.name.as_str()).collect();
                format!("{name}({})", params.join(", "))
            }
        }
    }

    fn gen_val(&self, val: &Expression, invert_op: bool) -> String {
        match val {
            Expression::Literal(v) => hex(*v),
            Expression::ArgumentRef(i) => format!("ARG[{}]", hex(*i as i64)),
            Expression::LocalVarRef(i) => format!("var{i}"),
            Expression::ReturnValueRef(call) => match &self.script.get(*call).kind {
                InstructionKind::FuncCall { name } => self.gen_func_call(name),
                other => format!("<{other:?}>"),
            },
            Expression::BinaryOp { op, lhs, rhs } => {
                let op = if invert_op { op.complement().unwrap_or(*op) } else { *op };
                format!("{} {} {}", self.gen_operand(rhs), op.symbol(), self.gen_operand(lhs))
            }
            Expression::UnaryOp { kind, operand } => format!("{}{}", kind.symbol(), self.gen_operand(operand)),
        }
    }

    fn gen_operand(&self, val: &Expression) -> String {
        match val {
            Expression::BinaryOp { .. } => format!("({})", self.gen_val(val, false)),
            _ => self.gen_val(val, false),
        }
    }
}

pub fn generate(script: &Script, registry: &BuiltinRegistry) -> Vec<String> {
    CodeGen::new(script, registry).process()
}

pub fn listing(script: &Script) -> Vec<String> {
    let mut lines: Vec<String> = script.instructions().map(|(_, i)| i.to_string()).collect();
    for (label, addr) in script.labels() {
        lines.push(format!("label {label:#x} -> {addr:#06x}"));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn render(src: &str) -> Vec<String> {
        let reg = BuiltinRegistry::builtin();
        let script = parse(src, &reg).unwrap();
        generate(&script, &reg)
    }

    #[test]
    fn call_argument_is_renamed() {
        assert_eq!(
            render("PUSH 5\nPUSH 3\nADD\nCALL testGameFlag\nSTACKRWD"),
            vec!["flag := 0x5 + 0x3", "testGameFlag(flag)"]
        );
    }

    #[test]
    fn arguments_bind_last_pushed_first() {
        assert_eq!(
            render("PUSH 1\nPUSH 20\nCALL setGameFlag\nSTACKRWD 2"),
            vec!["val := 0x1", "flag := 0x20", "setGameFlag(flag, val)"]
        );
    }

    #[test]
    fn unknown_and_parameterless_calls() {
        assert_eq!(
            render("PUSH 1\nCALL 0X4F\nCALL clearDialogueField"),
            vec!["var_0 := 0x1", "0X4F(TODO ARGS)", "clearDialogueField()"]
        );
    }

    #[test]
    fn return_value_embeds_call() {
        assert_eq!(
            render("PUSH 7\nCALL testGameFlag\nSTACKRWD 1\nPUSHRC 0\nPUSH 1\nEQUAL\nIFNOTGO 8\nPOPRC 1\nPOPRC 1"),
            vec![
                "flag := 0x7",
                "if(testGameFlag(flag) != 0x1) then Goto 0x8",
                "return",
                "",
                "JUMP_TARGET_0x8:",
                "  return",
            ]
        );
    }

    #[test]
    fn nested_call_result_feeds_another_call() {
        assert_eq!(
            render("PUSH 2\nCALL testGameFlag\nSTACKRWD 1\nPUSHRC 0\nCALL loadMusicTrack\nSTACKRWD 1"),
            vec!["flag := 0x2", "file := testGameFlag(flag)", "loadMusicTrack(file)"]
        );
    }

    #[test]
    fn condition_without_complement_is_negated() {
        assert_eq!(
            render("PUSHVAR 1\nPUSHVAR 2\nAND\nIFNOTGO 4\nPOPRC 1"),
            vec!["if(! var1 && var2) then Goto 0x4", "", "JUMP_TARGET_0x4:", "  return"]
        );
        assert_eq!(
            render("PUSHARG 0\nIFNOTGO 2\nPOPRC 1"),
            vec!["if(! ARG[0x0]) then Goto 0x2", "", "JUMP_TARGET_0x2:", "  return"]
        );
    }

    #[test]
    fn complement_conditions() {
        let out = render("PUSHARG 0\nPUSH 1\nINF\nIFNOTGO 5\nPUSH 2\nPOPRC 1");
        assert_eq!(out[0], "if(ARG[0x0] >= 0x1) then Goto 0x5");
        let out = render("PUSHARG 0\nPUSH 1\nINFEQ\nIFNOTGO 5\nPUSH 2\nPOPRC 1");
        assert_eq!(out[0], "if(ARG[0x0] > 0x1) then Goto 0x5");
        let out = render("PUSHARG 0\nPUSH 1\nNEQUAL\nIFNOTGO 5\nPUSH 2\nPOPRC 1");
        assert_eq!(out[0], "if(ARG[0x0] == 0x1) then Goto 0x5");
    }

    #[test]
    fn labels_and_jump_targets() {
        assert_eq!(
            render("LABEL 1\nJUMP 3\nPUSH 0\nPOPRC 1"),
            vec![
                "Goto 0x3",
                "",
                "LABEL_1:",
                "  var_1 := 0x0",
                "",
                "JUMP_TARGET_0x3:",
                "  return",
            ]
        );
    }

    #[test]
    fn goto_names_the_resolved_instruction() {
        let out = render("JUMP 2\nPUSH 1\nPUSH 2\nADD\nPOPRC 1");
        assert_eq!(out[0], "Goto 0x3");
        assert!(out.contains(&"JUMP_TARGET_0x3:".to_string()));
    }

    #[test]
    fn jump_off_the_end_has_no_marker() {
        let out = render("PUSH 1\nIFNOTGO 30\nPOPRC 1");
        assert_eq!(out, vec!["if(! 0x1) then Goto 0x30", "return"]);
    }

    #[test]
    fn unary_and_nested_operands() {
        assert_eq!(
            render("PUSHVAR 0\nPUSH 1\nADD\nPUSH 2\nMULTIPLY\nUNARY 1"),
            vec!["var_0 := -((var0 + 0x1) * 0x2)"]
        );
        assert_eq!(render("PUSH 3\nUNARY 2"), vec!["var_0 := ~0x3"]);
    }

    #[test]
    fn argument_slot_holding_a_call_stays_unbound() {
        assert_eq!(
            render("PUSH 1\nCALL clearDialogueField\nCALL testGameFlag"),
            vec!["var_0 := 0x1", "clearDialogueField()", "testGameFlag(flag)"]
        );
    }

    #[test]
    fn noops_render_nothing_and_take_no_slot() {
        assert_eq!(
            render("PUSH 4\nPOPLOCVAR 1\nCALL testGameFlag\nSTACKRWD 1"),
            vec!["flag := 0x4", "testGameFlag(flag)"]
        );
    }

    #[test]
    fn generation_is_idempotent() {
        let reg = BuiltinRegistry::builtin();
        let script = parse("PUSH 1\nPUSH 2\nCALL setGameFlag\nSTACKRWD 2\nJUMP 0", &reg).unwrap();
        let cg = CodeGen::new(&script, &reg);
        assert_eq!(cg.process(), cg.process());
        assert_eq!(generate(&script, &reg), cg.process());
    }

    #[test]
    fn listing_dump() {
        let reg = BuiltinRegistry::builtin();
        let script = parse("LABEL 2\nJUMP 1\nPOPRC 1", &reg).unwrap();
        assert_eq!(
            listing(&script),
            vec!["0001* Goto 0x1", "0002  Return", "label 0x2 -> 0x0001"]
        );
    }
}
