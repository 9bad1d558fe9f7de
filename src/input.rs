//! Wire format for the parser's AST dump.
//!
//! Lexing and parsing live outside this crate; the driver reads the parsed
//! program as JSON and converts it into the interned AST. Every node carries
//! its line; classes carry their filename.

use serde::Deserialize;

use crate::ast::{
    ArithOp, Attribute, CaseBranch, ClassDef, CmpOp, Expr, ExprKind, Feature, Formal, Method,
    Program,
};
use crate::diagnostics::CompileError;
use crate::span::Loc;
use crate::symbols::Interner;

#[derive(Debug, Deserialize)]
pub struct RawProgram {
    pub classes: Vec<RawClass>,
}

fn default_parent() -> String {
    "Object".to_string()
}

#[derive(Debug, Deserialize)]
pub struct RawClass {
    pub name: String,
    #[serde(default = "default_parent")]
    pub parent: String,
    pub filename: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default)]
    pub features: Vec<RawFeature>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawFeature {
    Method {
        name: String,
        #[serde(default)]
        formals: Vec<RawFormal>,
        return_type: String,
        body: RawExpr,
        #[serde(default)]
        line: u32,
    },
    Attribute {
        name: String,
        declared_type: String,
        #[serde(default)]
        init: Option<RawExpr>,
        #[serde(default)]
        line: u32,
    },
}

#[derive(Debug, Deserialize)]
pub struct RawFormal {
    pub name: String,
    pub declared_type: String,
    #[serde(default)]
    pub line: u32,
}

#[derive(Debug, Deserialize)]
pub struct RawBranch {
    pub name: String,
    pub declared_type: String,
    pub body: Box<RawExpr>,
    #[serde(default)]
    pub line: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RawExpr {
    Assign {
        name: String,
        value: Box<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    StaticDispatch {
        recv: Box<RawExpr>,
        type_name: String,
        method: String,
        #[serde(default)]
        args: Vec<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    Dispatch {
        recv: Box<RawExpr>,
        method: String,
        #[serde(default)]
        args: Vec<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    Cond {
        pred: Box<RawExpr>,
        then_branch: Box<RawExpr>,
        else_branch: Box<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    Loop {
        pred: Box<RawExpr>,
        body: Box<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    Case {
        scrutinee: Box<RawExpr>,
        branches: Vec<RawBranch>,
        #[serde(default)]
        line: u32,
    },
    Block {
        body: Vec<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    Let {
        name: String,
        declared_type: String,
        #[serde(default)]
        init: Option<Box<RawExpr>>,
        body: Box<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    Arith {
        operator: String,
        lhs: Box<RawExpr>,
        rhs: Box<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    Compare {
        operator: String,
        lhs: Box<RawExpr>,
        rhs: Box<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    Eq {
        lhs: Box<RawExpr>,
        rhs: Box<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    Neg {
        operand: Box<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    Not {
        operand: Box<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    Isvoid {
        operand: Box<RawExpr>,
        #[serde(default)]
        line: u32,
    },
    New {
        type_name: String,
        #[serde(default)]
        line: u32,
    },
    Int {
        value: String,
        #[serde(default)]
        line: u32,
    },
    Str {
        value: String,
        #[serde(default)]
        line: u32,
    },
    Bool {
        value: bool,
        #[serde(default)]
        line: u32,
    },
    Ident {
        name: String,
        #[serde(default)]
        line: u32,
    },
}

/// Parse a JSON AST dump and intern it.
pub fn parse_program(json: &str, interner: &mut Interner) -> Result<Program, CompileError> {
    let raw: RawProgram = serde_json::from_str(json)
        .map_err(|e| CompileError::input(format!("malformed AST dump: {e}")))?;
    raw.into_ast(interner)
}

impl RawProgram {
    pub fn into_ast(self, interner: &mut Interner) -> Result<Program, CompileError> {
        let classes = self
            .classes
            .into_iter()
            .map(|c| c.into_ast(interner))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Program { classes })
    }
}

impl RawClass {
    fn into_ast(self, interner: &mut Interner) -> Result<ClassDef, CompileError> {
        let file = interner.intern(&self.filename);
        let loc = Loc::new(file, self.line);
        let features = self
            .features
            .into_iter()
            .map(|f| f.into_ast(interner, file))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ClassDef {
            name: interner.intern(&self.name),
            parent: Some(interner.intern(&self.parent)),
            features,
            loc,
        })
    }
}

impl RawFeature {
    fn into_ast(
        self,
        interner: &mut Interner,
        file: crate::symbols::Symbol,
    ) -> Result<Feature, CompileError> {
        match self {
            RawFeature::Method { name, formals, return_type, body, line } => {
                Ok(Feature::Method(Method {
                    name: interner.intern(&name),
                    formals: formals
                        .into_iter()
                        .map(|f| Formal {
                            name: interner.intern(&f.name),
                            declared_type: interner.intern(&f.declared_type),
                            loc: Loc::new(file, f.line),
                        })
                        .collect(),
                    return_type: interner.intern(&return_type),
                    body: Some(body.into_ast(interner)?),
                    loc: Loc::new(file, line),
                }))
            }
            RawFeature::Attribute { name, declared_type, init, line } => {
                Ok(Feature::Attribute(Attribute {
                    name: interner.intern(&name),
                    declared_type: interner.intern(&declared_type),
                    init: init.map(|e| e.into_ast(interner)).transpose()?,
                    loc: Loc::new(file, line),
                }))
            }
        }
    }
}

fn arith_op(text: &str) -> Result<ArithOp, CompileError> {
    match text {
        "+" => Ok(ArithOp::Add),
        "-" => Ok(ArithOp::Sub),
        "*" => Ok(ArithOp::Mul),
        "/" => Ok(ArithOp::Div),
        other => Err(CompileError::input(format!("unknown arithmetic operator '{other}'"))),
    }
}

fn cmp_op(text: &str) -> Result<CmpOp, CompileError> {
    match text {
        "<" => Ok(CmpOp::Lt),
        "<=" => Ok(CmpOp::Le),
        other => Err(CompileError::input(format!("unknown comparison operator '{other}'"))),
    }
}

impl RawExpr {
    fn into_ast(self, interner: &mut Interner) -> Result<Expr, CompileError> {
        let (kind, line) = match self {
            RawExpr::Assign { name, value, line } => (
                ExprKind::Assign {
                    name: interner.intern(&name),
                    value: Box::new(value.into_ast(interner)?),
                },
                line,
            ),
            RawExpr::StaticDispatch { recv, type_name, method, args, line } => (
                ExprKind::StaticDispatch {
                    recv: Box::new(recv.into_ast(interner)?),
                    type_name: interner.intern(&type_name),
                    method: interner.intern(&method),
                    args: args
                        .into_iter()
                        .map(|a| a.into_ast(interner))
                        .collect::<Result<Vec<_>, _>>()?,
                },
                line,
            ),
            RawExpr::Dispatch { recv, method, args, line } => (
                ExprKind::Dispatch {
                    recv: Box::new(recv.into_ast(interner)?),
                    method: interner.intern(&method),
                    args: args
                        .into_iter()
                        .map(|a| a.into_ast(interner))
                        .collect::<Result<Vec<_>, _>>()?,
                },
                line,
            ),
            RawExpr::Cond { pred, then_branch, else_branch, line } => (
                ExprKind::Cond {
                    pred: Box::new(pred.into_ast(interner)?),
                    then_branch: Box::new(then_branch.into_ast(interner)?),
                    else_branch: Box::new(else_branch.into_ast(interner)?),
                },
                line,
            ),
            RawExpr::Loop { pred, body, line } => (
                ExprKind::Loop {
                    pred: Box::new(pred.into_ast(interner)?),
                    body: Box::new(body.into_ast(interner)?),
                },
                line,
            ),
            RawExpr::Case { scrutinee, branches, line } => (
                ExprKind::Case {
                    scrutinee: Box::new(scrutinee.into_ast(interner)?),
                    branches: branches
                        .into_iter()
                        .map(|b| {
                            Ok(CaseBranch {
                                name: interner.intern(&b.name),
                                declared_type: interner.intern(&b.declared_type),
                                body: b.body.into_ast(interner)?,
                                line: b.line,
                            })
                        })
                        .collect::<Result<Vec<_>, CompileError>>()?,
                },
                line,
            ),
            RawExpr::Block { body, line } => (
                ExprKind::Block(
                    body.into_iter()
                        .map(|e| e.into_ast(interner))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                line,
            ),
            RawExpr::Let { name, declared_type, init, body, line } => (
                ExprKind::Let {
                    name: interner.intern(&name),
                    declared_type: interner.intern(&declared_type),
                    init: init.map(|e| e.into_ast(interner)).transpose()?.map(Box::new),
                    body: Box::new(body.into_ast(interner)?),
                },
                line,
            ),
            RawExpr::Arith { operator, lhs, rhs, line } => (
                ExprKind::Arith {
                    op: arith_op(&operator)?,
                    lhs: Box::new(lhs.into_ast(interner)?),
                    rhs: Box::new(rhs.into_ast(interner)?),
                },
                line,
            ),
            RawExpr::Compare { operator, lhs, rhs, line } => (
                ExprKind::Compare {
                    op: cmp_op(&operator)?,
                    lhs: Box::new(lhs.into_ast(interner)?),
                    rhs: Box::new(rhs.into_ast(interner)?),
                },
                line,
            ),
            RawExpr::Eq { lhs, rhs, line } => (
                ExprKind::Eq {
                    lhs: Box::new(lhs.into_ast(interner)?),
                    rhs: Box::new(rhs.into_ast(interner)?),
                },
                line,
            ),
            RawExpr::Neg { operand, line } => {
                (ExprKind::Neg(Box::new(operand.into_ast(interner)?)), line)
            }
            RawExpr::Not { operand, line } => {
                (ExprKind::Not(Box::new(operand.into_ast(interner)?)), line)
            }
            RawExpr::Isvoid { operand, line } => {
                (ExprKind::IsVoid(Box::new(operand.into_ast(interner)?)), line)
            }
            RawExpr::New { type_name, line } => {
                (ExprKind::New(interner.intern(&type_name)), line)
            }
            RawExpr::Int { value, line } => (ExprKind::IntConst(interner.intern(&value)), line),
            RawExpr::Str { value, line } => (ExprKind::StrConst(interner.intern(&value)), line),
            RawExpr::Bool { value, line } => (ExprKind::BoolConst(value), line),
            RawExpr::Ident { name, line } => (ExprKind::Ident(interner.intern(&name)), line),
        };
        Ok(Expr::new(kind, line))
    }
}
