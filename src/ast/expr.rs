use crate::ast::{Type, Value};
use crate::operators::SeqOp;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
}

/// Binary operators for expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    /// Modulo (%)
    Rem,
    /// `a ?? b`
    Coalesce,
}

impl BinaryOp {
    /// Comparison and logical operators produce bool.
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Eq => write!(f, "=="),
            BinaryOp::Ne => write!(f, "!="),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::Le => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::Ge => write!(f, ">="),
            BinaryOp::And => write!(f, "&&"),
            BinaryOp::Or => write!(f, "||"),
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::Rem => write!(f, "%"),
            BinaryOp::Coalesce => write!(f, "??"),
        }
    }
}

/// A lambda parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// A quoted function, used as predicate, selector or projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub params: Vec<Param>,
    pub body: Box<Expr>,
}

/// A node in a lazily-built query pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// The root of a query over all elements of `element`.
    Root { element: Type },
    Constant { value: Value, ty: Type },
    /// Reference to a lambda parameter.
    Param { name: String, ty: Type },
    /// Member access. `target` is `None` for static members.
    Member {
        target: Option<Box<Expr>>,
        name: String,
        /// Type declaring the member.
        owner: Type,
        ty: Type,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Convert { operand: Box<Expr>, ty: Type },
    Lambda(Lambda),
    /// Object construction with member initializers.
    New { ty: Type, fields: Vec<(String, Expr)> },
    /// A call on the sequence-combinator surface. `args[0]` is the source sequence.
    Call { op: SeqOp, args: Vec<Expr>, ty: Type },
    /// An opaque scalar function. Engines decide whether they support it.
    Invoke {
        function: String,
        args: Vec<Expr>,
        ty: Type,
    },
}

impl Expr {
    /// Static type of this node. Lambdas report their body type.
    pub fn ty(&self) -> Type {
        match self {
            Expr::Root { element } => Type::query(element.clone()),
            Expr::Constant { ty, .. }
            | Expr::Param { ty, .. }
            | Expr::Member { ty, .. }
            | Expr::Convert { ty, .. }
            | Expr::New { ty, .. }
            | Expr::Call { ty, .. }
            | Expr::Invoke { ty, .. } => ty.clone(),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => Type::bool(),
                UnaryOp::Negate => operand.ty(),
            },
            Expr::Binary { left, op, right } => {
                if op.is_boolean() {
                    Type::bool()
                } else if *op == BinaryOp::Coalesce {
                    left.ty()
                } else if left.ty() == Type::float() || right.ty() == Type::float() {
                    Type::float()
                } else {
                    left.ty()
                }
            }
            Expr::Conditional {
                if_true, if_false, ..
            } => match if_true.ty() {
                Type::Unit => if_false.ty(),
                ty => ty,
            },
            Expr::Lambda(lambda) => lambda.body.ty(),
        }
    }

    /// Rebuild this node with every direct child passed through `f`.
    pub fn try_map_children<E, F>(self, f: &mut F) -> Result<Expr, E>
    where
        F: FnMut(Expr) -> Result<Expr, E>,
    {
        let boxed = |e: Box<Expr>, f: &mut F| f(*e).map(Box::new);
        Ok(match self {
            Expr::Root { .. } | Expr::Constant { .. } | Expr::Param { .. } => self,
            Expr::Member {
                target,
                name,
                owner,
                ty,
            } => Expr::Member {
                target: target.map(|t| boxed(t, f)).transpose()?,
                name,
                owner,
                ty,
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op,
                operand: boxed(operand, f)?,
            },
            Expr::Binary { left, op, right } => Expr::Binary {
                left: boxed(left, f)?,
                op,
                right: boxed(right, f)?,
            },
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Expr::Conditional {
                test: boxed(test, f)?,
                if_true: boxed(if_true, f)?,
                if_false: boxed(if_false, f)?,
            },
            Expr::Convert { operand, ty } => Expr::Convert {
                operand: boxed(operand, f)?,
                ty,
            },
            Expr::Lambda(Lambda { params, body }) => Expr::Lambda(Lambda {
                params,
                body: boxed(body, f)?,
            }),
            Expr::New { ty, fields } => Expr::New {
                ty,
                fields: fields
                    .into_iter()
                    .map(|(name, e)| f(e).map(|e| (name, e)))
                    .collect::<Result<_, E>>()?,
            },
            Expr::Call { op, args, ty } => Expr::Call {
                op,
                args: args.into_iter().map(&mut *f).collect::<Result<_, E>>()?,
                ty,
            },
            Expr::Invoke { function, args, ty } => Expr::Invoke {
                function,
                args: args.into_iter().map(&mut *f).collect::<Result<_, E>>()?,
                ty,
            },
        })
    }

    /// Infallible form of [`Expr::try_map_children`].
    pub fn map_children(self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        let mapped: Result<Expr, Infallible> = self.try_map_children(&mut |e| Ok(f(e)));
        match mapped {
            Ok(e) => e,
            Err(never) => match never {},
        }
    }

    /// Direct children, in evaluation order.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Root { .. } | Expr::Constant { .. } | Expr::Param { .. } => vec![],
            Expr::Member { target, .. } => target.iter().map(|t| t.as_ref()).collect(),
            Expr::Unary { operand, .. } | Expr::Convert { operand, .. } => vec![operand.as_ref()],
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => vec![test.as_ref(), if_true.as_ref(), if_false.as_ref()],
            Expr::Lambda(lambda) => vec![lambda.body.as_ref()],
            Expr::New { fields, .. } => fields.iter().map(|(_, e)| e).collect(),
            Expr::Call { args, .. } | Expr::Invoke { args, .. } => args.iter().collect(),
        }
    }

    /// Pre-order traversal.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    /// True if any node in the tree satisfies `pred`.
    pub fn contains_node(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        pred(self) || self.children().into_iter().any(|c| c.contains_node(pred))
    }
}

impl std::fmt::Display for Lambda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.params.as_slice() {
            [p] => write!(f, "{} => {}", p.name, self.body),
            params => {
                let names: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
                write!(f, "({}) => {}", names.join(", "), self.body)
            }
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Root { element } => write!(f, "Root({})", element),
            Expr::Constant { value, .. } => write!(f, "{}", value),
            Expr::Param { name, .. } => write!(f, "{}", name),
            Expr::Member {
                target: Some(t),
                name,
                ..
            } => write!(f, "{}.{}", t, name),
            Expr::Member {
                target: None,
                name,
                owner,
                ..
            } => write!(f, "{}.{}", owner, name),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => write!(f, "!{}", operand),
            Expr::Unary {
                op: UnaryOp::Negate,
                operand,
            } => write!(f, "-{}", operand),
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => write!(f, "({} ? {} : {})", test, if_true, if_false),
            Expr::Convert { operand, ty } => write!(f, "({}){}", ty, operand),
            Expr::Lambda(lambda) => write!(f, "{}", lambda),
            Expr::New { ty, fields } => {
                write!(f, "new {} {{", ty)?;
                for (i, (name, e)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {} = {}", name, e)?;
                }
                write!(f, " }}")
            }
            Expr::Call { op, args, .. } => {
                let (source, rest) = match args.split_first() {
                    Some((s, r)) => (s.to_string(), r),
                    None => (String::new(), &[][..]),
                };
                let rest: Vec<String> = rest.iter().map(|a| a.to_string()).collect();
                write!(f, "{}.{}({})", source, op, rest.join(", "))
            }
            Expr::Invoke { function, args, .. } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", function, args.join(", "))
            }
        }
    }
}
