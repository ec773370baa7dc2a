//! A small AST for generated device source.
//!
//! Kernel bodies are built as trees of [`Stmt`] and [`Expr`] and rendered
//! by one printer, so indexing arithmetic is constructed structurally
//! instead of by string pasting. The printer parenthesizes every compound
//! operand; generated source favors correctness over prettiness.

use std::fmt;
use std::ops;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Num(usize),
    Raw(String),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Mod(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, &'static str),
    Call(String, Vec<Expr>),
    /// Read of a global buffer element, routed through the load callback.
    LoadGlobal(Box<Expr>, Box<Expr>),
}

pub fn ident(name: impl Into<String>) -> Expr {
    Expr::Ident(name.into())
}

pub fn num(value: usize) -> Expr {
    Expr::Num(value)
}

pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
    Expr::Call(name.into(), args)
}

impl Expr {
    pub fn index(self, idx: Expr) -> Expr {
        Expr::Index(Box::new(self), Box::new(idx))
    }

    pub fn member(self, field: &'static str) -> Expr {
        Expr::Member(Box::new(self), field)
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        Expr::Lt(Box::new(self), Box::new(rhs))
    }

    pub fn ge(self, rhs: Expr) -> Expr {
        Expr::Ge(Box::new(self), Box::new(rhs))
    }

    pub fn eq(self, rhs: Expr) -> Expr {
        Expr::Eq(Box::new(self), Box::new(rhs))
    }

    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    fn is_atom(&self) -> bool {
        matches!(
            self,
            Expr::Ident(_) | Expr::Num(_) | Expr::Raw(_) | Expr::Index(..) | Expr::Member(..) | Expr::Call(..)
        )
    }
}

impl ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

impl ops::Rem for Expr {
    type Output = Expr;
    fn rem(self, rhs: Expr) -> Expr {
        Expr::Mod(Box::new(self), Box::new(rhs))
    }
}

fn paren(f: &mut fmt::Formatter<'_>, e: &Expr) -> fmt::Result {
    if e.is_atom() {
        write!(f, "{e}")
    } else {
        write!(f, "({e})")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(n) => write!(f, "{n}"),
            Expr::Num(v) => write!(f, "{v}"),
            Expr::Raw(s) => write!(f, "{s}"),
            Expr::Add(a, b) => {
                paren(f, a)?;
                write!(f, " + ")?;
                paren(f, b)
            }
            Expr::Sub(a, b) => {
                paren(f, a)?;
                write!(f, " - ")?;
                paren(f, b)
            }
            Expr::Mul(a, b) => {
                paren(f, a)?;
                write!(f, " * ")?;
                paren(f, b)
            }
            Expr::Div(a, b) => {
                paren(f, a)?;
                write!(f, " / ")?;
                paren(f, b)
            }
            Expr::Mod(a, b) => {
                paren(f, a)?;
                write!(f, " % ")?;
                paren(f, b)
            }
            Expr::Lt(a, b) => {
                paren(f, a)?;
                write!(f, " < ")?;
                paren(f, b)
            }
            Expr::Ge(a, b) => {
                paren(f, a)?;
                write!(f, " >= ")?;
                paren(f, b)
            }
            Expr::Eq(a, b) => {
                paren(f, a)?;
                write!(f, " == ")?;
                paren(f, b)
            }
            Expr::And(a, b) => {
                paren(f, a)?;
                write!(f, " && ")?;
                paren(f, b)
            }
            Expr::Not(a) => {
                write!(f, "!")?;
                paren(f, a)
            }
            Expr::Ternary(c, a, b) => {
                paren(f, c)?;
                write!(f, " ? ")?;
                paren(f, a)?;
                write!(f, " : ")?;
                paren(f, b)
            }
            Expr::Index(a, i) => {
                paren(f, a)?;
                write!(f, "[{i}]")
            }
            Expr::Member(a, m) => {
                paren(f, a)?;
                write!(f, ".{m}")
            }
            Expr::Call(name, args) => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Expr::LoadGlobal(buf, idx) => {
                write!(f, "load_global({buf}, {idx}, load_cb_fn, load_cb_data)")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Decl {
        ty: String,
        name: String,
        array: Option<usize>,
        init: Option<Expr>,
    },
    Assign(Expr, Expr),
    AddAssign(Expr, Expr),
    ModAssign(Expr, Expr),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    For {
        var: String,
        init: Expr,
        cond: Expr,
        body: Vec<Stmt>,
    },
    CallStmt(String, Vec<Expr>),
    /// Write of a global buffer element, routed through the store callback.
    StoreGlobal {
        buf: Expr,
        idx: Expr,
        value: Expr,
    },
    SyncThreads,
    Return,
    Comment(String),
    Blank,
    Raw(String),
}

pub fn decl(ty: &str, name: &str) -> Stmt {
    Stmt::Decl {
        ty: ty.to_string(),
        name: name.to_string(),
        array: None,
        init: None,
    }
}

pub fn decl_init(ty: &str, name: &str, init: Expr) -> Stmt {
    Stmt::Decl {
        ty: ty.to_string(),
        name: name.to_string(),
        array: None,
        init: Some(init),
    }
}

pub fn decl_array(ty: &str, name: &str, len: usize) -> Stmt {
    Stmt::Decl {
        ty: ty.to_string(),
        name: name.to_string(),
        array: Some(len),
        init: None,
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, stmts: &[Stmt], indent: usize) -> fmt::Result {
    for s in stmts {
        write_stmt(f, s, indent)?;
    }
    Ok(())
}

fn write_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, indent: usize) -> fmt::Result {
    let pad = "    ".repeat(indent);
    match stmt {
        Stmt::Decl {
            ty,
            name,
            array,
            init,
        } => {
            write!(f, "{pad}{ty} {name}")?;
            if let Some(n) = array {
                write!(f, "[{n}]")?;
            }
            if let Some(e) = init {
                write!(f, " = {e}")?;
            }
            writeln!(f, ";")
        }
        Stmt::Assign(lhs, rhs) => writeln!(f, "{pad}{lhs} = {rhs};"),
        Stmt::AddAssign(lhs, rhs) => writeln!(f, "{pad}{lhs} += {rhs};"),
        Stmt::ModAssign(lhs, rhs) => writeln!(f, "{pad}{lhs} %= {rhs};"),
        Stmt::If {
            cond,
            then,
            otherwise,
        } => {
            writeln!(f, "{pad}if({cond})")?;
            writeln!(f, "{pad}{{")?;
            write_block(f, then, indent + 1)?;
            writeln!(f, "{pad}}}")?;
            if !otherwise.is_empty() {
                writeln!(f, "{pad}else")?;
                writeln!(f, "{pad}{{")?;
                write_block(f, otherwise, indent + 1)?;
                writeln!(f, "{pad}}}")?;
            }
            Ok(())
        }
        Stmt::For {
            var,
            init,
            cond,
            body,
        } => {
            writeln!(f, "{pad}for(unsigned int {var} = {init}; {cond}; ++{var})")?;
            writeln!(f, "{pad}{{")?;
            write_block(f, body, indent + 1)?;
            writeln!(f, "{pad}}}")
        }
        Stmt::CallStmt(name, args) => {
            write!(f, "{pad}{name}(")?;
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{a}")?;
            }
            writeln!(f, ");")
        }
        Stmt::StoreGlobal { buf, idx, value } => {
            writeln!(
                f,
                "{pad}store_global({buf}, {idx}, {value}, store_cb_fn, store_cb_data);"
            )
        }
        Stmt::SyncThreads => writeln!(f, "{pad}__syncthreads();"),
        Stmt::Return => writeln!(f, "{pad}return;"),
        Stmt::Comment(c) => writeln!(f, "{pad}// {c}"),
        Stmt::Blank => writeln!(f),
        Stmt::Raw(s) => writeln!(f, "{pad}{s}"),
    }
}

/// A generated device or global function.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub qualifier: &'static str,
    pub launch_bounds: Option<usize>,
    /// `(type, name)` pairs.
    pub args: Vec<(String, String)>,
    pub body: Vec<Stmt>,
}

impl Function {
    pub fn device(name: impl Into<String>) -> Function {
        Function {
            name: name.into(),
            qualifier: "__device__ void",
            launch_bounds: None,
            args: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn global(name: impl Into<String>, launch_bounds: usize) -> Function {
        Function {
            name: name.into(),
            qualifier: "__global__ void",
            launch_bounds: Some(launch_bounds),
            args: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn arg(mut self, ty: &str, name: &str) -> Function {
        self.args.push((ty.to_string(), name.to_string()));
        self
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualifier)?;
        if let Some(lb) = self.launch_bounds {
            write!(f, " __launch_bounds__({lb})")?;
        }
        writeln!(f, " {}(", self.name)?;
        for (i, (ty, name)) in self.args.iter().enumerate() {
            let sep = if i + 1 == self.args.len() { "" } else { "," };
            writeln!(f, "    {ty} {name}{sep}")?;
        }
        writeln!(f, ")")?;
        writeln!(f, "{{")?;
        write_block(f, &self.body, 1)?;
        writeln!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expressions_parenthesize_compound_operands() {
        let e = (ident("a") + ident("b")) * num(4);
        assert_eq!(e.to_string(), "(a + b) * 4");
        let idx = ident("lds").index(ident("offset") + ident("t") % num(8));
        assert_eq!(idx.to_string(), "lds[offset + (t % 8)]");
    }

    #[test]
    fn statements_render_with_indentation() {
        let mut f = Function::device("demo");
        f.body.push(decl_init("size_t", "t", ident("threadIdx.x") % num(16)));
        f.body.push(Stmt::If {
            cond: ident("write").and(ident("t").lt(num(8))),
            then: vec![Stmt::Assign(
                ident("R").index(num(0)),
                ident("lds").index(ident("t")),
            )],
            otherwise: vec![],
        });
        let text = f.to_string();
        assert!(text.contains("__device__ void demo("));
        assert!(text.contains("    size_t t = threadIdx.x % 16;"));
        assert!(text.contains("    if(write && (t < 8))"));
        assert!(text.contains("        R[0] = lds[t];"));
    }

    #[test]
    fn global_function_carries_launch_bounds() {
        let f = Function::global("kern", 256)
            .arg("const scalar_type*", "twiddles")
            .arg("scalar_type*", "buf");
        let text = f.to_string();
        assert!(text.contains("__global__ void __launch_bounds__(256) kern("));
        assert!(text.contains("    const scalar_type* twiddles,"));
        assert!(text.contains("    scalar_type* buf\n"));
    }

    #[test]
    fn load_store_global_route_through_callbacks() {
        let load = Expr::LoadGlobal(Box::new(ident("buf")), Box::new(ident("idx")));
        assert_eq!(
            load.to_string(),
            "load_global(buf, idx, load_cb_fn, load_cb_data)"
        );
        let mut s = String::new();
        use std::fmt::Write as _;
        let stmt = Stmt::StoreGlobal {
            buf: ident("buf"),
            idx: ident("idx"),
            value: ident("R").index(num(2)),
        };
        let f = Function {
            name: "x".into(),
            qualifier: "__device__ void",
            launch_bounds: None,
            args: vec![],
            body: vec![stmt],
        };
        write!(s, "{f}").unwrap();
        assert!(s.contains("store_global(buf, idx, R[2], store_cb_fn, store_cb_data);"));
    }
}
