use std::fmt;

use super::{Expr, ExprKind, Rational};

fn precedence(e: &Expr) -> u8 {
    match e.kind() {
        ExprKind::Add(_) | ExprKind::Relational(..) => 1,
        ExprKind::Mul(_) => 2,
        ExprKind::Number(r) if !r.is_integer() || r.is_negative() => 2,
        ExprKind::Pow(..) => 3,
        _ => 4,
    }
}

fn parenthesize(f: &mut fmt::Formatter<'_>, e: &Expr, above: u8) -> fmt::Result {
    if precedence(e) <= above {
        write!(f, "({})", e)
    } else {
        write!(f, "{}", e)
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Number(r) => write!(f, "{}", r),
            ExprKind::Symbol(s) => write!(f, "{}", s),
            ExprKind::Dimension(d) => write!(f, "{}", d),
            ExprKind::Function { function, indices } => {
                write!(f, "{}(", function.name())?;
                join(f, indices)?;
                f.write_str(")")
            }
            ExprKind::Indexed { function, indices } => {
                write!(f, "{}[", function.name())?;
                join(f, indices)?;
                f.write_str("]")
            }
            ExprKind::Add(terms) => {
                // constants print last: `x - 1`, not `-1 + x`
                let ordered = terms
                    .iter()
                    .filter(|t| !t.is_number())
                    .chain(terms.iter().filter(|t| t.is_number()));
                for (i, term) in ordered.enumerate() {
                    let (coeff, _) = term.as_coeff_mul();
                    if i == 0 {
                        write!(f, "{}", term)?;
                    } else if coeff.is_negative() {
                        write!(f, " - {}", -term)?;
                    } else {
                        write!(f, " + {}", term)?;
                    }
                }
                Ok(())
            }
            ExprKind::Mul(_) => {
                let (coeff, rest) = self.as_coeff_mul();
                let factors: Vec<Expr> = match rest.kind() {
                    ExprKind::Mul(fs) => fs.clone(),
                    _ => vec![rest.clone()],
                };
                if coeff == Rational::MINUS_ONE {
                    f.write_str("-")?;
                } else if !coeff.is_one() {
                    write!(f, "{}*", coeff)?;
                }
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        f.write_str("*")?;
                    }
                    parenthesize(f, factor, 2)?;
                }
                Ok(())
            }
            ExprKind::Pow(b, e) => {
                parenthesize(f, b, 3)?;
                f.write_str("**")?;
                parenthesize(f, e, 3)
            }
            ExprKind::Mod(a, b) => write!(f, "Mod({}, {})", a, b),
            ExprKind::Floor(a) => write!(f, "floor({})", a),
            ExprKind::Derivative(d) => write!(f, "{}", d),
            ExprKind::ListInitializer(items) => {
                f.write_str("{")?;
                join(f, items)?;
                f.write_str("}")
            }
            ExprKind::Relational(op, a, b) => write!(f, "{} {} {}", a, op.symbol(), b),
        }
    }
}
