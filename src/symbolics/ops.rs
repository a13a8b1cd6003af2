//! Operator overloading. Every combination of `Expr`, `&Expr`, integers and
//! `Rational` goes through the canonical constructors.

use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

use super::{Expr, Rational};

fn add(a: Expr, b: Expr) -> Expr {
    Expr::add([a, b])
}

fn sub(a: Expr, b: Expr) -> Expr {
    Expr::add([a, -b])
}

fn mul(a: Expr, b: Expr) -> Expr {
    Expr::mul([a, b])
}

fn div(a: Expr, b: Expr) -> Expr {
    Expr::mul([a, Expr::power(b, Expr::number(-1))])
}

fn rem(a: Expr, b: Expr) -> Expr {
    a.modulo(b)
}

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $func:ident) => {
        impl $trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $func(self, rhs)
            }
        }

        impl $trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $func(self, rhs.clone())
            }
        }

        impl $trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $func(self.clone(), rhs)
            }
        }

        impl $trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $func(self.clone(), rhs.clone())
            }
        }

        impl_binop!(@scalar $trait, $method, $func, i32);
        impl_binop!(@scalar $trait, $method, $func, i64);
        impl_binop!(@scalar $trait, $method, $func, Rational);
    };
    (@scalar $trait:ident, $method:ident, $func:ident, $scalar:ty) => {
        impl $trait<$scalar> for Expr {
            type Output = Expr;
            fn $method(self, rhs: $scalar) -> Expr {
                $func(self, Expr::number(rhs))
            }
        }

        impl $trait<$scalar> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: $scalar) -> Expr {
                $func(self.clone(), Expr::number(rhs))
            }
        }

        impl $trait<Expr> for $scalar {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                $func(Expr::number(self), rhs)
            }
        }

        impl $trait<&Expr> for $scalar {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                $func(Expr::number(self), rhs.clone())
            }
        }
    };
}

impl_binop!(Add, add, add);
impl_binop!(Sub, sub, sub);
impl_binop!(Mul, mul, mul);
impl_binop!(Div, div, div);
impl_binop!(Rem, rem, rem);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::mul([Expr::number(-1), self])
    }
}

impl Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        -self.clone()
    }
}
