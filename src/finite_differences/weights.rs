use crate::error::{Error, Result};
use crate::symbolics::Rational;

/// Fornberg's recursion: weights of the `deriv_order`-th derivative at `z`
/// over the (distinct) sample `points`. Exact over rationals; fails if an
/// intermediate value leaves the `i128` range.
pub fn fornberg(deriv_order: usize, points: &[Rational], z: Rational) -> Result<Vec<Rational>> {
    let overflow = || Error::WeightOverflow {
        deriv_order,
        points: points.len(),
    };
    let n = points.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let m = deriv_order;
    let mut c = vec![vec![Rational::ZERO; m + 1]; n];
    let mut c1 = Rational::ONE;
    let mut c4 = points[0].checked_sub(z).ok_or_else(overflow)?;
    c[0][0] = Rational::ONE;

    for i in 1..n {
        let mn = i.min(m);
        let mut c2 = Rational::ONE;
        let c5 = c4;
        c4 = points[i].checked_sub(z).ok_or_else(overflow)?;
        for j in 0..i {
            let c3 = points[i].checked_sub(points[j]).ok_or_else(overflow)?;
            c2 = c2.checked_mul(c3).ok_or_else(overflow)?;
            if j == i - 1 {
                let ratio = c1.checked_div(c2).ok_or_else(overflow)?;
                for k in (1..=mn).rev() {
                    let kr = Rational::integer(k as i64);
                    c[i][k] = kr
                        .checked_mul(c[i - 1][k - 1])
                        .and_then(|a| a.checked_sub(c5.checked_mul(c[i - 1][k])?))
                        .and_then(|a| a.checked_mul(ratio))
                        .ok_or_else(overflow)?;
                }
                c[i][0] = c5
                    .checked_mul(c[i - 1][0])
                    .and_then(|a| a.checked_mul(ratio))
                    .and_then(Rational::checked_neg)
                    .ok_or_else(overflow)?;
            }
            for k in (1..=mn).rev() {
                let kr = Rational::integer(k as i64);
                c[j][k] = c4
                    .checked_mul(c[j][k])
                    .and_then(|a| a.checked_sub(kr.checked_mul(c[j][k - 1])?))
                    .and_then(|a| a.checked_div(c3))
                    .ok_or_else(overflow)?;
            }
            c[j][0] = c4
                .checked_mul(c[j][0])
                .and_then(|a| a.checked_div(c3))
                .ok_or_else(overflow)?;
        }
        c1 = c2;
    }

    Ok(c.into_iter().map(|row| row[m]).collect())
}
