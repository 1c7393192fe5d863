//! Small helpers over fixed-size `[f64; DIM]` vectors.

/// Fixed spatial dimension (3D).
pub const DIM: usize = 3;

pub type Vector = [f64; DIM];

pub const ZERO: Vector = [0.0; DIM];

#[inline]
pub fn dot(a: &Vector, b: &Vector) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn squared(a: &Vector) -> f64 {
    dot(a, a)
}

/// `a - b`
#[inline]
pub fn sub(a: &Vector, b: &Vector) -> Vector {
    let mut out = ZERO;
    for (k, o) in out.iter_mut().enumerate() {
        *o = a[k] - b[k];
    }
    out
}

/// `a += s * b`
#[inline]
pub fn add_scaled(a: &mut Vector, s: f64, b: &Vector) {
    for (ak, bk) in a.iter_mut().zip(b.iter()) {
        *ak += s * bk;
    }
}

/// `s * a`
#[inline]
pub fn scaled(s: f64, a: &Vector) -> Vector {
    let mut out = *a;
    out.iter_mut().for_each(|x| *x *= s);
    out
}

#[inline]
pub fn is_finite(a: &Vector) -> bool {
    a.iter().all(|x| x.is_finite())
}
