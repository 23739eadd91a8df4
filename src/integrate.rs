//!
//! Closed-form integrators: the error function, the amplitude/mean/variance
//! of a product of two 1D Gaussians, and the dual-edge mass integral that
//! factors a 2D Gaussian line integral into a 1D one.
//!

/// Numerical approximation of the error function (Abramowitz & Stegun
/// 7.1.26, max absolute error ~1.5e-7). No `libm`/stats crate in the
/// teacher's or pack's dependency set reaches for anything heavier for a
/// single special function, so this is the idiomatic weight here.
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    let y = 1.0 - poly * (-x * x).exp();

    sign * y
}

/// ∫₀¹ exp(−½(t−μ)²/σ²) dt, computed via the error function. Guards against
/// `σ ≤ 0` by returning 0, per the integrators' numerical contract.
pub fn int01_gauss(mu: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return 0.0;
    }
    let sqrt2_sigma = std::f64::consts::SQRT_2 * sigma;
    let hi = erf((1.0 - mu) / sqrt2_sigma);
    let lo = erf((0.0 - mu) / sqrt2_sigma);
    sigma * (std::f64::consts::PI / 2.0).sqrt() * (hi - lo)
}

/// Amplitude of the product of two 1D Gaussians obtained by parameterizing
/// a dual edge `c_k + t·(a,b)` through the domain's 2D density and
/// factoring `ρ(x(t), y(t))` into `A · exp(−½(t−μ)²/σ²)`.
///
/// `(a, b)` is the edge direction `c_l − c_k`; `(mu_1, mu_2)` is the
/// density's mean relative to `c_k`. Completes the square on
/// `α t² + 2β t + γ` (`α = a²/σx²+b²/σy²`, `β = a·mu_1/σx²+b·mu_2/σy²`,
/// `γ = mu_1²/σx²+mu_2²/σy²`), so the amplitude carries the `β²/α` term
/// that the mean/variance split leaves behind.
pub fn product_gaussian_amplitude(
    a: f64,
    b: f64,
    mu_1: f64,
    mu_2: f64,
    sigma_x: f64,
    sigma_y: f64,
) -> f64 {
    if sigma_x <= 0.0 || sigma_y <= 0.0 {
        return 0.0;
    }
    let alpha = a * a / (sigma_x * sigma_x) + b * b / (sigma_y * sigma_y);
    let beta = a * mu_1 / (sigma_x * sigma_x) + b * mu_2 / (sigma_y * sigma_y);
    let gamma = mu_1 * mu_1 / (sigma_x * sigma_x) + mu_2 * mu_2 / (sigma_y * sigma_y);
    let correction = if alpha.abs() < 1e-15 { 0.0 } else { beta * beta / alpha };
    (-0.5 * (gamma - correction)).exp()
}

/// Mean (in edge-parameter space `t`) of the resulting 1D Gaussian.
pub fn product_gaussian_mean(a: f64, b: f64, mu_1: f64, mu_2: f64, sigma_x: f64, sigma_y: f64) -> f64 {
    if sigma_x <= 0.0 || sigma_y <= 0.0 {
        return 0.0;
    }
    let inv_var = a * a / (sigma_x * sigma_x) + b * b / (sigma_y * sigma_y);
    if inv_var.abs() < 1e-15 {
        return 0.0;
    }
    -(a * mu_1 / (sigma_x * sigma_x) + b * mu_2 / (sigma_y * sigma_y)) / inv_var
}

/// Variance (in edge-parameter space `t`) of the resulting 1D Gaussian.
pub fn product_gaussian_variance(a: f64, b: f64, _mu_1: f64, _mu_2: f64, sigma_x: f64, sigma_y: f64) -> f64 {
    if sigma_x <= 0.0 || sigma_y <= 0.0 {
        return 0.0;
    }
    let inv_var = a * a / (sigma_x * sigma_x) + b * b / (sigma_y * sigma_y);
    if inv_var.abs() < 1e-15 {
        return f64::INFINITY;
    }
    1.0 / inv_var
}

/// The integrated density mass along a dual edge of Euclidean length
/// `edge_length`, given the edge's endpoints relative to the domain mean
/// (`a`, `b`, `mu_1`, `mu_2` as produced by the caller) and the domain's
/// standard deviations. Returns 0 for degenerate (zero-length or
/// non-positive sigma) input, per spec's numerical contract.
pub fn dual_edge_mass(
    edge_length: f64,
    a: f64,
    b: f64,
    mu_1: f64,
    mu_2: f64,
    sigma_x: f64,
    sigma_y: f64,
    max_value: f64,
) -> f64 {
    if edge_length <= 0.0 || sigma_x <= 0.0 || sigma_y <= 0.0 {
        return 0.0;
    }
    let amplitude = product_gaussian_amplitude(a, b, mu_1, mu_2, sigma_x, sigma_y);
    let mu = product_gaussian_mean(a, b, mu_1, mu_2, sigma_x, sigma_y);
    let var = product_gaussian_variance(a, b, mu_1, mu_2, sigma_x, sigma_y);
    edge_length * max_value * amplitude * int01_gauss(mu, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erf_matches_known_values() {
        assert!((erf(0.0)).abs() < 1e-12);
        assert!((erf(1.0) - 0.8427007929).abs() < 1e-6);
        assert!((erf(-1.0) + 0.8427007929).abs() < 1e-6);
    }

    #[test]
    fn int01_gauss_nonpositive_sigma_is_zero() {
        assert_eq!(int01_gauss(0.5, 0.0), 0.0);
        assert_eq!(int01_gauss(0.5, -1.0), 0.0);
    }

    #[test]
    fn int01_gauss_wide_sigma_approaches_unit_length() {
        // A very large sigma makes the integrand ~1 over [0, 1].
        let v = int01_gauss(0.5, 1e6);
        assert!((v - 1.0).abs() < 1e-4);
    }

    #[test]
    fn dual_edge_mass_zero_length_is_zero() {
        assert_eq!(dual_edge_mass(0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0), 0.0);
    }
}
