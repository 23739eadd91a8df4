//!
//! Rectangular sampling domain carrying a continuous 2D Gaussian density,
//! optionally invertible.
//!

pub mod error;

pub use error::DomainError;

use crate::geometry::Point;
use crate::integrate::erf;
use getset::CopyGetters;
use serde::{Deserialize, Serialize};

/// Serializable snapshot of a domain's configuration, matching the
/// teacher's `DrawParameters: Serialize + Deserialize` convention so a
/// run's domain setup can be persisted and replayed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DomainConfig {
    pub mu_x: f64,
    pub mu_y: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub width: u32,
    pub height: u32,
    pub max_value: f64,
    pub inverted: bool,
}

impl From<&Domain> for DomainConfig {
    fn from(d: &Domain) -> Self {
        Self {
            mu_x: d.mu_x,
            mu_y: d.mu_y,
            sigma_x: d.sigma_x,
            sigma_y: d.sigma_y,
            width: d.width,
            height: d.height,
            max_value: d.max_value,
            inverted: d.inverted,
        }
    }
}

impl TryFrom<DomainConfig> for Domain {
    type Error = DomainError;

    fn try_from(config: DomainConfig) -> Result<Self, DomainError> {
        let mut domain = Domain::new();
        domain.set(config.mu_x, config.mu_y, config.sigma_x, config.sigma_y, config.width, config.height, config.max_value)?;
        if config.inverted {
            domain.toggle_invert();
        }
        Ok(domain)
    }
}

///
/// The sampling domain: a `width × height` pixel grid centered at
/// `(mu_x, mu_y)` in continuous coordinates, carrying a Gaussian density
/// with standard deviations `(sigma_x, sigma_y)` and peak `max_value`.
///
/// Continuous coordinates are centered at `(mu_x, mu_y)`; pixel centers lie
/// on a regular unit-step grid spanning
/// `[mu_x − dx, mu_x + dx] × [mu_y − dy, mu_y + dy]`.
///
#[derive(Debug, Clone, Copy, CopyGetters)]
pub struct Domain {
    #[getset(get_copy = "pub")]
    mu_x: f64,
    #[getset(get_copy = "pub")]
    mu_y: f64,
    #[getset(get_copy = "pub")]
    sigma_x: f64,
    #[getset(get_copy = "pub")]
    sigma_y: f64,
    #[getset(get_copy = "pub")]
    width: u32,
    #[getset(get_copy = "pub")]
    height: u32,
    #[getset(get_copy = "pub")]
    max_value: f64,
    inverted: bool,
}

impl Default for Domain {
    fn default() -> Self {
        Self {
            mu_x: 0.0,
            mu_y: 0.0,
            sigma_x: 1.0,
            sigma_y: 1.0,
            width: 0,
            height: 0,
            max_value: 0.0,
            inverted: false,
        }
    }
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Half-extent in x: `width / 2`.
    pub fn dx(&self) -> f64 {
        self.width as f64 / 2.0
    }

    /// Half-extent in y: `height / 2`.
    pub fn dy(&self) -> f64 {
        self.height as f64 / 2.0
    }

    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn set(
        &mut self,
        mu_x: f64,
        mu_y: f64,
        sigma_x: f64,
        sigma_y: f64,
        width: u32,
        height: u32,
        max_value: f64,
    ) -> Result<(), DomainError> {
        if width == 0 || height == 0 {
            return Err(DomainError::NonPositiveExtent { width, height });
        }
        if sigma_x <= 0.0 || sigma_y <= 0.0 {
            return Err(DomainError::NonPositiveSigma { sigma_x, sigma_y });
        }
        if !max_value.is_finite() || max_value < 0.0 {
            return Err(DomainError::InvalidMaxValue(max_value));
        }

        self.mu_x = mu_x;
        self.mu_y = mu_y;
        self.sigma_x = sigma_x;
        self.sigma_y = sigma_y;
        self.width = width;
        self.height = height;
        self.max_value = max_value;
        Ok(())
    }

    pub fn toggle_invert(&mut self) {
        self.inverted = !self.inverted;
    }

    /// Lower-left corner of the domain rectangle, in continuous coordinates.
    pub fn min_corner(&self) -> Point {
        Point::new(self.mu_x - self.dx(), self.mu_y - self.dy())
    }

    /// Upper-right corner of the domain rectangle, in continuous coordinates.
    pub fn max_corner(&self) -> Point {
        Point::new(self.mu_x + self.dx(), self.mu_y + self.dy())
    }

    pub fn contains(&self, p: Point) -> bool {
        let min = self.min_corner();
        let max = self.max_corner();
        p.x >= min.x - 1e-9 && p.x <= max.x + 1e-9 && p.y >= min.y - 1e-9 && p.y <= max.y + 1e-9
    }

    /// Pointwise density at continuous `(x, y)`, clamped/inverted as
    /// configured.
    pub fn density_at(&self, x: f64, y: f64) -> f64 {
        let dx2 = (x - self.mu_x).powi(2) / (self.sigma_x * self.sigma_x);
        let dy2 = (y - self.mu_y).powi(2) / (self.sigma_y * self.sigma_y);
        let gaussian = self.max_value * (-0.5 * (dx2 + dy2)).exp();
        if self.inverted {
            (self.max_value - gaussian).max(0.0)
        } else {
            gaussian
        }
    }

    /// `∫∫ ρ` over the domain rectangle, via the closed-form product of two
    /// 1D Gaussian integrals (each a difference of error functions).
    pub fn integral(&self) -> f64 {
        let gaussian_integral = self.max_value
            * self.axis_integral(self.dx(), self.sigma_x)
            * self.axis_integral(self.dy(), self.sigma_y);
        if self.inverted {
            (self.max_value * self.width as f64 * self.height as f64 - gaussian_integral).max(0.0)
        } else {
            gaussian_integral
        }
    }

    /// `∫_{-half}^{half} Vmax · exp(−u²/2σ²) du`, one axis of the separable
    /// 2D Gaussian integral; `integral()` multiplies the two axes together.
    fn axis_integral(&self, half_extent: f64, sigma: f64) -> f64 {
        sigma * (2.0 * std::f64::consts::PI).sqrt() * erf(half_extent / (sigma * std::f64::consts::SQRT_2))
    }

    /// Iterates pixel centers `(x, y)` in continuous coordinates, row-major,
    /// in index order (spec §5 "Ordering").
    pub fn pixel_centers(&self) -> impl Iterator<Item = (u32, u32, Point)> + '_ {
        let min = self.min_corner();
        (0..self.height).flat_map(move |j| {
            (0..self.width).map(move |i| {
                let x = min.x + i as f64 + 0.5;
                let y = min.y + j as f64 + 0.5;
                (i, j, Point::new(x, y))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_config_round_trips() {
        let mut d = Domain::new();
        d.set(1.0, -2.0, 3.0, 4.0, 10, 20, 2.5).unwrap();
        d.toggle_invert();
        let config = DomainConfig::from(&d);
        let rebuilt = Domain::try_from(config).unwrap();
        assert_eq!(rebuilt.mu_x(), d.mu_x());
        assert_eq!(rebuilt.is_inverted(), d.is_inverted());
    }

    #[test]
    fn set_rejects_nonpositive_extent() {
        let mut d = Domain::new();
        assert!(matches!(
            d.set(0.0, 0.0, 1.0, 1.0, 0, 10, 1.0),
            Err(DomainError::NonPositiveExtent { .. })
        ));
    }

    #[test]
    fn set_rejects_nonpositive_sigma() {
        let mut d = Domain::new();
        assert!(matches!(
            d.set(0.0, 0.0, 0.0, 1.0, 10, 10, 1.0),
            Err(DomainError::NonPositiveSigma { .. })
        ));
    }

    #[test]
    fn integral_matches_pixelwise_sum_for_broad_gaussian() {
        let mut d = Domain::new();
        d.set(0.0, 0.0, 1e6, 1e6, 32, 32, 2.0).unwrap();
        let closed_form = d.integral();
        let pixel_sum: f64 = d.pixel_centers().map(|(_, _, p)| d.density_at(p.x, p.y)).sum();
        assert!((closed_form - pixel_sum).abs() / pixel_sum < 1e-3);
    }

    #[test]
    fn toggle_invert_flips_the_integral_relationship() {
        let mut d = Domain::new();
        d.set(0.0, 0.0, 2.0, 2.0, 16, 16, 1.0).unwrap();
        let normal = d.integral();
        d.toggle_invert();
        let inverted = d.integral();
        let uniform_total = d.max_value() * d.width() as f64 * d.height() as f64;
        assert!((normal + inverted - uniform_total).abs() < 1e-6);
    }
}
