use thiserror::Error;

///
/// All errors emitted when configuring the domain.
///
/// - `NonPositiveExtent`: when the requested pixel grid has zero or
///   negative width/height.
/// - `NonPositiveSigma`: when either Gaussian standard deviation is not
///   strictly positive.
/// - `InvalidMaxValue`: when the peak density value is negative, NaN or
///   infinite.
///
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("domain extent must be positive, got width={width} height={height}")]
    NonPositiveExtent { width: u32, height: u32 },

    #[error("standard deviations must be positive, got sigma_x={sigma_x} sigma_y={sigma_y}")]
    NonPositiveSigma { sigma_x: f64, sigma_y: f64 },

    #[error("peak density value must be finite and non-negative, got {0}")]
    InvalidMaxValue(f64),
}
