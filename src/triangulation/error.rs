use thiserror::Error;

///
/// All errors emitted while (re)building the regular triangulation.
///
/// - `Degenerate`: duplicate or collinear sites prevent a valid power
///   diagram from being constructed; the caller should clamp positions
///   and retry.
/// - `EmptyConfiguration`: a build was requested with no sites at all.
///
#[derive(Error, Debug)]
pub enum TriangulationError {
    #[error("degenerate triangulation: coincident or collinear sites prevent a valid power diagram")]
    Degenerate,

    #[error("cannot build a triangulation with no sites")]
    EmptyConfiguration,
}
