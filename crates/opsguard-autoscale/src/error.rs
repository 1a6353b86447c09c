use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScaleError {
    #[error("target instances {target} outside allowed range [{min}, {max}]")]
    OutOfBounds { target: i64, min: u32, max: u32 },
}
