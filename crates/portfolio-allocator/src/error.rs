use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Cannot build portfolios from an empty universe")]
    EmptyUniverse,
}
