use thiserror::Error;

#[derive(Error, Debug)]
pub enum LineHashError {
    #[error("page array capacity overflow")]
    CapacityOverflow,
    #[error("page array allocation of {size} bytes failed")]
    Alloc { size: usize },
    #[error("page count {pages} exceeds the growth ceiling")]
    GrowthLimit { pages: usize },
}

pub type Result<T> = std::result::Result<T, LineHashError>;
