use thiserror::Error;

pub type BusResult<T> = Result<T, BusError>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("pub/sub bus is shut down")]
    Closed,

    #[error("pub/sub registry lock poisoned")]
    LockPoisoned,
}
