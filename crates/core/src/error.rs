/// Errors raised by a [`DrugRepository`](crate::DrugRepository) implementation.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The backing store could not serve the call (connection, session or query failure).
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    RepositoryUnavailable(#[from] RepositoryError),
    #[error("failed to read catalogue file: {0}")]
    CatalogueRead(std::io::Error),
    #[error("invalid catalogue: {0}")]
    CatalogueParse(String),
}

pub type MatchResult<T> = std::result::Result<T, MatchError>;
