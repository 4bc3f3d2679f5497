use thiserror::Error;

use crate::{domain::error::DomainError, infra::error::InfraError};

use super::repos::RepoError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Infra(#[from] InfraError),
}
