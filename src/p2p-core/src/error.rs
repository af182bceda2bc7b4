// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

/// Error type returned by P2P controller operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum P2pError {
    /// Bad handle, unknown tag, unattached interface or malformed body.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Cookie does not reference a live context.
    #[error("not found: {0}")]
    NotFound(String),

    /// Queue or table is full.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The scan engine or management layer rejected a request.
    #[error("engine failure: {0}")]
    Engine(String),

    /// Operation is not valid for the current lifecycle or timer state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The controller task has shut down.
    #[error("p2p controller is closed")]
    Closed,
}

pub type P2pResult<T> = Result<T, P2pError>;

impl P2pError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Errors that may clear up if the same request is issued again later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ResourceExhausted(_) | Self::Engine(_))
    }
}
