//! Errors raised while patching a page.

use thiserror::Error;

use web_platform::PlatformError;

/// Errors that can occur while installing or removing a patch
#[derive(Debug, Clone, Error)]
pub enum InterceptError {
    /// The page already carries this patch
    #[error("{0} interception is already installed on this page")]
    AlreadyInstalled(&'static str),
    /// Something else replaced the patch, so it cannot be restored
    #[error("{0} interception was replaced by another implementation")]
    Displaced(&'static str),
    /// The page is gone
    #[error("The page has been closed")]
    PageClosed,
    /// The host rejected an operation
    #[error(transparent)]
    Platform(#[from] PlatformError),
}
