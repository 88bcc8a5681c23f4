use super::status::InterfaceStatus;
use crate::error::Result;

/// Produces the interfaces to monitor, e.g. from a parsed description document.
///
/// The result is a snapshot; re-running discovery replaces the list wholesale.
#[cfg_attr(test, mockall::automock)]
pub trait InterfaceSource: Send + Sync {
    fn prepare_information(&self) -> Result<Vec<InterfaceStatus>>;
}
