//! Backends that turn an [`Environment`] specification into a running sandbox.

use super::Environment;
use crate::error::EnvError;
use bytes::Bytes;
use std::future::Future;

/// A container backend.
///
/// `materialize` runs every exec step of the specification in order and stops
/// at the first step that fails under [`Expect::Success`](super::Expect).
/// Dropping the returned future cancels the run: in-flight processes are
/// killed and the partial sandbox is discarded.
pub trait Engine: Send + Sync + 'static {
    /// Handle to a realised environment
    type Handle: Realized;

    fn materialize(
        &self,
        env: &Environment,
    ) -> impl Future<Output = Result<Self::Handle, EnvError>> + Send;
}

/// A realised environment whose last exec step has completed.
///
/// The sandbox lives as long as the handle; dropping it discards the sandbox.
pub trait Realized: Send + Sync {
    /// Stdout of the last exec step
    fn stdout(&self) -> &str;

    /// Stderr of the last exec step
    fn stderr(&self) -> &str;

    /// Exit code of the last exec step (`None` if there were no steps)
    fn exit_code(&self) -> Option<i32>;

    /// Read a regular file from inside the environment
    fn read_file(&self, path: &str) -> impl Future<Output = Result<Bytes, EnvError>> + Send;
}
