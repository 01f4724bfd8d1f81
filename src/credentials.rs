//! Run a unit of work under the process identity or an alternate account.
//!
//! Impersonation is scoped: the [`ImpersonationGuard`] returned by an
//! [`Impersonator`] restores the original identity when dropped, so the
//! identity is put back whether the work succeeds, fails, or its future is
//! dropped mid-flight.

use std::future::Future;

use tracing::debug;

use crate::error::SqlTaskError;

/// An account given as `domain\username`.
#[derive(Clone, PartialEq, Eq)]
pub struct DomainAccount {
    pub domain: String,
    pub username: String,
}

impl DomainAccount {
    /// Split `domain\username`.
    ///
    /// # Errors
    /// Returns `SqlTaskError::ConfigError` unless there is exactly one `\`
    /// with text on both sides.
    pub fn parse(value: &str) -> Result<Self, SqlTaskError> {
        let mut parts = value.split('\\');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(domain), Some(username), None) if !domain.is_empty() && !username.is_empty() => {
                Ok(Self {
                    domain: domain.to_string(),
                    username: username.to_string(),
                })
            }
            _ => Err(SqlTaskError::ConfigError(format!(
                "username must be of format domain\\username, was: {value}"
            ))),
        }
    }
}

impl std::fmt::Debug for DomainAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\\{}", self.domain, self.username)
    }
}

/// Restores the original identity when dropped.
#[must_use = "the identity is restored as soon as the guard is dropped"]
pub struct ImpersonationGuard {
    restore: Option<Box<dyn FnOnce() + Send>>,
}

impl ImpersonationGuard {
    pub fn new(restore: impl FnOnce() + Send + 'static) -> Self {
        Self {
            restore: Some(Box::new(restore)),
        }
    }
}

impl Drop for ImpersonationGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

/// Switches the identity used for outbound work.
///
/// Implementations must keep the switched identity in effect for the calling
/// task until the guard is dropped, even when the task moves between threads.
pub trait Impersonator: Send + Sync {
    /// Begin impersonating `account`.
    ///
    /// # Errors
    /// Returns `SqlTaskError::PlatformUnsupported` when the platform cannot
    /// impersonate, or `SqlTaskError::ConfigError` when the logon is refused.
    fn impersonate(
        &self,
        account: &DomainAccount,
        password: &str,
    ) -> Result<ImpersonationGuard, SqlTaskError>;
}

/// The impersonator used when the host does not supply one.
///
/// It refuses every request with `PlatformUnsupported`, on Windows as well:
/// logging on as another account needs raw Win32 calls (`LogonUserW`,
/// `ImpersonateLoggedOnUser`, `RevertToSelf`) and this crate forbids unsafe
/// code. Windows hosts that need alternate credentials must implement
/// [`Impersonator`] themselves and pass it to
/// [`SqlTasks::new`](crate::tasks::SqlTasks::new):
///
/// ```
/// use mssql_tasks::credentials::{DomainAccount, ImpersonationGuard, Impersonator};
/// use mssql_tasks::SqlTaskError;
///
/// struct HostLogon;
///
/// impl Impersonator for HostLogon {
///     fn impersonate(
///         &self,
///         _account: &DomainAccount,
///         _password: &str,
///     ) -> Result<ImpersonationGuard, SqlTaskError> {
///         // LogonUserW + ImpersonateLoggedOnUser go here.
///         Ok(ImpersonationGuard::new(|| {
///             // RevertToSelf
///         }))
///     }
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformImpersonator;

impl Impersonator for PlatformImpersonator {
    fn impersonate(
        &self,
        account: &DomainAccount,
        _password: &str,
    ) -> Result<ImpersonationGuard, SqlTaskError> {
        let reason = if cfg!(windows) {
            "no Windows logon provider is configured for this host"
        } else {
            "impersonation is only supported on Windows hosts"
        };
        Err(SqlTaskError::PlatformUnsupported(format!(
            "cannot run as {account:?}: {reason}"
        )))
    }
}

/// Run `work` directly, or under `credentials` when they are given.
///
/// The username is validated before anything else, so a malformed account is
/// reported the same way on every platform.
///
/// # Errors
/// Returns the impersonation error, or whatever `work` returns.
pub async fn run_as<I, F, T>(
    impersonator: &I,
    credentials: Option<(&str, &str)>,
    work: F,
) -> Result<T, SqlTaskError>
where
    I: Impersonator + ?Sized,
    F: Future<Output = Result<T, SqlTaskError>>,
{
    let Some((username, password)) = credentials else {
        return work.await;
    };

    let account = DomainAccount::parse(username)?;
    let guard = impersonator.impersonate(&account, password)?;
    debug!(account = ?account, "running under alternate credentials");
    let result = work.await;
    drop(guard);
    result
}
