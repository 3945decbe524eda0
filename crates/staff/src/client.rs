use courier_gateway::{Error, Gateway, Transport};

use crate::{CHECK_PERMISSION, CheckPermissionRequest, CheckPermissionResponse};

/// Typed client for the staff queues.
#[derive(Clone, Debug)]
pub struct StaffClient<T>
where
    T: Transport,
{
    gateway: Gateway<T>,
}

impl<T> StaffClient<T>
where
    T: Transport,
{
    /// Creates a client sharing `gateway`'s connection and namespace.
    pub const fn new(gateway: Gateway<T>) -> Self {
        Self { gateway }
    }

    /// Asks a staff worker whether the request's user is allowed.
    ///
    /// # Errors
    ///
    /// Returns the gateway error, including [`Error::Application`] when the
    /// worker rejects the request.
    pub async fn check_permission(
        &self,
        request: &CheckPermissionRequest,
    ) -> Result<CheckPermissionResponse, Error> {
        self.gateway.call(CHECK_PERMISSION, request).await
    }
}
