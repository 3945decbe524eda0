use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use courier_gateway::service::{HandlerFuture, handle_typed};
use courier_gateway::{Error, Gateway, HandlerError, Registration, ServiceDesc, Transport};
use tracing::debug;

use crate::{CHECK_PERMISSION, CheckPermissionRequest, CheckPermissionResponse, WORKER};

/// Handlers behind the staff queues.
///
/// Every method defaults to [`HandlerError::Unimplemented`].
#[async_trait]
pub trait StaffQueueService: Send + Sync + 'static {
    /// Answers a permission check.
    async fn check_permission(
        &self,
        _request: CheckPermissionRequest,
    ) -> Result<CheckPermissionResponse, HandlerError> {
        Err(HandlerError::Unimplemented("check_permission"))
    }
}

/// Staff service with no handlers wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnimplementedStaffServer;

impl StaffQueueService for UnimplementedStaffServer {}

/// Allows exactly the listed users, for any permission.
#[derive(Clone, Debug, Default)]
pub struct AllowListStaffServer {
    users: HashSet<String>,
}

impl AllowListStaffServer {
    /// Allows `users`.
    pub fn new<I, S>(users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl StaffQueueService for AllowListStaffServer {
    async fn check_permission(
        &self,
        request: CheckPermissionRequest,
    ) -> Result<CheckPermissionResponse, HandlerError> {
        if request.user.is_empty() {
            return Err(HandlerError::failed("user is required"));
        }

        let allowed = self.users.contains(&request.user);
        debug!(user = %request.user, permission = ?request.permission, allowed, "permission checked");

        Ok(CheckPermissionResponse { allowed })
    }
}

fn handle_check_permission(service: Arc<dyn StaffQueueService>, payload: Bytes) -> HandlerFuture {
    handle_typed(payload, move |request| async move {
        service.check_permission(request).await
    })
}

/// Queues served by a staff worker.
#[must_use]
pub fn service_desc() -> ServiceDesc<dyn StaffQueueService> {
    ServiceDesc::new(WORKER).queue(CHECK_PERMISSION, WORKER, handle_check_permission)
}

/// Registers `service` on every staff queue.
///
/// # Errors
///
/// Returns the first subscribe failure; queues registered before it stay live.
pub async fn register_server<T>(
    gateway: &Gateway<T>,
    service: Arc<dyn StaffQueueService>,
) -> Result<Registration, Error>
where
    T: Transport,
{
    gateway.register_server(service_desc(), service).await
}
