//! Staff permission queue: a sample service built on the gateway.
//!
//! Workers implement [`StaffQueueService`] and register it with
//! [`register_server`]; callers use [`StaffClient`].
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod messages;
mod server;

pub use client::StaffClient;
pub use messages::{CheckPermissionRequest, CheckPermissionResponse};
pub use server::{
    AllowListStaffServer, StaffQueueService, UnimplementedStaffServer, register_server,
    service_desc,
};

/// Queue group shared by every staff worker.
pub const WORKER: &str = "staff";

/// Subject of the permission check queue.
pub const CHECK_PERMISSION: &str = "staff:check.permission";
