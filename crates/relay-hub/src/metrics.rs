//! Metric names recorded through the `metrics` facade.
//!
//! No recorder is installed here; embedding applications choose an
//! exporter. Without one every call is a no-op.

/// Connections that completed setup (counter, labels: side).
pub const CONNECTIONS_OPENED_TOTAL: &str = "relay_connections_opened_total";
/// Connections whose duties both ended (counter, labels: side).
pub const CONNECTIONS_CLOSED_TOTAL: &str = "relay_connections_closed_total";
/// Live connections (gauge, labels: side).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Inbound data frames read (counter, labels: side).
pub const MESSAGES_RECEIVED_TOTAL: &str = "relay_messages_received_total";
/// Outbound data frames written (counter, labels: side).
pub const FRAMES_WRITTEN_TOTAL: &str = "relay_frames_written_total";
/// Frames dropped by the peer policy (counter, labels: side).
pub const DISALLOWED_KINDS_TOTAL: &str = "relay_disallowed_kinds_total";
/// Dispatch failures (counter, labels: error_type).
pub const DISPATCH_ERRORS_TOTAL: &str = "relay_dispatch_errors_total";
/// Handler run time (histogram, labels: kind).
pub const HANDLER_DURATION_SECONDS: &str = "relay_handler_duration_seconds";
/// Registry rejections of a duplicate id (counter).
pub const REGISTRY_DUPLICATES_TOTAL: &str = "relay_registry_duplicates_total";
/// Upgrade requests turned away (counter, labels: reason).
pub const UPGRADES_REFUSED_TOTAL: &str = "relay_upgrades_refused_total";
/// Registered connections displaced by a newer one with the same id (counter).
pub const CONNECTIONS_REPLACED_TOTAL: &str = "relay_connections_replaced_total";
