// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Close codes and reasons used on the streaming connection.

/// Client-initiated shutdown.
pub const NORMAL_CLOSE: u16 = 1000;
pub const NORMAL_CLOSE_REASON: &str = "normal close";

/// Endpoint going away; treated like a normal close.
pub const GOING_AWAY_CLOSE: u16 = 1001;
pub const GOING_AWAY_CLOSE_REASON: &str = "going away";

/// Server rejected the credentials or the request.
pub const INVALID_REQUEST_CLOSE: u16 = 4003;
pub const INVALID_REQUEST_CLOSE_REASON: &str = "invalid request";

/// Private code for the close the client issues after a failed local apply.
pub const RECONNECT_CLOSE: u16 = 4000;

/// Reason marking a self-inflicted close that must reconnect without
/// reporting a second error.
pub const RECONNECT_SENTINEL_REASON: &str = "ffc: reconnect after failed update";

/// Reported when the peer closes without a status code.
pub const NO_STATUS_CLOSE: u16 = 1005;
