//! Error codes shared with the platform's sibling services.
//!
//! Every error response carries one of these in its `ErrorCode` field so
//! frontends can branch on the failure without parsing messages.

pub const UNAUTHORIZED: i32 = 1001;
pub const PERMISSION_NOT_ALLOWED: i32 = 1003;
pub const INVALID_REQUEST: i32 = 1400;
pub const FILE_NOT_FOUND: i32 = 1404;
pub const INTERNAL_ERROR: i32 = 1500;

pub const PROJECT_NOT_FOUND: i32 = 3001;
pub const ITERATION_UPLOAD_NOT_ALLOWED: i32 = 3201;
pub const ITERATION_DELETE_NOT_ALLOWED: i32 = 3202;
pub const FILE_TYPE_NOT_ALLOWED: i32 = 3203;
