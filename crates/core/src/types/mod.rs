//! Core types for Bugdesk.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod bug;
pub mod email;
pub mod id;
pub mod pagination;
pub mod status;
pub mod user;

pub use bug::{
    AssignBugDto, Attachment, Bug, BugListItem, CreateBugDto, UpdateBugDto, UpdateBugStatusDto,
};
pub use email::{Email, EmailError};
pub use id::*;
pub use pagination::{PageParams, PaginatedResult, PaginationError};
pub use status::*;
pub use user::{AuthResponse, Developer, LoginDto, RegisterDto, User};
