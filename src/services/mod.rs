//! Services layer - Business logic
//!
//! Services implement the business rules on top of the repositories:
//! visibility, authorization, validation and cache invalidation.

pub mod password;
pub mod post;
pub mod tag;
pub mod user;

pub use password::{hash_password, verify_password};
pub use post::{PostChanges, PostDraft, PostService, PostServiceError};
pub use tag::{TagService, TagServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
