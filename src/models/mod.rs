//! Data models
//!
//! Entities stored by the repositories (Post, Tag, User, ApiToken), the input
//! types the services accept, and the post filter shared by the SQL and
//! in-memory query paths.

mod filter;
mod post;
mod tag;
mod token;
mod user;

pub use filter::{
    Caller, InvalidOrdering, InvalidTimeWindow, OrderField, PostAction, PostFilter, PostOrdering,
    ResponseShape, TimeWindow, Visibility,
};
pub use post::{CreatePostInput, ListParams, PagedResult, Post, UpdatePostInput};
pub use tag::Tag;
pub use token::ApiToken;
pub use user::{CreateUserInput, User};
