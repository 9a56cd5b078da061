pub mod follow;
pub mod session;
pub mod user;

pub use follow::{Follow, Relationship};
pub use session::{NewSession, Session};
pub use user::{NewUser, User};
