pub mod user;

pub use user::{HasPlainPassword, PendingReset, ResetTokenHolder, User};
