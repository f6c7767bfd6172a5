pub mod clock;
pub mod encoder;
pub mod hasher;
pub mod password_reset;
pub mod users;

pub use clock::{Clock, FixedClock, SystemClock};
pub use encoder::{CredentialEncoder, EncoderRegistry};
pub use hasher::{Argon2Hasher, PasswordHasher};
pub use password_reset::{PasswordResetService, ResetPolicy, ResetRequest, ResetTokenManager};
pub use users::{UsersManager, UsersManagerRegistry};
