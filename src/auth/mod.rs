pub mod authentication;
pub mod mailer;
pub mod permissions;
pub mod token;
pub mod user;

pub use authentication::*;
pub use mailer::*;
pub use permissions::*;
pub use token::*;
pub use user::*;
