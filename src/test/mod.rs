mod utils;
pub use utils::{test_db, test_utils};

mod access;
mod auth;
mod facility;
mod media;
