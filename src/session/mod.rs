pub mod browser;
pub mod profile;

pub use browser::{find_chrome_executable, BrowsingSession};
pub use profile::{PropertyOverride, SessionProfile};
