pub mod admin;
pub mod anti_cheat;
pub mod health;
pub mod matches;
pub mod sessions;
pub mod vetting;
